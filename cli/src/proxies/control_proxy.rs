use zbus::{Result, proxy};
#[proxy(
    default_service = "org.openbmc.rackmond",
    interface = "org.openbmc.rackmond.control",
    default_path = "/org/openbmc/rackmond/control"
)]
pub trait Control {
    async fn pause_monitoring(&self) -> Result<String>;
    async fn resume_monitoring(&self) -> Result<String>;
    async fn force_scan(&self) -> Result<String>;
    async fn raw_command(
        &self,
        payload: &str,
        expected_len: u32,
        timeout_ms: u32,
    ) -> Result<String>;
    async fn read_holding_registers(&self, addr: u8, reg: u16, count: u16) -> Result<String>;
    async fn write_single_register(&self, addr: u8, reg: u16, value: u16) -> Result<String>;
}
