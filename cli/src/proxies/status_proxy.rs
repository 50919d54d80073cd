use zbus::{Result, proxy};
#[proxy(
    default_service = "org.openbmc.rackmond",
    interface = "org.openbmc.rackmond.status",
    default_path = "/org/openbmc/rackmond/status"
)]
pub trait Status {
    async fn list_devices(&self) -> Result<String>;
    async fn get_device_status(&self, addr: u8) -> Result<String>;
    async fn get_status(&self) -> Result<String>;
    async fn get_monitor_data_raw(&self) -> Result<String>;
    async fn get_monitor_data_value(&self) -> Result<String>;
    async fn get_scan_info(&self) -> Result<String>;
}
