use mcs_core::config::{ConfigStore, IpMode};
use mcs_core::errors::Result;
use mcs_core::paths::Paths;

use crate::cli::ConfigRequest;

pub async fn run(paths: &Paths, req: ConfigRequest) -> Result<()> {
    let store = ConfigStore::new(paths.clone());

    match req {
        ConfigRequest::Show => {
            let config = store.load()?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        ConfigRequest::SetIpMode(mode) => {
            let mode: IpMode = mode.parse()?;
            store.set_ip_mode(mode)?;
            println!("ip_mode set to {mode:?}");
        }
        ConfigRequest::SetHostIp(ip) => {
            store.set_host_ip(ip.clone())?;
            println!("host_ip set to {ip}");
        }
        ConfigRequest::SetAutoUpdate(enabled) => {
            store.set_auto_update_enabled(enabled)?;
            println!("auto_update_enabled set to {enabled}");
        }
    }
    Ok(())
}
