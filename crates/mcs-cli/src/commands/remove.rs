use mcs_core::errors::Result;
use mcs_core::lifecycle::LifecycleManager;

pub async fn run(manager: &LifecycleManager, name: &str, keep_data: bool) -> Result<()> {
    manager.remove(name, keep_data).await?;
    if keep_data {
        println!("codespace '{name}' removed, on-host directory kept");
    } else {
        println!("codespace '{name}' removed");
    }
    Ok(())
}
