use mcs_core::errors::Result;
use mcs_core::lifecycle::LifecycleManager;

pub async fn run(manager: &LifecycleManager, name: &str) -> Result<()> {
    manager.restart(name).await?;
    println!("codespace '{name}' restarted");
    Ok(())
}
