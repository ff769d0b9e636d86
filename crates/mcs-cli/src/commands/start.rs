use mcs_core::errors::Result;
use mcs_core::lifecycle::LifecycleManager;

pub async fn run(manager: &LifecycleManager, name: &str) -> Result<()> {
    manager.start(name).await?;
    println!("codespace '{name}' started");
    Ok(())
}
