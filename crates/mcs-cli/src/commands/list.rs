use mcs_core::errors::Result;
use mcs_core::lifecycle::LifecycleManager;

pub async fn run(manager: &LifecycleManager) -> Result<()> {
    let codespaces = manager.list().await?;
    if codespaces.is_empty() {
        println!("no codespaces");
        return Ok(());
    }

    println!("{:<20} {:<10} {:<30}", "NAME", "STATUS", "REPOSITORY");
    for codespace in codespaces {
        println!("{:<20} {:<10} {:<30}", codespace.name, codespace.status, codespace.repository);
    }
    Ok(())
}
