use mcs_core::errors::Result;
use mcs_core::lifecycle::LifecycleManager;

use crate::ui::LifecycleSpinner;

pub async fn run(manager: &LifecycleManager, name: &str) -> Result<()> {
    let progress = LifecycleSpinner::new();
    let codespace = manager.rebuild(name, &progress).await?;
    progress.finish(&format!("codespace '{}' is {}", codespace.name, codespace.status));
    Ok(())
}
