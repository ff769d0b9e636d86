use mcs_core::errors::Result;
use mcs_core::lifecycle::LifecycleManager;

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub async fn run(manager: &LifecycleManager, name: &str) -> Result<()> {
    let (codespace, stats) = manager.info(name).await?;

    println!("name:       {}", codespace.name);
    println!("repository: {}", codespace.repository);
    println!("status:     {}", codespace.status);
    println!("path:       {}", codespace.path.display());
    println!("vscode:     {}", codespace.vscode_url);
    println!("app:        {}", codespace.app_url);
    if !codespace.components.is_empty() {
        println!("components: {}", codespace.components.join(", "));
    }
    println!("cpu:        {:.1}%", stats.cpu_percent);
    println!(
        "memory:     {} / {}",
        format_bytes(stats.memory_usage_bytes),
        format_bytes(stats.memory_limit_bytes)
    );
    Ok(())
}
