use mcs_core::errors::Result;
use mcs_core::lifecycle::LifecycleManager;

pub async fn run(manager: &LifecycleManager, name: &str, argv: Vec<String>) -> Result<()> {
    let result = manager.exec(name, &argv).await?;
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    if result.exit_code != 0 {
        std::process::exit(result.exit_code);
    }
    Ok(())
}
