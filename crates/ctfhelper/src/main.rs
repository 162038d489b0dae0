use ctfhelper::{get_settings, noisy_log_targets, run_clean_commands, setup_logger, Application};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = get_settings()?;
    setup_logger(settings.level.clone(), noisy_log_targets())?;

    if settings.clean_commands {
        return run_clean_commands(&settings).await;
    }

    let application = Application::build(settings).await?;
    application.run_until_stopped().await?;
    Ok(())
}
