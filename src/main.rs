use quota_mailer::{
    configuration::get_configuration,
    startup::Application,
    telemetry::{get_subscriber, init_subscriber},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("quota_mailer".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let config = get_configuration()?;
    let application = Application::build(config).await?;
    tracing::info!(port = application.get_port(), "Dispatch service listening.");

    if let Err(e) = application.run_until_stopped().await {
        tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            "API failed"
        );
        return Err(e.into());
    }

    tracing::info!("API has exited");
    Ok(())
}
