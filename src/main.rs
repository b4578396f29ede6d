//! SGX admission webhook binary

use clap::Parser;

use sgx_webhook::config::{Cli, Command};
use sgx_webhook::telemetry;
use sgx_webhook::webhook::registration::{register, webhook_configuration};
use sgx_webhook::webhook::start_webhook_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_logging(cli.log_format)?;

    // Both the HTTPS server and the kube client need a process-wide provider
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install the aws-lc-rs crypto provider");
    }

    match cli.command {
        Some(Command::Manifest(args)) => {
            let config = args.registration_config().await?;
            let yaml = serde_yaml::to_string(&webhook_configuration(&config))
                .map_err(|e| anyhow::anyhow!("Failed to serialize webhook configuration: {}", e))?;
            print!("{yaml}");
        }
        Some(Command::Register(args)) => {
            let config = args.registration_config().await?;
            let client = kube::Client::try_default().await?;
            register(&client, &config).await?;
        }
        None => start_webhook_server(&cli.serve).await?,
    }

    Ok(())
}
