//! Command line and environment configuration
//!
//! Every flag can also be set through an environment variable so the webhook
//! Deployment can be configured without overriding the container args.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::webhook::registration::RegistrationConfig;
use crate::{Error, Result, DEFAULT_LISTEN_ADDR};

/// SGX admission webhook - injects SGX device handles and aesmd wiring into Pods
#[derive(Parser, Debug)]
#[command(name = "sgx-webhook", version, about, long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value_t = LogFormat::Json,
        env = "SGX_WEBHOOK_LOG_FORMAT",
        global = true
    )]
    pub log_format: LogFormat,

    /// Server settings, used when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,

    /// Optional one-shot command; serves when absent
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands besides serving
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the MutatingWebhookConfiguration as YAML and exit
    Manifest(RegistrationArgs),

    /// Apply the MutatingWebhookConfiguration to the current cluster
    Register(RegistrationArgs),
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human readable lines
    Text,
}

/// HTTPS server settings
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address the HTTPS server binds to
    #[arg(long, env = "SGX_WEBHOOK_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    /// PEM encoded serving certificate
    #[arg(
        long,
        env = "SGX_WEBHOOK_TLS_CERT",
        default_value = "/etc/webhook/certs/tls.crt"
    )]
    pub tls_cert_file: PathBuf,

    /// PEM encoded private key for the serving certificate
    #[arg(
        long,
        env = "SGX_WEBHOOK_TLS_KEY",
        default_value = "/etc/webhook/certs/tls.key"
    )]
    pub tls_key_file: PathBuf,
}

/// Where the API server reaches the webhook
#[derive(Args, Debug, Clone)]
pub struct RegistrationArgs {
    /// Name of the Service in front of the webhook
    #[arg(long, env = "SGX_WEBHOOK_SERVICE_NAME", default_value = "sgx-webhook")]
    pub service_name: String,

    /// Namespace of that Service
    #[arg(
        long,
        env = "SGX_WEBHOOK_SERVICE_NAMESPACE",
        default_value = "inteldeviceplugins-system"
    )]
    pub service_namespace: String,

    /// Service port
    #[arg(long, env = "SGX_WEBHOOK_SERVICE_PORT", default_value_t = 443)]
    pub service_port: i32,

    /// PEM bundle the API server uses to verify the webhook certificate
    #[arg(long, env = "SGX_WEBHOOK_CA_FILE")]
    pub ca_file: Option<PathBuf>,
}

impl RegistrationArgs {
    /// Resolve the arguments, reading the CA bundle if one was given
    pub async fn registration_config(&self) -> Result<RegistrationConfig> {
        let ca_bundle = match &self.ca_file {
            Some(path) => Some(tokio::fs::read(path).await.map_err(|e| {
                Error::config(format!("cannot read CA bundle {}: {e}", path.display()))
            })?),
            None => None,
        };

        Ok(RegistrationConfig {
            service_name: self.service_name.clone(),
            service_namespace: self.service_namespace.clone(),
            service_port: self.service_port,
            ca_bundle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_serves_with_defaults() {
        let cli = Cli::try_parse_from(["sgx-webhook"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.serve.listen_addr, DEFAULT_LISTEN_ADDR.parse().unwrap());
        assert_eq!(
            cli.serve.tls_cert_file,
            PathBuf::from("/etc/webhook/certs/tls.crt")
        );
    }

    #[test]
    fn serve_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "sgx-webhook",
            "--listen-addr",
            "127.0.0.1:9443",
            "--tls-key-file",
            "/tmp/key.pem",
            "--log-format",
            "text",
        ])
        .unwrap();
        assert_eq!(cli.serve.listen_addr.port(), 9443);
        assert_eq!(cli.serve.tls_key_file, PathBuf::from("/tmp/key.pem"));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn invalid_listen_addr_is_rejected() {
        assert!(Cli::try_parse_from(["sgx-webhook", "--listen-addr", "not-an-addr"]).is_err());
    }

    #[tokio::test]
    async fn manifest_subcommand_without_ca() {
        let cli = Cli::try_parse_from([
            "sgx-webhook",
            "manifest",
            "--service-namespace",
            "sgx",
        ])
        .unwrap();
        let Some(Command::Manifest(args)) = cli.command else {
            panic!("expected manifest subcommand");
        };

        let config = args.registration_config().await.unwrap();
        assert_eq!(config.service_name, "sgx-webhook");
        assert_eq!(config.service_namespace, "sgx");
        assert_eq!(config.service_port, 443);
        assert!(config.ca_bundle.is_none());
    }

    #[tokio::test]
    async fn missing_ca_file_is_a_config_error() {
        let args = RegistrationArgs {
            service_name: "sgx-webhook".to_string(),
            service_namespace: "default".to_string(),
            service_port: 443,
            ca_file: Some(PathBuf::from("/nonexistent/ca.crt")),
        };
        let err = args.registration_config().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("/nonexistent/ca.crt"));
    }
}
