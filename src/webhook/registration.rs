//! MutatingWebhookConfiguration for the SGX mutator
//!
//! The webhook intercepts Pod CREATE/UPDATE only. It fails open: the API
//! server admits Pods unmodified when the webhook is down or errors.

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::ByteString;
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use kube::Client;
use tracing::info;

use super::WEBHOOK_PATH;
use crate::Result;

/// Name of both the configuration object and its single webhook
pub const WEBHOOK_CONFIGURATION_NAME: &str = "sgx.mutator.webhooks.intel.com";

/// Field manager used for server-side apply
const FIELD_MANAGER: &str = "sgx-webhook";

/// Where the API server reaches the webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConfig {
    /// Service in front of the webhook Deployment
    pub service_name: String,
    /// Namespace of that Service
    pub service_namespace: String,
    /// Service port
    pub service_port: i32,
    /// PEM bundle used to verify the serving certificate; omitted when a CA
    /// injector fills it in
    pub ca_bundle: Option<Vec<u8>>,
}

/// Build the MutatingWebhookConfiguration routing Pod admission to us
pub fn webhook_configuration(config: &RegistrationConfig) -> MutatingWebhookConfiguration {
    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(WEBHOOK_CONFIGURATION_NAME.to_string()),
            ..Default::default()
        },
        webhooks: Some(vec![MutatingWebhook {
            name: WEBHOOK_CONFIGURATION_NAME.to_string(),
            admission_review_versions: vec!["v1".to_string()],
            side_effects: "None".to_string(),
            failure_policy: Some("Ignore".to_string()),
            match_policy: Some("Equivalent".to_string()),
            rules: Some(vec![RuleWithOperations {
                operations: Some(vec!["CREATE".to_string(), "UPDATE".to_string()]),
                api_groups: Some(vec![String::new()]),
                api_versions: Some(vec!["v1".to_string()]),
                resources: Some(vec!["pods".to_string()]),
                scope: Some("Namespaced".to_string()),
            }]),
            client_config: WebhookClientConfig {
                service: Some(ServiceReference {
                    name: config.service_name.clone(),
                    namespace: config.service_namespace.clone(),
                    path: Some(WEBHOOK_PATH.to_string()),
                    port: Some(config.service_port),
                }),
                ca_bundle: config.ca_bundle.clone().map(ByteString),
                ..Default::default()
            },
            ..Default::default()
        }]),
    }
}

/// Install or update the webhook configuration with server-side apply
pub async fn register(client: &Client, config: &RegistrationConfig) -> Result<()> {
    let api: Api<MutatingWebhookConfiguration> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    api.patch(
        WEBHOOK_CONFIGURATION_NAME,
        &params,
        &Patch::Apply(&webhook_configuration(config)),
    )
    .await?;

    info!(
        name = WEBHOOK_CONFIGURATION_NAME,
        service = %config.service_name,
        namespace = %config.service_namespace,
        "Webhook configuration installed"
    );
    Ok(())
}
