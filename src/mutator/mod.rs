//! SGX Pod mutation engine
//!
//! Given a Pod, produce the Pod the SGX device plugin can actually schedule:
//!
//! 1. Scan every container's `sgx.intel.com/*` resources, warning about the
//!    handles authors must not set themselves.
//! 2. Select the [`QuotingMode`] once for the whole Pod.
//! 3. Give every EPC user an enclave handle, the quote provider a provisioning
//!    handle, and aesmd users the socket mount and environment.
//! 4. Add the aesmd socket volume and the total EPC annotation.
//!
//! Running the engine on its own output changes nothing.

mod mode;

pub use mode::QuotingMode;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, VolumeMount};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::{debug, trace};

use crate::quantity::format_binary_si;
use crate::resources::requested_resources;
use crate::{
    Error, Result, AESMD_QUOTE_PROVIDER, AESMD_SOCKET_DIR, AESMD_SOCKET_VOLUME,
    ENCLAVE_RESOURCE, EPC_ANNOTATION, EPC_RESOURCE, PROVISION_RESOURCE,
    QUOTE_PROVIDER_ANNOTATION, SGX_AESM_ADDR_ENV, SGX_NAMESPACE,
};

/// Resources the engine manages; authors setting them get a warning
const ENGINE_MANAGED_RESOURCES: [&str; 2] = [ENCLAVE_RESOURCE, PROVISION_RESOURCE];

/// Value of `SGX_AESM_ADDR` telling the quote library to use the aesmd socket
const AESM_ADDR_VALUE: &str = "1";

/// Result of running the engine over one Pod
#[derive(Debug, Clone)]
pub struct Mutation {
    /// The mutated Pod
    pub pod: Pod,
    /// Advisory warnings, in container order
    pub warnings: Vec<String>,
    /// Quoting mode selected for the Pod
    pub mode: QuotingMode,
    /// Number of containers requesting EPC
    pub participants: usize,
    /// Sum of EPC across all containers
    pub total_epc: i64,
}

impl Mutation {
    /// No container requests EPC, so the Pod was returned untouched
    pub fn is_noop(&self) -> bool {
        self.participants == 0
    }
}

/// A container requesting EPC, by position in the Pod's container list
#[derive(Debug, Clone, Copy)]
struct Participant {
    index: usize,
    epc: i64,
}

/// Outcome of the read-only pass over the containers
#[derive(Debug, Default)]
struct Scan {
    participants: Vec<Participant>,
    warnings: Vec<String>,
    total_epc: i64,
    daemon_participating: bool,
}

/// Mutate a Pod for SGX.
///
/// Fails only when a container carries a malformed `sgx.intel.com/*` entry;
/// the caller must then leave the Pod alone.
pub fn mutate_pod(mut pod: Pod) -> Result<Mutation> {
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    let scan = scan_containers(containers)?;

    let quote_provider = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(QUOTE_PROVIDER_ANNOTATION))
        .map(String::as_str);
    let mode = QuotingMode::select(
        quote_provider,
        scan.participants.len(),
        scan.daemon_participating,
    );

    if let Some(spec) = pod.spec.as_mut() {
        for participant in &scan.participants {
            let container = &mut spec.containers[participant.index];
            mutate_container(container, &mode);
            trace!(
                container = %container.name,
                epc = participant.epc,
                "mutated SGX container"
            );
        }

        if let Some(volume) = mode.socket_volume() {
            let volumes = spec.volumes.get_or_insert_with(Vec::new);
            if volumes.iter().any(|v| v.name == volume.name) {
                debug!(volume = %volume.name, "aesmd socket volume already present");
            } else {
                volumes.push(volume);
            }
        }
    }

    if scan.total_epc != 0 {
        pod.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(EPC_ANNOTATION.to_string(), format_binary_si(scan.total_epc));
    }

    debug!(
        pod = ?pod.metadata.name,
        mode = %mode,
        participants = scan.participants.len(),
        total_epc = scan.total_epc,
        warnings = scan.warnings.len(),
        "SGX mutation computed"
    );

    Ok(Mutation {
        pod,
        warnings: scan.warnings,
        mode,
        participants: scan.participants.len(),
        total_epc: scan.total_epc,
    })
}

/// Read every container's SGX resources without touching the Pod.
///
/// Warnings are collected for all containers, EPC users or not.
fn scan_containers(containers: &[Container]) -> Result<Scan> {
    let mut scan = Scan::default();

    for (index, container) in containers.iter().enumerate() {
        let requested = requested_resources(container, SGX_NAMESPACE)?;
        scan.warnings.extend(misuse_warnings(&requested));

        let Some(&epc) = requested.get(EPC_RESOURCE) else {
            continue;
        };

        scan.total_epc = scan.total_epc.checked_add(epc).ok_or_else(|| {
            Error::malformed_resource(&container.name, EPC_RESOURCE, "total EPC overflows")
        })?;
        if container.name == AESMD_QUOTE_PROVIDER {
            scan.daemon_participating = true;
        }
        scan.participants.push(Participant { index, epc });
    }

    Ok(scan)
}

fn misuse_warnings(requested: &BTreeMap<String, i64>) -> Vec<String> {
    ENGINE_MANAGED_RESOURCES
        .iter()
        .filter(|resource| requested.contains_key(**resource))
        .map(|resource| format!("{resource} should not be used in Pod spec directly"))
        .collect()
}

/// Apply the per-container edits for an EPC user.
///
/// Enclave creation rights are needed whatever the quoting topology, so
/// every EPC user gets the enclave handle. Author-set values are overwritten.
fn mutate_container(container: &mut Container, mode: &QuotingMode) {
    if mode.provider() == Some(container.name.as_str()) {
        set_device_handle(container, PROVISION_RESOURCE);
    }
    set_device_handle(container, ENCLAVE_RESOURCE);

    if mode.uses_shared_daemon() {
        ensure_socket_mount(container);
        // aesmd gets the variable too; it ignores it
        ensure_aesm_addr(container);
    }
}

fn set_device_handle(container: &mut Container, resource: &str) {
    let resources = container.resources.get_or_insert_with(Default::default);
    for quantities in [&mut resources.limits, &mut resources.requests] {
        quantities
            .get_or_insert_with(BTreeMap::new)
            .insert(resource.to_string(), Quantity("1".to_string()));
    }
}

fn ensure_socket_mount(container: &mut Container) {
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    if mounts.iter().any(|m| m.mount_path == AESMD_SOCKET_DIR) {
        return;
    }
    mounts.push(VolumeMount {
        name: AESMD_SOCKET_VOLUME.to_string(),
        mount_path: AESMD_SOCKET_DIR.to_string(),
        ..Default::default()
    });
}

/// Make `SGX_AESM_ADDR=1` the effective value, rewriting an existing entry in
/// place instead of appending a second one.
fn ensure_aesm_addr(container: &mut Container) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == SGX_AESM_ADDR_ENV) {
        Some(var) => {
            var.value = Some(AESM_ADDR_VALUE.to_string());
            var.value_from = None;
        }
        None => env.push(EnvVar {
            name: SGX_AESM_ADDR_ENV.to_string(),
            value: Some(AESM_ADDR_VALUE.to_string()),
            ..Default::default()
        }),
    }
}
