//! Quote generation mode selection
//!
//! Quote generation modes:
//!
//! - in-process: the container ships its own quote provider library and needs
//!   a handle to `/dev/sgx_provision` (`sgx.intel.com/provision`).
//! - out-of-process: the container talks to Intel aesmd over
//!   `/var/run/aesmd/aesm.sock`. aesmd runs either as a sidecar in the same Pod
//!   or as a DaemonSet on the node. In both cases its container is named
//!   `aesmd`.
//!
//! The `sgx.intel.com/quote-provider` annotation selects the mode by naming the
//! container that generates quotes. Without it, containers can create enclaves
//! but cannot produce quotes for them.

use std::fmt;

use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, HostPathVolumeSource, Volume};

use crate::{AESMD_QUOTE_PROVIDER, AESMD_SOCKET_DIR, AESMD_SOCKET_VOLUME};

/// How the Pod generates quotes for its enclaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotingMode {
    /// No quote provider selected, or no container requests EPC
    None,
    /// The named container generates quotes itself
    InProcess {
        /// Container name taken from the quote-provider annotation
        provider: String,
    },
    /// aesmd runs as a sidecar; its socket directory is shared via an
    /// in-memory emptyDir
    SharedSidecar,
    /// aesmd runs on the node; its socket directory is mounted from the host
    SharedHost,
}

impl QuotingMode {
    /// Select the mode for a Pod.
    ///
    /// `participants` counts containers requesting EPC; `daemon_participating`
    /// is true when one of them is named `aesmd`. The sidecar topology needs
    /// aesmd plus at least one other EPC user; anything else selecting aesmd
    /// falls back to the node daemon.
    pub fn select(
        quote_provider: Option<&str>,
        participants: usize,
        daemon_participating: bool,
    ) -> Self {
        let provider = match quote_provider {
            Some(p) if !p.is_empty() && participants > 0 => p,
            _ => return QuotingMode::None,
        };

        if provider != AESMD_QUOTE_PROVIDER {
            return QuotingMode::InProcess {
                provider: provider.to_string(),
            };
        }

        if daemon_participating && participants >= 2 {
            QuotingMode::SharedSidecar
        } else {
            QuotingMode::SharedHost
        }
    }

    /// Name of the container that should receive the provisioning handle
    pub fn provider(&self) -> Option<&str> {
        match self {
            QuotingMode::None => None,
            QuotingMode::InProcess { provider } => Some(provider.as_str()),
            QuotingMode::SharedSidecar | QuotingMode::SharedHost => Some(AESMD_QUOTE_PROVIDER),
        }
    }

    /// True when containers reach aesmd over its socket
    pub fn uses_shared_daemon(&self) -> bool {
        matches!(self, QuotingMode::SharedSidecar | QuotingMode::SharedHost)
    }

    /// The Pod volume backing the aesmd socket directory, if this mode needs one
    pub fn socket_volume(&self) -> Option<Volume> {
        match self {
            QuotingMode::None | QuotingMode::InProcess { .. } => None,
            QuotingMode::SharedSidecar => Some(Volume {
                name: AESMD_SOCKET_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource {
                    medium: Some("Memory".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            QuotingMode::SharedHost => Some(Volume {
                name: AESMD_SOCKET_VOLUME.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: AESMD_SOCKET_DIR.to_string(),
                    type_: Some("DirectoryOrCreate".to_string()),
                }),
                ..Default::default()
            }),
        }
    }

    /// Short name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotingMode::None => "none",
            QuotingMode::InProcess { .. } => "in-process",
            QuotingMode::SharedSidecar => "aesmd-sidecar",
            QuotingMode::SharedHost => "aesmd-host",
        }
    }
}

impl fmt::Display for QuotingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
