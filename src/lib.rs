//! SGX admission webhook - wires Intel SGX resources into Pods at admission time
//!
//! Workload authors only ask for enclave page cache (`sgx.intel.com/epc`).
//! This crate rewrites the Pod so that it also carries the device handles the
//! SGX device plugin hands out, plus the Intel aesmd socket wiring when the Pod
//! opts into an out-of-process quoting daemon.
//!
//! # Modules
//!
//! - [`mutator`] - The mutation engine (resource scan, quoting mode, volumes, annotation)
//! - [`resources`] - Requested-resource extraction for a single container
//! - [`quantity`] - Integral Kubernetes quantity parsing and binary-SI formatting
//! - [`webhook`] - AdmissionReview HTTP handler and webhook registration
//! - [`config`] - Command line and environment configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod mutator;
pub mod quantity;
pub mod resources;
pub mod telemetry;
pub mod webhook;

pub use error::Error;
pub use mutator::{mutate_pod, Mutation, QuotingMode};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Well-known names
// =============================================================================
// Resource names and annotations shared with the SGX device plugin and with
// workload authors. Changing any of these breaks existing Pods.

/// Namespace of every SGX extended resource and annotation
pub const SGX_NAMESPACE: &str = "sgx.intel.com";

/// Enclave page cache, the only SGX resource authors should request
pub const EPC_RESOURCE: &str = "sgx.intel.com/epc";

/// Handle to `/dev/sgx_enclave`, needed to create enclaves
pub const ENCLAVE_RESOURCE: &str = "sgx.intel.com/enclave";

/// Handle to `/dev/sgx_provision`, needed for in-process quote generation
pub const PROVISION_RESOURCE: &str = "sgx.intel.com/provision";

/// Pod annotation naming the container that generates quotes
pub const QUOTE_PROVIDER_ANNOTATION: &str = "sgx.intel.com/quote-provider";

/// Pod annotation carrying the total EPC requested by all containers
pub const EPC_ANNOTATION: &str = "sgx.intel.com/epc";

/// Quote provider value selecting Intel aesmd, and aesmd's container name
pub const AESMD_QUOTE_PROVIDER: &str = "aesmd";

/// Directory holding the aesmd socket, both on the host and in containers
pub const AESMD_SOCKET_DIR: &str = "/var/run/aesmd";

/// Volume name backing [`AESMD_SOCKET_DIR`]
pub const AESMD_SOCKET_VOLUME: &str = "aesmd-socket";

/// Environment variable telling the SGX quote library to use aesmd
pub const SGX_AESM_ADDR_ENV: &str = "SGX_AESM_ADDR";

/// Default listen address for the HTTPS webhook server
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8443";
