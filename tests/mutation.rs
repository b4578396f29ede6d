//! End-to-end tests of the SGX mutation engine through the public API
//!
//! Each test builds a Pod the way a workload author would write it and checks
//! what the API server ends up persisting.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;

use sgx_webhook::{
    mutate_pod, QuotingMode, AESMD_SOCKET_DIR, AESMD_SOCKET_VOLUME, ENCLAVE_RESOURCE,
    EPC_ANNOTATION, EPC_RESOURCE, PROVISION_RESOURCE, QUOTE_PROVIDER_ANNOTATION,
};

fn epc_container(name: &str, epc: &str) -> Container {
    let quantities = BTreeMap::from([
        (EPC_RESOURCE.to_string(), Quantity(epc.to_string())),
        ("cpu".to_string(), Quantity("250m".to_string())),
    ]);
    Container {
        name: name.to_string(),
        image: Some(format!("registry.example/{name}:1.0")),
        resources: Some(ResourceRequirements {
            limits: Some(quantities.clone()),
            requests: Some(quantities),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn plain_container(name: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(format!("registry.example/{name}:1.0")),
        ..Default::default()
    }
}

fn pod(containers: Vec<Container>, quote_provider: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("sgx-pod".to_string()),
            annotations: quote_provider.map(|p| {
                BTreeMap::from([(QUOTE_PROVIDER_ANNOTATION.to_string(), p.to_string())])
            }),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container<'a>(pod: &'a Pod, name: &str) -> &'a Container {
    pod.spec
        .as_ref()
        .unwrap()
        .containers
        .iter()
        .find(|c| c.name == name)
        .unwrap()
}

fn handle(container: &Container, resource: &str) -> (Option<String>, Option<String>) {
    let resources = container.resources.as_ref().unwrap();
    let get = |map: &Option<BTreeMap<String, Quantity>>| {
        map.as_ref()
            .and_then(|m| m.get(resource))
            .map(|q| q.0.clone())
    };
    (get(&resources.limits), get(&resources.requests))
}

fn one() -> (Option<String>, Option<String>) {
    (Some("1".to_string()), Some("1".to_string()))
}

fn mounts_socket_dir(container: &Container) -> bool {
    container
        .volume_mounts
        .iter()
        .flatten()
        .any(|m| m.mount_path == AESMD_SOCKET_DIR)
}

#[test]
fn single_epc_container_without_quote_provider() {
    let mutation = mutate_pod(pod(vec![epc_container("app", "10")], None)).unwrap();
    let app = container(&mutation.pod, "app");

    assert_eq!(handle(app, ENCLAVE_RESOURCE), one());
    assert_eq!(handle(app, PROVISION_RESOURCE), (None, None));
    assert!(mutation.pod.spec.as_ref().unwrap().volumes.is_none());
    assert_eq!(
        mutation.pod.metadata.annotations.unwrap()[EPC_ANNOTATION],
        "10"
    );
}

#[test]
fn aesmd_sidecar_with_two_epc_users() {
    let input = pod(
        vec![epc_container("app", "5"), epc_container("aesmd", "7")],
        Some("aesmd"),
    );
    let mutation = mutate_pod(input).unwrap();
    let app = container(&mutation.pod, "app");
    let aesmd = container(&mutation.pod, "aesmd");

    assert_eq!(mutation.mode, QuotingMode::SharedSidecar);
    assert_eq!(handle(app, ENCLAVE_RESOURCE), one());
    assert_eq!(handle(aesmd, ENCLAVE_RESOURCE), one());
    assert!(mounts_socket_dir(app));

    let volumes = mutation.pod.spec.as_ref().unwrap().volumes.clone().unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].name, AESMD_SOCKET_VOLUME);
    assert_eq!(
        volumes[0].empty_dir.as_ref().unwrap().medium.as_deref(),
        Some("Memory")
    );
    assert_eq!(
        mutation.pod.metadata.annotations.unwrap()[EPC_ANNOTATION],
        "12"
    );
}

#[test]
fn aesmd_daemonset_with_two_epc_users() {
    let input = pod(
        vec![epc_container("app", "5"), epc_container("worker", "7")],
        Some("aesmd"),
    );
    let mutation = mutate_pod(input).unwrap();

    assert_eq!(mutation.mode, QuotingMode::SharedHost);
    let volumes = mutation.pod.spec.as_ref().unwrap().volumes.clone().unwrap();
    assert_eq!(volumes.len(), 1);
    let host_path = volumes[0].host_path.as_ref().unwrap();
    assert_eq!(host_path.path, AESMD_SOCKET_DIR);
    assert_eq!(host_path.type_.as_deref(), Some("DirectoryOrCreate"));
    assert!(volumes[0].empty_dir.is_none());
    assert_eq!(
        mutation.pod.metadata.annotations.unwrap()[EPC_ANNOTATION],
        "12"
    );
}

#[test]
fn in_process_quote_provider() {
    let mutation = mutate_pod(pod(vec![epc_container("app", "10")], Some("app"))).unwrap();
    let app = container(&mutation.pod, "app");

    assert_eq!(handle(app, ENCLAVE_RESOURCE), one());
    assert_eq!(handle(app, PROVISION_RESOURCE), one());
    assert!(mutation.pod.spec.as_ref().unwrap().volumes.is_none());
}

#[test]
fn pod_without_epc_is_unmodified() {
    let input = pod(
        vec![plain_container("web"), plain_container("sidecar")],
        Some("aesmd"),
    );
    let mutation = mutate_pod(input.clone()).unwrap();

    assert_eq!(mutation.pod, input);
    assert!(mutation.warnings.is_empty());
}

#[test]
fn non_sgx_resources_survive_mutation() {
    let mutation = mutate_pod(pod(vec![epc_container("app", "10")], None)).unwrap();
    let app = container(&mutation.pod, "app");
    assert_eq!(handle(app, "cpu"), (Some("250m".to_string()), Some("250m".to_string())));
    assert_eq!(handle(app, EPC_RESOURCE), (Some("10".to_string()), Some("10".to_string())));
}

#[test]
fn applying_twice_equals_applying_once() {
    let scenarios = [
        pod(vec![epc_container("app", "10")], None),
        pod(vec![epc_container("app", "10")], Some("app")),
        pod(
            vec![epc_container("app", "5"), epc_container("aesmd", "7")],
            Some("aesmd"),
        ),
        pod(
            vec![
                epc_container("app", "5"),
                plain_container("logger"),
                epc_container("worker", "7"),
            ],
            Some("aesmd"),
        ),
    ];

    for input in scenarios {
        let once = mutate_pod(input).unwrap();
        let twice = mutate_pod(once.pod.clone()).unwrap();
        assert_eq!(once.pod, twice.pod);
        assert_eq!(once.mode, twice.mode);
        assert_eq!(once.total_epc, twice.total_epc);
    }
}

#[test]
fn misuse_warnings_follow_container_order() {
    let mut first = epc_container("first", "4");
    let mut second = epc_container("second", "4");
    for (c, resource) in [(&mut first, PROVISION_RESOURCE), (&mut second, ENCLAVE_RESOURCE)] {
        let resources = c.resources.as_mut().unwrap();
        for map in [&mut resources.limits, &mut resources.requests] {
            map.as_mut()
                .unwrap()
                .insert(resource.to_string(), Quantity("3".to_string()));
        }
    }

    let mutation = mutate_pod(pod(vec![first, second], Some("first"))).unwrap();

    assert_eq!(mutation.warnings.len(), 2);
    assert!(mutation.warnings[0].starts_with(PROVISION_RESOURCE));
    assert!(mutation.warnings[1].starts_with(ENCLAVE_RESOURCE));
    assert_eq!(
        handle(container(&mutation.pod, "first"), PROVISION_RESOURCE),
        one()
    );
    assert_eq!(
        handle(container(&mutation.pod, "second"), ENCLAVE_RESOURCE),
        one()
    );
    assert_eq!(
        handle(container(&mutation.pod, "second"), PROVISION_RESOURCE),
        (None, None)
    );
}
