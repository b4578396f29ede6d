//! Requested-resource extraction for containers
//!
//! Extended resources cannot be overcommitted, so for every resource under the
//! requested namespace the container's request must equal its limit. The
//! returned map is keyed by the lower-cased resource name.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Container;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::quantity::quantity_value;
use crate::{Error, Result};

/// Collect every `<namespace>/...` resource the container asks for.
///
/// Fails when an entry is present on only one of requests/limits, when the
/// two values differ, or when a quantity is not an integer.
pub fn requested_resources(container: &Container, namespace: &str) -> Result<BTreeMap<String, i64>> {
    let prefix = format!("{}/", namespace.to_lowercase());
    let empty = BTreeMap::new();
    let resources = container.resources.as_ref();
    let limits = resources.and_then(|r| r.limits.as_ref()).unwrap_or(&empty);
    let requests = resources.and_then(|r| r.requests.as_ref()).unwrap_or(&empty);

    let limit_values = namespaced_values(container, limits, &prefix)?;
    let request_values = namespaced_values(container, requests, &prefix)?;

    for (name, requested) in &request_values {
        match limit_values.get(name) {
            Some(limit) if limit == requested => {}
            Some(limit) => {
                return Err(Error::malformed_resource(
                    &container.name,
                    name,
                    format!(
                        "requests ({requested}) and limits ({limit}) must be equal as extended resources cannot be overcommitted"
                    ),
                ))
            }
            None => {
                return Err(Error::malformed_resource(
                    &container.name,
                    name,
                    "requested without a matching limit",
                ))
            }
        }
    }

    if let Some(name) = limit_values.keys().find(|name| !request_values.contains_key(*name)) {
        return Err(Error::malformed_resource(
            &container.name,
            name,
            "limited without a matching request",
        ));
    }

    Ok(limit_values)
}

fn namespaced_values(
    container: &Container,
    quantities: &BTreeMap<String, Quantity>,
    prefix: &str,
) -> Result<BTreeMap<String, i64>> {
    let mut values = BTreeMap::new();
    for (name, quantity) in quantities {
        let name = name.to_lowercase();
        if !name.starts_with(prefix) {
            continue;
        }
        let value = quantity_value(quantity).map_err(|e| {
            Error::malformed_resource(&container.name, &name, e.to_string())
        })?;
        values.insert(name, value);
    }
    Ok(values)
}
