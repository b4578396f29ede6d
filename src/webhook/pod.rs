//! Pod Mutation Webhook
//!
//! Handles AdmissionReview requests for Pods, injecting SGX device handles,
//! aesmd wiring and the total EPC annotation.

use std::fmt::Display;

use axum::http::StatusCode;
use axum::Json;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::mutator::mutate_pod;

/// Handle mutating admission review for Pods
pub async fn mutate_handler(
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(admit(&req).into_review())
}

/// Process a single Pod admission request
///
/// This handler:
/// 1. Decodes the Pod from the request object
/// 2. Runs the SGX mutation engine
/// 3. Diffs the mutated Pod against the decoded one into a JSON patch
/// 4. Attaches the engine's warnings to the response
///
/// Failures deny the request with the matching HTTP status code; with
/// `failurePolicy: Ignore` the API server then admits the Pod unmodified.
pub fn admit(request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let uid = request.uid.clone();

    let Some(obj) = &request.object else {
        debug!(uid = %uid, operation = ?request.operation, "No object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    let pod = match decode_pod(obj) {
        Ok(pod) => pod,
        Err(e) => {
            warn!(uid = %uid, error = %e, "Failed to decode Pod");
            return errored(request, StatusCode::BAD_REQUEST, e);
        }
    };
    let pod_name = pod
        .metadata
        .name
        .clone()
        .or_else(|| pod.metadata.generate_name.clone())
        .unwrap_or_default();
    let namespace = request.namespace.clone().unwrap_or_default();

    let original = match encode_pod(&pod) {
        Ok(value) => value,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to encode decoded Pod");
            return errored(request, e.status_code(), e);
        }
    };

    let mutation = match mutate_pod(pod) {
        Ok(mutation) => mutation,
        Err(e) => {
            warn!(
                uid = %uid,
                pod = %pod_name,
                namespace = %namespace,
                error = %e,
                "Rejecting Pod with malformed SGX resources"
            );
            return errored(request, e.status_code(), e);
        }
    };

    for warning in &mutation.warnings {
        warn!(uid = %uid, pod = %pod_name, namespace = %namespace, warning = %warning, "SGX resource misuse");
    }

    let mutated = match encode_pod(&mutation.pod) {
        Ok(value) => value,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to encode mutated Pod");
            return errored(request, e.status_code(), e);
        }
    };

    let patch = json_patch::diff(&original, &mutated);
    let patch_ops = patch.0.len();

    let mut response = AdmissionResponse::from(request);
    if patch_ops > 0 {
        response = match response.with_patch(patch) {
            Ok(response) => response,
            Err(e) => {
                error!(uid = %uid, error = %e, "Failed to serialize patch");
                return errored(request, StatusCode::INTERNAL_SERVER_ERROR, e);
            }
        };
    }
    if !mutation.warnings.is_empty() {
        response.warnings = Some(mutation.warnings);
    }

    if mutation.participants > 0 {
        info!(
            uid = %uid,
            pod = %pod_name,
            namespace = %namespace,
            mode = %mutation.mode,
            participants = mutation.participants,
            total_epc = mutation.total_epc,
            patch_ops,
            "Mutated SGX Pod"
        );
    } else {
        debug!(uid = %uid, pod = %pod_name, namespace = %namespace, "No EPC requested, allowing unchanged");
    }

    response
}

fn decode_pod(obj: &DynamicObject) -> Result<Pod, serde_json::Error> {
    serde_json::to_value(obj).and_then(serde_json::from_value)
}

fn encode_pod(pod: &Pod) -> crate::Result<Value> {
    Ok(serde_json::to_value(pod)?)
}

/// Deny the request, recording an HTTP status code in the result
fn errored(
    request: &AdmissionRequest<DynamicObject>,
    status: StatusCode,
    err: impl Display,
) -> AdmissionResponse {
    let mut response = AdmissionResponse::from(request).deny(err.to_string());
    response.result.code = status.as_u16();
    response
}
