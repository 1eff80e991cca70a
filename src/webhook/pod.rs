//! Pod Mutation Webhook
//!
//! Handles AdmissionReview requests for Pods. Anything that goes wrong after
//! the review itself has been decoded results in the Pod being admitted
//! without a patch.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
};
use tracing::{debug, error, info};

use crate::metrics::{ErrorKind, MutationAction};
use crate::mutation::PodDescriptor;

use super::WebhookState;

/// Kind of the only objects this webhook mutates
pub const POD_KIND: &str = "Pod";

/// Error type for webhook requests that cannot be answered with a review
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request body was empty
    #[error("empty body")]
    EmptyBody,

    /// The admission review request was invalid or malformed
    #[error("invalid admission review: {0}")]
    InvalidReview(String),
}

impl WebhookError {
    fn kind(&self) -> ErrorKind {
        match self {
            WebhookError::EmptyBody => ErrorKind::Read,
            WebhookError::InvalidReview(_) => ErrorKind::Decode,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": self.to_string()})),
        )
            .into_response()
    }
}

/// Handle mutating admission review for Pods
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    body: Bytes,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let start = Instant::now();
    let result = review(&state, &body).await;
    if let Err(e) = &result {
        error!(error = %e, "rejecting admission request");
        state.metrics.record_error(e.kind());
    }
    state.metrics.observe_request_duration(start.elapsed());
    result.map(Json)
}

/// Decode the review, run the mutation and wrap the response
async fn review(
    state: &WebhookState,
    body: &[u8],
) -> Result<AdmissionReview<DynamicObject>, WebhookError> {
    if body.is_empty() {
        return Err(WebhookError::EmptyBody);
    }

    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body)
        .map_err(|e| WebhookError::InvalidReview(format!("failed to decode admission review: {e}")))?;

    let request: AdmissionRequest<DynamicObject> = review
        .try_into()
        .map_err(|e| WebhookError::InvalidReview(format!("{e}")))?;

    Ok(mutate_pod(state, &request).await.into_review())
}

/// Process a single Pod admission request
async fn mutate_pod(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let uid = &request.uid;

    if request.kind.kind != POD_KIND {
        debug!(uid = %uid, kind = %request.kind.kind, "Not a Pod, allowing unchanged");
        return AdmissionResponse::from(request);
    }

    let Some(object) = &request.object else {
        debug!(uid = %uid, "No pod object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    let pod = match decode_pod(object) {
        Ok(pod) => pod,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to decode pod");
            state.metrics.record_error(ErrorKind::Decode);
            return AdmissionResponse::from(request).deny(format!("failed to decode pod: {e}"));
        }
    };

    let descriptor = PodDescriptor::from_pod(&pod, request.namespace.as_deref());
    let ops = state.engine.decide(&descriptor, state.lookup.as_ref()).await;

    if ops.is_empty() {
        info!(
            uid = %uid,
            namespace = %descriptor.namespace,
            name = %descriptor.name,
            reason = "no changes needed",
            "skipped mutation"
        );
        state
            .metrics
            .record_mutation(&descriptor.namespace, MutationAction::Skipped);
        return AdmissionResponse::from(request);
    }

    match AdmissionResponse::from(request).with_patch(json_patch::Patch(ops)) {
        Ok(response) => {
            info!(
                uid = %uid,
                namespace = %descriptor.namespace,
                name = %descriptor.name,
                "mutated pod"
            );
            state
                .metrics
                .record_mutation(&descriptor.namespace, MutationAction::Mutated);
            response
        }
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch, allowing unchanged");
            state.metrics.record_error(ErrorKind::Marshal);
            AdmissionResponse::from(request)
        }
    }
}

/// Convert the admission object into a typed Pod
fn decode_pod(object: &DynamicObject) -> Result<Pod, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(object)?)
}
