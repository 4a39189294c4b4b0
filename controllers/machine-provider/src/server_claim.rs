//! ServerClaim coordination
//!
//! Building and applying the claim, waiting for the external operator to
//! bind a server, the recreate-annotation patches and the power-on patch
//! that attaches the rendered ignition. A claim is created powered off and
//! only flipped on during initialization, in a separate update.

use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info};

use metal_api::{
    Power, ProviderSpec, ServerClaim, ServerClaimSpec, ANNOTATION_KEY_MACHINE_RECREATE,
};
use metal_client::ClientProvider;

use crate::codes::Status;
use crate::helpers::poll_until;

pub(crate) const BINDING_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub(crate) const BINDING_POLL_BUDGET: Duration = Duration::from_secs(3);

/// Builds the claim for a machine: powered off, selecting servers by the
/// provider spec's server labels.
pub(crate) fn build_server_claim(
    machine_name: &str,
    namespace: &str,
    spec: &ProviderSpec,
) -> ServerClaim {
    let mut claim = ServerClaim::new(
        machine_name,
        ServerClaimSpec {
            power: Power::Off,
            server_ref: None,
            server_selector: Some(LabelSelector {
                match_labels: Some(spec.server_labels.clone()),
                ..Default::default()
            }),
            ignition_secret_ref: None,
            image: spec.image.clone(),
        },
    );
    claim.metadata.namespace = Some(namespace.to_string());
    if !spec.labels.is_empty() {
        claim.metadata.labels = Some(spec.labels.clone());
    }
    claim
}

/// Server-side applies the claim.
pub(crate) async fn apply_server_claim(
    provider: &ClientProvider,
    claim: &ServerClaim,
) -> Result<ServerClaim, Status> {
    provider
        .with_client(|client| async move { client.apply_server_claim(claim).await })
        .await
        .map_err(|err| Status::internal(format!("error applying server claim: {err}")))
}

/// Waits for the claim operator to bind a server, within the create-time
/// budget. Returns the bound claim, or `None` when the budget ran out.
pub(crate) async fn wait_for_server_binding(
    provider: &ClientProvider,
    namespace: &str,
    name: &str,
) -> Result<Option<ServerClaim>, Status> {
    poll_until(BINDING_POLL_INTERVAL, BINDING_POLL_BUDGET, || async move {
        let claim = provider
            .with_client(|client| async move { client.get_server_claim(namespace, name).await })
            .await?;
        if claim.bound_server_name().is_some() {
            Ok(Some(claim))
        } else {
            Ok(None)
        }
    })
    .await
    .map_err(|err: metal_client::ClientError| {
        Status::internal(format!(
            "error waiting for server claim to claim a server: {err}"
        ))
    })
}

pub(crate) fn has_recreate_annotation(claim: &ServerClaim) -> bool {
    claim
        .annotations()
        .get(ANNOTATION_KEY_MACHINE_RECREATE)
        .map(String::as_str)
        == Some("true")
}

/// Marks the claim so the fleet manager re-runs the create flow.
pub(crate) async fn set_recreate_annotation(
    provider: &ClientProvider,
    namespace: &str,
    name: &str,
) -> Result<(), Status> {
    info!("marking server claim {namespace}/{name} for recreation");
    provider
        .with_client(|client| async move {
            let patch =
                json!({"metadata": {"annotations": {ANNOTATION_KEY_MACHINE_RECREATE: "true"}}});
            client
                .merge_patch_server_claim(namespace, name, &patch)
                .await
        })
        .await
        .map(|_| ())
        .map_err(|err| {
            Status::internal(format!(
                "failed to mark server claim {namespace}/{name} for recreation: {err}"
            ))
        })
}

/// Removes the recreate marker after a binding was observed.
pub(crate) async fn clear_recreate_annotation(
    provider: &ClientProvider,
    namespace: &str,
    name: &str,
) -> Result<(), Status> {
    debug!("clearing recreate annotation on server claim {namespace}/{name}");
    provider
        .with_client(|client| async move {
            let patch =
                json!({"metadata": {"annotations": {ANNOTATION_KEY_MACHINE_RECREATE: null}}});
            client
                .merge_patch_server_claim(namespace, name, &patch)
                .await
        })
        .await
        .map(|_| ())
        .map_err(|err| {
            Status::internal(format!(
                "failed to clear recreate annotation on server claim {namespace}/{name}: {err}"
            ))
        })
}

/// Flips the claim to powered on with the ignition secret attached. Never
/// part of the same update that created the claim.
pub(crate) async fn power_on_server_claim(
    provider: &ClientProvider,
    namespace: &str,
    name: &str,
    ignition_secret_name: &str,
) -> Result<(), Status> {
    provider
        .with_client(|client| async move {
            let patch = json!({"spec": {
                "power": "On",
                "ignitionSecretRef": {"name": ignition_secret_name},
            }});
            client
                .merge_patch_server_claim(namespace, name, &patch)
                .await
        })
        .await
        .map(|_| ())
        .map_err(|err| {
            Status::internal(format!(
                "failed to power on server claim {namespace}/{name}: {err}"
            ))
        })
}
