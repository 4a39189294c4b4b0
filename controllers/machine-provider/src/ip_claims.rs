//! IPAddressClaim coordination
//!
//! Upserts one claim per IPAM entry of the provider spec, runs the
//! good-faith readiness poll for freshly created claims, collects the
//! address metadata during initialization, and transfers ownership to the
//! ServerClaim once it is observable. Claims are created before their
//! owner, so the owner reference is patched in afterwards.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::TypedLocalObjectReference;
use kube::{Resource, ResourceExt};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use metal_api::{
    IPAddressClaim, IPAddressClaimSpec, IPAMObjectReference, ProviderSpec, ServerClaim,
    LABEL_KEY_SERVER_CLAIM_NAME, LABEL_KEY_SERVER_CLAIM_NAMESPACE,
};
use metal_client::ClientProvider;

use crate::codes::Status;
use crate::helpers::{ip_address_claim_name, poll_until};

pub(crate) const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub(crate) const READINESS_POLL_BUDGET: Duration = Duration::from_millis(340);

/// Upserts an IPAddressClaim per IPAM entry. Existing claims are adopted in
/// place when their server-claim labels match; fresh claims get the labels
/// and pool reference from the entry, followed by a short readiness poll
/// whose miss is not an error (the fleet manager reinvokes).
pub(crate) async fn get_or_create_ip_address_claims(
    provider: &ClientProvider,
    namespace: &str,
    machine_name: &str,
    spec: &ProviderSpec,
) -> Result<Vec<IPAddressClaim>, Status> {
    let mut claims = Vec::with_capacity(spec.ipam_config.len());

    for entry in &spec.ipam_config {
        let claim_name = ip_address_claim_name(machine_name, &entry.metadata_key);
        let existing = provider
            .with_client(|client| {
                let claim_name = claim_name.clone();
                async move { client.get_ip_address_claim(namespace, &claim_name).await }
            })
            .await;

        match existing {
            Ok(claim) => {
                debug!("IPAddressClaim {namespace}/{claim_name} found, adopting it");
                check_adopted_claim_labels(&claim, namespace, machine_name)?;
                claims.push(claim);
            }
            Err(err) if err.is_not_found() => {
                let Some(ipam_ref) = &entry.ipam_ref else {
                    return Err(Status::internal(format!(
                        "ipamRef of ipamConfig {:?} is not set",
                        entry.metadata_key
                    )));
                };

                info!("creating IPAddressClaim {namespace}/{claim_name}");
                let claim = build_ip_address_claim(&claim_name, namespace, machine_name, ipam_ref);
                let created = provider
                    .with_client(|client| {
                        let claim = claim.clone();
                        async move { client.create_ip_address_claim(&claim).await }
                    })
                    .await
                    .map_err(|err| {
                        Status::internal(format!(
                            "error creating IPAddressClaim {namespace}/{claim_name}: {err}"
                        ))
                    })?;

                // Good-faith wait; a miss falls through and the next
                // invocation picks the claim up once IPAM bound it.
                let bound = wait_for_claim_binding(provider, namespace, &claim_name).await?;
                claims.push(bound.unwrap_or(created));
            }
            Err(err) => {
                return Err(Status::internal(format!(
                    "failed to get IPAddressClaim {namespace}/{claim_name}: {err}"
                )));
            }
        }
    }

    Ok(claims)
}

fn check_adopted_claim_labels(
    claim: &IPAddressClaim,
    namespace: &str,
    machine_name: &str,
) -> Result<(), Status> {
    let labels = claim.labels();
    let claim_name = claim.name_any();
    match (
        labels.get(LABEL_KEY_SERVER_CLAIM_NAME),
        labels.get(LABEL_KEY_SERVER_CLAIM_NAMESPACE),
    ) {
        (Some(name), Some(label_namespace))
            if name == machine_name && label_namespace == namespace =>
        {
            Ok(())
        }
        (Some(name), Some(label_namespace)) => Err(Status::internal(format!(
            "IPAddressClaim {namespace}/{claim_name} server claim labels don't match. \
             Expected: name: {machine_name:?}, namespace: {namespace:?}. \
             Actual: name: {name:?}, namespace: {label_namespace:?}"
        ))),
        _ => Err(Status::internal(format!(
            "IPAddressClaim {namespace}/{claim_name} has no server claim labels"
        ))),
    }
}

fn build_ip_address_claim(
    claim_name: &str,
    namespace: &str,
    machine_name: &str,
    ipam_ref: &IPAMObjectReference,
) -> IPAddressClaim {
    let mut claim = IPAddressClaim::new(
        claim_name,
        IPAddressClaimSpec {
            pool_ref: TypedLocalObjectReference {
                api_group: Some(ipam_ref.api_group.clone()),
                kind: ipam_ref.kind.clone(),
                name: ipam_ref.name.clone(),
            },
        },
    );
    claim.metadata.namespace = Some(namespace.to_string());
    claim.metadata.labels = Some(BTreeMap::from([
        (
            LABEL_KEY_SERVER_CLAIM_NAME.to_string(),
            machine_name.to_string(),
        ),
        (
            LABEL_KEY_SERVER_CLAIM_NAMESPACE.to_string(),
            namespace.to_string(),
        ),
    ]));
    claim
}

async fn wait_for_claim_binding(
    provider: &ClientProvider,
    namespace: &str,
    claim_name: &str,
) -> Result<Option<IPAddressClaim>, Status> {
    poll_until(READINESS_POLL_INTERVAL, READINESS_POLL_BUDGET, || {
        async move {
            let claim = match provider
                .with_client(|client| async move {
                    client.get_ip_address_claim(namespace, claim_name).await
                })
                .await
            {
                Ok(claim) => claim,
                Err(err) if err.is_not_found() => return Ok(None),
                Err(err) => return Err(err),
            };
            if claim.bound_address_name().is_some() {
                Ok(Some(claim))
            } else {
                Ok(None)
            }
        }
    })
    .await
    .map_err(|err| {
        Status::internal(format!(
            "failed to wait for IPAddressClaim readiness: {err}"
        ))
    })
}

/// Collects `{ip, prefix, gateway}` metadata for every IPAM entry. A claim
/// without a bound address yields `Unavailable` so the fleet manager
/// retries shortly.
pub(crate) async fn collect_address_metadata(
    provider: &ClientProvider,
    namespace: &str,
    machine_name: &str,
    spec: &ProviderSpec,
) -> Result<Map<String, Value>, Status> {
    let mut metadata = Map::new();

    for entry in &spec.ipam_config {
        let claim_name = ip_address_claim_name(machine_name, &entry.metadata_key);
        let claim = provider
            .with_client(|client| {
                let claim_name = claim_name.clone();
                async move { client.get_ip_address_claim(namespace, &claim_name).await }
            })
            .await
            .map_err(|err| {
                Status::internal(format!(
                    "failed to get IPAddressClaim {namespace}/{claim_name}: {err}"
                ))
            })?;

        let Some(address_name) = claim.bound_address_name() else {
            return Err(Status::unavailable(format!(
                "IPAddressClaim {namespace}/{claim_name} not bound"
            )));
        };

        let address = provider
            .with_client(|client| async move {
                client.get_ip_address(namespace, address_name).await
            })
            .await
            .map_err(|err| {
                Status::internal(format!(
                    "failed to get IPAddress {namespace}/{address_name}: {err}"
                ))
            })?;

        debug!(
            "IP address metadata found for {namespace}/{claim_name}: {}/{} gw {}",
            address.spec.address, address.spec.prefix, address.spec.gateway
        );
        metadata.insert(
            entry.metadata_key.clone(),
            json!({
                "ip": address.spec.address,
                "prefix": address.spec.prefix,
                "gateway": address.spec.gateway,
            }),
        );
    }

    Ok(metadata)
}

/// Sets the owner reference of every claim to the ServerClaim. The claim is
/// poll-fetched first to guarantee cache visibility of the fresh apply;
/// returns the observed ServerClaim.
pub(crate) async fn transfer_claim_ownership(
    provider: &ClientProvider,
    namespace: &str,
    machine_name: &str,
    claims: &[IPAddressClaim],
) -> Result<ServerClaim, Status> {
    let server_claim = poll_until(READINESS_POLL_INTERVAL, READINESS_POLL_BUDGET, || {
        async move {
            provider
                .with_client(|client| async move {
                    client.get_server_claim(namespace, machine_name).await
                })
                .await
                .map(Some)
        }
    })
    .await
    .map_err(|err| Status::internal(format!("failed to get server claim: {err}")))?
    .ok_or_else(|| {
        Status::internal(format!(
            "server claim {namespace}/{machine_name} is not visible yet"
        ))
    })?;

    let owner_reference = json!({
        "apiVersion": ServerClaim::api_version(&()),
        "kind": "ServerClaim",
        "name": server_claim.name_any(),
        "uid": server_claim.metadata.uid.clone().unwrap_or_default(),
    });
    let patch = json!({"metadata": {"ownerReferences": [owner_reference]}});

    for claim in claims {
        let claim_name = claim.name_any();
        provider
            .with_client(|client| {
                let claim_name = claim_name.clone();
                let patch = patch.clone();
                async move {
                    client
                        .merge_patch_ip_address_claim(namespace, &claim_name, &patch)
                        .await
                }
            })
            .await
            .map_err(|err| {
                Status::internal(format!(
                    "failed to patch IPAddressClaim {namespace}/{claim_name}: {err}"
                ))
            })?;
        debug!(
            "owner reference of IPAddressClaim {namespace}/{claim_name} set to ServerClaim {namespace}/{machine_name}"
        );
    }

    Ok(server_claim)
}
