//! InitializeMachine
//!
//! Powers a reserved machine on: requires the ServerClaim to be bound,
//! collects the allocated address metadata, renders the ignition with the
//! resolved node name as hostname, applies the ignition secret and only
//! then patches the claim to powered on with the secret attached.

use std::net::IpAddr;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use serde_json::{Map, Value};
use tracing::info;

use metal_api::{ServerClaim, ANNOTATION_KEY_LOOPBACK_ADDRESS};

use crate::codes::Status;
use crate::driver::{InitializeMachineRequest, InitializeMachineResponse, MetalDriver};
use crate::helpers::{
    check_provider_tag, decode_provider_spec, ignition_secret_name, provider_id, unpack_request,
};
use crate::ignition;
use crate::ip_claims::collect_address_metadata;
use crate::server_claim::power_on_server_claim;

/// Metadata read off the bound Server.
pub(crate) struct ServerMetadata {
    pub loopback_address: Option<IpAddr>,
}

impl MetalDriver {
    pub(crate) async fn initialize(
        &self,
        req: &InitializeMachineRequest,
    ) -> Result<InitializeMachineResponse, Status> {
        let (machine, machine_class, secret) = unpack_request(
            req.machine.as_ref(),
            req.machine_class.as_ref(),
            req.secret.as_ref(),
            "received empty InitializeMachineRequest",
        )?;
        check_provider_tag(machine_class)?;

        info!("machine initialization request received for {:?}", machine.name);

        let spec = decode_provider_spec(machine_class, secret)?;
        let namespace = &self.metal_namespace;

        let claim = self
            .client_provider
            .with_client(|client| async move {
                client.get_server_claim(namespace, &machine.name).await
            })
            .await
            .map_err(|err| Status::internal(format!("failed to get ServerClaim: {err}")))?;

        if claim.bound_server_name().is_none() {
            return Err(Status::unavailable(format!(
                "ServerClaim {namespace}/{} still not bound",
                machine.name
            )));
        }

        let addresses =
            collect_address_metadata(&self.client_provider, namespace, &machine.name, &spec)
                .await?;
        let node_name = self.resolve_node_name(&claim).await?;
        let server_metadata = self.extract_server_metadata(&claim).await?;

        let mut metadata = spec.metadata.clone();
        if let Some(loopback) = server_metadata.loopback_address {
            merge_metadata(
                &mut metadata,
                Map::from_iter([(
                    "loopbackAddress".to_string(),
                    Value::from(loopback.to_string()),
                )]),
            );
        }
        merge_metadata(&mut metadata, addresses);

        let user_data = secret
            .data
            .as_ref()
            .and_then(|data| data.get("userData"))
            .map(|value| String::from_utf8_lossy(&value.0).into_owned())
            .ok_or_else(|| {
                Status::internal(format!(
                    "failed to find user-data in machine secret for {:?}",
                    machine.name
                ))
            })?;

        let content = ignition::render(&ignition::Config {
            hostname: &node_name,
            user_data: &user_data,
            metadata: &metadata,
            ignition: &spec.ignition,
            dns_servers: &spec.dns_servers,
            ignition_override: spec.ignition_override,
        })
        .map_err(|err| {
            Status::internal(format!(
                "failed to render ignition for machine {:?}: {err}",
                machine.name
            ))
        })?;

        let secret_name = ignition_secret_name(&self.client_provider, namespace, &machine.name).await?;
        let ignition_secret =
            build_ignition_secret(&secret_name, namespace, spec.ignition_key(), content);
        self.client_provider
            .with_client(|client| {
                let ignition_secret = ignition_secret.clone();
                async move { client.apply_secret(&ignition_secret).await }
            })
            .await
            .map_err(|err| Status::internal(format!("error applying ignition secret: {err}")))?;

        power_on_server_claim(&self.client_provider, namespace, &machine.name, &secret_name)
            .await?;
        info!("ServerClaim {namespace}/{} powered on", machine.name);

        Ok(InitializeMachineResponse {
            provider_id: provider_id(namespace, &machine.name),
            node_name,
        })
    }

    async fn extract_server_metadata(
        &self,
        claim: &ServerClaim,
    ) -> Result<ServerMetadata, Status> {
        let Some(server_name) = claim.bound_server_name() else {
            return Err(Status::internal(format!(
                "server claim {:?} does not have a server reference",
                claim.name_any()
            )));
        };

        let server = self
            .client_provider
            .with_client(|client| async move { client.get_server(server_name).await })
            .await
            .map_err(|err| {
                Status::internal(format!("failed to get Server {server_name:?}: {err}"))
            })?;

        let loopback_address = server
            .annotations()
            .get(ANNOTATION_KEY_LOOPBACK_ADDRESS)
            .and_then(|raw| raw.parse::<IpAddr>().ok());

        Ok(ServerMetadata { loopback_address })
    }
}

fn build_ignition_secret(
    name: &str,
    namespace: &str,
    ignition_key: &str,
    content: Vec<u8>,
) -> Secret {
    let mut secret = Secret::default();
    secret.metadata.name = Some(name.to_string());
    secret.metadata.namespace = Some(namespace.to_string());
    secret.data = Some(std::collections::BTreeMap::from([(
        ignition_key.to_string(),
        ByteString(content),
    )]));
    secret
}

/// Merges `overlay` into `base` with later keys winning; nested maps are
/// merged key-by-key instead of being replaced wholesale.
pub(crate) fn merge_metadata(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match value {
            Value::Object(incoming) if base.get(&key).map_or(false, Value::is_object) => {
                let existing = base.get_mut(&key).and_then(Value::as_object_mut).unwrap();
                for (nested_key, nested_value) in incoming {
                    existing.insert(nested_key, nested_value);
                }
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}
