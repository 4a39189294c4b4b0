//! Node-name policy
//!
//! Selects which identifier becomes the Kubernetes node name: the
//! ServerClaim's own name, the bound Server's name, or the name of the
//! Server's BMC. The latter two require the claim to be bound.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use metal_api::ServerClaim;
use metal_client::{ClientError, MetalClient};

use crate::codes::Status;
use crate::driver::MetalDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeNamePolicy {
    ServerClaimName,
    ServerName,
    BmcName,
}

impl NodeNamePolicy {
    /// Whether resolving a node name under this policy requires the claim
    /// to be bound to a server.
    pub fn requires_server_binding(self) -> bool {
        !matches!(self, NodeNamePolicy::ServerClaimName)
    }
}

impl fmt::Display for NodeNamePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeNamePolicy::ServerClaimName => "ServerClaimName",
            NodeNamePolicy::ServerName => "ServerName",
            NodeNamePolicy::BmcName => "BMCName",
        };
        f.write_str(name)
    }
}

impl FromStr for NodeNamePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ServerClaimName" => Ok(NodeNamePolicy::ServerClaimName),
            "ServerName" => Ok(NodeNamePolicy::ServerName),
            "BMCName" => Ok(NodeNamePolicy::BmcName),
            other => Err(format!(
                "invalid node name policy {other:?} (must be \"ServerClaimName\", \"ServerName\" or \"BMCName\")"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeNameError {
    #[error("server claim does not have a server ref")]
    ClaimNotBound,
    #[error("server {0:?} does not have a BMC configured")]
    NoBmc(String),
    #[error("failed to get server {name:?}: {source}")]
    Server {
        name: String,
        #[source]
        source: ClientError,
    },
}

/// Resolves the node name for a claim under the given policy. Callers hold
/// scoped client access for the duration of the resolution.
pub async fn resolve_node_name(
    policy: NodeNamePolicy,
    claim: &ServerClaim,
    client: &dyn MetalClient,
) -> Result<String, NodeNameError> {
    use kube::ResourceExt;

    match policy {
        NodeNamePolicy::ServerClaimName => Ok(claim.name_any()),
        NodeNamePolicy::ServerName => claim
            .bound_server_name()
            .map(str::to_string)
            .ok_or(NodeNameError::ClaimNotBound),
        NodeNamePolicy::BmcName => {
            let server_name = claim
                .bound_server_name()
                .ok_or(NodeNameError::ClaimNotBound)?;
            let server =
                client
                    .get_server(server_name)
                    .await
                    .map_err(|source| NodeNameError::Server {
                        name: server_name.to_string(),
                        source,
                    })?;
            server
                .spec
                .bmc_ref
                .as_ref()
                .map(|reference| reference.name.clone())
                .filter(|name| !name.is_empty())
                .ok_or_else(|| NodeNameError::NoBmc(server_name.to_string()))
        }
    }
}

impl MetalDriver {
    /// Resolves the node name within one scoped client access.
    pub(crate) async fn resolve_node_name(&self, claim: &ServerClaim) -> Result<String, Status> {
        let policy = self.node_name_policy;
        self.client_provider
            .with_client(|client| async move { resolve_node_name(policy, claim, client.as_ref()).await })
            .await
            .map_err(|err| Status::internal(format!("failed to get node name: {err}")))
    }
}
