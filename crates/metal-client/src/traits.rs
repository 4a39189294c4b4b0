//! MetalClient trait for mocking
//!
//! Abstracts the store operations the provider performs so tests can run
//! against an in-memory implementation. The kube-backed client implements
//! this trait; `ClientProvider` hands out scoped access to whichever
//! implementation is current.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use serde_json::Value;

use metal_api::{IPAddress, IPAddressClaim, Server, ServerClaim};

use crate::error::ClientError;

/// Typed store operations against the metal cluster.
///
/// All methods take the target namespace explicitly; `Server` is
/// cluster-scoped. Merge patches are RFC 7386 documents.
#[async_trait::async_trait]
pub trait MetalClient: Send + Sync {
    // ServerClaim
    async fn get_server_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServerClaim, ClientError>;
    async fn apply_server_claim(&self, claim: &ServerClaim) -> Result<ServerClaim, ClientError>;
    async fn merge_patch_server_claim(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<ServerClaim, ClientError>;
    async fn delete_server_claim(&self, namespace: &str, name: &str) -> Result<(), ClientError>;
    async fn list_server_claims(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ServerClaim>, ClientError>;

    // IPAddressClaim
    async fn get_ip_address_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<IPAddressClaim, ClientError>;
    async fn create_ip_address_claim(
        &self,
        claim: &IPAddressClaim,
    ) -> Result<IPAddressClaim, ClientError>;
    async fn merge_patch_ip_address_claim(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<IPAddressClaim, ClientError>;

    // IPAddress
    async fn get_ip_address(&self, namespace: &str, name: &str)
        -> Result<IPAddress, ClientError>;

    // Server (cluster-scoped)
    async fn get_server(&self, name: &str) -> Result<Server, ClientError>;

    // Secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClientError>;
    async fn apply_secret(&self, secret: &Secret) -> Result<Secret, ClientError>;
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClientError>;
}
