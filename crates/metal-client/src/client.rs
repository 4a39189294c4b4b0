//! Kube-backed MetalClient
//!
//! The production implementation of the `MetalClient` trait. Server-side
//! apply uses the provider's field owner with forced ownership so repeated
//! applies stay idempotent; merge patches are plain RFC 7386 documents.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::Value;

use metal_api::{IPAddress, IPAddressClaim, Server, ServerClaim, FIELD_OWNER};

use crate::error::ClientError;
use crate::traits::MetalClient;

/// Store client backed by a `kube::Client`.
pub struct KubeMetalClient {
    client: Client,
}

impl KubeMetalClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn server_claims(&self, namespace: &str) -> Api<ServerClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn ip_claims(&self, namespace: &str) -> Api<IPAddressClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn ip_addresses(&self, namespace: &str) -> Api<IPAddress> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn servers(&self) -> Api<Server> {
        Api::all(self.client.clone())
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn apply_params() -> PatchParams {
        PatchParams::apply(FIELD_OWNER).force()
    }
}

fn map_kube_err(err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(response) if response.code == 404 => {
            ClientError::NotFound(response.message)
        }
        other => ClientError::Api(other.to_string()),
    }
}

fn object_namespace<K: ResourceExt>(object: &K) -> Result<String, ClientError> {
    object
        .namespace()
        .ok_or_else(|| ClientError::Api("object has no namespace".to_string()))
}

#[async_trait::async_trait]
impl MetalClient for KubeMetalClient {
    async fn get_server_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServerClaim, ClientError> {
        self.server_claims(namespace)
            .get(name)
            .await
            .map_err(map_kube_err)
    }

    async fn apply_server_claim(&self, claim: &ServerClaim) -> Result<ServerClaim, ClientError> {
        let namespace = object_namespace(claim)?;
        self.server_claims(&namespace)
            .patch(&claim.name_any(), &Self::apply_params(), &Patch::Apply(claim))
            .await
            .map_err(map_kube_err)
    }

    async fn merge_patch_server_claim(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<ServerClaim, ClientError> {
        self.server_claims(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(map_kube_err)
    }

    async fn delete_server_claim(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.server_claims(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(map_kube_err)
    }

    async fn list_server_claims(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ServerClaim>, ClientError> {
        let mut params = ListParams::default();
        if !labels.is_empty() {
            let selector = labels
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(",");
            params = params.labels(&selector);
        }
        let list = self
            .server_claims(namespace)
            .list(&params)
            .await
            .map_err(map_kube_err)?;
        Ok(list.items)
    }

    async fn get_ip_address_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<IPAddressClaim, ClientError> {
        self.ip_claims(namespace)
            .get(name)
            .await
            .map_err(map_kube_err)
    }

    async fn create_ip_address_claim(
        &self,
        claim: &IPAddressClaim,
    ) -> Result<IPAddressClaim, ClientError> {
        let namespace = object_namespace(claim)?;
        self.ip_claims(&namespace)
            .create(&PostParams::default(), claim)
            .await
            .map_err(map_kube_err)
    }

    async fn merge_patch_ip_address_claim(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<IPAddressClaim, ClientError> {
        self.ip_claims(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(map_kube_err)
    }

    async fn get_ip_address(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<IPAddress, ClientError> {
        self.ip_addresses(namespace)
            .get(name)
            .await
            .map_err(map_kube_err)
    }

    async fn get_server(&self, name: &str) -> Result<Server, ClientError> {
        self.servers().get(name).await.map_err(map_kube_err)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClientError> {
        self.secrets(namespace)
            .get(name)
            .await
            .map_err(map_kube_err)
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<Secret, ClientError> {
        let namespace = object_namespace(secret)?;
        // Plain k8s-openapi types serialize without apiVersion/kind, which
        // server-side apply requires.
        let mut object = serde_json::to_value(secret)?;
        object["apiVersion"] = Value::from("v1");
        object["kind"] = Value::from("Secret");
        self.secrets(&namespace)
            .patch(&secret.name_any(), &Self::apply_params(), &Patch::Apply(&object))
            .await
            .map_err(map_kube_err)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(map_kube_err)
    }
}
