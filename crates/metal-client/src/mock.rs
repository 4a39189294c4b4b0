//! Mock MetalClient for unit testing
//!
//! In-memory implementation of `MetalClient` so the driver can be exercised
//! without a cluster. Objects live in maps behind mutexes; merge patches
//! follow RFC 7386 (including `null` deletion), applies approximate
//! server-side apply by replacing the spec and labels while preserving
//! metadata the store owns (uid, annotations, owner references).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use metal_api::{IPAddress, IPAddressClaim, Server, ServerClaim};

use crate::error::ClientError;
use crate::traits::MetalClient;

type NamespacedKey = (String, String);

/// In-memory store client for tests.
#[derive(Default)]
pub struct MockMetalClient {
    server_claims: Mutex<HashMap<NamespacedKey, ServerClaim>>,
    ip_claims: Mutex<HashMap<NamespacedKey, IPAddressClaim>>,
    ip_addresses: Mutex<HashMap<NamespacedKey, IPAddress>>,
    servers: Mutex<HashMap<String, Server>>,
    secrets: Mutex<HashMap<NamespacedKey, Secret>>,
    // When set, deletes succeed but ServerClaims stay visible, as if blocked
    // by a finalizer.
    retain_server_claims: AtomicBool,
    next_uid: AtomicU64,
}

impl MockMetalClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes ServerClaim deletion leave the object in the store.
    pub fn retain_server_claims_on_delete(&self, retain: bool) {
        self.retain_server_claims.store(retain, Ordering::SeqCst);
    }

    /// Seeds a Server (for test setup).
    pub fn add_server(&self, server: Server) {
        self.servers
            .lock()
            .unwrap()
            .insert(server.name_any(), server);
    }

    /// Seeds a Secret (for test setup).
    pub fn add_secret(&self, secret: Secret) {
        let key = namespaced_key(&secret).expect("secret fixture needs namespace and name");
        self.secrets.lock().unwrap().insert(key, secret);
    }

    /// Seeds an IPAddress (for test setup).
    pub fn add_ip_address(&self, address: IPAddress) {
        let key = namespaced_key(&address).expect("address fixture needs namespace and name");
        self.ip_addresses.lock().unwrap().insert(key, address);
    }

    /// Seeds an IPAddressClaim (for test setup).
    pub fn add_ip_address_claim(&self, claim: IPAddressClaim) {
        let key = namespaced_key(&claim).expect("claim fixture needs namespace and name");
        self.ip_claims.lock().unwrap().insert(key, claim);
    }

    /// Binds a ServerClaim to a Server, as the external claim operator would.
    pub fn bind_server_claim(&self, namespace: &str, name: &str, server_name: &str) {
        let mut claims = self.server_claims.lock().unwrap();
        let claim = claims
            .get_mut(&(namespace.to_string(), name.to_string()))
            .expect("server claim to bind must exist");
        claim.spec.server_ref = Some(k8s_openapi::api::core::v1::LocalObjectReference {
            name: server_name.to_string(),
        });
    }

    /// Binds an IPAddressClaim to an IPAddress, as the IPAM operator would.
    pub fn bind_ip_address_claim(&self, namespace: &str, name: &str, address_name: &str) {
        let mut claims = self.ip_claims.lock().unwrap();
        let claim = claims
            .get_mut(&(namespace.to_string(), name.to_string()))
            .expect("ip address claim to bind must exist");
        claim.status = Some(metal_api::IPAddressClaimStatus {
            address_ref: Some(k8s_openapi::api::core::v1::LocalObjectReference {
                name: address_name.to_string(),
            }),
        });
    }

    /// Current ServerClaim, if any (for assertions).
    pub fn server_claim(&self, namespace: &str, name: &str) -> Option<ServerClaim> {
        self.server_claims
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current IPAddressClaim, if any (for assertions).
    pub fn ip_address_claim(&self, namespace: &str, name: &str) -> Option<IPAddressClaim> {
        self.ip_claims
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current Secret, if any (for assertions).
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn allocate_uid(&self) -> String {
        let id = self.next_uid.fetch_add(1, Ordering::SeqCst);
        format!("mock-uid-{id}")
    }
}

fn namespaced_key<K: ResourceExt>(object: &K) -> Result<NamespacedKey, ClientError> {
    let namespace = object
        .namespace()
        .ok_or_else(|| ClientError::Api("object has no namespace".to_string()))?;
    Ok((namespace, object.name_any()))
}

fn not_found(kind: &str, namespace: &str, name: &str) -> ClientError {
    ClientError::NotFound(format!("{kind} {namespace}/{name} not found"))
}

/// Applies an RFC 7386 merge patch to a serializable object.
fn merge_patch_object<T>(object: &T, patch: &Value) -> Result<T, ClientError>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(object)?;
    json_merge_patch(&mut value, patch);
    Ok(serde_json::from_value(value)?)
}

fn json_merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = Value::Object(Default::default());
            }
            let map = target.as_object_mut().unwrap();
            for (key, value) in entries {
                if value.is_null() {
                    map.remove(key);
                } else {
                    json_merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        other => *target = other.clone(),
    }
}

#[async_trait::async_trait]
impl MetalClient for MockMetalClient {
    async fn get_server_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServerClaim, ClientError> {
        self.server_claim(namespace, name)
            .ok_or_else(|| not_found("ServerClaim", namespace, name))
    }

    async fn apply_server_claim(&self, claim: &ServerClaim) -> Result<ServerClaim, ClientError> {
        let key = namespaced_key(claim)?;
        let mut claims = self.server_claims.lock().unwrap();
        match claims.get_mut(&key) {
            Some(existing) => {
                // The claim operator owns serverRef; an apply that does not
                // carry the field leaves the binding in place.
                let mut spec = claim.spec.clone();
                if spec.server_ref.is_none() {
                    spec.server_ref = existing.spec.server_ref.clone();
                }
                existing.spec = spec;
                existing.metadata.labels = claim.metadata.labels.clone();
                Ok(existing.clone())
            }
            None => {
                let mut stored = claim.clone();
                stored.metadata.uid = Some(self.allocate_uid());
                claims.insert(key, stored.clone());
                Ok(stored)
            }
        }
    }

    async fn merge_patch_server_claim(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<ServerClaim, ClientError> {
        let mut claims = self.server_claims.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let existing = claims
            .get(&key)
            .ok_or_else(|| not_found("ServerClaim", namespace, name))?;
        let patched = merge_patch_object(existing, patch)?;
        claims.insert(key, patched.clone());
        Ok(patched)
    }

    async fn delete_server_claim(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let mut claims = self.server_claims.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        if !claims.contains_key(&key) {
            return Err(not_found("ServerClaim", namespace, name));
        }
        if !self.retain_server_claims.load(Ordering::SeqCst) {
            claims.remove(&key);
        }
        Ok(())
    }

    async fn list_server_claims(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ServerClaim>, ClientError> {
        let claims = self.server_claims.lock().unwrap();
        let mut items: Vec<ServerClaim> = claims
            .iter()
            .filter(|((claim_namespace, _), _)| claim_namespace == namespace)
            .map(|(_, claim)| claim)
            .filter(|claim| {
                let claim_labels = claim.labels();
                labels
                    .iter()
                    .all(|(key, value)| claim_labels.get(key) == Some(value))
            })
            .cloned()
            .collect();
        items.sort_by_key(|claim| claim.name_any());
        Ok(items)
    }

    async fn get_ip_address_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<IPAddressClaim, ClientError> {
        self.ip_address_claim(namespace, name)
            .ok_or_else(|| not_found("IPAddressClaim", namespace, name))
    }

    async fn create_ip_address_claim(
        &self,
        claim: &IPAddressClaim,
    ) -> Result<IPAddressClaim, ClientError> {
        let key = namespaced_key(claim)?;
        let mut claims = self.ip_claims.lock().unwrap();
        if claims.contains_key(&key) {
            return Err(ClientError::Api(format!(
                "IPAddressClaim {}/{} already exists",
                key.0, key.1
            )));
        }
        let mut stored = claim.clone();
        stored.metadata.uid = Some(self.allocate_uid());
        claims.insert(key, stored.clone());
        Ok(stored)
    }

    async fn merge_patch_ip_address_claim(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<IPAddressClaim, ClientError> {
        let mut claims = self.ip_claims.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let existing = claims
            .get(&key)
            .ok_or_else(|| not_found("IPAddressClaim", namespace, name))?;
        let patched = merge_patch_object(existing, patch)?;
        claims.insert(key, patched.clone());
        Ok(patched)
    }

    async fn get_ip_address(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<IPAddress, ClientError> {
        self.ip_addresses
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("IPAddress", namespace, name))
    }

    async fn get_server(&self, name: &str) -> Result<Server, ClientError> {
        self.servers
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("Server {name} not found")))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClientError> {
        self.secret(namespace, name)
            .ok_or_else(|| not_found("Secret", namespace, name))
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<Secret, ClientError> {
        let key = namespaced_key(secret)?;
        let mut secrets = self.secrets.lock().unwrap();
        match secrets.get_mut(&key) {
            Some(existing) => {
                existing.data = secret.data.clone();
                Ok(existing.clone())
            }
            None => {
                let mut stored = secret.clone();
                stored.metadata.uid = Some(self.allocate_uid());
                secrets.insert(key, stored.clone());
                Ok(stored)
            }
        }
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let mut secrets = self.secrets.lock().unwrap();
        secrets
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("Secret", namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metal_api::{Power, ServerClaimSpec, ANNOTATION_KEY_MACHINE_RECREATE};
    use serde_json::json;

    fn claim(namespace: &str, name: &str) -> ServerClaim {
        let mut claim = ServerClaim::new(name, ServerClaimSpec::default());
        claim.metadata.namespace = Some(namespace.to_string());
        claim
    }

    #[tokio::test]
    async fn test_apply_assigns_uid_and_is_idempotent() {
        let client = MockMetalClient::new();
        let first = client.apply_server_claim(&claim("ns", "m0")).await.unwrap();
        assert!(first.metadata.uid.is_some());

        let second = client.apply_server_claim(&claim("ns", "m0")).await.unwrap();
        assert_eq!(first.metadata.uid, second.metadata.uid);
    }

    #[tokio::test]
    async fn test_merge_patch_sets_and_clears_annotation() {
        let client = MockMetalClient::new();
        client.apply_server_claim(&claim("ns", "m0")).await.unwrap();

        let patched = client
            .merge_patch_server_claim(
                "ns",
                "m0",
                &json!({"metadata": {"annotations": {ANNOTATION_KEY_MACHINE_RECREATE: "true"}}}),
            )
            .await
            .unwrap();
        assert_eq!(
            patched.annotations().get(ANNOTATION_KEY_MACHINE_RECREATE),
            Some(&"true".to_string())
        );

        let cleared = client
            .merge_patch_server_claim(
                "ns",
                "m0",
                &json!({"metadata": {"annotations": {ANNOTATION_KEY_MACHINE_RECREATE: null}}}),
            )
            .await
            .unwrap();
        assert!(!cleared
            .annotations()
            .contains_key(ANNOTATION_KEY_MACHINE_RECREATE));
    }

    #[tokio::test]
    async fn test_merge_patch_updates_spec_power() {
        let client = MockMetalClient::new();
        client.apply_server_claim(&claim("ns", "m0")).await.unwrap();

        let patched = client
            .merge_patch_server_claim("ns", "m0", &json!({"spec": {"power": "On"}}))
            .await
            .unwrap();
        assert_eq!(patched.spec.power, Power::On);
    }

    #[tokio::test]
    async fn test_retained_delete_keeps_claim_visible() {
        let client = MockMetalClient::new();
        client.apply_server_claim(&claim("ns", "m0")).await.unwrap();
        client.retain_server_claims_on_delete(true);

        client.delete_server_claim("ns", "m0").await.unwrap();
        assert!(client.server_claim("ns", "m0").is_some());
    }

    #[tokio::test]
    async fn test_list_filters_by_labels() {
        let client = MockMetalClient::new();
        let mut labelled = claim("ns", "m0");
        labelled.metadata.labels =
            Some(BTreeMap::from([("shoot".to_string(), "s".to_string())]));
        client.apply_server_claim(&labelled).await.unwrap();
        client.apply_server_claim(&claim("ns", "other")).await.unwrap();

        let filter = BTreeMap::from([("shoot".to_string(), "s".to_string())]);
        let items = client.list_server_claims("ns", &filter).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name_any(), "m0");
    }
}
