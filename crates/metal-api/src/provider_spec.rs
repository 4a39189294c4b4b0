//! ProviderSpec
//!
//! Provider-specific machine configuration, JSON-encoded inside the machine
//! class. Unknown fields are tolerated so older machine classes keep
//! decoding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::constants::DEFAULT_IGNITION_KEY;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSpec {
    /// Reference of the operating system image used to boot the machine.
    pub image: String,

    /// Raw ignition fragment applied on first boot. Merged into the
    /// built-in template unless `ignition_override` is set.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ignition: String,

    /// Replaces the built-in ignition template with the raw fragment
    /// instead of merging the two.
    pub ignition_override: bool,

    /// Key under which the rendered ignition is stored in the secret.
    /// Falls back to `ignition` when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ignition_secret_key: String,

    /// Labels applied to the ServerClaim so the machine can be found again.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// DNS resolvers configured on the host.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_servers: Vec<String>,

    /// Selector labels the ServerClaim uses to pick a server.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub server_labels: BTreeMap<String, String>,

    /// Free-form metadata passed to the machine via the rendered ignition.
    /// Server metadata and allocated addresses are merged on top.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// IPAM pools to allocate addresses from, keyed into the metadata.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ipam_config: Vec<IPAMConfig>,
}

impl ProviderSpec {
    /// Secret key for the rendered ignition.
    pub fn ignition_key(&self) -> &str {
        if self.ignition_secret_key.is_empty() {
            DEFAULT_IGNITION_KEY
        } else {
            &self.ignition_secret_key
        }
    }
}

/// One IPAM entry of the provider spec: where to allocate from and which
/// metadata key the result is published under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IPAMConfig {
    /// Metadata key for the allocated address.
    pub metadata_key: String,

    /// Pool the address is requested from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_ref: Option<IPAMObjectReference>,
}

/// Reference to the IPAM object used for address allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IPAMObjectReference {
    /// Name of the referenced pool.
    pub name: String,
    /// API group of the referenced pool.
    pub api_group: String,
    /// Kind of the referenced pool.
    pub kind: String,
}
