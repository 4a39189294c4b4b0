//! IPAddress CRD
//!
//! Bound output of an IPAddressClaim: the allocated address, its prefix
//! length and the gateway. Written by the external IPAM operator, read-only
//! for the provider.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "IPAddress",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressSpec {
    /// Allocated address.
    pub address: String,

    /// Prefix length of the address.
    pub prefix: i32,

    /// Gateway for the address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway: String,
}
