//! IPAddressClaim CRD
//!
//! Cluster-api IPAM claim: requests an address from a named pool. An
//! external IPAM operator satisfies the claim by filling in
//! `status.addressRef` with the name of a bound IPAddress.

use k8s_openapi::api::core::v1::{LocalObjectReference, TypedLocalObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "IPAddressClaim",
    namespaced,
    status = "IPAddressClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressClaimSpec {
    /// Pool the address should be allocated from.
    pub pool_ref: TypedLocalObjectReference,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressClaimStatus {
    /// Reference to the bound IPAddress, set by the IPAM operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_ref: Option<LocalObjectReference>,
}

impl IPAddressClaim {
    /// Name of the bound IPAddress, if the claim has been satisfied.
    pub fn bound_address_name(&self) -> Option<&str> {
        Some(self.status.as_ref()?.address_ref.as_ref()?.name.as_str())
            .filter(|name| !name.is_empty())
    }
}
