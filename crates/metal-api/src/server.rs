//! Server CRD
//!
//! Physical server inventory resource, cluster-scoped. The provider only
//! reads it: the BMC reference feeds the node-name policy and the loopback
//! address rides on an annotation.

use k8s_openapi::api::core::v1::LocalObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(group = "metal.ironcore.dev", version = "v1alpha1", kind = "Server")]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Reference to the baseboard management controller of this server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc_ref: Option<LocalObjectReference>,
}
