//! ServerClaim CRD
//!
//! Declarative reservation of a bare-metal server. The claim names the
//! desired power state, a selector for eligible servers, the boot image and
//! an optional ignition secret; an external operator binds a matching
//! server by filling in `serverRef`.

use k8s_openapi::api::core::v1::LocalObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.ironcore.dev",
    version = "v1alpha1",
    kind = "ServerClaim",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimSpec {
    /// Desired power state of the claimed server.
    #[serde(default)]
    pub power: Power,

    /// Reference to the bound Server, set by the claim operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ref: Option<LocalObjectReference>,

    /// Selector for servers eligible to satisfy this claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_selector: Option<LabelSelector>,

    /// Secret containing the ignition configuration for the server's first boot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition_secret_ref: Option<LocalObjectReference>,

    /// Reference of the operating system image the server should boot.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

/// Power state requested for a claimed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum Power {
    /// Server is kept powered off.
    #[default]
    Off,
    /// Server is powered on.
    On,
}

impl ServerClaim {
    /// Name of the bound Server, if the claim operator has bound one.
    pub fn bound_server_name(&self) -> Option<&str> {
        Some(self.spec.server_ref.as_ref()?.name.as_str())
            .filter(|name| !name.is_empty())
    }
}
