//! Request validation
//!
//! Field-path-annotated rules rejecting malformed provider specs and
//! credential secrets, plus the structural checks applied to previously
//! created IPAddressClaims.

use std::fmt;
use std::net::IpAddr;

use k8s_openapi::api::core::v1::Secret;
use kube::{Resource, ResourceExt};

use crate::constants::{LABEL_KEY_SERVER_CLAIM_NAME, LABEL_KEY_SERVER_CLAIM_NAMESPACE};
use crate::{IPAddressClaim, ProviderSpec, ServerClaim};

/// A single validation failure, annotated with the offending field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn required(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: format!("Required value: {}", message.into()),
        }
    }

    pub fn invalid(
        path: impl Into<String>,
        value: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            message: format!("Invalid value: {:?}: {}", value.to_string(), message.into()),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Renders validation failures the way they appear in status messages.
pub fn format_errors(errors: &[FieldError]) -> String {
    let joined = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

/// Validates the provider spec together with the credential secret.
pub fn validate_provider_spec_and_secret(
    spec: &ProviderSpec,
    secret: Option<&Secret>,
) -> Vec<FieldError> {
    let mut errors = validate_machine_class_spec(spec);
    errors.extend(validate_secret(secret));
    errors
}

fn validate_secret(secret: Option<&Secret>) -> Vec<FieldError> {
    let Some(secret) = secret else {
        return vec![FieldError::required("spec.secretRef", "secretRef is required")];
    };

    let has_user_data = secret
        .data
        .as_ref()
        .and_then(|data| data.get("userData"))
        .map(|value| !value.0.is_empty())
        .unwrap_or(false);

    if has_user_data {
        Vec::new()
    } else {
        vec![FieldError::required("userData", "userData is required")]
    }
}

fn validate_machine_class_spec(spec: &ProviderSpec) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if spec.image.is_empty() {
        errors.push(FieldError::required("spec.image", "image is required"));
    }

    for (i, ip) in spec.dns_servers.iter().enumerate() {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(FieldError::invalid(
                format!("spec.dnsServers[{i}]"),
                ip,
                "ip is invalid",
            ));
        }
    }

    errors
}

/// Validates an IPAddressClaim against the machine it is expected to belong
/// to: server-claim labels present and matching, a bound address and an
/// owner reference pointing at the ServerClaim.
pub fn validate_ip_address_claim(
    claim: &IPAddressClaim,
    namespace: &str,
    machine_name: &str,
    server_claim: &ServerClaim,
) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if claim.bound_address_name().is_none() {
        errors.push(FieldError::required(
            "status.addressRef.name",
            "IP address reference is required",
        ));
    }

    let labels = claim.labels();
    match (
        labels.get(LABEL_KEY_SERVER_CLAIM_NAME),
        labels.get(LABEL_KEY_SERVER_CLAIM_NAMESPACE),
    ) {
        (Some(name), Some(claim_namespace)) => {
            if name != machine_name || claim_namespace != namespace {
                errors.push(FieldError::invalid(
                    "metadata.labels",
                    format!("{claim_namespace}/{name}"),
                    format!(
                        "IP address claim labels do not match expected values: {namespace}/{machine_name}"
                    ),
                ));
            }
        }
        _ => errors.push(FieldError::required(
            "metadata.labels",
            "IP address claim has no server claim labels",
        )),
    }

    let expected_api_version = ServerClaim::api_version(&()).to_string();
    let expected_name = server_claim.name_any();
    let owned = claim.owner_references().iter().any(|reference| {
        reference.kind == "ServerClaim"
            && reference.name == expected_name
            && reference.api_version == expected_api_version
    });
    if !owned {
        errors.push(FieldError::required(
            "metadata.ownerReferences",
            "IPAddressClaim must have an owner reference",
        ));
    }

    errors
}
