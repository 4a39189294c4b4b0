//! Shared helpers for the lifecycle callbacks: request gating, provider-spec
//! decoding, derived names and the poll loop used by the bounded waits.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use tracing::warn;

use metal_api::validation::{format_errors, validate_provider_spec_and_secret};
use metal_api::{ProviderSpec, DNS1123_SUBDOMAIN_MAX_LENGTH, PROVIDER_NAME};
use metal_client::ClientProvider;

use crate::codes::Status;
use crate::driver::{Machine, MachineClass};

/// Rejects requests with missing parts, returning the parts otherwise.
pub(crate) fn unpack_request<'a>(
    machine: Option<&'a Machine>,
    machine_class: Option<&'a MachineClass>,
    secret: Option<&'a Secret>,
    empty_message: &str,
) -> Result<(&'a Machine, &'a MachineClass, &'a Secret), Status> {
    match (machine, machine_class, secret) {
        (Some(machine), Some(machine_class), Some(secret)) => Ok((machine, machine_class, secret)),
        _ => Err(Status::invalid_argument(empty_message)),
    }
}

/// Rejects requests addressed at a different provider.
pub(crate) fn check_provider_tag(machine_class: &MachineClass) -> Result<(), Status> {
    if machine_class.provider != PROVIDER_NAME {
        return Err(Status::invalid_argument(format!(
            "requested provider {:?} is not supported by the driver {:?}",
            machine_class.provider, PROVIDER_NAME
        )));
    }
    Ok(())
}

/// Decodes the provider spec from the machine class and validates it
/// together with the credential secret.
pub(crate) fn decode_provider_spec(
    machine_class: &MachineClass,
    secret: &Secret,
) -> Result<ProviderSpec, Status> {
    let spec: ProviderSpec = serde_json::from_value(machine_class.provider_spec.clone())
        .map_err(|err| Status::internal(format!("failed to decode provider spec: {err}")))?;

    let errors = validate_provider_spec_and_secret(&spec, Some(secret));
    if !errors.is_empty() {
        return Err(Status::internal(format!(
            "failed to validate provider spec and secret: {}",
            format_errors(&errors)
        )));
    }

    Ok(spec)
}

/// Stable provider identifier of a machine.
pub(crate) fn provider_id(namespace: &str, machine_name: &str) -> String {
    format!("{PROVIDER_NAME}://{namespace}/{machine_name}")
}

/// Derived IPAddressClaim name for one IPAM entry. Names beyond the
/// DNS-1123 subdomain limit are cut, which can collide; the cut is logged
/// and accepted.
pub(crate) fn ip_address_claim_name(machine_name: &str, metadata_key: &str) -> String {
    let mut name = format!("{machine_name}-{metadata_key}");
    if name.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        warn!("IPAddressClaim name {name} is too long, it will be shortened which can cause name collisions");
        let mut cut = DNS1123_SUBDOMAIN_MAX_LENGTH;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

/// Name of the ignition secret for a machine. Secrets written before the
/// naming change used `<machine>-ignition`; that name stays in use while
/// such a secret exists in the target namespace.
pub(crate) async fn ignition_secret_name(
    provider: &ClientProvider,
    namespace: &str,
    machine_name: &str,
) -> Result<String, Status> {
    let legacy = format!("{machine_name}-ignition");
    let probe = provider
        .with_client(|client| {
            let legacy = legacy.clone();
            async move { client.get_secret(namespace, &legacy).await }
        })
        .await;
    match probe {
        Ok(_) => Ok(legacy),
        Err(err) if err.is_not_found() => Ok(machine_name.to_string()),
        Err(err) => Err(Status::internal(format!(
            "failed to determine ignition secret name: {err}"
        ))),
    }
}

/// Polls `condition` every `interval` within `budget`, checking immediately
/// first. Returns the condition's value on success and `None` once the
/// budget ran out.
pub(crate) async fn poll_until<T, F, Fut, E>(
    interval: Duration,
    budget: Duration,
    mut condition: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if let Some(value) = condition().await? {
            return Ok(Some(value));
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
