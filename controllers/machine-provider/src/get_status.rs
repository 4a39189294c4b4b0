//! GetMachineStatus
//!
//! Reports whether a machine is fully up. The returned code steers the
//! fleet manager: a missing claim or the recreate marker yields `NotFound`
//! (run the create flow), failed IP-claim validation or a claim that is not
//! powered on yields `Uninitialized` (run the initialize flow).

use tracing::debug;

use metal_api::validation::{format_errors, validate_ip_address_claim};
use metal_api::{Power, ProviderSpec, ServerClaim};

use crate::codes::Status;
use crate::driver::{GetMachineStatusRequest, GetMachineStatusResponse, MetalDriver};
use crate::helpers::{
    check_provider_tag, decode_provider_spec, ip_address_claim_name, provider_id, unpack_request,
};
use crate::server_claim::has_recreate_annotation;

impl MetalDriver {
    pub(crate) async fn status(
        &self,
        req: &GetMachineStatusRequest,
    ) -> Result<GetMachineStatusResponse, Status> {
        let (machine, machine_class, secret) = unpack_request(
            req.machine.as_ref(),
            req.machine_class.as_ref(),
            req.secret.as_ref(),
            "received empty GetMachineStatusRequest",
        )?;
        check_provider_tag(machine_class)?;

        debug!("machine status request received for {:?}", machine.name);

        let spec = decode_provider_spec(machine_class, secret)?;
        let namespace = &self.metal_namespace;

        let claim = match self
            .client_provider
            .with_client(|client| async move {
                client.get_server_claim(namespace, &machine.name).await
            })
            .await
        {
            Ok(claim) => claim,
            Err(err) if err.is_not_found() => return Err(Status::not_found(err.to_string())),
            Err(err) => return Err(Status::internal(err.to_string())),
        };

        if has_recreate_annotation(&claim) {
            return Err(Status::not_found(format!(
                "server claim {:?} is marked for recreation",
                machine.name
            )));
        }

        self.validate_ip_address_claims(&claim, &machine.name, &spec)
            .await?;

        if claim.spec.power != Power::On {
            return Err(Status::uninitialized(format!(
                "server claim {:?} is still not powered on, will reinitialize",
                machine.name
            )));
        }

        let node_name = self.resolve_node_name(&claim).await?;

        Ok(GetMachineStatusResponse {
            provider_id: provider_id(namespace, &machine.name),
            node_name,
        })
    }

    /// Structural validation of every IPAddressClaim of the machine. Any
    /// failure means ownership or binding is incomplete, which the
    /// initialize flow repairs.
    async fn validate_ip_address_claims(
        &self,
        server_claim: &ServerClaim,
        machine_name: &str,
        spec: &ProviderSpec,
    ) -> Result<(), Status> {
        let namespace = &self.metal_namespace;
        let mut failures = Vec::new();

        for entry in &spec.ipam_config {
            let claim_name = ip_address_claim_name(machine_name, &entry.metadata_key);
            let claim = match self
                .client_provider
                .with_client(|client| {
                    let claim_name = claim_name.clone();
                    async move { client.get_ip_address_claim(namespace, &claim_name).await }
                })
                .await
            {
                Ok(claim) => claim,
                Err(err) if err.is_not_found() => {
                    failures.push(format!(
                        "failed to validate IPAddressClaim {namespace}/{claim_name}: {err}"
                    ));
                    continue;
                }
                Err(err) => {
                    return Err(Status::internal(format!(
                        "failed to get IPAddressClaim {namespace}/{claim_name}: {err}"
                    )));
                }
            };

            let errors = validate_ip_address_claim(&claim, namespace, machine_name, server_claim);
            if !errors.is_empty() {
                failures.push(format!(
                    "failed to validate IPAddressClaim {namespace}/{claim_name}: {}",
                    format_errors(&errors)
                ));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Status::uninitialized(format!(
                "unsuccessful IPAddressClaims validation, will reinitialize: {}",
                failures.join(", ")
            )))
        }
    }
}
