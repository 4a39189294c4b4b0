//! CreateMachine
//!
//! Reserves a server for a machine: IP-address claims are upserted first,
//! then the ServerClaim is applied powered off and takes ownership of the
//! claims. Under node-name policies that need a bound server, an unbound
//! claim is marked for recreation and the callback returns `Unavailable`
//! so the fleet manager retries shortly.

use tracing::info;

use crate::codes::Status;
use crate::driver::{CreateMachineRequest, CreateMachineResponse, MetalDriver};
use crate::helpers::{check_provider_tag, decode_provider_spec, provider_id, unpack_request};
use crate::ip_claims::{get_or_create_ip_address_claims, transfer_claim_ownership};
use crate::server_claim::{
    apply_server_claim, build_server_claim, clear_recreate_annotation, has_recreate_annotation,
    set_recreate_annotation, wait_for_server_binding,
};

impl MetalDriver {
    pub(crate) async fn create(
        &self,
        req: &CreateMachineRequest,
    ) -> Result<CreateMachineResponse, Status> {
        let (machine, machine_class, secret) = unpack_request(
            req.machine.as_ref(),
            req.machine_class.as_ref(),
            req.secret.as_ref(),
            "received empty request",
        )?;
        check_provider_tag(machine_class)?;

        info!("machine creation request received for {:?}", machine.name);

        let spec = decode_provider_spec(machine_class, secret)?;
        let namespace = &self.metal_namespace;

        let address_claims =
            get_or_create_ip_address_claims(&self.client_provider, namespace, &machine.name, &spec)
                .await?;

        let claim = build_server_claim(&machine.name, namespace, &spec);
        apply_server_claim(&self.client_provider, &claim).await?;

        let mut observed =
            transfer_claim_ownership(&self.client_provider, namespace, &machine.name, &address_claims)
                .await?;

        if self.node_name_policy.requires_server_binding() {
            match wait_for_server_binding(&self.client_provider, namespace, &machine.name).await? {
                Some(bound) => {
                    if has_recreate_annotation(&bound) {
                        clear_recreate_annotation(&self.client_provider, namespace, &machine.name)
                            .await?;
                    }
                    observed = bound;
                }
                None => {
                    set_recreate_annotation(&self.client_provider, namespace, &machine.name)
                        .await?;
                    return Err(Status::unavailable(format!(
                        "server claim {namespace}/{} is not yet bound to a server",
                        machine.name
                    )));
                }
            }
        }

        let node_name = self.resolve_node_name(&observed).await?;

        info!("machine creation request processed for {:?}", machine.name);
        Ok(CreateMachineResponse {
            provider_id: provider_id(namespace, &machine.name),
            node_name,
        })
    }
}
