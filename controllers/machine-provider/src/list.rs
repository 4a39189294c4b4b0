//! ListMachines
//!
//! Lists the ServerClaims of the target namespace filtered by the provider
//! spec's labels and keys them by provider identifier.

use std::collections::BTreeMap;

use kube::ResourceExt;
use tracing::debug;

use crate::codes::Status;
use crate::driver::{ListMachinesRequest, ListMachinesResponse, MetalDriver};
use crate::helpers::{check_provider_tag, decode_provider_spec, provider_id};

impl MetalDriver {
    pub(crate) async fn list(
        &self,
        req: &ListMachinesRequest,
    ) -> Result<ListMachinesResponse, Status> {
        let (machine_class, secret) = match (req.machine_class.as_ref(), req.secret.as_ref()) {
            (Some(machine_class), Some(secret)) => (machine_class, secret),
            _ => {
                return Err(Status::invalid_argument(
                    "received empty ListMachinesRequest",
                ));
            }
        };
        check_provider_tag(machine_class)?;

        debug!("machine list request received for {:?}", machine_class.name);

        let spec = decode_provider_spec(machine_class, secret)?;
        let namespace = &self.metal_namespace;

        let claims = self
            .client_provider
            .with_client(|client| {
                let labels = spec.labels.clone();
                async move { client.list_server_claims(namespace, &labels).await }
            })
            .await
            .map_err(|err| Status::internal(err.to_string()))?;

        let machine_list: BTreeMap<String, String> = claims
            .iter()
            .map(|claim| {
                let name = claim.name_any();
                (provider_id(namespace, &name), name)
            })
            .collect();

        Ok(ListMachinesResponse { machine_list })
    }
}
