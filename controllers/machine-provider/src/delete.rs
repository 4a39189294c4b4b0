//! DeleteMachine
//!
//! Removes the ignition secret and the ServerClaim, then blocks until the
//! claim is actually gone. The extension contract expects providers to
//! wait; otherwise the kubelet could re-register the Node while the fleet
//! manager is already cleaning up.

use std::time::Duration;

use tracing::info;

use metal_client::{ClientError, ClientProvider};

use crate::codes::Status;
use crate::driver::{DeleteMachineRequest, DeleteMachineResponse, MetalDriver};
use crate::helpers::{check_provider_tag, ignition_secret_name, poll_until, unpack_request};

pub(crate) const DELETE_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub(crate) const DELETE_POLL_BUDGET: Duration = Duration::from_secs(600);

impl MetalDriver {
    pub(crate) async fn delete(
        &self,
        req: &DeleteMachineRequest,
    ) -> Result<DeleteMachineResponse, Status> {
        let (machine, machine_class, _secret) = unpack_request(
            req.machine.as_ref(),
            req.machine_class.as_ref(),
            req.secret.as_ref(),
            "received empty DeleteMachineRequest",
        )?;
        check_provider_tag(machine_class)?;

        info!("machine deletion request received for {:?}", machine.name);

        let namespace = &self.metal_namespace;
        let secret_name = ignition_secret_name(&self.client_provider, namespace, &machine.name).await?;

        let deleted = self
            .client_provider
            .with_client(|client| {
                let secret_name = secret_name.clone();
                async move { client.delete_secret(namespace, &secret_name).await }
            })
            .await;
        match deleted {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                return Err(Status::internal(format!(
                    "error deleting ignition secret: {err}"
                )));
            }
        }

        let deleted = self
            .client_provider
            .with_client(|client| async move {
                client.delete_server_claim(namespace, &machine.name).await
            })
            .await;
        match deleted {
            Ok(()) => {}
            Err(err) if err.is_not_found() => return Err(Status::not_found(err.to_string())),
            Err(err) => {
                return Err(Status::internal(format!(
                    "error deleting server claim: {err}"
                )));
            }
        }

        let gone = wait_for_server_claim_gone(
            &self.client_provider,
            namespace,
            &machine.name,
            DELETE_POLL_INTERVAL,
            DELETE_POLL_BUDGET,
        )
        .await?;
        if !gone {
            return Err(Status::deadline_exceeded(format!(
                "timed out waiting for server claim {namespace}/{} to be deleted",
                machine.name
            )));
        }

        info!("ServerClaim {namespace}/{} has been deleted", machine.name);
        Ok(DeleteMachineResponse)
    }
}

/// Polls the store until the claim disappears. Returns `false` when the
/// budget ran out with the claim still present.
pub(crate) async fn wait_for_server_claim_gone(
    provider: &ClientProvider,
    namespace: &str,
    name: &str,
    interval: Duration,
    budget: Duration,
) -> Result<bool, Status> {
    poll_until(interval, budget, || async move {
        match provider
            .with_client(|client| async move { client.get_server_claim(namespace, name).await })
            .await
        {
            Ok(_) => Ok(None),
            Err(err) if err.is_not_found() => Ok(Some(())),
            Err(err) => Err(err),
        }
    })
    .await
    .map(|gone| gone.is_some())
    .map_err(|err: ClientError| Status::internal(err.to_string()))
}
