//! Machine lifecycle driver
//!
//! Request/response types of the callback surface and the `MetalDriver`
//! carrying the shared state: the client gateway, the target namespace and
//! the node-name policy. The callback logic lives in the per-operation
//! modules (`create`, `initialize`, `get_status`, `list`, `delete`).

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use serde_json::Value;

use metal_client::ClientProvider;

use crate::codes::Status;
use crate::node_name::NodeNamePolicy;

/// Machine part of a lifecycle request.
#[derive(Debug, Clone)]
pub struct Machine {
    pub name: String,
    pub namespace: String,
}

/// Machine class part of a lifecycle request: the provider tag plus the
/// JSON-encoded provider spec.
#[derive(Debug, Clone)]
pub struct MachineClass {
    pub name: String,
    pub provider: String,
    pub provider_spec: Value,
}

#[derive(Debug, Clone, Default)]
pub struct CreateMachineRequest {
    pub machine: Option<Machine>,
    pub machine_class: Option<MachineClass>,
    pub secret: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMachineResponse {
    pub provider_id: String,
    pub node_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct InitializeMachineRequest {
    pub machine: Option<Machine>,
    pub machine_class: Option<MachineClass>,
    pub secret: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeMachineResponse {
    pub provider_id: String,
    pub node_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct GetMachineStatusRequest {
    pub machine: Option<Machine>,
    pub machine_class: Option<MachineClass>,
    pub secret: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMachineStatusResponse {
    pub provider_id: String,
    pub node_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListMachinesRequest {
    pub machine_class: Option<MachineClass>,
    pub secret: Option<Secret>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMachinesResponse {
    /// Map from provider identifier to machine name.
    pub machine_list: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteMachineRequest {
    pub machine: Option<Machine>,
    pub machine_class: Option<MachineClass>,
    pub secret: Option<Secret>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteMachineResponse;

#[derive(Debug, Clone, Default)]
pub struct GetVolumeIDsRequest {
    pub pv_specs: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetVolumeIDsResponse {
    pub volume_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateMachineClassForMigrationRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateMachineClassForMigrationResponse;

/// Lifecycle callbacks invoked by the machine-controller runtime.
#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    async fn create_machine(
        &self,
        req: &CreateMachineRequest,
    ) -> Result<CreateMachineResponse, Status>;

    async fn initialize_machine(
        &self,
        req: &InitializeMachineRequest,
    ) -> Result<InitializeMachineResponse, Status>;

    async fn get_machine_status(
        &self,
        req: &GetMachineStatusRequest,
    ) -> Result<GetMachineStatusResponse, Status>;

    async fn list_machines(&self, req: &ListMachinesRequest)
        -> Result<ListMachinesResponse, Status>;

    async fn delete_machine(
        &self,
        req: &DeleteMachineRequest,
    ) -> Result<DeleteMachineResponse, Status>;

    async fn get_volume_ids(
        &self,
        req: &GetVolumeIDsRequest,
    ) -> Result<GetVolumeIDsResponse, Status>;

    async fn generate_machine_class_for_migration(
        &self,
        req: &GenerateMachineClassForMigrationRequest,
    ) -> Result<GenerateMachineClassForMigrationResponse, Status>;
}

/// Driver coordinating ServerClaims, IPAddressClaims and ignition secrets
/// in the metal cluster.
pub struct MetalDriver {
    pub(crate) client_provider: Arc<ClientProvider>,
    pub(crate) metal_namespace: String,
    pub(crate) node_name_policy: NodeNamePolicy,
}

impl MetalDriver {
    pub fn new(
        client_provider: Arc<ClientProvider>,
        metal_namespace: impl Into<String>,
        node_name_policy: NodeNamePolicy,
    ) -> Self {
        Self {
            client_provider,
            metal_namespace: metal_namespace.into(),
            node_name_policy,
        }
    }

    /// Target namespace all machine resources live in.
    pub fn namespace(&self) -> &str {
        &self.metal_namespace
    }
}

#[async_trait::async_trait]
impl Driver for MetalDriver {
    async fn create_machine(
        &self,
        req: &CreateMachineRequest,
    ) -> Result<CreateMachineResponse, Status> {
        self.create(req).await
    }

    async fn initialize_machine(
        &self,
        req: &InitializeMachineRequest,
    ) -> Result<InitializeMachineResponse, Status> {
        self.initialize(req).await
    }

    async fn get_machine_status(
        &self,
        req: &GetMachineStatusRequest,
    ) -> Result<GetMachineStatusResponse, Status> {
        self.status(req).await
    }

    async fn list_machines(
        &self,
        req: &ListMachinesRequest,
    ) -> Result<ListMachinesResponse, Status> {
        self.list(req).await
    }

    async fn delete_machine(
        &self,
        req: &DeleteMachineRequest,
    ) -> Result<DeleteMachineResponse, Status> {
        self.delete(req).await
    }

    async fn get_volume_ids(
        &self,
        _req: &GetVolumeIDsRequest,
    ) -> Result<GetVolumeIDsResponse, Status> {
        Err(Status::unimplemented(
            "metal provider does not implement GetVolumeIDs",
        ))
    }

    async fn generate_machine_class_for_migration(
        &self,
        _req: &GenerateMachineClassForMigrationRequest,
    ) -> Result<GenerateMachineClassForMigrationResponse, Status> {
        Ok(GenerateMachineClassForMigrationResponse)
    }
}
