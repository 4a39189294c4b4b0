//! Test fixtures for the driver tests.
//!
//! A driver wired to the in-memory mock client, plus request builders
//! mirroring what the machine-controller runtime sends.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use serde_json::{json, Value};

use metal_api::{IPAddress, IPAddressSpec, PROVIDER_NAME};
use metal_client::{ClientProvider, MetalClient, MockMetalClient};

use crate::driver::{
    CreateMachineRequest, DeleteMachineRequest, GetMachineStatusRequest, InitializeMachineRequest,
    ListMachinesRequest, Machine, MachineClass, MetalDriver,
};
use crate::node_name::NodeNamePolicy;

pub(crate) const TEST_NAMESPACE: &str = "test-ns";

/// Driver wired to a fresh mock store.
pub(crate) fn test_driver(policy: NodeNamePolicy) -> (Arc<MockMetalClient>, MetalDriver) {
    let mock = Arc::new(MockMetalClient::new());
    let provider = ClientProvider::from_client(Arc::clone(&mock) as Arc<dyn MetalClient>);
    let driver = MetalDriver::new(provider, TEST_NAMESPACE, policy);
    (mock, driver)
}

/// Provider spec used by most scenarios.
pub(crate) fn sample_provider_spec() -> Value {
    json!({
        "labels": {
            "shoot-name": "my-shoot",
            "shoot-namespace": "my-shoot-namespace",
        },
        "serverLabels": {"instance-type": "bar"},
        "metadata": {"foo": "bar", "baz": "100"},
        "image": "my-image",
        "ignitionSecretKey": "ignition",
        "dnsServers": ["1.2.3.4", "5.6.7.8"],
    })
}

/// Appends an IPAM entry for `metadata_key` to the provider spec.
pub(crate) fn add_ipam_entry(spec: &mut Value, metadata_key: &str) {
    let entry = json!({
        "metadataKey": metadata_key,
        "ipamRef": {
            "name": metadata_key,
            "apiGroup": "ipam.cluster.x-k8s.io",
            "kind": "GlobalInClusterIPPool",
        },
    });
    match spec.get_mut("ipamConfig") {
        Some(Value::Array(entries)) => entries.push(entry),
        _ => {
            spec["ipamConfig"] = json!([entry]);
        }
    }
}

/// IPAddress fixture named `<metadata_key>-address`, as the IPAM operator
/// would bind it.
pub(crate) fn new_ip_address(metadata_key: &str) -> IPAddress {
    let mut address = IPAddress::new(
        &format!("{metadata_key}-address"),
        IPAddressSpec {
            address: "10.11.12.13".to_string(),
            prefix: 24,
            gateway: "10.11.12.1".to_string(),
        },
    );
    address.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    address
}

pub(crate) fn new_machine(name: &str) -> Machine {
    Machine {
        name: name.to_string(),
        namespace: "shoot".to_string(),
    }
}

pub(crate) fn new_machine_class(provider: &str, provider_spec: Value) -> MachineClass {
    MachineClass {
        name: "machine-class".to_string(),
        provider: provider.to_string(),
        provider_spec,
    }
}

pub(crate) fn new_credential_secret() -> Secret {
    let mut secret = Secret::default();
    secret.metadata.name = Some("machine-secret".to_string());
    secret.metadata.namespace = Some("shoot".to_string());
    secret.data = Some(BTreeMap::from([(
        "userData".to_string(),
        ByteString(b"abcd".to_vec()),
    )]));
    secret
}

pub(crate) fn create_request(machine_name: &str, spec: Value) -> CreateMachineRequest {
    CreateMachineRequest {
        machine: Some(new_machine(machine_name)),
        machine_class: Some(new_machine_class(PROVIDER_NAME, spec)),
        secret: Some(new_credential_secret()),
    }
}

pub(crate) fn initialize_request(machine_name: &str, spec: Value) -> InitializeMachineRequest {
    InitializeMachineRequest {
        machine: Some(new_machine(machine_name)),
        machine_class: Some(new_machine_class(PROVIDER_NAME, spec)),
        secret: Some(new_credential_secret()),
    }
}

pub(crate) fn status_request(machine_name: &str, spec: Value) -> GetMachineStatusRequest {
    GetMachineStatusRequest {
        machine: Some(new_machine(machine_name)),
        machine_class: Some(new_machine_class(PROVIDER_NAME, spec)),
        secret: Some(new_credential_secret()),
    }
}

pub(crate) fn list_request(spec: Value) -> ListMachinesRequest {
    ListMachinesRequest {
        machine_class: Some(new_machine_class(PROVIDER_NAME, spec)),
        secret: Some(new_credential_secret()),
    }
}

pub(crate) fn delete_request(machine_name: &str, spec: Value) -> DeleteMachineRequest {
    DeleteMachineRequest {
        machine: Some(new_machine(machine_name)),
        machine_class: Some(new_machine_class(PROVIDER_NAME, spec)),
        secret: Some(new_credential_secret()),
    }
}
