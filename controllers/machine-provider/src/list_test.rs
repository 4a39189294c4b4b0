//! ListMachines driver tests

use std::collections::BTreeMap;

use metal_api::{ServerClaim, ServerClaimSpec};
use metal_client::MetalClient;

use crate::codes::Status;
use crate::driver::ListMachinesRequest;
use crate::node_name::NodeNamePolicy;
use crate::testing::*;

#[tokio::test]
async fn test_list_rejects_empty_request() {
    let (_, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let err = driver
        .list(&ListMachinesRequest::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Status::invalid_argument("received empty ListMachinesRequest")
    );
}

#[tokio::test]
async fn test_list_returns_machines_keyed_by_provider_id() {
    let (_, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    for machine in ["machine-0", "machine-1"] {
        driver
            .create(&create_request(machine, sample_provider_spec()))
            .await
            .unwrap();
    }

    let response = driver
        .list(&list_request(sample_provider_spec()))
        .await
        .unwrap();
    assert_eq!(
        response.machine_list,
        BTreeMap::from([
            (
                "ironcore-metal://test-ns/machine-0".to_string(),
                "machine-0".to_string()
            ),
            (
                "ironcore-metal://test-ns/machine-1".to_string(),
                "machine-1".to_string()
            ),
        ])
    );
}

#[tokio::test]
async fn test_repeated_create_lists_as_one_machine() {
    let (_, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    for _ in 0..2 {
        driver
            .create(&create_request("machine-0", sample_provider_spec()))
            .await
            .unwrap();
    }

    let response = driver
        .list(&list_request(sample_provider_spec()))
        .await
        .unwrap();
    assert_eq!(
        response.machine_list,
        BTreeMap::from([(
            "ironcore-metal://test-ns/machine-0".to_string(),
            "machine-0".to_string()
        )])
    );
}

#[tokio::test]
async fn test_list_filters_by_provider_spec_labels() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();

    // A claim of some other deployment, without the spec's labels.
    let mut foreign = ServerClaim::new("foreign", ServerClaimSpec::default());
    foreign.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    mock.apply_server_claim(&foreign).await.unwrap();

    let response = driver
        .list(&list_request(sample_provider_spec()))
        .await
        .unwrap();
    assert_eq!(response.machine_list.len(), 1);
    assert!(response
        .machine_list
        .contains_key("ironcore-metal://test-ns/machine-0"));
}
