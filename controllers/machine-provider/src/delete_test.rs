//! DeleteMachine driver tests

use metal_api::{Server, ServerSpec};

use crate::codes::{Code, Status};
use crate::driver::{DeleteMachineRequest, DeleteMachineResponse};
use crate::node_name::NodeNamePolicy;
use crate::testing::*;

#[tokio::test]
async fn test_delete_rejects_empty_request() {
    let (_, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let err = driver
        .delete(&DeleteMachineRequest::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Status::invalid_argument("received empty DeleteMachineRequest")
    );
}

#[tokio::test]
async fn test_delete_removes_claim_and_ignition_secret() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerClaimName);
    mock.add_server(Server::new("test-server", ServerSpec::default()));

    driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    mock.bind_server_claim(TEST_NAMESPACE, "machine-0", "test-server");
    driver
        .initialize(&initialize_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    assert!(mock.secret(TEST_NAMESPACE, "machine-0").is_some());

    let response = driver
        .delete(&delete_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    assert_eq!(response, DeleteMachineResponse);

    assert!(mock.server_claim(TEST_NAMESPACE, "machine-0").is_none());
    assert!(mock.secret(TEST_NAMESPACE, "machine-0").is_none());
}

#[tokio::test]
async fn test_delete_of_unknown_machine_is_not_found() {
    let (_, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let err = driver
        .delete(&delete_request("machine-0", sample_provider_spec()))
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::NotFound);
}

#[tokio::test]
async fn test_delete_without_ignition_secret_succeeds() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    assert!(mock.secret(TEST_NAMESPACE, "machine-0").is_none());

    driver
        .delete(&delete_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    assert!(mock.server_claim(TEST_NAMESPACE, "machine-0").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_delete_times_out_when_claim_is_retained() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    mock.retain_server_claims_on_delete(true);

    let err = driver
        .delete(&delete_request("machine-0", sample_provider_spec()))
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::DeadlineExceeded);
    assert!(mock.server_claim(TEST_NAMESPACE, "machine-0").is_some());
}
