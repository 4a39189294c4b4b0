//! CreateMachine driver tests

use std::collections::BTreeMap;

use kube::ResourceExt;
use serde_json::json;

use metal_api::{
    IPAddressClaim, IPAddressClaimSpec, Power, ANNOTATION_KEY_MACHINE_RECREATE,
    LABEL_KEY_SERVER_CLAIM_NAME, LABEL_KEY_SERVER_CLAIM_NAMESPACE,
};

use crate::codes::{Code, Status};
use crate::driver::{CreateMachineRequest, CreateMachineResponse};
use crate::node_name::NodeNamePolicy;
use crate::testing::*;

#[tokio::test]
async fn test_create_machine_reserves_a_server() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let response = driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    assert_eq!(
        response,
        CreateMachineResponse {
            provider_id: "ironcore-metal://test-ns/machine-0".to_string(),
            node_name: "machine-0".to_string(),
        }
    );

    let claim = mock.server_claim(TEST_NAMESPACE, "machine-0").unwrap();
    assert_eq!(claim.spec.power, Power::Off);
    assert_eq!(claim.spec.image, "my-image");
    assert_eq!(
        claim.spec.server_selector.as_ref().unwrap().match_labels,
        Some(BTreeMap::from([(
            "instance-type".to_string(),
            "bar".to_string()
        )]))
    );
    assert_eq!(
        claim.labels(),
        &BTreeMap::from([
            ("shoot-name".to_string(), "my-shoot".to_string()),
            (
                "shoot-namespace".to_string(),
                "my-shoot-namespace".to_string()
            ),
        ])
    );
    assert!(claim.spec.ignition_secret_ref.is_none());
}

#[tokio::test]
async fn test_create_machine_is_idempotent() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let first = driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    let before = serde_json::to_value(mock.server_claim(TEST_NAMESPACE, "machine-0")).unwrap();

    let second = driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    let after = serde_json::to_value(mock.server_claim(TEST_NAMESPACE, "machine-0")).unwrap();

    assert_eq!(first, second);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_create_rejects_empty_request() {
    let (_, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let err = driver.create(&CreateMachineRequest::default()).await.unwrap_err();
    assert_eq!(err, Status::invalid_argument("received empty request"));
}

#[tokio::test]
async fn test_create_rejects_foreign_provider() {
    let (_, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let mut req = create_request("machine-0", sample_provider_spec());
    req.machine_class.as_mut().unwrap().provider = "foo".to_string();

    let err = driver.create(&req).await.unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    assert!(err.message.contains("not supported by the driver"));
}

#[tokio::test]
async fn test_create_rejects_invalid_provider_spec() {
    let (_, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let mut spec = sample_provider_spec();
    spec.as_object_mut().unwrap().remove("image");

    let err = driver.create(&create_request("machine-0", spec)).await.unwrap_err();
    assert_eq!(err.code, Code::Internal);
    assert!(err.message.contains("spec.image"));
}

#[tokio::test(start_paused = true)]
async fn test_create_marks_unbound_claim_for_recreation_under_server_name_policy() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerName);

    let err = driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::Unavailable);

    let claim = mock.server_claim(TEST_NAMESPACE, "machine-0").unwrap();
    assert_eq!(
        claim.annotations().get(ANNOTATION_KEY_MACHINE_RECREATE),
        Some(&"true".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_resolves_server_name_after_late_binding() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerName);

    let err = driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::Unavailable);

    // An external actor binds the server; the retried create succeeds and
    // clears the recreate marker.
    mock.bind_server_claim(TEST_NAMESPACE, "machine-0", "test-server");

    let response = driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    assert_eq!(
        response,
        CreateMachineResponse {
            provider_id: "ironcore-metal://test-ns/machine-0".to_string(),
            node_name: "test-server".to_string(),
        }
    );

    let claim = mock.server_claim(TEST_NAMESPACE, "machine-0").unwrap();
    assert!(!claim
        .annotations()
        .contains_key(ANNOTATION_KEY_MACHINE_RECREATE));
}

#[tokio::test(start_paused = true)]
async fn test_create_with_ipam_config_creates_labelled_and_owned_claims() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let mut spec = sample_provider_spec();
    add_ipam_entry(&mut spec, "pool-a");
    add_ipam_entry(&mut spec, "pool-b");

    driver
        .create(&create_request("machine-0", spec))
        .await
        .unwrap();

    let server_claim = mock.server_claim(TEST_NAMESPACE, "machine-0").unwrap();
    for pool in ["pool-a", "pool-b"] {
        let claim = mock
            .ip_address_claim(TEST_NAMESPACE, &format!("machine-0-{pool}"))
            .unwrap();
        assert_eq!(
            claim.labels().get(LABEL_KEY_SERVER_CLAIM_NAME),
            Some(&"machine-0".to_string())
        );
        assert_eq!(
            claim.labels().get(LABEL_KEY_SERVER_CLAIM_NAMESPACE),
            Some(&TEST_NAMESPACE.to_string())
        );
        assert_eq!(claim.spec.pool_ref.kind, "GlobalInClusterIPPool");
        assert_eq!(claim.spec.pool_ref.name, pool);

        let owners = claim.owner_references();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "ServerClaim");
        assert_eq!(owners[0].name, "machine-0");
        assert_eq!(Some(&owners[0].uid), server_claim.metadata.uid.as_ref());
    }
}

#[tokio::test(start_paused = true)]
async fn test_create_resolves_bmc_name_after_binding() {
    let (mock, driver) = test_driver(NodeNamePolicy::BmcName);

    let mut server = metal_api::Server::new("test-server", metal_api::ServerSpec::default());
    server.spec.bmc_ref = Some(k8s_openapi::api::core::v1::LocalObjectReference {
        name: "bmc-0".to_string(),
    });
    mock.add_server(server);

    let err = driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::Unavailable);

    mock.bind_server_claim(TEST_NAMESPACE, "machine-0", "test-server");
    let response = driver
        .create(&create_request("machine-0", sample_provider_spec()))
        .await
        .unwrap();
    assert_eq!(response.node_name, "bmc-0");
}

#[tokio::test]
async fn test_create_fails_on_missing_ipam_ref() {
    let (_, driver) = test_driver(NodeNamePolicy::ServerClaimName);

    let mut spec = sample_provider_spec();
    spec["ipamConfig"] = json!([{"metadataKey": "pool-a"}]);

    let err = driver.create(&create_request("machine-0", spec)).await.unwrap_err();
    assert_eq!(err.code, Code::Internal);
    assert!(err.message.contains("ipamRef"));
}

#[tokio::test(start_paused = true)]
async fn test_create_adopts_existing_claim_with_matching_labels() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerClaimName);
    seed_claim(&mock, "machine-0", "pool-a", "machine-0", TEST_NAMESPACE);

    let mut spec = sample_provider_spec();
    add_ipam_entry(&mut spec, "pool-a");

    driver
        .create(&create_request("machine-0", spec))
        .await
        .unwrap();

    // Adopted in place, and owned by the ServerClaim afterwards.
    let claim = mock
        .ip_address_claim(TEST_NAMESPACE, "machine-0-pool-a")
        .unwrap();
    assert_eq!(claim.owner_references().len(), 1);
}

#[tokio::test]
async fn test_create_rejects_adopted_claim_with_foreign_labels() {
    let (mock, driver) = test_driver(NodeNamePolicy::ServerClaimName);
    seed_claim(&mock, "machine-0", "pool-a", "other-machine", TEST_NAMESPACE);

    let mut spec = sample_provider_spec();
    add_ipam_entry(&mut spec, "pool-a");

    let err = driver.create(&create_request("machine-0", spec)).await.unwrap_err();
    assert_eq!(err.code, Code::Internal);
    assert!(err.message.contains("labels don't match"));
}

fn seed_claim(
    mock: &metal_client::MockMetalClient,
    machine_name: &str,
    pool: &str,
    label_name: &str,
    label_namespace: &str,
) {
    let mut claim = IPAddressClaim::new(
        &format!("{machine_name}-{pool}"),
        IPAddressClaimSpec {
            pool_ref: k8s_openapi::api::core::v1::TypedLocalObjectReference {
                api_group: Some("ipam.cluster.x-k8s.io".to_string()),
                kind: "GlobalInClusterIPPool".to_string(),
                name: pool.to_string(),
            },
        },
    );
    claim.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    claim.metadata.labels = Some(BTreeMap::from([
        (
            LABEL_KEY_SERVER_CLAIM_NAME.to_string(),
            label_name.to_string(),
        ),
        (
            LABEL_KEY_SERVER_CLAIM_NAMESPACE.to_string(),
            label_namespace.to_string(),
        ),
    ]));
    mock.add_ip_address_claim(claim);
}
