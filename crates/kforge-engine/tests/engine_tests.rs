//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Node set management, master election, and pre-flight checks."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use kforge_common::role::Role;
use kforge_engine::{ClusterSettings, Engine, EngineError, NtpSettings};
use kforge_testharness::{FakeNode, RecordingObserver};

fn engine() -> Engine {
    Engine::new(ClusterSettings::default())
}

#[test]
fn duplicate_address_leaves_the_set_unchanged() {
    let mut engine = engine();
    engine
        .add_node(FakeNode::new("10.0.0.1", "a", &[Role::Worker]).into_arc())
        .unwrap();
    let err = engine
        .add_node(FakeNode::new("10.0.0.1", "b", &[Role::ControlPlane]).into_arc())
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateNode { ref address } if address == "10.0.0.1"));
    assert_eq!(engine.nodes().count(), 1);
    assert_eq!(engine.nodes().next().unwrap().hostname(), "a");
    assert!(engine.master_node().is_none());
}

#[test]
fn master_is_first_control_plane_node_added() {
    let mut engine = engine();
    for (address, hostname, roles) in [
        ("10.0.0.1", "w1", vec![Role::Worker]),
        ("10.0.0.2", "cp1", vec![Role::ControlPlane, Role::Etcd]),
        ("10.0.0.3", "cp2", vec![Role::ControlPlane]),
    ] {
        engine
            .add_node(FakeNode::new(address, hostname, &roles).into_arc())
            .unwrap();
    }
    assert_eq!(engine.master_node().unwrap().address(), "10.0.0.2");
    let order: Vec<_> = engine.nodes().map(|node| node.hostname().to_owned()).collect();
    assert_eq!(order, ["w1", "cp1", "cp2"]);
}

#[test]
fn check_reports_topology_problems() {
    assert!(matches!(engine().check(), Err(EngineError::EmptyCluster)));

    let mut single = engine();
    single
        .add_node(FakeNode::new("10.0.0.1", "solo", &[Role::Etcd, Role::ControlPlane]).into_arc())
        .unwrap();
    assert!(matches!(
        single.check(),
        Err(EngineError::IncompleteRoles { .. })
    ));

    let mut pair = engine();
    pair.add_node(FakeNode::new("10.0.0.1", "a", &[Role::Etcd, Role::Worker]).into_arc())
        .unwrap();
    pair.add_node(FakeNode::new("10.0.0.2", "b", &[Role::Worker]).into_arc())
        .unwrap();
    let err = pair.check().unwrap_err();
    assert!(matches!(err, EngineError::MissingRole(Role::ControlPlane)));
    assert!(err.to_string().contains("controlplane"));
}

#[test]
fn ntp_server_inside_cluster_requires_allow_list() {
    let settings = ClusterSettings {
        ntp: Some(NtpSettings {
            server: "10.0.0.1".to_owned(),
            allow: None,
            timezone: "UTC".to_owned(),
        }),
        ..ClusterSettings::default()
    };
    let mut engine = Engine::new(settings);
    engine
        .add_node(FakeNode::new("10.0.0.1", "solo", &Role::ALL).into_arc())
        .unwrap();
    assert!(matches!(
        engine.check(),
        Err(EngineError::MissingNtpAllowList { .. })
    ));
}

#[tokio::test]
async fn failed_check_runs_nothing() {
    let node = FakeNode::new("10.0.0.1", "solo", &[Role::Worker]).into_arc();
    let observer = RecordingObserver::new();
    let mut engine = engine().with_observer(observer.clone());
    engine.add_node(node.clone()).unwrap();

    let err = engine.install("").await.unwrap_err();
    assert!(err.is_topology());
    assert!(node.calls().is_empty());
    assert!(observer.steps().is_empty());
}

#[tokio::test]
async fn unknown_step_is_rejected_before_connecting() {
    let node = FakeNode::new("10.0.0.1", "solo", &Role::ALL).into_arc();
    let mut engine = engine().with_observer(RecordingObserver::new());
    engine.add_node(node.clone()).unwrap();

    let err = engine.update("3,12").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnknownStep {
            pipeline: "update",
            number: 12
        }
    ));
    assert!(node.calls().is_empty());
}
