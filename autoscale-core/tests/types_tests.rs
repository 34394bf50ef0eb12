use autoscale_core::{clamp, NodeId, Operator, PolicyId, TargetType};

#[test]
fn test_policy_id_uniqueness_and_round_trip() {
    let id1 = PolicyId::new();
    let id2 = PolicyId::new();
    assert_ne!(id1, id2);

    let as_string = id1.to_string();
    let parsed = PolicyId::from_string(&as_string).unwrap();
    assert_eq!(id1, parsed);

    assert!(PolicyId::from_string("not-a-uuid").is_err());
}

#[test]
fn test_node_id_distinct_from_policy_id() {
    let node = NodeId::new();
    let policy = PolicyId::new();
    // different newtypes, but both wrap a UUID the same way
    assert_eq!(node.to_string().len(), policy.to_string().len());
}

#[test]
fn test_target_type_name() {
    assert_eq!(TargetType::WorkloadKindA.name(), "workload-kind-a");
    assert_eq!(TargetType::Nodes.name(), "nodes");
}

#[test]
fn test_operator_evaluate() {
    assert!(Operator::GreaterThan.evaluate(0.9, 0.8));
    assert!(!Operator::GreaterThan.evaluate(0.7, 0.8));
    assert!(Operator::LessThan.evaluate(0.1, 0.8));
    assert!(Operator::GreaterOrEqual.evaluate(0.8, 0.8));
    assert!(Operator::LessOrEqual.evaluate(0.8, 0.8));
    assert!(Operator::Equal.evaluate(1.0, 1.0));
    assert!(!Operator::Equal.evaluate(1.0, 1.1));
}

#[test]
fn test_clamp_bounds() {
    assert_eq!(clamp(-5, 1, 5), 1);
    assert_eq!(clamp(50, 1, 5), 5);
    assert_eq!(clamp(3, 1, 5), 3);
}

#[test]
fn test_ids_serialize_as_their_uuid() {
    let id = PolicyId::new();
    let json = serde_json::to_string(&id).unwrap();
    let back: PolicyId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}
