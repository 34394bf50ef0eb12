use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(PolicyId);
uuid_id!(RuleId);
uuid_id!(ScheduleId);
uuid_id!(NodePoolId);
uuid_id!(NodeId);
uuid_id!(OperationId);
uuid_id!(DeploymentId);

/// What a policy's replica count applies to (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TargetType {
    WorkloadKindA,
    WorkloadKindB,
    WorkloadKindC,
    Nodes,
}

impl TargetType {
    pub fn name(&self) -> &'static str {
        match self {
            TargetType::WorkloadKindA => "workload-kind-a",
            TargetType::WorkloadKindB => "workload-kind-b",
            TargetType::WorkloadKindC => "workload-kind-c",
            TargetType::Nodes => "nodes",
        }
    }
}

/// A rule's comparison operator (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operator {
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
}

impl Operator {
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::GreaterThan => value > threshold,
            Operator::LessThan => value < threshold,
            Operator::GreaterOrEqual => value >= threshold,
            Operator::LessOrEqual => value <= threshold,
            Operator::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

/// Clamp `value` into `[min, max]`, per spec §8 boundary properties.
pub fn clamp(value: i64, min: i64, max: i64) -> i64 {
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_bounds() {
        assert_eq!(clamp(-5, 1, 5), 1);
        assert_eq!(clamp(50, 1, 5), 5);
        assert_eq!(clamp(3, 1, 5), 3);
    }

    #[test]
    fn operator_evaluates_both_directions() {
        assert!(Operator::GreaterThan.evaluate(0.9, 0.8));
        assert!(!Operator::GreaterThan.evaluate(0.7, 0.8));
        assert!(Operator::LessOrEqual.evaluate(0.8, 0.8));
    }
}
