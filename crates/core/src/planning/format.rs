use serde_json::Value;

use crate::autoscaling::PolicyOperation;
use crate::replication::ReplicaOperation;

use super::classify::ClassifiedChange;
use super::schedule::{Operation, Plan};

fn render(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "(none)".to_string(),
    }
}

fn format_change(change: &ClassifiedChange) -> String {
    let entry = change.change();
    let detail = match (&entry.old, &entry.new) {
        (None, _) => render(&entry.new),
        (_, None) => render(&entry.old),
        _ => format!("{} -> {}", render(&entry.old), render(&entry.new)),
    };
    format!(
        "  {} {}: {} [{}]",
        entry.kind.symbol(),
        entry.path,
        detail,
        change.strategy()
    )
}

fn format_policy(op: &PolicyOperation) -> String {
    let policy = op.policy();
    match op {
        PolicyOperation::Put(_) => format!(
            "  + Scaling policy: {} {} ({}..{} @ {}%)",
            policy.target,
            policy.dimension,
            policy.min_capacity,
            policy.max_capacity,
            policy.target_utilization_percent
        ),
        PolicyOperation::Delete(_) => {
            format!("  - Scaling policy: {} {}", policy.target, policy.dimension)
        }
    }
}

fn format_replica(op: &ReplicaOperation) -> String {
    match op {
        ReplicaOperation::Add { region } => format!("  + Replica: {}", region),
        ReplicaOperation::Remove { region } => format!("  - Replica: {}", region),
    }
}

/// Pure function: Format a plan for display, one line per operation.
pub fn format_plan(plan: &Plan) -> Vec<String> {
    if plan.is_empty() && plan.ignored.is_empty() {
        return vec![format!("= Table '{}' is up to date", plan.resource)];
    }

    let mut lines = Vec::new();
    if !plan.is_empty() {
        lines.push(format!(
            "~ Converge table: {} ({} unit(s))",
            plan.resource,
            plan.units.len()
        ));
    }
    for unit in &plan.units {
        lines.push(format!("Unit {}: {}", unit.index, unit.kind));
        for op in &unit.operations {
            lines.push(match op {
                Operation::Table(change) => format_change(change),
                Operation::Policy(policy) => format_policy(policy),
                Operation::Replica(replica) => format_replica(replica),
            });
        }
    }
    if !plan.ignored.is_empty() {
        lines.push("Ignored (externally managed):".to_string());
        lines.extend(plan.ignored.iter().map(format_change));
    }
    lines
}
