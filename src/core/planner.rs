//! TM-008: Deploy ordering and plan generation.
//!
//! Deploy order is a topological sort over every edge kind (Kahn's algorithm,
//! alphabetical tie-breaking). Plans diff the synthesized template against
//! the manifest of the previous synthesis.

use super::graph::StackGraph;
use super::synth::{Template, TemplateResource};
use super::types::*;
use crate::tripwire::hasher;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Creation order of all nodes. Edges to undeclared nodes are ignored here;
/// [`StackGraph::validate`] reports them.
pub fn deploy_order(graph: &StackGraph) -> Result<Vec<String>, String> {
    let ids: Vec<&str> = graph.nodes().map(|n| n.id.as_str()).collect();
    let mut in_degree: HashMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    for edge in graph.edges() {
        let (from, to) = (edge.from.as_str(), edge.to.as_str());
        if !in_degree.contains_key(from) || !in_degree.contains_key(to) {
            continue;
        }
        // Parallel edges of different kinds count once.
        if !seen.insert((from, to)) {
            continue;
        }
        dependents.entry(to).or_default().push(from);
        if let Some(d) = in_degree.get_mut(from) {
            *d += 1;
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(ids.len());
    while let Some(current) = ready.pop_first() {
        order.push(current.to_string());
        for dependent in dependents.get(current).into_iter().flatten() {
            if let Some(d) = in_degree.get_mut(dependent) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() != ids.len() {
        let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut members: Vec<&str> = ids.into_iter().filter(|id| !ordered.contains(id)).collect();
        members.sort_unstable();
        return Err(members.join(", "));
    }

    Ok(order)
}

/// Diff `template` against the previous manifest.
pub fn plan(
    graph: &StackGraph,
    template: &Template,
    previous: Option<&SynthManifest>,
) -> Result<ExecutionPlan, String> {
    let order = deploy_order(graph)
        .map_err(|m| format!("dependency cycle detected involving: {}", m))?;

    let mut changes = Vec::new();
    let mut to_create = 0u32;
    let mut to_update = 0u32;
    let mut to_destroy = 0u32;
    let mut unchanged = 0u32;

    for id in &order {
        let Some(resource) = template.resources.get(id) else {
            continue;
        };
        let action = determine_action(id, resource, previous);
        match action {
            PlanAction::Create => to_create += 1,
            PlanAction::Update => to_update += 1,
            PlanAction::Destroy => to_destroy += 1,
            PlanAction::NoOp => unchanged += 1,
        }
        changes.push(PlannedChange {
            logical_id: id.clone(),
            resource_type: resource.resource_type.clone(),
            description: describe_action(id, resource, &action),
            action,
        });
    }

    if let Some(prev) = previous {
        for (id, lock) in prev.resources.iter().rev() {
            if template.resources.contains_key(id) {
                continue;
            }
            to_destroy += 1;
            changes.push(PlannedChange {
                logical_id: id.clone(),
                resource_type: lock.resource_type.clone(),
                action: PlanAction::Destroy,
                description: format!("{}: destroy {}", id, lock.resource_type),
            });
        }
    }

    Ok(ExecutionPlan {
        name: graph.name().to_string(),
        changes,
        deploy_order: order,
        to_create,
        to_update,
        to_destroy,
        unchanged,
    })
}

fn determine_action(
    id: &str,
    resource: &TemplateResource,
    previous: Option<&SynthManifest>,
) -> PlanAction {
    let Some(lock) = previous.and_then(|p| p.resources.get(id)) else {
        return PlanAction::Create;
    };
    if lock.resource_type != resource.resource_type {
        // Type changes replace the resource; reported as an update here.
        return PlanAction::Update;
    }
    if lock.hash == hasher::hash_resource(resource) {
        PlanAction::NoOp
    } else {
        PlanAction::Update
    }
}

fn describe_action(id: &str, resource: &TemplateResource, action: &PlanAction) -> String {
    match action {
        PlanAction::Create => {
            let after = if resource.depends_on.is_empty() {
                String::new()
            } else {
                format!(" (after {})", resource.depends_on.join(", "))
            };
            format!("{}: create {}{}", id, resource.resource_type, after)
        }
        PlanAction::Update => format!("{}: update (properties changed)", id),
        PlanAction::Destroy => format!("{}: destroy", id),
        PlanAction::NoOp => format!("{}: no changes", id),
    }
}
