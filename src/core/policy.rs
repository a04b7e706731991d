//! TM-004: Permission statements and least-privilege scoping.
//!
//! Every action is classified as resource-scopable or account-wide.
//! Scopable actions must name a concrete resource; account-wide actions
//! (endpoint discovery, listing) must use exactly the wildcard.

use super::graph::{GraphError, Handle};
use super::types::{PermissionStatement, ResourcePattern};

/// Actions the provider evaluates without a resource arity.
const ACCOUNT_WIDE_ACTIONS: &[&str] = &[
    "timestream:DescribeEndpoints",
    "timestream:ListDatabases",
    "timestream:CancelQuery",
    "timestream:SelectValues",
];

/// Whether an action can be scoped to a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Resource,
    AccountWide,
}

/// Classify an action. Unknown actions are resource-scopable.
pub fn action_scope(action: &str) -> ActionScope {
    if ACCOUNT_WIDE_ACTIONS
        .iter()
        .any(|a| a.eq_ignore_ascii_case(action))
    {
        ActionScope::AccountWide
    } else {
        ActionScope::Resource
    }
}

impl PermissionStatement {
    /// Statement on the `Arn` attribute of a declared node.
    pub fn on_arn(handle: &impl Handle, actions: &[&str]) -> Self {
        Self::new(
            ResourcePattern::Attribute {
                node: handle.logical_id().to_string(),
                attribute: "Arn".to_string(),
            },
            actions,
        )
    }

    /// Statement on `*`.
    pub fn wildcard(actions: &[&str]) -> Self {
        Self::new(ResourcePattern::Wildcard, actions)
    }

    /// Build a statement; duplicate actions collapse, first occurrence wins.
    pub fn new(resource: ResourcePattern, actions: &[&str]) -> Self {
        let mut deduped: Vec<String> = Vec::with_capacity(actions.len());
        for action in actions {
            if !deduped.iter().any(|a| a == action) {
                deduped.push((*action).to_string());
            }
        }
        Self {
            resource,
            actions: deduped,
        }
    }

    /// Scope shared by all actions of this statement.
    pub fn scope(&self) -> Result<ActionScope, GraphError> {
        let first = self.actions.first().ok_or(GraphError::EmptyStatement)?;
        let scope = action_scope(first);
        if let Some(other) = self.actions.iter().find(|a| action_scope(a) != scope) {
            return Err(GraphError::MixedScope {
                first: first.clone(),
                other: other.clone(),
            });
        }
        Ok(scope)
    }
}

/// Check a statement against the least-privilege policy.
pub fn check_statement(statement: &PermissionStatement) -> Result<(), GraphError> {
    match (statement.scope()?, &statement.resource) {
        (ActionScope::Resource, ResourcePattern::Wildcard) => Err(GraphError::OverbroadGrant {
            actions: statement.actions.join(", "),
        }),
        (ActionScope::AccountWide, ResourcePattern::Attribute { .. }) => {
            Err(GraphError::UnscopableGrant {
                actions: statement.actions.join(", "),
                resource: statement.resource.to_string(),
            })
        }
        _ => Ok(()),
    }
}
