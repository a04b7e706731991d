//! TM-005: Resource graph declaration.
//!
//! Nodes are added through typed declarations that return handles. A table
//! can only be declared from a [`DatastoreHandle`], a rule action only from a
//! [`RoleHandle`] and a [`TableHandle`], so most dangling references cannot
//! be expressed. The builder records three kinds of edges:
//! - `DependsOn`: table → datastore (the table names its datastore literally)
//! - `Grant`: role → node named by a scoped permission statement
//! - `Reference`: rule → role and rule → table, for every action
//!
//! Declarations are idempotent: the same logical id with identical
//! properties returns the existing handle.

use super::policy;
use super::template;
use super::types::*;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Structural error in a declaration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("unknown {kind} '{id}'")]
    UnknownNode { kind: NodeKind, id: String },

    #[error("'{from}' references undeclared node '{to}'")]
    DanglingReference { from: String, to: String },

    #[error("'{id}' already declared as a {existing} with different properties")]
    Conflict { id: String, existing: NodeKind },

    #[error("{kind} name '{name}' is used by both '{first}' and '{second}'")]
    NameCollision {
        kind: NodeKind,
        name: String,
        first: String,
        second: String,
    },

    #[error("resource-scopable actions [{actions}] must not use the wildcard resource")]
    OverbroadGrant { actions: String },

    #[error("account-wide actions [{actions}] cannot be scoped to {resource}; use '*'")]
    UnscopableGrant { actions: String, resource: String },

    #[error("statement mixes scopes: '{first}' and '{other}'")]
    MixedScope { first: String, other: String },

    #[error("permission statement has no actions")]
    EmptyStatement,

    #[error("invalid name for '{id}': {reason}")]
    InvalidName { id: String, reason: String },

    #[error("invalid expression in '{id}': {reason}")]
    InvalidExpression { id: String, reason: String },

    #[error("dimension '{dimension}' of '{rule}' declared more than once")]
    DuplicateDimension { rule: String, dimension: String },

    #[error("dimension '{dimension}' of '{rule}' uses topic({index}) but the filter has {depth} segment(s)")]
    TopicIndexOutOfRange {
        rule: String,
        dimension: String,
        index: usize,
        depth: usize,
    },

    #[error("table '{table}' has no explicit ordering edge to datastore '{datastore}'")]
    MissingOrdering { table: String, datastore: String },

    #[error("dependency cycle detected involving: {0}")]
    Cycle(String),
}

/// Anything that names a node in the graph.
pub trait Handle {
    fn logical_id(&self) -> &str;
}

/// Reference to a declared access role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHandle {
    id: String,
}

/// Reference to a declared datastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreHandle {
    id: String,
    name: String,
}

impl DatastoreHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Reference to a declared table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    id: String,
    name: String,
    datastore_name: String,
}

impl TableHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datastore_name(&self) -> &str {
        &self.datastore_name
    }
}

/// Reference to a declared routing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHandle {
    id: String,
}

macro_rules! impl_handle {
    ($($t:ty),*) => {
        $(impl Handle for $t {
            fn logical_id(&self) -> &str {
                &self.id
            }
        })*
    };
}

impl_handle!(RoleHandle, DatastoreHandle, TableHandle, RuleHandle);

impl TimestreamAction {
    /// Write action assuming `role`, targeting `table`.
    pub fn new(role: &RoleHandle, table: &TableHandle, dimensions: Vec<Dimension>) -> Self {
        Self {
            role_id: role.id.clone(),
            table_id: table.id.clone(),
            datastore_name: table.datastore_name.clone(),
            table_name: table.name.clone(),
            dimensions,
        }
    }
}

/// The declared resource graph of one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackGraph {
    name: String,
    description: Option<String>,
    nodes: IndexMap<String, Node>,
    edges: Vec<Edge>,
}

impl StackGraph {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            nodes: IndexMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Explicit depends-on targets of a node, in insertion order.
    pub fn depends_on(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == id && e.kind == EdgeKind::DependsOn)
            .map(|e| e.to.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    /// Declare an access role assumable by `trusted_principal`.
    pub fn declare_role(
        &mut self,
        logical_id: &str,
        trusted_principal: &str,
    ) -> Result<RoleHandle, GraphError> {
        check_logical_id(logical_id)?;
        let handle = RoleHandle {
            id: logical_id.to_string(),
        };
        if let Some(existing) = self.nodes.get(logical_id) {
            return match &existing.props {
                NodeProps::AccessRole(r) if r.trusted_principal == trusted_principal => Ok(handle),
                _ => Err(conflict(existing)),
            };
        }
        self.insert(
            logical_id,
            NodeProps::AccessRole(AccessRole {
                trusted_principal: trusted_principal.to_string(),
                statements: Vec::new(),
            }),
        );
        Ok(handle)
    }

    /// Declare a datastore named `name`.
    pub fn declare_datastore(
        &mut self,
        logical_id: &str,
        name: &str,
    ) -> Result<DatastoreHandle, GraphError> {
        check_logical_id(logical_id)?;
        check_timestream_name(logical_id, name)?;
        let handle = DatastoreHandle {
            id: logical_id.to_string(),
            name: name.to_string(),
        };
        if let Some(existing) = self.nodes.get(logical_id) {
            return match &existing.props {
                NodeProps::Datastore(d) if d.name == name => Ok(handle),
                _ => Err(conflict(existing)),
            };
        }
        self.check_name_free(NodeKind::Datastore, logical_id, |props| match props {
            NodeProps::Datastore(d) => d.name == name,
            _ => false,
        })?;
        self.insert(
            logical_id,
            NodeProps::Datastore(Datastore {
                name: name.to_string(),
            }),
        );
        Ok(handle)
    }

    /// Declare a table inside `datastore`. Records the explicit ordering edge.
    pub fn declare_table(
        &mut self,
        datastore: &DatastoreHandle,
        logical_id: &str,
        name: &str,
    ) -> Result<TableHandle, GraphError> {
        check_logical_id(logical_id)?;
        check_timestream_name(logical_id, name)?;
        self.expect_node(NodeKind::Datastore, &datastore.id, |props| {
            matches!(props, NodeProps::Datastore(d) if d.name == datastore.name)
        })?;

        let table = DataTable {
            name: name.to_string(),
            datastore_name: datastore.name.clone(),
            datastore_id: datastore.id.clone(),
        };
        let handle = TableHandle {
            id: logical_id.to_string(),
            name: name.to_string(),
            datastore_name: datastore.name.clone(),
        };
        if let Some(existing) = self.nodes.get(logical_id) {
            return match &existing.props {
                NodeProps::DataTable(t) if *t == table => Ok(handle),
                _ => Err(conflict(existing)),
            };
        }
        self.check_name_free(NodeKind::DataTable, logical_id, |props| match props {
            NodeProps::DataTable(t) => t.name == name && t.datastore_name == datastore.name,
            _ => false,
        })?;

        self.insert(logical_id, NodeProps::DataTable(table));
        self.add_edge(logical_id, &datastore.id, EdgeKind::DependsOn);
        Ok(handle)
    }

    /// Append a permission statement to `role`.
    pub fn grant(
        &mut self,
        role: &RoleHandle,
        statement: PermissionStatement,
    ) -> Result<(), GraphError> {
        policy::check_statement(&statement)?;
        if let ResourcePattern::Attribute { node, .. } = &statement.resource {
            if !self.nodes.contains_key(node) {
                return Err(GraphError::DanglingReference {
                    from: role.id.clone(),
                    to: node.clone(),
                });
            }
        }
        self.expect_node(NodeKind::AccessRole, &role.id, |props| {
            matches!(props, NodeProps::AccessRole(_))
        })?;

        let target = match &statement.resource {
            ResourcePattern::Attribute { node, .. } => Some(node.clone()),
            ResourcePattern::Wildcard => None,
        };
        let Some(NodeProps::AccessRole(r)) = self.nodes.get_mut(&role.id).map(|n| &mut n.props)
        else {
            return Err(GraphError::UnknownNode {
                kind: NodeKind::AccessRole,
                id: role.id.clone(),
            });
        };
        if r.statements.contains(&statement) {
            return Ok(());
        }
        debug!(role = %role.id, resource = %statement.resource, actions = ?statement.actions, "grant");
        r.statements.push(statement);
        if let Some(target) = target {
            self.add_edge(&role.id, &target, EdgeKind::Grant);
        }
        Ok(())
    }

    /// Declare a routing rule. Records reference edges to every role and
    /// table its actions use.
    pub fn declare_rule(
        &mut self,
        logical_id: &str,
        name: &str,
        sql: &str,
        description: &str,
        actions: Vec<RuleAction>,
    ) -> Result<RuleHandle, GraphError> {
        self.declare_rule_versioned(
            logical_id,
            name,
            sql,
            DEFAULT_SQL_VERSION,
            description,
            actions,
        )
    }

    /// [`Self::declare_rule`] with an explicit rule-engine SQL version.
    pub fn declare_rule_versioned(
        &mut self,
        logical_id: &str,
        name: &str,
        sql: &str,
        sql_version: &str,
        description: &str,
        actions: Vec<RuleAction>,
    ) -> Result<RuleHandle, GraphError> {
        check_logical_id(logical_id)?;
        check_rule_name(logical_id, name)?;
        let filter = template::topic_filter(sql).map_err(|reason| GraphError::InvalidExpression {
            id: logical_id.to_string(),
            reason,
        })?;
        for action in &actions {
            self.check_action(logical_id, &filter, action)?;
        }

        let rule = RoutingRule {
            name: name.to_string(),
            sql: sql.to_string(),
            sql_version: sql_version.to_string(),
            description: description.to_string(),
            actions,
        };
        let handle = RuleHandle {
            id: logical_id.to_string(),
        };
        if let Some(existing) = self.nodes.get(logical_id) {
            return match &existing.props {
                NodeProps::RoutingRule(r) if *r == rule => Ok(handle),
                _ => Err(conflict(existing)),
            };
        }
        self.check_name_free(NodeKind::RoutingRule, logical_id, |props| match props {
            NodeProps::RoutingRule(r) => r.name == name,
            _ => false,
        })?;

        let mut referenced: Vec<String> = Vec::new();
        for RuleAction::Timestream(a) in &rule.actions {
            for id in [&a.role_id, &a.table_id] {
                if !referenced.contains(id) {
                    referenced.push(id.clone());
                }
            }
        }
        self.insert(logical_id, NodeProps::RoutingRule(rule));
        for id in referenced {
            self.add_edge(logical_id, &id, EdgeKind::Reference);
        }
        Ok(handle)
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Re-check the whole graph. Returns every structural error found.
    pub fn validate(&self) -> Vec<GraphError> {
        let mut errors = Vec::new();

        for edge in &self.edges {
            for id in [&edge.from, &edge.to] {
                let dangling = GraphError::DanglingReference {
                    from: edge.from.clone(),
                    to: id.clone(),
                };
                if !self.nodes.contains_key(id) && !errors.contains(&dangling) {
                    errors.push(dangling);
                }
            }
        }

        for node in self.nodes.values() {
            match &node.props {
                NodeProps::DataTable(t) => {
                    if !self.depends_on(&node.id).contains(&t.datastore_id.as_str()) {
                        errors.push(GraphError::MissingOrdering {
                            table: node.id.clone(),
                            datastore: t.datastore_id.clone(),
                        });
                    }
                }
                NodeProps::AccessRole(r) => {
                    for s in &r.statements {
                        if let Err(e) = policy::check_statement(s) {
                            errors.push(e);
                        }
                        if let ResourcePattern::Attribute { node: target, .. } = &s.resource {
                            let dangling = GraphError::DanglingReference {
                                from: node.id.clone(),
                                to: target.clone(),
                            };
                            if !self.nodes.contains_key(target) && !errors.contains(&dangling) {
                                errors.push(dangling);
                            }
                        }
                    }
                }
                NodeProps::RoutingRule(r) => match template::topic_filter(&r.sql) {
                    Ok(filter) => {
                        for action in &r.actions {
                            if let Err(e) = self.check_action(&node.id, &filter, action) {
                                errors.push(e);
                            }
                        }
                    }
                    Err(reason) => errors.push(GraphError::InvalidExpression {
                        id: node.id.clone(),
                        reason,
                    }),
                },
                NodeProps::Datastore(_) => {}
            }
        }

        if let Err(members) = super::planner::deploy_order(self) {
            errors.push(GraphError::Cycle(members));
        }

        errors
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn insert(&mut self, id: &str, props: NodeProps) {
        let node = Node {
            id: id.to_string(),
            props,
        };
        debug!(id, kind = %node.kind(), "declare");
        self.nodes.insert(id.to_string(), node);
    }

    fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        let edge = Edge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        };
        if !self.edges.contains(&edge) {
            debug!(from, to, %kind, "edge");
            self.edges.push(edge);
        }
    }

    fn expect_node(
        &self,
        kind: NodeKind,
        id: &str,
        matches: impl Fn(&NodeProps) -> bool,
    ) -> Result<(), GraphError> {
        match self.nodes.get(id) {
            Some(node) if matches(&node.props) => Ok(()),
            _ => Err(GraphError::UnknownNode {
                kind,
                id: id.to_string(),
            }),
        }
    }

    fn check_name_free(
        &self,
        kind: NodeKind,
        id: &str,
        same_name: impl Fn(&NodeProps) -> bool,
    ) -> Result<(), GraphError> {
        match self
            .nodes
            .values()
            .find(|n| n.id != id && same_name(&n.props))
        {
            Some(other) => Err(GraphError::NameCollision {
                kind,
                name: physical_name(other).to_string(),
                first: other.id.clone(),
                second: id.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn check_action(
        &self,
        rule_id: &str,
        filter: &str,
        action: &RuleAction,
    ) -> Result<(), GraphError> {
        let RuleAction::Timestream(a) = action;
        self.expect_node(NodeKind::AccessRole, &a.role_id, |props| {
            matches!(props, NodeProps::AccessRole(_))
        })?;
        self.expect_node(NodeKind::DataTable, &a.table_id, |props| {
            matches!(props, NodeProps::DataTable(t)
                if t.name == a.table_name && t.datastore_name == a.datastore_name)
        })?;
        if let Some(err) = check_dimension_names(rule_id, &a.dimensions).into_iter().next() {
            return Err(err);
        }
        for dim in &a.dimensions {
            template::parse_template(&dim.value).map_err(|reason| {
                GraphError::InvalidExpression {
                    id: format!("{}/{}", rule_id, dim.name),
                    reason,
                }
            })?;
            if let Err((index, depth)) = template::check_topic_indexes(&dim.value, filter) {
                return Err(GraphError::TopicIndexOutOfRange {
                    rule: rule_id.to_string(),
                    dimension: dim.name.clone(),
                    index,
                    depth,
                });
            }
        }
        Ok(())
    }
}

fn conflict(existing: &Node) -> GraphError {
    GraphError::Conflict {
        id: existing.id.clone(),
        existing: existing.kind(),
    }
}

fn physical_name(node: &Node) -> &str {
    match &node.props {
        NodeProps::Datastore(d) => &d.name,
        NodeProps::DataTable(t) => &t.name,
        NodeProps::RoutingRule(r) => &r.name,
        NodeProps::AccessRole(_) => &node.id,
    }
}

/// Dimension names of one action: non-empty and unique. Returns every
/// violation.
pub fn check_dimension_names(rule_id: &str, dimensions: &[Dimension]) -> Vec<GraphError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for dim in dimensions {
        if dim.name.is_empty() {
            errors.push(GraphError::InvalidName {
                id: rule_id.to_string(),
                reason: "dimension name must not be empty".to_string(),
            });
            continue;
        }
        if !seen.insert(dim.name.as_str()) {
            let dup = GraphError::DuplicateDimension {
                rule: rule_id.to_string(),
                dimension: dim.name.clone(),
            };
            if !errors.contains(&dup) {
                errors.push(dup);
            }
        }
    }
    errors
}

/// Logical ids are alphanumeric, like template resource keys.
fn check_logical_id(id: &str) -> Result<(), GraphError> {
    if id.is_empty() || id.len() > 255 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GraphError::InvalidName {
            id: id.to_string(),
            reason: "logical ids must be 1-255 alphanumeric characters".to_string(),
        });
    }
    Ok(())
}

/// Timestream database and table names: `[A-Za-z0-9_.-]{3,256}`.
pub fn check_timestream_name(id: &str, name: &str) -> Result<(), GraphError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !(3..=256).contains(&name.len()) || !valid_chars {
        return Err(GraphError::InvalidName {
            id: id.to_string(),
            reason: format!("'{}' must match [A-Za-z0-9_.-]{{3,256}}", name),
        });
    }
    Ok(())
}

/// Topic rule names: `[A-Za-z0-9_]{1,128}`.
pub fn check_rule_name(id: &str, name: &str) -> Result<(), GraphError> {
    let valid_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if name.is_empty() || name.len() > 128 || !valid_chars {
        return Err(GraphError::InvalidName {
            id: id.to_string(),
            reason: format!("'{}' must match [A-Za-z0-9_]{{1,128}}", name),
        });
    }
    Ok(())
}
