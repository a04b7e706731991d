//! TM-001: Core types: stack configuration, resource graph, template, manifest.
//!
//! Configuration types derive Serialize/Deserialize/JsonSchema for YAML
//! roundtripping and schema export. Graph types are built only through
//! [`crate::core::graph::StackGraph`], so their fields are read-only outside it.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Fixed naming surface
// ============================================================================

pub const DEFAULT_STACK_NAME: &str = "TempMonitorStack";
pub const DEFAULT_PRINCIPAL: &str = "iot.amazonaws.com";
pub const DEFAULT_ROLE_ID: &str = "IotTempRuleTimestreamRole";
pub const DEFAULT_DATASTORE: &str = "TemperatureDatastore";
pub const DEFAULT_TABLE: &str = "TemperatureTable";
pub const DEFAULT_RULE_ID: &str = "TemperatureRule";
pub const DEFAULT_RULE_NAME: &str = "forward_readings_to_timeseries";
pub const DEFAULT_RULE_SQL: &str = "SELECT * FROM 'temp/+/reading'";
pub const DEFAULT_SQL_VERSION: &str = "2016-03-23";
pub const DEFAULT_RULE_DESCRIPTION: &str =
    "This rule forwards our temperature messages to our timeseries database.";

pub const WRITE_RECORDS: &str = "timestream:WriteRecords";
pub const DESCRIBE_ENDPOINTS: &str = "timestream:DescribeEndpoints";

// ============================================================================
// Top-level tempmon.yaml
// ============================================================================

/// Root configuration: the parameters of the declared stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StackConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Stack name, used as the construct path prefix
    pub name: String,

    /// Optional template description
    #[serde(default)]
    pub description: Option<String>,

    /// Service principal allowed to assume the access role
    #[serde(default = "default_principal")]
    pub principal: String,

    /// Logical id of the access role
    #[serde(default = "default_role_id")]
    pub role_id: String,

    /// Time-series datastore
    #[serde(default = "default_datastore")]
    pub datastore: NamedResourceConfig,

    /// Table inside the datastore
    #[serde(default = "default_table")]
    pub table: NamedResourceConfig,

    /// Routing rule forwarding readings to the table
    #[serde(default)]
    pub rule: RuleConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: DEFAULT_STACK_NAME.to_string(),
            description: None,
            principal: default_principal(),
            role_id: default_role_id(),
            datastore: default_datastore(),
            table: default_table(),
            rule: RuleConfig::default(),
        }
    }
}

/// A resource with a logical id and a physical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NamedResourceConfig {
    /// Logical id in the template
    pub id: String,

    /// Physical name
    pub name: String,
}

/// Routing rule parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleConfig {
    #[serde(default = "default_rule_id")]
    pub id: String,

    #[serde(default = "default_rule_name")]
    pub name: String,

    /// Filter query selecting inbound messages
    #[serde(default = "default_rule_sql")]
    pub sql: String,

    #[serde(default = "default_sql_version")]
    pub sql_version: String,

    #[serde(default = "default_rule_description")]
    pub description: String,

    /// Dimensions extracted from each message, in order
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<Dimension>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            id: default_rule_id(),
            name: default_rule_name(),
            sql: default_rule_sql(),
            sql_version: default_sql_version(),
            description: default_rule_description(),
            dimensions: default_dimensions(),
        }
    }
}

fn default_principal() -> String {
    DEFAULT_PRINCIPAL.to_string()
}

fn default_role_id() -> String {
    DEFAULT_ROLE_ID.to_string()
}

fn default_datastore() -> NamedResourceConfig {
    NamedResourceConfig {
        id: DEFAULT_DATASTORE.to_string(),
        name: DEFAULT_DATASTORE.to_string(),
    }
}

fn default_table() -> NamedResourceConfig {
    NamedResourceConfig {
        id: DEFAULT_TABLE.to_string(),
        name: DEFAULT_TABLE.to_string(),
    }
}

fn default_rule_id() -> String {
    DEFAULT_RULE_ID.to_string()
}

fn default_rule_name() -> String {
    DEFAULT_RULE_NAME.to_string()
}

fn default_rule_sql() -> String {
    DEFAULT_RULE_SQL.to_string()
}

fn default_sql_version() -> String {
    DEFAULT_SQL_VERSION.to_string()
}

fn default_rule_description() -> String {
    DEFAULT_RULE_DESCRIPTION.to_string()
}

fn default_dimensions() -> Vec<Dimension> {
    vec![
        Dimension::new("temperature", "${temperature}"),
        Dimension::new("deviceId", "${topic(2)}"),
    ]
}

// ============================================================================
// Resource graph
// ============================================================================

/// Kind of a node in the resource graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    AccessRole,
    Datastore,
    DataTable,
    RoutingRule,
}

impl NodeKind {
    /// Provider resource type emitted in the template.
    pub fn resource_type(self) -> &'static str {
        match self {
            Self::AccessRole => "AWS::IAM::Role",
            Self::Datastore => "AWS::Timestream::Database",
            Self::DataTable => "AWS::Timestream::Table",
            Self::RoutingRule => "AWS::IoT::TopicRule",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessRole => write!(f, "access_role"),
            Self::Datastore => write!(f, "datastore"),
            Self::DataTable => write!(f, "data_table"),
            Self::RoutingRule => write!(f, "routing_rule"),
        }
    }
}

/// A declared resource: logical id plus typed properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub props: NodeProps,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self.props {
            NodeProps::AccessRole(_) => NodeKind::AccessRole,
            NodeProps::Datastore(_) => NodeKind::Datastore,
            NodeProps::DataTable(_) => NodeKind::DataTable,
            NodeProps::RoutingRule(_) => NodeKind::RoutingRule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeProps {
    AccessRole(AccessRole),
    Datastore(Datastore),
    DataTable(DataTable),
    RoutingRule(RoutingRule),
}

/// Identity principal plus its permission statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRole {
    pub trusted_principal: String,
    pub statements: Vec<PermissionStatement>,
}

/// Named container for time-series tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Datastore {
    pub name: String,
}

/// Table owned by a datastore, referenced by the datastore's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataTable {
    pub name: String,
    pub datastore_name: String,
    pub datastore_id: String,
}

/// Filter + actions pairing evaluated by the routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingRule {
    pub name: String,
    pub sql: String,
    pub sql_version: String,
    pub description: String,
    pub actions: Vec<RuleAction>,
}

/// Action executed for every matching message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Timestream(TimestreamAction),
}

/// Write matching messages into a time-series table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimestreamAction {
    pub role_id: String,
    pub table_id: String,
    pub datastore_name: String,
    pub table_name: String,
    pub dimensions: Vec<Dimension>,
}

/// Named value extracted from the inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Dimension {
    pub name: String,
    /// Substitution template, e.g. `${temperature}` or `${topic(2)}`
    pub value: String,
}

impl Dimension {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Resource a permission statement applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePattern {
    /// `*`, only for actions with no resource arity
    Wildcard,
    /// Attribute of a declared node, e.g. the table's `Arn`
    Attribute { node: String, attribute: String },
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => write!(f, "*"),
            Self::Attribute { node, attribute } => write!(f, "{}.{}", node, attribute),
        }
    }
}

/// Allow-statement attached to an access role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PermissionStatement {
    pub resource: ResourcePattern,
    pub actions: Vec<String>,
}

/// Kind of a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Explicit ordering not implied by any attribute reference
    DependsOn,
    /// Implicit ordering through an attribute reference
    Reference,
    /// Permission statement scoped on the target
    Grant,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependsOn => write!(f, "depends-on"),
            Self::Reference => write!(f, "reference"),
            Self::Grant => write!(f, "grant"),
        }
    }
}

/// Directed edge: `from` must be created after `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

// ============================================================================
// Manifest / Lock file
// ============================================================================

/// Lock written next to the synthesized template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthManifest {
    /// Schema version
    pub schema: String,

    /// Stack name
    pub stack: String,

    /// When the manifest was generated
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// BLAKE3 hash of the rendered template file
    pub template_hash: String,

    /// Per-resource state, in declaration order
    pub resources: IndexMap<String, ResourceLock>,
}

/// Per-resource lock entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLock {
    /// Provider resource type
    #[serde(rename = "type")]
    pub resource_type: String,

    /// BLAKE3 hash of the synthesized resource body
    pub hash: String,

    /// Explicit ordering edges
    #[serde(default)]
    pub depends_on: Vec<String>,
}

// ============================================================================
// Plan
// ============================================================================

/// Action the provisioning engine would take on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// Logical id
    pub logical_id: String,

    /// Provider resource type
    pub resource_type: String,

    /// Action to take
    pub action: PlanAction,

    /// Human-readable description
    pub description: String,
}

/// Diff of the current declaration against the last synthesis.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Stack name
    pub name: String,

    /// Planned changes in deploy order, destroys last
    pub changes: Vec<PlannedChange>,

    /// Topological creation order (logical ids)
    pub deploy_order: Vec<String>,

    /// Summary counts
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

// ============================================================================
// Provenance events
// ============================================================================

/// Provenance event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvenanceEvent {
    SynthStarted {
        stack: String,
        run_id: String,
        tempmon_version: String,
    },
    ResourceDeclared {
        stack: String,
        resource: String,
        resource_type: String,
        hash: String,
    },
    SynthCompleted {
        stack: String,
        run_id: String,
        resources: u32,
        template_hash: String,
        total_seconds: f64,
    },
    DriftDetected {
        stack: String,
        resource: String,
        expected_hash: String,
        actual_hash: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: ProvenanceEvent,
}

// ============================================================================
// Tests
// ============================================================================
