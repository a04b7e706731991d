//! TM-006: Template synthesis: render a graph as a provisioning template.
//!
//! Output is deterministic: resources keep declaration order, property maps
//! are key-sorted, and rendering always ends in a single newline.

use super::graph::StackGraph;
use super::types::*;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Synthesized template document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Resources")]
    pub resources: IndexMap<String, TemplateResource>,
}

/// One resource entry of the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(rename = "Properties")]
    pub properties: Value,

    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(rename = "Metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Render the whole graph.
pub fn synthesize(graph: &StackGraph) -> Template {
    let resources = graph
        .nodes()
        .map(|node| {
            let resource = TemplateResource {
                resource_type: node.kind().resource_type().to_string(),
                properties: properties(node),
                depends_on: graph
                    .depends_on(&node.id)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                metadata: Some(json!({
                    "aws:cdk:path": format!("{}/{}/Resource", graph.name(), node.id)
                })),
            };
            (node.id.clone(), resource)
        })
        .collect();

    Template {
        format_version: TEMPLATE_FORMAT_VERSION.to_string(),
        description: graph.description().map(str::to_string),
        resources,
    }
}

/// Pretty JSON with a trailing newline.
pub fn render(template: &Template) -> Result<String, String> {
    let mut out = serde_json::to_string_pretty(template)
        .map_err(|e| format!("template serialize error: {}", e))?;
    out.push('\n');
    Ok(out)
}

/// Parse a rendered template back (used by drift detection).
pub fn parse(json: &str) -> Result<Template, String> {
    serde_json::from_str(json).map_err(|e| format!("template parse error: {}", e))
}

fn get_att(id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id, attribute] })
}

fn properties(node: &Node) -> Value {
    match &node.props {
        NodeProps::AccessRole(role) => role_properties(&node.id, role),
        NodeProps::Datastore(ds) => json!({ "DatabaseName": ds.name }),
        NodeProps::DataTable(t) => json!({
            "DatabaseName": t.datastore_name,
            "TableName": t.name,
        }),
        NodeProps::RoutingRule(rule) => rule_properties(rule),
    }
}

fn role_properties(id: &str, role: &AccessRole) -> Value {
    let mut props = json!({
        "AssumeRolePolicyDocument": {
            "Version": "2012-10-17",
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": role.trusted_principal },
            }],
        },
    });
    if !role.statements.is_empty() {
        let statements: Vec<Value> = role.statements.iter().map(statement).collect();
        props["Policies"] = json!([{
            "PolicyName": format!("{}DefaultPolicy", id),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": statements,
            },
        }]);
    }
    props
}

/// A single action renders as a string, several as a list.
fn statement(s: &PermissionStatement) -> Value {
    let action = match s.actions.as_slice() {
        [one] => json!(one),
        many => json!(many),
    };
    let resource = match &s.resource {
        ResourcePattern::Wildcard => json!("*"),
        ResourcePattern::Attribute { node, attribute } => get_att(node, attribute),
    };
    json!({
        "Action": action,
        "Effect": "Allow",
        "Resource": resource,
    })
}

fn rule_properties(rule: &RoutingRule) -> Value {
    let actions: Vec<Value> = rule
        .actions
        .iter()
        .map(|action| match action {
            RuleAction::Timestream(a) => {
                let dimensions: Vec<Value> = a
                    .dimensions
                    .iter()
                    .map(|d| json!({ "Name": d.name, "Value": d.value }))
                    .collect();
                json!({
                    "Timestream": {
                        "RoleArn": get_att(&a.role_id, "Arn"),
                        "DatabaseName": a.datastore_name,
                        "TableName": a.table_name,
                        "Dimensions": dimensions,
                    }
                })
            }
        })
        .collect();

    json!({
        "RuleName": rule.name,
        "TopicRulePayload": {
            "Actions": actions,
            "AwsIotSqlVersion": rule.sql_version,
            "Description": rule.description,
            "RuleDisabled": false,
            "Sql": rule.sql,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stack::declare_stack;

    fn default_template() -> Template {
        synthesize(&declare_stack(&StackConfig::default()).unwrap())
    }

    #[test]
    fn test_tm006_resource_types_in_declaration_order() {
        let t = default_template();
        let types: Vec<_> = t
            .resources
            .values()
            .map(|r| r.resource_type.as_str())
            .collect();
        assert_eq!(
            types,
            vec![
                "AWS::IAM::Role",
                "AWS::Timestream::Database",
                "AWS::Timestream::Table",
                "AWS::IoT::TopicRule",
            ]
        );
    }

    #[test]
    fn test_tm006_table_depends_on_datastore() {
        let t = default_template();
        assert_eq!(
            t.resources[DEFAULT_TABLE].depends_on,
            vec![DEFAULT_DATASTORE.to_string()]
        );
        assert!(t.resources[DEFAULT_RULE_ID].depends_on.is_empty());
        assert_eq!(
            t.resources[DEFAULT_TABLE].properties["DatabaseName"],
            json!(DEFAULT_DATASTORE)
        );
    }

    #[test]
    fn test_tm006_role_policies() {
        let t = default_template();
        let role = &t.resources[DEFAULT_ROLE_ID].properties;
        assert_eq!(
            role["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            json!("iot.amazonaws.com")
        );
        let stmts = &role["Policies"][0]["PolicyDocument"]["Statement"];
        assert_eq!(stmts[0]["Action"], json!("timestream:WriteRecords"));
        assert_eq!(
            stmts[0]["Resource"],
            json!({ "Fn::GetAtt": ["TemperatureTable", "Arn"] })
        );
        assert_eq!(stmts[1]["Action"], json!("timestream:DescribeEndpoints"));
        assert_eq!(stmts[1]["Resource"], json!("*"));
    }

    #[test]
    fn test_tm006_rule_payload() {
        let t = default_template();
        let rule = &t.resources[DEFAULT_RULE_ID].properties;
        assert_eq!(rule["RuleName"], json!("forward_readings_to_timeseries"));
        let payload = &rule["TopicRulePayload"];
        assert_eq!(payload["Sql"], json!("SELECT * FROM 'temp/+/reading'"));
        assert_eq!(payload["AwsIotSqlVersion"], json!("2016-03-23"));
        let ts = &payload["Actions"][0]["Timestream"];
        assert_eq!(
            ts["RoleArn"],
            json!({ "Fn::GetAtt": ["IotTempRuleTimestreamRole", "Arn"] })
        );
        assert_eq!(ts["DatabaseName"], json!("TemperatureDatastore"));
        assert_eq!(ts["TableName"], json!("TemperatureTable"));
        assert_eq!(
            ts["Dimensions"],
            json!([
                { "Name": "temperature", "Value": "${temperature}" },
                { "Name": "deviceId", "Value": "${topic(2)}" },
            ])
        );
    }

    #[test]
    fn test_tm006_multi_action_statement_is_list() {
        let s = PermissionStatement::wildcard(&[
            "timestream:DescribeEndpoints",
            "timestream:ListDatabases",
        ]);
        assert!(statement(&s)["Action"].is_array());
    }

    #[test]
    fn test_tm006_render_deterministic() {
        let a = render(&default_template()).unwrap();
        let b = render(&default_template()).unwrap();
        assert_eq!(a, b);
        assert!(a.ends_with("}\n"));
    }

    #[test]
    fn test_tm006_render_parse_roundtrip() {
        let t = default_template();
        let back = parse(&render(&t).unwrap()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_tm006_cdk_path_metadata() {
        let t = default_template();
        assert_eq!(
            t.resources[DEFAULT_DATASTORE].metadata,
            Some(json!({ "aws:cdk:path": "TempMonitorStack/TemperatureDatastore/Resource" }))
        );
    }
}
