//! TM-007: The temperature-monitor stack.
//!
//! An IoT rule forwards device readings from `temp/<device>/reading` into a
//! Timestream table, assuming a role that may write only to that table.

use super::graph::{GraphError, StackGraph};
use super::types::*;

/// Declare every resource of the stack described by `config`.
pub fn declare_stack(config: &StackConfig) -> Result<StackGraph, GraphError> {
    let mut graph = StackGraph::new(&config.name).with_description(config.description.clone());

    let role = graph.declare_role(&config.role_id, &config.principal)?;

    let datastore = graph.declare_datastore(&config.datastore.id, &config.datastore.name)?;
    // The table names its datastore by literal name, so ordering is explicit.
    let table = graph.declare_table(&datastore, &config.table.id, &config.table.name)?;

    graph.grant(&role, PermissionStatement::on_arn(&table, &[WRITE_RECORDS]))?;
    // Endpoint discovery has no resource arity.
    graph.grant(&role, PermissionStatement::wildcard(&[DESCRIBE_ENDPOINTS]))?;

    let action = TimestreamAction::new(&role, &table, config.rule.dimensions.clone());
    graph.declare_rule_versioned(
        &config.rule.id,
        &config.rule.name,
        &config.rule.sql,
        &config.rule.sql_version,
        &config.rule.description,
        vec![RuleAction::Timestream(action)],
    )?;

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{action_scope, ActionScope};
    use proptest::prelude::*;

    fn default_graph() -> StackGraph {
        declare_stack(&StackConfig::default()).unwrap()
    }

    fn count(g: &StackGraph, kind: NodeKind) -> usize {
        g.nodes().filter(|n| n.kind() == kind).count()
    }

    #[test]
    fn test_tm007_scenario_four_nodes_one_ordering_edge() {
        let g = default_graph();
        assert_eq!(g.len(), 4);
        let explicit: Vec<_> = g
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::DependsOn)
            .collect();
        assert_eq!(explicit.len(), 1);
        assert_eq!(explicit[0].from, "TemperatureTable");
        assert_eq!(explicit[0].to, "TemperatureDatastore");
    }

    #[test]
    fn test_tm007_one_of_each_kind() {
        let g = default_graph();
        assert_eq!(count(&g, NodeKind::AccessRole), 1);
        assert_eq!(count(&g, NodeKind::Datastore), 1);
        assert_eq!(count(&g, NodeKind::DataTable), 1);
        assert_eq!(count(&g, NodeKind::RoutingRule), 1);
    }

    #[test]
    fn test_tm007_table_owned_by_datastore() {
        let g = default_graph();
        let Some(NodeProps::DataTable(t)) = g.node(DEFAULT_TABLE).map(|n| &n.props) else {
            panic!("table missing");
        };
        assert_eq!(t.datastore_name, "TemperatureDatastore");
        assert_eq!(t.datastore_id, DEFAULT_DATASTORE);
    }

    #[test]
    fn test_tm007_role_trusted_by_routing_engine() {
        let g = default_graph();
        let Some(NodeProps::AccessRole(r)) = g.node(DEFAULT_ROLE_ID).map(|n| &n.props) else {
            panic!("role missing");
        };
        assert_eq!(r.trusted_principal, "iot.amazonaws.com");
        assert_eq!(r.statements.len(), 2);
    }

    #[test]
    fn test_tm007_statement_scoping() {
        let g = default_graph();
        for node in g.nodes() {
            let NodeProps::AccessRole(r) = &node.props else {
                continue;
            };
            for s in &r.statements {
                for action in &s.actions {
                    match action_scope(action) {
                        ActionScope::Resource => {
                            assert_ne!(s.resource, ResourcePattern::Wildcard, "{}", action)
                        }
                        ActionScope::AccountWide => {
                            assert_eq!(s.resource, ResourcePattern::Wildcard, "{}", action)
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_tm007_rule_references_role_and_table() {
        let g = default_graph();
        let Some(NodeProps::RoutingRule(rule)) = g.node(DEFAULT_RULE_ID).map(|n| &n.props) else {
            panic!("rule missing");
        };
        assert_eq!(rule.name, "forward_readings_to_timeseries");
        assert_eq!(rule.sql, "SELECT * FROM 'temp/+/reading'");
        let RuleAction::Timestream(a) = &rule.actions[0];
        assert_eq!(a.role_id, DEFAULT_ROLE_ID);
        assert_eq!(a.table_id, DEFAULT_TABLE);
        assert_eq!(
            a.dimensions,
            vec![
                Dimension::new("temperature", "${temperature}"),
                Dimension::new("deviceId", "${topic(2)}"),
            ]
        );
    }

    #[test]
    fn test_tm007_validates_clean() {
        assert!(default_graph().validate().is_empty());
    }

    #[test]
    fn test_tm007_bad_dimension_surfaces() {
        let mut config = StackConfig::default();
        config.rule.dimensions.push(Dimension::new("room", "${topic(7)}"));
        let err = declare_stack(&config).unwrap_err();
        assert!(matches!(err, GraphError::TopicIndexOutOfRange { .. }));
    }

    #[test]
    fn test_tm007_idempotent_declaration() {
        let a = default_graph();
        let b = default_graph();
        assert_eq!(a, b);
        let ta = crate::core::synth::render(&crate::core::synth::synthesize(&a)).unwrap();
        let tb = crate::core::synth::render(&crate::core::synth::synthesize(&b)).unwrap();
        assert_eq!(ta, tb);
    }

    proptest! {
        #[test]
        fn prop_tm007_dimension_order_preserved(
            names in proptest::collection::hash_set("[a-z][a-zA-Z0-9]{0,8}", 1..6)
        ) {
            let dims: Vec<Dimension> = names
                .iter()
                .map(|n| Dimension::new(n, &format!("${{{}}}", n)))
                .collect();
            let mut config = StackConfig::default();
            config.rule.dimensions = dims.clone();
            let g = declare_stack(&config).unwrap();
            let Some(NodeProps::RoutingRule(rule)) = g.node(DEFAULT_RULE_ID).map(|n| &n.props) else {
                panic!("rule missing");
            };
            let RuleAction::Timestream(a) = &rule.actions[0];
            prop_assert_eq!(&a.dimensions, &dims);
            prop_assert_eq!(declare_stack(&config).unwrap(), g);
        }
    }
}
