//! TM-002: YAML parsing and validation of `tempmon.yaml`.
//!
//! Validates structural constraints before anything is declared:
//! - Version must be "1.0"
//! - Stack name must not be empty
//! - Logical ids must be unique and alphanumeric
//! - Datastore/table/rule names follow the provider's naming rules
//! - Dimensions are non-empty, uniquely named, and parse as templates

use super::graph::{check_dimension_names, check_rule_name, check_timestream_name};
use super::template;
use super::types::*;
use std::collections::HashSet;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse a tempmon.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<StackConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a tempmon.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<StackConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &StackConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(ValidationError::new(format!(
            "version must be \"1.0\", got \"{}\"",
            config.version
        )));
    }

    if config.name.is_empty() {
        errors.push(ValidationError::new("name must not be empty"));
    }

    if config.principal.is_empty() {
        errors.push(ValidationError::new("principal must not be empty"));
    }

    // Logical ids
    let ids = [
        &config.role_id,
        &config.datastore.id,
        &config.table.id,
        &config.rule.id,
    ];
    let mut seen = HashSet::new();
    for id in ids {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push(ValidationError::new(format!(
                "logical id '{}' must be alphanumeric",
                id
            )));
        }
        if !seen.insert(id) {
            errors.push(ValidationError::new(format!(
                "logical id '{}' is used more than once",
                id
            )));
        }
    }

    // Physical names
    if let Err(e) = check_timestream_name(&config.datastore.id, &config.datastore.name) {
        errors.push(ValidationError::new(e.to_string()));
    }
    if let Err(e) = check_timestream_name(&config.table.id, &config.table.name) {
        errors.push(ValidationError::new(e.to_string()));
    }
    if let Err(e) = check_rule_name(&config.rule.id, &config.rule.name) {
        errors.push(ValidationError::new(e.to_string()));
    }

    // Rule query and dimensions
    let filter = match template::topic_filter(&config.rule.sql) {
        Ok(f) => Some(f),
        Err(e) => {
            errors.push(ValidationError::new(format!("rule sql: {}", e)));
            None
        }
    };

    if config.rule.dimensions.is_empty() {
        errors.push(ValidationError::new("rule has no dimensions"));
    }

    errors.extend(
        check_dimension_names(&config.rule.id, &config.rule.dimensions)
            .into_iter()
            .map(|e| ValidationError::new(e.to_string())),
    );
    for dim in &config.rule.dimensions {
        if let Err(e) = template::parse_template(&dim.value) {
            errors.push(ValidationError::new(format!(
                "dimension '{}': {}",
                dim.name, e
            )));
            continue;
        }
        if let Some(filter) = &filter {
            if let Err((index, depth)) = template::check_topic_indexes(&dim.value, filter) {
                errors.push(ValidationError::new(format!(
                    "dimension '{}' uses topic({}) but '{}' has {} segment(s)",
                    dim.name, index, filter, depth
                )));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_tm002_parse_valid() {
        let yaml = r#"
version: "1.0"
name: TempMonitorStack
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.is_empty(), "unexpected errors: {:?}", messages(&errors));
    }

    #[test]
    fn test_tm002_bad_version() {
        let config = parse_config("version: \"2.0\"\nname: test\n").unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("version")));
    }

    #[test]
    fn test_tm002_empty_name() {
        let config = parse_config("version: \"1.0\"\nname: \"\"\n").unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("name must not be empty")));
    }

    #[test]
    fn test_tm002_duplicate_logical_id() {
        let yaml = r#"
version: "1.0"
name: test
datastore: { id: Shared, name: TemperatureDatastore }
table: { id: Shared, name: TemperatureTable }
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("more than once")));
    }

    #[test]
    fn test_tm002_bad_table_name() {
        let yaml = r#"
version: "1.0"
name: test
table: { id: TemperatureTable, name: "x" }
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("must match")));
    }

    #[test]
    fn test_tm002_bad_rule_name() {
        let yaml = r#"
version: "1.0"
name: test
rule:
  name: "forward-readings"
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("forward-readings")));
    }

    #[test]
    fn test_tm002_sql_without_topic() {
        let yaml = r#"
version: "1.0"
name: test
rule:
  sql: "SELECT *"
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.starts_with("rule sql")));
    }

    #[test]
    fn test_tm002_no_dimensions() {
        let yaml = r#"
version: "1.0"
name: test
rule:
  dimensions: []
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("no dimensions")));
    }

    #[test]
    fn test_tm002_duplicate_dimension() {
        let yaml = r#"
version: "1.0"
name: test
rule:
  dimensions:
    - { name: deviceId, value: "${topic(2)}" }
    - { name: deviceId, value: "${clientid()}" }
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("declared more than once")));
    }

    #[test]
    fn test_tm002_empty_dimension_name() {
        let yaml = r#"
version: "1.0"
name: test
rule:
  dimensions:
    - { name: "", value: "${temperature}" }
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| e.message.contains("dimension name must not be empty")));
    }

    #[test]
    fn test_tm002_expression_dimensions_accepted() {
        let yaml = r#"
version: "1.0"
name: test
rule:
  dimensions:
    - { name: fahrenheit, value: "${temperature * 1.8 + 32}" }
    - { name: first, value: "${readings[0]}" }
    - { name: deviceId, value: "${topic(2)}" }
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.is_empty(), "unexpected errors: {:?}", messages(&errors));
    }

    #[test]
    fn test_tm002_topic_index_out_of_range() {
        let yaml = r#"
version: "1.0"
name: test
rule:
  dimensions:
    - { name: deviceId, value: "${topic(4)}" }
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("topic(4)")));
    }

    #[test]
    fn test_tm002_unclosed_dimension() {
        let yaml = r#"
version: "1.0"
name: test
rule:
  dimensions:
    - { name: temperature, value: "${temperature" }
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("unclosed")));
    }

    #[test]
    fn test_tm002_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tempmon.yaml");
        std::fs::write(&path, "version: \"1.0\"\nname: file-test\n").unwrap();
        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.name, "file-test");
    }

    #[test]
    fn test_tm002_parse_missing_file() {
        let err = parse_config_file(Path::new("/nonexistent/tempmon.yaml")).unwrap_err();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn test_tm002_parse_invalid_yaml() {
        assert!(parse_config("not: [valid: yaml: {{").is_err());
    }
}
