//! TM-010: BLAKE3 hashing for emitted templates and synthesized resources.
//!
//! Every hash is rendered as `blake3:<hex>` so manifests, event logs and
//! drift findings compare hashes as plain strings.

use crate::core::synth::TemplateResource;
use std::path::Path;

fn prefixed(hasher: &blake3::Hasher) -> String {
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Hash a rendered template (or any text).
pub fn hash_string(s: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(s.as_bytes());
    prefixed(&hasher)
}

/// Hash a template file on disk, streaming its contents.
pub fn hash_file(path: &Path) -> Result<String, String> {
    let file =
        std::fs::File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    hasher
        .update_reader(file)
        .map_err(|e| format!("read error {}: {}", path.display(), e))?;
    Ok(prefixed(&hasher))
}

/// Hash of one synthesized resource: type, properties and explicit
/// `DependsOn`. `Metadata` is left out; it names the stack path, not the
/// resource.
pub fn hash_resource(resource: &TemplateResource) -> String {
    let body = (
        &resource.resource_type,
        &resource.properties,
        &resource.depends_on,
    );
    let mut hasher = blake3::Hasher::new();
    if let Err(e) = serde_json::to_writer(&mut hasher, &body) {
        return format!("ERROR:{}", e);
    }
    prefixed(&hasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stack::declare_stack;
    use crate::core::synth::synthesize;
    use crate::core::types::{StackConfig, DEFAULT_DATASTORE, DEFAULT_TABLE};

    #[test]
    fn test_tm010_hash_file_matches_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        std::fs::write(&path, "{\"Resources\":{}}\n").unwrap();
        let h = hash_file(&path).unwrap();
        assert_eq!(h, hash_string("{\"Resources\":{}}\n"));
        assert_eq!(h.len(), "blake3:".len() + 64);
    }

    #[test]
    fn test_tm010_hash_string() {
        let h1 = hash_string("TemperatureTable");
        let h2 = hash_string("TemperatureTable");
        let h3 = hash_string("TemperatureDatastore");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert!(h1.starts_with("blake3:"));
    }

    #[test]
    fn test_tm010_hash_large_file_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.json");
        let content = "x".repeat(200_000);
        std::fs::write(&path, &content).unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_string(&content));
    }

    #[test]
    fn test_tm010_hash_file_not_found() {
        assert!(hash_file(Path::new("/nonexistent/template.json")).is_err());
    }

    #[test]
    fn test_tm010_hash_resource_is_canonical_body() {
        let t = synthesize(&declare_stack(&StackConfig::default()).unwrap());
        let table = &t.resources[DEFAULT_TABLE];
        let canonical = serde_json::to_string(&(
            &table.resource_type,
            &table.properties,
            &table.depends_on,
        ))
        .unwrap();
        assert_eq!(hash_resource(table), hash_string(&canonical));
        assert_ne!(hash_resource(table), hash_resource(&t.resources[DEFAULT_DATASTORE]));
    }

    #[test]
    fn test_tm010_hash_resource_ignores_metadata() {
        let t = synthesize(&declare_stack(&StackConfig::default()).unwrap());
        let mut table = t.resources[DEFAULT_TABLE].clone();
        let before = hash_resource(&table);
        table.metadata = Some(serde_json::json!({ "aws:cdk:path": "Renamed/TemperatureTable" }));
        assert_eq!(hash_resource(&table), before);
        table.depends_on.clear();
        assert_ne!(hash_resource(&table), before);
    }
}
