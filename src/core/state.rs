//! TM-009: Synthesis output: template and manifest files, atomic writes.

use super::graph::StackGraph;
use super::synth::Template;
use super::types::{ResourceLock, SynthManifest};
use crate::tripwire::hasher::hash_resource;
use std::path::{Path, PathBuf};

/// Path of the rendered template within the output directory.
pub fn template_path(out_dir: &Path) -> PathBuf {
    out_dir.join("template.json")
}

/// Path of the manifest lock within the output directory.
pub fn manifest_path(out_dir: &Path) -> PathBuf {
    out_dir.join("manifest.lock.yaml")
}

/// Load the manifest. Returns None if no synthesis has happened yet.
pub fn load_manifest(out_dir: &Path) -> Result<Option<SynthManifest>, String> {
    let path = manifest_path(out_dir);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let manifest: SynthManifest = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid manifest {}: {}", path.display(), e))?;
    Ok(Some(manifest))
}

/// Save the manifest atomically.
pub fn save_manifest(out_dir: &Path, manifest: &SynthManifest) -> Result<(), String> {
    let yaml =
        serde_yaml_ng::to_string(manifest).map_err(|e| format!("serialize error: {}", e))?;
    write_atomic(&manifest_path(out_dir), &yaml)
}

/// Write the rendered template atomically.
pub fn save_template(out_dir: &Path, rendered: &str) -> Result<(), String> {
    write_atomic(&template_path(out_dir), rendered)
}

/// Write to a temp sibling, then rename over the target.
fn write_atomic(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })
}

/// Build a manifest describing `template`.
pub fn new_manifest(graph: &StackGraph, template: &Template, template_hash: &str) -> SynthManifest {
    use crate::tripwire::eventlog::now_iso8601;
    let resources = template
        .resources
        .iter()
        .map(|(id, r)| {
            (
                id.clone(),
                ResourceLock {
                    resource_type: r.resource_type.clone(),
                    hash: hash_resource(r),
                    depends_on: r.depends_on.clone(),
                },
            )
        })
        .collect();
    SynthManifest {
        schema: "1.0".to_string(),
        stack: graph.name().to_string(),
        generated_at: now_iso8601(),
        generator: format!("tempmon {}", env!("CARGO_PKG_VERSION")),
        template_hash: template_hash.to_string(),
        resources,
    }
}
