//! TM-012: Drift detection: compare the emitted template to the manifest.
//!
//! A template edited by hand after synthesis no longer describes the
//! declared graph. Drift is reported per resource when the file still
//! parses, and for the whole file otherwise.

use crate::core::state::template_path;
use crate::core::synth;
use crate::core::types::SynthManifest;
use crate::tripwire::hasher::{self, hash_resource};
use std::path::Path;

/// A single drift finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftFinding {
    /// Logical id, or `template.json` for file-level findings
    pub resource_id: String,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

/// Compare the template in `out_dir` with `manifest`.
pub fn detect_drift(out_dir: &Path, manifest: &SynthManifest) -> Vec<DriftFinding> {
    let path = template_path(out_dir);
    let file_id = "template.json".to_string();

    if !path.exists() {
        return vec![DriftFinding {
            resource_id: file_id,
            expected_hash: manifest.template_hash.clone(),
            actual_hash: "MISSING".to_string(),
            detail: format!("{} does not exist", path.display()),
        }];
    }

    let actual = hasher::hash_file(&path).unwrap_or_else(|e| format!("ERROR:{}", e));
    if actual == manifest.template_hash {
        return Vec::new();
    }

    let template = match std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|s| synth::parse(&s))
    {
        Ok(t) => t,
        Err(e) => {
            return vec![DriftFinding {
                resource_id: file_id,
                expected_hash: manifest.template_hash.clone(),
                actual_hash: actual,
                detail: format!("template unreadable: {}", e),
            }];
        }
    };

    let mut findings = Vec::new();
    for (id, lock) in &manifest.resources {
        match template.resources.get(id) {
            None => findings.push(DriftFinding {
                resource_id: id.clone(),
                expected_hash: lock.hash.clone(),
                actual_hash: "MISSING".to_string(),
                detail: format!("{} removed from template", id),
            }),
            Some(resource) => {
                let hash = hash_resource(resource);
                if hash != lock.hash {
                    findings.push(DriftFinding {
                        resource_id: id.clone(),
                        expected_hash: lock.hash.clone(),
                        actual_hash: hash,
                        detail: format!("{} properties changed", id),
                    });
                }
            }
        }
    }
    for (id, resource) in &template.resources {
        if !manifest.resources.contains_key(id) {
            findings.push(DriftFinding {
                resource_id: id.clone(),
                expected_hash: "ABSENT".to_string(),
                actual_hash: hash_resource(resource),
                detail: format!("{} added outside synthesis", id),
            });
        }
    }

    // Formatting-only edits change the file hash but no resource.
    if findings.is_empty() {
        findings.push(DriftFinding {
            resource_id: file_id,
            expected_hash: manifest.template_hash.clone(),
            actual_hash: actual,
            detail: "template reformatted".to_string(),
        });
    }

    findings
}
