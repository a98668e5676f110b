//! Manifest file selection and image rewriting.
//!
//! Two jobs: find the resource definition file(s) under the checkout
//! that define a given service's workload, and rewrite the image fields
//! of a definition to a new reference.
//!
//! The rewriter is deliberately line-oriented: it touches only the
//! `image:` lines whose reference is in the target's lineage, and
//! leaves every other byte alone, so a rewritten file round-trips with
//! minimal churn. It does not understand exotic quoting, and a single
//! service spread over multiple files is treated as an error by the
//! caller.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use slipway_id::{ImageId, ServiceId};

/// Workload kinds a resource definition file can declare.
const WORKLOAD_KINDS: &[&str] = &["Deployment", "ReplicationController"];

/// The namespace assumed for manifests that don't declare one.
const DEFAULT_NAMESPACE: &str = "default";

/// Errors from manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("resource definition is not valid UTF-8")]
    NotUtf8,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct WorkloadDoc {
    kind: Option<String>,
    metadata: Option<DocMetadata>,
}

#[derive(Debug, Deserialize)]
struct DocMetadata {
    name: Option<String>,
    namespace: Option<String>,
}

/// Find the resource definition files under `root` whose embedded
/// metadata identifies `service`'s workload.
///
/// Only `.yaml`/`.yml` files are considered; files that don't parse are
/// skipped. The result is sorted, so callers see a stable order.
pub fn files_for(root: &Path, service: &ServiceId) -> Result<Vec<PathBuf>, ManifestError> {
    let mut candidates = Vec::new();
    collect_yaml_files(root, &mut candidates)?;
    candidates.sort();

    let mut matches = Vec::new();
    for file in candidates {
        let bytes = std::fs::read(&file)?;
        if defines_service(&bytes, service) {
            matches.push(file);
        }
    }
    Ok(matches)
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => out.push(path),
            _ => {}
        }
    }
    Ok(())
}

/// Whether any document in `def` declares a workload for `service`.
fn defines_service(def: &[u8], service: &ServiceId) -> bool {
    let Ok(text) = std::str::from_utf8(def) else {
        return false;
    };
    for document in serde_yaml::Deserializer::from_str(text) {
        let Ok(doc) = WorkloadDoc::deserialize(document) else {
            debug!("skipping unparseable manifest document");
            continue;
        };
        let Some(kind) = &doc.kind else { continue };
        if !WORKLOAD_KINDS.contains(&kind.as_str()) {
            continue;
        }
        let Some(metadata) = &doc.metadata else {
            continue;
        };
        let name = metadata.name.as_deref().unwrap_or("");
        let namespace = metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        if name == service.name() && namespace == service.namespace() {
            return true;
        }
    }
    false
}

/// Rewrite the image fields of `def` whose reference is in `target`'s
/// lineage, replacing the whole reference with `target`.
///
/// Fields referring to other lineages, non-image fields, and all
/// surrounding whitespace are untouched. If nothing matched, a warning
/// is pushed and the original bytes are returned unchanged.
pub fn update_workload_image(
    def: &[u8],
    target: &ImageId,
    warnings: &mut Vec<String>,
) -> Result<Vec<u8>, ManifestError> {
    let text = std::str::from_utf8(def).map_err(|_| ManifestError::NotUtf8)?;

    let mut out = String::with_capacity(text.len());
    let mut replaced = false;
    for line in text.split_inclusive('\n') {
        let (body, ending) = split_line_ending(line);
        match rewrite_image_line(body, target) {
            Some(rewritten) => {
                replaced = true;
                out.push_str(&rewritten);
            }
            None => out.push_str(body),
        }
        out.push_str(ending);
    }

    if !replaced {
        warnings.push(format!(
            "no image fields matching {} were found",
            target.repository()
        ));
        return Ok(def.to_vec());
    }
    Ok(out.into_bytes())
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Rewrite one line if it is an `image:` field in the target's lineage.
fn rewrite_image_line(line: &str, target: &ImageId) -> Option<String> {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, rest) = line.split_at(indent_len);

    let (key, after) = if let Some(after) = rest.strip_prefix("- image:") {
        ("- image:", after)
    } else if let Some(after) = rest.strip_prefix("image:") {
        ("image:", after)
    } else {
        return None;
    };

    let ws_len = after.len() - after.trim_start().len();
    let (ws, value_part) = after.split_at(ws_len);
    if ws.is_empty() {
        // `image:x` is not a YAML mapping entry.
        return None;
    }

    let (value, quote) = unquote(value_part.trim_end());
    let current = ImageId::parse(value).ok()?;
    if current.repository() != target.repository() {
        return None;
    }

    Some(format!("{indent}{key}{ws}{quote}{target}{quote}"))
}

fn unquote(value: &str) -> (&str, &str) {
    if value.len() >= 2 {
        let first = &value[..1];
        if (first == "\"" || first == "'") && value.ends_with(first) {
            return (&value[1..value.len() - 1], first);
        }
    }
    (value, "")
}
