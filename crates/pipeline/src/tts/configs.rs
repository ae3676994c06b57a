//! Voice config path resolution
//!
//! Bundle configs are written on machines whose filesystem layout does
//! not survive deployment, so paths inside them (notably the speaker
//! registry) are re-anchored against the bundle directory at load time.
//! The original file on disk is never modified; a resolved copy is
//! materialized to a temp file that lives as long as the handle.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;

use vaani_core::{Error, Result};

/// Re-anchor a path from a config file against the bundle directory.
///
/// Fallback chain: a bare filename joins the base directory; an
/// absolute path that exists is kept; otherwise the basename, then
/// progressively shorter trailing segments, are tried under the base.
/// A path nothing matches is returned unchanged.
pub fn resolve_path(base_dir: &Path, raw: &str) -> PathBuf {
    let raw_path = Path::new(raw);

    if raw_path.components().count() == 1 {
        return base_dir.join(raw);
    }

    if raw_path.is_absolute() && raw_path.exists() {
        return raw_path.to_path_buf();
    }

    if let Some(name) = raw_path.file_name() {
        let candidate = base_dir.join(name);
        if candidate.exists() {
            return candidate;
        }
    }

    let parts: Vec<_> = raw_path
        .components()
        .map(|c| c.as_os_str().to_os_string())
        .collect();
    for start in 0..parts.len() {
        let mut candidate = base_dir.to_path_buf();
        for part in &parts[start..] {
            candidate.push(part);
        }
        if candidate.exists() {
            return candidate;
        }
    }

    raw_path.to_path_buf()
}

/// A config file with its internal paths resolved.
///
/// Holds the backing temp file so the resolved copy outlives the
/// loader that reads it.
pub struct ResolvedConfig {
    value: Value,
    path: PathBuf,
    _scratch: Option<NamedTempFile>,
}

impl ResolvedConfig {
    /// Load `config_path`, resolving `speakers_file` entries at the top
    /// level and under `model_args` against the config's directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Synthesis(format!("{}: {e}", config_path.display())))?;
        let mut value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Synthesis(format!("{}: {e}", config_path.display())))?;

        let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

        let mut changed = rewrite_speakers_file(&mut value, base_dir);
        if let Some(model_args) = value.get_mut("model_args") {
            changed |= rewrite_speakers_file(model_args, base_dir);
        }

        if !changed {
            return Ok(Self {
                value,
                path: config_path.to_path_buf(),
                _scratch: None,
            });
        }

        let mut scratch = tempfile::Builder::new()
            .prefix("vaani_cfg_")
            .suffix(".json")
            .tempfile()
            .map_err(|e| Error::Synthesis(format!("config scratch file: {e}")))?;
        let rendered = serde_json::to_string_pretty(&value)
            .map_err(|e| Error::Synthesis(format!("config serialize: {e}")))?;
        scratch
            .write_all(rendered.as_bytes())
            .map_err(|e| Error::Synthesis(format!("config scratch write: {e}")))?;

        Ok(Self {
            value,
            path: scratch.path().to_path_buf(),
            _scratch: Some(scratch),
        })
    }

    /// Parsed config contents with paths resolved
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Location of the resolved config on disk
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn rewrite_speakers_file(node: &mut Value, base_dir: &Path) -> bool {
    let Some(raw) = node.get("speakers_file").and_then(Value::as_str) else {
        return false;
    };
    let resolved = resolve_path(base_dir, raw);
    if resolved == Path::new(raw) {
        return false;
    }
    node["speakers_file"] = Value::String(resolved.to_string_lossy().into_owned());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_filename_joins_base() {
        let base = Path::new("/data/voices/hi/fastpitch");
        assert_eq!(
            resolve_path(base, "speakers.json"),
            base.join("speakers.json")
        );
    }

    #[test]
    fn test_absolute_existing_path_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("speakers.json");
        std::fs::write(&file, "{}").unwrap();

        let resolved = resolve_path(Path::new("/elsewhere"), &file.to_string_lossy());
        assert_eq!(resolved, file);
        // Resolving again from its own directory stays stable.
        assert_eq!(resolve_path(dir.path(), &resolved.to_string_lossy()), file);
    }

    #[test]
    fn test_stale_absolute_path_falls_back_to_basename() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("speakers.json");
        std::fs::write(&file, "{}").unwrap();

        let stale = "/home/builder/checkpoints/hi/fastpitch/speakers.json";
        assert_eq!(resolve_path(dir.path(), stale), file);
    }

    #[test]
    fn test_trailing_segments_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("fastpitch")).unwrap();
        let file = dir.path().join("fastpitch").join("speakers.json");
        std::fs::write(&file, "{}").unwrap();

        let stale = "/build/output/fastpitch/speakers.json";
        assert_eq!(resolve_path(dir.path(), stale), file);
    }

    #[test]
    fn test_unresolvable_path_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let stale = "/nowhere/at/all.json";
        assert_eq!(resolve_path(dir.path(), stale), PathBuf::from(stale));
    }

    #[test]
    fn test_resolved_config_does_not_mutate_original() {
        let dir = tempfile::tempdir().unwrap();
        let speakers = dir.path().join("speakers.json");
        std::fs::write(&speakers, "{}").unwrap();

        let config_path = dir.path().join("config.json");
        let original =
            r#"{"speakers_file": "/stale/speakers.json", "model_args": {"speakers_file": "/stale/speakers.json"}}"#;
        std::fs::write(&config_path, original).unwrap();

        let resolved = ResolvedConfig::load(&config_path).unwrap();
        assert_ne!(resolved.path(), config_path);
        assert_eq!(
            resolved.value()["speakers_file"].as_str().unwrap(),
            speakers.to_string_lossy()
        );
        assert_eq!(
            resolved.value()["model_args"]["speakers_file"]
                .as_str()
                .unwrap(),
            speakers.to_string_lossy()
        );
        // The on-disk original is untouched.
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), original);
    }

    #[test]
    fn test_config_without_rewrites_keeps_original_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{"audio": {"sample_rate": 22050}}"#).unwrap();

        let resolved = ResolvedConfig::load(&config_path).unwrap();
        assert_eq!(resolved.path(), config_path);
    }
}
