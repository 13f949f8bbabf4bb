//! Commands working on document files

use anyhow::{Context, Result};
use espforge_core::{merge_documents, secrets_template, validate_document};
use std::path::{Path, PathBuf};
use tracing::info;

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Check that a file parses as a document
pub fn validate(path: &Path) -> Result<String> {
    let text = read(path)?;
    validate_document(&text).with_context(|| format!("{} is not a valid document", path.display()))?;
    Ok(format!("{} is valid", path.display()))
}

/// Deep-merge documents in order; later files win on conflicting keys
pub fn merge(paths: &[PathBuf], output: Option<&Path>) -> Result<String> {
    let texts = paths.iter().map(|p| read(p)).collect::<Result<Vec<_>>>()?;
    let merged = merge_documents(&texts).context("Failed to merge documents")?;
    info!(files = paths.len(), "Merged documents");

    if let Some(path) = output {
        std::fs::write(path, &merged)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(merged)
}

pub fn secrets() -> String {
    secrets_template()
}

#[cfg(test)]
mod tests {
    use super::*;
    use espforge_core::parse_document;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_validate() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good.yaml", "esphome:\n  name: node\n");
        let bad = write(&dir, "bad.yaml", "esphome: [unclosed\n");

        assert!(validate(&good).unwrap().ends_with("is valid"));
        assert!(validate(&bad).is_err());
        assert!(validate(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_merge_files() {
        let dir = TempDir::new().unwrap();
        let base = write(
            &dir,
            "base.yaml",
            "esphome:\n  name: node\nsensor:\n  - platform: dht\n",
        );
        let extra = write(
            &dir,
            "extra.yaml",
            "esphome:\n  name: renamed\nsensor:\n  - platform: adc\n",
        );
        let empty = write(&dir, "empty.yaml", "");
        let output = dir.path().join("merged.yaml");

        let merged = merge(&[base, empty, extra], Some(&output)).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), merged);

        let doc = parse_document(&merged).unwrap();
        assert_eq!(doc["esphome"]["name"].as_str(), Some("renamed"));
        assert_eq!(doc["sensor"].as_sequence().map(Vec::len), Some(2));
    }

    #[test]
    fn test_secrets() {
        assert!(secrets().contains("wifi_ssid"));
    }
}
