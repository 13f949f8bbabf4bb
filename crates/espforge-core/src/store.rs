//! Directory-backed storage for catalog components, documents and projects
//!
//! Layout under the base directory:
//! - `manifest.json` indexes every stored record
//! - `components/{catalog_key}.json` one record per catalog component
//! - `documents/{sha256}.yaml` generated documents, content-addressed
//! - `projects/{id}.json` project bundles
//!
//! Every record is written to a temporary file and renamed into place, so a
//! concurrent reader sees either the previous or the new record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, warn};

use crate::component::Component;
use crate::project::Project;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Not found in store: {0}")]
    NotFound(String),
    #[error("'{0}' matches more than one stored record")]
    Ambiguous(String),
}

/// Persistence operations the crawler and front ends rely on
pub trait ComponentStore: Send + Sync {
    /// Upsert a component under its catalog key; failures are logged
    fn save_component(&self, component: &Component) -> bool;

    fn load_component(&self, key: &str) -> Option<Component>;

    /// Every stored component, ordered by catalog key
    fn load_all_components(&self) -> BTreeMap<String, Component>;

    /// Case-insensitive substring search over name, description and type
    ///
    /// `type_filter` restricts results to one component type. Results are
    /// ordered by type, then name.
    fn search_components(&self, query: &str, type_filter: Option<&str>) -> Vec<Component> {
        let needle = query.trim().to_lowercase();
        let mut found: Vec<Component> = self
            .load_all_components()
            .into_values()
            .filter(|c| type_filter.map_or(true, |t| c.component_type == t))
            .filter(|c| {
                needle.is_empty()
                    || c.name.to_lowercase().contains(&needle)
                    || c.description.to_lowercase().contains(&needle)
                    || c.component_type.to_lowercase().contains(&needle)
            })
            .collect();
        found.sort_by(|a, b| {
            (a.component_type.as_str(), a.name.as_str())
                .cmp(&(b.component_type.as_str(), b.name.as_str()))
        });
        found
    }
}

/// Manifest entry for a stored component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredComponent {
    pub name: String,
    pub component_type: String,
    /// Path relative to the store directory
    pub path: String,
    #[serde(default)]
    pub url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Manifest entry for a generated document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub sha: String,
    pub name: String,
    pub path: String,
    /// Project the document was generated from, if any
    #[serde(default)]
    pub project: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Manifest entry for a project bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProject {
    pub id: String,
    pub name: String,
    pub path: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreManifest {
    #[serde(default = "default_version")]
    pub version: String,
    /// Components keyed by catalog key
    #[serde(default)]
    pub components: BTreeMap<String, StoredComponent>,
    /// Documents keyed by content SHA
    #[serde(default)]
    pub documents: BTreeMap<String, StoredDocument>,
    /// Projects keyed by id
    #[serde(default)]
    pub projects: BTreeMap<String, StoredProject>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl StoreManifest {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, content.as_bytes())
    }
}

/// Store rooted at one directory
#[derive(Debug)]
pub struct CatalogStore {
    pub base_dir: PathBuf,
    pub manifest_path: PathBuf,
    manifest: RwLock<StoreManifest>,
}

impl CatalogStore {
    /// Open (creating if needed) the store at `base_dir`
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        for dir in ["components", "documents", "projects"] {
            std::fs::create_dir_all(base_dir.join(dir))?;
        }

        let manifest_path = base_dir.join("manifest.json");
        let manifest = StoreManifest::load_or_create(&manifest_path)?;
        debug!(
            path = %base_dir.display(),
            components = manifest.components.len(),
            "Opened catalog store"
        );

        Ok(Self {
            base_dir,
            manifest_path,
            manifest: RwLock::new(manifest),
        })
    }

    fn read_manifest(&self) -> RwLockReadGuard<'_, StoreManifest> {
        self.manifest.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_manifest(&self) -> RwLockWriteGuard<'_, StoreManifest> {
        self.manifest.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the manifest
    pub fn manifest(&self) -> StoreManifest {
        self.read_manifest().clone()
    }

    pub fn component_count(&self) -> usize {
        self.read_manifest().components.len()
    }

    /// Store a component, reporting the failure instead of logging it
    pub fn put_component(&self, component: &Component) -> Result<PathBuf, StoreError> {
        let key = component.catalog_key();
        let relative = format!("components/{}.json", file_stem(&key));
        let path = self.base_dir.join(&relative);
        write_atomic(&path, serde_json::to_string_pretty(component)?.as_bytes())?;

        let mut manifest = self.write_manifest();
        manifest.components.insert(
            key,
            StoredComponent {
                name: component.name.clone(),
                component_type: component.component_type.clone(),
                path: relative,
                url: component.url.clone(),
                updated_at: Utc::now(),
            },
        );
        manifest.save(&self.manifest_path)?;
        Ok(path)
    }

    pub fn get_component(&self, key: &str) -> Result<Component, StoreError> {
        let relative = self
            .read_manifest()
            .components
            .get(key)
            .map(|e| e.path.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let content = std::fs::read_to_string(self.base_dir.join(relative))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Distinct component types, sorted
    pub fn component_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .read_manifest()
            .components
            .values()
            .map(|e| e.component_type.clone())
            .collect();
        types.sort();
        types.dedup();
        types
    }

    /// Store a generated document; returns its SHA-256
    pub fn save_document(
        &self,
        name: &str,
        content: &str,
        project: Option<&Project>,
    ) -> Result<String, StoreError> {
        let sha = sha256_hex(content.as_bytes());
        let relative = format!("documents/{}.yaml", sha);
        write_atomic(&self.base_dir.join(&relative), content.as_bytes())?;

        let mut manifest = self.write_manifest();
        manifest.documents.insert(
            sha.clone(),
            StoredDocument {
                sha: sha.clone(),
                name: name.to_string(),
                path: relative,
                project: project.map(|p| p.id.to_string()),
                created_at: Utc::now(),
            },
        );
        manifest.save(&self.manifest_path)?;
        debug!(sha = %&sha[..8], name = %name, "Stored document");
        Ok(sha)
    }

    /// Load a document by full SHA or unique prefix
    pub fn load_document(&self, sha: &str) -> Result<String, StoreError> {
        let relative = {
            let manifest = self.read_manifest();
            let key = unique_prefix(manifest.documents.keys(), sha)?;
            manifest.documents[&key].path.clone()
        };
        Ok(std::fs::read_to_string(self.base_dir.join(relative))?)
    }

    /// Stored documents, newest first
    pub fn list_documents(&self) -> Vec<StoredDocument> {
        let mut documents: Vec<StoredDocument> =
            self.read_manifest().documents.values().cloned().collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        documents
    }

    pub fn save_project(&self, project: &Project) -> Result<(), StoreError> {
        let id = project.id.to_string();
        let relative = format!("projects/{}.json", id);
        write_atomic(
            &self.base_dir.join(&relative),
            serde_json::to_string_pretty(project)?.as_bytes(),
        )?;

        let mut manifest = self.write_manifest();
        manifest.projects.insert(
            id.clone(),
            StoredProject {
                id,
                name: project.name.clone(),
                path: relative,
                updated_at: project.updated_at,
            },
        );
        manifest.save(&self.manifest_path)
    }

    /// Load a project by id, unique id prefix, or exact name
    pub fn load_project(&self, query: &str) -> Result<Project, StoreError> {
        let relative = {
            let manifest = self.read_manifest();
            let by_name: Vec<&StoredProject> = manifest
                .projects
                .values()
                .filter(|p| p.name == query)
                .collect();
            match by_name.as_slice() {
                [single] => single.path.clone(),
                [] => {
                    let key = unique_prefix(manifest.projects.keys(), query)?;
                    manifest.projects[&key].path.clone()
                }
                _ => return Err(StoreError::Ambiguous(query.to_string())),
            }
        };
        let content = std::fs::read_to_string(self.base_dir.join(relative))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Stored projects ordered by name
    pub fn list_projects(&self) -> Vec<StoredProject> {
        let mut projects: Vec<StoredProject> =
            self.read_manifest().projects.values().cloned().collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        projects
    }
}

impl ComponentStore for CatalogStore {
    fn save_component(&self, component: &Component) -> bool {
        match self.put_component(component) {
            Ok(_) => true,
            Err(e) => {
                warn!(key = %component.catalog_key(), error = %e, "Failed to store component");
                false
            }
        }
    }

    fn load_component(&self, key: &str) -> Option<Component> {
        match self.get_component(key) {
            Ok(component) => Some(component),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to load component");
                None
            }
        }
    }

    fn load_all_components(&self) -> BTreeMap<String, Component> {
        let keys: Vec<String> = self.read_manifest().components.keys().cloned().collect();
        keys.into_iter()
            .filter_map(|key| self.load_component(&key).map(|c| (key, c)))
            .collect()
    }
}

fn unique_prefix<'a>(
    keys: impl Iterator<Item = &'a String>,
    query: &str,
) -> Result<String, StoreError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(StoreError::NotFound(String::new()));
    }
    let matches: Vec<&String> = keys.filter(|k| k.starts_with(query)).collect();
    match matches.as_slice() {
        [single] => Ok((*single).clone()),
        [] => Err(StoreError::NotFound(query.to_string())),
        _ => Err(StoreError::Ambiguous(query.to_string())),
    }
}

/// Keep catalog keys filesystem-safe
///
/// A key that had to be altered, or that differs only by case from
/// another, gets a hash suffix so distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem == key && !key.chars().any(|c| c.is_ascii_uppercase()) {
        stem
    } else {
        format!("{}-{}", stem, &sha256_hex(key.as_bytes())[..8])
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Compute SHA256 hash of data and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::DeviceSettings;
    use crate::value::{ConfigValue, DataType};
    use crate::variable::ConfigVariable;
    use tempfile::TempDir;

    fn component(name: &str, component_type: &str, description: &str) -> Component {
        Component::new(name, component_type).with_description(description)
    }

    #[test]
    fn test_component_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::open(temp_dir.path()).unwrap();

        let mut dht = component("DHT Sensor", "sensor", "Temperature and humidity");
        dht.add_config_var(
            ConfigVariable::new("update_interval", "", DataType::Time, false)
                .with_default(ConfigValue::from("60s")),
        );
        assert!(store.save_component(&dht));
        assert!(temp_dir.path().join("components/sensor.dht_sensor.json").exists());

        let loaded = store.load_component("sensor.dht_sensor").unwrap();
        assert_eq!(loaded, dht);
        assert!(store.load_component("sensor.missing").is_none());
    }

    #[test]
    fn test_upsert_by_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::open(temp_dir.path()).unwrap();

        assert!(store.save_component(&component("dht", "sensor", "old")));
        assert!(store.save_component(&component("dht", "sensor", "new")));
        assert_eq!(store.component_count(), 1);
        assert_eq!(store.load_component("sensor.dht").unwrap().description, "new");
    }

    #[test]
    fn test_manifest_persists() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = CatalogStore::open(temp_dir.path()).unwrap();
            store.save_component(&component("gpio", "switch", ""));
        }
        let reopened = CatalogStore::open(temp_dir.path()).unwrap();
        let all = reopened.load_all_components();
        assert_eq!(all.keys().collect::<Vec<_>>(), ["switch.gpio"]);
        assert_eq!(reopened.component_types(), ["switch"]);
    }

    #[test]
    fn test_search_components() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::open(temp_dir.path()).unwrap();
        store.save_component(&component("gpio", "switch", "Generic GPIO switch"));
        store.save_component(&component("gpio", "binary_sensor", "GPIO input"));
        store.save_component(&component("dht", "sensor", "Humidity sensor"));

        let names: Vec<String> = store
            .search_components("GPIO", None)
            .iter()
            .map(|c| c.catalog_key())
            .collect();
        assert_eq!(names, ["binary_sensor.gpio", "switch.gpio"]);

        let sensors = store.search_components("sensor", Some("sensor"));
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].name, "dht");

        assert_eq!(store.search_components("", None).len(), 3);
    }

    #[test]
    fn test_documents() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::open(temp_dir.path()).unwrap();

        let sha = store.save_document("first", "esphome:\n  name: a\n", None).unwrap();
        assert_eq!(sha, sha256_hex(b"esphome:\n  name: a\n"));
        assert_eq!(store.load_document(&sha[..10]).unwrap(), "esphome:\n  name: a\n");
        assert!(matches!(
            store.load_document("not-a-sha"),
            Err(StoreError::NotFound(_))
        ));

        store.save_document("second", "esphome:\n  name: b\n", None).unwrap();
        let listed = store.list_documents();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at >= listed[1].created_at);
    }

    #[test]
    fn test_projects() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::open(temp_dir.path()).unwrap();

        let mut project = Project::new("Kitchen", DeviceSettings::default());
        project.add_from_catalog(&component("dht", "sensor", ""));
        store.save_project(&project).unwrap();

        let by_name = store.load_project("Kitchen").unwrap();
        assert_eq!(by_name.id, project.id);
        assert_eq!(by_name.components.len(), 1);

        let prefix = &project.id.to_string()[..8];
        assert_eq!(store.load_project(prefix).unwrap().name, "Kitchen");
        assert!(store.load_project("Garage").is_err());
        assert_eq!(store.list_projects().len(), 1);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("sensor.dht"), "sensor.dht");
        assert!(file_stem("sensor.a/b").starts_with("sensor.a_b-"));
        assert_ne!(file_stem("sensor.a/b"), file_stem("sensor.a_b"));
        assert_ne!(file_stem("Sensor.dht"), file_stem("sensor.dht"));
    }

    #[test]
    fn test_similar_keys_keep_separate_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::open(temp_dir.path()).unwrap();

        let slashed = component("a/b", "sensor", "slashed");
        let underscored = component("a_b", "sensor", "underscored");
        assert!(store.save_component(&slashed));
        assert!(store.save_component(&underscored));

        let reopened = CatalogStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.component_count(), 2);
        assert_eq!(reopened.load_component("sensor.a/b").unwrap(), slashed);
        assert_eq!(reopened.load_component("sensor.a_b").unwrap(), underscored);
    }

    #[test]
    fn test_sha256() {
        let hash = sha256_hex(b"hello world");
        assert_eq!(hash, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }
}
