//! Project commands and document generation

use anyhow::{bail, Context, Result};
use espforge_core::{ConfigValue, DeviceSettings, InstanceId, Project};
use std::fmt::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::state::AppState;

/// Device overrides given on the command line
#[derive(Debug, Clone, Default)]
pub struct DeviceOverrides {
    pub name: Option<String>,
    pub platform: Option<String>,
    pub board: Option<String>,
}

impl DeviceOverrides {
    fn apply(self, defaults: &DeviceSettings) -> DeviceSettings {
        DeviceSettings {
            name: self.name.unwrap_or_else(|| defaults.name.clone()),
            platform: self.platform.unwrap_or_else(|| defaults.platform.clone()),
            board: self.board.unwrap_or_else(|| defaults.board.clone()),
        }
    }
}

pub fn create(
    state: &AppState,
    name: &str,
    description: Option<String>,
    device: DeviceOverrides,
) -> Result<String> {
    // Names only; an id prefix match is not a clash
    if state.store.list_projects().iter().any(|p| p.name == name) {
        bail!("Project '{}' already exists", name);
    }

    let mut project = Project::new(name, device.apply(&state.config.device));
    if let Some(description) = description {
        project = project.with_description(description);
    }
    state.save_project(&project)?;
    info!(project = %name, id = %project.id, "Created project");

    Ok(format!(
        "Created project {} ({}, {})",
        project.name, project.device.platform, project.device.board
    ))
}

pub async fn add(state: &AppState, project_name: &str, key: &str) -> Result<String> {
    let mut project = state.project(project_name)?;
    let component = state.component(key).await?;
    let id = project.add_from_catalog(&component);
    state.save_project(&project)?;

    Ok(format!("Added {} to {} as {}", key, project.name, id.short()))
}

/// Set a variable from its text form, or clear it when `value` is `None`
pub fn set(
    state: &AppState,
    project_name: &str,
    instance: &str,
    variable: &str,
    value: Option<String>,
) -> Result<String> {
    let mut project = state.project(project_name)?;
    let id = project.resolve_instance(instance)?;
    let cleared = value.is_none();
    project.set_value(id, variable, value.map(ConfigValue::String))?;
    state.save_project(&project)?;

    let shown = instance_label(&project, id);
    Ok(if cleared {
        format!("Cleared {} on {}", variable, shown)
    } else {
        let value = project
            .instance(id)
            .and_then(|c| c.config_var(variable))
            .and_then(|v| v.current_value())
            .map(ConfigValue::as_text)
            .unwrap_or_default();
        format!("Set {} = {} on {}", variable, value, shown)
    })
}

pub fn remove(state: &AppState, project_name: &str, instance: &str) -> Result<String> {
    let mut project = state.project(project_name)?;
    let id = project.resolve_instance(instance)?;
    let label = instance_label(&project, id);
    project
        .remove(id)
        .with_context(|| format!("Instance {} vanished", id))?;
    state.save_project(&project)?;

    Ok(format!("Removed {} from {}", label, project.name))
}

fn instance_label(project: &Project, id: InstanceId) -> String {
    match project.instance(id) {
        Some(component) => format!("{} [{}]", component.catalog_key(), id.short()),
        None => id.short(),
    }
}

pub fn show(state: &AppState, project_name: &str) -> Result<String> {
    let project = state.project(project_name)?;
    let problems = project.validate();

    let mut out = String::new();
    writeln!(out, "{} ({})", project.name, project.id)?;
    if !project.description.is_empty() {
        writeln!(out, "{}", project.description)?;
    }
    writeln!(
        out,
        "Device: {} on {} ({})",
        project.device.name, project.device.platform, project.device.board
    )?;
    writeln!(out, "Updated: {}", project.updated_at.format("%Y-%m-%d %H:%M:%S"))?;

    writeln!(out, "\nComponents:")?;
    if project.components.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for component in &project.components {
        writeln!(out, "  [{}] {}", component.short_id(), component.catalog_key())?;
        for var in component.config_vars() {
            let value = match (var.current_value(), var.effective_value()) {
                (Some(value), _) => value.as_text(),
                (None, Some(default)) => format!("{} (default)", default.as_text()),
                (None, None) if var.is_required => "(required, unset)".to_string(),
                (None, None) => continue,
            };
            writeln!(out, "      {} = {}", var.name, value)?;
        }
    }

    if !problems.is_empty() {
        writeln!(out, "\nProblems:")?;
        for (id, errors) in &problems {
            for error in errors {
                writeln!(out, "  [{}] {}", id.short(), error)?;
            }
        }
    }
    Ok(out)
}

pub fn list(state: &AppState) -> String {
    let projects = state.store.list_projects();
    if projects.is_empty() {
        return "No projects\n".to_string();
    }

    let mut out = String::new();
    for project in projects {
        let _ = writeln!(
            out,
            "  {:<24} {}  updated {}",
            project.name,
            &project.id[..8.min(project.id.len())],
            project.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    out
}

/// Render a project's document, store it and optionally write it out
///
/// Returns the document text and its content hash. Configuration problems
/// are reported but do not stop generation.
pub fn generate(
    state: &AppState,
    project_name: &str,
    output: Option<&Path>,
) -> Result<(String, String)> {
    let project = state.project(project_name)?;
    for (id, errors) in project.validate() {
        for error in errors {
            warn!(project = %project.name, instance = %id.short(), "{}", error);
        }
    }

    let text = project.generate_document();
    let sha = state
        .store
        .save_document(&format!("{}.yaml", project.name), &text, Some(&project))
        .context("Failed to store generated document")?;
    info!(project = %project.name, sha = %&sha[..8], "Generated document");

    if let Some(path) = output {
        std::fs::write(path, &text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Wrote document");
    }
    Ok((text, sha))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::scrape;
    use crate::catalog::tests::test_state;
    use espforge_core::parse_document;
    use tempfile::TempDir;

    async fn scraped_state(dir: &TempDir) -> AppState {
        let state = test_state(dir);
        scrape(&state, None, None).await.unwrap();
        state
    }

    #[tokio::test]
    async fn test_project_workflow() {
        let dir = TempDir::new().unwrap();
        let state = scraped_state(&dir).await;

        let created = create(
            &state,
            "porch",
            Some("Front porch sensors".to_string()),
            DeviceOverrides {
                name: Some("porch_node".to_string()),
                ..DeviceOverrides::default()
            },
        )
        .unwrap();
        assert!(created.contains("ESP32"));
        assert!(create(&state, "porch", None, DeviceOverrides::default()).is_err());

        let added = add(&state, "porch", "sensor.dht").await.unwrap();
        let short = added.rsplit(' ').next().unwrap().to_string();
        assert!(add(&state, "porch", "sensor.nope").await.is_err());

        // Unset required pin shows up as a problem
        assert!(show(&state, "porch").unwrap().contains("Problems:"));

        assert!(set(&state, "porch", &short, "pin", Some("GPIO6".to_string())).is_err());
        let message = set(&state, "porch", &short, "pin", Some("GPIO4".to_string())).unwrap();
        assert!(message.contains("pin = GPIO4"));
        assert!(set(&state, "porch", &short, "pin", None).is_err());

        let details = show(&state, "porch").unwrap();
        assert!(details.contains("Front porch sensors"));
        assert!(details.contains("pin = GPIO4"));
        assert!(!details.contains("Problems:"));
        assert!(list(&state).contains("porch"));

        let output = dir.path().join("porch.yaml");
        let (text, sha) = generate(&state, "porch", Some(&output)).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), text);
        assert_eq!(state.store.load_document(&sha).unwrap(), text);

        let doc = parse_document(&text).unwrap();
        assert_eq!(doc["esphome"]["name"].as_str(), Some("porch_node"));
        assert_eq!(doc["sensor"][0]["pin"].as_str(), Some("GPIO4"));

        remove(&state, "porch", &short).unwrap();
        assert!(state.project("porch").unwrap().components.is_empty());
        assert!(remove(&state, "porch", &short).is_err());
    }

    #[test]
    fn test_name_matching_an_id_prefix_is_free() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        create(&state, "porch", None, DeviceOverrides::default()).unwrap();
        let id = state.store.list_projects()[0].id.clone();
        let prefix = &id[..1];

        create(&state, prefix, None, DeviceOverrides::default()).unwrap();
        assert_eq!(state.store.list_projects().len(), 2);
        assert_eq!(state.project(prefix).unwrap().name, prefix);
        assert!(create(&state, prefix, None, DeviceOverrides::default()).is_err());
    }

    #[test]
    fn test_unknown_project() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        assert!(show(&state, "ghost").is_err());
        assert!(generate(&state, "ghost", None).is_err());
        assert_eq!(list(&state), "No projects\n");
    }
}
