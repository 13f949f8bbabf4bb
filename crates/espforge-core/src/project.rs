//! Projects: ordered collections of placed component instances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::component::{Component, InstanceId};
use crate::document;
use crate::validation::{ValidationContext, DEFAULT_PLATFORM};
use crate::value::ConfigValue;
use crate::variable::ValueError;

#[derive(Error, Debug, PartialEq)]
pub enum ProjectError {
    #[error("No component instance matches '{0}'")]
    UnknownInstance(String),
    #[error("Instance prefix '{0}' matches more than one component")]
    AmbiguousInstance(String),
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Device identity written into the `esphome` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default = "default_device_name")]
    pub name: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_board")]
    pub board: String,
}

fn default_device_name() -> String {
    "my_device".to_string()
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

fn default_board() -> String {
    "nodemcu-32s".to_string()
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            platform: default_platform(),
            board: default_board(),
        }
    }
}

/// A named set of component instances for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub device: DeviceSettings,
    /// Instances in placement order; document order follows this
    #[serde(default)]
    pub components: Vec<Component>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, device: DeviceSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            device,
            components: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Context used to validate values against this project's platform
    pub fn validation_context(&self) -> ValidationContext {
        ValidationContext::for_platform(&self.device.platform)
    }

    /// Place a copy of a catalog component, returning the new instance id
    pub fn add_from_catalog(&mut self, catalog: &Component) -> InstanceId {
        let instance = catalog.clone_instance();
        let id = instance.instance_id;
        self.components.push(instance);
        self.touch();
        id
    }

    pub fn remove(&mut self, id: InstanceId) -> Option<Component> {
        let index = self.components.iter().position(|c| c.instance_id == id)?;
        self.touch();
        Some(self.components.remove(index))
    }

    /// Resolve a full instance id or a unique prefix of one
    pub fn resolve_instance(&self, query: &str) -> Result<InstanceId, ProjectError> {
        let query = query.trim().to_lowercase();
        let mut matches = self
            .components
            .iter()
            .filter(|c| !query.is_empty() && c.instance_id.to_string().starts_with(&query));

        let first = matches
            .next()
            .ok_or_else(|| ProjectError::UnknownInstance(query.clone()))?;
        if matches.next().is_some() {
            return Err(ProjectError::AmbiguousInstance(query));
        }
        Ok(first.instance_id)
    }

    pub fn find_instance(&self, query: &str) -> Result<&Component, ProjectError> {
        let id = self.resolve_instance(query)?;
        self.instance(id)
            .ok_or_else(|| ProjectError::UnknownInstance(query.to_string()))
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Component> {
        self.components.iter().find(|c| c.instance_id == id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.instance_id == id)
    }

    /// Set a variable on one instance, validated for the project's platform
    pub fn set_value(
        &mut self,
        id: InstanceId,
        variable: &str,
        value: Option<ConfigValue>,
    ) -> Result<(), ProjectError> {
        let context = self.validation_context();
        let component = self
            .instance_mut(id)
            .ok_or_else(|| ProjectError::UnknownInstance(id.to_string()))?;
        component.set_config_value(variable, value, &context)?;
        self.touch();
        Ok(())
    }

    /// Configuration problems per instance, empty when everything is valid
    pub fn validate(&self) -> Vec<(InstanceId, Vec<String>)> {
        let context = self.validation_context();
        self.components
            .iter()
            .filter_map(|c| {
                c.validate_configuration(&context)
                    .err()
                    .map(|errors| (c.instance_id, errors))
            })
            .collect()
    }

    pub fn generate_document(&self) -> String {
        document::generate(
            &self.components,
            &self.device.name,
            &self.device.platform,
            &self.device.board,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;
    use crate::variable::ConfigVariable;

    fn catalog_dht() -> Component {
        let mut dht = Component::new("dht", "sensor");
        dht.add_config_var(ConfigVariable::new("pin", "Data pin", DataType::Pin, true));
        dht
    }

    #[test]
    fn test_device_defaults() {
        let device = DeviceSettings::default();
        assert_eq!(device.name, "my_device");
        assert_eq!(device.platform, "ESP32");
        assert_eq!(device.board, "nodemcu-32s");

        let parsed: DeviceSettings = serde_json::from_str(r#"{"name":"dev1"}"#).unwrap();
        assert_eq!(parsed.name, "dev1");
        assert_eq!(parsed.board, "nodemcu-32s");
    }

    #[test]
    fn test_add_from_catalog_clones() {
        let catalog = catalog_dht();
        let mut project = Project::new("Kitchen", DeviceSettings::default());
        let first = project.add_from_catalog(&catalog);
        let second = project.add_from_catalog(&catalog);

        assert_ne!(first, second);
        assert_ne!(first, catalog.instance_id);
        assert_eq!(project.components.len(), 2);
    }

    #[test]
    fn test_resolve_instance_prefix() {
        let mut project = Project::new("Kitchen", DeviceSettings::default());
        let id = project.add_from_catalog(&catalog_dht());

        assert_eq!(project.resolve_instance(&id.short()).unwrap(), id);
        assert_eq!(project.resolve_instance(&id.to_string()).unwrap(), id);
        assert!(matches!(
            project.resolve_instance("zzzz"),
            Err(ProjectError::UnknownInstance(_))
        ));
        assert!(matches!(
            project.resolve_instance(""),
            Err(ProjectError::UnknownInstance(_))
        ));
    }

    #[test]
    fn test_set_value_uses_device_platform() {
        let mut project = Project::new(
            "Plug",
            DeviceSettings {
                platform: "ESP8266".to_string(),
                ..DeviceSettings::default()
            },
        );
        let id = project.add_from_catalog(&catalog_dht());

        // GPIO6 is a flash pin on ESP8266 boards
        assert!(project
            .set_value(id, "pin", Some(ConfigValue::from("GPIO6")))
            .is_err());
        project
            .set_value(id, "pin", Some(ConfigValue::from("GPIO5")))
            .unwrap();
        assert!(project.validate().is_empty());
    }

    #[test]
    fn test_validate_reports_missing_required() {
        let mut project = Project::new("Kitchen", DeviceSettings::default());
        let id = project.add_from_catalog(&catalog_dht());
        let problems = project.validate();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].0, id);
    }

    #[test]
    fn test_remove_and_generate() {
        let mut project = Project::new("Kitchen", DeviceSettings::default());
        let id = project.add_from_catalog(&catalog_dht());
        project.add_from_catalog(&Component::new("gpio", "switch"));

        let removed = project.remove(id).unwrap();
        assert_eq!(removed.name, "dht");
        assert!(project.remove(id).is_none());

        let doc = document::parse_document(&project.generate_document()).unwrap();
        assert!(doc.get("sensor").is_none());
        assert_eq!(doc["switch"].as_sequence().unwrap().len(), 1);
        assert_eq!(doc["esphome"]["name"].as_str(), Some("my_device"));
    }
}
