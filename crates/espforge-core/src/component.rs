//! Catalog components and their placed instances

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::validation::{validate, ValidationContext};
use crate::value::ConfigValue;
use crate::variable::{ConfigVariable, ValueError};

/// Identity of one placed instance of a catalog component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex characters, used in generated ids
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Canvas position, owned by the presentation layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// Canvas size, owned by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: 200,
            height: 150,
        }
    }
}

/// Lowercase a name and replace spaces and dots with underscores
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace([' ', '.'], "_")
}

/// A catalog component (e.g. `sensor` / `dht`) or a placed instance of one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Display/platform name (e.g. "dht", "gpio")
    pub name: String,
    /// Document section the component belongs to (e.g. "sensor")
    pub component_type: String,
    #[serde(default)]
    pub description: String,
    /// Page the component was discovered from
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default)]
    config_vars: Vec<ConfigVariable>,
    #[serde(default)]
    pub instance_id: InstanceId,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
}

impl Component {
    /// Create a component with a fresh instance id
    pub fn new(name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_type: component_type.into(),
            description: String::new(),
            url: None,
            platforms: Vec::new(),
            config_vars: Vec::new(),
            instance_id: InstanceId::new(),
            position: Position::default(),
            size: Size::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Persistence key: `<type>.<normalized name>`
    pub fn catalog_key(&self) -> String {
        format!("{}.{}", self.component_type, normalize_name(&self.name))
    }

    pub fn short_id(&self) -> String {
        self.instance_id.short()
    }

    pub fn platforms(&self) -> &[String] {
        &self.platforms
    }

    /// Add a platform tag unless already present
    pub fn add_platform(&mut self, platform: impl Into<String>) -> bool {
        let platform = platform.into();
        if self.platforms.contains(&platform) {
            return false;
        }
        self.platforms.push(platform);
        true
    }

    pub fn config_vars(&self) -> &[ConfigVariable] {
        &self.config_vars
    }

    /// Append a variable; rejected when a variable with that name exists
    pub fn add_config_var(&mut self, var: ConfigVariable) -> bool {
        if self.has_config_var(&var.name) {
            return false;
        }
        self.config_vars.push(var);
        true
    }

    pub fn has_config_var(&self, name: &str) -> bool {
        self.config_vars.iter().any(|v| v.name == name)
    }

    pub fn config_var(&self, name: &str) -> Option<&ConfigVariable> {
        self.config_vars.iter().find(|v| v.name == name)
    }

    pub fn config_var_mut(&mut self, name: &str) -> Option<&mut ConfigVariable> {
        self.config_vars.iter_mut().find(|v| v.name == name)
    }

    /// Set a variable's user value through its validating setter
    pub fn set_config_value(
        &mut self,
        name: &str,
        value: Option<ConfigValue>,
        context: &ValidationContext,
    ) -> Result<(), ValueError> {
        let var = self
            .config_var_mut(name)
            .ok_or_else(|| ValueError::UnknownVariable(name.to_string()))?;
        var.set_value(value, context)
    }

    /// Check required variables and every effective value
    ///
    /// Returns one message per offending variable.
    pub fn validate_configuration(&self, context: &ValidationContext) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for var in &self.config_vars {
            if !var.is_valid() {
                errors.push(format!("Required variable '{}' is not set", var.name));
                continue;
            }
            if let Err(failure) = validate(var.effective_value(), &var.data_type, context) {
                errors.push(format!("Variable '{}': {}", var.name, failure));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.position = Position { x, y };
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = Size { width, height };
    }

    /// Whether a canvas point lies within this component's bounds
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        let right = i64::from(self.position.x) + i64::from(self.size.width);
        let bottom = i64::from(self.position.y) + i64::from(self.size.height);
        self.position.x <= x
            && i64::from(x) <= right
            && self.position.y <= y
            && i64::from(y) <= bottom
    }

    /// Copy this component, values included, under a new instance id
    pub fn clone_instance(&self) -> Self {
        let mut copy = self.clone();
        copy.instance_id = InstanceId::new();
        copy
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.component_type, self.name)
    }
}
