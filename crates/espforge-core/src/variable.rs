//! Typed configuration variables owned by components

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::string_text;
use crate::validation::{validate, ValidationContext, ValidationFailure};
use crate::value::{ConfigValue, DataType};

/// Characters that force a string literal into double quotes
pub const QUOTE_TRIGGERS: [char; 8] = [':', '[', ']', '{', '}', '|', '>', '#'];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("Cannot convert '{value}' to {data_type}")]
    Coercion { value: String, data_type: DataType },
    #[error("Invalid value for '{name}': {failure}")]
    Invalid {
        name: String,
        failure: ValidationFailure,
    },
    #[error("Required variable '{0}' cannot be cleared")]
    RequiredCleared(String),
    #[error("Unknown configuration variable '{0}'")]
    UnknownVariable(String),
}

/// A single configuration field of a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVariable {
    /// Key in the generated document, unique within the owning component
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub default_value: Option<ConfigValue>,
    /// User-set value; only changed through [`ConfigVariable::set_value`]
    #[serde(default)]
    current_value: Option<ConfigValue>,
}

impl ConfigVariable {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        data_type: DataType,
        is_required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            data_type,
            is_required,
            default_value: None,
            current_value: None,
        }
    }

    pub fn with_default(mut self, value: ConfigValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn current_value(&self) -> Option<&ConfigValue> {
        self.current_value.as_ref()
    }

    /// The user-set value if present, else the default
    pub fn effective_value(&self) -> Option<&ConfigValue> {
        self.current_value.as_ref().or(self.default_value.as_ref())
    }

    /// Set (or clear with `None`) the user value
    ///
    /// The value is coerced to the declared type and validated; on any
    /// failure the previous value is kept.
    pub fn set_value(
        &mut self,
        value: Option<ConfigValue>,
        context: &ValidationContext,
    ) -> Result<(), ValueError> {
        let Some(value) = value else {
            if self.is_required {
                return Err(ValueError::RequiredCleared(self.name.clone()));
            }
            self.current_value = None;
            return Ok(());
        };

        let text = value.as_text();
        let coerced = value
            .coerce(&self.data_type)
            .ok_or_else(|| ValueError::Coercion {
                value: text,
                data_type: self.data_type.clone(),
            })?;

        validate(Some(&coerced), &self.data_type, context).map_err(|failure| {
            ValueError::Invalid {
                name: self.name.clone(),
                failure,
            }
        })?;

        self.current_value = Some(coerced);
        Ok(())
    }

    /// A required variable needs an effective value
    pub fn is_valid(&self) -> bool {
        !(self.is_required && self.effective_value().is_none())
    }

    /// Effective value as document text, double-quoting strings that need it
    pub fn yaml_literal(&self) -> Option<String> {
        match self.effective_value()? {
            ConfigValue::String(s) => Some(string_text(s)),
            other => Some(other.as_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn esp32() -> ValidationContext {
        ValidationContext::for_platform("ESP32")
    }

    #[test]
    fn test_effective_value() {
        let mut var = ConfigVariable::new("update_interval", "", DataType::Time, false)
            .with_default(ConfigValue::from("60s"));
        assert_eq!(var.effective_value(), Some(&ConfigValue::from("60s")));

        var.set_value(Some(ConfigValue::from("10s")), &esp32()).unwrap();
        assert_eq!(var.effective_value(), Some(&ConfigValue::from("10s")));

        var.set_value(None, &esp32()).unwrap();
        assert_eq!(var.effective_value(), Some(&ConfigValue::from("60s")));
    }

    #[test]
    fn test_set_value_coerces() {
        let mut var = ConfigVariable::new("accuracy_decimals", "", DataType::Int, false);
        var.set_value(Some(ConfigValue::from("2")), &esp32()).unwrap();
        assert_eq!(var.current_value(), Some(&ConfigValue::Int(2)));

        let mut flag = ConfigVariable::new("inverted", "", DataType::Bool, false);
        flag.set_value(Some(ConfigValue::from("yes")), &esp32()).unwrap();
        assert_eq!(flag.current_value(), Some(&ConfigValue::Bool(true)));
    }

    #[test]
    fn test_failed_set_keeps_previous_value() {
        let mut pin = ConfigVariable::new("pin", "", DataType::Pin, true);
        pin.set_value(Some(ConfigValue::from("GPIO2")), &esp32()).unwrap();

        let err = pin
            .set_value(Some(ConfigValue::from("GPIO6")), &esp32())
            .unwrap_err();
        assert!(matches!(err, ValueError::Invalid { .. }));
        assert_eq!(pin.current_value(), Some(&ConfigValue::from("GPIO2")));

        let err = pin.set_value(None, &esp32()).unwrap_err();
        assert_eq!(err, ValueError::RequiredCleared("pin".to_string()));
        assert_eq!(pin.current_value(), Some(&ConfigValue::from("GPIO2")));

        let mut count = ConfigVariable::new("count", "", DataType::Int, false);
        count.set_value(Some(ConfigValue::Int(3)), &esp32()).unwrap();
        assert!(count
            .set_value(Some(ConfigValue::from("three")), &esp32())
            .is_err());
        assert_eq!(count.current_value(), Some(&ConfigValue::Int(3)));
    }

    #[test]
    fn test_is_valid() {
        let mut name = ConfigVariable::new("name", "", DataType::String, true);
        assert!(!name.is_valid());
        name.set_value(Some(ConfigValue::from("Kitchen")), &esp32())
            .unwrap();
        assert!(name.is_valid());
        assert!(ConfigVariable::new("id", "", DataType::Identifier, false).is_valid());
    }

    #[test]
    fn test_yaml_literal_quotes() {
        let var = ConfigVariable::new("lambda", "", DataType::String, false)
            .with_default(ConfigValue::from("return {x: 1};"));
        assert_eq!(var.yaml_literal().unwrap(), "\"return {x: 1};\"");

        let plain = ConfigVariable::new("name", "", DataType::String, false)
            .with_default(ConfigValue::from("Kitchen"));
        assert_eq!(plain.yaml_literal().unwrap(), "Kitchen");

        let quoted = ConfigVariable::new("name", "", DataType::String, false)
            .with_default(ConfigValue::from(r#"say "hi": now"#));
        let text = quoted.yaml_literal().unwrap();
        assert_eq!(text, r#""say \"hi\": now""#);
        let parsed: serde_yml::Value = serde_yml::from_str(&text).unwrap();
        assert_eq!(parsed.as_str(), Some(r#"say "hi": now"#));
    }

    #[test]
    fn test_serde_keeps_current_value() {
        let mut var = ConfigVariable::new("pin", "Data pin", DataType::Pin, true);
        var.set_value(Some(ConfigValue::from("GPIO4")), &esp32()).unwrap();

        let json = serde_json::to_string(&var).unwrap();
        let back: ConfigVariable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, var);
    }
}
