//! Data type tags and typed configuration values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a configuration variable
///
/// Tags outside the known set are kept verbatim in [`DataType::Other`] and
/// are treated like strings that always validate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    #[default]
    String,
    Int,
    Float,
    Bool,
    Identifier,
    Pin,
    I2cAddress,
    Frequency,
    Time,
    Percentage,
    IpAddress,
    Other(String),
}

impl DataType {
    /// The tag used in stored records and type hints
    pub fn as_str(&self) -> &str {
        match self {
            DataType::String => "string",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Bool => "bool",
            DataType::Identifier => "identifier",
            DataType::Pin => "pin",
            DataType::I2cAddress => "i2c_address",
            DataType::Frequency => "frequency",
            DataType::Time => "time",
            DataType::Percentage => "percentage",
            DataType::IpAddress => "ip_address",
            DataType::Other(tag) => tag,
        }
    }

    /// Parse a tag, keeping unknown tags as [`DataType::Other`]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "string" => DataType::String,
            "int" => DataType::Int,
            "float" => DataType::Float,
            "bool" => DataType::Bool,
            "identifier" => DataType::Identifier,
            "pin" => DataType::Pin,
            "i2c_address" => DataType::I2cAddress,
            "frequency" => DataType::Frequency,
            "time" => DataType::Time,
            "percentage" => DataType::Percentage,
            "ip_address" => DataType::IpAddress,
            _ => DataType::Other(tag.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, DataType::Other(_))
    }
}

impl From<String> for DataType {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<&str> for DataType {
    fn from(tag: &str) -> Self {
        Self::from_tag(tag)
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.as_str().to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Literals accepted as booleans, lowercase
pub(crate) const BOOL_LITERALS: [&str; 8] = ["true", "false", "1", "0", "yes", "no", "on", "off"];

impl ConfigValue {
    /// Text form of the value, as it would be typed by a user
    pub fn as_text(&self) -> String {
        self.to_string()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret a boolean literal (`true/false/1/0/yes/no/on/off`)
    pub fn parse_bool(text: &str) -> Option<bool> {
        let lower = text.trim().to_lowercase();
        if !BOOL_LITERALS.contains(&lower.as_str()) {
            return None;
        }
        Some(matches!(lower.as_str(), "true" | "1" | "yes" | "on"))
    }

    /// Convert the value into the representation its data type stores
    ///
    /// Only `int`, `float` and `bool` are converted; every other type keeps
    /// the value as given. Returns `None` when no conversion exists.
    pub fn coerce(self, data_type: &DataType) -> Option<ConfigValue> {
        match data_type {
            DataType::Int => match self {
                ConfigValue::Int(_) => Some(self),
                ConfigValue::Bool(b) => Some(ConfigValue::Int(i64::from(b))),
                ConfigValue::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                    Some(ConfigValue::Int(f as i64))
                }
                ConfigValue::Float(_) => None,
                ConfigValue::String(s) => s.trim().parse::<i64>().ok().map(ConfigValue::Int),
            },
            DataType::Float => match self {
                ConfigValue::Float(_) => Some(self),
                ConfigValue::Int(i) => Some(ConfigValue::Float(i as f64)),
                ConfigValue::Bool(b) => Some(ConfigValue::Float(if b { 1.0 } else { 0.0 })),
                ConfigValue::String(s) => s.trim().parse::<f64>().ok().map(ConfigValue::Float),
            },
            DataType::Bool => match self {
                ConfigValue::Bool(_) => Some(self),
                ConfigValue::Int(i) => Some(ConfigValue::Bool(i != 0)),
                ConfigValue::Float(_) => None,
                ConfigValue::String(s) => Self::parse_bool(&s).map(ConfigValue::Bool),
            },
            _ => Some(self),
        }
    }

    /// Convert into a document node
    pub fn to_yaml(&self) -> serde_yml::Value {
        match self {
            ConfigValue::Bool(b) => serde_yml::Value::Bool(*b),
            ConfigValue::Int(i) => serde_yml::Value::Number(serde_yml::Number::from(*i)),
            ConfigValue::Float(f) => serde_yml::Value::Number(serde_yml::Number::from(*f)),
            ConfigValue::String(s) => serde_yml::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(x) => write!(f, "{}", x),
            ConfigValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_tags() {
        assert_eq!(DataType::from_tag("i2c_address"), DataType::I2cAddress);
        assert_eq!(DataType::from_tag("PIN"), DataType::Pin);
        assert_eq!(
            DataType::from_tag("color"),
            DataType::Other("color".to_string())
        );
        assert_eq!(DataType::Time.to_string(), "time");
        assert!(!DataType::from_tag("color").is_known());
    }

    #[test]
    fn test_data_type_serde() {
        let json = serde_json::to_string(&DataType::IpAddress).unwrap();
        assert_eq!(json, "\"ip_address\"");
        let parsed: DataType = serde_json::from_str("\"frequency\"").unwrap();
        assert_eq!(parsed, DataType::Frequency);
    }

    #[test]
    fn test_value_untagged_serde() {
        let values: Vec<ConfigValue> = serde_json::from_str(r#"[true, 3, 2.5, "GPIO2"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ConfigValue::Bool(true),
                ConfigValue::Int(3),
                ConfigValue::Float(2.5),
                ConfigValue::String("GPIO2".to_string()),
            ]
        );
    }

    #[test]
    fn test_coercion() {
        assert_eq!(
            ConfigValue::from("42").coerce(&DataType::Int),
            Some(ConfigValue::Int(42))
        );
        assert_eq!(ConfigValue::from("abc").coerce(&DataType::Int), None);
        assert_eq!(
            ConfigValue::Int(2).coerce(&DataType::Float),
            Some(ConfigValue::Float(2.0))
        );
        assert_eq!(
            ConfigValue::from("On").coerce(&DataType::Bool),
            Some(ConfigValue::Bool(true))
        );
        assert_eq!(ConfigValue::from("maybe").coerce(&DataType::Bool), None);
        assert_eq!(
            ConfigValue::from("GPIO4").coerce(&DataType::Pin),
            Some(ConfigValue::from("GPIO4"))
        );
    }
}
