//! Value validation by declared data type
//!
//! Every check is a pure function returning `Ok(())` or a
//! [`ValidationFailure`] carrying a human-readable message. Validation never
//! panics; an absent value is always valid (whether a value must be present is
//! decided by the caller from `is_required`), and unknown data types accept
//! anything.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::value::{ConfigValue, DataType, BOOL_LITERALS};

/// Platform assumed when the context names none
pub const DEFAULT_PLATFORM: &str = "ESP32";

/// Identifiers that collide with document keywords or top-level sections
pub const RESERVED_IDENTIFIERS: [&str; 13] = [
    "true",
    "false",
    "null",
    "yes",
    "no",
    "on",
    "off",
    "esphome",
    "wifi",
    "api",
    "ota",
    "logger",
    "web_server",
];

const MAX_IDENTIFIER_LEN: usize = 63;
const MAX_STRING_LEN: usize = 1000;
const MAX_FREQUENCY_HZ: f64 = 1e9;
const MAX_DURATION_MS: f64 = 86_400_000.0;

/// ESP32 flash pins, unusable as GPIO
const ESP32_FLASH_PINS: [u32; 6] = [6, 7, 8, 9, 10, 11];
const ESP8266_PINS: [u32; 11] = [0, 1, 2, 3, 4, 5, 12, 13, 14, 15, 16];

/// A value failed its type rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationFailure {
    pub message: String,
}

impl ValidationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Validation = Result<(), ValidationFailure>;

fn fail(message: impl Into<String>) -> Validation {
    Err(ValidationFailure::new(message))
}

/// Extra information some rules depend on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationContext {
    /// Target platform for pin checks (e.g. "ESP32", "ESP8266")
    pub platform: Option<String>,
}

impl ValidationContext {
    pub fn for_platform(platform: impl Into<String>) -> Self {
        Self {
            platform: Some(platform.into()),
        }
    }

    pub fn platform(&self) -> &str {
        self.platform.as_deref().unwrap_or(DEFAULT_PLATFORM)
    }
}

fn identifier_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("identifier regex"))
}

fn pin_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(GPIO)?(\d+)$").expect("pin regex"))
}

fn i2c_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0[xX][0-9A-Fa-f]{2}$").expect("i2c regex"))
}

fn frequency_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+(?:\.\d+)?)(hz|khz|mhz)$").expect("frequency regex"))
}

fn duration_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+(?:\.\d+)?)(ms|s|min|h)$").expect("duration regex"))
}

fn ip_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("ip regex"))
}

/// Validate `value` against the rule for `data_type`
pub fn validate(
    value: Option<&ConfigValue>,
    data_type: &DataType,
    context: &ValidationContext,
) -> Validation {
    let Some(value) = value else {
        return Ok(());
    };

    match data_type {
        DataType::Identifier => validate_identifier(&value.as_text()),
        DataType::Pin => validate_pin(value, context.platform()),
        DataType::I2cAddress => validate_i2c_address(value),
        DataType::Frequency => validate_frequency(&value.as_text()),
        DataType::Time => validate_time(&value.as_text()),
        DataType::Percentage => validate_percentage(value),
        DataType::IpAddress => validate_ip_address(&value.as_text()),
        DataType::Int => validate_int(value),
        DataType::Float => validate_float(value),
        DataType::Bool => validate_bool(value),
        DataType::String => validate_string(&value.as_text()),
        DataType::Other(_) => Ok(()),
    }
}

/// Identifier: letter first, then letters, digits or underscores
pub fn validate_identifier(value: &str) -> Validation {
    if value.is_empty() {
        return fail("Identifier cannot be empty");
    }
    if !identifier_pattern().is_match(value) {
        return fail(
            "Identifier must start with a letter and contain only letters, numbers, and underscores",
        );
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return fail(format!(
            "Identifier must be {} characters or less",
            MAX_IDENTIFIER_LEN
        ));
    }
    if RESERVED_IDENTIFIERS.contains(&value.to_lowercase().as_str()) {
        return fail(format!("'{}' is a reserved keyword", value));
    }
    Ok(())
}

/// Whether `pin` is usable as GPIO on `platform`
fn pin_allowed(pin: u32, platform: &str) -> bool {
    match platform.to_uppercase().as_str() {
        "ESP32" => pin < 40 && !ESP32_FLASH_PINS.contains(&pin),
        "ESP8266" => ESP8266_PINS.contains(&pin),
        _ => pin < 50,
    }
}

/// GPIO pin: `GPIO<n>` or a bare number, checked against the platform's pins
pub fn validate_pin(value: &ConfigValue, platform: &str) -> Validation {
    let pin = match value {
        ConfigValue::String(text) => {
            let Some(caps) = pin_pattern().captures(text.trim()) else {
                return fail("Invalid pin format. Use 'GPIO<number>' or just '<number>'");
            };
            match caps[2].parse::<u32>() {
                Ok(pin) => pin,
                Err(_) => return fail(format!("Pin {} is out of range", &caps[2])),
            }
        }
        ConfigValue::Int(n) => match u32::try_from(*n) {
            Ok(pin) => pin,
            Err(_) => return fail(format!("Pin {} is not valid for {}", n, platform)),
        },
        _ => return fail("Pin must be a number or GPIO string"),
    };

    if !pin_allowed(pin, platform) {
        return fail(format!("Pin {} is not valid for {}", pin, platform));
    }
    Ok(())
}

fn i2c_reserved(address: u8) -> bool {
    address <= 0x07 || (0x78..=0x7F).contains(&address)
}

/// I2C address: `0xHH` string or integer 0-255, outside the reserved ranges
pub fn validate_i2c_address(value: &ConfigValue) -> Validation {
    let address = match value {
        ConfigValue::String(text) => {
            if !i2c_pattern().is_match(text) {
                return fail("I2C address must be in format '0xNN' (e.g., '0x48')");
            }
            match u8::from_str_radix(&text[2..], 16) {
                Ok(address) => address,
                Err(_) => return fail("I2C address must be in format '0xNN' (e.g., '0x48')"),
            }
        }
        ConfigValue::Int(n) => match u8::try_from(*n) {
            Ok(address) => address,
            Err(_) => return fail("I2C address must be between 0x00 and 0xFF"),
        },
        _ => return fail("I2C address must be a hex string or integer"),
    };

    if i2c_reserved(address) {
        return fail(format!("Address 0x{:02X} is reserved", address));
    }
    Ok(())
}

/// Split `<number><unit>` and scale the number by the unit multiplier
fn scaled_quantity(value: &str, pattern: &Regex, multiplier: fn(&str) -> f64) -> Option<f64> {
    let caps = pattern.captures(value.trim())?;
    let number: f64 = caps[1].parse().ok()?;
    Some(number * multiplier(&caps[2].to_lowercase()))
}

fn hz_multiplier(unit: &str) -> f64 {
    match unit {
        "khz" => 1e3,
        "mhz" => 1e6,
        _ => 1.0,
    }
}

fn ms_multiplier(unit: &str) -> f64 {
    match unit {
        "s" => 1_000.0,
        "min" => 60_000.0,
        "h" => 3_600_000.0,
        _ => 1.0,
    }
}

/// Frequency with unit (Hz, KHz, MHz), at most 1 GHz
pub fn validate_frequency(value: &str) -> Validation {
    let Some(hz) = scaled_quantity(value, frequency_pattern(), hz_multiplier) else {
        return fail("Frequency must include units (Hz, KHz, MHz)");
    };
    if hz <= 0.0 {
        return fail("Frequency must be positive");
    }
    if hz > MAX_FREQUENCY_HZ {
        return fail("Frequency is too high (max 1 GHz)");
    }
    Ok(())
}

/// Duration with unit (ms, s, min, h), at most 24 hours
pub fn validate_time(value: &str) -> Validation {
    let Some(ms) = scaled_quantity(value, duration_pattern(), ms_multiplier) else {
        return fail("Time duration must include units (ms, s, min, h)");
    };
    if ms <= 0.0 {
        return fail("Duration must be positive");
    }
    if ms > MAX_DURATION_MS {
        return fail("Duration is too long (max 24 hours)");
    }
    Ok(())
}

/// Percentage between 0 and 100, bare or with a `%` suffix
pub fn validate_percentage(value: &ConfigValue) -> Validation {
    let number = match value {
        ConfigValue::Int(n) => *n as f64,
        ConfigValue::Float(f) => *f,
        ConfigValue::String(text) => {
            let trimmed = text.trim();
            let digits = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
            match digits.parse::<f64>() {
                Ok(number) => number,
                Err(_) => return fail("Invalid percentage format"),
            }
        }
        ConfigValue::Bool(_) => return fail("Percentage must be a number or string with '%'"),
    };

    if !(0.0..=100.0).contains(&number) {
        return fail("Percentage must be between 0 and 100");
    }
    Ok(())
}

/// Dotted-quad IPv4 address
pub fn validate_ip_address(value: &str) -> Validation {
    if !ip_pattern().is_match(value) {
        return fail("Invalid IP address format");
    }
    for octet in value.split('.') {
        match octet.parse::<u16>() {
            Ok(n) if n <= 255 => {}
            Ok(_) => return fail("IP address octets must be between 0 and 255"),
            Err(_) => return fail("IP address octets must be numbers"),
        }
    }
    Ok(())
}

fn validate_int(value: &ConfigValue) -> Validation {
    let ok = match value {
        ConfigValue::Int(_) | ConfigValue::Bool(_) => true,
        ConfigValue::Float(f) => f.is_finite(),
        ConfigValue::String(text) => text.trim().parse::<i64>().is_ok(),
    };
    if ok {
        Ok(())
    } else {
        fail("Value must be an integer")
    }
}

fn validate_float(value: &ConfigValue) -> Validation {
    let ok = match value {
        ConfigValue::Int(_) | ConfigValue::Float(_) | ConfigValue::Bool(_) => true,
        ConfigValue::String(text) => text.trim().parse::<f64>().is_ok(),
    };
    if ok {
        Ok(())
    } else {
        fail("Value must be a number")
    }
}

fn validate_bool(value: &ConfigValue) -> Validation {
    let ok = match value {
        ConfigValue::Bool(_) => true,
        ConfigValue::String(text) => BOOL_LITERALS.contains(&text.to_lowercase().as_str()),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        fail("Value must be a boolean (true/false)")
    }
}

fn validate_string(value: &str) -> Validation {
    if value.chars().count() > MAX_STRING_LEN {
        return fail(format!(
            "String is too long (max {} characters)",
            MAX_STRING_LEN
        ));
    }
    Ok(())
}
