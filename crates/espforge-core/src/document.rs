//! Configuration document generation, validation and merging
//!
//! A project's component instances are grouped by type into one ordered
//! document seeded with the device sections every firmware needs. The
//! document is rendered by a small deterministic block-style emitter so
//! key order and quoting never depend on the serializer in use.

use chrono::Local;
use serde_yml::value::{Tag, TaggedValue};
use serde_yml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

use crate::component::{normalize_name, Component};
use crate::variable::QUOTE_TRIGGERS;

const INDENT: usize = 2;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document syntax error: {0}")]
    Syntax(String),
    #[error("Document root must be a mapping")]
    NotAMapping,
}

impl From<serde_yml::Error> for DocumentError {
    fn from(err: serde_yml::Error) -> Self {
        DocumentError::Syntax(err.to_string())
    }
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

/// A `!secret <name>` reference resolved from secrets.yaml
fn secret(name: &str) -> Value {
    Value::Tagged(Box::new(TaggedValue {
        tag: Tag::new("secret"),
        value: Value::String(name.to_string()),
    }))
}

fn seed_sections(device_name: &str, platform: &str, board: &str) -> Mapping {
    let mut esphome = Mapping::new();
    esphome.insert(key("name"), key(device_name));
    esphome.insert(key("platform"), key(platform));
    esphome.insert(key("board"), key(board));

    let mut wifi = Mapping::new();
    wifi.insert(key("ssid"), secret("wifi_ssid"));
    wifi.insert(key("password"), secret("wifi_password"));

    let mut api = Mapping::new();
    api.insert(key("password"), secret("api_password"));

    let mut ota = Mapping::new();
    ota.insert(key("password"), secret("ota_password"));

    let mut doc = Mapping::new();
    doc.insert(key("esphome"), Value::Mapping(esphome));
    doc.insert(key("wifi"), Value::Mapping(wifi));
    doc.insert(key("logger"), Value::Mapping(Mapping::new()));
    doc.insert(key("api"), Value::Mapping(api));
    doc.insert(key("ota"), Value::Mapping(ota));
    doc
}

/// Build the document entry for one component instance
///
/// `platform` is set when the name differs from the type, every variable
/// with an effective value is copied in declaration order, and an `id` is
/// synthesized from the name and instance id when none was configured.
pub fn component_entry(component: &Component) -> Option<Mapping> {
    let mut entry = Mapping::new();

    if component.name != component.component_type {
        entry.insert(key("platform"), key(&component.name));
    }

    for var in component.config_vars() {
        if let Some(value) = var.effective_value() {
            entry.insert(key(&var.name), value.to_yaml());
        }
    }

    if !entry.contains_key(&key("id")) {
        let stem = normalize_name(&component.name).replace('-', "_");
        entry.insert(
            key("id"),
            Value::String(format!("{}_{}", stem, component.short_id())),
        );
    }

    if entry.is_empty() {
        None
    } else {
        Some(entry)
    }
}

/// Assemble the document tree for a set of component instances
pub fn build_document(
    components: &[Component],
    device_name: &str,
    platform: &str,
    board: &str,
) -> Value {
    let mut doc = seed_sections(device_name, platform, board);

    // Group by type, first-seen type order, input order within a type
    let mut groups: Vec<(&str, Vec<&Component>)> = Vec::new();
    for component in components {
        let section = component.component_type.as_str();
        match groups.iter_mut().find(|(t, _)| *t == section) {
            Some((_, members)) => members.push(component),
            None => groups.push((section, vec![component])),
        }
    }

    for (section, members) in groups {
        let section_key = key(section);
        if !doc.contains_key(&section_key) {
            doc.insert(section_key.clone(), Value::Sequence(Vec::new()));
        }

        for component in members {
            let Some(entry) = component_entry(component) else {
                continue;
            };
            match doc.get_mut(&section_key) {
                Some(Value::Sequence(items)) => items.push(Value::Mapping(entry)),
                Some(slot) => {
                    debug!(
                        section = %section,
                        component = %component.name,
                        "Component replaces seeded section"
                    );
                    *slot = Value::Mapping(entry);
                }
                None => {}
            }
        }
    }

    Value::Mapping(doc)
}

/// Generate the full document text for a set of component instances
pub fn generate(components: &[Component], device_name: &str, platform: &str, board: &str) -> String {
    debug!(
        components = components.len(),
        device = %device_name,
        "Generating configuration document"
    );
    render_with_header(&build_document(components, device_name, platform, board))
}

/// Document containing just one component's entry under its type
pub fn component_snippet(component: &Component) -> String {
    match component_entry(component) {
        Some(entry) => {
            let mut doc = Mapping::new();
            doc.insert(
                key(&component.component_type),
                Value::Sequence(vec![Value::Mapping(entry)]),
            );
            render_with_header(&Value::Mapping(doc))
        }
        None => format!("# No configuration available for {}\n", component.name),
    }
}

pub fn parse_document(text: &str) -> Result<Value, DocumentError> {
    Ok(serde_yml::from_str(text)?)
}

/// Structural sanity check: the text must parse
pub fn validate_document(text: &str) -> Result<(), DocumentError> {
    parse_document(text).map(|_| ())
}

/// Recursively merge `overlay` into `base`
///
/// Mappings merge key by key, sequences concatenate, anything else is
/// replaced by the overlay value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base), Value::Mapping(overlay)) => {
            for (k, v) in overlay {
                match base.get_mut(&k) {
                    Some(slot) => {
                        let existing = std::mem::replace(slot, Value::Null);
                        *slot = deep_merge(existing, v);
                    }
                    None => {
                        base.insert(k, v);
                    }
                }
            }
            Value::Mapping(base)
        }
        (Value::Sequence(mut base), Value::Sequence(overlay)) => {
            base.extend(overlay);
            Value::Sequence(base)
        }
        (_, overlay) => overlay,
    }
}

/// Parse, merge in order and re-render a list of documents
///
/// Blank and empty documents are skipped.
pub fn merge_documents<S: AsRef<str>>(texts: &[S]) -> Result<String, DocumentError> {
    let mut merged = Value::Mapping(Mapping::new());

    for text in texts {
        let text = text.as_ref();
        if text.trim().is_empty() {
            continue;
        }
        let doc = parse_document(text)?;
        match doc {
            Value::Null => continue,
            Value::Mapping(_) => merged = deep_merge(merged, doc),
            _ => return Err(DocumentError::NotAMapping),
        }
    }

    Ok(render_with_header(&merged))
}

/// Template for the secrets file referenced by the seeded sections
pub fn secrets_template() -> String {
    "# ESPHome Secrets Template
# Copy this file to secrets.yaml and fill in your actual values

# WiFi Configuration
wifi_ssid: \"Your_WiFi_Network_Name\"
wifi_password: \"your_wifi_password\"

# API Configuration
api_password: \"your_api_password\"

# OTA Configuration
ota_password: \"your_ota_password\"

# Additional secrets can be added here
# mqtt_username: \"your_mqtt_username\"
# mqtt_password: \"your_mqtt_password\"
"
    .to_string()
}

fn header() -> String {
    format!(
        "# ESPHome Configuration\n# Generated on: {}\n# espforge component manager\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn render_with_header(doc: &Value) -> String {
    let mut out = header();
    out.push_str(&render(doc));
    out
}

/// Render a document in block style
pub fn render(doc: &Value) -> String {
    let mut out = String::new();
    match doc {
        Value::Mapping(map) if !map.is_empty() => write_mapping(&mut out, map, 0),
        Value::Sequence(seq) if !seq.is_empty() => write_sequence(&mut out, seq, 0),
        other => {
            let (tag, inner) = untag(other);
            out.push_str(&join_inline(tag, &scalar(inner)));
            out.push('\n');
        }
    }
    out
}

fn untag(value: &Value) -> (Option<String>, &Value) {
    match value {
        Value::Tagged(tagged) => (
            Some(format!("!{}", tagged.tag.to_string().trim_start_matches('!'))),
            &tagged.value,
        ),
        other => (None, other),
    }
}

fn is_block(value: &Value) -> bool {
    match value {
        Value::Mapping(map) => !map.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        _ => false,
    }
}

fn join_inline(tag: Option<String>, text: &str) -> String {
    match (tag, text.is_empty()) {
        (Some(tag), true) => tag,
        (Some(tag), false) => format!("{} {}", tag, text),
        (None, _) => text.to_string(),
    }
}

fn write_block(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::Mapping(map) => write_mapping(out, map, indent),
        Value::Sequence(seq) => write_sequence(out, seq, indent),
        _ => {}
    }
}

fn write_mapping(out: &mut String, map: &Mapping, indent: usize) {
    let pad = " ".repeat(indent);
    for (k, v) in map {
        out.push_str(&pad);
        out.push_str(&scalar(k));
        out.push(':');

        let (tag, inner) = untag(v);
        if is_block(inner) {
            if let Some(tag) = tag {
                out.push(' ');
                out.push_str(&tag);
            }
            out.push('\n');
            write_block(out, inner, indent + INDENT);
        } else {
            let text = join_inline(tag, &scalar(inner));
            if !text.is_empty() {
                out.push(' ');
                out.push_str(&text);
            }
            out.push('\n');
        }
    }
}

fn write_sequence(out: &mut String, seq: &[Value], indent: usize) {
    let pad = " ".repeat(indent);
    for item in seq {
        let (tag, inner) = untag(item);
        match (tag, inner) {
            (None, Value::Mapping(map)) if !map.is_empty() => {
                // First key shares the dash line, the rest align under it
                let mut nested = String::new();
                write_mapping(&mut nested, map, indent + INDENT);
                out.push_str(&pad);
                out.push_str("- ");
                out.push_str(&nested[indent + INDENT..]);
            }
            (tag, inner) if is_block(inner) => {
                out.push_str(&pad);
                out.push('-');
                if let Some(tag) = tag {
                    out.push(' ');
                    out.push_str(&tag);
                }
                out.push('\n');
                write_block(out, inner, indent + INDENT);
            }
            (tag, inner) => {
                let text = join_inline(tag, &scalar(inner));
                out.push_str(&pad);
                out.push('-');
                if !text.is_empty() {
                    out.push(' ');
                    out.push_str(&text);
                }
                out.push('\n');
            }
        }
    }
}

/// Inline text of a scalar (or empty collection); null renders empty
fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                float_text(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => string_text(s),
        Value::Mapping(_) => "{}".to_string(),
        Value::Sequence(_) => "[]".to_string(),
        Value::Tagged(_) => {
            let (tag, inner) = untag(value);
            join_inline(tag, &scalar(inner))
        }
    }
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        ".nan".to_string()
    } else if f.is_infinite() && f > 0.0 {
        ".inf".to_string()
    } else if f.is_infinite() {
        "-.inf".to_string()
    } else {
        let text = f.to_string();
        if text.contains(['.', 'e', 'E']) {
            text
        } else {
            format!("{}.0", text)
        }
    }
}

/// A string scalar as document text, quoted and escaped when needed
pub(crate) fn string_text(s: &str) -> String {
    if needs_quotes(s) {
        quote(s)
    } else {
        s.to_string()
    }
}

fn needs_quotes(s: &str) -> bool {
    if s.is_empty()
        || s.contains(&QUOTE_TRIGGERS[..])
        || s.trim() != s
        || s.chars().any(char::is_control)
    {
        return true;
    }
    // Anything that would read back as a non-string (numbers, booleans,
    // null, tags, anchors, flow markers) must be quoted
    !matches!(serde_yml::from_str::<Value>(s), Ok(Value::String(ref parsed)) if parsed == s)
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationContext;
    use crate::value::{ConfigValue, DataType};
    use crate::variable::ConfigVariable;

    fn dht_with_pin() -> Component {
        let mut dht = Component::new("dht", "sensor");
        dht.add_config_var(ConfigVariable::new("pin", "Data pin", DataType::Pin, true));
        dht.set_config_value(
            "pin",
            Some(ConfigValue::from("GPIO2")),
            &ValidationContext::default(),
        )
        .unwrap();
        dht
    }

    fn is_hex8(s: &str) -> bool {
        s.len() == 8 && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    #[test]
    fn test_generate_end_to_end() {
        let dht = dht_with_pin();
        let gpio = Component::new("gpio", "switch");
        let text = generate(&[dht, gpio], "dev1", "ESP32", "nodemcu-32s");

        assert!(text.starts_with("# ESPHome Configuration\n# Generated on: "));
        validate_document(&text).unwrap();

        let doc = parse_document(&text).unwrap();
        assert_eq!(doc["esphome"]["name"], key("dev1"));
        assert_eq!(doc["esphome"]["board"], key("nodemcu-32s"));

        let sensors = doc["sensor"].as_sequence().unwrap();
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0]["platform"], key("dht"));
        assert_eq!(sensors[0]["pin"], key("GPIO2"));
        let id = sensors[0]["id"].as_str().unwrap();
        assert!(id.starts_with("dht_"));
        assert!(is_hex8(&id["dht_".len()..]));

        let switches = doc["switch"].as_sequence().unwrap();
        assert_eq!(switches.len(), 1);
        assert!(switches[0]["id"].as_str().is_some());
    }

    #[test]
    fn test_section_and_entry_order() {
        let a = Component::new("dht", "sensor");
        let b = Component::new("gpio", "switch");
        let c = Component::new("bme280", "sensor");
        let doc = build_document(&[a.clone(), b, c.clone()], "dev", "ESP32", "board");

        let keys: Vec<&str> = doc
            .as_mapping()
            .unwrap()
            .keys()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(
            keys,
            ["esphome", "wifi", "logger", "api", "ota", "sensor", "switch"]
        );

        let sensors = doc["sensor"].as_sequence().unwrap();
        assert_eq!(sensors[0]["platform"], key("dht"));
        assert_eq!(sensors[1]["platform"], key("bme280"));
        assert_eq!(
            sensors[1]["id"],
            Value::String(format!("bme280_{}", c.short_id()))
        );
    }

    #[test]
    fn test_configured_id_kept() {
        let mut relay = Component::new("Relay-Board", "switch");
        relay.add_config_var(
            ConfigVariable::new("id", "", DataType::Identifier, false)
                .with_default(ConfigValue::from("main_relay")),
        );
        let entry = component_entry(&relay).unwrap();
        assert_eq!(entry.get(&key("id")), Some(&key("main_relay")));

        let unnamed = Component::new("Relay-Board", "switch");
        let entry = component_entry(&unnamed).unwrap();
        let id = entry.get(&key("id")).and_then(Value::as_str).unwrap();
        assert!(id.starts_with("relay_board_"));
    }

    #[test]
    fn test_name_equal_to_type_has_no_platform() {
        let i2c = Component::new("i2c", "i2c");
        let entry = component_entry(&i2c).unwrap();
        assert!(!entry.contains_key(&key("platform")));
    }

    #[test]
    fn test_seeded_section_collision_replaced() {
        let mut api = Component::new("api", "api");
        api.add_config_var(
            ConfigVariable::new("port", "", DataType::Int, false).with_default(ConfigValue::Int(6053)),
        );
        let doc = build_document(&[api], "dev", "ESP32", "board");
        let section = doc["api"].as_mapping().unwrap();
        assert_eq!(section.get(&key("port")), Some(&Value::Number(6053.into())));
        assert!(!section.contains_key(&key("password")));
    }

    #[test]
    fn test_render_format() {
        let mut lambda = Component::new("template", "sensor");
        lambda.add_config_var(
            ConfigVariable::new("lambda", "", DataType::String, false)
                .with_default(ConfigValue::from("return {x: 1};")),
        );
        lambda.add_config_var(
            ConfigVariable::new("multiply", "", DataType::Float, false)
                .with_default(ConfigValue::Float(2.0)),
        );
        lambda.add_config_var(
            ConfigVariable::new("name", "", DataType::String, false)
                .with_default(ConfigValue::from("true")),
        );
        let text = render(&build_document(&[lambda], "dev", "ESP32", "board"));

        assert!(text.contains("wifi:\n  ssid: !secret wifi_ssid\n"));
        assert!(text.contains("logger: {}\n"));
        assert!(text.contains("sensor:\n  - platform: template\n    lambda: \"return {x: 1};\"\n"));
        assert!(text.contains("    multiply: 2.0\n"));
        assert!(text.contains("    name: \"true\"\n"));

        let doc = parse_document(&text).unwrap();
        assert_eq!(doc["sensor"][0]["name"], key("true"));
        assert!(matches!(doc["wifi"]["ssid"], Value::Tagged(_)));
    }

    #[test]
    fn test_render_null_and_nested() {
        let doc: Value = serde_yml::from_str("a: null\nb:\n  - [1, 2]\n  - x: y\nc: 'it''s'\n").unwrap();
        let text = render(&doc);
        assert!(text.starts_with("a:\nb:\n  -\n    - 1\n    - 2\n  - x: y\n"));
        assert_eq!(parse_document(&text).unwrap(), doc);
    }

    #[test]
    fn test_validate_document_reports_syntax() {
        assert!(matches!(
            validate_document("a: [1, 2"),
            Err(DocumentError::Syntax(_))
        ));
        validate_document("esphome:\n  name: dev\n").unwrap();
    }

    #[test]
    fn test_deep_merge() {
        let a: Value = serde_yml::from_str("esphome:\n  name: a\nsensor:\n  - id: s1\nlogger: {}\n").unwrap();
        let b: Value = serde_yml::from_str("esphome:\n  board: b\nsensor:\n  - id: s2\nlogger: debug\n").unwrap();
        let merged = deep_merge(a, b);

        assert_eq!(merged["esphome"]["name"], key("a"));
        assert_eq!(merged["esphome"]["board"], key("b"));
        assert_eq!(merged["sensor"].as_sequence().unwrap().len(), 2);
        assert_eq!(merged["logger"], key("debug"));
    }

    #[test]
    fn test_deep_merge_empty_is_identity() {
        let a: Value = serde_yml::from_str("x:\n  y: [1]\n").unwrap();
        let b: Value = serde_yml::from_str("x:\n  z: 2\n").unwrap();
        let once = deep_merge(a, b);
        let twice = deep_merge(once.clone(), Value::Mapping(Mapping::new()));
        assert_eq!(twice, once);
    }

    #[test]
    fn test_merge_documents() {
        let merged = merge_documents(&[
            "sensor:\n  - platform: dht\n",
            "   \n",
            "# only a comment\n",
            "sensor:\n  - platform: bme280\n",
        ])
        .unwrap();
        let doc = parse_document(&merged).unwrap();
        assert_eq!(doc["sensor"].as_sequence().unwrap().len(), 2);

        assert!(merge_documents(&["a: [1"]).is_err());
        assert!(matches!(
            merge_documents(&["- 1\n"]),
            Err(DocumentError::NotAMapping)
        ));
    }

    #[test]
    fn test_component_snippet() {
        let snippet = component_snippet(&dht_with_pin());
        let doc = parse_document(&snippet).unwrap();
        assert_eq!(doc.as_mapping().unwrap().len(), 1);
        assert_eq!(doc["sensor"][0]["pin"], key("GPIO2"));
    }

    #[test]
    fn test_secrets_template_parses() {
        let doc = parse_document(&secrets_template()).unwrap();
        for name in ["wifi_ssid", "wifi_password", "api_password", "ota_password"] {
            assert!(doc[name].as_str().is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_string_quoting() {
        assert_eq!(string_text("GPIO2"), "GPIO2");
        assert_eq!(string_text("nodemcu-32s"), "nodemcu-32s");
        assert_eq!(string_text("0x48"), "\"0x48\"");
        assert_eq!(string_text("42"), "\"42\"");
        assert_eq!(string_text(""), "\"\"");
        assert_eq!(string_text("a # b"), "\"a # b\"");
        assert_eq!(string_text("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
    }
}
