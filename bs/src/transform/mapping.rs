//! Declarative field mapping
//!
//! A `FieldMapping` renames source fields to destination columns, converts
//! values where the destination format differs, and either drops the source
//! fields it does not mention or folds them into a JSON extension column.
//!
//! ```yaml
//! fields:
//!   - { from: name, to: card_name }
//!   - { from: img_url, to: image_srcset, convert: srcset, widths: [240, 480] }
//!   - { from: cost, to: cost, convert: integer }
//! required: [name, set_code]
//! constants: { source: scraper }
//! extension-column: attributes
//! ```
//!
//! With no `fields`, every source field passes through under its own name.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::Transform;
use crate::error::{ConfigError, TransformError};
use crate::ident;
use crate::record::{MappedRecord, SourceRecord};
use crate::value::Value;

/// Widths used by `srcset` when a rule lists none
pub const DEFAULT_SRCSET_WIDTHS: [u32; 3] = [240, 480, 960];

/// `i64` range as `f64`; the upper bound (2^63) is itself out of range
const I64_MIN: f64 = i64::MIN as f64;
const I64_MAX_EXCLUSIVE: f64 = i64::MAX as f64;

/// Value conversion applied by a field rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Conversion {
    /// Expand one image URL into a multi-resolution descriptor string
    Srcset,
    Integer,
    Real,
    Text,
    Lowercase,
}

/// One `source field -> destination column` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldRule {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<Conversion>,
    /// Widths for `srcset`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widths: Vec<u32>,
}

impl FieldRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            convert: None,
            widths: Vec::new(),
        }
    }

    pub fn convert(mut self, conversion: Conversion) -> Self {
        self.convert = Some(conversion);
        self
    }

    pub fn widths(mut self, widths: impl Into<Vec<u32>>) -> Self {
        self.widths = widths.into();
        self
    }
}

/// Declarative transform built from configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FieldMapping {
    pub fields: Vec<FieldRule>,
    /// Source fields that must be present and non-null
    pub required: Vec<String>,
    /// Fixed values written to every destination record
    pub constants: BTreeMap<String, Value>,
    /// Column receiving unmapped source fields as a JSON object
    pub extension_column: Option<String>,
}

impl FieldMapping {
    /// Check destination names are valid and not produced twice
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        let destinations = self
            .fields
            .iter()
            .map(|rule| rule.to.as_str())
            .chain(self.constants.keys().map(String::as_str))
            .chain(self.extension_column.as_deref());

        for column in destinations {
            ident::check(column)?;
            if !seen.insert(column) {
                return Err(ConfigError::DuplicateColumn(column.to_string()));
            }
        }
        Ok(())
    }

    /// Pass-through mode maps every source field
    fn is_mapped(&self, source_field: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|rule| rule.from == source_field)
    }
}

impl Transform for FieldMapping {
    fn apply(&self, record: &SourceRecord) -> Result<MappedRecord, TransformError> {
        for field in &self.required {
            if record.get(field).is_none_or(Value::is_null) {
                return Err(TransformError::MissingField(field.clone()));
            }
        }

        let mut out = MappedRecord::new();

        if self.fields.is_empty() {
            for (name, value) in record.fields() {
                out.insert(name.clone(), value.clone());
            }
        } else {
            for rule in &self.fields {
                // absent fields map to null so every record carries the same columns
                let value = record.get(&rule.from).cloned().unwrap_or_default();
                let value = match rule.convert {
                    Some(conversion) => conversion.apply(&rule.from, value, &rule.widths)?,
                    None => value,
                };
                out.insert(rule.to.clone(), value);
            }
        }

        for (column, value) in &self.constants {
            out.insert(column.clone(), value.clone());
        }

        if let Some(column) = &self.extension_column {
            let extras: serde_json::Map<String, serde_json::Value> = record
                .fields()
                .iter()
                .filter(|(name, value)| !self.is_mapped(name) && !value.is_null())
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            debug!(column = %column, extra_fields = extras.len(), "FieldMapping::apply: routing unmapped fields");
            out.insert(column.clone(), serde_json::Value::Object(extras).to_string());
        }

        Ok(out)
    }
}

impl Conversion {
    fn name(self) -> &'static str {
        match self {
            Conversion::Srcset => "srcset",
            Conversion::Integer => "integer",
            Conversion::Real => "real",
            Conversion::Text => "text",
            Conversion::Lowercase => "lowercase",
        }
    }

    /// Convert one value; null always stays null
    pub fn apply(self, field: &str, value: Value, widths: &[u32]) -> Result<Value, TransformError> {
        let fail = |value: &Value| TransformError::Conversion {
            field: field.to_string(),
            found: format!("{} {}", value.type_name(), value),
            target: self.name(),
        };

        let converted = match (self, value) {
            (_, Value::Null) => Value::Null,

            (Conversion::Srcset, Value::Text(url)) if url.trim().is_empty() => Value::Null,
            (Conversion::Srcset, Value::Text(url)) => {
                let widths = if widths.is_empty() { &DEFAULT_SRCSET_WIDTHS[..] } else { widths };
                Value::Text(srcset(url.trim(), widths))
            }

            (Conversion::Integer, Value::Integer(i)) => Value::Integer(i),
            (Conversion::Integer, Value::Bool(b)) => Value::Integer(i64::from(b)),
            (Conversion::Integer, Value::Real(r)) if r.fract() == 0.0 && (I64_MIN..I64_MAX_EXCLUSIVE).contains(&r) => {
                Value::Integer(r as i64)
            }
            (Conversion::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Integer(i),
                Err(_) => return Err(fail(&Value::Text(s))),
            },

            (Conversion::Real, Value::Real(r)) => Value::Real(r),
            (Conversion::Real, Value::Integer(i)) => Value::Real(i as f64),
            (Conversion::Real, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(r) => Value::Real(r),
                Err(_) => return Err(fail(&Value::Text(s))),
            },

            (Conversion::Text, Value::Text(s)) => Value::Text(s),
            (Conversion::Text, other) => Value::Text(other.to_string()),

            (Conversion::Lowercase, other) => Value::Text(other.to_string().to_lowercase()),

            (_, other) => return Err(fail(&other)),
        };
        Ok(converted)
    }
}

/// `url?w=240 240w, url?w=480 480w, ...`
fn srcset(url: &str, widths: &[u32]) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    widths
        .iter()
        .map(|w| format!("{url}{sep}w={w} {w}w"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> SourceRecord {
        [
            ("name", Value::from("Monkey D. Luffy")),
            ("set_code", Value::from("OP01")),
            ("img_url", Value::from("https://img.example/op01-001.png")),
            ("cost", Value::from("5")),
            ("rarity", Value::from("L")),
            ("illustrator", Value::Null),
        ]
        .into_iter()
        .collect()
    }

    fn mapping() -> FieldMapping {
        FieldMapping {
            fields: vec![
                FieldRule::new("name", "card_name"),
                FieldRule::new("set_code", "set_code"),
                FieldRule::new("img_url", "image_srcset")
                    .convert(Conversion::Srcset)
                    .widths([240, 480]),
                FieldRule::new("cost", "cost").convert(Conversion::Integer),
            ],
            required: vec!["name".to_string()],
            constants: BTreeMap::from([("source".to_string(), Value::from("scraper"))]),
            extension_column: None,
        }
    }

    #[test]
    fn test_renames_and_converts() {
        let mapped = mapping().apply(&card()).unwrap();

        assert_eq!(mapped.get("card_name"), Some(&Value::from("Monkey D. Luffy")));
        assert_eq!(mapped.get("cost"), Some(&Value::Integer(5)));
        assert_eq!(mapped.get("source"), Some(&Value::from("scraper")));
        assert_eq!(
            mapped.get("image_srcset"),
            Some(&Value::from(
                "https://img.example/op01-001.png?w=240 240w, https://img.example/op01-001.png?w=480 480w"
            ))
        );
        // unmapped fields are dropped by default
        assert!(mapped.get("rarity").is_none());
        assert_eq!(mapped.len(), 5);
    }

    #[test]
    fn test_extension_column_collects_unmapped() {
        let mut mapping = mapping();
        mapping.extension_column = Some("attributes".to_string());

        let mapped = mapping.apply(&card()).unwrap();
        let attrs: serde_json::Value = serde_json::from_str(mapped.get("attributes").unwrap().as_str().unwrap()).unwrap();

        assert_eq!(attrs, serde_json::json!({ "rarity": "L" }));
    }

    #[test]
    fn test_required_field_missing() {
        let record: SourceRecord = [("set_code", "OP01")].into_iter().collect();
        assert_eq!(
            mapping().apply(&record),
            Err(TransformError::MissingField("name".to_string()))
        );
    }

    #[test]
    fn test_absent_optional_field_maps_to_null() {
        let record: SourceRecord = [("name", "Nami")].into_iter().collect();
        let mapped = mapping().apply(&record).unwrap();
        assert_eq!(mapped.get("image_srcset"), Some(&Value::Null));
        assert_eq!(mapped.get("cost"), Some(&Value::Null));
    }

    #[test]
    fn test_bad_integer_is_a_transform_error() {
        let record: SourceRecord = [("name", "Nami"), ("cost", "five")].into_iter().collect();
        let err = mapping().apply(&record).unwrap_err();
        assert!(matches!(err, TransformError::Conversion { target: "integer", .. }));
    }

    #[test]
    fn test_empty_mapping_passes_through() {
        let mapped = FieldMapping::default().apply(&card()).unwrap();
        assert_eq!(mapped.len(), card().len());
        assert_eq!(mapped.get("rarity"), Some(&Value::from("L")));
    }

    #[test]
    fn test_out_of_range_real_is_not_an_integer() {
        let err = Conversion::Integer.apply("cost", Value::Real(1e20), &[]).unwrap_err();
        assert!(matches!(err, TransformError::Conversion { target: "integer", .. }));
        assert!(Conversion::Integer.apply("cost", Value::Real(f64::INFINITY), &[]).is_err());
        assert_eq!(
            Conversion::Integer.apply("cost", Value::Real(-4.0), &[]),
            Ok(Value::Integer(-4))
        );
    }

    #[test]
    fn test_pass_through_leaves_extension_empty() {
        let mapping = FieldMapping {
            extension_column: Some("attributes".to_string()),
            ..Default::default()
        };
        let mapped = mapping.apply(&card()).unwrap();
        assert_eq!(mapped.get("rarity"), Some(&Value::from("L")));
        assert_eq!(mapped.get("attributes"), Some(&Value::from("{}")));
    }

    #[test]
    fn test_srcset_appends_to_existing_query() {
        let v = Conversion::Srcset
            .apply("img", Value::from("https://cdn/x.png?v=2"), &[100])
            .unwrap();
        assert_eq!(v, Value::from("https://cdn/x.png?v=2&w=100 100w"));
    }

    #[test]
    fn test_srcset_default_widths() {
        let v = Conversion::Srcset.apply("img", Value::from("u"), &[]).unwrap();
        assert_eq!(v, Value::from("u?w=240 240w, u?w=480 480w, u?w=960 960w"));
    }

    #[test]
    fn test_validate_rejects_duplicate_destination() {
        let mut mapping = mapping();
        mapping.constants.insert("card_name".to_string(), Value::from("x"));
        assert_eq!(
            mapping.validate(),
            Err(ConfigError::DuplicateColumn("card_name".to_string()))
        );
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = r#"
fields:
  - { from: name, to: card_name }
  - { from: img_url, to: image_srcset, convert: srcset, widths: [240, 480] }
  - { from: price, to: price_usd, convert: real }
required: [name]
constants: { lang: en }
extension-column: attributes
"#;
        let mapping: FieldMapping = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(mapping.fields.len(), 3);
        assert_eq!(mapping.fields[1].convert, Some(Conversion::Srcset));
        assert_eq!(mapping.fields[1].widths, vec![240, 480]);
        assert_eq!(mapping.constants.get("lang"), Some(&Value::from("en")));
        assert_eq!(mapping.extension_column.as_deref(), Some("attributes"));
        assert!(mapping.validate().is_ok());
    }
}
