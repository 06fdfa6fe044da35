//! Declarative field copying between record shapes.
//!
//! A mapping table lists `source path -> destination field(s)` pairs with an
//! optional [`Transform`]. Source paths may be dotted (`paging.next`) and are
//! resolved one attribute at a time; a missing attribute is an error naming
//! the attribute and what was available instead, never a silent `null`.
//!
//! The mapper knows nothing about courses or categories. Records are read
//! through [`Attributes`] and written through [`FieldSink`], both of which are
//! implemented for plain `serde_json` values.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("could not find {attribute} in {available}")]
    MissingAttribute { attribute: String, available: String },

    #[error("{attribute} is null")]
    NullAttribute { attribute: String },

    #[error("cannot apply {transform} transform to {field}: {reason}")]
    Transform {
        field: String,
        transform: &'static str,
        reason: String,
    },

    #[error("mapped record has the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Value conversions applied between reading and writing a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Parse a date string into a Unix timestamp.
    Date,
    /// Join a list into a `", "` separated string.
    CommaImplode,
    /// Keep only the first element of a list.
    ExtractFirst,
}

impl Transform {
    pub fn name(self) -> &'static str {
        match self {
            Transform::Date => "date",
            Transform::CommaImplode => "comma-implode",
            Transform::ExtractFirst => "extract-first",
        }
    }

    pub fn apply(self, field: &str, value: &Value) -> Result<Value, MappingError> {
        let fail = |reason: String| MappingError::Transform {
            field: field.to_string(),
            transform: self.name(),
            reason,
        };

        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Transform::Date, Value::Number(_)) => Ok(value.clone()),
            (Transform::Date, Value::String(s)) => parse_timestamp(s)
                .map(Value::from)
                .ok_or_else(|| fail(format!("unrecognised date {s:?}"))),
            (Transform::CommaImplode, Value::Array(items)) => Ok(Value::String(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
            (Transform::CommaImplode, Value::String(_)) => Ok(value.clone()),
            (Transform::ExtractFirst, Value::Array(items)) => {
                Ok(items.first().cloned().unwrap_or(Value::Null))
            }
            (Transform::ExtractFirst, other) => Ok(other.clone()),
            (_, other) => Err(fail(format!("unsupported value {other}"))),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
}

/// How strictly a mapping treats an absent source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The path must resolve; `null` is copied through.
    Present,
    /// The path must resolve to a non-null value.
    Required,
    /// A missing path leaves the destination fields unset.
    Optional,
}

/// One row of a mapping table.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub source: &'static str,
    pub targets: &'static [&'static str],
    pub transform: Option<Transform>,
    pub presence: Presence,
}

impl FieldMapping {
    pub const fn new(source: &'static str, targets: &'static [&'static str]) -> Self {
        Self {
            source,
            targets,
            transform: None,
            presence: Presence::Present,
        }
    }

    pub const fn with(self, transform: Transform) -> Self {
        Self {
            transform: Some(transform),
            ..self
        }
    }

    pub const fn required(self) -> Self {
        Self {
            presence: Presence::Required,
            ..self
        }
    }

    pub const fn optional(self) -> Self {
        Self {
            presence: Presence::Optional,
            ..self
        }
    }
}

/// Read access to named attributes of a record.
pub trait Attributes {
    fn attribute(&self, name: &str) -> Option<&Value>;
    fn attribute_names(&self) -> Vec<String>;
}

impl Attributes for Map<String, Value> {
    fn attribute(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }

    fn attribute_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

impl Attributes for Value {
    fn attribute(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(name),
            _ => None,
        }
    }

    fn attribute_names(&self) -> Vec<String> {
        match self {
            Value::Object(map) => map.attribute_names(),
            _ => Vec::new(),
        }
    }
}

/// Write access to named fields of a record.
pub trait FieldSink {
    fn set_field(&mut self, name: &str, value: Value);
}

impl FieldSink for Map<String, Value> {
    fn set_field(&mut self, name: &str, value: Value) {
        self.insert(name.to_string(), value);
    }
}

fn missing(attribute: &str, available: Vec<String>) -> MappingError {
    MappingError::MissingAttribute {
        attribute: attribute.to_string(),
        available: available.join(", "),
    }
}

/// Walk a dotted path through `source`, failing on the first missing step.
pub fn resolve<'a, S>(source: &'a S, path: &str) -> Result<&'a Value, MappingError>
where
    S: Attributes + ?Sized,
{
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let mut current = source
        .attribute(head)
        .ok_or_else(|| missing(head, source.attribute_names()))?;
    if let Some(rest) = rest {
        for segment in rest.split('.') {
            current = current
                .attribute(segment)
                .ok_or_else(|| missing(segment, current.attribute_names()))?;
        }
    }
    Ok(current)
}

/// Copy every mapped field from `source` into `target`.
pub fn apply_mappings<S, T>(
    target: &mut T,
    source: &S,
    mappings: &[FieldMapping],
) -> Result<(), MappingError>
where
    S: Attributes + ?Sized,
    T: FieldSink + ?Sized,
{
    for mapping in mappings {
        let raw = match (resolve(source, mapping.source), mapping.presence) {
            (Ok(Value::Null), Presence::Required) => {
                return Err(MappingError::NullAttribute {
                    attribute: mapping.source.to_string(),
                });
            }
            (Ok(raw), _) => raw,
            (Err(MappingError::MissingAttribute { .. }), Presence::Optional) => continue,
            (Err(e), _) => return Err(e),
        };
        let value = match mapping.transform {
            Some(transform) => transform.apply(mapping.source, raw)?,
            None => raw.clone(),
        };
        for target_field in mapping.targets {
            target.set_field(target_field, value.clone());
        }
    }
    Ok(())
}

/// Deserialize a mapped field set into a typed record.
pub fn into_record<T: DeserializeOwned>(fields: Map<String, Value>) -> Result<T, MappingError> {
    Ok(serde_json::from_value(Value::Object(fields))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    const MAPPINGS: &[FieldMapping] = &[
        FieldMapping::new("name", &["title"]),
        FieldMapping::new("label", &["shortname", "fullname"]),
        FieldMapping::new("owner.address.city", &["city"]),
        FieldMapping::new("tags", &["tags"]).with(Transform::CommaImplode),
        FieldMapping::new("langs", &["lang"]).with(Transform::ExtractFirst),
        FieldMapping::new("published", &["published"]).with(Transform::Date),
    ];

    fn sample() -> Value {
        json!({
            "name": "Fire Safety",
            "label": "FS-101",
            "owner": {"address": {"city": "Seattle"}},
            "tags": ["a", "b", "c"],
            "langs": ["en", "fr"],
            "published": "2023-01-15T10:00:00Z"
        })
    }

    #[test]
    fn maps_plain_nested_and_multi_target_fields() {
        let mut target = Map::new();
        apply_mappings(&mut target, &sample(), MAPPINGS).unwrap();

        assert_eq!(target["title"], "Fire Safety");
        assert_eq!(target["shortname"], "FS-101");
        assert_eq!(target["fullname"], "FS-101");
        assert_eq!(target["city"], "Seattle");
        assert_eq!(target["tags"], "a, b, c");
        assert_eq!(target["lang"], "en");
        assert_eq!(target["published"], 1_673_776_800);
    }

    #[test]
    fn missing_attribute_names_what_was_available() {
        let source = json!({"name": "x", "label": "y"});
        let err = apply_mappings(&mut Map::new(), &source, MAPPINGS).unwrap_err();
        match err {
            MappingError::MissingAttribute {
                attribute,
                available,
            } => {
                assert_eq!(attribute, "owner");
                assert_eq!(available, "label, name");
            }
            other => panic!("expected MissingAttribute, got {other:?}"),
        }
    }

    #[test]
    fn missing_nested_attribute_fails_closed() {
        let source = json!({"owner": {"address": {"street": "Pike"}}});
        let err = resolve(&source, "owner.address.city").unwrap_err();
        assert_eq!(err.to_string(), "could not find city in street");
    }

    #[test]
    fn presence_rules_per_mapping() {
        const PRESENCE: &[FieldMapping] = &[
            FieldMapping::new("id", &["id"]).required(),
            FieldMapping::new("summary", &["summary"]).optional(),
            FieldMapping::new("owner.name", &["owner"]).optional(),
            FieldMapping::new("note", &["note"]),
        ];

        let mut target = Map::new();
        apply_mappings(&mut target, &json!({"id": 7, "note": null}), PRESENCE).unwrap();
        assert_eq!(target["id"], 7);
        assert_eq!(target["note"], Value::Null);
        assert!(!target.contains_key("summary"));
        assert!(!target.contains_key("owner"));

        let err = apply_mappings(&mut Map::new(), &json!({"id": null, "note": 1}), PRESENCE)
            .unwrap_err();
        assert_eq!(err.to_string(), "id is null");

        let err = apply_mappings(&mut Map::new(), &json!({"id": 1}), PRESENCE).unwrap_err();
        assert_eq!(err.to_string(), "could not find note in id");
    }

    #[test]
    fn traversal_through_a_scalar_is_missing() {
        let source = json!({"owner": "nobody"});
        assert!(resolve(&source, "owner.address").is_err());
    }

    #[test]
    fn transforms_pass_null_through() {
        for transform in [
            Transform::Date,
            Transform::CommaImplode,
            Transform::ExtractFirst,
        ] {
            assert_eq!(transform.apply("f", &Value::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn extract_first_of_empty_list_is_null() {
        assert_eq!(
            Transform::ExtractFirst.apply("langs", &json!([])).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn date_transform_accepts_plain_dates_and_rejects_garbage() {
        assert_eq!(
            Transform::Date.apply("d", &json!("1970-01-02")).unwrap(),
            json!(86_400)
        );
        assert_eq!(
            Transform::Date.apply("d", &json!("1970-01-01 00:01:00")).unwrap(),
            json!(60)
        );
        let err = Transform::Date.apply("d", &json!("yesterday")).unwrap_err();
        assert!(matches!(err, MappingError::Transform { .. }));
    }

    #[test]
    fn into_record_builds_typed_struct() {
        #[derive(Debug, Deserialize)]
        struct Target {
            title: String,
            #[serde(default)]
            count: u32,
        }

        let mut fields = Map::new();
        fields.set_field("title", json!("Hello"));
        let record: Target = into_record(fields).unwrap();
        assert_eq!(record.title, "Hello");
        assert_eq!(record.count, 0);

        let err = into_record::<Target>(Map::new()).unwrap_err();
        assert!(matches!(err, MappingError::Shape(_)));
    }
}
