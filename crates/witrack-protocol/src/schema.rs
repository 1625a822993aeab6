//! Work item type schema: field kinds, field type descriptors and the
//! conversion from stored JSON to comparable values.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{WitError, WitResult};
use crate::ids::WorkItemTypeId;
use crate::value::{Markup, ScalarValue};

/// The kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    String,
    Integer,
    Float,
    Boolean,
    Instant,
    Url,
    Markup,
    User,
    Iteration,
    Area,
    Label,
    Board,
    Codebase,
    Enum,
    List,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Instant => "instant",
            Self::Url => "url",
            Self::Markup => "markup",
            Self::User => "user",
            Self::Iteration => "iteration",
            Self::Area => "area",
            Self::Label => "label",
            Self::Board => "board",
            Self::Codebase => "codebase",
            Self::Enum => "enum",
            Self::List => "list",
        }
    }

    /// Everything but the container kinds holds a single value.
    pub fn is_simple(&self) -> bool {
        !matches!(self, Self::Enum | Self::List)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-valued field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleType {
    pub kind: Kind,
}

impl SimpleType {
    pub fn new(kind: Kind) -> Self {
        Self { kind }
    }

    pub fn convert_from_storage(&self, value: &Value) -> WitResult<ScalarValue> {
        if !self.kind.is_simple() {
            return Err(WitError::UnknownFieldType(self.kind.to_string()));
        }
        if value.is_null() {
            return Ok(ScalarValue::Null);
        }

        let mismatch = |expected: &str| {
            WitError::bad_parameter(self.kind.as_str(), value).expected(expected.to_owned())
        };

        match self.kind {
            Kind::String | Kind::Url => value
                .as_str()
                .map(|s| ScalarValue::String(s.to_owned()))
                .ok_or_else(|| mismatch("string")),
            Kind::Markup => match value {
                Value::String(content) => Ok(ScalarValue::Markup(Markup::plain(content.clone()))),
                Value::Object(_) => serde_json::from_value::<Markup>(value.clone())
                    .map(ScalarValue::Markup)
                    .map_err(|_| mismatch("markup content object")),
                _ => Err(mismatch("markup content")),
            },
            Kind::Integer => {
                if let Some(i) = value.as_i64() {
                    return Ok(ScalarValue::Integer(i));
                }
                match value.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(ScalarValue::Integer(f as i64))
                    }
                    _ => Err(mismatch("integer")),
                }
            }
            Kind::Float => value
                .as_f64()
                .map(ScalarValue::Float)
                .ok_or_else(|| mismatch("float")),
            Kind::Boolean => value
                .as_bool()
                .map(ScalarValue::Boolean)
                .ok_or_else(|| mismatch("boolean")),
            Kind::Instant => match value {
                Value::String(raw) => DateTime::parse_from_rfc3339(raw)
                    .map(|t| ScalarValue::Instant(t.with_timezone(&Utc)))
                    .map_err(|_| mismatch("RFC 3339 timestamp")),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map(ScalarValue::Instant)
                    .ok_or_else(|| mismatch("unix timestamp in seconds")),
                _ => Err(mismatch("timestamp")),
            },
            Kind::User
            | Kind::Iteration
            | Kind::Area
            | Kind::Label
            | Kind::Board
            | Kind::Codebase => value
                .as_str()
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .map(ScalarValue::Uuid)
                .ok_or_else(|| mismatch("UUID")),
            Kind::Enum | Kind::List => Err(WitError::UnknownFieldType(self.kind.to_string())),
        }
    }
}

/// A simple type restricted to a declared set of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub base: SimpleType,
    pub values: Vec<Value>,
}

impl EnumType {
    pub fn new(base: SimpleType, values: Vec<Value>) -> Self {
        Self { base, values }
    }

    /// Converts through the base type and checks membership. An unset value
    /// (`null`) is accepted.
    pub fn convert_from_storage(&self, value: &Value) -> WitResult<ScalarValue> {
        let converted = self.base.convert_from_storage(value)?;
        if converted.is_null() {
            return Ok(converted);
        }
        for allowed in &self.values {
            if self.base.convert_from_storage(allowed)? == converted {
                return Ok(converted);
            }
        }
        Err(WitError::bad_parameter("value", value).expected(format!(
            "one of {}",
            Value::Array(self.values.clone())
        )))
    }
}

/// An ordered sequence of simple values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListType {
    pub component: SimpleType,
}

impl ListType {
    pub fn new(component: SimpleType) -> Self {
        Self { component }
    }

    /// `null` becomes the empty list.
    pub fn convert_from_storage(&self, value: &Value) -> WitResult<Vec<ScalarValue>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .map(|item| self.component.convert_from_storage(item))
                .collect(),
            other => Err(WitError::bad_parameter("list", other).expected("array")),
        }
    }
}

/// Type descriptor of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Simple(SimpleType),
    Enum(EnumType),
    List(ListType),
}

impl FieldType {
    pub fn simple(kind: Kind) -> Self {
        Self::Simple(SimpleType::new(kind))
    }

    pub fn enumeration(base: Kind, values: Vec<Value>) -> Self {
        Self::Enum(EnumType::new(SimpleType::new(base), values))
    }

    pub fn list(component: Kind) -> Self {
        Self::List(ListType::new(SimpleType::new(component)))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::Simple(simple) => simple.kind,
            Self::Enum(_) => Kind::Enum,
            Self::List(_) => Kind::List,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub label: String,
    #[serde(default)]
    pub required: bool,
    pub field_type: FieldType,
}

impl FieldDefinition {
    pub fn new(label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            label: label.into(),
            required: false,
            field_type,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A work item type: the schema a revision's field map conforms to.
///
/// Fields keep their declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemType {
    pub id: WorkItemTypeId,
    pub name: String,
    #[serde(default)]
    pub fields: IndexMap<String, FieldDefinition>,
}

impl WorkItemType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkItemTypeId::new(),
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn with_id(mut self, id: WorkItemTypeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, definition: FieldDefinition) -> Self {
        self.fields.insert(name.into(), definition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_types_convert_stored_values() {
        let int = SimpleType::new(Kind::Integer);
        assert_eq!(
            int.convert_from_storage(&json!(3)).unwrap(),
            ScalarValue::Integer(3)
        );
        assert_eq!(
            int.convert_from_storage(&json!(3.0)).unwrap(),
            ScalarValue::Integer(3)
        );
        assert!(int.convert_from_storage(&json!(3.5)).is_err());

        let instant = SimpleType::new(Kind::Instant);
        assert_eq!(
            instant.convert_from_storage(&json!(0)).unwrap(),
            instant
                .convert_from_storage(&json!("1970-01-01T00:00:00Z"))
                .unwrap()
        );

        let user = SimpleType::new(Kind::User);
        assert!(user.convert_from_storage(&json!("nope")).is_err());
        assert!(matches!(
            user.convert_from_storage(&json!(Uuid::nil().to_string()))
                .unwrap(),
            ScalarValue::Uuid(_)
        ));
    }

    #[test]
    fn null_converts_to_null_for_simple_kinds() {
        for kind in [Kind::String, Kind::Float, Kind::Boolean, Kind::Markup] {
            assert!(
                SimpleType::new(kind)
                    .convert_from_storage(&Value::Null)
                    .unwrap()
                    .is_null()
            );
        }
    }

    #[test]
    fn markup_accepts_plain_string_and_object() {
        let markup = SimpleType::new(Kind::Markup);
        let plain = markup.convert_from_storage(&json!("hello")).unwrap();
        let object = markup
            .convert_from_storage(&json!({"content": "hello", "markup": "PlainText"}))
            .unwrap();
        assert_eq!(plain, object);
    }

    #[test]
    fn container_kind_on_simple_type_is_unknown() {
        let err = SimpleType::new(Kind::List)
            .convert_from_storage(&json!("x"))
            .unwrap_err();
        assert!(matches!(err, WitError::UnknownFieldType(kind) if kind == "list"));
    }

    #[test]
    fn enum_checks_membership() {
        let state = EnumType::new(
            SimpleType::new(Kind::String),
            vec![json!("open"), json!("closed")],
        );
        assert_eq!(
            state.convert_from_storage(&json!("open")).unwrap(),
            ScalarValue::from("open")
        );
        assert!(state.convert_from_storage(&Value::Null).unwrap().is_null());
        let err = state.convert_from_storage(&json!("resolved")).unwrap_err();
        assert!(err.is_bad_parameter());
    }

    #[test]
    fn list_normalizes_null_to_empty() {
        let labels = ListType::new(SimpleType::new(Kind::String));
        assert!(labels.convert_from_storage(&Value::Null).unwrap().is_empty());
        assert_eq!(
            labels.convert_from_storage(&json!(["a", "b"])).unwrap(),
            vec![ScalarValue::from("a"), ScalarValue::from("b")]
        );
        assert!(labels.convert_from_storage(&json!("a")).is_err());
    }

    #[test]
    fn field_type_serde_shape() {
        let field = FieldType::enumeration(Kind::String, vec![json!("open")]);
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(
            json,
            json!({"type": "enum", "base": {"kind": "string"}, "values": ["open"]})
        );
        let back: FieldType = serde_json::from_value(json).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn work_item_type_keeps_declaration_order() {
        let wit = WorkItemType::new("task")
            .with_field("title", FieldDefinition::new("Title", FieldType::simple(Kind::String)))
            .with_field("labels", FieldDefinition::new("Labels", FieldType::list(Kind::Label)))
            .with_field("effort", FieldDefinition::new("Effort", FieldType::simple(Kind::Float)));
        let names: Vec<_> = wit.fields.keys().map(String::as_str).collect();
        assert_eq!(names, ["title", "labels", "effort"]);
    }
}
