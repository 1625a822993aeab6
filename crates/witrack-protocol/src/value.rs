//! Comparable in-memory field values.
//!
//! Stored field values are opaque JSON. Converting them through a
//! [`FieldType`](crate::schema::FieldType) yields a [`ScalarValue`] (or a list
//! of them) whose equality is defined per variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rich text content together with its markup language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markup {
    pub content: String,
    #[serde(default = "Markup::default_language")]
    pub markup: String,
}

impl Markup {
    pub const PLAIN_TEXT: &'static str = "PlainText";

    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            markup: Self::PLAIN_TEXT.to_owned(),
        }
    }

    fn default_language() -> String {
        Self::PLAIN_TEXT.to_owned()
    }
}

/// A single converted field value.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Instant(DateTime<Utc>),
    Uuid(Uuid),
    Markup(Markup),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            // NaN equals itself; 0.0 and -0.0 are the same value
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Instant(a), Self::Instant(b)) => a == b,
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            (Self::Markup(a), Self::Markup(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn float_equality_treats_nan_and_signed_zero_as_equal() {
        assert_eq!(ScalarValue::Float(f64::NAN), ScalarValue::Float(f64::NAN));
        assert_eq!(ScalarValue::Float(0.0), ScalarValue::Float(-0.0));
        assert_ne!(ScalarValue::Float(0.0), ScalarValue::Float(f64::NAN));
        assert_eq!(ScalarValue::Float(1.5), ScalarValue::Float(1.5));
    }

    #[test]
    fn variants_never_compare_across_kinds() {
        assert_ne!(ScalarValue::Integer(1), ScalarValue::Float(1.0));
        assert_ne!(ScalarValue::Null, ScalarValue::String(String::new()));
    }

    #[test]
    fn serializes_untagged() {
        let values = vec![
            ScalarValue::Null,
            ScalarValue::from("open"),
            ScalarValue::Integer(3),
            ScalarValue::Boolean(true),
            ScalarValue::Markup(Markup::plain("hi")),
        ];
        assert_eq!(
            serde_json::to_value(&values).unwrap(),
            json!([null, "open", 3, true, {"content": "hi", "markup": "PlainText"}])
        );
    }
}
