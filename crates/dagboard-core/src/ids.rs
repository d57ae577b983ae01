//! Entity and message identifiers.
//!
//! The server sends entity ids sometimes as JSON numbers and sometimes as
//! strings. [`EntityId`] folds both into one canonical string so `7`, `7.0`
//! and `"7"` all address the same record.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::IdError;

/// Canonical identifier of a mirrored entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Canonicalize a JSON id value.
    ///
    /// Strings are kept verbatim. Integral numbers render without a
    /// fractional part; other numbers use their JSON text.
    pub fn from_value(value: &Value) -> Result<Self, IdError> {
        match value {
            Value::String(s) => Ok(Self(s.clone())),
            Value::Number(n) => Ok(Self(canonical_number(n))),
            Value::Null => Err(IdError::Missing),
            other => Err(IdError::Unsupported(other.to_string())),
        }
    }

    /// Canonicalize the `id` field of a record.
    pub fn from_record(record: &Value) -> Result<Self, IdError> {
        record
            .get("id")
            .map_or(Err(IdError::Missing), Self::from_value)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Integral floats print as integers while they fit `i128`; larger or
/// fractional values keep their JSON text.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i128::MAX as f64 => {
            (f as i128).to_string()
        }
        _ => n.to_string(),
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl std::ops::Deref for EntityId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl From<u64> for EntityId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Identifier of a user-visible message (UUID v4).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn integer_and_string_forms_match() {
        let a = EntityId::from_value(&json!(7)).unwrap();
        let b = EntityId::from_value(&json!("7")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "7");
    }

    #[test]
    fn integral_float_drops_fraction() {
        let id = EntityId::from_value(&json!(42.0)).unwrap();
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn large_integral_float_matches_string_form() {
        let from_float = EntityId::from_value(&json!(1e20)).unwrap();
        let from_string = EntityId::from_value(&json!("100000000000000000000")).unwrap();
        assert_eq!(from_float, from_string);
        let past_i64 = EntityId::from_value(&json!(9_223_372_036_854_775_808.0)).unwrap();
        assert_eq!(past_i64.as_str(), "9223372036854775808");
    }

    #[test]
    fn fractional_float_keeps_text() {
        let id = EntityId::from_value(&json!(4.5)).unwrap();
        assert_eq!(id.as_str(), "4.5");
    }

    #[test]
    fn negative_integer() {
        let id = EntityId::from_value(&json!(-3)).unwrap();
        assert_eq!(id.as_str(), "-3");
    }

    #[test]
    fn strings_are_verbatim() {
        let id = EntityId::from_value(&json!("input_abc")).unwrap();
        assert_eq!(id.as_str(), "input_abc");
    }

    #[test]
    fn null_is_missing() {
        assert_eq!(EntityId::from_value(&Value::Null), Err(IdError::Missing));
    }

    #[test]
    fn object_is_unsupported() {
        let err = EntityId::from_value(&json!({"x": 1})).unwrap_err();
        assert!(matches!(err, IdError::Unsupported(_)));
    }

    #[test]
    fn from_record_reads_id_field() {
        let id = EntityId::from_record(&json!({"id": 12, "name": "delay"})).unwrap();
        assert_eq!(id.as_str(), "12");
        assert_eq!(EntityId::from_record(&json!({"name": "x"})), Err(IdError::Missing));
    }

    #[test]
    fn deserializes_from_number_and_string() {
        let a: EntityId = serde_json::from_value(json!(9)).unwrap();
        let b: EntityId = serde_json::from_value(json!("9")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn serializes_as_string() {
        let id = EntityId::from(5_i64);
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("5"));
    }

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    proptest! {
        #[test]
        fn numeric_and_string_forms_canonicalize_together(n in any::<i64>()) {
            let from_number = EntityId::from_value(&json!(n)).unwrap();
            let from_string = EntityId::from_value(&json!(n.to_string())).unwrap();
            prop_assert_eq!(from_number, from_string);
        }

        #[test]
        fn canonicalization_is_idempotent(s in "[a-z0-9_]{1,12}") {
            let once = EntityId::from_value(&json!(s)).unwrap();
            let twice = EntityId::from_value(&json!(once.as_str())).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
