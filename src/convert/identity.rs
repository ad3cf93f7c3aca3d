use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::{FieldComparer, FieldConverter};
use crate::error::ConversionError;
use crate::value::{FieldValue, ValueKind};

/// Matches the legacy `"Display Name <unique@name>"` identity form.
fn legacy_identity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(.*?)\s*<([^<>]+)>\s*$").expect("Failed to compile identity regex")
    })
}

/// Renders identity references as their unique name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityConverter;

impl IdentityConverter {
    /// Unique name of a raw identity value, if it carries one.
    #[must_use]
    pub fn unique_name(raw: &Value) -> Option<String> {
        match raw {
            Value::Object(map) => map
                .get("uniqueName")
                .or_else(|| map.get("displayName"))
                .and_then(Value::as_str)
                .map(str::to_string),
            Value::String(text) => Some(
                legacy_identity_regex()
                    .captures(text)
                    .and_then(|caps| caps.get(2))
                    .map_or_else(|| text.clone(), |m| m.as_str().to_string()),
            ),
            _ => None,
        }
    }
}

impl FieldConverter for IdentityConverter {
    fn name(&self) -> &'static str {
        "identity converter"
    }

    fn convert(
        &self,
        raw: Option<&Value>,
        target: ValueKind,
    ) -> Result<FieldValue, ConversionError> {
        if target != ValueKind::String {
            return Err(ConversionError::TypeMismatch {
                converter: self.name(),
                target,
            });
        }
        match raw {
            None | Some(Value::Null) => Ok(FieldValue::Null),
            Some(value) => Self::unique_name(value)
                .map(FieldValue::String)
                .ok_or_else(|| ConversionError::UnsupportedValue {
                    converter: self.name(),
                    value: value.to_string(),
                }),
        }
    }

    fn convert_back(&self, local: &FieldValue) -> Result<Option<Value>, ConversionError> {
        match local {
            FieldValue::Null => Ok(None),
            FieldValue::String(text) if text.is_empty() => Ok(None),
            FieldValue::String(text) => Ok(Some(Value::String(text.clone()))),
            other => Err(ConversionError::UnsupportedValue {
                converter: self.name(),
                value: format!("{other:?}"),
            }),
        }
    }

    fn comparer(&self) -> Option<&dyn FieldComparer> {
        Some(self)
    }
}

impl FieldComparer for IdentityConverter {
    fn compare(&self, initial: Option<&Value>, current: &FieldValue) -> bool {
        let current = match current {
            FieldValue::Null => "",
            FieldValue::String(text) => text.as_str(),
            _ => return false,
        };
        match initial.filter(|v| !v.is_null()) {
            None => current.is_empty(),
            Some(raw) => Self::unique_name(raw)
                .is_some_and(|unique| unique.to_lowercase() == current.to_lowercase()),
        }
    }
}
