use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

use super::FieldConverter;
use crate::error::ConversionError;
use crate::value::{FieldValue, LabeledEnum, ValueKind};

/// Maps members of `E` to their display labels and back.
///
/// Text is matched case-insensitively against the declared labels first and the
/// member names second. Empty or unmatched text is "no value", not an error.
pub struct EnumLabelConverter<E> {
    _enum: PhantomData<fn() -> E>,
}

impl<E: LabeledEnum> EnumLabelConverter<E> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _enum: PhantomData,
        }
    }

    /// Resolve `text` to a member of `E`.
    #[must_use]
    pub fn resolve(text: &str) -> Option<E> {
        if text.is_empty() {
            return None;
        }
        let variants = E::variants();
        variants
            .iter()
            .find(|v| v.label().is_some_and(|label| label.eq_ignore_ascii_case(text)))
            .or_else(|| variants.iter().find(|v| v.name().eq_ignore_ascii_case(text)))
            .copied()
    }
}

impl<E: LabeledEnum> Default for EnumLabelConverter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EnumLabelConverter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumLabelConverter")
            .field("enum", &std::any::type_name::<E>())
            .finish()
    }
}

impl<E: LabeledEnum> FieldConverter for EnumLabelConverter<E> {
    fn name(&self) -> &'static str {
        "enum label converter"
    }

    fn convert(
        &self,
        raw: Option<&Value>,
        target: ValueKind,
    ) -> Result<FieldValue, ConversionError> {
        if target != ValueKind::Enum {
            return Err(ConversionError::TypeMismatch {
                converter: self.name(),
                target,
            });
        }

        let text = match raw {
            None | Some(Value::Null) => return Ok(FieldValue::Null),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        Ok(Self::resolve(&text).map_or(FieldValue::Null, |member| {
            FieldValue::Enum(member.to_enum_value())
        }))
    }

    fn convert_back(&self, local: &FieldValue) -> Result<Option<Value>, ConversionError> {
        match local {
            FieldValue::Null => Ok(None),
            FieldValue::Enum(ev) => Ok(Some(Value::String(ev.wire_text().to_string()))),
            FieldValue::String(text) => Ok(Self::resolve(text)
                .map(|member| Value::String(member.to_enum_value().wire_text().to_string()))),
            other => Err(ConversionError::UnsupportedValue {
                converter: self.name(),
                value: format!("{other:?}"),
            }),
        }
    }
}
