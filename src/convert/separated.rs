use serde_json::Value;

use super::{FieldComparer, FieldConverter};
use crate::error::ConversionError;
use crate::value::{FieldValue, ValueKind};

/// Converts a delimited string into a list of tokens and back.
///
/// Tokens are trimmed and empty tokens dropped when splitting; joining uses the
/// full separator (including its trailing space) and keeps tokens as they are.
/// Comparison ignores token order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeparatedValueConverter {
    separator: &'static str,
}

impl SeparatedValueConverter {
    #[must_use]
    pub const fn new(separator: &'static str) -> Self {
        Self { separator }
    }

    /// `", "`-separated values.
    #[must_use]
    pub const fn comma() -> Self {
        Self::new(", ")
    }

    /// `"; "`-separated values, as used by `System.Tags`.
    #[must_use]
    pub const fn semicolon() -> Self {
        Self::new("; ")
    }

    /// Split `text` into trimmed, non-empty tokens.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        let separator = match self.separator.trim() {
            "" => self.separator,
            trimmed => trimmed,
        };
        text.split(separator)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn raw_tokens(&self, raw: Option<&Value>) -> Result<Vec<String>, ConversionError> {
        match raw {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(text)) => Ok(self.split(text)),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(|s| s.trim().to_string()))
                .collect::<Option<Vec<_>>>()
                .map(|tokens| tokens.into_iter().filter(|t| !t.is_empty()).collect())
                .ok_or_else(|| self.unsupported(raw)),
            Some(_) => Err(self.unsupported(raw)),
        }
    }

    fn unsupported(&self, raw: Option<&Value>) -> ConversionError {
        ConversionError::UnsupportedValue {
            converter: self.name(),
            value: raw.map_or_else(|| "null".to_string(), Value::to_string),
        }
    }
}

impl FieldConverter for SeparatedValueConverter {
    fn name(&self) -> &'static str {
        "separated-value converter"
    }

    fn convert(
        &self,
        raw: Option<&Value>,
        target: ValueKind,
    ) -> Result<FieldValue, ConversionError> {
        if target != ValueKind::StringList {
            return Err(ConversionError::TypeMismatch {
                converter: self.name(),
                target,
            });
        }
        Ok(FieldValue::List(self.raw_tokens(raw)?))
    }

    fn convert_back(&self, local: &FieldValue) -> Result<Option<Value>, ConversionError> {
        match local {
            FieldValue::Null => Ok(Some(Value::String(String::new()))),
            FieldValue::List(items) => {
                let joined = items.join(self.separator);
                if joined.trim().is_empty() {
                    Ok(Some(Value::String(String::new())))
                } else {
                    Ok(Some(Value::String(joined)))
                }
            }
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

impl FieldComparer for SeparatedValueConverter {
    fn compare(&self, initial: Option<&Value>, current: &FieldValue) -> bool {
        let Ok(mut before) = self.raw_tokens(initial) else {
            return false;
        };
        let mut after: Vec<String> = match current {
            FieldValue::Null => Vec::new(),
            FieldValue::List(items) => items
                .iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            FieldValue::String(text) => self.split(text),
            _ => return false,
        };

        before.sort();
        after.sort();
        before == after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list(items: &[&str]) -> FieldValue {
        FieldValue::List(items.iter().map(|s| s.to_string()).collect())
    }

    /// # Comma Separated Converts To List
    ///
    /// Verifies a delimited string is split into trimmed tokens.
    ///
    /// ## Test Scenario
    /// - Convert "One,Two,Three" and " One ;; Two " with the matching converters
    ///
    /// ## Expected Outcome
    /// - Tokens are trimmed and empty tokens are dropped
    #[test]
    fn test_converts_to_list() {
        let comma = SeparatedValueConverter::comma();
        assert_eq!(
            comma
                .convert(Some(&json!("One,Two,Three")), ValueKind::StringList)
                .unwrap(),
            list(&["One", "Two", "Three"])
        );

        let semicolon = SeparatedValueConverter::semicolon();
        assert_eq!(
            semicolon
                .convert(Some(&json!(" One ;; Two ")), ValueKind::StringList)
                .unwrap(),
            list(&["One", "Two"])
        );
    }

    /// # Converter Rejects Non-List Targets
    ///
    /// Verifies asking for a scalar target is a type mismatch.
    ///
    /// ## Test Scenario
    /// - Convert a delimited string into a string target
    ///
    /// ## Expected Outcome
    /// - A TypeMismatch error is returned
    #[test]
    fn test_rejects_non_list_target() {
        let comma = SeparatedValueConverter::comma();
        assert!(matches!(
            comma.convert(Some(&json!("One,Two")), ValueKind::String),
            Err(ConversionError::TypeMismatch { .. })
        ));
    }

    /// # Null Handling
    ///
    /// Verifies absent values become empty lists and empty lists become "".
    ///
    /// ## Test Scenario
    /// - Convert an absent value forward
    /// - Convert null and an empty list back
    /// - Convert a plain string back
    ///
    /// ## Expected Outcome
    /// - Forward gives an empty list, back gives "", a plain string is rejected
    #[test]
    fn test_null_handling() {
        let comma = SeparatedValueConverter::comma();
        assert_eq!(
            comma.convert(None, ValueKind::StringList).unwrap(),
            list(&[])
        );
        assert_eq!(
            comma.convert_back(&FieldValue::Null).unwrap(),
            Some(json!(""))
        );
        assert_eq!(comma.convert_back(&list(&[])).unwrap(), Some(json!("")));
        assert!(comma.convert_back(&FieldValue::from("")).is_err());
    }

    /// # Convert Back Preserves Token Spacing
    ///
    /// Verifies tokens are joined with the separator and kept as they are.
    ///
    /// ## Test Scenario
    /// - Join ["One", "Two", "Three"] and ["One ", "Two", "Three"]
    ///
    /// ## Expected Outcome
    /// - "One, Two, Three" and "One , Two, Three"
    #[test]
    fn test_convert_back_preserves_spaces() {
        let comma = SeparatedValueConverter::comma();
        assert_eq!(
            comma
                .convert_back(&list(&["One", "Two", "Three"]))
                .unwrap(),
            Some(json!("One, Two, Three"))
        );
        assert_eq!(
            comma
                .convert_back(&list(&["One ", "Two", "Three"]))
                .unwrap(),
            Some(json!("One , Two, Three"))
        );
    }

    /// # Comparison Ignores Order
    ///
    /// Verifies the comparer treats the values as an unordered multiset.
    ///
    /// ## Test Scenario
    /// - Compare several snapshot strings with ["1", "2", "3"]
    /// - Compare a missing snapshot with an empty list
    ///
    /// ## Expected Outcome
    /// - Reordered or respaced values are equal; different sets are not
    /// - Missing equals empty
    #[test]
    fn test_comparison_ignores_order() {
        let comma = SeparatedValueConverter::comma();
        let current = list(&["1", "2", "3"]);
        assert!(comma.compare(Some(&json!("1,2,3")), &current));
        assert!(comma.compare(Some(&json!("1, 2,  3")), &current));
        assert!(comma.compare(Some(&json!("2, 1, 3")), &current));
        assert!(comma.compare(Some(&json!("1,2,3")), &list(&["2", "1", "3"])));
        assert!(!comma.compare(Some(&json!("1,3,4")), &current));
        assert!(!comma.compare(Some(&json!("1,2,3")), &list(&["1", "2", "3", "4"])));

        assert!(comma.compare(None, &list(&[])));
        assert!(comma.compare(Some(&json!(null)), &FieldValue::Null));
        assert!(!comma.compare(None, &list(&["a"])));
        assert!(comma.comparer().is_some());
    }
}
