//! Local value model for bound work item fields.
//!
//! Remote fields travel as JSON. Locally every bound property is read and written
//! through [`FieldValue`], a small tagged value that the converters, the change
//! tracker and the in-memory query evaluator all share.
//!
//! ## Overview
//!
//! - [`ValueKind`]: the declared type of a bound property
//! - [`FieldValue`]: a dynamically typed local value
//! - [`FieldType`]: conversion between a Rust property type and [`FieldValue`]
//! - [`LabeledEnum`]: enumerations whose members carry a remote display label
//! - [`wire_equivalent`]: the default equality used when diffing against a snapshot

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::error::ConversionError;

/// Declared type of a bound property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Integer,
    Double,
    Boolean,
    DateTime,
    StringList,
    Enum,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::DateTime => "date-time",
            Self::StringList => "string list",
            Self::Enum => "enumeration",
        };
        f.write_str(name)
    }
}

/// A member of a [`LabeledEnum`], erased to its name, label and ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub name: &'static str,
    pub label: Option<&'static str>,
    pub ordinal: i64,
}

impl EnumValue {
    /// Text sent to the server: the declared label, or the member name.
    #[must_use]
    pub fn wire_text(&self) -> &'static str {
        self.label.unwrap_or(self.name)
    }
}

/// An enumeration whose members map to remote display labels.
///
/// ```rust
/// use witkit::value::LabeledEnum;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Risk { High, Low }
///
/// impl LabeledEnum for Risk {
///     fn variants() -> &'static [Self] { &[Risk::High, Risk::Low] }
///     fn name(&self) -> &'static str { match self { Risk::High => "High", Risk::Low => "Low" } }
///     fn label(&self) -> Option<&'static str> {
///         match self { Risk::High => Some("1 - High"), Risk::Low => Some("3 - Low") }
///     }
///     fn ordinal(&self) -> i64 { *self as i64 }
/// }
///
/// assert_eq!(Risk::from_name("Low"), Some(Risk::Low));
/// ```
pub trait LabeledEnum: Copy + Send + Sync + 'static {
    /// All members in declaration order.
    fn variants() -> &'static [Self];

    /// The member name.
    fn name(&self) -> &'static str;

    /// The declared display label, if any.
    fn label(&self) -> Option<&'static str> {
        None
    }

    /// Numeric value used for ordering comparisons.
    fn ordinal(&self) -> i64;

    fn to_enum_value(&self) -> EnumValue {
        EnumValue {
            name: self.name(),
            label: self.label(),
            ordinal: self.ordinal(),
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::variants().iter().copied().find(|v| v.name() == name)
    }
}

/// A dynamically typed local field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    List(Vec<String>),
    Enum(EnumValue),
}

impl FieldValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The kind of a non-null value.
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueKind::Boolean),
            Self::Integer(_) => Some(ValueKind::Integer),
            Self::Double(_) => Some(ValueKind::Double),
            Self::String(_) => Some(ValueKind::String),
            Self::DateTime(_) => Some(ValueKind::DateTime),
            Self::List(_) => Some(ValueKind::StringList),
            Self::Enum(_) => Some(ValueKind::Enum),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Build a value from a raw JSON field with no converter involved.
    pub fn from_wire(raw: &Value) -> Result<Self, ConversionError> {
        match raw {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Integer(i)),
                None => n.as_f64().map(Self::Double).ok_or_else(|| {
                    ConversionError::UnsupportedValue {
                        converter: "default",
                        value: raw.to_string(),
                    }
                }),
            },
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self::List)
                .ok_or_else(|| ConversionError::UnsupportedValue {
                    converter: "default",
                    value: raw.to_string(),
                }),
            Value::Object(_) => Err(ConversionError::UnsupportedValue {
                converter: "default",
                value: raw.to_string(),
            }),
        }
    }

    /// The natural JSON form of this value. `Null` has no wire form.
    #[must_use]
    pub fn to_wire(&self) -> Option<Value> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Integer(i) => Some(Value::from(*i)),
            Self::Double(d) => serde_json::Number::from_f64(*d).map(Value::Number),
            Self::String(s) => Some(Value::String(s.clone())),
            Self::DateTime(dt) => Some(Value::String(format_date(dt))),
            Self::List(items) => Some(Value::Array(
                items.iter().cloned().map(Value::String).collect(),
            )),
            Self::Enum(ev) => Some(Value::String(ev.wire_text().to_string())),
        }
    }

    /// Change the value into `kind`, the way a declared property type expects it.
    pub fn coerce(self, kind: ValueKind) -> Result<Self, ConversionError> {
        if self.is_null() || self.kind() == Some(kind) {
            return Ok(self);
        }

        let coerced = match (kind, &self) {
            (ValueKind::String, Self::Bool(_))
            | (ValueKind::String, Self::Integer(_))
            | (ValueKind::String, Self::Double(_))
            | (ValueKind::String, Self::DateTime(_)) => Some(Self::String(self.to_string())),
            (ValueKind::String, Self::Enum(ev)) => Some(Self::String(ev.wire_text().to_string())),
            (ValueKind::Integer, Self::Double(d)) if d.fract() == 0.0 => {
                Some(Self::Integer(*d as i64))
            }
            (ValueKind::Integer, Self::String(s)) => s.trim().parse().ok().map(Self::Integer),
            (ValueKind::Integer, Self::Enum(ev)) => Some(Self::Integer(ev.ordinal)),
            (ValueKind::Double, Self::Integer(i)) => Some(Self::Double(*i as f64)),
            (ValueKind::Double, Self::String(s)) => s.trim().parse().ok().map(Self::Double),
            (ValueKind::Boolean, Self::String(s)) => parse_bool(s).map(Self::Bool),
            (ValueKind::Boolean, Self::Integer(i)) => match i {
                0 => Some(Self::Bool(false)),
                1 => Some(Self::Bool(true)),
                _ => None,
            },
            (ValueKind::DateTime, Self::String(s)) => parse_date(s).map(Self::DateTime),
            // Enumerations resolve member names in `FieldType::from_field_value`.
            (ValueKind::Enum, Self::String(_)) => Some(self.clone()),
            _ => None,
        };

        coerced.ok_or_else(|| ConversionError::Coercion {
            value: format!("{self:?}"),
            target: kind,
        })
    }

    /// Compare two values the way the in-memory query evaluator does.
    ///
    /// Returns `None` when the values are not comparable (including any comparison
    /// against `Null` other than `Null == Null`).
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Double(b)) => (*a as f64).partial_cmp(b),
            (Self::Double(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(cmp_ignore_case(a, b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Enum(a), Self::Enum(b)) => Some(a.ordinal.cmp(&b.ordinal)),
            (Self::Enum(e), Self::String(s)) | (Self::String(s), Self::Enum(e))
                if eq_ignore_case(e.name, s) || e.label.is_some_and(|label| eq_ignore_case(label, s)) =>
            {
                Some(Ordering::Equal)
            }
            (Self::List(a), Self::List(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }
}

/// Order strings the way WIQL does, ignoring case.
#[must_use]
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

#[must_use]
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    cmp_ignore_case(a, b) == Ordering::Equal
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::DateTime(dt) => f.write_str(&format_date(dt)),
            Self::List(items) => f.write_str(&items.join(", ")),
            Self::Enum(ev) => f.write_str(ev.name),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<EnumValue> for FieldValue {
    fn from(value: EnumValue) -> Self {
        Self::Enum(value)
    }
}

/// Conversion between a Rust property type and [`FieldValue`].
pub trait FieldType: Sized + Send + Sync + 'static {
    const KIND: ValueKind;

    fn to_field_value(&self) -> FieldValue;

    fn from_field_value(value: FieldValue) -> Result<Self, ConversionError>;
}

fn mismatch(value: FieldValue, target: ValueKind) -> ConversionError {
    ConversionError::Coercion {
        value: format!("{value:?}"),
        target,
    }
}

impl FieldType for String {
    const KIND: ValueKind = ValueKind::String;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::String(self.clone())
    }

    fn from_field_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value.coerce(Self::KIND)? {
            FieldValue::Null => Ok(String::new()),
            FieldValue::String(s) => Ok(s),
            other => Err(mismatch(other, Self::KIND)),
        }
    }
}

impl FieldType for Option<String> {
    const KIND: ValueKind = ValueKind::String;

    fn to_field_value(&self) -> FieldValue {
        self.clone().map_or(FieldValue::Null, FieldValue::String)
    }

    fn from_field_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value.coerce(Self::KIND)? {
            FieldValue::Null => Ok(None),
            FieldValue::String(s) => Ok(Some(s)),
            other => Err(mismatch(other, Self::KIND)),
        }
    }
}

impl FieldType for Option<i64> {
    const KIND: ValueKind = ValueKind::Integer;

    fn to_field_value(&self) -> FieldValue {
        self.map_or(FieldValue::Null, FieldValue::Integer)
    }

    fn from_field_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value.coerce(Self::KIND)? {
            FieldValue::Null => Ok(None),
            FieldValue::Integer(i) => Ok(Some(i)),
            other => Err(mismatch(other, Self::KIND)),
        }
    }
}

impl FieldType for Option<f64> {
    const KIND: ValueKind = ValueKind::Double;

    fn to_field_value(&self) -> FieldValue {
        self.map_or(FieldValue::Null, FieldValue::Double)
    }

    fn from_field_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value.coerce(Self::KIND)? {
            FieldValue::Null => Ok(None),
            FieldValue::Double(d) => Ok(Some(d)),
            other => Err(mismatch(other, Self::KIND)),
        }
    }
}

impl FieldType for Option<bool> {
    const KIND: ValueKind = ValueKind::Boolean;

    fn to_field_value(&self) -> FieldValue {
        self.map_or(FieldValue::Null, FieldValue::Bool)
    }

    fn from_field_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value.coerce(Self::KIND)? {
            FieldValue::Null => Ok(None),
            FieldValue::Bool(b) => Ok(Some(b)),
            other => Err(mismatch(other, Self::KIND)),
        }
    }
}

impl FieldType for Option<DateTime<Utc>> {
    const KIND: ValueKind = ValueKind::DateTime;

    fn to_field_value(&self) -> FieldValue {
        self.map_or(FieldValue::Null, FieldValue::DateTime)
    }

    fn from_field_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value.coerce(Self::KIND)? {
            FieldValue::Null => Ok(None),
            FieldValue::DateTime(dt) => Ok(Some(dt)),
            other => Err(mismatch(other, Self::KIND)),
        }
    }
}

impl FieldType for Vec<String> {
    const KIND: ValueKind = ValueKind::StringList;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::List(self.clone())
    }

    fn from_field_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value.coerce(Self::KIND)? {
            FieldValue::Null => Ok(Vec::new()),
            FieldValue::List(items) => Ok(items),
            other => Err(mismatch(other, Self::KIND)),
        }
    }
}

impl<E: LabeledEnum> FieldType for Option<E> {
    const KIND: ValueKind = ValueKind::Enum;

    fn to_field_value(&self) -> FieldValue {
        self.map_or(FieldValue::Null, |e| FieldValue::Enum(e.to_enum_value()))
    }

    fn from_field_value(value: FieldValue) -> Result<Self, ConversionError> {
        let name = match &value {
            FieldValue::Null => return Ok(None),
            FieldValue::Enum(ev) => ev.name,
            FieldValue::String(s) => s.as_str(),
            _ => return Err(mismatch(value, Self::KIND)),
        };
        match E::from_name(name) {
            Some(member) => Ok(Some(member)),
            None => Err(mismatch(value, Self::KIND)),
        }
    }
}

/// Format a date the way it is sent to the server.
#[must_use]
pub fn format_date(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an RFC 3339 date, or a naive ISO date-time taken as UTC.
#[must_use]
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Default equality between a snapshot value and the wire form of a current value.
///
/// `None` and JSON `null` are the same; a missing value equals an empty string;
/// numbers compare by value; strings that both parse as dates compare as instants;
/// arrays compare element by element in order.
#[must_use]
pub fn wire_equivalent(initial: Option<&Value>, current: Option<&Value>) -> bool {
    let initial = initial.filter(|v| !v.is_null());
    let current = current.filter(|v| !v.is_null());

    match (initial, current) {
        (None, None) => true,
        (None, Some(Value::String(s))) | (Some(Value::String(s)), None) => s.is_empty(),
        (None, Some(_)) | (Some(_), None) => false,
        (Some(a), Some(b)) => values_match(a, b),
    }
}

fn values_match(initial: &Value, current: &Value) -> bool {
    match (initial, current) {
        (Value::String(a), Value::String(b)) => {
            a == b
                || matches!((parse_date(a), parse_date(b)), (Some(x), Some(y)) if x == y)
        }
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_match(x, y))
        }
        (Value::Object(_), Value::Object(_)) => initial == current,
        (other, Value::String(text)) => wire_text(other) == *text,
        (Value::String(text), Value::Number(n)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .zip(n.as_f64())
            .is_some_and(|(x, y)| x == y),
        (Value::String(text), Value::Bool(b)) => parse_bool(text) == Some(*b),
        _ => false,
    }
}

fn wire_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Human-readable rendering of a raw value for change lists and error messages.
#[must_use]
pub fn describe_wire(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "(null)".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(map)) => match map.get("uniqueName").and_then(Value::as_str) {
            Some(unique) => unique.to_string(),
            None => Value::Object(map.clone()).to_string(),
        },
        Some(other) => other.to_string(),
    }
}
