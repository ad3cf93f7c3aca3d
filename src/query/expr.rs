//! Predicate expressions over work items.
//!
//! An [`Expr`] is a small typed syntax tree: constants, captured values, property
//! accesses on the item being filtered, boolean connectives, comparisons and a
//! handful of method calls. The same tree is translated into WIQL for the server
//! and evaluated in memory over the returned items.
//!
//! ```rust
//! use witkit::query::{member, constant};
//!
//! let active_bugs = member("state")
//!     .equals("Active")
//!     .and(member("title").contains("crash"))
//!     .and(!member("tags").has_item("triaged"));
//! assert_eq!(
//!     active_bugs.to_string(),
//!     "(((item.state == 'Active') && item.title.contains('crash')) && !item.tags.has_item('triaged'))"
//! );
//! # let _ = constant(1);
//! ```

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::QueryError;
use crate::value::{EnumValue, FieldValue, eq_ignore_case};
use crate::work_item::DynWorkItem;

type CapturedFn = dyn Fn() -> FieldValue + Send + Sync;
type CustomFnImpl = dyn Fn(&[FieldValue]) -> Result<FieldValue, QueryError> + Send + Sync;

/// A value read from the caller's environment when the query runs.
#[derive(Clone)]
pub struct Captured {
    pub label: String,
    read: Arc<CapturedFn>,
}

impl Captured {
    pub fn value(&self) -> FieldValue {
        (self.read)()
    }
}

impl fmt::Debug for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Captured").field("label", &self.label).finish()
    }
}

impl PartialEq for Captured {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && Arc::ptr_eq(&self.read, &other.read)
    }
}

/// A caller-supplied function. Never translated; always evaluated in memory.
#[derive(Clone)]
pub struct CustomFn {
    pub name: String,
    call: Arc<CustomFnImpl>,
}

impl CustomFn {
    pub fn call(&self, args: &[FieldValue]) -> Result<FieldValue, QueryError> {
        (self.call)(args)
    }
}

impl fmt::Debug for CustomFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFn").field("name", &self.name).finish()
    }
}

impl PartialEq for CustomFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.call, &other.call)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    AndAlso,
    OrElse,
}

impl BinaryOp {
    /// True for the six comparison operators.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        !matches!(self, Self::AndAlso | Self::OrElse)
    }

    /// The operator with its operands swapped: `a < b` is `b > a`.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            other => other,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::AndAlso => "&&",
            Self::OrElse => "||",
        }
    }
}

/// Method calls understood by the evaluator and, except `Custom`, by the translator.
///
/// Arguments are positional: the receiver first.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// `text.contains(needle)`
    StringContains,
    /// `text.starts_with(prefix)`
    StartsWith,
    /// `values.contains(item)` over a constant collection
    EnumerableContains,
    /// `list.contains(item)` where the list is a bound property or a constant
    ListContains,
    Custom(CustomFn),
}

/// A predicate expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(FieldValue),
    Captured(Captured),
    /// A bound property of the item being filtered.
    Member(String),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        method: Method,
        args: Vec<Expr>,
    },
}

/// Access a bound property of the item being filtered.
pub fn member(property: impl Into<String>) -> Expr {
    Expr::Member(property.into())
}

pub fn constant(value: impl Into<FieldValue>) -> Expr {
    Expr::Constant(value.into())
}

/// A value read when the query executes rather than when it is built.
pub fn captured(
    label: impl Into<String>,
    read: impl Fn() -> FieldValue + Send + Sync + 'static,
) -> Expr {
    Expr::Captured(Captured {
        label: label.into(),
        read: Arc::new(read),
    })
}

/// Call a caller-supplied function with the given arguments.
pub fn custom(
    name: impl Into<String>,
    call: impl Fn(&[FieldValue]) -> Result<FieldValue, QueryError> + Send + Sync + 'static,
    args: Vec<Expr>,
) -> Expr {
    Expr::Call {
        method: Method::Custom(CustomFn {
            name: name.into(),
            call: Arc::new(call),
        }),
        args,
    }
}

macro_rules! constant_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Constant(FieldValue::from(value))
                }
            }
        )*
    };
}

constant_from!(&str, String, i64, i32, f64, bool, DateTime<Utc>, Vec<String>, EnumValue);

impl From<FieldValue> for Expr {
    fn from(value: FieldValue) -> Self {
        Expr::Constant(value)
    }
}

impl<const N: usize> From<[&str; N]> for Expr {
    fn from(values: [&str; N]) -> Self {
        Expr::Constant(FieldValue::List(
            values.iter().map(|v| (*v).to_string()).collect(),
        ))
    }
}

impl From<Vec<&str>> for Expr {
    fn from(values: Vec<&str>) -> Self {
        Expr::Constant(FieldValue::List(
            values.into_iter().map(str::to_string).collect(),
        ))
    }
}

impl Expr {
    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    fn call(method: Method, args: Vec<Expr>) -> Expr {
        Expr::Call { method, args }
    }

    #[must_use]
    pub fn equals(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    #[must_use]
    pub fn not_equals(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ne, other)
    }

    #[must_use]
    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    #[must_use]
    pub fn ge(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ge, other)
    }

    #[must_use]
    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    #[must_use]
    pub fn le(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Le, other)
    }

    #[must_use]
    pub fn and(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::AndAlso, other)
    }

    #[must_use]
    pub fn or(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::OrElse, other)
    }

    /// Substring test on a string.
    #[must_use]
    pub fn contains(self, needle: impl Into<Expr>) -> Expr {
        Expr::call(Method::StringContains, vec![self, needle.into()])
    }

    /// Prefix test on a string.
    #[must_use]
    pub fn starts_with(self, prefix: impl Into<Expr>) -> Expr {
        Expr::call(Method::StartsWith, vec![self, prefix.into()])
    }

    /// Membership of this value in a collection.
    #[must_use]
    pub fn is_in(self, values: impl Into<Expr>) -> Expr {
        Expr::call(Method::EnumerableContains, vec![values.into(), self])
    }

    /// Membership of `item` in this list.
    #[must_use]
    pub fn has_item(self, item: impl Into<Expr>) -> Expr {
        Expr::call(Method::ListContains, vec![self, item.into()])
    }

    /// Direct children, left to right.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Constant(_) | Expr::Captured(_) | Expr::Member(_) => Vec::new(),
            Expr::Not(inner) => vec![inner.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Call { args, .. } => args.iter().collect(),
        }
    }

    /// Evaluate the expression, reading members from `item`.
    ///
    /// # Errors
    ///
    /// [`QueryError::UnboundParameter`] when a member is read without an item,
    /// [`QueryError::UnknownProperty`] when the item has no such bound property,
    /// and [`QueryError::TypeMismatch`] when an operand has the wrong shape.
    pub fn eval(&self, item: Option<&dyn DynWorkItem>) -> Result<FieldValue, QueryError> {
        match self {
            Expr::Constant(value) => Ok(value.clone()),
            Expr::Captured(captured) => Ok(captured.value()),
            Expr::Member(property) => {
                let item = item.ok_or(QueryError::UnboundParameter)?;
                item.read_property(property)
                    .ok_or_else(|| QueryError::UnknownProperty {
                        property: property.clone(),
                    })
            }
            Expr::Not(inner) => Ok(FieldValue::Bool(!truth(inner.eval(item)?)?)),
            Expr::Binary { op, left, right } => match op {
                BinaryOp::AndAlso => {
                    Ok(FieldValue::Bool(truth(left.eval(item)?)? && truth(right.eval(item)?)?))
                }
                BinaryOp::OrElse => {
                    Ok(FieldValue::Bool(truth(left.eval(item)?)? || truth(right.eval(item)?)?))
                }
                op => {
                    let ordering = left.eval(item)?.compare(&right.eval(item)?);
                    Ok(FieldValue::Bool(compare_holds(*op, ordering)))
                }
            },
            Expr::Call { method, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                call_method(method, &values)
            }
        }
    }

    /// Evaluate as a filter predicate. A null result filters the item out.
    pub fn matches(&self, item: &dyn DynWorkItem) -> Result<bool, QueryError> {
        truth(self.eval(Some(item))?)
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

fn truth(value: FieldValue) -> Result<bool, QueryError> {
    match value {
        FieldValue::Bool(b) => Ok(b),
        FieldValue::Null => Ok(false),
        other => Err(QueryError::TypeMismatch {
            expected: "boolean",
            found: format!("{other:?}"),
        }),
    }
}

fn compare_holds(op: BinaryOp, ordering: Option<Ordering>) -> bool {
    match op {
        BinaryOp::Eq => ordering == Some(Ordering::Equal),
        BinaryOp::Ne => ordering != Some(Ordering::Equal),
        BinaryOp::Gt => ordering == Some(Ordering::Greater),
        BinaryOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        BinaryOp::Lt => ordering == Some(Ordering::Less),
        BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::AndAlso | BinaryOp::OrElse => false,
    }
}

fn text_arg<'a>(value: &'a FieldValue) -> Result<Option<&'a str>, QueryError> {
    match value {
        FieldValue::Null => Ok(None),
        FieldValue::String(s) => Ok(Some(s)),
        other => Err(QueryError::TypeMismatch {
            expected: "string",
            found: format!("{other:?}"),
        }),
    }
}

fn element_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        FieldValue::Enum(ev) => Some(ev.name.to_string()),
        other => Some(other.to_string()),
    }
}

fn call_method(method: &Method, values: &[FieldValue]) -> Result<FieldValue, QueryError> {
    let pair = || match values {
        [receiver, arg] => Ok((receiver, arg)),
        _ => Err(QueryError::TypeMismatch {
            expected: "two arguments",
            found: format!("{} arguments", values.len()),
        }),
    };

    let result = match method {
        Method::StringContains | Method::StartsWith => {
            let (receiver, arg) = pair()?;
            match (text_arg(receiver)?, text_arg(arg)?) {
                (Some(text), Some(needle)) => {
                    let (text, needle) = (text.to_lowercase(), needle.to_lowercase());
                    if *method == Method::StartsWith {
                        text.starts_with(&needle)
                    } else {
                        text.contains(&needle)
                    }
                }
                _ => false,
            }
        }
        Method::EnumerableContains | Method::ListContains => {
            let (collection, item) = pair()?;
            let Some(item) = element_text(item) else {
                return Ok(FieldValue::Bool(false));
            };
            match collection {
                FieldValue::Null => false,
                FieldValue::List(values) => values.iter().any(|v| eq_ignore_case(v, &item)),
                FieldValue::String(single) => eq_ignore_case(single, &item),
                other => {
                    return Err(QueryError::TypeMismatch {
                        expected: "collection",
                        found: format!("{other:?}"),
                    });
                }
            }
        }
        Method::Custom(function) => return function.call(values),
    };
    Ok(FieldValue::Bool(result))
}

fn fmt_constant(value: &FieldValue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        FieldValue::Null => f.write_str("null"),
        FieldValue::List(items) => {
            let quoted: Vec<String> = items.iter().map(|i| format!("'{i}'")).collect();
            write!(f, "[{}]", quoted.join(", "))
        }
        FieldValue::String(_) | FieldValue::DateTime(_) | FieldValue::Enum(_) => {
            write!(f, "'{value}'")
        }
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(value) => fmt_constant(value, f),
            Expr::Captured(captured) => write!(f, "<{}>", captured.label),
            Expr::Member(property) => write!(f, "item.{property}"),
            Expr::Not(inner) => write!(f, "!{inner}"),
            Expr::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Call { method, args } => {
                let name = match method {
                    Method::StringContains => "contains",
                    Method::StartsWith => "starts_with",
                    Method::EnumerableContains => "contains",
                    Method::ListContains => "has_item",
                    Method::Custom(function) => {
                        let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
                        return write!(f, "{}({})", function.name, rendered.join(", "));
                    }
                };
                match args.as_slice() {
                    [receiver, rest @ ..] => {
                        let rendered: Vec<String> = rest.iter().map(ToString::to_string).collect();
                        write!(f, "{receiver}.{name}({})", rendered.join(", "))
                    }
                    [] => write!(f, "{name}()"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_item::{TrackedItem, WorkItem};

    fn sample() -> WorkItem {
        let mut item = WorkItem::new_item();
        item.title = Some("Login crash on startup".to_string());
        item.state = "Active".to_string();
        item.priority = Some(2);
        item.tags = vec!["ui".to_string(), "triaged".to_string()];
        item
    }

    /// # Evaluate Comparisons And Connectives
    ///
    /// Verifies in-memory evaluation of comparisons combined with AND, OR and NOT.
    ///
    /// ## Test Scenario
    /// - Evaluate predicates over a populated work item
    ///
    /// ## Expected Outcome
    /// - Each predicate yields the expected truth value
    #[test]
    fn test_evaluate_comparisons_and_connectives() {
        let item = sample();
        let item: &dyn DynWorkItem = &item;

        assert!(member("state").equals("Active").matches(item).unwrap());
        assert!(member("priority").lt(3).matches(item).unwrap());
        assert!(!member("priority").gt(2).matches(item).unwrap());
        assert!(
            member("state")
                .equals("Closed")
                .or(member("priority").ge(2))
                .matches(item)
                .unwrap()
        );
        assert!((!member("state").equals("Closed")).matches(item).unwrap());
        assert!(constant(3).gt(member("priority")).matches(item).unwrap());
    }

    /// # Evaluate Method Calls
    ///
    /// Verifies string and membership methods, including null receivers.
    ///
    /// ## Test Scenario
    /// - Evaluate contains, starts_with, is_in and has_item
    /// - Evaluate contains on an unset optional string
    ///
    /// ## Expected Outcome
    /// - Matches are found; a null receiver yields false rather than an error
    #[test]
    fn test_evaluate_method_calls() {
        let item = sample();
        let item: &dyn DynWorkItem = &item;

        assert!(member("title").contains("crash").matches(item).unwrap());
        assert!(member("title").starts_with("Login").matches(item).unwrap());
        assert!(!member("title").starts_with("crash").matches(item).unwrap());
        assert!(member("state").is_in(["New", "Active"]).matches(item).unwrap());
        assert!(member("tags").has_item("triaged").matches(item).unwrap());
        assert!(!member("description").contains("x").matches(item).unwrap());
        assert!(member("priority").is_in(["1", "2"]).matches(item).unwrap());
    }

    /// # Evaluation Errors
    ///
    /// Verifies misuse is reported instead of silently filtering.
    ///
    /// ## Test Scenario
    /// - Read a member without an item
    /// - Read a property that is not bound
    /// - Use a non-boolean as a predicate
    ///
    /// ## Expected Outcome
    /// - Each case returns the matching query error
    #[test]
    fn test_evaluation_errors() {
        assert_eq!(
            member("title").eval(None),
            Err(QueryError::UnboundParameter)
        );

        let item = sample();
        let item: &dyn DynWorkItem = &item;
        assert!(matches!(
            member("no_such").equals(1).matches(item),
            Err(QueryError::UnknownProperty { .. })
        ));
        assert!(matches!(
            member("title").matches(item),
            Err(QueryError::TypeMismatch { .. })
        ));
    }

    /// # Custom Functions And Captured Values
    ///
    /// Verifies caller-supplied functions and captured values are evaluated.
    ///
    /// ## Test Scenario
    /// - Filter with a custom length function compared to a captured threshold
    ///
    /// ## Expected Outcome
    /// - The function receives evaluated arguments and the comparison holds
    #[test]
    fn test_custom_functions_and_captured_values() {
        let item = sample();
        let item: &dyn DynWorkItem = &item;

        let length = custom(
            "len",
            |args| match args {
                [FieldValue::String(s)] => Ok(FieldValue::Integer(s.len() as i64)),
                _ => Err(QueryError::Function {
                    name: "len".to_string(),
                    message: "expected one string".to_string(),
                }),
            },
            vec![member("title")],
        );
        let threshold = captured("threshold", || FieldValue::Integer(10));
        assert!(length.clone().gt(threshold).matches(item).unwrap());
        assert_eq!(length.to_string(), "len(item.title)");
    }

    /// # Text Matching Ignores Case
    ///
    /// Verifies in-memory evaluation agrees with the server on text that
    /// differs only in case, so a negated or capped server query never drops
    /// a row the predicate accepts.
    ///
    /// ## Test Scenario
    /// - Negate a title search whose needle differs in case from the title
    /// - Compare the state against a lowercase literal with `!=`
    /// - Search and test membership with mixed-case literals
    ///
    /// ## Expected Outcome
    /// - Case never changes the outcome of a text comparison
    #[test]
    fn test_text_matching_ignores_case() {
        let mut report = sample();
        report.title = Some("crash report".to_string());
        let item: &dyn DynWorkItem = &report;

        assert!(member("title").contains("Crash").matches(item).unwrap());
        assert!(!(!member("title").contains("Crash")).matches(item).unwrap());
        assert!(member("title").starts_with("CRASH").matches(item).unwrap());
        assert!(!member("state").not_equals("active").matches(item).unwrap());
        assert!(member("state").equals("ACTIVE").matches(item).unwrap());
        assert!(member("state").is_in(["new", "active"]).matches(item).unwrap());
        assert!(member("tags").has_item("UI").matches(item).unwrap());
    }

    /// # Display Rendering
    ///
    /// Verifies expressions render readably for logs.
    ///
    /// ## Test Scenario
    /// - Render a nested predicate
    ///
    /// ## Expected Outcome
    /// - The rendering shows members, constants and operators
    #[test]
    fn test_display_rendering() {
        let expr = member("priority")
            .le(2)
            .and(member("state").is_in(["New", "Active"]));
        assert_eq!(
            expr.to_string(),
            "((item.priority <= 2) && ['New', 'Active'].contains(item.state))"
        );
    }
}
