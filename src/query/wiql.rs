//! Translation of predicate expressions into WIQL clause fragments.
//!
//! Only a subset of [`Expr`] shapes has a WIQL equivalent. Everything else is left
//! out of the server query and caught by the in-memory pass that always follows,
//! so a gap only costs extra rows. To keep that guarantee the translator tracks
//! whether each fragment is *exact* or only a *superset* of the predicate: a
//! superset may be narrowed client side, but it must never be negated.
//!
//! ## Emitted fragments
//!
//! | Expression                        | WIQL                              |
//! |-----------------------------------|-----------------------------------|
//! | `member <op> constant`            | `[Field] <op> 'value'`            |
//! | `member.contains(s)`              | `[Field] CONTAINS 's'`            |
//! | `member.starts_with(s)`           | `[Field] CONTAINS 's'` (superset) |
//! | `member.is_in([a, b])`            | `[Field] IN ('a','b')`            |
//! | `list_member.has_item(s)`         | `[Field] CONTAINS 's'` (superset) |
//! | `!expr`                           | `NOT <expr>`                      |
//! | `a && b`, <code>a &#124;&#124; b</code> | `(<a> AND <b>)`, `(<a> OR <b>)` |
//! | `call == false`                   | `NOT <call>`                      |

use serde_json::Value;
use tracing::{debug, trace};

use crate::binding::{FieldBinding, FieldMap};
use crate::error::UsageError;
use crate::query::expr::{BinaryOp, Expr, Method};
use crate::value::{FieldValue, ValueKind};
use crate::work_item::TrackedItem;

/// Clause fragments for a predicate, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    pub clauses: Vec<String>,
    /// True when the server would return exactly the items the predicate accepts.
    pub exact: bool,
}

impl Translation {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The fragments joined into one WIQL condition.
    #[must_use]
    pub fn to_wiql(&self) -> String {
        self.clauses.concat()
    }
}

/// Translate `predicate` for items of type `T`.
///
/// An empty translation means nothing could be pushed to the server.
///
/// # Errors
///
/// [`UsageError::MemberOnBothSides`] when a comparison has no literal side.
pub fn translate<T: TrackedItem>(predicate: &Expr) -> Result<Translation, UsageError> {
    let translator = WiqlTranslator { fields: T::fields() };
    Ok(match translator.visit(predicate)? {
        Some(clause) => Translation {
            clauses: clause.parts,
            exact: clause.exact,
        },
        None => Translation::default(),
    })
}

struct Clause {
    parts: Vec<String>,
    exact: bool,
}

impl Clause {
    fn single(text: String, exact: bool) -> Self {
        trace!(clause = %text, "Adding WIQL clause");
        Self {
            parts: vec![text],
            exact,
        }
    }

    fn negated(mut self) -> Self {
        self.parts.insert(0, "NOT ".to_string());
        self
    }

    fn joined(left: Clause, connector: &str, right: Clause) -> Self {
        let mut parts = Vec::with_capacity(left.parts.len() + right.parts.len() + 3);
        parts.push("(".to_string());
        parts.extend(left.parts);
        parts.push(connector.to_string());
        parts.extend(right.parts);
        parts.push(")".to_string());
        Self {
            parts,
            exact: left.exact && right.exact,
        }
    }
}

struct WiqlTranslator<'a, T> {
    fields: &'a FieldMap<T>,
}

impl<T: 'static> WiqlTranslator<'_, T> {
    fn visit(&self, expr: &Expr) -> Result<Option<Clause>, UsageError> {
        match expr {
            Expr::Not(inner) => Ok(self.negate(inner, self.visit(inner)?)),
            Expr::Binary { op, left, right } => match op {
                BinaryOp::AndAlso => Ok(match (self.visit(left)?, self.visit(right)?) {
                    (Some(l), Some(r)) => Some(Clause::joined(l, " AND ", r)),
                    (Some(only), None) | (None, Some(only)) => Some(Clause {
                        exact: false,
                        ..only
                    }),
                    (None, None) => None,
                }),
                BinaryOp::OrElse => Ok(match (self.visit(left)?, self.visit(right)?) {
                    (Some(l), Some(r)) => Some(Clause::joined(l, " OR ", r)),
                    _ => {
                        debug!(expression = %expr, "OR with an untranslated side is evaluated client side");
                        None
                    }
                }),
                op => self.visit_comparison(expr, *op, left, right),
            },
            Expr::Call { method, args } => self.visit_call(expr, method, args),
            _ => {
                debug!(expression = %expr, "Expression has no WIQL form");
                Ok(None)
            }
        }
    }

    fn negate(&self, inner: &Expr, clause: Option<Clause>) -> Option<Clause> {
        match clause {
            Some(clause) if clause.exact => Some(clause.negated()),
            Some(_) => {
                debug!(expression = %inner, "Cannot negate an inexact clause; evaluated client side");
                None
            }
            None => None,
        }
    }

    fn visit_comparison(
        &self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Option<Clause>, UsageError> {
        match (left, right) {
            (Expr::Member(l), Expr::Member(r)) => Err(UsageError::MemberOnBothSides {
                left: l.clone(),
                right: r.clone(),
            }),
            (Expr::Member(property), Expr::Constant(value)) => {
                Ok(self.comparison(expr, property, op, value))
            }
            (Expr::Constant(value), Expr::Member(property)) => {
                Ok(self.comparison(expr, property, op.flipped(), value))
            }
            (call @ Expr::Call { .. }, Expr::Constant(FieldValue::Bool(b)))
            | (Expr::Constant(FieldValue::Bool(b)), call @ Expr::Call { .. })
                if matches!(op, BinaryOp::Eq | BinaryOp::Ne) =>
            {
                let clause = self.visit(call)?;
                if (op == BinaryOp::Eq) != *b {
                    Ok(self.negate(call, clause))
                } else {
                    Ok(clause)
                }
            }
            _ => {
                debug!(expression = %expr, "Unsupported comparison; evaluated client side");
                Ok(None)
            }
        }
    }

    fn comparison(
        &self,
        expr: &Expr,
        property: &str,
        op: BinaryOp,
        value: &FieldValue,
    ) -> Option<Clause> {
        let binding = self.binding(property)?;
        if binding.kind() == ValueKind::StringList {
            debug!(expression = %expr, "List fields are only matched with has_item");
            return None;
        }
        let op = match op {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::AndAlso | BinaryOp::OrElse => return None,
        };
        Some(Clause::single(
            format!("[{}] {op} {}", binding.field(), literal(binding, value)),
            true,
        ))
    }

    fn visit_call(
        &self,
        expr: &Expr,
        method: &Method,
        args: &[Expr],
    ) -> Result<Option<Clause>, UsageError> {
        match (method, args) {
            (
                Method::StringContains | Method::StartsWith,
                [Expr::Member(property), Expr::Constant(value @ FieldValue::String(_))],
            ) => Ok(self.binding(property).and_then(|binding| {
                if binding.kind() != ValueKind::String {
                    debug!(expression = %expr, "Substring match on a non-string field");
                    return None;
                }
                // Both degrade to CONTAINS; a prefix test is narrowed client side.
                Some(Clause::single(
                    format!("[{}] CONTAINS {}", binding.field(), literal(binding, value)),
                    *method == Method::StringContains,
                ))
            })),
            (Method::EnumerableContains | Method::ListContains, [a, b]) => {
                let (property, values) = match (a, b) {
                    (Expr::Member(l), Expr::Member(r)) => {
                        return Err(UsageError::MemberOnBothSides {
                            left: l.clone(),
                            right: r.clone(),
                        });
                    }
                    (Expr::Member(property), Expr::Constant(values))
                    | (Expr::Constant(values), Expr::Member(property)) => (property, values),
                    _ => {
                        debug!(expression = %expr, "Membership test needs a member and a literal");
                        return Ok(None);
                    }
                };
                Ok(self.membership(expr, property, values))
            }
            _ => {
                debug!(expression = %expr, "Method call has no WIQL form");
                Ok(None)
            }
        }
    }

    fn membership(&self, expr: &Expr, property: &str, values: &FieldValue) -> Option<Clause> {
        let binding = self.binding(property)?;
        match values {
            FieldValue::String(_) => Some(Clause::single(
                format!("[{}] CONTAINS {}", binding.field(), literal(binding, values)),
                false,
            )),
            FieldValue::List(items) if !items.is_empty() && binding.kind() != ValueKind::StringList => {
                let literals: Vec<String> = items
                    .iter()
                    .map(|item| literal(binding, &FieldValue::String(item.clone())))
                    .collect();
                Some(Clause::single(
                    format!("[{}] IN ({})", binding.field(), literals.join(",")),
                    true,
                ))
            }
            _ => {
                debug!(expression = %expr, "Membership literal has no WIQL form");
                None
            }
        }
    }

    fn binding(&self, property: &str) -> Option<&FieldBinding<T>> {
        let binding = self.fields.get(property);
        if binding.is_none() {
            debug!(property, type_name = self.fields.type_name(), "Property is not bound");
        }
        binding
    }
}

/// Quote a constant for WIQL, passing it through the binding's converter first
/// unless that converter only matters for change detection.
fn literal<T>(binding: &FieldBinding<T>, value: &FieldValue) -> String {
    let converted = binding
        .converter()
        .filter(|converter| converter.comparer().is_none())
        .and_then(|converter| converter.convert_back(value).ok().flatten());

    let text = match converted {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => value.to_string(),
    };
    format!("'{}'", text.replace('\'', "''"))
}
