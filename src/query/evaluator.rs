//! Partial evaluation of predicate expressions.
//!
//! Subtrees that do not depend on the item being filtered are folded into
//! constants before translation, so captured values and closed arithmetic reach
//! the translator as literals.

use std::collections::HashSet;

use crate::error::QueryError;
use crate::query::expr::Expr;

/// Fold every maximal subtree that does not read a member of the item.
pub fn partial_eval(expr: &Expr) -> Result<Expr, QueryError> {
    partial_eval_with(expr, |node| !matches!(node, Expr::Member(_)))
}

/// Fold every maximal subtree whose nodes all satisfy `can_be_evaluated`.
pub fn partial_eval_with(
    expr: &Expr,
    can_be_evaluated: impl Fn(&Expr) -> bool,
) -> Result<Expr, QueryError> {
    let mut nominator = Nominator {
        can_be_evaluated: &can_be_evaluated,
        candidates: HashSet::new(),
    };
    nominator.nominate(expr);
    SubtreeEvaluator {
        candidates: nominator.candidates,
    }
    .fold(expr)
}

struct Nominator<'a> {
    can_be_evaluated: &'a dyn Fn(&Expr) -> bool,
    candidates: HashSet<*const Expr>,
}

impl Nominator<'_> {
    /// Returns true when `expr` and all of its descendants can be evaluated.
    fn nominate(&mut self, expr: &Expr) -> bool {
        // Every child is visited, even after one has failed.
        let children_ok = expr
            .children()
            .into_iter()
            .fold(true, |ok, child| self.nominate(child) && ok);

        if children_ok && (self.can_be_evaluated)(expr) {
            self.candidates.insert(std::ptr::from_ref(expr));
            true
        } else {
            false
        }
    }
}

struct SubtreeEvaluator {
    candidates: HashSet<*const Expr>,
}

impl SubtreeEvaluator {
    fn fold(&self, expr: &Expr) -> Result<Expr, QueryError> {
        if self.candidates.contains(&std::ptr::from_ref(expr)) {
            return match expr {
                Expr::Constant(_) => Ok(expr.clone()),
                _ => expr.eval(None).map(Expr::Constant),
            };
        }

        Ok(match expr {
            Expr::Not(inner) => Expr::Not(Box::new(self.fold(inner)?)),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(self.fold(left)?),
                right: Box::new(self.fold(right)?),
            },
            Expr::Call { method, args } => Expr::Call {
                method: method.clone(),
                args: args
                    .iter()
                    .map(|arg| self.fold(arg))
                    .collect::<Result<_, _>>()?,
            },
            other => other.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{captured, constant, custom, member};
    use crate::value::FieldValue;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// # Captured Values Become Constants
    ///
    /// Verifies subtrees independent of the item are folded.
    ///
    /// ## Test Scenario
    /// - Compare a member with a captured value
    ///
    /// ## Expected Outcome
    /// - The captured value is replaced by its constant; the member is kept
    #[test]
    fn test_captured_values_become_constants() {
        let expr = member("state").equals(captured("wanted", || FieldValue::from("Active")));
        let folded = partial_eval(&expr).unwrap();
        assert_eq!(folded, member("state").equals("Active"));
    }

    /// # Closed Subtrees Fold Once
    ///
    /// Verifies a maximal closed subtree is evaluated once as a whole.
    ///
    /// ## Test Scenario
    /// - Build a custom call over two captured values, compared with a member
    /// - Count how often the captured values are read
    ///
    /// ## Expected Outcome
    /// - The call folds to a single constant and each capture is read once
    #[test]
    fn test_closed_subtrees_fold_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let base = captured("base", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            FieldValue::Integer(1)
        });
        let sum = custom(
            "add",
            |args| match args {
                [FieldValue::Integer(a), FieldValue::Integer(b)] => Ok(FieldValue::Integer(a + b)),
                _ => Err(QueryError::Function {
                    name: "add".to_string(),
                    message: "integers only".to_string(),
                }),
            },
            vec![base, constant(2)],
        );

        let folded = partial_eval(&member("priority").le(sum)).unwrap();
        assert_eq!(folded, member("priority").le(3));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    /// # Member Dependent Subtrees Are Kept
    ///
    /// Verifies nothing that reads the item is folded.
    ///
    /// ## Test Scenario
    /// - Partially evaluate a call whose argument is a member
    ///
    /// ## Expected Outcome
    /// - The tree is unchanged
    #[test]
    fn test_member_dependent_subtrees_are_kept() {
        let expr = member("title").contains("crash").and(!member("tags").has_item("x"));
        assert_eq!(partial_eval(&expr).unwrap(), expr);
    }

    /// # Custom Nomination Predicate
    ///
    /// Verifies the caller can restrict what gets folded.
    ///
    /// ## Test Scenario
    /// - Forbid folding of captured values
    ///
    /// ## Expected Outcome
    /// - The captured node survives unchanged
    #[test]
    fn test_custom_nomination_predicate() {
        let expr = member("state").equals(captured("s", || FieldValue::from("New")));
        let folded = partial_eval_with(&expr, |node| {
            !matches!(node, Expr::Member(_) | Expr::Captured(_))
        })
        .unwrap();
        assert_eq!(folded, expr);
    }

    /// # Folding Is Idempotent
    ///
    /// Verifies a second pass over a folded tree changes nothing.
    ///
    /// ## Test Scenario
    /// - Fold a closed custom call over a literal and a captured value twice
    /// - Fold a bare literal and a folded predicate twice
    ///
    /// ## Expected Outcome
    /// - The call becomes one constant; every second pass returns its input
    /// - The captured value is read only by the first pass
    #[test]
    fn test_folding_is_idempotent() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let add = custom(
            "add",
            |args| match args {
                [FieldValue::Integer(a), FieldValue::Integer(b)] => Ok(FieldValue::Integer(a + b)),
                _ => Ok(FieldValue::Null),
            },
            vec![
                constant(1),
                captured("step", move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    FieldValue::Integer(4)
                }),
            ],
        );

        let once = partial_eval(&add).unwrap();
        assert_eq!(once, constant(5));
        assert_eq!(partial_eval(&once).unwrap(), once);
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        let literal = constant("Active");
        assert_eq!(partial_eval(&literal).unwrap(), literal);

        let predicate = partial_eval(&member("priority").ge(add)).unwrap();
        assert_eq!(predicate, member("priority").ge(5));
        assert_eq!(partial_eval(&predicate).unwrap(), predicate);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }
}
