//! Boolean condition tree for WHERE clauses.
//!
//! `Expr::build()` renders SQL with `$n` placeholders computed at build time;
//! term values only ever travel through the [`ParamList`].

use crate::param::ParamList;
use crate::types::Term;

/// A resolved column expression: `p0.price`, `LOWER(c1.name)`, ...
///
/// Operands are only produced by field resolution, which validates every
/// identifier and only renders whitelisted templates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Operand(String);

impl Operand {
    pub(crate) fn new(sql: impl Into<String>) -> Self {
        Operand(sql.into())
    }

    pub fn as_sql(&self) -> &str {
        &self.0
    }

    /// Wrap in `LOWER(...)` for case-insensitive ordering.
    pub(crate) fn lowercased(&self) -> Self {
        Operand(format!("LOWER({})", self.0))
    }
}

/// Binary comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    Ilike,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
            CompareOp::Like => "LIKE",
            CompareOp::Ilike => "ILIKE",
        }
    }
}

/// Expression node for building WHERE clauses.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// AND group: all conditions must be true.
    And(Vec<Expr>),

    /// OR group: at least one condition must be true.
    Or(Vec<Expr>),

    /// NOT: negate the inner expression.
    Not(Box<Expr>),

    /// Simple comparison: operand op $n
    Compare {
        lhs: Operand,
        op: CompareOp,
        value: Term,
    },

    /// NULL check: operand IS NULL or operand IS NOT NULL
    NullCheck { lhs: Operand, is_null: bool },

    /// IN list: operand IN ($1, $2, ...) or operand NOT IN (...)
    InList {
        lhs: Operand,
        values: Vec<Term>,
        negated: bool,
    },

    /// Always true (used for empty NOT IN lists).
    True,

    /// Always false (used for empty IN lists).
    False,
}

impl Expr {
    pub fn compare(lhs: Operand, op: CompareOp, value: impl Into<Term>) -> Self {
        Expr::Compare {
            lhs,
            op,
            value: value.into(),
        }
    }

    pub fn is_null(lhs: Operand) -> Self {
        Expr::NullCheck { lhs, is_null: true }
    }

    pub fn is_not_null(lhs: Operand) -> Self {
        Expr::NullCheck {
            lhs,
            is_null: false,
        }
    }

    /// `operand IN (...)`; an empty list matches nothing.
    pub fn in_list(lhs: Operand, values: Vec<Term>) -> Self {
        if values.is_empty() {
            return Expr::False;
        }
        Expr::InList {
            lhs,
            values,
            negated: false,
        }
    }

    /// `operand NOT IN (...)`; an empty list matches everything.
    pub fn not_in(lhs: Operand, values: Vec<Term>) -> Self {
        if values.is_empty() {
            return Expr::True;
        }
        Expr::InList {
            lhs,
            values,
            negated: true,
        }
    }

    /// `operand >= low AND operand <= high`
    pub fn between(lhs: Operand, low: Term, high: Term) -> Self {
        Expr::And(vec![
            Expr::compare(lhs.clone(), CompareOp::Gte, low),
            Expr::compare(lhs, CompareOp::Lte, high),
        ])
    }

    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    /// OR two expressions, flattening an existing OR group on the left.
    pub fn or_with(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut exprs) => {
                exprs.push(other);
                Expr::Or(exprs)
            }
            expr => Expr::Or(vec![expr, other]),
        }
    }

    /// Check if this expression is empty (contains no conditions).
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().all(|e| e.is_empty()),
            Expr::Not(inner) => inner.is_empty(),
            _ => false,
        }
    }

    /// Build the SQL fragment, pushing values into `params`.
    pub fn build(&self, params: &mut ParamList) -> String {
        match self {
            Expr::And(exprs) => join_group(exprs, " AND ", params, |e| matches!(e, Expr::Or(_))),
            Expr::Or(exprs) => join_group(exprs, " OR ", params, |e| matches!(e, Expr::And(_))),
            Expr::Not(inner) => {
                let sql = inner.build(params);
                if sql.is_empty() {
                    String::new()
                } else {
                    format!("NOT ({sql})")
                }
            }
            Expr::Compare { lhs, op, value } => {
                let idx = params.push(value.clone());
                format!("{} {} ${}", lhs.as_sql(), op.as_sql(), idx)
            }
            Expr::NullCheck { lhs, is_null } => {
                if *is_null {
                    format!("{} IS NULL", lhs.as_sql())
                } else {
                    format!("{} IS NOT NULL", lhs.as_sql())
                }
            }
            Expr::InList {
                lhs,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return if *negated { "1=1" } else { "1=0" }.to_string();
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| format!("${}", params.push(v.clone())))
                    .collect();
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", lhs.as_sql(), op, placeholders.join(", "))
            }
            Expr::True => "1=1".to_string(),
            Expr::False => "1=0".to_string(),
        }
    }
}

fn join_group(
    exprs: &[Expr],
    sep: &str,
    params: &mut ParamList,
    needs_parens: impl Fn(&Expr) -> bool,
) -> String {
    let parts: Vec<String> = exprs
        .iter()
        .filter(|e| !e.is_empty())
        .map(|e| {
            let sql = e.build(params);
            if needs_parens(e) && !sql.is_empty() {
                format!("({sql})")
            } else {
                sql
            }
        })
        .filter(|s| !s.is_empty())
        .collect();
    parts.join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Operand {
        Operand::new(format!("p0.{name}"))
    }

    #[test]
    fn compare_numbers_placeholders() {
        let expr = Expr::And(vec![
            Expr::compare(col("a"), CompareOp::Eq, 1),
            Expr::compare(col("b"), CompareOp::Lte, 2),
        ]);
        let mut params = ParamList::new();
        assert_eq!(expr.build(&mut params), "p0.a = $1 AND p0.b <= $2");
        assert_eq!(params.values(), &[Term::Int(1), Term::Int(2)]);
    }

    #[test]
    fn or_inside_and_gets_parens() {
        let expr = Expr::And(vec![
            Expr::compare(col("a"), CompareOp::Eq, 1),
            Expr::compare(col("b"), CompareOp::Eq, 2).or_with(Expr::compare(
                col("c"),
                CompareOp::Eq,
                3,
            )),
        ]);
        let mut params = ParamList::new();
        assert_eq!(
            expr.build(&mut params),
            "p0.a = $1 AND (p0.b = $2 OR p0.c = $3)"
        );
    }

    #[test]
    fn between_expands_to_two_comparisons() {
        let expr = Expr::between(col("price"), Term::Int(10), Term::Int(20));
        let mut params = ParamList::new();
        assert_eq!(expr.build(&mut params), "p0.price >= $1 AND p0.price <= $2");
    }

    #[test]
    fn not_wraps_inner() {
        let expr = Expr::not(Expr::between(col("price"), Term::Int(1), Term::Int(2)));
        let mut params = ParamList::new();
        assert_eq!(
            expr.build(&mut params),
            "NOT (p0.price >= $1 AND p0.price <= $2)"
        );
    }

    #[test]
    fn empty_lists() {
        let mut params = ParamList::new();
        assert_eq!(Expr::in_list(col("id"), vec![]).build(&mut params), "1=0");
        assert_eq!(Expr::not_in(col("id"), vec![]).build(&mut params), "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn in_list_placeholders() {
        let expr = Expr::not_in(col("id"), vec![Term::Int(1), Term::Int(2)]);
        let mut params = ParamList::new();
        assert_eq!(expr.build(&mut params), "p0.id NOT IN ($1, $2)");
    }

    #[test]
    fn null_checks() {
        let mut params = ParamList::new();
        assert_eq!(Expr::is_null(col("a")).build(&mut params), "p0.a IS NULL");
        assert_eq!(
            Expr::is_not_null(col("a")).build(&mut params),
            "p0.a IS NOT NULL"
        );
    }
}
