//! Search terms and key values as they arrive from request parameters.
//!
//! Request parameters are loosely typed (`"10"` and `10` both show up for an
//! integer column), so [`Term`] binds leniently: it inspects the parameter type
//! Postgres asks for and converts on the way out instead of forcing callers to
//! know every column type up front.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use tokio_postgres::types::{IsNull, ToSql, Type};

type BindResult = Result<IsNull, Box<dyn Error + Sync + Send>>;

/// A loosely typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Term {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Term>),
}

impl Term {
    /// Blank terms (`null`, `""`, `[]`) turn a search entry into a no-op.
    pub fn is_blank(&self) -> bool {
        match self {
            Term::Null => true,
            Term::Text(s) => s.is_empty(),
            Term::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Term::Bool(b) => Some(*b),
            Term::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Integer view; numeric strings are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Term::Int(n) => Some(*n),
            Term::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Term::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Text(s.to_string())
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::Text(s)
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Int(n)
    }
}

impl From<i32> for Term {
    fn from(n: i32) -> Self {
        Term::Int(n.into())
    }
}

impl From<f64> for Term {
    fn from(f: f64) -> Self {
        Term::Float(f)
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Bool(b)
    }
}

impl<T: Into<Term>> From<Vec<T>> for Term {
    fn from(items: Vec<T>) -> Self {
        Term::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Term>> From<Option<T>> for Term {
    fn from(value: Option<T>) -> Self {
        value.map_or(Term::Null, Into::into)
    }
}

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn bind_int(n: i64, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
        Type::INT8 => n.to_sql(ty, out),
        Type::FLOAT4 => (n as f32).to_sql(ty, out),
        Type::FLOAT8 => (n as f64).to_sql(ty, out),
        _ if is_text_type(ty) => n.to_string().as_str().to_sql(ty, out),
        _ => Err(format!("cannot bind integer term as {ty}").into()),
    }
}

fn bind_float(f: f64, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 if f.fract() == 0.0 => bind_int(f as i64, ty, out),
        _ if is_text_type(ty) => f.to_string().as_str().to_sql(ty, out),
        _ => Err(format!("cannot bind float term as {ty}").into()),
    }
}

fn bind_text(s: &str, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => bind_int(s.trim().parse()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => bind_float(s.trim().parse()?, ty, out),
        Type::BOOL => s.trim().parse::<bool>()?.to_sql(ty, out),
        Type::DATE => s.trim().parse::<NaiveDate>()?.to_sql(ty, out),
        Type::TIMESTAMP => s.trim().parse::<NaiveDateTime>()?.to_sql(ty, out),
        Type::TIMESTAMPTZ => s.trim().parse::<DateTime<Utc>>()?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s.trim())?.to_sql(ty, out),
        _ => s.to_sql(ty, out),
    }
}

impl ToSql for Term {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> BindResult {
        match self {
            Term::Null => Ok(IsNull::Yes),
            Term::Bool(b) if is_text_type(ty) => b.to_string().as_str().to_sql(ty, out),
            Term::Bool(b) => b.to_sql(ty, out),
            Term::Int(n) => bind_int(*n, ty, out),
            Term::Float(f) => bind_float(*f, ty, out),
            Term::Text(s) => bind_text(s, ty, out),
            Term::List(_) => Err("list terms must be expanded before binding".into()),
        }
    }

    fn accepts(ty: &Type) -> bool {
        is_text_type(ty)
            || matches!(
                *ty,
                Type::BOOL
                    | Type::INT2
                    | Type::INT4
                    | Type::INT8
                    | Type::FLOAT4
                    | Type::FLOAT8
                    | Type::DATE
                    | Type::TIMESTAMP
                    | Type::TIMESTAMPTZ
                    | Type::UUID
            )
    }

    tokio_postgres::types::to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_untagged() {
        let term: Term = serde_json::from_value(json!(10)).unwrap();
        assert_eq!(term, Term::Int(10));
        let term: Term = serde_json::from_value(json!(1.5)).unwrap();
        assert_eq!(term, Term::Float(1.5));
        let term: Term = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(term, Term::Null);
        let term: Term = serde_json::from_value(json!(["a", 2])).unwrap();
        assert_eq!(term, Term::List(vec![Term::from("a"), Term::Int(2)]));
    }

    #[test]
    fn blank_terms() {
        assert!(Term::Null.is_blank());
        assert!(Term::from("").is_blank());
        assert!(Term::List(vec![]).is_blank());
        assert!(!Term::Bool(false).is_blank());
        assert!(!Term::Int(0).is_blank());
    }

    #[test]
    fn binds_int_as_narrower_column() {
        let mut out = BytesMut::new();
        Term::Int(10).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(&out[..], &10_i32.to_be_bytes());
    }

    #[test]
    fn int_overflow_is_bind_error() {
        let mut out = BytesMut::new();
        assert!(Term::Int(i64::MAX).to_sql(&Type::INT2, &mut out).is_err());
    }

    #[test]
    fn binds_numeric_text_as_int() {
        let mut out = BytesMut::new();
        Term::from("42").to_sql(&Type::INT8, &mut out).unwrap();
        assert_eq!(&out[..], &42_i64.to_be_bytes());
    }

    #[test]
    fn list_cannot_bind_directly() {
        let mut out = BytesMut::new();
        let list = Term::from(vec![1_i64, 2]);
        assert!(list.to_sql(&Type::INT8, &mut out).is_err());
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Term::from(" 7 ").as_i64(), Some(7));
        assert_eq!(Term::Int(3).as_i64(), Some(3));
        assert_eq!(Term::from("true").as_bool(), Some(true));
        assert_eq!(Term::Float(1.0).as_i64(), None);
    }
}
