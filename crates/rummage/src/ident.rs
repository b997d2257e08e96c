//! Safe SQL identifier handling.
//!
//! Every table, column, key and relation name that reaches rendered SQL goes
//! through [`Ident`]. Field names arrive from request parameters, so they are
//! validated here instead of being spliced into SQL as-is.
//!
//! - Unquoted names are validated against: `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted names (`"CamelCase"`) allow any characters except NUL and escape `"` as `""`
//!
//! Dotted names are rejected: the table alias is always supplied by the query.

use crate::error::{RummageError, RummageResult};
use std::fmt;

/// A single SQL identifier (table, column or key name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ident {
    /// Unquoted identifier: must match `[A-Za-z_][A-Za-z0-9_$]*`.
    Unquoted(String),
    /// Quoted identifier: allows any characters except NUL.
    Quoted(String),
}

impl Ident {
    /// Parse a single identifier, either bare or wrapped in double quotes.
    pub fn parse(s: &str) -> RummageResult<Self> {
        if s.is_empty() {
            return Err(RummageError::validation("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(RummageError::validation(
                "Identifier cannot contain NUL character",
            ));
        }

        if let Some(rest) = s.strip_prefix('"') {
            return Self::parse_quoted(rest);
        }

        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
            _ => {
                return Err(RummageError::validation(format!(
                    "Invalid identifier start in `{s}`"
                )));
            }
        }
        if let Some(c) = chars.find(|c| !(*c == '_' || *c == '$' || c.is_ascii_alphanumeric())) {
            return Err(RummageError::validation(format!(
                "Invalid character in identifier `{s}`: '{c}'"
            )));
        }
        Ok(Ident::Unquoted(s.to_string()))
    }

    fn parse_quoted(rest: &str) -> RummageResult<Self> {
        let mut name = String::new();
        let mut chars = rest.chars().peekable();
        loop {
            match chars.next() {
                Some('"') => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        name.push('"');
                    } else {
                        break;
                    }
                }
                Some(c) => name.push(c),
                None => return Err(RummageError::validation("Unclosed quoted identifier")),
            }
        }
        if chars.next().is_some() {
            return Err(RummageError::validation(
                "Unexpected characters after quoted identifier",
            ));
        }
        if name.is_empty() {
            return Err(RummageError::validation("Empty quoted identifier"));
        }
        Ok(Ident::Quoted(name))
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        match self {
            Ident::Unquoted(s) => out.push_str(s),
            Ident::Quoted(s) => {
                out.push('"');
                for ch in s.chars() {
                    if ch == '"' {
                        out.push_str("\"\"");
                    } else {
                        out.push(ch);
                    }
                }
                out.push('"');
            }
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Render `alias.column` after validating the column name.
pub(crate) fn qualified(alias: &str, column: &str) -> RummageResult<String> {
    let ident = Ident::parse(column)?;
    let mut out = String::with_capacity(alias.len() + column.len() + 1);
    out.push_str(alias);
    out.push('.');
    ident.write_sql(&mut out);
    Ok(out)
}
