use tracing::debug;

use crate::params::ParamMap;
use crate::session::{ResolvedBatch, ResolvedStatement};
use crate::types::RowValues;

/// Target placeholder style for bound statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
    /// MySQL-style anonymous `?`, one value per occurrence.
    MySql,
    /// SQL Server-style placeholders like `@P1`.
    Mssql,
}

/// SQL with driver-native placeholders and the values to bind, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<RowValues>,
}

/// One SQL text shared by several ordered parameter lists.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundBatch {
    pub sql: String,
    pub param_sets: Vec<Vec<RowValues>>,
}

impl BoundStatement {
    /// Rewrite `@name` references in `sql` for `style` and collect their values.
    ///
    /// A referenced name missing from `params` is bound as NULL.
    #[must_use]
    pub fn new(sql: &str, style: PlaceholderStyle, params: &ParamMap) -> Self {
        let (sql, names) = rewrite_placeholders(sql, style);
        let params = values_for(&names, params);
        Self { sql, params }
    }

    /// Bind a resolved statement using its dialect's placeholder style.
    #[must_use]
    pub fn from_resolved(statement: &ResolvedStatement) -> Self {
        Self::new(
            &statement.sql,
            statement.dialect.placeholder_style(),
            &statement.bind_params,
        )
    }

    /// Split a multi-statement resolution into separately bound statements.
    #[must_use]
    pub fn split_resolved(statement: &ResolvedStatement) -> Vec<Self> {
        let style = statement.dialect.placeholder_style();
        split_statements(&statement.sql)
            .into_iter()
            .map(|part| Self::new(part, style, &statement.bind_params))
            .collect()
    }
}

impl BoundBatch {
    #[must_use]
    pub fn from_resolved(batch: &ResolvedBatch) -> Self {
        let style = batch.statement.dialect.placeholder_style();
        let (sql, names) = rewrite_placeholders(&batch.statement.sql, style);
        let param_sets = batch
            .param_sets
            .iter()
            .map(|params| values_for(&names, params))
            .collect();
        Self { sql, param_sets }
    }
}

fn values_for(names: &[String], params: &ParamMap) -> Vec<RowValues> {
    names
        .iter()
        .map(|name| match params.get(name) {
            Some(value) => value.clone(),
            None => {
                debug!(param = %name, "unbound parameter reference; binding NULL");
                RowValues::Null
            }
        })
        .collect()
}

/// Replace `@name` references outside literals and comments with `style` placeholders.
///
/// Returns the rewritten SQL and the parameter name for each bind position.
#[must_use]
pub fn rewrite_placeholders(sql: &str, style: PlaceholderStyle) -> (String, Vec<String>) {
    let mask = code_mask(sql);
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut cursor = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        if mask[idx] && bytes[idx] == b'@' && starts_reference(bytes, idx) {
            let end = scan_identifier(bytes, idx + 1);
            let name = &sql[idx + 1..end];
            out.push_str(&sql[cursor..idx]);

            let position = match style {
                PlaceholderStyle::MySql => {
                    names.push(name.to_string());
                    names.len()
                }
                _ => match names.iter().position(|n| n == name) {
                    Some(existing) => existing + 1,
                    None => {
                        names.push(name.to_string());
                        names.len()
                    }
                },
            };
            match style {
                PlaceholderStyle::Postgres => out.push_str(&format!("${position}")),
                PlaceholderStyle::Sqlite => out.push_str(&format!("?{position}")),
                PlaceholderStyle::MySql => out.push('?'),
                PlaceholderStyle::Mssql => out.push_str(&format!("@P{position}")),
            }

            cursor = end;
            idx = end;
            continue;
        }
        idx += 1;
    }

    out.push_str(&sql[cursor..]);
    (out, names)
}

/// Split `sql` at top-level `;`, skipping empty statements.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<&str> {
    let mask = code_mask(sql);
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, b) in sql.bytes().enumerate() {
        if b == b';' && mask[idx] {
            parts.push(&sql[start..idx]);
            start = idx + 1;
        }
    }
    parts.push(&sql[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn starts_reference(bytes: &[u8], idx: usize) -> bool {
    let prev_ok = idx == 0 || {
        let p = bytes[idx - 1];
        !(p == b'@' || p.is_ascii_alphanumeric() || p == b'_')
    };
    let next_ok = bytes
        .get(idx + 1)
        .is_some_and(|n| n.is_ascii_alphabetic() || *n == b'_');
    prev_ok && next_ok
}

fn scan_identifier(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    idx
}

// true for bytes that are SQL code, false inside quotes, comments and dollar-quoted bodies
fn code_mask(sql: &str) -> Vec<bool> {
    let bytes = sql.as_bytes();
    let mut mask = vec![false; bytes.len()];
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    } else {
                        mask[idx] = true;
                    }
                }
                _ => mask[idx] = true,
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    if depth == 1 {
                        state = State::Normal;
                    } else {
                        state = State::BlockComment(depth - 1);
                    }
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    let skip = tag.len() + 1;
                    state = State::Normal;
                    idx += skip;
                }
            }
        }
        idx += 1;
    }

    mask
}

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }

    if idx < bytes.len() && bytes[idx] == b'$' {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len() && &bytes[idx + 1..end] == tag.as_bytes() && bytes[end] == b'$'
}
