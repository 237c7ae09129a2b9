//! Identifier validation and quoting.

use crate::{RelationalError, Result};
use unicode_normalization::UnicodeNormalization;

/// Quotes a SQL identifier.
///
/// Handles schema-qualified names by quoting each part separately.
pub fn quote_identifier(name: &str) -> String {
    if name.contains('.') {
        name.split('.')
            .map(|part| format!("\"{}\"", part))
            .collect::<Vec<_>>()
            .join(".")
    } else {
        format!("\"{}\"", name)
    }
}

/// Validates a SQL identifier (table/column name).
///
/// Supports both simple identifiers and schema-qualified names (e.g., "public.users").
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RelationalError::Query("Identifier cannot be empty".to_string()));
    }

    if name.contains('.') {
        let parts: Vec<&str> = name.split('.').collect();

        if parts.len() != 2 {
            return Err(RelationalError::Query(format!(
                "Invalid schema-qualified identifier '{}': must be in format 'schema.table'",
                name
            )));
        }

        for part in parts {
            validate_identifier_part(part)?;
        }

        return Ok(());
    }

    validate_identifier_part(name)
}

/// Validates a single part of an identifier (no dots allowed).
pub fn validate_identifier_part(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RelationalError::Query("Identifier part cannot be empty".to_string()));
    }

    // Normalize to NFKC to prevent Unicode confusables
    let name = name.nfkc().collect::<String>();

    // PostgreSQL limit is 63 bytes per part
    if name.len() > 63 {
        return Err(RelationalError::Query(format!(
            "Identifier '{}' exceeds maximum length of 63",
            name
        )));
    }

    let first_char = name.chars().next().ok_or_else(|| {
        RelationalError::Query(format!("Identifier '{}' is empty or invalid", name))
    })?;
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(RelationalError::Query(format!(
            "Identifier '{}' must start with a letter or underscore",
            name
        )));
    }

    if let Some(ch) = name.chars().find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_') {
        return Err(RelationalError::Query(format!(
            "Identifier '{}' contains invalid character '{}'",
            name, ch
        )));
    }

    let name_lower = name.to_lowercase();
    if name_lower.starts_with("pg_") {
        return Err(RelationalError::Query(format!(
            "Access to PostgreSQL system catalog '{}' is not allowed",
            name
        )));
    }

    if name_lower == "information_schema" {
        return Err(RelationalError::Query(
            "Access to information_schema is not allowed".to_string(),
        ));
    }

    const SQL_KEYWORDS: &[&str] = &[
        "select", "insert", "update", "delete", "drop", "create", "alter",
        "truncate", "grant", "revoke", "exec", "execute", "union", "declare",
        "table", "index", "view", "schema", "database", "user", "role",
        "from", "where", "join", "inner", "outer", "left", "right",
        "on", "using", "and", "or", "not", "in", "exists", "between",
        "like", "ilike", "is", "null", "true", "false", "case", "when",
        "then", "else", "end", "as", "order", "by", "group", "having",
        "limit", "offset", "distinct", "all", "any", "some",
    ];

    if SQL_KEYWORDS.contains(&name_lower.as_str()) {
        return Err(RelationalError::Query(format!(
            "Identifier '{}' is a reserved SQL keyword",
            name
        )));
    }

    Ok(())
}

/// Matches `text` against a SQL LIKE pattern (`%` any run, `_` one char).
///
/// Used by stores that evaluate filters in process.
pub fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (text, pattern): (Vec<char>, Vec<char>) = if case_insensitive {
        (
            text.to_lowercase().chars().collect(),
            pattern.to_lowercase().chars().collect(),
        )
    } else {
        (text.chars().collect(), pattern.chars().collect())
    };

    // Greedy wildcard matching with backtracking to the last `%`.
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|ch| *ch == '%')
}
