// SQL generation for recreating the platform database
//
// A full-bundle restore drops the platform database and creates it empty before the
// restore script loads the dump. Identifiers are double-quoted; values are bound.

use regex::Regex;
use std::sync::OnceLock;

fn db_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static db name regex is valid"))
}

/// Validate database name (letters, numbers, underscore only; 1-63 chars)
pub fn validate_db_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Database name is required.".to_string());
    }
    if name.len() > 63 {
        return Err("Database name must be 63 characters or fewer.".to_string());
    }
    if !db_name_re().is_match(name) {
        return Err(
            "Database name must start with a letter or underscore and contain only letters, numbers, and underscores.".to_string(),
        );
    }
    // Never drop the maintenance databases we connect through.
    let reserved = ["postgres", "template0", "template1"];
    if reserved.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(format!("'{}' is a reserved database name.", name));
    }
    Ok(())
}

/// Double-quote a PostgreSQL identifier
pub fn pg_quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate CREATE DATABASE statement for PostgreSQL
pub fn postgres_create_db_stmt(db_name: &str, owner: Option<&str>) -> String {
    match owner.map(str::trim).filter(|o| !o.is_empty()) {
        Some(o) => format!(
            "CREATE DATABASE {} OWNER {};",
            pg_quote_ident(db_name),
            pg_quote_ident(o)
        ),
        None => format!("CREATE DATABASE {};", pg_quote_ident(db_name)),
    }
}

pub fn postgres_drop_db_stmt(db_name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {};", pg_quote_ident(db_name))
}

/// Disconnect every other session from the database; `$1` is the database name.
pub fn postgres_terminate_sessions_query() -> &'static str {
    "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1 AND pid <> pg_backend_pid()"
}
