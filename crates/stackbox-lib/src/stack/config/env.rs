//! The application's `.env` file.

use super::params::ParameterSet;
use std::collections::BTreeMap;

pub fn render_env(params: &ParameterSet) -> String {
    let entries: [(&str, String); 18] = [
        ("APP_NAME", params.app_name.clone()),
        ("APP_ENV", "local".into()),
        ("APP_KEY", params.app_secret.clone()),
        ("APP_DEBUG", "true".into()),
        ("APP_URL", params.app_url()),
        ("", String::new()),
        ("LOG_CHANNEL", "stack".into()),
        ("LOG_LEVEL", "debug".into()),
        ("", String::new()),
        ("DB_CONNECTION", "mysql".into()),
        ("DB_HOST", "127.0.0.1".into()),
        ("DB_PORT", params.db_port.to_string()),
        ("DB_DATABASE", params.db_name.clone()),
        ("DB_USERNAME", params.db_user.clone()),
        ("DB_PASSWORD", params.db_password.clone()),
        ("", String::new()),
        ("SESSION_DRIVER", "file".into()),
        ("CACHE_STORE", "file".into()),
    ];

    let mut out = String::new();
    for (key, value) in entries {
        if key.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&format!("{key}={}\n", quote_value(&value)));
        }
    }
    out
}

/// Single quotes keep dotenv from interpolating `$` or treating `#` as a
/// comment. Values never contain quotes.
fn quote_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '$' | '=' | '"' | '\''));
    if needs_quotes {
        format!("'{value}'")
    } else {
        value.to_string()
    }
}

/// Parse `.env` text: `KEY=value` lines, `#` comments, blank lines, optional
/// `export ` prefix, values optionally wrapped in single or double quotes.
/// Unquoted values end at ` #`.
pub fn parse_env(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.trim_start_matches('\u{feff}').lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        let value = if let Some(inner) = quoted(raw, '"').or_else(|| quoted(raw, '\'')) {
            inner
        } else {
            raw.split(" #").next().unwrap_or(raw).trim()
        };
        vars.insert(key.trim().to_string(), value.to_string());
    }
    vars
}

fn quoted(raw: &str, quote: char) -> Option<&str> {
    let rest = raw.strip_prefix(quote)?;
    let end = rest.find(quote)?;
    Some(&rest[..end])
}
