use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use helixbook_core::config::{AppConfig, LoadOptions, ENV_PREFIX};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, file_doc.as_ref(), file_path.as_deref())
    };

    let auth_token = config
        .api
        .auth_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let lines = [
        "effective config (source precedence: env > file > default):".to_string(),
        render_line("api.base_url", &config.api.base_url, source("api.base_url", &["API_BASE_URL"])),
        render_line(
            "api.timeout_secs",
            &config.api.timeout_secs.to_string(),
            source("api.timeout_secs", &["API_TIMEOUT_SECS"]),
        ),
        render_line("api.auth_token", &auth_token, source("api.auth_token", &["API_AUTH_TOKEN"])),
        render_line("storage.url", &config.storage.url, source("storage.url", &["STORAGE_URL"])),
        render_line(
            "storage.max_connections",
            &config.storage.max_connections.to_string(),
            source("storage.max_connections", &["STORAGE_MAX_CONNECTIONS"]),
        ),
        render_line(
            "storage.timeout_secs",
            &config.storage.timeout_secs.to_string(),
            source("storage.timeout_secs", &["STORAGE_TIMEOUT_SECS"]),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", &["LOGGING_LEVEL", "LOG_LEVEL"]),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", &["LOGGING_FORMAT", "LOG_FORMAT"]),
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["helixbook.toml", "config/helixbook.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_suffixes: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for suffix in env_suffixes {
        let env_key = format!("{ENV_PREFIX}{suffix}");
        if env::var_os(&env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps at most the first four characters of a bearer token.
pub fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::redact_token;

    #[test]
    fn tokens_never_render_in_full() {
        assert_eq!(redact_token("   "), "<empty>");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("eyJhbGciOiJIUzI1NiJ9.payload"), "eyJh***");
    }
}
