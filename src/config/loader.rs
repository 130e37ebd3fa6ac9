//! Configuration loading from disk and from flat property entries.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{ConfigurationSnapshot, HandlerSpec, LoggerDirective, LoggingFile};
use crate::config::validation::{validate_snapshot, ValidationError};
use crate::level::{Level, LevelTable};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid level {value:?} for {key}")]
    InvalidLevel { key: String, value: String },

    #[error("Malformed entry {key}: {reason}")]
    MalformedEntry { key: String, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path, levels: &LevelTable) -> Result<ConfigurationSnapshot, ConfigError> {
    let content = fs::read_to_string(path)?;
    let file: LoggingFile = toml::from_str(&content)?;
    let snapshot = file_to_snapshot(&file, levels)?;

    validate_snapshot(&snapshot).map_err(ConfigError::Validation)?;

    Ok(snapshot)
}

/// Convert a deserialized TOML document into a snapshot.
pub fn file_to_snapshot(file: &LoggingFile, levels: &LevelTable) -> Result<ConfigurationSnapshot, ConfigError> {
    let mut loggers = BTreeMap::new();

    let root = LoggerDirective {
        level: file
            .root
            .level
            .as_deref()
            .map(|v| parse_level(levels, ".level", v))
            .transpose()?,
        handlers: file.root.handlers.clone(),
        use_parent_handlers: None,
    };
    if !root.is_empty() {
        loggers.insert(String::new(), root);
    }

    for (name, cfg) in &file.loggers {
        let directive = LoggerDirective {
            level: cfg
                .level
                .as_deref()
                .map(|v| parse_level(levels, &format!("{name}.level"), v))
                .transpose()?,
            handlers: cfg.handlers.clone(),
            use_parent_handlers: cfg.use_parent_handlers,
        };
        loggers.insert(name.clone(), directive);
    }

    let mut snapshot = ConfigurationSnapshot::new();
    for (name, directive) in loggers {
        if let Some(level) = directive.level {
            snapshot = snapshot.with_level(name.clone(), level);
        }
        if let Some(ids) = directive.handlers {
            snapshot = snapshot.with_handlers(name.clone(), ids);
        }
        if let Some(flag) = directive.use_parent_handlers {
            snapshot = snapshot.with_use_parent_handlers(name, flag);
        }
    }

    for (id, cfg) in &file.handlers {
        let mut spec = HandlerSpec::new(cfg.kind.clone());
        if let Some(level) = &cfg.level {
            spec.level = Some(parse_level(levels, &format!("handler.{id}.level"), level)?);
        }
        for (key, value) in &cfg.options {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            spec.options.insert(key.clone(), value);
        }
        snapshot = snapshot.with_handler(id.clone(), spec);
    }

    Ok(snapshot)
}

/// Parse flat `key = value` entries.
///
/// Recognized keys:
/// - `handlers` and `.level` for the root logger
/// - `<logger>.level`, `<logger>.handlers`, `<logger>.useParentHandlers`
/// - `handler.<id>.kind`, `handler.<id>.level`, `handler.<id>.<option>`
///
/// The `handler.` prefix is reserved for handler definitions. Any other key
/// is ignored. The result is validated like a loaded file.
pub fn parse_properties<'a, I>(entries: I, levels: &LevelTable) -> Result<ConfigurationSnapshot, ConfigError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut snapshot = ConfigurationSnapshot::new();
    let mut handler_defs: BTreeMap<String, (Option<String>, Option<Level>, BTreeMap<String, String>)> =
        BTreeMap::new();

    for (key, value) in entries {
        let key = key.trim();
        let value = value.trim();

        if let Some(rest) = key.strip_prefix("handler.") {
            let (id, option) = rest.split_once('.').ok_or_else(|| ConfigError::MalformedEntry {
                key: key.to_string(),
                reason: "expected handler.<id>.<option>".to_string(),
            })?;
            if id.is_empty() || option.is_empty() {
                return Err(ConfigError::MalformedEntry {
                    key: key.to_string(),
                    reason: "empty handler id or option".to_string(),
                });
            }
            let def = handler_defs.entry(id.to_string()).or_default();
            match option {
                "kind" => def.0 = Some(value.to_string()),
                "level" => def.1 = Some(parse_level(levels, key, value)?),
                _ => {
                    def.2.insert(option.to_string(), value.to_string());
                }
            }
            continue;
        }

        if key == "handlers" {
            snapshot = snapshot.with_handlers("", split_list(value));
            continue;
        }

        if let Some(name) = key.strip_suffix(".level") {
            snapshot = snapshot.with_level(name, parse_level(levels, key, value)?);
        } else if let Some(name) = key.strip_suffix(".handlers") {
            snapshot = snapshot.with_handlers(name, split_list(value));
        } else if let Some(name) = key.strip_suffix(".useParentHandlers") {
            snapshot = snapshot.with_use_parent_handlers(name, parse_bool(key, value)?);
        } else {
            tracing::debug!(key = %key, "Ignoring unrecognized configuration property");
        }
    }

    for (id, (kind, level, options)) in handler_defs {
        let kind = kind.ok_or_else(|| ConfigError::MalformedEntry {
            key: format!("handler.{id}.kind"),
            reason: "missing handler kind".to_string(),
        })?;
        let mut spec = HandlerSpec::new(kind);
        spec.level = level;
        spec.options = options;
        snapshot = snapshot.with_handler(id, spec);
    }

    validate_snapshot(&snapshot).map_err(ConfigError::Validation)?;

    Ok(snapshot)
}

/// Parse `key = value` lines; `#` and `!` start comment lines.
pub fn parse_properties_str(text: &str, levels: &LevelTable) -> Result<ConfigurationSnapshot, ConfigError> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .or_else(|| line.split_once(':'))
            .ok_or_else(|| ConfigError::MalformedEntry {
                key: line.to_string(),
                reason: "expected key = value".to_string(),
            })?;
        entries.push((key, value));
    }
    parse_properties(entries, levels)
}

fn parse_level(levels: &LevelTable, key: &str, value: &str) -> Result<Level, ConfigError> {
    levels.find(value).ok_or_else(|| ConfigError::InvalidLevel {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::MalformedEntry {
            key: key.to_string(),
            reason: format!("expected a boolean, got {value:?}"),
        }),
    }
}

/// Handler ids separated by commas and/or whitespace.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_properties() {
        let levels = LevelTable::standard();
        let snap = parse_properties(
            [
                ("handlers", "console, mem"),
                (".level", "INFO"),
                ("a.b.level", "FINE"),
                ("a.b.useParentHandlers", "false"),
                ("a.handlers", "mem"),
                ("handler.console.kind", "console"),
                ("handler.mem.kind", "memory"),
                ("handler.mem.level", "WARNING"),
                ("handler.mem.capacity", "8"),
                ("unrelated.property", "x"),
            ],
            &levels,
        )
        .unwrap();

        let root = snap.directive("").unwrap();
        assert_eq!(root.level, Some(Level::INFO));
        assert_eq!(root.handlers, Some(vec!["console".to_string(), "mem".to_string()]));

        let ab = snap.directive("a.b").unwrap();
        assert_eq!(ab.level, Some(Level::FINE));
        assert_eq!(ab.use_parent_handlers, Some(false));

        let mem = snap.handler("mem").unwrap();
        assert_eq!(mem.kind, "memory");
        assert_eq!(mem.level, Some(Level::WARNING));
        assert_eq!(mem.options.get("capacity").map(String::as_str), Some("8"));
        assert!(snap.directive("unrelated").is_none());
    }

    #[test]
    fn test_invalid_level() {
        let levels = LevelTable::standard();
        let err = parse_properties([("a.level", "LOUD")], &levels).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLevel { ref key, ref value } if key == "a.level" && value == "LOUD"));
    }

    #[test]
    fn test_malformed_entries() {
        let levels = LevelTable::standard();
        assert!(matches!(
            parse_properties([("a.useParentHandlers", "maybe")], &levels),
            Err(ConfigError::MalformedEntry { .. })
        ));
        assert!(matches!(
            parse_properties([("handler.onlyid", "x")], &levels),
            Err(ConfigError::MalformedEntry { .. })
        ));
        assert!(matches!(
            parse_properties([("handler.h.level", "INFO")], &levels),
            Err(ConfigError::MalformedEntry { ref key, .. }) if key == "handler.h.kind"
        ));
        assert!(matches!(
            parse_properties_str("no separator here", &levels),
            Err(ConfigError::MalformedEntry { .. })
        ));
    }

    #[test]
    fn test_properties_are_validated() {
        let levels = LevelTable::standard();
        let err = parse_properties([("a..b.level", "FINE"), ("x.handlers", "nope")], &levels).unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.contains(&ValidationError::MalformedLoggerName("a..b".to_string())));
                assert!(errors.contains(&ValidationError::UndefinedHandler {
                    logger: "x".to_string(),
                    handler: "nope".to_string(),
                }));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            parse_properties_str(".level = INFO\nhandler.h.kind = \n", &levels),
            Err(ConfigError::Validation(ref errors)) if errors == &[ValidationError::EmptyHandlerKind("h".to_string())]
        ));
    }

    #[test]
    fn test_parse_properties_str() {
        let levels = LevelTable::standard();
        let text = "# comment\n! also comment\n\na.level = SEVERE\nb.level: 500\n";
        let snap = parse_properties_str(text, &levels).unwrap();
        assert_eq!(snap.directive("a").unwrap().level, Some(Level::SEVERE));
        assert_eq!(snap.directive("b").unwrap().level, Some(Level::FINE));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[root]
level = "WARNING"
handlers = ["buf"]

[loggers."x.y"]
level = "FINEST"
handlers = ["buf"]

[handlers.buf]
kind = "memory"
capacity = 4
"#
        )
        .unwrap();

        let snap = load_config(file.path(), &LevelTable::standard()).unwrap();
        assert_eq!(snap.directive("").unwrap().level, Some(Level::WARNING));
        assert_eq!(snap.directive("x.y").unwrap().level, Some(Level::FINEST));
        assert_eq!(snap.handler("buf").unwrap().options["capacity"], "4");
    }

    #[test]
    fn test_load_config_validation_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[root]\nhandlers = [\"nowhere\"]\n").unwrap();
        let err = load_config(file.path(), &LevelTable::standard()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
    }

    #[test]
    fn test_load_config_bad_level() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[loggers.a]\nlevel = \"CHATTY\"\n").unwrap();
        let err = load_config(file.path(), &LevelTable::standard()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLevel { .. }));
    }
}
