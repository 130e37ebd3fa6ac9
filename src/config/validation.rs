//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde and the property parser handle syntax)
//! - Check referential integrity (loggers reference defined handlers)
//! - Reject malformed logger names and empty handler kinds
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ConfigurationSnapshot → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::ConfigurationSnapshot;
use crate::logger::validate_name;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("logger {logger:?} references undefined handler {handler:?}")]
    UndefinedHandler { logger: String, handler: String },

    #[error("malformed logger name {0:?}")]
    MalformedLoggerName(String),

    #[error("handler {0:?} has an empty kind")]
    EmptyHandlerKind(String),
}

/// Check a snapshot, collecting every problem found.
pub fn validate_snapshot(snapshot: &ConfigurationSnapshot) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, directive) in snapshot.directives() {
        if validate_name(name).is_err() {
            errors.push(ValidationError::MalformedLoggerName(name.to_string()));
        }
        for id in directive.handlers.iter().flatten() {
            if snapshot.handler(id).is_none() {
                errors.push(ValidationError::UndefinedHandler {
                    logger: name.to_string(),
                    handler: id.clone(),
                });
            }
        }
    }

    for (id, spec) in snapshot.handler_specs() {
        if spec.kind.trim().is_empty() {
            errors.push(ValidationError::EmptyHandlerKind(id.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::HandlerSpec;
    use crate::level::Level;

    #[test]
    fn test_valid_snapshot() {
        assert!(validate_snapshot(&ConfigurationSnapshot::standard()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let snap = ConfigurationSnapshot::new()
            .with_handlers("a", ["missing"])
            .with_level("bad..name", Level::INFO)
            .with_handler("blank", HandlerSpec::new(" "));
        let errors = validate_snapshot(&snap).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::UndefinedHandler {
            logger: "a".into(),
            handler: "missing".into(),
        }));
        assert!(errors.contains(&ValidationError::MalformedLoggerName("bad..name".into())));
        assert!(errors.contains(&ValidationError::EmptyHandlerKind("blank".into())));
    }
}
