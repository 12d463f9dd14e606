use cartridge::resolver::ResolveError;
use cartridge::spec::SpecError;
use thiserror::Error;

/// Errors surfaced by the cartridge lifecycle operations. Variants map
/// onto the response classes the presentation layer knows how to encode:
/// validation, conflict, quota, not-found, forbidden.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum LifecycleError {
    /// Client-correctable problem, optionally scoped to a request field.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// The application is being upgraded and rejects this operation.
    #[error("Application is being upgraded; please try again later")]
    UpgradeInProgress,

    /// The gear quota would be exceeded.
    #[error("Unable to add cartridge: {0}")]
    GearLimitReached(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("not authorized to {0}")]
    Forbidden(&'static str),
}

impl LifecycleError {
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        LifecycleError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LifecycleError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// A field-scoped error may name `cartridge`, which is ambiguous when
    /// the request carried several specs; generalize it before surfacing.
    pub fn generalize_cartridge_field(self) -> Self {
        match self {
            LifecycleError::Validation { message, field } if field.as_deref() == Some("cartridge") => {
                LifecycleError::Validation {
                    message,
                    field: None,
                }
            }
            other => other,
        }
    }
}

impl From<SpecError> for LifecycleError {
    fn from(err: SpecError) -> Self {
        let field = err.field();
        LifecycleError::validation(err.to_string(), field)
    }
}

impl From<ResolveError> for LifecycleError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UnknownCartridge(name) => LifecycleError::not_found("cartridge", name),
            other => LifecycleError::validation(other.to_string(), Some("url")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generalize_cartridge_field() {
        let err = LifecycleError::validation("duplicate cartridge", Some("cartridge"));
        assert_eq!(
            err.generalize_cartridge_field(),
            LifecycleError::validation("duplicate cartridge", None)
        );

        // Other fields pass through untouched.
        let err = LifecycleError::validation("bad factor", Some("scales_to"));
        assert_eq!(err.clone(), err.generalize_cartridge_field());
    }

    #[test]
    fn test_spec_errors_become_field_scoped_validation() {
        let err: LifecycleError = SpecError::Undetermined.into();
        assert!(matches!(
            err,
            LifecycleError::Validation { ref field, .. } if field.as_deref() == Some("cartridge")
        ));

        let err: LifecycleError = SpecError::DisallowedGearSize {
            size: "huge".into(),
        }
        .into();
        assert!(matches!(
            err,
            LifecycleError::Validation { ref field, .. } if field.as_deref() == Some("gear_size")
        ));
    }

    #[test]
    fn test_unknown_cartridge_maps_to_not_found() {
        let err: LifecycleError = ResolveError::UnknownCartridge("mongodb".into()).into();
        assert_eq!(err, LifecycleError::not_found("cartridge", "mongodb"));
    }
}
