//! Attachment request payloads and their normalization.
//!
//! The attach endpoint historically accepted several payload shapes: a
//! `cartridges` sequence (entries either full spec mappings or bare
//! identifier strings), a single `cartridge` mapping, a single bare
//! `cartridge` identifier (deprecated: the whole request is then the spec,
//! with `name` overridden), or the request body itself as one spec.
//! `AttachRequest::normalize` folds all of them into one ordered
//! `CartridgeSpec` sequence; attachment order is observable downstream, so
//! the output order always matches the input.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Variables the platform reserves for itself; callers cannot override them.
const RESERVED_ENV_PREFIX: &str = "GANTRY_";

#[derive(Error, Debug, PartialEq)]
pub enum SpecError {
    #[error("Error in parameters. Cannot determine cartridge. Use 'cartridge'/'name'/'url'")]
    Undetermined,

    #[error("cartridge specification {index} carries both 'name' and 'url'")]
    ConflictingSource { index: usize },

    #[error("cartridge specification {index} has an empty '{field}'")]
    EmptyField { index: usize, field: &'static str },

    #[error("cartridge specification {index} has an invalid url: {reason}")]
    InvalidUrl { index: usize, reason: String },

    #[error("Invalid environment variable name '{name}'")]
    InvalidEnvVar { name: String },

    #[error("Gear size '{size}' is not allowed on this domain")]
    DisallowedGearSize { size: String },
}

impl SpecError {
    /// The request field the rejection refers to, for field-scoped error
    /// reporting at the boundary.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            SpecError::Undetermined | SpecError::ConflictingSource { .. } => Some("cartridge"),
            SpecError::EmptyField { field, .. } => Some(*field),
            SpecError::InvalidUrl { .. } => Some("url"),
            SpecError::InvalidEnvVar { .. } => Some("environment_variables"),
            SpecError::DisallowedGearSize { .. } => Some("gear_size"),
        }
    }
}

/// One requested cartridge after normalization. A usable spec carries a
/// catalog `name` or a download `url`, never both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CartridgeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gear_size: Option<String>,
}

impl CartridgeSpec {
    pub fn named(name: impl Into<String>) -> Self {
        CartridgeSpec {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// A caller-supplied environment variable override, merged into the
/// application when the attachment succeeds.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A spec entry as submitted: either a full mapping or a bare identifier
/// promoted to `{name: identifier}`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SpecEntry {
    Name(String),
    Spec(CartridgeSpec),
}

impl SpecEntry {
    fn into_spec(self) -> CartridgeSpec {
        match self {
            SpecEntry::Name(name) => CartridgeSpec::named(name),
            SpecEntry::Spec(spec) => spec,
        }
    }
}

/// The attachment payload as submitted by callers.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AttachRequest {
    #[serde(default)]
    pub cartridges: Option<Vec<SpecEntry>>,
    #[serde(default)]
    pub cartridge: Option<SpecEntry>,
    #[serde(flatten)]
    pub inline: CartridgeSpec,
    #[serde(default)]
    pub environment_variables: Option<Vec<EnvVar>>,
}

impl AttachRequest {
    /// Fold the accepted payload shapes, in priority order, into one
    /// ordered spec sequence.
    pub fn normalize(self) -> Vec<CartridgeSpec> {
        if let Some(entries) = self.cartridges {
            return entries.into_iter().map(SpecEntry::into_spec).collect();
        }
        match self.cartridge {
            Some(SpecEntry::Spec(spec)) => vec![spec],
            // Deprecated form: the request itself is the spec, with `name`
            // overridden by the bare identifier.
            Some(SpecEntry::Name(name)) => vec![CartridgeSpec {
                name: Some(name),
                ..self.inline
            }],
            None => vec![self.inline],
        }
    }
}

/// Structural pre-check over a normalized spec sequence. Shape problems
/// are rejected here, before any side effect happens.
pub fn check_specs(specs: &[CartridgeSpec]) -> Result<(), SpecError> {
    for (index, spec) in specs.iter().enumerate() {
        if spec.name.is_some() && spec.url.is_some() {
            return Err(SpecError::ConflictingSource { index });
        }
        if let Some(name) = &spec.name
            && name.is_empty()
        {
            return Err(SpecError::EmptyField {
                index,
                field: "name",
            });
        }
        if let Some(url) = &spec.url {
            if url.is_empty() {
                return Err(SpecError::EmptyField { index, field: "url" });
            }
            Url::parse(url).map_err(|err| SpecError::InvalidUrl {
                index,
                reason: err.to_string(),
            })?;
        }
        if let Some(size) = &spec.gear_size
            && size.is_empty()
        {
            return Err(SpecError::EmptyField {
                index,
                field: "gear_size",
            });
        }
    }
    Ok(())
}

/// Every spec must settle on a source: a catalog `name` or a download
/// `url`.
pub fn check_determined(specs: &[CartridgeSpec]) -> Result<(), SpecError> {
    if specs.iter().all(|s| s.name.is_some() || s.url.is_some()) {
        Ok(())
    } else {
        Err(SpecError::Undetermined)
    }
}

/// Validate caller-supplied environment variable overrides: identifier
/// charset, and the platform prefix stays reserved.
pub fn check_env_vars(vars: &[EnvVar]) -> Result<(), SpecError> {
    for var in vars {
        let mut chars = var.name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = var.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_start || !valid_rest || var.name.starts_with(RESERVED_ENV_PREFIX) {
            return Err(SpecError::InvalidEnvVar {
                name: var.name.clone(),
            });
        }
    }
    Ok(())
}

/// Distinct gear sizes requested across `specs`, in first-seen order.
pub fn requested_gear_sizes(specs: &[CartridgeSpec]) -> Vec<&str> {
    let mut sizes: Vec<&str> = Vec::new();
    for spec in specs {
        if let Some(size) = spec.gear_size.as_deref()
            && !sizes.contains(&size)
        {
            sizes.push(size);
        }
    }
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> AttachRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_normalize_sequence_preserves_order_and_promotes_strings() {
        let request = parse(serde_json::json!({
            "cartridges": [{"name": "a"}, "b", {"url": "https://carts.example.com/c.yml"}]
        }));

        let specs = request.normalize();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0], CartridgeSpec::named("a"));
        assert_eq!(specs[1], CartridgeSpec::named("b"));
        assert_eq!(
            specs[2].url.as_deref(),
            Some("https://carts.example.com/c.yml")
        );
    }

    #[test]
    fn test_normalize_single_mapping() {
        let request = parse(serde_json::json!({
            "cartridge": {"name": "postgres-9.2", "gear_size": "small"}
        }));

        let specs = request.normalize();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name.as_deref(), Some("postgres-9.2"));
        assert_eq!(specs[0].gear_size.as_deref(), Some("small"));
    }

    #[test]
    fn test_normalize_deprecated_bare_identifier_overrides_inline_name() {
        // The deprecated shape: the whole request is one spec, with `name`
        // taken from the bare identifier and other fields from the body.
        let request = parse(serde_json::json!({
            "cartridge": "redis-2.6",
            "name": "ignored",
            "gear_size": "medium"
        }));

        let specs = request.normalize();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name.as_deref(), Some("redis-2.6"));
        assert_eq!(specs[0].gear_size.as_deref(), Some("medium"));
    }

    #[test]
    fn test_normalize_whole_request_as_spec() {
        let request = parse(serde_json::json!({
            "url": "https://carts.example.com/custom.yml",
            "gear_size": "small"
        }));

        let specs = request.normalize();
        assert_eq!(specs.len(), 1);
        assert_eq!(
            specs[0].url.as_deref(),
            Some("https://carts.example.com/custom.yml")
        );
    }

    #[test]
    fn test_sequence_takes_priority_over_single_forms() {
        let request = parse(serde_json::json!({
            "cartridges": ["a"],
            "cartridge": "b",
            "name": "c"
        }));

        let specs = request.normalize();
        assert_eq!(specs, vec![CartridgeSpec::named("a")]);
    }

    #[test]
    fn test_check_determined_rejects_sourceless_spec() {
        let specs = vec![
            CartridgeSpec::named("a"),
            CartridgeSpec {
                gear_size: Some("small".into()),
                ..Default::default()
            },
        ];
        assert_eq!(check_determined(&specs), Err(SpecError::Undetermined));

        let specs = vec![CartridgeSpec::named("a")];
        assert_eq!(check_determined(&specs), Ok(()));
    }

    #[test]
    fn test_check_specs_rejects_structural_problems() {
        let conflicting = vec![CartridgeSpec {
            name: Some("a".into()),
            url: Some("https://example.com/a.yml".into()),
            ..Default::default()
        }];
        assert_eq!(
            check_specs(&conflicting),
            Err(SpecError::ConflictingSource { index: 0 })
        );

        let empty_name = vec![CartridgeSpec {
            name: Some("".into()),
            ..Default::default()
        }];
        assert_eq!(
            check_specs(&empty_name),
            Err(SpecError::EmptyField {
                index: 0,
                field: "name"
            })
        );

        let bad_url = vec![CartridgeSpec {
            url: Some("not a url".into()),
            ..Default::default()
        }];
        assert!(matches!(
            check_specs(&bad_url),
            Err(SpecError::InvalidUrl { index: 0, .. })
        ));

        let fine = vec![
            CartridgeSpec::named("a"),
            CartridgeSpec {
                url: Some("https://example.com/b.yml".into()),
                gear_size: Some("small".into()),
                ..Default::default()
            },
        ];
        assert_eq!(check_specs(&fine), Ok(()));
    }

    #[test]
    fn test_check_env_vars() {
        let good = vec![
            EnvVar {
                name: "DATABASE_URL".into(),
                value: "postgres://db".into(),
            },
            EnvVar {
                name: "_private".into(),
                value: "1".into(),
            },
        ];
        assert_eq!(check_env_vars(&good), Ok(()));

        for name in ["2FAST", "WITH-DASH", "", "GANTRY_INTERNAL"] {
            let vars = vec![EnvVar {
                name: name.into(),
                value: "x".into(),
            }];
            assert_eq!(
                check_env_vars(&vars),
                Err(SpecError::InvalidEnvVar { name: name.into() }),
                "expected '{name}' to be rejected"
            );
        }
    }

    #[test]
    fn test_requested_gear_sizes_dedupes_in_order() {
        let specs = vec![
            CartridgeSpec {
                gear_size: Some("small".into()),
                ..CartridgeSpec::named("a")
            },
            CartridgeSpec::named("b"),
            CartridgeSpec {
                gear_size: Some("medium".into()),
                ..CartridgeSpec::named("c")
            },
            CartridgeSpec {
                gear_size: Some("small".into()),
                ..CartridgeSpec::named("d")
            },
        ];
        assert_eq!(requested_gear_sizes(&specs), vec!["small", "medium"]);
    }
}
