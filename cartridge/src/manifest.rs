use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("could not parse cartridge manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("cartridge manifest is missing a usable '{0}'")]
    MissingField(&'static str),
}

/// The manifest document describing a downloadable cartridge. Fetched from
/// the spec's url and parsed before the cartridge is provisioned.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_yaml::from_str(text)?;
        if manifest.name.trim().is_empty() {
            return Err(ManifestError::MissingField("name"));
        }
        if manifest.version.trim().is_empty() {
            return Err(ManifestError::MissingField("version"));
        }
        Ok(manifest)
    }

    /// The name a downloaded cartridge is known by everywhere downstream:
    /// the download map, the component instance, and the response views.
    /// Versioned so two versions of the same cartridge never collide.
    pub fn versioned_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Plugin cartridges ride along with an existing group rather than
    /// getting gears of their own.
    pub fn sparse(&self) -> bool {
        self.categories.iter().any(|c| c == "plugin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let yaml = r#"
name: kickstand
version: "0.3"
display_name: Kickstand
categories:
    - service
"#;
        let manifest = Manifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.name, "kickstand");
        assert_eq!(manifest.versioned_name(), "kickstand-0.3");
        assert!(!manifest.sparse());
    }

    #[test]
    fn test_plugin_category_marks_sparse() {
        let manifest = Manifest::from_yaml("name: sidecar\nversion: '1.0'\ncategories: [plugin]")
            .unwrap();
        assert!(manifest.sparse());
    }

    #[test]
    fn test_rejects_blank_fields() {
        assert!(matches!(
            Manifest::from_yaml("name: ''\nversion: '1.0'"),
            Err(ManifestError::MissingField("name"))
        ));
        assert!(matches!(
            Manifest::from_yaml("name: x\nversion: '  '"),
            Err(ManifestError::MissingField("version"))
        ));
        assert!(matches!(
            Manifest::from_yaml("version: ["),
            Err(ManifestError::Parse(_))
        ));
    }
}
