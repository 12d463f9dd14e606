use crate::spec::SpecError;
use serde::Deserialize;

/// Gear sizes the owning domain permits. Deployments configure the
/// allow-list; there is no hardcoded set of sizes.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GearSizePolicy {
    pub allowed: Vec<String>,
}

impl GearSizePolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GearSizePolicy {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn permits(&self, size: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == size)
    }

    /// Check every distinct requested size against the allow-list. The
    /// first disallowed size is reported, naming the `gear_size` field.
    pub fn check<'a, I>(&self, sizes: I) -> Result<(), SpecError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for size in sizes {
            if !self.permits(size) {
                return Err(SpecError::DisallowedGearSize { size: size.into() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_against_allow_list() {
        let policy = GearSizePolicy::new(["small", "medium"]);

        assert_eq!(policy.check(["small"]), Ok(()));
        assert_eq!(policy.check(["small", "medium"]), Ok(()));
        assert_eq!(policy.check([]), Ok(()));
        assert_eq!(
            policy.check(["large"]),
            Err(SpecError::DisallowedGearSize {
                size: "large".into()
            })
        );
    }

    #[test]
    fn test_parse_from_yaml() {
        let policy: GearSizePolicy = serde_yaml::from_str("allowed: [small, medium]").unwrap();
        assert!(policy.permits("medium"));
        assert!(!policy.permits("large"));
    }
}
