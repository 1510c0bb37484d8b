//! DSL version declarators.
//!
//! Blueprints open with a `definitions_version` declarator such as
//! `keystone_dsl_1_0`. All documents merged into one compilation pass must
//! agree on the declared version.

use crate::error::{CompileError, CompileResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every valid version declarator
pub const DSL_VERSION_PREFIX: &str = "keystone_dsl_";

/// Parsed DSL version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DslVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
}

impl DslVersion {
    /// Create a new version
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse a declarator such as `keystone_dsl_1_0`
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::InvalidVersion`] if the declarator does not
    /// have the `keystone_dsl_<major>_<minor>` form.
    pub fn parse(s: &str) -> CompileResult<Self> {
        let invalid = || CompileError::InvalidVersion {
            value: s.to_string(),
        };

        let rest = s.strip_prefix(DSL_VERSION_PREFIX).ok_or_else(invalid)?;
        let mut parts = rest.split('_');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self { major, minor })
    }

    /// Get as a pair
    #[must_use]
    pub const fn as_tuple(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

impl fmt::Display for DslVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}_{}", DSL_VERSION_PREFIX, self.major, self.minor)
    }
}

impl FromStr for DslVersion {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let v = DslVersion::parse("keystone_dsl_1_0").unwrap();
        assert_eq!(v, DslVersion::new(1, 0));

        let v = DslVersion::parse("keystone_dsl_2_11").unwrap();
        assert_eq!(v.as_tuple(), (2, 11));
    }

    #[test]
    fn test_display_roundtrip() {
        let v = DslVersion::new(1, 3);
        assert_eq!(format!("{}", v), "keystone_dsl_1_3");
        assert_eq!("keystone_dsl_1_3".parse::<DslVersion>().unwrap(), v);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in [
            "other_dsl_1_0",
            "keystone_dsl_1",
            "keystone_dsl_1_0_0",
            "keystone_dsl_a_b",
            "",
        ] {
            let err = DslVersion::parse(bad).unwrap_err();
            assert_eq!(err.code(), 317, "{bad}");
        }
    }

    #[test]
    fn test_ordering() {
        assert!(DslVersion::new(1, 0) < DslVersion::new(1, 1));
        assert!(DslVersion::new(1, 9) < DslVersion::new(2, 0));
    }
}
