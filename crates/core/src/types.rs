//! Validated name newtypes for volumes and volume groups

use crate::constants::{NAME_LEN, RESERVED_SUFFIXES};
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::ops::Deref;
use std::str::FromStr;

fn validate_name(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::configuration(format!("{what} name cannot be empty")));
    }
    if name.len() >= NAME_LEN {
        return Err(Error::configuration(format!(
            "{what} name '{name}' is longer than {} characters",
            NAME_LEN - 1
        )));
    }
    if name == "." || name == ".." || name.starts_with('-') {
        return Err(Error::configuration(format!("{what} name '{name}' is invalid")));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-')))
    {
        return Err(Error::configuration(format!(
            "{what} name '{name}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}

/// A user-facing logical volume name.
///
/// Names ending in one of the reserved layer suffixes (`_corig`, `_cdata`,
/// `_cmeta`) are rejected: those are only ever produced internally by layering
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeName(String);

impl VolumeName {
    /// Create a new VolumeName with validation
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name, "volume")?;
        if let Some(suffix) = RESERVED_SUFFIXES.iter().find(|s| name.ends_with(*s)) {
            return Err(Error::configuration(format!(
                "volume name '{name}' uses reserved suffix '{suffix}'"
            )));
        }
        Ok(VolumeName(name))
    }

    /// Create a VolumeName without validation (internal layer names)
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for VolumeName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for VolumeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A volume group name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VgName(String);

impl VgName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name, "volume group")?;
        Ok(VgName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VgName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for VgName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for VgName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reserved_suffix_rejected() {
        assert!(VolumeName::new("data_corig").is_err());
        assert!(VolumeName::new("pool_cdata").is_err());
        assert!(VolumeName::new("data_corig_x").is_ok());
    }

    #[test]
    fn test_invalid_names_rejected() {
        for name in ["", ".", "..", "-lv", "lv/0", "lv 0"] {
            assert!(VolumeName::new(name).is_err(), "{name:?} should be invalid");
        }
        assert!(VgName::new("x".repeat(NAME_LEN)).is_err());
    }

    proptest! {
        #[test]
        fn valid_names_always_succeed(name in "[a-zA-Z0-9+][a-zA-Z0-9+.-]{0,60}") {
            prop_assume!(name != "." && name != "..");
            let parsed = VolumeName::new(name.clone());
            prop_assert!(parsed.is_ok());
            let parsed = parsed.unwrap();
            prop_assert_eq!(parsed.as_str(), name.as_str());
        }
    }
}
