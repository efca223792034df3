//! What an identity may do with a repository.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::AuthError;

/// Access level, ordered so that a higher level includes every lower one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Refs are not even advertised.
    #[serde(rename = "none")]
    NoAccess,
    /// Clone and fetch.
    #[default]
    Read,
    /// Clone, fetch and push.
    Write,
}

impl Permission {
    pub fn has(&self, required: Permission) -> bool {
        *self >= required
    }

    /// Name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::NoAccess => "none",
            Permission::Read => "read",
            Permission::Write => "write",
        }
    }
}

impl FromStr for Permission {
    type Err = AuthError;

    /// Case-insensitive; `push` is accepted as a synonym for `write`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let known = [
            ("none", Permission::NoAccess),
            ("read", Permission::Read),
            ("write", Permission::Write),
            ("push", Permission::Write),
        ];
        known
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, level)| level)
            .ok_or_else(|| AuthError::InvalidInput(format!("`{}` is not a permission level", s)))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_includes_read_but_not_the_reverse() {
        assert!(Permission::Write.has(Permission::Read));
        assert!(Permission::Read.has(Permission::Read));
        assert!(!Permission::Read.has(Permission::Write));
        assert!(!Permission::NoAccess.has(Permission::Read));
        assert!(Permission::NoAccess.has(Permission::NoAccess));
    }

    #[test]
    fn names_parse_back() {
        for level in [Permission::NoAccess, Permission::Read, Permission::Write] {
            assert_eq!(level.as_str().parse::<Permission>().unwrap(), level);
        }
        assert_eq!("Push".parse::<Permission>().unwrap(), Permission::Write);
        assert_eq!("NONE".parse::<Permission>().unwrap(), Permission::NoAccess);
        assert!("owner".parse::<Permission>().is_err());
        assert!("".parse::<Permission>().is_err());
    }

    #[test]
    fn serde_uses_config_names() {
        let levels: Vec<Permission> = serde_json::from_str(r#"["none","read","write"]"#).unwrap();
        assert_eq!(
            levels,
            [Permission::NoAccess, Permission::Read, Permission::Write]
        );
        assert_eq!(serde_json::to_string(&Permission::NoAccess).unwrap(), r#""none""#);
    }
}
