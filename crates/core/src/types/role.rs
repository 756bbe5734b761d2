//! Admin roles stored in the directory.

use serde::{Deserialize, Serialize};

/// Admin role with different permission levels.
///
/// The directory stores the role as free text; rows written by older tools
/// may carry values outside this set. Those parse as `None` via
/// [`AdminRole::parse`] and still grant admin rights when the row is active,
/// because admin rights come from the active flag, not the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    /// Can also grant and revoke other admins.
    SuperAdmin,
    /// Dashboard access.
    #[default]
    Admin,
}

impl AdminRole {
    /// Parse a role from its directory spelling.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "super_admin" => Some(Self::SuperAdmin),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// The directory spelling of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for AdminRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid admin role: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_roles() {
        assert_eq!(AdminRole::parse("admin"), Some(AdminRole::Admin));
        assert_eq!(AdminRole::parse("super_admin"), Some(AdminRole::SuperAdmin));
        assert_eq!(AdminRole::parse("Admin"), None);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("editor".parse::<AdminRole>().is_err());
        assert_eq!(AdminRole::SuperAdmin.to_string(), "super_admin");
    }
}
