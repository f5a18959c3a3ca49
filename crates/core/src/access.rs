use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Access level to a shared sheet. Ordered: `View < Edit < Owner`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Edit,
    Owner,
}

impl Permission {
    pub fn allows_write(&self) -> bool {
        *self >= Permission::Edit
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "owner" => Ok(Self::Owner),
            _ => Err(CoreError::Serialization(format!("unknown permission: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_and_write_gate() {
        assert!(Permission::View < Permission::Edit);
        assert!(Permission::Edit < Permission::Owner);
        assert!(!Permission::View.allows_write());
        assert!(Permission::Edit.allows_write());
        assert!(Permission::Owner.allows_write());
    }

    #[test]
    fn str_roundtrip() {
        for p in [Permission::View, Permission::Edit, Permission::Owner] {
            assert_eq!(Permission::parse(p.as_str()).unwrap(), p);
        }
        assert!(Permission::parse("admin").is_err());
    }
}
