use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[default]
    #[serde(rename = "user")]
    User,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "sous-admin")]
    SousAdmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SousAdmin => "sous-admin",
        }
    }

    /// Role → capability table. The only place permissions are decided.
    pub fn allows(self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Admin => true,
            Role::SousAdmin => matches!(
                capability,
                ListUsers | ReadUser | CreateUser | UpdateUser | ManageAnyPlace | ViewPlaceStats
            ),
            Role::User => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "sous-admin" => Ok(Role::SousAdmin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// Operations gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ListUsers,
    ReadUser,
    CreateUser,
    UpdateUser,
    DeleteUser,
    /// Bypass the default active-users-only predicate.
    IncludeInactiveUsers,
    /// Patch or delete places created by someone else.
    ManageAnyPlace,
    ViewPlaceStats,
    ViewMonthlyPlan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_users_have_no_capabilities() {
        for cap in [
            Capability::ListUsers,
            Capability::DeleteUser,
            Capability::ManageAnyPlace,
            Capability::ViewPlaceStats,
            Capability::ViewMonthlyPlan,
        ] {
            assert!(!Role::User.allows(cap));
        }
    }

    #[test]
    fn sous_admin_cannot_delete_users_or_see_monthly_plan() {
        assert!(Role::SousAdmin.allows(Capability::ListUsers));
        assert!(Role::SousAdmin.allows(Capability::UpdateUser));
        assert!(!Role::SousAdmin.allows(Capability::DeleteUser));
        assert!(!Role::SousAdmin.allows(Capability::ViewMonthlyPlan));
        assert!(!Role::SousAdmin.allows(Capability::IncludeInactiveUsers));
    }

    #[test]
    fn admin_is_allowed_everything() {
        assert!(Role::Admin.allows(Capability::DeleteUser));
        assert!(Role::Admin.allows(Capability::ViewMonthlyPlan));
    }

    #[test]
    fn role_string_roundtrip() {
        for role in [Role::User, Role::Admin, Role::SousAdmin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("root".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::SousAdmin).unwrap(), "\"sous-admin\"");
    }
}
