/**
 * Project Rights Model
 *
 * Static tables mapping a project role to the set of right codes it holds.
 * A right code is `domain + operation`, where domain codes are multiples of
 * ten and operation codes are 1..=7. The tables are built once from
 * configuration and only ever read afterwards, so lookups need no locking.
 */

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::shared::config::ProjectRoleConfig;
use crate::shared::error::{SharedError, SharedResult};

/// Operation part of a right code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Operation {
    Create = 1,
    Edit = 2,
    Delete = 3,
    View = 4,
    EditOwn = 5,
    DeleteOwn = 6,
    ViewOwn = 7,
}

impl Operation {
    /// All operations in code order
    pub const ALL: [Operation; 7] = [
        Operation::Create,
        Operation::Edit,
        Operation::Delete,
        Operation::View,
        Operation::EditOwn,
        Operation::DeleteOwn,
        Operation::ViewOwn,
    ];

    /// Numeric operation code
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Operation {
    type Error = SharedError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.code() == code)
            .ok_or_else(|| SharedError::validation("operation", format!("unknown operation code {}", code)))
    }
}

impl From<Operation> for u32 {
    fn from(op: Operation) -> Self {
        op.code()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Edit => "edit",
            Operation::Delete => "delete",
            Operation::View => "view",
            Operation::EditOwn => "edit_own",
            Operation::DeleteOwn => "delete_own",
            Operation::ViewOwn => "view_own",
        };
        f.write_str(name)
    }
}

/// Combine a domain code and an operation into a right code
pub fn right_code(domain: u32, operation: Operation) -> u32 {
    domain + operation.code()
}

/// Split a right code into its domain and operation
///
/// Returns `None` when the low digit is not a valid operation code.
pub fn split_right(code: u32) -> Option<(u32, Operation)> {
    let operation = Operation::try_from(code % 10).ok()?;
    Some((code - operation.code(), operation))
}

/// Global (non-project) role carried in the access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    SystemAdmin,
    User,
    #[serde(other)]
    None,
}

impl SystemRole {
    /// Parse a role claim value, treating unknown values as `None`
    pub fn from_claim(value: &str) -> Self {
        match value {
            "system_admin" => SystemRole::SystemAdmin,
            "user" => SystemRole::User,
            _ => SystemRole::None,
        }
    }

    pub fn is_system_admin(&self) -> bool {
        matches!(self, SystemRole::SystemAdmin)
    }
}

/// Role → right-code table
#[derive(Debug, Clone, Default)]
pub struct ProjectRights {
    rights: HashMap<String, HashSet<u32>>,
}

impl ProjectRights {
    /// Build the table from role configuration
    pub fn from_roles(roles: &[ProjectRoleConfig]) -> Self {
        let rights = roles
            .iter()
            .map(|role| (role.name.clone(), role.rights.iter().copied().collect()))
            .collect();
        Self { rights }
    }

    /// Add or replace one role's rights
    pub fn with_role(mut self, name: impl Into<String>, rights: impl IntoIterator<Item = u32>) -> Self {
        self.rights.insert(name.into(), rights.into_iter().collect());
        self
    }

    /// Test whether `role` holds `operation` on `domain`
    ///
    /// Unknown roles hold nothing.
    pub fn has_right(&self, role: &str, domain: u32, operation: Operation) -> bool {
        self.rights
            .get(role)
            .map(|set| set.contains(&right_code(domain, operation)))
            .unwrap_or(false)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.rights.keys().map(String::as_str)
    }

    /// Check every right code against the known domains
    pub fn validate(&self, domains: &HashSet<u32>) -> SharedResult<()> {
        for (role, codes) in &self.rights {
            for code in codes {
                let (domain, _) = split_right(*code).ok_or_else(|| {
                    SharedError::config(format!("role '{}' has malformed right {}", role, code))
                })?;
                if !domains.contains(&domain) {
                    return Err(SharedError::config(format!(
                        "role '{}' references unknown domain {} (right {})",
                        role, domain, code
                    )));
                }
            }
        }
        Ok(())
    }
}
