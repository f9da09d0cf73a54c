//! Role-gated access to administrative operations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::utils::crypto::Address;

/// Capabilities that may be granted to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Grants roles, toggles flags, manages treasurers and parameters
    Admin,
    /// Updates system and account rates
    RateManager,
    /// Resets claim sessions
    ClaimManager,
    /// May call `mint_to` / `burn_from` directly
    Minter,
}

impl Role {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::RateManager => "rate-manager",
            Role::ClaimManager => "claim-manager",
            Role::Minter => "minter",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Who holds which role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleTable {
    grants: HashMap<Address, BTreeSet<Role>>,
}

impl RoleTable {
    /// Table where `admin` holds every role
    pub fn with_admin(admin: Address) -> Self {
        let mut table = Self::default();
        for role in [Role::Admin, Role::RateManager, Role::ClaimManager, Role::Minter] {
            table.grant(admin, role);
        }
        table
    }

    /// Check a grant. Admins hold every role implicitly.
    pub fn has_role(&self, account: &Address, role: Role) -> bool {
        self.grants
            .get(account)
            .map(|roles| roles.contains(&role) || roles.contains(&Role::Admin))
            .unwrap_or(false)
    }

    /// Fail with `Unauthorized` unless `account` holds `role`
    pub fn require(&self, account: &Address, role: Role) -> Result<()> {
        if self.has_role(account, role) {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "{} lacks role {}",
                account.short(),
                role
            )))
        }
    }

    /// Grant a role; returns false if it was already held
    pub fn grant(&mut self, account: Address, role: Role) -> bool {
        self.grants.entry(account).or_default().insert(role)
    }

    /// Revoke a role; returns false if it was not held
    pub fn revoke(&mut self, account: &Address, role: Role) -> bool {
        let Some(roles) = self.grants.get_mut(account) else {
            return false;
        };
        let removed = roles.remove(&role);
        if roles.is_empty() {
            self.grants.remove(account);
        }
        removed
    }

    /// Accounts holding `role` explicitly
    pub fn holders(&self, role: Role) -> Vec<Address> {
        let mut holders: Vec<_> = self
            .grants
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(account, _)| *account)
            .collect();
        holders.sort();
        holders
    }
}
