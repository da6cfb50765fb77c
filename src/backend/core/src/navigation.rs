//! Dashboard sections each role may open.
//!
//! Pure presentation mapping. Authorization never consults it; a section
//! being visible does not grant any operation on the rows behind it.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::authz::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Dashboard,
    Businesses,
    Users,
    PaymentGateways,
    Collaborators,
    WhatsappInstances,
    PriceTables,
    Profile,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::Dashboard,
        Capability::Businesses,
        Capability::Users,
        Capability::PaymentGateways,
        Capability::Collaborators,
        Capability::WhatsappInstances,
        Capability::PriceTables,
        Capability::Profile,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Capability::Dashboard => "Dashboard",
            Capability::Businesses => "Businesses",
            Capability::Users => "Users",
            Capability::PaymentGateways => "Payment gateways",
            Capability::Collaborators => "Collaborators",
            Capability::WhatsappInstances => "WhatsApp instances",
            Capability::PriceTables => "Price tables",
            Capability::Profile => "Profile",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sections shown in the sidebar for `role`.
pub fn capabilities(role: Role) -> BTreeSet<Capability> {
    use Capability::*;

    let sections: &[Capability] = match role {
        Role::SuperAdmin => &Capability::ALL,
        Role::Entrepreneur | Role::Collaborator => &[
            Dashboard,
            PaymentGateways,
            Collaborators,
            WhatsappInstances,
            PriceTables,
            Profile,
        ],
        Role::Customer => &[Dashboard, PriceTables, Profile],
    };
    sections.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_admin_sees_everything() {
        assert_eq!(capabilities(Role::SuperAdmin).len(), Capability::ALL.len());
    }

    #[test]
    fn test_only_super_admin_manages_businesses() {
        for role in Role::ALL {
            let has = capabilities(role).contains(&Capability::Businesses);
            assert_eq!(has, role == Role::SuperAdmin, "{role}");
        }
    }

    #[test]
    fn test_every_role_has_profile() {
        for role in Role::ALL {
            assert!(capabilities(role).contains(&Capability::Profile));
        }
    }

    #[test]
    fn test_customer_menu() {
        let menu: Vec<_> = capabilities(Role::Customer).into_iter().collect();
        assert_eq!(
            menu,
            vec![Capability::Dashboard, Capability::PriceTables, Capability::Profile]
        );
    }
}
