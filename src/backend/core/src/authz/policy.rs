//! Role policy table.
//!
//! Answers one question with no context beyond its arguments:
//! "may role R perform operation O on rows of kind K at all?"
//! Row-level scoping is the scope resolver's job, not this table's.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use super::models::{Operation, ResourceKind, Role};

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration errors raised while building a policy table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("policy table has no rule for role={role}, kind={kind}")]
    MissingRule { role: Role, kind: ResourceKind },

    #[error("policy table declares role={role}, kind={kind} more than once")]
    DuplicateRule { role: Role, kind: ResourceKind },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Operation set
// ═══════════════════════════════════════════════════════════════════════════════

/// A compact set of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationSet(u8);

impl OperationSet {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(Operation::Read.bit());
    pub const READ_UPDATE: Self = Self(Operation::Read.bit() | Operation::Update.bit());
    pub const ALL: Self = Self(
        Operation::Read.bit()
            | Operation::Create.bit()
            | Operation::Update.bit()
            | Operation::Delete.bit(),
    );

    pub fn contains(&self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn insert(&mut self, op: Operation) {
        self.0 |= op.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Operation> + '_ {
        Operation::ALL.into_iter().filter(|op| self.contains(*op))
    }
}

impl FromIterator<Operation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        let mut set = Self::NONE;
        for op in iter {
            set.insert(op);
        }
        set
    }
}

/// Renders as the familiar `CRUD` letters, `-` when empty.
impl fmt::Display for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        for op in [
            Operation::Create,
            Operation::Read,
            Operation::Update,
            Operation::Delete,
        ] {
            if self.contains(op) {
                write!(f, "{}", op.letter())?;
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rules
// ═══════════════════════════════════════════════════════════════════════════════

/// One `(role, kind) -> operations` entry, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub role: Role,
    pub kind: ResourceKind,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

use OperationSet as Ops;
use ResourceKind as K;
use Role as R;

/// The dashboard's standard grants.
///
/// Non-admin `User` grants cover the caller's own record only; the scope
/// resolver narrows them.
const STANDARD_RULES: [(Role, ResourceKind, OperationSet); Role::COUNT * ResourceKind::COUNT] = [
    (R::SuperAdmin, K::PaymentGateway, Ops::ALL),
    (R::SuperAdmin, K::Collaborator, Ops::ALL),
    (R::SuperAdmin, K::WhatsappInstance, Ops::ALL),
    (R::SuperAdmin, K::PriceTable, Ops::ALL),
    (R::SuperAdmin, K::User, Ops::ALL),
    (R::Entrepreneur, K::PaymentGateway, Ops::ALL),
    (R::Entrepreneur, K::Collaborator, Ops::ALL),
    (R::Entrepreneur, K::WhatsappInstance, Ops::ALL),
    (R::Entrepreneur, K::PriceTable, Ops::READ),
    (R::Entrepreneur, K::User, Ops::READ_UPDATE),
    (R::Collaborator, K::PaymentGateway, Ops::READ),
    (R::Collaborator, K::Collaborator, Ops::READ),
    (R::Collaborator, K::WhatsappInstance, Ops::READ),
    (R::Collaborator, K::PriceTable, Ops::READ),
    (R::Collaborator, K::User, Ops::READ_UPDATE),
    (R::Customer, K::PaymentGateway, Ops::NONE),
    (R::Customer, K::Collaborator, Ops::NONE),
    (R::Customer, K::WhatsappInstance, Ops::NONE),
    (R::Customer, K::PriceTable, Ops::READ),
    (R::Customer, K::User, Ops::READ_UPDATE),
];

// ═══════════════════════════════════════════════════════════════════════════════
// Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Static `(role, kind) -> operations` table.
///
/// Total by construction: every combination has a slot, so `permits` never
/// fails. Incomplete rule sets are rejected when the table is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicyTable {
    grants: [[OperationSet; ResourceKind::COUNT]; Role::COUNT],
}

impl RolePolicyTable {
    /// The standard dashboard policy.
    pub fn standard() -> Self {
        let mut grants = [[OperationSet::NONE; ResourceKind::COUNT]; Role::COUNT];
        for (role, kind, ops) in STANDARD_RULES {
            grants[role.index()][kind.index()] = ops;
        }
        Self { grants }
    }

    /// Build a table from configured rules.
    ///
    /// Every `(role, kind)` pair must appear exactly once; an empty
    /// `operations` list is an explicit "none".
    pub fn from_rules(rules: &[PolicyRule]) -> Result<Self, PolicyError> {
        let mut grants = [[OperationSet::NONE; ResourceKind::COUNT]; Role::COUNT];
        let mut seen = [[false; ResourceKind::COUNT]; Role::COUNT];

        for rule in rules {
            let slot = &mut seen[rule.role.index()][rule.kind.index()];
            if *slot {
                return Err(PolicyError::DuplicateRule {
                    role: rule.role,
                    kind: rule.kind,
                });
            }
            *slot = true;
            grants[rule.role.index()][rule.kind.index()] =
                rule.operations.iter().copied().collect();
        }

        for role in Role::ALL {
            for kind in ResourceKind::ALL {
                if !seen[role.index()][kind.index()] {
                    return Err(PolicyError::MissingRule { role, kind });
                }
            }
        }

        debug!(rules = rules.len(), "Built policy table from configured rules");
        Ok(Self { grants })
    }

    /// Whether `role` may perform `operation` on `kind` at all.
    pub fn permits(&self, role: Role, kind: ResourceKind, operation: Operation) -> bool {
        self.grants[role.index()][kind.index()].contains(operation)
    }

    pub fn operations(&self, role: Role, kind: ResourceKind) -> OperationSet {
        self.grants[role.index()][kind.index()]
    }

    /// The table as an ordered rule list, suitable for serialization.
    pub fn rules(&self) -> Vec<PolicyRule> {
        Role::ALL
            .into_iter()
            .flat_map(|role| {
                ResourceKind::ALL.into_iter().map(move |kind| (role, kind))
            })
            .map(|(role, kind)| PolicyRule {
                role,
                kind,
                operations: self.operations(role, kind).iter().collect(),
            })
            .collect()
    }
}

impl Default for RolePolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
