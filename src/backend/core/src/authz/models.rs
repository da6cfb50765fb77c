//! Authorization data model: identifiers, roles, resource kinds, operations,
//! identities and the generic row shape every resource is stored as.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed user identifier. Entrepreneurs double as tenant ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&RowId> for UserId {
    fn from(id: &RowId) -> Self {
        Self(id.0.clone())
    }
}

/// Strongly-typed row identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier for rows created without one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&UserId> for RowId {
    fn from(id: &UserId) -> Self {
        Self(id.0.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Enumerations
// ═══════════════════════════════════════════════════════════════════════════════

/// Error returned when parsing an unknown role, kind or operation name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {value}")]
pub struct ParseEnumError {
    pub what: &'static str,
    pub value: String,
}

/// The four dashboard roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    SuperAdmin,
    Entrepreneur,
    Collaborator,
    Customer,
}

impl Role {
    pub const COUNT: usize = 4;

    pub const ALL: [Role; Role::COUNT] = [
        Role::SuperAdmin,
        Role::Entrepreneur,
        Role::Collaborator,
        Role::Customer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super-admin",
            Self::Entrepreneur => "entrepreneur",
            Self::Collaborator => "collaborator",
            Self::Customer => "customer",
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super Admin",
            Self::Entrepreneur => "Entrepreneur",
            Self::Collaborator => "Collaborator",
            Self::Customer => "Customer",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Collaborators and customers belong to exactly one entrepreneur.
    pub fn is_tenant_member(&self) -> bool {
        matches!(self, Self::Collaborator | Self::Customer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "super-admin" => Ok(Self::SuperAdmin),
            "entrepreneur" => Ok(Self::Entrepreneur),
            "collaborator" => Ok(Self::Collaborator),
            "customer" => Ok(Self::Customer),
            _ => Err(ParseEnumError {
                what: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// How rows of a kind relate to tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Owned by one entrepreneur through `entrepreneur_id`.
    Tenant,
    /// No tenant owner; visible platform-wide.
    Global,
    /// Identity records; `entrepreneur_id` is the member's parent.
    Identity,
}

/// Every resource kind the dashboard manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    PaymentGateway,
    Collaborator,
    WhatsappInstance,
    PriceTable,
    User,
}

impl ResourceKind {
    pub const COUNT: usize = 5;

    pub const ALL: [ResourceKind; ResourceKind::COUNT] = [
        ResourceKind::PaymentGateway,
        ResourceKind::Collaborator,
        ResourceKind::WhatsappInstance,
        ResourceKind::PriceTable,
        ResourceKind::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentGateway => "payment_gateway",
            Self::Collaborator => "collaborator",
            Self::WhatsappInstance => "whatsapp_instance",
            Self::PriceTable => "price_table",
            Self::User => "user",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub fn ownership(&self) -> Ownership {
        match self {
            Self::PaymentGateway | Self::Collaborator | Self::WhatsappInstance => {
                Ownership::Tenant
            }
            Self::PriceTable => Ownership::Global,
            Self::User => Ownership::Identity,
        }
    }

    pub fn is_tenant_scoped(&self) -> bool {
        self.ownership() == Ownership::Tenant
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "payment_gateway" => Ok(Self::PaymentGateway),
            "collaborator" => Ok(Self::Collaborator),
            "whatsapp_instance" => Ok(Self::WhatsappInstance),
            "price_table" => Ok(Self::PriceTable),
            "user" => Ok(Self::User),
            _ => Err(ParseEnumError {
                what: "resource kind",
                value: s.to_string(),
            }),
        }
    }
}

/// The four operations the policy table speaks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Read,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Single-letter form used in the CRUD table rendering.
    pub fn letter(&self) -> char {
        match self {
            Self::Read => 'R',
            Self::Create => 'C',
            Self::Update => 'U',
            Self::Delete => 'D',
        }
    }

    pub(crate) const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "r" => Ok(Self::Read),
            "create" | "c" => Ok(Self::Create),
            "update" | "u" => Ok(Self::Update),
            "delete" | "d" => Ok(Self::Delete),
            _ => Err(ParseEnumError {
                what: "operation",
                value: s.to_string(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// Reasons an `{id, role, parent}` triple cannot form an identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityShapeError {
    #[error("{role} identities cannot belong to another tenant")]
    UnexpectedParent { role: Role },

    #[error("{role} identities must belong to an entrepreneur")]
    MissingParent { role: Role },

    #[error("identity cannot be its own parent")]
    SelfParent,
}

/// The caller of a request: who it is, what it is, and which tenant it lives in.
///
/// Immutable once built. Entrepreneurs are their own tenant, members point to
/// their entrepreneur, and super-admins carry no tenant at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    id: UserId,
    role: Role,
    tenant_id: Option<UserId>,
}

impl Identity {
    pub fn super_admin(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::SuperAdmin,
            tenant_id: None,
        }
    }

    pub fn entrepreneur(id: impl Into<UserId>) -> Self {
        let id = id.into();
        Self {
            tenant_id: Some(id.clone()),
            id,
            role: Role::Entrepreneur,
        }
    }

    pub fn collaborator(id: impl Into<UserId>, entrepreneur: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Collaborator,
            tenant_id: Some(entrepreneur.into()),
        }
    }

    pub fn customer(id: impl Into<UserId>, entrepreneur: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Customer,
            tenant_id: Some(entrepreneur.into()),
        }
    }

    /// Build an identity from a stored user record, deriving the tenant.
    pub fn from_parts(
        id: UserId,
        role: Role,
        parent: Option<UserId>,
    ) -> Result<Self, IdentityShapeError> {
        match (role, parent) {
            (Role::SuperAdmin, None) => Ok(Self::super_admin(id)),
            (Role::Entrepreneur, None) => Ok(Self::entrepreneur(id)),
            (Role::SuperAdmin | Role::Entrepreneur, Some(_)) => {
                Err(IdentityShapeError::UnexpectedParent { role })
            }
            (Role::Collaborator | Role::Customer, None) => {
                Err(IdentityShapeError::MissingParent { role })
            }
            (Role::Collaborator | Role::Customer, Some(parent)) if parent == id => {
                Err(IdentityShapeError::SelfParent)
            }
            (Role::Collaborator | Role::Customer, Some(parent)) => Ok(Self {
                id,
                role,
                tenant_id: Some(parent),
            }),
        }
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tenant_id(&self) -> Option<&UserId> {
        self.tenant_id.as_ref()
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tenant_id {
            Some(tenant) => write!(f, "{}:{}@{}", self.role, self.id, tenant),
            None => write!(f, "{}:{}", self.role, self.id),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row
// ═══════════════════════════════════════════════════════════════════════════════

fn default_active() -> bool {
    true
}

const USER_ROLE_FIELD: &str = "role";
const FORMER_ENTREPRENEUR_FIELD: &str = "former_entrepreneur_id";

/// A resource row as the authorization core sees it.
///
/// Owner and audit columns are first-class so the core can stamp and compare
/// them; the kind-specific payload travels as JSON in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub id: Option<RowId>,

    pub kind: ResourceKind,

    /// Owning tenant for tenant-scoped kinds, parent entrepreneur for users.
    #[serde(default)]
    pub entrepreneur_id: Option<UserId>,

    /// Identity that created the row. Audit only, never used for scoping.
    #[serde(default)]
    pub created_by: Option<UserId>,

    /// Soft-delete flag; price tables only show active rows to non-admins.
    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Row {
    pub fn new(kind: ResourceKind, data: serde_json::Value) -> Self {
        Self {
            id: None,
            kind,
            entrepreneur_id: None,
            created_by: None,
            active: true,
            data,
            created_at: None,
            updated_at: None,
        }
    }

    /// A bare reference to an existing row, used for deletes.
    pub fn reference(kind: ResourceKind, id: impl Into<RowId>) -> Self {
        Self::new(kind, serde_json::Value::Null).with_id(id)
    }

    /// Serialize a typed payload into a fresh row.
    pub fn from_payload<T: Serialize>(kind: ResourceKind, payload: &T) -> serde_json::Result<Self> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    pub fn with_id(mut self, id: impl Into<RowId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_entrepreneur(mut self, entrepreneur_id: impl Into<UserId>) -> Self {
        self.entrepreneur_id = Some(entrepreneur_id.into());
        self
    }

    pub fn with_created_by(mut self, user_id: impl Into<UserId>) -> Self {
        self.created_by = Some(user_id.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Decode the payload into its typed form.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.data.clone())
    }

    /// Role stored on a user row, if present and recognised.
    pub fn user_role(&self) -> Option<Role> {
        self.data
            .get(USER_ROLE_FIELD)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }

    /// Overwrite the role stored on a user row.
    pub(crate) fn set_user_role(&mut self, role: Role) {
        self.set_data_field(USER_ROLE_FIELD, serde_json::Value::from(role.as_str()));
    }

    /// Entrepreneur a promoted user belonged to before losing its parent.
    ///
    /// Kept on the user row so a later demotion can only return the user to
    /// the same tenant.
    pub fn former_entrepreneur(&self) -> Option<UserId> {
        self.data
            .get(FORMER_ENTREPRENEUR_FIELD)
            .and_then(|v| v.as_str())
            .map(UserId::new)
    }

    pub(crate) fn set_former_entrepreneur(&mut self, entrepreneur: Option<&UserId>) {
        match entrepreneur {
            Some(id) => self.set_data_field(
                FORMER_ENTREPRENEUR_FIELD,
                serde_json::Value::from(id.as_str()),
            ),
            None => {
                if let Some(map) = self.data.as_object_mut() {
                    map.remove(FORMER_ENTREPRENEUR_FIELD);
                }
            }
        }
    }

    fn set_data_field(&mut self, field: &str, value: serde_json::Value) {
        if !self.data.is_object() {
            self.data = serde_json::json!({});
        }
        if let Some(map) = self.data.as_object_mut() {
            map.insert(field.to_string(), value);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_parse_accepts_both_spellings() {
        assert_eq!("super-admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!("SUPER_ADMIN".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!("customer".parse::<Role>().unwrap(), Role::Customer);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_uses_kebab_case() {
        let value = serde_json::to_value(Role::SuperAdmin).unwrap();
        assert_eq!(value, json!("super-admin"));
    }

    #[test]
    fn test_kind_parse_accepts_route_spelling() {
        assert_eq!(
            "payment-gateways".trim_end_matches('s').parse::<ResourceKind>().unwrap(),
            ResourceKind::PaymentGateway
        );
        assert_eq!(
            "whatsapp_instance".parse::<ResourceKind>().unwrap(),
            ResourceKind::WhatsappInstance
        );
    }

    #[test]
    fn test_kind_ownership() {
        assert!(ResourceKind::PaymentGateway.is_tenant_scoped());
        assert!(ResourceKind::Collaborator.is_tenant_scoped());
        assert!(ResourceKind::WhatsappInstance.is_tenant_scoped());
        assert_eq!(ResourceKind::PriceTable.ownership(), Ownership::Global);
        assert_eq!(ResourceKind::User.ownership(), Ownership::Identity);
    }

    #[test]
    fn test_operation_bits_are_distinct() {
        let mut seen = 0u8;
        for op in Operation::ALL {
            assert_eq!(seen & op.bit(), 0);
            seen |= op.bit();
        }
        assert_eq!(seen, 0b1111);
    }

    #[test]
    fn test_entrepreneur_is_own_tenant() {
        let identity = Identity::entrepreneur("10");
        assert_eq!(identity.tenant_id(), Some(&UserId::new("10")));
        assert_eq!(identity.role(), Role::Entrepreneur);
    }

    #[test]
    fn test_identity_from_parts_shapes() {
        assert!(Identity::from_parts(UserId::new("1"), Role::SuperAdmin, None).is_ok());
        assert_eq!(
            Identity::from_parts(UserId::new("1"), Role::Entrepreneur, Some(UserId::new("2"))),
            Err(IdentityShapeError::UnexpectedParent { role: Role::Entrepreneur })
        );
        assert_eq!(
            Identity::from_parts(UserId::new("3"), Role::Customer, None),
            Err(IdentityShapeError::MissingParent { role: Role::Customer })
        );
        assert_eq!(
            Identity::from_parts(UserId::new("3"), Role::Customer, Some(UserId::new("3"))),
            Err(IdentityShapeError::SelfParent)
        );

        let member =
            Identity::from_parts(UserId::new("3"), Role::Collaborator, Some(UserId::new("10")))
                .unwrap();
        assert_eq!(member.tenant_id(), Some(&UserId::new("10")));
    }

    #[test]
    fn test_row_user_role_roundtrip() {
        let mut row = Row::new(ResourceKind::User, json!({ "email": "a@b.c" }));
        assert_eq!(row.user_role(), None);
        row.set_user_role(Role::Collaborator);
        assert_eq!(row.user_role(), Some(Role::Collaborator));
        assert_eq!(row.data["email"], "a@b.c");
    }

    #[test]
    fn test_row_deserialize_defaults() {
        let row: Row = serde_json::from_value(json!({ "kind": "price_table" })).unwrap();
        assert!(row.active);
        assert!(row.id.is_none());
        assert!(row.entrepreneur_id.is_none());
    }
}
