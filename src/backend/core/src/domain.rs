//! Typed payloads for each resource kind.
//!
//! Rows carry their kind-specific fields as JSON. These types define what a
//! valid payload looks like; [`validate_payload`] decodes and checks one
//! once the authorization core has finalized the row.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::authz::{ResourceKind, Role, Row};
use crate::error::{BizdashError, Result};

/// Placeholder written over secrets in API responses.
pub const REDACTED: &str = "********";

// ═══════════════════════════════════════════════════════════════════════════════
// Payment gateways
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayProvider {
    Stripe,
    MercadoPago,
    Asaas,
    PagSeguro,
    Pix,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEnvironment {
    #[default]
    Sandbox,
    Production,
}

/// Credentials for one payment provider account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentGateway {
    pub name: String,
    pub provider: GatewayProvider,
    #[serde(default)]
    pub environment: GatewayEnvironment,
    #[serde(default)]
    pub public_key: Option<String>,
    /// Never returned by the API once stored.
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborators
// ═══════════════════════════════════════════════════════════════════════════════

/// Staff member record kept by an entrepreneur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// WhatsApp instances
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Pending,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatsappInstance {
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Price tables
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Monthly,
    Quarterly,
    Yearly,
    OneTime,
}

/// A plan offered on the public pricing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub billing_period: BillingPeriod,
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_currency() -> String {
    "BRL".to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════════════

/// Profile fields of a user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════════════════

fn decode<T: serde::de::DeserializeOwned>(kind: ResourceKind, data: &Value) -> Result<T> {
    serde_json::from_value(data.clone())
        .map_err(|e| BizdashError::invalid_argument(format!("invalid {kind} payload: {e}")))
}

fn require_text(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BizdashError::invalid_argument(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_email(value: &str) -> Result<()> {
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(BizdashError::invalid_argument("email is not a valid address")),
    }
}

/// Decode and check a payload for `kind`.
pub fn validate_payload(kind: ResourceKind, data: &Value) -> Result<()> {
    match kind {
        ResourceKind::PaymentGateway => {
            let gateway: PaymentGateway = decode(kind, data)?;
            require_text("name", &gateway.name)
        }
        ResourceKind::Collaborator => {
            let collaborator: Collaborator = decode(kind, data)?;
            require_text("name", &collaborator.name)?;
            require_email(&collaborator.email)
        }
        ResourceKind::WhatsappInstance => {
            let instance: WhatsappInstance = decode(kind, data)?;
            require_text("name", &instance.name)?;
            let digits = instance
                .phone_number
                .trim_start_matches('+')
                .chars()
                .all(|c| c.is_ascii_digit());
            if !digits || instance.phone_number.len() < 8 {
                return Err(BizdashError::invalid_argument(
                    "phone_number must be digits with an optional leading +",
                ));
            }
            Ok(())
        }
        ResourceKind::PriceTable => {
            let table: PriceTable = decode(kind, data)?;
            require_text("name", &table.name)?;
            if table.price_cents < 0 {
                return Err(BizdashError::invalid_argument("price_cents must not be negative"));
            }
            if table.currency.len() != 3 {
                return Err(BizdashError::invalid_argument("currency must be an ISO 4217 code"));
            }
            Ok(())
        }
        ResourceKind::User => {
            let profile: UserProfile = decode(kind, data)?;
            require_email(&profile.email)
        }
    }
}

/// Strip secrets from a row before it leaves the service.
pub fn redact(mut row: Row) -> Row {
    if row.kind == ResourceKind::PaymentGateway {
        if let Some(secret) = row.data.get_mut("secret_key") {
            if !secret.is_null() {
                *secret = Value::from(REDACTED);
            }
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gateway_payload() {
        let ok = json!({ "name": "Main", "provider": "stripe", "secret_key": "sk_live" });
        assert!(validate_payload(ResourceKind::PaymentGateway, &ok).is_ok());

        let bad = json!({ "name": "Main", "provider": "paypal" });
        let err = validate_payload(ResourceKind::PaymentGateway, &bad).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_collaborator_email() {
        let bad = json!({ "name": "Ana", "email": "ana" });
        assert!(validate_payload(ResourceKind::Collaborator, &bad).is_err());
        let ok = json!({ "name": "Ana", "email": "ana@shop.com" });
        assert!(validate_payload(ResourceKind::Collaborator, &ok).is_ok());
    }

    #[test]
    fn test_whatsapp_phone() {
        let ok = json!({ "name": "Support", "phone_number": "+5511999990000" });
        assert!(validate_payload(ResourceKind::WhatsappInstance, &ok).is_ok());
        let bad = json!({ "name": "Support", "phone_number": "call me" });
        assert!(validate_payload(ResourceKind::WhatsappInstance, &bad).is_err());
    }

    #[test]
    fn test_price_table_defaults_and_checks() {
        let ok = json!({ "name": "Pro", "price_cents": 4990, "billing_period": "monthly" });
        assert!(validate_payload(ResourceKind::PriceTable, &ok).is_ok());
        let table: PriceTable = serde_json::from_value(ok).unwrap();
        assert_eq!(table.currency, "BRL");

        let negative = json!({ "name": "Pro", "price_cents": -1, "billing_period": "monthly" });
        assert!(validate_payload(ResourceKind::PriceTable, &negative).is_err());
    }

    #[test]
    fn test_user_profile_role() {
        let ok = json!({ "email": "e@shop.com", "role": "entrepreneur" });
        assert!(validate_payload(ResourceKind::User, &ok).is_ok());
        let bad = json!({ "email": "e@shop.com", "role": "owner" });
        assert!(validate_payload(ResourceKind::User, &bad).is_err());
    }

    #[test]
    fn test_redact_gateway_secret() {
        let row = Row::new(
            ResourceKind::PaymentGateway,
            json!({ "name": "Main", "provider": "asaas", "secret_key": "sk_live" }),
        );
        assert_eq!(redact(row).data["secret_key"], REDACTED);

        let other = Row::new(ResourceKind::Collaborator, json!({ "secret_key": "x" }));
        assert_eq!(redact(other).data["secret_key"], "x");
    }
}
