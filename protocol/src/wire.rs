//! # Wire Schemas
//!
//! JSON bodies exchanged between the server, payer apps and agent devices.
//! camelCase throughout. Every inbound body is validated before it is
//! allowed anywhere near the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::OrderSecret;
use crate::order::{
    DeliveryStatus, Item, NewOrder, Order, OrderError, OrderLine, PaymentMode, Pricing,
    RedemptionRecord,
};
use crate::settlement::{validate_batch, ReconcileError, ReconcileSummary};
use crate::token::CoinToken;

// ---------------------------------------------------------------------------
// Pending-order feed
// ---------------------------------------------------------------------------

/// One entry of `GET /agent/orders`. The per-order secret travels as
/// `signature`: the agent needs it to verify offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrder {
    pub order_id: String,
    pub value: u64,
    pub delivery_date: DateTime<Utc>,
    pub payment_mode: PaymentMode,
    pub delivery_status: DeliveryStatus,
    pub user_id: String,
    pub assigned_agent_id: Option<String>,
    pub signature: OrderSecret,
    pub created_at: DateTime<Utc>,
}

impl PendingOrder {
    /// Feed entry for `order`. `None` for orders without a secret, which
    /// have no business being in the feed.
    pub fn from_order(order: &Order) -> Option<Self> {
        let secret = order.secret.clone()?;
        Some(Self {
            order_id: order.order_id.clone(),
            value: order.value,
            delivery_date: order.delivery_date,
            payment_mode: order.payment_mode,
            delivery_status: order.delivery_status,
            user_id: order.user_id.clone(),
            assigned_agent_id: order.assigned_agent_id.clone(),
            signature: secret,
            created_at: order.created_at,
        })
    }

    /// Rebuild the cached order on the agent side.
    pub fn into_order(self) -> Order {
        Order {
            order_id: self.order_id,
            value: self.value,
            delivery_date: self.delivery_date,
            payment_mode: self.payment_mode,
            delivery_status: self.delivery_status,
            user_id: self.user_id,
            assigned_agent_id: self.assigned_agent_id,
            secret: Some(self.signature),
            lines: Vec::new(),
            created_at: self.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Body of `POST /agent/orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub data: Vec<RedemptionRecord>,
}

impl ReconcileRequest {
    pub fn validate(&self) -> Result<(), ReconcileError> {
        validate_batch(&self.data)
    }
}

/// Reply to a reconciliation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub message: String,
    #[serde(flatten)]
    pub summary: ReconcileSummary,
}

impl From<ReconcileSummary> for ReconcileResponse {
    fn from(summary: ReconcileSummary) -> Self {
        let message = if summary.is_clean() {
            "Orders verified successfully"
        } else {
            "Orders verified with conflicts"
        };
        Self {
            message: message.to_string(),
            summary,
        }
    }
}

// ---------------------------------------------------------------------------
// Orders & catalog
// ---------------------------------------------------------------------------

/// Body of `POST /orders`. Exactly one of `value` and `items`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub order_id: Option<String>,
    pub user_id: String,
    pub payment_mode: PaymentMode,
    #[serde(default)]
    pub value: Option<u64>,
    #[serde(default)]
    pub items: Option<Vec<OrderLine>>,
    #[serde(default)]
    pub delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_agent_id: Option<String>,
    #[serde(default)]
    pub coin_id: Option<String>,
}

impl TryFrom<CreateOrderRequest> for NewOrder {
    type Error = OrderError;

    fn try_from(req: CreateOrderRequest) -> Result<Self, Self::Error> {
        let pricing = match (req.value, req.items) {
            (Some(value), None) => Pricing::Value(value),
            (None, Some(items)) => Pricing::Items(items),
            _ => return Err(OrderError::PricingRequired),
        };
        Ok(NewOrder {
            order_id: req.order_id,
            user_id: req.user_id,
            payment_mode: req.payment_mode,
            pricing,
            delivery_date: req.delivery_date,
            assigned_agent_id: req.assigned_agent_id,
            coin_id: req.coin_id,
        })
    }
}

/// Reply to `POST /orders`. The secret is never echoed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub coin_id: Option<String>,
    pub value: u64,
    pub delivery_date: DateTime<Utc>,
}

/// Body of `POST /items`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    #[serde(default)]
    pub item_id: Option<String>,
    pub name: String,
    pub price: u64,
}

impl CreateItemRequest {
    /// Build the catalog entry, generating an id if none was given.
    pub fn into_item(self) -> Result<Item, OrderError> {
        if self.name.trim().is_empty() {
            return Err(OrderError::MissingField("name"));
        }
        let item_id = match self.item_id {
            Some(id) if id.trim().is_empty() => return Err(OrderError::MissingField("itemId")),
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        Ok(Item {
            item_id,
            name: self.name,
            price: self.price,
        })
    }
}

/// Body of `POST /orders/:orderId/assign`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub assigned_agent_id: String,
}

/// One entry of `GET /users/:userId/orders`. `coin` carries a freshly
/// minted token for orders the payer can settle offline right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOrderView {
    pub order_id: String,
    pub value: u64,
    pub delivery_date: DateTime<Utc>,
    pub payment_mode: PaymentMode,
    pub delivery_status: DeliveryStatus,
    pub assigned_agent_id: Option<String>,
    pub coin: Option<String>,
}

impl UserOrderView {
    pub fn new(order: &Order, coin: Option<CoinToken>) -> Self {
        Self {
            order_id: order.order_id.clone(),
            value: order.value,
            delivery_date: order.delivery_date,
            payment_mode: order.payment_mode,
            delivery_status: order.delivery_status,
            assigned_agent_id: order.assigned_agent_id.clone(),
            coin: coin.map(CoinToken::into_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::mint_secret;

    fn offline_order() -> Order {
        Order {
            order_id: "ORD-1".into(),
            value: 500,
            delivery_date: Utc::now(),
            payment_mode: PaymentMode::Offline,
            delivery_status: DeliveryStatus::Pending,
            user_id: "U-1".into(),
            assigned_agent_id: Some("A-1".into()),
            secret: Some(mint_secret().unwrap()),
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn feed_entry_exposes_secret_as_signature() {
        let order = offline_order();
        let entry = PendingOrder::from_order(&order).unwrap();
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(
            json["signature"],
            order.secret.as_ref().unwrap().expose()
        );
        assert_eq!(json["assignedAgentId"], "A-1");
        assert_eq!(json["paymentMode"], "Offline");
    }

    #[test]
    fn feed_entry_round_trips_into_a_verifiable_order() {
        let order = offline_order();
        let json = serde_json::to_string(&PendingOrder::from_order(&order).unwrap()).unwrap();
        let back: PendingOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_order().secret, order.secret);
    }

    #[test]
    fn orders_without_secret_stay_out_of_the_feed() {
        let mut order = offline_order();
        order.secret = None;
        assert!(PendingOrder::from_order(&order).is_none());
    }

    #[test]
    fn feed_rejects_a_malformed_signature() {
        let mut json = serde_json::to_value(PendingOrder::from_order(&offline_order()).unwrap())
            .unwrap();
        json["signature"] = "short".into();
        assert!(serde_json::from_value::<PendingOrder>(json).is_err());
    }

    #[test]
    fn reconcile_request_parses_the_data_envelope() {
        let body = r#"{"data":[{"orderId":"ORD-1","userId":"U-1","assignedAgentId":"A-1","coinId":"CN-1"}]}"#;
        let req: ReconcileRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.data.len(), 1);
        assert!(req.validate().is_ok());

        let empty: ReconcileRequest = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(matches!(empty.validate(), Err(ReconcileError::EmptyBatch)));

        assert!(serde_json::from_str::<ReconcileRequest>(r#"{"data":[{"orderId":"x"}]}"#).is_err());
    }

    #[test]
    fn create_order_requires_exactly_one_pricing() {
        let base = r#"{"userId":"U-1","paymentMode":"Offline""#;

        let by_value: CreateOrderRequest =
            serde_json::from_str(&format!("{},\"value\":500}}", base)).unwrap();
        assert!(matches!(
            NewOrder::try_from(by_value).unwrap().pricing,
            Pricing::Value(500)
        ));

        let neither: CreateOrderRequest = serde_json::from_str(&format!("{}}}", base)).unwrap();
        assert!(matches!(
            NewOrder::try_from(neither),
            Err(OrderError::PricingRequired)
        ));

        let both: CreateOrderRequest = serde_json::from_str(&format!(
            "{},\"value\":1,\"items\":[{{\"itemId\":\"I\",\"quantity\":1}}]}}",
            base
        ))
        .unwrap();
        assert!(NewOrder::try_from(both).is_err());
    }

    #[test]
    fn item_request_generates_ids_and_checks_name() {
        let item = CreateItemRequest {
            item_id: None,
            name: "Kettle".into(),
            price: 10,
        }
        .into_item()
        .unwrap();
        assert!(uuid::Uuid::parse_str(&item.item_id).is_ok());

        let nameless = CreateItemRequest {
            item_id: Some("I-1".into()),
            name: " ".into(),
            price: 10,
        };
        assert!(matches!(
            nameless.into_item(),
            Err(OrderError::MissingField("name"))
        ));
    }

    #[test]
    fn user_view_omits_nothing_but_the_secret() {
        let order = offline_order();
        let view = UserOrderView::new(&order, None);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("secret").is_none());
        assert!(json.get("signature").is_none());
        assert!(json["coin"].is_null());
    }
}
