/// Order Record - the entity every path in the service moves around
///
/// An order is identified by `order_uid` and owns three sub-entities:
/// delivery info, payment info and an ordered list of items. Once written
/// to the durable store an order is immutable (re-ingestion is a conflict
/// unless the upsert policy is configured).
///
/// ## Wire format
/// Field names on the wire are the snake_case field names below;
/// `date_created` is RFC 3339.
///
/// ```json
/// {
///   "order_uid": "b563feb7b2b84b6test",
///   "track_number": "WBILMTESTTRACK",
///   "entry": "WBIL",
///   "delivery": { "name": "Test Testov", "phone": "+9720000000", ... },
///   "payment": { "transaction": "b563feb7b2b84b6test", "currency": "USD", ... },
///   "items": [ { "chrt_id": 9934930, "name": "Mascaras", ... } ],
///   ...
/// }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fully assembled order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    #[serde(default)]
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    #[serde(default)]
    pub shardkey: String,
    #[serde(default)]
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub oof_shard: String,
}

/// Delivery information (one per order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub zip: String,
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub email: String,
}

/// Payment information (one per order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: String,
    #[serde(default)]
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: i64,
    #[serde(default)]
    pub bank: String,
    #[serde(default)]
    pub delivery_cost: i64,
    #[serde(default)]
    pub goods_total: i64,
    #[serde(default)]
    pub custom_fee: i64,
}

/// A single line item; position in `Order::items` is significant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    #[serde(default)]
    pub sale: i32,
    #[serde(default)]
    pub size: String,
    pub total_price: i64,
    #[serde(default)]
    pub nm_id: i64,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub status: i32,
}

impl Order {
    /// Identifier used as the cache and store key
    #[inline]
    pub fn key(&self) -> &str {
        &self.order_uid
    }

    /// Decodes an order from a raw JSON payload
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Sum of `total_price` across all items
    pub fn items_total(&self) -> i64 {
        self.items.iter().map(|item| item.total_price).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::fixtures::sample_order;

    #[test]
    fn test_decode_reference_payload() {
        let payload = r#"{
            "order_uid": "b563feb7b2b84b6test",
            "track_number": "WBILMTESTTRACK",
            "entry": "WBIL",
            "delivery": {
                "name": "Test Testov",
                "phone": "+9720000000",
                "zip": "2639809",
                "city": "Kiryat Mozkin",
                "address": "Ploshad Mira 15",
                "region": "Kraiot",
                "email": "test@gmail.com"
            },
            "payment": {
                "transaction": "b563feb7b2b84b6test",
                "request_id": "",
                "currency": "USD",
                "provider": "wbpay",
                "amount": 1817,
                "payment_dt": 1637907727,
                "bank": "alpha",
                "delivery_cost": 1500,
                "goods_total": 317,
                "custom_fee": 0
            },
            "items": [
                {
                    "chrt_id": 9934930,
                    "track_number": "WBILMTESTTRACK",
                    "price": 453,
                    "rid": "ab4219087a764ae0btest",
                    "name": "Mascaras",
                    "sale": 30,
                    "size": "0",
                    "total_price": 317,
                    "nm_id": 2389212,
                    "brand": "Vivienne Sabo",
                    "status": 202
                }
            ],
            "locale": "en",
            "internal_signature": "",
            "customer_id": "test",
            "delivery_service": "meest",
            "shardkey": "9",
            "sm_id": 99,
            "date_created": "2021-11-26T06:22:19Z",
            "oof_shard": "1"
        }"#;

        let order = Order::from_json(payload.as_bytes()).unwrap();
        assert_eq!(order.key(), "b563feb7b2b84b6test");
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items_total(), 317);
    }

    #[test]
    fn test_missing_sub_entity_fails_decode() {
        let payload = br#"{"order_uid": "o1", "track_number": "T", "entry": "WBIL"}"#;
        assert!(Order::from_json(payload).is_err());
    }

    #[test]
    fn test_json_round_trip_preserves_item_order() {
        let mut order = sample_order("o1");
        let mut second = order.items[0].clone();
        second.chrt_id = 2;
        second.name = "Second".to_string();
        order.items.push(second);

        let json = serde_json::to_vec(&order).unwrap();
        let decoded = Order::from_json(&json).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.items[1].name, "Second");
    }
}
