/// Order Validator - Business Rule Validation
///
/// This module provides validation logic for inbound orders to ensure they
/// are well-formed before the ingestion path writes them to the durable store.
///
/// ## Validation Rules
/// - Required scalar fields must not be empty
/// - Delivery and payment sub-entities must carry their required fields
/// - At least one item, at most `max_items`
/// - Monetary amounts and item quantities must not be negative
/// - Order identifier length is bounded
///
/// ## Usage
/// ```rust,ignore
/// use order_cache::domain::validation::OrderValidator;
///
/// let validator = OrderValidator::new();
/// match validator.validate(&order) {
///     Ok(()) => println!("Order is valid"),
///     Err(e) => println!("Validation error: {}", e),
/// }
/// ```

use crate::domain::order::{Delivery, Item, Order, Payment};

/// Validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is empty
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Order identifier is malformed
    #[error("Invalid order_uid: {0}")]
    InvalidKey(String),

    /// Item list is empty or too long
    #[error("Invalid items: {0}")]
    InvalidItems(String),

    /// Monetary amount is negative or inconsistent
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Field has a value outside the accepted set
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Order validation configuration
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Maximum length of `order_uid` in bytes
    pub max_key_len: usize,

    /// Maximum number of items per order
    pub max_items: usize,

    /// Require `payment.goods_total` to equal the sum of item totals
    pub strict_totals: bool,

    /// Allowed currencies (empty means all currencies allowed)
    pub allowed_currencies: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_key_len: 64,
            max_items: 1000,
            strict_totals: false,
            allowed_currencies: Vec::new(),
        }
    }
}

/// Order validator
///
/// Validates orders according to business rules and configuration.
#[derive(Debug, Clone)]
pub struct OrderValidator {
    config: ValidationConfig,
}

impl OrderValidator {
    /// Creates a new validator with default configuration
    pub fn new() -> Self {
        Self {
            config: ValidationConfig::default(),
        }
    }

    /// Creates a new validator with custom configuration
    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validates an order
    ///
    /// # Returns
    /// * `Ok(())` if the order is valid
    /// * `Err(ValidationError)` describing the first violated rule
    pub fn validate(&self, order: &Order) -> Result<(), ValidationError> {
        self.validate_key(&order.order_uid)?;

        require("track_number", &order.track_number)?;
        require("entry", &order.entry)?;
        require("locale", &order.locale)?;
        require("customer_id", &order.customer_id)?;
        require("delivery_service", &order.delivery_service)?;

        if order.sm_id < 0 {
            return Err(ValidationError::InvalidValue(
                format!("sm_id {} is negative", order.sm_id)
            ));
        }

        self.validate_delivery(&order.delivery)?;
        self.validate_payment(&order.payment)?;
        self.validate_items(&order.items)?;

        if self.config.strict_totals && order.payment.goods_total != order.items_total() {
            return Err(ValidationError::InvalidAmount(format!(
                "goods_total {} does not match item totals {}",
                order.payment.goods_total,
                order.items_total()
            )));
        }

        Ok(())
    }

    /// Validates the order identifier
    fn validate_key(&self, key: &str) -> Result<(), ValidationError> {
        if key.trim().is_empty() {
            return Err(ValidationError::MissingField("order_uid".to_string()));
        }

        if key.len() > self.config.max_key_len {
            return Err(ValidationError::InvalidKey(format!(
                "length {} exceeds maximum {}",
                key.len(),
                self.config.max_key_len
            )));
        }

        if key.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidKey(
                "must not contain whitespace".to_string()
            ));
        }

        Ok(())
    }

    fn validate_delivery(&self, delivery: &Delivery) -> Result<(), ValidationError> {
        require("delivery.name", &delivery.name)?;
        require("delivery.phone", &delivery.phone)?;
        require("delivery.city", &delivery.city)?;
        require("delivery.address", &delivery.address)?;

        if !delivery.email.is_empty() && !delivery.email.contains('@') {
            return Err(ValidationError::InvalidValue(
                format!("delivery.email '{}' is not an address", delivery.email)
            ));
        }

        Ok(())
    }

    fn validate_payment(&self, payment: &Payment) -> Result<(), ValidationError> {
        require("payment.transaction", &payment.transaction)?;
        require("payment.currency", &payment.currency)?;
        require("payment.provider", &payment.provider)?;

        for (field, value) in [
            ("payment.amount", payment.amount),
            ("payment.payment_dt", payment.payment_dt),
            ("payment.delivery_cost", payment.delivery_cost),
            ("payment.goods_total", payment.goods_total),
            ("payment.custom_fee", payment.custom_fee),
        ] {
            if value < 0 {
                return Err(ValidationError::InvalidAmount(
                    format!("{} is negative ({})", field, value)
                ));
            }
        }

        // If allowed_currencies is configured, check the currency is in the list
        if !self.config.allowed_currencies.is_empty()
            && !self
                .config
                .allowed_currencies
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&payment.currency))
        {
            return Err(ValidationError::InvalidValue(
                format!("currency '{}' is not in allowed list", payment.currency)
            ));
        }

        Ok(())
    }

    fn validate_items(&self, items: &[Item]) -> Result<(), ValidationError> {
        if items.is_empty() {
            return Err(ValidationError::InvalidItems(
                "order must contain at least one item".to_string()
            ));
        }

        if items.len() > self.config.max_items {
            return Err(ValidationError::InvalidItems(format!(
                "{} items exceeds maximum {}",
                items.len(),
                self.config.max_items
            )));
        }

        for (idx, item) in items.iter().enumerate() {
            if item.name.trim().is_empty() {
                return Err(ValidationError::MissingField(format!("items[{}].name", idx)));
            }
            if item.rid.trim().is_empty() {
                return Err(ValidationError::MissingField(format!("items[{}].rid", idx)));
            }
            if item.chrt_id < 0 || item.nm_id < 0 {
                return Err(ValidationError::InvalidValue(
                    format!("items[{}] has a negative identifier", idx)
                ));
            }
            if item.price < 0 || item.total_price < 0 {
                return Err(ValidationError::InvalidAmount(
                    format!("items[{}] has a negative price", idx)
                ));
            }
            if !(0..=100).contains(&item.sale) {
                return Err(ValidationError::InvalidValue(
                    format!("items[{}].sale {} is not a percentage", idx, item.sale)
                ));
            }
        }

        Ok(())
    }
}

impl Default for OrderValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}
