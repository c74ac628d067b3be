//! Order and payment status endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use destiny_core::{OrderId, OrderStatus, TransactionId, TransactionResult};

use super::client::ApiClient;
use super::error::ApiError;

/// Response of `GET /user/order/v1/{orderId}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub status: OrderStatus,
}

/// Response of `GET /user/payment/v1/{transactionId}/status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusResponse {
    pub result: TransactionResult,
    /// Seconds until the next query. Documented as a string; numbers are
    /// accepted too.
    #[serde(default)]
    pub next_query_interval: Option<serde_json::Value>,
}

/// Shortest retry delay honoured from `nextQueryInterval`.
pub const MIN_QUERY_INTERVAL: Duration = Duration::from_secs(1);

impl TransactionStatusResponse {
    /// The requested retry delay, if present and parseable.
    ///
    /// Fractional seconds are accepted. Values below [`MIN_QUERY_INTERVAL`]
    /// are raised to it; negative or non-numeric values yield `None`.
    #[must_use]
    pub fn next_query_interval(&self) -> Option<Duration> {
        let secs = match self.next_query_interval.as_ref()? {
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
            serde_json::Value::Number(n) => n.as_f64()?,
            _ => return None,
        };
        let delay = Duration::try_from_secs_f64(secs).ok()?;
        Some(delay.max(MIN_QUERY_INTERVAL))
    }
}

/// Request body for `POST /user/order/v1`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest<'a> {
    pub plan_id: &'a str,
}

/// Response of `POST /user/order/v1`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_id: OrderId,
    /// Hosted checkout page to send the user to.
    pub checkout_url: String,
}

/// Source of payment settlement status.
#[async_trait]
pub trait PaymentStatusApi: Send + Sync {
    /// Current status of an order.
    async fn order_status(&self, order_id: &OrderId) -> Result<OrderStatusResponse, ApiError>;

    /// Current status of a legacy subscription transaction.
    async fn transaction_status(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<TransactionStatusResponse, ApiError>;
}

#[async_trait]
impl PaymentStatusApi for ApiClient {
    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn order_status(&self, order_id: &OrderId) -> Result<OrderStatusResponse, ApiError> {
        self.get(&format!("/user/order/v1/{order_id}")).await
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    async fn transaction_status(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<TransactionStatusResponse, ApiError> {
        self.get(&format!("/user/payment/v1/{transaction_id}/status"))
            .await
    }
}

impl ApiClient {
    /// Create an order for a subscription plan.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or is rejected.
    #[instrument(skip(self))]
    pub async fn create_order(&self, plan_id: &str) -> Result<CreatedOrder, ApiError> {
        self.post("/user/order/v1", &CreateOrderRequest { plan_id })
            .await
    }
}
