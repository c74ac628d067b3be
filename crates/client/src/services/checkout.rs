//! Subscription checkout.
//!
//! Creating an order hands back a hosted checkout URL. When the checkout
//! redirects back into the app, [`CheckoutService::poller_from_query`] turns
//! the redirect's query parameters into a [`PaymentStatusPoller`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::api::{ApiClient, ApiError, CreatedOrder};
use crate::payment::{Navigator, PaymentError, PaymentStatusPoller, PaymentSubject, PollerSettings};
use crate::scheduler::Scheduler;

/// Errors that can occur when starting a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("plan id cannot be empty")]
    MissingPlan,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Order creation and payment confirmation.
#[derive(Clone)]
pub struct CheckoutService {
    api: ApiClient,
    scheduler: Arc<dyn Scheduler>,
    navigator: Arc<dyn Navigator>,
    settings: PollerSettings,
}

impl CheckoutService {
    #[must_use]
    pub fn new(api: ApiClient, scheduler: Arc<dyn Scheduler>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            api,
            scheduler,
            navigator,
            settings: PollerSettings::default(),
        }
    }

    /// Settings applied to every poller this service builds.
    #[must_use]
    pub fn with_poller_settings(mut self, settings: PollerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Create an order for `plan_id`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::MissingPlan` for a blank plan id, or
    /// `CheckoutError::Api` if the backend call fails.
    #[instrument(skip(self))]
    pub async fn create_order(&self, plan_id: &str) -> Result<CreatedOrder, CheckoutError> {
        let plan_id = plan_id.trim();
        if plan_id.is_empty() {
            return Err(CheckoutError::MissingPlan);
        }
        let order = self.api.create_order(plan_id).await?;
        info!(order_id = %order.order_id, "Order created");
        Ok(order)
    }

    /// A fresh poller for `subject`.
    #[must_use]
    pub fn poller_for(&self, subject: PaymentSubject) -> PaymentStatusPoller {
        PaymentStatusPoller::new(
            subject,
            Arc::new(self.api.clone()),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.navigator),
        )
        .with_settings(self.settings.clone())
    }

    /// A poller for the identifiers a checkout redirect carried.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError` when neither identifier is usable; no request
    /// is made in that case.
    pub fn poller_from_query(
        &self,
        order_id: Option<&str>,
        transaction_id: Option<&str>,
    ) -> Result<PaymentStatusPoller, PaymentError> {
        PaymentSubject::from_query(order_id, transaction_id).map(|subject| self.poller_for(subject))
    }
}
