//! Polling loop that waits for a payment to settle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use destiny_core::{OrderStatus, TransactionResult};

use super::{AbortHandle, Navigator, PaymentStatus, PaymentSubject};
use crate::api::{ApiError, PaymentStatusApi, TransactionStatusResponse};
use crate::scheduler::Scheduler;
use crate::telemetry;

/// Tuning for [`PaymentStatusPoller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    /// Polls issued before giving up.
    pub max_attempts: u32,
    /// Delay after a pending order status.
    pub pending_interval: Duration,
    /// Delay after a repeat-query result that did not name an interval.
    pub default_repeat_interval: Duration,
    /// Delay between showing a failure and redirecting to the cancel page.
    pub redirect_delay: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            pending_interval: Duration::from_secs(3),
            default_repeat_interval: Duration::from_secs(3),
            redirect_delay: Duration::from_secs(2),
        }
    }
}

/// What a single status response means for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Settled,
    Rejected,
    Pending { retry_in: Duration },
    Unrecognized,
}

impl Verdict {
    /// Classify an order status.
    #[must_use]
    pub const fn from_order_status(status: OrderStatus, pending_interval: Duration) -> Self {
        match status {
            OrderStatus::Paid => Self::Settled,
            OrderStatus::Cancelled | OrderStatus::Refunded => Self::Rejected,
            OrderStatus::PaymentPending => Self::Pending {
                retry_in: pending_interval,
            },
            OrderStatus::Unknown => Self::Unrecognized,
        }
    }

    /// Classify a legacy transaction status.
    #[must_use]
    pub fn from_transaction(response: &TransactionStatusResponse, default_interval: Duration) -> Self {
        match response.result {
            TransactionResult::Success => Self::Settled,
            TransactionResult::Fail => Self::Rejected,
            TransactionResult::RepeatQuery => Self::Pending {
                retry_in: response.next_query_interval().unwrap_or(default_interval),
            },
            TransactionResult::Unknown => Self::Unrecognized,
        }
    }
}

/// Polls the backend until a payment reaches a terminal state.
///
/// The poller is single-use: [`run`](Self::run) consumes it. To try again,
/// build a new one.
pub struct PaymentStatusPoller {
    subject: PaymentSubject,
    api: Arc<dyn PaymentStatusApi>,
    scheduler: Arc<dyn Scheduler>,
    navigator: Arc<dyn Navigator>,
    settings: PollerSettings,
    status: watch::Sender<PaymentStatus>,
    abort: AbortHandle,
}

impl PaymentStatusPoller {
    #[must_use]
    pub fn new(
        subject: PaymentSubject,
        api: Arc<dyn PaymentStatusApi>,
        scheduler: Arc<dyn Scheduler>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (status, _) = watch::channel(PaymentStatus::Checking);
        Self {
            subject,
            api,
            scheduler,
            navigator,
            settings: PollerSettings::default(),
            status,
            abort: AbortHandle::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PollerSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub const fn subject(&self) -> &PaymentSubject {
        &self.subject
    }

    /// Watch status changes. The receiver starts at `Checking`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PaymentStatus> {
        self.status.subscribe()
    }

    /// Handle that stops this poller from another task.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Poll until the payment settles, fails, errors out or the poller is
    /// aborted. Returns the last published status.
    #[instrument(skip(self), fields(subject = %self.subject))]
    pub async fn run(self) -> PaymentStatus {
        let mut attempt: u32 = 0;

        loop {
            if self.abort.is_aborted() {
                debug!(attempt, "Poller aborted");
                return self.current();
            }

            if attempt >= self.settings.max_attempts {
                warn!(attempt, "Payment verification timed out");
                return self.finish(PaymentStatus::Errored {
                    message: "verification timed out".to_string(),
                });
            }

            let verdict = self.poll_once().await;

            if self.abort.is_aborted() {
                debug!(attempt, "Poller aborted; ignoring response");
                return self.current();
            }

            match verdict {
                Err(err) => {
                    warn!(attempt, error = %err, "Payment status request failed");
                    return self.finish(PaymentStatus::Errored {
                        message: err.user_message(),
                    });
                }
                Ok(Verdict::Settled) => {
                    info!(attempt, "Payment settled");
                    return self.finish(PaymentStatus::Succeeded);
                }
                Ok(Verdict::Rejected) => {
                    info!(attempt, "Payment rejected");
                    let status = self.finish(PaymentStatus::Failed);
                    self.redirect_to_cancel().await;
                    return status;
                }
                Ok(Verdict::Unrecognized) => {
                    warn!(attempt, "Unrecognized payment status");
                    return self.finish(PaymentStatus::Errored {
                        message: self.subject.unknown_status_message().to_string(),
                    });
                }
                Ok(Verdict::Pending { retry_in }) => {
                    attempt += 1;
                    debug!(attempt, retry_in_secs = retry_in.as_secs_f64(), "Payment pending");
                    self.scheduler.sleep(retry_in).await;
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<Verdict, ApiError> {
        match &self.subject {
            PaymentSubject::Order(order_id) => {
                let response = self.api.order_status(order_id).await?;
                Ok(Verdict::from_order_status(
                    response.status,
                    self.settings.pending_interval,
                ))
            }
            PaymentSubject::Transaction(transaction_id) => {
                let response = self.api.transaction_status(transaction_id).await?;
                Ok(Verdict::from_transaction(
                    &response,
                    self.settings.default_repeat_interval,
                ))
            }
        }
    }

    async fn redirect_to_cancel(&self) {
        self.scheduler.sleep(self.settings.redirect_delay).await;
        if self.abort.is_aborted() {
            debug!("Poller aborted; skipping cancel redirect");
            return;
        }
        self.navigator.navigate(&self.subject.cancel_path());
    }

    fn current(&self) -> PaymentStatus {
        self.status.borrow().clone()
    }

    fn finish(&self, status: PaymentStatus) -> PaymentStatus {
        let outcome = match &status {
            PaymentStatus::Checking => "checking",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Errored { .. } => "errored",
        };
        let subject = self.subject.to_string();
        telemetry::add_breadcrumb(
            "payment",
            &format!("Payment verification {outcome}"),
            &[("subject", subject.as_str())],
        );
        self.status.send_replace(status.clone());
        status
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use destiny_core::{OrderId, TransactionId};

    use super::*;
    use crate::api::OrderStatusResponse;
    use crate::scheduler::TokioScheduler;

    /// Scripted status source. The last scripted reply repeats forever.
    #[derive(Default)]
    struct FakeStatusApi {
        orders: Mutex<VecDeque<&'static str>>,
        transactions: Mutex<VecDeque<serde_json::Value>>,
        calls: AtomicUsize,
        abort_on_call: Mutex<Option<AbortHandle>>,
        fail: bool,
    }

    impl FakeStatusApi {
        fn orders(statuses: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                orders: Mutex::new(statuses.iter().copied().collect()),
                ..Self::default()
            })
        }

        fn transactions(replies: Vec<serde_json::Value>) -> Arc<Self> {
            Arc::new(Self {
                transactions: Mutex::new(replies.into()),
                ..Self::default()
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn record_call(&self) -> Result<(), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = self.abort_on_call.lock().unwrap().as_ref() {
                handle.abort();
            }
            if self.fail {
                return Err(ApiError::from_response(
                    404,
                    r#"{"code":"ORDER_NOT_FOUND"}"#,
                ));
            }
            Ok(())
        }
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> T {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }

    #[async_trait]
    impl PaymentStatusApi for FakeStatusApi {
        async fn order_status(&self, _: &OrderId) -> Result<OrderStatusResponse, ApiError> {
            self.record_call()?;
            let status = next(&self.orders);
            Ok(serde_json::from_value(serde_json::json!({ "status": status })).unwrap())
        }

        async fn transaction_status(
            &self,
            _: &TransactionId,
        ) -> Result<TransactionStatusResponse, ApiError> {
            self.record_call()?;
            Ok(serde_json::from_value(next(&self.transactions)).unwrap())
        }
    }

    /// Returns immediately and remembers every requested delay.
    #[derive(Default)]
    struct RecordingScheduler {
        delays: Mutex<Vec<Duration>>,
    }

    impl RecordingScheduler {
        fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Scheduler for RecordingScheduler {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        paths: Mutex<Vec<String>>,
    }

    impl RecordingNavigator {
        fn paths(&self) -> Vec<String> {
            self.paths.lock().unwrap().clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, path: &str) {
            self.paths.lock().unwrap().push(path.to_string());
        }
    }

    fn order() -> PaymentSubject {
        PaymentSubject::from_query(Some("o1"), None).unwrap()
    }

    fn transaction() -> PaymentSubject {
        PaymentSubject::from_query(None, Some("t1")).unwrap()
    }

    fn poller(
        subject: PaymentSubject,
        api: Arc<FakeStatusApi>,
    ) -> (
        PaymentStatusPoller,
        Arc<RecordingScheduler>,
        Arc<RecordingNavigator>,
    ) {
        let scheduler = Arc::new(RecordingScheduler::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let poller = PaymentStatusPoller::new(subject, api, scheduler.clone(), navigator.clone());
        (poller, scheduler, navigator)
    }

    #[tokio::test]
    async fn test_pending_then_paid_succeeds() {
        let api = FakeStatusApi::orders(&["PAYMENT_PENDING", "PAYMENT_PENDING", "PAID"]);
        let (poller, scheduler, navigator) = poller(order(), api.clone());
        let receiver = poller.subscribe();

        assert_eq!(poller.run().await, PaymentStatus::Succeeded);
        assert_eq!(api.calls(), 3);
        assert_eq!(scheduler.delays(), vec![Duration::from_secs(3); 2]);
        assert_eq!(*receiver.borrow(), PaymentStatus::Succeeded);
        assert!(navigator.paths().is_empty());
    }

    #[tokio::test]
    async fn test_attempt_ceiling() {
        let api = FakeStatusApi::orders(&["PAYMENT_PENDING"]);
        let (poller, scheduler, _) = poller(order(), api.clone());

        assert_eq!(
            poller.run().await,
            PaymentStatus::Errored {
                message: "verification timed out".to_string()
            }
        );
        assert_eq!(api.calls(), 20);
        assert_eq!(scheduler.delays().len(), 20);
    }

    #[tokio::test]
    async fn test_custom_attempt_ceiling() {
        let api = FakeStatusApi::orders(&["PAYMENT_PENDING"]);
        let (poller, _, _) = poller(order(), api.clone());
        let poller = poller.with_settings(PollerSettings {
            max_attempts: 3,
            ..PollerSettings::default()
        });

        assert!(matches!(poller.run().await, PaymentStatus::Errored { .. }));
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_unknown_order_status_errors() {
        let api = FakeStatusApi::orders(&["ON_HOLD"]);
        let (poller, _, navigator) = poller(order(), api.clone());

        assert_eq!(
            poller.run().await,
            PaymentStatus::Errored {
                message: "unknown order status".to_string()
            }
        );
        assert_eq!(api.calls(), 1);
        assert!(navigator.paths().is_empty());
    }

    #[tokio::test]
    async fn test_api_error_uses_user_message() {
        let api = FakeStatusApi::failing();
        let (poller, scheduler, _) = poller(order(), api.clone());

        assert_eq!(
            poller.run().await,
            PaymentStatus::Errored {
                message: "We could not find that order.".to_string()
            }
        );
        assert_eq!(api.calls(), 1);
        assert!(scheduler.delays().is_empty());
    }

    #[tokio::test]
    async fn test_refunded_redirects_to_cancel() {
        let api = FakeStatusApi::orders(&["REFUNDED"]);
        let (poller, scheduler, navigator) = poller(order(), api.clone());

        assert_eq!(poller.run().await, PaymentStatus::Failed);
        assert_eq!(scheduler.delays(), vec![Duration::from_secs(2)]);
        assert_eq!(navigator.paths(), vec!["/cancel?orderId=o1".to_string()]);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_shows_failure_before_redirect() {
        let api = FakeStatusApi::orders(&["CANCELLED"]);
        let navigator = Arc::new(RecordingNavigator::default());
        let poller = PaymentStatusPoller::new(
            order(),
            api,
            Arc::new(TokioScheduler),
            navigator.clone(),
        );
        let mut receiver = poller.subscribe();
        let task = tokio::spawn(poller.run());

        receiver.changed().await.unwrap();
        assert_eq!(*receiver.borrow(), PaymentStatus::Failed);
        assert!(navigator.paths().is_empty());

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(navigator.paths().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(navigator.paths(), vec!["/cancel?orderId=o1".to_string()]);
        assert_eq!(task.await.unwrap(), PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_repeat_query_uses_server_interval() {
        let api = FakeStatusApi::transactions(vec![
            serde_json::json!({ "result": "REPEAT_QUERY", "nextQueryInterval": "5" }),
            serde_json::json!({ "result": "REPEAT_QUERY" }),
            serde_json::json!({ "result": "SUCCESS" }),
        ]);
        let (poller, scheduler, _) = poller(transaction(), api.clone());

        assert_eq!(poller.run().await, PaymentStatus::Succeeded);
        assert_eq!(
            scheduler.delays(),
            vec![Duration::from_secs(5), Duration::from_secs(3)]
        );
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_transaction_fail_redirects_with_transaction_id() {
        let api = FakeStatusApi::transactions(vec![serde_json::json!({ "result": "FAIL" })]);
        let (poller, _, navigator) = poller(transaction(), api);

        assert_eq!(poller.run().await, PaymentStatus::Failed);
        assert_eq!(
            navigator.paths(),
            vec!["/cancel?transactionId=t1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_transaction_result_errors() {
        let api = FakeStatusApi::transactions(vec![serde_json::json!({ "result": "PENDING" })]);
        let (poller, _, _) = poller(transaction(), api);

        assert_eq!(
            poller.run().await,
            PaymentStatus::Errored {
                message: "unknown payment status".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_aborted_before_run_never_polls() {
        let api = FakeStatusApi::orders(&["PAID"]);
        let (poller, _, _) = poller(order(), api.clone());
        poller.abort_handle().abort();

        assert_eq!(poller.run().await, PaymentStatus::Checking);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_late_response_after_abort_is_ignored() {
        let api = FakeStatusApi::orders(&["PAID"]);
        let (poller, _, _) = poller(order(), api.clone());
        *api.abort_on_call.lock().unwrap() = Some(poller.abort_handle());
        let receiver = poller.subscribe();

        assert_eq!(poller.run().await, PaymentStatus::Checking);
        assert_eq!(api.calls(), 1);
        assert_eq!(*receiver.borrow(), PaymentStatus::Checking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_suppresses_redirect() {
        let api = FakeStatusApi::orders(&["CANCELLED"]);
        let navigator = Arc::new(RecordingNavigator::default());
        let poller = PaymentStatusPoller::new(
            order(),
            api.clone(),
            Arc::new(TokioScheduler),
            navigator.clone(),
        );
        let abort = poller.abort_handle();
        let mut receiver = poller.subscribe();
        let task = tokio::spawn(poller.run());

        receiver.changed().await.unwrap();
        abort.abort();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(task.await.unwrap(), PaymentStatus::Failed);
        assert!(navigator.paths().is_empty());
        assert_eq!(api.calls(), 1);
    }

    #[test]
    fn test_verdict_classification() {
        let interval = Duration::from_secs(3);
        assert_eq!(
            Verdict::from_order_status(OrderStatus::Paid, interval),
            Verdict::Settled
        );
        assert_eq!(
            Verdict::from_order_status(OrderStatus::Refunded, interval),
            Verdict::Rejected
        );
        assert_eq!(
            Verdict::from_order_status(OrderStatus::PaymentPending, interval),
            Verdict::Pending { retry_in: interval }
        );
        assert_eq!(
            Verdict::from_order_status(OrderStatus::Unknown, interval),
            Verdict::Unrecognized
        );
    }
}
