//! Refund approval workflow.
//!
//! Refund requests for orders and reservations share one state machine:
//!
//! ```text
//! pending ──approve──► processing ──processor ok──► (parent REFUNDED, request removed)
//!    │                     │
//!    │                     ├──processor error──► failed ──approve──► processing ...
//!    │                     └──timeout──────────► processing (left for reconciliation)
//!    └──disapprove──► (parent restored, request removed)
//! ```
//!
//! Claiming a request is a single guarded update, so two operators
//! approving the same request cannot both reach the processor.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument, warn};

use dreampos_core::{PaymentId, PaymentStatus, RefundAction, RefundType};

use crate::db::RepositoryError;
use crate::models::{RefundOutcome, RefundParent, RefundRecord};
use crate::stripe::StripeError;

/// Persistence needed by the refund workflow.
pub trait RefundStore: Send + Sync {
    /// The open request for `parent`, if its parent is `REFUND_PENDING`.
    fn find(
        &self,
        parent: RefundParent,
    ) -> impl Future<Output = Result<Option<RefundRecord>, RepositoryError>> + Send;

    /// Whether the order or reservation exists.
    fn parent_exists(
        &self,
        parent: RefundParent,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Claim a pending or failed request. `false` means someone else holds it.
    fn begin_processing(
        &self,
        parent: RefundParent,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Record a rejected processor call.
    fn mark_failed(
        &self,
        parent: RefundParent,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Finish a claimed request.
    fn complete(
        &self,
        parent: RefundParent,
        payment: Option<PaymentId>,
        processor_refund_id: Option<&str>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Reject a pending or failed request. `false` means it was not in either state.
    fn disapprove(
        &self,
        parent: RefundParent,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Sends money back through the payment processor.
pub trait RefundProcessor: Send + Sync {
    /// Refund `amount_cents` of a payment intent, returning the processor's refund id.
    fn refund(
        &self,
        payment_intent_id: &str,
        amount_cents: i64,
    ) -> impl Future<Output = Result<String, StripeError>> + Send;
}

/// Errors from the refund workflow.
#[derive(Debug, Error)]
pub enum RefundError {
    /// Bad action or refund type in the request.
    #[error("{0}")]
    Validation(String),

    /// Neither an order nor a reservation with this id exists.
    #[error("refund request not found")]
    NotFound,

    /// The request is not in a state that allows the action.
    #[error("{0}")]
    Conflict(String),

    /// A processor payment was completed but has no payment intent on record.
    #[error("payment {0} has no payment intent to refund")]
    MissingPaymentIntent(PaymentId),

    /// The processor rejected the refund. The request is now `failed`.
    #[error("refund was rejected by the payment processor: {0}")]
    Processor(#[source] StripeError),

    /// The processor did not answer in time. The request stays `processing`.
    #[error("payment processor did not respond; refund outcome is unknown")]
    ProcessorTimeout,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for RefundError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::Invalid(msg) => Self::Validation(msg),
            other => Self::Repository(other),
        }
    }
}

/// Parse the `action` field of a refund action request.
///
/// # Errors
///
/// Returns `RefundError::Validation` for anything but `approve`/`disapprove`.
pub fn parse_action(action: &str) -> Result<RefundAction, RefundError> {
    action
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| RefundError::Validation("action must be 'approve' or 'disapprove'".to_owned()))
}

/// Parse an optional `refundType` field.
///
/// # Errors
///
/// Returns `RefundError::Validation` for an unknown type.
pub fn parse_refund_type(value: Option<&str>) -> Result<Option<RefundType>, RefundError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .to_ascii_lowercase()
            .parse()
            .map(Some)
            .map_err(|_| {
                RefundError::Validation("refundType must be 'order' or 'reservation'".to_owned())
            }),
    }
}

/// Approve/disapprove decisions on refund requests.
pub struct RefundWorkflow<S, P> {
    store: S,
    processor: P,
    processor_timeout: Duration,
}

impl<S: RefundStore, P: RefundProcessor> RefundWorkflow<S, P> {
    /// Create a workflow that waits at most `processor_timeout` for a refund.
    #[must_use]
    pub const fn new(store: S, processor: P, processor_timeout: Duration) -> Self {
        Self {
            store,
            processor,
            processor_timeout,
        }
    }

    /// Work out which parent an id refers to.
    ///
    /// With an explicit type the id is taken as is. Without one, an open
    /// request is looked for under both kinds; finding two is ambiguous.
    ///
    /// # Errors
    ///
    /// Returns `RefundError::Validation` when both kinds have an open request.
    /// Returns `RefundError::Repository` if a lookup fails.
    pub async fn resolve(
        &self,
        id: i64,
        refund_type: Option<RefundType>,
    ) -> Result<RefundParent, RefundError> {
        if let Some(kind) = refund_type {
            return Ok(RefundParent::new(id, kind));
        }

        let order = RefundParent::new(id, RefundType::Order);
        let reservation = RefundParent::new(id, RefundType::Reservation);
        let order_open = self.store.find(order).await?.is_some();
        let reservation_open = self.store.find(reservation).await?.is_some();

        match (order_open, reservation_open) {
            (true, true) => Err(RefundError::Validation(format!(
                "id {id} has open refunds for both an order and a reservation; pass refundType"
            ))),
            (false, true) => Ok(reservation),
            (true, false) => Ok(order),
            (false, false) => {
                if !self.store.parent_exists(order).await?
                    && self.store.parent_exists(reservation).await?
                {
                    Ok(reservation)
                } else {
                    Ok(order)
                }
            }
        }
    }

    /// Apply an operator's decision.
    ///
    /// # Errors
    ///
    /// See [`Self::approve`] and [`Self::disapprove`].
    pub async fn act(
        &self,
        parent: RefundParent,
        action: RefundAction,
    ) -> Result<RefundOutcome, RefundError> {
        match action {
            RefundAction::Approve => self.approve(parent).await,
            RefundAction::Disapprove => self.disapprove(parent).await,
        }
    }

    /// Approve a request and return the money.
    ///
    /// Payments taken through the processor are refunded there; anything
    /// else (cash, card terminal, or no completed processor payment) is
    /// settled offline and only the records change.
    ///
    /// # Errors
    ///
    /// Returns `RefundError::NotFound` if the parent does not exist.
    /// Returns `RefundError::Conflict` if no actionable request exists or
    /// another approval holds it.
    /// Returns `RefundError::Processor` if the processor rejects the refund.
    /// Returns `RefundError::ProcessorTimeout` if the processor does not answer.
    #[instrument(skip(self), fields(refund = %parent))]
    pub async fn approve(&self, parent: RefundParent) -> Result<RefundOutcome, RefundError> {
        let record = self.load_actionable(parent).await?;

        if !self.store.begin_processing(parent).await? {
            return Err(RefundError::Conflict(
                "refund is already being processed".to_owned(),
            ));
        }

        let processor_payment = record
            .payment
            .as_ref()
            .filter(|p| p.method.uses_processor() && p.status == PaymentStatus::Completed);

        let Some(payment) = processor_payment else {
            let payment_id = record.payment.as_ref().map(|p| p.id);
            self.store.complete(parent, payment_id, None).await?;
            info!("Refund settled offline");
            return Ok(RefundOutcome::RefundedOffline);
        };

        let Some(intent) = payment.payment_intent_id.as_deref() else {
            self.store.mark_failed(parent).await?;
            return Err(RefundError::MissingPaymentIntent(payment.id));
        };

        let call = self.processor.refund(intent, payment.amount_cents);
        match tokio::time::timeout(self.processor_timeout, call).await {
            Ok(Ok(processor_refund_id)) => {
                self.store
                    .complete(parent, Some(payment.id), Some(&processor_refund_id))
                    .await?;
                info!(processor_refund_id = %processor_refund_id, "Refund completed");
                Ok(RefundOutcome::Refunded {
                    processor_refund_id,
                })
            }
            Ok(Err(StripeError::Timeout)) | Err(_) => {
                warn!(payment_intent = %intent, "Refund call timed out; left processing");
                Err(RefundError::ProcessorTimeout)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Refund rejected by processor");
                self.store.mark_failed(parent).await?;
                Err(RefundError::Processor(e))
            }
        }
    }

    /// Reject a request and return the parent to its pre-request status.
    ///
    /// # Errors
    ///
    /// Returns `RefundError::NotFound` if the parent does not exist.
    /// Returns `RefundError::Conflict` if no actionable request exists.
    #[instrument(skip(self), fields(refund = %parent))]
    pub async fn disapprove(&self, parent: RefundParent) -> Result<RefundOutcome, RefundError> {
        self.load_actionable(parent).await?;

        if !self.store.disapprove(parent).await? {
            return Err(RefundError::Conflict(
                "refund request changed while being disapproved".to_owned(),
            ));
        }
        info!("Refund disapproved");
        Ok(RefundOutcome::Disapproved)
    }

    async fn load_actionable(&self, parent: RefundParent) -> Result<RefundRecord, RefundError> {
        match self.store.find(parent).await? {
            Some(record) if record.status.is_actionable() => Ok(record),
            Some(record) => Err(RefundError::Conflict(format!(
                "refund for {parent} is {}",
                record.status
            ))),
            None if self.store.parent_exists(parent).await? => Err(RefundError::Conflict(format!(
                "{parent} has no pending refund request"
            ))),
            None => Err(RefundError::NotFound),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use dreampos_core::{OrderId, PaymentMethod, RefundRequestStatus, ReservationId};

    use super::*;
    use crate::models::RefundablePayment;

    /// In-memory store: open requests by parent plus a set of existing parents.
    #[derive(Default)]
    struct FakeStore {
        requests: Mutex<HashMap<RefundParent, RefundRecord>>,
        parents: Vec<RefundParent>,
        completed: Mutex<Vec<(RefundParent, Option<String>)>>,
    }

    impl FakeStore {
        fn with_request(record: RefundRecord) -> Self {
            let parent = record.parent;
            Self {
                requests: Mutex::new(HashMap::from([(parent, record)])),
                parents: vec![parent],
                ..Self::default()
            }
        }

        fn status(&self, parent: RefundParent) -> Option<RefundRequestStatus> {
            self.requests.lock().unwrap().get(&parent).map(|r| r.status)
        }
    }

    impl RefundStore for FakeStore {
        async fn find(&self, parent: RefundParent) -> Result<Option<RefundRecord>, RepositoryError> {
            Ok(self.requests.lock().unwrap().get(&parent).cloned())
        }

        async fn parent_exists(&self, parent: RefundParent) -> Result<bool, RepositoryError> {
            Ok(self.parents.contains(&parent))
        }

        async fn begin_processing(&self, parent: RefundParent) -> Result<bool, RepositoryError> {
            let mut requests = self.requests.lock().unwrap();
            match requests.get_mut(&parent) {
                Some(r) if r.status.is_actionable() => {
                    r.status = RefundRequestStatus::Processing;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn mark_failed(&self, parent: RefundParent) -> Result<(), RepositoryError> {
            let mut requests = self.requests.lock().unwrap();
            let record = requests.get_mut(&parent).ok_or(RepositoryError::NotFound)?;
            record.status = RefundRequestStatus::Failed;
            Ok(())
        }

        async fn complete(
            &self,
            parent: RefundParent,
            _payment: Option<PaymentId>,
            processor_refund_id: Option<&str>,
        ) -> Result<(), RepositoryError> {
            self.requests.lock().unwrap().remove(&parent);
            self.completed
                .lock()
                .unwrap()
                .push((parent, processor_refund_id.map(str::to_owned)));
            Ok(())
        }

        async fn disapprove(&self, parent: RefundParent) -> Result<bool, RepositoryError> {
            let mut requests = self.requests.lock().unwrap();
            match requests.get(&parent) {
                Some(r) if r.status.is_actionable() => {
                    requests.remove(&parent);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    enum Behavior {
        Succeed,
        Reject,
        Hang,
    }

    struct FakeProcessor {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeProcessor {
        const fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RefundProcessor for FakeProcessor {
        async fn refund(&self, _intent: &str, _amount_cents: i64) -> Result<String, StripeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok("re_123".to_owned()),
                Behavior::Reject => Err(StripeError::Api {
                    status: 400,
                    message: "charge already refunded".to_owned(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("re_late".to_owned())
                }
            }
        }
    }

    const ORDER: RefundParent = RefundParent::Order(OrderId::new(7));

    fn record(method: PaymentMethod, intent: Option<&str>) -> RefundRecord {
        RefundRecord {
            parent: ORDER,
            status: RefundRequestStatus::Pending,
            payment: Some(RefundablePayment {
                id: PaymentId::new(1),
                amount_cents: 2500,
                currency: "usd".to_owned(),
                method,
                status: PaymentStatus::Completed,
                payment_intent_id: intent.map(str::to_owned),
            }),
        }
    }

    fn workflow(store: FakeStore, behavior: Behavior) -> RefundWorkflow<FakeStore, FakeProcessor> {
        RefundWorkflow::new(store, FakeProcessor::new(behavior), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_approve_refunds_through_processor() {
        let wf = workflow(
            FakeStore::with_request(record(PaymentMethod::Stripe, Some("pi_1"))),
            Behavior::Succeed,
        );
        let outcome = wf.approve(ORDER).await.unwrap();
        assert_eq!(
            outcome,
            RefundOutcome::Refunded {
                processor_refund_id: "re_123".to_owned()
            }
        );
        assert_eq!(
            wf.store.completed.lock().unwrap().as_slice(),
            &[(ORDER, Some("re_123".to_owned()))]
        );
    }

    #[tokio::test]
    async fn test_approve_cash_payment_settles_offline() {
        let wf = workflow(
            FakeStore::with_request(record(PaymentMethod::Cash, None)),
            Behavior::Succeed,
        );
        assert_eq!(wf.approve(ORDER).await.unwrap(), RefundOutcome::RefundedOffline);
        assert_eq!(wf.processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_approve_without_payment_settles_offline() {
        let mut rec = record(PaymentMethod::Stripe, None);
        rec.payment = None;
        let wf = workflow(FakeStore::with_request(rec), Behavior::Succeed);
        assert_eq!(wf.approve(ORDER).await.unwrap(), RefundOutcome::RefundedOffline);
    }

    #[tokio::test]
    async fn test_processor_rejection_leaves_request_failed_and_retryable() {
        let wf = workflow(
            FakeStore::with_request(record(PaymentMethod::Stripe, Some("pi_1"))),
            Behavior::Reject,
        );
        assert!(matches!(wf.approve(ORDER).await, Err(RefundError::Processor(_))));
        assert_eq!(wf.store.status(ORDER), Some(RefundRequestStatus::Failed));

        // A failed request can be approved again.
        assert!(matches!(wf.approve(ORDER).await, Err(RefundError::Processor(_))));
        assert_eq!(wf.processor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_processor_timeout_leaves_request_processing() {
        let wf = workflow(
            FakeStore::with_request(record(PaymentMethod::Stripe, Some("pi_1"))),
            Behavior::Hang,
        );
        assert!(matches!(wf.approve(ORDER).await, Err(RefundError::ProcessorTimeout)));
        assert_eq!(wf.store.status(ORDER), Some(RefundRequestStatus::Processing));

        // Processing requests are not actionable.
        assert!(matches!(wf.approve(ORDER).await, Err(RefundError::Conflict(_))));
        assert!(matches!(wf.disapprove(ORDER).await, Err(RefundError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_missing_intent_on_completed_processor_payment_fails() {
        let wf = workflow(
            FakeStore::with_request(record(PaymentMethod::Stripe, None)),
            Behavior::Succeed,
        );
        assert!(matches!(
            wf.approve(ORDER).await,
            Err(RefundError::MissingPaymentIntent(_))
        ));
        assert_eq!(wf.store.status(ORDER), Some(RefundRequestStatus::Failed));
    }

    #[tokio::test]
    async fn test_disapprove_removes_request() {
        let wf = workflow(
            FakeStore::with_request(record(PaymentMethod::Stripe, Some("pi_1"))),
            Behavior::Succeed,
        );
        assert_eq!(wf.disapprove(ORDER).await.unwrap(), RefundOutcome::Disapproved);
        assert_eq!(wf.store.status(ORDER), None);
        assert_eq!(wf.processor.calls.load(Ordering::SeqCst), 0);

        // Second decision finds nothing to act on.
        assert!(matches!(wf.approve(ORDER).await, Err(RefundError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_unknown_parent_is_not_found() {
        let wf = workflow(FakeStore::default(), Behavior::Succeed);
        assert!(matches!(wf.approve(ORDER).await, Err(RefundError::NotFound)));
    }

    #[tokio::test]
    async fn test_resolve_without_type() {
        let reservation = RefundParent::Reservation(ReservationId::new(7));
        let mut rec = record(PaymentMethod::Cash, None);
        rec.parent = reservation;
        let wf = workflow(FakeStore::with_request(rec), Behavior::Succeed);
        assert_eq!(wf.resolve(7, None).await.unwrap(), reservation);
        assert_eq!(
            wf.resolve(7, Some(RefundType::Order)).await.unwrap(),
            ORDER
        );
    }

    #[tokio::test]
    async fn test_resolve_ambiguous_id_requires_type() {
        let store = FakeStore::with_request(record(PaymentMethod::Cash, None));
        let reservation = RefundParent::Reservation(ReservationId::new(7));
        let mut rec = record(PaymentMethod::Cash, None);
        rec.parent = reservation;
        store.requests.lock().unwrap().insert(reservation, rec);

        let wf = workflow(store, Behavior::Succeed);
        assert!(matches!(wf.resolve(7, None).await, Err(RefundError::Validation(_))));
    }

    #[test]
    fn test_parse_action_and_type() {
        assert_eq!(parse_action("Approve").unwrap(), RefundAction::Approve);
        assert!(matches!(parse_action("refund"), Err(RefundError::Validation(_))));
        assert_eq!(parse_refund_type(None).unwrap(), None);
        assert_eq!(
            parse_refund_type(Some("reservation")).unwrap(),
            Some(RefundType::Reservation)
        );
        assert!(parse_refund_type(Some("gift")).is_err());
    }
}
