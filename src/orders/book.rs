use dashmap::DashMap;
use tracing::info;

use super::attempt::{OrderAttempt, OrderAttemptStatus, TransitionOutcome};
use crate::errors::ServiceError;

/// In-memory registry of checkout attempts, keyed by order id.
///
/// Every transition runs under the entry's shard lock, so two callbacks racing
/// to confirm the same order see exactly one `Applied`.
#[derive(Debug, Default)]
pub struct OrderBook {
    attempts: DashMap<String, OrderAttempt>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, attempt: OrderAttempt) -> Result<(), ServiceError> {
        use dashmap::mapref::entry::Entry;

        match self.attempts.entry(attempt.order_id.as_str().to_string()) {
            Entry::Occupied(_) => Err(ServiceError::InternalError(format!(
                "order id {} already exists",
                attempt.order_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(attempt);
                Ok(())
            }
        }
    }

    pub fn get(&self, order_id: &str) -> Option<OrderAttempt> {
        self.attempts.get(order_id).map(|a| a.value().clone())
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Records the provider session and moves the attempt to `AwaitingPayment`.
    pub fn await_payment(
        &self,
        order_id: &str,
        provider_session_id: &str,
    ) -> Result<OrderAttempt, ServiceError> {
        let (_, attempt) = self.transition_with(order_id, OrderAttemptStatus::AwaitingPayment, |a| {
            a.provider_session_id = Some(provider_session_id.to_string());
        })?;
        Ok(attempt)
    }

    /// Applies a transition and returns the attempt as it stands afterwards.
    pub fn transition(
        &self,
        order_id: &str,
        next: OrderAttemptStatus,
    ) -> Result<(TransitionOutcome, OrderAttempt), ServiceError> {
        self.transition_with(order_id, next, |_| {})
    }

    pub fn fail(
        &self,
        order_id: &str,
        reason: &str,
    ) -> Result<(TransitionOutcome, OrderAttempt), ServiceError> {
        self.transition_with(order_id, OrderAttemptStatus::Failed, |a| {
            a.failure_reason = Some(reason.to_string());
        })
    }

    /// Drops attempts not updated within `retention`. Provider sessions expire well before
    /// that, so a dropped attempt can no longer be paid.
    ///
    /// # Returns
    ///
    /// Number of attempts dropped
    pub fn prune_older_than(&self, retention: chrono::Duration) -> usize {
        let cutoff = chrono::Utc::now() - retention;
        let mut pruned = 0;
        self.attempts.retain(|_, attempt| {
            let keep = attempt.updated_at >= cutoff;
            if !keep {
                pruned += 1;
            }
            keep
        });
        if pruned > 0 {
            info!(pruned, remaining = self.attempts.len(), "pruned old order attempts");
        }
        pruned
    }

    /// Records a failed payment attempt without changing the status, so the guest can
    /// retry on the same provider session.
    pub fn note_failure(&self, order_id: &str, reason: &str) -> Result<OrderAttempt, ServiceError> {
        let mut entry = self
            .attempts
            .get_mut(order_id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;
        if entry.status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "order {order_id} is already {:?}",
                entry.status
            )));
        }
        entry.failure_reason = Some(reason.to_string());
        entry.updated_at = chrono::Utc::now();
        Ok(entry.value().clone())
    }

    /// `on_applied` runs only when the status actually changed, still under the entry lock.
    pub fn transition_with(
        &self,
        order_id: &str,
        next: OrderAttemptStatus,
        on_applied: impl FnOnce(&mut OrderAttempt),
    ) -> Result<(TransitionOutcome, OrderAttempt), ServiceError> {
        let mut entry = self
            .attempts
            .get_mut(order_id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;
        let previous = entry.status;
        let outcome = entry.transition(next)?;
        if outcome == TransitionOutcome::Applied {
            on_applied(entry.value_mut());
            info!(order_id, from = ?previous, to = ?next, "order attempt transitioned");
        }
        Ok((outcome, entry.value().clone()))
    }
}
