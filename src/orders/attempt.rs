use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ContactInfo, OrderId, PickupTime};
use crate::cart::{OrderLine, Totals};
use crate::errors::ServiceError;
use crate::payments::CheckoutFlow;

/// How long a confirmed order shows as waiting before the kitchen picks it up.
pub const KITCHEN_PICKUP_DELAY_SECS: i64 = 10;

/// Lifecycle of one checkout attempt.
///
/// ```text
/// Created -> AwaitingPayment -> Confirmed | Failed | Abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderAttemptStatus {
    Created,
    AwaitingPayment,
    Confirmed,
    Failed,
    Abandoned,
}

impl OrderAttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Abandoned)
    }

    fn can_move_to(&self, next: OrderAttemptStatus) -> bool {
        use OrderAttemptStatus::*;
        matches!(
            (self, next),
            (Created, AwaitingPayment)
                | (Created, Failed)
                | (Created, Abandoned)
                | (AwaitingPayment, Confirmed)
                | (AwaitingPayment, Failed)
                | (AwaitingPayment, Abandoned)
                // Leaving the payment page does not stop the provider from taking payment.
                | (Abandoned, Confirmed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Already in the requested terminal state; nothing changed.
    AlreadyInState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum KitchenProgress {
    /// Payment not confirmed yet
    NotStarted,
    Waiting,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAttempt {
    pub order_id: OrderId,
    /// Cart session that produced the attempt
    pub session_id: String,
    pub status: OrderAttemptStatus,
    pub flow: CheckoutFlow,
    pub lines: Vec<OrderLine>,
    pub totals: Totals,
    pub tip_percent: u8,
    pub contact: ContactInfo,
    pub pickup: PickupTime,
    pub notes: Option<String>,
    pub provider_session_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl OrderAttempt {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        session_id: &str,
        flow: CheckoutFlow,
        lines: Vec<OrderLine>,
        totals: Totals,
        tip_percent: u8,
        contact: ContactInfo,
        pickup: PickupTime,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            session_id: session_id.to_string(),
            status: OrderAttemptStatus::Created,
            flow,
            lines,
            totals,
            tip_percent,
            contact,
            pickup,
            notes,
            provider_session_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        }
    }

    /// Moves to `next`, stamping timestamps. Repeating a terminal state is reported, not rejected.
    pub fn transition(&mut self, next: OrderAttemptStatus) -> Result<TransitionOutcome, ServiceError> {
        if self.status == next && next.is_terminal() {
            return Ok(TransitionOutcome::AlreadyInState);
        }
        if !self.status.can_move_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} cannot move from {:?} to {:?}",
                self.order_id, self.status, next
            )));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next == OrderAttemptStatus::Confirmed {
            self.confirmed_at = Some(now);
            self.failure_reason = None;
        }
        Ok(TransitionOutcome::Applied)
    }

    pub fn kitchen_progress(&self, now: DateTime<Utc>) -> KitchenProgress {
        match (self.status, self.confirmed_at) {
            (OrderAttemptStatus::Confirmed, Some(at))
                if now - at >= Duration::seconds(KITCHEN_PICKUP_DELAY_SECS) =>
            {
                KitchenProgress::InProgress
            }
            (OrderAttemptStatus::Confirmed, _) => KitchenProgress::Waiting,
            _ => KitchenProgress::NotStarted,
        }
    }

    pub fn receipt(&self, now: DateTime<Utc>) -> OrderReceipt {
        OrderReceipt {
            order_id: self.order_id.clone(),
            status: self.status,
            kitchen_progress: self.kitchen_progress(now),
            customer_name: self.contact.name.clone(),
            pickup: self.pickup,
            notes: self.notes.clone(),
            lines: self.lines.clone(),
            tip_percent: self.tip_percent,
            totals: self.totals,
            created_at: self.created_at,
            confirmed_at: self.confirmed_at,
        }
    }
}

/// Display snapshot for the order status page. Not authoritative for payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderReceipt {
    #[schema(value_type = String)]
    pub order_id: OrderId,
    pub status: OrderAttemptStatus,
    pub kitchen_progress: KitchenProgress,
    pub customer_name: String,
    pub pickup: PickupTime,
    pub notes: Option<String>,
    pub lines: Vec<OrderLine>,
    pub tip_percent: u8,
    pub totals: Totals,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn attempt() -> OrderAttempt {
        OrderAttempt::new(
            OrderId::generate(),
            "session-abc",
            CheckoutFlow::Hosted,
            Vec::new(),
            Totals::default(),
            0,
            ContactInfo {
                name: "Asha".into(),
                phone: "555".into(),
                email: None,
            },
            PickupTime::Asap,
            None,
        )
    }

    #[test]
    fn happy_path_transitions() {
        let mut a = attempt();
        assert_eq!(a.transition(OrderAttemptStatus::AwaitingPayment).unwrap(), TransitionOutcome::Applied);
        assert_eq!(a.transition(OrderAttemptStatus::Confirmed).unwrap(), TransitionOutcome::Applied);
        assert!(a.confirmed_at.is_some());
        assert_eq!(
            a.transition(OrderAttemptStatus::Confirmed).unwrap(),
            TransitionOutcome::AlreadyInState
        );
    }

    #[test]
    fn terminal_states_reject_other_moves() {
        let mut a = attempt();
        a.transition(OrderAttemptStatus::AwaitingPayment).unwrap();
        a.transition(OrderAttemptStatus::Failed).unwrap();
        assert_matches!(
            a.transition(OrderAttemptStatus::Confirmed),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(
            a.transition(OrderAttemptStatus::AwaitingPayment),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_eq!(
            a.transition(OrderAttemptStatus::Failed).unwrap(),
            TransitionOutcome::AlreadyInState
        );
    }

    #[test]
    fn confirmed_cannot_be_abandoned() {
        let mut a = attempt();
        a.transition(OrderAttemptStatus::AwaitingPayment).unwrap();
        a.transition(OrderAttemptStatus::Confirmed).unwrap();
        assert!(a.transition(OrderAttemptStatus::Abandoned).is_err());
        assert!(a.transition(OrderAttemptStatus::Failed).is_err());
    }

    #[test]
    fn abandoned_attempt_can_still_confirm() {
        let mut a = attempt();
        a.transition(OrderAttemptStatus::AwaitingPayment).unwrap();
        a.transition(OrderAttemptStatus::Abandoned).unwrap();
        assert_eq!(a.transition(OrderAttemptStatus::Confirmed).unwrap(), TransitionOutcome::Applied);
    }

    #[test]
    fn kitchen_progress_after_delay() {
        let mut a = attempt();
        let now = Utc::now();
        assert_eq!(a.kitchen_progress(now), KitchenProgress::NotStarted);
        a.transition(OrderAttemptStatus::AwaitingPayment).unwrap();
        a.transition(OrderAttemptStatus::Confirmed).unwrap();
        let confirmed = a.confirmed_at.unwrap();
        assert_eq!(a.kitchen_progress(confirmed + Duration::seconds(3)), KitchenProgress::Waiting);
        assert_eq!(
            a.kitchen_progress(confirmed + Duration::seconds(KITCHEN_PICKUP_DELAY_SECS)),
            KitchenProgress::InProgress
        );
    }
}
