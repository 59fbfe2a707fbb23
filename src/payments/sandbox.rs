use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use super::{
    CheckoutFlow, PaymentError, PaymentGateway, PaymentHandle, PaymentReference, PaymentRequest,
    ProviderPaymentStatus, ProviderSession,
};

/// In-process payment provider for local development and tests.
///
/// Sessions start unpaid; callers flip them with [`SandboxGateway::mark_paid`].
/// [`SandboxGateway::set_offline`] makes every call fail as if the provider were unreachable.
#[derive(Debug)]
pub struct SandboxGateway {
    base_url: String,
    sessions: DashMap<String, ProviderSession>,
    requests: Mutex<Vec<PaymentRequest>>,
    offline: AtomicBool,
    next_id: AtomicU64,
}

impl Default for SandboxGateway {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

impl SandboxGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sessions: DashMap::new(),
            requests: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<PaymentRequest>> {
        match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ensure_online(&self) -> Result<(), PaymentError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable(
                "sandbox provider is offline".to_string(),
            ));
        }
        Ok(())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Marks a session paid. Returns false for unknown sessions.
    pub fn mark_paid(&self, provider_session_id: &str) -> bool {
        self.set_status(provider_session_id, ProviderPaymentStatus::Paid)
    }

    pub fn set_status(&self, provider_session_id: &str, status: ProviderPaymentStatus) -> bool {
        match self.sessions.get_mut(provider_session_id) {
            Some(mut session) => {
                session.payment_status = status;
                true
            }
            None => false,
        }
    }

    /// Rewrites the order id stored on a session, to exercise mismatch handling.
    pub fn overwrite_order_id(&self, provider_session_id: &str, order_id: &str) -> bool {
        match self.sessions.get_mut(provider_session_id) {
            Some(mut session) => {
                session.metadata.order_id = Some(order_id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn insert_session(&self, session: ProviderSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn session(&self, provider_session_id: &str) -> Option<ProviderSession> {
        self.sessions
            .get(provider_session_id)
            .map(|s| s.value().clone())
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.recorded().clone()
    }

    pub fn request_count(&self) -> usize {
        self.recorded().len()
    }

    pub fn last_request(&self) -> Option<PaymentRequest> {
        self.recorded().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn create_payment_request(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        self.ensure_online()?;
        self.recorded().push(request.clone());

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (id, reference) = match request.flow {
            CheckoutFlow::Hosted => {
                let id = format!("cs_sandbox_{n}");
                let url = format!("{}/sandbox/checkout/{id}", self.base_url);
                (id, PaymentReference::RedirectUrl(url))
            }
            CheckoutFlow::Embedded => {
                let id = format!("pi_sandbox_{n}");
                let secret = format!("{id}_secret_sandbox");
                (id, PaymentReference::ClientSecret(secret))
            }
        };

        self.sessions.insert(
            id.clone(),
            ProviderSession {
                id: id.clone(),
                payment_status: ProviderPaymentStatus::Unpaid,
                metadata: request.metadata.clone(),
                amount_total: Some(request.amount_cents()),
                currency: Some(request.currency.to_lowercase()),
                customer_email: request.customer_email.clone(),
                payment_intent_id: None,
            },
        );
        info!(provider_session_id = %id, "sandbox payment session created");

        Ok(PaymentHandle {
            provider_session_id: id,
            reference,
        })
    }

    async fn retrieve_session(
        &self,
        provider_session_id: &str,
    ) -> Result<Option<ProviderSession>, PaymentError> {
        self.ensure_online()?;
        Ok(self.session(provider_session_id))
    }
}
