use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    catalog::{CateringMenu, CateringQuote},
    errors::ServiceError,
    notifications::{EmailMessage, EmailTemplate, NotificationService},
    orders::OrderId,
    payments::{
        CheckoutFlow, PaymentGateway, PaymentLineItem, PaymentMetadata, PaymentReference,
        PaymentRequest,
    },
};

#[derive(Debug, Clone, Default)]
pub struct InquirySettings {
    /// Staff inbox; no emails are sent without it
    pub staff_inbox: Option<String>,
    pub send_contact_email: bool,
    pub send_catering_email: bool,
    pub deposit_enabled: bool,
    pub deposit_cents: i64,
    pub currency: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum ContactTopic {
    General,
    Order,
    Catering,
    Feedback,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ContactRequest {
    #[validate(length(min = 2, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 7, max = 32))]
    pub phone: String,
    pub topic: ContactTopic,
    #[validate(length(min = 5, max = 2000))]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CateringRequest {
    #[validate(length(min = 2, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 7, max = 32))]
    pub phone: String,
    #[validate(length(min = 1, max = 32))]
    pub event_date: String,
    #[validate(length(min = 1, max = 32))]
    pub event_time: String,
    #[validate(range(min = 10, max = 2000))]
    pub headcount: u32,
    #[validate(length(min = 2, max = 200))]
    pub venue: String,
    pub package_id: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CateringQuoteInput {
    #[validate(length(min = 1, max = 64))]
    pub package_id: String,
    pub guests: u32,
    #[serde(default)]
    pub add_on_ids: Vec<String>,
}

/// Form acknowledgement. The pending notification, if any, is not part of the response.
#[derive(Debug, Serialize, ToSchema)]
pub struct FormReceipt {
    pub ok: bool,
    #[serde(skip)]
    #[schema(value_type = Object, ignore)]
    pub notification: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DepositCheckout {
    #[schema(value_type = String)]
    pub order_id: OrderId,
    pub redirect_url: String,
}

/// Contact and catering forms, plus the optional catering deposit checkout.
#[derive(Clone)]
pub struct InquiryService {
    notifications: NotificationService,
    gateway: Arc<dyn PaymentGateway>,
    catering: Arc<CateringMenu>,
    settings: InquirySettings,
}

impl InquiryService {
    pub fn new(
        notifications: NotificationService,
        gateway: Arc<dyn PaymentGateway>,
        catering: Arc<CateringMenu>,
        settings: InquirySettings,
    ) -> Self {
        Self {
            notifications,
            gateway,
            catering,
            settings,
        }
    }

    pub fn catering_menu(&self) -> &CateringMenu {
        &self.catering
    }

    pub fn deposit_enabled(&self) -> bool {
        self.settings.deposit_enabled
    }

    fn notify(&self, enabled: bool, message: impl FnOnce(String) -> EmailMessage) -> Option<JoinHandle<()>> {
        if !enabled {
            return None;
        }
        let to = self.settings.staff_inbox.clone()?;
        Some(self.notifications.dispatch(message(to)))
    }

    #[instrument(skip(self, request), fields(topic = %request.topic))]
    pub fn submit_contact(&self, request: ContactRequest) -> Result<FormReceipt, ServiceError> {
        request.validate()?;
        info!("contact message received");
        let notification = self.notify(self.settings.send_contact_email, |to| EmailMessage {
            template: EmailTemplate::ContactForm,
            to,
            subject: format!("New contact message ({})", request.topic),
            reply_to: Some(request.email.clone()),
            fields: vec![
                ("Name".to_string(), request.name.clone()),
                ("Email".to_string(), request.email.clone()),
                ("Phone".to_string(), request.phone.clone()),
                ("Topic".to_string(), request.topic.to_string()),
                ("Message".to_string(), request.message.clone()),
            ],
        });
        Ok(FormReceipt {
            ok: true,
            notification,
        })
    }

    #[instrument(skip(self, request), fields(headcount = request.headcount))]
    pub fn submit_catering(&self, request: CateringRequest) -> Result<FormReceipt, ServiceError> {
        request.validate()?;
        let package = match request.package_id.as_deref().filter(|p| !p.is_empty()) {
            Some(id) => Some(
                self.catering
                    .package(id)
                    .ok_or_else(|| ServiceError::ItemNotFound(id.to_string()))?
                    .name
                    .clone(),
            ),
            None => None,
        };
        info!("catering request received");

        let notification = self.notify(self.settings.send_catering_email, |to| EmailMessage {
            template: EmailTemplate::CateringRequest,
            to,
            subject: format!(
                "Catering request: {} guests on {}",
                request.headcount, request.event_date
            ),
            reply_to: Some(request.email.clone()),
            fields: vec![
                ("Name".to_string(), request.name.clone()),
                ("Email".to_string(), request.email.clone()),
                ("Phone".to_string(), request.phone.clone()),
                ("Date".to_string(), request.event_date.clone()),
                ("Time".to_string(), request.event_time.clone()),
                ("Guests".to_string(), request.headcount.to_string()),
                ("Venue".to_string(), request.venue.clone()),
                (
                    "Package".to_string(),
                    package.unwrap_or_else(|| "Not decided".to_string()),
                ),
                (
                    "Notes".to_string(),
                    request.notes.clone().unwrap_or_default(),
                ),
            ],
        });
        Ok(FormReceipt {
            ok: true,
            notification,
        })
    }

    pub fn quote(&self, input: &CateringQuoteInput) -> Result<CateringQuote, ServiceError> {
        input.validate()?;
        self.catering
            .quote(&input.package_id, input.guests, &input.add_on_ids)
    }

    /// Opens a hosted checkout for the fixed catering deposit.
    #[instrument(skip(self))]
    pub async fn start_catering_deposit(&self) -> Result<DepositCheckout, ServiceError> {
        if !self.settings.deposit_enabled {
            return Err(ServiceError::InvalidOperation("Deposit disabled".to_string()));
        }
        if self.settings.deposit_cents <= 0 {
            return Err(ServiceError::InvalidAmount(
                "catering deposit must be positive".to_string(),
            ));
        }

        let order_id = OrderId::with_prefix("CATERING");
        let base = &self.settings.public_base_url;
        let request = PaymentRequest {
            line_items: vec![PaymentLineItem {
                description: "Catering Deposit".to_string(),
                detail: Some("Applied to your final catering invoice".to_string()),
                unit_price_cents: self.settings.deposit_cents,
                quantity: 1,
            }],
            currency: self.settings.currency.clone(),
            metadata: PaymentMetadata {
                order_id: Some(order_id.to_string()),
                ..PaymentMetadata::default()
            },
            flow: CheckoutFlow::Hosted,
            customer_email: None,
            success_url: format!("{base}/order/confirm?orderId={order_id}"),
            cancel_url: format!("{base}/catering"),
        };

        let handle = self.gateway.create_payment_request(&request).await?;
        match handle.reference {
            PaymentReference::RedirectUrl(redirect_url) => {
                info!(order_id = %order_id, provider_session_id = %handle.provider_session_id, "catering deposit checkout created");
                Ok(DepositCheckout {
                    order_id,
                    redirect_url,
                })
            }
            PaymentReference::ClientSecret(_) => Err(ServiceError::InternalError(
                "hosted deposit checkout returned no redirect url".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::MemoryMailer;
    use crate::payments::SandboxGateway;

    fn service(mailer: Arc<MemoryMailer>, settings: InquirySettings) -> InquiryService {
        InquiryService::new(
            NotificationService::new(mailer),
            Arc::new(SandboxGateway::default()),
            Arc::new(CateringMenu::haveli()),
            settings,
        )
    }

    fn enabled() -> InquirySettings {
        InquirySettings {
            staff_inbox: Some("owner@haveli.test".into()),
            send_contact_email: true,
            send_catering_email: true,
            deposit_enabled: true,
            deposit_cents: 10_000,
            currency: "usd".into(),
            public_base_url: "https://haveli.test".into(),
        }
    }

    fn contact() -> ContactRequest {
        ContactRequest {
            name: "Asha".into(),
            email: "asha@example.com".into(),
            phone: "555-0100".into(),
            topic: ContactTopic::Feedback,
            message: "Loved the biryani".into(),
        }
    }

    #[tokio::test]
    async fn contact_form_notifies_staff() {
        let mailer = Arc::new(MemoryMailer::new());
        let receipt = service(mailer.clone(), enabled()).submit_contact(contact()).unwrap();
        assert!(receipt.ok);
        receipt.notification.unwrap().await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reply_to.as_deref(), Some("asha@example.com"));
        assert!(sent[0].subject.contains("Feedback"));
    }

    #[tokio::test]
    async fn mail_failure_still_acknowledges() {
        let mailer = Arc::new(MemoryMailer::new());
        mailer.set_failing(true);
        let receipt = service(mailer, enabled()).submit_contact(contact()).unwrap();
        assert!(receipt.ok);
        receipt.notification.unwrap().await.unwrap();
    }

    #[test]
    fn contact_form_is_validated() {
        let mailer = Arc::new(MemoryMailer::new());
        let mut bad = contact();
        bad.email = "nope".into();
        assert!(matches!(
            service(mailer, enabled()).submit_contact(bad),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn no_inbox_means_no_email() {
        let mailer = Arc::new(MemoryMailer::new());
        let settings = InquirySettings {
            staff_inbox: None,
            ..enabled()
        };
        let receipt = service(mailer, settings).submit_contact(contact()).unwrap();
        assert!(receipt.notification.is_none());
    }

    #[test]
    fn small_catering_events_are_rejected() {
        let mailer = Arc::new(MemoryMailer::new());
        let request = CateringRequest {
            name: "Asha".into(),
            email: "asha@example.com".into(),
            phone: "555-0100".into(),
            event_date: "2026-11-14".into(),
            event_time: "18:00".into(),
            headcount: 6,
            venue: "Community hall".into(),
            package_id: None,
            notes: None,
        };
        assert!(service(mailer, enabled()).submit_catering(request).is_err());
    }

    #[tokio::test]
    async fn deposit_requires_flag() {
        let mailer = Arc::new(MemoryMailer::new());
        let settings = InquirySettings {
            deposit_enabled: false,
            ..enabled()
        };
        let err = service(mailer, settings).start_catering_deposit().await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn deposit_opens_hosted_checkout() {
        let mailer = Arc::new(MemoryMailer::new());
        let checkout = service(mailer, enabled()).start_catering_deposit().await.unwrap();
        assert!(checkout.order_id.as_str().starts_with("CATERING-"));
        assert!(checkout.redirect_url.contains("/sandbox/checkout/cs_sandbox_"));
    }
}
