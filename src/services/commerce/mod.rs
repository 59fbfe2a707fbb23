/// Commerce services module - session carts, checkout, payment confirmation and guest inquiries
pub mod cart_service;
pub mod checkout_service;
pub mod inquiry_service;
pub mod reconciliation_service;

// Re-export services for convenience
pub use cart_service::{AddLineInput, CartLineView, CartService, CartView, SetQuantityInput};
pub use checkout_service::{
    CheckoutService, CheckoutSettings, SubmissionLine, SubmitOrderInput, SubmittedOrder,
};
pub use inquiry_service::{
    CateringQuoteInput, CateringRequest, ContactRequest, ContactTopic, DepositCheckout,
    FormReceipt, InquiryService, InquirySettings,
};
pub use reconciliation_service::{
    Confirmation, ConfirmationFailure, EmbeddedOutcome, ReconciliationService,
};
