use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Haveli API",
        version = "1.0.0",
        description = r#"
# Haveli Ordering API

Menu, session carts, checkout and payment confirmation for Haveli, an Indian restaurant
offering pickup orders and catering.

## Carts

Cart endpoints identify the cart with the `x-cart-session` header: 8-128 characters of
letters, digits, `-` or `_`, minted by the client and kept for the browser session.
Lines are addressed by their canonical line key (URL-encode it in paths). Adding the same
dish with the same spice level and instructions merges into one line.

## Payments

`POST /api/v1/checkout` reprices the cart from the menu and opens a payment with the
provider. Depending on the deployment the response holds a `redirect_url` (hosted
checkout) or a `client_secret` (embedded form). The cart is only cleared after
`POST /api/v1/payments/verify` (or `/payments/embedded-result`) has confirmed with the
provider that the session is paid and belongs to the order.

## Error Handling

Errors share one envelope:

```json
{
  "error": "Unprocessable Entity",
  "message": "Item not found: paneer-pakora",
  "details": "item_not_found",
  "request_id": "req-abc123xyz",
  "timestamp": "2025-03-09T10:30:00.000Z"
}
```
        "#,
        contact(
            name = "Haveli",
            email = "orders@havelirestaurant.com",
            url = "https://havelirestaurant.com"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Menu", description = "Menu and opening hours"),
        (name = "Catering", description = "Catering packages and estimates"),
        (name = "Cart", description = "Session cart"),
        (name = "Checkout", description = "Order submission"),
        (name = "Payments", description = "Payment confirmation"),
        (name = "Orders", description = "Order status"),
        (name = "Inquiries", description = "Contact and catering forms")
    ),
    paths(
        // Menu
        crate::handlers::commerce::menu::list_menu,
        crate::handlers::commerce::menu::get_menu_item,
        crate::handlers::commerce::menu::get_hours,
        crate::handlers::commerce::menu::list_catering_packages,
        crate::handlers::commerce::menu::quote_catering,

        // Cart
        crate::handlers::commerce::carts::get_cart,
        crate::handlers::commerce::carts::add_to_cart,
        crate::handlers::commerce::carts::update_cart_line,
        crate::handlers::commerce::carts::remove_cart_line,
        crate::handlers::commerce::carts::clear_cart,

        // Checkout and payments
        crate::handlers::commerce::checkout::submit_order,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::embedded_result,

        // Orders
        crate::handlers::orders::get_order,
        crate::handlers::orders::abandon_order,

        // Inquiries
        crate::handlers::inquiries::submit_contact,
        crate::handlers::inquiries::submit_catering_request,
        crate::handlers::inquiries::start_catering_deposit,
    ),
    components(
        schemas(
            // Menu types
            crate::catalog::MenuItem,
            crate::catalog::MenuCategory,
            crate::catalog::OpenStatus,
            crate::catalog::hours::DaySchedule,
            crate::handlers::commerce::menu::HoursResponse,
            crate::catalog::CateringMenu,
            crate::catalog::CateringPackage,
            crate::catalog::CateringAddOn,
            crate::catalog::CateringQuote,
            crate::services::commerce::CateringQuoteInput,

            // Cart types
            crate::cart::OrderLine,
            crate::cart::SpiceLevel,
            crate::cart::Totals,
            crate::services::commerce::AddLineInput,
            crate::services::commerce::SetQuantityInput,
            crate::services::commerce::CartLineView,
            crate::services::commerce::CartView,
            crate::handlers::commerce::carts::AddToCartResponse,

            // Checkout types
            crate::orders::ContactInfo,
            crate::orders::PickupTime,
            crate::payments::CheckoutFlow,
            crate::payments::PaymentReference,
            crate::services::commerce::SubmitOrderInput,
            crate::services::commerce::SubmittedOrder,

            // Payment confirmation types
            crate::handlers::payments::VerifyPaymentRequest,
            crate::handlers::payments::EmbeddedResultRequest,
            crate::services::commerce::Confirmation,
            crate::services::commerce::ConfirmationFailure,

            // Order types
            crate::orders::OrderReceipt,
            crate::orders::OrderAttemptStatus,
            crate::orders::KitchenProgress,

            // Inquiry types
            crate::services::commerce::ContactRequest,
            crate::services::commerce::ContactTopic,
            crate::services::commerce::CateringRequest,
            crate::services::commerce::FormReceipt,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
