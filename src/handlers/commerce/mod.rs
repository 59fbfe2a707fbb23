pub mod carts;
pub mod checkout;
/// Commerce API handlers module
pub mod menu;

// Re-export route builders
pub use carts::carts_routes;
pub use checkout::checkout_routes;
pub use menu::menu_routes;
