// Commerce: carts, checkout, payment reconciliation, inquiries
pub mod commerce;

// Service factory for dependency injection
pub mod factory;

// Background eviction of idle session state
pub mod sweeper;
