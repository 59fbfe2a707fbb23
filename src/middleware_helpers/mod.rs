pub mod cart_session;
pub mod request_id;

pub use cart_session::{CartSession, CART_SESSION_HEADER};
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
