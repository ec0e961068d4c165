//! Gateway: HTTP surface and the authorization handler.

mod handler;
mod router;
mod server;

pub use handler::{AuthzHandler, DENIED_BODY, health_handler, protected_handler};
pub use router::create_router;
pub use server::Gateway;
