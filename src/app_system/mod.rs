//! System orchestration, startup, and shutdown logic.

pub mod payment_system;
pub mod tracing;

pub use payment_system::*;
pub use self::tracing::setup_tracing;
