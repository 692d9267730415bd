//! Client-side presence and delivery handling, usable by any Rust front-end
//! (and by the integration tests) on top of a WebSocket connection.

pub mod consumer;
pub mod session;

pub use consumer::{ChatConsumer, Outcome, ServerEvent};
pub use session::{ClientError, ClientSession, Subscription};
