//! Transport layer for the Lunar bot runtime.
//!
//! [`ConnectionManager`] drives one duplex session over any [`Connector`].
//! The WebSocket connector is behind the `ws-client` feature; the
//! [`memory`] connector is always available.

pub mod connector;
pub mod memory;
mod queue;
pub mod retry;
pub mod session;
#[cfg(feature = "ws-client")]
pub mod ws;

pub use connector::{Connector, Frame, FrameSink, FrameStream, Link};
pub use memory::{MemoryAcceptor, MemoryConnector, MemoryPeer};
pub use retry::RetryPolicy;
pub use session::{ConnectionManager, SessionConfig, SessionState};
#[cfg(feature = "ws-client")]
pub use ws::WsConnector;
