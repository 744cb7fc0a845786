//! Typed inter-process transport: message schema, msgpack wire format,
//! ZMQ queue wrappers, and the latency counters threaded through them.

pub mod message;
pub mod queue;
pub mod stats;
pub mod wire;

pub use message::{BackendMsg, ChatMessage, FrontendMsg, TokenizeText, TokenizerMsg, SCHEMA_VERSION};
pub use queue::{ZmqPubQueue, ZmqPullQueue, ZmqPushQueue, ZmqSubQueue};
pub use stats::{TransportStats, TransportStatsSnapshot};
