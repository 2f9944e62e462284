//! Chat session lifecycle: wire events, delivery sinks, and the per-session
//! actor that serializes everything a session does.

pub mod events;
pub mod orchestrator;
pub mod sink;

pub use events::{ErrorCode, SessionEvent, WireEvent};
pub use orchestrator::{
    QueryError, QueryPipeline, SessionError, SessionHandle, SessionOrchestrator,
};
pub use sink::{ChannelSink, MemorySink, SessionSink};
