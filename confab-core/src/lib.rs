pub mod config;
pub mod editor;
pub mod engine;
pub mod error;
pub mod item;
pub mod message;
pub mod queue;
pub mod router;
pub mod transport;

// Re-export the main struct so users can just use `confab_core::ConsoleEngine`
pub use engine::ConsoleEngine;

// Re-export the types the presentation layer deals with
pub use config::RelayConfig;
pub use error::RelayError;
pub use item::{OutputItem, Split, StreamSource};
pub use message::{KernelMessage, MessageKind};
pub use queue::{ChannelSink, FlushLoop, LineBudget, OutputQueue, OutputSink};
pub use router::{ConsoleAction, KernelState, MessageRouter};
pub use transport::{KernelTransport, OutboundRequest};
