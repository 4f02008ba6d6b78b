//! Conversation core: safety gate, stream reducer, session engine

pub mod gate;
pub mod reducer;
pub mod request;
pub mod session;
pub mod store;

pub use session::{ChatEngine, EngineError, SubmitOutcome};
