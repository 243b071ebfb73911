pub mod chat;
pub mod session;

pub use chat::{ChatController, ERROR_GLYPH, FALLBACK_REPLY};
pub use session::{SendOutcome, SessionState, Snapshot};
