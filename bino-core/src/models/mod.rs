pub mod message;
pub mod session;

pub use message::{Author, ChatMessage};
pub use session::ChatSession;
