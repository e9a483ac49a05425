/// A browser-wide chat session. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub session_id: String,
    /// False when the id could not be written to the store.
    pub persisted: bool,
}
