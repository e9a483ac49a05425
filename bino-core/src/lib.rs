pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod store;
pub mod view;
pub mod webhook;
pub mod widget;

pub use config::BinoConfig;
pub use error::BinoError;
pub use models::{Author, ChatMessage, ChatSession};
pub use session::{generate_session_id, Clock, RandomSource, SessionResolver};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError, StoreKeys};
pub use view::{ChatView, HeadlessView, Transition, WidgetSnapshot};
pub use webhook::{ConversationEndpoint, SendOutcome, WebhookClient, WebhookError};
pub use widget::{ChatWidget, WidgetEvent, WidgetPhase};
