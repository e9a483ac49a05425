use thiserror::Error;

use crate::store::StoreError;
use crate::webhook::WebhookError;

#[derive(Error, Debug)]
pub enum BinoError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Other error: {0}")]
    Other(String),
}
