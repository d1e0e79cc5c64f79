pub mod client;
pub mod error;
pub mod types;

pub use client::{DiscordClient, Messenger};
pub use error::MessagingError;
pub use types::{Attachment, Author, MessageEvent};
