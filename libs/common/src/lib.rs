//! Wire types shared between the chat server and its clients.

pub mod api;
pub mod events;
pub mod id;
pub mod message;

pub use events::ChatEvent;
pub use message::{Attachment, ChatMessage, MessageKind, Reaction, Sender};
