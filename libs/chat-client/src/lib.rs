//! Client side of the course chat: one controller per chat subscription that
//! keeps the push-channel alive and reconciles the local message list.

pub mod api;
pub mod backoff;
pub mod bus;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod scroll;
pub mod sse;
pub mod subscription;
pub mod view;

pub use api::{ChatApi, EventStream, Uploader};
pub use bus::{ClientEvent, EventBus};
pub use client::ChatClient;
pub use config::ClientConfig;
pub use controller::ConnectionState;
pub use error::ClientError;
pub use http::HttpChatApi;
pub use scroll::{ScrollAction, ScrollAnchor, Viewport};
pub use subscription::{ChatSubscription, Draft};
pub use view::{DeliveryState, LocalMessage};
