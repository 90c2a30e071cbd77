//! Webex REST client.
//!
//! - **Client** (`client`) - HTTP transport, bearer auth and status mapping
//! - **People and resources** (`resources`) - person lookup and field reads
//! - **Messages** (`messages`) - direct markdown messages
//! - **OAuth** (`oauth`) - authorization-code and refresh-token grants
//! - **Webhooks** (`webhooks`) - registration of the message webhook
//!
//! `WebexClient` implements `autoresponder_core::MessagingPlatform`; nothing
//! outside this crate speaks HTTP to Webex.

pub mod client;
pub mod messages;
pub mod oauth;
pub mod resources;
pub mod webhooks;

pub use client::WebexClient;
pub use messages::normalize_markdown;
pub use webhooks::WEBHOOK_NAME;
