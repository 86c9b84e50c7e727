//! Outbound side of PulseCRM's channel layer.
//!
//! Delivery adapters push text to customers (WhatsApp Cloud API, the Meta
//! Send API for Messenger/Instagram, SMTP email), the [`hub::DeliveryHub`]
//! picks the adapter for a conversation's channel, the publisher posts
//! marketing content to Meta, and `webhook` holds the inbound envelope and
//! signature helpers.

pub mod email;
pub mod hub;
pub mod log;
pub mod messenger;
pub mod n8n;
pub mod publisher;
pub mod types;
pub mod webhook;
pub mod whatsapp;

pub use hub::DeliveryHub;
pub use types::{ChannelError, DeliveryAdapter, OutboundMessage};
