//! Shared domain types for Stacks.
//!
//! This crate contains the domain types used across the chat hub:
//! Chat, Message, Identity, the wire frames exchanged over WebSocket,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
