//! Infrastructure layer for Stacks.
//!
//! Contains implementations of the traits defined in `stacks-core`: SQLite
//! storage for chats, messages, users and session tokens, plus the config
//! file loader and data directory resolution.

pub mod config;
pub mod sqlite;
