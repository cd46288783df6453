//! Chat and message persistence abstractions plus lifecycle rules.
//!
//! `repository` defines the `ChatRepository` trait the infrastructure layer
//! implements; `service` enforces the chat status state machine and
//! participant checks on top of it.

pub mod repository;
pub mod service;
