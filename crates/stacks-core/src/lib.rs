//! Business logic and collaborator trait definitions for Stacks.
//!
//! This crate defines the "ports" (repository and identity traits) that the
//! infrastructure layer implements, the chat lifecycle service, and the
//! real-time hub. It depends only on `stacks-types` -- never on
//! `stacks-infra` or any database/IO crate.

pub mod chat;
pub mod hub;
pub mod identity;

#[cfg(test)]
pub(crate) mod testing;
