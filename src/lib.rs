//! Onboarding core for a Matrix-style chat client.
//!
//! Orchestrates registration/login onboarding: homeserver discovery,
//! username validation, invite-code redemption and encrypted credential
//! import/export. The protocol SDK and all UI stay behind the traits in
//! [`auth`] — this crate is the state and glue between them.

pub mod auth;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod flow;
pub mod homeserver;
pub mod invite;
pub mod prefs;
