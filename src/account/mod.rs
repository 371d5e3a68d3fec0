//! Signing identities
//!
//! A dispatch runs as one of three identities: a direct key, a connected
//! external wallet, or a smart account owned by a delegated key. The
//! [`SignerResolver`] picks one per call from the caller's [`AccountSession`].

pub(crate) mod contracts;
mod identity;
mod resolver;

pub use identity::{AccountSession, SessionSigners, SmartAccount};
pub use resolver::{SignerPath, SignerResolver};
