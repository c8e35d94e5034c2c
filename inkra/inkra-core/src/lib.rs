//! Document lifecycle and signing engine.

pub mod access;
pub mod auth;
pub mod blob;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod sniff;
pub mod store;

pub use error::{DocError, Result};
pub use lifecycle::{DocumentService, LifecycleConfig};
