//! Reasoning-backend contract for Weft.
//!
//! The agent crate only talks to a model through the types here: a
//! [`ProviderAdapter`] answers chat requests, and the [`Client`] routes
//! requests to a registered adapter, streams responses, and turns structured
//! replies into typed objects.

pub mod client;
pub mod errors;
pub mod openai;
pub mod provider;
pub mod stream;
pub mod types;

pub use client::*;
pub use errors::*;
pub use openai::*;
pub use provider::*;
pub use stream::*;
pub use types::*;
