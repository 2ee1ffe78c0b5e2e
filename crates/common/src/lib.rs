//! Common types shared by the Spotify client crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
