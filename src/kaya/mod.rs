//! Kaya platform access: payload types, the client trait, and its HTTP implementation.

pub mod client;
pub mod http;
pub mod types;

pub use client::{ClientError, KayaClient};
pub use http::KayaHttpClient;
pub use types::{Ascent, Climb, ClimbCategory, Location, User};
