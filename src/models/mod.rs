//! Data models for the coach roster.
//!
//! Wire names are camelCase so the web and mobile frontends can consume them unchanged.

mod change;
mod client;
mod coach;
mod responses;

pub use change::*;
pub use client::*;
pub use coach::*;
pub use responses::*;
