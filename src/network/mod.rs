//! Connection server (C2): accepts clients and drives each through the length-framed
//! session protocol (spec §4.1).

pub mod protocol;
pub mod server;

pub use server::{Server, ServerHandle};
