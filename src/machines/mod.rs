// ABOUTME: Multi-step flows that drive a device through many commands: SIM unlock, registration, connect
// ABOUTME: Each machine is a straight-line async procedure over a small tagged state enum

mod auth;
mod netreg;
mod simple;

pub use auth::authenticate;
pub use netreg::register;
pub use simple::{SimpleSettings, connect_simple};
