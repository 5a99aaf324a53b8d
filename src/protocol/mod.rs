// ABOUTME: The AT engine: command catalog, reply matching and unsolicited notification dispatch
// ABOUTME: One engine task owns each port and serializes commands against it

mod catalog;
mod command;
mod engine;
mod unsolicited;

pub use catalog::{Catalog, CommandEntry, ERROR_REGEX, OK_REGEX};
pub use command::{AtCommand, Captures, DEFAULT_TIMEOUT, Reply};
pub use engine::{Engine, EngineHandle, PendingCommand};
pub use unsolicited::{IdlePatterns, Translation, Unsolicited, arg, scan_async};
