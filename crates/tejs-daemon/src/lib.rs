pub mod console;
pub mod session;
pub mod watcher;

pub use console::ConsoleReporter;
pub use session::{expand_line, find_trigger, Session, SessionCommand, DEFAULT_POLL_INTERVAL};
pub use watcher::StoragePoller;
