//! Development server with live reload for lamina builds.
//!
//! Serves the built output directory, watches it for changes, and pushes
//! WebSocket reload messages to open pages.

pub mod reload;
pub mod server;
pub mod watcher;

pub use reload::{ReloadHub, ReloadMessage};
pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, WatchEvent};
