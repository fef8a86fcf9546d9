//! Development server with live updates.
//!
//! Serves rendered content and public files, watches the site for changes
//! and pushes update events to connected browsers over a WebSocket.

pub mod client;
pub mod config;
pub mod files;
pub mod hmr;
pub mod protocol;
pub mod server;
pub mod watcher;

pub use config::{DevServerConfig, Mode, MODE_ENV};
pub use hmr::{ChannelClosed, ClientId, LiveUpdateContext, Subscription};
pub use protocol::{ClientMessage, ServerMessage, CLIENT_SCRIPT_PATH, SOCKET_PATH};
pub use server::{DevServer, DevServerHandle, ServerError};
pub use watcher::{
    classify, Change, ChangeBatch, ChangeClass, ChangeKind, IgnoreRules, PendingChangeSet,
    WatchConfig, WatchSetupError, Watcher,
};
