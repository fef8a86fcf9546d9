//! Live-update wire protocol.
//!
//! Every frame is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

/// Path the injected client script is served from.
pub const CLIENT_SCRIPT_PATH: &str = "/__folio/client.js";

/// Path of the live-update WebSocket endpoint.
pub const SOCKET_PATH: &str = "/__folio/ws";

/// Messages sent from the server to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// A module (page route or asset) changed
    Update { path: String, timestamp: u64 },

    /// Stylesheets changed; swap them without a reload
    StyleUpdate { paths: Vec<String>, timestamp: u64 },

    /// Full page reload required
    Reload { timestamp: u64 },

    /// Something failed while processing a change
    Error { message: String, timestamp: u64 },
}

impl ServerMessage {
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Update { timestamp, .. }
            | Self::StyleUpdate { timestamp, .. }
            | Self::Reload { timestamp }
            | Self::Error { timestamp, .. } => *timestamp,
        }
    }

    /// Module ids this message announces a new version of.
    pub fn subjects(&self) -> Vec<&str> {
        match self {
            Self::Update { path, .. } => vec![path.as_str()],
            Self::StyleUpdate { paths, .. } => paths.iter().map(String::as_str).collect(),
            Self::Reload { .. } | Self::Error { .. } => Vec::new(),
        }
    }
}

/// Messages sent from clients to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Sent once the socket opens
    Connect { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_tagged_frames() {
        let update = ServerMessage::Update {
            path: "/blog/post1".into(),
            timestamp: 42,
        };
        let styles = ServerMessage::StyleUpdate {
            paths: vec!["/styles/site.css".into()],
            timestamp: 43,
        };

        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"type":"update","path":"/blog/post1","timestamp":42}"#
        );
        assert_eq!(
            serde_json::to_string(&styles).unwrap(),
            r#"{"type":"style-update","paths":["/styles/site.css"],"timestamp":43}"#
        );
        assert_eq!(
            serde_json::to_string(&ServerMessage::Reload { timestamp: 1 }).unwrap(),
            r#"{"type":"reload","timestamp":1}"#
        );
    }

    #[test]
    fn parses_client_connect() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"connect","id":"abc"}"#).unwrap();

        assert_eq!(msg, ClientMessage::Connect { id: "abc".into() });
    }

    #[test]
    fn reports_subjects() {
        let styles = ServerMessage::StyleUpdate {
            paths: vec!["/a.css".into(), "/b.css".into()],
            timestamp: 1,
        };

        assert_eq!(styles.subjects(), vec!["/a.css", "/b.css"]);
        assert!(ServerMessage::Reload { timestamp: 1 }.subjects().is_empty());
        assert_eq!(styles.timestamp(), 1);
    }
}
