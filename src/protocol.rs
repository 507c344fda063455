use serde::{Deserialize, Serialize};

/// Frames a client sends over the socket, tagged by `action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Ask for the welcome payload and announce the join to everyone
    SendNotify,
    /// Post a chat line
    SendMessage { message: String },
}
