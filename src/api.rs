//! Request/response shapes of the node services.
//!
//! The transport that carries these bodies between processes is outside
//! the overlay; what lives here is the shapes themselves, their
//! missing-field validation, and thin handlers bridging a parsed body to
//! the node it targets. A missing required field rejects the request with
//! no state change.

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::directory::{Directory, RelayIdentity};
use crate::error::OverlayError;

/// Body of a relay registration request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterNodeBody {
    pub node_id: Option<u32>,
    pub pub_key: Option<String>,
}

impl RegisterNodeBody {
    pub fn validate(self) -> Result<(u32, String), OverlayError> {
        let node_id = self
            .node_id
            .ok_or_else(|| OverlayError::Validation("nodeId is missing".into()))?;
        let pub_key = self
            .pub_key
            .ok_or_else(|| OverlayError::Validation("pubKey is missing".into()))?;
        Ok((node_id, pub_key))
    }
}

/// Body of the directory listing response.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeRegistryBody {
    pub nodes: Vec<RelayIdentity>,
}

/// Body of a client send request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub message: Option<String>,
    pub destination_id: Option<u32>,
}

impl SendMessageBody {
    pub fn validate(self) -> Result<(String, u32), OverlayError> {
        let message = self
            .message
            .ok_or_else(|| OverlayError::Validation("message is missing".into()))?;
        let destination_id = self
            .destination_id
            .ok_or_else(|| OverlayError::Validation("destinationId is missing".into()))?;
        Ok((message, destination_id))
    }
}

/// Body of a message delivery request, to a relay or a client sink.
#[derive(Debug, Serialize, Deserialize)]
pub struct IncomingMessageBody {
    pub message: Option<String>,
}

impl IncomingMessageBody {
    pub fn validate(self) -> Result<String, OverlayError> {
        self.message
            .ok_or_else(|| OverlayError::Validation("message is missing".into()))
    }
}

/// Uniform success acknowledgment.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self { status: "ok".into() }
    }

    pub fn created() -> Self {
        Self { status: "created".into() }
    }
}

fn parse_body<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T, OverlayError> {
    serde_json::from_str(body).map_err(|e| OverlayError::Validation(e.to_string()))
}

/// `POST register` against the directory.
pub fn handle_register(directory: &Directory, body: &str) -> Result<Ack, OverlayError> {
    let (node_id, pub_key) = parse_body::<RegisterNodeBody>(body)?.validate()?;
    directory.register(node_id, &pub_key)?;
    Ok(Ack::created())
}

/// `GET list` against the directory.
pub fn handle_list(directory: &Directory) -> NodeRegistryBody {
    NodeRegistryBody {
        nodes: directory.list(),
    }
}

/// `POST send` against a client.
pub async fn handle_send(client: &Client, body: &str) -> Result<Ack, OverlayError> {
    let (message, destination_id) = parse_body::<SendMessageBody>(body)?.validate()?;
    client.send(&message, destination_id).await?;
    Ok(Ack::ok())
}

/// `POST message` against a relay: one peel-and-forward pass.
pub async fn handle_relay_message(
    relay: &crate::relay::Relay,
    body: &str,
) -> Result<Ack, OverlayError> {
    let message = parse_body::<IncomingMessageBody>(body)?.validate()?;
    relay.handle_message(&message).await?;
    Ok(Ack::ok())
}

/// `POST message` against a client's terminal sink.
pub async fn handle_client_message(client: &Client, body: &str) -> Result<Ack, OverlayError> {
    use crate::channel::MessageSink;

    let message = parse_body::<IncomingMessageBody>(body)?.validate()?;
    client.deliver(message).await?;
    Ok(Ack::ok())
}
