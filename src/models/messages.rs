use serde::{Deserialize, Serialize};

/// `request-document`: explicit (re)fetch of a document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestDocumentMessage {
    pub id: String,
}

/// `send-changes`: submit the full content of a document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendChangesMessage {
    pub id: String,
    pub request_id: u64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
}

/// `load-document` and `receive-changes` payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMessage {
    pub id: String,
    pub content: String,
    pub version: u64,
}

/// Reply to a `send-changes` request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AckMessage {
    pub request_id: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}

/// Frames sent by editors.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "request-document")]
    RequestDocument(RequestDocumentMessage),
    #[serde(rename = "send-changes")]
    SendChanges(SendChangesMessage),
    #[serde(rename = "ping")]
    Ping,
}

/// Frames sent by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "load-document")]
    LoadDocument(DocumentMessage),
    #[serde(rename = "receive-changes")]
    ReceiveChanges(DocumentMessage),
    #[serde(rename = "send-changes-ack")]
    SendChangesAck(AckMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_use_tagged_camel_case() {
        let msg = ClientMessage::SendChanges(SendChangesMessage {
            id: "notes/a.md".into(),
            request_id: 7,
            content: "hello".into(),
            base_version: None,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "send-changes",
                "id": "notes/a.md",
                "requestId": 7,
                "content": "hello"
            })
        );
    }

    #[test]
    fn bare_ping_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn ack_without_optional_fields_parses() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"send-changes-ack","requestId":3,"success":false}"#)
                .unwrap();
        assert_eq!(
            msg,
            ServerMessage::SendChangesAck(AckMessage {
                request_id: 3,
                success: false,
                message: None,
                version: None,
            })
        );
    }

    #[test]
    fn request_without_id_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"request-document"}"#).is_err());
    }
}
