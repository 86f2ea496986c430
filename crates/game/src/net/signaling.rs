use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelopes sent to the signaling relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientSignal {
    Join { room: String },
    Leave,
    Signal { room: String, data: Value },
}

/// Envelopes received from the signaling relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerSignal {
    RoomJoined {
        room: String,
        #[serde(rename = "isHost")]
        is_host: bool,
        #[serde(rename = "peerCount")]
        peer_count: u32,
    },
    PeerJoined {
        #[serde(rename = "peerCount")]
        peer_count: u32,
    },
    PeerLeft {
        #[serde(rename = "peerCount")]
        peer_count: u32,
    },
    Signal {
        data: Value,
    },
    RoomFull,
    Error {
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("malformed signaling message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ClientSignal {
    pub fn to_json(&self) -> Result<String, SignalingError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerSignal {
    pub fn to_json(&self) -> Result<String, SignalingError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Room codes are short uppercase alphanumeric strings handed out by the relay.
pub fn is_valid_room_code(code: &str) -> bool {
    (4..=8).contains(&code.len())
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn client_envelopes_match_relay_format() {
        let join = ClientSignal::Join {
            room: "AB12".into(),
        };
        assert_eq!(join.to_json().unwrap(), r#"{"type":"join","room":"AB12"}"#);
        assert_eq!(ClientSignal::Leave.to_json().unwrap(), r#"{"type":"leave"}"#);
    }

    #[test]
    fn parses_room_joined() {
        let text = r#"{"type":"room-joined","room":"QX7K","isHost":true,"peerCount":1}"#;
        assert_eq!(
            ServerSignal::parse(text).unwrap(),
            ServerSignal::RoomJoined {
                room: "QX7K".into(),
                is_host: true,
                peer_count: 1,
            }
        );
    }

    #[test]
    fn parses_opaque_signal_payload() {
        let text = r#"{"type":"signal","data":{"sdp":"offer","candidates":[1,2]}}"#;
        let ServerSignal::Signal { data } = ServerSignal::parse(text).unwrap() else {
            panic!("expected signal");
        };
        assert_eq!(data, json!({"sdp": "offer", "candidates": [1, 2]}));
    }

    #[test]
    fn malformed_and_unknown_messages_fail() {
        assert!(ServerSignal::parse("not json").is_err());
        assert!(ServerSignal::parse(r#"{"type":"teleport"}"#).is_err());
        assert!(ServerSignal::parse(r#"{"type":"peer-joined"}"#).is_err());
        assert_eq!(
            ServerSignal::parse(r#"{"type":"room-full"}"#).unwrap(),
            ServerSignal::RoomFull
        );
    }

    #[test]
    fn room_codes() {
        assert!(is_valid_room_code("QX7K"));
        assert!(!is_valid_room_code("qx7k"));
        assert!(!is_valid_room_code("AB"));
        assert!(!is_valid_room_code("AB-12"));
    }
}
