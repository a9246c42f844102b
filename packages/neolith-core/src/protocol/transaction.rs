//! Transaction framing.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

const TXID: &str = "txid";
const ERROR: &str = "error";

/// A packet that can be carried in a transaction
pub trait Packet: Sized {
    /// The ident the packet is keyed by
    fn ident(&self) -> &str;

    /// Serialize the packet's fields
    fn to_payload(&self) -> Result<Value>;

    /// Parse one payload of the given ident
    fn from_payload(ident: &str, payload: Value) -> Result<Self>;
}

/// A group of packets sent or received together
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction<P> {
    /// Correlates a request with its response
    pub txid: Option<String>,

    /// Error reported by the server for this transaction
    pub error: Option<String>,

    /// Packets in wire order
    ///
    /// Idents keep the order they appear in on the wire; payloads listed
    /// under one ident stay in list order.
    pub packets: Vec<P>,
}

impl<P> Default for Transaction<P> {
    fn default() -> Self {
        Self {
            txid: None,
            error: None,
            packets: Vec::new(),
        }
    }
}

impl<P: Packet> Transaction<P> {
    /// An empty transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// A transaction holding one packet
    pub fn single(packet: P) -> Self {
        Self {
            packets: vec![packet],
            ..Self::default()
        }
    }

    /// Set the transaction id
    pub fn with_txid(mut self, txid: impl Into<String>) -> Self {
        self.txid = Some(txid.into());
        self
    }

    /// Append a packet
    pub fn push(&mut self, packet: P) {
        self.packets.push(packet);
    }

    /// Whether there is nothing to send
    pub fn is_empty(&self) -> bool {
        self.txid.is_none() && self.error.is_none() && self.packets.is_empty()
    }

    /// Encode to JSON bytes
    ///
    /// Packets of the same ident are grouped into one list.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut object = Map::new();
        if let Some(txid) = &self.txid {
            object.insert(TXID.to_string(), Value::String(txid.clone()));
        }
        if let Some(error) = &self.error {
            object.insert(ERROR.to_string(), Value::String(error.clone()));
        }

        for packet in &self.packets {
            let slot = object
                .entry(packet.ident().to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match slot {
                Value::Array(list) => list.push(packet.to_payload()?),
                _ => {
                    return Err(Error::ProtocolError(format!(
                        "Packet ident collides with a reserved key: {}",
                        packet.ident()
                    )))
                }
            }
        }

        Ok(serde_json::to_vec(&Value::Object(object))?)
    }

    /// Decode from JSON bytes
    ///
    /// Each ident may carry a single payload object or a list of them.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let object = match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(object) => object,
            _ => {
                return Err(Error::ProtocolError(
                    "Transaction must be a JSON object".into(),
                ))
            }
        };

        let mut tx = Self::new();
        for (ident, value) in object {
            match ident.as_str() {
                TXID => tx.txid = Some(expect_string(TXID, value)?),
                ERROR => tx.error = Some(expect_string(ERROR, value)?),
                _ => match value {
                    Value::Array(payloads) => {
                        for payload in payloads {
                            tx.packets.push(P::from_payload(&ident, payload)?);
                        }
                    }
                    payload => tx.packets.push(P::from_payload(&ident, payload)?),
                },
            }
        }

        Ok(tx)
    }
}

fn expect_string(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::ProtocolError(format!(
            "Expected a string for '{}', got {}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChannelRef, ClientPacket, JoinChannel, ServerPacket};
    use serde_json::json;

    #[test]
    fn test_packets_grouped_by_ident() {
        let mut tx = Transaction::new().with_txid("t1");
        tx.push(ClientPacket::LeaveChannel(ChannelRef {
            channel: "#a".into(),
        }));
        tx.push(ClientPacket::LeaveChannel(ChannelRef {
            channel: "#b".into(),
        }));
        tx.push(ClientPacket::JoinChannel(JoinChannel {
            channel: "#c".into(),
            key_hash: None,
        }));

        let value: Value = serde_json::from_slice(&tx.to_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "txid": "t1",
                "channel.leave": [{"channel": "#a"}, {"channel": "#b"}],
                "channel.join": [{"channel": "#c"}],
            })
        );

        let parsed = Transaction::<ClientPacket>::from_bytes(&tx.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.txid.as_deref(), Some("t1"));
        assert_eq!(parsed.packets.len(), 3);
    }

    #[test]
    fn test_single_payload_accepted() {
        let bytes = br##"{"channel.userlist": {"channel": "#ops", "users": []}}"##;
        let tx = Transaction::<ServerPacket>::from_bytes(bytes).unwrap();

        assert_eq!(tx.packets.len(), 1);
        assert!(matches!(&tx.packets[0], ServerPacket::ChannelUsers(u) if u.channel == "#ops"));
    }

    #[test]
    fn test_wire_order_kept() {
        let bytes = br##"{
            "user.left": {"user": {"ident": "s2"}},
            "channel.joined": [
                {"channel": "#b", "user": {"ident": "s3"}},
                {"channel": "#a", "user": {"ident": "s4"}}
            ],
            "channel.created": {"name": "#c"}
        }"##;
        let tx = Transaction::<ServerPacket>::from_bytes(bytes).unwrap();

        let idents: Vec<&str> = tx.packets.iter().map(|p| p.ident()).collect();
        assert_eq!(idents, ["user.left", "channel.joined", "channel.joined", "channel.created"]);
        assert!(matches!(&tx.packets[1], ServerPacket::ChannelJoined(n) if n.channel == "#b"));

        // encoding keeps the order packets were pushed in
        let mut out = Transaction::new();
        out.push(ClientPacket::LeaveChannel(ChannelRef {
            channel: "#z".into(),
        }));
        out.push(ClientPacket::ListChannels);
        let text = String::from_utf8(out.to_bytes().unwrap()).unwrap();
        let leave = text.find("channel.leave").unwrap();
        let list = text.find("channel.list\"").unwrap();
        assert!(leave < list);
    }

    #[test]
    fn test_error_and_unknown_idents() {
        let bytes = br#"{"txid": "9", "error": "Login failed.", "server.motd": [{"text": "hi"}]}"#;
        let tx = Transaction::<ServerPacket>::from_bytes(bytes).unwrap();

        assert_eq!(tx.error.as_deref(), Some("Login failed."));
        assert_eq!(
            tx.packets,
            vec![ServerPacket::Unrecognized {
                ident: "server.motd".into(),
                payload: json!({"text": "hi"}),
            }]
        );
    }

    #[test]
    fn test_rejects_non_object() {
        let result = Transaction::<ServerPacket>::from_bytes(b"[1, 2, 3]");
        assert!(matches!(result, Err(Error::ProtocolError(_))));

        let result = Transaction::<ServerPacket>::from_bytes(b"not json");
        assert!(matches!(result, Err(Error::DeserializationError(_))));

        let result = Transaction::<ServerPacket>::from_bytes(br#"{"txid": 4}"#);
        assert!(matches!(result, Err(Error::ProtocolError(_))));
    }

    #[test]
    fn test_empty() {
        let tx = Transaction::<ClientPacket>::new();
        assert!(tx.is_empty());
        assert_eq!(tx.to_bytes().unwrap(), b"{}");
        assert!(!Transaction::single(ClientPacket::Logout).is_empty());
    }
}
