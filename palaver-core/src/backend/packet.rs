//! Engine.IO v4 and Socket.IO v5 packet codec
//!
//! Only the text-frame subset used by the dialogue backend is supported.
//! Binary events and acks are rejected with [`PacketError::Payload`].

use serde::Deserialize;
use serde_json::Value;

use crate::error::PacketError;

/// Namespace every backend event is exchanged on
pub const DEFAULT_NAMESPACE: &str = "/";

/// Parameters announced by the server in the Engine.IO `open` packet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Transport-level packet carried in one WebSocket text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    /// Encoded Socket.IO packet
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, PacketError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let data = chars.as_str();

        match kind {
            '0' => serde_json::from_str(data)
                .map(EnginePacket::Open)
                .map_err(|e| PacketError::Payload(format!("open packet: {}", e))),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(data.to_string())),
            '3' => Ok(EnginePacket::Pong(data.to_string())),
            '4' => Ok(EnginePacket::Message(data.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(PacketError::UnknownEngineType(other)),
        }
    }

    /// Encode for sending; `Open` is server-only and encodes as a bare `0`
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Application-level packet nested in an Engine.IO message
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        payload: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        payload: Option<Value>,
    },
}

impl SocketPacket {
    /// `CONNECT` to the default namespace
    pub fn connect() -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            payload: None,
        }
    }

    /// `EVENT` on the default namespace with a single argument
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.into(),
            args: vec![data],
        }
    }

    pub fn decode(data: &str) -> Result<Self, PacketError> {
        let mut chars = data.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();

        let (namespace, rest) = split_namespace(rest);
        let (ack_id, payload) = split_ack_id(rest)?;

        match kind {
            '0' => Ok(SocketPacket::Connect {
                namespace,
                payload: parse_optional(payload)?,
            }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = parse_array(payload)?;
                if args.is_empty() {
                    return Err(PacketError::Payload("event without a name".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(PacketError::Payload(format!(
                            "event name is not a string: {}",
                            other
                        )));
                    }
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    args,
                })
            }
            '3' => {
                let ack_id = ack_id
                    .ok_or_else(|| PacketError::Payload("ack without an id".to_string()))?;
                Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    args: parse_array(payload)?,
                })
            }
            '4' => Ok(SocketPacket::ConnectError {
                namespace,
                payload: parse_optional(payload)?,
            }),
            '5' | '6' => Err(PacketError::Payload(
                "binary packets are not supported".to_string(),
            )),
            other => Err(PacketError::UnknownSocketType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect { namespace, payload } => {
                format!("0{}{}", namespace_prefix(namespace), optional_json(payload))
            }
            SocketPacket::Disconnect { namespace } => {
                format!("1{}", namespace_prefix(namespace))
            }
            SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args,
            } => {
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                format!(
                    "2{}{}{}",
                    namespace_prefix(namespace),
                    ack_id.map(|id| id.to_string()).unwrap_or_default(),
                    Value::Array(array)
                )
            }
            SocketPacket::Ack {
                namespace,
                ack_id,
                args,
            } => format!(
                "3{}{}{}",
                namespace_prefix(namespace),
                ack_id,
                Value::Array(args.clone())
            ),
            SocketPacket::ConnectError { namespace, payload } => {
                format!("4{}{}", namespace_prefix(namespace), optional_json(payload))
            }
        }
    }

    /// Wrap in an Engine.IO message frame
    pub fn into_frame(self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), rest);
    }
    match rest.find(',') {
        Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
        None => (rest.to_string(), ""),
    }
}

fn split_ack_id(rest: &str) -> Result<(Option<u64>, &str), PacketError> {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok((None, rest));
    }
    let id = rest[..digits]
        .parse()
        .map_err(|_| PacketError::Payload(format!("ack id out of range: {}", &rest[..digits])))?;
    Ok((Some(id), &rest[digits..]))
}

fn parse_optional(payload: &str) -> Result<Option<Value>, PacketError> {
    if payload.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| PacketError::Payload(e.to_string()))
}

fn parse_array(payload: &str) -> Result<Vec<Value>, PacketError> {
    match serde_json::from_str(payload) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(PacketError::Payload(format!("expected array, got {}", other))),
        Err(e) => Err(PacketError::Payload(e.to_string())),
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

fn optional_json(payload: &Option<Value>) -> String {
    payload.as_ref().map(Value::to_string).unwrap_or_default()
}
