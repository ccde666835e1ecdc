//! Message serialization across the three wire encodings.
//!
//! Every encoding carries the same logical fields (`command`, `type`,
//! `topic`, `value`); only the representation differs. The `type` field
//! names the encoding itself and is informational: decoding trusts the
//! connection's negotiated format, not the tag inside the payload.
//!
//! XML and binary payloads carry the logical value as compact JSON text,
//! so arbitrarily nested values survive both encodings. XML attribute text
//! that does not parse as JSON decodes to a plain string.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::frame::encode_frame;
use crate::message::{command, Message, WireFormat};

/// Serializes a message in the given wire format (payload only, no frame).
pub fn encode_payload(message: &Message, format: WireFormat) -> Result<Vec<u8>, ProtocolError> {
    match format {
        WireFormat::Json => json::encode(message),
        WireFormat::Xml => xml::encode(message),
        WireFormat::Binary => binary::encode(message),
    }
}

/// Deserializes a payload under the connection's negotiated format.
pub fn decode_payload(payload: &[u8], format: WireFormat) -> Result<Message, ProtocolError> {
    match format {
        WireFormat::Json => json::decode(payload),
        WireFormat::Xml => xml::decode(payload),
        WireFormat::Binary => binary::decode(payload),
    }
}

/// Serializes a message and wraps it in a length-prefixed frame.
pub fn encode_message(message: &Message, format: WireFormat) -> Result<BytesMut, ProtocolError> {
    let payload = encode_payload(message, format)?;
    encode_frame(&payload)
}

/// Logical field set shared by all three encodings.
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    command: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

impl WireRecord {
    fn from_message(message: &Message, format: WireFormat) -> Result<Self, ProtocolError> {
        let (topic, value) = match message {
            Message::Publish { topic, value } => (Some(topic.clone()), Some(value.clone())),
            Message::Subscribe { topic } | Message::Unsubscribe { topic } => {
                (Some(topic.clone()), None)
            }
            Message::ListAll => (None, None),
            Message::Subscriptions { entries } => (None, Some(serde_json::to_value(entries)?)),
        };
        Ok(Self {
            command: message.command_tag().to_string(),
            format: Some(format.tag().to_string()),
            topic,
            value,
        })
    }

    fn into_message(self) -> Result<Message, ProtocolError> {
        let WireRecord {
            command,
            topic,
            value,
            ..
        } = self;
        match command.as_str() {
            command::PUBLISH => Ok(Message::Publish {
                topic: topic.ok_or(ProtocolError::MissingField("topic"))?,
                value: value.unwrap_or(Value::Null),
            }),
            command::SUBSCRIBE => Ok(Message::Subscribe {
                topic: topic.ok_or(ProtocolError::MissingField("topic"))?,
            }),
            command::UNSUBSCRIBE => Ok(Message::Unsubscribe {
                topic: topic.ok_or(ProtocolError::MissingField("topic"))?,
            }),
            command::LIST_ALL => Ok(Message::ListAll),
            command::SUBSCRIPTIONS => {
                let value = value.ok_or(ProtocolError::MissingField("value"))?;
                let entries = serde_json::from_value(value)?;
                Ok(Message::Subscriptions { entries })
            }
            _ => Err(ProtocolError::UnknownCommand(command)),
        }
    }
}

/// Structured-text encoding: one JSON object per payload.
pub mod json {
    use super::*;

    pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let record = WireRecord::from_message(message, WireFormat::Json)?;
        Ok(serde_json::to_vec(&record)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Message, ProtocolError> {
        let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;
        let record: WireRecord = serde_json::from_str(text)?;
        record.into_message()
    }
}

/// Attribute-markup encoding: a single `<msg/>` element whose attributes
/// are the logical fields.
pub mod xml {
    use super::*;
    use quick_xml::events::{BytesStart, Event};
    use quick_xml::{Reader, Writer};

    pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let record = WireRecord::from_message(message, WireFormat::Xml)?;

        let mut elem = BytesStart::new("msg");
        elem.push_attribute(("command", record.command.as_str()));
        if let Some(format) = &record.format {
            elem.push_attribute(("type", format.as_str()));
        }
        if let Some(topic) = &record.topic {
            elem.push_attribute(("topic", topic.as_str()));
        }
        if let Some(value) = &record.value {
            let text = serde_json::to_string(value)?;
            elem.push_attribute(("value", text.as_str()));
        }

        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Empty(elem))?;
        Ok(writer.into_inner())
    }

    pub fn decode(payload: &[u8]) -> Result<Message, ProtocolError> {
        let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;
        let mut reader = Reader::from_str(text);

        let elem = loop {
            match reader.read_event()? {
                Event::Start(elem) | Event::Empty(elem) => break elem,
                Event::Eof => return Err(ProtocolError::MissingField("msg")),
                _ => {}
            }
        };
        if elem.name().as_ref() != b"msg" {
            return Err(ProtocolError::MissingField("msg"));
        }

        let mut record = WireRecord {
            command: String::new(),
            format: None,
            topic: None,
            value: None,
        };
        let mut has_command = false;
        for attr in elem.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let text = attr.unescape_value()?.into_owned();
            match attr.key.as_ref() {
                b"command" => {
                    record.command = text;
                    has_command = true;
                }
                b"type" => record.format = Some(text),
                b"topic" => record.topic = Some(text),
                b"value" => record.value = Some(parse_attribute_value(&text)),
                _ => {}
            }
        }
        if !has_command {
            return Err(ProtocolError::MissingField("command"));
        }

        record.into_message()
    }

    /// Attribute text is JSON when we produced it, but any foreign producer
    /// stringifies values. Non-JSON text decodes as a plain string.
    fn parse_attribute_value(text: &str) -> Value {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }
}

/// Native binary encoding: a bincode record mirroring the JSON field set,
/// with the value carried as compact JSON text.
pub mod binary {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Record {
        command: String,
        format: String,
        topic: Option<String>,
        value: Option<String>,
    }

    pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let record = WireRecord::from_message(message, WireFormat::Binary)?;
        let value = match &record.value {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        let record = Record {
            command: record.command,
            format: record.format.unwrap_or_default(),
            topic: record.topic,
            value,
        };
        Ok(bincode::serialize(&record)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Message, ProtocolError> {
        let record: Record = bincode::deserialize(payload)?;
        let value = match &record.value {
            Some(text) => Some(serde_json::from_str(text)?),
            None => None,
        };
        WireRecord {
            command: record.command,
            format: Some(record.format),
            topic: record.topic,
            value,
        }
        .into_message()
    }
}
