//! Minimal DHCPv6 message model
//!
//! The looking glass never parses wire data itself: the surrounding server
//! hands over already-decoded messages. This module only models what the
//! pipeline needs to attribute a transaction to a client and to store a
//! readable copy of the exchange.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::Ipv6Addr;

use crate::options;

pub const OPTION_CLIENT_ID: u16 = 1;
pub const OPTION_INTERFACE_ID: u16 = 18;
pub const OPTION_REMOTE_ID: u16 = 37;

/// RFC 8415 message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Solicit,
    Advertise,
    Request,
    Confirm,
    Renew,
    Rebind,
    Reply,
    Release,
    Decline,
    Reconfigure,
    InformationRequest,
    RelayForward,
    RelayReply,
    Unknown(u8),
}

impl MessageType {
    pub fn code(self) -> u8 {
        match self {
            MessageType::Solicit => 1,
            MessageType::Advertise => 2,
            MessageType::Request => 3,
            MessageType::Confirm => 4,
            MessageType::Renew => 5,
            MessageType::Rebind => 6,
            MessageType::Reply => 7,
            MessageType::Release => 8,
            MessageType::Decline => 9,
            MessageType::Reconfigure => 10,
            MessageType::InformationRequest => 11,
            MessageType::RelayForward => 12,
            MessageType::RelayReply => 13,
            MessageType::Unknown(code) => code,
        }
    }

    /// Dashed lower-case name, as stored in `request_type` / `response_type`.
    pub fn name(self) -> String {
        let name = match self {
            MessageType::Solicit => "solicit",
            MessageType::Advertise => "advertise",
            MessageType::Request => "request",
            MessageType::Confirm => "confirm",
            MessageType::Renew => "renew",
            MessageType::Rebind => "rebind",
            MessageType::Reply => "reply",
            MessageType::Release => "release",
            MessageType::Decline => "decline",
            MessageType::Reconfigure => "reconfigure",
            MessageType::InformationRequest => "information-request",
            MessageType::RelayForward => "relay-forward",
            MessageType::RelayReply => "relay-reply",
            MessageType::Unknown(code) => return format!("unknown-{}", code),
        };
        name.to_string()
    }
}

impl From<u8> for MessageType {
    fn from(code: u8) -> Self {
        match code {
            1 => MessageType::Solicit,
            2 => MessageType::Advertise,
            3 => MessageType::Request,
            4 => MessageType::Confirm,
            5 => MessageType::Renew,
            6 => MessageType::Rebind,
            7 => MessageType::Reply,
            8 => MessageType::Release,
            9 => MessageType::Decline,
            10 => MessageType::Reconfigure,
            11 => MessageType::InformationRequest,
            12 => MessageType::RelayForward,
            13 => MessageType::RelayReply,
            other => MessageType::Unknown(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// A single option, kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOption {
    pub code: u16,
    pub data: Vec<u8>,
}

impl DhcpOption {
    pub fn new(code: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }

    pub fn client_id(duid: impl Into<Vec<u8>>) -> Self {
        Self::new(OPTION_CLIENT_ID, duid)
    }

    pub fn interface_id(interface_id: impl Into<Vec<u8>>) -> Self {
        Self::new(OPTION_INTERFACE_ID, interface_id)
    }

    pub fn remote_id(enterprise_number: u32, remote_id: &[u8]) -> Self {
        let mut data = enterprise_number.to_be_bytes().to_vec();
        data.extend_from_slice(remote_id);
        Self::new(OPTION_REMOTE_ID, data)
    }
}

impl Serialize for DhcpOption {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DhcpOption", 3)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("name", &options::option_name(self.code))?;
        state.serialize_field("data", &hex::encode(&self.data))?;
        state.end()
    }
}

/// Remote-ID option payload (RFC 4649).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteId<'a> {
    pub enterprise_number: u32,
    pub remote_id: &'a [u8],
}

impl<'a> RemoteId<'a> {
    /// `None` when the data is too short to hold the enterprise number.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let (enterprise, remote_id) = data.split_first_chunk::<4>()?;
        Some(Self {
            enterprise_number: u32::from_be_bytes(*enterprise),
            remote_id,
        })
    }
}

fn find_option(options: &[DhcpOption], code: u16) -> Option<&DhcpOption> {
    options.iter().find(|option| option.code == code)
}

/// A message exchanged directly between client and server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientServerMessage {
    pub message_type: MessageType,
    #[serde(serialize_with = "serialize_hex")]
    pub transaction_id: [u8; 3],
    pub options: Vec<DhcpOption>,
}

impl ClientServerMessage {
    pub fn new(message_type: MessageType, transaction_id: [u8; 3]) -> Self {
        Self {
            message_type,
            transaction_id,
            options: Vec::new(),
        }
    }

    pub fn with_option(mut self, option: DhcpOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn option(&self, code: u16) -> Option<&DhcpOption> {
        find_option(&self.options, code)
    }

    /// Raw DUID from the client-id option.
    pub fn client_duid(&self) -> Option<&[u8]> {
        self.option(OPTION_CLIENT_ID).map(|o| o.data.as_slice())
    }

    /// Copy of this message keeping only the options `keep` accepts.
    pub fn filtered(&self, keep: impl Fn(u16) -> bool) -> Self {
        Self {
            message_type: self.message_type,
            transaction_id: self.transaction_id,
            options: self
                .options
                .iter()
                .filter(|option| keep(option.code))
                .cloned()
                .collect(),
        }
    }
}

/// A relay-forward or relay-reply wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayMessage {
    pub message_type: MessageType,
    pub hop_count: u8,
    pub link_address: Ipv6Addr,
    pub peer_address: Ipv6Addr,
    pub options: Vec<DhcpOption>,
}

impl RelayMessage {
    pub fn forward(hop_count: u8, link_address: Ipv6Addr, peer_address: Ipv6Addr) -> Self {
        Self {
            message_type: MessageType::RelayForward,
            hop_count,
            link_address,
            peer_address,
            options: Vec::new(),
        }
    }

    pub fn with_option(mut self, option: DhcpOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn option(&self, code: u16) -> Option<&DhcpOption> {
        find_option(&self.options, code)
    }

    pub fn interface_id(&self) -> Option<&[u8]> {
        self.option(OPTION_INTERFACE_ID).map(|o| o.data.as_slice())
    }

    /// Raw remote-id option data, enterprise number included.
    pub fn remote_id_data(&self) -> Option<&[u8]> {
        self.option(OPTION_REMOTE_ID).map(|o| o.data.as_slice())
    }
}

/// Everything the server knows about one exchange.
///
/// `relay_chain[0]` is the relay closest to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBundle {
    pub server_name: String,
    pub received_at: DateTime<Utc>,
    pub request: ClientServerMessage,
    pub relay_chain: Vec<RelayMessage>,
    pub response: Option<ClientServerMessage>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl TransactionBundle {
    pub fn new(
        server_name: impl Into<String>,
        request: ClientServerMessage,
        relay_chain: Vec<RelayMessage>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            received_at: Utc::now(),
            request,
            relay_chain,
            response: None,
            responded_at: None,
        }
    }

    pub fn received_at(mut self, ts: DateTime<Utc>) -> Self {
        self.received_at = ts;
        self
    }

    /// Attach the computed response, stamped with the current time.
    pub fn respond(&mut self, response: ClientServerMessage) {
        self.response = Some(response);
        self.responded_at = Some(Utc::now());
    }

    pub fn closest_relay(&self) -> Option<&RelayMessage> {
        self.relay_chain.first()
    }
}

fn serialize_hex<S: Serializer>(bytes: &[u8; 3], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}
