//! Wire format for the SA-MP query protocol.
//!
//! Every query packet starts with the same 11-byte header: the `SAMP`
//! signature, the server's IPv4 address and port, and a one-byte opcode.
//! Requests append length-prefixed strings (password and command for
//! `execute-command`); responses echo the request header verbatim and
//! append one length-prefixed line of console text. The echoed header is
//! the protocol's only anti-spoofing mechanism, so comparisons must be
//! byte-exact.
//!
//! Multi-byte header fields travel in network order; length prefixes are
//! little-endian, as the SA-MP query protocol defines them.
//!
//! This crate is pure: no sockets, no timers, no state.

use std::net::Ipv4Addr;
use thiserror::Error;

pub const PACKET_SIGNATURE: [u8; 4] = *b"SAMP";
pub const HEADER_LEN: usize = 11;
/// Largest response line a server is allowed to send; longer declared
/// text is truncated to this, never overrun.
pub const MAX_RESPONSE_TEXT: usize = 1024;
/// Largest string a u16 length prefix can carry.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Query kind selector, one byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Info = b'i',
    Rules = b'r',
    ClientList = b'c',
    DetailedInfo = b'd',
    RconCommand = b'x',
    Ping = b'p',
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'i' => Some(Opcode::Info),
            b'r' => Some(Opcode::Rules),
            b'c' => Some(Opcode::ClientList),
            b'd' => Some(Opcode::DetailedInfo),
            b'x' => Some(Opcode::RconCommand),
            b'p' => Some(Opcode::Ping),
            _ => None,
        }
    }

    /// Only `execute-command` carries the RCON password.
    pub fn requires_password(self) -> bool {
        matches!(self, Opcode::RconCommand)
    }
}

/// The fixed 11-byte header shared by requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub address: Ipv4Addr,
    pub port: u16,
    pub opcode: Opcode,
}

impl PacketHeader {
    pub fn new(address: Ipv4Addr, port: u16, opcode: Opcode) -> Self {
        PacketHeader {
            address,
            port,
            opcode,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&PACKET_SIGNATURE);
        bytes[4..8].copy_from_slice(&self.address.octets());
        bytes[8..10].copy_from_slice(&self.port.to_be_bytes());
        bytes[10] = self.opcode as u8;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_LEN {
            return Err(PacketError::Truncated(bytes.len()));
        }
        if bytes[0..4] != PACKET_SIGNATURE {
            return Err(PacketError::BadSignature);
        }
        let opcode = Opcode::from_byte(bytes[10]).ok_or(PacketError::UnknownOpcode(bytes[10]))?;
        let address = Ipv4Addr::new(bytes[4], bytes[5], bytes[6], bytes[7]);
        let port = u16::from_be_bytes([bytes[8], bytes[9]]);
        Ok(PacketHeader {
            address,
            port,
            opcode,
        })
    }

    /// True only when the two headers are byte-identical in all four
    /// fields. Anything else is a foreign or spoofed datagram.
    pub fn is_echo_of(&self, request: &PacketHeader) -> bool {
        self.to_bytes() == request.to_bytes()
    }
}

/// One query to send: opcode, password (for `execute-command` only) and
/// the ordered string fields that follow the header.
#[derive(Debug, Clone)]
pub struct Query {
    pub opcode: Opcode,
    pub password: Option<String>,
    pub fields: Vec<String>,
}

impl Query {
    /// A passwordless query (`info`, `rules`, `client_list`,
    /// `detailed_info`, `ping`).
    pub fn simple(opcode: Opcode) -> Self {
        Query {
            opcode,
            password: None,
            fields: Vec::new(),
        }
    }

    /// An `execute-command` query carrying the RCON password and one
    /// command string.
    pub fn rcon_command(password: &str, command: &str) -> Self {
        Query {
            opcode: Opcode::RconCommand,
            password: Some(password.to_string()),
            fields: vec![command.to_string()],
        }
    }

    /// Serializes the query into a request packet addressed to the given
    /// server endpoint.
    pub fn encode(&self, address: Ipv4Addr, port: u16) -> Result<Vec<u8>, PacketError> {
        let header = PacketHeader::new(address, port, self.opcode);
        let mut packet = header.to_bytes().to_vec();

        if self.opcode.requires_password() {
            let password = self
                .password
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or(PacketError::MissingPassword)?;
            append_string(&mut packet, password)?;
        }
        for field in &self.fields {
            append_string(&mut packet, field)?;
        }
        Ok(packet)
    }
}

/// One decoded response fragment: the echoed header plus a single line
/// of console text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub header: PacketHeader,
    pub text: Vec<u8>,
}

impl Response {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }
}

/// Decodes a response datagram. Fails if the buffer is shorter than the
/// header plus the text length field, or if the declared length exceeds
/// the bytes actually present. Text past [`MAX_RESPONSE_TEXT`] is
/// truncated.
pub fn decode_response(bytes: &[u8]) -> Result<Response, PacketError> {
    if bytes.len() < HEADER_LEN + 2 {
        return Err(PacketError::Truncated(bytes.len()));
    }
    let header = PacketHeader::from_bytes(bytes)?;
    let declared = u16::from_le_bytes([bytes[HEADER_LEN], bytes[HEADER_LEN + 1]]) as usize;
    let available = bytes.len() - HEADER_LEN - 2;
    if declared > available {
        return Err(PacketError::LengthMismatch {
            declared,
            available,
        });
    }
    let len = declared.min(MAX_RESPONSE_TEXT);
    let text = bytes[HEADER_LEN + 2..HEADER_LEN + 2 + len].to_vec();
    Ok(Response { header, text })
}

fn append_string(packet: &mut Vec<u8>, s: &str) -> Result<(), PacketError> {
    if s.len() > MAX_FIELD_LEN {
        return Err(PacketError::FieldTooLong(s.len()));
    }
    packet.extend_from_slice(&(s.len() as u16).to_le_bytes());
    packet.extend_from_slice(s.as_bytes());
    Ok(())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too short ({0} bytes)")]
    Truncated(usize),
    #[error("packet signature is not SAMP")]
    BadSignature,
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("declared text length {declared} exceeds payload ({available} bytes)")]
    LengthMismatch { declared: usize, available: usize },
    #[error("string too long for a u16 length prefix ({0} bytes)")]
    FieldTooLong(usize),
    #[error("execute-command query requires a password")]
    MissingPassword,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> PacketHeader {
        PacketHeader::new(Ipv4Addr::new(127, 0, 0, 1), 7777, Opcode::RconCommand)
    }

    #[test]
    fn test_header_byte_layout() {
        let bytes = header().to_bytes();
        assert_eq!(&bytes[0..4], b"SAMP");
        assert_eq!(&bytes[4..8], &[127, 0, 0, 1]);
        assert_eq!(&bytes[8..10], &7777u16.to_be_bytes());
        assert_eq!(bytes[10], b'x');
    }

    #[test]
    fn test_header_roundtrip() {
        for opcode in [
            Opcode::Info,
            Opcode::Rules,
            Opcode::ClientList,
            Opcode::DetailedInfo,
            Opcode::RconCommand,
            Opcode::Ping,
        ] {
            let original = PacketHeader::new(Ipv4Addr::new(192, 168, 1, 42), 8192, opcode);
            let decoded = PacketHeader::from_bytes(&original.to_bytes()).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_header_rejects_bad_signature() {
        let mut bytes = header().to_bytes();
        bytes[0] = b'X';
        assert_eq!(
            PacketHeader::from_bytes(&bytes),
            Err(PacketError::BadSignature)
        );
    }

    #[test]
    fn test_header_rejects_unknown_opcode() {
        let mut bytes = header().to_bytes();
        bytes[10] = b'z';
        assert_eq!(
            PacketHeader::from_bytes(&bytes),
            Err(PacketError::UnknownOpcode(b'z'))
        );
    }

    #[test]
    fn test_is_echo_exact_match_only() {
        let request = header();
        assert!(request.is_echo_of(&request));

        let wrong_address =
            PacketHeader::new(Ipv4Addr::new(127, 0, 0, 2), 7777, Opcode::RconCommand);
        let wrong_port = PacketHeader::new(Ipv4Addr::new(127, 0, 0, 1), 7778, Opcode::RconCommand);
        let wrong_opcode = PacketHeader::new(Ipv4Addr::new(127, 0, 0, 1), 7777, Opcode::Info);
        assert!(!wrong_address.is_echo_of(&request));
        assert!(!wrong_port.is_echo_of(&request));
        assert!(!wrong_opcode.is_echo_of(&request));
    }

    #[test]
    fn test_encode_rcon_command_layout() {
        let query = Query::rcon_command("secret", "gmx");
        let packet = query
            .encode(Ipv4Addr::new(127, 0, 0, 1), 7777)
            .unwrap();

        assert_eq!(&packet[0..11], &header().to_bytes());
        assert_eq!(&packet[11..13], &6u16.to_le_bytes());
        assert_eq!(&packet[13..19], b"secret");
        assert_eq!(&packet[19..21], &3u16.to_le_bytes());
        assert_eq!(&packet[21..24], b"gmx");
        assert_eq!(packet.len(), 24);
    }

    #[test]
    fn test_encode_simple_query_has_no_password() {
        let query = Query::simple(Opcode::Info);
        let packet = query.encode(Ipv4Addr::new(127, 0, 0, 1), 7777).unwrap();
        assert_eq!(packet.len(), HEADER_LEN);
        assert_eq!(packet[10], b'i');
    }

    #[test]
    fn test_encode_requires_password_for_rcon() {
        let mut query = Query::rcon_command("", "gmx");
        assert_eq!(
            query.encode(Ipv4Addr::new(127, 0, 0, 1), 7777),
            Err(PacketError::MissingPassword)
        );
        query.password = None;
        assert_eq!(
            query.encode(Ipv4Addr::new(127, 0, 0, 1), 7777),
            Err(PacketError::MissingPassword)
        );
    }

    #[test]
    fn test_encode_rejects_oversized_field() {
        let query = Query::rcon_command("secret", &"a".repeat(MAX_FIELD_LEN + 1));
        assert_eq!(
            query.encode(Ipv4Addr::new(127, 0, 0, 1), 7777),
            Err(PacketError::FieldTooLong(MAX_FIELD_LEN + 1))
        );
    }

    fn response_bytes(text: &[u8]) -> Vec<u8> {
        let mut bytes = header().to_bytes().to_vec();
        bytes.extend_from_slice(&(text.len() as u16).to_le_bytes());
        bytes.extend_from_slice(text);
        bytes
    }

    #[test]
    fn test_decode_response() {
        let response = decode_response(&response_bytes(b"Server restarting...")).unwrap();
        assert_eq!(response.header, header());
        assert_eq!(response.text_lossy(), "Server restarting...");
    }

    #[test]
    fn test_decode_empty_response() {
        let response = decode_response(&response_bytes(b"")).unwrap();
        assert!(response.text.is_empty());
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        assert_eq!(
            decode_response(&header().to_bytes()),
            Err(PacketError::Truncated(HEADER_LEN))
        );
    }

    #[test]
    fn test_decode_rejects_overdeclared_length() {
        let mut bytes = response_bytes(b"ok");
        bytes[HEADER_LEN..HEADER_LEN + 2].copy_from_slice(&100u16.to_le_bytes());
        assert_eq!(
            decode_response(&bytes),
            Err(PacketError::LengthMismatch {
                declared: 100,
                available: 2
            })
        );
    }

    #[test]
    fn test_decode_truncates_oversized_text() {
        let long = vec![b'a'; MAX_RESPONSE_TEXT + 100];
        let response = decode_response(&response_bytes(&long)).unwrap();
        assert_eq!(response.text.len(), MAX_RESPONSE_TEXT);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = response_bytes(b"ok");
        bytes.extend_from_slice(b"garbage after the declared text");
        let response = decode_response(&bytes).unwrap();
        assert_eq!(response.text_lossy(), "ok");
    }
}
