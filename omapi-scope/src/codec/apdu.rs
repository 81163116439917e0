//! APDU command and response segmentation.
//!
//! Both parsers work on the hex text rather than on bytes so that the caller's
//! hex casing survives into the output. Every slice taken here is on an even
//! offset of an ASCII string, which keeps indexing panic-free.

use std::fmt;

/// Header bytes (CLA, INS, P1, P2) present in every command.
const HEADER_BYTES: usize = 4;

/// Status bytes (SW1, SW2) closing every response.
const STATUS_BYTES: usize = 2;

/// Render bytes as upper-case hex, the form every record field uses.
#[must_use]
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Body layout of a command APDU after the four header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBody<'a> {
    /// Header only (case 1)
    Empty,
    /// A single trailing expected-length byte (case 2S)
    ExpectedLength(&'a str),
    /// One-byte Lc, body, optional one-byte Le
    Short {
        lc: &'a str,
        data: &'a str,
        le: Option<&'a str>,
    },
    /// `00` + two-byte Lc, body, optional two-byte Le
    Extended {
        lc: &'a str,
        data: &'a str,
        le: Option<&'a str>,
    },
    /// Remainder that matches no length encoding, kept verbatim
    Undecodable(&'a str),
}

/// A command APDU split into its header fields and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandApdu<'a> {
    pub cla: &'a str,
    pub ins: &'a str,
    pub p1: &'a str,
    pub p2: &'a str,
    pub body: CommandBody<'a>,
}

impl CommandApdu<'_> {
    /// Ordered list of display tokens.
    #[must_use]
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens = vec![self.cla, self.ins, self.p1, self.p2];
        match self.body {
            CommandBody::Empty => {}
            CommandBody::ExpectedLength(le) => tokens.push(le),
            CommandBody::Short {
                lc,
                data,
                le,
            } | CommandBody::Extended { lc, data, le } => {
                tokens.push(lc);
                if !data.is_empty() {
                    tokens.push(data);
                }
                tokens.extend(le);
            }
            CommandBody::Undecodable(rest) => tokens.push(rest),
        }
        tokens
    }
}

impl fmt::Display for CommandApdu<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens().join(" "))
    }
}

/// A response APDU split into data and status words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseApdu<'a> {
    pub data: &'a str,
    pub sw1: &'a str,
    pub sw2: &'a str,
}

impl fmt::Display for ResponseApdu<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data.is_empty() {
            write!(f, "{} {}", self.sw1, self.sw2)
        } else {
            write!(f, "{} {} {}", self.data, self.sw1, self.sw2)
        }
    }
}

/// Hex text usable for segmentation: ASCII, even length, at least `min_bytes` long.
fn usable(hex: &str, min_bytes: usize) -> bool {
    hex.is_ascii() && hex.len() % 2 == 0 && hex.len() >= min_bytes * 2
}

/// Hex slice covering bytes `[from, to)`.
fn bytes(hex: &str, from: usize, to: usize) -> &str {
    &hex[from * 2..to * 2]
}

/// Split a command into header and body.
///
/// Returns `None` when the input is shorter than a header, has odd length, or
/// is not ASCII.
#[must_use]
pub fn parse_command(hex: &str) -> Option<CommandApdu<'_>> {
    if !usable(hex, HEADER_BYTES) {
        return None;
    }

    let total = hex.len() / 2;
    let body = match total - HEADER_BYTES {
        0 => CommandBody::Empty,
        1 => CommandBody::ExpectedLength(bytes(hex, 4, 5)),
        _ if bytes(hex, 4, 5) == "00" => parse_extended_body(hex, total),
        _ => parse_short_body(hex, total),
    };

    Some(CommandApdu {
        cla: bytes(hex, 0, 1),
        ins: bytes(hex, 1, 2),
        p1: bytes(hex, 2, 3),
        p2: bytes(hex, 3, 4),
        body,
    })
}

fn parse_short_body(hex: &str, total: usize) -> CommandBody<'_> {
    let lc = bytes(hex, 4, 5);
    let remainder = &hex[HEADER_BYTES * 2..];
    let Ok(len) = u8::from_str_radix(lc, 16) else {
        return CommandBody::Undecodable(remainder);
    };
    let len = usize::from(len);
    let data_end = 5 + len;

    if total == data_end {
        CommandBody::Short {
            lc,
            data: bytes(hex, 5, data_end),
            le: None,
        }
    } else if total == data_end + 1 {
        CommandBody::Short {
            lc,
            data: bytes(hex, 5, data_end),
            le: Some(bytes(hex, data_end, data_end + 1)),
        }
    } else {
        CommandBody::Undecodable(remainder)
    }
}

fn parse_extended_body(hex: &str, total: usize) -> CommandBody<'_> {
    let remainder = &hex[HEADER_BYTES * 2..];
    // 00 marker plus a two-byte length
    if total < 7 {
        return CommandBody::Undecodable(remainder);
    }
    let Ok(len) = u16::from_str_radix(bytes(hex, 5, 7), 16) else {
        return CommandBody::Undecodable(remainder);
    };
    let lc = bytes(hex, 4, 7);
    let data_end = 7 + usize::from(len);

    if total == data_end {
        CommandBody::Extended {
            lc,
            data: bytes(hex, 7, data_end),
            le: None,
        }
    } else if total == data_end + 2 {
        CommandBody::Extended {
            lc,
            data: bytes(hex, 7, data_end),
            le: Some(bytes(hex, data_end, data_end + 2)),
        }
    } else {
        CommandBody::Undecodable(remainder)
    }
}

/// Split a response into data and the two status bytes.
///
/// Returns `None` when the input is shorter than the status words, has odd
/// length, or is not ASCII.
#[must_use]
pub fn parse_response(hex: &str) -> Option<ResponseApdu<'_>> {
    if !usable(hex, STATUS_BYTES) {
        return None;
    }
    let total = hex.len() / 2;
    Some(ResponseApdu {
        data: bytes(hex, 0, total - 2),
        sw1: bytes(hex, total - 2, total - 1),
        sw2: bytes(hex, total - 1, total),
    })
}

/// Space-delimited rendering of a command, or the input unchanged if malformed.
#[must_use]
pub fn decode_command(hex: &str) -> String {
    parse_command(hex).map_or_else(|| hex.to_owned(), |apdu| apdu.to_string())
}

/// `{data} {SW1} {SW2}` rendering of a response, or the input unchanged if malformed.
#[must_use]
pub fn decode_response(hex: &str) -> String {
    parse_response(hex).map_or_else(|| hex.to_owned(), |apdu| apdu.to_string())
}
