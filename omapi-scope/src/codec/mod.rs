//! # Wire Codec
//!
//! Turns the hex rendering of command/response buffers exchanged with a secure
//! element into a segmented, human-auditable form:
//!
//! ```text
//! command:  00A4040007A0000002471001  →  00 A4 04 00 07 A0000002471001
//!           CLA INS P1 P2 Lc data
//! response: 6F10...9000               →  6F10... 90 00
//!           data SW1 SW2
//! ```
//!
//! Malformed input is never an error: it comes back unchanged.

pub mod apdu;

pub use apdu::{
    decode_command, decode_response, encode_hex, parse_command, parse_response, CommandApdu,
    CommandBody, ResponseApdu,
};
