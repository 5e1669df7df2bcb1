//! Minimal base64 helpers for identity fields.
//!
//! Nicknames and profile images travel as base64 text so that they never
//! contain the protocol's separators (space and `!`).  The lobby and the
//! discovery responder check them at two different strengths:
//!
//! - [`is_base64`] is the lenient alphabet check the lobby applies to
//!   `config` fields.  It accepts both the standard and URL-safe alphabets and
//!   `=` anywhere, without looking at the length.
//! - [`base64_decode`] is a strict RFC 4648 decoder (padding optional), used
//!   by the discovery responder to validate its advertised profile image.

use super::DomainError;

/// The standard base64 alphabet as defined in RFC 4648 §4.
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Encodes binary data as standard, padded base64.
///
/// The inverse of [`base64_decode`]: bytes are shifted into an accumulator
/// and drained six bits at a time, then the output is padded to a multiple
/// of four characters.
pub fn base64_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    for &byte in data {
        acc = (acc << 8) | u32::from(byte);
        bits += 8;
        while bits >= 6 {
            bits -= 6;
            out.push(char::from(ALPHABET[((acc >> bits) & 0x3F) as usize]));
        }
        acc &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(char::from(ALPHABET[((acc << (6 - bits)) & 0x3F) as usize]));
    }
    while out.len() % 4 != 0 {
        out.push('=');
    }
    out
}

/// Returns `true` when every character of `text` belongs to the standard or
/// URL-safe base64 alphabet, or is the `=` pad character.
///
/// An empty string counts as base64, matching the lenient check.
pub fn is_base64(text: &str) -> bool {
    text.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'-' | b'_' | b'='))
}

/// Decodes standard base64 text, accepting input with or without trailing
/// `=` padding.
///
/// # Errors
///
/// Returns [`DomainError::InvalidBase64`] if `text` contains a character
/// outside the standard alphabet, has padding in the middle, or has a length
/// that cannot come from any byte sequence.
pub fn base64_decode(text: &str) -> Result<Vec<u8>, DomainError> {
    let invalid = || DomainError::InvalidBase64 { field: "input" };

    let trimmed = text.trim_end_matches('=');
    let padding = text.len() - trimmed.len();
    if padding > 2 || (padding > 0 && text.len() % 4 != 0) {
        return Err(invalid());
    }
    if trimmed.len() % 4 == 1 {
        return Err(invalid());
    }

    let mut out = Vec::with_capacity(trimmed.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    for b in trimmed.bytes() {
        let value = sextet(b).ok_or_else(invalid)?;
        acc = (acc << 6) | u32::from(value);
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Ok(out)
}

fn sextet(b: u8) -> Option<u8> {
    match b {
        b'A'..=b'Z' => Some(b - b'A'),
        b'a'..=b'z' => Some(b - b'a' + 26),
        b'0'..=b'9' => Some(b - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
