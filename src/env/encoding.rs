// src/env/encoding.rs

//! Decoding of probe output on hosts whose shells do not write UTF-8.
//!
//! Only the characters that can appear in `NAME=value` listings are mapped;
//! anything else decodes to U+FFFD.

use crate::platform::ProbeEncoding;

/// Decode raw probe output according to the host's code page.
pub fn decode_probe_output(bytes: &[u8], encoding: ProbeEncoding) -> String {
    match encoding {
        ProbeEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        ProbeEncoding::Ebcdic1047 | ProbeEncoding::Ebcdic500 => {
            bytes.iter().map(|b| ebcdic_char(*b, encoding)).collect()
        }
    }
}

fn ebcdic_char(b: u8, encoding: ProbeEncoding) -> char {
    // Code points where IBM-1047 and IBM-500 disagree.
    let variant = match (encoding, b) {
        (ProbeEncoding::Ebcdic1047, 0xAD) | (ProbeEncoding::Ebcdic500, 0x4A) => Some('['),
        (ProbeEncoding::Ebcdic1047, 0xBD) | (ProbeEncoding::Ebcdic500, 0x5A) => Some(']'),
        (ProbeEncoding::Ebcdic1047, 0x5A) | (ProbeEncoding::Ebcdic500, 0x4F) => Some('!'),
        (ProbeEncoding::Ebcdic1047, 0x4F) | (ProbeEncoding::Ebcdic500, 0xBB) => Some('|'),
        (ProbeEncoding::Ebcdic1047, 0x5F) | (ProbeEncoding::Ebcdic500, 0xB0) => Some('^'),
        _ => None,
    };
    if let Some(c) = variant {
        return c;
    }

    match b {
        0x81..=0x89 => char::from(b'a' + (b - 0x81)),
        0x91..=0x99 => char::from(b'j' + (b - 0x91)),
        0xA2..=0xA9 => char::from(b's' + (b - 0xA2)),
        0xC1..=0xC9 => char::from(b'A' + (b - 0xC1)),
        0xD1..=0xD9 => char::from(b'J' + (b - 0xD1)),
        0xE2..=0xE9 => char::from(b'S' + (b - 0xE2)),
        0xF0..=0xF9 => char::from(b'0' + (b - 0xF0)),
        0x05 => '\t',
        0x0D => '\r',
        0x15 | 0x25 => '\n',
        0x40 => ' ',
        0x4B => '.',
        0x4C => '<',
        0x4D => '(',
        0x4E => '+',
        0x50 => '&',
        0x5B => '$',
        0x5C => '*',
        0x5D => ')',
        0x5E => ';',
        0x60 => '-',
        0x61 => '/',
        0x6B => ',',
        0x6C => '%',
        0x6D => '_',
        0x6E => '>',
        0x6F => '?',
        0x79 => '`',
        0x7A => ':',
        0x7B => '#',
        0x7C => '@',
        0x7D => '\'',
        0x7E => '=',
        0x7F => '"',
        0xA1 => '~',
        0xC0 => '{',
        0xD0 => '}',
        0xE0 => '\\',
        _ => char::REPLACEMENT_CHARACTER,
    }
}
