//! Wire framing for the length-prefixed session protocol (spec §4.1, §6).
//!
//! There is no message envelope or opcode: each iteration is five plain-text
//! round-trips over the raw socket. This module holds the fixed prompt strings and the
//! two small parsers (`parse_length`, `wants_continue`) the original's
//! `readDataSize`/`readClientChoice` implement in C++.

/// Written before the client sends the 15-digit length field.
pub const PROMPT_LEN: &str = "\nEnter the data length as 15 digits : \n";

/// Written after a result, asking whether to run another iteration.
pub const PROMPT_CONT: &str = "\nPress 'y' if you want to continue .\n";

/// Diagnostic for a length field shorter than 15 bytes (spec §8 S3).
pub const ERR_SHORT_LENGTH: &str = "Your input is less than 15 digits.\n";

/// Diagnostic for a length field that isn't decimal digits, matching the original's
/// `std::invalid_argument` branch of `std::stoi` (`readDataSize`).
pub const ERR_INVALID_NUMBER: &str = "Invalid argument cannot convert to integer.\n";

/// Diagnostic for a length field that parses but overflows, matching the original's
/// `std::out_of_range` branch of `std::stoi` (`readDataSize`).
pub const ERR_OUT_OF_RANGE: &str = "Out of range error: value is too large.\n";

/// Number of decimal digits the length field occupies.
pub const LENGTH_FIELD_DIGITS: usize = 15;

/// Largest single read attempted while looking for the length field.
pub const LENGTH_READ_BUF: usize = 1024;

/// Largest single read attempted while looking for the continuation byte.
pub const CONT_READ_BUF: usize = 128;

/// Extra slack allocated past the declared payload size so a best-effort drain of
/// trailing bytes (spec §4.1 `READ_DATA`) doesn't require a second allocation.
pub const PAYLOAD_SLACK: usize = 1024;

/// Why the 15-digit length field failed to parse, matching the three distinct
/// diagnostics `readDataSize` writes depending on the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthError {
    /// Fewer than 15 bytes were read.
    TooShort,
    /// The 15-byte prefix isn't ASCII decimal digits.
    NotNumeric,
    /// The digits parse but don't fit a `usize`.
    OutOfRange,
}

impl LengthError {
    /// The exact diagnostic line written back to the client for this failure.
    pub fn message(self) -> &'static str {
        match self {
            LengthError::TooShort => ERR_SHORT_LENGTH,
            LengthError::NotNumeric => ERR_INVALID_NUMBER,
            LengthError::OutOfRange => ERR_OUT_OF_RANGE,
        }
    }
}

/// Parses the first [`LENGTH_FIELD_DIGITS`] bytes of `buf` as a decimal payload length.
///
/// Distinguishes the same three failure modes as the original `readDataSize`: too few
/// bytes read, non-digit characters in the prefix, and digits that overflow. The
/// original parses into a 32-bit `int` via `std::stoi`, so this parses into an `i32`
/// first (a 15-digit all-nines prefix overflows it the same way) before widening to
/// `usize`.
pub fn parse_length(buf: &[u8]) -> Result<usize, LengthError> {
    if buf.len() < LENGTH_FIELD_DIGITS {
        return Err(LengthError::TooShort);
    }
    let digits = std::str::from_utf8(&buf[..LENGTH_FIELD_DIGITS])
        .map_err(|_| LengthError::NotNumeric)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LengthError::NotNumeric);
    }
    let value: i32 = digits.parse().map_err(|_| LengthError::OutOfRange)?;
    Ok(value as usize)
}

/// True iff the client's continuation response starts with an ASCII `'y'` (spec §4.1
/// `PROMPT_CONT`, §8 invariant 6). An empty read (EOF) is not a continuation.
pub fn wants_continue(buf: &[u8]) -> bool {
    matches!(buf.first(), Some(b'y'))
}
