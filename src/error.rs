//! Parse error codes and the fatal error policy used by the DOM accessors.

use core::fmt;

/// The reason a parse failed.
///
/// The discriminant is stored verbatim inside the document's error record,
/// so the values are part of the buffer format and must stay stable.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FJ_Error_Code {
    /// The amount of nested elements exceeds the depth limit.
    DepthOverflow = 2,
    /// An unexpected character was processed.
    UnexpectedChar = 3,
    /// The json message ended before the document was complete.
    JsonMessageTruncated = 4,
    /// A numeric value had an invalid format.
    InvalidNumberFormat = 6,
    /// The json message did not stop after the root value (strict mode only).
    UnexpectedJsonAppendix = 7,
    /// Two values were not separated by a comma.
    MissingComma = 8,
    /// An object entry misses the ':' after its key.
    MissingColon = 9,
    /// A fatal error occurred (no other classification possible).
    FatalParserError = 10,
    /// The storage buffer is too small to hold the DOM.
    StorageBufferTooSmall = 11,
    /// Growing the dynamic buffer failed.
    AllocationError = 12,
    /// A trailing comma was detected in an object or array (strict mode only).
    TrailingComma = 13,
    /// A string contained an invalid escape sequence (e.g. `\x`).
    InvalidEscapeSequence = 14,
    /// A unicode sequence could not be translated to a valid UTF-8 character.
    InvalidUnicodeSequence = 15,
    /// An object declared the same key twice (duplicate key rejection only).
    DuplicateKey = 16,
}

impl FJ_Error_Code {
    pub(crate) fn from_u32(value: u32) -> FJ_Error_Code {
        match value {
            2 => FJ_Error_Code::DepthOverflow,
            3 => FJ_Error_Code::UnexpectedChar,
            4 => FJ_Error_Code::JsonMessageTruncated,
            6 => FJ_Error_Code::InvalidNumberFormat,
            7 => FJ_Error_Code::UnexpectedJsonAppendix,
            8 => FJ_Error_Code::MissingComma,
            9 => FJ_Error_Code::MissingColon,
            11 => FJ_Error_Code::StorageBufferTooSmall,
            12 => FJ_Error_Code::AllocationError,
            13 => FJ_Error_Code::TrailingComma,
            14 => FJ_Error_Code::InvalidEscapeSequence,
            15 => FJ_Error_Code::InvalidUnicodeSequence,
            16 => FJ_Error_Code::DuplicateKey,
            _ => FJ_Error_Code::FatalParserError,
        }
    }
}

impl fmt::Display for FJ_Error_Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            FJ_Error_Code::DepthOverflow => "nesting depth exceeded",
            FJ_Error_Code::UnexpectedChar => "unexpected character",
            FJ_Error_Code::JsonMessageTruncated => "json message truncated",
            FJ_Error_Code::InvalidNumberFormat => "invalid number format",
            FJ_Error_Code::UnexpectedJsonAppendix => "content after the root value",
            FJ_Error_Code::MissingComma => "missing comma",
            FJ_Error_Code::MissingColon => "missing colon",
            FJ_Error_Code::FatalParserError => "fatal parser error",
            FJ_Error_Code::StorageBufferTooSmall => "storage buffer too small",
            FJ_Error_Code::AllocationError => "allocation failed",
            FJ_Error_Code::TrailingComma => "trailing comma",
            FJ_Error_Code::InvalidEscapeSequence => "invalid escape sequence",
            FJ_Error_Code::InvalidUnicodeSequence => "invalid unicode sequence",
            FJ_Error_Code::DuplicateKey => "duplicate object key",
        };
        f.write_str(msg)
    }
}

/// Decides what happens when the DOM surface is misused, e.g. a typed read
/// on a value of the wrong type or an out of range array index.
///
/// The default policy panics. Installing a callback makes the faulting
/// accessor invoke it and return a type appropriate zero value instead, so
/// tolerant clients can keep going:
///
/// ```rust
/// use flat_json::{parse, FJ_Error_Policy};
///
/// fn note_misuse() { /* count it, log it, ... */ }
///
/// let mut buffer = [0u8; 64];
/// let (_, mut document) = parse("42", &mut buffer);
/// document.set_error_policy(FJ_Error_Policy::with_callback(note_misuse));
///
/// // not a string -> callback fires, zero value comes back
/// assert_eq!(document.root().get_string(), "");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FJ_Error_Policy {
    callback: Option<fn()>,
}

impl FJ_Error_Policy {
    /// The default policy: fatal misuse panics.
    pub fn panicking() -> Self {
        FJ_Error_Policy { callback: None }
    }

    /// A policy that invokes `callback` and lets the accessor return a zero
    /// value.
    pub fn with_callback(callback: fn()) -> Self {
        FJ_Error_Policy { callback: Some(callback) }
    }

    pub(crate) fn fatal(&self) {
        match self.callback {
            Some(callback) => callback(),
            None => panic!("flat_json: fatal DOM access (install an FJ_Error_Policy callback to tolerate this)"),
        }
    }
}

impl Default for FJ_Error_Policy {
    fn default() -> Self {
        FJ_Error_Policy::panicking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_survive_the_record_round_trip() {
        let codes = [
            FJ_Error_Code::DepthOverflow,
            FJ_Error_Code::UnexpectedChar,
            FJ_Error_Code::JsonMessageTruncated,
            FJ_Error_Code::InvalidNumberFormat,
            FJ_Error_Code::UnexpectedJsonAppendix,
            FJ_Error_Code::MissingComma,
            FJ_Error_Code::MissingColon,
            FJ_Error_Code::FatalParserError,
            FJ_Error_Code::StorageBufferTooSmall,
            FJ_Error_Code::AllocationError,
            FJ_Error_Code::TrailingComma,
            FJ_Error_Code::InvalidEscapeSequence,
            FJ_Error_Code::InvalidUnicodeSequence,
            FJ_Error_Code::DuplicateKey,
        ];
        for code in codes.iter() {
            assert_eq!(*code, FJ_Error_Code::from_u32(*code as u32));
        }
    }

    #[test]
    fn unknown_codes_collapse_to_fatal() {
        assert_eq!(FJ_Error_Code::FatalParserError, FJ_Error_Code::from_u32(0));
        assert_eq!(FJ_Error_Code::FatalParserError, FJ_Error_Code::from_u32(255));
    }
}
