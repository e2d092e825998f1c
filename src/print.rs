//! The serializer: cells back to json bytes.
//!
//! One emitter drives three sinks — a truncating buffer, a per character
//! callback and a per chunk callback. Number conversion happens in a small
//! stack buffer, so printing stays allocation free.

use core::fmt::Write;

use crate::cell::{storage_flags, FJ_Num_Flags, FJ_Type};
use crate::value::{string_payload, FJ_Value};

trait FJ_Print_Sink {
    /// False aborts the print.
    fn put(&mut self, bytes: &[u8]) -> bool;
}

/// Copies what fits and silently drops the rest.
struct FJ_Buffer_sink<'a> {
    buffer: &'a mut [u8],
    written: usize,
}

impl<'a> FJ_Print_Sink for FJ_Buffer_sink<'a> {
    fn put(&mut self, bytes: &[u8]) -> bool {
        let space = self.buffer.len() - self.written;
        let copy = bytes.len().min(space);
        self.buffer[self.written..self.written + copy].copy_from_slice(&bytes[..copy]);
        self.written += copy;
        true
    }
}

struct FJ_Char_sink<F: FnMut(u8) -> bool> {
    callback: F,
}

impl<F: FnMut(u8) -> bool> FJ_Print_Sink for FJ_Char_sink<F> {
    fn put(&mut self, bytes: &[u8]) -> bool {
        for byte in bytes.iter() {
            if !(self.callback)(*byte) {
                return false;
            }
        }
        true
    }
}

struct FJ_Chunk_sink<F: FnMut(&[u8]) -> bool> {
    callback: F,
}

impl<F: FnMut(&[u8]) -> bool> FJ_Print_Sink for FJ_Chunk_sink<F> {
    fn put(&mut self, bytes: &[u8]) -> bool {
        (self.callback)(bytes)
    }
}

/// Stack formatter for numbers and the error line.
struct FJ_Fmt_buffer {
    raw: [u8; 96],
    len: usize,
}

impl FJ_Fmt_buffer {
    fn new() -> Self {
        FJ_Fmt_buffer { raw: [0; 96], len: 0 }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.raw[..self.len]
    }
}

impl Write for FJ_Fmt_buffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > self.raw.len() {
            return Err(core::fmt::Error);
        }
        self.raw[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Serializes `value` into `buffer`. A NUL terminator is always written and
/// output that does not fit is silently truncated. Returns the number of
/// bytes written including the terminator.
///
/// ```rust
/// use flat_json::{parse, sprint};
///
/// let mut buffer = [0u8; 128];
/// let (_, document) = parse(" [ 1 , \"two\" , null ] ", &mut buffer);
///
/// let mut out = [0u8; 128];
/// let written = sprint(document.root(), &mut out);
/// assert_eq!(br#"[1,"two",null]"#, &out[..written - 1]);
/// ```
pub fn sprint(value: FJ_Value, buffer: &mut [u8]) -> usize {
    if buffer.is_empty() {
        return 0;
    }
    let written = {
        let mut sink = FJ_Buffer_sink { buffer: &mut *buffer, written: 0 };
        print_value(&value, &mut sink);
        sink.written
    };
    let index = written.min(buffer.len() - 1);
    buffer[index] = 0;
    index + 1
}

/// Serializes `value` through a per character callback. The callback
/// returns `false` to abort; the function reports whether the whole value
/// was printed.
pub fn print_callback<F: FnMut(u8) -> bool>(value: FJ_Value, callback: F) -> bool {
    let mut sink = FJ_Char_sink { callback };
    print_value(&value, &mut sink)
}

/// Serializes `value` through a per chunk callback. The callback returns
/// `false` to abort; the function reports whether the whole value was
/// printed.
pub fn print_buffer_callback<F: FnMut(&[u8]) -> bool>(value: FJ_Value, callback: F) -> bool {
    let mut sink = FJ_Chunk_sink { callback };
    print_value(&value, &mut sink)
}

fn print_value<S: FJ_Print_Sink>(value: &FJ_Value, sink: &mut S) -> bool {
    match value.get_type() {
        FJ_Type::Null => sink.put(b"null"),
        FJ_Type::Bool => sink.put(if value.get_bool() { b"true" } else { b"false" }),
        FJ_Type::Number => print_number(value, sink),
        FJ_Type::String => print_string(string_payload(value.buffer(), value.addr as usize), sink),
        FJ_Type::Object => print_object(value, sink),
        FJ_Type::Array => print_array(value, sink),
        FJ_Type::Invalid => print_error(value, sink),
    }
}

fn print_object<S: FJ_Print_Sink>(value: &FJ_Value, sink: &mut S) -> bool {
    if !sink.put(b"{") {
        return false;
    }
    let mut first = true;
    for index in 0..value.object_size() {
        let member = value.object_get_member(index);
        if member.key().is_null() {
            continue;
        }
        if !first && !sink.put(b",") {
            return false;
        }
        first = false;
        if !print_value(&member.key(), sink) || !sink.put(b":") || !print_value(&member.value(), sink) {
            return false;
        }
    }
    sink.put(b"}")
}

fn print_array<S: FJ_Print_Sink>(value: &FJ_Value, sink: &mut S) -> bool {
    if !sink.put(b"[") {
        return false;
    }
    for index in 0..value.array_size() {
        if index > 0 && !sink.put(b",") {
            return false;
        }
        if !print_value(&value.array_get(index), sink) {
            return false;
        }
    }
    sink.put(b"]")
}

fn print_number<S: FJ_Print_Sink>(value: &FJ_Value, sink: &mut S) -> bool {
    let storage = storage_flags(value.word());
    let mut fmt = FJ_Fmt_buffer::new();
    if storage.intersects(FJ_Num_Flags::INT | FJ_Num_Flags::INT64) {
        let _ = write!(fmt, "{}", value.payload_u64() as i64);
    } else if storage.intersects(FJ_Num_Flags::UINT | FJ_Num_Flags::UINT64) {
        let _ = write!(fmt, "{}", value.payload_u64());
    } else {
        return print_double(f64::from_bits(value.payload_u64()), sink);
    }
    sink.put(fmt.as_bytes())
}

/// Fixed notation inside (1e-6, 1e9) — the shortest form carries no
/// trailing zeros or dot — and scientific notation outside. Non finite
/// values have no json spelling and print as null.
fn print_double<S: FJ_Print_Sink>(value: f64, sink: &mut S) -> bool {
    if !value.is_finite() {
        return sink.put(b"null");
    }
    let abs = if value < 0.0 { -value } else { value };
    let mut fmt = FJ_Fmt_buffer::new();
    if abs < 1.0e-6 || abs > 1.0e9 {
        let _ = write!(fmt, "{:e}", value);
    } else {
        let _ = write!(fmt, "{}", value);
        if !fmt.as_bytes().contains(&b'.') {
            // keep integral doubles re-parseable as doubles
            let _ = fmt.write_str(".0");
        }
    }
    sink.put(fmt.as_bytes())
}

fn print_string<S: FJ_Print_Sink>(content: &[u8], sink: &mut S) -> bool {
    if !sink.put(b"\"") {
        return false;
    }
    let mut run_start = 0;
    for index in 0..content.len() {
        let byte = content[index];
        let escaped: bool = byte == b'"' || byte == b'\\' || byte == b'/' || byte < 0x20;
        if !escaped {
            continue;
        }
        if run_start < index && !sink.put(&content[run_start..index]) {
            return false;
        }
        run_start = index + 1;
        let ok = match byte {
            b'"' => sink.put(b"\\\""),
            b'\\' => sink.put(b"\\\\"),
            b'/' => sink.put(b"\\/"),
            0x08 => sink.put(b"\\b"),
            0x09 => sink.put(b"\\t"),
            0x0a => sink.put(b"\\n"),
            0x0c => sink.put(b"\\f"),
            0x0d => sink.put(b"\\r"),
            control => {
                const HEX: &[u8; 16] = b"0123456789abcdef";
                let escape = [
                    b'\\',
                    b'u',
                    b'0',
                    b'0',
                    HEX[(control >> 4) as usize],
                    HEX[(control & 0xf) as usize],
                ];
                sink.put(&escape)
            }
        };
        if !ok {
            return false;
        }
    }
    if run_start < content.len() && !sink.put(&content[run_start..]) {
        return false;
    }
    sink.put(b"\"")
}

/// An error root still prints as machine readable json.
fn print_error<S: FJ_Print_Sink>(value: &FJ_Value, sink: &mut S) -> bool {
    let mut fmt = FJ_Fmt_buffer::new();
    let _ = write!(
        fmt,
        "{{\"error\":\"Unable to parse json message. Error ({}) at position {}\"}}",
        value.error_get_errno() as u32,
        value.error_get_json_pos()
    );
    sink.put(fmt.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, parse_opt, FJ_Parse_Opts};
    use crate::builder::FJ_Builder;
    use alloc::string::String;
    use alloc::vec::Vec;

    fn printed(json: &str) -> String {
        let mut buffer = [0u8; 1024];
        let (_, document) = parse(json, &mut buffer);
        let mut out = [0u8; 1024];
        let written = sprint(document.root(), &mut out);
        String::from_utf8(out[..written - 1].to_vec()).unwrap()
    }

    #[test]
    fn scalars_print_their_json_spelling() {
        assert_eq!("null", printed("null"));
        assert_eq!("true", printed("true"));
        assert_eq!("false", printed("false"));
        assert_eq!("42", printed("42"));
        assert_eq!("-42", printed("-42"));
        assert_eq!("18446744073709551615", printed("18446744073709551615"));
    }

    #[test]
    fn containers_print_compact() {
        assert_eq!("[1,2,3]", printed(" [ 1 , 2 , 3 ] "));
        assert_eq!("[]", printed("[]"));
        assert_eq!("{}", printed("{}"));
        // members come back in sorted order
        assert_eq!(r#"{"a":1,"bb":2}"#, printed(r#"{"bb":2,"a":1}"#));
    }

    #[test]
    fn doubles_use_fixed_notation_in_range() {
        assert_eq!("1.5", printed("1.5"));
        assert_eq!("0.25", printed("0.25"));
        // integral doubles keep their fraction so they re-parse as doubles
        assert_eq!("2.0", printed("2.0"));
        let text = printed("-63.999999999999943");
        assert!(!text.ends_with('.'));
        assert!(!text.contains("e"));
        // the printed form round trips to the identical double
        let mut buffer = [0u8; 64];
        let (_, document) = parse(&text, &mut buffer);
        assert_eq!(-63.999999999999943_f64, document.root().get_double());
    }

    #[test]
    fn doubles_use_scientific_notation_out_of_range() {
        let text = printed("1e20");
        assert!(text.contains('e'));
        let mut buffer = [0u8; 64];
        let (_, document) = parse(&text, &mut buffer);
        assert_eq!(1e20, document.root().get_double());

        let text = printed("2.5e-8");
        assert!(text.contains('e'));
    }

    #[test]
    fn non_finite_doubles_print_as_null() {
        let mut buffer = [0u8; 64];
        let mut builder = FJ_Builder::new(&mut buffer);
        let root = builder.root();
        builder.set_double(root, f64::NAN);
        let document = builder.document();
        let mut out = [0u8; 16];
        let written = sprint(document.root(), &mut out);
        assert_eq!(b"null", &out[..written - 1]);

        let mut builder = FJ_Builder::new(&mut buffer);
        let root = builder.root();
        builder.set_double(root, f64::INFINITY);
        let document = builder.document();
        let written = sprint(document.root(), &mut out);
        assert_eq!(b"null", &out[..written - 1]);
    }

    #[test]
    fn strings_re_escape_control_characters() {
        assert_eq!(
            r#""a\u0001\n\"q\\""#,
            printed(r#""a\u0001\n\"q\\""#)
        );
        assert_eq!(r#""\/""#, printed(r#""/""#));
        assert_eq!(r#""\u0000""#, printed(r#""\u0000""#));
    }

    #[test]
    fn multibyte_content_passes_through_raw() {
        assert_eq!("\"€𝄞\"", printed("\"€𝄞\""));
    }

    #[test]
    fn truncation_is_silent_and_terminated() {
        let mut buffer = [0u8; 256];
        let (_, document) = parse("[1,2,3,4,5,6,7,8,9]", &mut buffer);
        let mut out = [0u8; 8];
        let written = sprint(document.root(), &mut out);
        assert_eq!(8, written);
        assert_eq!(b"[1,2,3,", &out[..7]);
        assert_eq!(0, out[7]);

        let mut empty: [u8; 0] = [];
        assert_eq!(0, sprint(document.root(), &mut empty));
    }

    #[test]
    fn char_callback_sees_every_byte_and_can_abort() {
        let mut buffer = [0u8; 256];
        let (_, document) = parse("[10,20]", &mut buffer);

        let mut collected = Vec::new();
        assert!(print_callback(document.root(), |byte| {
            collected.push(byte);
            true
        }));
        assert_eq!(b"[10,20]".to_vec(), collected);

        let mut count = 0;
        assert!(!print_callback(document.root(), |_| {
            count += 1;
            count < 3
        }));
        assert_eq!(3, count);
    }

    #[test]
    fn chunk_callback_reassembles_the_output() {
        let mut buffer = [0u8; 256];
        let (_, document) = parse(r#"{"k":"value with spaces"}"#, &mut buffer);

        let mut collected = Vec::new();
        assert!(print_buffer_callback(document.root(), |chunk| {
            collected.extend_from_slice(chunk);
            true
        }));
        assert_eq!(br#"{"k":"value with spaces"}"#.to_vec(), collected);
    }

    #[test]
    fn error_roots_print_machine_readable_json() {
        let mut buffer = [0u8; 256];
        let (_, document) = parse_opt("[1,2,]", FJ_Parse_Opts::STRICT, &mut buffer);
        assert!(document.root().is_error());

        let mut out = [0u8; 128];
        let written = sprint(document.root(), &mut out);
        let text = core::str::from_utf8(&out[..written - 1]).unwrap();
        assert!(text.starts_with("{\"error\":"));
        assert!(text.contains("position 6"));

        // the report itself is parseable json
        let mut reparse = [0u8; 256];
        let (_, report) = parse(text, &mut reparse);
        assert!(report.root().is_object());
    }
}
