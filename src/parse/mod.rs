//! The parse surface: buffer sizing, the two pass driver and the public
//! entry points.
//!
//! Parsing never allocates behind the caller's back. The first pass scans
//! the message, validates the grammar and computes how many bytes the DOM
//! needs; the second pass emits the finished cells into the buffer. The
//! dynamic entry points run the same machinery over a growable vec for
//! callers that do not want to size buffers themselves.

pub(crate) mod first_pass;
pub(crate) mod second_pass;

use alloc::vec::Vec;
use bitflags::bitflags;

use crate::cell::{self, CELL_BYTES, ERROR_RECORD_BYTES};
use crate::error::FJ_Error_Code;
use crate::memory::FJ_Buffer;
use crate::parse::first_pass::FJ_First_pass;
use crate::parse::second_pass::FJ_Second_pass;
use crate::scanner::{FJ_Input, FJ_Json_message};
use crate::value::FJ_Document;

bitflags! {
    /// Options accepted by the `parse_opt` family.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FJ_Parse_Opts: u32 {
        /// String cells alias the writable input instead of being copied.
        /// Selected by the insitu entry points, not by callers.
        const INSITU = 1;
        /// Rejects comments, leading `+`, leading zeros on integers,
        /// trailing commas and content after the root value.
        const STRICT = 2;
        /// Leaves object members in insertion order; key lookup degrades
        /// to a linear scan.
        const DONT_SORT_OBJECT_MEMBERS = 4;
        /// Fails with [`FJ_Error_Code::DuplicateKey`] when an object
        /// declares the same key twice.
        const DENY_DUPLICATE_KEYS = 8;
    }
}

/// Upper bound on the buffer bytes a full copy [`parse`] of `json` writes.
///
/// ```rust
/// use flat_json::calculate_max_buffer_size;
///
/// // object cell + one member slot (key and value cell)
/// assert_eq!(48, calculate_max_buffer_size(r#"{"id":1}"#));
/// ```
pub fn calculate_max_buffer_size(json: &str) -> usize {
    calculate_generic(FJ_Input::Borrowed(json.as_bytes()), FJ_Parse_Opts::empty())
}

/// Upper bound on the buffer bytes [`parse_insitu`] writes. String content
/// stays inside the input, so only the cells are accounted for.
pub fn calculate_max_buffer_size_insitu(json: &[u8]) -> usize {
    calculate_generic(FJ_Input::Borrowed(json), FJ_Parse_Opts::INSITU)
}

fn calculate_generic(input: FJ_Input, opts: FJ_Parse_Opts) -> usize {
    let mut msg = FJ_Json_message::new(input);
    let mut parser = FJ_First_pass::new(opts);
    parser.parse(&mut msg, None);
    parser.required_buffer_size()
}

/// Parses `json` into `buffer` and returns the written byte count together
/// with the document. The root is an error value when the parse failed, or
/// the not set value when the buffer cannot even hold the error record.
///
/// ```rust
/// use flat_json::parse;
///
/// let mut buffer = [0u8; 128];
/// let (_, document) = parse(r#"{"id":1,"name":"blah"}"#, &mut buffer);
/// let root = document.root();
/// assert!(root.is_object());
/// assert_eq!(1, root.object_get("id").get_uint());
/// assert_eq!("blah", root.object_get("name").get_string());
/// ```
pub fn parse<'buf>(json: &str, buffer: &'buf mut [u8]) -> (usize, FJ_Document<'buf>) {
    parse_opt(json, FJ_Parse_Opts::empty(), buffer)
}

/// [`parse`] with options.
pub fn parse_opt<'buf>(
    json: &str,
    opts: FJ_Parse_Opts,
    buffer: &'buf mut [u8],
) -> (usize, FJ_Document<'buf>) {
    parse_fixed(
        FJ_Input::Borrowed(json.as_bytes()),
        opts.difference(FJ_Parse_Opts::INSITU),
        buffer,
    )
}

/// Parses with string aliasing: string cells reference the decoded bytes
/// inside `json` instead of copying them, so the buffer only has to hold
/// the cells. Escape sequences are rewritten in place, which is why the
/// input must be writable; the document borrows both slices.
///
/// ```rust
/// use flat_json::parse_insitu;
///
/// let mut json = *br#"{"name":"blahblubbhubbeldipup"}"#;
/// let mut buffer = [0u8; 48];
/// let (_, document) = parse_insitu(&mut json, &mut buffer);
/// assert_eq!("blahblubbhubbeldipup", document.root().object_get("name").get_string());
/// ```
pub fn parse_insitu<'buf>(
    json: &'buf mut [u8],
    buffer: &'buf mut [u8],
) -> (usize, FJ_Document<'buf>) {
    parse_opt_insitu(json, FJ_Parse_Opts::empty(), buffer)
}

/// [`parse_insitu`] with options.
pub fn parse_opt_insitu<'buf>(
    json: &'buf mut [u8],
    opts: FJ_Parse_Opts,
    buffer: &'buf mut [u8],
) -> (usize, FJ_Document<'buf>) {
    parse_fixed(FJ_Input::Insitu(json), opts | FJ_Parse_Opts::INSITU, buffer)
}

/// Parses into storage the document owns, growing it until it suffices.
/// The only entry point that allocates.
pub fn parse_dynamic(json: &str) -> FJ_Document<'static> {
    parse_opt_dynamic(json, FJ_Parse_Opts::empty())
}

/// [`parse_dynamic`] with options.
pub fn parse_opt_dynamic(json: &str, opts: FJ_Parse_Opts) -> FJ_Document<'static> {
    let mut vec = Vec::new();
    if vec.try_reserve(CELL_BYTES + ERROR_RECORD_BYTES).is_err() {
        return FJ_Document::from_vec(vec, false);
    }
    vec.resize(CELL_BYTES + ERROR_RECORD_BYTES, 0);

    let mut storage = FJ_Buffer::Growable { vec };
    let (_, root_set) = parse_generic(
        FJ_Input::Borrowed(json.as_bytes()),
        opts.difference(FJ_Parse_Opts::INSITU),
        &mut storage,
    );
    let vec = match storage {
        FJ_Buffer::Growable { vec } => vec,
        FJ_Buffer::Fixed { .. } => Vec::new(),
    };
    FJ_Document::from_vec(vec, root_set)
}

fn parse_fixed<'buf>(
    input: FJ_Input,
    opts: FJ_Parse_Opts,
    buffer: &'buf mut [u8],
) -> (usize, FJ_Document<'buf>) {
    let mut storage = FJ_Buffer::Fixed { bytes: buffer };
    let (written, root_set) = parse_generic(input, opts, &mut storage);
    let bytes: &'buf mut [u8] = match storage {
        FJ_Buffer::Fixed { bytes } => bytes,
        FJ_Buffer::Growable { .. } => &mut [],
    };
    (written, FJ_Document::from_bytes(bytes, root_set))
}

fn parse_generic(input: FJ_Input, opts: FJ_Parse_Opts, storage: &mut FJ_Buffer) -> (usize, bool) {
    let mut msg = FJ_Json_message::new(input);
    let mut parser = FJ_First_pass::new(opts);
    parser.parse(&mut msg, Some(storage));

    if opts.contains(FJ_Parse_Opts::STRICT) && parser.err.is_none() {
        // be graceful about trailing whitespace, reject everything else
        msg.skip_whitespaces();
        if msg.has_more() && msg.byte() != 0 {
            parser.set_error(&mut msg, FJ_Error_Code::UnexpectedJsonAppendix);
        }
    }
    let err_pos = msg.pos;
    msg.end = msg.pos;

    if parser.err.is_some() {
        return error_document(storage, parser.err, err_pos);
    }

    let required = parser.required_buffer_size();
    if let Err(code) = storage.ensure(required) {
        parser.err = Some(code);
        return error_document(storage, parser.err, err_pos);
    }

    let mut second = FJ_Second_pass::new(&parser, opts, storage.bytes_mut());
    let written = second.process(storage.bytes_mut(), &mut msg);

    if second.err.is_some() {
        return error_document(storage, second.err, msg.pos);
    }
    (written, true)
}

/// Rewrites the buffer to hold only the error root and its record. When not
/// even those fit, the parse reports a not set root instead.
fn error_document(
    storage: &mut FJ_Buffer,
    err: Option<FJ_Error_Code>,
    json_pos: usize,
) -> (usize, bool) {
    let required = CELL_BYTES + ERROR_RECORD_BYTES;
    if storage.len() < required && storage.ensure(required).is_err() {
        return (0, false);
    }
    let code = err.unwrap_or(FJ_Error_Code::FatalParserError);
    cell::set_error(storage.bytes_mut(), 0, code as u32, json_pos as u32);
    (required, true)
}
