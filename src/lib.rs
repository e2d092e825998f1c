#![warn(missing_docs)]
#![allow(non_camel_case_types)]
#![no_std]

//! ## Deterministic-Memory JSON
//! A JSON parser and serializer whose memory use is decided by you, not by it.
//!
//! [Crates.io](https://crates.io/crates/flat_json) | [Documentation](https://docs.rs/flat_json)
//!
//! ### Features
//! - Zero hidden allocations: you hand in a byte buffer, the parser places a
//!   complete, navigable DOM inside it
//! - Exact sizing up front: `calculate_max_buffer_size` bounds the buffer
//!   before anything is written
//! - Fixed 16 byte value cells: arrays index in O(1), objects are sorted for
//!   binary search key lookup
//! - *Insitu* mode that decodes strings in place and aliases them out of your
//!   input instead of copying
//! - `no_std` + `alloc`, the allocator is touched only by `parse_dynamic`
//! - Lenient by default (comments, trailing commas, leading `+`), strict mode
//!   for RFC compliant input
//!
//! JSON is parsed in two passes. The first pass validates the message and
//! measures it: how many value cells the DOM needs, how many bytes of string
//! copies, and how many children each object and array has. The second pass
//! writes the final cells low-to-high into the buffer while the measured
//! child counts are consumed out of a scratch region in the same buffer —
//! when the parse returns there is exactly one allocation in the whole
//! story, and it is the one you made yourself.
//!
//! # Quick Example
//! ```rust
//! use flat_json::{calculate_max_buffer_size, parse};
//!
//! let json = r#"{"id":1,"name":"blah","tags":["a","b"]}"#;
//!
//! // size the buffer before anything is written
//! let needed = calculate_max_buffer_size(json);
//! let mut buffer = vec![0u8; needed];
//!
//! let (written, document) = parse(json, &mut buffer);
//! assert!(written <= needed);
//!
//! let root = document.root();
//! assert_eq!(1, root.object_get("id").get_uint());
//! assert_eq!("blah", root.object_get("name").get_string());
//! assert_eq!("b", root.object_get("tags").array_get(1).get_string());
//! ```
//!
//! # Insitu Parsing
//! When the input buffer is writable, string values can stay where they are.
//! Escape sequences are decoded in place (the decoded form is never longer
//! than the escaped form) and the DOM references the input instead of
//! copying it, so the DOM buffer only has to hold the cells:
//! ```rust
//! use flat_json::{calculate_max_buffer_size_insitu, parse_insitu};
//!
//! let mut json = *br#"{"msg":"line one\nline two"}"#;
//! let mut buffer = [0u8; 64];
//! assert!(calculate_max_buffer_size_insitu(&json) <= buffer.len());
//!
//! let (_, document) = parse_insitu(&mut json, &mut buffer);
//! assert_eq!("line one\nline two", document.root().object_get("msg").get_string());
//! ```
//!
//! # Building Documents
//! The same buffer discipline works in the other direction:
//! ```rust
//! use flat_json::{sprint, FJ_Builder};
//!
//! let mut buffer = [0u8; 256];
//! let mut builder = FJ_Builder::new(&mut buffer);
//! let root = builder.root();
//! let mut object = builder.object_builder(2);
//! let id = builder.member_by_ref(&mut object, "id");
//! builder.set_uint(id, 1);
//! let ok = builder.member_by_ref(&mut object, "ok");
//! builder.set_bool(ok, true);
//! builder.set_object(root, &object);
//!
//! let document = builder.into_document();
//! let mut out = [0u8; 64];
//! let written = sprint(document.root(), &mut out);
//! assert_eq!(br#"{"id":1,"ok":true}"#, &out[..written - 1]);
//! ```
//!
//! # Error Handling
//! A parse always yields a usable root: either the document or an error
//! value carrying the error code and the byte offset of the failure. A DOM
//! is never half built.
//! ```rust
//! use flat_json::{parse, FJ_Error_Code};
//!
//! let mut buffer = [0u8; 64];
//! let (_, document) = parse("[1,2", &mut buffer);
//! let root = document.root();
//! assert!(root.is_error());
//! assert_eq!(FJ_Error_Code::JsonMessageTruncated, root.error_get_errno());
//! assert_eq!(4, root.error_get_json_pos());
//! ```

#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

mod builder;
mod cell;
mod error;
mod memory;
mod parse;
mod print;
mod scanner;
mod util;
mod value;

pub use crate::builder::{FJ_Array_builder, FJ_Builder, FJ_Object_builder, FJ_Slot};
pub use crate::cell::{FJ_Num_Flags, FJ_Type, CELL_BYTES, ERROR_RECORD_BYTES, INLINE_STRING_CAP};
pub use crate::error::{FJ_Error_Code, FJ_Error_Policy};
pub use crate::parse::{
    calculate_max_buffer_size, calculate_max_buffer_size_insitu, parse, parse_dynamic,
    parse_insitu, parse_opt, parse_opt_dynamic, parse_opt_insitu, FJ_Parse_Opts,
};
pub use crate::print::{print_buffer_callback, print_callback, sprint};
pub use crate::util::{copy, equals, value_sizeof};
pub use crate::value::{FJ_Document, FJ_Member, FJ_Value};
