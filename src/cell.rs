//! Fixed size DOM cell layout and type tagging.
//!
//! Every DOM node occupies exactly one [`CELL_BYTES`] sized cell inside the
//! caller's buffer: a 32 bit type word, 8 payload bytes and a 32 bit
//! count/length field. Arrays and objects are therefore contiguous runs of
//! cells, which is what makes index access O(1) and key lookup a binary
//! search.
//!
//! The type word packs four orthogonal fields into distinct byte lanes:
//!
//! ```text
//! byte 0: public type         (null, object, array, string, number, bool, invalid)
//! byte 1: internal type       (storage variant refinement)
//! byte 2: compatibility mask  (which typed reads are lossless)
//! byte 3: storage type        (the single kind used to decode the payload)
//! ```

use bitflags::bitflags;
use static_assertions::const_assert_eq;

use crate::memory::{read_u32, write_u32, write_u64};

/// Number of bytes every DOM cell occupies.
pub const CELL_BYTES: usize = 16;

/// Byte offsets of the payload and the count/length field inside a cell.
pub(crate) const PAYLOAD: usize = 4;
pub(crate) const COUNT: usize = 12;

/// Longest string that can be stored inline inside a single cell
/// (payload minus the length byte and the terminator).
pub const INLINE_STRING_CAP: usize = CELL_BYTES - 4 - 2;

/// Bytes of one object member slot (key cell followed by value cell).
pub(crate) const MEMBER_BYTES: usize = 2 * CELL_BYTES;

/// Bytes of the error record stored behind an error root cell
/// (error code plus byte offset).
pub const ERROR_RECORD_BYTES: usize = 8;

/// Cell address used for values that are not present at all.
pub(crate) const NOT_SET: u32 = u32::MAX;

const_assert_eq!(CELL_BYTES, 16);
const_assert_eq!(INLINE_STRING_CAP, 10);

/// The JSON data type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FJ_Type {
    /// json null (also reported for values that are not set)
    Null = 0,
    /// json object
    Object = 1,
    /// json array
    Array = 2,
    /// json string
    String = 3,
    /// doubles, signed and unsigned integers
    Number = 4,
    /// json boolean
    Bool = 5,
    /// not a json type (parse errors)
    Invalid = 6,
}

impl From<u8> for FJ_Type {
    fn from(value: u8) -> Self {
        match value {
            0 => FJ_Type::Null,
            1 => FJ_Type::Object,
            2 => FJ_Type::Array,
            3 => FJ_Type::String,
            4 => FJ_Type::Number,
            5 => FJ_Type::Bool,
            _ => FJ_Type::Invalid,
        }
    }
}

/// Refinement of the public type that selects the payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FJ_Internal_Type {
    Null = 0,
    Unspecified = 1,
    Object = 2,
    ObjectSorted = 3,
    Array = 4,
    /// string copied into the arena (offset + length)
    String = 5,
    /// string referencing bytes owned by the caller (pointer + length)
    StringRef = 6,
    /// string stored inside the cell payload
    StringInline = 7,
    Primitive = 8,
    Error = 9,
}

impl From<u8> for FJ_Internal_Type {
    fn from(value: u8) -> Self {
        match value {
            0 => FJ_Internal_Type::Null,
            2 => FJ_Internal_Type::Object,
            3 => FJ_Internal_Type::ObjectSorted,
            4 => FJ_Internal_Type::Array,
            5 => FJ_Internal_Type::String,
            6 => FJ_Internal_Type::StringRef,
            7 => FJ_Internal_Type::StringInline,
            8 => FJ_Internal_Type::Primitive,
            9 => FJ_Internal_Type::Error,
            _ => FJ_Internal_Type::Unspecified,
        }
    }
}

bitflags! {
    /// Bitset over the numeric storage kinds. A number cell carries one of
    /// these as its storage type and a superset of it as its compatibility
    /// mask, flagging every typed read that is lossless for the stored
    /// value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FJ_Num_Flags: u8 {
        /// boolean payload
        const BOOL = 1 << 0;
        /// `i32` readable
        const INT = 1 << 1;
        /// `i64` readable
        const INT64 = 1 << 2;
        /// `u32` readable
        const UINT = 1 << 3;
        /// `u64` readable
        const UINT64 = 1 << 4;
        /// `f64` readable
        const DOUBLE = 1 << 5;
    }
}

const fn type_word(public: FJ_Type, internal: FJ_Internal_Type, compat: u8, storage: u8) -> u32 {
    (public as u32) | (internal as u32) << 8 | (compat as u32) << 16 | (storage as u32) << 24
}

pub(crate) const NULL_TYPE: u32 = type_word(FJ_Type::Null, FJ_Internal_Type::Null, 0, 0);
pub(crate) const OBJECT_TYPE: u32 = type_word(FJ_Type::Object, FJ_Internal_Type::Object, 0, 0);
pub(crate) const OBJECT_SORTED_TYPE: u32 =
    type_word(FJ_Type::Object, FJ_Internal_Type::ObjectSorted, 0, 0);
pub(crate) const ARRAY_TYPE: u32 = type_word(FJ_Type::Array, FJ_Internal_Type::Array, 0, 0);
pub(crate) const STRING_TYPE: u32 = type_word(FJ_Type::String, FJ_Internal_Type::String, 0, 0);
pub(crate) const STRING_REF_TYPE: u32 =
    type_word(FJ_Type::String, FJ_Internal_Type::StringRef, 0, 0);
pub(crate) const STRING_INLINE_TYPE: u32 =
    type_word(FJ_Type::String, FJ_Internal_Type::StringInline, 0, 0);
pub(crate) const ERROR_TYPE: u32 = type_word(FJ_Type::Invalid, FJ_Internal_Type::Error, 0, 0);

pub(crate) const BOOL_TYPE: u32 = type_word(
    FJ_Type::Bool,
    FJ_Internal_Type::Primitive,
    FJ_Num_Flags::BOOL.bits(),
    FJ_Num_Flags::BOOL.bits(),
);
pub(crate) const DOUBLE_TYPE: u32 = type_word(
    FJ_Type::Number,
    FJ_Internal_Type::Primitive,
    FJ_Num_Flags::DOUBLE.bits(),
    FJ_Num_Flags::DOUBLE.bits(),
);
pub(crate) const UINT32_TYPE: u32 = type_word(
    FJ_Type::Number,
    FJ_Internal_Type::Primitive,
    FJ_Num_Flags::UINT64.bits()
        | FJ_Num_Flags::UINT.bits()
        | FJ_Num_Flags::INT64.bits()
        | FJ_Num_Flags::DOUBLE.bits(),
    FJ_Num_Flags::UINT.bits(),
);
pub(crate) const UINT32_INT32_COMPAT_TYPE: u32 =
    UINT32_TYPE | (FJ_Num_Flags::INT.bits() as u32) << 16;
pub(crate) const UINT64_TYPE: u32 = type_word(
    FJ_Type::Number,
    FJ_Internal_Type::Primitive,
    FJ_Num_Flags::UINT64.bits() | FJ_Num_Flags::DOUBLE.bits(),
    FJ_Num_Flags::UINT64.bits(),
);
pub(crate) const UINT64_INT64_COMPAT_TYPE: u32 =
    UINT64_TYPE | (FJ_Num_Flags::INT64.bits() as u32) << 16;
pub(crate) const INT32_TYPE: u32 = type_word(
    FJ_Type::Number,
    FJ_Internal_Type::Primitive,
    FJ_Num_Flags::INT.bits() | FJ_Num_Flags::INT64.bits() | FJ_Num_Flags::DOUBLE.bits(),
    FJ_Num_Flags::INT.bits(),
);
pub(crate) const INT64_TYPE: u32 = type_word(
    FJ_Type::Number,
    FJ_Internal_Type::Primitive,
    FJ_Num_Flags::INT64.bits() | FJ_Num_Flags::DOUBLE.bits(),
    FJ_Num_Flags::INT64.bits(),
);

#[inline(always)]
pub(crate) fn public_type(word: u32) -> FJ_Type {
    FJ_Type::from(word as u8)
}

#[inline(always)]
pub(crate) fn internal_type(word: u32) -> FJ_Internal_Type {
    FJ_Internal_Type::from((word >> 8) as u8)
}

#[inline(always)]
pub(crate) fn compat_flags(word: u32) -> FJ_Num_Flags {
    FJ_Num_Flags::from_bits_truncate((word >> 16) as u8)
}

#[inline(always)]
pub(crate) fn storage_flags(word: u32) -> FJ_Num_Flags {
    FJ_Num_Flags::from_bits_truncate((word >> 24) as u8)
}

#[inline(always)]
pub(crate) fn read_word(buffer: &[u8], addr: usize) -> u32 {
    read_u32(buffer, addr)
}

/* cell write helpers, shared by the second pass and the builder */

pub(crate) fn set_null(buffer: &mut [u8], addr: usize) {
    write_u32(buffer, addr, NULL_TYPE);
    write_u64(buffer, addr + PAYLOAD, 0);
    write_u32(buffer, addr + COUNT, 0);
}

pub(crate) fn set_bool(buffer: &mut [u8], addr: usize, value: bool) {
    write_u32(buffer, addr, BOOL_TYPE);
    write_u64(buffer, addr + PAYLOAD, value as u64);
    write_u32(buffer, addr + COUNT, 0);
}

pub(crate) fn set_int64(buffer: &mut [u8], addr: usize, value: i64) {
    if value >= 0 {
        set_uint64(buffer, addr, value as u64);
        return;
    }
    let word = if value < i32::MIN as i64 { INT64_TYPE } else { INT32_TYPE };
    write_u32(buffer, addr, word);
    write_u64(buffer, addr + PAYLOAD, value as u64);
    write_u32(buffer, addr + COUNT, 0);
}

pub(crate) fn set_uint64(buffer: &mut [u8], addr: usize, value: u64) {
    let word = if value <= u32::MAX as u64 {
        if value <= i32::MAX as u64 { UINT32_INT32_COMPAT_TYPE } else { UINT32_TYPE }
    } else if value <= i64::MAX as u64 {
        UINT64_INT64_COMPAT_TYPE
    } else {
        UINT64_TYPE
    };
    write_u32(buffer, addr, word);
    write_u64(buffer, addr + PAYLOAD, value);
    write_u32(buffer, addr + COUNT, 0);
}

pub(crate) fn set_double(buffer: &mut [u8], addr: usize, value: f64) {
    write_u32(buffer, addr, DOUBLE_TYPE);
    write_u64(buffer, addr + PAYLOAD, value.to_bits());
    write_u32(buffer, addr + COUNT, 0);
}

/// Writes a container cell (array or object member area) at `addr`.
pub(crate) fn set_container(buffer: &mut [u8], addr: usize, word: u32, top: u32, count: u32) {
    write_u32(buffer, addr, word);
    write_u64(buffer, addr + PAYLOAD, top as u64);
    write_u32(buffer, addr + COUNT, count);
}

/// Writes an arena string cell: `offset` points at the NUL terminated copy.
pub(crate) fn set_string_arena(buffer: &mut [u8], addr: usize, offset: u32, len: u32) {
    write_u32(buffer, addr, STRING_TYPE);
    write_u64(buffer, addr + PAYLOAD, offset as u64);
    write_u32(buffer, addr + COUNT, len);
}

/// Writes a reference string cell aliasing caller owned bytes.
pub(crate) fn set_string_ref(buffer: &mut [u8], addr: usize, ptr: *const u8, len: u32) {
    write_u32(buffer, addr, STRING_REF_TYPE);
    write_u64(buffer, addr + PAYLOAD, ptr as usize as u64);
    write_u32(buffer, addr + COUNT, len);
}

/// Writes an inline string cell. `content.len()` must not exceed
/// [`INLINE_STRING_CAP`].
pub(crate) fn set_string_inline(buffer: &mut [u8], addr: usize, content: &[u8]) {
    write_u32(buffer, addr, STRING_INLINE_TYPE);
    write_u64(buffer, addr + PAYLOAD, 0);
    write_u32(buffer, addr + COUNT, 0);
    buffer[addr + PAYLOAD] = content.len() as u8;
    buffer[addr + PAYLOAD + 1..addr + PAYLOAD + 1 + content.len()].copy_from_slice(content);
    buffer[addr + PAYLOAD + 1 + content.len()] = 0;
}

/// Writes the error root cell plus its record directly behind it.
pub(crate) fn set_error(buffer: &mut [u8], addr: usize, code: u32, json_pos: u32) {
    let record = addr + CELL_BYTES;
    write_u32(buffer, addr, ERROR_TYPE);
    write_u64(buffer, addr + PAYLOAD, record as u64);
    write_u32(buffer, addr + COUNT, 0);
    write_u32(buffer, record, code);
    write_u32(buffer, record + 4, json_pos);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compat(word: u32) -> FJ_Num_Flags {
        compat_flags(word)
    }

    #[test]
    fn type_word_lanes_are_disjoint() {
        assert_eq!(FJ_Type::Number, public_type(UINT32_TYPE));
        assert_eq!(FJ_Internal_Type::Primitive, internal_type(UINT32_TYPE));
        assert_eq!(FJ_Type::Object, public_type(OBJECT_SORTED_TYPE));
        assert_eq!(FJ_Internal_Type::ObjectSorted, internal_type(OBJECT_SORTED_TYPE));
        assert_eq!(FJ_Type::String, public_type(STRING_INLINE_TYPE));
        assert_eq!(FJ_Type::Invalid, public_type(ERROR_TYPE));
    }

    #[test]
    fn compatibility_mask_is_a_superset_of_the_storage_type() {
        for word in [
            BOOL_TYPE,
            DOUBLE_TYPE,
            UINT32_TYPE,
            UINT32_INT32_COMPAT_TYPE,
            UINT64_TYPE,
            UINT64_INT64_COMPAT_TYPE,
            INT32_TYPE,
            INT64_TYPE,
        ]
        .iter()
        {
            assert!(compat(*word).contains(storage_flags(*word)));
        }
    }

    #[test]
    fn structural_cells_leave_the_upper_lanes_zero() {
        for word in [NULL_TYPE, OBJECT_TYPE, ARRAY_TYPE, STRING_TYPE, STRING_REF_TYPE, STRING_INLINE_TYPE, ERROR_TYPE].iter() {
            assert!(compat(*word).is_empty());
            assert!(storage_flags(*word).is_empty());
        }
    }

    #[test]
    fn uint_lattice_matches_the_value_ranges() {
        let mut buffer = [0u8; CELL_BYTES];

        set_uint64(&mut buffer, 0, 42);
        let word = read_word(&buffer, 0);
        assert_eq!(FJ_Num_Flags::UINT, storage_flags(word));
        assert!(compat(word).contains(FJ_Num_Flags::INT));

        set_uint64(&mut buffer, 0, u32::MAX as u64);
        let word = read_word(&buffer, 0);
        assert_eq!(FJ_Num_Flags::UINT, storage_flags(word));
        assert!(!compat(word).contains(FJ_Num_Flags::INT));
        assert!(compat(word).contains(FJ_Num_Flags::INT64));

        set_uint64(&mut buffer, 0, i64::MAX as u64);
        let word = read_word(&buffer, 0);
        assert_eq!(FJ_Num_Flags::UINT64, storage_flags(word));
        assert!(compat(word).contains(FJ_Num_Flags::INT64));

        set_uint64(&mut buffer, 0, u64::MAX);
        let word = read_word(&buffer, 0);
        assert_eq!(FJ_Num_Flags::UINT64 | FJ_Num_Flags::DOUBLE, compat(word));
    }

    #[test]
    fn int_lattice_matches_the_value_ranges() {
        let mut buffer = [0u8; CELL_BYTES];

        // non-negative values take the unsigned route
        set_int64(&mut buffer, 0, 7);
        assert_eq!(FJ_Num_Flags::UINT, storage_flags(read_word(&buffer, 0)));

        set_int64(&mut buffer, 0, -7);
        let word = read_word(&buffer, 0);
        assert_eq!(FJ_Num_Flags::INT, storage_flags(word));
        assert_eq!(
            FJ_Num_Flags::INT | FJ_Num_Flags::INT64 | FJ_Num_Flags::DOUBLE,
            compat(word)
        );

        set_int64(&mut buffer, 0, i32::MIN as i64 - 1);
        let word = read_word(&buffer, 0);
        assert_eq!(FJ_Num_Flags::INT64, storage_flags(word));
        assert_eq!(FJ_Num_Flags::INT64 | FJ_Num_Flags::DOUBLE, compat(word));
    }

    #[test]
    fn inline_string_preserves_length_and_terminator() {
        let mut buffer = [0xffu8; CELL_BYTES];
        set_string_inline(&mut buffer, 0, b"hi\0ho");
        assert_eq!(5, buffer[PAYLOAD] as usize);
        assert_eq!(b"hi\0ho", &buffer[PAYLOAD + 1..PAYLOAD + 6]);
        assert_eq!(0, buffer[PAYLOAD + 6]);
    }
}
