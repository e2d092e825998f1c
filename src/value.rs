//! The DOM document and its value accessors.
//!
//! A [`FJ_Document`] owns nothing but the buffer view (or, for the dynamic
//! parse mode, the vec backing it) plus the fatal error policy. Values are
//! copyable handles of document reference and cell address, so lookups can
//! be chained without intermediate `Option` plumbing; a missing member or
//! index simply yields a *not set* value that behaves like json null.

use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::cell::{
    compat_flags, internal_type, public_type, read_word, storage_flags, FJ_Internal_Type,
    FJ_Num_Flags, FJ_Type, CELL_BYTES, COUNT, MEMBER_BYTES, NOT_SET, OBJECT_SORTED_TYPE, PAYLOAD,
};
use crate::error::{FJ_Error_Code, FJ_Error_Policy};
use crate::memory::{read_u32, read_u64, write_u32};

enum FJ_Doc_Storage<'buf> {
    Borrowed(&'buf [u8]),
    Owned(Vec<u8>),
}

/// A parsed or built DOM. All values live inside the wrapped buffer; the
/// document is immutable and may be shared between threads once
/// construction finished.
pub struct FJ_Document<'buf> {
    storage: FJ_Doc_Storage<'buf>,
    policy: FJ_Error_Policy,
    root_set: bool,
}

impl<'buf> FJ_Document<'buf> {
    pub(crate) fn from_bytes(bytes: &'buf [u8], root_set: bool) -> Self {
        FJ_Document {
            storage: FJ_Doc_Storage::Borrowed(bytes),
            policy: FJ_Error_Policy::default(),
            root_set,
        }
    }

    pub(crate) fn from_vec(vec: Vec<u8>, root_set: bool) -> FJ_Document<'static> {
        FJ_Document {
            storage: FJ_Doc_Storage::Owned(vec),
            policy: FJ_Error_Policy::default(),
            root_set,
        }
    }

    #[inline(always)]
    pub(crate) fn bytes(&self) -> &[u8] {
        match &self.storage {
            FJ_Doc_Storage::Borrowed(bytes) => bytes,
            FJ_Doc_Storage::Owned(vec) => &vec[..],
        }
    }

    #[inline(always)]
    pub(crate) fn policy(&self) -> &FJ_Error_Policy {
        &self.policy
    }

    /// The root value. After a failed parse this is an error value; if the
    /// buffer could not even hold the error record it is the not set value.
    pub fn root(&self) -> FJ_Value<'_> {
        FJ_Value {
            doc: self,
            addr: if self.root_set { 0 } else { NOT_SET },
        }
    }

    /// Replaces the fatal error policy consulted on DOM access misuse.
    pub fn set_error_policy(&mut self, policy: FJ_Error_Policy) {
        self.policy = policy;
    }
}

/// One value inside a document. `Copy`, so handles can be passed around
/// freely; every accessor is safe to call on any value and reports misuse
/// through the document's error policy.
#[derive(Clone, Copy)]
pub struct FJ_Value<'doc> {
    pub(crate) doc: &'doc FJ_Document<'doc>,
    pub(crate) addr: u32,
}

impl<'doc> FJ_Value<'doc> {
    #[inline(always)]
    pub(crate) fn buffer(&self) -> &'doc [u8] {
        self.doc.bytes()
    }

    #[inline(always)]
    pub(crate) fn at(&self, addr: usize) -> FJ_Value<'doc> {
        FJ_Value { doc: self.doc, addr: addr as u32 }
    }

    fn not_set(&self) -> FJ_Value<'doc> {
        FJ_Value { doc: self.doc, addr: NOT_SET }
    }

    #[inline(always)]
    pub(crate) fn word(&self) -> u32 {
        if self.addr == NOT_SET {
            return crate::cell::NULL_TYPE;
        }
        read_word(self.buffer(), self.addr as usize)
    }

    #[inline(always)]
    pub(crate) fn internal(&self) -> FJ_Internal_Type {
        internal_type(self.word())
    }

    #[inline(always)]
    pub(crate) fn payload_u64(&self) -> u64 {
        if self.addr == NOT_SET {
            return 0;
        }
        read_u64(self.buffer(), self.addr as usize + PAYLOAD)
    }

    #[inline(always)]
    pub(crate) fn count(&self) -> u32 {
        if self.addr == NOT_SET {
            return 0;
        }
        read_u32(self.buffer(), self.addr as usize + COUNT)
    }

    fn fatal(&self) {
        self.doc.policy().fatal();
    }

    /// The JSON data type of this value. Not set values report null.
    pub fn get_type(&self) -> FJ_Type {
        public_type(self.word())
    }

    /// True when the value does not exist at all, e.g. a missing object
    /// member or an out of range array index.
    pub fn is_not_set(&self) -> bool {
        self.addr == NOT_SET
    }

    /// True for json null and for not set values.
    pub fn is_null(&self) -> bool {
        self.internal() == FJ_Internal_Type::Null
    }

    /// True when the value can be read as an object.
    pub fn is_object(&self) -> bool {
        self.get_type() == FJ_Type::Object
    }

    /// True when the value can be read as an array.
    pub fn is_array(&self) -> bool {
        self.get_type() == FJ_Type::Array
    }

    /// True when the value can be read as a string.
    pub fn is_string(&self) -> bool {
        self.get_type() == FJ_Type::String
    }

    /// True when the value can be read as a boolean.
    pub fn is_bool(&self) -> bool {
        self.get_type() == FJ_Type::Bool
    }

    /// True when the value holds a parse error instead of json content.
    pub fn is_error(&self) -> bool {
        self.internal() == FJ_Internal_Type::Error
    }

    fn is_number_compat(&self, flag: FJ_Num_Flags) -> bool {
        self.get_type() == FJ_Type::Number && compat_flags(self.word()).contains(flag)
    }

    /// True when the number is losslessly readable as `i32`.
    pub fn is_int(&self) -> bool {
        self.is_number_compat(FJ_Num_Flags::INT)
    }

    /// True when the number is losslessly readable as `i64`.
    pub fn is_int64(&self) -> bool {
        self.is_number_compat(FJ_Num_Flags::INT64)
    }

    /// True when the number is losslessly readable as `u32`.
    pub fn is_uint(&self) -> bool {
        self.is_number_compat(FJ_Num_Flags::UINT)
    }

    /// True when the number is losslessly readable as `u64`.
    pub fn is_uint64(&self) -> bool {
        self.is_number_compat(FJ_Num_Flags::UINT64)
    }

    /// True for every number; the double read is always available.
    pub fn is_double(&self) -> bool {
        self.get_type() == FJ_Type::Number
    }

    /// The boolean payload. Misuse reports through the error policy and
    /// returns `false`.
    pub fn get_bool(&self) -> bool {
        if !self.is_bool() {
            self.fatal();
            return false;
        }
        self.payload_u64() != 0
    }

    /// The value as `i32`. Misuse reports through the error policy and
    /// returns 0.
    pub fn get_int(&self) -> i32 {
        if !self.is_int() {
            self.fatal();
            return 0;
        }
        self.payload_u64() as i64 as i32
    }

    /// The value as `i64`. Misuse reports through the error policy and
    /// returns 0.
    pub fn get_int64(&self) -> i64 {
        if !self.is_int64() {
            self.fatal();
            return 0;
        }
        self.payload_u64() as i64
    }

    /// The value as `u32`. Misuse reports through the error policy and
    /// returns 0.
    pub fn get_uint(&self) -> u32 {
        if !self.is_uint() {
            self.fatal();
            return 0;
        }
        self.payload_u64() as u32
    }

    /// The value as `u64`. Misuse reports through the error policy and
    /// returns 0.
    pub fn get_uint64(&self) -> u64 {
        if !self.is_uint64() {
            self.fatal();
            return 0;
        }
        self.payload_u64()
    }

    /// The value as `f64`, converting from whichever storage type the
    /// number uses.
    pub fn get_double(&self) -> f64 {
        if !self.is_double() {
            self.fatal();
            return 0.0;
        }
        let word = self.word();
        let storage = storage_flags(word);
        if storage.intersects(FJ_Num_Flags::INT | FJ_Num_Flags::INT64) {
            self.payload_u64() as i64 as f64
        } else if storage.intersects(FJ_Num_Flags::UINT | FJ_Num_Flags::UINT64) {
            self.payload_u64() as f64
        } else {
            f64::from_bits(self.payload_u64())
        }
    }

    /// The string content. Because `\u0000` escapes are preserved the
    /// returned slice can contain embedded NUL bytes; its length is the
    /// decoded length, not the C string length.
    pub fn get_string(&self) -> &'doc str {
        if !self.is_string() {
            self.fatal();
            return "";
        }
        let payload = string_payload(self.buffer(), self.addr as usize);
        match core::str::from_utf8(payload) {
            Ok(text) => text,
            Err(_) => {
                // reachable only for insitu inputs that were not UTF-8
                self.fatal();
                ""
            }
        }
    }

    /// Decoded length of the string in bytes.
    pub fn get_string_length(&self) -> usize {
        if !self.is_string() {
            self.fatal();
            return 0;
        }
        string_payload(self.buffer(), self.addr as usize).len()
    }

    /// Orders the string content against `other` without allocating, using
    /// the same comparator as object keys: length first, then bytes.
    /// Misuse reports through the error policy and compares as the empty
    /// string.
    pub fn string_cmp(&self, other: &str) -> Ordering {
        if !self.is_string() {
            self.fatal();
            return 0usize.cmp(&other.len());
        }
        let content = string_payload(self.buffer(), self.addr as usize);
        let needle = other.as_bytes();
        content.len().cmp(&needle.len()).then_with(|| content.cmp(needle))
    }

    /// Compares the string content against `other` without allocating.
    pub fn string_equals(&self, other: &str) -> bool {
        if !self.is_string() {
            self.fatal();
            return false;
        }
        string_payload(self.buffer(), self.addr as usize) == other.as_bytes()
    }

    /// Number of members of an object.
    pub fn object_size(&self) -> usize {
        if !self.is_object() {
            self.fatal();
            return 0;
        }
        self.count() as usize
    }

    /// The member (key and value) at `index`. Objects are contiguous slot
    /// arrays, so random access is cheap.
    pub fn object_get_member(&self, index: usize) -> FJ_Member<'doc> {
        if !self.is_object() || index >= self.count() as usize {
            self.fatal();
            return FJ_Member { doc: self.doc, addr: NOT_SET };
        }
        let top = self.payload_u64() as usize;
        FJ_Member {
            doc: self.doc,
            addr: (top + index * MEMBER_BYTES) as u32,
        }
    }

    /// Looks up a member value by key: binary search on sorted objects,
    /// linear scan otherwise. Returns the not set value when the key is
    /// absent.
    pub fn object_get(&self, key: &str) -> FJ_Value<'doc> {
        self.object_get_raw(key.as_bytes())
    }

    pub(crate) fn object_get_raw(&self, needle: &[u8]) -> FJ_Value<'doc> {
        if !self.is_object() {
            self.fatal();
            return self.not_set();
        }
        let buffer = self.buffer();
        let top = self.payload_u64() as usize;
        let count = self.count() as usize;

        if self.internal() == FJ_Internal_Type::ObjectSorted {
            let mut low = 0usize;
            let mut high = count;
            while low < high {
                let mid = (low + high) / 2;
                match key_to_needle(buffer, top + mid * MEMBER_BYTES, needle) {
                    Ordering::Less => low = mid + 1,
                    Ordering::Greater => high = mid,
                    Ordering::Equal => {
                        return self.at(top + mid * MEMBER_BYTES + CELL_BYTES);
                    }
                }
            }
        } else {
            for index in 0..count {
                let key_addr = top + index * MEMBER_BYTES;
                if internal_type(read_word(buffer, key_addr)) != FJ_Internal_Type::Null
                    && key_to_needle(buffer, key_addr, needle) == Ordering::Equal
                {
                    return self.at(key_addr + CELL_BYTES);
                }
            }
        }
        self.not_set()
    }

    /// Number of elements of an array.
    pub fn array_size(&self) -> usize {
        if !self.is_array() {
            self.fatal();
            return 0;
        }
        self.count() as usize
    }

    /// The element at `index`. Arrays are contiguous cell runs, so random
    /// access is cheap.
    pub fn array_get(&self, index: usize) -> FJ_Value<'doc> {
        if !self.is_array() || index >= self.count() as usize {
            self.fatal();
            return self.not_set();
        }
        let top = self.payload_u64() as usize;
        self.at(top + index * CELL_BYTES)
    }

    /// The error code of an error value.
    pub fn error_get_errno(&self) -> FJ_Error_Code {
        if !self.is_error() {
            self.fatal();
            return FJ_Error_Code::FatalParserError;
        }
        let record = self.payload_u64() as usize;
        FJ_Error_Code::from_u32(read_u32(self.buffer(), record))
    }

    /// The byte offset inside the json message at which the parse failed.
    pub fn error_get_json_pos(&self) -> usize {
        if !self.is_error() {
            self.fatal();
            return 0;
        }
        let record = self.payload_u64() as usize;
        read_u32(self.buffer(), record + 4) as usize
    }
}

/// One object member: a key and a value in two adjacent cells.
#[derive(Clone, Copy)]
pub struct FJ_Member<'doc> {
    doc: &'doc FJ_Document<'doc>,
    addr: u32,
}

impl<'doc> FJ_Member<'doc> {
    /// The member's key (a string value, or null for unused builder slots).
    pub fn key(&self) -> FJ_Value<'doc> {
        FJ_Value { doc: self.doc, addr: self.addr }
    }

    /// The member's value.
    pub fn value(&self) -> FJ_Value<'doc> {
        if self.addr == NOT_SET {
            return FJ_Value { doc: self.doc, addr: NOT_SET };
        }
        FJ_Value { doc: self.doc, addr: self.addr + CELL_BYTES as u32 }
    }
}

/// Raw content bytes of a string cell, wherever its variant stores them.
pub(crate) fn string_payload<'a>(buffer: &'a [u8], addr: usize) -> &'a [u8] {
    match internal_type(read_word(buffer, addr)) {
        FJ_Internal_Type::StringInline => {
            let len = buffer[addr + PAYLOAD] as usize;
            &buffer[addr + PAYLOAD + 1..addr + PAYLOAD + 1 + len]
        }
        FJ_Internal_Type::StringRef => {
            let ptr = read_u64(buffer, addr + PAYLOAD) as usize as *const u8;
            let len = read_u32(buffer, addr + COUNT) as usize;
            // aliases caller owned bytes; the document lifetime is capped by
            // the aliased input, see parse_insitu and set_string_ref
            unsafe { core::slice::from_raw_parts(ptr, len) }
        }
        _ => {
            let offset = read_u32(buffer, addr + PAYLOAD) as usize;
            let len = read_u32(buffer, addr + COUNT) as usize;
            &buffer[offset..offset + len]
        }
    }
}

/// Key order: length first, then bytes. Shorter keys sort first and unequal
/// lengths are rejected without touching the content.
fn key_to_needle(buffer: &[u8], key_addr: usize, needle: &[u8]) -> Ordering {
    if internal_type(read_word(buffer, key_addr)) == FJ_Internal_Type::Null {
        // unused slots sort last
        return Ordering::Greater;
    }
    let key = string_payload(buffer, key_addr);
    key.len().cmp(&needle.len()).then_with(|| key.cmp(needle))
}

/// Order of two member slots under the key comparator.
pub(crate) fn key_compare(buffer: &[u8], lhs_addr: usize, rhs_addr: usize) -> Ordering {
    let lhs_null = internal_type(read_word(buffer, lhs_addr)) == FJ_Internal_Type::Null;
    let rhs_null = internal_type(read_word(buffer, rhs_addr)) == FJ_Internal_Type::Null;
    match (lhs_null, rhs_null) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let lhs = string_payload(buffer, lhs_addr);
            let rhs = string_payload(buffer, rhs_addr);
            lhs.len().cmp(&rhs.len()).then_with(|| lhs.cmp(rhs))
        }
    }
}

/// Sorts the member slots of the object cell at `addr` in place and tags it
/// sorted. Already sorted objects are left alone, so the operation is
/// idempotent.
pub(crate) fn optimize_object(buffer: &mut [u8], addr: usize) {
    let word = read_word(buffer, addr);
    if internal_type(word) != FJ_Internal_Type::Object {
        return;
    }
    let top = read_u32(buffer, addr + PAYLOAD) as usize;
    let count = read_u32(buffer, addr + COUNT) as usize;

    // insertion sort over the member slots; stable, in place and free of
    // allocations
    let mut i = 1;
    while i < count {
        let mut j = i;
        while j > 0
            && key_compare(buffer, top + (j - 1) * MEMBER_BYTES, top + j * MEMBER_BYTES)
                == Ordering::Greater
        {
            swap_members(buffer, top + (j - 1) * MEMBER_BYTES, top + j * MEMBER_BYTES);
            j -= 1;
        }
        i += 1;
    }
    write_u32(buffer, addr, OBJECT_SORTED_TYPE);
}

fn swap_members(buffer: &mut [u8], lhs: usize, rhs: usize) {
    let mut tmp = [0u8; MEMBER_BYTES];
    tmp.copy_from_slice(&buffer[lhs..lhs + MEMBER_BYTES]);
    buffer.copy_within(rhs..rhs + MEMBER_BYTES, lhs);
    buffer[rhs..rhs + MEMBER_BYTES].copy_from_slice(&tmp);
}

/// True when two members share a key. Sorted objects only need the
/// adjacent comparison.
pub(crate) fn object_has_duplicate(buffer: &[u8], addr: usize) -> bool {
    let word = read_word(buffer, addr);
    let top = read_u32(buffer, addr + PAYLOAD) as usize;
    let count = read_u32(buffer, addr + COUNT) as usize;

    if internal_type(word) == FJ_Internal_Type::ObjectSorted {
        for i in 1..count {
            let prev = top + (i - 1) * MEMBER_BYTES;
            if internal_type(read_word(buffer, prev)) != FJ_Internal_Type::Null
                && key_compare(buffer, prev, top + i * MEMBER_BYTES) == Ordering::Equal
            {
                return true;
            }
        }
    } else {
        for i in 0..count {
            let lhs = top + i * MEMBER_BYTES;
            if internal_type(read_word(buffer, lhs)) == FJ_Internal_Type::Null {
                continue;
            }
            for j in i + 1..count {
                if key_compare(buffer, lhs, top + j * MEMBER_BYTES) == Ordering::Equal {
                    return true;
                }
            }
        }
    }
    false
}
