//! Programmatic DOM construction into a caller supplied buffer.
//!
//! The builder hands out [`FJ_Slot`] addresses instead of references, so
//! the whole DOM can be assembled through one `&mut` borrow: cells are
//! reserved from the low end of the buffer, string copies from the high
//! end, and the two cursors may never cross.
//!
//! ```rust
//! use flat_json::FJ_Builder;
//!
//! let mut buffer = [0u8; 256];
//! let mut builder = FJ_Builder::new(&mut buffer);
//!
//! let root = builder.root();
//! let mut object = builder.object_builder(2);
//! let id = builder.member_by_ref(&mut object, "id");
//! builder.set_uint(id, 1);
//! let name = builder.member_by_ref(&mut object, "name");
//! builder.set_string_copy(name, "blah");
//! builder.set_object(root, &object);
//!
//! let document = builder.into_document();
//! assert_eq!(1, document.root().object_get("id").get_uint());
//! assert_eq!("blah", document.root().object_get("name").get_string());
//! ```

use crate::cell::{
    self, CELL_BYTES, INLINE_STRING_CAP, MEMBER_BYTES, NOT_SET,
};
use crate::error::FJ_Error_Policy;
use crate::value::{optimize_object, FJ_Document};

/// Address of one writable cell inside a builder's buffer.
#[derive(Debug, Clone, Copy)]
pub struct FJ_Slot(pub(crate) u32);

/// Reserves elements of an array ahead of time and hands them out one by
/// one. Finished with [`FJ_Builder::set_array`].
pub struct FJ_Array_builder {
    top: u32,
    index: u32,
    capacity: u32,
    policy: FJ_Error_Policy,
}

impl FJ_Array_builder {
    /// The slot for the next element. Exhausting the capacity reports
    /// through the error policy and returns a dead slot.
    pub fn next(&mut self) -> FJ_Slot {
        if self.index >= self.capacity {
            self.policy.fatal();
            return FJ_Slot(NOT_SET);
        }
        let slot = FJ_Slot(self.top + self.index * CELL_BYTES as u32);
        self.index += 1;
        slot
    }
}

/// Reserves the member slots of an object ahead of time. Keys are written
/// through [`FJ_Builder::member_by_ref`] / [`FJ_Builder::member_by_copy`];
/// finished with [`FJ_Builder::set_object`].
pub struct FJ_Object_builder {
    top: u32,
    index: u32,
    capacity: u32,
}

/// Builds a DOM inside a caller buffer. No hidden allocations; running out
/// of buffer reports through the error policy.
pub struct FJ_Builder<'buf> {
    buffer: &'buf mut [u8],
    obj_pos: usize,
    str_pos: usize,
    policy: FJ_Error_Policy,
}

impl<'buf> FJ_Builder<'buf> {
    /// Wraps `buffer`. The first cell is the document root.
    pub fn new(buffer: &'buf mut [u8]) -> Self {
        let str_pos = buffer.len();
        let mut builder = FJ_Builder {
            buffer,
            obj_pos: CELL_BYTES,
            str_pos,
            policy: FJ_Error_Policy::default(),
        };
        builder.reset();
        builder
    }

    /// Forgets everything built so far and starts over.
    pub fn reset(&mut self) {
        // cells grow from the front (starting with the root), strings from
        // the end towards the front
        self.obj_pos = CELL_BYTES.min(self.buffer.len());
        self.str_pos = self.buffer.len();
        if self.cell_fits(0) {
            cell::set_null(self.buffer, 0);
        }
    }

    /// Replaces the error policy used for capacity and misuse faults. The
    /// document handed out later starts with the same policy.
    pub fn set_error_policy(&mut self, policy: FJ_Error_Policy) {
        self.policy = policy;
    }

    /// The root slot.
    pub fn root(&self) -> FJ_Slot {
        FJ_Slot(0)
    }

    fn cell_fits(&self, addr: usize) -> bool {
        addr.checked_add(CELL_BYTES).map_or(false, |end| end <= self.buffer.len())
    }

    fn checked(&self, slot: FJ_Slot) -> Option<usize> {
        let addr = slot.0 as usize;
        if slot.0 == NOT_SET || !self.cell_fits(addr) {
            self.policy.fatal();
            return None;
        }
        Some(addr)
    }

    /// Sets the slot to json null.
    pub fn set_null(&mut self, slot: FJ_Slot) {
        if let Some(addr) = self.checked(slot) {
            cell::set_null(self.buffer, addr);
        }
    }

    /// Sets the slot to a boolean.
    pub fn set_bool(&mut self, slot: FJ_Slot, value: bool) {
        if let Some(addr) = self.checked(slot) {
            cell::set_bool(self.buffer, addr, value);
        }
    }

    /// Sets the slot to an `i32`.
    pub fn set_int(&mut self, slot: FJ_Slot, value: i32) {
        self.set_int64(slot, value as i64);
    }

    /// Sets the slot to an `i64`. The narrowest storage type that holds the
    /// value is chosen and the compatibility mask set accordingly.
    pub fn set_int64(&mut self, slot: FJ_Slot, value: i64) {
        if let Some(addr) = self.checked(slot) {
            cell::set_int64(self.buffer, addr, value);
        }
    }

    /// Sets the slot to a `u32`.
    pub fn set_uint(&mut self, slot: FJ_Slot, value: u32) {
        self.set_uint64(slot, value as u64);
    }

    /// Sets the slot to a `u64`. The narrowest storage type that holds the
    /// value is chosen and the compatibility mask set accordingly.
    pub fn set_uint64(&mut self, slot: FJ_Slot, value: u64) {
        if let Some(addr) = self.checked(slot) {
            cell::set_uint64(self.buffer, addr, value);
        }
    }

    /// Sets the slot to a double.
    pub fn set_double(&mut self, slot: FJ_Slot, value: f64) {
        if let Some(addr) = self.checked(slot) {
            cell::set_double(self.buffer, addr, value);
        }
    }

    /// Sets the slot to a string that references `value` instead of copying
    /// it. The reference must stay valid as long as the buffer is borrowed,
    /// which the `'buf` bound enforces.
    pub fn set_string_ref(&mut self, slot: FJ_Slot, value: &'buf str) {
        if let Some(addr) = self.checked(slot) {
            cell::set_string_ref(self.buffer, addr, value.as_ptr(), value.len() as u32);
        }
    }

    /// Sets the slot to a copy of `value`: inline when it fits inside the
    /// cell, otherwise in the string region at the buffer's end.
    pub fn set_string_copy(&mut self, slot: FJ_Slot, value: &str) {
        self.set_string_copy_raw(slot, value.as_bytes());
    }

    pub(crate) fn set_string_copy_raw(&mut self, slot: FJ_Slot, value: &[u8]) {
        let addr = match self.checked(slot) {
            Some(addr) => addr,
            None => return,
        };
        if value.len() <= INLINE_STRING_CAP {
            cell::set_string_inline(self.buffer, addr, value);
            return;
        }
        match self.pop_string(value.len() + 1) {
            Some(offset) => {
                self.buffer[offset..offset + value.len()].copy_from_slice(value);
                self.buffer[offset + value.len()] = 0;
                cell::set_string_arena(self.buffer, addr, offset as u32, value.len() as u32);
            }
            None => {
                // keep the cell readable even though the copy failed
                cell::set_string_inline(self.buffer, addr, b"");
            }
        }
    }

    /// Reserves `capacity` element cells for an array.
    pub fn array_builder(&mut self, capacity: usize) -> FJ_Array_builder {
        let top = self.pop_cells(capacity);
        FJ_Array_builder {
            top: top.unwrap_or(0) as u32,
            index: 0,
            capacity: if top.is_some() { capacity as u32 } else { 0 },
            policy: self.policy,
        }
    }

    /// Turns the slot into an array of the elements handed out by
    /// `array_builder` so far.
    pub fn set_array(&mut self, slot: FJ_Slot, array_builder: &FJ_Array_builder) {
        if let Some(addr) = self.checked(slot) {
            cell::set_container(
                self.buffer,
                addr,
                cell::ARRAY_TYPE,
                array_builder.top,
                array_builder.index,
            );
        }
    }

    /// Reserves `member_capacity` member slots (key plus value cells) for
    /// an object.
    pub fn object_builder(&mut self, member_capacity: usize) -> FJ_Object_builder {
        let top = self.pop_cells(member_capacity * 2);
        FJ_Object_builder {
            top: top.unwrap_or(0) as u32,
            index: 0,
            capacity: if top.is_some() { member_capacity as u32 } else { 0 },
        }
    }

    /// Adds a member whose key references `key`, returning the value slot.
    pub fn member_by_ref(
        &mut self,
        object_builder: &mut FJ_Object_builder,
        key: &'buf str,
    ) -> FJ_Slot {
        match self.next_member(object_builder) {
            Some(key_addr) => {
                cell::set_string_ref(self.buffer, key_addr, key.as_ptr(), key.len() as u32);
                FJ_Slot((key_addr + CELL_BYTES) as u32)
            }
            None => FJ_Slot(NOT_SET),
        }
    }

    /// Adds a member whose key is copied, returning the value slot.
    pub fn member_by_copy(
        &mut self,
        object_builder: &mut FJ_Object_builder,
        key: &str,
    ) -> FJ_Slot {
        match self.next_member(object_builder) {
            Some(key_addr) => {
                self.set_string_copy_raw(FJ_Slot(key_addr as u32), key.as_bytes());
                FJ_Slot((key_addr + CELL_BYTES) as u32)
            }
            None => FJ_Slot(NOT_SET),
        }
    }

    fn next_member(&mut self, object_builder: &mut FJ_Object_builder) -> Option<usize> {
        if object_builder.index >= object_builder.capacity {
            self.policy.fatal();
            return None;
        }
        let key_addr = object_builder.top as usize + object_builder.index as usize * MEMBER_BYTES;
        object_builder.index += 1;
        Some(key_addr)
    }

    /// Turns the slot into an object of the members added so far and sorts
    /// them for binary search lookup.
    pub fn set_object(&mut self, slot: FJ_Slot, object_builder: &FJ_Object_builder) {
        if let Some(addr) = self.checked(slot) {
            cell::set_container(
                self.buffer,
                addr,
                cell::OBJECT_TYPE,
                object_builder.top,
                object_builder.index,
            );
            optimize_object(self.buffer, addr);
        }
    }

    /// Sorts the members of an object slot. Sorting twice is a no-op.
    pub fn optimize_object(&mut self, slot: FJ_Slot) {
        if let Some(addr) = self.checked(slot) {
            optimize_object(self.buffer, addr);
        }
    }

    /// Reserves `count` contiguous cells, null initialized.
    pub(crate) fn pop_cells(&mut self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let bytes = count.checked_mul(CELL_BYTES)?;
        let new_pos = self.obj_pos.checked_add(bytes)?;
        if new_pos > self.str_pos || new_pos > self.buffer.len() {
            self.policy.fatal();
            return None;
        }
        let base = self.obj_pos;
        self.obj_pos = new_pos;
        for index in 0..count {
            cell::set_null(self.buffer, base + index * CELL_BYTES);
        }
        Some(base)
    }

    /// Claims `len` string bytes from the high end of the buffer.
    pub(crate) fn pop_string(&mut self, len: usize) -> Option<usize> {
        if self.str_pos < len || self.str_pos - len < self.obj_pos {
            self.policy.fatal();
            return None;
        }
        self.str_pos -= len;
        Some(self.str_pos)
    }

    pub(crate) fn copy_cell_bytes(&mut self, slot: FJ_Slot, raw: &[u8]) {
        if let Some(addr) = self.checked(slot) {
            self.buffer[addr..addr + CELL_BYTES].copy_from_slice(raw);
        }
    }

    pub(crate) fn set_container(&mut self, slot: FJ_Slot, word: u32, top: u32, count: u32) {
        if let Some(addr) = self.checked(slot) {
            cell::set_container(self.buffer, addr, word, top, count);
        }
    }

    /// A read view of the DOM built so far.
    pub fn document(&self) -> FJ_Document<'_> {
        let mut document = FJ_Document::from_bytes(&self.buffer[..], true);
        document.set_error_policy(self.policy);
        document
    }

    /// Finishes building and hands the buffer over as a document.
    pub fn into_document(self) -> FJ_Document<'buf> {
        let FJ_Builder { buffer, policy, .. } = self;
        let mut document = FJ_Document::from_bytes(buffer, true);
        document.set_error_policy(policy);
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static FATAL_COUNT: AtomicUsize = AtomicUsize::new(0);

    fn counting_callback() {
        FATAL_COUNT.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn scalar_roots_build_and_read_back() {
        let mut buffer = [0u8; 64];
        let mut builder = FJ_Builder::new(&mut buffer);
        let root = builder.root();
        builder.set_double(root, 1.5);
        let document = builder.document();
        assert_eq!(1.5, document.root().get_double());
    }

    #[test]
    fn arrays_count_only_appended_elements() {
        let mut buffer = [0u8; 256];
        let mut builder = FJ_Builder::new(&mut buffer);
        let root = builder.root();

        let mut array = builder.array_builder(4);
        let first = array.next();
        builder.set_uint(first, 7);
        let second = array.next();
        builder.set_bool(second, true);
        builder.set_array(root, &array);

        let document = builder.into_document();
        let root = document.root();
        assert_eq!(2, root.array_size());
        assert_eq!(7, root.array_get(0).get_uint());
        assert_eq!(true, root.array_get(1).get_bool());
    }

    #[test]
    fn objects_sort_their_members_on_set() {
        let mut buffer = [0u8; 512];
        let mut builder = FJ_Builder::new(&mut buffer);
        let root = builder.root();

        let mut object = builder.object_builder(3);
        let ccc = builder.member_by_ref(&mut object, "ccc");
        builder.set_uint(ccc, 3);
        let a = builder.member_by_copy(&mut object, "a");
        builder.set_uint(a, 1);
        let bb = builder.member_by_ref(&mut object, "bb");
        builder.set_uint(bb, 2);
        builder.set_object(root, &object);

        let document = builder.into_document();
        let root = document.root();
        assert!(root.object_get_member(0).key().string_equals("a"));
        assert!(root.object_get_member(1).key().string_equals("bb"));
        assert!(root.object_get_member(2).key().string_equals("ccc"));
        assert_eq!(2, root.object_get("bb").get_uint());
    }

    #[test]
    fn long_strings_spill_to_the_buffer_end() {
        let mut buffer = [0u8; 128];
        let mut builder = FJ_Builder::new(&mut buffer);
        let root = builder.root();
        builder.set_string_copy(root, "a string longer than the inline cap");
        let document = builder.into_document();
        assert_eq!(
            "a string longer than the inline cap",
            document.root().get_string()
        );
    }

    #[test]
    fn reference_strings_are_not_copied() {
        let text = "this string lives in the data segment, not the buffer";
        let mut buffer = [0u8; 2 * CELL_BYTES];
        let mut builder = FJ_Builder::new(&mut buffer);
        let root = builder.root();
        // far larger than the remaining buffer, no copy happens
        builder.set_string_ref(root, text);
        let document = builder.into_document();
        assert_eq!(text.len(), document.root().get_string_length());
        assert_eq!(text, document.root().get_string());
    }

    #[test]
    fn exceeding_the_capacity_reports_through_the_policy() {
        let mut buffer = [0u8; 256];
        let mut builder = FJ_Builder::new(&mut buffer);
        builder.set_error_policy(FJ_Error_Policy::with_callback(counting_callback));
        let root = builder.root();

        let mut array = builder.array_builder(1);
        let only = array.next();
        builder.set_uint(only, 1);

        let before = FATAL_COUNT.load(Ordering::SeqCst);
        let dead = array.next();
        assert!(FATAL_COUNT.load(Ordering::SeqCst) > before);
        // writing through the dead slot is reported, not honored
        builder.set_uint(dead, 2);
        builder.set_array(root, &array);

        let document = builder.into_document();
        assert_eq!(1, document.root().array_size());
    }

    #[test]
    fn cell_and_string_regions_may_not_collide() {
        let mut buffer = [0u8; 3 * CELL_BYTES];
        let mut builder = FJ_Builder::new(&mut buffer);
        builder.set_error_policy(FJ_Error_Policy::with_callback(counting_callback));

        let before = FATAL_COUNT.load(Ordering::SeqCst);
        let array = builder.array_builder(4);
        assert!(FATAL_COUNT.load(Ordering::SeqCst) > before);
        assert_eq!(0, array.capacity);
    }

    #[test]
    fn reset_starts_over() {
        let mut buffer = [0u8; 128];
        let mut builder = FJ_Builder::new(&mut buffer);
        let root = builder.root();
        builder.set_uint(root, 9);
        builder.reset();
        let document = builder.document();
        assert!(document.root().is_null());
    }
}
