//! Structural utilities over finished DOMs: equality, size accounting and
//! deep copies.

use crate::builder::{FJ_Builder, FJ_Slot};
use crate::cell::{FJ_Internal_Type, FJ_Type, CELL_BYTES, ERROR_RECORD_BYTES, MEMBER_BYTES};
use crate::value::{string_payload, FJ_Value};

/// Structural equality: order insensitive for object members, order
/// sensitive for array elements. Numbers compare by their stored bit
/// pattern, so integer `1` and double `1.0` are *not* equal.
///
/// ```rust
/// use flat_json::{parse, equals};
///
/// let mut a = [0u8; 256];
/// let (_, first) = parse(r#"{"x":1,"y":[2,3]}"#, &mut a);
/// let mut b = [0u8; 256];
/// let (_, second) = parse(r#"{"y":[2,3],"x":1}"#, &mut b);
/// assert!(equals(first.root(), second.root()));
/// ```
pub fn equals(lhs: FJ_Value, rhs: FJ_Value) -> bool {
    let lhs_type = lhs.get_type();
    if lhs_type != rhs.get_type() {
        return false;
    }
    match lhs_type {
        FJ_Type::Null => true,
        FJ_Type::Bool => lhs.get_bool() == rhs.get_bool(),
        FJ_Type::Number => lhs.payload_u64() == rhs.payload_u64(),
        FJ_Type::String => {
            string_payload(lhs.buffer(), lhs.addr as usize)
                == string_payload(rhs.buffer(), rhs.addr as usize)
        }
        FJ_Type::Object => {
            let count = lhs.object_size();
            if count != rhs.object_size() {
                return false;
            }
            for index in 0..count {
                let member = lhs.object_get_member(index);
                let key = member.key();
                // every counted member carries a string key, both from the
                // parser and from the builder
                debug_assert!(!key.is_null());
                let needle = string_payload(key.buffer(), key.addr as usize);
                if !equals(member.value(), rhs.object_get_raw(needle)) {
                    return false;
                }
            }
            true
        }
        FJ_Type::Array => {
            let count = lhs.array_size();
            if count != rhs.array_size() {
                return false;
            }
            for index in 0..count {
                if !equals(lhs.array_get(index), rhs.array_get(index)) {
                    return false;
                }
            }
            true
        }
        FJ_Type::Invalid => {
            lhs.doc.policy().fatal();
            false
        }
    }
}

/// Bytes the value tree occupies: one cell per node plus arena string
/// copies and the error record. Inline and reference strings live in their
/// cell respectively in the caller's input and add nothing.
pub fn value_sizeof(value: FJ_Value) -> usize {
    let mut size = CELL_BYTES;
    match value.internal() {
        FJ_Internal_Type::Object | FJ_Internal_Type::ObjectSorted => {
            for index in 0..value.object_size() {
                let member = value.object_get_member(index);
                size += value_sizeof(member.key());
                size += value_sizeof(member.value());
            }
        }
        FJ_Internal_Type::Array => {
            for index in 0..value.array_size() {
                size += value_sizeof(value.array_get(index));
            }
        }
        FJ_Internal_Type::String => {
            size += value.get_string_length() + 1;
        }
        FJ_Internal_Type::Error => {
            size += ERROR_RECORD_BYTES;
        }
        _ => {}
    }
    size
}

/// Deep copies `source` into `destination` inside the builder's buffer.
/// Strings that reference caller owned bytes are materialized as real
/// copies, so the result never borrows the source's input.
pub fn copy(source: FJ_Value, destination: FJ_Slot, builder: &mut FJ_Builder) {
    if source.is_not_set() {
        builder.set_null(destination);
        return;
    }
    match source.internal() {
        FJ_Internal_Type::Null | FJ_Internal_Type::Primitive | FJ_Internal_Type::StringInline => {
            let addr = source.addr as usize;
            let raw: [u8; CELL_BYTES] = {
                let mut cell = [0u8; CELL_BYTES];
                cell.copy_from_slice(&source.buffer()[addr..addr + CELL_BYTES]);
                cell
            };
            builder.copy_cell_bytes(destination, &raw);
        }
        FJ_Internal_Type::String | FJ_Internal_Type::StringRef => {
            let content = string_payload(source.buffer(), source.addr as usize);
            builder.set_string_copy_raw(destination, content);
        }
        FJ_Internal_Type::Object | FJ_Internal_Type::ObjectSorted => {
            let count = value_count(&source, true);
            match builder.pop_cells(count * 2) {
                Some(base) => {
                    // sorted order survives the index wise copy, keep the tag
                    builder.set_container(destination, source.word(), base as u32, count as u32);
                    for index in 0..count {
                        let member = source.object_get_member(index);
                        let slot = base + index * MEMBER_BYTES;
                        copy(member.key(), FJ_Slot(slot as u32), builder);
                        copy(member.value(), FJ_Slot((slot + CELL_BYTES) as u32), builder);
                    }
                }
                None => builder.set_container(destination, source.word(), 0, 0),
            }
        }
        FJ_Internal_Type::Array => {
            let count = value_count(&source, false);
            match builder.pop_cells(count) {
                Some(base) => {
                    builder.set_container(destination, source.word(), base as u32, count as u32);
                    for index in 0..count {
                        let slot = base + index * CELL_BYTES;
                        copy(source.array_get(index), FJ_Slot(slot as u32), builder);
                    }
                }
                None => builder.set_container(destination, source.word(), 0, 0),
            }
        }
        FJ_Internal_Type::Error | FJ_Internal_Type::Unspecified => {
            source.doc.policy().fatal();
        }
    }
}

fn value_count(value: &FJ_Value, object: bool) -> usize {
    if object {
        value.object_size()
    } else {
        value.array_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, parse_insitu};
    use crate::FJ_Builder;

    fn parsed<'a>(json: &str, buffer: &'a mut [u8]) -> crate::FJ_Document<'a> {
        let (_, document) = parse(json, buffer);
        document
    }

    #[test]
    fn member_order_does_not_matter() {
        let mut a = [0u8; 512];
        let first = parsed(r#"{"a":1,"b":[true,null],"c":"text"}"#, &mut a);
        let mut b = [0u8; 512];
        let second = parsed(r#"{"c":"text","b":[true,null],"a":1}"#, &mut b);
        assert!(equals(first.root(), second.root()));
    }

    #[test]
    fn array_order_does_matter() {
        let mut a = [0u8; 256];
        let first = parsed("[1,2]", &mut a);
        let mut b = [0u8; 256];
        let second = parsed("[2,1]", &mut b);
        assert!(!equals(first.root(), second.root()));
    }

    #[test]
    fn numbers_compare_by_stored_representation() {
        let mut a = [0u8; 64];
        let integer = parsed("1", &mut a);
        let mut b = [0u8; 64];
        let double = parsed("1.0", &mut b);
        let mut c = [0u8; 64];
        let again = parsed("1", &mut c);

        assert!(!equals(integer.root(), double.root()));
        assert!(equals(integer.root(), again.root()));
    }

    #[test]
    fn string_variants_compare_by_content() {
        let json = r#"{"k":"a string too long for an inline cell"}"#;
        let mut a = [0u8; 512];
        let copied = parsed(json, &mut a);

        let mut raw = [0u8; 64];
        raw[..json.len()].copy_from_slice(json.as_bytes());
        let mut json_insitu = raw;
        let mut b = [0u8; 512];
        let (_, aliased) = parse_insitu(&mut json_insitu[..json.len()], &mut b);

        assert!(equals(copied.root(), aliased.root()));
    }

    #[test]
    fn sizeof_counts_cells_strings_and_error_records() {
        let mut a = [0u8; 64];
        assert_eq!(CELL_BYTES, value_sizeof(parsed("{}", &mut a).root()));

        let mut b = [0u8; 256];
        assert_eq!(
            3 * CELL_BYTES,
            value_sizeof(parsed(r#"{"id":1}"#, &mut b).root())
        );

        let mut c = [0u8; 256];
        assert_eq!(
            2 * CELL_BYTES + 20 + 1,
            value_sizeof(parsed(r#"["blahblubbhubbeldipup"]"#, &mut c).root())
        );

        let mut d = [0u8; 256];
        assert_eq!(
            CELL_BYTES + ERROR_RECORD_BYTES,
            value_sizeof(parsed("[1,", &mut d).root())
        );
    }

    #[test]
    fn copies_compare_equal_and_stay_navigable() {
        let mut a = [0u8; 1024];
        let source = parsed(
            r#"{"name":"blahblubbhubbeldipup","tags":[1,2.5,true],"id":7}"#,
            &mut a,
        );

        let mut b = [0u8; 1024];
        let mut builder = FJ_Builder::new(&mut b);
        let root = builder.root();
        copy(source.root(), root, &mut builder);
        let duplicate = builder.into_document();

        assert!(equals(source.root(), duplicate.root()));
        // sorted tag survived, binary search lookup works
        assert_eq!(7, duplicate.root().object_get("id").get_uint());
        assert_eq!(
            "blahblubbhubbeldipup",
            duplicate.root().object_get("name").get_string()
        );
    }

    #[test]
    fn copying_a_copy_changes_nothing() {
        let mut a = [0u8; 512];
        let source = parsed(r#"{"x":[1,{"y":"z"}]}"#, &mut a);

        let mut b = [0u8; 512];
        let mut first_builder = FJ_Builder::new(&mut b);
        let root = first_builder.root();
        copy(source.root(), root, &mut first_builder);
        let first = first_builder.into_document();

        let mut c = [0u8; 512];
        let mut second_builder = FJ_Builder::new(&mut c);
        let root = second_builder.root();
        copy(first.root(), root, &mut second_builder);
        let second = second_builder.into_document();

        assert!(equals(first.root(), second.root()));
        assert!(equals(source.root(), second.root()));
    }

    #[test]
    fn copies_of_insitu_documents_own_their_strings() {
        let mut json = *br#"{"ref":"aliased string content, quite long"}"#;
        let mut a = [0u8; 256];
        let (_, aliased) = parse_insitu(&mut json, &mut a);

        let mut b = [0u8; 512];
        let mut builder = FJ_Builder::new(&mut b);
        let root = builder.root();
        copy(aliased.root(), root, &mut builder);
        let owned = builder.into_document();

        assert!(equals(aliased.root(), owned.root()));
        assert_eq!(
            "aliased string content, quite long",
            owned.root().object_get("ref").get_string()
        );
    }
}
