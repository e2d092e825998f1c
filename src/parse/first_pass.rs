//! First parse pass: validates the grammar and collects the statistics the
//! second pass needs — total node count, arena string bytes and one child
//! count per container, written into the buffer as a scratch region
//! growing from offset 0.

use crate::cell::{CELL_BYTES, ERROR_RECORD_BYTES, INLINE_STRING_CAP};
use crate::error::FJ_Error_Code;
use crate::memory::{write_u32, FJ_Buffer};
use crate::parse::FJ_Parse_Opts;
use crate::scanner::{classify, utf8_len, xdigit, FJ_Char_Type, FJ_Json_message};

/// Maximum number of open containers.
pub(crate) const FJ_STACK_SIZE: usize = 32;

#[derive(Clone, Copy, Default)]
struct FJ_First_pass_entry {
    size: u32,
    storage_pos: u32,
    is_object: bool,
}

pub(crate) struct FJ_First_pass {
    pub amount_nodes: u32,
    pub complete_string_length: usize,
    pub storage_counter: u32,
    pub err: Option<FJ_Error_Code>,
    insitu: bool,
    strict: bool,
}

impl FJ_First_pass {
    pub fn new(opts: FJ_Parse_Opts) -> Self {
        FJ_First_pass {
            amount_nodes: 0,
            complete_string_length: 0,
            storage_counter: 0,
            err: None,
            insitu: opts.contains(FJ_Parse_Opts::INSITU),
            strict: opts.contains(FJ_Parse_Opts::STRICT),
        }
    }

    /// Buffer bytes the DOM will need. After an error only the error root
    /// and its record have to fit.
    pub fn required_buffer_size(&self) -> usize {
        if self.err.is_some() {
            return CELL_BYTES + ERROR_RECORD_BYTES;
        }
        self.amount_nodes as usize * CELL_BYTES + self.complete_string_length
    }

    pub fn parse(&mut self, msg: &mut FJ_Json_message, mut storage: Option<&mut FJ_Buffer>) {
        let mut stack = [FJ_First_pass_entry::default(); FJ_STACK_SIZE + 1];
        let mut top = 0usize;
        self.amount_nodes = 0;

        msg.skip_whitespaces();
        if msg.has_more() {
            loop {
                match classify(msg.byte()) {
                    FJ_Char_Type::End => self.end_of_message(top, msg),
                    FJ_Char_Type::NumericStart => self.number_start(&mut stack[top], msg),
                    FJ_Char_Type::LiteralStart => self.literal_start(&mut stack[top], msg),
                    FJ_Char_Type::ObjectStart | FJ_Char_Type::ArrayStart => {
                        self.stack_up(&mut stack, &mut top, msg)
                    }
                    FJ_Char_Type::ObjectEnd | FJ_Char_Type::ArrayEnd => {
                        self.stack_down(&mut stack, &mut top, msg, &mut storage)
                    }
                    FJ_Char_Type::CommentStart => self.comment(msg),
                    FJ_Char_Type::StringStart => self.string_start(&mut stack[top], msg),
                    FJ_Char_Type::Colon | FJ_Char_Type::Comma => {
                        // separator placement is checked by the second pass
                        msg.pos += 1;
                    }
                    FJ_Char_Type::Whitespace | FJ_Char_Type::Unsupported => {
                        self.set_error(msg, FJ_Error_Code::UnexpectedChar)
                    }
                }
                msg.skip_whitespaces();
                if !(msg.has_more() && top > 0) {
                    break;
                }
            }
        }

        if top != 0 {
            self.set_error(msg, FJ_Error_Code::JsonMessageTruncated);
        } else if self.amount_nodes == 0 {
            self.set_error(msg, FJ_Error_Code::FatalParserError);
        }
    }

    fn stack_up(
        &mut self,
        stack: &mut [FJ_First_pass_entry; FJ_STACK_SIZE + 1],
        top: &mut usize,
        msg: &mut FJ_Json_message,
    ) {
        stack[*top].size += 1;

        if *top + 1 >= stack.len() {
            self.set_error(msg, FJ_Error_Code::DepthOverflow);
        } else {
            *top += 1;
            let entry = &mut stack[*top];
            entry.storage_pos = self.storage_counter;
            entry.size = 0;
            entry.is_object = msg.byte() == b'{';
            msg.pos += 1;
            self.amount_nodes += 1;
            self.storage_counter += 1;
        }
    }

    fn stack_down(
        &mut self,
        stack: &mut [FJ_First_pass_entry; FJ_STACK_SIZE + 1],
        top: &mut usize,
        msg: &mut FJ_Json_message,
        storage: &mut Option<&mut FJ_Buffer>,
    ) {
        let entry = stack[*top];

        // the closing character has to match the open container, and an
        // object must hold an even number of cells (key/value pairs)
        let object_close = msg.byte() == b'}' && entry.is_object && entry.size & 1 == 0;
        let array_close = msg.byte() == b']' && !entry.is_object;
        if *top > 0 && (object_close || array_close) {
            if let Some(storage) = storage.as_mut() {
                self.write_scratch(storage, msg, entry.storage_pos, entry.size);
            }
            *top -= 1;
            msg.pos += 1;
        } else {
            self.set_error(msg, FJ_Error_Code::UnexpectedChar);
        }
    }

    fn write_scratch(
        &mut self,
        storage: &mut FJ_Buffer,
        msg: &mut FJ_Json_message,
        storage_pos: u32,
        count: u32,
    ) {
        let in_buffer_pos = storage_pos as usize * 4;
        if in_buffer_pos + 4 > storage.len() {
            let required = self.required_buffer_size();
            if let Err(code) = storage.ensure(required) {
                self.set_error(msg, code);
                return;
            }
        }
        write_u32(storage.bytes_mut(), in_buffer_pos, count);
    }

    fn string_start(&mut self, entry: &mut FJ_First_pass_entry, msg: &mut FJ_Json_message) {
        entry.size += 1;
        self.amount_nodes += 1;

        msg.pos += 1;
        let mut size = 0usize;
        while msg.has_more() && msg.byte() != 0 && msg.byte() != b'"' {
            if msg.byte() == b'\\' {
                size += self.string_escape(msg);
            } else {
                size += 1;
            }
            msg.pos += 1;
        }
        if !self.insitu && size >= INLINE_STRING_CAP {
            self.complete_string_length += size + 1;
        }
        if msg.byte() == b'"' {
            msg.pos += 1;
        }
    }

    /// Measures the decoded size of one escape sequence. The cursor is left
    /// on the last consumed character.
    fn string_escape(&mut self, msg: &mut FJ_Json_message) -> usize {
        let mut string_length = 1;
        msg.pos += 1;
        if msg.byte() == b'u' {
            msg.pos += 1;
            let value = self.four_digits(msg);
            if self.err.is_none() {
                if value < 0xd800 || value > 0xdfff {
                    string_length = utf8_len(value);
                } else {
                    // surrogate: a second \uXXXX must follow, the pairing
                    // itself is validated by the second pass
                    msg.pos += 1;
                    if msg.byte() != b'\\' || msg.byte_at(msg.pos + 1) != b'u' {
                        self.set_error(msg, FJ_Error_Code::InvalidUnicodeSequence);
                    }
                    msg.pos += 2;
                    self.four_digits(msg);
                    string_length = 4;
                }
            }
        }
        string_length
    }

    fn four_digits(&mut self, msg: &mut FJ_Json_message) -> u32 {
        let mut value = 0u32;
        if msg.pos + 3 < msg.end {
            for i in 0..4 {
                let digit = xdigit(msg.byte_at(msg.pos + i));
                if digit > 0xf {
                    self.set_error(msg, FJ_Error_Code::InvalidUnicodeSequence);
                }
                value = value << 4 | digit as u32;
            }
            msg.pos += 3; // leave the cursor on the last digit
        } else {
            self.set_error(msg, FJ_Error_Code::JsonMessageTruncated);
        }
        value
    }

    fn number_start(&mut self, entry: &mut FJ_First_pass_entry, msg: &mut FJ_Json_message) {
        entry.size += 1;
        self.amount_nodes += 1;

        // fast forward to the end of the number, the second pass decodes it
        msg.pos += 1;
        while msg.has_more() {
            let class = classify(msg.byte());
            if class != FJ_Char_Type::NumericStart && class != FJ_Char_Type::Unsupported {
                break;
            }
            msg.pos += 1;
        }
    }

    fn literal_start(&mut self, entry: &mut FJ_First_pass_entry, msg: &mut FJ_Json_message) {
        entry.size += 1;
        self.amount_nodes += 1;

        msg.pos += 1;
        while msg.has_more() && classify(msg.byte()) == FJ_Char_Type::Unsupported {
            msg.pos += 1;
        }
    }

    fn comment(&mut self, msg: &mut FJ_Json_message) {
        if self.strict {
            self.set_error(msg, FJ_Error_Code::UnexpectedChar);
            return;
        }
        msg.pos += 1;
        if msg.byte() == b'/' {
            // line comment
            while msg.has_more() {
                let c = msg.byte();
                if c == 0 || c == b'\n' {
                    break;
                }
                msg.pos += 1;
            }
        } else if msg.byte() == b'*' && msg.pos + 2 < msg.end {
            // block comment
            msg.pos += 2;
            while msg.has_more() {
                let c = msg.byte();
                if c == 0 || (c == b'/' && msg.byte_at(msg.pos - 1) == b'*') {
                    break;
                }
                msg.pos += 1;
            }
            if msg.byte() == b'/' {
                msg.pos += 1;
            }
        } else {
            msg.pos -= 1;
            self.set_error(msg, FJ_Error_Code::UnexpectedChar);
        }
    }

    fn end_of_message(&mut self, top: usize, msg: &mut FJ_Json_message) {
        if top == 0 {
            msg.end = msg.pos;
        } else {
            self.set_error(msg, FJ_Error_Code::JsonMessageTruncated);
        }
    }

    pub fn set_error(&mut self, msg: &mut FJ_Json_message, code: FJ_Error_Code) {
        if self.err.is_none() {
            self.err = Some(code);
            msg.end = msg.pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::FJ_Input;

    fn first_pass(json: &str) -> FJ_First_pass {
        first_pass_opt(json, FJ_Parse_Opts::empty())
    }

    fn first_pass_opt(json: &str, opts: FJ_Parse_Opts) -> FJ_First_pass {
        let mut msg = FJ_Json_message::new(FJ_Input::Borrowed(json.as_bytes()));
        let mut parser = FJ_First_pass::new(opts);
        parser.parse(&mut msg, None);
        parser
    }

    #[test]
    fn counts_nodes_of_a_simple_object() {
        let parser = first_pass(r#"{"id":1}"#);
        assert_eq!(None, parser.err);
        assert_eq!(3, parser.amount_nodes);
        assert_eq!(1, parser.storage_counter);
    }

    #[test]
    fn counts_nodes_of_a_simple_array() {
        let parser = first_pass(r#"["id",1,true,null,false]"#);
        assert_eq!(None, parser.err);
        assert_eq!(6, parser.amount_nodes);
    }

    #[test]
    fn whitespace_does_not_change_the_accounting() {
        let parser = first_pass(r#" [ "id" , 1 , true , null , false ] "#);
        assert_eq!(None, parser.err);
        assert_eq!(6, parser.amount_nodes);
    }

    #[test]
    fn detects_truncated_messages() {
        let parser = first_pass(r#"{"id":1"#);
        assert_eq!(Some(FJ_Error_Code::JsonMessageTruncated), parser.err);
    }

    #[test]
    fn trailing_nul_padding_is_not_truncation() {
        let parser = first_pass("{\"id\":1}\0\0\0");
        assert_eq!(None, parser.err);
        assert_eq!(3, parser.amount_nodes);
    }

    #[test]
    fn empty_containers_occupy_one_node() {
        let parser = first_pass("{}");
        assert_eq!(None, parser.err);
        assert_eq!(1, parser.amount_nodes);
        assert_eq!(CELL_BYTES, parser.required_buffer_size());

        let parser = first_pass("[]");
        assert_eq!(None, parser.err);
        assert_eq!(1, parser.amount_nodes);
    }

    #[test]
    fn empty_input_is_a_parser_error() {
        let parser = first_pass("   ");
        assert_eq!(Some(FJ_Error_Code::FatalParserError), parser.err);
    }

    #[test]
    fn short_strings_do_not_reserve_arena_bytes() {
        let parser = first_pass(r#"{"name":"blah"}"#);
        assert_eq!(0, parser.complete_string_length);
        assert_eq!(3 * CELL_BYTES, parser.required_buffer_size());
    }

    #[test]
    fn long_strings_reserve_length_plus_terminator() {
        let parser = first_pass(r#"{"name":"blahblubbhubbeldipup"}"#);
        assert_eq!(21, parser.complete_string_length);
    }

    #[test]
    fn insitu_mode_never_reserves_string_bytes() {
        let parser =
            first_pass_opt(r#"{"name":"blahblubbhubbeldipup"}"#, FJ_Parse_Opts::INSITU);
        assert_eq!(0, parser.complete_string_length);
    }

    #[test]
    fn escapes_are_measured_decoded() {
        let parser = first_pass(r#""aae€𝄞\n""#);
        assert_eq!(None, parser.err);
        // 3 ascii + 3 (€) + 4 (𝄞) + 1 (\n) = 11 decoded bytes -> arena
        assert_eq!(12, parser.complete_string_length);
    }

    #[test]
    fn depth_at_the_limit_parses() {
        let mut json = alloc::string::String::new();
        for _ in 0..FJ_STACK_SIZE {
            json.push('[');
        }
        for _ in 0..FJ_STACK_SIZE {
            json.push(']');
        }
        let parser = first_pass(&json);
        assert_eq!(None, parser.err);
        assert_eq!(FJ_STACK_SIZE as u32, parser.amount_nodes);
    }

    #[test]
    fn depth_above_the_limit_overflows() {
        let mut json = alloc::string::String::new();
        for _ in 0..FJ_STACK_SIZE + 1 {
            json.push('[');
        }
        for _ in 0..FJ_STACK_SIZE + 1 {
            json.push(']');
        }
        let parser = first_pass(&json);
        assert_eq!(Some(FJ_Error_Code::DepthOverflow), parser.err);
    }

    #[test]
    fn odd_object_cell_count_is_rejected() {
        let parser = first_pass(r#"{"id"}"#);
        assert_eq!(Some(FJ_Error_Code::UnexpectedChar), parser.err);
    }

    #[test]
    fn mismatched_closing_brackets_are_rejected() {
        let parser = first_pass(r#"["id"}"#);
        assert_eq!(Some(FJ_Error_Code::UnexpectedChar), parser.err);
    }

    #[test]
    fn comments_are_skipped_by_default() {
        let parser = first_pass("[1, /* two */ 2, 3] // done");
        assert_eq!(None, parser.err);
        assert_eq!(4, parser.amount_nodes);
    }

    #[test]
    fn strict_mode_rejects_comments() {
        let parser = first_pass_opt("[1, /* two */ 2]", FJ_Parse_Opts::STRICT);
        assert_eq!(Some(FJ_Error_Code::UnexpectedChar), parser.err);
    }

    #[test]
    fn orphan_high_surrogate_is_invalid() {
        let parser = first_pass(r#""\ud834x""#);
        assert_eq!(Some(FJ_Error_Code::InvalidUnicodeSequence), parser.err);
    }

    #[test]
    fn truncated_unicode_escape_is_truncation() {
        let parser = first_pass(r#""\u00"#);
        assert_eq!(Some(FJ_Error_Code::JsonMessageTruncated), parser.err);
    }
}
