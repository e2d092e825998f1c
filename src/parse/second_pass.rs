//! Second parse pass: emits the final DOM cells and decoded strings into
//! the buffer, consuming the child counts the first pass left behind.
//!
//! Before the walk starts the scratch region is moved from offset 0 to the
//! tail of the future cell region. Cells are then written from the low end
//! upward, counts are popped in the same tree order just ahead of the write
//! cursor, and arena strings grow upward from the end of the cell region.
//! The regions never overlap while they are still needed.

use crate::cell::{
    self, CELL_BYTES, INLINE_STRING_CAP,
};
use crate::error::FJ_Error_Code;
use crate::memory::read_u32;
use crate::parse::first_pass::{FJ_First_pass, FJ_STACK_SIZE};
use crate::parse::FJ_Parse_Opts;
use crate::scanner::{
    classify, combine_surrogates, utf8_encode, xdigit, FJ_Char_Type, FJ_Json_message,
};
use crate::value::{object_has_duplicate, optimize_object};

#[derive(Clone, Copy, Default)]
struct FJ_Second_pass_entry {
    is_object: bool,
    base: usize,
    value_pos: usize,
    value_flag: bool,
}

pub(crate) struct FJ_Second_pass {
    obj_pos: usize,
    str_pos: usize,
    stats_pos: usize,
    insitu: bool,
    optimize: bool,
    deny_trailing_commas: bool,
    deny_duplicate_keys: bool,
    deny_uncompliant_numbers: bool,
    pub err: Option<FJ_Error_Code>,
}

impl FJ_Second_pass {
    /// Relocates the scratch counts to the tail of the cell region and sets
    /// up the three write cursors.
    pub fn new(parser: &FJ_First_pass, opts: FJ_Parse_Opts, buffer: &mut [u8]) -> Self {
        let object_bytes = parser.amount_nodes as usize * CELL_BYTES;
        let stats_bytes = parser.storage_counter as usize * 4;
        let copy_to = object_bytes - stats_bytes;
        buffer.copy_within(0..stats_bytes, copy_to);

        let strict = opts.contains(FJ_Parse_Opts::STRICT);
        FJ_Second_pass {
            obj_pos: 0,
            str_pos: object_bytes,
            stats_pos: copy_to,
            insitu: opts.contains(FJ_Parse_Opts::INSITU),
            optimize: !opts.contains(FJ_Parse_Opts::DONT_SORT_OBJECT_MEMBERS),
            deny_trailing_commas: strict,
            deny_duplicate_keys: opts.contains(FJ_Parse_Opts::DENY_DUPLICATE_KEYS),
            deny_uncompliant_numbers: strict,
            err: None,
        }
    }

    /// Walks the message a second time. Returns the number of buffer bytes
    /// holding the finished DOM (cells plus arena strings).
    pub fn process(&mut self, buffer: &mut [u8], msg: &mut FJ_Json_message) -> usize {
        let result = self.obj_pos;
        self.obj_pos += CELL_BYTES;

        let mut stack = [FJ_Second_pass_entry::default(); FJ_STACK_SIZE + 1];
        let mut top = 0usize;
        stack[0] = FJ_Second_pass_entry {
            is_object: false,
            base: result,
            value_pos: result,
            value_flag: false,
        };
        msg.pos = 0;
        msg.skip_whitespaces();

        while msg.has_more() {
            match classify(msg.byte()) {
                FJ_Char_Type::NumericStart => self.number(buffer, &mut stack, top, msg),
                FJ_Char_Type::ObjectStart | FJ_Char_Type::ArrayStart => {
                    self.stack_up(buffer, &mut stack, &mut top, msg)
                }
                FJ_Char_Type::ObjectEnd | FJ_Char_Type::ArrayEnd => {
                    self.stack_down(buffer, &mut stack, &mut top, msg)
                }
                FJ_Char_Type::Colon => self.object_colon(buffer, &mut stack, top, msg),
                FJ_Char_Type::Comma => self.comma(&mut stack, top, msg),
                FJ_Char_Type::CommentStart => Self::skip_comment(msg),
                FJ_Char_Type::StringStart => self.string_start(buffer, &mut stack, top, msg),
                FJ_Char_Type::LiteralStart => self.literal(buffer, &mut stack, top, msg),
                _ => {
                    // the first pass admits no other character here
                    self.set_error(msg, FJ_Error_Code::FatalParserError)
                }
            }
            msg.skip_whitespaces();
        }

        self.str_pos
    }

    fn stack_up(
        &mut self,
        buffer: &mut [u8],
        stack: &mut [FJ_Second_pass_entry; FJ_STACK_SIZE + 1],
        top: &mut usize,
        msg: &mut FJ_Json_message,
    ) {
        let count = self.fetch_stats(buffer);

        if stack[*top].value_flag {
            self.missing_separator_error(&stack[*top], msg);
            return;
        }

        let is_object = msg.byte() == b'{';
        let child_base = self.obj_pos;
        self.obj_pos += count as usize * CELL_BYTES;

        let cell_addr = stack[*top].value_pos;
        if is_object {
            cell::set_container(buffer, cell_addr, cell::OBJECT_TYPE, child_base as u32, count >> 1);
        } else {
            cell::set_container(buffer, cell_addr, cell::ARRAY_TYPE, child_base as u32, count);
        }
        stack[*top].value_flag = true;
        stack[*top].value_pos += CELL_BYTES;

        *top += 1;
        stack[*top] = FJ_Second_pass_entry {
            is_object,
            base: child_base,
            value_pos: child_base,
            value_flag: false,
        };
        msg.pos += 1;
    }

    fn stack_down(
        &mut self,
        buffer: &mut [u8],
        stack: &mut [FJ_Second_pass_entry; FJ_STACK_SIZE + 1],
        top: &mut usize,
        msg: &mut FJ_Json_message,
    ) {
        let entry = stack[*top];
        *top -= 1;
        msg.pos += 1;

        if entry.is_object {
            // the container cell sits right before the parent's write cursor
            let object_addr = stack[*top].value_pos - CELL_BYTES;
            if self.optimize {
                optimize_object(buffer, object_addr);
            }
            if self.deny_duplicate_keys && object_has_duplicate(buffer, object_addr) {
                self.set_error(msg, FJ_Error_Code::DuplicateKey);
            }
        }

        if self.deny_trailing_commas && !entry.value_flag && entry.value_pos > entry.base {
            self.set_error(msg, FJ_Error_Code::TrailingComma);
        }
    }

    fn object_colon(
        &mut self,
        buffer: &[u8],
        stack: &mut [FJ_Second_pass_entry; FJ_STACK_SIZE + 1],
        top: usize,
        msg: &mut FJ_Json_message,
    ) {
        let entry = &mut stack[top];
        let cells = (entry.value_pos - entry.base) / CELL_BYTES;
        let key_written = cells & 1 == 1;
        let key_addr = entry.value_pos.wrapping_sub(CELL_BYTES);

        if entry.is_object
            && key_written
            && cell::public_type(read_u32(buffer, key_addr)) == crate::FJ_Type::String
        {
            entry.value_flag = false;
            msg.pos += 1;
        } else {
            self.set_error(msg, FJ_Error_Code::UnexpectedChar);
        }
    }

    fn comma(
        &mut self,
        stack: &mut [FJ_Second_pass_entry; FJ_STACK_SIZE + 1],
        top: usize,
        msg: &mut FJ_Json_message,
    ) {
        let entry = &mut stack[top];
        let cells = (entry.value_pos - entry.base) / CELL_BYTES;
        let pair_complete = cells > 0 && cells & 1 == 0;

        if !entry.is_object || pair_complete {
            entry.value_flag = false;
            msg.pos += 1;
        } else {
            self.set_error(msg, FJ_Error_Code::UnexpectedChar);
        }
    }

    fn string_start(
        &mut self,
        buffer: &mut [u8],
        stack: &mut [FJ_Second_pass_entry; FJ_STACK_SIZE + 1],
        top: usize,
        msg: &mut FJ_Json_message,
    ) {
        if stack[top].value_flag {
            self.missing_separator_error(&stack[top], msg);
            return;
        }

        msg.pos += 1;
        let cell_addr = stack[top].value_pos;

        if self.insitu {
            self.string_insitu(buffer, cell_addr, msg);
        } else {
            self.string_copy(buffer, cell_addr, msg);
        }
        if self.err.is_some() {
            return;
        }

        msg.pos += 1; // closing quote
        stack[top].value_flag = true;
        stack[top].value_pos += CELL_BYTES;
    }

    /// Decodes the string in place inside the writable input and stores a
    /// reference cell. The decoded form is never longer than the escaped
    /// form, so the write cursor can never pass the read cursor.
    fn string_insitu(&mut self, buffer: &mut [u8], cell_addr: usize, msg: &mut FJ_Json_message) {
        let base = msg.pos;
        let mut write = base;
        loop {
            if !msg.has_more() {
                self.set_error(msg, FJ_Error_Code::JsonMessageTruncated);
                return;
            }
            if msg.byte() == b'"' {
                break;
            }
            let (chunk, n) = self.decode_char(msg);
            if self.err.is_some() {
                return;
            }
            for k in 0..n {
                msg.input.set(write + k, chunk[k]);
            }
            write += n;
        }
        msg.input.set(write, 0); // overwrites decoded slack, at worst the quote
        let ptr = msg.input.bytes()[base..].as_ptr();
        cell::set_string_ref(buffer, cell_addr, ptr, (write - base) as u32);
    }

    /// Decodes into the cell if the content fits inline, otherwise spills
    /// into the arena.
    fn string_copy(&mut self, buffer: &mut [u8], cell_addr: usize, msg: &mut FJ_Json_message) {
        let mut inline_buf = [0u8; INLINE_STRING_CAP];
        let mut len = 0usize;
        let mut spilled = false;
        let arena_base = self.str_pos;

        loop {
            if !msg.has_more() {
                self.set_error(msg, FJ_Error_Code::JsonMessageTruncated);
                return;
            }
            if msg.byte() == b'"' {
                break;
            }
            let (chunk, n) = self.decode_char(msg);
            if self.err.is_some() {
                return;
            }
            if !spilled && len + n > INLINE_STRING_CAP {
                buffer[arena_base..arena_base + len].copy_from_slice(&inline_buf[..len]);
                spilled = true;
            }
            if spilled {
                buffer[arena_base + len..arena_base + len + n].copy_from_slice(&chunk[..n]);
            } else {
                inline_buf[len..len + n].copy_from_slice(&chunk[..n]);
            }
            len += n;
        }

        if spilled {
            buffer[arena_base + len] = 0;
            cell::set_string_arena(buffer, cell_addr, arena_base as u32, len as u32);
            self.str_pos = arena_base + len + 1;
        } else {
            cell::set_string_inline(buffer, cell_addr, &inline_buf[..len]);
        }
    }

    /// Decodes one logical character (raw byte, simple escape or unicode
    /// escape) and advances the cursor past it.
    fn decode_char(&mut self, msg: &mut FJ_Json_message) -> ([u8; 4], usize) {
        let mut out = [0u8; 4];
        let c = msg.byte();
        if c == b'\\' {
            msg.pos += 1;
            let escape = msg.byte();
            if escape == b'u' {
                msg.pos += 1;
                let code = self.utf16_sequence(msg);
                if self.err.is_some() {
                    return (out, 0);
                }
                let n = utf8_encode(code, &mut out);
                return (out, n);
            }
            out[0] = match escape {
                b'"' => b'"',
                b'\\' => b'\\',
                b'/' => b'/',
                b'b' => 0x08,
                b'f' => 0x0c,
                b'n' => b'\n',
                b'r' => b'\r',
                b't' => b'\t',
                _ => {
                    self.set_error(msg, FJ_Error_Code::InvalidEscapeSequence);
                    return (out, 0);
                }
            };
            msg.pos += 1;
            (out, 1)
        } else if c < 0x20 {
            // raw control characters are not allowed inside strings
            self.set_error(msg, FJ_Error_Code::UnexpectedChar);
            (out, 0)
        } else {
            msg.pos += 1;
            out[0] = c;
            (out, 1)
        }
    }

    fn utf16_sequence(&mut self, msg: &mut FJ_Json_message) -> u32 {
        let value = self.hex4(msg);
        if self.err.is_some() {
            return 0;
        }
        if (0xd800..=0xdbff).contains(&value) {
            if msg.byte() != b'\\' || msg.byte_at(msg.pos + 1) != b'u' {
                self.set_error(msg, FJ_Error_Code::InvalidUnicodeSequence);
                return 0;
            }
            msg.pos += 2;
            let low = self.hex4(msg);
            if self.err.is_some() {
                return 0;
            }
            if !(0xdc00..=0xdfff).contains(&low) {
                self.set_error(msg, FJ_Error_Code::InvalidUnicodeSequence);
                return 0;
            }
            combine_surrogates(value, low)
        } else if (0xdc00..=0xdfff).contains(&value) {
            self.set_error(msg, FJ_Error_Code::InvalidUnicodeSequence);
            0
        } else {
            value
        }
    }

    fn hex4(&mut self, msg: &mut FJ_Json_message) -> u32 {
        if msg.pos + 4 > msg.end {
            self.set_error(msg, FJ_Error_Code::JsonMessageTruncated);
            return 0;
        }
        let mut value = 0u32;
        for i in 0..4 {
            let digit = xdigit(msg.byte_at(msg.pos + i));
            if digit > 0xf {
                self.set_error(msg, FJ_Error_Code::InvalidUnicodeSequence);
                return 0;
            }
            value = value << 4 | digit as u32;
        }
        msg.pos += 4;
        value
    }

    fn number(
        &mut self,
        buffer: &mut [u8],
        stack: &mut [FJ_Second_pass_entry; FJ_STACK_SIZE + 1],
        top: usize,
        msg: &mut FJ_Json_message,
    ) {
        if stack[top].value_flag {
            self.missing_separator_error(&stack[top], msg);
            return;
        }
        if self.deny_uncompliant_numbers
            && (msg.byte() == b'+'
                || (msg.byte() == b'0' && msg.byte_at(msg.pos + 1).is_ascii_digit()))
        {
            self.set_error(msg, FJ_Error_Code::InvalidNumberFormat);
            return;
        }

        let cell_addr = stack[top].value_pos;
        let start = msg.pos;
        let negative = msg.byte() == b'-';

        // integer token: optional sign, then digits
        let mut int_end = start;
        if msg.byte_at(int_end) == b'+' || msg.byte_at(int_end) == b'-' {
            int_end += 1;
        }
        while int_end < msg.end && msg.byte_at(int_end).is_ascii_digit() {
            int_end += 1;
        }

        let mut integer_written = false;
        if let Ok(token) = core::str::from_utf8(&msg.input.bytes()[start..int_end]) {
            if negative {
                if let Ok(value) = token.parse::<i64>() {
                    cell::set_int64(buffer, cell_addr, value);
                    integer_written = true;
                }
            } else if let Ok(value) = token.parse::<u64>() {
                cell::set_uint64(buffer, cell_addr, value);
                integer_written = true;
            }
        }

        let mut number_end = int_end;
        // fall back to a double when the integer overflowed or the number
        // continues with '.', 'e' or 'E'
        if !integer_written || classify(msg.byte_at(int_end)) == FJ_Char_Type::Unsupported {
            let mut token_end = int_end;
            while token_end < msg.end
                && matches!(msg.byte_at(token_end), b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E')
            {
                token_end += 1;
            }
            let parsed = core::str::from_utf8(&msg.input.bytes()[start..token_end])
                .ok()
                .and_then(|token| token.parse::<f64>().ok());
            let trailing_dot = token_end > start && msg.byte_at(token_end - 1) == b'.';
            let appendix = classify(msg.byte_at(token_end)) == FJ_Char_Type::Unsupported;
            match parsed {
                Some(value) if !trailing_dot && !appendix => {
                    cell::set_double(buffer, cell_addr, value);
                    number_end = token_end;
                }
                _ => {
                    self.set_error(msg, FJ_Error_Code::InvalidNumberFormat);
                    return;
                }
            }
        }

        msg.pos = number_end;
        stack[top].value_flag = true;
        stack[top].value_pos += CELL_BYTES;
    }

    fn literal(
        &mut self,
        buffer: &mut [u8],
        stack: &mut [FJ_Second_pass_entry; FJ_STACK_SIZE + 1],
        top: usize,
        msg: &mut FJ_Json_message,
    ) {
        if stack[top].value_flag {
            self.missing_separator_error(&stack[top], msg);
            return;
        }

        let text: &[u8] = match msg.byte() {
            b't' => b"true",
            b'f' => b"false",
            _ => b"null",
        };

        let fits = msg.end - msg.pos >= text.len()
            && &msg.input.bytes()[msg.pos..msg.pos + text.len()] == text;
        if fits {
            let cell_addr = stack[top].value_pos;
            match text[0] {
                b't' => cell::set_bool(buffer, cell_addr, true),
                b'f' => cell::set_bool(buffer, cell_addr, false),
                _ => cell::set_null(buffer, cell_addr),
            }
            stack[top].value_flag = true;
            stack[top].value_pos += CELL_BYTES;
            msg.pos += text.len();
        } else {
            self.set_error(msg, FJ_Error_Code::UnexpectedChar);
        }
    }

    fn skip_comment(msg: &mut FJ_Json_message) {
        // the first pass already validated the comment shape
        msg.pos += 1;
        if msg.byte() == b'/' {
            while msg.has_more() && msg.byte() != b'\n' {
                msg.pos += 1;
            }
            msg.pos += 1;
        } else {
            msg.pos += 1;
            while msg.has_more() && !(msg.byte() == b'*' && msg.byte_at(msg.pos + 1) == b'/') {
                msg.pos += 1;
            }
            msg.pos += 2;
        }
    }

    fn fetch_stats(&mut self, buffer: &[u8]) -> u32 {
        if self.stats_pos <= self.obj_pos {
            // the count of a trailing empty container may already be
            // overwritten by cells; zero is the correct value then
            return 0;
        }
        let data = read_u32(buffer, self.stats_pos);
        self.stats_pos += 4;
        data
    }

    fn missing_separator_error(&mut self, entry: &FJ_Second_pass_entry, msg: &mut FJ_Json_message) {
        let cells = (entry.value_pos - entry.base) / CELL_BYTES;
        if entry.is_object && cells & 1 == 1 {
            self.set_error(msg, FJ_Error_Code::MissingColon);
        } else {
            self.set_error(msg, FJ_Error_Code::MissingComma);
        }
    }

    fn set_error(&mut self, msg: &mut FJ_Json_message, code: FJ_Error_Code) {
        if self.err.is_none() {
            self.err = Some(code);
            msg.end = msg.pos;
        }
    }
}
