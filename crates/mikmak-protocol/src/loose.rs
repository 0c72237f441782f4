//! Parser for the loose object-literal lists embedded in xt payloads.
//!
//! Several server responses carry a nested list as a single JSON *string*
//! written in JavaScript object-literal syntax rather than JSON:
//!
//! ```text
//! "list": "[{'ach':15,'ass':1,'p':0,'prg':10},{\"id\":4,\"name\":'קיווי'}]"
//! ```
//!
//! Keys and strings may use either quote style, and `true`/`false`/`null`
//! appear as bare words. This module is a small recursive-descent parser
//! for exactly that subset. The result uses the same data model as
//! `serde_json` (objects, arrays, numbers, strings, booleans, null), so
//! the payload parsers can treat it like any other JSON value.
//!
//! Accepted grammar:
//!
//! ```text
//! value   := object | array | string | number | "true" | "false" | "null"
//! object  := "{" [ string ":" value { "," string ":" value } [","] ] "}"
//! array   := "[" [ value { "," value } [","] ] "]"
//! string  := '...' | "..."            (backslash escapes allowed)
//! number  := ["-"] digits ["." digits] [("e"|"E") ["+"|"-"] digits]
//! ```
//!
//! Anything else is rejected with a [`LooseError`] carrying the byte
//! offset where parsing stopped.

use serde_json::{Map, Number, Value};

use crate::LooseError;

/// Nesting deeper than this is rejected instead of recursing further.
const MAX_DEPTH: usize = 128;

/// Parses a loose object-literal string into a JSON value.
pub fn decode_loose_list(text: &str) -> Result<Value, LooseError> {
    let mut parser = Parser {
        src: text,
        pos: 0,
        depth: 0,
    };

    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();

    if parser.pos != text.len() {
        return Err(parser.unexpected("after the top-level value"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn unexpected(&self, context: &str) -> LooseError {
        match self.src[self.pos..].chars().next() {
            Some(c) => LooseError::new(
                self.pos,
                format!("unexpected character {c:?} {context}"),
            ),
            None => LooseError::new(
                self.pos,
                format!("unexpected end of input {context}"),
            ),
        }
    }

    fn expect(&mut self, byte: u8, context: &str) -> Result<(), LooseError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(context))
        }
    }

    fn value(&mut self) -> Result<Value, LooseError> {
        match self.peek() {
            Some(b'{') => self.nested(Self::object),
            Some(b'[') => self.nested(Self::array),
            Some(q @ (b'\'' | b'"')) => self.string(q).map(Value::String),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(b) if is_ident_byte(b) => self.keyword(),
            _ => Err(self.unexpected("where a value was expected")),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Value, LooseError>,
    ) -> Result<Value, LooseError> {
        if self.depth >= MAX_DEPTH {
            return Err(LooseError::new(self.pos, "nesting too deep"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn object(&mut self) -> Result<Value, LooseError> {
        self.expect(b'{', "at start of object")?;
        let mut map = Map::new();

        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = match self.peek() {
                Some(q @ (b'\'' | b'"')) => self.string(q)?,
                _ => return Err(self.unexpected("where a quoted key was expected")),
            };
            self.skip_ws();
            self.expect(b':', "after object key")?;
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.unexpected("in object")),
            }
        }
    }

    fn array(&mut self) -> Result<Value, LooseError> {
        self.expect(b'[', "at start of array")?;
        let mut items = Vec::new();

        loop {
            self.skip_ws();
            if self.peek() == Some(b']') {
                self.pos += 1;
                return Ok(Value::Array(items));
            }

            items.push(self.value()?);

            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {}
                _ => return Err(self.unexpected("in array")),
            }
        }
    }

    fn string(&mut self, quote: u8) -> Result<String, LooseError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();

        loop {
            // Quotes and backslashes are ASCII, so scanning bytes never
            // splits a multi-byte character.
            let rel = self.bytes()[self.pos..]
                .iter()
                .position(|&b| b == quote || b == b'\\');
            let Some(rel) = rel else {
                return Err(LooseError::new(start, "unterminated string"));
            };

            out.push_str(&self.src[self.pos..self.pos + rel]);
            self.pos += rel;

            if self.bytes()[self.pos] == quote {
                self.pos += 1;
                return Ok(out);
            }
            self.escape(&mut out)?;
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), LooseError> {
        let at = self.pos;
        self.pos += 1; // the backslash
        let Some(c) = self.src[self.pos..].chars().next() else {
            return Err(LooseError::new(at, "unterminated string"));
        };
        self.pos += c.len_utf8();

        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            '0' => out.push('\0'),
            'u' => out.push(self.unicode_escape(at)?),
            '\\' | '\'' | '"' | '/' => out.push(c),
            // Unknown escapes are kept as written.
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex4(&mut self, at: usize) -> Result<u32, LooseError> {
        let digits = self
            .src
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| LooseError::new(at, "truncated unicode escape"))?;
        let code = u32::from_str_radix(digits, 16)
            .map_err(|_| LooseError::new(at, "invalid unicode escape"))?;
        self.pos += 4;
        Ok(code)
    }

    fn unicode_escape(&mut self, at: usize) -> Result<char, LooseError> {
        let high = self.hex4(at)?;

        if (0xD800..0xDC00).contains(&high) {
            if self.src[self.pos..].starts_with("\\u") {
                self.pos += 2;
                let low = self.hex4(at)?;
                if (0xDC00..0xE000).contains(&low) {
                    let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(code)
                        .ok_or_else(|| LooseError::new(at, "invalid unicode escape"));
                }
            }
            return Err(LooseError::new(at, "unpaired surrogate in unicode escape"));
        }

        char::from_u32(high).ok_or_else(|| LooseError::new(at, "invalid unicode escape"))
    }

    fn number(&mut self) -> Result<Value, LooseError> {
        let start = self.pos;
        let mut is_float = false;

        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        if self.digits() == 0 {
            return Err(self.unexpected("in number"));
        }
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            if self.digits() == 0 {
                return Err(self.unexpected("after decimal point"));
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.digits() == 0 {
                return Err(self.unexpected("in exponent"));
            }
        }
        if self.peek().is_some_and(is_ident_byte) {
            return Err(self.unexpected("after number"));
        }

        let text = &self.src[start..self.pos];
        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::from(n));
            }
            if let Ok(n) = text.parse::<u64>() {
                return Ok(Value::from(n));
            }
        }

        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LooseError::new(start, format!("number out of range: {text}")))
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn keyword(&mut self) -> Result<Value, LooseError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_byte) {
            self.pos += 1;
        }

        // The whole identifier must match, so `trueish` or `nullable`
        // are errors rather than a keyword followed by junk.
        match &self.src[start..self.pos] {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            word => Err(LooseError::new(start, format!("unknown identifier `{word}`"))),
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// The loose form must produce exactly what serde_json produces for
    /// the JSON-normalized form.
    fn assert_same_as_json(loose: &str, json_text: &str) {
        let expected: Value = serde_json::from_str(json_text).unwrap();
        let actual = decode_loose_list(loose)
            .unwrap_or_else(|e| panic!("failed to parse {loose:?}: {e}"));
        assert_eq!(actual, expected, "input: {loose}");
    }

    #[test]
    fn test_single_quotes_and_bare_tokens_match_json() {
        assert_same_as_json(
            "[{'ach':1,'ass':2,'p':0,'prg':100,'done':true,'old':false,'x':null}]",
            r#"[{"ach":1,"ass":2,"p":0,"prg":100,"done":true,"old":false,"x":null}]"#,
        );
        assert_same_as_json("[]", "[]");
        assert_same_as_json("[ { } , [ ] ]", "[{},[]]");
        assert_same_as_json("[-1, 0.25, -3.5e2, 1E3]", "[-1,0.25,-350.0,1000.0]");
        assert_same_as_json("['it\\'s', \"say \\\"hi\\\"\"]", r#"["it's","say \"hi\""]"#);
    }

    #[test]
    fn test_mixed_quoting_from_server_list() {
        let value = decode_loose_list(
            r#"[{"id":4,"name":'קיווי',"ip":'213.8.147.198',"port":443,"capicity":0.2,"dt":202602231555},{"id":7,"name":'קרמבו ',"safe":true}]"#,
        )
        .unwrap();

        assert_eq!(value[0]["name"], "קיווי");
        assert_eq!(value[0]["port"], 443);
        assert_eq!(value[0]["capicity"], 0.2);
        assert_eq!(value[0]["dt"], 202602231555_i64);
        assert_eq!(value[1]["name"], "קרמבו ");
        assert_eq!(value[1]["safe"], true);
    }

    #[test]
    fn test_tokens_inside_strings_are_untouched() {
        let value = decode_loose_list("['true', 'null_room', \"false\"]").unwrap();
        assert_eq!(value, json!(["true", "null_room", "false"]));
    }

    #[test]
    fn test_trailing_commas_accepted() {
        assert_same_as_json("[1, 2, {'a': 1,},]", r#"[1,2,{"a":1}]"#);
    }

    #[test]
    fn test_unicode_escapes() {
        assert_same_as_json(r"['\u05e7\ud83d\ude00']", r#"["ק😀"]"#);
    }

    #[test]
    fn test_large_integer_stays_integer() {
        let value = decode_loose_list("[18446744073709551615, -9223372036854775808]").unwrap();
        assert_eq!(value[0].as_u64(), Some(u64::MAX));
        assert_eq!(value[1].as_i64(), Some(i64::MIN));
    }

    #[test]
    fn test_identifier_with_keyword_prefix_is_error() {
        let err = decode_loose_list("[trueish]").unwrap_err();
        assert_eq!(err.offset, 1);
        assert!(err.reason.contains("trueish"), "{err}");

        assert!(decode_loose_list("[True]").is_err());
        assert!(decode_loose_list("[nulls]").is_err());
    }

    #[test]
    fn test_bare_keys_are_rejected() {
        let err = decode_loose_list("[{ach:1}]").unwrap_err();
        assert_eq!(err.offset, 2);
        assert!(err.reason.contains("quoted key"), "{err}");
    }

    #[test]
    fn test_unterminated_string_reports_start() {
        let err = decode_loose_list("['abc").unwrap_err();
        assert_eq!(err.offset, 1);
        assert!(err.reason.contains("unterminated"));
    }

    #[test]
    fn test_missing_separator_is_error() {
        let err = decode_loose_list("[1 2]").unwrap_err();
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn test_trailing_garbage_is_error() {
        let err = decode_loose_list("[1] x").unwrap_err();
        assert_eq!(err.offset, 4);
        assert!(err.reason.contains("after the top-level value"));
    }

    #[test]
    fn test_empty_and_truncated_input() {
        assert!(decode_loose_list("").unwrap_err().reason.contains("end of input"));
        assert!(decode_loose_list("[{'a':").is_err());
        assert!(decode_loose_list("[1,").is_err());
        assert!(decode_loose_list("-").is_err());
        assert!(decode_loose_list("1.").is_err());
    }

    #[test]
    fn test_expression_syntax_is_rejected() {
        assert!(decode_loose_list("[1+2]").is_err());
        assert!(decode_loose_list("[(1)]").is_err());
        assert!(decode_loose_list("[f()]").is_err());
        assert!(decode_loose_list("[12abc]").is_err());
    }

    #[test]
    fn test_excessive_nesting_is_error_not_overflow() {
        let deep = "[".repeat(10_000);
        let err = decode_loose_list(&deep).unwrap_err();
        assert!(err.reason.contains("nesting too deep"));
    }
}
