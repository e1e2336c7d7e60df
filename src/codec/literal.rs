//! Structured payload text parser.
//!
//! Controllers send small mappings as literal text, e.g.
//! `{'fresh': True, 'clock_terminal': '/Dev1/PFI0', 'ao_channels': 'Dev1/ao0:1'}`.
//! The accepted grammar is the literal subset shared by Python `repr()` and
//! JSON:
//!
//! ```text
//! value  := dict | list | tuple | string | number | const
//! dict   := '{' [ string ':' value { ',' string ':' value } [','] ] '}'
//! list   := '[' [ value { ',' value } [','] ] ']'
//! tuple  := '(' [ value { ',' value } [','] ] ')'
//! string := ['u'|'U'] ( '...' | "..." )
//! number := ['-'|'+'] digits ['.' digits] [('e'|'E') ['-'|'+'] digits] ['L']
//! const  := True | False | None | true | false | null
//! ```
//!
//! Anything else is rejected; nothing is ever evaluated.

use serde_json::{Map, Number, Value};

use crate::error::{BridgeError, Result};

/// Nesting limit for dicts/lists/tuples.
const MAX_DEPTH: usize = 32;

/// Parse literal text into a JSON value.
///
/// ```
/// use daq_bridge::codec::parse_literal;
///
/// let value = parse_literal("{'abort': False, 'more_reps': True}").unwrap();
/// assert_eq!(value["abort"], false);
/// assert_eq!(value["more_reps"], true);
/// ```
pub fn parse_literal(text: &str) -> Result<Value> {
    let mut parser = Parser::new(text);
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();
    if parser.pos < parser.src.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            src: text.as_bytes(),
            text,
            pos: 0,
        }
    }

    fn error(&self, what: &str) -> BridgeError {
        BridgeError::MalformedFrame(format!("{} at offset {}", what, self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'{') => self.parse_dict(depth),
            Some(b'[') => self.parse_sequence(b']', depth),
            Some(b'(') => self.parse_sequence(b')', depth),
            Some(b'\'') | Some(b'"') => self.parse_string().map(Value::String),
            Some(b'u') | Some(b'U') if matches!(self.peek_at(1), Some(b'\'') | Some(b'"')) => {
                self.pos += 1;
                self.parse_string().map(Value::String)
            }
            Some(ch) if ch == b'-' || ch == b'+' || ch == b'.' || ch.is_ascii_digit() => {
                self.parse_number()
            }
            Some(ch) if ch.is_ascii_alphabetic() => self.parse_constant(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    fn parse_dict(&mut self, depth: usize) -> Result<Value> {
        self.expect(b'{')?;
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = match self.parse_value(depth + 1)? {
                Value::String(key) => key,
                _ => return Err(self.error("dict keys must be strings")),
            };
            self.expect(b':')?;
            let value = self.parse_value(depth + 1)?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_sequence(&mut self, close: u8, depth: usize) -> Result<Value> {
        // opening bracket
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.parse_value(depth + 1)?);

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(ch) if ch == close => {}
                _ => return Err(self.error(&format!("expected ',' or '{}'", close as char))),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        let quote = self.src[self.pos];
        self.pos += 1;
        let mut out = String::new();
        let mut run_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some(ch) if ch == quote => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    self.parse_escape(&mut out)?;
                    run_start = self.pos;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<()> {
        let ch = self.peek().ok_or_else(|| self.error("unterminated escape"))?;
        self.pos += 1;
        match ch {
            b'\\' => out.push('\\'),
            b'\'' => out.push('\''),
            b'"' => out.push('"'),
            b'/' => out.push('/'),
            b'n' => out.push('\n'),
            b't' => out.push('\t'),
            b'r' => out.push('\r'),
            b'b' => out.push('\u{8}'),
            b'f' => out.push('\u{c}'),
            b'0' => out.push('\0'),
            b'x' => out.push(self.parse_hex_char(2)?),
            b'u' => out.push(self.parse_hex_char(4)?),
            b'U' => out.push(self.parse_hex_char(8)?),
            _ => return Err(self.error("unknown escape")),
        }
        Ok(())
    }

    fn parse_hex_char(&mut self, digits: usize) -> Result<char> {
        let end = self.pos + digits;
        let hex = self
            .text
            .get(self.pos..end)
            .ok_or_else(|| self.error("truncated escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("bad hex escape"))?;
        let ch = char::from_u32(code).ok_or_else(|| self.error("invalid code point"))?;
        self.pos = end;
        Ok(ch)
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-') | Some(b'+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(ch) = self.peek() {
            match ch {
                b'0'..=b'9' => self.pos += 1,
                b'.' => {
                    is_float = true;
                    self.pos += 1;
                }
                b'e' | b'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some(b'-') | Some(b'+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let literal = self.text[start..self.pos].trim_start_matches('+');

        // Python 2 long suffix
        if !is_float && matches!(self.peek(), Some(b'L') | Some(b'l')) {
            self.pos += 1;
        }

        if !is_float {
            if let Ok(v) = literal.parse::<i64>() {
                return Ok(Value::Number(v.into()));
            }
        }
        let v: f64 = literal
            .parse()
            .map_err(|_| self.error(&format!("invalid number '{}'", literal)))?;
        Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| self.error("non-finite number"))
    }

    fn parse_constant(&mut self) -> Result<Value> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        match &self.text[start..self.pos] {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            word => {
                self.pos = start;
                Err(self.error(&format!("unknown identifier '{}'", word)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_python_dict() {
        let value = parse_literal(
            "{'fresh': True, 'clock_terminal': '/Dev1/PFI0', 'ao_channels': 'Dev1/ao0:1'}",
        )
        .unwrap();
        assert_eq!(
            value,
            json!({"fresh": true, "clock_terminal": "/Dev1/PFI0", "ao_channels": "Dev1/ao0:1"})
        );
    }

    #[test]
    fn test_json_object() {
        let value = parse_literal(r#"{"more_reps": false, "abort": true}"#).unwrap();
        assert_eq!(value, json!({"more_reps": false, "abort": true}));
    }

    #[test]
    fn test_numbers() {
        let value =
            parse_literal("{'a': 1, 'b': -2.5, 'c': 1e3, 'd': +4, 'e': 10L, 'f': .5}").unwrap();
        assert_eq!(value["a"], json!(1));
        assert_eq!(value["b"], json!(-2.5));
        assert_eq!(value["c"], json!(1000.0));
        assert_eq!(value["d"], json!(4));
        assert_eq!(value["e"], json!(10));
        assert_eq!(value["f"], json!(0.5));
    }

    #[test]
    fn test_unicode_prefix_and_escapes() {
        let value = parse_literal(r#"{u'name': u'Dev\x31', 'q': 'it\'s', "u": "é"}"#).unwrap();
        assert_eq!(value["name"], "Dev1");
        assert_eq!(value["q"], "it's");
        assert_eq!(value["u"], "é");
    }

    #[test]
    fn test_lists_tuples_and_none() {
        let value = parse_literal("{'ch': ['ao0', 'ao1',], 't': (1, 2), 'n': None}").unwrap();
        assert_eq!(value["ch"], json!(["ao0", "ao1"]));
        assert_eq!(value["t"], json!([1, 2]));
        assert_eq!(value["n"], Value::Null);
    }

    #[test]
    fn test_whitespace_tolerated() {
        let value = parse_literal("  {\n 'a' :\t1 ,\r\n}  ").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_rejects_code() {
        for text in [
            "__import__('os').system('rm -rf /')",
            "{'a': open('x')}",
            "{'a': 1 + 2}",
            "lambda: 0",
        ] {
            assert!(
                matches!(parse_literal(text), Err(BridgeError::MalformedFrame(_))),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_rejects_malformed() {
        for text in [
            "",
            "{",
            "{'a' 1}",
            "{'a': 1",
            "{1: 2}",
            "'unterminated",
            "{'a': 1} extra",
            "{'a': nan}",
            "[1 2]",
        ] {
            assert!(parse_literal(text).is_err(), "accepted {:?}", text);
        }
    }

    #[test]
    fn test_depth_limit() {
        let deep = "[".repeat(MAX_DEPTH + 2) + &"]".repeat(MAX_DEPTH + 2);
        assert!(parse_literal(&deep).is_err());

        let ok = "[".repeat(4) + &"]".repeat(4);
        assert!(parse_literal(&ok).is_ok());
    }
}
