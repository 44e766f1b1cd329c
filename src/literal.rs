//! Header literal decoding.
//!
//! Header values are written as literals: integers, floats, quoted
//! strings and `[..]`, `(..)`, `{..}` collections. This is a closed grammar
//! parser; anything outside it falls back to the raw trimmed text. Braced
//! collections keep their textual element order because several header keys
//! are positionally correlated (`DataTypeName[i]` ↔ `DataTypeID[i]`).

use std::fmt;

/// Collections nested deeper than this are not literals.
pub const MAX_DEPTH: usize = 64;

/// A decoded header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Sequence(Vec<HeaderValue>),
}

impl HeaderValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a sequence; a scalar counts as a one-element sequence.
    pub fn elements(&self) -> &[HeaderValue] {
        match self {
            Self::Sequence(items) => items,
            scalar => std::slice::from_ref(scalar),
        }
    }
}

/// Re-serializes the value as a literal that [`decode`] maps back to it.
impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            // Debug keeps the trailing `.0` and the shortest round-trip digits.
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Decodes one header value. Total: never fails, falls back to `Text`.
pub fn decode(raw: &str) -> HeaderValue {
    let text = raw.trim();
    let mut parser = Parser { src: text, pos: 0 };
    match parser.value(0) {
        Some(value) => {
            parser.skip_ws();
            if parser.at_end() {
                value
            } else {
                HeaderValue::Text(text.to_string())
            }
        }
        None => HeaderValue::Text(text.to_string()),
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn value(&mut self, depth: usize) -> Option<HeaderValue> {
        self.skip_ws();
        match self.peek()? {
            b'[' => self.collection(b'[', b']', depth + 1),
            b'(' => self.collection(b'(', b')', depth + 1),
            b'{' => self.collection(b'{', b'}', depth + 1),
            b'\'' | b'"' => self.string().map(HeaderValue::Text),
            _ => self.number(),
        }
    }

    fn collection(&mut self, open: u8, close: u8, depth: usize) -> Option<HeaderValue> {
        if depth > MAX_DEPTH {
            return None;
        }
        self.pos += 1;
        let mut items = Vec::new();
        let mut saw_comma = false;
        self.skip_ws();
        if self.peek() == Some(close) {
            self.pos += 1;
            // `{}` is an empty mapping, not a collection.
            return (open != b'{').then_some(HeaderValue::Sequence(items));
        }
        loop {
            items.push(self.value(depth)?);
            self.skip_ws();
            match self.peek()? {
                b',' => {
                    saw_comma = true;
                    self.pos += 1;
                    self.skip_ws();
                    if self.peek() == Some(close) {
                        self.pos += 1;
                        break;
                    }
                }
                c if c == close => {
                    self.pos += 1;
                    break;
                }
                _ => return None,
            }
        }
        if open == b'(' && !saw_comma {
            // `(x)` is a parenthesized value, not a tuple.
            return items.pop();
        }
        Some(HeaderValue::Sequence(items))
    }

    fn string(&mut self) -> Option<String> {
        let src = self.src;
        let quote = src.as_bytes()[self.pos];
        self.pos += 1;
        let mut out = String::new();
        let mut chars = src[self.pos..].char_indices();
        while let Some((offset, c)) = chars.next() {
            if c as u32 == u32::from(quote) {
                self.pos += offset + 1;
                return Some(out);
            }
            if c == '\\' {
                let (_, next) = chars.next()?;
                match next {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' | '\'' | '"' => out.push(next),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            } else {
                out.push(c);
            }
        }
        None
    }

    fn number(&mut self) -> Option<HeaderValue> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, b'+' | b'-' | b'.' | b'_') {
                self.pos += 1;
            } else {
                break;
            }
        }
        parse_number(&self.src[start..self.pos])
    }
}

/// Parses an integer or float token; `None` for anything else.
fn parse_number(token: &str) -> Option<HeaderValue> {
    let (negative, body) = match token.as_bytes().first()? {
        b'+' => (false, &token[1..]),
        b'-' => (true, &token[1..]),
        _ => (false, token),
    };
    let sign = if negative { "-" } else { "" };

    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(i) => (&body[..i], Some(&body[i + 1..])),
        None => (body, None),
    };
    let (int_part, frac_part) = match mantissa.find('.') {
        Some(i) => (&mantissa[..i], Some(&mantissa[i + 1..])),
        None => (mantissa, None),
    };

    if frac_part.is_none() && exponent.is_none() {
        let digits = digit_run(int_part)?;
        // Zero-padded integers such as `007` are not literals.
        if digits.len() > 1 && digits.starts_with('0') && digits.bytes().any(|b| b != b'0') {
            return None;
        }
        return Some(match format!("{sign}{digits}").parse::<i64>() {
            Ok(i) => HeaderValue::Integer(i),
            Err(_) => HeaderValue::Float(format!("{sign}{digits}").parse().ok()?),
        });
    }

    let int_digits = if int_part.is_empty() {
        String::new()
    } else {
        digit_run(int_part)?
    };
    let frac_digits = match frac_part {
        Some("") | None => String::new(),
        Some(frac) => digit_run(frac)?,
    };
    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }
    let exp = match exponent {
        Some(e) => {
            let (exp_sign, exp_digits) = match e.as_bytes().first()? {
                b'+' => ("", &e[1..]),
                b'-' => ("-", &e[1..]),
                _ => ("", e),
            };
            format!("{exp_sign}{}", digit_run(exp_digits)?)
        }
        None => "0".to_string(),
    };
    let normalized = format!(
        "{sign}{}.{}e{exp}",
        if int_digits.is_empty() { "0" } else { &int_digits },
        if frac_digits.is_empty() { "0" } else { &frac_digits },
    );
    normalized.parse::<f64>().ok().map(HeaderValue::Float)
}

/// Digits with optional single `_` separators between them, separators removed.
fn digit_run(s: &str) -> Option<String> {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit() || b == b'_') {
        return None;
    }
    Some(s.replace('_', ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::HeaderValue::{Float, Integer, Sequence, Text};

    fn text(s: &str) -> HeaderValue {
        Text(s.to_string())
    }

    #[test]
    fn decodes_numbers() {
        assert_eq!(decode("42"), Integer(42));
        assert_eq!(decode("-7"), Integer(-7));
        assert_eq!(decode("1_000"), Integer(1000));
        assert_eq!(decode("3.25"), Float(3.25));
        assert_eq!(decode("-1.5e-3"), Float(-1.5e-3));
        assert_eq!(decode(".5"), Float(0.5));
        assert_eq!(decode("5."), Float(5.0));
        assert_eq!(decode("2E3"), Float(2000.0));
    }

    #[test]
    fn large_integers_become_floats() {
        assert_eq!(decode("99999999999999999999"), Float(1e20));
    }

    #[test]
    fn names_and_expressions_stay_textual() {
        assert_eq!(decode("inf"), text("inf"));
        assert_eq!(decode("nan"), text("nan"));
        assert_eq!(decode("True"), text("True"));
        assert_eq!(decode("2021-01-28"), text("2021-01-28"));
        assert_eq!(decode("12:34:56"), text("12:34:56"));
        assert_eq!(decode("007"), text("007"));
        assert_eq!(decode("__import__('os')"), text("__import__('os')"));
    }

    #[test]
    fn strips_quotes_from_strings() {
        assert_eq!(decode("\"posVel\""), text("posVel"));
        assert_eq!(decode("'it\\'s'"), text("it's"));
        assert_eq!(decode("  bare words here  "), text("bare words here"));
        assert_eq!(decode("\"a\" \"b\""), text("\"a\" \"b\""));
        assert_eq!(decode("\"unterminated"), text("\"unterminated"));
    }

    #[test]
    fn braced_collections_keep_textual_order() {
        assert_eq!(
            decode("{\"posVel\", \"clock\", \"attitude\"}"),
            Sequence(vec![text("posVel"), text("clock"), text("attitude")])
        );
        assert_eq!(
            decode("{3, 1, 2, 1}"),
            Sequence(vec![Integer(3), Integer(1), Integer(2), Integer(1)])
        );
    }

    #[test]
    fn decodes_lists_tuples_and_nesting() {
        assert_eq!(
            decode("[1, 2.5, 'x']"),
            Sequence(vec![Integer(1), Float(2.5), text("x")])
        );
        assert_eq!(decode("(1,)"), Sequence(vec![Integer(1)]));
        assert_eq!(decode("(1)"), Integer(1));
        assert_eq!(decode("()"), Sequence(vec![]));
        assert_eq!(decode("[]"), Sequence(vec![]));
        assert_eq!(
            decode("[(1, 2), [3]]"),
            Sequence(vec![
                Sequence(vec![Integer(1), Integer(2)]),
                Sequence(vec![Integer(3)])
            ])
        );
    }

    #[test]
    fn mappings_and_bare_elements_fall_back_to_text() {
        assert_eq!(decode("{}"), text("{}"));
        assert_eq!(decode("{'a': 1}"), text("{'a': 1}"));
        assert_eq!(decode("{a, b}"), text("{a, b}"));
        assert_eq!(decode("[1, 2"), text("[1, 2"));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = "[".repeat(100_000);
        assert_eq!(decode(&deep), Text(deep.clone()));

        let closed = format!("{}1{}", "[".repeat(MAX_DEPTH + 1), "]".repeat(MAX_DEPTH + 1));
        assert_eq!(decode(&closed), Text(closed.clone()));

        let mut expected = Integer(1);
        for _ in 0..MAX_DEPTH {
            expected = Sequence(vec![expected]);
        }
        let allowed = format!("{}1{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert_eq!(decode(&allowed), expected);
    }

    #[test]
    fn display_is_decodable() {
        for raw in ["{\"x\", \"y\"}", "[1, -2.0, 'q\"uote']", "1e-7", "-0.0", "((1,),)"] {
            let value = decode(raw);
            assert_eq!(decode(&value.to_string()), value, "{raw}");
        }
    }

    #[test]
    fn scalar_elements_are_singletons() {
        assert_eq!(Integer(3).elements(), &[Integer(3)]);
        assert_eq!(decode("[1, 2]").elements().len(), 2);
    }
}
