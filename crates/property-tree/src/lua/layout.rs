//! Source order recovery for Lua table constructors
//!
//! Lua tables do not remember insertion order, but the tree does. This module
//! scans the source text for the constructor assigned to the root variable
//! and records the order in which its fields were written. The reader uses
//! the result only as a hint: anything the scanner cannot follow (computed
//! keys, tables built by statements, syntax it does not know) simply has no
//! recorded position.

/// How a constructor field was keyed in the source
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldKey {
    /// `name = value` or `['name'] = value`
    Name(String),
    /// `[n] = value` with an integer literal
    Index(i64),
    /// A bare `value`, which takes the next array position
    Positional,
    /// A bracketed key that is not a plain literal
    Unknown,
}

/// Field order of one table constructor
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TableLayout {
    pub(crate) fields: Vec<(FieldKey, Option<TableLayout>)>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Str(String),
    Int(i64),
    Number,
    Punct(&'static str),
    /// A string with an escape this scanner does not decode
    Opaque,
}

/// Layout of the last `root = { ... }` assignment found at statement level
pub(crate) fn scan_root(source: &str, root: &str) -> Option<TableLayout> {
    let tokens = tokenize(source)?;
    let mut depth = 0usize;
    let mut found = None;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Punct("{") | Token::Punct("(") | Token::Punct("[") => depth += 1,
            Token::Punct("}") | Token::Punct(")") | Token::Punct("]") => {
                depth = depth.saturating_sub(1)
            }
            Token::Name(name) if depth == 0 && name == root => {
                let qualified = match i.checked_sub(1).map(|prev| &tokens[prev]) {
                    Some(Token::Punct(".")) | Some(Token::Punct(":")) => true,
                    Some(Token::Name(keyword)) => keyword == "local",
                    _ => false,
                };
                let assigns_table = matches!(tokens.get(i + 1), Some(Token::Punct("=")))
                    && matches!(tokens.get(i + 2), Some(Token::Punct("{")));
                if !qualified && assigns_table {
                    found = Some(i + 2);
                }
            }
            _ => {}
        }
    }

    let start = found?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: start,
    };
    parser.table()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn is_punct(&self, offset: usize, punct: &str) -> bool {
        matches!(self.peek_at(offset), Some(Token::Punct(p)) if *p == punct)
    }

    /// Parse a constructor starting at `{`, leaving the position after `}`
    fn table(&mut self) -> Option<TableLayout> {
        if !self.is_punct(0, "{") {
            return None;
        }
        self.pos += 1;
        let mut layout = TableLayout::default();

        loop {
            if self.is_punct(0, "}") {
                self.pos += 1;
                return Some(layout);
            }

            let key = if self.is_punct(0, "[") {
                let key = match (self.peek_at(1), self.is_punct(2, "]")) {
                    (Some(Token::Str(s)), true) => FieldKey::Name(s.clone()),
                    (Some(Token::Int(n)), true) => FieldKey::Index(*n),
                    _ => FieldKey::Unknown,
                };
                self.skip_balanced("[", "]")?;
                if !self.is_punct(0, "=") {
                    return None;
                }
                self.pos += 1;
                key
            } else if let (Some(Token::Name(name)), true) = (self.peek(), self.is_punct(1, "=")) {
                let key = FieldKey::Name(name.clone());
                self.pos += 2;
                key
            } else {
                FieldKey::Positional
            };

            let nested = self.value()?;
            layout.fields.push((key, nested));

            if self.is_punct(0, ",") || self.is_punct(0, ";") {
                self.pos += 1;
            } else if !self.is_punct(0, "}") {
                return None;
            }
        }
    }

    /// Skip one field value, returning its layout if it is a bare constructor
    fn value(&mut self) -> Option<Option<TableLayout>> {
        if self.is_punct(0, "{") {
            let start = self.pos;
            let nested = self.table()?;
            if self.at_field_end() {
                return Some(Some(nested));
            }
            // the constructor is only part of an expression
            self.pos = start;
        }

        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Punct("{") | Token::Punct("(") | Token::Punct("[") => depth += 1,
                Token::Punct("}") | Token::Punct(")") | Token::Punct("]") if depth > 0 => {
                    depth -= 1
                }
                Token::Punct("}") | Token::Punct(",") | Token::Punct(";") if depth == 0 => {
                    return Some(None)
                }
                _ => {}
            }
            self.pos += 1;
        }
        None
    }

    fn at_field_end(&self) -> bool {
        self.is_punct(0, ",") || self.is_punct(0, ";") || self.is_punct(0, "}")
    }

    fn skip_balanced(&mut self, open: &str, close: &str) -> Option<()> {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if matches!(token, Token::Punct(p) if *p == open) {
                depth += 1;
            } else if matches!(token, Token::Punct(p) if *p == close) {
                depth -= 1;
                if depth == 0 {
                    self.pos += 1;
                    return Some(());
                }
            }
            self.pos += 1;
        }
        None
    }
}

const PUNCTS: [&str; 27] = [
    "...", "..", "==", "~=", "<=", ">=", "<<", ">>", "//", "::", "{", "}", "(", ")", "[", "]",
    "=", ",", ";", ".", ":", "+", "-", "*", "/", "%", "#",
];

const SINGLE_PUNCTS: [&str; 6] = ["^", "&", "~", "|", "<", ">"];

fn tokenize(source: &str) -> Option<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if source[i..].starts_with("--") {
            i += 2;
            if let Some(level) = long_bracket_level(&bytes[i..]) {
                i = skip_long_bracket(source, i, level)?;
            } else {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
        } else if c == b'[' && long_bracket_level(&bytes[i..]).is_some() {
            let level = long_bracket_level(&bytes[i..])?;
            let end = skip_long_bracket(source, i, level)?;
            let open = level + 2;
            let mut body = &source[i + open..end - open];
            // a newline right after the opening bracket is not part of the string
            if let Some(stripped) = body.strip_prefix("\r\n").or_else(|| body.strip_prefix('\n')) {
                body = stripped;
            }
            tokens.push(Token::Str(body.to_string()));
            i = end;
        } else if c == b'\'' || c == b'"' {
            let (token, end) = quoted(source, i)?;
            tokens.push(token);
            i = end;
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Name(source[start..i].to_string()));
        } else if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            let start = i;
            while i < bytes.len() {
                let b = bytes[i];
                let exponent_sign = (b == b'+' || b == b'-')
                    && matches!(bytes[i - 1], b'e' | b'E' | b'p' | b'P')
                    && !source[start..].starts_with("0x");
                if b.is_ascii_alphanumeric() || b == b'.' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(number(&source[start..i]));
        } else if let Some(punct) = PUNCTS
            .iter()
            .chain(SINGLE_PUNCTS.iter())
            .find(|p| source[i..].starts_with(**p))
        {
            tokens.push(Token::Punct(*punct));
            i += punct.len();
        } else {
            // non-ASCII outside strings is not Lua source we can follow
            return None;
        }
    }
    Some(tokens)
}

fn number(text: &str) -> Token {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => text.parse::<i64>().ok(),
    };
    parsed.map_or(Token::Number, Token::Int)
}

/// Level of a long bracket `[==[` at the start of `bytes`
fn long_bracket_level(bytes: &[u8]) -> Option<usize> {
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let level = bytes[1..].iter().take_while(|b| **b == b'=').count();
    (bytes.get(level + 1) == Some(&b'[')).then_some(level)
}

/// Position just past the long bracket opened at `start`
fn skip_long_bracket(source: &str, start: usize, level: usize) -> Option<usize> {
    let close = format!("]{}]", "=".repeat(level));
    let body_start = start + level + 2;
    source[body_start..]
        .find(&close)
        .map(|offset| body_start + offset + close.len())
}

/// A quoted string starting at `start`, with the position after it
fn quoted(source: &str, start: usize) -> Option<(Token, usize)> {
    let quote = source[start..].chars().next()?;
    let mut bytes = Vec::new();
    let mut decodable = true;
    let mut chars = source[start + 1..].char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c == quote => {
                let end = start + 1 + offset + c.len_utf8();
                let token = match String::from_utf8(bytes) {
                    Ok(text) if decodable => Token::Str(text),
                    _ => Token::Opaque,
                };
                return Some((token, end));
            }
            '\n' => return None,
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => bytes.push(b'\n'),
                    't' => bytes.push(b'\t'),
                    'r' => bytes.push(b'\r'),
                    'a' => bytes.push(0x07),
                    'b' => bytes.push(0x08),
                    'f' => bytes.push(0x0c),
                    'v' => bytes.push(0x0b),
                    '\\' | '\'' | '"' | '\n' => push_char(&mut bytes, escaped),
                    '\r' => {
                        chars.next_if(|(_, c)| *c == '\n');
                        bytes.push(b'\n');
                    }
                    'z' => while chars.next_if(|(_, c)| c.is_ascii_whitespace()).is_some() {},
                    'x' => {
                        let mut hex = String::new();
                        while hex.len() < 2 {
                            match chars.next_if(|(_, c)| c.is_ascii_hexdigit()) {
                                Some((_, digit)) => hex.push(digit),
                                None => break,
                            }
                        }
                        match u8::from_str_radix(&hex, 16) {
                            Ok(byte) if hex.len() == 2 => bytes.push(byte),
                            _ => decodable = false,
                        }
                    }
                    'u' => {
                        let mut hex = String::new();
                        let opened = chars.next_if(|(_, c)| *c == '{').is_some();
                        while let Some((_, digit)) = chars.next_if(|(_, c)| c.is_ascii_hexdigit()) {
                            hex.push(digit);
                        }
                        let closed = opened && chars.next_if(|(_, c)| *c == '}').is_some();
                        let code = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
                        match code {
                            Some(code) if closed => push_char(&mut bytes, code),
                            _ => decodable = false,
                        }
                    }
                    first if first.is_ascii_digit() => {
                        // up to three decimal digits
                        let mut value = digit_value(first);
                        for _ in 0..2 {
                            match chars.next_if(|(_, c)| c.is_ascii_digit()) {
                                Some((_, digit)) => value = value * 10 + digit_value(digit),
                                None => break,
                            }
                        }
                        match u8::try_from(value) {
                            Ok(byte) => bytes.push(byte),
                            Err(_) => decodable = false,
                        }
                    }
                    _ => decodable = false,
                }
            }
            c => push_char(&mut bytes, c),
        }
    }
    None
}

fn push_char(bytes: &mut Vec<u8>, c: char) {
    let mut buf = [0; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

fn digit_value(digit: char) -> u32 {
    u32::from(digit) - u32::from('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(layout: &TableLayout) -> Vec<FieldKey> {
        layout.fields.iter().map(|(key, _)| key.clone()).collect()
    }

    #[test]
    fn test_scan_written_form() {
        let source = "root = {\n    ['b'] = 'x',\n    'first',\n    ['a'] = {\n        ['z'] = '1',\n    },\n}\n";
        let layout = scan_root(source, "root").unwrap();
        assert_eq!(
            names(&layout),
            vec![
                FieldKey::Name("b".into()),
                FieldKey::Positional,
                FieldKey::Name("a".into())
            ]
        );
        let nested = layout.fields[2].1.as_ref().unwrap();
        assert_eq!(names(nested), vec![FieldKey::Name("z".into())]);
    }

    #[test]
    fn test_scan_plain_lua_syntax() {
        let source = r#"
            -- settings
            local helper = { ignored = true }
            root = { zeta = 1 + 2; alpha = "two", [3] = f(x, y), [k] = 4, { nested = [[long]] } }
        "#;
        let layout = scan_root(source, "root").unwrap();
        assert_eq!(
            names(&layout),
            vec![
                FieldKey::Name("zeta".into()),
                FieldKey::Name("alpha".into()),
                FieldKey::Index(3),
                FieldKey::Unknown,
                FieldKey::Positional
            ]
        );
        assert!(layout.fields[4].1.is_some());
    }

    #[test]
    fn test_last_assignment_wins() {
        let source = "root = { a = 1 }\nroot = { b = 2 }";
        let layout = scan_root(source, "root").unwrap();
        assert_eq!(names(&layout), vec![FieldKey::Name("b".into())]);
    }

    #[test]
    fn test_field_access_is_not_an_assignment() {
        let source = "other = {}\nother.root = { a = 1 }";
        assert!(scan_root(source, "root").is_none());
    }

    #[test]
    fn test_escaped_keys_are_decoded() {
        let source = r"root = { ['it\'s'] = 'x', ['line\nbreak'] = 'y' }";
        let layout = scan_root(source, "root").unwrap();
        assert_eq!(
            names(&layout),
            vec![
                FieldKey::Name("it's".into()),
                FieldKey::Name("line\nbreak".into())
            ]
        );
    }

    #[test]
    fn test_constructor_inside_expression_has_no_layout() {
        let source = "root = { a = setmetatable({ x = 1 }, {}), b = { y = 2 } }";
        let layout = scan_root(source, "root").unwrap();
        assert!(layout.fields[0].1.is_none());
        assert!(layout.fields[1].1.is_some());
    }

    #[test]
    fn test_numeric_and_unicode_escapes_are_decoded() {
        let source = "root = { ['a\\000b'] = 1, ['\\65\\066c'] = 2, ['\\x41\\u{48}'] = 3, \
                      ['x\\z\n   y'] = 4, ['n\\0007'] = 5, ['bad\\xZ'] = 6 }";
        let layout = scan_root(source, "root").unwrap();
        assert_eq!(
            names(&layout),
            vec![
                FieldKey::Name("a\0b".into()),
                FieldKey::Name("ABc".into()),
                FieldKey::Name("AH".into()),
                FieldKey::Name("xy".into()),
                FieldKey::Name("n\u{0}7".into()),
                FieldKey::Unknown
            ]
        );
    }
}
