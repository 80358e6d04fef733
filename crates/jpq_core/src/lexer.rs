//! Character cursor for JSONPath expressions
//!
//! The grammar is context-sensitive (a dot-name swallows characters like
//! `*`, `+`, and `:` that are operators elsewhere), so instead of a flat
//! token stream this exposes reading primitives that the parser drives.
//! Positions are character offsets into the original input.

/// Characters a dot-name element cannot contain unescaped.
///
/// A backslash escapes any of these (and itself); everything else,
/// including `] ' " @ $ * : , + - & | /`, is an ordinary name character.
fn is_name_special(c: char) -> bool {
    matches!(
        c,
        '.' | '[' | '(' | ')' | '=' | '!' | '>' | '<' | '\\' | ' ' | '\t' | '\r' | '\n'
    )
}

/// Valid characters of a `.name()` function identifier
pub(crate) fn is_function_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub(crate) struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    /// Consume `c` if it is next
    pub fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the two-character sequence `a` `b` if it is next
    pub fn eat2(&mut self, a: char, b: char) -> bool {
        if self.peek() == Some(a) && self.peek_at(1) == Some(b) {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    /// Skip spaces and tabs. CR and LF are not whitespace in this grammar
    /// and must be rejected by the caller wherever they appear.
    pub fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.pos += 1;
        }
    }

    /// Remaining input from the given position, for `near` error fields
    pub fn rest_from(&self, pos: usize) -> String {
        self.chars[pos.min(self.chars.len())..].iter().collect()
    }

    /// Source substring between two positions, for segment texts
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    /// Read a dot-name: one or more elements, where an element is an
    /// escaped special character or a plain non-special character.
    ///
    /// Stops (without consuming) at the first special character or at a
    /// backslash with an invalid escape; returns `None` if no element was
    /// read at all.
    pub fn read_name(&mut self) -> Option<String> {
        let mut name = String::new();
        loop {
            match self.peek() {
                Some('\\') => match self.peek_at(1) {
                    Some(c) if is_name_special(c) => {
                        self.pos += 2;
                        name.push(c);
                    }
                    _ => break,
                },
                Some(c) if !is_name_special(c) => {
                    self.pos += 1;
                    name.push(c);
                }
                _ => break,
            }
        }
        if name.is_empty() { None } else { Some(name) }
    }

    /// Read a quoted bracket name, cursor on the opening quote.
    ///
    /// Only `\'`, `\"`, and `\\` are valid escapes; anything else,
    /// including an unterminated string, returns `None`.
    pub fn read_bracket_string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Some(value),
                Some('\\') => match self.bump() {
                    Some(c @ ('\'' | '"' | '\\')) => value.push(c),
                    _ => return None,
                },
                Some(c) => value.push(c),
                None => return None,
            }
        }
    }

    /// Read a quoted string literal inside a filter, cursor on the quote.
    ///
    /// Unlike bracket names, a backslash before any character yields that
    /// character (`'a\b'` is the string `ab`).
    pub fn read_literal_string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Some(value),
                Some('\\') => value.push(self.bump()?),
                Some(c) => value.push(c),
                None => return None,
            }
        }
    }

    /// Read a number-shaped token for a filter literal: sign, digits,
    /// dots, exponents, and any trailing alphanumerics so that malformed
    /// input like `1e1abc` is captured whole and rejected by the float
    /// parser rather than the grammar.
    pub fn read_number_token(&mut self) -> Option<String> {
        let mut token = String::new();
        if matches!(self.peek(), Some('+') | Some('-')) {
            token.push(self.bump()?);
        }
        let mut prev_exp = false;
        while let Some(c) = self.peek() {
            let take = c.is_ascii_alphanumeric()
                || c == '.'
                || ((c == '+' || c == '-') && prev_exp);
            if !take {
                break;
            }
            self.pos += 1;
            token.push(c);
            prev_exp = c == 'e' || c == 'E';
        }
        if token.is_empty() || token == "+" || token == "-" {
            None
        } else {
            Some(token)
        }
    }

    /// Read a signed integer token (optional `+`/`-`, then digits, leading
    /// zeros allowed) for indexes and slice bounds. Conversion and range
    /// checking happen later, once the bracket's shape is validated.
    pub fn read_int_token(&mut self) -> Option<String> {
        let start = self.pos;
        let mut token = String::new();
        if matches!(self.peek(), Some('+') | Some('-')) {
            token.push(self.bump()?);
        }
        let mut digits = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
                token.push(c);
                digits = true;
            } else {
                break;
            }
        }
        if digits {
            Some(token)
        } else {
            self.pos = start;
            None
        }
    }

    /// Read a `/pattern/` regex literal, cursor on the opening slash.
    ///
    /// `\/` yields a literal slash; any other backslash pair passes
    /// through to the pattern untouched. Empty and unterminated patterns
    /// return `None`.
    pub fn read_regex_literal(&mut self) -> Option<String> {
        if !self.eat('/') {
            return None;
        }
        let mut pattern = String::new();
        loop {
            match self.bump() {
                Some('/') => {
                    return if pattern.is_empty() { None } else { Some(pattern) };
                }
                Some('\\') => match self.bump() {
                    Some('/') => pattern.push('/'),
                    Some(c) => {
                        pattern.push('\\');
                        pattern.push(c);
                    }
                    None => return None,
                },
                Some(c) => pattern.push(c),
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_plain_name() {
        let mut lexer = Lexer::new("abc.def");
        assert_eq!(lexer.read_name(), Some("abc".to_string()));
        assert_eq!(lexer.peek(), Some('.'));
    }

    #[test]
    fn test_name_keeps_operator_like_characters() {
        // `*`, `+`, `:`, `$`, `@` are ordinary name characters
        let mut lexer = Lexer::new("a+10==20");
        assert_eq!(lexer.read_name(), Some("a+10".to_string()));
        assert_eq!(lexer.pos(), 4);

        let mut lexer = Lexer::new("a:b");
        assert_eq!(lexer.read_name(), Some("a:b".to_string()));
    }

    #[test]
    fn test_name_escapes() {
        let mut lexer = Lexer::new(r"a\.b");
        assert_eq!(lexer.read_name(), Some("a.b".to_string()));

        let mut lexer = Lexer::new(r"\\");
        assert_eq!(lexer.read_name(), Some("\\".to_string()));

        let mut lexer = Lexer::new(r"\ ");
        assert_eq!(lexer.read_name(), Some(" ".to_string()));
    }

    #[test]
    fn test_name_stops_at_invalid_escape() {
        let mut lexer = Lexer::new(r"a\zb");
        assert_eq!(lexer.read_name(), Some("a".to_string()));
        assert_eq!(lexer.peek(), Some('\\'));

        let mut lexer = Lexer::new(r"\z");
        assert_eq!(lexer.read_name(), None);
    }

    #[test]
    fn test_bracket_string_escapes() {
        let mut lexer = Lexer::new(r"'a\'b'");
        assert_eq!(lexer.read_bracket_string(), Some("a'b".to_string()));

        // only quote and backslash escapes are valid in bracket names
        let mut lexer = Lexer::new(r"'a\cb'");
        assert_eq!(lexer.read_bracket_string(), None);

        let mut lexer = Lexer::new("'unterminated");
        assert_eq!(lexer.read_bracket_string(), None);
    }

    #[test]
    fn test_literal_string_drops_any_backslash() {
        let mut lexer = Lexer::new(r"'a\b'");
        assert_eq!(lexer.read_literal_string(), Some("ab".to_string()));

        let mut lexer = Lexer::new(r#""a\"b""#);
        assert_eq!(lexer.read_literal_string(), Some("a\"b".to_string()));
    }

    #[test]
    fn test_number_token_captures_malformed_tail() {
        let mut lexer = Lexer::new("1e1abc)]");
        assert_eq!(lexer.read_number_token(), Some("1e1abc".to_string()));
        assert_eq!(lexer.peek(), Some(')'));
    }

    #[test]
    fn test_number_token_exponent_sign() {
        let mut lexer = Lexer::new("+0.123e+2)");
        assert_eq!(lexer.read_number_token(), Some("+0.123e+2".to_string()));
    }

    #[test]
    fn test_int_token() {
        let mut lexer = Lexer::new("+01:");
        assert_eq!(lexer.read_int_token(), Some("+01".to_string()));
        assert_eq!(lexer.peek(), Some(':'));

        let mut lexer = Lexer::new("-a");
        assert_eq!(lexer.read_int_token(), None);
        assert_eq!(lexer.pos(), 0);
    }

    #[test]
    fn test_regex_literal() {
        let mut lexer = Lexer::new(r"/ab/");
        assert_eq!(lexer.read_regex_literal(), Some("ab".to_string()));

        let mut lexer = Lexer::new(r"/^\d+[a-d]\/\\$/");
        assert_eq!(
            lexer.read_regex_literal(),
            Some(r"^\d+[a-d]/\\$".to_string())
        );

        let mut lexer = Lexer::new("//");
        assert_eq!(lexer.read_regex_literal(), None);

        let mut lexer = Lexer::new("/abc");
        assert_eq!(lexer.read_regex_literal(), None);
    }

    #[test]
    fn test_skip_blanks_excludes_newlines() {
        let mut lexer = Lexer::new(" \t\n");
        lexer.skip_blanks();
        assert_eq!(lexer.peek(), Some('\n'));
    }
}
