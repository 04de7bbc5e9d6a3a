//! Lossless SQL lexer
//!
//! Every byte of the input belongs to exactly one token, including
//! whitespace and comments, so a token stream can be re-emitted verbatim.
//! Keyword recognition is left to the parser: a bare word is just `Word`.

use litedesk_core::ParseError;

/// Quoting style of an identifier token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"name"` (standard)
    Double,
    /// `` `name` `` (MySQL compatibility)
    Backtick,
    /// `[name]` (MSSQL compatibility)
    Bracket,
}

/// The different kinds of tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: identifier or keyword, parser decides.
    Word,
    /// Quoted identifier.
    QuotedIdent(QuoteStyle),
    /// Single-quoted string literal.
    String,
    /// Blob literal `X'...'`.
    Blob,
    /// Numeric literal.
    Number,
    /// Single punctuation character or operator fragment.
    Punct(char),
    /// Run of whitespace.
    Whitespace,
    /// `-- ...` to end of line.
    LineComment,
    /// `/* ... */`.
    BlockComment,
}

impl TokenKind {
    /// Whitespace or comment: skipped by the parser, preserved by
    /// `transform`.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    /// Token kinds that can carry an identifier.
    pub fn is_name(&self) -> bool {
        matches!(self, TokenKind::Word | TokenKind::QuotedIdent(_))
    }
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// The raw source slice, quotes included.
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }

    /// The identifier this token names, quoting stripped and quote
    /// escapes undone. Only meaningful for name-carrying kinds.
    pub fn ident_text(&self, src: &str) -> String {
        let raw = self.text(src);
        match self.kind {
            TokenKind::QuotedIdent(QuoteStyle::Double) => {
                raw[1..raw.len() - 1].replace("\"\"", "\"")
            }
            TokenKind::QuotedIdent(QuoteStyle::Backtick) => {
                raw[1..raw.len() - 1].replace("``", "`")
            }
            TokenKind::QuotedIdent(QuoteStyle::Bracket) => raw[1..raw.len() - 1].to_string(),
            _ => raw.to_string(),
        }
    }

    /// Whether this is a bare word equal to `keyword` (ASCII
    /// case-insensitive).
    pub fn is_kw(&self, src: &str, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text(src).eq_ignore_ascii_case(keyword)
    }
}

/// Compute 1-based line and column of a byte offset.
pub(crate) fn line_col(src: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in src.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// SQL lexer producing the lossless token stream.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Tokenize the entire input.
    pub fn tokenize(src: &'a str) -> Result<Vec<Token>, ParseError> {
        let mut lexer = Lexer::new(src);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> ParseError {
        let (line, column) = line_col(self.src, offset);
        ParseError::new(line, column, message)
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        if start >= bytes.len() {
            return Ok(None);
        }
        let b = bytes[start];

        let kind = if b.is_ascii_whitespace() {
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            TokenKind::Whitespace
        } else if b == b'-' && bytes.get(start + 1) == Some(&b'-') {
            self.pos += 2;
            while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                self.pos += 1;
            }
            TokenKind::LineComment
        } else if b == b'/' && bytes.get(start + 1) == Some(&b'*') {
            self.pos += 2;
            loop {
                if self.pos + 1 >= bytes.len() {
                    return Err(self.error(start, "unterminated block comment"));
                }
                if bytes[self.pos] == b'*' && bytes[self.pos + 1] == b'/' {
                    self.pos += 2;
                    break;
                }
                self.pos += 1;
            }
            TokenKind::BlockComment
        } else if b == b'\'' {
            self.scan_quoted(start, b'\'', "unterminated string literal")?;
            TokenKind::String
        } else if (b == b'x' || b == b'X') && bytes.get(start + 1) == Some(&b'\'') {
            self.pos += 1;
            self.scan_quoted(start + 1, b'\'', "unterminated blob literal")?;
            TokenKind::Blob
        } else if b == b'"' {
            self.scan_quoted(start, b'"', "unterminated quoted identifier")?;
            TokenKind::QuotedIdent(QuoteStyle::Double)
        } else if b == b'`' {
            self.scan_quoted(start, b'`', "unterminated quoted identifier")?;
            TokenKind::QuotedIdent(QuoteStyle::Backtick)
        } else if b == b'[' {
            self.pos += 1;
            while self.pos < bytes.len() && bytes[self.pos] != b']' {
                self.pos += 1;
            }
            if self.pos >= bytes.len() {
                return Err(self.error(start, "unterminated bracketed identifier"));
            }
            self.pos += 1;
            TokenKind::QuotedIdent(QuoteStyle::Bracket)
        } else if b.is_ascii_digit() || (b == b'.' && matches!(bytes.get(start + 1), Some(d) if d.is_ascii_digit()))
        {
            self.scan_number();
            TokenKind::Number
        } else if b == b'_' || b.is_ascii_alphabetic() {
            while self.pos < bytes.len()
                && (bytes[self.pos] == b'_'
                    || bytes[self.pos] == b'$'
                    || bytes[self.pos].is_ascii_alphanumeric())
            {
                self.pos += 1;
            }
            TokenKind::Word
        } else if b.is_ascii() {
            self.pos += 1;
            TokenKind::Punct(b as char)
        } else {
            return Err(self.error(start, format!("unexpected character {:?}", b as char)));
        };

        Ok(Some(Token {
            kind,
            start,
            end: self.pos,
        }))
    }

    /// Scan a quote-delimited region where the quote doubles to escape.
    fn scan_quoted(&mut self, start: usize, quote: u8, err: &str) -> Result<(), ParseError> {
        let bytes = self.src.as_bytes();
        self.pos = start + 1;
        loop {
            if self.pos >= bytes.len() {
                return Err(self.error(start, err));
            }
            if bytes[self.pos] == quote {
                if bytes.get(self.pos + 1) == Some(&quote) {
                    self.pos += 2;
                } else {
                    self.pos += 1;
                    return Ok(());
                }
            } else {
                self.pos += 1;
            }
        }
    }

    fn scan_number(&mut self) {
        let bytes = self.src.as_bytes();
        // Hex literal
        if bytes[self.pos] == b'0'
            && matches!(bytes.get(self.pos + 1), Some(b'x') | Some(b'X'))
            && matches!(bytes.get(self.pos + 2), Some(d) if d.is_ascii_hexdigit())
        {
            self.pos += 2;
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_hexdigit() {
                self.pos += 1;
            }
            return;
        }
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if bytes.get(self.pos) == Some(&b'.') {
            self.pos += 1;
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        if matches!(bytes.get(self.pos), Some(b'e') | Some(b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(bytes.get(self.pos), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            if matches!(bytes.get(self.pos), Some(d) if d.is_ascii_digit()) {
                while self.pos < bytes.len() && bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        Lexer::tokenize(sql)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokens_cover_input() {
        let sql = "CREATE TABLE t (a INT, -- note\n b \"we ird\")";
        let tokens = Lexer::tokenize(sql).unwrap();
        let rebuilt: String = tokens.iter().map(|t| t.text(sql)).collect();
        assert_eq!(rebuilt, sql);
    }

    #[test]
    fn test_quoted_identifier_unescaping() {
        let sql = "\"a\"\"b\" `c``d` [e f]";
        let tokens: Vec<_> = Lexer::tokenize(sql)
            .unwrap()
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .collect();
        assert_eq!(tokens[0].ident_text(sql), "a\"b");
        assert_eq!(tokens[1].ident_text(sql), "c`d");
        assert_eq!(tokens[2].ident_text(sql), "e f");
    }

    #[test]
    fn test_string_with_escaped_quote() {
        let sql = "'o''brien'";
        assert_eq!(kinds(sql), vec![TokenKind::String]);
    }

    #[test]
    fn test_blob_and_numbers() {
        let sql = "X'AB01' 1 2.5 .5 1e3 0x1F";
        let got: Vec<_> = kinds(sql)
            .into_iter()
            .filter(|k| !k.is_trivia())
            .collect();
        assert_eq!(
            got,
            vec![
                TokenKind::Blob,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = Lexer::tokenize("SELECT 'oops").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 8);
    }

    #[test]
    fn test_keyword_detection_is_case_insensitive() {
        let sql = "create";
        let tokens = Lexer::tokenize(sql).unwrap();
        assert!(tokens[0].is_kw(sql, "CREATE"));
    }
}
