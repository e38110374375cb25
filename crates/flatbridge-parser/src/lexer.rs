//! Lexer for annotated declaration files.
//!
//! Produces a flat token stream for the parser. `//` comments are not tokens;
//! they are collected on the side, keyed by line, so the parser can pick up
//! the documentation block sitting directly above a marker. Preprocessor lines
//! and ordinary block comments are skipped.

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::CharIndices;

/// Opening of the structured-comment marker: `/*--abi(`.
pub const MARKER_OPEN: &str = "/*--abi(";
/// Closing of the structured-comment marker: `)--*/`.
pub const MARKER_CLOSE: &str = ")--*/";

/// Token kinds for declaration files.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(String),
    StringLiteral(String),
    /// `/*--abi(...)--*/`, holding the text between the parentheses.
    Marker(String),

    // Keywords
    Class,
    Struct,
    Typedef,
    Static,
    Virtual,
    Const,
    Public,
    Protected,
    Private,
    Namespace,

    // Punctuation
    LParen,     // (
    RParen,     // )
    LBrace,     // {
    RBrace,     // }
    LAngle,     // <
    RAngle,     // >
    LBracket,   // [
    RBracket,   // ]
    Comma,      // ,
    Semicolon,  // ;
    Colon,      // :
    ColonColon, // ::
    Amp,        // &
    Star,       // *
    Eq,         // =
    Tilde,      // ~

    Eof,
}

impl TokenKind {
    /// Identifier-like tokens need a space between them when re-rendered.
    pub fn is_word(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::Number(_)
                | TokenKind::Class
                | TokenKind::Struct
                | TokenKind::Typedef
                | TokenKind::Static
                | TokenKind::Virtual
                | TokenKind::Const
                | TokenKind::Public
                | TokenKind::Protected
                | TokenKind::Private
                | TokenKind::Namespace
        )
    }

    /// Source spelling, used to rebuild type strings from tokens.
    pub fn text(&self) -> String {
        match self {
            TokenKind::Ident(s) | TokenKind::Number(s) => s.clone(),
            TokenKind::StringLiteral(s) => format!("\"{s}\""),
            TokenKind::Marker(s) => format!("{MARKER_OPEN}{s}{MARKER_CLOSE}"),
            TokenKind::Class => "class".to_string(),
            TokenKind::Struct => "struct".to_string(),
            TokenKind::Typedef => "typedef".to_string(),
            TokenKind::Static => "static".to_string(),
            TokenKind::Virtual => "virtual".to_string(),
            TokenKind::Const => "const".to_string(),
            TokenKind::Public => "public".to_string(),
            TokenKind::Protected => "protected".to_string(),
            TokenKind::Private => "private".to_string(),
            TokenKind::Namespace => "namespace".to_string(),
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
            TokenKind::LBrace => "{".to_string(),
            TokenKind::RBrace => "}".to_string(),
            TokenKind::LAngle => "<".to_string(),
            TokenKind::RAngle => ">".to_string(),
            TokenKind::LBracket => "[".to_string(),
            TokenKind::RBracket => "]".to_string(),
            TokenKind::Comma => ",".to_string(),
            TokenKind::Semicolon => ";".to_string(),
            TokenKind::Colon => ":".to_string(),
            TokenKind::ColonColon => "::".to_string(),
            TokenKind::Amp => "&".to_string(),
            TokenKind::Star => "*".to_string(),
            TokenKind::Eq => "=".to_string(),
            TokenKind::Tilde => "~".to_string(),
            TokenKind::Eof => String::new(),
        }
    }
}

/// A token with its byte range and 1-based line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, end: usize, line: usize) -> Self {
        Self {
            kind,
            start,
            end,
            line,
        }
    }
}

/// A `//` comment that is the only thing on its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLine {
    pub line: usize,
    pub text: String,
}

/// Everything the lexer produces for one file.
#[derive(Debug, Clone)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: BTreeMap<usize, CommentLine>,
}

/// Lexer for declaration files.
pub struct Lexer<'src> {
    src: &'src str,
    chars: Peekable<CharIndices<'src>>,
    pos: usize,
    line: usize,
    /// Line of the most recent token, to tell trailing comments apart.
    last_token_line: usize,
    comments: BTreeMap<usize, CommentLine>,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            pos: 0,
            line: 1,
            last_token_line: 0,
            comments: BTreeMap::new(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((pos, ch)) = self.chars.next() {
            self.pos = pos + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
            }
            Some(ch)
        } else {
            None
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn at_line_start(&self, start: usize) -> bool {
        self.src[..start]
            .rsplit('\n')
            .next()
            .is_some_and(|prefix| prefix.trim().is_empty())
    }

    fn read_line_comment(&mut self, start: usize) {
        let line = self.line;
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
        if self.last_token_line != line {
            let text = self.src[start + 2..self.pos].to_string();
            self.comments.insert(line, CommentLine { line, text });
        }
    }

    fn skip_block_comment(&mut self) {
        loop {
            match self.advance() {
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    break;
                }
                None => break,
                _ => {}
            }
        }
    }

    /// Consume through the end of a marker, returning its attribute text.
    fn read_marker(&mut self, start: usize) -> Option<String> {
        let rest = &self.src[start..];
        if !rest.starts_with(MARKER_OPEN) {
            return None;
        }
        let close = rest.find(MARKER_CLOSE)?;
        let inner = rest[MARKER_OPEN.len()..close].to_string();
        let end = start + close + MARKER_CLOSE.len();
        while self.pos < end {
            if self.advance().is_none() {
                break;
            }
        }
        Some(inner)
    }

    fn skip_preprocessor(&mut self) {
        let mut continued = false;
        while let Some(ch) = self.peek() {
            if ch == '\n' && !continued {
                break;
            }
            continued = ch == '\\' || (continued && ch.is_whitespace() && ch != '\n');
            self.advance();
        }
    }

    fn read_string(&mut self, quote: char) -> String {
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('\\') => {
                    if let Some(escaped) = self.advance() {
                        s.push('\\');
                        s.push(escaped);
                    }
                }
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
                None => break,
            }
        }
        s
    }

    fn read_while(&mut self, first: char, pred: impl Fn(char) -> bool) -> String {
        let mut s = String::new();
        s.push(first);
        while let Some(ch) = self.peek() {
            if pred(ch) {
                s.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn keyword_or_ident(&self, s: &str) -> TokenKind {
        match s {
            "class" => TokenKind::Class,
            "struct" => TokenKind::Struct,
            "typedef" => TokenKind::Typedef,
            "static" => TokenKind::Static,
            "virtual" => TokenKind::Virtual,
            "const" => TokenKind::Const,
            "public" => TokenKind::Public,
            "protected" => TokenKind::Protected,
            "private" => TokenKind::Private,
            "namespace" => TokenKind::Namespace,
            _ => TokenKind::Ident(s.to_string()),
        }
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();

            let start = self.pos;
            let line = self.line;

            let ch = match self.advance() {
                Some(c) => c,
                None => return Token::new(TokenKind::Eof, start, start, line),
            };

            let kind = match ch {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                '<' => TokenKind::LAngle,
                '>' => TokenKind::RAngle,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semicolon,
                '&' => TokenKind::Amp,
                '*' => TokenKind::Star,
                '=' => TokenKind::Eq,
                '~' => TokenKind::Tilde,
                ':' => {
                    if self.peek() == Some(':') {
                        self.advance();
                        TokenKind::ColonColon
                    } else {
                        TokenKind::Colon
                    }
                }
                '#' if self.at_line_start(start) => {
                    self.skip_preprocessor();
                    continue;
                }
                '/' => {
                    if self.peek() == Some('/') {
                        self.read_line_comment(start);
                        continue;
                    } else if self.peek() == Some('*') {
                        if let Some(attrs) = self.read_marker(start) {
                            TokenKind::Marker(attrs)
                        } else {
                            self.advance();
                            self.skip_block_comment();
                            continue;
                        }
                    } else {
                        continue;
                    }
                }
                '"' | '\'' => TokenKind::StringLiteral(self.read_string(ch)),
                c if c.is_ascii_digit() || (c == '-' && self.peek().is_some_and(|n| n.is_ascii_digit())) => {
                    TokenKind::Number(self.read_while(c, |n| n.is_ascii_alphanumeric() || n == '.'))
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let ident = self.read_while(c, |n| n.is_ascii_alphanumeric() || n == '_');
                    self.keyword_or_ident(&ident)
                }
                _ => {
                    // Skip unknown characters
                    continue;
                }
            };

            self.last_token_line = self.line;
            return Token::new(kind, start, self.pos, line);
        }
    }

    /// Collect all tokens and comment lines.
    pub fn tokenize(mut self) -> Lexed {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Lexed {
            tokens,
            comments: self.comments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_virtual_function() {
        let tokens = kinds("virtual int GetSize() const = 0;");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Virtual,
                TokenKind::Ident("int".to_string()),
                TokenKind::Ident("GetSize".to_string()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Const,
                TokenKind::Eq,
                TokenKind::Number("0".to_string()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_marker_and_comments() {
        let src = "// Doc line.\n/*--abi(source=library)--*/\nclass A;";
        let lexed = Lexer::new(src).tokenize();
        assert_eq!(
            lexed.tokens[0].kind,
            TokenKind::Marker("source=library".to_string())
        );
        assert_eq!(lexed.tokens[0].line, 2);
        assert_eq!(lexed.comments.get(&1).unwrap().text, " Doc line.");
    }

    #[test]
    fn test_trailing_comment_is_not_a_doc_line() {
        let lexed = Lexer::new("int x;  // trailing\n").tokenize();
        assert!(lexed.comments.is_empty());
    }

    #[test]
    fn test_block_comments_and_preprocessor_are_skipped() {
        let tokens = kinds("#include \"a.h\"\n#define X \\\n  1\n/* plain */ class");
        assert_eq!(tokens, vec![TokenKind::Class, TokenKind::Eof]);
    }

    #[test]
    fn test_nested_template_closers_are_separate() {
        let tokens = kinds("std::vector<ModuleRefPtr<ModuleFrame>>");
        assert_eq!(tokens[1], TokenKind::ColonColon);
        assert_eq!(tokens[6], TokenKind::RAngle);
        assert_eq!(tokens[7], TokenKind::RAngle);
    }
}
