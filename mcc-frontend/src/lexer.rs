//! MicroC Lexer
//!
//! Tokenizes MicroC source text into a stream of tokens. Handles
//! keywords, operators, integer literals, identifiers, and comments.
//! Whitespace and comments are skipped, not emitted.

use mcc_common::{CompilerError, SourceLocation, SourceSpan};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// MicroC token types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenType {
    // Literals
    IntLiteral(i64),

    // Identifiers
    Identifier(String),

    // Keywords
    Int,
    Void,
    If,
    Else,
    While,
    For,
    Return,
    Print,
    Println,

    // Operators
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    Ampersand,    // &
    Bang,         // !
    Equal,        // =
    Less,         // <
    Greater,      // >

    // Compound operators
    EqualEqual,         // ==
    BangEqual,          // !=
    LessEqual,          // <=
    GreaterEqual,       // >=
    AmpersandAmpersand, // &&
    PipePipe,           // ||

    // Delimiters
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    Semicolon,    // ;
    Comma,        // ,

    // Special
    EndOfFile,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::IntLiteral(n) => write!(f, "{}", n),
            TokenType::Identifier(s) => write!(f, "{}", s),

            TokenType::Int => write!(f, "int"),
            TokenType::Void => write!(f, "void"),
            TokenType::If => write!(f, "if"),
            TokenType::Else => write!(f, "else"),
            TokenType::While => write!(f, "while"),
            TokenType::For => write!(f, "for"),
            TokenType::Return => write!(f, "return"),
            TokenType::Print => write!(f, "print"),
            TokenType::Println => write!(f, "println"),

            TokenType::Plus => write!(f, "+"),
            TokenType::Minus => write!(f, "-"),
            TokenType::Star => write!(f, "*"),
            TokenType::Slash => write!(f, "/"),
            TokenType::Percent => write!(f, "%"),
            TokenType::Ampersand => write!(f, "&"),
            TokenType::Bang => write!(f, "!"),
            TokenType::Equal => write!(f, "="),
            TokenType::Less => write!(f, "<"),
            TokenType::Greater => write!(f, ">"),

            TokenType::EqualEqual => write!(f, "=="),
            TokenType::BangEqual => write!(f, "!="),
            TokenType::LessEqual => write!(f, "<="),
            TokenType::GreaterEqual => write!(f, ">="),
            TokenType::AmpersandAmpersand => write!(f, "&&"),
            TokenType::PipePipe => write!(f, "||"),

            TokenType::LeftParen => write!(f, "("),
            TokenType::RightParen => write!(f, ")"),
            TokenType::LeftBrace => write!(f, "{{"),
            TokenType::RightBrace => write!(f, "}}"),
            TokenType::LeftBracket => write!(f, "["),
            TokenType::RightBracket => write!(f, "]"),
            TokenType::Semicolon => write!(f, ";"),
            TokenType::Comma => write!(f, ","),

            TokenType::EndOfFile => write!(f, "EOF"),
        }
    }
}

/// A token with location information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub token_type: TokenType,
    pub span: SourceSpan,
}

impl Token {
    pub fn new(token_type: TokenType, span: SourceSpan) -> Self {
        Self { token_type, span }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.token_type, self.span.start)
    }
}

/// MicroC Lexer
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
    keywords: HashMap<String, TokenType>,
}

impl Lexer {
    /// Create a new lexer
    pub fn new(input: &str) -> Self {
        let mut lexer = Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            keywords: HashMap::new(),
        };

        lexer.initialize_keywords();
        lexer
    }

    /// Initialize keyword map
    fn initialize_keywords(&mut self) {
        let keywords = [
            ("int", TokenType::Int),
            ("void", TokenType::Void),
            ("if", TokenType::If),
            ("else", TokenType::Else),
            ("while", TokenType::While),
            ("for", TokenType::For),
            ("return", TokenType::Return),
            ("print", TokenType::Print),
            ("println", TokenType::Println),
        ];

        for (keyword, token_type) in keywords {
            self.keywords.insert(keyword.to_string(), token_type);
        }
    }

    /// Get current character
    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    /// Peek ahead n characters
    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    /// Advance to next character
    fn advance(&mut self) -> Option<char> {
        if let Some(ch) = self.current_char() {
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            Some(ch)
        } else {
            None
        }
    }

    /// Get current location
    fn current_location(&self) -> SourceLocation {
        SourceLocation::new_simple(self.line, self.column)
    }

    /// Skip whitespace and comments
    fn skip_whitespace_and_comments(&mut self) -> Result<(), CompilerError> {
        loop {
            match self.current_char() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_char(1) == Some('/') => {
                    while let Some(ch) = self.current_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_char(1) == Some('*') => {
                    let start = self.current_location();
                    self.advance(); // '/'
                    self.advance(); // '*'

                    let mut found_end = false;
                    while let Some(ch) = self.current_char() {
                        if ch == '*' && self.peek_char(1) == Some('/') {
                            self.advance();
                            self.advance();
                            found_end = true;
                            break;
                        }
                        self.advance();
                    }

                    if !found_end {
                        return Err(CompilerError::lex_error(
                            "Unterminated block comment".to_string(),
                            start,
                        ));
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Tokenize an identifier or keyword
    fn tokenize_identifier(&mut self) -> TokenType {
        let mut identifier = String::new();

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if let Some(keyword_token) = self.keywords.get(&identifier) {
            keyword_token.clone()
        } else {
            TokenType::Identifier(identifier)
        }
    }

    /// Tokenize an integer literal (decimal or 0x hex)
    fn tokenize_integer(&mut self) -> Result<TokenType, CompilerError> {
        let mut number = String::new();

        if self.current_char() == Some('0') && self.peek_char(1) == Some('x') {
            self.advance(); // '0'
            self.advance(); // 'x'

            while let Some(ch) = self.current_char() {
                if ch.is_ascii_hexdigit() {
                    number.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }

            if number.is_empty() {
                return Err(CompilerError::lex_error(
                    "Invalid hex literal".to_string(),
                    self.current_location(),
                ));
            }

            let value = i64::from_str_radix(&number, 16).map_err(|_| {
                CompilerError::lex_error(
                    format!("Invalid hex literal: 0x{}", number),
                    self.current_location(),
                )
            })?;

            return Ok(TokenType::IntLiteral(value));
        }

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let value = number.parse::<i64>().map_err(|_| {
            CompilerError::lex_error(
                format!("Invalid integer literal: {}", number),
                self.current_location(),
            )
        })?;

        Ok(TokenType::IntLiteral(value))
    }

    /// Get next token
    pub fn next_token(&mut self) -> Result<Token, CompilerError> {
        self.skip_whitespace_and_comments()?;

        let start_location = self.current_location();

        let token_type = match self.current_char() {
            None => TokenType::EndOfFile,

            Some(ch) if ch.is_alphabetic() || ch == '_' => self.tokenize_identifier(),

            Some(ch) if ch.is_ascii_digit() => self.tokenize_integer()?,

            Some('+') => {
                self.advance();
                TokenType::Plus
            }

            Some('-') => {
                self.advance();
                TokenType::Minus
            }

            Some('*') => {
                self.advance();
                TokenType::Star
            }

            Some('/') => {
                self.advance();
                TokenType::Slash
            }

            Some('%') => {
                self.advance();
                TokenType::Percent
            }

            Some('&') => {
                self.advance();
                if self.current_char() == Some('&') {
                    self.advance();
                    TokenType::AmpersandAmpersand
                } else {
                    TokenType::Ampersand
                }
            }

            Some('|') => {
                self.advance();
                if self.current_char() == Some('|') {
                    self.advance();
                    TokenType::PipePipe
                } else {
                    return Err(CompilerError::lex_error(
                        "Unexpected character: |".to_string(),
                        start_location,
                    ));
                }
            }

            Some('!') => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                }
            }

            Some('=') => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                }
            }

            Some('<') => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                }
            }

            Some('>') => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                }
            }

            Some('(') => {
                self.advance();
                TokenType::LeftParen
            }
            Some(')') => {
                self.advance();
                TokenType::RightParen
            }
            Some('{') => {
                self.advance();
                TokenType::LeftBrace
            }
            Some('}') => {
                self.advance();
                TokenType::RightBrace
            }
            Some('[') => {
                self.advance();
                TokenType::LeftBracket
            }
            Some(']') => {
                self.advance();
                TokenType::RightBracket
            }
            Some(';') => {
                self.advance();
                TokenType::Semicolon
            }
            Some(',') => {
                self.advance();
                TokenType::Comma
            }

            Some(ch) => {
                return Err(CompilerError::lex_error(
                    format!("Unexpected character: {}", ch),
                    start_location,
                ));
            }
        };

        let end_location = self.current_location();
        let span = SourceSpan::new(start_location, end_location);

        Ok(Token::new(token_type, span))
    }

    /// Tokenize entire input into a vector of tokens
    pub fn tokenize(&mut self) -> Result<Vec<Token>, CompilerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.token_type, TokenType::EndOfFile);
            tokens.push(token);

            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }
}
