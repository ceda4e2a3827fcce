//! Tokenizer.
//!
//! Produces a flat token list with 1-based line/column ranges. Identifier and
//! string payloads are interned into the compile arena so tokens stay `Copy`.

use bumpalo::Bump;

use crate::ast::FileRange;
use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind<'a> {
    Identifier(&'a str),
    Integer(u64),
    Float(f64),
    String(&'a str),
    OpenRoundBracket,
    CloseRoundBracket,
    OpenCurlyBracket,
    CloseCurlyBracket,
    OpenSquareBracket,
    CloseSquareBracket,
    Comma,
    Semicolon,
    Colon,
    DoubleColon,
    ColonEquals,
    Equals,
    DoubleEquals,
    BangEquals,
    LeftArrow,
    RightArrow,
    Arrow,
    Plus,
    PlusEquals,
    Minus,
    MinusEquals,
    Asterisk,
    AsteriskEquals,
    ForwardSlash,
    ForwardSlashEquals,
    Percent,
    PercentEquals,
    Ampersand,
    AmpersandEquals,
    DoubleAmpersand,
    Pipe,
    PipeEquals,
    DoublePipe,
    Bang,
    Hash,
    Dollar,
    Dot,
    DoubleDot,
}

impl<'a> TokenKind<'a> {
    /// Short human-readable rendering for diagnostics.
    pub fn describe(&self) -> String {
        match *self {
            TokenKind::Identifier(text) => format!("'{text}'"),
            TokenKind::Integer(value) => format!("'{value}'"),
            TokenKind::Float(value) => format!("'{value}'"),
            TokenKind::String(_) => "string literal".to_string(),
            TokenKind::OpenRoundBracket => "'('".to_string(),
            TokenKind::CloseRoundBracket => "')'".to_string(),
            TokenKind::OpenCurlyBracket => "'{'".to_string(),
            TokenKind::CloseCurlyBracket => "'}'".to_string(),
            TokenKind::OpenSquareBracket => "'['".to_string(),
            TokenKind::CloseSquareBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::DoubleColon => "'::'".to_string(),
            TokenKind::ColonEquals => "':='".to_string(),
            TokenKind::Equals => "'='".to_string(),
            TokenKind::DoubleEquals => "'=='".to_string(),
            TokenKind::BangEquals => "'!='".to_string(),
            TokenKind::LeftArrow => "'<'".to_string(),
            TokenKind::RightArrow => "'>'".to_string(),
            TokenKind::Arrow => "'->'".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::PlusEquals => "'+='".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::MinusEquals => "'-='".to_string(),
            TokenKind::Asterisk => "'*'".to_string(),
            TokenKind::AsteriskEquals => "'*='".to_string(),
            TokenKind::ForwardSlash => "'/'".to_string(),
            TokenKind::ForwardSlashEquals => "'/='".to_string(),
            TokenKind::Percent => "'%'".to_string(),
            TokenKind::PercentEquals => "'%='".to_string(),
            TokenKind::Ampersand => "'&'".to_string(),
            TokenKind::AmpersandEquals => "'&='".to_string(),
            TokenKind::DoubleAmpersand => "'&&'".to_string(),
            TokenKind::Pipe => "'|'".to_string(),
            TokenKind::PipeEquals => "'|='".to_string(),
            TokenKind::DoublePipe => "'||'".to_string(),
            TokenKind::Bang => "'!'".to_string(),
            TokenKind::Hash => "'#'".to_string(),
            TokenKind::Dollar => "'$'".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::DoubleDot => "'..'".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub range: FileRange,
}

struct Lexer<'a, 'source> {
    arena: &'a Bump,
    path: &'a str,
    characters: std::iter::Peekable<std::str::Chars<'source>>,
    line: u32,
    column: u32,
}

impl<'a, 'source> Lexer<'a, 'source> {
    fn peek(&mut self) -> Option<char> {
        self.characters.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let character = self.characters.next()?;
        if character == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(character)
    }

    fn here(&self) -> FileRange {
        FileRange {
            first_line: self.line,
            first_column: self.column,
            last_line: self.line,
            last_column: self.column,
        }
    }

    fn error(&self, range: FileRange, message: impl Into<String>) -> CompileError {
        CompileError::new(self.path, range, message)
    }
}

/// Tokenize an entire source file.
pub fn tokenize_source<'a>(
    arena: &'a Bump,
    path: &'a str,
    source: &str,
) -> Result<Vec<Token<'a>>, CompileError> {
    let mut lexer = Lexer {
        arena,
        path,
        characters: source.chars().peekable(),
        line: 1,
        column: 1,
    };

    let mut tokens = Vec::new();

    while let Some(character) = lexer.peek() {
        let start = lexer.here();

        match character {
            ' ' | '\t' | '\r' | '\n' => {
                lexer.advance();
            }

            '/' => {
                lexer.advance();
                match lexer.peek() {
                    Some('/') => {
                        while let Some(c) = lexer.peek() {
                            if c == '\n' {
                                break;
                            }
                            lexer.advance();
                        }
                    }
                    Some('*') => {
                        lexer.advance();
                        let mut depth = 1usize;
                        loop {
                            match lexer.advance() {
                                Some('*') if lexer.peek() == Some('/') => {
                                    lexer.advance();
                                    depth -= 1;
                                    if depth == 0 {
                                        break;
                                    }
                                }
                                Some('/') if lexer.peek() == Some('*') => {
                                    lexer.advance();
                                    depth += 1;
                                }
                                Some(_) => {}
                                None => {
                                    return Err(lexer.error(start, "Unterminated block comment"));
                                }
                            }
                        }
                    }
                    Some('=') => {
                        lexer.advance();
                        tokens.push(token(TokenKind::ForwardSlashEquals, start, &lexer));
                    }
                    _ => tokens.push(token(TokenKind::ForwardSlash, start, &lexer)),
                }
            }

            '0'..='9' => tokens.push(lex_number(&mut lexer, start)?),

            'a'..='z' | 'A'..='Z' | '_' => {
                let mut text = String::new();
                while let Some(c) = lexer.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        text.push(c);
                        lexer.advance();
                    } else {
                        break;
                    }
                }
                let kind = TokenKind::Identifier(lexer.arena.alloc_str(&text));
                tokens.push(token(kind, start, &lexer));
            }

            '"' => tokens.push(lex_string(&mut lexer, start)?),

            _ => {
                lexer.advance();
                let kind = match character {
                    '(' => TokenKind::OpenRoundBracket,
                    ')' => TokenKind::CloseRoundBracket,
                    '{' => TokenKind::OpenCurlyBracket,
                    '}' => TokenKind::CloseCurlyBracket,
                    '[' => TokenKind::OpenSquareBracket,
                    ']' => TokenKind::CloseSquareBracket,
                    ',' => TokenKind::Comma,
                    ';' => TokenKind::Semicolon,
                    '#' => TokenKind::Hash,
                    '$' => TokenKind::Dollar,
                    '<' => TokenKind::LeftArrow,
                    '>' => TokenKind::RightArrow,
                    ':' => match lexer.peek() {
                        Some(':') => {
                            lexer.advance();
                            TokenKind::DoubleColon
                        }
                        Some('=') => {
                            lexer.advance();
                            TokenKind::ColonEquals
                        }
                        _ => TokenKind::Colon,
                    },
                    '=' => match lexer.peek() {
                        Some('=') => {
                            lexer.advance();
                            TokenKind::DoubleEquals
                        }
                        _ => TokenKind::Equals,
                    },
                    '!' => match lexer.peek() {
                        Some('=') => {
                            lexer.advance();
                            TokenKind::BangEquals
                        }
                        _ => TokenKind::Bang,
                    },
                    '+' => match lexer.peek() {
                        Some('=') => {
                            lexer.advance();
                            TokenKind::PlusEquals
                        }
                        _ => TokenKind::Plus,
                    },
                    '-' => match lexer.peek() {
                        Some('=') => {
                            lexer.advance();
                            TokenKind::MinusEquals
                        }
                        Some('>') => {
                            lexer.advance();
                            TokenKind::Arrow
                        }
                        _ => TokenKind::Minus,
                    },
                    '*' => match lexer.peek() {
                        Some('=') => {
                            lexer.advance();
                            TokenKind::AsteriskEquals
                        }
                        _ => TokenKind::Asterisk,
                    },
                    '%' => match lexer.peek() {
                        Some('=') => {
                            lexer.advance();
                            TokenKind::PercentEquals
                        }
                        _ => TokenKind::Percent,
                    },
                    '&' => match lexer.peek() {
                        Some('&') => {
                            lexer.advance();
                            TokenKind::DoubleAmpersand
                        }
                        Some('=') => {
                            lexer.advance();
                            TokenKind::AmpersandEquals
                        }
                        _ => TokenKind::Ampersand,
                    },
                    '|' => match lexer.peek() {
                        Some('|') => {
                            lexer.advance();
                            TokenKind::DoublePipe
                        }
                        Some('=') => {
                            lexer.advance();
                            TokenKind::PipeEquals
                        }
                        _ => TokenKind::Pipe,
                    },
                    '.' => match lexer.peek() {
                        Some('.') => {
                            lexer.advance();
                            TokenKind::DoubleDot
                        }
                        _ => TokenKind::Dot,
                    },
                    other => {
                        return Err(
                            lexer.error(start, format!("Unexpected character '{other}'"))
                        );
                    }
                };
                tokens.push(token(kind, start, &lexer));
            }
        }
    }

    Ok(tokens)
}

fn token<'a>(kind: TokenKind<'a>, start: FileRange, lexer: &Lexer<'a, '_>) -> Token<'a> {
    let mut range = start;
    range.last_line = lexer.line;
    range.last_column = lexer.column.saturating_sub(1).max(start.first_column);
    Token { kind, range }
}

fn lex_number<'a>(lexer: &mut Lexer<'a, '_>, start: FileRange) -> Result<Token<'a>, CompileError> {
    let mut text = String::new();

    let radix = if lexer.peek() == Some('0') {
        lexer.advance();
        match lexer.peek() {
            Some('x') | Some('X') => {
                lexer.advance();
                16
            }
            Some('b') | Some('B') => {
                lexer.advance();
                2
            }
            _ => {
                text.push('0');
                10
            }
        }
    } else {
        10
    };

    while let Some(c) = lexer.peek() {
        if c.is_digit(radix) || (radix == 10 && c == '_') || (radix == 16 && c.is_ascii_hexdigit())
        {
            if c != '_' {
                text.push(c);
            }
            lexer.advance();
        } else {
            break;
        }
    }

    if radix != 10 {
        if text.is_empty() {
            return Err(lexer.error(start, "Missing digits in numeric literal"));
        }
        let value = u64::from_str_radix(&text, radix)
            .map_err(|_| lexer.error(start, format!("Numeric literal '{text}' is too large")))?;
        return Ok(token(TokenKind::Integer(value), start, lexer));
    }

    // A '.' continues a float only when not followed by a second '.', which
    // would be the range operator in a for loop.
    let mut is_float = false;
    if lexer.peek() == Some('.') {
        let mut lookahead = lexer.characters.clone();
        lookahead.next();
        if lookahead.peek() != Some(&'.') {
            is_float = true;
            text.push('.');
            lexer.advance();
            while let Some(c) = lexer.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    lexer.advance();
                } else {
                    break;
                }
            }
        }
    }

    if matches!(lexer.peek(), Some('e') | Some('E')) {
        is_float = true;
        text.push('e');
        lexer.advance();
        if let Some(sign @ ('+' | '-')) = lexer.peek() {
            text.push(sign);
            lexer.advance();
        }
        while let Some(c) = lexer.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                lexer.advance();
            } else {
                break;
            }
        }
    }

    if is_float {
        let value: f64 = text
            .parse()
            .map_err(|_| lexer.error(start, format!("Invalid float literal '{text}'")))?;
        Ok(token(TokenKind::Float(value), start, lexer))
    } else {
        let value: u64 = text
            .parse()
            .map_err(|_| lexer.error(start, format!("Numeric literal '{text}' is too large")))?;
        Ok(token(TokenKind::Integer(value), start, lexer))
    }
}

fn lex_string<'a>(lexer: &mut Lexer<'a, '_>, start: FileRange) -> Result<Token<'a>, CompileError> {
    lexer.advance(); // opening quote

    let mut text = String::new();
    loop {
        match lexer.advance() {
            Some('"') => break,
            Some('\\') => {
                let escape_range = lexer.here();
                match lexer.advance() {
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('t') => text.push('\t'),
                    Some('0') => text.push('\0'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(other) => {
                        return Err(lexer.error(
                            escape_range,
                            format!("Unknown escape sequence '\\{other}'"),
                        ));
                    }
                    None => return Err(lexer.error(start, "Unterminated string literal")),
                }
            }
            Some('\n') | None => {
                return Err(lexer.error(start, "Unterminated string literal"));
            }
            Some(other) => text.push(other),
        }
    }

    let kind = TokenKind::String(lexer.arena.alloc_str(&text));
    Ok(token(kind, start, lexer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds<'a>(arena: &'a Bump, source: &str) -> Vec<TokenKind<'a>> {
        tokenize_source(arena, "test.mica", source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_declaration() {
        let arena = Bump::new();
        let tokens = kinds(&arena, "main :: () -> i32 { return 0; }");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier("main"),
                TokenKind::DoubleColon,
                TokenKind::OpenRoundBracket,
                TokenKind::CloseRoundBracket,
                TokenKind::Arrow,
                TokenKind::Identifier("i32"),
                TokenKind::OpenCurlyBracket,
                TokenKind::Identifier("return"),
                TokenKind::Integer(0),
                TokenKind::Semicolon,
                TokenKind::CloseCurlyBracket,
            ]
        );
    }

    #[test]
    fn range_operator_is_not_a_float() {
        let arena = Bump::new();
        let tokens = kinds(&arena, "1..5");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Integer(1),
                TokenKind::DoubleDot,
                TokenKind::Integer(5),
            ]
        );
    }

    #[test]
    fn float_and_hex_literals() {
        let arena = Bump::new();
        assert_eq!(kinds(&arena, "2.5"), vec![TokenKind::Float(2.5)]);
        assert_eq!(kinds(&arena, "0xFF"), vec![TokenKind::Integer(255)]);
        assert_eq!(kinds(&arena, "0b1010"), vec![TokenKind::Integer(10)]);
    }

    #[test]
    fn string_escapes() {
        let arena = Bump::new();
        assert_eq!(
            kinds(&arena, r#""a\nb""#),
            vec![TokenKind::String("a\nb")]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let arena = Bump::new();
        let tokens = kinds(&arena, "a // trailing\n/* block /* nested */ */ b");
        assert_eq!(
            tokens,
            vec![TokenKind::Identifier("a"), TokenKind::Identifier("b")]
        );
    }

    #[test]
    fn token_ranges_are_one_based() {
        let arena = Bump::new();
        let tokens = tokenize_source(&arena, "test.mica", "x\n  y").unwrap();
        assert_eq!(tokens[0].range.first_line, 1);
        assert_eq!(tokens[0].range.first_column, 1);
        assert_eq!(tokens[1].range.first_line, 2);
        assert_eq!(tokens[1].range.first_column, 3);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let arena = Bump::new();
        let error = tokenize_source(&arena, "test.mica", "\"abc").unwrap_err();
        assert!(error.mentions("Unterminated string literal"));
    }
}
