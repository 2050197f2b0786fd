//! Lexer for nginx configuration syntax.

use std::iter::Peekable;
use std::str::Chars;

/// Token produced by the lexer.
#[derive(Debug, Clone)]
pub struct Token {
    /// The type of token.
    pub kind: TokenKind,
    /// Line number (1-indexed).
    pub line: usize,
}

/// Types of tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A bare or quoted argument token.
    Word(String),
    /// `{` opening a block body.
    BlockOpen,
    /// `}` closing a block body.
    BlockClose,
    /// `;` terminating a statement.
    End,
}

/// Lexer for nginx configuration text.
///
/// Comments run from `#` to end of line and are skipped. Quoted tokens
/// keep their inner escapes verbatim except for the quote character and
/// backslash themselves, so regex arguments like `"\d+"` survive intact.
pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
            line: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.input.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else if c == '#' {
                while let Some(c) = self.advance() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Get the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace_and_comments();

        let line = self.line;
        let kind = match self.peek()? {
            '{' => {
                self.advance();
                TokenKind::BlockOpen
            }
            '}' => {
                self.advance();
                TokenKind::BlockClose
            }
            ';' => {
                self.advance();
                TokenKind::End
            }
            '"' | '\'' => {
                let quote = self.advance()?;
                TokenKind::Word(self.read_quoted(quote))
            }
            _ => TokenKind::Word(self.read_word()),
        };

        Some(Token { kind, line })
    }

    fn read_quoted(&mut self, quote: char) -> String {
        let mut s = String::new();

        while let Some(c) = self.advance() {
            if c == '\\' {
                match self.peek() {
                    Some(next) if next == quote || next == '\\' => {
                        s.push(next);
                        self.advance();
                    }
                    _ => s.push('\\'),
                }
            } else if c == quote {
                break;
            } else {
                s.push(c);
            }
        }

        s
    }

    fn read_word(&mut self) -> String {
        let mut s = String::new();

        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, ';' | '{' | '}' | '#' | '"' | '\'') {
                break;
            }
            s.push(c);
            self.advance();
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        while let Some(token) = lexer.next_token() {
            out.push(token.kind);
        }
        out
    }

    #[test]
    fn test_lex_statement() {
        assert_eq!(
            kinds("set $foo bar;"),
            vec![
                TokenKind::Word("set".to_string()),
                TokenKind::Word("$foo".to_string()),
                TokenKind::Word("bar".to_string()),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_lex_block() {
        assert_eq!(
            kinds("server { listen 80; }"),
            vec![
                TokenKind::Word("server".to_string()),
                TokenKind::BlockOpen,
                TokenKind::Word("listen".to_string()),
                TokenKind::Word("80".to_string()),
                TokenKind::End,
                TokenKind::BlockClose,
            ]
        );
    }

    #[test]
    fn test_lex_comment() {
        assert_eq!(
            kinds("# comment line\nroot /srv; # trailing"),
            vec![
                TokenKind::Word("root".to_string()),
                TokenKind::Word("/srv".to_string()),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_lex_quoted_keeps_regex_escapes() {
        let toks = kinds(r#"rewrite "^/(\d+)$" /n;"#);
        assert_eq!(toks[1], TokenKind::Word(r"^/(\d+)$".to_string()));
    }

    #[test]
    fn test_lex_escaped_quote() {
        let toks = kinds(r#"add_header X "a \"b\" c";"#);
        assert_eq!(toks[2], TokenKind::Word(r#"a "b" c"#.to_string()));
    }

    #[test]
    fn test_lex_line_numbers() {
        let mut lexer = Lexer::new("a;\nb;");
        assert_eq!(lexer.next_token().unwrap().line, 1);
        lexer.next_token(); // ;
        assert_eq!(lexer.next_token().unwrap().line, 2);
    }
}
