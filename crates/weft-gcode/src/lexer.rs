use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum TokenKind {
    /// A letter word, e.g. `G1`, `X12.5`, or a bare axis flag like the `X`
    /// in `G28 X`.
    Word { letter: char, value: Value },
    /// A run of bare text, e.g. the message after `M117`.
    Text(String),
    /// A `;` comment, trimmed, without the leading `;`.
    Comment(String),
    Newline,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Int(i64),
    Float(f64),
    /// Letter with no number attached.
    Flag,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Flag => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LexError {
    #[error("invalid number '{raw}' at line {line}, column {column}")]
    InvalidNumber {
        line: usize,
        column: usize,
        raw: String,
        #[source]
        source: std::num::ParseFloatError,
    },
}

pub fn lex(input: &str) -> Lexer<'_> {
    Lexer::new(input)
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.peek() {
            let (line, column) = (self.line, self.column);

            if ch == '\n' {
                self.bump();
                return Some(Ok(Token {
                    kind: TokenKind::Newline,
                    line,
                    column,
                }));
            }

            if ch.is_ascii_whitespace() {
                self.bump();
                continue;
            }

            if ch == ';' {
                self.bump();
                let mut text = String::new();
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    text.push(c);
                    self.bump();
                }
                return Some(Ok(Token {
                    kind: TokenKind::Comment(text.trim().to_string()),
                    line,
                    column,
                }));
            }

            if ch.is_ascii_alphabetic() {
                self.bump();
                let letter = ch.to_ascii_uppercase();

                if matches!(self.peek(), Some(next) if is_number_start(next)) {
                    let start_col = self.column;
                    let value = match self.lex_number() {
                        Ok(value) => value,
                        Err((raw, source)) => {
                            return Some(Err(LexError::InvalidNumber {
                                line,
                                column: start_col,
                                raw,
                                source,
                            }));
                        }
                    };
                    return Some(Ok(Token {
                        kind: TokenKind::Word { letter, value },
                        line,
                        column,
                    }));
                }

                if matches!(self.peek(), Some(next) if !is_terminator(next)) {
                    // Identifier-style run, e.g. the words of an M117 message.
                    let mut raw = String::new();
                    raw.push(ch);
                    while let Some(c) = self.peek() {
                        if is_terminator(c) {
                            break;
                        }
                        raw.push(c);
                        self.bump();
                    }
                    return Some(Ok(Token {
                        kind: TokenKind::Text(raw),
                        line,
                        column,
                    }));
                }

                return Some(Ok(Token {
                    kind: TokenKind::Word {
                        letter,
                        value: Value::Flag,
                    },
                    line,
                    column,
                }));
            }

            // Anything else (a stray percent line, a bare number) is kept as
            // opaque text so the statement can still round-trip.
            let mut raw = String::new();
            while let Some(c) = self.peek() {
                if is_terminator(c) {
                    break;
                }
                raw.push(c);
                self.bump();
            }
            return Some(Ok(Token {
                kind: TokenKind::Text(raw),
                line,
                column,
            }));
        }

        None
    }
}

impl Lexer<'_> {
    fn lex_number(&mut self) -> Result<Value, (String, std::num::ParseFloatError)> {
        let mut raw = String::new();
        if matches!(self.peek(), Some('+' | '-')) {
            raw.push(self.bump().unwrap());
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                raw.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if !raw.contains('.') {
            if let Ok(int) = raw.parse::<i64>() {
                return Ok(Value::Int(int));
            }
        }

        match raw.parse::<f64>() {
            Ok(v) => Ok(Value::Float(v)),
            Err(source) => Err((raw, source)),
        }
    }
}

fn is_number_start(ch: char) -> bool {
    ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.')
}

fn is_terminator(ch: char) -> bool {
    ch.is_ascii_whitespace() || ch == ';'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn words_and_comment() {
        let toks = kinds("G1 X10.5 E-0.2 ; retract");
        assert_eq!(
            toks,
            vec![
                TokenKind::Word {
                    letter: 'G',
                    value: Value::Int(1)
                },
                TokenKind::Word {
                    letter: 'X',
                    value: Value::Float(10.5)
                },
                TokenKind::Word {
                    letter: 'E',
                    value: Value::Float(-0.2)
                },
                TokenKind::Comment("retract".to_string()),
            ]
        );
    }

    #[test]
    fn flag_word() {
        let toks = kinds("G28 X Y");
        assert_eq!(
            toks,
            vec![
                TokenKind::Word {
                    letter: 'G',
                    value: Value::Int(28)
                },
                TokenKind::Word {
                    letter: 'X',
                    value: Value::Flag
                },
                TokenKind::Word {
                    letter: 'Y',
                    value: Value::Flag
                },
            ]
        );
    }

    #[test]
    fn message_text() {
        let toks = kinds("M117 Ring 45");
        assert_eq!(
            toks,
            vec![
                TokenKind::Word {
                    letter: 'M',
                    value: Value::Int(117)
                },
                TokenKind::Text("Ring".to_string()),
                TokenKind::Text("45".to_string()),
            ]
        );
    }

    #[test]
    fn tracks_positions_across_lines() {
        let toks: Vec<_> = lex("G1 X1\nG1 Y2\n").collect::<Result<_, _>>().unwrap();
        let newline = toks.iter().find(|t| t.kind == TokenKind::Newline).unwrap();
        assert_eq!(newline.line, 1);
        let second = toks
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Word { letter: 'Y', .. }))
            .unwrap();
        assert_eq!(second.line, 2);
        assert_eq!(second.column, 4);
    }

    #[test]
    fn invalid_number() {
        let err = lex("X1.2.3")
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        assert!(matches!(err, LexError::InvalidNumber { raw, .. } if raw == "1.2.3"));
    }
}
