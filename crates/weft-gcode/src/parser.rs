use crate::lexer::{LexError, TokenKind, Value, lex};
use serde::Serialize;

/// One source line, with the verbatim text preserved so routing can pass
/// unmodified lines through byte-for-byte.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub raw: String,
    pub words: Vec<Word>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Word {
    pub letter: char,
    pub value: Value,
}

impl Statement {
    /// The command of this line, e.g. `('G', 1)` for `G1`, if it has one.
    pub fn code(&self) -> Option<(char, i64)> {
        let first = self.words.first()?;
        match first.value {
            Value::Int(n) => Some((first.letter, n)),
            _ => None,
        }
    }

    pub fn is(&self, letter: char, number: i64) -> bool {
        self.code() == Some((letter, number))
    }

    /// The numeric value of an argument word, e.g. `X` of `G1 X10.5`.
    pub fn number(&self, letter: char) -> Option<f64> {
        self.words
            .iter()
            .skip(1)
            .find(|w| w.letter == letter)
            .and_then(|w| w.value.as_f64())
    }

    pub fn has_word(&self, letter: char) -> bool {
        self.words.iter().skip(1).any(|w| w.letter == letter)
    }

    pub fn comment_only(&self) -> bool {
        self.words.is_empty()
    }
}

/// Parse G-code text into statements, one per non-empty source line.
pub fn parse(input: &str) -> Result<Vec<Statement>, LexError> {
    let lines: Vec<&str> = input.lines().collect();
    let mut out = Vec::new();
    let mut words = Vec::new();
    let mut comment: Option<String> = None;
    let mut seen_any = false;
    let mut current_line = 1usize;

    let flush = |line: usize,
                 words: &mut Vec<Word>,
                 comment: &mut Option<String>,
                 seen_any: &mut bool,
                 out: &mut Vec<Statement>| {
        if !*seen_any {
            return;
        }
        let raw = lines
            .get(line.saturating_sub(1))
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default();
        out.push(Statement {
            line,
            raw,
            words: std::mem::take(words),
            comment: comment.take(),
        });
        *seen_any = false;
    };

    for token in lex(input) {
        let token = token?;
        match token.kind {
            TokenKind::Newline => {
                flush(current_line, &mut words, &mut comment, &mut seen_any, &mut out);
                current_line = token.line + 1;
            }
            TokenKind::Word { letter, value } => {
                current_line = token.line;
                seen_any = true;
                words.push(Word { letter, value });
            }
            TokenKind::Comment(text) => {
                current_line = token.line;
                seen_any = true;
                // A second `;` on one line is part of the comment text and
                // the lexer already folded it in, so this never clobbers.
                comment = Some(text);
            }
            TokenKind::Text(_) => {
                // Message words and other opaque text survive via `raw`.
                current_line = token.line;
                seen_any = true;
            }
        }
    }
    flush(current_line, &mut words, &mut comment, &mut seen_any, &mut out);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_statements_by_line() {
        let stmts = parse("G28 ; home\nG1 X10 Y20 E0.5\n\nM82\n").unwrap();
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[0].code(), Some(('G', 28)));
        assert_eq!(stmts[0].comment.as_deref(), Some("home"));
        assert_eq!(stmts[1].number('X'), Some(10.0));
        assert_eq!(stmts[1].number('E'), Some(0.5));
        assert_eq!(stmts[2].code(), Some(('M', 82)));
        assert_eq!(stmts[2].line, 4);
    }

    #[test]
    fn keeps_raw_text_verbatim() {
        let stmts = parse("G1 X1.20 Y0.30 E.5 ;move\n").unwrap();
        assert_eq!(stmts[0].raw, "G1 X1.20 Y0.30 E.5 ;move");
    }

    #[test]
    fn comment_only_line() {
        let stmts = parse(";TYPE:External perimeter\n").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].comment_only());
        assert_eq!(stmts[0].comment.as_deref(), Some("TYPE:External perimeter"));
    }

    #[test]
    fn flags_are_not_numbers() {
        let stmts = parse("G28 X Y\n").unwrap();
        assert!(stmts[0].has_word('X'));
        assert_eq!(stmts[0].number('X'), None);
    }

    #[test]
    fn empty_input() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n\n").unwrap().is_empty());
    }
}
