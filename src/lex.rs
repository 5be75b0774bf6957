//! Lexical analysis.
//!
//! # Tokenization
//! This is the first phase of the compiler. It breaks an [`InputStream`]
//! (a character stream) into lexical units called tokens. Whitespace and
//! comments (`// ...` and `/* ... */`) are discarded, but line breaks are
//! not: a newline terminates statements, so it becomes a [`Token::Newline`].
//! Every emitted token is associated with a location in the original source.
//!
//! # Token contents
//! Operators, punctuation and keywords are identified by what they are and
//! carry no lexeme. Identifiers keep their text. Numeric literals, decimal
//! or hexadecimal, are resolved to their values.
//!
//! # Operators
//! Operators are matched longest-first: `>>s=` is preferred over `>>s`,
//! which is preferred over a malformed `>>`. Division, remainder and right
//! shifts exist only in their signed (`s`) and unsigned (`u`) spellings, as
//! do ordering comparisons.
//!
//! # Errors
//! The lexer fails fast. The first malformed token aborts tokenization.

use crate::{
    ir::{BinaryOperator, BinaryOperator as Op, Comparison, Comparison as Cmp},
    source::{InputStream, Located, Location},
};

use std::{
    fmt::{self, Display},
    mem,
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

/// Lexical error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// I/O error originating from the [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Unknown or unexpected character in the input stream.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Characters that start, but do not complete, an operator.
    #[error("Malformed operator `{0}`")]
    BadOperator(String),

    /// `{` without its matching `}` on the same line.
    #[error("Unterminated annotation")]
    UnterminatedAnnotation,

    /// Annotation other than `{wide}`.
    #[error("Unknown annotation `{{{0}}}`")]
    UnknownAnnotation(String),

    /// `/*` without its matching `*/`.
    #[error("Unterminated block comment")]
    UnterminatedComment,

    /// `0x` not followed by hexadecimal digits.
    #[error("Expected hexadecimal digits after `0x`")]
    ExpectedHexDigit,

    /// An integer literal does not fit in 64 bits.
    #[error("Integer literal overflow, valid range is [0, {}]", u64::MAX)]
    IntOverflow,
}

/// An identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl Identifier {
    /// Shares the underlying name.
    pub fn name(&self) -> Rc<str> {
        Rc::clone(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Result of lexical analysis.
///
/// A token contains enough information to fully describe a lexical
/// entity of the source program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identifier.
    Id(Identifier),

    /// Keyword.
    Keyword(Keyword),

    /// Integer literal, decimal or hexadecimal.
    Number(u64),

    /// `{wide}`
    Wide,

    /// Line break.
    Newline,

    /// End of input.
    Eof,

    /// One of the binary operators. `-` doubles as negation.
    Binary(BinaryOperator),

    /// A binary operator followed by `=`.
    Compound(BinaryOperator),

    /// A comparison operator.
    Compare(Comparison),

    /// `=`
    Assign,

    /// `~`
    Tilde,

    /// `,`
    Comma,

    /// `#`
    Hash,

    /// `?`
    Question,

    /// `:`
    Colon,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            Number(number) => write!(fmt, "literal `{}`", number),
            Wide => fmt.write_str("`{wide}`"),
            Newline => fmt.write_str("end of line"),
            Eof => fmt.write_str("end of input"),
            Binary(operator) => write!(fmt, "`{}`", operator),
            Compound(operator) => write!(fmt, "`{}=`", operator),
            Compare(comparison) => write!(fmt, "`{}`", comparison),
            Assign => fmt.write_str("`=`"),
            Tilde => fmt.write_str("`~`"),
            Comma => fmt.write_str("`,`"),
            Hash => fmt.write_str("`#`"),
            Question => fmt.write_str("`?`"),
            Colon => fmt.write_str("`:`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenSquare => fmt.write_str("`[`"),
            CloseSquare => fmt.write_str("`]`"),
        }
    }
}

/// A keyword.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Goto,
    If,
    Pass,
    Sp,
    Data,
    Const,
    End,
    Align,
    Syscall,
}

/// Keyword spellings. The language is case-sensitive.
const KEYWORDS: &[(&str, Keyword)] = &[
    ("goto", Keyword::Goto),
    ("if", Keyword::If),
    ("pass", Keyword::Pass),
    ("sp", Keyword::Sp),
    ("data", Keyword::Data),
    ("const", Keyword::Const),
    ("END", Keyword::End),
    ("align", Keyword::Align),
    ("syscall", Keyword::Syscall),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (spelling, _) = KEYWORDS
            .iter()
            .find(|(_, keyword)| keyword == self)
            .ok_or(fmt::Error)?;

        fmt.write_str(spelling)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(spelling, _)| spelling == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Every operator and punctuation spelling.
///
/// Any prefix of an entry is a viable partial operator; see
/// [`State::Operator`].
const OPERATORS: &[(&str, Token)] = &[
    ("=", Token::Assign),
    ("~", Token::Tilde),
    (",", Token::Comma),
    ("#", Token::Hash),
    ("?", Token::Question),
    (":", Token::Colon),
    ("(", Token::OpenParen),
    (")", Token::CloseParen),
    ("[", Token::OpenSquare),
    ("]", Token::CloseSquare),
    ("+", Token::Binary(Op::Add)),
    ("-", Token::Binary(Op::Sub)),
    ("*", Token::Binary(Op::Mul)),
    ("/s", Token::Binary(Op::SignedDiv)),
    ("/u", Token::Binary(Op::UnsignedDiv)),
    ("%s", Token::Binary(Op::SignedRem)),
    ("%u", Token::Binary(Op::UnsignedRem)),
    ("&", Token::Binary(Op::And)),
    ("|", Token::Binary(Op::Or)),
    ("^", Token::Binary(Op::Xor)),
    ("<<", Token::Binary(Op::Shl)),
    (">>s", Token::Binary(Op::SignedShr)),
    (">>u", Token::Binary(Op::UnsignedShr)),
    ("+=", Token::Compound(Op::Add)),
    ("-=", Token::Compound(Op::Sub)),
    ("*=", Token::Compound(Op::Mul)),
    ("/s=", Token::Compound(Op::SignedDiv)),
    ("/u=", Token::Compound(Op::UnsignedDiv)),
    ("%s=", Token::Compound(Op::SignedRem)),
    ("%u=", Token::Compound(Op::UnsignedRem)),
    ("&=", Token::Compound(Op::And)),
    ("|=", Token::Compound(Op::Or)),
    ("^=", Token::Compound(Op::Xor)),
    ("<<=", Token::Compound(Op::Shl)),
    (">>s=", Token::Compound(Op::SignedShr)),
    (">>u=", Token::Compound(Op::UnsignedShr)),
    ("==", Token::Compare(Cmp::Equal)),
    ("!=", Token::Compare(Cmp::NotEqual)),
    ("<s", Token::Compare(Cmp::SignedLess)),
    ("<u", Token::Compare(Cmp::UnsignedLess)),
    ("<=s", Token::Compare(Cmp::SignedLessOrEqual)),
    ("<=u", Token::Compare(Cmp::UnsignedLessOrEqual)),
    (">s", Token::Compare(Cmp::SignedGreater)),
    (">u", Token::Compare(Cmp::UnsignedGreater)),
    (">=s", Token::Compare(Cmp::SignedGreaterOrEqual)),
    (">=u", Token::Compare(Cmp::UnsignedGreaterOrEqual)),
];

/// Lexing state machine.
///
/// The lexer is always in one of several states. Its output, as well as
/// its next state, is defined by both its current state and the next
/// character found in the input stream.
pub struct Lexer<S: Iterator> {
    source: std::iter::Peekable<S>,
    state: State,
    start: Location,
    next: Location,
    finished: bool,
}

/// Lexer states.
enum State {
    /// Before the start of a token.
    Start,

    /// Always emits the enclosed token, consumes the current input and
    /// goes back to [`State::Start`].
    Complete(Token),

    /// Found `/`. Either a comment or a division operator follows.
    Slash,

    /// `// ...`, ends at the line break, which is not consumed.
    LineComment,

    /// `/* ...`
    BlockComment,

    /// `*` inside a block comment, which might be closing.
    BlockCommentStar,

    /// A leading `0`, either zero itself or the start of `0x`.
    Zero,

    /// Decimal digits.
    Decimal(u64),

    /// Hexadecimal digits after `0x`.
    Hex { value: u64, digits: u32 },

    /// Identifier or keyword.
    Word(String),

    /// A prefix of at least one entry in [`OPERATORS`].
    Operator(String),

    /// Between `{` and `}`.
    Annotation(String),
}

impl<S: InputStream> Lexer<S> {
    /// Creates a lexer in its initial state.
    pub fn new(start: Location, source: S) -> Self {
        let next = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start,
            next,
            finished: false,
        }
    }

    /// Reduces the whole input to tokens, stopping at the first error.
    ///
    /// On success, the last token is always [`Token::Eof`].
    pub fn tokenize(self) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        self.collect()
    }

    /// Attempts to build the next token.
    fn lex(&mut self) -> Result<Option<(Token, Location)>, LexerError> {
        use {State::*, Token::*};

        let mut last_accepted = self.start.clone();
        let token = loop {
            // Peek the next character, failing on I/O errors
            let next_char = match self.source.peek() {
                None => None,
                Some(Ok((c, _))) => Some(*c),
                Some(Err(_)) => match self.source.next() {
                    Some(Err(error)) => break Err(error.into()),
                    _ => unreachable!(),
                },
            };

            // The token start follows the next position for as long as
            // no token boundary has been found
            if let Start = self.state {
                self.start = self.next.clone();
                last_accepted = self.start.clone();
            }

            // Main switch table: state transitions and output are decided
            // from the current state and the next character
            match (&mut self.state, next_char) {
                (Start, None) if self.finished => return Ok(None),
                (Start, None) => {
                    self.finished = true;
                    break Ok(Eof);
                }

                (Start, Some('\n')) => self.state = Complete(Newline),
                (Start, Some('/')) => self.state = Slash,
                (Start, Some('{')) => self.state = Annotation(String::new()),
                (Start, Some('0')) => self.state = Zero,

                // The literal starts at zero and the digit itself is
                // accumulated by the decimal state
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Decimal(0);
                    continue;
                }

                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                (Start, Some(c)) if is_operator_prefix("", c) => {
                    self.state = Operator(String::new());
                    continue;
                }

                (Start, Some(c)) if c.is_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Delayed emission
                (Complete(token), _) => break Ok(mem::replace(token, Eof)),

                (Slash, Some('/')) => self.state = LineComment,
                (Slash, Some('*')) => self.state = BlockComment,
                (Slash, _) => {
                    self.state = Operator(String::from("/"));
                    continue;
                }

                // Line breaks are tokens, so the comment leaves them in place
                (LineComment, Some('\n') | None) => {
                    self.state = Start;
                    continue;
                }

                (LineComment, Some(_)) => (),

                (BlockComment, Some('*')) => self.state = BlockCommentStar,
                (BlockComment, Some(_)) => (),
                (BlockComment | BlockCommentStar, None) => {
                    break Err(LexerError::UnterminatedComment)
                }

                (BlockCommentStar, Some('/')) => self.state = Start,
                (BlockCommentStar, Some('*')) => (),
                (BlockCommentStar, Some(_)) => self.state = BlockComment,

                (Zero, Some('x' | 'X')) => self.state = Hex { value: 0, digits: 0 },
                (Zero, Some(c)) if c.is_ascii_digit() => {
                    self.state = Decimal(0);
                    continue;
                }

                (Zero, _) => break Ok(Number(0)),

                (Decimal(accumulated), Some(c)) if c.is_ascii_digit() => {
                    let digit = u64::from(c as u8 - b'0');
                    match accumulated
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(result) => *accumulated = result,
                        None => break Err(LexerError::IntOverflow),
                    }
                }

                (Decimal(value), _) => break Ok(Number(*value)),

                (Hex { value, digits }, Some(c)) if c.is_ascii_hexdigit() => {
                    if *value >> 60 != 0 {
                        break Err(LexerError::IntOverflow);
                    }

                    let digit = c.to_digit(16).map(u64::from).unwrap_or_default();
                    *value = *value << 4 | digit;
                    *digits += 1;
                }

                (Hex { digits: 0, .. }, _) => break Err(LexerError::ExpectedHexDigit),
                (Hex { value, .. }, _) => break Ok(Number(*value)),

                (Word(word), Some(c)) if is_word_char(c) => word.push(c),
                (Word(word), _) => match self::Keyword::from_str(word) {
                    Ok(keyword) => break Ok(Keyword(keyword)),
                    Err(()) => break Ok(Id(Identifier(Rc::from(mem::take(word))))),
                },

                (Operator(partial), Some(c)) if is_operator_prefix(partial, c) => partial.push(c),
                (Operator(partial), _) => match operator(partial) {
                    Some(token) => break Ok(token),
                    None => break Err(LexerError::BadOperator(mem::take(partial))),
                },

                (Annotation(text), Some('}')) if text.as_str() == "wide" => {
                    self.state = Complete(Wide)
                }

                (Annotation(text), Some('}')) => {
                    break Err(LexerError::UnknownAnnotation(mem::take(text)))
                }

                (Annotation(_), Some('\n') | None) => {
                    break Err(LexerError::UnterminatedAnnotation)
                }

                (Annotation(text), Some(c)) => text.push(c),
            }

            // Unless there was a `continue`, the character observed with
            // lookahead is consumed here
            if let Some(Ok((_, next_position))) = self.source.next() {
                last_accepted = mem::replace(&mut self.next, next_position);
            }
        };

        token.map(|token| Some((token, last_accepted)))
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, State::Start) && self.finished {
            return None;
        }

        match self.lex() {
            Ok(None) => None,
            Ok(Some((token, last_accepted))) => {
                self.state = State::Start;

                let location = Location::span(self.start.clone(), &last_accepted);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                // Fail-fast: nothing else is produced after an error
                self.state = State::Start;
                self.finished = true;

                Some(Err(Located::at(error, self.next.clone())))
            }
        }
    }
}

/// Determines whether a character can belong to an identifier.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Determines whether `partial` extended by `c` still leads to an operator.
fn is_operator_prefix(partial: &str, c: char) -> bool {
    OPERATORS.iter().any(|(spelling, _)| {
        spelling.len() > partial.len()
            && spelling.starts_with(partial)
            && spelling[partial.len()..].starts_with(c)
    })
}

/// Finds an operator by its exact spelling.
fn operator(spelling: &str) -> Option<Token> {
    OPERATORS
        .iter()
        .find(|(candidate, _)| *candidate == spelling)
        .map(|(_, token)| token.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;

    fn tokenize(text: &str) -> Result<Vec<Token>, Located<LexerError>> {
        let (start, stream) = source::consume(text.as_bytes(), "<test>");
        let tokens = Lexer::new(start, stream).tokenize()?;

        Ok(tokens.into_iter().map(Located::into_inner).collect())
    }

    fn error(text: &str) -> LexerError {
        match tokenize(text) {
            Ok(tokens) => panic!("expected a lexical error, got {:?}", tokens),
            Err(error) => error.into_inner(),
        }
    }

    fn id(name: &str) -> Token {
        Token::Id(Identifier(Rc::from(name)))
    }

    #[test]
    fn recovers_numeric_values() {
        assert_eq!(
            tokenize("42 0xFF 0 007 0xffffffffffffffff").unwrap(),
            vec![
                Token::Number(42),
                Token::Number(255),
                Token::Number(0),
                Token::Number(7),
                Token::Number(u64::MAX),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn rejects_oversized_literals() {
        assert!(matches!(
            error("18446744073709551616"),
            LexerError::IntOverflow
        ));

        assert!(matches!(
            error("0x10000000000000000"),
            LexerError::IntOverflow
        ));

        assert!(matches!(error("0x"), LexerError::ExpectedHexDigit));
    }

    #[test]
    fn matches_operators_longest_first() {
        use BinaryOperator::*;

        assert_eq!(
            tokenize(">>s= >>s >>u= <<= << <=u <u >=s >s == != = -= -").unwrap(),
            vec![
                Token::Compound(SignedShr),
                Token::Binary(SignedShr),
                Token::Compound(UnsignedShr),
                Token::Compound(Shl),
                Token::Binary(Shl),
                Token::Compare(Comparison::UnsignedLessOrEqual),
                Token::Compare(Comparison::UnsignedLess),
                Token::Compare(Comparison::SignedGreaterOrEqual),
                Token::Compare(Comparison::SignedGreater),
                Token::Compare(Comparison::Equal),
                Token::Compare(Comparison::NotEqual),
                Token::Assign,
                Token::Compound(Sub),
                Token::Binary(Sub),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn operators_stop_before_operands() {
        assert_eq!(
            tokenize("s[0]=-1").unwrap(),
            vec![
                id("s"),
                Token::OpenSquare,
                Token::Number(0),
                Token::CloseSquare,
                Token::Assign,
                Token::Binary(BinaryOperator::Sub),
                Token::Number(1),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn division_is_not_a_comment() {
        assert_eq!(
            tokenize("/s /u= // trailing").unwrap(),
            vec![
                Token::Binary(BinaryOperator::SignedDiv),
                Token::Compound(BinaryOperator::UnsignedDiv),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn discards_comments_but_keeps_newlines() {
        assert_eq!(
            tokenize("goto END // done\n/* block\n comment */ pass\n").unwrap(),
            vec![
                Token::Keyword(Keyword::Goto),
                Token::Keyword(Keyword::End),
                Token::Newline,
                Token::Keyword(Keyword::Pass),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            tokenize("END end sp SP syscall").unwrap(),
            vec![
                Token::Keyword(Keyword::End),
                id("end"),
                Token::Keyword(Keyword::Sp),
                id("SP"),
                Token::Keyword(Keyword::Syscall),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn recognizes_wide_annotation() {
        assert_eq!(
            tokenize("0x1122334455667788{wide}").unwrap(),
            vec![
                Token::Number(0x1122334455667788),
                Token::Wide,
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn reports_malformed_input() {
        assert!(matches!(error("s[0] = {wide\n"), LexerError::UnterminatedAnnotation));
        assert!(matches!(error("{narrow}"), LexerError::UnknownAnnotation(text) if text == "narrow"));
        assert!(matches!(error("/* open"), LexerError::UnterminatedComment));
        assert!(matches!(error("s[0] $ 1"), LexerError::BadChar('$')));
        assert!(matches!(error("a > b"), LexerError::BadOperator(op) if op == ">"));
        assert!(matches!(error("a >> b"), LexerError::BadOperator(op) if op == ">>"));
        assert!(matches!(error("!x"), LexerError::BadOperator(op) if op == "!"));
        assert!(matches!(error("a / b"), LexerError::BadOperator(op) if op == "/"));
    }

    #[test]
    fn errors_carry_their_position() {
        let (start, stream) = source::consume("pass\n  @".as_bytes(), "<test>");
        let error = Lexer::new(start, stream).tokenize().unwrap_err();

        assert_eq!(error.location().start().line(), 2);
        assert_eq!(error.location().start().column(), 3);
    }

    #[test]
    fn tokens_carry_their_span() {
        let (start, stream) = source::consume("goto loop".as_bytes(), "<test>");
        let tokens = Lexer::new(start, stream).tokenize().unwrap();

        let target = tokens[1].location();
        assert_eq!(target.start().column(), 6);
        assert_eq!(target.end().column(), 10);
    }
}
