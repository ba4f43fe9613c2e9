use log::trace;

use crate::buffer::ScanBuffer;
use crate::classify::{CharClass, ClassTable, MetaClass};
use crate::decode::CharDecoder;
use crate::error::{CifError, ErrorCode, ErrorSink, SyntaxError};
use crate::options::{Dialect, ParseOptions, LINE_LENGTH};

const LF: u32 = b'\n' as u32;
const SEMI: u32 = b';' as u32;
const COLON: u32 = b':' as u32;
const BOM: u32 = 0xfeff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    BlockHead,
    FrameHead,
    FrameTerm,
    LoopKw,
    Name,
    /// Whitespace-delimited value.
    Value,
    /// Quoted or triple-quoted value.
    QValue,
    /// Text block; `text` holds the raw, undecoded content.
    TValue,
    /// Quoted table key; the colon has been consumed.
    Key,
    /// Text-block table key; the colon has been consumed.
    TKey,
    OList,
    CList,
    OTable,
    CTable,
    Whitespace,
    Comment,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Semantic value: block/frame code, string content, name text.
    pub text: String,
    /// Source text as scanned, delimiters included.
    pub raw: String,
    pub line: u32,
    pub column: u32,
}

enum Keyword {
    Block(String),
    Frame(String),
    FrameTerm,
    Loop,
    Reserved,
}

/// The tokenizer: consumes the scanning buffer, produces classified
/// tokens.
///
/// Whitespace runs and comments are produced as tokens of their own so
/// the parser can route them to the lexical callbacks; everything else
/// follows the dispatch table of the CIF grammar. The `expect_key`
/// argument of [`next_token`](Self::next_token) enables the CIF 2.0
/// reclassification of a quoted string followed by `:` into a table
/// key.
pub(crate) struct Scanner<D: CharDecoder> {
    decoder: D,
    buf: ScanBuffer,
    classes: ClassTable,
    dialect: Dialect,
    line: u32,
    column: u32,
    line_chars: usize,
    started: bool,
    prev: Option<TokenKind>,
    ws_since: bool,
}

impl<D: CharDecoder> Scanner<D> {
    pub(crate) fn new(decoder: D, dialect: Dialect, options: &ParseOptions) -> Self {
        Self {
            decoder,
            buf: ScanBuffer::new(),
            classes: ClassTable::new(dialect, &options.extra_ws_chars, &options.extra_eol_chars),
            dialect,
            line: 1,
            column: 1,
            line_chars: 0,
            started: false,
            prev: None,
            ws_since: true,
        }
    }

    fn peek(&mut self) -> Result<Option<u32>, CifError> {
        self.buf.peek(&mut self.decoder)
    }

    fn peek_at(&mut self, ahead: usize) -> Result<Option<u32>, CifError> {
        self.buf.peek_at(ahead, &mut self.decoder)
    }

    fn err(code: ErrorCode, line: u32, column: u32, text: impl Into<String>) -> SyntaxError {
        SyntaxError {
            code,
            line,
            column,
            text: text.into(),
        }
    }

    /// Validate and consume the unit at the scan head, tracking line and
    /// column. Returns the unit actually stored (invalid surrogates are
    /// replaced in place).
    fn consume(&mut self, sink: &mut impl ErrorSink) -> Result<Option<u32>, CifError> {
        let Some(mut unit) = self.peek()? else {
            return Ok(None);
        };
        let (line, column) = (self.line, self.column);
        self.buf.advance();
        if matches!(unit, 0xd800..=0xdfff) || unit > 0x0010_ffff {
            sink.report(Self::err(ErrorCode::InvalidChar, line, column, ""))?;
            unit = match self.dialect {
                Dialect::V2 => char::REPLACEMENT_CHARACTER as u32,
                Dialect::V1 => b'?' as u32,
            };
            self.buf.replace_last(unit);
        } else if is_noncharacter(unit)
            || unit == BOM
            || self.classes.classify(unit) == CharClass::No
        {
            let text = char::from_u32(unit).map(String::from).unwrap_or_default();
            sink.report(Self::err(ErrorCode::DisallowedChar, line, column, text))?;
        }
        if unit == LF {
            if self.line_chars > LINE_LENGTH {
                sink.report(Self::err(ErrorCode::OverlengthLine, line, column, ""))?;
            }
            self.line += 1;
            self.column = 1;
            self.line_chars = 0;
        } else {
            self.column += 1;
            self.line_chars += 1;
        }
        Ok(Some(unit))
    }

    /// Produce the next token, `Eof` at end of input.
    pub(crate) fn next_token(
        &mut self,
        expect_key: bool,
        sink: &mut impl ErrorSink,
    ) -> Result<Token, CifError> {
        if !self.started {
            self.started = true;
            // A byte-order mark is allowed as the very first code unit.
            if self.peek()? == Some(BOM) {
                self.buf.advance();
            }
        }
        loop {
            self.buf.begin_token();
            let (line, column) = (self.line, self.column);
            let Some(first) = self.peek()? else {
                if self.line_chars > LINE_LENGTH {
                    sink.report(Self::err(ErrorCode::OverlengthLine, line, column, ""))?;
                    self.line_chars = 0;
                }
                return Ok(self.finish(TokenKind::Eof, String::new(), line, column, sink)?);
            };
            let class = self.classes.classify(first);
            let token = match class {
                _ if class.meta() == MetaClass::Whitespace => {
                    self.scan_whitespace(sink)?;
                    self.ws_since = true;
                    let raw = self.buf.text();
                    return Ok(Token {
                        kind: TokenKind::Whitespace,
                        text: raw.clone(),
                        raw,
                        line,
                        column,
                    });
                }
                CharClass::Hash => {
                    self.scan_comment(sink)?;
                    let raw = self.buf.text();
                    self.check_adjacency(TokenKind::Comment, line, column, &raw, sink)?;
                    self.ws_since = true;
                    return Ok(Token {
                        kind: TokenKind::Comment,
                        text: raw.clone(),
                        raw,
                        line,
                        column,
                    });
                }
                CharClass::Undersc => {
                    self.scan_to_boundary(sink)?;
                    let raw = self.buf.text();
                    self.finish_with(TokenKind::Name, raw.clone(), raw, line, column, sink)?
                }
                CharClass::OBrak => self.single(TokenKind::OList, line, column, sink)?,
                CharClass::CBrak => self.single(TokenKind::CList, line, column, sink)?,
                CharClass::OCurl => self.single(TokenKind::OTable, line, column, sink)?,
                CharClass::CCurl => self.single(TokenKind::CTable, line, column, sink)?,
                CharClass::Quote => self.scan_quoted(first, expect_key, line, column, sink)?,
                CharClass::Semi if column == 1 => {
                    self.scan_text_block(expect_key, line, column, sink)?
                }
                _ => {
                    self.scan_to_boundary(sink)?;
                    let raw = self.buf.text();
                    if class == CharClass::Dollar {
                        sink.report(Self::err(
                            ErrorCode::InvalidBareValue,
                            line,
                            column,
                            raw.clone(),
                        ))?;
                    } else if matches!(class, CharClass::OBrak1 | CharClass::CBrak1) {
                        sink.report(Self::err(
                            ErrorCode::DisallowedInitialChar,
                            line,
                            column,
                            raw.clone(),
                        ))?;
                    }
                    match self.keyword(&raw) {
                        Some(Keyword::Block(code)) => {
                            self.finish_with(TokenKind::BlockHead, code, raw, line, column, sink)?
                        }
                        Some(Keyword::Frame(code)) => {
                            self.finish_with(TokenKind::FrameHead, code, raw, line, column, sink)?
                        }
                        Some(Keyword::FrameTerm) => self.finish_with(
                            TokenKind::FrameTerm,
                            String::new(),
                            raw,
                            line,
                            column,
                            sink,
                        )?,
                        Some(Keyword::Loop) => self.finish_with(
                            TokenKind::LoopKw,
                            String::new(),
                            raw,
                            line,
                            column,
                            sink,
                        )?,
                        Some(Keyword::Reserved) => {
                            sink.report(Self::err(
                                ErrorCode::ReservedWord,
                                line,
                                column,
                                raw.clone(),
                            ))?;
                            // Recovery: the word is dropped.
                            self.ws_since = true;
                            continue;
                        }
                        None => {
                            self.finish_with(TokenKind::Value, raw.clone(), raw, line, column, sink)?
                        }
                    }
                }
            };
            trace!(
                "token {:?} {:?} at {}:{}",
                token.kind,
                token.text,
                token.line,
                token.column
            );
            return Ok(token);
        }
    }

    fn finish(
        &mut self,
        kind: TokenKind,
        text: String,
        line: u32,
        column: u32,
        sink: &mut impl ErrorSink,
    ) -> Result<Token, CifError> {
        let raw = self.buf.text();
        self.finish_with(kind, text, raw, line, column, sink)
    }

    fn finish_with(
        &mut self,
        kind: TokenKind,
        text: String,
        raw: String,
        line: u32,
        column: u32,
        sink: &mut impl ErrorSink,
    ) -> Result<Token, CifError> {
        if kind != TokenKind::Eof {
            self.check_adjacency(kind, line, column, &raw, sink)?;
            self.ws_since = false;
            self.prev = Some(kind);
        }
        Ok(Token {
            kind,
            text,
            raw,
            line,
            column,
        })
    }

    /// Whitespace is required between adjacent tokens except before a
    /// closing bracket, after an opening bracket, and between a key and
    /// its value.
    fn check_adjacency(
        &mut self,
        kind: TokenKind,
        line: u32,
        column: u32,
        raw: &str,
        sink: &mut impl ErrorSink,
    ) -> Result<(), CifError> {
        let exempt = matches!(kind, TokenKind::CList | TokenKind::CTable)
            || matches!(
                self.prev,
                None | Some(
                    TokenKind::OList | TokenKind::OTable | TokenKind::Key | TokenKind::TKey
                )
            );
        if !self.ws_since && !exempt {
            sink.report(Self::err(ErrorCode::MissingSpace, line, column, raw))?;
        }
        Ok(())
    }

    fn single(
        &mut self,
        kind: TokenKind,
        line: u32,
        column: u32,
        sink: &mut impl ErrorSink,
    ) -> Result<Token, CifError> {
        self.consume(sink)?;
        let raw = self.buf.text();
        self.finish_with(kind, raw.clone(), raw, line, column, sink)
    }

    fn scan_whitespace(&mut self, sink: &mut impl ErrorSink) -> Result<(), CifError> {
        while let Some(unit) = self.peek()? {
            if self.classes.meta(unit) != MetaClass::Whitespace {
                break;
            }
            self.consume(sink)?;
        }
        Ok(())
    }

    fn scan_comment(&mut self, sink: &mut impl ErrorSink) -> Result<(), CifError> {
        self.consume(sink)?;
        while let Some(unit) = self.peek()? {
            if self.classes.classify(unit) == CharClass::Eol {
                break;
            }
            self.consume(sink)?;
        }
        Ok(())
    }

    /// Scan a data name or whitespace-delimited value to its boundary:
    /// whitespace in either dialect, any bracket in CIF 2.0.
    fn scan_to_boundary(&mut self, sink: &mut impl ErrorSink) -> Result<(), CifError> {
        self.consume(sink)?;
        while let Some(unit) = self.peek()? {
            let meta = self.classes.meta(unit);
            if meta == MetaClass::Whitespace {
                break;
            }
            if self.dialect == Dialect::V2 && matches!(meta, MetaClass::Open | MetaClass::Close) {
                break;
            }
            self.consume(sink)?;
        }
        Ok(())
    }

    fn scan_quoted(
        &mut self,
        quote: u32,
        expect_key: bool,
        line: u32,
        column: u32,
        sink: &mut impl ErrorSink,
    ) -> Result<Token, CifError> {
        self.consume(sink)?;
        let triple = self.dialect == Dialect::V2
            && self.peek()? == Some(quote)
            && self.peek_at(1)? == Some(quote);
        if triple {
            self.consume(sink)?;
            self.consume(sink)?;
        }
        self.buf.start_value();
        loop {
            match self.peek()? {
                None => {
                    self.buf.end_value(0);
                    let (l, c) = (self.line, self.column);
                    sink.report(Self::err(ErrorCode::MissingEndquote, l, c, self.buf.value()))?;
                    break;
                }
                Some(unit) if !triple && self.classes.classify(unit) == CharClass::Eol => {
                    self.buf.end_value(0);
                    let (l, c) = (self.line, self.column);
                    sink.report(Self::err(ErrorCode::MissingEndquote, l, c, self.buf.value()))?;
                    break;
                }
                Some(unit) if unit == quote => {
                    if triple {
                        if self.peek_at(1)? == Some(quote) && self.peek_at(2)? == Some(quote) {
                            self.buf.end_value(0);
                            self.consume(sink)?;
                            self.consume(sink)?;
                            self.consume(sink)?;
                            break;
                        }
                        self.consume(sink)?;
                    } else {
                        // In CIF 1.1 a closing quote counts only when
                        // whitespace (or end of input) follows.
                        let closes = match self.dialect {
                            Dialect::V2 => true,
                            Dialect::V1 => match self.peek_at(1)? {
                                None => true,
                                Some(next) => self.classes.meta(next) == MetaClass::Whitespace,
                            },
                        };
                        if closes {
                            self.buf.end_value(0);
                            self.consume(sink)?;
                            break;
                        }
                        self.consume(sink)?;
                    }
                }
                Some(_) => {
                    self.consume(sink)?;
                }
            }
        }
        let text = self.buf.value();
        let kind = if expect_key
            && self.dialect == Dialect::V2
            && self.peek()? == Some(COLON)
        {
            self.consume(sink)?;
            TokenKind::Key
        } else {
            TokenKind::QValue
        };
        self.finish(kind, text, line, column, sink)
    }

    fn scan_text_block(
        &mut self,
        expect_key: bool,
        line: u32,
        column: u32,
        sink: &mut impl ErrorSink,
    ) -> Result<Token, CifError> {
        self.consume(sink)?;
        self.buf.start_value();
        let mut closed = false;
        loop {
            match self.peek()? {
                None => {
                    self.buf.end_value(0);
                    let (l, c) = (self.line, self.column);
                    sink.report(Self::err(ErrorCode::UnclosedText, l, c, ""))?;
                    break;
                }
                Some(LF) => {
                    self.consume(sink)?;
                    if self.peek()? == Some(SEMI) {
                        self.buf.end_value(1);
                        self.consume(sink)?;
                        closed = true;
                        break;
                    }
                }
                Some(_) => {
                    self.consume(sink)?;
                }
            }
        }
        let text = self.buf.value();
        let kind = if closed
            && expect_key
            && self.dialect == Dialect::V2
            && self.peek()? == Some(COLON)
        {
            self.consume(sink)?;
            TokenKind::TKey
        } else {
            TokenKind::TValue
        };
        self.finish(kind, text, line, column, sink)
    }

    /// Reserved-word recognition over the letter classes, which makes
    /// it case-insensitive by construction.
    fn keyword(&self, raw: &str) -> Option<Keyword> {
        use CharClass::{Undersc, A, B, D, E, G, L, O, P, S, T, V};

        const DATA: [CharClass; 5] = [D, A, T, A, Undersc];
        const SAVE: [CharClass; 5] = [S, A, V, E, Undersc];
        const LOOP: [CharClass; 5] = [L, O, O, P, Undersc];
        const STOP: [CharClass; 5] = [S, T, O, P, Undersc];
        const GLOBAL: [CharClass; 7] = [G, L, O, B, A, L, Undersc];

        let classes: Vec<CharClass> = raw
            .chars()
            .map(|c| self.classes.classify(c as u32))
            .collect();
        let starts = |pattern: &[CharClass]| {
            classes.len() >= pattern.len() && classes[..pattern.len()] == *pattern
        };
        let exact = |pattern: &[CharClass]| classes.len() == pattern.len() && starts(pattern);

        if starts(&DATA) {
            let code: String = raw.chars().skip(5).collect();
            return Some(if code.is_empty() {
                Keyword::Reserved
            } else {
                Keyword::Block(code)
            });
        }
        if starts(&SAVE) {
            let code: String = raw.chars().skip(5).collect();
            return Some(if code.is_empty() {
                Keyword::FrameTerm
            } else {
                Keyword::Frame(code)
            });
        }
        if exact(&LOOP) {
            return Some(Keyword::Loop);
        }
        if exact(&STOP) || exact(&GLOBAL) {
            return Some(Keyword::Reserved);
        }
        None
    }
}

const fn is_noncharacter(unit: u32) -> bool {
    matches!(unit, 0xfdd0..=0xfdef) || unit & 0xffff >= 0xfffe
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Utf8Decoder;

    fn tokens_in(dialect: Dialect, input: &str) -> (Vec<Token>, Vec<SyntaxError>) {
        let options = ParseOptions::default();
        let mut scanner = Scanner::new(Utf8Decoder::new(input.as_bytes()), dialect, &options);
        let mut errors = Vec::new();
        let mut out = Vec::new();
        loop {
            let token = scanner.next_token(false, &mut errors).unwrap();
            let done = token.kind == TokenKind::Eof;
            if !matches!(token.kind, TokenKind::Whitespace | TokenKind::Eof) {
                out.push(token);
            }
            if done {
                break;
            }
        }
        (out, errors)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_stream() {
        let (tokens, errors) = tokens_in(Dialect::V2, "data_a\n_x 1\nloop_ _y _z 2 3\n");
        assert!(errors.is_empty());
        assert_eq!(
            vec![
                TokenKind::BlockHead,
                TokenKind::Name,
                TokenKind::Value,
                TokenKind::LoopKw,
                TokenKind::Name,
                TokenKind::Name,
                TokenKind::Value,
                TokenKind::Value,
            ],
            kinds(&tokens)
        );
        assert_eq!("a", tokens[0].text);
        assert_eq!("data_a", tokens[0].raw);
        assert_eq!("_x", tokens[1].text);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let (tokens, errors) = tokens_in(Dialect::V1, "DATA_Foo SAVE_bar save_ LOOP_\n");
        assert!(errors.is_empty());
        assert_eq!(
            vec![
                TokenKind::BlockHead,
                TokenKind::FrameHead,
                TokenKind::FrameTerm,
                TokenKind::LoopKw,
            ],
            kinds(&tokens)
        );
        assert_eq!("Foo", tokens[0].text);
        assert_eq!("DATA_Foo", tokens[0].raw);
    }

    #[test]
    fn test_reserved_words_dropped() {
        let (tokens, errors) = tokens_in(Dialect::V1, "data_a stop_ global_ data_ loop_x\n");
        assert_eq!(
            vec![TokenKind::BlockHead, TokenKind::Value],
            kinds(&tokens)
        );
        assert_eq!("loop_x", tokens[1].text);
        assert_eq!(
            vec![
                ErrorCode::ReservedWord,
                ErrorCode::ReservedWord,
                ErrorCode::ReservedWord
            ],
            errors.iter().map(|e| e.code).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_quotes_by_dialect() {
        // CIF 1.1: a closing quote must be followed by whitespace.
        let (tokens, errors) = tokens_in(Dialect::V1, "'a'b'c' 'd'\n");
        assert!(errors.is_empty());
        assert_eq!(vec![TokenKind::QValue, TokenKind::QValue], kinds(&tokens));
        assert_eq!("a'b'c", tokens[0].text);
        assert_eq!("d", tokens[1].text);

        // CIF 2.0: the first quote closes; abutting text is an error.
        let (tokens, errors) = tokens_in(Dialect::V2, "'a'b\n");
        assert_eq!(vec![TokenKind::QValue, TokenKind::Value], kinds(&tokens));
        assert_eq!("a", tokens[0].text);
        assert_eq!("b", tokens[1].text);
        assert_eq!(ErrorCode::MissingSpace, errors[0].code);
    }

    #[test]
    fn test_triple_quotes() {
        let (tokens, errors) = tokens_in(Dialect::V2, "'''a 'b' c''' \"\"\"x\ny\"\"\"\n");
        assert!(errors.is_empty());
        assert_eq!(vec![TokenKind::QValue, TokenKind::QValue], kinds(&tokens));
        assert_eq!("a 'b' c", tokens[0].text);
        assert_eq!("x\ny", tokens[1].text);
    }

    #[test]
    fn test_missing_endquote() {
        let (tokens, errors) = tokens_in(Dialect::V2, "'abc\n");
        assert_eq!(vec![TokenKind::QValue], kinds(&tokens));
        assert_eq!("abc", tokens[0].text);
        assert_eq!(ErrorCode::MissingEndquote, errors[0].code);
        assert_eq!((1, 5), (errors[0].line, errors[0].column));
    }

    #[test]
    fn test_text_block() {
        let (tokens, errors) = tokens_in(Dialect::V2, ";first\nsecond\n; after\n");
        assert!(errors.is_empty());
        assert_eq!(vec![TokenKind::TValue, TokenKind::Value], kinds(&tokens));
        assert_eq!("first\nsecond", tokens[0].text);
        assert_eq!("after", tokens[1].text);
    }

    #[test]
    fn test_semicolon_mid_line_is_bare() {
        let (tokens, errors) = tokens_in(Dialect::V2, "x ;y\n");
        assert!(errors.is_empty());
        assert_eq!(vec![TokenKind::Value, TokenKind::Value], kinds(&tokens));
        assert_eq!(";y", tokens[1].text);
    }

    #[test]
    fn test_crlf_equivalent_to_lf() {
        let (lf, _) = tokens_in(Dialect::V2, "data_a\n_x 1\n;t\nu\n;\n");
        let (crlf, _) = tokens_in(Dialect::V2, "data_a\r\n_x 1\r\n;t\r\nu\r\n;\r\n");
        let (cr, _) = tokens_in(Dialect::V2, "data_a\r_x 1\r;t\ru\r;\r");
        assert_eq!(lf, crlf);
        assert_eq!(lf, cr);
    }

    #[test]
    fn test_brackets_and_adjacency() {
        let (tokens, errors) = tokens_in(Dialect::V2, "[[a] b]{'k' v}\n");
        assert_eq!(
            vec![
                TokenKind::OList,
                TokenKind::OList,
                TokenKind::Value,
                TokenKind::CList,
                TokenKind::Value,
                TokenKind::CList,
                TokenKind::OTable,
                TokenKind::QValue,
                TokenKind::Value,
                TokenKind::CTable,
            ],
            kinds(&tokens)
        );
        // `{` abuts the closing `]`.
        assert_eq!(
            vec![ErrorCode::MissingSpace],
            errors.iter().map(|e| e.code).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_key_reclassification() {
        let options = ParseOptions::default();
        let mut scanner =
            Scanner::new(Utf8Decoder::new(&b"'k':v"[..]), Dialect::V2, &options);
        let mut errors = Vec::new();
        let token = scanner.next_token(true, &mut errors).unwrap();
        assert_eq!(TokenKind::Key, token.kind);
        assert_eq!("k", token.text);
        let token = scanner.next_token(false, &mut errors).unwrap();
        assert_eq!(TokenKind::Value, token.kind);
        assert_eq!("v", token.text);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_v1_brackets_are_values() {
        let (tokens, errors) = tokens_in(Dialect::V1, "[a] {b}\n");
        assert_eq!(vec![TokenKind::Value, TokenKind::Value], kinds(&tokens));
        assert_eq!("[a]", tokens[0].text);
        assert_eq!("{b}", tokens[1].text);
        assert_eq!(ErrorCode::DisallowedInitialChar, errors[0].code);
    }

    #[test]
    fn test_invalid_surrogate_replaced() {
        // 0xED 0xA0 0x80 encodes the surrogate U+D800.
        let mut bytes = b"data_a _x ".to_vec();
        bytes.extend_from_slice(&[0xed, 0xa0, 0x80]);
        bytes.push(b'\n');
        let options = ParseOptions::default();
        let mut scanner = Scanner::new(Utf8Decoder::new(&bytes[..]), Dialect::V2, &options);
        let mut errors = Vec::new();
        let mut value = None;
        loop {
            let token = scanner.next_token(false, &mut errors).unwrap();
            if token.kind == TokenKind::Eof {
                break;
            }
            if token.kind == TokenKind::Value {
                value = Some(token.text);
            }
        }
        assert!(errors.iter().any(|e| e.code == ErrorCode::InvalidChar));
        // The three bytes decode to one surrogate, replaced as one unit.
        assert_eq!(Some("\u{fffd}".to_string()), value);
    }

    #[test]
    fn test_overlength_line() {
        let input = format!("data_a _x {}\n_y 2\n", "v".repeat(LINE_LENGTH));
        let (_, errors) = tokens_in(Dialect::V2, &input);
        assert_eq!(vec![ErrorCode::OverlengthLine], errors.iter().map(|e| e.code).collect::<Vec<_>>());
        assert_eq!(1, errors[0].line);
    }
}
