use std::collections::HashSet;
use std::io::{self, Read};

use log::debug;

use crate::builder::{Builder, Control};
use crate::decode::{detect, make_decoder, CharDecoder};
use crate::error::{CifError, ErrorCode, ErrorSink, SyntaxError};
use crate::model;
use crate::options::{Dialect, ParseOptions, Protocols};
use crate::scan::{Scanner, Token, TokenKind};
use crate::text::decode_text_block;
use crate::value::{Table, Value};

/// Separator for scope-qualified identifier keys; cannot occur in a
/// normalized name.
const SEP: char = '\u{1f}';

/// Parse a CIF document from a byte stream.
///
/// The first bytes are inspected for a Unicode signature and the
/// `#\#CIF_` magic to choose encoding and dialect (see the options
/// contract on [`ParseOptions`]). Builder callbacks run synchronously
/// on the calling thread, in document order; every recoverable error
/// goes through `sink`, whose verdict decides between the prescribed
/// recovery and aborting.
pub fn parse<R: Read, B: Builder, E: ErrorSink>(
    reader: R,
    options: &ParseOptions,
    builder: &mut B,
    sink: &mut E,
) -> Result<(), CifError> {
    let mut reader = reader;
    let mut head = Vec::with_capacity(4096);
    let mut chunk = [0u8; 1024];
    while head.len() < 4096 {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }
    let detection = detect(&head, options);
    let source = io::Cursor::new(head).chain(reader);
    let decoder = make_decoder(detection, source, options.default_encoding.as_deref())?;
    run(
        decoder,
        detection.dialect,
        detection.mismatch,
        options,
        builder,
        sink,
    )
}

/// Parse from an externally constructed [`CharDecoder`], bypassing
/// encoding detection.
pub fn parse_decoded<D: CharDecoder, B: Builder, E: ErrorSink>(
    decoder: D,
    dialect: Dialect,
    options: &ParseOptions,
    builder: &mut B,
    sink: &mut E,
) -> Result<(), CifError> {
    run(decoder, dialect, false, options, builder, sink)
}

fn run<D: CharDecoder, B: Builder, E: ErrorSink>(
    decoder: D,
    dialect: Dialect,
    mismatch: bool,
    options: &ParseOptions,
    builder: &mut B,
    sink: &mut E,
) -> Result<(), CifError> {
    let mut parser = Parser {
        scanner: Scanner::new(decoder, dialect, options),
        builder,
        sink,
        protocols: options.protocols,
        max_frame_depth: options.max_frame_depth,
        lookahead: None,
        skip: 0,
        ended: false,
        force_frame: false,
        containers_seen: HashSet::new(),
        items_seen: HashSet::new(),
    };
    if mismatch {
        parser.sink.report(SyntaxError {
            code: ErrorCode::WrongEncoding,
            line: 1,
            column: 1,
            text: String::new(),
        })?;
    }
    parser.document()
}

enum BodyExit {
    /// The frame's `save_` terminator was consumed.
    Terminated,
    /// The container ends at a pushed-back token (or end of input).
    Unterminated,
}

struct Parser<'a, D: CharDecoder, B: Builder, E: ErrorSink> {
    scanner: Scanner<D>,
    builder: &'a mut B,
    sink: &'a mut E,
    protocols: Protocols,
    max_frame_depth: u32,
    lookahead: Option<Token>,
    /// Skip depth: while positive, tokens are consumed and checked but
    /// no element callbacks are made and nothing is stored.
    skip: u32,
    ended: bool,
    /// Set while unwinding frames to reopen a disallowed frame head at
    /// depth one without reporting it again.
    force_frame: bool,
    /// Scope-qualified normalized block and frame codes.
    containers_seen: HashSet<String>,
    /// Scope-qualified normalized data names.
    items_seen: HashSet<String>,
}

impl<D: CharDecoder, B: Builder, E: ErrorSink> Parser<'_, D, B, E> {
    fn muted(&self) -> bool {
        self.skip > 0
    }

    fn next_significant(&mut self, expect_key: bool) -> Result<Token, CifError> {
        if let Some(token) = self.lookahead.take() {
            return Ok(token);
        }
        loop {
            let token = self.scanner.next_token(expect_key, self.sink)?;
            match token.kind {
                TokenKind::Whitespace => {
                    self.builder.whitespace(token.line, token.column, &token.raw);
                }
                TokenKind::Comment => {
                    self.builder.comment(token.line, token.column, &token.raw);
                }
                _ => return Ok(token),
            }
        }
    }

    fn push_back(&mut self, token: Token) {
        debug_assert!(self.lookahead.is_none());
        self.lookahead = Some(token);
    }

    fn report(&mut self, code: ErrorCode, token: &Token) -> Result<(), CifError> {
        debug!("{code:?} at {}:{}", token.line, token.column);
        self.sink.report(SyntaxError {
            code,
            line: token.line,
            column: token.column,
            text: token.raw.clone(),
        })
    }

    fn is_value_start(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Value
                | TokenKind::QValue
                | TokenKind::TValue
                | TokenKind::Key
                | TokenKind::TKey
                | TokenKind::OList
                | TokenKind::OTable
        )
    }

    fn document(&mut self) -> Result<(), CifError> {
        match self.builder.document_start()? {
            Control::Continue => {}
            Control::SkipCurrent | Control::SkipSiblings => self.skip += 1,
            Control::End => self.ended = true,
        }
        let mut skip_rest = false;
        while !self.ended {
            let token = self.next_significant(false)?;
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::BlockHead => self.parse_block(token, &mut skip_rest)?,
                _ => {
                    self.report(ErrorCode::NoBlockHeader, &token)?;
                    // Recovery: synthesize an anonymous block around
                    // the stray content.
                    self.push_back(token);
                    self.open_block(None, &mut skip_rest)?;
                }
            }
        }
        self.builder.document_end()?;
        Ok(())
    }

    fn parse_block(&mut self, head: Token, skip_rest: &mut bool) -> Result<(), CifError> {
        self.open_block(Some(head), skip_rest)
    }

    fn open_block(&mut self, head: Option<Token>, skip_rest: &mut bool) -> Result<(), CifError> {
        let mute = self.muted() || *skip_rest;
        let code = match &head {
            Some(token) => {
                if !mute {
                    self.builder.keyword(token.line, token.column, &token.raw);
                }
                if !model::code_ok(&token.text) {
                    self.report(ErrorCode::InvalidBlockCode, token)?;
                }
                token.text.clone()
            }
            None => String::new(),
        };
        let scope = format!("{SEP}{}", model::normalize_name(&code));
        if !self.containers_seen.insert(scope.clone()) {
            if let Some(token) = &head {
                // Recovery: reopen the existing block.
                self.report(ErrorCode::DupBlockCode, token)?;
            }
        }
        let control = if mute {
            Control::Continue
        } else {
            self.builder.block_start(&code)?
        };
        let skipped = matches!(control, Control::SkipCurrent | Control::SkipSiblings);
        if control == Control::SkipSiblings {
            *skip_rest = true;
        }
        if control == Control::End {
            self.ended = true;
        }
        let bump = mute || skipped;
        if bump {
            self.skip += 1;
        }
        self.parse_body(0, &scope)?;
        if bump {
            self.skip -= 1;
        }
        if !mute && !skipped {
            match self.builder.block_end(&code)? {
                Control::End => self.ended = true,
                Control::SkipSiblings => *skip_rest = true,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_frame(
        &mut self,
        head: Token,
        depth: u32,
        parent_scope: &str,
        skip_rest: &mut bool,
    ) -> Result<(), CifError> {
        let mute = self.muted() || *skip_rest;
        if !mute {
            self.builder.keyword(head.line, head.column, &head.raw);
        }
        let code = head.text.clone();
        if !model::code_ok(&code) || code.is_empty() {
            self.report(ErrorCode::InvalidFrameCode, &head)?;
        }
        let scope = format!("{parent_scope}{SEP}{}", model::normalize_name(&code));
        if !self.containers_seen.insert(scope.clone()) {
            // Recovery: reopen the existing frame.
            self.report(ErrorCode::DupFrameCode, &head)?;
        }
        let control = if mute {
            Control::Continue
        } else {
            self.builder.frame_start(&code)?
        };
        let skipped = matches!(control, Control::SkipCurrent | Control::SkipSiblings);
        if control == Control::SkipSiblings {
            *skip_rest = true;
        }
        if control == Control::End {
            self.ended = true;
        }
        let bump = mute || skipped;
        if bump {
            self.skip += 1;
        }
        self.parse_body(depth, &scope)?;
        if bump {
            self.skip -= 1;
        }
        if !mute && !skipped {
            match self.builder.frame_end(&code)? {
                Control::End => self.ended = true,
                Control::SkipSiblings => *skip_rest = true,
                _ => {}
            }
        }
        Ok(())
    }

    /// The interleaved items, loops, and frames of one container.
    /// `depth` is the frame nesting depth, zero in a data block.
    fn parse_body(&mut self, depth: u32, scope: &str) -> Result<BodyExit, CifError> {
        let mut skip_rest = false;
        loop {
            if self.ended {
                return Ok(BodyExit::Unterminated);
            }
            let token = self.next_significant(false)?;
            match token.kind {
                TokenKind::Eof | TokenKind::BlockHead => {
                    if depth > 0 {
                        // Recovery: close the frame without consuming.
                        self.report(ErrorCode::NoFrameTerminator, &token)?;
                    }
                    self.push_back(token);
                    return Ok(BodyExit::Unterminated);
                }
                TokenKind::FrameTerm => {
                    if depth > 0 {
                        if !(self.muted() || skip_rest) {
                            self.builder.keyword(token.line, token.column, &token.raw);
                        }
                        return Ok(BodyExit::Terminated);
                    }
                    // Recovery: drop the stray terminator.
                    self.report(ErrorCode::UnexpectedTerminator, &token)?;
                }
                TokenKind::FrameHead => {
                    let forced = std::mem::take(&mut self.force_frame);
                    if depth + 1 <= self.max_frame_depth {
                        self.parse_frame(token, depth + 1, scope, &mut skip_rest)?;
                    } else if depth == 0 {
                        if !forced {
                            self.report(ErrorCode::FrameNotAllowed, &token)?;
                        }
                        // Recovery: parse it as a depth-one frame.
                        self.parse_frame(token, 1, scope, &mut skip_rest)?;
                    } else {
                        if !forced {
                            self.report(ErrorCode::FrameNotAllowed, &token)?;
                        }
                        // Unwind to the block, then reopen there.
                        self.force_frame = true;
                        self.push_back(token);
                        return Ok(BodyExit::Unterminated);
                    }
                }
                TokenKind::Name => self.parse_item(token, scope, &mut skip_rest)?,
                TokenKind::LoopKw => self.parse_loop(token, scope, &mut skip_rest)?,
                TokenKind::CList | TokenKind::CTable => {
                    // Recovery: drop it.
                    self.report(ErrorCode::UnexpectedDelimiter, &token)?;
                }
                _ => {
                    debug_assert!(Self::is_value_start(token.kind));
                    let _ = self.value_from(token.clone())?;
                    // Recovery: the value is discarded.
                    self.report(ErrorCode::UnexpectedValue, &token)?;
                }
            }
        }
    }

    fn parse_item(
        &mut self,
        name_token: Token,
        scope: &str,
        skip_rest: &mut bool,
    ) -> Result<(), CifError> {
        let mute = self.muted() || *skip_rest;
        if !mute {
            self.builder
                .data_name(name_token.line, name_token.column, &name_token.raw);
        }
        let name = name_token.text.clone();
        let valid = model::data_name_ok(&name);
        if !valid {
            self.report(ErrorCode::InvalidItemName, &name_token)?;
        }
        let token = self.next_significant(false)?;
        let value = if Self::is_value_start(token.kind) {
            self.value_from(token)?
        } else {
            // Recovery: the item reads as unknown.
            self.report(ErrorCode::MissingValue, &token)?;
            self.push_back(token);
            Value::Unknown
        };
        if !valid {
            // Recovery: the item and its value are discarded.
            return Ok(());
        }
        let key = format!("{scope}{SEP}{}", model::normalize_name(&name));
        if !self.items_seen.insert(key) {
            // Recovery: the value is parsed and discarded.
            self.report(ErrorCode::DupItemName, &name_token)?;
            return Ok(());
        }
        if !mute && !self.ended {
            match self.builder.item(&name, &value)? {
                Control::End => self.ended = true,
                Control::SkipSiblings => *skip_rest = true,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_loop(
        &mut self,
        kw_token: Token,
        scope: &str,
        skip_rest: &mut bool,
    ) -> Result<(), CifError> {
        if !(self.muted() || *skip_rest) {
            self.builder
                .keyword(kw_token.line, kw_token.column, &kw_token.raw);
        }
        // Header: one or more data names.
        let mut columns: Vec<(String, bool)> = Vec::new();
        loop {
            let token = self.next_significant(false)?;
            if token.kind != TokenKind::Name {
                self.push_back(token);
                break;
            }
            if !(self.muted() || *skip_rest) {
                self.builder.data_name(token.line, token.column, &token.raw);
            }
            let name = token.text.clone();
            let mut keep = model::data_name_ok(&name);
            if !keep {
                self.report(ErrorCode::InvalidItemName, &token)?;
            } else {
                let key = format!("{scope}{SEP}{}", model::normalize_name(&name));
                if !self.items_seen.insert(key) {
                    // Recovery: the column's values are discarded.
                    self.report(ErrorCode::DupItemName, &token)?;
                    keep = false;
                }
            }
            columns.push((name, keep));
        }
        if columns.is_empty() {
            // Recovery: the loop_ is dropped; following values trip
            // their own errors.
            self.report(ErrorCode::NullLoop, &kw_token)?;
            return Ok(());
        }
        let kept: Vec<String> = columns
            .iter()
            .filter(|(_, keep)| *keep)
            .map(|(name, _)| name.clone())
            .collect();

        let mute = self.muted() || *skip_rest;
        let mut loop_muted = mute;
        if !mute {
            match self.builder.loop_start(&kept)? {
                Control::Continue => {}
                Control::SkipCurrent => loop_muted = true,
                Control::SkipSiblings => {
                    loop_muted = true;
                    *skip_rest = true;
                }
                Control::End => {
                    self.ended = true;
                    loop_muted = true;
                }
            }
        }

        let width = columns.len();
        let mut index = 0;
        let mut packets = 0usize;
        let mut packet_cb_open = false;
        let mut packet_muted = false;
        let mut end_token: Option<Token> = None;
        while !self.ended {
            let token = self.next_significant(false)?;
            match token.kind {
                kind if Self::is_value_start(kind) => {
                    if index == 0 && !loop_muted {
                        match self.builder.packet_start()? {
                            Control::Continue => packet_cb_open = true,
                            Control::SkipCurrent => packet_muted = true,
                            Control::SkipSiblings => loop_muted = true,
                            Control::End => self.ended = true,
                        }
                    }
                    let value = self.value_from(token)?;
                    let (name, keep) = &columns[index];
                    if *keep && !loop_muted && !packet_muted && !self.ended {
                        match self.builder.item(name, &value)? {
                            Control::End => self.ended = true,
                            Control::SkipSiblings => loop_muted = true,
                            _ => {}
                        }
                    }
                    index += 1;
                    if index == width {
                        index = 0;
                        packets += 1;
                        if packet_cb_open {
                            match self.builder.packet_end()? {
                                Control::End => self.ended = true,
                                Control::SkipSiblings => loop_muted = true,
                                _ => {}
                            }
                        }
                        packet_cb_open = false;
                        packet_muted = false;
                    }
                }
                TokenKind::CList | TokenKind::CTable => {
                    self.report(ErrorCode::UnexpectedDelimiter, &token)?;
                }
                _ => {
                    end_token = Some(token);
                    break;
                }
            }
        }
        if let Some(token) = end_token {
            if index != 0 {
                // Recovery: pad the final packet with unknowns.
                self.report(ErrorCode::PartialPacket, &token)?;
                for (name, keep) in &columns[index..] {
                    if *keep && !loop_muted && !packet_muted && !self.ended {
                        match self.builder.item(name, &Value::Unknown)? {
                            Control::End => self.ended = true,
                            Control::SkipSiblings => loop_muted = true,
                            _ => {}
                        }
                    }
                }
                packets += 1;
                if packet_cb_open {
                    self.builder.packet_end()?;
                }
            }
            self.push_back(token);
        }
        if packets == 0 && !self.ended {
            // Recovery: the empty loop is kept.
            self.report(ErrorCode::EmptyLoop, &kw_token)?;
        }
        if !mute {
            match self.builder.loop_end()? {
                Control::End => self.ended = true,
                Control::SkipSiblings => *skip_rest = true,
                _ => {}
            }
        }
        Ok(())
    }

    fn value_from(&mut self, token: Token) -> Result<Value, CifError> {
        match token.kind {
            TokenKind::Value => Ok(Value::from_bare(&token.text)),
            // A stray key in value position decays to its text.
            TokenKind::QValue | TokenKind::Key | TokenKind::TKey => Ok(Value::Char(token.text)),
            TokenKind::TValue => {
                let text =
                    decode_text_block(&token.text, self.protocols, token.line, self.sink)?;
                Ok(Value::Char(text))
            }
            TokenKind::OList => self.parse_list(),
            TokenKind::OTable => self.parse_table(),
            _ => {
                debug_assert!(false, "not a value start: {:?}", token.kind);
                Ok(Value::Unknown)
            }
        }
    }

    fn parse_list(&mut self) -> Result<Value, CifError> {
        let mut values = Vec::new();
        loop {
            let token = self.next_significant(false)?;
            match token.kind {
                TokenKind::CList => break,
                kind if Self::is_value_start(kind) => values.push(self.value_from(token)?),
                TokenKind::CTable => {
                    // Recovery: drop it.
                    self.report(ErrorCode::UnexpectedDelimiter, &token)?;
                }
                _ => {
                    // Recovery: close the list here.
                    self.report(ErrorCode::UnterminatedList, &token)?;
                    self.push_back(token);
                    break;
                }
            }
        }
        Ok(Value::List(values))
    }

    fn parse_table(&mut self) -> Result<Value, CifError> {
        let mut table = Table::new();
        loop {
            let token = self.next_significant(true)?;
            match token.kind {
                TokenKind::CTable => break,
                TokenKind::Key => {
                    let key = token.text.clone();
                    let value = self.pair_value()?;
                    table.insert(&key, value);
                }
                TokenKind::TKey => {
                    // Recovery: accept the text-block key.
                    self.report(ErrorCode::MisquotedKey, &token)?;
                    let key =
                        decode_text_block(&token.text, self.protocols, token.line, self.sink)?;
                    let value = self.pair_value()?;
                    table.insert(&key, value);
                }
                TokenKind::Value => {
                    if let Some(colon) = token.text.find(':') {
                        let key = token.text[..colon].to_string();
                        let rest = token.text[colon + 1..].to_string();
                        if key.is_empty() {
                            // Recovery: accept the empty key.
                            self.report(ErrorCode::NullKey, &token)?;
                        } else {
                            // Recovery: split at the first colon.
                            self.report(ErrorCode::UnquotedKey, &token)?;
                        }
                        let value = if rest.is_empty() {
                            self.pair_value()?
                        } else {
                            Value::from_bare(&rest)
                        };
                        table.insert(&key, value);
                    } else {
                        // Recovery: the value is discarded.
                        self.report(ErrorCode::MissingKey, &token)?;
                    }
                }
                TokenKind::QValue | TokenKind::TValue => {
                    self.report(ErrorCode::MissingKey, &token)?;
                }
                TokenKind::OList | TokenKind::OTable => {
                    let _ = self.value_from(token.clone())?;
                    self.report(ErrorCode::MissingKey, &token)?;
                }
                TokenKind::CList => {
                    self.report(ErrorCode::UnexpectedDelimiter, &token)?;
                }
                _ => {
                    // Recovery: close the table here.
                    self.report(ErrorCode::UnterminatedTable, &token)?;
                    self.push_back(token);
                    break;
                }
            }
        }
        Ok(Value::Table(table))
    }

    /// The value of a table pair, directly after its key.
    fn pair_value(&mut self) -> Result<Value, CifError> {
        let token = self.next_significant(false)?;
        if Self::is_value_start(token.kind) {
            self.value_from(token)
        } else {
            // Recovery: the pair reads as unknown.
            self.report(ErrorCode::MissingValue, &token)?;
            self.push_back(token);
            Ok(Value::Unknown)
        }
    }
}
