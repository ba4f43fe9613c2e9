use crate::decode::CharDecoder;
use crate::error::CifError;

const INITIAL_CAPACITY: usize = 4096;

/// Growable sliding window of code points over a [`CharDecoder`].
///
/// Three cursors index the window: `text_start` marks the beginning of
/// the current token, `value_start` the beginning of its semantic value
/// (past any opening delimiter), and `next_char` the scan head, with
/// `text_start <= value_start <= next_char <= limit` at all times. An
/// optional `value_end` marks where the semantic value stops short of
/// the scan head (before a closing delimiter).
///
/// Refilling moves any unconsumed token text to the front of the window
/// and grows the window by half when the current token fills it. Line
/// terminators are normalized in the refill path: a CR not followed by
/// LF becomes LF, and CRLF collapses to a single LF, so downstream code
/// only ever sees LF.
pub(crate) struct ScanBuffer {
    units: Vec<u32>,
    text_start: usize,
    value_start: usize,
    value_end: Option<usize>,
    next_char: usize,
    limit: usize,
    eof: bool,
    pending_cr: bool,
}

impl ScanBuffer {
    pub(crate) fn new() -> Self {
        Self {
            units: vec![0; INITIAL_CAPACITY],
            text_start: 0,
            value_start: 0,
            value_end: None,
            next_char: 0,
            limit: 0,
            eof: false,
            pending_cr: false,
        }
    }

    /// Discard the current token and start a new one at the scan head.
    pub(crate) fn begin_token(&mut self) {
        self.text_start = self.next_char;
        self.value_start = self.next_char;
        self.value_end = None;
    }

    /// Mark the semantic value as starting at the scan head.
    pub(crate) fn start_value(&mut self) {
        self.value_start = self.next_char;
    }

    /// Mark the semantic value as ending `back` code points before the
    /// scan head.
    pub(crate) fn end_value(&mut self, back: usize) {
        self.value_end = Some(self.next_char - back);
    }

    /// Peek `ahead` code points past the scan head without consuming.
    pub(crate) fn peek_at(
        &mut self,
        ahead: usize,
        decoder: &mut impl CharDecoder,
    ) -> Result<Option<u32>, CifError> {
        while self.next_char + ahead >= self.limit && !self.eof {
            self.refill(decoder)?;
        }
        Ok((self.next_char + ahead < self.limit).then(|| self.units[self.next_char + ahead]))
    }

    pub(crate) fn peek(&mut self, decoder: &mut impl CharDecoder) -> Result<Option<u32>, CifError> {
        self.peek_at(0, decoder)
    }

    /// Consume the unit at the scan head. Call only after a successful
    /// non-empty peek.
    pub(crate) fn advance(&mut self) {
        debug_assert!(self.next_char < self.limit);
        self.next_char += 1;
    }

    /// Overwrite the most recently consumed unit (replacement of an
    /// invalid surrogate).
    pub(crate) fn replace_last(&mut self, unit: u32) {
        debug_assert!(self.next_char > self.text_start);
        self.units[self.next_char - 1] = unit;
    }

    fn to_string(units: &[u32]) -> String {
        units
            .iter()
            .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    /// The full text of the current token.
    pub(crate) fn text(&self) -> String {
        Self::to_string(&self.units[self.text_start..self.next_char])
    }

    /// The semantic value of the current token.
    pub(crate) fn value(&self) -> String {
        let end = self.value_end.unwrap_or(self.next_char);
        Self::to_string(&self.units[self.value_start..end])
    }

    fn refill(&mut self, decoder: &mut impl CharDecoder) -> Result<(), CifError> {
        if self.text_start > 0 {
            self.units.copy_within(self.text_start..self.limit, 0);
            let shift = self.text_start;
            self.text_start = 0;
            self.value_start -= shift;
            self.value_end = self.value_end.map(|e| e - shift);
            self.next_char -= shift;
            self.limit -= shift;
        }
        if self.limit == self.units.len() {
            // The current token fills the window; grow by half.
            let grown = self.units.len() + self.units.len() / 2;
            self.units.resize(grown, 0);
        }
        const CR: u32 = b'\r' as u32;
        const LF: u32 = b'\n' as u32;
        while self.limit < self.units.len() {
            match decoder.next_unit()? {
                None => {
                    self.eof = true;
                    break;
                }
                Some(CR) => {
                    self.units[self.limit] = LF;
                    self.limit += 1;
                    self.pending_cr = true;
                }
                Some(unit) => {
                    if unit == LF && self.pending_cr {
                        // CRLF already emitted as a single LF.
                        self.pending_cr = false;
                        continue;
                    }
                    self.pending_cr = false;
                    self.units[self.limit] = unit;
                    self.limit += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Utf8Decoder;

    fn drain(input: &[u8]) -> String {
        let mut decoder = Utf8Decoder::new(input);
        let mut buf = ScanBuffer::new();
        while buf.peek(&mut decoder).unwrap().is_some() {
            buf.advance();
        }
        buf.text()
    }

    #[test]
    fn test_newline_normalization() {
        assert_eq!("a\nb\nc\n", drain(b"a\r\nb\rc\n"));
        assert_eq!("\n\n\n", drain(b"\r\r\r\n"));
        assert_eq!("x\n", drain(b"x\r"));
    }

    #[test]
    fn test_cursor_discipline() {
        let mut decoder = Utf8Decoder::new(&b"'abc' rest"[..]);
        let mut buf = ScanBuffer::new();
        buf.begin_token();
        buf.advance_checked(&mut decoder); // opening quote
        buf.start_value();
        for _ in 0..3 {
            buf.advance_checked(&mut decoder);
        }
        buf.end_value(0);
        buf.advance_checked(&mut decoder); // closing quote
        assert_eq!("'abc'", buf.text());
        assert_eq!("abc", buf.value());
    }

    #[test]
    fn test_growth_preserves_token() {
        let long = "x".repeat(INITIAL_CAPACITY * 2);
        assert_eq!(long, drain(long.as_bytes()));
    }

    impl ScanBuffer {
        fn advance_checked(&mut self, decoder: &mut impl CharDecoder) {
            self.peek(decoder).unwrap().unwrap();
            self.advance();
        }
    }
}
