use std::collections::VecDeque;
use std::io::Read;

use log::debug;

use crate::error::CifError;
use crate::options::{Dialect, DialectPreference, ParseOptions};

/// A pluggable source of Unicode code units.
///
/// Decoders pull bytes from an injected reader and yield one code point
/// at a time; `None` signals end of input. Malformed byte sequences are
/// passed through as unpaired surrogate values (`U+D800..U+DFFF`) so
/// the scanner can classify them as `InvalidChar` and substitute the
/// dialect's replacement character.
pub trait CharDecoder {
    fn next_unit(&mut self) -> Result<Option<u32>, CifError>;
}

const CHUNK: usize = 8 * 1024;

/// Buffered byte puller shared by the built-in decoders.
struct ByteSource<R: Read> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    eof: bool,
}

impl<R: Read> ByteSource<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; CHUNK],
            pos: 0,
            len: 0,
            eof: false,
        }
    }

    fn fill(&mut self) -> Result<(), CifError> {
        while self.pos == self.len && !self.eof {
            let n = self.reader.read(&mut self.buf)?;
            if n == 0 {
                self.eof = true;
            } else {
                self.pos = 0;
                self.len = n;
            }
        }
        Ok(())
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, CifError> {
        self.fill()?;
        Ok((self.pos < self.len).then(|| self.buf[self.pos]))
    }

    fn next_byte(&mut self) -> Result<Option<u8>, CifError> {
        let b = self.peek_byte()?;
        if b.is_some() {
            self.pos += 1;
        }
        Ok(b)
    }
}

const fn is_surrogate(unit: u32) -> bool {
    matches!(unit, 0xd800..=0xdfff)
}

/// Incremental UTF-8 decoder.
///
/// Each byte of a malformed sequence is yielded as the lone surrogate
/// `0xDC00 | byte`; a surrogate smuggled through a well-formed three-byte
/// sequence is yielded as itself. Either way the scanner sees an
/// unpaired surrogate.
pub struct Utf8Decoder<R: Read> {
    src: ByteSource<R>,
}

impl<R: Read> Utf8Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            src: ByteSource::new(reader),
        }
    }
}

impl<R: Read> CharDecoder for Utf8Decoder<R> {
    fn next_unit(&mut self) -> Result<Option<u32>, CifError> {
        let Some(b0) = self.src.next_byte()? else {
            return Ok(None);
        };
        if b0 < 0x80 {
            return Ok(Some(u32::from(b0)));
        }
        let (continuations, init) = match b0 {
            0xc2..=0xdf => (1, b0 & 0x1f),
            0xe0..=0xef => (2, b0 & 0x0f),
            0xf0..=0xf4 => (3, b0 & 0x07),
            _ => return Ok(Some(0xdc00 | u32::from(b0))),
        };
        let mut unit = u32::from(init);
        for _ in 0..continuations {
            match self.src.peek_byte()? {
                Some(b) if b & 0xc0 == 0x80 => {
                    self.src.pos += 1;
                    unit = unit << 6 | u32::from(b & 0x3f);
                }
                // The offending byte may begin a valid sequence; leave it.
                _ => return Ok(Some(0xdc00 | u32::from(b0))),
            }
        }
        let minimum = [0x80, 0x800, 0x10000][continuations - 1];
        if unit < minimum || unit > 0x0010_ffff {
            return Ok(Some(0xdc00 | u32::from(b0)));
        }
        Ok(Some(unit))
    }
}

/// Incremental UTF-16 decoder, either endianness.
///
/// Surrogate pairs are combined; an isolated surrogate is yielded
/// as-is for the scanner to flag.
pub struct Utf16Decoder<R: Read> {
    src: ByteSource<R>,
    big_endian: bool,
    pending: Option<u32>,
}

impl<R: Read> Utf16Decoder<R> {
    pub fn new(reader: R, big_endian: bool) -> Self {
        Self {
            src: ByteSource::new(reader),
            big_endian,
            pending: None,
        }
    }

    fn next_u16(&mut self) -> Result<Option<u32>, CifError> {
        if let Some(w) = self.pending.take() {
            return Ok(Some(w));
        }
        let Some(b0) = self.src.next_byte()? else {
            return Ok(None);
        };
        let Some(b1) = self.src.next_byte()? else {
            // Odd trailing byte.
            return Ok(Some(0xdc00 | u32::from(b0)));
        };
        let w = if self.big_endian {
            u32::from(b0) << 8 | u32::from(b1)
        } else {
            u32::from(b1) << 8 | u32::from(b0)
        };
        Ok(Some(w))
    }
}

impl<R: Read> CharDecoder for Utf16Decoder<R> {
    fn next_unit(&mut self) -> Result<Option<u32>, CifError> {
        let Some(w0) = self.next_u16()? else {
            return Ok(None);
        };
        if matches!(w0, 0xd800..=0xdbff) {
            match self.next_u16()? {
                Some(w1) if matches!(w1, 0xdc00..=0xdfff) => {
                    return Ok(Some(0x10000 + ((w0 - 0xd800) << 10) + (w1 - 0xdc00)));
                }
                other => {
                    self.pending = other;
                    return Ok(Some(w0));
                }
            }
        }
        Ok(Some(w0))
    }
}

/// UTF-32 decoder, either endianness.
pub struct Utf32Decoder<R: Read> {
    src: ByteSource<R>,
    big_endian: bool,
}

impl<R: Read> Utf32Decoder<R> {
    pub fn new(reader: R, big_endian: bool) -> Self {
        Self {
            src: ByteSource::new(reader),
            big_endian,
        }
    }
}

impl<R: Read> CharDecoder for Utf32Decoder<R> {
    fn next_unit(&mut self) -> Result<Option<u32>, CifError> {
        let Some(b0) = self.src.next_byte()? else {
            return Ok(None);
        };
        let mut bytes = [b0, 0, 0, 0];
        for slot in &mut bytes[1..] {
            let Some(b) = self.src.next_byte()? else {
                // Truncated final unit.
                return Ok(Some(0xdc00 | u32::from(b0)));
            };
            *slot = b;
        }
        let unit = if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        };
        // Out-of-range values go through; the scanner flags them.
        Ok(Some(unit))
    }
}

/// Decoder for any encoding `encoding_rs` knows by label.
///
/// Malformed sequences are replaced with U+FFFD by `encoding_rs` itself
/// and therefore never reach the scanner's `InvalidChar` path; this is
/// the documented trade-off for arbitrary legacy encodings.
pub struct LabelDecoder<R: Read> {
    reader: R,
    decoder: encoding_rs::Decoder,
    queue: VecDeque<char>,
    inbuf: Vec<u8>,
    done: bool,
}

impl<R: Read> LabelDecoder<R> {
    pub fn new(reader: R, label: &str) -> Result<Self, CifError> {
        let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| CifError::UnknownEncoding(label.to_string()))?;
        Ok(Self {
            reader,
            decoder: encoding.new_decoder(),
            queue: VecDeque::new(),
            inbuf: vec![0; CHUNK],
            done: false,
        })
    }
}

impl<R: Read> CharDecoder for LabelDecoder<R> {
    fn next_unit(&mut self) -> Result<Option<u32>, CifError> {
        loop {
            if let Some(c) = self.queue.pop_front() {
                return Ok(Some(c as u32));
            }
            if self.done {
                return Ok(None);
            }
            let n = self.reader.read(&mut self.inbuf)?;
            let last = n == 0;
            let mut input = &self.inbuf[..n];
            loop {
                let mut out = String::with_capacity(
                    self.decoder
                        .max_utf8_buffer_length(input.len())
                        .unwrap_or(input.len() * 3 + 16),
                );
                let (result, read, _had_errors) =
                    self.decoder.decode_to_string(input, &mut out, last);
                self.queue.extend(out.chars());
                input = &input[read..];
                if result == encoding_rs::CoderResult::InputEmpty {
                    break;
                }
            }
            if last {
                self.done = true;
            }
        }
    }
}

/// Static dispatch over the built-in decoders.
pub enum AnyDecoder<R: Read> {
    Utf8(Utf8Decoder<R>),
    Utf16(Utf16Decoder<R>),
    Utf32(Utf32Decoder<R>),
    Label(LabelDecoder<R>),
}

impl<R: Read> CharDecoder for AnyDecoder<R> {
    fn next_unit(&mut self) -> Result<Option<u32>, CifError> {
        match self {
            Self::Utf8(d) => d.next_unit(),
            Self::Utf16(d) => d.next_unit(),
            Self::Utf32(d) => d.next_unit(),
            Self::Label(d) => d.next_unit(),
        }
    }
}

/// The encoding chosen for an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DetectedEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    /// The caller-supplied default encoding label (UTF-8 if none).
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Detection {
    pub encoding: DetectedEncoding,
    pub dialect: Dialect,
    /// The dialect is CIF 2.0 but the detected encoding is not UTF-8.
    pub mismatch: bool,
}

const MAGIC: &str = "#\\#CIF_";
const MAGIC_V2: &str = "#\\#CIF_2.0";

/// Presence of the magic comment in decoded text: v2, other version, or
/// none.
fn sniff_magic(text: &str) -> Option<Dialect> {
    if let Some(rest) = text.strip_prefix(MAGIC_V2) {
        if rest.is_empty() || rest.starts_with([' ', '\t', '\n', '\r']) {
            return Some(Dialect::V2);
        }
    }
    text.starts_with(MAGIC).then_some(Dialect::V1)
}

/// Decode the first line's worth of `head` with the detected encoding,
/// for magic inspection.
fn decode_head(head: &[u8], encoding: DetectedEncoding, label: Option<&str>) -> String {
    let take = head.len().min(64 * 4);
    let mut decoder: AnyDecoder<&[u8]> = match encoding {
        DetectedEncoding::Utf8 => AnyDecoder::Utf8(Utf8Decoder::new(&head[..take])),
        DetectedEncoding::Utf16Le => AnyDecoder::Utf16(Utf16Decoder::new(&head[..take], false)),
        DetectedEncoding::Utf16Be => AnyDecoder::Utf16(Utf16Decoder::new(&head[..take], true)),
        DetectedEncoding::Utf32Le => AnyDecoder::Utf32(Utf32Decoder::new(&head[..take], false)),
        DetectedEncoding::Utf32Be => AnyDecoder::Utf32(Utf32Decoder::new(&head[..take], true)),
        DetectedEncoding::Default => match label {
            Some(label) => match LabelDecoder::new(&head[..take], label) {
                Ok(d) => AnyDecoder::Label(d),
                Err(_) => AnyDecoder::Utf8(Utf8Decoder::new(&head[..take])),
            },
            None => AnyDecoder::Utf8(Utf8Decoder::new(&head[..take])),
        },
    };
    let mut text = String::new();
    while let Ok(Some(unit)) = decoder.next_unit() {
        if unit == 0xfeff && text.is_empty() {
            continue;
        }
        let Some(c) = char::from_u32(unit).filter(|_| !is_surrogate(unit)) else {
            break;
        };
        if c == '\n' || c == '\r' || text.chars().count() > 80 {
            break;
        }
        text.push(c);
    }
    text
}

/// Choose encoding and dialect for an input from its first bytes.
///
/// Order of authority: a forced default encoding, then a Unicode
/// signature, then the ASCII-compatible magic, then the caller's
/// dialect preference.
pub(crate) fn detect(head: &[u8], options: &ParseOptions) -> Detection {
    let label = options.default_encoding.as_deref();
    let forced = options.force_default_encoding && label.is_some();

    let encoding = if forced {
        DetectedEncoding::Default
    } else if head.starts_with(&[0xff, 0xfe, 0x00, 0x00]) {
        DetectedEncoding::Utf32Le
    } else if head.starts_with(&[0x00, 0x00, 0xfe, 0xff]) {
        DetectedEncoding::Utf32Be
    } else if head.starts_with(&[0xff, 0xfe]) {
        DetectedEncoding::Utf16Le
    } else if head.starts_with(&[0xfe, 0xff]) {
        DetectedEncoding::Utf16Be
    } else if head.starts_with(&[0xef, 0xbb, 0xbf]) {
        DetectedEncoding::Utf8
    } else {
        // No signature: the magic, if present, is ASCII-compatible.
        match sniff_magic(&String::from_utf8_lossy(&head[..head.len().min(16)])) {
            Some(Dialect::V2) => DetectedEncoding::Utf8,
            _ => DetectedEncoding::Default,
        }
    };

    let magic = sniff_magic(&decode_head(head, encoding, label));
    let dialect = match options.dialect {
        DialectPreference::ForceV1 => Dialect::V1,
        DialectPreference::ForceV2 => Dialect::V2,
        DialectPreference::PreferV2 => magic.unwrap_or(Dialect::V2),
        DialectPreference::DefaultV1 => magic.unwrap_or(Dialect::V1),
    };
    let utf8 = matches!(encoding, DetectedEncoding::Utf8)
        || (matches!(encoding, DetectedEncoding::Default) && label.is_none());
    let detection = Detection {
        encoding,
        dialect,
        mismatch: dialect == Dialect::V2 && !utf8,
    };
    debug!("detected encoding {encoding:?}, dialect {dialect}");
    detection
}

/// Build the decoder a [`Detection`] calls for.
pub(crate) fn make_decoder<R: Read>(
    detection: Detection,
    reader: R,
    label: Option<&str>,
) -> Result<AnyDecoder<R>, CifError> {
    Ok(match detection.encoding {
        DetectedEncoding::Utf8 => AnyDecoder::Utf8(Utf8Decoder::new(reader)),
        DetectedEncoding::Utf16Le => AnyDecoder::Utf16(Utf16Decoder::new(reader, false)),
        DetectedEncoding::Utf16Be => AnyDecoder::Utf16(Utf16Decoder::new(reader, true)),
        DetectedEncoding::Utf32Le => AnyDecoder::Utf32(Utf32Decoder::new(reader, false)),
        DetectedEncoding::Utf32Be => AnyDecoder::Utf32(Utf32Decoder::new(reader, true)),
        DetectedEncoding::Default => match label {
            Some(label) => AnyDecoder::Label(LabelDecoder::new(reader, label)?),
            None => AnyDecoder::Utf8(Utf8Decoder::new(reader)),
        },
    })
}
