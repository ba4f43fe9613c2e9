use std::{error, fmt, io};

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Numeric catalog of the recoverable errors a parse can report.
///
/// Codes are grouped by the layer that detects them: 1xx character
/// level, 2xx lexical, 3xx syntactic, 4xx semantic. The numbering is
/// stable API; [`ErrorSink`] implementations may rely on it.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum ErrorCode {
    /// A CIF 2.0 document in an encoding other than UTF-8.
    WrongEncoding = 101,
    /// An unpaired surrogate or malformed input sequence.
    InvalidChar = 102,
    /// A code point CIF does not allow (controls, noncharacters, a
    /// non-initial byte-order mark, or any non-ASCII in CIF 1.1).
    DisallowedChar = 103,
    /// A line longer than 2048 code points.
    OverlengthLine = 104,

    /// Two tokens not separated by whitespace.
    MissingSpace = 201,
    /// A quoted string left open at the end of its line (or of the
    /// input, for a triple-quoted string).
    MissingEndquote = 202,
    /// A text block left open at the end of the input.
    UnclosedText = 203,
    /// A whitespace-delimited value beginning with `$`.
    InvalidBareValue = 204,
    /// A bare `data_`, `stop_`, or `global_`.
    ReservedWord = 205,
    /// A whitespace-delimited value beginning with a character reserved
    /// for future use by the active dialect.
    DisallowedInitialChar = 206,

    /// Content before the first `data_` header.
    NoBlockHeader = 301,
    /// A closing `]` or `}` with no matching opener, or an opener of
    /// the wrong kind.
    UnexpectedDelimiter = 302,
    /// A `save_` terminator outside any save frame.
    UnexpectedTerminator = 303,
    /// A value with no data name to attach it to.
    UnexpectedValue = 304,
    /// A save frame closed by something other than `save_`.
    NoFrameTerminator = 305,
    /// A list closed by something other than `]`.
    UnterminatedList = 306,
    /// A table closed by something other than `}`.
    UnterminatedTable = 307,
    /// A `loop_` with no data names.
    NullLoop = 308,
    /// A loop with data names but no values.
    EmptyLoop = 309,
    /// A loop whose value count is not a multiple of its column count.
    PartialPacket = 310,
    /// A data name or table key with no value.
    MissingValue = 311,
    /// A value in table-key position.
    MissingKey = 312,
    /// A table key with no text before its colon.
    NullKey = 313,
    /// An unquoted table key.
    UnquotedKey = 314,
    /// A table key given as a text block.
    MisquotedKey = 315,
    /// A text-block line lacking the declared prefix.
    MissingPrefix = 316,
    /// A save frame where the configured nesting depth forbids one.
    FrameNotAllowed = 317,

    /// A block code that is not a valid identifier.
    InvalidBlockCode = 401,
    /// A block code already used in this document.
    DupBlockCode = 402,
    /// A frame code that is not a valid identifier.
    InvalidFrameCode = 403,
    /// A frame code already used in its container.
    DupFrameCode = 404,
    /// A data name that is not a valid identifier.
    InvalidItemName = 405,
    /// A data name already used in its container.
    DupItemName = 406,
    /// A value kind the active dialect cannot express.
    DisallowedValue = 407,
    /// The reserved scalar-loop category.
    ReservedLoop = 408,
}

impl ErrorCode {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::WrongEncoding => "CIF 2.0 document not encoded in UTF-8",
            Self::InvalidChar => "invalid character",
            Self::DisallowedChar => "disallowed character",
            Self::OverlengthLine => "line exceeds 2048 code points",
            Self::MissingSpace => "missing whitespace between tokens",
            Self::MissingEndquote => "unterminated quoted string",
            Self::UnclosedText => "unterminated text block",
            Self::InvalidBareValue => "invalid unquoted value",
            Self::ReservedWord => "reserved word",
            Self::DisallowedInitialChar => "value begins with a reserved character",
            Self::NoBlockHeader => "content before the first data block header",
            Self::UnexpectedDelimiter => "unexpected bracket",
            Self::UnexpectedTerminator => "save_ terminator outside a save frame",
            Self::UnexpectedValue => "value without a data name",
            Self::NoFrameTerminator => "save frame not terminated by save_",
            Self::UnterminatedList => "list not terminated by ]",
            Self::UnterminatedTable => "table not terminated by }",
            Self::NullLoop => "loop_ with no data names",
            Self::EmptyLoop => "loop with no values",
            Self::PartialPacket => "loop values do not fill the final packet",
            Self::MissingValue => "missing value",
            Self::MissingKey => "value in table-key position",
            Self::NullKey => "empty table key",
            Self::UnquotedKey => "unquoted table key",
            Self::MisquotedKey => "table key given as a text block",
            Self::MissingPrefix => "text-block line lacks the declared prefix",
            Self::FrameNotAllowed => "save frame not allowed here",
            Self::InvalidBlockCode => "invalid block code",
            Self::DupBlockCode => "duplicate block code",
            Self::InvalidFrameCode => "invalid frame code",
            Self::DupFrameCode => "duplicate frame code",
            Self::InvalidItemName => "invalid data name",
            Self::DupItemName => "duplicate data name",
            Self::DisallowedValue => "value kind not expressible in this dialect",
            Self::ReservedLoop => "reserved loop category",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A recoverable error detected during a parse, located in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub code: ErrorCode,
    /// 1-based line of the offending text.
    pub line: u32,
    /// 1-based column (in code points) of the offending text.
    pub column: u32,
    /// The source text the error was detected at; may be empty when no
    /// token text is available (end of input, for example).
    pub text: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {}, column {}",
            self.code, self.line, self.column
        )?;
        if !self.text.is_empty() {
            write!(f, ": {:?}", self.text)?;
        }
        Ok(())
    }
}

impl error::Error for SyntaxError {}

/// Any failure the crate can produce.
#[derive(Debug)]
pub enum CifError {
    /// The parse was aborted at a reported syntax error.
    Syntax(SyntaxError),
    /// An identifier rejected by the data model.
    InvalidName(String),
    /// An identifier already in use within its scope.
    DuplicateName(String),
    /// The empty loop category, which names the scalar loop.
    ReservedLoop,
    /// A numeric value that cannot be represented.
    InvalidNumber(&'static str),
    /// A packet whose value count does not match its loop's columns.
    PacketLength { expected: usize, got: usize },
    /// A value that cannot be written in the output dialect.
    DisallowedValue(&'static str),
    /// A character that cannot be written in the output dialect.
    DisallowedChar(char),
    /// An encoding label `encoding_rs` does not recognize.
    UnknownEncoding(String),
    Io(io::Error),
}

impl fmt::Display for CifError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(err) => err.fmt(f),
            Self::InvalidName(name) => write!(f, "invalid identifier {name:?}"),
            Self::DuplicateName(name) => write!(f, "identifier {name:?} already in use"),
            Self::ReservedLoop => f.write_str("the empty loop category is reserved"),
            Self::InvalidNumber(what) => write!(f, "unrepresentable number: {what}"),
            Self::PacketLength { expected, got } => {
                write!(f, "packet has {got} values, loop has {expected} columns")
            }
            Self::DisallowedValue(what) => {
                write!(f, "value not expressible in this dialect: {what}")
            }
            Self::DisallowedChar(c) => {
                write!(f, "character {c:?} not expressible in this dialect")
            }
            Self::UnknownEncoding(label) => write!(f, "unknown encoding label {label:?}"),
            Self::Io(err) => err.fmt(f),
        }
    }
}

impl error::Error for CifError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Syntax(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CifError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<SyntaxError> for CifError {
    fn from(err: SyntaxError) -> Self {
        Self::Syntax(err)
    }
}

/// Receives every error a parse detects and decides its fate.
///
/// Returning `Ok(())` requests the prescribed recovery for that error;
/// returning `Err` aborts the parse with that error.
pub trait ErrorSink {
    fn report(&mut self, error: SyntaxError) -> Result<(), CifError>;
}

/// Abort on the first error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Strict;

impl ErrorSink for Strict {
    fn report(&mut self, error: SyntaxError) -> Result<(), CifError> {
        Err(error.into())
    }
}

/// Recover from every error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lenient;

impl ErrorSink for Lenient {
    fn report(&mut self, _error: SyntaxError) -> Result<(), CifError> {
        Ok(())
    }
}

/// Collect every error and recover.
impl ErrorSink for Vec<SyntaxError> {
    fn report(&mut self, error: SyntaxError) -> Result<(), CifError> {
        self.push(error);
        Ok(())
    }
}

#[test]
fn test_code_numbering() {
    assert_eq!(101u32, ErrorCode::WrongEncoding.into());
    assert_eq!(310u32, ErrorCode::PartialPacket.into());
    assert_eq!(Ok(ErrorCode::DupItemName), ErrorCode::try_from(406u32));
    assert!(ErrorCode::try_from(999u32).is_err());
}

#[test]
fn test_sink_behaviour() {
    let err = SyntaxError {
        code: ErrorCode::MissingValue,
        line: 3,
        column: 7,
        text: "_x".to_string(),
    };
    assert!(Strict.report(err.clone()).is_err());
    assert!(Lenient.report(err.clone()).is_ok());
    let mut collected = Vec::new();
    collected.report(err.clone()).unwrap();
    assert_eq!(vec![err], collected);
}
