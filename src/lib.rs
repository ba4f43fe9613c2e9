//! Streaming parser and writer for CIF (Crystallographic Information
//! File) documents, covering both the 1.1 and 2.0 dialects.

mod buffer;
/// Builder callbacks driven by the parser
pub mod builder;
mod classify;
/// Character decoders and encoding detection
pub mod decode;
/// Error catalog and error sinks
pub mod error;
/// In-memory document model
pub mod model;
/// Parse and write options
pub mod options;
/// The dialect-aware parser
pub mod parse;
mod scan;
mod text;
/// Data values and numbers
pub mod value;
mod write;

pub use self::builder::{Builder, CollectingBuilder, Control};
pub use self::decode::{CharDecoder, Utf16Decoder, Utf32Decoder, Utf8Decoder};
pub use self::error::{CifError, ErrorCode, ErrorSink, Lenient, Strict, SyntaxError};
pub use self::model::{Cif, Container, Loop, Packet};
pub use self::options::{
    Dialect, DialectPreference, ParseOptions, Protocols, WriteOptions, LINE_LENGTH,
};
pub use self::parse::{parse, parse_decoded};
pub use self::value::{Number, Table, Value};
