use std::fmt;

use bitflags::bitflags;

/// Maximum length of a CIF line, in code points.
pub const LINE_LENGTH: usize = 2048;

/// Maximum length of a block code, frame code, or data name, in code
/// points. Five code points of the line are taken by the `data_` /
/// `save_` prefix.
pub const MAX_NAME_LENGTH: usize = LINE_LENGTH - 5;

/// The two incompatible CIF dialects.
///
/// CIF 1.1 is a 7-bit format without list or table values; CIF 2.0 is a
/// Unicode format with both. A parser instance commits to one dialect
/// before scanning begins (see [`DialectPreference`] and the detection
/// rules in [`crate::decode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    V1,
    V2,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V1 => "1.1",
            Self::V2 => "2.0",
        })
    }
}

/// Caller preference for dialect selection.
///
/// Under the two middle states a `#\#CIF_2.0` magic comment selects
/// CIF 2.0 and any other `#\#CIF_` magic selects CIF 1.1; the
/// preference decides only when no magic is present. [`ForceV1`] and
/// [`ForceV2`] override the magic entirely. In terms of the numeric
/// `prefer_cif2` knob of the reference interface: negative values are
/// [`ForceV1`], `1..19` is [`PreferV2`], and `20` or more is
/// [`ForceV2`]; [`DefaultV1`] is the state of an absent hint.
///
/// [`ForceV1`]: DialectPreference::ForceV1
/// [`ForceV2`]: DialectPreference::ForceV2
/// [`PreferV2`]: DialectPreference::PreferV2
/// [`DefaultV1`]: DialectPreference::DefaultV1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialectPreference {
    /// CIF 1.1 regardless of any magic.
    ForceV1,
    /// No magic means CIF 1.1 (the default).
    #[default]
    DefaultV1,
    /// No magic means CIF 2.0.
    PreferV2,
    /// CIF 2.0 regardless of any magic.
    ForceV2,
}

bitflags! {
    /// The in-band text-block protocols.
    ///
    /// Which of them the parser decodes is controlled by
    /// [`ParseOptions::protocols`]; the writer applies them as output
    /// constraints demand.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Protocols: u8 {
        /// Line folding: a backslash immediately before an end of line
        /// joins that line to the next.
        const FOLD = 1;
        /// Line prefixing: every line of the block carries a prefix
        /// declared on its first line.
        const PREFIX = 1 << 1;
    }
}

/// Options controlling a parse.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Dialect to assume when the input has no magic comment.
    pub dialect: DialectPreference,
    /// Encoding label (as understood by WHATWG / `encoding_rs`) to use
    /// when no Unicode signature identifies the input encoding.
    pub default_encoding: Option<String>,
    /// Use [`default_encoding`](Self::default_encoding) verbatim,
    /// bypassing signature and magic detection.
    pub force_default_encoding: bool,
    /// Text-block protocols the parser decodes. Remove a flag to leave
    /// the corresponding in-band markup in the value text.
    pub protocols: Protocols,
    /// Save-frame nesting permitted: 0 disallows frames entirely, 1
    /// allows one level, larger values allow nesting.
    pub max_frame_depth: u32,
    /// Extra code points (below U+0080) to classify as inline whitespace.
    pub extra_ws_chars: Vec<char>,
    /// Extra code points (below U+0080) to classify as line terminators.
    pub extra_eol_chars: Vec<char>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            dialect: DialectPreference::default(),
            default_encoding: None,
            force_default_encoding: false,
            protocols: Protocols::all(),
            max_frame_depth: 1,
            extra_ws_chars: Vec::new(),
            extra_eol_chars: Vec::new(),
        }
    }
}

/// Options controlling a write.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Output dialect.
    pub dialect: Dialect,
    /// Target line length at which text-block lines are folded. Folding
    /// aims for this length and prefers to break at a whitespace
    /// boundary within six code points of it.
    pub fold_width: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::V2,
            fold_width: LINE_LENGTH,
        }
    }
}
