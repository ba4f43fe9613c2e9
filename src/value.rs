use std::fmt;

use unicode_normalization::UnicodeNormalization;

use crate::error::CifError;

/// A CIF data value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `?`: the value is not known.
    Unknown,
    /// `.`: the item is not applicable.
    NotApplicable,
    /// Free text.
    Char(String),
    /// A number with optional standard uncertainty.
    Number(Number),
    /// An ordered sequence of values (CIF 2.0).
    List(Vec<Value>),
    /// An insertion-ordered mapping (CIF 2.0).
    Table(Table),
}

impl Value {
    /// Interpret a whitespace-delimited token: `?`, `.`, a number, or
    /// free text.
    #[must_use]
    pub fn from_bare(text: &str) -> Self {
        match text {
            "?" => Self::Unknown,
            "." => Self::NotApplicable,
            _ => match Number::from_text(text) {
                Some(number) => Self::Number(number),
                None => Self::Char(text.to_string()),
            },
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    #[must_use]
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Self::NotApplicable)
    }

    /// If it is a `Char`, returns the text. Returns `None` otherwise.
    #[must_use]
    pub fn as_char(&self) -> Option<&str> {
        match self {
            Self::Char(text) => Some(text),
            _ => None,
        }
    }

    /// If it is a `Number`, returns it. Returns `None` otherwise.
    #[must_use]
    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Self::Number(number) => Some(number),
            _ => None,
        }
    }

    /// If it is a `List`, returns the elements. Returns `None` otherwise.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    /// If it is a `Table`, returns it. Returns `None` otherwise.
    #[must_use]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }
}

/// A numeric value kept in exact decimal form.
///
/// The value is `sign * digits * 10^-scale`; `su_digits`, when present,
/// expresses the standard uncertainty at the same scale. The original
/// source text is cached so writing a parsed number reproduces it
/// byte for byte.
#[derive(Debug, Clone)]
pub struct Number {
    sign: i8,
    digits: String,
    scale: i32,
    su_digits: Option<String>,
    text: Option<String>,
}

/// Equality disregards the cached text: two numbers are equal when
/// sign, digits, scale, and uncertainty agree.
impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.sign == other.sign
            && self.digits == other.digits
            && self.scale == other.scale
            && self.su_digits == other.su_digits
    }
}

fn trim_zeros(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

impl Number {
    /// Parse the CIF numeric syntax: optional sign, digits with an
    /// optional embedded point, optional exponent, optional
    /// parenthesized uncertainty digits. Returns `None` when `text` is
    /// not entirely numeric.
    #[must_use]
    pub fn from_text(text: &str) -> Option<Self> {
        let mut rest = text;
        let sign = if let Some(r) = rest.strip_prefix('-') {
            rest = r;
            -1
        } else {
            if let Some(r) = rest.strip_prefix('+') {
                rest = r;
            }
            1
        };

        let take_digits = |s: &mut &str| -> String {
            let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
            let (digits, tail) = s.split_at(end);
            *s = tail;
            digits.to_string()
        };

        let int_part = take_digits(&mut rest);
        let frac_part = if let Some(r) = rest.strip_prefix('.') {
            rest = r;
            take_digits(&mut rest)
        } else {
            String::new()
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let mut exponent: i32 = 0;
        if let Some(r) = rest.strip_prefix(['e', 'E']) {
            rest = r;
            let exp_sign = if let Some(r) = rest.strip_prefix('-') {
                rest = r;
                -1
            } else {
                if let Some(r) = rest.strip_prefix('+') {
                    rest = r;
                }
                1
            };
            let exp_digits = take_digits(&mut rest);
            if exp_digits.is_empty() {
                return None;
            }
            exponent = exp_sign * exp_digits.parse::<i32>().ok()?;
        }

        let su_digits = if let Some(r) = rest.strip_prefix('(') {
            rest = r;
            let su = take_digits(&mut rest);
            rest = rest.strip_prefix(')')?;
            if su.is_empty() {
                return None;
            }
            Some(trim_zeros(&su).to_string())
        } else {
            None
        };
        if !rest.is_empty() {
            return None;
        }

        let scale = i32::try_from(frac_part.len()).ok()?.checked_sub(exponent)?;
        let mut digits = int_part;
        digits.push_str(&frac_part);
        Some(Self {
            sign,
            digits: trim_zeros(&digits).to_string(),
            scale,
            su_digits,
            text: Some(text.to_string()),
        })
    }

    /// Build a number from a floating-point value, keeping `scale`
    /// digits after the decimal point and rounding `su` to the same
    /// scale. Decimal notation is chosen unless the scale is negative
    /// or the rendering would need more than `max_leading_zeros` zeros
    /// between the point and the first significant digit.
    pub fn new(
        value: f64,
        su: Option<f64>,
        scale: i32,
        max_leading_zeros: u32,
    ) -> Result<Self, CifError> {
        if !value.is_finite() {
            return Err(CifError::InvalidNumber("not finite"));
        }
        if su.is_some_and(|su| !su.is_finite() || su < 0.0) {
            return Err(CifError::InvalidNumber("negative or non-finite uncertainty"));
        }
        if scale.abs() > 308 {
            return Err(CifError::InvalidNumber("scale out of range"));
        }
        let scaled = |x: f64| -> Result<String, CifError> {
            let shifted = (x * 10f64.powi(scale)).round().abs();
            if !shifted.is_finite() {
                return Err(CifError::InvalidNumber("scaled value overflows"));
            }
            let rendered = format!("{shifted:.0}");
            Ok(trim_zeros(&rendered).to_string())
        };
        let digits = scaled(value)?;
        let su_digits = su.map(scaled).transpose()?;
        let sign = if value < 0.0 { -1 } else { 1 };
        let mut number = Self {
            sign,
            digits,
            scale,
            su_digits,
            text: None,
        };
        number.text = Some(number.render(max_leading_zeros));
        Ok(number)
    }

    #[must_use]
    pub fn sign(&self) -> i8 {
        self.sign
    }

    /// The significant digits, leading zeros trimmed.
    #[must_use]
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Count of digits after the implied decimal point; negative for a
    /// positive exponent.
    #[must_use]
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Standard uncertainty digits at the same scale as the value.
    #[must_use]
    pub fn su_digits(&self) -> Option<&str> {
        self.su_digits.as_deref()
    }

    /// The cached source or canonical rendering, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Approximate floating-point value.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        let magnitude: f64 = self.digits.parse().unwrap_or(f64::NAN);
        f64::from(self.sign) * magnitude * 10f64.powi(-self.scale)
    }

    /// Approximate floating-point standard uncertainty.
    #[must_use]
    pub fn su_as_f64(&self) -> Option<f64> {
        let su = self.su_digits.as_ref()?;
        let magnitude: f64 = su.parse().unwrap_or(f64::NAN);
        Some(magnitude * 10f64.powi(-self.scale))
    }

    /// The textual form: the cached text when present, a canonical
    /// rendering otherwise.
    #[must_use]
    pub fn format(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => self.render(5),
        }
    }

    fn render(&self, max_leading_zeros: u32) -> String {
        let mut out = String::new();
        if self.sign < 0 {
            out.push('-');
        }
        let digits = self.digits.as_str();
        let length = i32::try_from(digits.len()).unwrap_or(i32::MAX);
        let leading_zeros = self.scale.saturating_sub(length).max(0);
        if self.scale >= 0 && leading_zeros <= max_leading_zeros as i32 {
            let scale = self.scale as usize;
            if scale == 0 {
                out.push_str(digits);
            } else if digits.len() > scale {
                let split = digits.len() - scale;
                out.push_str(&digits[..split]);
                out.push('.');
                out.push_str(&digits[split..]);
            } else {
                out.push_str("0.");
                for _ in 0..scale - digits.len() {
                    out.push('0');
                }
                out.push_str(digits);
            }
        } else {
            out.push_str(&digits[..1]);
            if digits.len() > 1 {
                out.push('.');
                out.push_str(&digits[1..]);
            }
            let exponent = length - 1 - self.scale;
            out.push('e');
            out.push_str(&exponent.to_string());
        }
        if let Some(su) = &self.su_digits {
            out.push('(');
            out.push_str(su);
            out.push(')');
        }
        out
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// An insertion-ordered mapping from table key to value.
///
/// Lookup is by the NFC-normalized form of the key; the key's original
/// spelling is preserved for writing. Inserting under an existing key
/// replaces the value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    entries: Vec<TableEntry>,
}

#[derive(Debug, Clone, PartialEq)]
struct TableEntry {
    key: String,
    normalized: String,
    value: Value,
}

fn normalize_key(key: &str) -> String {
    key.nfc().collect()
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        let normalized = normalize_key(key);
        match self.entries.iter_mut().find(|e| e.normalized == normalized) {
            Some(entry) => entry.value = value,
            None => self.entries.push(TableEntry {
                key: key.to_string(),
                normalized,
                value,
            }),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        let normalized = normalize_key(key);
        self.entries
            .iter()
            .find(|e| e.normalized == normalized)
            .map(|e| &e.value)
    }

    /// Entries in insertion order, with their original key spellings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|e| (e.key.as_str(), &e.value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
