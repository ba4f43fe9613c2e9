use std::io::{Read, Write};

use unicode_normalization::UnicodeNormalization;

use crate::error::{CifError, Strict};
use crate::options::{ParseOptions, WriteOptions, MAX_NAME_LENGTH};
use crate::value::Value;

/// Normalized form of a block code, frame code, or data name:
/// decompose (NFD), case fold, recompose (NFC). Uniqueness is enforced
/// on this form.
pub(crate) fn normalize_name(name: &str) -> String {
    name.nfd().flat_map(char::to_lowercase).nfc().collect()
}

fn name_char_ok(c: char) -> bool {
    !c.is_control() && !matches!(c, ' ' | '\u{fdd0}'..='\u{fdef}') && (c as u32) & 0xffff < 0xfffe
}

/// A container code is valid when its characters are allowed and it is
/// short enough to fit a header line. The empty code is the anonymous
/// block a recovering parse synthesizes.
pub(crate) fn code_ok(code: &str) -> bool {
    code.chars().count() <= MAX_NAME_LENGTH && code.chars().all(name_char_ok)
}

/// A data name begins with an underscore, has at least one more
/// character, and fits the same limits as a code.
pub(crate) fn data_name_ok(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('_')
        && name.chars().count() > 1
        && name.chars().count() <= MAX_NAME_LENGTH
        && chars.all(name_char_ok)
}

/// A parsed CIF document: an insertion-ordered set of data blocks keyed
/// by normalized block code.
#[derive(Debug, Clone, Default)]
pub struct Cif {
    blocks: Vec<Container>,
}

impl Cif {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document, aborting on the first syntax error. Use
    /// [`crate::parse`] directly for lenient or event-driven parsing.
    pub fn parse(reader: impl Read, options: &ParseOptions) -> Result<Self, CifError> {
        let mut builder = crate::builder::CollectingBuilder::new();
        crate::parse(reader, options, &mut builder, &mut Strict)?;
        Ok(builder.into_cif())
    }

    /// Write the document in the dialect `options` selects.
    pub fn write(&self, sink: impl Write, options: &WriteOptions) -> Result<(), CifError> {
        crate::write::write(self, sink, options)
    }

    #[must_use]
    pub fn blocks(&self) -> &[Container] {
        &self.blocks
    }

    #[must_use]
    pub fn block(&self, code: &str) -> Option<&Container> {
        let normalized = normalize_name(code);
        self.blocks.iter().find(|b| b.normalized == normalized)
    }

    pub fn block_mut(&mut self, code: &str) -> Option<&mut Container> {
        let normalized = normalize_name(code);
        self.blocks.iter_mut().find(|b| b.normalized == normalized)
    }

    pub(crate) fn block_mut_at(&mut self, index: usize) -> Option<&mut Container> {
        self.blocks.get_mut(index)
    }

    /// Append a block without code validation, for parser recovery
    /// paths that accept an invalid code after reporting it.
    pub(crate) fn push_block_raw(&mut self, code: &str) -> usize {
        self.blocks.push(Container::raw(code));
        self.blocks.len() - 1
    }

    /// Add a data block. The code must be new and valid.
    pub fn add_block(&mut self, code: &str) -> Result<&mut Container, CifError> {
        let container = Container::new(code)?;
        if self.block(code).is_some() {
            return Err(CifError::DuplicateName(code.to_string()));
        }
        self.blocks.push(container);
        Ok(self.blocks.last_mut().expect("just pushed"))
    }
}

/// A data block or save frame: a code, scalar items, loops, and (for
/// blocks, or frames where nesting permits) child save frames.
#[derive(Debug, Clone)]
pub struct Container {
    code: String,
    normalized: String,
    items: Vec<Item>,
    loops: Vec<Loop>,
    frames: Vec<Container>,
}

#[derive(Debug, Clone)]
struct Item {
    name: String,
    normalized: String,
    value: Value,
}

impl Container {
    fn raw(code: &str) -> Self {
        Self {
            code: code.to_string(),
            normalized: normalize_name(code),
            items: Vec::new(),
            loops: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub(crate) fn new(code: &str) -> Result<Self, CifError> {
        if !code_ok(code) {
            return Err(CifError::InvalidName(code.to_string()));
        }
        Ok(Self::raw(code))
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The scalar value stored under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        let normalized = normalize_name(name);
        self.items
            .iter()
            .find(|i| i.normalized == normalized)
            .map(|i| &i.value)
    }

    /// Store a scalar value, replacing any existing value under the
    /// same normalized name.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), CifError> {
        if !data_name_ok(name) {
            return Err(CifError::InvalidName(name.to_string()));
        }
        let normalized = normalize_name(name);
        match self.items.iter_mut().find(|i| i.normalized == normalized) {
            Some(item) => item.value = value,
            None => self.items.push(Item {
                name: name.to_string(),
                normalized,
                value,
            }),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let normalized = normalize_name(name);
        let index = self.items.iter().position(|i| i.normalized == normalized)?;
        Some(self.items.remove(index).value)
    }

    /// Scalar items in insertion order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.items.iter().map(|i| (i.name.as_str(), &i.value))
    }

    #[must_use]
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// The loop that owns column `name`, if any.
    #[must_use]
    pub fn loop_for(&self, name: &str) -> Option<&Loop> {
        let normalized = normalize_name(name);
        self.loops
            .iter()
            .find(|l| l.normalized.iter().any(|n| *n == normalized))
    }

    /// Add a loop with the given columns. The empty category is
    /// reserved for the scalar loop; column names must be new within
    /// the container.
    pub fn add_loop(
        &mut self,
        category: Option<&str>,
        columns: &[&str],
    ) -> Result<&mut Loop, CifError> {
        if category == Some("") {
            return Err(CifError::ReservedLoop);
        }
        if columns.is_empty() {
            return Err(CifError::InvalidName(String::new()));
        }
        let mut normalized = Vec::with_capacity(columns.len());
        for name in columns {
            if !data_name_ok(name) {
                return Err(CifError::InvalidName((*name).to_string()));
            }
            let norm = normalize_name(name);
            let taken = normalized.contains(&norm)
                || self.items.iter().any(|i| i.normalized == norm)
                || self
                    .loops
                    .iter()
                    .any(|l| l.normalized.iter().any(|n| *n == norm));
            if taken {
                return Err(CifError::DuplicateName((*name).to_string()));
            }
            normalized.push(norm);
        }
        self.loops.push(Loop {
            category: category.map(str::to_string),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            normalized,
            rows: Vec::new(),
        });
        Ok(self.loops.last_mut().expect("just pushed"))
    }

    #[must_use]
    pub fn frames(&self) -> &[Container] {
        &self.frames
    }

    #[must_use]
    pub fn frame(&self, code: &str) -> Option<&Container> {
        let normalized = normalize_name(code);
        self.frames.iter().find(|f| f.normalized == normalized)
    }

    pub fn frame_mut(&mut self, code: &str) -> Option<&mut Container> {
        let normalized = normalize_name(code);
        self.frames.iter_mut().find(|f| f.normalized == normalized)
    }

    pub(crate) fn frame_mut_at(&mut self, index: usize) -> Option<&mut Container> {
        self.frames.get_mut(index)
    }

    /// Append a frame without code validation, for parser recovery
    /// paths that accept an invalid code after reporting it.
    pub(crate) fn push_frame_raw(&mut self, code: &str) -> usize {
        self.frames.push(Container::raw(code));
        self.frames.len() - 1
    }

    /// Add a save frame. The code must be new among this container's
    /// frames and valid.
    pub fn add_frame(&mut self, code: &str) -> Result<&mut Container, CifError> {
        let frame = Container::new(code)?;
        if self.frame(code).is_some() {
            return Err(CifError::DuplicateName(code.to_string()));
        }
        self.frames.push(frame);
        Ok(self.frames.last_mut().expect("just pushed"))
    }
}

/// An ordered set of column names with an ordered set of packets.
#[derive(Debug, Clone)]
pub struct Loop {
    category: Option<String>,
    columns: Vec<String>,
    normalized: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Loop {
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Append a packet; its values map positionally onto the columns.
    pub fn add_packet(&mut self, values: Vec<Value>) -> Result<(), CifError> {
        if values.len() != self.columns.len() {
            return Err(CifError::PacketLength {
                expected: self.columns.len(),
                got: values.len(),
            });
        }
        self.rows.push(values);
        Ok(())
    }

    pub fn packets(&self) -> impl Iterator<Item = Packet<'_>> {
        self.rows.iter().map(|row| Packet { owner: self, row })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One row of a loop, borrowing the loop for its column names.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    owner: &'a Loop,
    row: &'a [Value],
}

impl<'a> Packet<'a> {
    /// The value under column `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let normalized = normalize_name(name);
        let index = self.owner.normalized.iter().position(|n| *n == normalized)?;
        self.row.get(index)
    }

    #[must_use]
    pub fn values(&self) -> &'a [Value] {
        self.row
    }

    /// Column name and value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.owner
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.row.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_folds_and_recomposes() {
        assert_eq!(normalize_name("_Atom_Site"), normalize_name("_atom_site"));
        // NFD vs NFC spellings of the same name compare equal.
        assert_eq!(normalize_name("_caf\u{e9}"), normalize_name("_cafe\u{301}"));
        assert_ne!(normalize_name("_a"), normalize_name("_b"));
    }

    #[test]
    fn test_name_validation() {
        assert!(data_name_ok("_x"));
        assert!(data_name_ok("_atom_site.label"));
        assert!(!data_name_ok("x"));
        assert!(!data_name_ok("_"));
        assert!(!data_name_ok("_a b"));
        assert!(code_ok("b1"));
        assert!(code_ok(""));
        assert!(!code_ok("a\u{1}b"));
    }

    #[test]
    fn test_container_scalars() {
        let mut block = Container::new("b").unwrap();
        block.set("_x", Value::from_bare("1")).unwrap();
        block.set("_X", Value::from_bare("2")).unwrap();
        assert_eq!(1, block.items().count());
        assert_eq!(Some(&Value::from_bare("2")), block.get("_x"));
        assert!(block.set("no_underscore", Value::Unknown).is_err());
        assert_eq!(Some(Value::from_bare("2")), block.remove("_x"));
        assert_eq!(None, block.get("_x"));
    }

    #[test]
    fn test_loops_and_packets() {
        let mut block = Container::new("b").unwrap();
        block.set("_scalar", Value::Unknown).unwrap();
        let looped = block.add_loop(None, &["_a", "_b"]).unwrap();
        looped
            .add_packet(vec![Value::from_bare("1"), Value::from_bare("2")])
            .unwrap();
        assert!(looped.add_packet(vec![Value::Unknown]).is_err());

        assert!(block.add_loop(Some(""), &["_c"]).is_err());
        // `_a` is taken by the first loop, `_scalar` by the scalar loop.
        assert!(block.add_loop(None, &["_a"]).is_err());
        assert!(block.add_loop(None, &["_scalar"]).is_err());
        assert!(block.add_loop(None, &["_c", "_C"]).is_err());

        let looped = block.loop_for("_B").unwrap();
        let packet = looped.packets().next().unwrap();
        assert_eq!(Some(&Value::from_bare("2")), packet.get("_b"));
        assert_eq!(
            vec![("_a", &Value::from_bare("1")), ("_b", &Value::from_bare("2"))],
            packet.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_frames_nest() {
        let mut cif = Cif::new();
        let block = cif.add_block("outer").unwrap();
        let frame = block.add_frame("f1").unwrap();
        frame.set("_y", Value::NotApplicable).unwrap();
        frame.add_frame("inner").unwrap();
        assert!(block.add_frame("F1").is_err());
        assert!(cif.add_block("OUTER").is_err());
        assert!(cif.block("Outer").unwrap().frame("f1").unwrap().frame("inner").is_some());
    }
}
