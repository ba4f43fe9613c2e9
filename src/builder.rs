use crate::error::CifError;
use crate::model::{Cif, Container};
use crate::value::Value;

/// Navigation returned by a [`Builder`] callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    /// Proceed normally.
    #[default]
    Continue,
    /// Skip the element just started: its content is still parsed and
    /// checked, but no further callbacks are made for it.
    SkipCurrent,
    /// Skip the element just started and everything after it in its
    /// container.
    SkipSiblings,
    /// Stop the parse after cleanly closing open containers.
    End,
}

/// Receives callbacks while a document is parsed, in strict document
/// order.
///
/// Storage lives behind this trait: the parser never retains values.
/// A value handed to [`item`](Self::item) is borrowed for the duration
/// of the callback; copy it to keep it. For a loop the sequence is
/// `loop_start`, then per packet `packet_start`, `item` per column,
/// `packet_end`, then `loop_end`.
///
/// Every method has a default body, so an implementation mentions only
/// the events it cares about. Errors returned from a callback abort the
/// parse with that error.
pub trait Builder {
    fn document_start(&mut self) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    fn document_end(&mut self) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    fn block_start(&mut self, _code: &str) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    fn block_end(&mut self, _code: &str) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    fn frame_start(&mut self, _code: &str) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    fn frame_end(&mut self, _code: &str) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    fn loop_start(&mut self, _columns: &[String]) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    fn loop_end(&mut self) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    fn packet_start(&mut self) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    fn packet_end(&mut self) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }
    /// A scalar item or one looped value; precedes any storage, and the
    /// returned navigation decides whether storage happens.
    fn item(&mut self, _name: &str, _value: &Value) -> Result<Control, CifError> {
        Ok(Control::Continue)
    }

    /// A run of whitespace, reported as scanned.
    fn whitespace(&mut self, _line: u32, _column: u32, _text: &str) {}
    /// A comment, `#` included, reported as scanned.
    fn comment(&mut self, _line: u32, _column: u32, _text: &str) {}
    /// A `data_`, `save_`, or `loop_` keyword, as spelled in the input.
    fn keyword(&mut self, _line: u32, _column: u32, _text: &str) {}
    /// A data name, as spelled in the input.
    fn data_name(&mut self, _line: u32, _column: u32, _text: &str) {}
}

/// A builder that assembles the whole document into a [`Cif`].
///
/// Reopens an existing block or frame when the parser recovers from a
/// duplicate code by revisiting it.
#[derive(Debug, Default)]
pub struct CollectingBuilder {
    cif: Cif,
    block: Option<usize>,
    frames: Vec<usize>,
    current_loop: Option<(Vec<String>, Vec<Vec<Value>>)>,
    row: Option<Vec<Value>>,
}

impl CollectingBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The document assembled so far.
    #[must_use]
    pub fn into_cif(self) -> Cif {
        self.cif
    }

    fn container_mut(&mut self) -> Result<&mut Container, CifError> {
        let block = match self.block {
            Some(index) => index,
            None => {
                // Defensive: the parser opens a block before content.
                let index = self.cif.push_block_raw("");
                self.block = Some(index);
                index
            }
        };
        let mut container = self
            .cif
            .block_mut_at(block)
            .ok_or_else(|| CifError::InvalidName(String::new()))?;
        for &frame in &self.frames {
            container = container
                .frame_mut_at(frame)
                .ok_or_else(|| CifError::InvalidName(String::new()))?;
        }
        Ok(container)
    }
}

impl Builder for CollectingBuilder {
    fn block_start(&mut self, code: &str) -> Result<Control, CifError> {
        let normalized = crate::model::normalize_name(code);
        let index = match self
            .cif
            .blocks()
            .iter()
            .position(|b| crate::model::normalize_name(b.code()) == normalized)
        {
            Some(index) => index,
            None => self.cif.push_block_raw(code),
        };
        self.block = Some(index);
        self.frames.clear();
        Ok(Control::Continue)
    }

    fn block_end(&mut self, _code: &str) -> Result<Control, CifError> {
        self.block = None;
        self.frames.clear();
        Ok(Control::Continue)
    }

    fn frame_start(&mut self, code: &str) -> Result<Control, CifError> {
        let normalized = crate::model::normalize_name(code);
        let parent = self.container_mut()?;
        let index = match parent
            .frames()
            .iter()
            .position(|f| crate::model::normalize_name(f.code()) == normalized)
        {
            Some(index) => index,
            None => parent.push_frame_raw(code),
        };
        self.frames.push(index);
        Ok(Control::Continue)
    }

    fn frame_end(&mut self, _code: &str) -> Result<Control, CifError> {
        self.frames.pop();
        Ok(Control::Continue)
    }

    fn loop_start(&mut self, columns: &[String]) -> Result<Control, CifError> {
        self.current_loop = Some((columns.to_vec(), Vec::new()));
        Ok(Control::Continue)
    }

    fn loop_end(&mut self) -> Result<Control, CifError> {
        if let Some((columns, rows)) = self.current_loop.take() {
            if columns.is_empty() {
                return Ok(Control::Continue);
            }
            let container = self.container_mut()?;
            let names: Vec<&str> = columns.iter().map(String::as_str).collect();
            let looped = container.add_loop(None, &names)?;
            for row in rows {
                looped.add_packet(row)?;
            }
        }
        Ok(Control::Continue)
    }

    fn packet_start(&mut self) -> Result<Control, CifError> {
        self.row = Some(Vec::new());
        Ok(Control::Continue)
    }

    fn packet_end(&mut self) -> Result<Control, CifError> {
        if let (Some(row), Some((_, rows))) = (self.row.take(), self.current_loop.as_mut()) {
            rows.push(row);
        }
        Ok(Control::Continue)
    }

    fn item(&mut self, name: &str, value: &Value) -> Result<Control, CifError> {
        match &mut self.row {
            Some(row) => row.push(value.clone()),
            None => self.container_mut()?.set(name, value.clone())?,
        }
        Ok(Control::Continue)
    }
}
