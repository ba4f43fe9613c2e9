use std::io::Write;

use crate::error::CifError;
use crate::model::{Cif, Container, Loop};
use crate::options::{Dialect, Protocols, WriteOptions, LINE_LENGTH};
use crate::text::encode_text_block;
use crate::value::Value;

/// Prefix applied when the prefix protocol must protect a value.
const PREFIX: &str = "> ";

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Output form chosen for a character value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    /// Single-character delimiter on one line.
    Quoted(char),
    /// Triple delimiter (CIF 2.0), possibly spanning lines.
    Triple(char),
    /// Text block with the given protocols.
    Block(Protocols),
}

/// Every character must be expressible in the dialect: printable plus
/// TAB and LF, 7-bit in CIF 1.1. A CR would not survive the reader's
/// line-terminator normalization.
fn check_chars(text: &str, dialect: Dialect) -> Result<(), CifError> {
    for c in text.chars() {
        let unit = c as u32;
        let bad = (c.is_control() && c != '\t' && c != '\n')
            || matches!(unit, 0xfdd0..=0xfdef)
            || unit & 0xffff >= 0xfffe
            || (dialect == Dialect::V1 && unit > 0x7e);
        if bad {
            return Err(CifError::DisallowedChar(c));
        }
    }
    Ok(())
}

/// Pick the output form for a character value.
fn plan(text: &str, dialect: Dialect, fold_width: usize) -> Result<Style, CifError> {
    let lines: Vec<&str> = text.split('\n').collect();
    let multiline = lines.len() > 1;
    let length = text.chars().count();
    let max_line = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let has_apostrophe = text.contains('\'');
    let has_quote = text.contains('"');

    if !multiline && length + 2 <= LINE_LENGTH {
        match dialect {
            Dialect::V2 => {
                if !has_apostrophe {
                    return Ok(Style::Quoted('\''));
                }
                if !has_quote {
                    return Ok(Style::Quoted('"'));
                }
                if length + 6 <= LINE_LENGTH {
                    if !text.contains("'''") && !text.ends_with('\'') {
                        return Ok(Style::Triple('\''));
                    }
                    if !text.contains("\"\"\"") && !text.ends_with('"') {
                        return Ok(Style::Triple('"'));
                    }
                }
            }
            // A CIF 1.1 reader only closes a quote before whitespace,
            // so any embedded quote character forces a text block.
            Dialect::V1 => {
                if !has_apostrophe && !has_quote {
                    return Ok(Style::Quoted('\''));
                }
            }
        }
    }
    if multiline && dialect == Dialect::V2 && max_line <= LINE_LENGTH {
        // The delimiters land on the first and last lines only.
        let first = lines[0].chars().count();
        let last = lines[lines.len() - 1].chars().count();
        if first + 3 <= LINE_LENGTH && last + 3 <= LINE_LENGTH {
            if !text.contains("'''") && !text.ends_with('\'') {
                return Ok(Style::Triple('\''));
            }
            if !text.contains("\"\"\"") && !text.ends_with('"') {
                return Ok(Style::Triple('"'));
            }
        }
    }

    // Text block.
    let semi_line = lines.iter().any(|l| l.starts_with(';'));
    let header_backslash = lines[0].trim_end_matches(is_blank).ends_with('\\');
    let mut protocols = Protocols::empty();
    match dialect {
        Dialect::V2 => {
            if semi_line || header_backslash {
                protocols |= Protocols::PREFIX;
            }
        }
        Dialect::V1 => {
            if lines[1..].iter().any(|l| l.starts_with(';')) {
                return Err(CifError::DisallowedValue(
                    "text block line starting with a semicolon",
                ));
            }
            if header_backslash {
                // Force folding so the header line absorbs the signal.
                protocols |= Protocols::FOLD;
            }
        }
    }
    let prefix_len = if protocols.contains(Protocols::PREFIX) {
        PREFIX.chars().count()
    } else {
        0
    };
    if max_line + prefix_len + 1 > fold_width {
        protocols |= Protocols::FOLD;
    }
    if dialect == Dialect::V1
        && protocols.contains(Protocols::FOLD)
        && lines[0].starts_with(';')
    {
        return Err(CifError::DisallowedValue(
            "foldable text block starting with a semicolon",
        ));
    }
    Ok(Style::Block(protocols))
}

struct Emitter<W: Write> {
    sink: W,
    dialect: Dialect,
    fold_width: usize,
    column: usize,
    need_sep: bool,
}

impl<W: Write> Emitter<W> {
    fn raw(&mut self, s: &str) -> Result<(), CifError> {
        for c in s.chars() {
            if c == '\n' {
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.sink.write_all(s.as_bytes())?;
        Ok(())
    }

    fn newline(&mut self) -> Result<(), CifError> {
        if self.column > 0 {
            self.raw("\n")?;
        }
        self.need_sep = false;
        Ok(())
    }

    /// Emit a whitespace-separated word, wrapping when it would push
    /// the line past the limit.
    fn word(&mut self, s: &str) -> Result<(), CifError> {
        let length = s.chars().count();
        if self.column > 0 {
            if self.need_sep {
                if self.column + 1 + length > LINE_LENGTH {
                    self.newline()?;
                } else {
                    self.raw(" ")?;
                }
            } else if self.column + length > LINE_LENGTH {
                self.newline()?;
            }
        }
        self.raw(s)?;
        self.need_sep = true;
        Ok(())
    }

    /// Emit directly against the previous token (closing brackets).
    fn abut(&mut self, s: &str) -> Result<(), CifError> {
        if self.column + s.chars().count() > LINE_LENGTH {
            self.newline()?;
        }
        self.raw(s)?;
        self.need_sep = true;
        Ok(())
    }

    fn emit_document(&mut self, cif: &Cif) -> Result<(), CifError> {
        self.raw(match self.dialect {
            Dialect::V1 => "#\\#CIF_1.1\n",
            Dialect::V2 => "#\\#CIF_2.0\n",
        })?;
        for block in cif.blocks() {
            check_chars(block.code(), self.dialect)?;
            self.newline()?;
            self.raw("data_")?;
            self.raw(block.code())?;
            self.raw("\n")?;
            self.emit_body(block)?;
        }
        Ok(())
    }

    fn emit_body(&mut self, container: &Container) -> Result<(), CifError> {
        for (name, value) in container.items() {
            self.emit_item(name, value)?;
        }
        for looped in container.loops() {
            self.emit_loop(looped)?;
        }
        for frame in container.frames() {
            check_chars(frame.code(), self.dialect)?;
            self.newline()?;
            self.raw("save_")?;
            self.raw(frame.code())?;
            self.raw("\n")?;
            self.emit_body(frame)?;
            self.newline()?;
            self.raw("save_\n")?;
        }
        Ok(())
    }

    fn emit_item(&mut self, name: &str, value: &Value) -> Result<(), CifError> {
        check_chars(name, self.dialect)?;
        self.newline()?;
        self.word(name)?;
        self.emit_value(value)?;
        self.newline()
    }

    fn emit_loop(&mut self, looped: &Loop) -> Result<(), CifError> {
        self.newline()?;
        self.raw("loop_\n")?;
        for name in looped.columns() {
            check_chars(name, self.dialect)?;
            self.raw(" ")?;
            self.raw(name)?;
            self.raw("\n")?;
        }
        for packet in looped.packets() {
            self.newline()?;
            for value in packet.values() {
                self.emit_value(value)?;
            }
        }
        self.newline()
    }

    fn emit_value(&mut self, value: &Value) -> Result<(), CifError> {
        match value {
            Value::Unknown => self.word("?"),
            Value::NotApplicable => self.word("."),
            Value::Number(number) => self.word(&number.format()),
            Value::Char(text) => self.emit_char(text),
            Value::List(values) => {
                if self.dialect == Dialect::V1 {
                    return Err(CifError::DisallowedValue("list in CIF 1.1"));
                }
                self.word("[")?;
                self.need_sep = false;
                for value in values {
                    self.emit_value(value)?;
                }
                self.abut("]")
            }
            Value::Table(table) => {
                if self.dialect == Dialect::V1 {
                    return Err(CifError::DisallowedValue("table in CIF 1.1"));
                }
                self.word("{")?;
                self.need_sep = false;
                for (key, value) in table.iter() {
                    let keyed = self.quoted_key(key)?;
                    self.word(&keyed)?;
                    self.need_sep = false;
                    self.emit_value(value)?;
                }
                self.abut("}")
            }
        }
    }

    fn emit_char(&mut self, text: &str) -> Result<(), CifError> {
        check_chars(text, self.dialect)?;
        match plan(text, self.dialect, self.fold_width)? {
            Style::Quoted(q) => self.word(&format!("{q}{text}{q}")),
            Style::Triple(q) => {
                let delim: String = std::iter::repeat(q).take(3).collect();
                self.word(&format!("{delim}{text}{delim}"))
            }
            Style::Block(protocols) => {
                self.newline()?;
                let block = encode_text_block(text, protocols, PREFIX, self.fold_width);
                self.raw(&block)?;
                self.raw("\n")
            }
        }
    }

    fn quoted_key(&self, key: &str) -> Result<String, CifError> {
        check_chars(key, self.dialect)?;
        if key.contains('\n') {
            return Err(CifError::DisallowedValue("multi-line table key"));
        }
        if !key.contains('\'') {
            return Ok(format!("'{key}':"));
        }
        if !key.contains('"') {
            return Ok(format!("\"{key}\":"));
        }
        if !key.contains("'''") && !key.ends_with('\'') {
            return Ok(format!("'''{key}''':"));
        }
        if !key.contains("\"\"\"") && !key.ends_with('"') {
            return Ok(format!("\"\"\"{key}\"\"\":"));
        }
        Err(CifError::DisallowedValue("unquotable table key"))
    }
}

/// Write `cif` to `sink` in the dialect `options` selects.
pub(crate) fn write<W: Write>(
    cif: &Cif,
    sink: W,
    options: &WriteOptions,
) -> Result<(), CifError> {
    let mut emitter = Emitter {
        sink,
        dialect: options.dialect,
        fold_width: options.fold_width.min(LINE_LENGTH),
        column: 0,
        need_sep: false,
    };
    emitter.emit_document(cif)?;
    emitter.sink.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(cif: &Cif, dialect: Dialect) -> String {
        let mut out = Vec::new();
        cif.write(
            &mut out,
            &WriteOptions {
                dialect,
                ..WriteOptions::default()
            },
        )
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_minimal_output() {
        let mut cif = Cif::new();
        cif.add_block("a")
            .unwrap()
            .set("_x", Value::from_bare("1"))
            .unwrap();
        assert_eq!("#\\#CIF_2.0\ndata_a\n_x 1\n", written(&cif, Dialect::V2));
        assert_eq!("#\\#CIF_1.1\ndata_a\n_x 1\n", written(&cif, Dialect::V1));
    }

    #[test]
    fn test_quoting_choice_per_dialect() {
        // The apostrophe forces the quotation mark in 2.0 and a text
        // block in 1.1.
        assert_eq!(Ok(Style::Quoted('"')), plan_ok("a'b'c", Dialect::V2));
        assert!(matches!(
            plan("a'b'c", Dialect::V1, LINE_LENGTH),
            Ok(Style::Block(_))
        ));
        let mut cif = Cif::new();
        cif.add_block("a")
            .unwrap()
            .set("_x", Value::Char("a'b'c".to_string()))
            .unwrap();
        assert_eq!(
            "#\\#CIF_2.0\ndata_a\n_x \"a'b'c\"\n",
            written(&cif, Dialect::V2)
        );
        assert_eq!(
            "#\\#CIF_1.1\ndata_a\n_x\n;a'b'c\n;\n",
            written(&cif, Dialect::V1)
        );
    }

    fn plan_ok(text: &str, dialect: Dialect) -> Result<Style, ()> {
        plan(text, dialect, LINE_LENGTH).map_err(|_| ())
    }

    #[test]
    fn test_triple_only_when_forced() {
        assert_eq!(Ok(Style::Quoted('\'')), plan_ok("plain", Dialect::V2));
        assert_eq!(Ok(Style::Quoted('\'')), plan_ok("", Dialect::V2));
        assert_eq!(Ok(Style::Triple('\'')), plan_ok("a'b \"c\"", Dialect::V2));
        assert_eq!(Ok(Style::Triple('\'')), plan_ok("two\nlines", Dialect::V2));
        // Ending with the delimiter would merge into the closer.
        assert_eq!(Ok(Style::Triple('"')), plan_ok("a' b\" c'", Dialect::V2));
        assert!(matches!(
            plan_ok("'''a\"\"\"b''' end\"", Dialect::V2),
            Ok(Style::Block(_))
        ));
    }

    #[test]
    fn test_block_protocol_selection() {
        match plan("x\n;y", Dialect::V2, LINE_LENGTH) {
            Ok(Style::Block(p)) => assert!(p.contains(Protocols::PREFIX)),
            other => panic!("unexpected plan {other:?}"),
        }
        match plan(&format!("{}\nsecond", "w".repeat(100)), Dialect::V2, 80) {
            Ok(Style::Block(p)) => assert!(p.contains(Protocols::FOLD)),
            other => panic!("unexpected plan {other:?}"),
        }
        // CIF 1.1 cannot protect an embedded semicolon line.
        assert!(plan("x\n;y", Dialect::V1, LINE_LENGTH).is_err());
    }

    #[test]
    fn test_loop_layout() {
        let mut cif = Cif::new();
        let block = cif.add_block("a").unwrap();
        let looped = block.add_loop(None, &["_x", "_y"]).unwrap();
        looped
            .add_packet(vec![Value::from_bare("1"), Value::from_bare("hi there")])
            .unwrap();
        looped
            .add_packet(vec![Value::Unknown, Value::NotApplicable])
            .unwrap();
        assert_eq!(
            "#\\#CIF_2.0\ndata_a\nloop_\n _x\n _y\n1 'hi there'\n? .\n",
            written(&cif, Dialect::V2)
        );
    }

    #[test]
    fn test_list_and_table_layout() {
        let mut cif = Cif::new();
        let block = cif.add_block("a").unwrap();
        let mut table = crate::value::Table::new();
        table.insert("k", Value::from_bare("1"));
        block
            .set(
                "_v",
                Value::List(vec![
                    Value::from_bare("1"),
                    Value::List(vec![Value::Unknown]),
                    Value::Table(table),
                ]),
            )
            .unwrap();
        assert_eq!(
            "#\\#CIF_2.0\ndata_a\n_v [1 [?] {'k':1}]\n",
            written(&cif, Dialect::V2)
        );
        let mut out = Vec::new();
        let result = cif.write(
            &mut out,
            &WriteOptions {
                dialect: Dialect::V1,
                ..WriteOptions::default()
            },
        );
        assert!(matches!(result, Err(CifError::DisallowedValue(_))));
    }

    #[test]
    fn test_v1_rejects_wide_chars() {
        let mut cif = Cif::new();
        cif.add_block("a")
            .unwrap()
            .set("_x", Value::Char("caf\u{e9}".to_string()))
            .unwrap();
        assert!(matches!(
            cif.write(
                &mut Vec::new(),
                &WriteOptions {
                    dialect: Dialect::V1,
                    ..WriteOptions::default()
                }
            ),
            Err(CifError::DisallowedChar('\u{e9}'))
        ));
        // Non-ASCII text is fine in 2.0.
        assert_eq!(
            "#\\#CIF_2.0\ndata_a\n_x 'caf\u{e9}'\n",
            written(&cif, Dialect::V2)
        );
    }

    #[test]
    fn test_frame_output() {
        let mut cif = Cif::new();
        let block = cif.add_block("b").unwrap();
        let frame = block.add_frame("f").unwrap();
        frame.set("_x", Value::from_bare("1")).unwrap();
        assert_eq!(
            "#\\#CIF_2.0\ndata_b\nsave_f\n_x 1\nsave_\n",
            written(&cif, Dialect::V2)
        );
    }
}
