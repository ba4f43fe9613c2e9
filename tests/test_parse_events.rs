use cif_stream::{parse, Builder, CifError, Control, Lenient, ParseOptions, Value};

fn render(value: &Value) -> String {
    match value {
        Value::Unknown => "?".to_string(),
        Value::NotApplicable => ".".to_string(),
        Value::Char(text) => format!("char({text})"),
        Value::Number(number) => format!("numb({})", number.format()),
        Value::List(values) => format!("list({} elements)", values.len()),
        Value::Table(table) => format!("table({} entries)", table.len()),
    }
}

struct LoggingBuilder(Vec<String>);

impl Builder for LoggingBuilder {
    fn document_start(&mut self) -> Result<Control, CifError> {
        self.0.push("document start".to_string());
        Ok(Control::Continue)
    }
    fn document_end(&mut self) -> Result<Control, CifError> {
        self.0.push("document end".to_string());
        Ok(Control::Continue)
    }
    fn block_start(&mut self, code: &str) -> Result<Control, CifError> {
        self.0.push(format!("block start: {code}"));
        Ok(Control::Continue)
    }
    fn block_end(&mut self, code: &str) -> Result<Control, CifError> {
        self.0.push(format!("block end: {code}"));
        Ok(Control::Continue)
    }
    fn frame_start(&mut self, code: &str) -> Result<Control, CifError> {
        self.0.push(format!("frame start: {code}"));
        Ok(Control::Continue)
    }
    fn frame_end(&mut self, code: &str) -> Result<Control, CifError> {
        self.0.push(format!("frame end: {code}"));
        Ok(Control::Continue)
    }
    fn loop_start(&mut self, columns: &[String]) -> Result<Control, CifError> {
        self.0.push(format!("loop start: {}", columns.join(" ")));
        Ok(Control::Continue)
    }
    fn loop_end(&mut self) -> Result<Control, CifError> {
        self.0.push("loop end".to_string());
        Ok(Control::Continue)
    }
    fn packet_start(&mut self) -> Result<Control, CifError> {
        self.0.push("packet start".to_string());
        Ok(Control::Continue)
    }
    fn packet_end(&mut self) -> Result<Control, CifError> {
        self.0.push("packet end".to_string());
        Ok(Control::Continue)
    }
    fn item(&mut self, name: &str, value: &Value) -> Result<Control, CifError> {
        self.0.push(format!("item {name} = {}", render(value)));
        Ok(Control::Continue)
    }
}

#[test]
fn test_event_order() {
    let input = "\
data_a
_x 1.5(2)
loop_
 _p
 _q
1 2
3 4
save_f
_y ?
save_
";
    let mut builder = LoggingBuilder(Vec::new());
    parse(
        input.as_bytes(),
        &ParseOptions::default(),
        &mut builder,
        &mut Lenient,
    )
    .unwrap();
    assert_eq!(
        builder.0,
        vec![
            "document start",
            "block start: a",
            "item _x = numb(1.5(2))",
            "loop start: _p _q",
            "packet start",
            "item _p = numb(1)",
            "item _q = numb(2)",
            "packet end",
            "packet start",
            "item _p = numb(3)",
            "item _q = numb(4)",
            "packet end",
            "loop end",
            "frame start: f",
            "item _y = ?",
            "frame end: f",
            "block end: a",
            "document end",
        ]
    );
}

#[test]
fn test_empty_input_events() {
    let mut builder = LoggingBuilder(Vec::new());
    parse(
        &b""[..],
        &ParseOptions::default(),
        &mut builder,
        &mut Lenient,
    )
    .unwrap();
    assert_eq!(builder.0, vec!["document start", "document end"]);
}

#[test]
fn test_skip_siblings() {
    struct SkipAfterFirst {
        items: Vec<String>,
    }
    impl Builder for SkipAfterFirst {
        fn item(&mut self, name: &str, _value: &Value) -> Result<Control, CifError> {
            self.items.push(name.to_string());
            Ok(Control::SkipSiblings)
        }
    }
    let mut builder = SkipAfterFirst { items: Vec::new() };
    parse(
        "data_a\n_x 1\n_y 2\ndata_b\n_z 3\n".as_bytes(),
        &ParseOptions::default(),
        &mut builder,
        &mut Lenient,
    )
    .unwrap();
    // `_y` is skipped as a sibling of `_x`; block b starts fresh.
    assert_eq!(vec!["_x".to_string(), "_z".to_string()], builder.items);
}

#[test]
fn test_lexical_callbacks() {
    #[derive(Default)]
    struct Lexical {
        comments: Vec<String>,
        keywords: Vec<String>,
        names: Vec<String>,
        whitespace_runs: usize,
    }
    impl Builder for Lexical {
        fn comment(&mut self, _line: u32, _column: u32, text: &str) {
            self.comments.push(text.to_string());
        }
        fn keyword(&mut self, _line: u32, _column: u32, text: &str) {
            self.keywords.push(text.to_string());
        }
        fn data_name(&mut self, _line: u32, _column: u32, text: &str) {
            self.names.push(text.to_string());
        }
        fn whitespace(&mut self, _line: u32, _column: u32, _text: &str) {
            self.whitespace_runs += 1;
        }
    }
    let mut builder = Lexical::default();
    parse(
        "#\\#CIF_1.1\ndata_a # note\n_x 1\nloop_ _y 2\n".as_bytes(),
        &ParseOptions::default(),
        &mut builder,
        &mut Lenient,
    )
    .unwrap();
    assert_eq!(vec!["#\\#CIF_1.1", "# note"], builder.comments);
    assert_eq!(vec!["data_a", "loop_"], builder.keywords);
    assert_eq!(vec!["_x", "_y"], builder.names);
    assert!(builder.whitespace_runs > 0);
}
