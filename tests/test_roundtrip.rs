use cif_stream::{
    Cif, CollectingBuilder, Dialect, Number, ParseOptions, Value, WriteOptions,
};

fn parse_v(input: &[u8], dialect_hint: cif_stream::DialectPreference) -> Cif {
    let mut options = ParseOptions::default();
    options.dialect = dialect_hint;
    Cif::parse(input, &options).unwrap()
}

fn write_v(cif: &Cif, dialect: Dialect) -> Vec<u8> {
    let mut out = Vec::new();
    cif.write(
        &mut out,
        &WriteOptions {
            dialect,
            ..WriteOptions::default()
        },
    )
    .unwrap();
    out
}

/// Parse, write, parse again, write again: the two renderings must be
/// identical, and spot checks must hold across the trip.
fn assert_roundtrip(input: &str, dialect: Dialect) -> Cif {
    let hint = match dialect {
        Dialect::V1 => cif_stream::DialectPreference::DefaultV1,
        Dialect::V2 => cif_stream::DialectPreference::PreferV2,
    };
    let first = parse_v(input.as_bytes(), hint);
    let once = write_v(&first, dialect);
    let second = parse_v(&once, hint);
    let twice = write_v(&second, dialect);
    assert_eq!(
        String::from_utf8(once.clone()).unwrap(),
        String::from_utf8(twice).unwrap()
    );
    second
}

#[test]
fn test_scalar_roundtrip() {
    let cif = assert_roundtrip(
        "data_a\n_n 1.5(3)\n_t 'some text'\n_u ?\n_v .\n_big -4e10\n",
        Dialect::V2,
    );
    let block = cif.block("a").unwrap();
    let n = block.get("_n").unwrap().as_number().unwrap();
    assert_eq!(("15", 1, Some("3"), 1), (n.digits(), n.scale(), n.su_digits(), n.sign()));
    assert_eq!(Some("some text"), block.get("_t").unwrap().as_char());
    assert!(block.get("_u").unwrap().is_unknown());
    assert!(block.get("_v").unwrap().is_not_applicable());
    let big = block.get("_big").unwrap().as_number().unwrap();
    assert_eq!(("4", -10, -1), (big.digits(), big.scale(), big.sign()));
}

#[test]
fn test_loop_and_frame_roundtrip() {
    let cif = assert_roundtrip(
        "data_a\nloop_\n _x\n _y\n1 'a b'\n2 ?\nsave_f\n_inner 3\nsave_\n",
        Dialect::V2,
    );
    let block = cif.block("a").unwrap();
    let looped = block.loop_for("_y").unwrap();
    assert_eq!(2, looped.len());
    let rows: Vec<_> = looped.packets().collect();
    assert_eq!(Some("a b"), rows[0].get("_y").unwrap().as_char());
    assert!(rows[1].get("_y").unwrap().is_unknown());
    assert!(block.frame("f").unwrap().get("_inner").is_some());
}

#[test]
fn test_container_values_roundtrip() {
    let cif = assert_roundtrip(
        "#\\#CIF_2.0\ndata_a\n_l [1 [2 ?] {'k':[.]}]\n_t {'a':1 'b':{'c':2}}\n",
        Dialect::V2,
    );
    let block = cif.block("a").unwrap();
    let list = block.get("_l").unwrap().as_list().unwrap();
    assert_eq!(3, list.len());
    let table = block.get("_t").unwrap().as_table().unwrap();
    let inner = table.get("b").unwrap().as_table().unwrap();
    assert!(inner.get("c").is_some());
}

#[test]
fn test_text_block_roundtrip() {
    // Quote-heavy and semicolon-laden values exercise the planner's
    // text-block and prefix paths.
    let awkward = "''' and \"\"\" mix'\n;starts with semicolon\nplain";
    let mut cif = Cif::new();
    cif.add_block("a")
        .unwrap()
        .set("_x", Value::Char(awkward.to_string()))
        .unwrap();
    let out = write_v(&cif, Dialect::V2);
    let back = parse_v(&out, cif_stream::DialectPreference::PreferV2);
    assert_eq!(
        Some(awkward),
        back.block("a").unwrap().get("_x").unwrap().as_char()
    );
}

#[test]
fn test_v1_quote_value_becomes_text_block() {
    let mut cif = Cif::new();
    cif.add_block("a")
        .unwrap()
        .set("_x", Value::Char("a'b'c".to_string()))
        .unwrap();
    let out = write_v(&cif, Dialect::V1);
    assert!(String::from_utf8(out.clone())
        .unwrap()
        .contains("\n;a'b'c\n;\n"));
    let back = parse_v(&out, cif_stream::DialectPreference::DefaultV1);
    assert_eq!(
        Some("a'b'c"),
        back.block("a").unwrap().get("_x").unwrap().as_char()
    );
}

#[test]
fn test_folded_output_roundtrips() {
    let long_line = "lattice parameter refinement ".repeat(120);
    let mut cif = Cif::new();
    cif.add_block("a")
        .unwrap()
        .set("_x", Value::Char(long_line.clone()))
        .unwrap();
    let out = write_v(&cif, Dialect::V2);
    for line in String::from_utf8(out.clone()).unwrap().lines() {
        assert!(line.chars().count() <= 2048);
    }
    let back = parse_v(&out, cif_stream::DialectPreference::PreferV2);
    assert_eq!(
        Some(long_line.as_str()),
        back.block("a").unwrap().get("_x").unwrap().as_char()
    );
}

#[test]
fn test_number_format_parse_inverse() {
    for text in [
        "0", "1", "-1", "+5", "1.5", "-0.25", "12.", ".5", "1e10", "2.5e-3", "1.23(45)",
        "0.0021(3)", "3.04e-2(11)", "1234567890.0987654321",
    ] {
        let n = Number::from_text(text).unwrap();
        let reparsed = Number::from_text(&n.format()).unwrap();
        assert_eq!(n, reparsed, "through {text}");
    }
    for (value, su, scale, expect) in [
        (1.5, None, 1, "1.5"),
        (0.25, Some(0.01), 2, "0.25(1)"),
        (1234.0, None, -1, "1.23e3"),
    ] {
        let n = Number::new(value, su, scale, 5).unwrap();
        assert_eq!(expect, n.format());
        assert_eq!(n, Number::from_text(&n.format()).unwrap());
    }
}

#[test]
fn test_crlf_and_cr_match_lf() {
    let lf = "data_a\n_x 1\n_t\n;line one\nline two\n;\n";
    let crlf = lf.replace('\n', "\r\n");
    let cr = lf.replace('\n', "\r");
    let hint = cif_stream::DialectPreference::DefaultV1;
    let reference = write_v(&parse_v(lf.as_bytes(), hint), Dialect::V1);
    assert_eq!(reference, write_v(&parse_v(crlf.as_bytes(), hint), Dialect::V1));
    assert_eq!(reference, write_v(&parse_v(cr.as_bytes(), hint), Dialect::V1));
}

#[test]
fn test_v2_magic_selects_v2_by_default() {
    // Default options lean CIF 1.1, but the magic comment wins.
    let cif = Cif::parse(
        "#\\#CIF_2.0\ndata_a\n_l [1 2]\n".as_bytes(),
        &ParseOptions::default(),
    )
    .unwrap();
    assert_eq!(
        2,
        cif.block("a").unwrap().get("_l").unwrap().as_list().unwrap().len()
    );
}

#[test]
fn test_utf16_input_matches_utf8() {
    let text = "#\\#CIF_2.0\ndata_a\n_x 'caf\u{e9}'\n";
    let mut utf16 = vec![0xff, 0xfe];
    for unit in text.encode_utf16() {
        utf16.extend_from_slice(&unit.to_le_bytes());
    }
    let mut builder = CollectingBuilder::new();
    let mut errors = Vec::new();
    cif_stream::parse(
        &utf16[..],
        &ParseOptions::default(),
        &mut builder,
        &mut errors,
    )
    .unwrap();
    // CIF 2.0 should have been UTF-8; the parse recovers and continues.
    assert_eq!(1, errors.len());
    assert_eq!(cif_stream::ErrorCode::WrongEncoding, errors[0].code);
    let cif = builder.into_cif();
    assert_eq!(
        Some("caf\u{e9}"),
        cif.block("a").unwrap().get("_x").unwrap().as_char()
    );

    let from_utf8 = Cif::parse(text.as_bytes(), &ParseOptions::default()).unwrap();
    assert_eq!(
        write_v(&from_utf8, Dialect::V2),
        write_v(&cif, Dialect::V2)
    );
}
