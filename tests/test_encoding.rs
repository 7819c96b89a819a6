mod common;

use common::{expect_bytes, expect_bytes_with, parse_all, utf16be, utf16le};
use xml_push::sax::{ByteMap, Collector, Control, Encoding, Error, Event, Handler, ParserConfig};
use xml_push::{Parser, Status};

fn windows_1252() -> ByteMap {
    let mut map: Vec<i32> = (0..256).collect();
    map[128] = 0x20AC;
    ByteMap::from_code_points(&map).unwrap()
}

/// Answers unknown encodings from inside the handler.
#[derive(Default)]
struct EncodingHandler {
    encoding: Option<String>,
    text: String,
    answer: bool,
}

impl Handler for EncodingHandler {
    fn unknown_encoding(&mut self, ctl: &mut Control, name: &str) {
        self.encoding = Some(name.to_owned());
        if self.answer {
            ctl.set_unknown_encoding(windows_1252()).unwrap();
        }
    }

    fn text(&mut self, _ctl: &mut Control, text: &str) {
        self.text.push_str(text);
    }
}

#[test]
fn unknown_encoding_answered_by_handler() {
    let mut p = Parser::new(EncodingHandler {
        answer: true,
        ..Default::default()
    });
    assert!(p.parse(b"<?xml version='1.0' encoding='Windows-1252'?><r>", false));
    assert!(p.parse(&[165, 128, 36], false));
    assert!(p.parse(b"</r>", false));
    assert_eq!(p.error_message(), None);
    assert_eq!(p.handler().text, "¥€$");
    assert_eq!(p.handler().encoding.as_deref(), Some("Windows-1252"));
}

#[test]
fn unknown_encoding_answered_by_caller() {
    let mut p = Parser::new(EncodingHandler::default());
    assert!(p.parse(b"<?xml version='1.0' encoding='Windows-1252'?><r>", false));
    assert_eq!(p.handler().encoding.as_deref(), Some("Windows-1252"));
    p.set_unknown_encoding(windows_1252()).unwrap();
    assert!(p.parse(&[128, 33], false));
    assert!(p.parse(b"</r>", true));
    assert_eq!(p.handler().text, "€!");
}

#[test]
fn unanswered_unknown_encoding_fails() {
    let mut p = Parser::new(Collector::new());
    assert!(p.parse(b"<?xml version='1.0' encoding='x-mystery'?>", false));
    assert_eq!(p.feed(b"<r/>", false), Err(Error::UnknownEncoding));
    assert_eq!(p.error_message().as_deref(), Some("unknown encoding"));
    assert_eq!(
        p.handler().events().last(),
        Some(&Event::Error(Error::UnknownEncoding))
    );

    let mut p = Parser::new(Collector::new());
    assert_eq!(
        p.feed(b"<?xml version='1.0' encoding='x-mystery'?><r/>", true),
        Err(Error::UnknownEncoding)
    );
}

#[test]
fn encoding_answer_only_while_pending() {
    let mut p = Parser::new(Collector::new());
    assert_eq!(
        p.set_unknown_encoding(windows_1252()),
        Err(Error::NoPendingEncoding)
    );

    struct Eager {
        result: Option<Result<(), Error>>,
    }
    impl Handler for Eager {
        fn start_element(&mut self, ctl: &mut Control, _name: &str, _attributes: &[xml_push::sax::Attribute]) {
            self.result = Some(ctl.set_unknown_encoding(windows_1252()));
        }
    }
    let mut p = Parser::new(Eager { result: None });
    assert!(p.parse(b"<r/>", true));
    assert_eq!(p.handler().result, Some(Err(Error::NoPendingEncoding)));
}

#[test]
fn malformed_byte_map() {
    assert!(matches!(
        ByteMap::from_code_points(&[0; 10]),
        Err(Error::InvalidEncodingMap(_))
    ));
    let mut map: Vec<i32> = (0..256).collect();
    map[200] = -2;
    assert!(ByteMap::from_code_points(&map).is_err());
    map[200] = -1;
    let map = ByteMap::from_code_points(&map).unwrap();
    assert_eq!(map.get(200), None);
    assert_eq!(map.get(65), Some('A'));
}

#[test]
fn unmapped_byte_is_invalid() {
    let mut p = Parser::new(EncodingHandler::default());
    p.set_encoding("x-seven-bit").unwrap();
    assert_eq!(p.handler().encoding, None);
    assert!(p.parse(b"", false));
    assert_eq!(p.handler().encoding.as_deref(), Some("x-seven-bit"));
    p.set_unknown_encoding(ByteMap::from_fn(|b| if b < 0x80 { Some(b as char) } else { None }))
        .unwrap();
    assert!(p.parse(b"<r>ok", false));
    assert_eq!(p.feed(&[0x80], false), Err(Error::InvalidToken));
    assert_eq!(p.handler().text, "ok");
}

#[test]
fn latin1_declaration() {
    expect_bytes(
        b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r a='\xe9'>\xe9t\xe9</r>",
        &[
            Event::XmlDecl {
                version: "1.0".to_owned(),
                encoding: Some("ISO-8859-1".to_owned()),
                standalone: None,
            },
            Event::start_element("r", &[("a", "é")]),
            Event::text("été"),
            Event::end_element("r"),
        ],
    );
}

#[test]
fn latin1_switch_after_declaration() {
    let doc = b"<?xml version='1.0' encoding='latin1'?>\n<r>\xfc\xdf</r>";
    expect_bytes(
        doc,
        &[
            Event::XmlDecl {
                version: "1.0".to_owned(),
                encoding: Some("latin1".to_owned()),
                standalone: None,
            },
            Event::start_element("r", &[]),
            Event::text("üß"),
            Event::end_element("r"),
        ],
    );

    let mut p = Parser::new(Collector::new());
    assert_eq!(p.encoding(), &Encoding::Utf8);
    assert!(p.parse(doc, true));
    assert_eq!(p.encoding(), &Encoding::Latin1);
    assert_eq!(p.encoding().name(), "ISO-8859-1");
}

#[test]
fn us_ascii_rejects_high_bytes() {
    expect_bytes(
        b"<?xml version='1.0' encoding='US-ASCII'?><r>a\x80</r>",
        &[
            Event::XmlDecl {
                version: "1.0".to_owned(),
                encoding: Some("US-ASCII".to_owned()),
                standalone: None,
            },
            Event::start_element("r", &[]),
            Event::text("a"),
            Event::Error(Error::InvalidToken),
        ],
    );

    let mut p = Parser::new(Collector::new());
    assert!(p.parse(b"<?xml version='1.0' encoding='US-ASCII'?><r>ok</r>", true));
    assert_eq!(p.encoding(), &Encoding::Ascii);
    assert_eq!(
        p.handler().coalesced()[2],
        Event::text("ok")
    );
}

#[test]
fn utf8_byte_order_mark() {
    expect_bytes(
        b"\xEF\xBB\xBF<r>\xC3\xA9</r>",
        &[
            Event::start_element("r", &[]),
            Event::text("é"),
            Event::end_element("r"),
        ],
    );

    let mut p = Parser::new(Collector::new());
    assert!(p.parse(b"\xEF\xBB\xBF<r/>", true));
    assert_eq!(p.byte_index(), 7);
    assert_eq!(p.column_number(), 4);
}

#[test]
fn utf16le_with_byte_order_mark() {
    let doc = utf16le("<r a='ü'>x\u{1F600}</r>", true);
    expect_bytes(
        &doc,
        &[
            Event::start_element("r", &[("a", "ü")]),
            Event::text("x\u{1F600}"),
            Event::end_element("r"),
        ],
    );
}

#[test]
fn utf16be_with_byte_order_mark() {
    let mut doc = vec![0xFE, 0xFF];
    doc.extend(utf16be("<r>\u{10348}y\u{1F600}</r>"));
    expect_bytes(
        &doc,
        &[
            Event::start_element("r", &[]),
            Event::text("\u{10348}y\u{1F600}"),
            Event::end_element("r"),
        ],
    );

    let mut p = Parser::new(Collector::new());
    assert!(p.parse(&doc, true));
    assert_eq!(p.encoding(), &Encoding::Utf16Be);
}

#[test]
fn utf16be_detected_without_byte_order_mark() {
    let doc = utf16be("<?xml version='1.0' encoding='UTF-16'?><r>ok</r>");
    expect_bytes(
        &doc,
        &[
            Event::XmlDecl {
                version: "1.0".to_owned(),
                encoding: Some("UTF-16".to_owned()),
                standalone: None,
            },
            Event::start_element("r", &[]),
            Event::text("ok"),
            Event::end_element("r"),
        ],
    );

    let mut p = Parser::new(Collector::new());
    assert!(p.parse(&doc, true));
    assert_eq!(p.byte_index(), doc.len() as i64);
}

#[test]
fn declaration_contradicting_utf16() {
    let doc = utf16le("<?xml version='1.0' encoding='UTF-8'?><r/>", true);
    let (events, error) = parse_all(&doc);
    assert_eq!(error, Some(Error::IncorrectEncoding));
    assert_eq!(
        events.last(),
        Some(&Event::Error(Error::IncorrectEncoding))
    );
    assert_eq!(
        Error::IncorrectEncoding.to_string(),
        "encoding specified in XML declaration is incorrect"
    );
}

#[test]
fn forced_encoding_wins_over_declaration() {
    let config = ParserConfig::default().encoding(Some("ISO-8859-1".to_owned()));
    expect_bytes_with(
        b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><r>\xe9</r>",
        &config,
        &[
            Event::XmlDecl {
                version: "1.0".to_owned(),
                encoding: Some("UTF-8".to_owned()),
                standalone: None,
            },
            Event::start_element("r", &[]),
            Event::text("é"),
            Event::end_element("r"),
        ],
    );
}

#[test]
fn forced_unknown_encoding_asks_first() {
    let mut p = Parser::new(EncodingHandler {
        answer: true,
        ..Default::default()
    });
    p.set_encoding("windows-1252").unwrap();
    assert_eq!(p.feed(b"<r>\x80", false), Ok(Status::Ok));
    assert_eq!(p.feed(b"</r>", true), Ok(Status::Ok));
    assert_eq!(p.handler().encoding.as_deref(), Some("windows-1252"));
    assert_eq!(p.handler().text, "€");
}

#[test]
fn encoding_fixed_once_parsing() {
    let mut p = Parser::new(Collector::new());
    assert!(p.parse(b"<r>", false));
    assert_eq!(
        p.set_encoding("ISO-8859-1"),
        Err(Error::CantChangeSettingOnceParsing)
    );
    assert_eq!(p.error(), None);

    p.reset().unwrap();
    p.set_encoding("ISO-8859-1").unwrap();
    assert!(p.parse(b"<r>\xe9</r>", true));
    assert_eq!(
        p.handler().coalesced().last(),
        Some(&Event::end_element("r"))
    );
}

#[test]
fn invalid_utf8() {
    let (events, error) = parse_all(b"<r>\xff</r>");
    assert_eq!(error, Some(Error::InvalidToken));
    assert_eq!(
        events,
        vec![
            Event::start_element("r", &[]),
            Event::Error(Error::InvalidToken)
        ]
    );
}

#[test]
fn partial_character_at_end() {
    let mut p = Parser::new(Collector::new());
    assert!(p.parse(b"<r>\xc3", false));
    assert_eq!(p.feed(b"", true), Err(Error::PartialChar));
    assert_eq!(p.error_message().as_deref(), Some("partial character"));
}
