mod common;

use common::{expect, parse_all};
use xml_push::sax::{Collector, Error, Event};
use xml_push::Parser;

#[test]
fn line_number() {
    let mut p = Parser::new(Collector::new());
    assert_eq!(p.line_number(), 1);
    assert!(p.parse(b"\n", false));
    assert_eq!(p.line_number(), 2);
    assert!(p.parse(b"\n", false));
    assert_eq!(p.line_number(), 3);
}

#[test]
fn column_number() {
    let mut p = Parser::new(Collector::new());
    assert_eq!(p.column_number(), 0);
    assert!(p.parse(b" ", false));
    assert_eq!(p.column_number(), 1);
    assert!(p.parse(b" ", false));
    assert_eq!(p.column_number(), 2);
    assert!(p.parse(b"\n", false));
    assert_eq!(p.column_number(), 0);
}

#[test]
fn byte_index() {
    let mut p = Parser::new(Collector::new());
    assert_eq!(p.byte_index(), -1);
    assert!(p.parse(b"", false));
    assert_eq!(p.byte_index(), -1);
    assert!(p.parse(b"\n", false));
    assert_eq!(p.byte_index(), 1);
    assert!(p.parse(b" ", false));
    assert_eq!(p.byte_index(), 2);
}

#[test]
fn carriage_returns_count_once() {
    let mut p = Parser::new(Collector::new());
    assert!(p.parse(b"<r>a\r", false));
    assert_eq!(p.line_number(), 1);
    assert!(p.parse(b"\nb\rc\n\r\n", false));
    assert_eq!(p.line_number(), 5);
    assert!(p.parse("ü</r>".as_bytes(), true));
    assert_eq!((p.line_number(), p.column_number()), (5, 5));
    assert_eq!(p.byte_index(), 18);
}

#[test]
fn position_stops_at_error() {
    let mut p = Parser::new(Collector::new());
    assert!(!p.parse(b"<a>\n  <b></c>", false));
    assert_eq!(p.error(), Some(&Error::TagMismatch));
    assert_eq!((p.line_number(), p.column_number()), (2, 5));
}

#[test]
fn invalid_token() {
    expect("<&", &[Event::Error(Error::InvalidToken)]);
    assert_eq!(
        Error::InvalidToken.to_string(),
        "not well-formed (invalid token)"
    );
}

#[test]
fn end_tag_before_root() {
    expect("</end>", &[Event::Error(Error::InvalidToken)]);
}

#[test]
fn text_before_root() {
    let (events, error) = parse_all(b"abc<r/>");
    assert_eq!(error, Some(Error::Syntax));
    assert_eq!(events, vec![Event::Error(Error::Syntax)]);
}

#[test]
fn junk_after_document_element() {
    expect(
        "<r/>x",
        &[
            Event::start_element("r", &[]),
            Event::end_element("r"),
            Event::Error(Error::JunkAfterDocElement),
        ],
    );
    expect(
        "<r/><r/>",
        &[
            Event::start_element("r", &[]),
            Event::end_element("r"),
            Event::Error(Error::JunkAfterDocElement),
        ],
    );
}

#[test]
fn mismatched_tag() {
    expect(
        "<a><b></a>",
        &[
            Event::start_element("a", &[]),
            Event::start_element("b", &[]),
            Event::Error(Error::TagMismatch),
        ],
    );
}

#[test]
fn duplicate_attribute() {
    expect(
        "<r a='1' a='2'/>",
        &[Event::Error(Error::DuplicateAttribute)],
    );
}

#[test]
fn malformed_attributes() {
    for doc in ["<r a='1'b='2'/>", "<r a=1/>", "<r a='<'/>", "<r a/>"] {
        let (_, error) = parse_all(doc.as_bytes());
        assert_eq!(error, Some(Error::InvalidToken), "{}", doc);
    }
}

#[test]
fn cdata_end_in_text() {
    expect(
        "<r>a]]>b</r>",
        &[
            Event::start_element("r", &[]),
            Event::text("a"),
            Event::Error(Error::InvalidToken),
        ],
    );
}

#[test]
fn bad_character_reference() {
    for doc in ["<r>&#0;</r>", "<r>&#xD800;</r>", "<r>&#99999999999;</r>"] {
        let (_, error) = parse_all(doc.as_bytes());
        assert_eq!(error, Some(Error::BadCharRef), "{}", doc);
    }
}

#[test]
fn unclosed_token_on_final_chunk() {
    let (events, error) = parse_all(b"<r><a");
    assert_eq!(error, Some(Error::UnclosedToken));
    assert_eq!(
        events,
        vec![
            Event::start_element("r", &[]),
            Event::Error(Error::UnclosedToken)
        ]
    );

    let mut p = Parser::new(Collector::new());
    assert!(p.parse(b"<r><!-- never", false));
    assert!(!p.parse(b" closed", true));
    assert_eq!(p.error_message().as_deref(), Some("unclosed token"));
}

#[test]
fn no_element_found() {
    for doc in ["", "  ", "<!-- c -->", "<r>", "<r><a></a>"] {
        let (events, error) = parse_all(doc.as_bytes());
        assert_eq!(error, Some(Error::NoElements), "{:?}", doc);
        assert_eq!(events.last(), Some(&Event::Error(Error::NoElements)));
    }
}

#[test]
fn unclosed_cdata_section() {
    let (events, error) = parse_all(b"<r><![CDATA[abc");
    assert_eq!(error, Some(Error::UnclosedCdataSection));
    assert_eq!(
        events,
        vec![
            Event::start_element("r", &[]),
            Event::StartCdata,
            Event::text("abc"),
            Event::Error(Error::UnclosedCdataSection),
        ]
    );
}

#[test]
fn misplaced_xml_declaration() {
    for doc in [" <?xml version='1.0'?><r/>", "<r><?xml version='1.0'?></r>", "<r/><?XML x?>"] {
        let (_, error) = parse_all(doc.as_bytes());
        assert_eq!(error, Some(Error::MisplacedXmlPi), "{}", doc);
    }
}

#[test]
fn malformed_xml_declaration() {
    for doc in [
        "<?xml encoding='UTF-8'?><r/>",
        "<?xml version='1.0' standalone='maybe'?><r/>",
        "<?xml version='1.0' encoding='UTF-8' version='1.0'?><r/>",
    ] {
        let (_, error) = parse_all(doc.as_bytes());
        assert_eq!(error, Some(Error::XmlDecl), "{}", doc);
    }
}

#[test]
fn second_doctype() {
    let (_, error) = parse_all(b"<!DOCTYPE r><!DOCTYPE r><r/>");
    assert_eq!(error, Some(Error::Syntax));
}

#[test]
fn error_is_delivered_once() {
    let mut p = Parser::new(Collector::new());
    assert!(!p.parse(b"<r></x>", false));
    assert!(!p.parse(b"<more/>", false));
    assert!(!p.parse(b"", true));
    let errors = p
        .handler()
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Error(_)))
        .count();
    assert_eq!(errors, 1);
    assert_eq!(p.error_message().as_deref(), Some("mismatched tag"));
}
