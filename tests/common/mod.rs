#![allow(dead_code)]

use xml_push::sax::{coalesce_text, Collector, Event, ParserConfig};
use xml_push::Parser;

/// Feeds `doc` in `step` byte chunks without ever marking the input final.
pub fn events_in_steps(doc: &[u8], step: usize, config: &ParserConfig) -> Vec<Event> {
    let mut parser = Parser::with_config(Collector::new(), config.clone());
    for chunk in doc.chunks(step) {
        if parser.feed(chunk, false).is_err() {
            break;
        }
    }
    coalesce_text(parser.into_handler().take_events())
}

/// Every step size from the whole document down to a single byte must
/// produce the same events.
pub fn expect_bytes_with(doc: &[u8], config: &ParserConfig, expected: &[Event]) {
    for step in (1..=doc.len()).rev() {
        let events = events_in_steps(doc, step, config);
        pretty_assertions::assert_eq!(events.as_slice(), expected, "step size {}", step);
    }
}

pub fn expect_bytes(doc: &[u8], expected: &[Event]) {
    expect_bytes_with(doc, &ParserConfig::default(), expected)
}

pub fn expect(doc: &str, expected: &[Event]) {
    expect_bytes(doc.as_bytes(), expected)
}

/// Whole document in one final chunk.
pub fn parse_all(doc: &[u8]) -> (Vec<Event>, Option<xml_push::sax::Error>) {
    let mut parser = Parser::new(Collector::new());
    let result = parser.feed(doc, true);
    let events = parser.handler().coalesced();
    (events, result.err())
}

pub fn utf16le(text: &str, bom: bool) -> Vec<u8> {
    let mut out = if bom { vec![0xFF, 0xFE] } else { Vec::new() };
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

pub fn utf16be(text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}
