//! A handler that keeps every event.

use super::{Attribute, Control, EntityDeclaration, Error, Event, Handler};

/// Records events as owned [`Event`] values.
///
/// ```
/// use xml_push::sax::{parser::Parser, Collector, Event};
///
/// let mut parser = Parser::new(Collector::new());
/// assert!(parser.parse(b"<r>a</r>", true));
/// assert_eq!(
///     parser.handler().events(),
///     &[Event::start_element("r", &[]), Event::text("a"), Event::end_element("r")]
/// );
/// ```
#[derive(Debug, Default)]
pub struct Collector {
    events: Vec<Event>,
}

impl Collector {
    pub fn new() -> Self {
        Collector { events: Vec::new() }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Events with neighbouring text pieces joined.
    pub fn coalesced(&self) -> Vec<Event> {
        coalesce_text(self.events.iter().cloned())
    }
}

pub fn coalesce_text<I>(events: I) -> Vec<Event>
where
    I: IntoIterator<Item = Event>,
{
    let mut out: Vec<Event> = Vec::new();
    for event in events {
        match (out.last_mut(), event) {
            (Some(Event::Text(buf)), Event::Text(more)) => buf.push_str(&more),
            (_, event) => out.push(event),
        }
    }
    out
}

impl Handler for Collector {
    fn start_element(&mut self, _ctl: &mut Control, name: &str, attributes: &[Attribute]) {
        self.events.push(Event::StartElement {
            name: name.to_owned(),
            attributes: attributes.to_vec(),
        });
    }

    fn end_element(&mut self, _ctl: &mut Control, name: &str) {
        self.events.push(Event::end_element(name));
    }

    fn text(&mut self, _ctl: &mut Control, text: &str) {
        self.events.push(Event::text(text));
    }

    fn start_cdata(&mut self, _ctl: &mut Control) {
        self.events.push(Event::StartCdata);
    }

    fn end_cdata(&mut self, _ctl: &mut Control) {
        self.events.push(Event::EndCdata);
    }

    fn comment(&mut self, _ctl: &mut Control, text: &str) {
        self.events.push(Event::Comment(text.to_owned()));
    }

    fn processing_instruction(&mut self, _ctl: &mut Control, target: &str, data: &str) {
        self.events.push(Event::ProcessingInstruction {
            target: target.to_owned(),
            data: data.to_owned(),
        });
    }

    fn xml_decl(
        &mut self,
        _ctl: &mut Control,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) {
        self.events.push(Event::XmlDecl {
            version: version.to_owned(),
            encoding: encoding.map(str::to_owned),
            standalone,
        });
    }

    fn entity_decl(&mut self, _ctl: &mut Control, decl: &EntityDeclaration) {
        self.events.push(Event::EntityDecl(decl.clone()));
    }

    fn unknown_encoding(&mut self, _ctl: &mut Control, name: &str) {
        self.events.push(Event::UnknownEncoding(name.to_owned()));
    }

    fn error(&mut self, _ctl: &mut Control, error: &Error) {
        self.events.push(Event::Error(error.clone()));
    }
}

#[test]
fn test_coalesce_text() {
    let events = vec![
        Event::text("a"),
        Event::text("b"),
        Event::StartCdata,
        Event::text("c"),
    ];
    assert_eq!(
        coalesce_text(events),
        vec![Event::text("ab"), Event::StartCdata, Event::text("c")]
    );
}
