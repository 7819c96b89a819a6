mod collector;
mod config;
mod dtd;
mod encoding;
mod entities;
pub mod error;
mod internal;
pub mod parser;
mod position;

pub use collector::{coalesce_text, Collector};
pub use config::ParserConfig;
pub use encoding::{ByteMap, Encoding};
pub use entities::EntityDeclaration;
pub use error::{Error, SaxResult};
pub use position::Position;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: &str, value: &str) -> Attribute {
        Attribute {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }
}

/// Everything the parser reports, in document order.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    StartElement {
        name: String,
        // document order, defaulted attributes last
        attributes: Vec<Attribute>,
    },
    EndElement {
        name: String,
    },
    Text(String),
    StartCdata,
    EndCdata,
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    XmlDecl {
        version: String,
        encoding: Option<String>,
        standalone: Option<bool>,
    },
    EntityDecl(EntityDeclaration),
    UnknownEncoding(String),
    Error(Error),
}

impl Event {
    pub fn start_element(name: &str, attributes: &[(&str, &str)]) -> Event {
        Event::StartElement {
            name: name.to_owned(),
            attributes: attributes
                .iter()
                .map(|(n, v)| Attribute::new(n, v))
                .collect(),
        }
    }

    pub fn end_element(name: &str) -> Event {
        Event::EndElement {
            name: name.to_owned(),
        }
    }

    pub fn text(text: &str) -> Event {
        Event::Text(text.to_owned())
    }
}

/// Handle a handler gets with every event.
///
/// Through it a handler can suspend the parser, answer an
/// [`unknown_encoding`](Handler::unknown_encoding) event, or ask where the
/// current event starts.
#[derive(Debug, Default)]
pub struct Control {
    position: Position,
    stop_requested: bool,
    encoding_requested: bool,
    encoding_map: Option<ByteMap>,
}

impl Control {
    /// Suspends the parser once the current handler returns.
    /// [`Parser::resume`](parser::Parser::resume) continues with the next event.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Position of the first byte of the markup the current event came from.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Only valid inside [`Handler::unknown_encoding`].
    pub fn set_unknown_encoding(&mut self, map: ByteMap) -> SaxResult<()> {
        if !self.encoding_requested {
            return Err(Error::NoPendingEncoding);
        }
        self.encoding_map = Some(map);
        Ok(())
    }

    pub(crate) fn prepare(&mut self, position: Position, encoding_requested: bool) {
        self.position = position;
        self.encoding_requested = encoding_requested;
    }

    pub(crate) fn take_stop(&mut self) -> bool {
        std::mem::take(&mut self.stop_requested)
    }

    pub(crate) fn take_encoding_map(&mut self) -> Option<ByteMap> {
        self.encoding_requested = false;
        self.encoding_map.take()
    }
}

/// Receives parse events. Every method defaults to ignoring its event.
#[allow(unused_variables)]
pub trait Handler {
    fn start_element(&mut self, ctl: &mut Control, name: &str, attributes: &[Attribute]) {}

    fn end_element(&mut self, ctl: &mut Control, name: &str) {}

    /// Text may arrive in several pieces; neighbouring calls belong together.
    fn text(&mut self, ctl: &mut Control, text: &str) {}

    fn start_cdata(&mut self, ctl: &mut Control) {}

    fn end_cdata(&mut self, ctl: &mut Control) {}

    fn comment(&mut self, ctl: &mut Control, text: &str) {}

    fn processing_instruction(&mut self, ctl: &mut Control, target: &str, data: &str) {}

    fn xml_decl(
        &mut self,
        ctl: &mut Control,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) {
    }

    fn entity_decl(&mut self, ctl: &mut Control, decl: &EntityDeclaration) {}

    /// Answer with [`Control::set_unknown_encoding`] to keep parsing.
    fn unknown_encoding(&mut self, ctl: &mut Control, name: &str) {}

    fn error(&mut self, ctl: &mut Control, error: &Error) {}
}

impl<H: Handler + ?Sized> Handler for &mut H {
    fn start_element(&mut self, ctl: &mut Control, name: &str, attributes: &[Attribute]) {
        (**self).start_element(ctl, name, attributes)
    }

    fn end_element(&mut self, ctl: &mut Control, name: &str) {
        (**self).end_element(ctl, name)
    }

    fn text(&mut self, ctl: &mut Control, text: &str) {
        (**self).text(ctl, text)
    }

    fn start_cdata(&mut self, ctl: &mut Control) {
        (**self).start_cdata(ctl)
    }

    fn end_cdata(&mut self, ctl: &mut Control) {
        (**self).end_cdata(ctl)
    }

    fn comment(&mut self, ctl: &mut Control, text: &str) {
        (**self).comment(ctl, text)
    }

    fn processing_instruction(&mut self, ctl: &mut Control, target: &str, data: &str) {
        (**self).processing_instruction(ctl, target, data)
    }

    fn xml_decl(
        &mut self,
        ctl: &mut Control,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) {
        (**self).xml_decl(ctl, version, encoding, standalone)
    }

    fn entity_decl(&mut self, ctl: &mut Control, decl: &EntityDeclaration) {
        (**self).entity_decl(ctl, decl)
    }

    fn unknown_encoding(&mut self, ctl: &mut Control, name: &str) {
        (**self).unknown_encoding(ctl, name)
    }

    fn error(&mut self, ctl: &mut Control, error: &Error) {
        (**self).error(ctl, error)
    }
}
