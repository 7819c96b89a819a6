//! The push parser: chunk intake, the tokenizer state machine, entity
//! expansion, suspend/resume and event delivery.

use std::collections::{HashMap, VecDeque};

use log::{debug, trace, warn};

use crate::sax::{
    config::ParserConfig,
    dtd::{self, AttlistDecl, EntityDecl, EntityDef, SubsetItem},
    encoding::{ByteMap, Declared, Decoder, Encoding, Label, Sniff},
    entities::{char_reference, predefined, replacement_text, EntityTable, ExpansionBudget},
    error::{Error, SaxResult},
    internal::{
        self, char_data, inside_cdata, is_xml_target, markup_kind, normalize_newlines,
        whitespace_len, InsideCdata, MarkupKind, Pi, StartTag,
    },
    position::Position,
    Attribute, Control, EntityDeclaration, Event, Handler,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ParserState {
    // before the root element: XML declaration, DOCTYPE, comments, PIs
    Prolog,
    InternalSubset,
    Content,
    InsideCdata,
    // after the root element closed
    Epilog,
    Error,
}

/// Outcome of a successful [`Parser::feed`] or [`Parser::resume`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,
    /// A handler (or the caller) stopped the parser; [`Parser::resume`]
    /// continues where it left off.
    Suspended,
}

enum Step {
    Consumed(usize),
    NeedMore,
}

/// Replacement text being tokenized in place of an entity reference.
struct EntityFrame {
    name: String,
    text: String,
    pos: usize,
    is_parameter: bool,
    // open elements when the reference was met
    depth: usize,
}

struct AttributeDefault {
    name: String,
    is_tokenized: bool,
    value: Option<String>,
}

struct PendingEncoding {
    name: String,
    forced: bool,
}

/// Incremental XML parser delivering events to `H`.
///
/// ```
/// use xml_push::sax::{coalesce_text, Collector, Event};
/// use xml_push::Parser;
///
/// let mut parser = Parser::new(Collector::new());
/// for chunk in [&b"<greeting la"[..], b"ng='en'>hel", b"lo</greeting>"] {
///     parser.feed(chunk, false).unwrap();
/// }
/// parser.feed(b"", true).unwrap();
/// assert_eq!(
///     coalesce_text(parser.into_handler().take_events()),
///     vec![
///         Event::start_element("greeting", &[("lang", "en")]),
///         Event::text("hello"),
///         Event::end_element("greeting"),
///     ]
/// );
/// ```
pub struct Parser<H: Handler> {
    handler: H,
    config: ParserConfig,
    ctl: Control,

    state: ParserState,
    started: bool,
    is_final: bool,
    finished: bool,
    suspended: bool,
    error: Option<Error>,

    encoding: Option<String>,
    pending_encoding: Option<PendingEncoding>,
    decoder: Decoder,
    raw: Vec<u8>,
    text: String,
    text_pos: usize,
    at_start: bool,
    position: Position,

    frames: Vec<EntityFrame>,
    entities: EntityTable,
    budget: ExpansionBudget,
    attribute_defaults: HashMap<String, Vec<AttributeDefault>>,
    seen_doctype: bool,
    base: Option<String>,

    element_list: Vec<String>,
    queue: VecDeque<(Event, Position)>,
}

/// Bytes consumed and the parsed value, `None` while the token is unfinished.
fn token<'a, T>(
    result: nom::IResult<&'a str, T>,
    input: &'a str,
    complete: bool,
    invalid: Error,
) -> SaxResult<Option<(usize, T)>> {
    match result {
        Ok((rest, value)) => Ok(Some((input.len() - rest.len(), value))),
        Err(nom::Err::Incomplete(_)) if complete => Err(Error::UnclosedToken),
        Err(nom::Err::Incomplete(_)) => Ok(None),
        Err(_) => Err(invalid),
    }
}

fn deliver<H: Handler>(handler: &mut H, ctl: &mut Control, event: &Event) {
    match event {
        Event::StartElement { name, attributes } => handler.start_element(ctl, name, attributes),
        Event::EndElement { name } => handler.end_element(ctl, name),
        Event::Text(text) => handler.text(ctl, text),
        Event::StartCdata => handler.start_cdata(ctl),
        Event::EndCdata => handler.end_cdata(ctl),
        Event::Comment(text) => handler.comment(ctl, text),
        Event::ProcessingInstruction { target, data } => {
            handler.processing_instruction(ctl, target, data)
        }
        Event::XmlDecl {
            version,
            encoding,
            standalone,
        } => handler.xml_decl(ctl, version, encoding.as_deref(), *standalone),
        Event::EntityDecl(decl) => handler.entity_decl(ctl, decl),
        Event::UnknownEncoding(name) => handler.unknown_encoding(ctl, name),
        Event::Error(error) => handler.error(ctl, error),
    }
}

impl<H: Handler> Parser<H> {
    pub fn new(handler: H) -> Parser<H> {
        Parser::with_config(handler, ParserConfig::default())
    }

    pub fn with_config(handler: H, config: ParserConfig) -> Parser<H> {
        Parser {
            handler,
            encoding: config.encoding.clone(),
            config,
            ctl: Control::default(),

            state: ParserState::Prolog,
            started: false,
            is_final: false,
            finished: false,
            suspended: false,
            error: None,

            pending_encoding: None,
            decoder: Decoder::default(),
            raw: Vec::with_capacity(8 * 1024),
            text: String::with_capacity(8 * 1024),
            text_pos: 0,
            at_start: true,
            position: Position::default(),

            frames: Vec::new(),
            entities: EntityTable::default(),
            budget: ExpansionBudget::default(),
            attribute_defaults: HashMap::new(),
            seen_doctype: false,
            base: None,

            element_list: Vec::with_capacity(10),
            queue: VecDeque::new(),
        }
    }

    /// Feeds the next chunk of the document. `is_final` marks the last one;
    /// an empty final chunk is fine.
    ///
    /// Events are delivered before this returns. A well-formedness error is
    /// delivered as an [`Event::Error`] and returned; the parser then refuses
    /// input until [`reset`](Parser::reset).
    pub fn feed(&mut self, chunk: &[u8], is_final: bool) -> SaxResult<Status> {
        if self.suspended {
            return Err(Error::Suspended);
        }
        if self.finished || self.error.is_some() {
            return Err(Error::Finished);
        }
        trace!("feeding {} bytes, final: {}", chunk.len(), is_final);
        if !self.started {
            self.start();
        } else if self.pending_encoding.is_some() {
            self.fail(Error::UnknownEncoding);
            return self.run();
        }
        self.raw.extend_from_slice(chunk);
        self.is_final = is_final;
        self.run()
    }

    /// [`feed`](Parser::feed) as a success flag. On `false`,
    /// [`error_message`](Parser::error_message) says why for document errors.
    pub fn parse(&mut self, chunk: &[u8], is_final: bool) -> bool {
        match self.feed(chunk, is_final) {
            Ok(_) => true,
            Err(err) => {
                if err.is_usage() {
                    debug!("rejected feed: {}", err);
                }
                false
            }
        }
    }

    /// Suspends the parser between two handler calls.
    ///
    /// Handlers use [`Control::stop`]; this is for the caller, between feeds.
    pub fn stop(&mut self) -> SaxResult<()> {
        if self.suspended {
            return Err(Error::Suspended);
        }
        if self.finished || self.error.is_some() {
            return Err(Error::Finished);
        }
        debug!("suspended by caller");
        self.suspended = true;
        Ok(())
    }

    /// Continues a suspended parser with the event after the one it stopped
    /// at, then with whatever input is buffered.
    pub fn resume(&mut self) -> SaxResult<Status> {
        if !self.suspended {
            return Err(Error::NotSuspended);
        }
        debug!("resuming at line {}", self.position.line);
        self.suspended = false;
        self.run()
    }

    /// Makes the parser ready for a new document, keeping the handler and
    /// the configuration. An encoding forced with [`Parser::set_encoding`]
    /// falls back to the configured one.
    pub fn reset(&mut self) -> SaxResult<()> {
        if self.suspended {
            return Err(Error::Suspended);
        }
        debug!("reset");
        self.ctl = Control::default();
        self.state = ParserState::Prolog;
        self.started = false;
        self.is_final = false;
        self.finished = false;
        self.error = None;

        self.encoding = self.config.encoding.clone();
        self.pending_encoding = None;
        self.decoder = Decoder::default();
        self.raw.clear();
        self.text.clear();
        self.text_pos = 0;
        self.at_start = true;
        self.position = Position::default();

        self.frames.clear();
        self.entities.clear();
        self.budget.clear();
        self.attribute_defaults.clear();
        self.seen_doctype = false;
        self.base = None;

        self.element_list.clear();
        self.queue.clear();
        Ok(())
    }

    /// Like [`Parser::reset`], then forces `encoding` for the next document.
    pub fn reset_with_encoding(&mut self, encoding: Option<&str>) -> SaxResult<()> {
        self.reset()?;
        if let Some(name) = encoding {
            self.encoding = Some(name.to_owned());
        }
        Ok(())
    }

    /// The error that ended the current document, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    pub fn status(&self) -> Status {
        if self.suspended {
            Status::Suspended
        } else {
            Status::Ok
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn line_number(&self) -> u64 {
        self.position.line
    }

    pub fn column_number(&self) -> u64 {
        self.position.column
    }

    /// -1 before the first byte is consumed.
    pub fn byte_index(&self) -> i64 {
        self.position.byte_index()
    }

    /// The encoding input is currently decoded with. UTF-8 until a BOM,
    /// the XML declaration or a forced encoding says otherwise.
    pub fn encoding(&self) -> &Encoding {
        self.decoder.encoding()
    }

    /// Forces the document encoding; only before the first feed.
    pub fn set_encoding(&mut self, name: &str) -> SaxResult<()> {
        if self.started {
            return Err(Error::CantChangeSettingOnceParsing);
        }
        self.encoding = Some(name.to_owned());
        Ok(())
    }

    /// Answers an [`Event::UnknownEncoding`] after the handler returned
    /// without supplying a table. Must come before the next feed.
    pub fn set_unknown_encoding(&mut self, map: ByteMap) -> SaxResult<()> {
        if self.pending_encoding.is_none() {
            return Err(Error::NoPendingEncoding);
        }
        self.apply_encoding(map);
        Ok(())
    }

    /// Base URI reported with externally identified entity declarations.
    pub fn set_base(&mut self, base: Option<String>) {
        self.base = base;
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    fn start(&mut self) {
        self.started = true;
        if let Some(name) = self.encoding.clone() {
            match Label::lookup(&name) {
                Some(label) => {
                    debug!("encoding forced to {}", name);
                    self.decoder.force(label);
                }
                None => {
                    self.pending_encoding = Some(PendingEncoding {
                        name: name.clone(),
                        forced: true,
                    });
                    self.emit(Event::UnknownEncoding(name));
                }
            }
        }
    }

    fn apply_encoding(&mut self, map: ByteMap) {
        if let Some(pending) = self.pending_encoding.take() {
            self.decoder.install_map(&pending.name, map, pending.forced);
        }
    }

    fn emit(&mut self, event: Event) {
        self.queue.push_back((event, self.position));
    }

    fn fail(&mut self, error: Error) {
        debug!(
            "{} at line {} column {}",
            error, self.position.line, self.position.column
        );
        self.state = ParserState::Error;
        self.emit(Event::Error(error.clone()));
        self.error = Some(error);
    }

    fn run(&mut self) -> SaxResult<Status> {
        loop {
            if self.dispatch() {
                return Ok(Status::Suspended);
            }
            if let Some(error) = &self.error {
                return Err(error.clone());
            }
            match self.step() {
                Ok(true) => {}
                Ok(false) if !self.is_final => return Ok(Status::Ok),
                Ok(false) => match self.finish_document() {
                    Ok(()) => {
                        trace!("document complete");
                        self.finished = true;
                        return Ok(Status::Ok);
                    }
                    Err(error) => self.fail(error),
                },
                Err(error) => self.fail(error),
            }
        }
    }

    /// Delivers queued events; true when a handler asked to stop.
    fn dispatch(&mut self) -> bool {
        while let Some((event, at)) = self.queue.pop_front() {
            let wants_map =
                matches!(event, Event::UnknownEncoding(_)) && self.pending_encoding.is_some();
            self.ctl.prepare(at, wants_map);
            deliver(&mut self.handler, &mut self.ctl, &event);
            if let Some(map) = self.ctl.take_encoding_map() {
                self.apply_encoding(map);
            }
            if self.ctl.take_stop() && self.state != ParserState::Error {
                debug!("suspended at line {} column {}", at.line, at.column);
                self.suspended = true;
                return true;
            }
        }
        false
    }

    /// Tokenizes one token; false when more input is needed.
    fn step(&mut self) -> SaxResult<bool> {
        if let Some(index) = self.frames.len().checked_sub(1) {
            if self.frames[index].pos >= self.frames[index].text.len() {
                self.leave_entity()?;
                return Ok(true);
            }
            let text = std::mem::take(&mut self.frames[index].text);
            let pos = self.frames[index].pos;
            let result = self.tokenize(&text[pos..], true, true);
            self.frames[index].text = text;
            return match result? {
                Step::Consumed(len) => {
                    self.frames[index].pos += len;
                    Ok(true)
                }
                Step::NeedMore => Err(Error::UnclosedToken),
            };
        }

        let complete = self.is_final && self.raw.is_empty() && self.pending_encoding.is_none();
        let pos = self.text_pos;
        let text = std::mem::take(&mut self.text);
        let result = self.tokenize(&text[pos..], complete, false);
        self.text = text;
        match result? {
            Step::Consumed(len) => {
                self.consume(len);
                Ok(true)
            }
            Step::NeedMore => self.fill(),
        }
    }

    fn consume(&mut self, len: usize) {
        let decoder = &self.decoder;
        self.position
            .advance(&self.text[self.text_pos..self.text_pos + len], |c| {
                decoder.width(c)
            });
        self.text_pos += len;
        if self.at_start {
            self.at_start = false;
            self.decoder.close_decl_window();
        }
    }

    /// Decodes buffered bytes; true if anything new is ready to tokenize.
    fn fill(&mut self) -> SaxResult<bool> {
        if self.pending_encoding.is_some() {
            return Ok(false);
        }
        if self.text_pos > 0 {
            self.text.drain(..self.text_pos);
            self.text_pos = 0;
        }
        if !self.decoder.is_sniffed() {
            match self.decoder.sniff(&self.raw, self.is_final) {
                Sniff::NeedMore => return Ok(false),
                Sniff::Done(bom) => {
                    self.raw.drain(..bom);
                    self.position.skip_bytes(bom);
                }
            }
        }
        // whatever the window held was not a complete declaration
        self.decoder.release_window();
        let used = self.decoder.decode(&self.raw, &mut self.text)?;
        self.raw.drain(..used);
        Ok(used > 0)
    }

    fn finish_document(&mut self) -> SaxResult<()> {
        if self.pending_encoding.is_some() {
            return Err(Error::UnknownEncoding);
        }
        if !self.raw.is_empty() {
            return Err(Error::PartialChar);
        }
        if self.text_pos < self.text.len() {
            return Err(Error::UnclosedToken);
        }
        match self.state {
            ParserState::Epilog => Ok(()),
            ParserState::InsideCdata => Err(Error::UnclosedCdataSection),
            _ => Err(Error::NoElements),
        }
    }

    fn tokenize(&mut self, input: &str, complete: bool, in_entity: bool) -> SaxResult<Step> {
        if input.is_empty() {
            return Ok(Step::NeedMore);
        }
        match self.state {
            ParserState::Prolog | ParserState::Epilog => self.misc(input, complete, in_entity),
            ParserState::InternalSubset => self.subset(input, complete, in_entity),
            ParserState::Content => self.content(input, complete, in_entity),
            ParserState::InsideCdata => self.cdata_section(input, complete, in_entity),
            ParserState::Error => Ok(Step::NeedMore),
        }
    }

    fn misc(&mut self, input: &str, complete: bool, in_entity: bool) -> SaxResult<Step> {
        let space = whitespace_len(input);
        if space > 0 {
            return Ok(Step::Consumed(space));
        }
        let epilog = self.state == ParserState::Epilog;
        if !input.starts_with('<') {
            return Err(if epilog {
                Error::JunkAfterDocElement
            } else if input.starts_with('&') {
                Error::InvalidToken
            } else {
                Error::Syntax
            });
        }
        let kind = match markup_kind(input) {
            Some(kind) => kind,
            None if complete => return Err(Error::UnclosedToken),
            None => return Ok(Step::NeedMore),
        };
        match kind {
            MarkupKind::Pi => self.processing_instruction(input, complete, in_entity),
            MarkupKind::Comment => self.comment(input, complete),
            MarkupKind::Doctype if !epilog && !self.seen_doctype => self.doctype(input, complete),
            MarkupKind::Doctype if !epilog => Err(Error::Syntax),
            MarkupKind::StartTag if !epilog => self.start_tag(input, complete),
            _ if epilog => Err(Error::JunkAfterDocElement),
            _ => Err(Error::InvalidToken),
        }
    }

    fn content(&mut self, input: &str, complete: bool, in_entity: bool) -> SaxResult<Step> {
        if input.starts_with('<') {
            let kind = match markup_kind(input) {
                Some(kind) => kind,
                None if complete => return Err(Error::UnclosedToken),
                None => return Ok(Step::NeedMore),
            };
            return match kind {
                MarkupKind::StartTag => self.start_tag(input, complete),
                MarkupKind::EndTag => self.end_tag(input, complete),
                MarkupKind::Comment => self.comment(input, complete),
                MarkupKind::Pi => self.processing_instruction(input, complete, in_entity),
                MarkupKind::CdataStart => {
                    trace!("cdata section");
                    self.emit(Event::StartCdata);
                    self.state = ParserState::InsideCdata;
                    Ok(Step::Consumed("<![CDATA[".len()))
                }
                MarkupKind::Doctype | MarkupKind::Unknown => Err(Error::InvalidToken),
            };
        }
        if input.starts_with('&') {
            let (len, body) =
                match token(internal::reference(input), input, complete, Error::InvalidToken)? {
                    Some(parsed) => parsed,
                    None => return Ok(Step::NeedMore),
                };
            self.entity_reference(body)?;
            return Ok(Step::Consumed(len));
        }
        match char_data(input, complete) {
            Ok((rest, text)) => {
                self.emit(Event::Text(normalize_newlines(text)));
                Ok(Step::Consumed(input.len() - rest.len()))
            }
            Err(nom::Err::Incomplete(_)) if complete => Err(Error::UnclosedToken),
            Err(nom::Err::Incomplete(_)) => Ok(Step::NeedMore),
            Err(_) => Err(Error::InvalidToken),
        }
    }

    fn cdata_section(&mut self, input: &str, complete: bool, in_entity: bool) -> SaxResult<Step> {
        match inside_cdata(input, complete) {
            Ok((rest, InsideCdata::Characters(text))) => {
                self.emit(Event::Text(normalize_newlines(text)));
                Ok(Step::Consumed(input.len() - rest.len()))
            }
            Ok((rest, InsideCdata::CdataEnd)) => {
                self.emit(Event::EndCdata);
                self.state = ParserState::Content;
                Ok(Step::Consumed(input.len() - rest.len()))
            }
            Err(nom::Err::Incomplete(_)) if complete && in_entity => Err(Error::AsyncEntity),
            Err(nom::Err::Incomplete(_)) if complete => Err(Error::UnclosedCdataSection),
            Err(nom::Err::Incomplete(_)) => Ok(Step::NeedMore),
            Err(_) => Err(Error::InvalidToken),
        }
    }

    fn subset(&mut self, input: &str, complete: bool, in_entity: bool) -> SaxResult<Step> {
        let space = whitespace_len(input);
        if space > 0 {
            return Ok(Step::Consumed(space));
        }
        let (len, item) = match token(dtd::subset_item(input), input, complete, Error::Syntax)? {
            Some(parsed) => parsed,
            None => return Ok(Step::NeedMore),
        };
        match item {
            SubsetItem::Entity(decl) => self.entity_declaration(decl)?,
            SubsetItem::Attlist(list) => self.attlist_declaration(list)?,
            SubsetItem::Element(name) => trace!("element declaration {}", name),
            SubsetItem::Notation(name) => trace!("notation declaration {}", name),
            SubsetItem::Pi(pi) => self.pi_event(pi)?,
            SubsetItem::Comment(text) => self.emit(Event::Comment(normalize_newlines(text))),
            SubsetItem::PeReference(name) => self.parameter_reference(name)?,
            SubsetItem::End if in_entity => return Err(Error::Syntax),
            SubsetItem::End => {
                trace!("end of internal subset");
                self.state = ParserState::Prolog;
            }
        }
        Ok(Step::Consumed(len))
    }

    fn doctype(&mut self, input: &str, complete: bool) -> SaxResult<Step> {
        let (len, doctype) = match token(dtd::doctype_start(input), input, complete, Error::Syntax)?
        {
            Some(parsed) => parsed,
            None => return Ok(Step::NeedMore),
        };
        debug!(
            "document type {} (external subset: {:?})",
            doctype.name,
            doctype.external_id.map(|id| id.system_id)
        );
        self.seen_doctype = true;
        if doctype.has_subset {
            self.state = ParserState::InternalSubset;
        }
        Ok(Step::Consumed(len))
    }

    fn comment(&mut self, input: &str, complete: bool) -> SaxResult<Step> {
        let (len, text) =
            match token(internal::comment(input), input, complete, Error::InvalidToken)? {
                Some(parsed) => parsed,
                None => return Ok(Step::NeedMore),
            };
        trace!("comment");
        self.emit(Event::Comment(normalize_newlines(text)));
        Ok(Step::Consumed(len))
    }

    fn processing_instruction(
        &mut self,
        input: &str,
        complete: bool,
        in_entity: bool,
    ) -> SaxResult<Step> {
        let (len, pi) = match token(internal::pi(input), input, complete, Error::InvalidToken)? {
            Some(parsed) => parsed,
            None => return Ok(Step::NeedMore),
        };
        if pi.target == "xml" && self.at_start && !in_entity {
            self.xml_declaration(&input[..len])?;
        } else {
            self.pi_event(pi)?;
        }
        Ok(Step::Consumed(len))
    }

    fn pi_event(&mut self, pi: Pi) -> SaxResult<()> {
        if is_xml_target(pi.target) {
            return Err(Error::MisplacedXmlPi);
        }
        trace!("processing instruction {}", pi.target);
        self.emit(Event::ProcessingInstruction {
            target: pi.target.to_owned(),
            data: normalize_newlines(pi.data),
        });
        Ok(())
    }

    fn xml_declaration(&mut self, text: &str) -> SaxResult<()> {
        let decl = match internal::xml_decl(text) {
            Ok((_, decl)) => decl,
            Err(_) => return Err(Error::XmlDecl),
        };
        trace!("xml declaration {:?}", decl);
        self.emit(Event::XmlDecl {
            version: decl.version.to_owned(),
            encoding: decl.encoding.map(str::to_owned),
            standalone: decl.standalone,
        });
        if let Some(name) = decl.encoding {
            match self.decoder.declared(name) {
                Declared::Keep | Declared::Switched => {}
                Declared::Incorrect => return Err(Error::IncorrectEncoding),
                Declared::Unknown => {
                    debug!("unknown encoding {}", name);
                    self.pending_encoding = Some(PendingEncoding {
                        name: name.to_owned(),
                        forced: false,
                    });
                    self.emit(Event::UnknownEncoding(name.to_owned()));
                }
            }
        }
        Ok(())
    }

    fn start_tag(&mut self, input: &str, complete: bool) -> SaxResult<Step> {
        let (len, tag) =
            match token(internal::start_tag(input), input, complete, Error::InvalidToken)? {
                Some(parsed) => parsed,
                None => return Ok(Step::NeedMore),
            };
        self.start_element(tag)?;
        Ok(Step::Consumed(len))
    }

    fn start_element(&mut self, tag: StartTag) -> SaxResult<()> {
        let mut attributes: Vec<Attribute> = Vec::with_capacity(tag.attributes.len());
        for (name, raw) in &tag.attributes {
            if attributes.iter().any(|a| a.name == *name) {
                return Err(Error::DuplicateAttribute);
            }
            let is_tokenized = self
                .attribute_defaults
                .get(tag.name)
                .and_then(|defaults| defaults.iter().find(|d| d.name == *name))
                .map_or(false, |d| d.is_tokenized);
            let value = self.attribute_value(raw, is_tokenized)?;
            attributes.push(Attribute {
                name: (*name).to_owned(),
                value,
            });
        }
        if let Some(defaults) = self.attribute_defaults.get(tag.name) {
            for default in defaults {
                if let Some(value) = &default.value {
                    if !attributes.iter().any(|a| a.name == default.name) {
                        attributes.push(Attribute {
                            name: default.name.clone(),
                            value: value.clone(),
                        });
                    }
                }
            }
        }

        trace!("start element {}", tag.name);
        let name = tag.name.to_owned();
        self.emit(Event::StartElement {
            name: name.clone(),
            attributes,
        });
        if tag.is_empty {
            self.emit(Event::EndElement { name });
            if self.element_list.is_empty() {
                self.state = ParserState::Epilog;
            }
        } else {
            self.element_list.push(name);
            self.state = ParserState::Content;
        }
        Ok(())
    }

    fn end_tag(&mut self, input: &str, complete: bool) -> SaxResult<Step> {
        let (len, name) =
            match token(internal::end_tag(input), input, complete, Error::InvalidToken)? {
                Some(parsed) => parsed,
                None => return Ok(Step::NeedMore),
            };
        if let Some(frame) = self.frames.last() {
            if !frame.is_parameter && self.element_list.len() <= frame.depth {
                return Err(Error::AsyncEntity);
            }
        }
        match self.element_list.pop() {
            Some(open) if open == name => {}
            _ => return Err(Error::TagMismatch),
        }
        trace!("end element {}", name);
        self.emit(Event::EndElement {
            name: name.to_owned(),
        });
        if self.element_list.is_empty() {
            self.state = ParserState::Epilog;
        }
        Ok(Step::Consumed(len))
    }

    fn entity_reference(&mut self, body: &str) -> SaxResult<()> {
        if body.starts_with('#') {
            let c = char_reference(body)?;
            self.emit(Event::Text(c.to_string()));
            return Ok(());
        }
        if let Some(c) = predefined(body) {
            self.emit(Event::Text(c.to_string()));
            return Ok(());
        }
        let decl = self.entities.general(body).ok_or(Error::UndefinedEntity)?;
        if decl.is_unparsed() {
            return Err(Error::BinaryEntityRef);
        }
        let value = match &decl.value {
            Some(value) => value.clone(),
            None => {
                warn!("not expanding external entity {}", body);
                return Ok(());
            }
        };
        if self.frames.iter().any(|f| !f.is_parameter && f.name == body) {
            return Err(Error::RecursiveEntityRef);
        }
        self.enter_entity(body, value, false)
    }

    fn parameter_reference(&mut self, name: &str) -> SaxResult<()> {
        let value = match self.entities.parameter(name) {
            Some(decl) => decl.value.clone(),
            None => {
                debug!("skipping undeclared parameter entity {}", name);
                return Ok(());
            }
        };
        let value = match value {
            Some(value) => value,
            None => {
                warn!("not expanding external parameter entity {}", name);
                return Ok(());
            }
        };
        if self.frames.iter().any(|f| f.is_parameter && f.name == name) {
            return Err(Error::RecursiveEntityRef);
        }
        self.enter_entity(name, value, true)
    }

    fn enter_entity(&mut self, name: &str, text: String, is_parameter: bool) -> SaxResult<()> {
        self.budget.charge(
            &self.config,
            text.len(),
            self.frames.len() + 1,
            self.position.consumed_bytes(),
        )?;
        debug!(
            "expanding entity {} ({} bytes, {} expanded so far)",
            name,
            text.len(),
            self.budget.expanded()
        );
        self.frames.push(EntityFrame {
            name: name.to_owned(),
            text,
            pos: 0,
            is_parameter,
            depth: self.element_list.len(),
        });
        Ok(())
    }

    fn leave_entity(&mut self) -> SaxResult<()> {
        if let Some(frame) = self.frames.pop() {
            trace!("leaving entity {}", frame.name);
            let balanced = self.state == ParserState::Content
                && self.element_list.len() == frame.depth;
            if !frame.is_parameter && !balanced {
                return Err(Error::AsyncEntity);
            }
        }
        Ok(())
    }

    fn entity_declaration(&mut self, decl: EntityDecl) -> SaxResult<()> {
        let record = match decl.def {
            EntityDef::Internal(literal) => EntityDeclaration {
                name: decl.name.to_owned(),
                is_parameter_entity: decl.is_parameter_entity,
                value: Some(replacement_text(literal)?),
                ..Default::default()
            },
            EntityDef::External { id, notation } => EntityDeclaration {
                name: decl.name.to_owned(),
                is_parameter_entity: decl.is_parameter_entity,
                value: None,
                base: self.base.clone(),
                system_id: Some(id.system_id.to_owned()),
                public_id: id.public_id.map(str::to_owned),
                notation_name: notation.map(str::to_owned),
            },
        };
        if self.entities.declare(record.clone()) {
            trace!("entity declaration {}", record.name);
            self.emit(Event::EntityDecl(record));
        } else {
            debug!("entity {} already declared, keeping the first", record.name);
        }
        Ok(())
    }

    fn attlist_declaration(&mut self, list: AttlistDecl) -> SaxResult<()> {
        for def in list.attributes {
            let declared = self
                .attribute_defaults
                .get(list.element)
                .map_or(false, |defaults| defaults.iter().any(|d| d.name == def.name));
            if declared {
                continue;
            }
            let value = match def.default {
                Some(raw) => Some(self.attribute_value(raw, def.is_tokenized)?),
                None => None,
            };
            self.attribute_defaults
                .entry(list.element.to_owned())
                .or_default()
                .push(AttributeDefault {
                    name: def.name.to_owned(),
                    is_tokenized: def.is_tokenized,
                    value,
                });
        }
        Ok(())
    }

    /// Attribute-value normalization: references expanded, each white space
    /// character a space, tokenized values trimmed and collapsed.
    fn attribute_value(&mut self, raw: &str, is_tokenized: bool) -> SaxResult<String> {
        let mut value = String::with_capacity(raw.len());
        let mut open = Vec::new();
        self.expand_attribute(raw, &mut value, &mut open)?;
        if is_tokenized {
            value = value
                .split(' ')
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
        }
        Ok(value)
    }

    fn expand_attribute(
        &mut self,
        raw: &str,
        out: &mut String,
        open: &mut Vec<String>,
    ) -> SaxResult<()> {
        let mut rest = raw;
        while let Some(c) = rest.chars().next() {
            match c {
                '&' => {
                    let (after, body) =
                        internal::reference(rest).map_err(|_| Error::InvalidToken)?;
                    rest = after;
                    if body.starts_with('#') {
                        out.push(char_reference(body)?);
                        continue;
                    }
                    if let Some(c) = predefined(body) {
                        out.push(c);
                        continue;
                    }
                    let decl = self.entities.general(body).ok_or(Error::UndefinedEntity)?;
                    if decl.is_unparsed() {
                        return Err(Error::BinaryEntityRef);
                    }
                    let value = decl
                        .value
                        .clone()
                        .ok_or(Error::AttributeExternalEntityRef)?;
                    if open.iter().any(|name| name == body) {
                        return Err(Error::RecursiveEntityRef);
                    }
                    self.budget.charge(
                        &self.config,
                        value.len(),
                        open.len() + 1,
                        self.position.consumed_bytes(),
                    )?;
                    open.push(body.to_owned());
                    self.expand_attribute(&value, out, open)?;
                    open.pop();
                }
                '<' => return Err(Error::InvalidToken),
                '\r' => {
                    out.push(' ');
                    rest = &rest[1..];
                    rest = rest.strip_prefix('\n').unwrap_or(rest);
                }
                '\n' | '\t' => {
                    out.push(' ');
                    rest = &rest[1..];
                }
                c => {
                    out.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
use crate::sax::Collector;

#[test]
fn test_parser1() {
    let data = r#"<root><A a='x'>
    <B b="val" a:b12='val2' ><C/></B> </A> </root>"#
        .as_bytes();

    let mut p = Parser::new(Collector::new());
    assert_eq!(p.feed(data, true), Ok(Status::Ok));
    let events = p.handler().coalesced();
    assert_eq!(events.len(), 11);
    assert_eq!(
        events[3],
        Event::start_element("B", &[("b", "val"), ("a:b12", "val2")])
    );
    assert_eq!(events[10], Event::end_element("root"));
}

#[test]
fn test_error_is_sticky() {
    let mut p = Parser::new(Collector::new());
    assert_eq!(p.feed(b"<a></b>", false), Err(Error::TagMismatch));
    assert_eq!(p.feed(b"<c/>", true), Err(Error::Finished));
    assert_eq!(p.error(), Some(&Error::TagMismatch));
    assert_eq!(p.error_message().as_deref(), Some("mismatched tag"));
}

#[test]
fn test_entity_frames_unwind() {
    let doc = r#"<!DOCTYPE d [<!ENTITY in "<i>x</i>"><!ENTITY out "[&in;]">]><d>&out;</d>"#;
    let mut p = Parser::new(Collector::new());
    assert_eq!(p.feed(doc.as_bytes(), true), Ok(Status::Ok));
    let events = p.handler().coalesced();
    assert_eq!(
        &events[2..],
        &[
            Event::start_element("d", &[]),
            Event::text("["),
            Event::start_element("i", &[]),
            Event::text("x"),
            Event::end_element("i"),
            Event::text("]"),
            Event::end_element("d"),
        ]
    );
}
