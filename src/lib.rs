//! Incremental XML SAX parser.
//!
//! Bytes are pushed in chunks of any size with [`Parser::feed`]; events are
//! delivered to a [`sax::Handler`] while the chunk is processed. A handler
//! can suspend the parser, and [`Parser::resume`] picks up at the next event.
//!
//! ```
//! use xml_push::sax::{Attribute, Control, Handler};
//! use xml_push::Parser;
//!
//! #[derive(Default)]
//! struct Depth {
//!     current: usize,
//!     max: usize,
//! }
//!
//! impl Handler for Depth {
//!     fn start_element(&mut self, _ctl: &mut Control, _name: &str, _attributes: &[Attribute]) {
//!         self.current += 1;
//!         self.max = self.max.max(self.current);
//!     }
//!
//!     fn end_element(&mut self, _ctl: &mut Control, _name: &str) {
//!         self.current -= 1;
//!     }
//! }
//!
//! let mut parser = Parser::new(Depth::default());
//! parser.feed(b"<a><b><c/></b>", false).unwrap();
//! parser.feed(b"<b/></a>", true).unwrap();
//! assert_eq!(parser.handler().max, 3);
//! ```

pub mod sax;

pub use sax::parser::{Parser, Status};
