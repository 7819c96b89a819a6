use thiserror::Error;

pub type SaxResult<T> = Result<T, Error>;

/// Everything that can go wrong while feeding a document.
///
/// Well-formedness errors are fatal for the current document: the parser
/// delivers them once through [`Handler::error`](crate::sax::Handler::error)
/// and keeps them until [`reset`](crate::sax::parser::Parser::reset).
/// Usage errors ([`Error::is_usage`]) only reject the call that caused them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    // well-formedness
    #[error("syntax error")]
    Syntax,
    #[error("no element found")]
    NoElements,
    #[error("not well-formed (invalid token)")]
    InvalidToken,
    #[error("unclosed token")]
    UnclosedToken,
    #[error("partial character")]
    PartialChar,
    #[error("mismatched tag")]
    TagMismatch,
    #[error("duplicate attribute")]
    DuplicateAttribute,
    #[error("junk after document element")]
    JunkAfterDocElement,
    #[error("illegal parameter entity reference")]
    ParamEntityRef,
    #[error("undefined entity")]
    UndefinedEntity,
    #[error("recursive entity reference")]
    RecursiveEntityRef,
    #[error("asynchronous entity")]
    AsyncEntity,
    #[error("reference to invalid character number")]
    BadCharRef,
    #[error("reference to binary entity")]
    BinaryEntityRef,
    #[error("reference to external entity in attribute")]
    AttributeExternalEntityRef,
    #[error("XML or text declaration not at start of entity")]
    MisplacedXmlPi,
    #[error("unknown encoding")]
    UnknownEncoding,
    #[error("encoding specified in XML declaration is incorrect")]
    IncorrectEncoding,
    #[error("unclosed CDATA section")]
    UnclosedCdataSection,
    #[error("XML declaration not well-formed")]
    XmlDecl,
    #[error("limit on input amplification factor (from DTD and entities) breached")]
    AmplificationLimitBreach,

    // usage
    #[error("parser suspended")]
    Suspended,
    #[error("parser not suspended")]
    NotSuspended,
    #[error("parsing finished")]
    Finished,
    #[error("cannot change setting once parsing has begun")]
    CantChangeSettingOnceParsing,
    #[error("no unknown encoding is pending")]
    NoPendingEncoding,
    #[error("unknown encoding map is malformed: {0}")]
    InvalidEncodingMap(String),
}

impl Error {
    /// True for errors that reject a call without touching the document.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::Suspended
                | Error::NotSuspended
                | Error::Finished
                | Error::CantChangeSettingOnceParsing
                | Error::NoPendingEncoding
                | Error::InvalidEncodingMap(_)
        )
    }
}

#[test]
fn test_error_messages() {
    assert_eq!(
        Error::InvalidToken.to_string(),
        "not well-formed (invalid token)"
    );
    assert_eq!(Error::NoElements.to_string(), "no element found");
    assert!(Error::NotSuspended.is_usage());
    assert!(!Error::TagMismatch.is_usage());
}
