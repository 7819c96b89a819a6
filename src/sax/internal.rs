//! Markup grammar, one token at a time.
//!
//! Every parser here is a nom *streaming* parser over decoded text: running
//! out of input is `Err::Incomplete` and means "feed more", never "invalid".
//! Character data is the exception, it is cut at the end of the buffer so
//! text flows out without waiting for the next tag (ref#streamcut).

use nom::{
    branch::alt,
    bytes::streaming::{tag, take_till, take_until, take_while},
    character::streaming::{anychar, char, digit1, hex_digit1, multispace0, multispace1},
    combinator::{opt, recognize},
    error::{Error, ErrorKind},
    sequence::{delimited, pair, preceded, tuple},
    Err, IResult, Needed,
};

use crate::sax::entities::is_xml_char;

// [4] NameStartChar ::= ":" | [A-Z] | "_" | [a-z] | [#xC0-#xD6] | [#xD8-#xF6] |
// [#xF8-#x2FF] | [#x370-#x37D] | [#x37F-#x1FFF] | [#x200C-#x200D] | [#x2070-#x218F] |
// [#x2C00-#x2FEF] | [#x3001-#xD7FF] | [#xF900-#xFDCF] | [#xFDF0-#xFFFD] | [#x10000-#xEFFFF]
#[inline]
pub(crate) fn is_namestart_char(chr: char) -> bool {
    chr.is_ascii_alphabetic()
        || chr == ':'
        || chr == '_'
        || ('\u{C0}'..='\u{D6}').contains(&chr)
        || ('\u{D8}'..='\u{F6}').contains(&chr)
        || ('\u{F8}'..='\u{2FF}').contains(&chr)
        || ('\u{370}'..='\u{37D}').contains(&chr)
        || ('\u{37F}'..='\u{1FFF}').contains(&chr)
        || ('\u{200C}'..='\u{200D}').contains(&chr)
        || ('\u{2070}'..='\u{218F}').contains(&chr)
        || ('\u{2C00}'..='\u{2FEF}').contains(&chr)
        || ('\u{3001}'..='\u{D7FF}').contains(&chr)
        || ('\u{F900}'..='\u{FDCF}').contains(&chr)
        || ('\u{FDF0}'..='\u{FFFD}').contains(&chr)
        || ('\u{10000}'..='\u{EFFFF}').contains(&chr)
}

// [4a] NameChar ::= NameStartChar | "-" | "." | [0-9] | #xB7 | [#x0300-#x036F] | [#x203F-#x2040]
#[inline]
pub(crate) fn is_namechar(chr: char) -> bool {
    is_namestart_char(chr)
        || chr.is_ascii_digit()
        || chr == '-'
        || chr == '.'
        || chr == '\u{B7}'
        || ('\u{0300}'..='\u{036F}').contains(&chr)
        || ('\u{203F}'..='\u{2040}').contains(&chr)
}

// [3] S ::= (#x20 | #x9 | #xD | #xA)+
#[inline]
pub(crate) fn is_space(chr: char) -> bool {
    chr == ' ' || chr == '\t' || chr == '\n' || chr == '\r'
}

fn fail<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(Err::Error(Error::new(input, kind)))
}

// [5] Name ::= NameStartChar (NameChar)*
pub(crate) fn name(input: &str) -> IResult<&str, &str> {
    match input.chars().next() {
        None => Err(Err::Incomplete(Needed::new(1))),
        Some(c) if is_namestart_char(c) => recognize(pair(anychar, take_while(is_namechar)))(input),
        Some(_) => fail(input, ErrorKind::Char),
    }
}

/// Length of the leading whitespace, however much is there.
pub(crate) fn whitespace_len(input: &str) -> usize {
    input
        .char_indices()
        .find(|(_, c)| !is_space(*c))
        .map(|(i, _)| i)
        .unwrap_or(input.len())
}

fn check_chars(input: &str) -> bool {
    input.chars().all(is_xml_char)
}

// [25] Eq ::= S? '=' S?
fn eq(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char('='), multispace0)(input)
}

/// A quoted literal without interpretation of its content.
pub(crate) fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
        delimited(char('\''), take_till(|c| c == '\''), char('\'')),
    ))(input)
}

// [10] AttValue ::= '"' ([^<&"] | Reference)* '"' | "'" ([^<&'] | Reference)* "'"
// references are checked when the value is normalized
pub(crate) fn att_value(input: &str) -> IResult<&str, &str> {
    let (rest, value) = quoted(input)?;
    if value.contains('<') || !check_chars(value) {
        return fail(input, ErrorKind::Char);
    }
    Ok((rest, value))
}

// [41] Attribute ::= Name Eq AttValue
fn attribute(input: &str) -> IResult<&str, (&str, &str)> {
    let (rest, (name, _, value)) = tuple((name, eq, att_value))(input)?;
    Ok((rest, (name, value)))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct StartTag<'a> {
    pub name: &'a str,
    /// Raw, unnormalized values.
    pub attributes: Vec<(&'a str, &'a str)>,
    pub is_empty: bool,
}

// [40] STag ::= '<' Name (S Attribute)* S? '>'
// [44] EmptyElemTag ::= '<' Name (S Attribute)* S? '/>'
pub(crate) fn start_tag(input: &str) -> IResult<&str, StartTag> {
    let (mut i, name) = preceded(char('<'), name)(input)?;
    let mut attributes = Vec::new();
    loop {
        let (after_space, space) = multispace0(i)?;
        if let Some(rest) = after_space.strip_prefix('>') {
            return Ok((
                rest,
                StartTag {
                    name,
                    attributes,
                    is_empty: false,
                },
            ));
        }
        if after_space.starts_with('/') {
            let (rest, _) = tag("/>")(after_space)?;
            return Ok((
                rest,
                StartTag {
                    name,
                    attributes,
                    is_empty: true,
                },
            ));
        }
        if space.is_empty() {
            return fail(after_space, ErrorKind::Space);
        }
        let (rest, attr) = attribute(after_space)?;
        attributes.push(attr);
        i = rest;
    }
}

// [42] ETag ::= '</' Name S? '>'
pub(crate) fn end_tag(input: &str) -> IResult<&str, &str> {
    delimited(tag("</"), name, pair(multispace0, char('>')))(input)
}

// [15] Comment ::= '<!--' ((Char - '-') | ('-' (Char - '-')))* '-->'
pub(crate) fn comment(input: &str) -> IResult<&str, &str> {
    let (rest, text) = delimited(tag("<!--"), take_until("--"), tag("-->"))(input)?;
    if !check_chars(text) {
        return fail(input, ErrorKind::Char);
    }
    Ok((rest, text))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Pi<'a> {
    pub target: &'a str,
    pub data: &'a str,
}

// [16] PI ::= '<?' PITarget (S (Char* - (Char* '?>' Char*)))? '?>'
pub(crate) fn pi(input: &str) -> IResult<&str, Pi> {
    let (i, target) = preceded(tag("<?"), name)(input)?;
    if i.starts_with('?') {
        let (rest, _) = tag("?>")(i)?;
        return Ok((rest, Pi { target, data: "" }));
    }
    let (rest, data) = delimited(multispace1, take_until("?>"), tag("?>"))(i)?;
    if !check_chars(data) {
        return fail(input, ErrorKind::Char);
    }
    Ok((rest, Pi { target, data }))
}

/// Whether a PI target is reserved for the XML declaration.
pub(crate) fn is_xml_target(target: &str) -> bool {
    target.eq_ignore_ascii_case("xml")
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct XmlDecl<'a> {
    pub version: &'a str,
    pub encoding: Option<&'a str>,
    pub standalone: Option<bool>,
}

// [26] VersionNum ::= '1.' [0-9]+
fn version_num(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("1."), digit1))(input)
}

// [24] VersionInfo ::= S 'version' Eq ("'" VersionNum "'" | '"' VersionNum '"')
fn version_info(input: &str) -> IResult<&str, &str> {
    preceded(
        tuple((multispace1, tag("version"), eq)),
        alt((
            delimited(char('"'), version_num, char('"')),
            delimited(char('\''), version_num, char('\'')),
        )),
    )(input)
}

// [81] EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
fn enc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        nom::character::streaming::satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'),
    ))(input)
}

// [80] EncodingDecl ::= S 'encoding' Eq ('"' EncName '"' | "'" EncName "'" )
fn encoding_decl(input: &str) -> IResult<&str, &str> {
    preceded(
        tuple((multispace1, tag("encoding"), eq)),
        alt((
            delimited(char('"'), enc_name, char('"')),
            delimited(char('\''), enc_name, char('\'')),
        )),
    )(input)
}

fn yes_no(input: &str) -> IResult<&str, &str> {
    alt((tag("yes"), tag("no")))(input)
}

// [32] SDDecl ::= S 'standalone' Eq (("'" ('yes' | 'no') "'") | ('"' ('yes' | 'no') '"'))
fn sd_decl(input: &str) -> IResult<&str, bool> {
    let (rest, value) = preceded(
        tuple((multispace1, tag("standalone"), eq)),
        alt((
            delimited(char('"'), yes_no, char('"')),
            delimited(char('\''), yes_no, char('\'')),
        )),
    )(input)?;
    Ok((rest, value == "yes"))
}

// [23] XMLDecl ::= '<?xml' VersionInfo EncodingDecl? SDDecl? S? '?>'
pub(crate) fn xml_decl(input: &str) -> IResult<&str, XmlDecl> {
    let (rest, (_, version, encoding, standalone, _, _)) = tuple((
        tag("<?xml"),
        version_info,
        opt(encoding_decl),
        opt(sd_decl),
        multispace0,
        tag("?>"),
    ))(input)?;
    Ok((
        rest,
        XmlDecl {
            version,
            encoding,
            standalone,
        },
    ))
}

// [66] CharRef ::= '&#' [0-9]+ ';' | '&#x' [0-9a-fA-F]+ ';'
// [68] EntityRef ::= '&' Name ';'
/// Returns what stands between `&` and `;`.
pub(crate) fn reference(input: &str) -> IResult<&str, &str> {
    delimited(
        char('&'),
        alt((
            recognize(pair(char('#'), alt((preceded(char('x'), hex_digit1), digit1)))),
            name,
        )),
        char(';'),
    )(input)
}

// [69] PEReference ::= '%' Name ';'
pub(crate) fn pe_reference(input: &str) -> IResult<&str, &str> {
    delimited(char('%'), name, char(';'))(input)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MarkupKind {
    StartTag,
    EndTag,
    Comment,
    Pi,
    CdataStart,
    Doctype,
    Unknown,
}

/// What the markup at the start of `input` opens, `None` while too little is
/// buffered to tell.
pub(crate) fn markup_kind(input: &str) -> Option<MarkupKind> {
    const DECLARATIONS: [(&str, MarkupKind); 3] = [
        ("<!--", MarkupKind::Comment),
        ("<![CDATA[", MarkupKind::CdataStart),
        ("<!DOCTYPE", MarkupKind::Doctype),
    ];
    let mut chars = input.chars();
    match (chars.next(), chars.next()) {
        (Some('<'), None) => None,
        (Some('<'), Some('/')) => Some(MarkupKind::EndTag),
        (Some('<'), Some('?')) => Some(MarkupKind::Pi),
        (Some('<'), Some('!')) => {
            let mut pending = false;
            for (open, kind) in DECLARATIONS {
                if input.starts_with(open) {
                    return Some(kind);
                }
                pending |= open.starts_with(input);
            }
            if pending {
                None
            } else {
                Some(MarkupKind::Unknown)
            }
        }
        (Some('<'), Some(_)) => Some(MarkupKind::StartTag),
        _ => Some(MarkupKind::Unknown),
    }
}

/// `\r\n` and lone `\r` become `\n`.
pub(crate) fn normalize_newlines(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_owned()
    }
}

/// True when `input` is a non-empty proper prefix of `pattern`.
fn is_partial(input: &str, pattern: &str) -> bool {
    !input.is_empty() && input.len() < pattern.len() && pattern.starts_with(input)
}

// [14] CharData ::= [^<&]* - ([^<&]* ']]>' [^<&]*)
/// Character data up to the next markup. With `complete == false` a tail
/// that could still turn into `]]>` or `\r\n` is left for the next chunk.
pub(crate) fn char_data(input: &str, complete: bool) -> IResult<&str, &str> {
    if input.is_empty() {
        return Err(Err::Incomplete(Needed::new(1)));
    }
    let mut end = input.len();
    for (i, c) in input.char_indices() {
        match c {
            '<' | '&' => {
                end = i;
                break;
            }
            ']' if input[i..].starts_with("]]>") => {
                end = i;
                break;
            }
            ']' if !complete && is_partial(&input[i..], "]]>") => {
                end = i;
                break;
            }
            '\r' if !complete && i + 1 == input.len() => {
                end = i;
                break;
            }
            c if !is_xml_char(c) => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    if end == 0 {
        let pending = !complete && (is_partial(input, "]]>") || input == "\r");
        return if pending {
            Err(Err::Incomplete(Needed::Unknown))
        } else {
            fail(input, ErrorKind::Char)
        };
    }
    Ok((&input[end..], &input[..end]))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum InsideCdata<'a> {
    Characters(&'a str),
    CdataEnd,
}

// [20] CData ::= (Char* - (Char* ']]>' Char*))
// [21] CDEnd ::= ']]>'
pub(crate) fn inside_cdata(input: &str, complete: bool) -> IResult<&str, InsideCdata> {
    if let Some(rest) = input.strip_prefix("]]>") {
        return Ok((rest, InsideCdata::CdataEnd));
    }
    let mut end = input.len();
    for (i, c) in input.char_indices() {
        if c == ']' && (input[i..].starts_with("]]>") || is_partial(&input[i..], "]]>")) {
            end = i;
            break;
        }
        if c == '\r' && i + 1 == input.len() && !complete {
            end = i;
            break;
        }
        if !is_xml_char(c) {
            if i == 0 {
                return fail(input, ErrorKind::Char);
            }
            end = i;
            break;
        }
    }
    if end == 0 {
        return Err(Err::Incomplete(Needed::Unknown));
    }
    Ok((&input[end..], InsideCdata::Characters(&input[..end])))
}

#[test]
fn test_name() {
    assert_eq!(name("a.abc-ab1çroot>"), Ok((">", "a.abc-ab1çroot")));
    assert_eq!(name("abc"), Err(Err::Incomplete(Needed::new(1))));
    assert!(matches!(name("&x"), Err(Err::Error(_))));
    assert!(matches!(name("1x"), Err(Err::Error(_))));
}

#[test]
fn test_start_tag() {
    assert_eq!(
        start_tag(r#"<A a="b"  c = 'd'>rest"#),
        Ok((
            "rest",
            StartTag {
                name: "A",
                attributes: vec![("a", "b"), ("c", "d")],
                is_empty: false
            }
        ))
    );
    assert_eq!(
        start_tag("<r foo='bar'/>"),
        Ok((
            "",
            StartTag {
                name: "r",
                attributes: vec![("foo", "bar")],
                is_empty: true
            }
        ))
    );
    assert!(matches!(start_tag("<r foo='bar'"), Err(Err::Incomplete(_))));
    assert!(matches!(start_tag("<r foo='b"), Err(Err::Incomplete(_))));
    assert!(matches!(start_tag("<r /"), Err(Err::Incomplete(_))));
    assert!(matches!(start_tag("<r a='1'b='2'>"), Err(Err::Error(_))));
    assert!(matches!(start_tag("<r a='<'>"), Err(Err::Error(_))));
    assert!(matches!(start_tag("<&"), Err(Err::Error(_))));
}

#[test]
fn test_end_tag() {
    assert_eq!(end_tag("</A >x"), Ok(("x", "A")));
    assert!(matches!(end_tag("</A"), Err(Err::Incomplete(_))));
}

#[test]
fn test_comment() {
    assert_eq!(comment("<!-- comment -->a"), Ok(("a", " comment ")));
    assert_eq!(comment("<!---->cc"), Ok(("cc", "")));
    assert!(matches!(comment("<!-- comment --->a"), Err(Err::Error(_))));
    assert!(matches!(comment("<!-- com--ment -->a"), Err(Err::Error(_))));
    assert!(matches!(comment("<!--ok-"), Err(Err::Incomplete(_))));
    assert!(matches!(comment("<!--ok--"), Err(Err::Incomplete(_))));
}

#[test]
fn test_pi() {
    assert_eq!(
        pi("<?i like xml?>"),
        Ok((
            "",
            Pi {
                target: "i",
                data: "like xml"
            }
        ))
    );
    assert_eq!(
        pi("<?dragons?>a"),
        Ok((
            "a",
            Pi {
                target: "dragons",
                data: ""
            }
        ))
    );
    assert!(matches!(pi("<?t data?"), Err(Err::Incomplete(_))));
    assert!(matches!(pi("<??>"), Err(Err::Error(_))));
}

#[test]
fn test_xml_decl() {
    assert_eq!(
        xml_decl(r#"<?xml version="1.0"  encoding="UTF-8" standalone='yes'?>"#),
        Ok((
            "",
            XmlDecl {
                version: "1.0",
                encoding: Some("UTF-8"),
                standalone: Some(true)
            }
        ))
    );
    assert_eq!(
        xml_decl("<?xml version='1.0'?>"),
        Ok((
            "",
            XmlDecl {
                version: "1.0",
                encoding: None,
                standalone: None
            }
        ))
    );
    assert!(matches!(
        xml_decl("<?xml encoding='UTF-8'?>"),
        Err(Err::Error(_))
    ));
}

#[test]
fn test_reference() {
    assert_eq!(reference("&amp;x"), Ok(("x", "amp")));
    assert_eq!(reference("&#x41;"), Ok(("", "#x41")));
    assert_eq!(reference("&#65;"), Ok(("", "#65")));
    assert!(matches!(reference("&am"), Err(Err::Incomplete(_))));
    assert!(matches!(reference("&#;"), Err(Err::Error(_))));
    assert!(matches!(reference("& x;"), Err(Err::Error(_))));
}

#[test]
fn test_markup_kind() {
    assert_eq!(markup_kind("<"), None);
    assert_eq!(markup_kind("<!-"), None);
    assert_eq!(markup_kind("<![CDA"), None);
    assert_eq!(markup_kind("<!--x"), Some(MarkupKind::Comment));
    assert_eq!(markup_kind("<!DOCTYPE r>"), Some(MarkupKind::Doctype));
    assert_eq!(markup_kind("<!FOO"), Some(MarkupKind::Unknown));
    assert_eq!(markup_kind("</r>"), Some(MarkupKind::EndTag));
    assert_eq!(markup_kind("<&"), Some(MarkupKind::StartTag));
}

#[test]
fn test_normalize_newlines() {
    assert_eq!(normalize_newlines("a\r\nb\rc\n"), "a\nb\nc\n");
}

#[test]
fn test_char_data() {
    assert_eq!(char_data("abc]", false), Ok(("]", "abc")));
    assert_eq!(char_data("abc]", true), Ok(("", "abc]")));
    assert!(matches!(char_data("]]", false), Err(Err::Incomplete(_))));
    assert!(matches!(char_data("]]>", false), Err(Err::Error(_))));
    assert_eq!(char_data("]]<", false), Ok(("<", "]]")));
    assert_eq!(char_data("a&", false), Ok(("&", "a")));
    assert_eq!(char_data("a<", false), Ok(("<", "a")));
    assert_eq!(char_data("abc", false), Ok(("", "abc")));
    assert_eq!(char_data("a\r", false), Ok(("\r", "a")));
    assert!(matches!(char_data("\r", false), Err(Err::Incomplete(_))));
    assert_eq!(char_data("a\r", true), Ok(("", "a\r")));
    assert!(matches!(char_data("\u{0}", false), Err(Err::Error(_))));
}

#[test]
fn test_inside_cdata() {
    assert_eq!(
        inside_cdata("<a>]]>x", false),
        Ok(("]]>x", InsideCdata::Characters("<a>")))
    );
    assert_eq!(inside_cdata("]]>x", false), Ok(("x", InsideCdata::CdataEnd)));
    assert_eq!(
        inside_cdata("ab]", false),
        Ok(("]", InsideCdata::Characters("ab")))
    );
    assert!(matches!(inside_cdata("]", false), Err(Err::Incomplete(_))));
    assert_eq!(
        inside_cdata("]x", false),
        Ok(("", InsideCdata::Characters("]x")))
    );
}
