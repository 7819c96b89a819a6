//! Document type declaration grammar.
//!
//! The internal subset is read one declaration at a time so that entity and
//! attribute-list declarations take effect for the rest of the document.
//! Element and notation declarations are checked for well-formedness only.

use nom::{
    branch::alt,
    bytes::streaming::{tag, take_while1},
    character::streaming::{char, multispace0, multispace1},
    combinator::{map, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{pair, preceded, terminated, tuple},
    Err, IResult,
};

use crate::sax::internal::{
    att_value, comment, is_namechar, name, pe_reference, pi, quoted, Pi,
};

fn fail<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(Err::Error(Error::new(input, kind)))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ExternalId<'a> {
    pub public_id: Option<&'a str>,
    pub system_id: &'a str,
}

// [13] PubidChar ::= #x20 | #xD | #xA | [a-zA-Z0-9] | [-'()+,./:=?;!*#@$_%]
fn is_pubid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || " \r\n-'()+,./:=?;!*#@$_%".contains(c)
}

// [11] SystemLiteral ::= ('"' [^"]* '"') | ("'" [^']* "'")
fn system_literal(input: &str) -> IResult<&str, &str> {
    quoted(input)
}

// [12] PubidLiteral ::= '"' PubidChar* '"' | "'" (PubidChar - "'")* "'"
fn pubid_literal(input: &str) -> IResult<&str, &str> {
    let (rest, literal) = quoted(input)?;
    if !literal.chars().all(is_pubid_char) {
        return fail(input, ErrorKind::Char);
    }
    Ok((rest, literal))
}

// [75] ExternalID ::= 'SYSTEM' S SystemLiteral | 'PUBLIC' S PubidLiteral S SystemLiteral
pub(crate) fn external_id(input: &str) -> IResult<&str, ExternalId> {
    alt((
        map(
            preceded(pair(tag("SYSTEM"), multispace1), system_literal),
            |system_id| ExternalId {
                public_id: None,
                system_id,
            },
        ),
        map(
            tuple((
                tag("PUBLIC"),
                multispace1,
                pubid_literal,
                multispace1,
                system_literal,
            )),
            |(_, _, public_id, _, system_id)| ExternalId {
                public_id: Some(public_id),
                system_id,
            },
        ),
    ))(input)
}

// [83] PublicID ::= 'PUBLIC' S PubidLiteral
fn public_id(input: &str) -> IResult<&str, &str> {
    preceded(pair(tag("PUBLIC"), multispace1), pubid_literal)(input)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct DoctypeStart<'a> {
    pub name: &'a str,
    pub external_id: Option<ExternalId<'a>>,
    pub has_subset: bool,
}

// [28] doctypedecl ::= '<!DOCTYPE' S Name (S ExternalID)? S? ('[' intSubset ']' S?)? '>'
/// Everything up to the opening `[` of the internal subset, or the whole
/// declaration when there is none.
pub(crate) fn doctype_start(input: &str) -> IResult<&str, DoctypeStart> {
    let (i, (_, _, name, external_id, _)) = tuple((
        tag("<!DOCTYPE"),
        multispace1,
        name,
        opt(preceded(multispace1, external_id)),
        multispace0,
    ))(input)?;
    let (rest, open) = alt((char('['), char('>')))(i)?;
    Ok((
        rest,
        DoctypeStart {
            name,
            external_id,
            has_subset: open == '[',
        },
    ))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum EntityDef<'a> {
    /// Literal value, references not yet resolved.
    Internal(&'a str),
    External {
        id: ExternalId<'a>,
        notation: Option<&'a str>,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct EntityDecl<'a> {
    pub name: &'a str,
    pub is_parameter_entity: bool,
    pub def: EntityDef<'a>,
}

// [9] EntityValue ::= '"' ([^%&"] | PEReference | Reference)* '"'
// |  "'" ([^%&'] | PEReference | Reference)* "'"
fn entity_value(input: &str) -> IResult<&str, &str> {
    let (rest, literal) = quoted(input)?;
    if !literal.chars().all(crate::sax::entities::is_xml_char) {
        return fail(input, ErrorKind::Char);
    }
    Ok((rest, literal))
}

// [76] NDataDecl ::= S 'NDATA' S Name
fn ndata_decl(input: &str) -> IResult<&str, &str> {
    preceded(tuple((multispace1, tag("NDATA"), multispace1)), name)(input)
}

// [70] EntityDecl ::= GEDecl | PEDecl
// [71] GEDecl ::= '<!ENTITY' S Name S EntityDef S? '>'
// [72] PEDecl ::= '<!ENTITY' S '%' S Name S PEDef S? '>'
fn entity_decl(input: &str) -> IResult<&str, EntityDecl> {
    let (i, _) = pair(tag("<!ENTITY"), multispace1)(input)?;
    let (i, percent) = opt(terminated(char('%'), multispace1))(i)?;
    let (i, name) = terminated(name, multispace1)(i)?;
    let (i, def) = alt((
        map(entity_value, EntityDef::Internal),
        map(pair(external_id, opt(ndata_decl)), |(id, notation)| {
            EntityDef::External { id, notation }
        }),
    ))(i)?;
    let (rest, _) = pair(multispace0, char('>'))(i)?;
    Ok((
        rest,
        EntityDecl {
            name,
            is_parameter_entity: percent.is_some(),
            def,
        },
    ))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct AttDef<'a> {
    pub name: &'a str,
    /// Anything but `CDATA`; such values get their spaces collapsed.
    pub is_tokenized: bool,
    /// Raw default value, if the declaration gives one.
    pub default: Option<&'a str>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct AttlistDecl<'a> {
    pub element: &'a str,
    pub attributes: Vec<AttDef<'a>>,
}

// [7] Nmtoken ::= (NameChar)+
fn nmtoken(input: &str) -> IResult<&str, &str> {
    take_while1(is_namechar)(input)
}

// [59] Enumeration ::= '(' S? Nmtoken (S? '|' S? Nmtoken)* S? ')'
fn enumeration(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('('),
        multispace0,
        nmtoken,
        many0(tuple((multispace0, char('|'), multispace0, nmtoken))),
        multispace0,
        char(')'),
    )))(input)
}

// [58] NotationType ::= 'NOTATION' S '(' S? Name (S? '|' S? Name)* S? ')'
fn notation_type(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        tag("NOTATION"),
        multispace1,
        char('('),
        multispace0,
        name,
        many0(tuple((multispace0, char('|'), multispace0, name))),
        multispace0,
        char(')'),
    )))(input)
}

// [54] AttType ::= StringType | TokenizedType | EnumeratedType
// [56] TokenizedType ::= 'ID' | 'IDREF' | 'IDREFS' | 'ENTITY' | 'ENTITIES' | 'NMTOKEN' | 'NMTOKENS'
fn att_type(input: &str) -> IResult<&str, bool> {
    alt((
        value(false, tag("CDATA")),
        value(
            true,
            alt((
                tag("IDREFS"),
                tag("IDREF"),
                tag("ID"),
                tag("ENTITIES"),
                tag("ENTITY"),
                tag("NMTOKENS"),
                tag("NMTOKEN"),
            )),
        ),
        value(true, notation_type),
        value(true, enumeration),
    ))(input)
}

// [60] DefaultDecl ::= '#REQUIRED' | '#IMPLIED' | (('#FIXED' S)? AttValue)
fn default_decl(input: &str) -> IResult<&str, Option<&str>> {
    alt((
        value(None, tag("#REQUIRED")),
        value(None, tag("#IMPLIED")),
        map(
            preceded(opt(pair(tag("#FIXED"), multispace1)), att_value),
            Some,
        ),
    ))(input)
}

// [53] AttDef ::= S Name S AttType S DefaultDecl
fn att_def(input: &str) -> IResult<&str, AttDef> {
    let (rest, (name, _, is_tokenized, _, default)) =
        tuple((name, multispace1, att_type, multispace1, default_decl))(input)?;
    Ok((
        rest,
        AttDef {
            name,
            is_tokenized,
            default,
        },
    ))
}

// [52] AttlistDecl ::= '<!ATTLIST' S Name AttDef* S? '>'
fn attlist_decl(input: &str) -> IResult<&str, AttlistDecl> {
    let (mut i, element) = preceded(pair(tag("<!ATTLIST"), multispace1), name)(input)?;
    let mut attributes = Vec::new();
    loop {
        let (after_space, space) = multispace0(i)?;
        if let Some(rest) = after_space.strip_prefix('>') {
            return Ok((
                rest,
                AttlistDecl {
                    element,
                    attributes,
                },
            ));
        }
        if space.is_empty() {
            return fail(after_space, ErrorKind::Space);
        }
        let (rest, def) = att_def(after_space)?;
        attributes.push(def);
        i = rest;
    }
}

fn repetition(input: &str) -> IResult<&str, Option<char>> {
    opt(alt((char('?'), char('*'), char('+'))))(input)
}

// [51] Mixed ::= '(' S? '#PCDATA' (S? '|' S? Name)* S? ')*' | '(' S? '#PCDATA' S? ')'
fn mixed(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(tuple((
            char('('),
            multispace0,
            tag("#PCDATA"),
            many0(tuple((multispace0, char('|'), multispace0, name))),
            multispace0,
            tag(")*"),
        ))),
        recognize(tuple((
            char('('),
            multispace0,
            tag("#PCDATA"),
            multispace0,
            char(')'),
        ))),
    ))(input)
}

// [48] cp ::= (Name | choice | seq) ('?' | '*' | '+')?
fn cp(input: &str) -> IResult<&str, &str> {
    recognize(pair(alt((name, choice, seq)), repetition))(input)
}

// [49] choice ::= '(' S? cp ( S? '|' S? cp )+ S? ')'
fn choice(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('('),
        multispace0,
        cp,
        tuple((multispace0, char('|'), multispace0, cp)),
        many0(tuple((multispace0, char('|'), multispace0, cp))),
        multispace0,
        char(')'),
    )))(input)
}

// [50] seq ::= '(' S? cp ( S? ',' S? cp )* S? ')'
fn seq(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('('),
        multispace0,
        cp,
        many0(tuple((multispace0, char(','), multispace0, cp))),
        multispace0,
        char(')'),
    )))(input)
}

// [46] contentspec ::= 'EMPTY' | 'ANY' | Mixed | children
// [47] children ::= (choice | seq) ('?' | '*' | '+')?
fn contentspec(input: &str) -> IResult<&str, &str> {
    alt((
        tag("EMPTY"),
        tag("ANY"),
        mixed,
        recognize(pair(alt((choice, seq)), repetition)),
    ))(input)
}

// [45] elementdecl ::= '<!ELEMENT' S Name S contentspec S? '>'
fn element_decl(input: &str) -> IResult<&str, &str> {
    let (rest, (_, _, name, _, _, _, _)) = tuple((
        tag("<!ELEMENT"),
        multispace1,
        name,
        multispace1,
        contentspec,
        multispace0,
        char('>'),
    ))(input)?;
    Ok((rest, name))
}

// [82] NotationDecl ::= '<!NOTATION' S Name S (ExternalID | PublicID) S? '>'
fn notation_decl(input: &str) -> IResult<&str, &str> {
    let (rest, (_, _, name, _, _, _, _)) = tuple((
        tag("<!NOTATION"),
        multispace1,
        name,
        multispace1,
        alt((recognize(external_id), public_id)),
        multispace0,
        char('>'),
    ))(input)?;
    Ok((rest, name))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum SubsetItem<'a> {
    Entity(EntityDecl<'a>),
    Attlist(AttlistDecl<'a>),
    Element(&'a str),
    Notation(&'a str),
    Pi(Pi<'a>),
    Comment(&'a str),
    PeReference(&'a str),
    /// `]` S? `>`
    End,
}

// [28b] intSubset ::= (markupdecl | DeclSep)*
// [29] markupdecl ::= elementdecl | AttlistDecl | EntityDecl | NotationDecl | PI | Comment
/// One item of the internal subset; whitespace between items is the
/// caller's to skip.
pub(crate) fn subset_item(input: &str) -> IResult<&str, SubsetItem> {
    alt((
        map(entity_decl, SubsetItem::Entity),
        map(attlist_decl, SubsetItem::Attlist),
        map(element_decl, SubsetItem::Element),
        map(notation_decl, SubsetItem::Notation),
        map(comment, SubsetItem::Comment),
        map(pi, SubsetItem::Pi),
        map(pe_reference, SubsetItem::PeReference),
        value(
            SubsetItem::End,
            tuple((char(']'), multispace0, char('>'))),
        ),
    ))(input)
}

#[test]
fn test_doctype_start() {
    assert!(matches!(doctype_start("<!DOCTYPE>a"), Err(Err::Error(_))));

    assert_eq!(
        doctype_start(r#"<!DOCTYPE greeting SYSTEM "hello.dtd">a"#),
        Ok((
            "a",
            DoctypeStart {
                name: "greeting",
                external_id: Some(ExternalId {
                    public_id: None,
                    system_id: "hello.dtd"
                }),
                has_subset: false
            }
        ))
    );

    assert_eq!(
        doctype_start("<!DOCTYPE myhtml  [  <!-- -->  ] >dummy"),
        Ok((
            "  <!-- -->  ] >dummy",
            DoctypeStart {
                name: "myhtml",
                external_id: None,
                has_subset: true
            }
        ))
    );

    assert!(matches!(
        doctype_start("<!DOCTYPE html PUBLIC '-//W3C//DTD"),
        Err(Err::Incomplete(_))
    ));
}

#[test]
fn test_entity_decl() {
    assert_eq!(
        subset_item(r#"<!ENTITY l1 "&l0;&l0;">"#),
        Ok((
            "",
            SubsetItem::Entity(EntityDecl {
                name: "l1",
                is_parameter_entity: false,
                def: EntityDef::Internal("&l0;&l0;")
            })
        ))
    );
    assert_eq!(
        subset_item(r#"<!ENTITY % p SYSTEM "p.ent" >"#),
        Ok((
            "",
            SubsetItem::Entity(EntityDecl {
                name: "p",
                is_parameter_entity: true,
                def: EntityDef::External {
                    id: ExternalId {
                        public_id: None,
                        system_id: "p.ent"
                    },
                    notation: None
                }
            })
        ))
    );
    assert_eq!(
        subset_item(r#"<!ENTITY img PUBLIC "-//A//B" "a.gif" NDATA gif>"#),
        Ok((
            "",
            SubsetItem::Entity(EntityDecl {
                name: "img",
                is_parameter_entity: false,
                def: EntityDef::External {
                    id: ExternalId {
                        public_id: Some("-//A//B"),
                        system_id: "a.gif"
                    },
                    notation: Some("gif")
                }
            })
        ))
    );
    assert!(matches!(
        subset_item(r#"<!ENTITY e "abc"#),
        Err(Err::Incomplete(_))
    ));
}

#[test]
fn test_attlist_decl() {
    assert_eq!(
        subset_item(r#"<!ATTLIST a id ID #REQUIRED kind (x|y) "x" note CDATA #FIXED ' n '>"#),
        Ok((
            "",
            SubsetItem::Attlist(AttlistDecl {
                element: "a",
                attributes: vec![
                    AttDef {
                        name: "id",
                        is_tokenized: true,
                        default: None
                    },
                    AttDef {
                        name: "kind",
                        is_tokenized: true,
                        default: Some("x")
                    },
                    AttDef {
                        name: "note",
                        is_tokenized: false,
                        default: Some(" n ")
                    },
                ]
            })
        ))
    );
}

#[test]
fn test_other_declarations() {
    assert_eq!(
        subset_item("<!ELEMENT doc (head, (p | list)*)>"),
        Ok(("", SubsetItem::Element("doc")))
    );
    assert_eq!(
        subset_item("<!ELEMENT p (#PCDATA|em)*>"),
        Ok(("", SubsetItem::Element("p")))
    );
    assert_eq!(
        subset_item("<!ELEMENT br EMPTY>"),
        Ok(("", SubsetItem::Element("br")))
    );
    assert_eq!(
        subset_item("<!NOTATION gif PUBLIC 'image/gif'>"),
        Ok(("", SubsetItem::Notation("gif")))
    );
    assert_eq!(
        subset_item("%ext;"),
        Ok(("", SubsetItem::PeReference("ext")))
    );
    assert_eq!(subset_item("] >x"), Ok(("x", SubsetItem::End)));
    assert!(matches!(subset_item("<!BOGUS>"), Err(Err::Error(_))));
}
