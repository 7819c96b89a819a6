//! Declared entities and the budget that keeps their expansion bounded.

use std::collections::HashMap;

use crate::sax::{
    config::ParserConfig,
    error::{Error, SaxResult},
    internal::reference,
};

/// One `<!ENTITY>` declaration as recorded by the parser.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityDeclaration {
    pub name: String,
    pub is_parameter_entity: bool,
    /// Replacement text; `None` for externally defined entities.
    pub value: Option<String>,
    pub base: Option<String>,
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    pub notation_name: Option<String>,
}

impl EntityDeclaration {
    pub fn is_external(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_unparsed(&self) -> bool {
        self.notation_name.is_some()
    }
}

/// The five entities every document knows without declaring them.
pub(crate) fn predefined(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => None,
    }
}

// [2] Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
#[inline]
pub(crate) fn is_xml_char(chr: char) -> bool {
    chr == '\u{9}'
        || chr == '\u{A}'
        || chr == '\u{D}'
        || ('\u{20}'..='\u{D7FF}').contains(&chr)
        || ('\u{E000}'..='\u{FFFD}').contains(&chr)
        || ('\u{10000}'..='\u{10FFFF}').contains(&chr)
}

/// Resolves the body of a character reference (`#65`, `#x41`).
pub(crate) fn char_reference(body: &str) -> SaxResult<char> {
    let digits = body.strip_prefix('#').ok_or(Error::InvalidToken)?;
    let code = match digits.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse::<u32>(),
    }
    .map_err(|_| Error::BadCharRef)?;
    match char::from_u32(code) {
        Some(c) if is_xml_char(c) => Ok(c),
        _ => Err(Error::BadCharRef),
    }
}

/// Replacement text of an internal entity from its quoted literal.
///
/// Character references are resolved here, general entity references stay
/// as written and are expanded where the entity is used. Parameter entity
/// references are not allowed in the internal subset.
pub(crate) fn replacement_text(literal: &str) -> SaxResult<String> {
    let mut out = String::with_capacity(literal.len());
    let mut rest = literal;
    while let Some(c) = rest.chars().next() {
        match c {
            '%' => return Err(Error::ParamEntityRef),
            '&' => {
                let (after, body) = reference(rest).map_err(|_| Error::InvalidToken)?;
                if body.starts_with('#') {
                    out.push(char_reference(body)?);
                } else {
                    out.push_str(&rest[..rest.len() - after.len()]);
                }
                rest = after;
            }
            '\r' => {
                out.push('\n');
                rest = &rest[1..];
                rest = rest.strip_prefix('\n').unwrap_or(rest);
            }
            c => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Default)]
pub(crate) struct EntityTable {
    general: HashMap<String, EntityDeclaration>,
    parameter: HashMap<String, EntityDeclaration>,
}

impl EntityTable {
    /// Records `decl` unless the name is taken; the first binding wins.
    pub(crate) fn declare(&mut self, decl: EntityDeclaration) -> bool {
        let table = if decl.is_parameter_entity {
            &mut self.parameter
        } else {
            &mut self.general
        };
        if table.contains_key(&decl.name) {
            return false;
        }
        table.insert(decl.name.clone(), decl);
        true
    }

    pub(crate) fn general(&self, name: &str) -> Option<&EntityDeclaration> {
        self.general.get(name)
    }

    pub(crate) fn parameter(&self, name: &str) -> Option<&EntityDeclaration> {
        self.parameter.get(name)
    }

    pub(crate) fn clear(&mut self) {
        self.general.clear();
        self.parameter.clear();
    }
}

/// Counts replacement text produced per document against the configured
/// limits.
#[derive(Debug, Default)]
pub(crate) struct ExpansionBudget {
    expanded: u64,
}

impl ExpansionBudget {
    /// Charges `len` bytes of replacement text, `depth` being the nesting
    /// level the text will be expanded at, `direct` the bytes read from the
    /// document so far.
    pub(crate) fn charge(
        &mut self,
        config: &ParserConfig,
        len: usize,
        depth: usize,
        direct: u64,
    ) -> SaxResult<()> {
        if depth > config.max_entity_depth {
            return Err(Error::AmplificationLimitBreach);
        }
        self.expanded += len as u64;
        if self.expanded > config.max_expanded_bytes {
            return Err(Error::AmplificationLimitBreach);
        }
        if self.expanded > config.amplification_threshold {
            let direct = direct.max(1) as f64;
            let factor = (direct + self.expanded as f64) / direct;
            if factor > config.max_amplification {
                return Err(Error::AmplificationLimitBreach);
            }
        }
        Ok(())
    }

    pub(crate) fn expanded(&self) -> u64 {
        self.expanded
    }

    pub(crate) fn clear(&mut self) {
        self.expanded = 0;
    }
}

#[test]
fn test_first_declaration_wins() {
    let mut table = EntityTable::default();
    let first = EntityDeclaration {
        name: "e".to_owned(),
        value: Some("one".to_owned()),
        ..Default::default()
    };
    let second = EntityDeclaration {
        name: "e".to_owned(),
        value: Some("two".to_owned()),
        ..Default::default()
    };
    assert!(table.declare(first));
    assert!(!table.declare(second));
    assert_eq!(table.general("e").and_then(|d| d.value.as_deref()), Some("one"));
    assert!(table.parameter("e").is_none());
}

#[test]
fn test_char_reference() {
    assert_eq!(char_reference("#65"), Ok('A'));
    assert_eq!(char_reference("#x20AC"), Ok('€'));
    assert_eq!(char_reference("#0"), Err(Error::BadCharRef));
    assert_eq!(char_reference("#xD800"), Err(Error::BadCharRef));
    assert_eq!(char_reference("#99999999999"), Err(Error::BadCharRef));
}

#[test]
fn test_replacement_text() {
    assert_eq!(replacement_text("&l0;&l0;"), Ok("&l0;&l0;".to_owned()));
    assert_eq!(replacement_text("a&#x41;&#66;\r\nc"), Ok("aAB\nc".to_owned()));
    assert_eq!(replacement_text("%pe;"), Err(Error::ParamEntityRef));
    assert_eq!(replacement_text("a & b"), Err(Error::InvalidToken));
    assert_eq!(replacement_text("&#1;"), Err(Error::BadCharRef));
}

#[test]
fn test_budget_limits() {
    let config = ParserConfig::default()
        .max_expanded_bytes(10)
        .max_entity_depth(2);
    let mut budget = ExpansionBudget::default();
    assert!(budget.charge(&config, 6, 1, 100).is_ok());
    assert_eq!(
        budget.charge(&config, 6, 1, 100),
        Err(Error::AmplificationLimitBreach)
    );
    let mut budget = ExpansionBudget::default();
    assert_eq!(
        budget.charge(&config, 1, 3, 100),
        Err(Error::AmplificationLimitBreach)
    );

    let config = ParserConfig::default()
        .amplification_threshold(4)
        .max_amplification(2.0);
    let mut budget = ExpansionBudget::default();
    assert!(budget.charge(&config, 8, 1, 10).is_ok());
    assert!(budget.charge(&config, 8, 1, 10).is_err());
}
