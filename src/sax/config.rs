/// Settings fixed for the lifetime of a parser.
///
/// ```
/// use xml_push::sax::ParserConfig;
///
/// let config = ParserConfig::default()
///     .encoding(Some("ISO-8859-1".to_owned()))
///     .max_entity_depth(8);
/// assert_eq!(config.max_entity_depth, 8);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ParserConfig {
    /// Encoding the caller knows the bytes are in. Overrides the XML declaration.
    pub encoding: Option<String>,
    /// How deep entity references may nest.
    pub max_entity_depth: usize,
    /// Total replacement text one document may expand to.
    pub max_expanded_bytes: u64,
    /// Expanded bytes after which `max_amplification` is enforced.
    pub amplification_threshold: u64,
    /// Upper bound of (direct + expanded) / direct input bytes.
    pub max_amplification: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            encoding: None,
            max_entity_depth: 32,
            max_expanded_bytes: 64 * 1024 * 1024,
            amplification_threshold: 8 * 1024 * 1024,
            max_amplification: 100.0,
        }
    }
}

impl ParserConfig {
    pub fn encoding(mut self, encoding: Option<String>) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn max_entity_depth(mut self, depth: usize) -> Self {
        self.max_entity_depth = depth;
        self
    }

    pub fn max_expanded_bytes(mut self, bytes: u64) -> Self {
        self.max_expanded_bytes = bytes;
        self
    }

    pub fn amplification_threshold(mut self, bytes: u64) -> Self {
        self.amplification_threshold = bytes;
        self
    }

    pub fn max_amplification(mut self, factor: f64) -> Self {
        self.max_amplification = factor;
        self
    }
}
