use regex::Regex;

/// A parsed pattern.
///
/// The mode is decided once by [`Pattern::parse`] or [`Pattern::parse_line`]
/// so that matching never has to look at delimiters again.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// `/expr/` with a valid expression, matched anywhere in the value
    Regex(Regex),
    /// `/expr/` whose expression failed to compile; matches nothing
    Invalid(String),
    /// `a|b|c`, matches when any piece is a substring
    Alternation(Vec<String>),
    /// Plain substring
    Literal(String),
}

impl Pattern {
    /// Parse a context filter pattern (literal or `/regex/`).
    pub fn parse(raw: &str) -> Self {
        match regex_body(raw) {
            Some(body) => compile(body),
            None => Pattern::Literal(raw.to_string()),
        }
    }

    /// Parse an output line pattern (`/regex/`, `a|b` alternation, or literal).
    pub fn parse_line(raw: &str) -> Self {
        if let Some(body) = regex_body(raw) {
            return compile(body);
        }

        if raw.contains('|') {
            return Pattern::Alternation(raw.split('|').map(str::to_string).collect());
        }

        Pattern::Literal(raw.to_string())
    }

    /// Check whether `value` matches this pattern.
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Pattern::Regex(re) => re.is_match(value),
            Pattern::Invalid(_) => false,
            Pattern::Alternation(pieces) => pieces.iter().any(|p| value.contains(p.as_str())),
            Pattern::Literal(needle) => value.contains(needle.as_str()),
        }
    }
}

/// Interior of a `/…/` pattern, if `raw` is one.
fn regex_body(raw: &str) -> Option<&str> {
    if raw.len() > 2 && raw.starts_with('/') && raw.ends_with('/') {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

fn compile(body: &str) -> Pattern {
    match Regex::new(body) {
        Ok(re) => Pattern::Regex(re),
        Err(e) => {
            tracing::debug!("ignoring invalid regex /{body}/: {e}");
            Pattern::Invalid(body.to_string())
        }
    }
}

/// Literal or `/regex/` match used by the context filters.
pub fn matches(value: &str, pattern: &str) -> bool {
    Pattern::parse(pattern).is_match(value)
}

/// Line filter match used for `--grep`. An empty pattern matches every line.
pub fn line_matches(line: &str, pattern: &str) -> bool {
    Pattern::parse_line(pattern).is_match(line)
}
