use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One step of a [`FieldPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Field(String),
    Index(usize),
    Key(String),
    /// Matches any index or key. Only meaningful in policy patterns.
    Wildcard,
}

/// Location of a field inside a building model, e.g. `zones[0].hvac_system`
/// or `constructions["Office/Wall"].layers[1]`.
///
/// Field names are the serialized (snake_case) names of the model, so a path
/// can be followed both on the typed model and on its JSON form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<Segment>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid field path {path:?}: {reason}")]
pub struct PathParseError {
    pub path: String,
    pub reason: String,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn field(&self, name: &str) -> Self {
        self.with(Segment::Field(name.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.with(Segment::Index(index))
    }

    pub fn key(&self, key: impl fmt::Display) -> Self {
        self.with(Segment::Key(key.to_string()))
    }

    /// Wildcard step, for policy patterns.
    pub fn any(&self) -> Self {
        self.with(Segment::Wildcard)
    }

    fn with(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn parent(&self) -> Option<FieldPath> {
        let (_, rest) = self.segments.split_last()?;
        Some(FieldPath {
            segments: rest.to_vec(),
        })
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// True if `self` equals `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Match a concrete path against a pattern that may contain [`Segment::Wildcard`].
    pub fn matches(&self, pattern: &FieldPath) -> bool {
        self.segments.len() == pattern.segments.len()
            && self
                .segments
                .iter()
                .zip(pattern.segments.iter())
                .all(|(segment, expected)| match (segment, expected) {
                    (Segment::Index(_) | Segment::Key(_), Segment::Wildcard) => true,
                    (a, b) => a == b,
                })
    }

    /// Number of wildcards; used to rank policy patterns by specificity.
    pub fn wildcard_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Wildcard))
            .count()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if i == 0 => write!(f, "{name}")?,
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Key(key) => write!(f, "[{key:?}]")?,
                Segment::Wildcard => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for FieldPath {
    type Error = PathParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for FieldPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason: &str| PathParseError {
            path: s.into(),
            reason: reason.into(),
        };
        let mut segments = Vec::new();
        let mut chars = s.chars().peekable();

        while let Some(&c) = chars.peek() {
            match c {
                '.' if segments.is_empty() => return Err(error("path starts with '.'")),
                '.' | 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => {
                    if c == '.' {
                        chars.next();
                    } else if !segments.is_empty() {
                        return Err(error("field names must be separated by '.'"));
                    }
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        return Err(error("empty field name"));
                    }
                    segments.push(Segment::Field(name));
                }
                '[' => {
                    chars.next();
                    match chars.peek() {
                        Some('"') => {
                            chars.next();
                            let mut key = String::new();
                            loop {
                                match chars.next() {
                                    Some('\\') => match chars.next() {
                                        Some(escaped) => key.push(escaped),
                                        None => return Err(error("unterminated key")),
                                    },
                                    Some('"') => break,
                                    Some(c) => key.push(c),
                                    None => return Err(error("unterminated key")),
                                }
                            }
                            segments.push(Segment::Key(key));
                        }
                        Some('*') => {
                            chars.next();
                            segments.push(Segment::Wildcard);
                        }
                        _ => {
                            let mut digits = String::new();
                            while let Some(&c) = chars.peek() {
                                if c.is_ascii_digit() {
                                    digits.push(c);
                                    chars.next();
                                } else {
                                    break;
                                }
                            }
                            let index = digits
                                .parse()
                                .map_err(|_| error("expected index, quoted key or '*'"))?;
                            segments.push(Segment::Index(index));
                        }
                    }
                    if chars.next() != Some(']') {
                        return Err(error("missing ']'"));
                    }
                }
                _ => return Err(error(&format!("unexpected character {c:?}"))),
            }
        }

        if segments.is_empty() {
            return Err(error("empty path"));
        }
        Ok(FieldPath { segments })
    }
}
