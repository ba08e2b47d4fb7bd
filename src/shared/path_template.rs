/**
 * Path Templates
 *
 * Operation paths and the templates used to classify them. A template
 * segment is a literal key, a literal index, `*` (any single segment) or
 * `-1` (any array index). Matching is a pure first-match walk over the
 * templates in the order given; callers that want "most specific wins"
 * order their templates before calling.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::error::SharedError;

/// One step of an operation path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    Index(usize),
    Key(String),
}

impl PathKey {
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathKey::Index(i) => Some(*i),
            PathKey::Key(_) => None,
        }
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathKey::Key(k) => Some(k),
            PathKey::Index(_) => None,
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Index(i) => write!(f, "{}", i),
            PathKey::Key(k) => f.write_str(k),
        }
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_string())
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

/// Operation path
pub type Path = Vec<PathKey>;

/// Build a path from mixed keys and indices
#[macro_export]
macro_rules! path {
    () => { Vec::<$crate::shared::path_template::PathKey>::new() };
    ($($seg:expr),+ $(,)?) => {
        vec![$($crate::shared::path_template::PathKey::from($seg)),+]
    };
}

/// One template segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    Key(String),
    Index(usize),
    /// `*`
    Wildcard,
    /// `-1`
    AnyIndex,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSegment {
    Int(i64),
    Str(String),
}

impl TryFrom<RawSegment> for TemplateSegment {
    type Error = SharedError;

    fn try_from(raw: RawSegment) -> Result<Self, Self::Error> {
        match raw {
            RawSegment::Str(s) if s == "*" => Ok(TemplateSegment::Wildcard),
            RawSegment::Str(s) => Ok(TemplateSegment::Key(s)),
            RawSegment::Int(-1) => Ok(TemplateSegment::AnyIndex),
            RawSegment::Int(i) if i >= 0 => Ok(TemplateSegment::Index(i as usize)),
            RawSegment::Int(i) => Err(SharedError::validation("template", format!("invalid segment {}", i))),
        }
    }
}

impl From<TemplateSegment> for RawSegment {
    fn from(seg: TemplateSegment) -> Self {
        match seg {
            TemplateSegment::Key(k) => RawSegment::Str(k),
            TemplateSegment::Index(i) => RawSegment::Int(i as i64),
            TemplateSegment::Wildcard => RawSegment::Str("*".to_string()),
            TemplateSegment::AnyIndex => RawSegment::Int(-1),
        }
    }
}

impl Serialize for TemplateSegment {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawSegment::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TemplateSegment {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawSegment::deserialize(deserializer)?;
        TemplateSegment::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl TemplateSegment {
    fn matches(&self, key: &PathKey) -> bool {
        match (self, key) {
            (TemplateSegment::Wildcard, _) => true,
            (TemplateSegment::AnyIndex, PathKey::Index(_)) => true,
            (TemplateSegment::Key(k), PathKey::Key(p)) => k == p,
            (TemplateSegment::Index(i), PathKey::Index(p)) => i == p,
            _ => false,
        }
    }
}

/// Path pattern plus inheritance flag
///
/// `inherit = true` matches the template itself and anything beneath it;
/// `inherit = false` matches only paths of exactly the template's length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTemplate {
    pub template: Vec<TemplateSegment>,
    #[serde(default = "default_inherit")]
    pub inherit: bool,
}

fn default_inherit() -> bool {
    true
}

impl PathTemplate {
    pub fn new(template: Vec<TemplateSegment>, inherit: bool) -> Self {
        Self { template, inherit }
    }

    /// Convenience constructor from `serde_json` segments such as `json!(["answers", -1])`
    pub fn from_json(segments: serde_json::Value, inherit: bool) -> Result<Self, SharedError> {
        let template: Vec<TemplateSegment> = serde_json::from_value(segments)?;
        Ok(Self { template, inherit })
    }

    pub fn len(&self) -> usize {
        self.template.len()
    }

    pub fn is_empty(&self) -> bool {
        self.template.is_empty()
    }

    /// Structural compatibility of one template with one path
    pub fn matches(&self, path: &[PathKey]) -> bool {
        let length_ok = if self.inherit {
            path.len() >= self.template.len()
        } else {
            path.len() == self.template.len()
        };
        length_ok
            && self
                .template
                .iter()
                .zip(path.iter())
                .all(|(segment, key)| segment.matches(key))
    }
}

/// Index of the first template compatible with `path`, in the given order
pub fn match_template(templates: &[PathTemplate], path: &[PathKey]) -> Option<usize> {
    templates.iter().position(|template| template.matches(path))
}
