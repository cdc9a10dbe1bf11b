//! Addressing of positions inside an execution result.
//!
//! A [`ResultPath`] is an immutable chain of segments. Each segment is either a
//! field response key or a list index. Paths share their parents, so extending a
//! path is cheap and never copies the chain.

use std::fmt;
use std::hash::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::OnceLock;

use displaydoc::Display;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeSeq;
use thiserror::Error;

/// One step of a [`ResultPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A list index.
    Index(usize),
    /// A field response key.
    Key(String),
}

impl PathSegment {
    fn is_key(&self) -> bool {
        matches!(self, PathSegment::Key(_))
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<&apollo_compiler::Name> for PathSegment {
    fn from(key: &apollo_compiler::Name) -> Self {
        PathSegment::Key(key.as_str().to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "/{key}"),
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// The reason a path string could not be parsed.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum InvalidResultPath {
    /// invalid path `{path}`: expected a field name after '/'
    MissingSegment { path: String },
    /// invalid path `{path}`: unterminated list index
    UnterminatedIndex { path: String },
    /// invalid path `{path}`: `{index}` is not a list index
    InvalidIndex { path: String, index: String },
    /// invalid path `{path}`: unexpected `{token}`
    UnexpectedToken { path: String, token: String },
}

/// A position in the result tree such as `/users[2]/name`.
///
/// The root path has no segments. Equality and hashing are structural, and the hash
/// of a path is computed at most once.
#[derive(Clone, Default)]
pub struct ResultPath {
    node: Option<Arc<PathNode>>,
}

struct PathNode {
    parent: ResultPath,
    segment: PathSegment,
    level: usize,
    hash: OnceLock<u64>,
}

impl ResultPath {
    /// The root path.
    pub fn root() -> Self {
        Self { node: None }
    }

    pub fn is_root(&self) -> bool {
        self.node.is_none()
    }

    /// Extends this path with a field name or a list index.
    pub fn segment(&self, segment: impl Into<PathSegment>) -> Self {
        let segment = segment.into();
        let level = self.level() + usize::from(segment.is_key());
        Self {
            node: Some(Arc::new(PathNode {
                parent: self.clone(),
                segment,
                level,
                hash: OnceLock::new(),
            })),
        }
    }

    /// The number of field name segments in this path. List indices do not count.
    pub fn level(&self) -> usize {
        self.node.as_ref().map_or(0, |node| node.level)
    }

    /// The last segment, or `None` for the root path.
    pub fn last_segment(&self) -> Option<&PathSegment> {
        self.node.as_ref().map(|node| &node.segment)
    }

    /// The field name of the last segment, if it is one.
    pub fn segment_name(&self) -> Option<&str> {
        match self.last_segment()? {
            PathSegment::Key(key) => Some(key),
            PathSegment::Index(_) => None,
        }
    }

    /// The list index of the last segment, if it is one.
    pub fn segment_index(&self) -> Option<usize> {
        match self.last_segment()? {
            PathSegment::Index(index) => Some(*index),
            PathSegment::Key(_) => None,
        }
    }

    pub fn is_list_segment(&self) -> bool {
        self.segment_index().is_some()
    }

    pub fn is_named_segment(&self) -> bool {
        self.segment_name().is_some()
    }

    /// The parent path, or `None` for the root path.
    pub fn drop_segment(&self) -> Option<ResultPath> {
        self.node.as_ref().map(|node| node.parent.clone())
    }

    /// A path with the same parent and a different last segment.
    ///
    /// Returns `None` for the root path, which has no segment to replace.
    pub fn replace_segment(&self, segment: impl Into<PathSegment>) -> Option<ResultPath> {
        self.drop_segment().map(|parent| parent.segment(segment))
    }

    /// The path of a sibling field, sharing this path's parent.
    pub fn sibling(&self, name: &str) -> Option<ResultPath> {
        self.replace_segment(name)
    }

    /// This path with a trailing list index removed.
    pub fn path_without_list_end(&self) -> ResultPath {
        if self.is_list_segment() {
            self.drop_segment().unwrap_or_default()
        } else {
            self.clone()
        }
    }

    /// Concatenates `other` at the end of this path.
    pub fn append(&self, other: &ResultPath) -> ResultPath {
        other
            .to_list()
            .into_iter()
            .fold(self.clone(), |path, segment| path.segment(segment))
    }

    /// The segments of this path, from the root down.
    pub fn to_list(&self) -> Vec<PathSegment> {
        let mut segments = Vec::with_capacity(self.len());
        let mut current = self;
        while let Some(node) = &current.node {
            segments.push(node.segment.clone());
            current = &node.parent;
        }
        segments.reverse();
        segments
    }

    pub fn from_list(segments: impl IntoIterator<Item = PathSegment>) -> ResultPath {
        segments
            .into_iter()
            .fold(ResultPath::root(), |path, segment| path.segment(segment))
    }

    /// The field names of this path, skipping list indices.
    pub fn keys_only(&self) -> Vec<String> {
        self.to_list()
            .into_iter()
            .filter_map(|segment| match segment {
                PathSegment::Key(key) => Some(key),
                PathSegment::Index(_) => None,
            })
            .collect()
    }

    /// The number of segments in this path.
    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut current = self;
        while let Some(node) = &current.node {
            len += 1;
            current = &node.parent;
        }
        len
    }

    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// Parses the `/a/b[2]/c` syntax produced by [`Display`](fmt::Display).
    pub fn parse(path: &str) -> Result<ResultPath, InvalidResultPath> {
        let original = path;
        let mut tokens = tokenize(path.trim()).into_iter();
        let mut result = ResultPath::root();
        while let Some(token) = tokens.next() {
            match token {
                "/" => match tokens.next() {
                    Some(name) if !is_delimiter(name) => result = result.segment(name),
                    _ => {
                        return Err(InvalidResultPath::MissingSegment {
                            path: original.to_string(),
                        });
                    }
                },
                "[" => {
                    let (Some(index), Some("]")) = (tokens.next(), tokens.next()) else {
                        return Err(InvalidResultPath::UnterminatedIndex {
                            path: original.to_string(),
                        });
                    };
                    let index = index
                        .parse::<usize>()
                        .map_err(|_| InvalidResultPath::InvalidIndex {
                            path: original.to_string(),
                            index: index.to_string(),
                        })?;
                    result = result.segment(index);
                }
                token => {
                    return Err(InvalidResultPath::UnexpectedToken {
                        path: original.to_string(),
                        token: token.to_string(),
                    });
                }
            }
        }
        Ok(result)
    }

    fn memoized_hash(&self) -> u64 {
        match &self.node {
            None => 0,
            Some(node) => *node.hash.get_or_init(|| {
                let mut hasher = DefaultHasher::new();
                node.parent.memoized_hash().hash(&mut hasher);
                node.segment.hash(&mut hasher);
                hasher.finish()
            }),
        }
    }
}

fn is_delimiter(token: &str) -> bool {
    matches!(token, "/" | "[" | "]")
}

/// Splits on `/`, `[` and `]`, keeping the delimiters as tokens.
fn tokenize(path: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    for (i, c) in path.char_indices() {
        if matches!(c, '/' | '[' | ']') {
            if start < i {
                tokens.push(&path[start..i]);
            }
            tokens.push(&path[i..i + 1]);
            start = i + 1;
        }
    }
    if start < path.len() {
        tokens.push(&path[start..]);
    }
    tokens
}

impl PartialEq for ResultPath {
    fn eq(&self, other: &Self) -> bool {
        let (mut left, mut right) = (self, other);
        loop {
            match (&left.node, &right.node) {
                (None, None) => return true,
                (Some(l), Some(r)) => {
                    if Arc::ptr_eq(l, r) {
                        return true;
                    }
                    if l.level != r.level || l.segment != r.segment {
                        return false;
                    }
                    left = &l.parent;
                    right = &r.parent;
                }
                _ => return false,
            }
        }
    }
}

impl Eq for ResultPath {}

impl Hash for ResultPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.memoized_hash());
    }
}

impl fmt::Display for ResultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in self.to_list() {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ResultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultPath({self})")
    }
}

impl FromStr for ResultPath {
    type Err = InvalidResultPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResultPath::parse(s)
    }
}

impl FromIterator<PathSegment> for ResultPath {
    fn from_iter<T: IntoIterator<Item = PathSegment>>(iter: T) -> Self {
        ResultPath::from_list(iter)
    }
}

impl Serialize for ResultPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let segments = self.to_list();
        let mut seq = serializer.serialize_seq(Some(segments.len()))?;
        for segment in &segments {
            seq.serialize_element(segment)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ResultPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<PathSegment>::deserialize(deserializer).map(ResultPath::from_list)
    }
}
