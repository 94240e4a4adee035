//! Core data structures for the call graph

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Unique, stable identifier for a callable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct MethodId(pub u64);

impl MethodId {
    pub fn new(file: &FileId, qualified_name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        file.hash(&mut hasher);
        qualified_name.hash(&mut hasher);
        MethodId(hasher.finish())
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Directed edge identifier: `(source, target)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId {
    pub source: MethodId,
    pub target: MethodId,
}

impl EdgeId {
    pub fn new(source: MethodId, target: MethodId) -> Self {
        EdgeId { source, target }
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

/// A source file, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(PathBuf);

impl FileId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileId(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// True if this file lives under `dir` (component-wise prefix).
    pub fn is_under(&self, dir: &Path) -> bool {
        dir.as_os_str().is_empty() || self.0.starts_with(dir)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// File change stamp. Compared for equality only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Stamp {
    pub modified_ns: u64,
    pub len: u64,
}

/// A file paired with its stamp at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub file: FileId,
    pub stamp: Stamp,
}

/// A caller → callee relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub caller: MethodId,
    pub callee: MethodId,
}

impl Dependency {
    pub fn new(caller: MethodId, callee: MethodId) -> Self {
        Dependency { caller, callee }
    }

    pub fn edge_id(&self) -> EdgeId {
        EdgeId::new(self.caller, self.callee)
    }
}

/// Files that owned the two endpoints of a dependency when it was extracted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyOrigin {
    pub caller_file: FileId,
    pub callee_file: FileId,
}

impl DependencyOrigin {
    pub fn touches(&self, file: &FileId) -> bool {
        &self.caller_file == file || &self.callee_file == file
    }
}

/// Declared visibility of a callable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Visibility {
    Public,
    /// `pub(crate)`, `pub(super)`, `pub(in ...)`
    Restricted,
    #[default]
    Private,
}

/// Display metadata for a method, produced by an extractor's declaration pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub id: MethodId,
    pub name: String,
    pub qualified_name: String,
    /// Enclosing `impl` or `trait` type, if any.
    pub owner: Option<String>,
    pub file: FileId,
    pub line: Option<u32>,
    pub visibility: Visibility,
}

impl MethodInfo {
    pub fn new(file: FileId, qualified_name: impl Into<String>, name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        MethodInfo {
            id: MethodId::new(&file, &qualified_name),
            name: name.into(),
            qualified_name,
            owner: None,
            file,
            line: None,
            visibility: Visibility::Private,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// `name(...)` style label, with the owner type when there is one.
    pub fn signature(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self.name.clone(),
        }
    }
}

/// A 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}
