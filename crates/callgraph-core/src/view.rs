//! View selection: which methods and call edges a build request displays

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{Dependency, FileId, MethodId};
use crate::symbols::SymbolTable;

/// The region of the project an area build covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AreaKind {
    WholeProject,
    /// A crate, by package name.
    Module(String),
    /// A directory relative to the project root.
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AreaScope {
    pub kind: AreaKind,
    pub include_tests: bool,
    /// Only edges with both endpoints inside the area.
    pub limited: bool,
}

impl AreaScope {
    pub fn whole_project() -> Self {
        AreaScope {
            kind: AreaKind::WholeProject,
            include_tests: false,
            limited: false,
        }
    }

    pub fn module(name: impl Into<String>) -> Self {
        AreaScope {
            kind: AreaKind::Module(name.into()),
            ..Self::whole_project()
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        AreaScope {
            kind: AreaKind::Directory(path.into()),
            ..Self::whole_project()
        }
    }

    pub fn with_tests(mut self, include_tests: bool) -> Self {
        self.include_tests = include_tests;
        self
    }

    pub fn limited(mut self, limited: bool) -> Self {
        self.limited = limited;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureDirection {
    Upstream,
    Downstream,
    Both,
}

/// Traversal direction for a single closure walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow edges backwards, toward callers.
    Upstream,
    /// Follow edges forwards, toward callees.
    Downstream,
}

impl Direction {
    /// The endpoint matched against the frontier.
    fn near(self, dependency: &Dependency) -> MethodId {
        match self {
            Direction::Upstream => dependency.callee,
            Direction::Downstream => dependency.caller,
        }
    }

    /// The endpoint that joins the next frontier.
    fn far(self, dependency: &Dependency) -> MethodId {
        match self {
            Direction::Upstream => dependency.caller,
            Direction::Downstream => dependency.callee,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scope {
    Area(AreaScope),
    Closure { direction: ClosureDirection },
}

impl Scope {
    pub fn area(&self) -> Option<&AreaScope> {
        match self {
            Scope::Area(area) => Some(area),
            Scope::Closure { .. } => None,
        }
    }

    pub fn is_closure(&self) -> bool {
        matches!(self, Scope::Closure { .. })
    }
}

/// Methods a scope starts from: every method declared in the area's files, or the seeds.
pub fn methods_in_scope(
    scope: &Scope,
    area_files: &BTreeSet<FileId>,
    symbols: &SymbolTable,
    seeds: &BTreeSet<MethodId>,
) -> BTreeSet<MethodId> {
    match scope {
        Scope::Area(_) => area_files
            .iter()
            .flat_map(|file| symbols.methods_in_file(file))
            .collect(),
        Scope::Closure { .. } => seeds.clone(),
    }
}

/// The dependencies displayed for `methods` under `scope`.
pub fn dependency_view(
    scope: &Scope,
    methods: &BTreeSet<MethodId>,
    dependencies: &HashSet<Dependency>,
) -> HashSet<Dependency> {
    match scope {
        Scope::Area(area) if area.limited => dependencies
            .iter()
            .filter(|d| methods.contains(&d.caller) && methods.contains(&d.callee))
            .copied()
            .collect(),
        Scope::Area(_) => dependencies
            .iter()
            .filter(|d| methods.contains(&d.caller) || methods.contains(&d.callee))
            .copied()
            .collect(),
        Scope::Closure { direction } => match direction {
            ClosureDirection::Upstream => upstream_closure(dependencies, methods),
            ClosureDirection::Downstream => downstream_closure(dependencies, methods),
            ClosureDirection::Both => {
                let mut both = upstream_closure(dependencies, methods);
                both.extend(downstream_closure(dependencies, methods));
                both
            }
        },
    }
}

/// Every dependency reachable from `frontier` by repeatedly following `direction`.
///
/// Each method enters the frontier at most once, so cycles terminate and
/// every dependency appears once.
pub fn nested_closure(
    dependencies: &HashSet<Dependency>,
    frontier: &BTreeSet<MethodId>,
    direction: Direction,
) -> HashSet<Dependency> {
    let mut by_near: HashMap<MethodId, Vec<Dependency>> = HashMap::new();
    for dependency in dependencies {
        by_near.entry(direction.near(dependency)).or_default().push(*dependency);
    }

    let mut result = HashSet::new();
    let mut seen: HashSet<MethodId> = frontier.iter().copied().collect();
    let mut current: Vec<MethodId> = frontier.iter().copied().collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for method in &current {
            let Some(direct) = by_near.get(method) else {
                continue;
            };
            for dependency in direct {
                result.insert(*dependency);
                let far = direction.far(dependency);
                if seen.insert(far) {
                    next.push(far);
                }
            }
        }
        current = next;
    }

    result
}

/// All transitive callers of `seeds`, as edges.
pub fn upstream_closure(dependencies: &HashSet<Dependency>, seeds: &BTreeSet<MethodId>) -> HashSet<Dependency> {
    nested_closure(dependencies, seeds, Direction::Upstream)
}

/// All transitive callees of `seeds`, as edges.
pub fn downstream_closure(dependencies: &HashSet<Dependency>, seeds: &BTreeSet<MethodId>) -> HashSet<Dependency> {
    nested_closure(dependencies, seeds, Direction::Downstream)
}
