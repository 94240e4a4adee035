//! Symbol table for cross-file call resolution

use crate::model::{FileId, MethodId, MethodInfo};
use dashmap::DashMap;

/// Declared methods indexed by id, short name and file. Thread-safe for concurrent access.
pub struct SymbolTable {
    methods: DashMap<MethodId, MethodInfo>,
    /// Short name -> methods with that name, across all files
    names: DashMap<String, Vec<MethodId>>,
    /// File -> methods declared in it, in declaration order
    file_methods: DashMap<FileId, Vec<MethodId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            methods: DashMap::new(),
            names: DashMap::new(),
            file_methods: DashMap::new(),
        }
    }

    /// Insert a declaration. Re-inserting an id replaces its metadata.
    pub fn insert(&self, info: MethodInfo) {
        let id = info.id;
        if self.methods.insert(id, info.clone()).is_some() {
            return;
        }
        self.names.entry(info.name).or_default().push(id);
        self.file_methods.entry(info.file).or_default().push(id);
    }

    pub fn lookup(&self, id: MethodId) -> Option<MethodInfo> {
        self.methods.get(&id).map(|r| r.value().clone())
    }

    /// The file that declares `id`.
    pub fn file_of(&self, id: MethodId) -> Option<FileId> {
        self.methods.get(&id).map(|r| r.value().file.clone())
    }

    /// All methods with the given short name, in insertion order.
    pub fn by_name(&self, name: &str) -> Vec<MethodId> {
        self.names.get(name).map(|r| r.value().clone()).unwrap_or_default()
    }

    /// Get all methods declared in a file.
    pub fn methods_in_file(&self, file: &FileId) -> Vec<MethodId> {
        self.file_methods
            .get(file)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Exact match on the qualified name, or on `Owner::name`.
    pub fn find_by_qualified_name(&self, qualified_name: &str) -> Vec<MethodId> {
        let name = qualified_name.rsplit("::").next().unwrap_or(qualified_name);
        let mut found: Vec<MethodId> = self
            .by_name(name)
            .into_iter()
            .filter(|id| {
                self.methods.get(id).is_some_and(|info| {
                    info.qualified_name == qualified_name || info.signature() == qualified_name
                })
            })
            .collect();
        found.sort();
        found
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable").field("methods", &self.methods.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_file() {
        let table = SymbolTable::new();
        let file = FileId::new("src/lib.rs");
        let run = MethodInfo::new(file.clone(), "Engine::run", "run").with_owner("Engine");
        let helper = MethodInfo::new(file.clone(), "helper", "helper");
        table.insert(run.clone());
        table.insert(helper.clone());

        assert_eq!(table.by_name("run"), vec![run.id]);
        assert_eq!(table.methods_in_file(&file), vec![run.id, helper.id]);
        assert_eq!(table.file_of(helper.id), Some(file));
        assert_eq!(table.find_by_qualified_name("Engine::run"), vec![run.id]);
        assert!(table.find_by_qualified_name("Other::run").is_empty());
    }
}
