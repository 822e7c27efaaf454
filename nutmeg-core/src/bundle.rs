//! The bundle: compiled top-level bindings ready for linking.
//!
//! Bindings are stored by global name with their values in the tree
//! interchange format. Entry points name the bindings a program may start
//! from; tracing records, for each entry point, every global it needs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::Codelet;
use crate::builtins::is_builtin;
use crate::error::Mishap;
use crate::interchange;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    bindings: BTreeMap<String, String>,
    entry_points: BTreeSet<String>,
    depends_on: BTreeMap<String, BTreeSet<String>>,
    source_files: BTreeMap<String, String>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, Mishap> {
        interchange::read_unbounded(text)
            .map_err(|e| Mishap::interchange("Cannot read bundle").culprit("reason", e))
    }

    pub fn to_json_pretty(&self) -> Result<String, Mishap> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Mishap::interchange("Cannot write bundle").culprit("reason", e))
    }

    pub fn add_source(&mut self, file: impl Into<String>, contents: impl Into<String>) {
        self.source_files.insert(file.into(), contents.into());
    }

    /// Stores a top-level binding of a resolved global, replacing any
    /// earlier binding of the same name. Bindings annotated `@command`
    /// become entry points.
    pub fn add_binding(&mut self, tree: &Codelet) -> Result<(), Mishap> {
        let Codelet::Binding {
            lhs,
            rhs,
            annotations,
        } = tree
        else {
            return Err(Mishap::link("Only bindings can be bundled").culprit("kind", tree.kind()));
        };
        let Some(id) = lhs.as_id() else {
            return Err(Mishap::link("Only bindings of identifiers can be bundled")
                .culprit("kind", lhs.kind()));
        };
        if !id.is_global() {
            return Err(
                Mishap::link("Only global bindings can be bundled").culprit("name", &id.name)
            );
        }
        let value = interchange::to_json(rhs)?;
        debug!(name = %id.name, command = annotations.command, "bundled binding");
        self.bindings.insert(id.name.clone(), value);
        if annotations.command {
            self.entry_points.insert(id.name.clone());
        }
        Ok(())
    }

    pub fn add_entry_point(&mut self, name: impl Into<String>) {
        self.entry_points.insert(name.into());
    }

    /// The stored value of a binding.
    pub fn binding(&self, name: &str) -> Result<Option<Codelet>, Mishap> {
        self.bindings
            .get(name)
            .map(|text| interchange::from_json(text).map_err(|m| m.culprit("binding", name)))
            .transpose()
    }

    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.entry_points.iter().map(String::as_str)
    }

    pub fn source_files(&self) -> impl Iterator<Item = &str> {
        self.source_files.keys().map(String::as_str)
    }

    /// The highest local label used by any stored binding, or 0.
    pub fn max_label(&self) -> Result<u64, Mishap> {
        let mut max = 0;
        for name in self.bindings.keys() {
            if let Some(value) = self.binding(name)? {
                value.walk(&mut |codelet| {
                    if let Some(label) = codelet.as_id().and_then(|id| id.label) {
                        max = max.max(label);
                    }
                });
            }
        }
        Ok(max)
    }

    /// Dependencies recorded for an entry point by the last [`Bundle::trace`].
    pub fn dependencies(&self, entry_point: &str) -> Option<&BTreeSet<String>> {
        self.depends_on.get(entry_point)
    }

    /// Every global reachable from `name`, including `name` itself.
    pub fn deep_dependencies(&self, name: &str) -> Result<BTreeSet<String>, Mishap> {
        let mut open = vec![name.to_string()];
        let mut closed = BTreeSet::new();
        while let Some(global) = open.pop() {
            if closed.contains(&global) {
                continue;
            }
            let Some(value) = self.binding(&global)? else {
                return Err(Mishap::link("Global variable is referenced but not defined")
                    .culprit("name", &global)
                    .culprit("needed by", name));
            };
            open.extend(
                shallow_dependencies(&value)
                    .into_iter()
                    .filter(|d| !closed.contains(d)),
            );
            closed.insert(global);
        }
        Ok(closed)
    }

    /// Recomputes the dependencies of every entry point.
    pub fn trace(&mut self) -> Result<(), Mishap> {
        let mut depends_on = BTreeMap::new();
        for entry_point in &self.entry_points {
            let needs = self.deep_dependencies(entry_point)?;
            debug!(entry_point = %entry_point, count = needs.len(), "traced dependencies");
            depends_on.insert(entry_point.clone(), needs);
        }
        self.depends_on = depends_on;
        Ok(())
    }
}

/// Names of the non-builtin globals a tree refers to directly.
pub fn shallow_dependencies(tree: &Codelet) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    tree.walk(&mut |codelet| {
        if let Some(id) = codelet.as_id() {
            if id.is_global() && !is_builtin(&id.name) {
                found.insert(id.name.clone());
            }
        }
    });
    found
}
