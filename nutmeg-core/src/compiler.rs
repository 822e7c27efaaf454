//! Compiler orchestration: source units in, bundle out.
//!
//! Every top-level codelet of every unit goes through the same stages:
//! parse, resolve, optimize, allocate slots, bundle. One label counter is
//! shared by all units so labels stay unique across the whole bundle.

use tracing::{debug, info};

use crate::ast::Codelet;
use crate::bundle::Bundle;
use crate::codegen_slots::allocate_slots;
use crate::error::Mishap;
use crate::extensions::read_source;
use crate::name_resolve::{LabelCounter, resolve};
use crate::optimizer::optimize;
use crate::parser::Parser;

#[derive(Debug, Default)]
pub struct Compiler {
    labels: LabelCounter,
    bundle: Bundle,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues compiling into an existing bundle. New labels start after
    /// the highest label already stored.
    pub fn with_bundle(bundle: Bundle) -> Result<Self, Mishap> {
        Ok(Compiler {
            labels: LabelCounter::starting_after(bundle.max_label()?),
            bundle,
        })
    }

    /// Compiles one unit of Nutmeg source text, returning how many
    /// bindings it added.
    pub fn compile_source(&mut self, unit: &str, text: &str) -> Result<usize, Mishap> {
        self.bundle.add_source(unit, text);
        self.compile_trees(unit, Parser::new(text).with_unit(unit))
            .map_err(|m| m.culprit("unit", unit))
    }

    /// Compiles a file with the reader its file name selects.
    pub fn compile_file(&mut self, path: &str, text: &str) -> Result<usize, Mishap> {
        self.bundle.add_source(path, text);
        read_source(path, path, text)
            .and_then(|trees| self.compile_trees(path, trees.into_iter().map(Ok)))
            .map_err(|m| m.culprit("unit", path))
    }

    fn compile_trees(
        &mut self,
        unit: &str,
        trees: impl IntoIterator<Item = Result<Codelet, Mishap>>,
    ) -> Result<usize, Mishap> {
        let mut count = 0;
        for codelet in trees {
            let mut tree = codelet?;
            resolve(&mut tree, &mut self.labels)?;
            let mut tree = optimize(tree);
            allocate_slots(&mut tree)?;
            self.bundle.add_binding(&tree)?;
            count += 1;
        }
        debug!(unit, bindings = count, "compiled unit");
        Ok(count)
    }

    pub fn add_entry_point(&mut self, name: impl Into<String>) {
        self.bundle.add_entry_point(name);
    }

    /// Traces entry-point dependencies and hands back the bundle.
    pub fn finish(mut self) -> Result<Bundle, Mishap> {
        self.bundle.trace()?;
        info!(
            bindings = self.bundle.binding_names().count(),
            entry_points = self.bundle.entry_points().count(),
            "bundle complete"
        );
        Ok(self.bundle)
    }
}

/// Compiles a set of `(unit, source)` pairs into a fresh bundle.
pub fn compile_sources<'a>(
    sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    entry_points: impl IntoIterator<Item = &'a str>,
) -> Result<Bundle, Mishap> {
    let mut compiler = Compiler::new();
    for (unit, text) in sources {
        compiler.compile_source(unit, text)?;
    }
    for name in entry_points {
        compiler.add_entry_point(name);
    }
    compiler.finish()
}
