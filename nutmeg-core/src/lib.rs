//! Front end for the Nutmeg language.
//!
//! The pipeline is roughly:
//!
//!   source text
//!     -> lexer         (tokens)
//!     -> parser        (codelet trees, one per top-level statement)
//!     -> name_resolve  (scopes, labels, captures)
//!     -> optimizer + codegen_slots
//!     -> bundle        (bindings, entry points, dependencies)
//!
//! Trees cross process boundaries in the JSON format of [`interchange`].
//! The CLI should depend on this crate rather than reimplementing the
//! pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing, parsing and the tree model
// ---------------------------------------------------------------------

pub mod lexer;
pub mod stream;
pub mod parser;
pub mod ast;
pub mod interchange;
pub mod extensions;

// ---------------------------------------------------------------------
// Semantic layer: scopes and builtins
// ---------------------------------------------------------------------

pub mod name_resolve;
pub mod builtins;

// ---------------------------------------------------------------------
// Back-end: rewrites, slots, bundling and orchestration
// ---------------------------------------------------------------------

pub mod optimizer;
pub mod codegen_slots;
pub mod bundle;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use ast::Codelet;
pub use bundle::Bundle;
pub use compiler::{Compiler, compile_sources};
pub use error::{Mishap, MishapKind};
pub use name_resolve::{LabelCounter, resolve};
pub use parser::{Parser, parse};
