//! Scope resolution.
//!
//! Annotates every identifier of a code-tree in place with its scope class
//! and, for locals, a unique label and mutability flags. Lambdas that read
//! locals from an enclosing lambda record them as captures.
//!
//! The scope chain is a stack of lexical scopes over an implicit global
//! scope at the bottom: a name not found in any lexical scope is global.
//! Conditional branches, lambdas and for-loops each push a fresh lexical
//! scope; a lambda's scope is marked as a boundary.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::ast::{Capture, Codelet, IdCodelet, LambdaCodelet, RefType, ScopeClass};
use crate::builtins::is_builtin;
use crate::error::Mishap;

/// Source of local-binding labels.
///
/// Labels are unique for the lifetime of a counter, so a single counter
/// must be shared by every unit of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCounter {
    next: u64,
}

impl LabelCounter {
    pub fn new() -> Self {
        LabelCounter { next: 1 }
    }

    /// A counter whose first label is `last + 1`.
    pub fn starting_after(last: u64) -> Self {
        LabelCounter { next: last + 1 }
    }

    /// Hands out the next label.
    pub fn mint(&mut self) -> u64 {
        let label = self.next;
        self.next += 1;
        label
    }

    /// Number of labels handed out so far.
    pub fn minted(&self) -> u64 {
        self.next - 1
    }
}

impl Default for LabelCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocalInfo {
    label: u64,
    nonassignable: bool,
    immutable: bool,
}

impl LocalInfo {
    fn declared(mode: RefType, label: u64) -> Self {
        LocalInfo {
            label,
            nonassignable: !matches!(mode, RefType::Var),
            immutable: matches!(mode, RefType::Const),
        }
    }
}

#[derive(Debug, Default)]
struct LexicalScope {
    locals: HashMap<String, LocalInfo>,
    lambda_boundary: bool,
    captures: Vec<Capture>,
}

impl LexicalScope {
    fn block() -> Self {
        Self::default()
    }

    fn lambda() -> Self {
        LexicalScope {
            lambda_boundary: true,
            ..Self::default()
        }
    }

    fn capture(&mut self, name: &str, label: u64) {
        if !self.captures.iter().any(|c| c.label == label) {
            self.captures.push(Capture {
                name: name.to_string(),
                label,
            });
        }
    }
}

/// Where a name was found.
#[derive(Debug, Clone, Copy)]
enum Scope {
    Global,
    Lexical { depth: usize, info: LocalInfo },
}

struct Resolver<'a> {
    labels: &'a mut LabelCounter,
    scopes: Vec<LexicalScope>,
}

/// Resolves `tree` in place, drawing labels from `labels`.
///
/// A tree can be resolved only once: meeting an identifier that already
/// carries a scope is an error.
pub fn resolve(tree: &mut Codelet, labels: &mut LabelCounter) -> Result<(), Mishap> {
    let before = labels.minted();
    let mut resolver = Resolver {
        labels,
        scopes: Vec::new(),
    };
    resolver.resolve(tree)?;
    debug!(
        kind = tree.kind(),
        labels = resolver.labels.minted() - before,
        "resolved tree"
    );
    Ok(())
}

/// Owning form of [`resolve`].
pub fn resolve_tree(mut tree: Codelet, labels: &mut LabelCounter) -> Result<Codelet, Mishap> {
    resolve(&mut tree, labels)?;
    Ok(tree)
}

impl Resolver<'_> {
    fn resolve(&mut self, codelet: &mut Codelet) -> Result<(), Mishap> {
        match codelet {
            Codelet::Id(id) => self.resolve_id(id),
            Codelet::Binding { lhs, rhs, .. } => {
                let target = lhs
                    .as_id()
                    .map_or_else(|| lhs.kind().to_string(), |id| id.name.clone());
                self.resolve(lhs).map_err(|m| m.culprit("binding", target))?;
                self.resolve(rhs)
            }
            Codelet::If {
                test,
                then,
                otherwise,
            } => {
                self.resolve(test)?;
                self.within(LexicalScope::block(), |r| r.resolve(then))?;
                self.within(LexicalScope::block(), |r| r.resolve(otherwise))?;
                Ok(())
            }
            Codelet::Lambda(lambda) => self.resolve_lambda(lambda),
            Codelet::For { query, body } => {
                self.within(LexicalScope::block(), |r| {
                    r.resolve(query)?;
                    r.resolve(body)
                })?;
                Ok(())
            }
            other => {
                for member in other.members_mut() {
                    self.resolve(member)?;
                }
                Ok(())
            }
        }
    }

    fn resolve_lambda(&mut self, lambda: &mut LambdaCodelet) -> Result<(), Mishap> {
        let scope = self.within(LexicalScope::lambda(), |r| {
            r.resolve(&mut lambda.parameters)?;
            r.resolve(&mut lambda.body)
        })?;
        for capture in &scope.captures {
            lambda.add_capture(&capture.name, capture.label);
        }
        Ok(())
    }

    /// Runs `read` with `scope` pushed, returning the scope afterwards.
    fn within(
        &mut self,
        scope: LexicalScope,
        read: impl FnOnce(&mut Self) -> Result<(), Mishap>,
    ) -> Result<LexicalScope, Mishap> {
        self.scopes.push(scope);
        let result = read(self);
        let scope = self.scopes.pop().unwrap_or_default();
        result.map(|()| scope)
    }

    fn resolve_id(&mut self, id: &mut IdCodelet) -> Result<(), Mishap> {
        if id.is_resolved() {
            return Err(Mishap::scope("Identifier already resolved")
                .culprit("name", &id.name)
                .culprit("reftype", id.reftype.as_str()));
        }
        if id.reftype.is_declaration() {
            self.declare(id)
        } else {
            self.refer(id)
        }
    }

    fn lookup(&self, name: &str) -> Scope {
        self.scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, scope)| {
                scope
                    .locals
                    .get(name)
                    .map(|info| Scope::Lexical { depth, info: *info })
            })
            .unwrap_or(Scope::Global)
    }

    fn refer(&mut self, id: &mut IdCodelet) -> Result<(), Mishap> {
        match self.lookup(&id.name) {
            Scope::Global => {
                id.scope = Some(ScopeClass::Global);
                id.nonassignable = Some(true);
            }
            Scope::Lexical { depth, info } => {
                let crosses_boundary = self.scopes[depth + 1..].iter().any(|s| s.lambda_boundary);
                if crosses_boundary {
                    if !info.nonassignable {
                        return Err(Mishap::scope(
                            "Cannot capture mutable variable across lambda boundary",
                        )
                        .culprit("name", &id.name));
                    }
                    for scope in self.scopes[depth + 1..].iter_mut().filter(|s| s.lambda_boundary) {
                        trace!(
                            name = %id.name,
                            label = info.label,
                            "captured across lambda boundary"
                        );
                        scope.capture(&id.name, info.label);
                    }
                }
                id.scope = Some(ScopeClass::Local);
                id.label = Some(info.label);
                id.nonassignable = Some(info.nonassignable);
                id.immutable = Some(info.immutable);
            }
        }
        if id.reftype == RefType::Set && id.nonassignable == Some(true) {
            return Err(Mishap::scope("Assignment to protected variable").culprit("name", &id.name));
        }
        Ok(())
    }

    fn declare(&mut self, id: &mut IdCodelet) -> Result<(), Mishap> {
        if is_builtin(&id.name) {
            return Err(Mishap::scope("Cannot shadow a builtin").culprit("name", &id.name));
        }
        let Some(scope) = self.scopes.last_mut() else {
            trace!(name = %id.name, "declared global");
            id.scope = Some(ScopeClass::Global);
            id.nonassignable = Some(true);
            return Ok(());
        };
        if scope.locals.contains_key(&id.name) {
            return Err(
                Mishap::scope("Trying to re-declare the same variable").culprit("name", &id.name)
            );
        }
        let info = LocalInfo::declared(id.reftype, self.labels.mint());
        trace!(
            name = %id.name,
            label = info.label,
            reftype = id.reftype.as_str(),
            "declared local"
        );
        scope.locals.insert(id.name.clone(), info);
        id.scope = Some(ScopeClass::Local);
        id.label = Some(info.label);
        id.nonassignable = Some(info.nonassignable);
        id.immutable = Some(info.immutable);
        Ok(())
    }
}
