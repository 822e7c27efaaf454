//! Shape-changing rewrites over resolved trees.
//!
//! Both passes rebuild the tree through [`Codelet::transform`] and never
//! fail.

use std::convert::Infallible;

use tracing::trace;

use crate::ast::Codelet;
use crate::builtins::find_builtin;

/// Runs every pass in order.
pub fn optimize(tree: Codelet) -> Codelet {
    simplify(replace_builtins(tree))
}

fn rebuild(codelet: Codelet, pass: fn(Codelet) -> Codelet) -> Codelet {
    match codelet.transform(|member| Ok::<_, Infallible>(pass(member))) {
        Ok(rebuilt) => rebuilt,
        Err(never) => match never {},
    }
}

/// Calls of a global builtin become system-calls, and any other global
/// reference to a builtin becomes a system-function value.
pub fn replace_builtins(codelet: Codelet) -> Codelet {
    match codelet {
        Codelet::Call {
            function,
            arguments,
        } => match *function {
            Codelet::Id(id) if id.is_global() && find_builtin(&id.name).is_some() => {
                trace!(builtin = %id.name, "call replaced by system-call");
                Codelet::syscall(id.name, replace_builtins(*arguments))
            }
            function => rebuild(Codelet::call(function, *arguments), replace_builtins),
        },
        Codelet::Id(id) if id.is_global() => match find_builtin(&id.name) {
            Some(builtin) => {
                trace!(
                    builtin = builtin.name,
                    kind = ?builtin.kind,
                    "reference replaced by system-function"
                );
                Codelet::Sysfn { name: id.name }
            }
            None => Codelet::Id(id),
        },
        other => rebuild(other, replace_builtins),
    }
}

/// A conditional on a boolean constant is replaced by the branch it would
/// take.
pub fn simplify(codelet: Codelet) -> Codelet {
    match codelet {
        Codelet::If {
            test,
            then,
            otherwise,
        } => match *test {
            Codelet::Bool { value } => simplify(if value { *then } else { *otherwise }),
            test => rebuild(Codelet::conditional(test, *then, *otherwise), simplify),
        },
        other => rebuild(other, simplify),
    }
}
