//! Reserved system names.
//!
//! These names are provided by the runtime. User code may refer to them
//! but may not declare a variable with the same name. The optimizer turns
//! calls to them into system-calls.

/// How a builtin is normally written in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// Called by name, e.g. `println(x)`.
    Function,
    /// Written as an infix operator token, e.g. `x + y`.
    Operator,
}

/// Metadata about a single builtin symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    pub name: &'static str,
    pub kind: BuiltinKind,
}

const fn function(name: &'static str) -> BuiltinDescriptor {
    BuiltinDescriptor {
        name,
        kind: BuiltinKind::Function,
    }
}

const fn operator(name: &'static str) -> BuiltinDescriptor {
    BuiltinDescriptor {
        name,
        kind: BuiltinKind::Operator,
    }
}

/// The complete list of reserved builtins.
pub const BUILTINS: &[BuiltinDescriptor] = &[
    function("println"),
    function("showMe"),
    function("sum"),
    function("assert"),
    function("[x..<y]"),
    function("[x...y]"),
    operator("..<"),
    operator("..."),
    operator("+"),
    operator("-"),
    operator("*"),
    operator("<="),
    operator("<"),
    operator(">="),
    operator(">"),
    operator("=="),
    operator("!="),
];

/// Look up a builtin by name.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDescriptor> {
    BUILTINS.iter().find(|b| b.name == name)
}

pub fn is_builtin(name: &str) -> bool {
    find_builtin(name).is_some()
}
