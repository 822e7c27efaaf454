//! Codelets: the nodes of a Nutmeg code-tree.
//!
//! Two mutation disciplines apply. Shape changes go through
//! [`Codelet::transform`], which consumes a node and rebuilds it from
//! rewritten members. Annotation (scope, label, mutability, slots) mutates
//! scalar fields in place through `&mut` and never touches shape. Every
//! node is exclusively owned by its parent, so an annotated node is never
//! visible through a second path.

use serde::{Deserialize, Serialize};

use crate::interchange::{bool_text, int_text};

/// How an identifier occurrence relates to its binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    Get,
    Set,
    Var,
    Val,
    Const,
    /// A parameter binding.
    New,
}

impl RefType {
    pub fn is_declaration(self) -> bool {
        matches!(self, RefType::Var | RefType::Val | RefType::Const | RefType::New)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RefType::Get => "get",
            RefType::Set => "set",
            RefType::Var => "var",
            RefType::Val => "val",
            RefType::Const => "const",
            RefType::New => "new",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeClass {
    Global,
    Local,
}

/// An identifier occurrence. Everything after `reftype` is unset until a
/// later pass fills it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCodelet {
    pub name: String,
    pub reftype: RefType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonassignable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub immutable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
}

impl IdCodelet {
    pub fn new(name: impl Into<String>, reftype: RefType) -> Self {
        IdCodelet {
            name: name.into(),
            reftype,
            scope: None,
            label: None,
            nonassignable: None,
            immutable: None,
            slot: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.scope.is_some()
    }

    pub fn is_global(&self) -> bool {
        self.scope == Some(ScopeClass::Global)
    }

    pub fn is_local(&self) -> bool {
        self.scope == Some(ScopeClass::Local)
    }
}

/// A local binding that a lambda body reads from an enclosing scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    pub name: String,
    pub label: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LambdaCodelet {
    pub parameters: Box<Codelet>,
    pub body: Box<Codelet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nargs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nlocals: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captures: Vec<Capture>,
}

impl LambdaCodelet {
    pub fn new(parameters: Codelet, body: Codelet) -> Self {
        LambdaCodelet {
            parameters: Box::new(parameters),
            body: Box::new(body),
            nargs: None,
            nlocals: None,
            captures: Vec::new(),
        }
    }

    /// Records a capture, once per label.
    pub fn add_capture(&mut self, name: &str, label: u64) {
        if !self.captures.iter().any(|c| c.label == label) {
            self.captures.push(Capture {
                name: name.to_string(),
                label,
            });
        }
    }

    pub fn captures_name(&self, name: &str) -> bool {
        self.captures.iter().any(|c| c.name == name)
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Annotations that may prefix a top-level binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Annotations {
    /// `@unittest`
    #[serde(default, skip_serializing_if = "is_false")]
    pub unittest: bool,
    /// `@command`: the binding is an entry point.
    #[serde(default, skip_serializing_if = "is_false")]
    pub command: bool,
}

impl Annotations {
    /// Sets the named annotation, returning false for an unknown name.
    pub fn set(&mut self, name: &str) -> bool {
        match name {
            "unittest" => self.unittest = true,
            "command" => self.command = true,
            _ => return false,
        }
        true
    }
}

/// A single node of a code-tree. The `kind` tag names the variant in the
/// interchange format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Codelet {
    String {
        value: String,
    },
    Int {
        #[serde(with = "int_text")]
        value: i64,
    },
    Bool {
        #[serde(with = "bool_text")]
        value: bool,
    },
    Id(IdCodelet),
    /// A reference to a builtin as a value.
    Sysfn {
        name: String,
    },
    /// An invocation of a builtin operator or function by name.
    Syscall {
        name: String,
        arguments: Box<Codelet>,
    },
    Call {
        function: Box<Codelet>,
        arguments: Box<Codelet>,
    },
    If {
        test: Box<Codelet>,
        then: Box<Codelet>,
        #[serde(rename = "else")]
        otherwise: Box<Codelet>,
    },
    Seq {
        body: Vec<Codelet>,
    },
    Assign {
        lhs: Box<Codelet>,
        rhs: Box<Codelet>,
    },
    Binding {
        lhs: Box<Codelet>,
        rhs: Box<Codelet>,
        #[serde(default)]
        annotations: Annotations,
    },
    Lambda(LambdaCodelet),
    For {
        query: Box<Codelet>,
        body: Box<Codelet>,
    },
    In {
        pattern: Box<Codelet>,
        streamable: Box<Codelet>,
        #[serde(rename = "streamSlot", skip_serializing_if = "Option::is_none")]
        stream_slot: Option<u32>,
    },
    And {
        lhs: Box<Codelet>,
        rhs: Box<Codelet>,
    },
    Or {
        lhs: Box<Codelet>,
        rhs: Box<Codelet>,
    },
}

impl Codelet {
    pub fn string(value: impl Into<String>) -> Self {
        Codelet::String {
            value: value.into(),
        }
    }

    pub fn int(value: i64) -> Self {
        Codelet::Int { value }
    }

    pub fn boolean(value: bool) -> Self {
        Codelet::Bool { value }
    }

    pub fn id(name: impl Into<String>, reftype: RefType) -> Self {
        Codelet::Id(IdCodelet::new(name, reftype))
    }

    pub fn seq(body: Vec<Codelet>) -> Self {
        Codelet::Seq { body }
    }

    pub fn empty() -> Self {
        Codelet::Seq { body: Vec::new() }
    }

    pub fn syscall(name: impl Into<String>, arguments: Codelet) -> Self {
        Codelet::Syscall {
            name: name.into(),
            arguments: Box::new(arguments),
        }
    }

    pub fn call(function: Codelet, arguments: Codelet) -> Self {
        Codelet::Call {
            function: Box::new(function),
            arguments: Box::new(arguments),
        }
    }

    pub fn conditional(test: Codelet, then: Codelet, otherwise: Codelet) -> Self {
        Codelet::If {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn assign(lhs: Codelet, rhs: Codelet) -> Self {
        Codelet::Assign {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn binding(lhs: Codelet, rhs: Codelet) -> Self {
        Codelet::Binding {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            annotations: Annotations::default(),
        }
    }

    pub fn lambda(parameters: Codelet, body: Codelet) -> Self {
        Codelet::Lambda(LambdaCodelet::new(parameters, body))
    }

    pub fn for_loop(query: Codelet, body: Codelet) -> Self {
        Codelet::For {
            query: Box::new(query),
            body: Box::new(body),
        }
    }

    pub fn stream_binder(pattern: Codelet, streamable: Codelet) -> Self {
        Codelet::In {
            pattern: Box::new(pattern),
            streamable: Box::new(streamable),
            stream_slot: None,
        }
    }

    /// The interchange tag of this node.
    pub fn kind(&self) -> &'static str {
        match self {
            Codelet::String { .. } => "string",
            Codelet::Int { .. } => "int",
            Codelet::Bool { .. } => "bool",
            Codelet::Id(_) => "id",
            Codelet::Sysfn { .. } => "sysfn",
            Codelet::Syscall { .. } => "syscall",
            Codelet::Call { .. } => "call",
            Codelet::If { .. } => "if",
            Codelet::Seq { .. } => "seq",
            Codelet::Assign { .. } => "assign",
            Codelet::Binding { .. } => "binding",
            Codelet::Lambda(_) => "lambda",
            Codelet::For { .. } => "for",
            Codelet::In { .. } => "in",
            Codelet::And { .. } => "and",
            Codelet::Or { .. } => "or",
        }
    }

    /// The semantically meaningful children, in order.
    pub fn members(&self) -> Vec<&Codelet> {
        match self {
            Codelet::String { .. } | Codelet::Int { .. } | Codelet::Bool { .. } => Vec::new(),
            Codelet::Id(_) | Codelet::Sysfn { .. } => Vec::new(),
            Codelet::Syscall { arguments, .. } => vec![&**arguments],
            Codelet::Call {
                function,
                arguments,
            } => vec![&**function, &**arguments],
            Codelet::If {
                test,
                then,
                otherwise,
            } => vec![&**test, &**then, &**otherwise],
            Codelet::Seq { body } => body.iter().collect(),
            Codelet::Assign { lhs, rhs }
            | Codelet::Binding { lhs, rhs, .. }
            | Codelet::And { lhs, rhs }
            | Codelet::Or { lhs, rhs } => vec![&**lhs, &**rhs],
            Codelet::Lambda(lambda) => vec![&*lambda.parameters, &*lambda.body],
            Codelet::For { query, body } => vec![&**query, &**body],
            Codelet::In {
                pattern,
                streamable,
                ..
            } => vec![&**pattern, &**streamable],
        }
    }

    pub fn members_mut(&mut self) -> Vec<&mut Codelet> {
        match self {
            Codelet::String { .. } | Codelet::Int { .. } | Codelet::Bool { .. } => Vec::new(),
            Codelet::Id(_) | Codelet::Sysfn { .. } => Vec::new(),
            Codelet::Syscall { arguments, .. } => vec![&mut **arguments],
            Codelet::Call {
                function,
                arguments,
            } => vec![&mut **function, &mut **arguments],
            Codelet::If {
                test,
                then,
                otherwise,
            } => vec![&mut **test, &mut **then, &mut **otherwise],
            Codelet::Seq { body } => body.iter_mut().collect(),
            Codelet::Assign { lhs, rhs }
            | Codelet::Binding { lhs, rhs, .. }
            | Codelet::And { lhs, rhs }
            | Codelet::Or { lhs, rhs } => vec![&mut **lhs, &mut **rhs],
            Codelet::Lambda(lambda) => vec![&mut *lambda.parameters, &mut *lambda.body],
            Codelet::For { query, body } => vec![&mut **query, &mut **body],
            Codelet::In {
                pattern,
                streamable,
                ..
            } => vec![&mut **pattern, &mut **streamable],
        }
    }

    /// Rebuilds this node with each member replaced by `f(member)`.
    /// Scalar fields are carried over unchanged.
    pub fn transform<E>(
        self,
        mut f: impl FnMut(Codelet) -> Result<Codelet, E>,
    ) -> Result<Codelet, E> {
        let mut boxed =
            |member: Box<Codelet>| -> Result<Box<Codelet>, E> { Ok(Box::new(f(*member)?)) };
        Ok(match self {
            leaf @ (Codelet::String { .. }
            | Codelet::Int { .. }
            | Codelet::Bool { .. }
            | Codelet::Id(_)
            | Codelet::Sysfn { .. }) => leaf,
            Codelet::Syscall { name, arguments } => Codelet::Syscall {
                name,
                arguments: boxed(arguments)?,
            },
            Codelet::Call {
                function,
                arguments,
            } => Codelet::Call {
                function: boxed(function)?,
                arguments: boxed(arguments)?,
            },
            Codelet::If {
                test,
                then,
                otherwise,
            } => Codelet::If {
                test: boxed(test)?,
                then: boxed(then)?,
                otherwise: boxed(otherwise)?,
            },
            Codelet::Seq { body } => Codelet::Seq {
                body: body
                    .into_iter()
                    .map(|member| boxed(Box::new(member)).map(|b| *b))
                    .collect::<Result<_, E>>()?,
            },
            Codelet::Assign { lhs, rhs } => Codelet::Assign {
                lhs: boxed(lhs)?,
                rhs: boxed(rhs)?,
            },
            Codelet::Binding {
                lhs,
                rhs,
                annotations,
            } => Codelet::Binding {
                lhs: boxed(lhs)?,
                rhs: boxed(rhs)?,
                annotations,
            },
            Codelet::Lambda(lambda) => Codelet::Lambda(LambdaCodelet {
                parameters: boxed(lambda.parameters)?,
                body: boxed(lambda.body)?,
                ..lambda
            }),
            Codelet::For { query, body } => Codelet::For {
                query: boxed(query)?,
                body: boxed(body)?,
            },
            Codelet::In {
                pattern,
                streamable,
                stream_slot,
            } => Codelet::In {
                pattern: boxed(pattern)?,
                streamable: boxed(streamable)?,
                stream_slot,
            },
            Codelet::And { lhs, rhs } => Codelet::And {
                lhs: boxed(lhs)?,
                rhs: boxed(rhs)?,
            },
            Codelet::Or { lhs, rhs } => Codelet::Or {
                lhs: boxed(lhs)?,
                rhs: boxed(rhs)?,
            },
        })
    }

    /// Turns every bare (`get`) identifier in this pattern into a
    /// declaration of the given mode.
    pub fn declaration_mode(&mut self, mode: RefType) {
        match self {
            Codelet::Id(id) => {
                if id.reftype == RefType::Get {
                    id.reftype = mode;
                }
            }
            other => {
                for member in other.members_mut() {
                    member.declaration_mode(mode);
                }
            }
        }
    }

    /// Turns every bare (`get`) identifier in this pattern into an
    /// assignment target.
    pub fn assign_mode(&mut self) {
        match self {
            Codelet::Id(id) => {
                if id.reftype == RefType::Get {
                    id.reftype = RefType::Set;
                }
            }
            other => {
                for member in other.members_mut() {
                    member.assign_mode();
                }
            }
        }
    }

    pub fn as_id(&self) -> Option<&IdCodelet> {
        match self {
            Codelet::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_lambda(&self) -> Option<&LambdaCodelet> {
        match self {
            Codelet::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    /// Visits this node and all its descendants, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Codelet)) {
        visit(self);
        for member in self.members() {
            member.walk(visit);
        }
    }
}
