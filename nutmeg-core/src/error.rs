use core::fmt;

use thiserror::Error;

/// Broad category of a [`Mishap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MishapKind {
    /// Unmatched input, unterminated block comment, malformed literal.
    Lexical,
    /// Unexpected or missing token, malformed definition head.
    Syntax,
    /// Redeclaration, builtin shadowing, protected assignment, illegal capture.
    Scope,
    /// A tree document that does not match the interchange format.
    Interchange,
    /// A global that is referenced but never bound.
    Link,
}

impl fmt::Display for MishapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MishapKind::Lexical => "lexical",
            MishapKind::Syntax => "syntax",
            MishapKind::Scope => "scope",
            MishapKind::Interchange => "interchange",
            MishapKind::Link => "link",
        };
        f.write_str(name)
    }
}

/// The single structured error raised by every stage of the toolchain.
///
/// Besides the message, a mishap carries an ordered list of named context
/// fields ("culprits"). Enclosing constructs may append further culprits
/// as the error propagates outward.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Mishap {
    kind: MishapKind,
    message: String,
    culprits: Vec<(String, String)>,
}

impl Mishap {
    pub fn new(kind: MishapKind, message: impl Into<String>) -> Self {
        Mishap {
            kind,
            message: message.into(),
            culprits: Vec::new(),
        }
    }

    pub fn lexical(message: impl Into<String>) -> Self {
        Mishap::new(MishapKind::Lexical, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Mishap::new(MishapKind::Syntax, message)
    }

    pub fn scope(message: impl Into<String>) -> Self {
        Mishap::new(MishapKind::Scope, message)
    }

    pub fn interchange(message: impl Into<String>) -> Self {
        Mishap::new(MishapKind::Interchange, message)
    }

    pub fn link(message: impl Into<String>) -> Self {
        Mishap::new(MishapKind::Link, message)
    }

    /// Builder form of [`Mishap::add_culprit`].
    pub fn culprit(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.add_culprit(name, value);
        self
    }

    pub fn add_culprit(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.culprits.push((name.into(), value.to_string()));
    }

    pub fn kind(&self) -> MishapKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn culprits(&self) -> impl Iterator<Item = (&str, &str)> {
        self.culprits.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First culprit value recorded under `name`.
    pub fn culprit_value(&self, name: &str) -> Option<&str> {
        self.culprits()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Renders the message followed by an aligned table of culprits.
    pub fn report(&self) -> String {
        let mut out = format!("MISHAP: {}\n", self.message);
        let width = self
            .culprits
            .iter()
            .map(|(key, _)| key.len())
            .max()
            .unwrap_or(0);
        for (key, value) in &self.culprits {
            out.push_str(&format!("{key:<width$} : {value}\n"));
        }
        out
    }
}
