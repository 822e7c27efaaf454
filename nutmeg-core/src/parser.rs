//! Table-driven precedence-climbing parser.
//!
//! Each token kind may have a prefix mini-parser (it can start an
//! expression) and a postfix mini-parser (it can extend one). Whether a
//! newline ends the current expression depends on the breakability stack:
//! statement sequences push "breakable", and every mini-parser pushes
//! "non-breakable" if its token opens an outfix construct (brackets,
//! `def`, `if`, ...) or the enclosing context was already non-breakable.

use tracing::debug;

use crate::ast::{Codelet, RefType};
use crate::error::Mishap;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::stream::TokenStream;

/// Accepts every postfix operator.
const MAX_PRECEDENCE: u32 = u32::MAX;

type PrefixParser<'src> = fn(&mut Parser<'src>, Token<'src>) -> Result<Codelet, Mishap>;
type PostfixParser<'src> =
    fn(&mut Parser<'src>, u32, Codelet, Token<'src>) -> Result<Codelet, Mishap>;

/// Parses a whole source text into its top-level codelets.
pub fn parse(text: &str) -> Result<Vec<Codelet>, Mishap> {
    Parser::new(text).collect()
}

/// Lazily yields the top-level statements of a source text.
///
/// After the first error the iterator is exhausted.
pub struct Parser<'src> {
    stream: TokenStream<'src>,
    non_breakable: Vec<bool>,
    unit: String,
    started: bool,
    finished: bool,
}

impl<'src> Parser<'src> {
    pub fn new(text: &'src str) -> Self {
        Self {
            stream: TokenStream::new(tokenize(text)),
            non_breakable: Vec::new(),
            unit: String::from("<unknown>"),
            started: false,
            finished: false,
        }
    }

    /// Names the logical unit recorded in assertion calls.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    fn is_non_breakable(&self) -> bool {
        self.non_breakable.last().copied().unwrap_or(true)
    }

    fn is_breakable(&self) -> bool {
        !self.is_non_breakable()
    }

    fn nested<T>(
        &mut self,
        non_breakable: bool,
        read: impl FnOnce(&mut Self) -> Result<T, Mishap>,
    ) -> Result<T, Mishap> {
        self.non_breakable.push(non_breakable);
        let result = read(self);
        self.non_breakable.pop();
        result
    }

    fn prefix_parser(kind: TokenKind) -> Option<PrefixParser<'src>> {
        use TokenKind::*;
        let parser: PrefixParser<'src> = match kind {
            Int => Self::int_literal,
            String => Self::string_literal,
            Bool => Self::bool_literal,
            Id => Self::identifier,
            Var | Val | Const => Self::declaration,
            LParen => Self::group,
            LBracket => Self::list,
            Def => Self::function_definition,
            Lambda => Self::lambda,
            If => Self::if_then,
            IfNot => Self::ifnot_then,
            For => Self::for_loop,
            Annotation => Self::annotation,
            Assert => Self::assertion,
            _ => return None,
        };
        Some(parser)
    }

    fn postfix_parser(kind: TokenKind) -> Option<PostfixParser<'src>> {
        use TokenKind::*;
        let parser: PostfixParser<'src> = match kind {
            Id => Self::operator,
            Seq => Self::comma,
            LParen => Self::call,
            Bind => Self::bind,
            Assign => Self::assign,
            In => Self::stream_binder,
            Dot => Self::dot_call,
            And | Or => Self::and_or,
            Discard => Self::discard,
            _ => return None,
        };
        Some(parser)
    }

    /// Reads an expression whose postfix operators all have precedence at
    /// most `max`. Returns `None`, consuming nothing, if the next token
    /// cannot start an expression.
    fn try_read_expr(&mut self, max: u32) -> Result<Option<Codelet>, Mishap> {
        let Some(token) = self.stream.pop()? else {
            return Ok(None);
        };
        let Some(prefix) = Self::prefix_parser(token.kind) else {
            self.stream.push(token);
            return Ok(None);
        };
        let non_breakable = token.outfixer || self.is_non_breakable();
        let mut sofar = self.nested(non_breakable, |p| prefix(p, token))?;

        loop {
            let breakable = self.is_breakable();
            let precedence = match self.stream.peek()? {
                Some(next) if !(next.follows_newline && breakable) => {
                    next.precedence.filter(|p| *p <= max)
                }
                _ => None,
            };
            let Some(precedence) = precedence else { break };
            let Some(token) = self.stream.pop()? else { break };
            sofar = self.run_postfix(precedence, sofar, token)?;
        }
        Ok(Some(sofar))
    }

    fn run_postfix(
        &mut self,
        precedence: u32,
        lhs: Codelet,
        token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        let Some(postfix) = Self::postfix_parser(token.kind) else {
            return Err(Mishap::syntax("Unexpected token in infix/postfix position")
                .culprit("token", token.text)
                .culprit("position", token.span));
        };
        let non_breakable = token.outfixer || self.is_non_breakable();
        self.nested(non_breakable, |p| postfix(p, precedence, lhs, token))
    }

    fn read_expr(&mut self, max: u32) -> Result<Codelet, Mishap> {
        if let Some(expr) = self.try_read_expr(max)? {
            return Ok(expr);
        }
        match self.stream.pop()? {
            None => Err(Mishap::syntax("Unexpected end of input")
                .culprit("position", self.stream.last_span())),
            Some(token) => Err(Mishap::syntax("No continuation because of unexpected token")
                .culprit("token", token.text)
                .culprit("position", token.span)),
        }
    }

    /// Decides whether the statement just read is followed by another.
    fn continues_sequence(&mut self) -> Result<bool, Mishap> {
        if self.stream.pop_if(TokenKind::TerminateStatement)?.is_some() {
            return Ok(true);
        }
        let breakable = self.is_breakable();
        Ok(matches!(self.stream.peek()?, Some(next) if is_virtual_semi(next, breakable)))
    }

    fn next_in_sequence(&mut self, first: bool) -> Result<Option<Codelet>, Mishap> {
        if !first && !self.continues_sequence()? {
            return Ok(None);
        }
        if self.stream.is_empty()? {
            return Ok(None);
        }
        self.try_read_expr(MAX_PRECEDENCE)
    }

    /// Reads `;`-or-newline separated statements. A single statement is
    /// returned as itself, anything else as a sequence.
    fn read_statements(&mut self) -> Result<Codelet, Mishap> {
        let body = self.nested(false, |p| {
            let mut body = Vec::new();
            while let Some(statement) = p.next_in_sequence(body.is_empty())? {
                body.push(statement);
            }
            Ok(body)
        })?;
        Ok(match <[Codelet; 1]>::try_from(body) {
            Ok([single]) => single,
            Err(body) => Codelet::seq(body),
        })
    }

    fn must_read(&mut self, kinds: &[TokenKind], expected: &str) -> Result<Token<'src>, Mishap> {
        match self.stream.pop()? {
            Some(token) if kinds.contains(&token.kind) => Ok(token),
            Some(token) => Err(Mishap::syntax("Required keyword not found")
                .culprit("found", token.text)
                .culprit("expected", expected)
                .culprit("position", token.span)),
            None => Err(Mishap::syntax("Unexpected end of input")
                .culprit("expected", expected)
                .culprit("position", self.stream.last_span())),
        }
    }

    fn next_top_level(&mut self) -> Result<Option<Codelet>, Mishap> {
        let first = !self.started;
        self.started = true;
        if let Some(codelet) = self.nested(false, |p| p.next_in_sequence(first))? {
            return Ok(Some(codelet));
        }
        match self.stream.peek()? {
            None => Ok(None),
            Some(token) => Err(Mishap::syntax("Unexpected token after end of statements")
                .culprit("token", token.text)
                .culprit("position", token.span)),
        }
    }

    // Prefix mini-parsers

    fn int_literal(&mut self, token: Token<'src>) -> Result<Codelet, Mishap> {
        Ok(Codelet::int(token.int_value()?))
    }

    fn string_literal(&mut self, token: Token<'src>) -> Result<Codelet, Mishap> {
        Ok(Codelet::string(token.literal_string()))
    }

    fn bool_literal(&mut self, token: Token<'src>) -> Result<Codelet, Mishap> {
        Ok(Codelet::boolean(token.text == "true"))
    }

    fn identifier(&mut self, token: Token<'src>) -> Result<Codelet, Mishap> {
        Ok(Codelet::id(token.text, RefType::Get))
    }

    fn declaration(&mut self, token: Token<'src>) -> Result<Codelet, Mishap> {
        let mode = match token.kind {
            TokenKind::Var => RefType::Var,
            TokenKind::Const => RefType::Const,
            _ => RefType::Val,
        };
        let name = self.must_read(&[TokenKind::Id], "variable name")?;
        if name.is_postfixer() {
            return Err(Mishap::syntax("Cannot declare an operator as a variable")
                .culprit("token", name.text)
                .culprit("position", name.span));
        }
        Ok(Codelet::id(name.text, mode))
    }

    fn group(&mut self, _token: Token<'src>) -> Result<Codelet, Mishap> {
        if self.stream.pop_if(TokenKind::RParen)?.is_some() {
            return Ok(Codelet::empty());
        }
        let expr = self.read_expr(MAX_PRECEDENCE)?;
        self.must_read(&[TokenKind::RParen], ")")?;
        Ok(expr)
    }

    fn list(&mut self, _token: Token<'src>) -> Result<Codelet, Mishap> {
        let contents = if self.stream.pop_if(TokenKind::RBracket)?.is_some() {
            Codelet::empty()
        } else {
            let contents = self.read_expr(MAX_PRECEDENCE)?;
            self.must_read(&[TokenKind::RBracket], "]")?;
            contents
        };
        Ok(Codelet::syscall("newImmutableList", contents))
    }

    fn function_definition(&mut self, token: Token<'src>) -> Result<Codelet, Mishap> {
        let head = self.read_expr(MAX_PRECEDENCE)?;
        let (name, mut parameters) =
            split_function_head(head).map_err(|m| m.culprit("position", token.span))?;
        parameters.declaration_mode(RefType::New);
        self.must_read(&[TokenKind::EndParameters, TokenKind::EndPhrase], ": or =>>")?;
        let body = self.read_statements()?;
        self.must_read(&[TokenKind::EndDef, TokenKind::End], "end or enddef")?;
        Ok(Codelet::binding(
            Codelet::id(name, RefType::Val),
            Codelet::lambda(parameters, body),
        ))
    }

    fn lambda(&mut self, token: Token<'src>) -> Result<Codelet, Mishap> {
        let end_parameters = [TokenKind::EndParameters, TokenKind::EndPhrase];
        let mut parameters = if self.stream.pop_if_any(&end_parameters)?.is_some() {
            Codelet::empty()
        } else {
            let parameters = self.read_expr(MAX_PRECEDENCE)?;
            self.must_read(&end_parameters, ": or =>>")?;
            parameters
        };
        if !is_simple_parameters(&parameters) {
            return Err(Mishap::syntax("Invalid parameters for lambda")
                .culprit("parameters", parameters.kind())
                .culprit("position", token.span));
        }
        parameters.declaration_mode(RefType::New);
        let body = self.read_statements()?;
        self.must_read(&[TokenKind::EndLambda, TokenKind::End], "end or endlambda")?;
        Ok(Codelet::lambda(parameters, body))
    }

    fn if_then(&mut self, _token: Token<'src>) -> Result<Codelet, Mishap> {
        self.conditional(false, TokenKind::EndIf)
    }

    fn ifnot_then(&mut self, _token: Token<'src>) -> Result<Codelet, Mishap> {
        self.conditional(true, TokenKind::EndIfNot)
    }

    /// Reads the rest of a conditional after its opening keyword. `elseif`
    /// chains nest in the else branch and share the outer closing keyword.
    fn conditional(&mut self, negated: bool, closing: TokenKind) -> Result<Codelet, Mishap> {
        let expected = if closing == TokenKind::EndIfNot {
            "end or endifnot"
        } else {
            "end or endif"
        };
        let mut test = self.read_expr(MAX_PRECEDENCE)?;
        if negated {
            test = Codelet::syscall("not", test);
        }
        self.must_read(&[TokenKind::Then, TokenKind::EndPhrase], ": or then")?;
        let then = self.read_statements()?;

        let branch = self
            .stream
            .pop_if_any(&[TokenKind::ElseIf, TokenKind::ElseIfNot, TokenKind::Else])?
            .map(|t| t.kind);
        let otherwise = match branch {
            Some(TokenKind::ElseIf) => self.conditional(false, closing)?,
            Some(TokenKind::ElseIfNot) => self.conditional(true, closing)?,
            Some(_) => {
                self.stream.pop_if(TokenKind::EndPhrase)?;
                let otherwise = self.read_statements()?;
                self.must_read(&[closing, TokenKind::End], expected)?;
                otherwise
            }
            None => {
                self.must_read(&[closing, TokenKind::End], expected)?;
                Codelet::empty()
            }
        };
        Ok(Codelet::conditional(test, then, otherwise))
    }

    fn for_loop(&mut self, _token: Token<'src>) -> Result<Codelet, Mishap> {
        let query = self.read_expr(MAX_PRECEDENCE)?;
        self.must_read(&[TokenKind::Do, TokenKind::EndPhrase], ": or do")?;
        let body = self.read_statements()?;
        self.must_read(&[TokenKind::EndFor, TokenKind::End], "end or endfor")?;
        Ok(Codelet::for_loop(query, body))
    }

    fn annotation(&mut self, token: Token<'src>) -> Result<Codelet, Mishap> {
        let name = self.must_read(&[TokenKind::Id], "annotation name")?;
        let mut expr = self.read_expr(MAX_PRECEDENCE)?;
        let found = expr.kind();
        let Codelet::Binding { annotations, .. } = &mut expr else {
            return Err(Mishap::syntax("Invalid expression following annotation, needed binding")
                .culprit("found", found)
                .culprit("position", token.span));
        };
        if !annotations.set(name.text) {
            return Err(Mishap::syntax("Unknown annotation")
                .culprit("name", name.text)
                .culprit("position", name.span));
        }
        Ok(expr)
    }

    /// `assert a == b` and `assert a != b` keep their operands apart so a
    /// failure can show both; anything else is a truthiness check.
    fn assertion(&mut self, token: Token<'src>) -> Result<Codelet, Mishap> {
        let expr = strip_singleton_seqs(self.read_expr(MAX_PRECEDENCE)?);
        let (assertion, mut arguments) = match expr {
            Codelet::Syscall { name, arguments } if name == "==" => {
                ("assertEquals", into_members(*arguments))
            }
            Codelet::Syscall { name, arguments } if name == "!=" => {
                ("assertNotEquals", into_members(*arguments))
            }
            other => ("assertTrue", vec![other]),
        };
        arguments.push(Codelet::string(self.unit.as_str()));
        arguments.push(Codelet::int(token.span.start as i64));
        Ok(Codelet::syscall(assertion, Codelet::seq(arguments)))
    }

    // Postfix mini-parsers

    /// Binary operators are left-associative.
    fn operator(
        &mut self,
        precedence: u32,
        lhs: Codelet,
        token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        let rhs = self.read_expr(precedence.saturating_sub(1))?;
        Ok(Codelet::syscall(token.text, Codelet::seq(vec![lhs, rhs])))
    }

    fn comma(
        &mut self,
        precedence: u32,
        lhs: Codelet,
        _token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        let mut body = vec![lhs];
        loop {
            body.push(self.read_expr(precedence.saturating_sub(1))?);
            if self.stream.pop_if(TokenKind::Seq)?.is_none() {
                break;
            }
        }
        Ok(Codelet::seq(body))
    }

    fn call(
        &mut self,
        _precedence: u32,
        lhs: Codelet,
        _token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        if self.stream.pop_if(TokenKind::RParen)?.is_some() {
            return Ok(Codelet::call(lhs, Codelet::empty()));
        }
        let arguments = self.read_expr(MAX_PRECEDENCE)?;
        self.must_read(&[TokenKind::RParen], ")")?;
        Ok(Codelet::call(lhs, arguments))
    }

    fn bind(
        &mut self,
        precedence: u32,
        mut lhs: Codelet,
        _token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        lhs.declaration_mode(RefType::Val);
        let rhs = self.read_expr(precedence)?;
        Ok(Codelet::binding(lhs, rhs))
    }

    fn assign(
        &mut self,
        precedence: u32,
        mut lhs: Codelet,
        _token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        lhs.assign_mode();
        let rhs = self.read_expr(precedence)?;
        Ok(Codelet::assign(lhs, rhs))
    }

    fn stream_binder(
        &mut self,
        _precedence: u32,
        mut lhs: Codelet,
        _token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        lhs.declaration_mode(RefType::Val);
        let rhs = self.read_expr(MAX_PRECEDENCE)?;
        Ok(Codelet::stream_binder(lhs, rhs))
    }

    /// `a.f` is `f(a)` and `a.f(b, c)` is `f(a, b, c)`.
    fn dot_call(
        &mut self,
        precedence: u32,
        lhs: Codelet,
        token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        let rhs = self.read_expr(precedence.saturating_sub(1))?;
        match rhs {
            function @ Codelet::Id(_) => Ok(Codelet::call(function, lhs)),
            Codelet::Call {
                function,
                arguments,
            } => Ok(Codelet::Call {
                function,
                arguments: Box::new(prepend_argument(lhs, *arguments)),
            }),
            Codelet::Syscall { name, arguments } => Ok(Codelet::Syscall {
                name,
                arguments: Box::new(prepend_argument(lhs, *arguments)),
            }),
            other => Err(Mishap::syntax("Unexpected expression after '.'")
                .culprit("found", other.kind())
                .culprit("position", token.span)),
        }
    }

    fn and_or(
        &mut self,
        precedence: u32,
        lhs: Codelet,
        token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        let lhs = Box::new(lhs);
        let rhs = Box::new(self.read_expr(precedence)?);
        Ok(if token.kind == TokenKind::And {
            Codelet::And { lhs, rhs }
        } else {
            Codelet::Or { lhs, rhs }
        })
    }

    fn discard(
        &mut self,
        _precedence: u32,
        lhs: Codelet,
        _token: Token<'src>,
    ) -> Result<Codelet, Mishap> {
        Ok(Codelet::syscall("eraseAll", lhs))
    }
}

impl<'src> Iterator for Parser<'src> {
    type Item = Result<Codelet, Mishap>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_top_level() {
            Ok(Some(codelet)) => {
                debug!(kind = codelet.kind(), unit = %self.unit, "parsed top-level codelet");
                Some(Ok(codelet))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(mishap) => {
                self.finished = true;
                Some(Err(mishap))
            }
        }
    }
}

/// A newline before `next` ends the statement if `next` can only start an
/// expression, never if it can only continue one, and otherwise only in a
/// breakable context.
fn is_virtual_semi(next: &Token<'_>, breakable: bool) -> bool {
    if !next.follows_newline {
        return false;
    }
    if next.is_prefixer_only() {
        return true;
    }
    if next.is_postfixer_only() {
        return false;
    }
    breakable
}

fn is_simple_parameters(parameters: &Codelet) -> bool {
    match parameters {
        Codelet::Id(_) => true,
        Codelet::Seq { body } => body.iter().all(is_simple_parameters),
        _ => false,
    }
}

/// Splits `NAME(PARAMS)` into the name and the parameter pattern.
fn split_function_head(head: Codelet) -> Result<(String, Codelet), Mishap> {
    let invalid = |issue: &str| {
        Mishap::syntax("Invalid expression for function definition").culprit("issue", issue)
    };
    let Codelet::Call {
        function,
        arguments,
    } = head
    else {
        return Err(invalid("missing function call"));
    };
    let Codelet::Id(id) = *function else {
        return Err(invalid("not a call of a simple variable"));
    };
    if !is_simple_parameters(&arguments) {
        return Err(invalid("non-simple argument"));
    }
    Ok((id.name, *arguments))
}

fn strip_singleton_seqs(expr: Codelet) -> Codelet {
    match expr {
        Codelet::Seq { body } => match <[Codelet; 1]>::try_from(body) {
            Ok([inner]) => strip_singleton_seqs(inner),
            Err(body) => Codelet::seq(body),
        },
        other => other,
    }
}

fn into_members(arguments: Codelet) -> Vec<Codelet> {
    match arguments {
        Codelet::Seq { body } => body,
        other => vec![other],
    }
}

fn prepend_argument(first: Codelet, rest: Codelet) -> Codelet {
    match rest {
        Codelet::Seq { body } if body.is_empty() => first,
        Codelet::Seq { mut body } => {
            body.insert(0, first);
            Codelet::seq(body)
        }
        other => Codelet::seq(vec![first, other]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MishapKind;

    fn parse_one(text: &str) -> Codelet {
        let mut codelets = parse(text).expect("parse");
        assert_eq!(codelets.len(), 1, "expected one statement in {text:?}");
        codelets.remove(0)
    }

    fn parse_err(text: &str) -> Mishap {
        parse(text).expect_err("parse should fail")
    }

    fn get(name: &str) -> Codelet {
        Codelet::id(name, RefType::Get)
    }

    fn binary(op: &str, lhs: Codelet, rhs: Codelet) -> Codelet {
        Codelet::syscall(op, Codelet::seq(vec![lhs, rhs]))
    }

    #[test]
    fn explicit_and_newline_terminators_agree() {
        let explicit = parse_one("def f(): a; b enddef");
        let implicit = parse_one("def f():\n a\n b\nenddef");
        assert_eq!(explicit, implicit);
        assert_eq!(
            explicit,
            Codelet::binding(
                Codelet::id("f", RefType::Val),
                Codelet::lambda(Codelet::empty(), Codelet::seq(vec![get("a"), get("b")])),
            )
        );
    }

    #[test]
    fn trailing_operator_continues_onto_next_line() {
        let tree = parse_one("def f():\n a +\n b\nenddef");
        let lambda = match &tree {
            Codelet::Binding { rhs, .. } => rhs.as_lambda().expect("lambda"),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(*lambda.body, binary("+", get("a"), get("b")));
    }

    #[test]
    fn newline_inside_brackets_does_not_terminate() {
        assert_eq!(parse_one("(a\n+ b)"), binary("+", get("a"), get("b")));
        assert_eq!(
            parse_one("f(x,\n y)"),
            Codelet::call(get("f"), Codelet::seq(vec![get("x"), get("y")]))
        );
    }

    #[test]
    fn call_parens_on_new_line_start_a_statement() {
        assert_eq!(parse("f\n()").unwrap(), vec![get("f"), Codelet::empty()]);
    }

    #[test]
    fn elseif_chains_nest_in_else_branch() {
        let tree = parse_one("if a then b elseif c then d else e endif");
        assert_eq!(
            tree,
            Codelet::conditional(
                get("a"),
                get("b"),
                Codelet::conditional(get("c"), get("d"), get("e")),
            )
        );
    }

    #[test]
    fn negated_conditionals() {
        assert_eq!(
            parse_one("ifnot a: b endifnot"),
            Codelet::conditional(Codelet::syscall("not", get("a")), get("b"), Codelet::empty())
        );
        assert_eq!(
            parse_one("if a then b elseifnot c then d end"),
            Codelet::conditional(
                get("a"),
                get("b"),
                Codelet::conditional(Codelet::syscall("not", get("c")), get("d"), Codelet::empty())
            )
        );
    }

    #[test]
    fn conditional_requires_its_own_closer() {
        let mishap = parse_err("if a then b enddef");
        assert_eq!(mishap.message(), "Required keyword not found");
        assert_eq!(mishap.culprit_value("found"), Some("enddef"));
        assert_eq!(mishap.culprit_value("expected"), Some("end or endif"));
    }

    #[test]
    fn multiline_conditional_with_else() {
        let tree = parse_one("if a:\n  b\nelse:\n  c\n  d\nendif");
        assert_eq!(
            tree,
            Codelet::conditional(get("a"), get("b"), Codelet::seq(vec![get("c"), get("d")]))
        );
    }

    #[test]
    fn discard_wraps_the_preceding_statement() {
        assert_eq!(parse_one("0;;"), Codelet::syscall("eraseAll", Codelet::int(0)));
        assert_eq!(
            parse_one("0, 1;;"),
            Codelet::syscall("eraseAll", Codelet::seq(vec![Codelet::int(0), Codelet::int(1)]))
        );
        assert_eq!(
            parse("0; 1;;").unwrap(),
            vec![Codelet::int(0), Codelet::syscall("eraseAll", Codelet::int(1))]
        );
    }

    #[test]
    fn operators_respect_precedence_and_associate_left() {
        assert_eq!(
            parse_one("a + b * c"),
            binary("+", get("a"), binary("*", get("b"), get("c")))
        );
        assert_eq!(
            parse_one("a - b - c"),
            binary("-", binary("-", get("a"), get("b")), get("c"))
        );
        assert_eq!(
            parse_one("a < b and c"),
            Codelet::And {
                lhs: Box::new(binary("<", get("a"), get("b"))),
                rhs: Box::new(get("c")),
            }
        );
    }

    #[test]
    fn commas_build_flat_sequences() {
        assert_eq!(
            parse_one("a, b, c"),
            Codelet::seq(vec![get("a"), get("b"), get("c")])
        );
    }

    #[test]
    fn bindings_and_assignments_set_reference_modes() {
        assert_eq!(
            parse_one("x := 1"),
            Codelet::binding(Codelet::id("x", RefType::Val), Codelet::int(1))
        );
        assert_eq!(
            parse_one("var x := 1"),
            Codelet::binding(Codelet::id("x", RefType::Var), Codelet::int(1))
        );
        assert_eq!(
            parse_one("const x := 1"),
            Codelet::binding(Codelet::id("x", RefType::Const), Codelet::int(1))
        );
        assert_eq!(
            parse_one("x <- y"),
            Codelet::assign(Codelet::id("x", RefType::Set), get("y"))
        );
    }

    #[test]
    fn function_parameters_are_new_bindings() {
        let tree = parse_one("def add(x, y): x + y enddef");
        let Codelet::Binding { rhs, .. } = tree else {
            panic!("expected binding");
        };
        let lambda = rhs.as_lambda().expect("lambda");
        assert_eq!(
            *lambda.parameters,
            Codelet::seq(vec![Codelet::id("x", RefType::New), Codelet::id("y", RefType::New)])
        );
    }

    #[test]
    fn lambda_expressions() {
        assert_eq!(
            parse_one("lambda x: x end"),
            Codelet::lambda(Codelet::id("x", RefType::New), get("x"))
        );
        assert_eq!(
            parse_one("lambda =>> 1 endlambda"),
            Codelet::lambda(Codelet::empty(), Codelet::int(1))
        );
    }

    #[test]
    fn for_loops_bind_their_query() {
        assert_eq!(
            parse_one("for i in 0 ..< n do f(i) endfor"),
            Codelet::for_loop(
                Codelet::stream_binder(
                    Codelet::id("i", RefType::Val),
                    binary("..<", Codelet::int(0), get("n"))
                ),
                Codelet::call(get("f"), get("i")),
            )
        );
    }

    #[test]
    fn brackets_build_lists() {
        assert_eq!(
            parse_one("[1, 2]"),
            Codelet::syscall(
                "newImmutableList",
                Codelet::seq(vec![Codelet::int(1), Codelet::int(2)])
            )
        );
        assert_eq!(parse_one("[]"), Codelet::syscall("newImmutableList", Codelet::empty()));
    }

    #[test]
    fn dot_calls_move_the_receiver_first() {
        assert_eq!(parse_one("a.f(b, c)"), parse_one("f(a, b, c)"));
        assert_eq!(parse_one("a.f"), Codelet::call(get("f"), get("a")));
        assert_eq!(parse_one("x.g()"), parse_one("g(x)"));
        assert_eq!(
            parse_one("x.f.g"),
            Codelet::call(get("g"), Codelet::call(get("f"), get("x")))
        );
    }

    #[test]
    fn assertions_record_operands_unit_and_position() {
        let mut parser = Parser::new("assert x == 1").with_unit("demo");
        let tree = parser.next().unwrap().unwrap();
        assert_eq!(
            tree,
            Codelet::syscall(
                "assertEquals",
                Codelet::seq(vec![
                    get("x"),
                    Codelet::int(1),
                    Codelet::string("demo"),
                    Codelet::int(0),
                ])
            )
        );

        let tree = Parser::new("  assert ok").with_unit("demo").next().unwrap().unwrap();
        assert_eq!(
            tree,
            Codelet::syscall(
                "assertTrue",
                Codelet::seq(vec![get("ok"), Codelet::string("demo"), Codelet::int(2)])
            )
        );

        let tree = parse_one("assert (a != b)");
        assert!(matches!(tree, Codelet::Syscall { ref name, .. } if name == "assertNotEquals"));
    }

    #[test]
    fn annotations_mark_bindings() {
        let tree = parse_one("@unittest @command def main(): 0 enddef");
        let Codelet::Binding { annotations, .. } = tree else {
            panic!("expected binding");
        };
        assert!(annotations.unittest && annotations.command);
    }

    #[test]
    fn unknown_annotation_is_rejected() {
        let mishap = parse_err("@inline x := 1");
        assert_eq!(mishap.message(), "Unknown annotation");
        assert_eq!(mishap.culprit_value("name"), Some("inline"));
    }

    #[test]
    fn annotation_needs_a_binding() {
        let mishap = parse_err("@command 1");
        assert_eq!(mishap.message(), "Invalid expression following annotation, needed binding");
        let mishap = parse_err("@inline 1");
        assert_eq!(mishap.culprit_value("found"), Some("int"));
    }

    #[test]
    fn malformed_definition_heads() {
        for text in ["def 1(): 2 enddef", "def f(1): 2 enddef", "def f: 2 enddef"] {
            let mishap = parse_err(text);
            assert_eq!(mishap.message(), "Invalid expression for function definition", "{text}");
            assert_eq!(mishap.kind(), MishapKind::Syntax);
        }
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let mishap = parse_err("a b");
        assert_eq!(mishap.message(), "Unexpected token after end of statements");
        assert_eq!(mishap.culprit_value("token"), Some("b"));
    }

    #[test]
    fn premature_end_of_input() {
        assert_eq!(parse_err("(1").message(), "Unexpected end of input");
        assert_eq!(parse_err("1 +").message(), "Unexpected end of input");
    }

    #[test]
    fn lexical_errors_propagate() {
        assert_eq!(parse_err("x = 1").kind(), MishapKind::Lexical);
    }

    #[test]
    fn parser_stops_after_first_error() {
        let mut parser = Parser::new("a\n)\nb");
        assert_eq!(parser.next().unwrap().unwrap(), get("a"));
        assert!(parser.next().unwrap().is_err());
        assert!(parser.next().is_none());
    }

    #[test]
    fn statements_are_yielded_lazily() {
        let mut parser = Parser::new("x := 1\ny ?");
        assert!(parser.next().unwrap().is_ok());
        assert!(parser.next().unwrap().is_err());
        assert!(parser.next().is_none());
    }

    #[test]
    fn empty_source_has_no_statements() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("### nothing here\n").unwrap().is_empty());
    }
}
