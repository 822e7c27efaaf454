//! Tokenizer for Nutmeg source text.
//!
//! The whole token table is compiled into one regex alternation. At each
//! position the first alternative that matches wins, so the order of
//! [`TOKEN_RULES`] is significant: longer operators and keywords come
//! before any shorter token that is a prefix of them, and the generic
//! identifier pattern comes last.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Mishap;
use crate::span::Span;

/// Category of a token. The parser's prefix and postfix tables are keyed
/// by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    Int,
    String,
    Bool,

    // Names, including operator names such as `+` (which carry a precedence)
    Id,

    // Declaration qualifiers and prefix forms
    Var,
    Val,
    Const,
    Annotation, // @
    Assert,

    // Syntactic infix/postfix operators
    Bind,    // :=
    Assign,  // <-
    In,      // in
    And,     // and
    Or,      // or
    Seq,     // ,
    Dot,     // .
    Discard, // ;;

    // Brackets
    LParen,
    RParen,
    LBracket,
    RBracket,

    // Punctuation
    TerminateStatement, // ;
    EndPhrase,          // :
    EndParameters,      // =>>

    // Keywords
    Def,
    EndDef,
    Lambda,
    EndLambda,
    If,
    IfNot,
    Then,
    ElseIf,
    ElseIfNot,
    Else,
    EndIf,
    EndIfNot,
    For,
    Do,
    EndFor,
    End,
}

/// A single classified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// Raw lexeme, a slice of the source.
    pub text: &'src str,
    /// Infix/postfix precedence; lower binds tighter. `None` means the
    /// token cannot extend an expression.
    pub precedence: Option<u32>,
    /// May begin an expression.
    pub prefixer: bool,
    /// Opens a construct that is read to its closer regardless of newlines.
    pub outfixer: bool,
    /// At least one newline separates this token from the previous one.
    pub follows_newline: bool,
    pub span: Span,
}

impl<'src> Token<'src> {
    pub fn is_postfixer(&self) -> bool {
        self.precedence.is_some()
    }

    pub fn is_prefixer_only(&self) -> bool {
        self.prefixer && !self.is_postfixer()
    }

    pub fn is_postfixer_only(&self) -> bool {
        self.is_postfixer() && !self.prefixer
    }

    /// The string denoted by a string token: the delimiters are stripped,
    /// escapes are left as written.
    pub fn literal_string(&self) -> &'src str {
        let text = self.text;
        if text.len() >= 6 && (text.starts_with("\"\"\"") || text.starts_with("'''")) {
            &text[3..text.len() - 3]
        } else if text.len() >= 2 {
            &text[1..text.len() - 1]
        } else {
            text
        }
    }

    pub fn int_value(&self) -> Result<i64, Mishap> {
        parse_int_literal(self.text).ok_or_else(|| {
            Mishap::lexical("Integer literal out of range")
                .culprit("token", self.text)
                .culprit("position", self.span)
        })
    }
}

/// Parses decimal, `0x` hexadecimal and `0b` binary literals with an
/// optional sign and `_` digit separators.
pub fn parse_int_literal(text: &str) -> Option<i64> {
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let digits: String = body.chars().filter(|ch| *ch != '_').collect();
    let hex = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"));
    let (radix, digits) = if let Some(hex) = hex {
        (16, hex)
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (2, bin)
    } else {
        (10, digits.as_str())
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    i64::try_from(if negative { -magnitude } else { magnitude }).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Token(TokenKind),
    Whitespace,
    LineComment,
    BlockComment,
}

/// One entry of the token table. Patterns must not contain capturing
/// groups: rule `i` is captured as group `i + 1` of the combined regex.
struct TokenRule {
    pattern: &'static str,
    lexeme: Lexeme,
    precedence: Option<u32>,
    prefixer: bool,
    outfixer: bool,
}

const fn skip(pattern: &'static str, lexeme: Lexeme) -> TokenRule {
    TokenRule {
        pattern,
        lexeme,
        precedence: None,
        prefixer: false,
        outfixer: false,
    }
}

const fn prefix(pattern: &'static str, kind: TokenKind) -> TokenRule {
    TokenRule {
        pattern,
        lexeme: Lexeme::Token(kind),
        precedence: None,
        prefixer: true,
        outfixer: false,
    }
}

const fn opener(pattern: &'static str, kind: TokenKind) -> TokenRule {
    TokenRule {
        pattern,
        lexeme: Lexeme::Token(kind),
        precedence: None,
        prefixer: true,
        outfixer: true,
    }
}

const fn operator(pattern: &'static str, precedence: u32) -> TokenRule {
    TokenRule {
        pattern,
        lexeme: Lexeme::Token(TokenKind::Id),
        precedence: Some(precedence),
        prefixer: true,
        outfixer: false,
    }
}

const fn infix(pattern: &'static str, kind: TokenKind, precedence: u32) -> TokenRule {
    TokenRule {
        pattern,
        lexeme: Lexeme::Token(kind),
        precedence: Some(precedence),
        prefixer: false,
        outfixer: false,
    }
}

const fn punctuation(pattern: &'static str, kind: TokenKind) -> TokenRule {
    TokenRule {
        pattern,
        lexeme: Lexeme::Token(kind),
        precedence: None,
        prefixer: false,
        outfixer: false,
    }
}

const TOKEN_RULES: &[TokenRule] = &[
    skip(r"\s+", Lexeme::Whitespace),
    skip(r"###[^\n]*", Lexeme::LineComment),
    skip(r"##\(", Lexeme::BlockComment),
    // literal constants
    prefix(r#""""(?s:.*?)""""#, TokenKind::String),
    prefix(r"'''(?s:.*?)'''", TokenKind::String),
    prefix(r#""[^\n"]*""#, TokenKind::String),
    prefix(r"'[^\n']*'", TokenKind::String),
    prefix(r"[+-]?0[xX][0-9A-Fa-f_]+\b", TokenKind::Int),
    prefix(r"[+-]?0[bB][01_]+\b", TokenKind::Int),
    prefix(r"[+-]?[1-9][0-9_]*\b", TokenKind::Int),
    prefix(r"[+-]?0\b", TokenKind::Int),
    prefix(r"(?:true|false)\b", TokenKind::Bool),
    // operators
    infix(r":=", TokenKind::Bind, 990),
    infix(r"<-", TokenKind::Assign, 990),
    punctuation(r"=>>", TokenKind::EndParameters),
    operator(r"<=", 590),
    operator(r">=", 590),
    operator(r"==", 600),
    operator(r"!=", 600),
    operator(r"<", 590),
    operator(r">", 590),
    operator(r"\+", 190),
    operator(r"-", 190),
    operator(r"\*", 180),
    operator(r"/", 180),
    operator(r"\.\.<", 300),
    operator(r"\.\.\.", 300),
    infix(r"\.", TokenKind::Dot, 20),
    infix(r";;", TokenKind::Discard, 1100),
    punctuation(r";", TokenKind::TerminateStatement),
    punctuation(r":", TokenKind::EndPhrase),
    infix(r",", TokenKind::Seq, 1000),
    TokenRule {
        pattern: r"\(",
        lexeme: Lexeme::Token(TokenKind::LParen),
        precedence: Some(10),
        prefixer: true,
        outfixer: true,
    },
    punctuation(r"\)", TokenKind::RParen),
    opener(r"\[", TokenKind::LBracket),
    punctuation(r"\]", TokenKind::RBracket),
    prefix(r"@", TokenKind::Annotation),
    // keywords; every end... form precedes plain `end`
    punctuation(r"enddef\b", TokenKind::EndDef),
    punctuation(r"endlambda\b", TokenKind::EndLambda),
    punctuation(r"endifnot\b", TokenKind::EndIfNot),
    punctuation(r"endif\b", TokenKind::EndIf),
    punctuation(r"endfor\b", TokenKind::EndFor),
    punctuation(r"end\b", TokenKind::End),
    punctuation(r"elseifnot\b", TokenKind::ElseIfNot),
    punctuation(r"elseif\b", TokenKind::ElseIf),
    punctuation(r"else\b", TokenKind::Else),
    opener(r"ifnot\b", TokenKind::IfNot),
    opener(r"if\b", TokenKind::If),
    punctuation(r"then\b", TokenKind::Then),
    opener(r"def\b", TokenKind::Def),
    opener(r"lambda\b", TokenKind::Lambda),
    opener(r"for\b", TokenKind::For),
    punctuation(r"do\b", TokenKind::Do),
    infix(r"in\b", TokenKind::In, 995),
    infix(r"and\b", TokenKind::And, 700),
    infix(r"or\b", TokenKind::Or, 800),
    prefix(r"var\b", TokenKind::Var),
    prefix(r"val\b", TokenKind::Val),
    prefix(r"const\b", TokenKind::Const),
    prefix(r"assert\b", TokenKind::Assert),
    // identifiers; must come after every keyword
    prefix(r"[A-Za-z_]\w*", TokenKind::Id),
];

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = TOKEN_RULES
        .iter()
        .map(|rule| format!("({})", rule.pattern))
        .collect();
    Regex::new(&format!(r"\A(?:{})", alternatives.join("|"))).expect("token table is a valid regex")
});

static COMMENT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"##[()]").expect("comment marker is a valid regex"));

/// Lazily tokenizes `text`. Whitespace and comments are discarded.
pub fn tokenize(text: &str) -> Tokenizer<'_> {
    Tokenizer::new(text)
}

/// Iterator over the tokens of a source string.
///
/// Yields at most one error, after which iteration ends.
#[derive(Debug, Clone)]
pub struct Tokenizer<'src> {
    text: &'src str,
    position: usize,
    line: u32,
    line_start: usize,
    newline_pending: bool,
    failed: bool,
}

impl<'src> Tokenizer<'src> {
    pub fn new(text: &'src str) -> Self {
        Tokenizer {
            text,
            position: 0,
            line: 1,
            line_start: 0,
            newline_pending: false,
            failed: false,
        }
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span::new(start, end, self.line, (start - self.line_start + 1) as u32)
    }

    /// Moves to `end`, keeping line bookkeeping current. Returns whether a
    /// newline was crossed.
    fn advance_to(&mut self, end: usize) -> bool {
        let skipped = &self.text[self.position..end];
        let mut saw_newline = false;
        for (offset, _) in skipped.match_indices('\n') {
            saw_newline = true;
            self.line += 1;
            self.line_start = self.position + offset + 1;
        }
        self.position = end;
        saw_newline
    }

    /// Skips a block comment whose opening marker has been consumed.
    fn skip_block_comment(&mut self, opened_at: Span) -> Result<bool, Mishap> {
        let mut depth = 1usize;
        let mut saw_newline = false;
        while depth > 0 {
            let Some(marker) = COMMENT_MARKER.find_at(self.text, self.position) else {
                return Err(Mishap::lexical("Multi-line comment not terminated properly")
                    .culprit("position", opened_at));
            };
            saw_newline |= self.advance_to(marker.end());
            if marker.as_str() == "##(" {
                depth += 1;
            } else {
                depth -= 1;
            }
        }
        Ok(saw_newline)
    }

    fn unmatched(&self) -> Mishap {
        let rest = &self.text[self.position..];
        let snippet = rest.split('\n').next().unwrap_or(rest);
        Mishap::lexical("Cannot tokenise past this point")
            .culprit("text", snippet)
            .culprit("position", self.span(self.position, self.position))
    }
}

impl<'src> Iterator for Tokenizer<'src> {
    type Item = Result<Token<'src>, Mishap>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.position < self.text.len() {
            let rest = &self.text[self.position..];
            let matched = TOKEN_REGEX.captures(rest).and_then(|captures| {
                captures
                    .iter()
                    .skip(1)
                    .enumerate()
                    .find_map(|(index, group)| group.map(|group| (index, group.end())))
            });
            let Some((index, length)) = matched.filter(|(_, length)| *length > 0) else {
                self.failed = true;
                return Some(Err(self.unmatched()));
            };

            let rule = &TOKEN_RULES[index];
            let start = self.position;
            let end = start + length;
            let span = self.span(start, end);
            let saw_newline = self.advance_to(end);

            match rule.lexeme {
                Lexeme::Whitespace | Lexeme::LineComment => {
                    self.newline_pending |= saw_newline;
                }
                Lexeme::BlockComment => match self.skip_block_comment(span) {
                    Ok(inside) => self.newline_pending |= inside,
                    Err(mishap) => {
                        self.failed = true;
                        return Some(Err(mishap));
                    }
                },
                Lexeme::Token(kind) => {
                    let postfix_only = rule.precedence.is_some() && !rule.prefixer;
                    let token = Token {
                        kind,
                        text: &self.text[start..end],
                        precedence: rule.precedence,
                        prefixer: rule.prefixer,
                        outfixer: rule.outfixer,
                        follows_newline: self.newline_pending && !postfix_only,
                        span,
                    };
                    self.newline_pending = false;
                    return Some(Ok(token));
                }
            }
        }
        None
    }
}
