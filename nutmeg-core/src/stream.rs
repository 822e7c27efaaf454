//! Token stream with lookahead and push-back for the parser.

use crate::error::Mishap;
use crate::lexer::{Token, TokenKind, Tokenizer};
use crate::span::Span;

/// Pulls tokens lazily from a [`Tokenizer`].
///
/// Tokens handed back with [`TokenStream::push`] are returned again, most
/// recent first, before any new input is read. Tokenizer failures surface
/// from whichever call first needs the failing token.
pub struct TokenStream<'src> {
    tokens: Tokenizer<'src>,
    pushed: Vec<Token<'src>>,
    /// Span of the last token popped, for end-of-input diagnostics.
    last: Span,
}

impl<'src> TokenStream<'src> {
    pub fn new(tokens: Tokenizer<'src>) -> Self {
        Self {
            tokens,
            pushed: Vec::new(),
            last: Span::default(),
        }
    }

    fn fill(&mut self) -> Result<bool, Mishap> {
        if !self.pushed.is_empty() {
            return Ok(true);
        }
        match self.tokens.next().transpose()? {
            Some(token) => {
                self.pushed.push(token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek(&mut self) -> Result<Option<&Token<'src>>, Mishap> {
        self.fill()?;
        Ok(self.pushed.last())
    }

    /// Consume the next token.
    pub fn pop(&mut self) -> Result<Option<Token<'src>>, Mishap> {
        self.fill()?;
        let token = self.pushed.pop();
        if let Some(token) = &token {
            self.last = token.span;
        }
        Ok(token)
    }

    /// Return a token to the front of the stream.
    pub fn push(&mut self, token: Token<'src>) {
        self.pushed.push(token);
    }

    pub fn is_empty(&mut self) -> Result<bool, Mishap> {
        Ok(!self.fill()?)
    }

    /// Consume the next token if it has the given kind.
    pub fn pop_if(&mut self, kind: TokenKind) -> Result<Option<Token<'src>>, Mishap> {
        let found = matches!(self.peek()?, Some(token) if token.kind == kind);
        if found { self.pop() } else { Ok(None) }
    }

    /// Consume the next token if it has one of the given kinds.
    pub fn pop_if_any(&mut self, kinds: &[TokenKind]) -> Result<Option<Token<'src>>, Mishap> {
        let found = matches!(self.peek()?, Some(token) if kinds.contains(&token.kind));
        if found { self.pop() } else { Ok(None) }
    }

    pub fn last_span(&self) -> Span {
        self.last
    }
}
