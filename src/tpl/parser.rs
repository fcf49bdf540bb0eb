use crate::Result;
use crate::data::value::Value;
use crate::error::{Position, TemplateError};
use crate::options::Options;
use crate::tpl::ast::{Expr, Node, Op, Path, Segment};
use crate::tpl::lexer::{Lexer, Symbol, Token, TokenKind};
use crate::tpl::tags;
use std::iter::Peekable;

/// A block-closing or intermediate tag (`endif`, `else`, `when`, ...) that
/// ended a body. Its remaining tokens are still unread.
pub(crate) struct EndTag<'a> {
    pub name: &'a str,
    pub position: Position,
}

/// A hand-written recursive-descent parser over the lexer's token stream.
///
/// Tags are dispatched by name through the tag registry in `tags`; block
/// tags recurse back into [`Parser::parse_block_body`] until their close tag
/// is found at the same nesting depth. Depth is counted explicitly and bounded
/// by [`Options::max_depth`].
pub struct Parser<'a> {
    tokens: Peekable<Lexer<'a>>,
    options: Options,
    depth: usize,
    /// Position of the most recently consumed token, used for errors at EOF.
    position: Position,
}

/// Main entry point: parse a token stream into a root `Node::Block`.
pub fn parse_tokens(tokens: Lexer<'_>, options: &Options) -> Result<Node> {
    Parser::new(tokens, options).parse()
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Lexer<'a>, options: &Options) -> Self {
        Self {
            tokens: tokens.peekable(),
            options: *options,
            depth: 0,
            position: Position::new(1, 1),
        }
    }

    /// Parses the entire template. The first error stops parsing.
    pub fn parse(mut self) -> Result<Node> {
        let (nodes, _) = self.parse_body(&[])?;
        Ok(Node::Block(nodes))
    }

    /* ------------------------------ token access ---------------------------- */

    fn peek(&mut self) -> Result<Option<&Token<'a>>> {
        if let Some(Err(e)) = self.tokens.next_if(|t| t.is_err()) {
            return Err(e);
        }
        Ok(self.tokens.peek().and_then(|t| t.as_ref().ok()))
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind<'a>>> {
        Ok(self.peek()?.map(|t| t.kind.clone()))
    }

    fn bump(&mut self) -> Result<Option<Token<'a>>> {
        let token = self.tokens.next().transpose()?;
        if let Some(t) = &token {
            self.position = t.position;
        }
        Ok(token)
    }

    fn unexpected(&self, expected: &str, found: Option<Token<'a>>) -> TemplateError {
        match found {
            Some(t) => {
                TemplateError::parse(format!("expected {}, found '{}'", expected, t.raw), t.position)
            }
            None => TemplateError::parse(
                format!("expected {}, found end of template", expected),
                self.position,
            ),
        }
    }

    pub(crate) fn eat_symbol(&mut self, symbol: Symbol) -> Result<bool> {
        if self.peek_kind()? == Some(TokenKind::Symbol(symbol)) {
            self.bump()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> Result<bool> {
        if matches!(self.peek_kind()?, Some(TokenKind::Ident(s)) if s == keyword) {
            self.bump()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn expect_symbol(&mut self, symbol: Symbol, expected: &str) -> Result<()> {
        match self.bump()? {
            Some(Token {
                kind: TokenKind::Symbol(s),
                ..
            }) if s == symbol => Ok(()),
            other => Err(self.unexpected(expected, other)),
        }
    }

    pub(crate) fn expect_ident(&mut self, expected: &str) -> Result<&'a str> {
        match self.bump()? {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => Ok(name),
            other => Err(self.unexpected(expected, other)),
        }
    }

    /// An identifier or a quoted name (`capture 'x'`).
    pub(crate) fn expect_name(&mut self, expected: &str) -> Result<&'a str> {
        match self.bump()? {
            Some(Token {
                kind: TokenKind::Ident(name) | TokenKind::Str(name),
                ..
            }) => Ok(name),
            other => Err(self.unexpected(expected, other)),
        }
    }

    pub(crate) fn expect_tag_close(&mut self) -> Result<()> {
        match self.bump()? {
            Some(Token {
                kind: TokenKind::TagClose,
                ..
            }) => Ok(()),
            other => Err(self.unexpected("'%}'", other)),
        }
    }

    pub(crate) fn at_tag_close(&mut self) -> Result<bool> {
        Ok(matches!(self.peek_kind()?, Some(TokenKind::TagClose)))
    }

    pub(crate) fn position(&self) -> Position {
        self.position
    }

    /* ------------------------------- nesting -------------------------------- */

    fn enter(&mut self, position: Position) -> Result<()> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(TemplateError::parse(
                format!("nesting exceeds the maximum depth of {}", self.options.max_depth),
                position,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /* -------------------------------- bodies -------------------------------- */

    /// Parses nodes until end of input or until a tag named in `end_tags`.
    fn parse_body(&mut self, end_tags: &[&str]) -> Result<(Vec<Node>, Option<EndTag<'a>>)> {
        let mut nodes = Vec::new();
        while let Some(token) = self.bump()? {
            match token.kind {
                TokenKind::Text(text) => append_text(&mut nodes, text),
                TokenKind::OutputOpen => {
                    let expr = self.parse_expression()?;
                    match self.bump()? {
                        Some(Token {
                            kind: TokenKind::OutputClose,
                            ..
                        }) => {}
                        other => return Err(self.unexpected("'}}'", other)),
                    }
                    nodes.push(Node::Output(expr));
                }
                TokenKind::TagOpen => {
                    let position = token.position;
                    let name = self.expect_ident("tag name")?;
                    if end_tags.contains(&name) {
                        return Ok((nodes, Some(EndTag { name, position })));
                    }
                    match tags::lookup(name) {
                        Some(parse_tag) => match parse_tag(self, position)? {
                            Node::Text(text) => append_text(&mut nodes, &text),
                            node => nodes.push(node),
                        },
                        None if tags::is_closing(name) => {
                            return Err(TemplateError::parse(
                                format!("unexpected tag '{}'", name),
                                position,
                            ));
                        }
                        None => {
                            return Err(TemplateError::parse(
                                format!("unknown tag '{}'", name),
                                position,
                            ));
                        }
                    }
                }
                _ => return Err(self.unexpected("text, '{{' or '{%'", Some(token))),
            }
        }
        Ok((nodes, None))
    }

    /// Parses the body of block tag `tag` (opened at `opened`) up to one of
    /// `end_tags`. Reaching end of input first is an error.
    pub(crate) fn parse_block_body(
        &mut self,
        tag: &str,
        opened: Position,
        end_tags: &[&str],
    ) -> Result<(Vec<Node>, EndTag<'a>)> {
        self.enter(opened)?;
        let (nodes, end) = self.parse_body(end_tags)?;
        self.leave();
        match end {
            Some(end) => Ok((nodes, end)),
            None => Err(TemplateError::parse(
                format!("'{}' tag was never closed", tag),
                opened,
            )),
        }
    }

    /* ------------------------------ expressions ----------------------------- */

    /// `logical ( '|' filter ( ':' primary ( ',' primary )* )? )*`
    pub(crate) fn parse_expression(&mut self) -> Result<Expr> {
        let mut expr = self.parse_logical()?;
        let mut chained = 0;
        while self.eat_symbol(Symbol::Pipe)? {
            self.check_chain(&mut chained)?;
            let name = self.expect_ident("filter name")?.to_string();
            let mut args = Vec::new();
            if self.eat_symbol(Symbol::Colon)? {
                loop {
                    args.push(self.parse_primary()?);
                    if !self.eat_symbol(Symbol::Comma)? {
                        break;
                    }
                }
            }
            expr = Expr::Filter {
                base: Box::new(expr),
                name,
                args,
            };
        }
        Ok(expr)
    }

    /// Chains of operators build left-deep trees; bound their length like nesting.
    fn check_chain(&self, chained: &mut usize) -> Result<()> {
        *chained += 1;
        if *chained > self.options.max_depth {
            return Err(TemplateError::parse(
                format!(
                    "expression chains more than {} operators",
                    self.options.max_depth
                ),
                self.position,
            ));
        }
        Ok(())
    }

    /// `and ( 'or' and )*`
    pub(crate) fn parse_logical(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        let mut chained = 0;
        while self.eat_keyword("or")? {
            self.check_chain(&mut chained)?;
            let right = self.parse_and()?;
            expr = Expr::Binary(Op::Or, Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_comparison()?;
        let mut chained = 0;
        while self.eat_keyword("and")? {
            self.check_chain(&mut chained)?;
            let right = self.parse_comparison()?;
            expr = Expr::Binary(Op::And, Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        let mut chained = 0;
        loop {
            let op = match self.peek_kind()? {
                Some(TokenKind::Symbol(Symbol::Eq)) => Op::Eq,
                Some(TokenKind::Symbol(Symbol::Ne)) => Op::Ne,
                Some(TokenKind::Symbol(Symbol::Lt)) => Op::Lt,
                Some(TokenKind::Symbol(Symbol::Gt)) => Op::Gt,
                Some(TokenKind::Symbol(Symbol::Le)) => Op::Le,
                Some(TokenKind::Symbol(Symbol::Ge)) => Op::Ge,
                Some(TokenKind::Ident("contains")) => Op::Contains,
                _ => return Ok(expr),
            };
            self.bump()?;
            self.check_chain(&mut chained)?;
            let right = self.parse_primary()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(right));
        }
    }

    /// Literals, `(a..b)` ranges and variable paths.
    pub(crate) fn parse_primary(&mut self) -> Result<Expr> {
        let Some(token) = self.bump()? else {
            return Err(self.unexpected("expression", None));
        };
        match token.kind {
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Str(s.to_string()))),
            TokenKind::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            TokenKind::Float(n) => Ok(Expr::Literal(Value::Float(n))),
            TokenKind::Symbol(Symbol::LParen) => {
                self.enter(token.position)?;
                let start = self.parse_primary()?;
                self.expect_symbol(Symbol::DotDot, "'..'")?;
                let end = self.parse_primary()?;
                self.expect_symbol(Symbol::RParen, "')'")?;
                self.leave();
                Ok(Expr::Range(Box::new(start), Box::new(end)))
            }
            TokenKind::Ident("true") => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::Ident("false") => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Ident("nil" | "null") => Ok(Expr::Literal(Value::Nil)),
            TokenKind::Ident(name) => self.parse_path(name.to_string()).map(Expr::Var),
            _ => Err(self.unexpected("expression", Some(token))),
        }
    }

    fn parse_path(&mut self, root: String) -> Result<Path> {
        let mut path = Path::new(root);
        loop {
            if self.eat_symbol(Symbol::Dot)? {
                match self.bump()? {
                    Some(Token {
                        kind: TokenKind::Ident(key),
                        ..
                    }) => path.segments.push(Segment::Key(key.to_string())),
                    Some(Token {
                        kind: TokenKind::Int(n),
                        ..
                    }) => path.segments.push(Segment::Index(n)),
                    other => return Err(self.unexpected("property name", other)),
                }
            } else if self.eat_symbol(Symbol::LBracket)? {
                let position = self.position;
                self.enter(position)?;
                let index = self.parse_expression()?;
                self.leave();
                let segment = match index {
                    Expr::Literal(Value::Int(n)) => Segment::Index(n),
                    Expr::Literal(Value::Str(s)) => Segment::Key(s),
                    expr => Segment::Dynamic(Box::new(expr)),
                };
                self.expect_symbol(Symbol::RBracket, "']'")?;
                path.segments.push(segment);
            } else {
                return Ok(path);
            }
        }
    }
}

/// Append text, merging with the previous text node when possible.
fn append_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tpl::lexer::tokenize;

    fn parse(src: &str) -> Result<Vec<Node>> {
        match parse_tokens(tokenize(src), &Options::default())? {
            Node::Block(nodes) => Ok(nodes),
            other => panic!("Expected Block, got {:?}", other),
        }
    }

    fn var(name: &str) -> Expr {
        Expr::Var(Path::new(name))
    }

    #[test]
    fn test_parse_simple_text() {
        let nodes = parse("hello world").unwrap();
        assert_eq!(nodes, vec![Node::Text("hello world".to_string())]);
    }

    #[test]
    fn test_parse_output() {
        let nodes = parse("hello {{ name }}!").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1], Node::Output(var("name")));
    }

    #[test]
    fn test_parse_path_segments() {
        let nodes = parse("{{ a.b[0]['c d'][k] }}").unwrap();
        match &nodes[0] {
            Node::Output(Expr::Var(path)) => {
                assert_eq!(path.root, "a");
                assert_eq!(
                    path.segments,
                    vec![
                        Segment::Key("b".to_string()),
                        Segment::Index(0),
                        Segment::Key("c d".to_string()),
                        Segment::Dynamic(Box::new(var("k"))),
                    ]
                );
            }
            other => panic!("Expected Var output, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let nodes = parse("{% if a or b and c == 1 %}x{% endif %}").unwrap();
        match &nodes[0] {
            Node::If { condition, .. } => match condition {
                Expr::Binary(Op::Or, left, right) => {
                    assert_eq!(**left, var("a"));
                    match &**right {
                        Expr::Binary(Op::And, _, cmp) => {
                            assert!(matches!(**cmp, Expr::Binary(Op::Eq, _, _)))
                        }
                        other => panic!("Expected And, got {:?}", other),
                    }
                }
                other => panic!("Expected Or, got {:?}", other),
            },
            other => panic!("Expected If, got {:?}", other),
        }
    }

    #[test]
    fn test_filters_are_left_to_right() {
        let nodes = parse("{{ x | f1 | f2: 1, 'a' }}").unwrap();
        match &nodes[0] {
            Node::Output(Expr::Filter { base, name, args }) => {
                assert_eq!(name, "f2");
                assert_eq!(
                    args,
                    &vec![
                        Expr::Literal(Value::Int(1)),
                        Expr::Literal(Value::Str("a".to_string()))
                    ]
                );
                assert!(matches!(&**base, Expr::Filter { name, .. } if name == "f1"));
            }
            other => panic!("Expected Filter, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_if_matches_inner_endif_first() {
        let nodes = parse("{% if a %}1{% if b %}2{% endif %}3{% endif %}").unwrap();
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::If { then_branch, .. } => {
                assert_eq!(then_branch.len(), 3);
                assert!(matches!(then_branch[1], Node::If { .. }));
            }
            other => panic!("Expected If, got {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_block_is_error() {
        let err = parse("{% if x %}content").unwrap_err();
        match err {
            TemplateError::Parse { message, position } => {
                assert!(message.contains("never closed"), "{}", message);
                assert_eq!(position, Position::new(1, 1));
            }
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_unexpected_tags() {
        let err = parse("{% frobnicate %}").unwrap_err();
        assert!(err.to_string().contains("unknown tag 'frobnicate'"));

        let err = parse("a {% endif %}").unwrap_err();
        assert!(err.to_string().contains("unexpected tag 'endif'"));

        let err = parse("{% for x in xs %}{% endif %}").unwrap_err();
        assert!(err.to_string().contains("unexpected tag 'endif'"));
    }

    #[test]
    fn test_malformed_expression() {
        assert!(matches!(parse("{{ }}"), Err(TemplateError::Parse { .. })));
        assert!(matches!(parse("{{ a == }}"), Err(TemplateError::Parse { .. })));
        assert!(matches!(parse("{{ a b }}"), Err(TemplateError::Parse { .. })));
        assert!(matches!(parse("{{ x | }}"), Err(TemplateError::Parse { .. })));
    }

    #[test]
    fn test_lex_error_propagates() {
        assert!(matches!(parse("{{ unterminated"), Err(TemplateError::Lex { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let options = Options::default().max_depth(3);
        let src = "{% if a %}{% if a %}{% if a %}{% if a %}x{% endif %}{% endif %}{% endif %}{% endif %}";
        let err = parse_tokens(tokenize(src), &options).unwrap_err();
        assert!(err.to_string().contains("maximum depth"));

        let src = "{% if a %}{% if a %}x{% endif %}{% endif %}";
        assert!(parse_tokens(tokenize(src), &options).is_ok());
    }

    #[test]
    fn test_nested_ranges_and_indexes_count_as_depth() {
        let options = Options::default().max_depth(3);
        assert!(parse_tokens(tokenize("{{ ((1..2)..3) }}"), &options).is_ok());
        let err = parse_tokens(tokenize("{{ ((((1..2)..3)..4)..5) }}"), &options).unwrap_err();
        assert!(err.to_string().contains("maximum depth"));

        assert!(parse_tokens(tokenize("{{ a[b[c]] }}"), &options).is_ok());
        let err = parse_tokens(tokenize("{{ a[b[c[d[e]]]] }}"), &options).unwrap_err();
        assert!(err.to_string().contains("maximum depth"));
    }

    #[test]
    fn test_operator_chain_limit() {
        let options = Options::default().max_depth(4);
        let src = format!("{{{{ a{} }}}}", " or a".repeat(10));
        assert!(parse_tokens(tokenize(&src), &options).is_err());
    }
}
