//! XPath 1.0 subset over scraper's element tree
//!
//! Supports location paths over the child, descendant, self, parent,
//! ancestor, sibling and attribute axes, predicates, comparisons, boolean and
//! additive operators, unions and the core string and node-set functions.
//! Expressions are compiled once and evaluated with the selector's context
//! element as `.`.

use std::cell::OnceCell;
use std::collections::HashMap;

use scraper::{ElementRef, Node};
use thiserror::Error;
use tracing::debug;

use super::Scope;

/// XPath compile failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct XPathError {
    pub offset: usize,
    pub message: String,
}

impl XPathError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Path(Path),
    /// Primary expression with predicates and trailing steps: `(//a)[1]/b`
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Path {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

impl Step {
    fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }

    /// The expansion of `//`
    fn descendant_or_self() -> Self {
        Self::new(Axis::DescendantOrSelf, NodeTest::Node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfNode,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Attribute,
}

impl Axis {
    fn is_forward(self) -> bool {
        !matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling
        )
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfNode,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    /// `*`: any element, or any attribute on the attribute axis
    Any,
    Name(String),
    Text,
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Last,
    Position,
    Count,
    Contains,
    StartsWith,
    NormalizeSpace,
    Not,
    Boolean,
    True,
    False,
    String,
    StringLength,
    Number,
    Concat,
    Name,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "last" => Function::Last,
            "position" => Function::Position,
            "count" => Function::Count,
            "contains" => Function::Contains,
            "starts-with" => Function::StartsWith,
            "normalize-space" => Function::NormalizeSpace,
            "not" => Function::Not,
            "boolean" => Function::Boolean,
            "true" => Function::True,
            "false" => Function::False,
            "string" => Function::String,
            "string-length" => Function::StringLength,
            "number" => Function::Number,
            "concat" => Function::Concat,
            "name" | "local-name" => Function::Name,
            _ => return None,
        })
    }

    /// Accepted argument counts, `None` meaning unbounded
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Last | Function::Position | Function::True | Function::False => (0, Some(0)),
            Function::Count | Function::Not | Function::Boolean => (1, Some(1)),
            Function::Contains | Function::StartsWith => (2, Some(2)),
            Function::NormalizeSpace
            | Function::String
            | Function::StringLength
            | Function::Number
            | Function::Name => (0, Some(1)),
            Function::Concat => (2, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    ColonColon,
    Star,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Literal(String),
    Number(f64),
    Name(String),
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, XPathError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, ch)| ch);

        let (token, width) = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => (Token::DoubleSlash, 2),
            '/' => (Token::Slash, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '@' => (Token::At, 1),
            ',' => (Token::Comma, 1),
            '|' => (Token::Pipe, 1),
            '*' => (Token::Star, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '=' => (Token::Eq, 1),
            '!' if next == Some('=') => (Token::Ne, 2),
            '<' if next == Some('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if next == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            ':' if next == Some(':') => (Token::ColonColon, 2),
            '.' if next == Some('.') => (Token::DotDot, 2),
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => scan_number(&chars, i)?,
            '.' => (Token::Dot, 1),
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&(_, ch)| ch == c)
                    .ok_or_else(|| XPathError::new(offset, "unterminated string literal"))?;
                let text: String = chars[i + 1..i + 1 + end].iter().map(|&(_, ch)| ch).collect();
                (Token::Literal(text), end + 2)
            }
            c if c.is_ascii_digit() => scan_number(&chars, i)?,
            c if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|&&(_, ch)| ch.is_alphanumeric() || ch == '-' || ch == '_')
                    .count();
                let name: String = chars[i..i + len].iter().map(|&(_, ch)| ch).collect();
                (Token::Name(name), len)
            }
            other => {
                return Err(XPathError::new(
                    offset,
                    format!("unexpected character `{other}`"),
                ))
            }
        };

        tokens.push((offset, token));
        i += width;
    }

    Ok(tokens)
}

fn scan_number(chars: &[(usize, char)], start: usize) -> Result<(Token, usize), XPathError> {
    let len = chars[start..]
        .iter()
        .take_while(|&&(_, ch)| ch.is_ascii_digit() || ch == '.')
        .count();
    let text: String = chars[start..start + len].iter().map(|&(_, ch)| ch).collect();
    let value = text
        .parse::<f64>()
        .map_err(|_| XPathError::new(chars[start].0, format!("invalid number `{text}`")))?;
    Ok((Token::Number(value), len))
}

/// Compile an expression
pub(crate) fn compile(source: &str) -> Result<Expr, XPathError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(XPathError::new(0, "empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// Compile an expression used as a selector. Results that can only be
/// attributes, text or scalars are rejected.
pub(crate) fn compile_selector(source: &str) -> Result<Expr, XPathError> {
    let expr = compile(source)?;
    if expr.selects_elements() {
        Ok(expr)
    } else {
        Err(XPathError::new(0, "expression does not select elements"))
    }
}

impl Expr {
    fn selects_elements(&self) -> bool {
        match self {
            Expr::Path(path) => path.steps.last().is_some_and(Step::selects_elements),
            Expr::Filter { primary, steps, .. } => match steps.last() {
                Some(step) => step.selects_elements(),
                None => primary.selects_elements(),
            },
            Expr::Union(left, right) => left.selects_elements() || right.selects_elements(),
            Expr::Literal(_)
            | Expr::Number(_)
            | Expr::Call(..)
            | Expr::Binary(..)
            | Expr::Negate(_) => false,
        }
    }
}

impl Step {
    fn selects_elements(&self) -> bool {
        self.axis != Axis::Attribute && self.test != NodeTest::Text
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(_, token)| token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |&(offset, _)| offset)
    }

    fn error(&self, message: impl Into<String>) -> XPathError {
        XPathError::new(self.offset(), message)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Name(name)) if name == keyword => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), XPathError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Binary(Box::new(left), BinaryOp::Or, Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_equality()?;
        while self.eat_keyword("and") {
            let right = self.parse_equality()?;
            left = Expr::Binary(Box::new(left), BinaryOp::And, Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_relational()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.parse_unary()?)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_path_expr(&mut self) -> Result<Expr, XPathError> {
        let starts_filter = match self.peek() {
            Some(Token::Literal(_) | Token::Number(_) | Token::LParen) => true,
            // `text()` and `node()` are node tests, every other `name(` is a call
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen) && !matches!(name.as_str(), "text" | "node")
            }
            _ => false,
        };
        if !starts_filter {
            return self.parse_location_path().map(Expr::Path);
        }

        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let steps = self.parse_trailing_steps()?;
        if predicates.is_empty() && steps.is_empty() {
            Ok(primary)
        } else {
            Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            })
        }
    }

    fn parse_location_path(&mut self) -> Result<Path, XPathError> {
        if self.eat(&Token::Slash) {
            let mut steps = Vec::new();
            if self.starts_step() {
                steps.push(self.parse_step()?);
                steps.extend(self.parse_trailing_steps()?);
            }
            return Ok(Path {
                absolute: true,
                steps,
            });
        }

        let mut steps = Vec::new();
        let absolute = self.eat(&Token::DoubleSlash);
        if absolute {
            steps.push(Step::descendant_or_self());
        }
        if !self.starts_step() {
            return Err(self.error("expected a location step"));
        }
        steps.push(self.parse_step()?);
        steps.extend(self.parse_trailing_steps()?);
        Ok(Path { absolute, steps })
    }

    fn parse_trailing_steps(&mut self) -> Result<Vec<Step>, XPathError> {
        let mut steps = Vec::new();
        loop {
            if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
            } else if !self.eat(&Token::Slash) {
                break;
            }
            steps.push(self.parse_step()?);
        }
        Ok(steps)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn parse_step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(Step::new(Axis::SelfNode, NodeTest::Node));
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step::new(Axis::Parent, NodeTest::Node));
        }

        let axis_name = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Name(name)), Some(Token::ColonColon)) => Some(name.clone()),
            _ => None,
        };
        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let Some(name) = axis_name {
            let axis = Axis::from_name(&name)
                .ok_or_else(|| self.error(format!("unknown axis `{name}`")))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, XPathError> {
        let offset = self.offset();
        match self.peek().cloned() {
            Some(Token::Star) => {
                self.pos += 1;
                Ok(NodeTest::Any)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                if !self.eat(&Token::LParen) {
                    return Ok(NodeTest::Name(name.to_ascii_lowercase()));
                }
                let test = match name.as_str() {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::Node,
                    _ => {
                        return Err(XPathError::new(
                            offset,
                            format!("`{name}()` is not a node test"),
                        ))
                    }
                };
                self.expect(Token::RParen, "`)`")?;
                Ok(test)
            }
            _ => Err(self.error("expected a node test")),
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, XPathError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket, "`]`")?;
        }
        Ok(predicates)
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        let offset = self.offset();
        match self.peek().cloned() {
            Some(Token::Literal(text)) => {
                self.pos += 1;
                Ok(Expr::Literal(text))
            }
            Some(Token::Number(value)) => {
                self.pos += 1;
                Ok(Expr::Number(value))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let expr = self.parse_or()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(expr)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                self.expect(Token::LParen, "`(`")?;

                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RParen, "`)`")?;
                        break;
                    }
                }

                let function = Function::from_name(&name)
                    .ok_or_else(|| XPathError::new(offset, format!("unknown function `{name}`")))?;
                let (min, max) = function.arity();
                if args.len() < min || max.is_some_and(|max| args.len() > max) {
                    return Err(XPathError::new(
                        offset,
                        format!("`{name}` does not take {} argument(s)", args.len()),
                    ));
                }
                Ok(Expr::Call(function, args))
            }
            _ => Err(self.error("expected an expression")),
        }
    }
}

/// A node as seen by the evaluator
#[derive(Debug, Clone, Copy)]
enum Item<'a> {
    /// The document node; holds any element of the tree to find its way back
    Root(ElementRef<'a>),
    Element(ElementRef<'a>),
    Text {
        parent: ElementRef<'a>,
        node: usize,
        text: &'a str,
    },
    Attr {
        owner: ElementRef<'a>,
        index: usize,
        name: &'a str,
        value: &'a str,
    },
}

impl<'a> Item<'a> {
    fn anchor(&self) -> ElementRef<'a> {
        match *self {
            Item::Root(anchor) | Item::Element(anchor) => anchor,
            Item::Text { parent, .. } => parent,
            Item::Attr { owner, .. } => owner,
        }
    }

    fn same(&self, other: &Item<'a>) -> bool {
        match (self, other) {
            (Item::Root(_), Item::Root(_)) => true,
            (Item::Element(a), Item::Element(b)) => a.id() == b.id(),
            (Item::Text { node: a, .. }, Item::Text { node: b, .. }) => a == b,
            (Item::Attr { owner: a, index: i, .. }, Item::Attr { owner: b, index: j, .. }) => {
                a.id() == b.id() && i == j
            }
            _ => false,
        }
    }

    fn name(&self) -> &'a str {
        match *self {
            Item::Element(element) => element.value().name(),
            Item::Attr { name, .. } => name,
            Item::Root(_) | Item::Text { .. } => "",
        }
    }

    fn string_value(&self) -> String {
        match *self {
            Item::Root(anchor) => top_level(anchor)
                .into_iter()
                .flat_map(|element| element.text())
                .collect(),
            Item::Element(element) => element.text().collect(),
            Item::Text { text, .. } => text.to_string(),
            Item::Attr { value, .. } => value.to_string(),
        }
    }

    /// Sort key from a position index. Attributes sort after their element
    /// and before its children.
    fn position(&self, positions: &Positions) -> Option<(usize, usize)> {
        match *self {
            Item::Root(anchor) => {
                let document = anchor.ancestors().last()?;
                positions.get(&node_addr(document.value())).map(|&at| (at, 0))
            }
            Item::Element(element) => positions.get(&element_addr(element)).map(|&at| (at, 0)),
            Item::Text { node, .. } => positions.get(&node).map(|&at| (at, 0)),
            Item::Attr { owner, index, .. } => positions
                .get(&element_addr(owner))
                .map(|&at| (at, index + 1)),
        }
    }
}

/// Node address -> pre-order position
type Positions = HashMap<usize, usize>;

fn node_addr(node: &Node) -> usize {
    node as *const Node as usize
}

fn element_addr(element: ElementRef<'_>) -> usize {
    node_addr((*element).value())
}

fn index_nodes<'a>(nodes: impl Iterator<Item = &'a Node>) -> Positions {
    nodes
        .enumerate()
        .map(|(at, node)| (node_addr(node), at))
        .collect()
}

/// Document order for one evaluation. Positions are indexed on first use:
/// the context's subtree first, the whole document only when a node outside
/// that subtree has to be ordered.
struct Order<'a> {
    context: Item<'a>,
    local: OnceCell<Positions>,
    global: OnceCell<Positions>,
}

impl<'a> Order<'a> {
    fn new(context: Item<'a>) -> Self {
        Self {
            context,
            local: OnceCell::new(),
            global: OnceCell::new(),
        }
    }

    /// Sort into document order and drop duplicates
    fn sort(&self, items: Vec<Item<'a>>) -> Vec<Item<'a>> {
        if items.len() < 2 {
            return items;
        }

        let local = match self.context {
            Item::Element(element) => Some(
                self.local
                    .get_or_init(|| index_nodes(element.descendants().map(|node| node.value()))),
            ),
            _ => None,
        };
        let keyed = local
            .and_then(|positions| keyed(&items, positions))
            .or_else(|| keyed(&items, self.global()));
        let Some(mut keyed) = keyed else {
            return items;
        };

        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);
        keyed.into_iter().map(|(_, item)| item).collect()
    }

    fn global(&self) -> &Positions {
        self.global.get_or_init(|| {
            let anchor = self.context.anchor();
            let document = anchor.ancestors().last().unwrap_or(*anchor);
            index_nodes(document.descendants().map(|node| node.value()))
        })
    }
}

fn keyed<'a>(items: &[Item<'a>], positions: &Positions) -> Option<Vec<((usize, usize), Item<'a>)>> {
    items
        .iter()
        .map(|item| Some((item.position(positions)?, *item)))
        .collect()
}

/// Element children of the document node
fn top_level(anchor: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let top = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .last()
        .unwrap_or(anchor);
    match top.parent() {
        Some(document) => document.children().filter_map(ElementRef::wrap).collect(),
        None => vec![top],
    }
}

fn children(item: Item<'_>) -> Vec<Item<'_>> {
    match item {
        Item::Root(anchor) => top_level(anchor).into_iter().map(Item::Element).collect(),
        Item::Element(element) => element
            .children()
            .filter_map(move |node| match ElementRef::wrap(node) {
                Some(child) => Some(Item::Element(child)),
                None => node.value().as_text().map(|text| Item::Text {
                    parent: element,
                    node: node_addr(node.value()),
                    text: &**text,
                }),
            })
            .collect(),
        Item::Text { .. } | Item::Attr { .. } => Vec::new(),
    }
}

fn descendants(item: Item<'_>) -> Vec<Item<'_>> {
    let mut out = Vec::new();
    let mut stack: Vec<Item<'_>> = children(item).into_iter().rev().collect();
    while let Some(next) = stack.pop() {
        out.push(next);
        stack.extend(children(next).into_iter().rev());
    }
    out
}

fn parent(item: Item<'_>) -> Option<Item<'_>> {
    match item {
        Item::Root(_) => None,
        Item::Element(element) => match element.parent().and_then(ElementRef::wrap) {
            Some(parent) => Some(Item::Element(parent)),
            None => Some(Item::Root(element)),
        },
        Item::Text { parent, .. } => Some(Item::Element(parent)),
        Item::Attr { owner, .. } => Some(Item::Element(owner)),
    }
}

/// Nearest first
fn ancestors(item: Item<'_>) -> Vec<Item<'_>> {
    let mut out = Vec::new();
    let mut current = parent(item);
    while let Some(next) = current {
        out.push(next);
        current = parent(next);
    }
    out
}

/// Following siblings in document order, preceding siblings nearest first
fn siblings(item: Item<'_>, following: bool) -> Vec<Item<'_>> {
    if matches!(item, Item::Root(_) | Item::Attr { .. }) {
        return Vec::new();
    }
    let Some(parent) = parent(item) else {
        return Vec::new();
    };
    let all = children(parent);
    let Some(at) = all.iter().position(|child| child.same(&item)) else {
        return Vec::new();
    };
    if following {
        all[at + 1..].to_vec()
    } else {
        all[..at].iter().rev().copied().collect()
    }
}

fn attributes(item: Item<'_>) -> Vec<Item<'_>> {
    match item {
        Item::Element(element) => element
            .value()
            .attrs()
            .enumerate()
            .map(|(index, (name, value))| Item::Attr {
                owner: element,
                index,
                name,
                value,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn axis_items(axis: Axis, item: Item<'_>) -> Vec<Item<'_>> {
    match axis {
        Axis::Child => children(item),
        Axis::Descendant => descendants(item),
        Axis::DescendantOrSelf => {
            let mut items = vec![item];
            items.extend(descendants(item));
            items
        }
        Axis::SelfNode => vec![item],
        Axis::Parent => parent(item).into_iter().collect(),
        Axis::Ancestor => ancestors(item),
        Axis::AncestorOrSelf => {
            let mut items = vec![item];
            items.extend(ancestors(item));
            items
        }
        Axis::FollowingSibling => siblings(item, true),
        Axis::PrecedingSibling => siblings(item, false),
        Axis::Attribute => attributes(item),
    }
}

impl NodeTest {
    fn matches(&self, item: &Item<'_>) -> bool {
        match (self, item) {
            (NodeTest::Node, _) => true,
            (NodeTest::Text, Item::Text { .. }) => true,
            (NodeTest::Any, Item::Element(_) | Item::Attr { .. }) => true,
            (NodeTest::Name(name), Item::Element(_) | Item::Attr { .. }) => {
                item.name().eq_ignore_ascii_case(name)
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
enum Value<'a> {
    Nodes(Vec<Item<'a>>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Value<'_> {
    fn boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn number(&self) -> f64 {
        match self {
            Value::Nodes(_) | Value::Str(_) => parse_number(&self.string()),
            Value::Num(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn string(&self) -> String {
        match self {
            Value::Nodes(nodes) => nodes.first().map(Item::string_value).unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Nodes(_) => "node-set",
            Value::Str(_) => "string",
            Value::Num(_) => "number",
            Value::Bool(_) => "boolean",
        }
    }
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[derive(Clone, Copy)]
struct Context<'o, 'a> {
    item: Item<'a>,
    position: usize,
    size: usize,
    order: &'o Order<'a>,
}

/// Evaluate `expr` in `scope`; non-element results are dropped
pub(crate) fn select<'a>(expr: &Expr, scope: impl Into<Scope<'a>>) -> Vec<ElementRef<'a>> {
    let item = match scope.into() {
        Scope::Document(root) => Item::Root(root),
        Scope::Element(element) => Item::Element(element),
    };
    let order = Order::new(item);
    let ctx = Context {
        item,
        position: 1,
        size: 1,
        order: &order,
    };
    match evaluate(expr, &ctx) {
        Value::Nodes(nodes) => nodes
            .into_iter()
            .filter_map(|item| match item {
                Item::Element(element) => Some(element),
                _ => None,
            })
            .collect(),
        other => {
            debug!(result = other.kind(), "xpath result is not a node-set");
            Vec::new()
        }
    }
}

fn evaluate<'a>(expr: &Expr, ctx: &Context<'_, 'a>) -> Value<'a> {
    match expr {
        Expr::Literal(text) => Value::Str(text.clone()),
        Expr::Number(n) => Value::Num(*n),
        Expr::Path(path) => {
            let start = if path.absolute {
                Item::Root(ctx.item.anchor())
            } else {
                ctx.item
            };
            Value::Nodes(apply_steps(vec![start], &path.steps, ctx.order))
        }
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            let Value::Nodes(mut nodes) = evaluate(primary, ctx) else {
                return Value::Nodes(Vec::new());
            };
            for predicate in predicates {
                nodes = filter(nodes, predicate, ctx.order);
            }
            Value::Nodes(apply_steps(nodes, steps, ctx.order))
        }
        Expr::Negate(inner) => Value::Num(-evaluate(inner, ctx).number()),
        Expr::Union(left, right) => match (evaluate(left, ctx), evaluate(right, ctx)) {
            (Value::Nodes(mut a), Value::Nodes(b)) => {
                a.extend(b);
                Value::Nodes(ctx.order.sort(a))
            }
            _ => Value::Nodes(Vec::new()),
        },
        Expr::Binary(left, op, right) => binary(left, *op, right, ctx),
        Expr::Call(function, args) => call(*function, args, ctx),
    }
}

fn apply_steps<'a>(mut nodes: Vec<Item<'a>>, steps: &[Step], order: &Order<'a>) -> Vec<Item<'a>> {
    for step in steps {
        let mut next = Vec::new();
        for node in &nodes {
            let mut selected: Vec<Item<'a>> = axis_items(step.axis, *node)
                .into_iter()
                .filter(|candidate| step.test.matches(candidate))
                .collect();
            for predicate in &step.predicates {
                selected = filter(selected, predicate, order);
            }
            next.extend(selected);
        }
        // one context on a forward axis is already in document order
        nodes = if nodes.len() == 1 && step.axis.is_forward() {
            next
        } else {
            order.sort(next)
        };
    }
    nodes
}

fn filter<'a>(nodes: Vec<Item<'a>>, predicate: &Expr, order: &Order<'a>) -> Vec<Item<'a>> {
    let size = nodes.len();
    nodes
        .into_iter()
        .enumerate()
        .filter(|&(index, item)| {
            let ctx = Context {
                item,
                position: index + 1,
                size,
                order,
            };
            match evaluate(predicate, &ctx) {
                Value::Num(n) => n == (index + 1) as f64,
                other => other.boolean(),
            }
        })
        .map(|(_, item)| item)
        .collect()
}

fn binary<'a>(left: &Expr, op: BinaryOp, right: &Expr, ctx: &Context<'_, 'a>) -> Value<'a> {
    match op {
        BinaryOp::Or => Value::Bool(evaluate(left, ctx).boolean() || evaluate(right, ctx).boolean()),
        BinaryOp::And => {
            Value::Bool(evaluate(left, ctx).boolean() && evaluate(right, ctx).boolean())
        }
        BinaryOp::Add => Value::Num(evaluate(left, ctx).number() + evaluate(right, ctx).number()),
        BinaryOp::Sub => Value::Num(evaluate(left, ctx).number() - evaluate(right, ctx).number()),
        _ => Value::Bool(compare(op, &evaluate(left, ctx), &evaluate(right, ctx))),
    }
}

fn compare(op: BinaryOp, left: &Value<'_>, right: &Value<'_>) -> bool {
    match (left, right) {
        (Value::Nodes(l), Value::Nodes(r)) => l.iter().any(|a| {
            let a = Value::Str(a.string_value());
            r.iter()
                .any(|b| compare_atomic(op, &a, &Value::Str(b.string_value())))
        }),
        (Value::Nodes(nodes), other) => match other {
            Value::Bool(_) => compare_atomic(op, &Value::Bool(!nodes.is_empty()), other),
            _ => nodes
                .iter()
                .any(|n| compare_atomic(op, &Value::Str(n.string_value()), other)),
        },
        (other, Value::Nodes(nodes)) => match other {
            Value::Bool(_) => compare_atomic(op, other, &Value::Bool(!nodes.is_empty())),
            _ => nodes
                .iter()
                .any(|n| compare_atomic(op, other, &Value::Str(n.string_value()))),
        },
        _ => compare_atomic(op, left, right),
    }
}

fn compare_atomic(op: BinaryOp, left: &Value<'_>, right: &Value<'_>) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (left, right) {
                (Value::Bool(_), _) | (_, Value::Bool(_)) => left.boolean() == right.boolean(),
                (Value::Num(_), _) | (_, Value::Num(_)) => left.number() == right.number(),
                _ => left.string() == right.string(),
            };
            equal == (op == BinaryOp::Eq)
        }
        BinaryOp::Lt => left.number() < right.number(),
        BinaryOp::Le => left.number() <= right.number(),
        BinaryOp::Gt => left.number() > right.number(),
        BinaryOp::Ge => left.number() >= right.number(),
        _ => false,
    }
}

fn call<'a>(function: Function, args: &[Expr], ctx: &Context<'_, 'a>) -> Value<'a> {
    let arg = |index: usize| evaluate(&args[index], ctx);
    let string_arg = |index: usize| match args.get(index) {
        Some(expr) => evaluate(expr, ctx).string(),
        None => ctx.item.string_value(),
    };

    match function {
        Function::Last => Value::Num(ctx.size as f64),
        Function::Position => Value::Num(ctx.position as f64),
        Function::Count => match arg(0) {
            Value::Nodes(nodes) => Value::Num(nodes.len() as f64),
            _ => Value::Num(f64::NAN),
        },
        Function::Contains => Value::Bool(arg(0).string().contains(arg(1).string().as_str())),
        Function::StartsWith => {
            Value::Bool(arg(0).string().starts_with(arg(1).string().as_str()))
        }
        Function::NormalizeSpace => Value::Str(
            string_arg(0)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Function::Not => Value::Bool(!arg(0).boolean()),
        Function::Boolean => Value::Bool(arg(0).boolean()),
        Function::True => Value::Bool(true),
        Function::False => Value::Bool(false),
        Function::String => Value::Str(string_arg(0)),
        Function::StringLength => Value::Num(string_arg(0).chars().count() as f64),
        Function::Number => Value::Num(parse_number(&string_arg(0))),
        Function::Concat => Value::Str(args.iter().map(|expr| evaluate(expr, ctx).string()).collect()),
        Function::Name => {
            let item = match args.first() {
                Some(expr) => match evaluate(expr, ctx) {
                    Value::Nodes(nodes) => nodes.first().copied(),
                    _ => None,
                },
                None => Some(ctx.item),
            };
            Value::Str(item.map(|item| item.name().to_string()).unwrap_or_default())
        }
    }
}
