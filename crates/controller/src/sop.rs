//! SOP (Standard Operating Procedure) graph parsing.
//!
//! SOPs arrive as Graphviz DOT text written by the SOP expert or supplied by
//! the caller. Only the subset needed for workflow tracking is understood:
//! node and edge statements with `label`/`shape` attributes, edge chains,
//! `{ a b }` endpoint groups, flattened subgraphs, and the three comment
//! styles. Default-attribute statements (`graph`, `node`, `edge`) and graph
//! attributes are accepted and ignored.

use teamflow_core::{Error, Result};

use crate::graph::Graph;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Id { text: String, quoted: bool },
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Semicolon,
    Comma,
    EdgeOp,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Id { text, quoted: false } if text.eq_ignore_ascii_case(keyword))
    }
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || !c.is_ascii()
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                i += 2;
                loop {
                    if i + 1 >= chars.len() {
                        return Err(Error::graph("unterminated block comment"));
                    }
                    if chars[i] == '*' && chars[i + 1] == '/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Equals);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '-' if next == Some('>') || next == Some('-') => {
                tokens.push(Token::EdgeOp);
                i += 2;
            }
            '"' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(Error::graph("unterminated string")),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => match chars.get(i + 1) {
                            Some('"') => {
                                text.push('"');
                                i += 2;
                            }
                            Some('\n') => i += 2,
                            Some('n') => {
                                text.push('\n');
                                i += 2;
                            }
                            _ => {
                                text.push('\\');
                                i += 1;
                            }
                        },
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Id { text, quoted: true });
            }
            '<' => {
                let mut depth = 0usize;
                let start = i + 1;
                loop {
                    match chars.get(i) {
                        None => return Err(Error::graph("unterminated HTML string")),
                        Some('<') => depth += 1,
                        Some('>') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                i += 1;
                tokens.push(Token::Id { text, quoted: true });
            }
            c if is_id_char(c) || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && is_id_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Id {
                    text: chars[start..i].iter().collect(),
                    quoted: false,
                });
            }
            other => {
                return Err(Error::graph(format!("unexpected character '{}'", other)));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    graph: Graph,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        match self.bump() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(Error::graph(format!("expected {}, found {:?}", what, token))),
            None => Err(Error::graph(format!("expected {}, found end of input", what))),
        }
    }

    fn expect_id(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::Id { text, .. }) => Ok(text),
            Some(token) => Err(Error::graph(format!("expected identifier, found {:?}", token))),
            None => Err(Error::graph("expected identifier, found end of input")),
        }
    }

    fn parse_graph(&mut self) -> Result<()> {
        if self.peek().is_some_and(|t| t.is_keyword("strict")) {
            self.pos += 1;
        }
        match self.bump() {
            Some(t) if t.is_keyword("digraph") || t.is_keyword("graph") => {}
            _ => return Err(Error::graph("expected 'digraph' or 'graph'")),
        }
        if let Some(Token::Id { text, .. }) = self.peek().cloned() {
            self.graph = Graph::named(text);
            self.pos += 1;
        }
        self.expect(Token::LBrace, "'{'")?;
        self.parse_statements()
    }

    /// Statements up to and including the closing brace.
    fn parse_statements(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                None => return Err(Error::graph("missing closing '}'")),
                Some(Token::RBrace) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Token::Semicolon) | Some(Token::Comma) => self.pos += 1,
                Some(Token::LBrace) => {
                    self.pos += 1;
                    self.parse_statements()?;
                }
                Some(t) if t.is_keyword("subgraph") => {
                    self.pos += 1;
                    if matches!(self.peek(), Some(Token::Id { .. })) {
                        self.pos += 1;
                    }
                    self.expect(Token::LBrace, "'{' after subgraph")?;
                    self.parse_statements()?;
                }
                Some(t)
                    if (t.is_keyword("graph") || t.is_keyword("node") || t.is_keyword("edge"))
                        && self.peek_at(1) == Some(&Token::LBracket) =>
                {
                    self.pos += 1;
                    self.parse_attributes()?;
                }
                Some(Token::Id { .. }) => self.parse_node_or_edge()?,
                Some(token) => {
                    return Err(Error::graph(format!("unexpected token {:?}", token)));
                }
            }
        }
    }

    fn parse_endpoint(&mut self) -> Result<Vec<String>> {
        if self.peek() != Some(&Token::LBrace) {
            return Ok(vec![self.expect_id()?]);
        }
        self.pos += 1;
        let mut names = Vec::new();
        loop {
            match self.bump() {
                Some(Token::RBrace) => return Ok(names),
                Some(Token::Semicolon) | Some(Token::Comma) => {}
                Some(Token::Id { text, .. }) => names.push(text),
                Some(token) => {
                    return Err(Error::graph(format!("unexpected token {:?} in node group", token)))
                }
                None => return Err(Error::graph("unterminated node group")),
            }
        }
    }

    fn parse_node_or_edge(&mut self) -> Result<()> {
        let first = self.parse_endpoint()?;

        if self.peek() == Some(&Token::Equals) {
            // Graph attribute such as `rankdir=LR`.
            self.pos += 1;
            self.expect_id()?;
            return Ok(());
        }

        let mut chain = vec![first];
        while self.peek() == Some(&Token::EdgeOp) {
            self.pos += 1;
            chain.push(self.parse_endpoint()?);
        }
        let attrs = self.parse_attributes()?;
        let attr = |key: &str| {
            attrs
                .iter()
                .rev()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.clone())
        };

        if chain.len() == 1 {
            for name in &chain[0] {
                let node = self.graph.ensure_node(name);
                if let Some(label) = attr("label") {
                    node.label = label;
                }
                if let Some(shape) = attr("shape") {
                    node.shape = shape;
                }
            }
            return Ok(());
        }

        for group in &chain {
            for name in group {
                self.graph.ensure_node(name);
            }
        }
        let label = attr("label").unwrap_or_default();
        for pair in chain.windows(2) {
            for from in &pair[0] {
                for to in &pair[1] {
                    self.graph.add_edge(from.as_str(), to.as_str(), label.as_str());
                }
            }
        }
        Ok(())
    }

    fn parse_attributes(&mut self) -> Result<Vec<(String, String)>> {
        let mut attrs = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            loop {
                match self.bump() {
                    Some(Token::RBracket) => break,
                    Some(Token::Semicolon) | Some(Token::Comma) => {}
                    Some(Token::Id { text: key, .. }) => {
                        let value = if self.peek() == Some(&Token::Equals) {
                            self.pos += 1;
                            self.expect_id()?
                        } else {
                            "true".to_string()
                        };
                        attrs.push((key, value));
                    }
                    Some(token) => {
                        return Err(Error::graph(format!(
                            "unexpected token {:?} in attribute list",
                            token
                        )))
                    }
                    None => return Err(Error::graph("unterminated attribute list")),
                }
            }
        }
        Ok(attrs)
    }
}

/// Parse DOT text into a graph. Nodes keep first-appearance order, so the
/// first node mentioned is the entry node.
pub fn parse(text: &str) -> Result<Graph> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
        graph: Graph::new(),
    };
    parser.parse_graph()?;

    if parser.graph.is_empty() {
        return Err(Error::graph("sop graph has no nodes"));
    }
    tracing::debug!(
        nodes = parser.graph.nodes().len(),
        edges = parser.graph.edges().len(),
        "Parsed SOP graph"
    );
    Ok(parser.graph)
}

/// Pull the DOT definition out of free text, dropping code fences and any
/// prose before the header or after the closing brace.
pub fn extract(text: &str) -> Option<&str> {
    let start = ["strict", "digraph", "graph"]
        .iter()
        .filter_map(|kw| find_keyword(text, kw))
        .min()?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    text.match_indices(keyword).map(|(idx, _)| idx).find(|&idx| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + keyword.len()..].chars().next();
        !before.is_some_and(is_id_char) && !after.is_some_and(is_id_char)
    })
}
