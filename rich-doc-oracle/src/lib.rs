//! A naive content-expression matcher for differential testing.
//!
//! Expressions are parsed into a small tree and matched against a sequence
//! of node type names by exhaustive backtracking over end positions. No
//! automaton is built, so this is slow and obviously correct.
use rich_doc::Schema;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Any of these node type names.
    Names(Vec<String>),
    Seq(Vec<Expr>),
    Choice(Vec<Expr>),
    Repeat {
        expr: Box<Expr>,
        min: usize,
        max: Option<usize>,
    },
}

fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for ch in source.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            word.push(ch);
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if !ch.is_whitespace() {
            tokens.push(ch.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

struct Parser<'a> {
    tokens: Vec<String>,
    pos: usize,
    schema: &'a Schema,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn choice(&mut self) -> Option<Expr> {
        let mut options = vec![self.seq()?];
        while self.eat("|") {
            options.push(self.seq()?);
        }
        Some(if options.len() == 1 {
            options.remove(0)
        } else {
            Expr::Choice(options)
        })
    }

    fn seq(&mut self) -> Option<Expr> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            if token == ")" || token == "|" {
                break;
            }
            items.push(self.postfix()?);
        }
        Some(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Seq(items)
        })
    }

    fn postfix(&mut self) -> Option<Expr> {
        let mut expr = self.atom()?;
        loop {
            let (min, max) = if self.eat("+") {
                (1, None)
            } else if self.eat("*") {
                (0, None)
            } else if self.eat("?") {
                (0, Some(1))
            } else if self.eat("{") {
                let min = self.number()?;
                let max = if self.eat(",") {
                    if self.peek() == Some("}") {
                        None
                    } else {
                        Some(self.number()?)
                    }
                } else {
                    Some(min)
                };
                if !self.eat("}") {
                    return None;
                }
                (min, max)
            } else {
                return Some(expr);
            };
            expr = Expr::Repeat {
                expr: Box::new(expr),
                min,
                max,
            };
        }
    }

    fn number(&mut self) -> Option<usize> {
        let n = self.peek()?.parse().ok()?;
        self.pos += 1;
        Some(n)
    }

    fn atom(&mut self) -> Option<Expr> {
        if self.eat("(") {
            let expr = self.choice()?;
            return self.eat(")").then_some(expr);
        }
        let word = self.peek()?.to_string();
        self.pos += 1;
        if let Some(node_type) = self.schema.node_type(&word) {
            return Some(Expr::Names(vec![node_type.name().to_string()]));
        }
        let members: Vec<String> = self
            .schema
            .node_types()
            .filter(|t| t.is_in_group(&word))
            .map(|t| t.name().to_string())
            .collect();
        (!members.is_empty()).then_some(Expr::Names(members))
    }
}

/// Parses `source` against the node types and groups of `schema`. Returns
/// `None` for anything malformed.
pub fn parse(source: &str, schema: &Schema) -> Option<Expr> {
    let mut parser = Parser {
        tokens: tokenize(source),
        pos: 0,
        schema,
    };
    if parser.peek().is_none() {
        return Some(Expr::Seq(Vec::new()));
    }
    let expr = parser.choice()?;
    (parser.pos == parser.tokens.len()).then_some(expr)
}

/// Every position `expr` can end at when matching `seq` from `start`.
pub fn ends(expr: &Expr, seq: &[&str], start: usize) -> BTreeSet<usize> {
    match expr {
        Expr::Names(names) => seq
            .get(start)
            .filter(|name| names.iter().any(|n| n == *name))
            .map(|_| start + 1)
            .into_iter()
            .collect(),
        Expr::Seq(items) => items.iter().fold(BTreeSet::from([start]), |here, item| {
            here.iter().flat_map(|&pos| ends(item, seq, pos)).collect()
        }),
        Expr::Choice(options) => options
            .iter()
            .flat_map(|option| ends(option, seq, start))
            .collect(),
        Expr::Repeat { expr, min, max } => {
            let mut result = BTreeSet::new();
            let mut frontier = BTreeSet::from([start]);
            let mut count = 0;
            loop {
                if count >= *min {
                    result.extend(frontier.iter().copied());
                }
                // Past `min + len` iterations, extra rounds can only be
                // zero-width and add no new end positions.
                if frontier.is_empty()
                    || max.is_some_and(|max| count >= max)
                    || count > *min + seq.len()
                {
                    break;
                }
                frontier = frontier
                    .iter()
                    .flat_map(|&pos| ends(expr, seq, pos))
                    .collect();
                count += 1;
            }
            result
        }
    }
}

/// Whether `expr` matches all of `seq`.
pub fn matches(expr: &Expr, seq: &[&str]) -> bool {
    ends(expr, seq, 0).contains(&seq.len())
}
