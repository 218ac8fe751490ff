//! Content expressions compiled to deterministic automata.
//!
//! An expression like `"heading paragraph* (image | text)+"` is parsed into
//! an expression tree, lowered to an NFA whose edge order follows the
//! expression, and turned into a DFA by subset construction. All states of
//! a schema live in one arena owned by the schema; a [`ContentMatch`] is a
//! handle into it.

use super::{Fragment, ModelError, Node, NodeType, Schema};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// The state shared by every leaf type: valid end, no edges.
pub(crate) const EMPTY_STATE: usize = 0;

#[derive(Debug)]
pub(crate) struct MatchState {
    pub(crate) valid_end: bool,
    /// `(node type index, next state)` in expression order.
    pub(crate) next: Vec<(usize, usize)>,
}

impl MatchState {
    pub(crate) fn empty() -> Self {
        Self {
            valid_end: true,
            next: Vec::new(),
        }
    }
}

/// What the compiler needs to know about a node type.
pub(crate) struct TypeInfo<'a> {
    pub(crate) name: &'a str,
    pub(crate) groups: &'a [String],
    pub(crate) inline: bool,
    /// Neither text nor carrying required attributes.
    pub(crate) generatable: bool,
}

#[derive(Debug)]
enum Expr {
    Choice(Vec<Expr>),
    Seq(Vec<Expr>),
    Plus(Box<Expr>),
    Star(Box<Expr>),
    Opt(Box<Expr>),
    Range {
        min: usize,
        max: Option<usize>,
        expr: Box<Expr>,
    },
    Name(usize),
}

struct TokenStream<'a> {
    source: &'a str,
    tokens: Vec<&'a str>,
    pos: usize,
    types: &'a [TypeInfo<'a>],
    inline: Option<bool>,
}

impl<'a> TokenStream<'a> {
    fn new(source: &'a str, types: &'a [TypeInfo<'a>]) -> Self {
        Self {
            source,
            tokens: tokenize(source),
            pos: 0,
            types,
            inline: None,
        }
    }

    fn next(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn eat(&mut self, tok: &str) -> bool {
        if self.next() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn err(&self, message: impl fmt::Display) -> ModelError {
        ModelError::syntax(format!(
            "{message} (in content expression '{}')",
            self.source
        ))
    }
}

fn is_word(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn tokenize(source: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch.is_whitespace() {
            continue;
        }
        let mut end = start + ch.len_utf8();
        if is_word(ch) {
            while let Some(&(i, c)) = chars.peek() {
                if !is_word(c) {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
        }
        tokens.push(&source[start..end]);
    }
    tokens
}

/// Compiles `source` into `states`, returning the start state.
pub(crate) fn compile(
    source: &str,
    types: &[TypeInfo<'_>],
    states: &mut Vec<MatchState>,
) -> Result<usize, ModelError> {
    let mut stream = TokenStream::new(source, types);
    if stream.next().is_none() {
        return Ok(EMPTY_STATE);
    }
    let expr = parse_expr(&mut stream)?;
    if stream.next().is_some() {
        return Err(stream.err("Unexpected trailing text"));
    }
    let nfa = Nfa::build(&expr);
    let start = dfa(&nfa, states);
    check_for_dead_ends(start, states, &stream)?;
    Ok(start)
}

fn parse_expr(stream: &mut TokenStream<'_>) -> Result<Expr, ModelError> {
    let mut exprs = Vec::new();
    loop {
        exprs.push(parse_expr_seq(stream)?);
        if !stream.eat("|") {
            break;
        }
    }
    Ok(if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::Choice(exprs)
    })
}

fn parse_expr_seq(stream: &mut TokenStream<'_>) -> Result<Expr, ModelError> {
    let mut exprs = Vec::new();
    loop {
        exprs.push(parse_expr_subscript(stream)?);
        match stream.next() {
            Some(tok) if tok != ")" && tok != "|" => continue,
            _ => break,
        }
    }
    Ok(if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::Seq(exprs)
    })
}

fn parse_expr_subscript(stream: &mut TokenStream<'_>) -> Result<Expr, ModelError> {
    let mut expr = parse_expr_atom(stream)?;
    loop {
        if stream.eat("+") {
            expr = Expr::Plus(Box::new(expr));
        } else if stream.eat("*") {
            expr = Expr::Star(Box::new(expr));
        } else if stream.eat("?") {
            expr = Expr::Opt(Box::new(expr));
        } else if stream.eat("{") {
            expr = parse_expr_range(stream, expr)?;
        } else {
            break;
        }
    }
    Ok(expr)
}

fn parse_num(stream: &mut TokenStream<'_>) -> Result<usize, ModelError> {
    let tok = stream.next();
    let num = tok
        .filter(|t| t.chars().all(|c| c.is_ascii_digit()))
        .and_then(|t| t.parse().ok());
    match num {
        Some(num) => {
            stream.pos += 1;
            Ok(num)
        }
        None => Err(stream.err(format!(
            "Expected number, got '{}'",
            tok.unwrap_or("end of expression")
        ))),
    }
}

fn parse_expr_range(stream: &mut TokenStream<'_>, expr: Expr) -> Result<Expr, ModelError> {
    let min = parse_num(stream)?;
    let mut max = Some(min);
    if stream.eat(",") {
        max = if stream.next() != Some("}") {
            Some(parse_num(stream)?)
        } else {
            None
        };
    }
    if !stream.eat("}") {
        return Err(stream.err("Unclosed braced range"));
    }
    Ok(Expr::Range {
        min,
        max,
        expr: Box::new(expr),
    })
}

fn resolve_name(stream: &TokenStream<'_>, name: &str) -> Result<Vec<usize>, ModelError> {
    if let Some(index) = stream.types.iter().position(|t| t.name == name) {
        return Ok(vec![index]);
    }
    let members: Vec<usize> = stream
        .types
        .iter()
        .enumerate()
        .filter(|(_, t)| t.groups.iter().any(|g| g == name))
        .map(|(index, _)| index)
        .collect();
    if members.is_empty() {
        return Err(stream.err(format!("No node type or group '{name}' found")));
    }
    Ok(members)
}

fn parse_expr_atom(stream: &mut TokenStream<'_>) -> Result<Expr, ModelError> {
    if stream.eat("(") {
        let expr = parse_expr(stream)?;
        if !stream.eat(")") {
            return Err(stream.err("Missing closing paren"));
        }
        return Ok(expr);
    }
    match stream.next() {
        Some(tok) if tok.chars().all(is_word) => {
            let mut exprs = Vec::new();
            for index in resolve_name(stream, tok)? {
                let inline = stream.types[index].inline;
                match stream.inline {
                    None => stream.inline = Some(inline),
                    Some(prev) if prev != inline => {
                        return Err(stream.err("Mixing inline and block content"));
                    }
                    Some(_) => {}
                }
                exprs.push(Expr::Name(index));
            }
            stream.pos += 1;
            Ok(if exprs.len() == 1 {
                exprs.remove(0)
            } else {
                Expr::Choice(exprs)
            })
        }
        Some(tok) => Err(stream.err(format!("Unexpected token '{tok}'"))),
        None => Err(stream.err("Unexpected end of expression")),
    }
}

struct NfaEdge {
    term: Option<usize>,
    to: Option<usize>,
}

/// `(node, edge index)` of edges whose target is not known yet.
type Dangling = Vec<(usize, usize)>;

struct Nfa {
    nodes: Vec<Vec<NfaEdge>>,
}

impl Nfa {
    fn build(expr: &Expr) -> Self {
        let mut nfa = Nfa {
            nodes: vec![Vec::new()],
        };
        let out = nfa.compile(expr, 0);
        let end = nfa.node();
        nfa.connect(&out, end);
        nfa
    }

    fn node(&mut self) -> usize {
        self.nodes.push(Vec::new());
        self.nodes.len() - 1
    }

    fn edge(&mut self, from: usize, to: Option<usize>, term: Option<usize>) -> (usize, usize) {
        self.nodes[from].push(NfaEdge { term, to });
        (from, self.nodes[from].len() - 1)
    }

    fn connect(&mut self, edges: &[(usize, usize)], to: usize) {
        for &(node, edge) in edges {
            self.nodes[node][edge].to = Some(to);
        }
    }

    fn compile(&mut self, expr: &Expr, from: usize) -> Dangling {
        match expr {
            Expr::Choice(exprs) => {
                let mut out = Vec::new();
                for expr in exprs {
                    out.extend(self.compile(expr, from));
                }
                out
            }
            Expr::Seq(exprs) => {
                let mut from = from;
                for (i, expr) in exprs.iter().enumerate() {
                    let next = self.compile(expr, from);
                    if i == exprs.len() - 1 {
                        return next;
                    }
                    from = self.node();
                    self.connect(&next, from);
                }
                Vec::new()
            }
            Expr::Star(expr) => {
                let lp = self.node();
                self.edge(from, Some(lp), None);
                let out = self.compile(expr, lp);
                self.connect(&out, lp);
                vec![self.edge(lp, None, None)]
            }
            Expr::Plus(expr) => {
                let lp = self.node();
                let out = self.compile(expr, from);
                self.connect(&out, lp);
                let out = self.compile(expr, lp);
                self.connect(&out, lp);
                vec![self.edge(lp, None, None)]
            }
            Expr::Opt(expr) => {
                let mut out = vec![self.edge(from, None, None)];
                out.extend(self.compile(expr, from));
                out
            }
            Expr::Range { min, max, expr } => {
                let mut cur = from;
                for _ in 0..*min {
                    let next = self.node();
                    let out = self.compile(expr, cur);
                    self.connect(&out, next);
                    cur = next;
                }
                match max {
                    None => {
                        let out = self.compile(expr, cur);
                        self.connect(&out, cur);
                    }
                    Some(max) => {
                        for _ in *min..*max {
                            let next = self.node();
                            self.edge(cur, Some(next), None);
                            let out = self.compile(expr, cur);
                            self.connect(&out, next);
                            cur = next;
                        }
                    }
                }
                vec![self.edge(cur, None, None)]
            }
            Expr::Name(index) => vec![self.edge(from, None, Some(*index))],
        }
    }

    /// Epsilon closure of `node`, sorted descending.
    fn null_from(&self, node: usize) -> Vec<usize> {
        let mut result = Vec::new();
        self.scan(node, &mut result);
        result.sort_unstable_by(|a, b| b.cmp(a));
        result.dedup();
        result
    }

    fn scan(&self, node: usize, result: &mut Vec<usize>) {
        let edges = &self.nodes[node];
        if let [NfaEdge { term: None, to: Some(to) }] = edges.as_slice() {
            return self.scan(*to, result);
        }
        result.push(node);
        for edge in edges {
            if let (None, Some(to)) = (edge.term, edge.to) {
                if !result.contains(&to) {
                    self.scan(to, result);
                }
            }
        }
    }
}

fn state_key(set: &[usize]) -> String {
    set.iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn dfa(nfa: &Nfa, states: &mut Vec<MatchState>) -> usize {
    let mut labeled = HashMap::new();
    explore(nfa, nfa.null_from(0), states, &mut labeled)
}

fn explore(
    nfa: &Nfa,
    set: Vec<usize>,
    states: &mut Vec<MatchState>,
    labeled: &mut HashMap<String, usize>,
) -> usize {
    let mut out: Vec<(usize, Vec<usize>)> = Vec::new();
    for &node in &set {
        for edge in &nfa.nodes[node] {
            let (Some(term), Some(to)) = (edge.term, edge.to) else {
                continue;
            };
            let slot = match out.iter().position(|(t, _)| *t == term) {
                Some(slot) => slot,
                None => {
                    out.push((term, Vec::new()));
                    out.len() - 1
                }
            };
            for reached in nfa.null_from(to) {
                if !out[slot].1.contains(&reached) {
                    out[slot].1.push(reached);
                }
            }
        }
    }

    let id = states.len();
    states.push(MatchState {
        valid_end: set.contains(&(nfa.nodes.len() - 1)),
        next: Vec::new(),
    });
    labeled.insert(state_key(&set), id);

    for (term, mut targets) in out {
        targets.sort_unstable_by(|a, b| b.cmp(a));
        let next = match labeled.get(&state_key(&targets)) {
            Some(&known) => known,
            None => explore(nfa, targets, states, labeled),
        };
        states[id].next.push((term, next));
    }
    id
}

fn check_for_dead_ends(
    start: usize,
    states: &[MatchState],
    stream: &TokenStream<'_>,
) -> Result<(), ModelError> {
    let mut work = vec![start];
    let mut i = 0;
    while i < work.len() {
        let state = &states[work[i]];
        let mut dead = !state.valid_end;
        let mut names = Vec::new();
        for &(term, next) in &state.next {
            let info = &stream.types[term];
            names.push(info.name);
            if dead && info.generatable {
                dead = false;
            }
            if !work.contains(&next) {
                work.push(next);
            }
        }
        if dead {
            return Err(stream.err(format!(
                "Only non-generatable nodes ({}) in a required position",
                names.join(", ")
            )));
        }
        i += 1;
    }
    Ok(())
}

/// A state in the automaton of a node type's content expression.
#[derive(Clone)]
pub struct ContentMatch {
    pub(crate) schema: Schema,
    pub(crate) state: usize,
}

/// An outgoing edge of a [`ContentMatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEdge {
    pub node_type: NodeType,
    pub next: ContentMatch,
}

impl ContentMatch {
    pub(crate) fn at(schema: &Schema, state: usize) -> Self {
        Self {
            schema: schema.clone(),
            state,
        }
    }

    fn data(&self) -> &MatchState {
        &self.schema.inner.states[self.state]
    }

    /// Whether the content matched so far is complete.
    pub fn valid_end(&self) -> bool {
        self.data().valid_end
    }

    pub fn match_type(&self, node_type: &NodeType) -> Option<ContentMatch> {
        if !node_type.schema.ptr_eq(&self.schema) {
            return None;
        }
        self.data()
            .next
            .iter()
            .find(|(term, _)| *term == node_type.index)
            .map(|&(_, next)| ContentMatch::at(&self.schema, next))
    }

    pub fn match_fragment(&self, fragment: &Fragment) -> Option<ContentMatch> {
        self.match_fragment_range(fragment, 0, fragment.child_count())
    }

    /// Matches children `start..end` of `fragment`.
    pub fn match_fragment_range(
        &self,
        fragment: &Fragment,
        start: usize,
        end: usize,
    ) -> Option<ContentMatch> {
        let mut cur = self.clone();
        for child in &fragment.children()[start..end] {
            cur = cur.match_type(child.node_type())?;
        }
        Some(cur)
    }

    pub fn inline_content(&self) -> bool {
        self.data()
            .next
            .first()
            .is_some_and(|&(term, _)| !self.schema.inner.nodes[term].is_block)
    }

    /// The first type reachable from here that can be created without
    /// attributes.
    pub fn default_type(&self) -> Option<NodeType> {
        self.data()
            .next
            .iter()
            .map(|&(term, _)| self.schema.node_type_at(term))
            .find(|t| !(t.is_text() || t.has_required_attrs()))
    }

    /// Whether this state and `other` share an outgoing type.
    pub fn compatible(&self, other: &ContentMatch) -> bool {
        self.schema.ptr_eq(&other.schema)
            && self.data().next.iter().any(|(a, _)| {
                other.data().next.iter().any(|(b, _)| a == b)
            })
    }

    /// Finds nodes that, inserted here, let `after` (from `start_index`)
    /// match. With `to_end`, the match must also reach a valid end.
    pub fn fill_before(
        &self,
        after: &Fragment,
        to_end: bool,
        start_index: usize,
    ) -> Option<Fragment> {
        let mut seen = vec![self.state];
        let mut types = Vec::new();
        self.search_fill(after, to_end, start_index, &mut seen, &mut types)
    }

    fn search_fill(
        &self,
        after: &Fragment,
        to_end: bool,
        start_index: usize,
        seen: &mut Vec<usize>,
        types: &mut Vec<NodeType>,
    ) -> Option<Fragment> {
        if let Some(finished) = self.match_fragment_range(after, start_index, after.child_count())
        {
            if !to_end || finished.valid_end() {
                let filled: Option<Vec<Node>> = types
                    .iter()
                    .map(|t| t.create_and_fill(None, Fragment::empty(), &[]).ok().flatten())
                    .collect();
                if let Some(nodes) = filled {
                    return Some(Fragment::from_array(nodes));
                }
            }
        }
        for &(term, next) in &self.data().next {
            let node_type = self.schema.node_type_at(term);
            if node_type.is_text() || node_type.has_required_attrs() || seen.contains(&next) {
                continue;
            }
            seen.push(next);
            types.push(node_type);
            let found = ContentMatch::at(&self.schema, next)
                .search_fill(after, to_end, start_index, seen, types);
            if found.is_some() {
                return found;
            }
            types.pop();
        }
        None
    }

    /// Finds the shortest chain of wrapper types that lets `target` appear
    /// here. An empty chain means `target` fits directly.
    pub fn find_wrapping(&self, target: &NodeType) -> Option<Vec<NodeType>> {
        if !target.schema.ptr_eq(&self.schema) {
            return None;
        }
        let key = (self.state, target.index);
        let cached = self.schema.inner.wrap_cache.lock().get(&key).cloned();
        let chain = match cached {
            Some(chain) => chain,
            None => {
                let chain = self.compute_wrapping(target);
                self.schema
                    .inner
                    .wrap_cache
                    .lock()
                    .insert(key, chain.clone());
                chain
            }
        };
        chain.map(|indices| {
            indices
                .into_iter()
                .map(|index| self.schema.node_type_at(index))
                .collect()
        })
    }

    fn compute_wrapping(&self, target: &NodeType) -> Option<Vec<usize>> {
        struct Active {
            state: usize,
            node_type: Option<usize>,
            via: Option<usize>,
        }

        let states = &self.schema.inner.states;
        let mut seen = HashSet::new();
        let mut active = vec![Active {
            state: self.state,
            node_type: None,
            via: None,
        }];
        let mut queue = VecDeque::from([0]);
        while let Some(cur) = queue.pop_front() {
            let here = ContentMatch::at(&self.schema, active[cur].state);
            if here.match_type(target).is_some() {
                let mut chain = Vec::new();
                let mut obj = cur;
                while let Some(node_type) = active[obj].node_type {
                    chain.push(node_type);
                    match active[obj].via {
                        Some(via) => obj = via,
                        None => break,
                    }
                }
                chain.reverse();
                return Some(chain);
            }
            for &(term, next) in &here.data().next {
                let node_type = self.schema.node_type_at(term);
                if node_type.is_leaf()
                    || node_type.has_required_attrs()
                    || seen.contains(&term)
                    || (active[cur].node_type.is_some() && !states[next].valid_end)
                {
                    continue;
                }
                active.push(Active {
                    state: node_type.content_match().state,
                    node_type: Some(term),
                    via: Some(cur),
                });
                queue.push_back(active.len() - 1);
                seen.insert(term);
            }
        }
        None
    }

    pub fn edge_count(&self) -> usize {
        self.data().next.len()
    }

    pub fn edge(&self, n: usize) -> Option<MatchEdge> {
        self.data().next.get(n).map(|&(term, next)| MatchEdge {
            node_type: self.schema.node_type_at(term),
            next: ContentMatch::at(&self.schema, next),
        })
    }
}

impl PartialEq for ContentMatch {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.schema.ptr_eq(&other.schema)
    }
}

impl fmt::Debug for ContentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentMatch({})", self.state)
    }
}

/// Dumps every state reachable from this one, numbered in discovery order.
impl fmt::Display for ContentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states = &self.schema.inner.states;
        let mut seen = vec![self.state];
        let mut i = 0;
        while i < seen.len() {
            for &(_, next) in &states[seen[i]].next {
                if !seen.contains(&next) {
                    seen.push(next);
                }
            }
            i += 1;
        }
        for (i, &state) in seen.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let data = &states[state];
            write!(f, "{}{} ", i, if data.valid_end { "*" } else { " " })?;
            for (j, &(term, next)) in data.next.iter().enumerate() {
                let pos = seen.iter().position(|&s| s == next).unwrap_or(0);
                write!(
                    f,
                    "{}{}->{}",
                    if j > 0 { ", " } else { "" },
                    self.schema.inner.nodes[term].name,
                    pos
                )?;
            }
        }
        Ok(())
    }
}
