//! kubectl-style JSONPath templates.
//!
//! A template is text with `{...}` actions. An action is a path (`{.spec.replicas}`), a string
//! literal (`{"\n"}`), or a `{range <path>}...{end}` block that renders its body once per match
//! with `.` bound to the match. Paths support fields, quoted keys (`['app.kubernetes.io/name']`),
//! escaped dots, indices, `[*]`, and filters (`[?(@.type=="Ready")]`). Missing keys render as
//! nothing.

use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid jsonpath {template:?}: {reason}")]
pub struct Error {
    template: String,
    reason: &'static str,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Text(String),
    Value(Path),
    Range(Path, Vec<Node>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    from_root: bool,
    segments: Vec<Segment>,
}

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Field(String),
    Index(i64),
    Wildcard,
    Filter(Box<Filter>),
}

#[derive(Clone, Debug, PartialEq)]
struct Filter {
    path: Path,
    cmp: Option<(bool, Value)>,
}

// === impl Template ===

impl Template {
    pub fn parse(src: &str) -> Result<Self, Error> {
        let err = |reason| Error {
            template: src.to_string(),
            reason,
        };

        let mut nodes = Vec::new();
        let mut ranges: Vec<(Path, Vec<Node>)> = Vec::new();
        let mut rest = src;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                nodes.push(Node::Text(rest[..open].to_string()));
            }
            let close = action_end(&rest[open..]).ok_or_else(|| err("unclosed action"))?;
            let action = rest[open + 1..open + close].trim();
            rest = &rest[open + close + 1..];

            if action == "end" {
                let (path, parent) = ranges.pop().ok_or_else(|| err("unmatched end"))?;
                let body = std::mem::replace(&mut nodes, parent);
                nodes.push(Node::Range(path, body));
            } else if let Some(path) = action.strip_prefix("range ") {
                let path = Path::parse(path.trim()).ok_or_else(|| err("invalid range path"))?;
                ranges.push((path, std::mem::take(&mut nodes)));
            } else if action.starts_with('"') || action.starts_with('\'') {
                let lit = unquote(action).ok_or_else(|| err("invalid literal"))?;
                nodes.push(Node::Text(lit));
            } else {
                let path = Path::parse(action).ok_or_else(|| err("invalid path"))?;
                nodes.push(Node::Value(path));
            }
        }
        if !rest.is_empty() {
            nodes.push(Node::Text(rest.to_string()));
        }
        if !ranges.is_empty() {
            return Err(err("range without end"));
        }
        Ok(Self { nodes })
    }

    pub fn render(&self, data: &Value) -> String {
        let mut out = String::new();
        render_nodes(&self.nodes, data, data, &mut out);
        out
    }
}

/// Renders `template` against `data`. Text without actions is returned unchanged.
pub fn render(template: &str, data: &Value) -> Result<String, Error> {
    if !template.contains('{') {
        return Ok(template.to_string());
    }
    Template::parse(template).map(|t| t.render(data))
}

/// Resolves a single path, given either as `{.a.b}` or as a bare `a.b`.
pub fn find<'a>(path: &str, data: &'a Value) -> Result<Vec<&'a Value>, Error> {
    let trimmed = path.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|p| p.strip_suffix('}'))
        .unwrap_or(trimmed)
        .trim();
    let path = Path::parse(inner).ok_or_else(|| Error {
        template: path.to_string(),
        reason: "invalid path",
    })?;
    Ok(path.eval(data, data))
}

fn render_nodes(nodes: &[Node], root: &Value, current: &Value, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Value(path) => {
                let values = path.eval(root, current);
                for (i, v) in values.into_iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    write_value(v, out);
                }
            }
            Node::Range(path, body) => {
                let matches = path.eval(root, current);
                let items: Vec<&Value> = match matches.as_slice() {
                    [Value::Array(items)] => items.iter().collect(),
                    _ => matches,
                };
                for item in items {
                    render_nodes(body, root, item, out);
                }
            }
        }
    }
}

fn write_value(v: &Value, out: &mut String) {
    match v {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

/// Finds the `}` closing the action that starts at `s[0]`, skipping quoted text.
fn action_end(s: &str) -> Option<usize> {
    let mut quote = None;
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '}' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

fn unquote(s: &str) -> Option<String> {
    let q = s.chars().next()?;
    let inner = s.strip_prefix(q)?.strip_suffix(q)?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            other => out.push(other),
        }
    }
    Some(out)
}

// === impl Path ===

impl Path {
    pub fn parse(src: &str) -> Option<Self> {
        let mut path = Path::default();
        let mut rest = src;
        if let Some(r) = rest.strip_prefix('$') {
            path.from_root = true;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('@') {
            rest = r;
        } else if !rest.starts_with('.') && !rest.starts_with('[') && !rest.is_empty() {
            // A bare `a.b` path.
            let (field, r) = read_field(rest);
            path.segments.push(Segment::Field(field));
            rest = r;
        }

        while !rest.is_empty() {
            if rest.starts_with("..") {
                return None;
            }
            if let Some(r) = rest.strip_prefix('.') {
                if r.is_empty() {
                    break;
                }
                let (field, r) = read_field(r);
                if field.is_empty() && !r.starts_with('[') {
                    return None;
                }
                if !field.is_empty() {
                    path.segments.push(Segment::Field(field));
                }
                rest = r;
            } else if rest.starts_with('[') {
                let close = bracket_end(rest)?;
                let inner = rest[1..close].trim();
                path.segments.push(Segment::parse_bracket(inner)?);
                rest = &rest[close + 1..];
            } else {
                return None;
            }
        }
        Some(path)
    }

    fn eval<'a>(&self, root: &'a Value, current: &'a Value) -> Vec<&'a Value> {
        let start = if self.from_root { root } else { current };
        let mut values = vec![start];
        for seg in &self.segments {
            let mut next = Vec::new();
            for v in values {
                seg.apply(v, root, &mut next);
            }
            values = next;
        }
        values
    }
}

fn read_field(s: &str) -> (String, &str) {
    let mut field = String::new();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, n)) = chars.next() {
                    field.push(n);
                }
            }
            '.' | '[' => return (field, &s[i..]),
            _ => field.push(c),
        }
    }
    (field, "")
}

fn bracket_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote = None;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// === impl Segment ===

impl Segment {
    fn parse_bracket(inner: &str) -> Option<Self> {
        if inner == "*" {
            return Some(Self::Wildcard);
        }
        if let Some(expr) = inner.strip_prefix("?(").and_then(|e| e.strip_suffix(')')) {
            return Filter::parse(expr.trim()).map(|f| Self::Filter(Box::new(f)));
        }
        if inner.starts_with('\'') || inner.starts_with('"') {
            return unquote(inner).map(Self::Field);
        }
        inner.parse().ok().map(Self::Index)
    }

    fn apply<'a>(&self, v: &'a Value, root: &'a Value, out: &mut Vec<&'a Value>) {
        match self {
            Self::Field(name) => {
                if let Some(f) = v.get(name.as_str()) {
                    out.push(f);
                }
            }
            Self::Index(i) => {
                if let Value::Array(items) = v {
                    let idx = if *i < 0 { items.len() as i64 + i } else { *i };
                    if let Some(item) = usize::try_from(idx).ok().and_then(|i| items.get(i)) {
                        out.push(item);
                    }
                }
            }
            Self::Wildcard => match v {
                Value::Array(items) => out.extend(items.iter()),
                Value::Object(map) => out.extend(map.values()),
                _ => {}
            },
            Self::Filter(filter) => match v {
                Value::Array(items) => {
                    out.extend(items.iter().filter(|item| filter.matches(item, root)));
                }
                other if filter.matches(other, root) => out.push(other),
                _ => {}
            },
        }
    }
}

// === impl Filter ===

impl Filter {
    fn parse(expr: &str) -> Option<Self> {
        let split = [("==", true), ("!=", false)]
            .into_iter()
            .find_map(|(op, eq)| expr.split_once(op).map(|(l, r)| (l, r, eq)));
        match split {
            Some((lhs, rhs, eq)) => {
                let rhs = rhs.trim();
                let lit = if rhs.starts_with('\'') || rhs.starts_with('"') {
                    Value::String(unquote(rhs)?)
                } else {
                    serde_json::from_str(rhs).ok()?
                };
                Some(Self {
                    path: Path::parse(lhs.trim())?,
                    cmp: Some((eq, lit)),
                })
            }
            None => Some(Self {
                path: Path::parse(expr)?,
                cmp: None,
            }),
        }
    }

    fn matches(&self, item: &Value, root: &Value) -> bool {
        let found = self.path.eval(root, item);
        match &self.cmp {
            None => found.iter().any(|v| !v.is_null()),
            Some((eq, lit)) => {
                let hit = found.iter().any(|v| values_equal(v, lit));
                hit == *eq
            }
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
