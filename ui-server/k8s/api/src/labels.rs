use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
    sync::Arc,
};

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Expression {
    key: String,
    operator: Operator,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    values: BTreeSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// A Kubernetes label selector.
///
/// An empty selector matches every set of labels.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_labels: Option<Map>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_expressions: Option<Expressions>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid label selector {0:?}")]
pub struct ParseError(String);

// === Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.as_ref().map_or(true, |m| m.is_empty())
            && self.match_expressions.as_ref().map_or(true, |e| e.is_empty())
    }

    pub fn match_labels(&self) -> impl Iterator<Item = (&String, &String)> {
        self.match_labels.iter().flatten()
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.match_expressions.iter().flatten()
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.matches_map(labels.as_ref())
    }

    pub fn matches_map(&self, labels: &Map) -> bool {
        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels) {
                return false;
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.get(k) != Some(v) {
                    return false;
                }
            }
        }

        true
    }

    /// Rewrites every key and value with `f`.
    pub fn try_map_values<E>(
        &self,
        mut f: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<Self, E> {
        let match_labels = match &self.match_labels {
            Some(m) => Some(
                m.iter()
                    .map(|(k, v)| Ok((f(k)?, f(v)?)))
                    .collect::<Result<Map, E>>()?,
            ),
            None => None,
        };
        let match_expressions = match &self.match_expressions {
            Some(exprs) => Some(
                exprs
                    .iter()
                    .map(|e| {
                        Ok(Expression {
                            key: f(&e.key)?,
                            operator: e.operator,
                            values: e.values.iter().map(|v| f(v)).collect::<Result<_, E>>()?,
                        })
                    })
                    .collect::<Result<Expressions, E>>()?,
            ),
            None => None,
        };
        Ok(Self {
            match_labels,
            match_expressions,
        })
    }
}

impl From<&LabelSelector> for Selector {
    fn from(sel: &LabelSelector) -> Self {
        let match_expressions = sel.match_expressions.as_ref().map(|exprs| {
            exprs
                .iter()
                .filter_map(|e| {
                    let operator = match e.operator.as_str() {
                        "In" => Operator::In,
                        "NotIn" => Operator::NotIn,
                        "Exists" => Operator::Exists,
                        "DoesNotExist" => Operator::DoesNotExist,
                        _ => return None,
                    };
                    Some(Expression {
                        key: e.key.clone(),
                        operator,
                        values: e.values.iter().flatten().cloned().collect(),
                    })
                })
                .collect()
        });
        Self {
            match_labels: sel.match_labels.clone(),
            match_expressions,
        }
    }
}

/// Renders the selector in the API server's query syntax.
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms = self
            .match_labels()
            .map(|(k, v)| format!("{k}={v}"))
            .chain(self.expressions().map(|e| e.to_string()))
            .collect::<Vec<_>>();
        f.write_str(&terms.join(","))
    }
}

impl FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut labels = Map::new();
        let mut exprs = Expressions::new();
        for term in split_terms(s) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            if let Some(key) = term.strip_prefix('!') {
                exprs.push(Expression::new(key.trim(), Operator::DoesNotExist, None));
            } else if let Some((key, values)) = split_set(term, " notin ") {
                exprs.push(Expression::new(key, Operator::NotIn, values));
            } else if let Some((key, values)) = split_set(term, " in ") {
                exprs.push(Expression::new(key, Operator::In, values));
            } else if term.contains('(') || term.contains(')') {
                return Err(ParseError(s.to_string()));
            } else if let Some((k, v)) = term.split_once("!=") {
                exprs.push(Expression::new(k.trim(), Operator::NotIn, Some(v.trim())));
            } else if let Some((k, v)) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
            {
                labels.insert(k.trim().to_string(), v.trim().to_string());
            } else {
                exprs.push(Expression::new(term, Operator::Exists, None));
            }
        }
        Ok(Self {
            match_labels: (!labels.is_empty()).then_some(labels),
            match_expressions: (!exprs.is_empty()).then_some(exprs),
        })
    }
}

fn split_terms(s: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let (mut depth, mut start) = (0usize, 0);
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&s[start..]);
    terms
}

fn split_set<'a>(term: &'a str, op: &str) -> Option<(&'a str, Vec<&'a str>)> {
    let (key, rest) = term.split_once(op)?;
    let inner = rest.trim().strip_prefix('(')?.strip_suffix(')')?;
    let values = inner
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    Some((key.trim(), values))
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === Labels ===

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === Expression ===

impl Expression {
    pub fn new<'a>(
        key: &str,
        operator: Operator,
        values: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            key: key.to_string(),
            operator,
            values: values.into_iter().map(str::to_string).collect(),
        }
    }

    fn matches(&self, labels: &Map) -> bool {
        match self.operator {
            Operator::In => labels.get(&self.key).is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => labels
                .get(&self.key)
                .map_or(true, |v| !self.values.contains(v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            Operator::In => write!(f, "{} in ({set})", self.key),
            Operator::NotIn => write!(f, "{} notin ({set})", self.key),
            Operator::Exists => f.write_str(&self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}
