//! The data value threaded through a pipeline

use std::collections::BTreeMap;
use std::fmt;

use ragline_core::{Combinator, Error, MergedResult, Result, RetrievalResult};

/// Current data value of a pipeline invocation
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Number(f64),
    /// Ranked output of a single retriever
    Results(Vec<RetrievalResult>),
    /// Fused candidates from a fan-out
    Merged(Vec<MergedResult>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Results(_) => "results",
            Value::Merged(_) => "merged",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Value::Text(text) => Ok(text),
            other => Err(Error::InvalidInput(format!(
                "expected text, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_map(self) -> Result<BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Ok(map),
            other => Err(Error::InvalidInput(format!(
                "expected map, got {}",
                other.kind()
            ))),
        }
    }

    /// Interpret the value as a candidate list.
    ///
    /// A single retriever's results are treated as an already-ranked list
    /// with one contribution per node.
    pub fn into_candidates(self) -> Result<Vec<MergedResult>> {
        match self {
            Value::Merged(merged) => Ok(merged),
            Value::Results(results) => Ok(Combinator::Sum.merge(vec![results])),
            Value::List(items) if items.is_empty() => Ok(Vec::new()),
            other => Err(Error::InvalidInput(format!(
                "expected retrieval candidates, got {}",
                other.kind()
            ))),
        }
    }

    /// Fuse the outputs of a parallel block.
    ///
    /// Retrieval outputs are merged by node id under the combinator. For other
    /// values `Sum` adds numbers and concatenates texts or lists, `Max` keeps
    /// the largest number, and `Concat` collects the outputs into a list.
    /// An empty set of outputs fuses to an empty candidate list.
    pub fn combine(combinator: Combinator, outputs: Vec<Value>) -> Result<Value> {
        if outputs.is_empty() {
            return Ok(match combinator {
                Combinator::Concat => Value::List(Vec::new()),
                _ => Value::Merged(Vec::new()),
            });
        }

        if outputs
            .iter()
            .all(|v| matches!(v, Value::Results(_) | Value::Merged(_)))
        {
            let lists = outputs
                .into_iter()
                .map(|v| match v {
                    Value::Results(results) => results,
                    Value::Merged(merged) => merged
                        .into_iter()
                        .flat_map(|m| m.contributing_results)
                        .collect(),
                    _ => Vec::new(),
                })
                .collect();
            return Ok(Value::Merged(combinator.merge(lists)));
        }

        match combinator {
            Combinator::Concat => Ok(Value::List(outputs)),
            Combinator::Sum => sum_values(outputs),
            Combinator::Max => max_values(outputs),
        }
    }
}

fn sum_values(outputs: Vec<Value>) -> Result<Value> {
    let kinds: Vec<&str> = outputs.iter().map(Value::kind).collect();

    if outputs.iter().all(|v| matches!(v, Value::Number(_))) {
        let total = outputs
            .iter()
            .filter_map(|v| match v {
                Value::Number(n) => Some(*n),
                _ => None,
            })
            .sum();
        return Ok(Value::Number(total));
    }

    if outputs.iter().all(|v| matches!(v, Value::Text(_))) {
        let joined = outputs
            .into_iter()
            .filter_map(|v| v.into_text().ok())
            .collect::<String>();
        return Ok(Value::Text(joined));
    }

    if outputs.iter().all(|v| matches!(v, Value::List(_))) {
        let flattened = outputs
            .into_iter()
            .flat_map(|v| match v {
                Value::List(items) => items,
                _ => Vec::new(),
            })
            .collect();
        return Ok(Value::List(flattened));
    }

    Err(Error::Configuration(format!(
        "cannot sum parallel outputs of kinds {:?}",
        kinds
    )))
}

fn max_values(outputs: Vec<Value>) -> Result<Value> {
    let mut best: Option<f64> = None;
    for value in &outputs {
        match value {
            Value::Number(n) => best = Some(best.map_or(*n, |b| b.max(*n))),
            other => {
                return Err(Error::Configuration(format!(
                    "cannot take the max of a {} output",
                    other.kind()
                )));
            }
        }
    }
    Ok(best.map(Value::Number).unwrap_or(Value::Null))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(text) => write!(f, "{}", text),
            Value::Number(n) => write!(f, "{}", n),
            Value::Results(results) => {
                let texts: Vec<&str> = results.iter().map(|r| r.node.text.as_str()).collect();
                write!(f, "{}", texts.join("\n"))
            }
            Value::Merged(merged) => {
                let texts: Vec<&str> = merged.iter().map(|m| m.node.text.as_str()).collect();
                write!(f, "{}", texts.join("\n"))
            }
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", rendered.join("\n"))
            }
            Value::Map(map) => {
                let rendered: Vec<String> =
                    map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{}", rendered.join("\n"))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Vec<RetrievalResult>> for Value {
    fn from(results: Vec<RetrievalResult>) -> Self {
        Value::Results(results)
    }
}

impl From<Vec<MergedResult>> for Value {
    fn from(merged: Vec<MergedResult>) -> Self {
        Value::Merged(merged)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}
