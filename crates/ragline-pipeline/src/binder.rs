//! Bound parameters: values injected into a stage from earlier captures

use std::collections::HashMap;
use std::fmt;

use crate::{PipelineContext, Value};
use ragline_core::{Error, Result};

/// Where a bound parameter takes its value from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaptureRef {
    /// The input the pipeline was invoked with
    Input,
    /// The output of an earlier named step
    Output(String),
}

impl CaptureRef {
    pub fn output(name: impl Into<String>) -> Self {
        CaptureRef::Output(name.into())
    }
}

impl fmt::Display for CaptureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureRef::Input => write!(f, "pipeline input"),
            CaptureRef::Output(name) => write!(f, "output of '{}'", name),
        }
    }
}

/// Declared parameter bindings of one stage, `param -> capture`
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, CaptureRef)>,
}

/// Start a binding list, e.g. `bind("query", CaptureRef::Input)`
pub fn bind(param: impl Into<String>, reference: CaptureRef) -> Bindings {
    Bindings::default().bind(param, reference)
}

impl Bindings {
    pub fn bind(mut self, param: impl Into<String>, reference: CaptureRef) -> Self {
        let param = param.into();
        self.entries.retain(|(existing, _)| *existing != param);
        self.entries.push((param, reference));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CaptureRef)> {
        self.entries.iter().map(|(param, reference)| (param.as_str(), reference))
    }

    /// Resolve every binding against the invocation's captures.
    ///
    /// Fails with `UnboundReference` when a reference was never captured.
    pub fn resolve(&self, ctx: &PipelineContext) -> Result<BoundArgs> {
        let mut args = BoundArgs::default();
        for (param, reference) in &self.entries {
            let value = ctx
                .resolve(reference)?
                .ok_or_else(|| Error::UnboundReference {
                    param: param.clone(),
                    reference: reference.to_string(),
                })?;
            args.values.insert(param.clone(), value);
        }
        Ok(args)
    }
}

/// Resolved bound parameters handed to a stage call
#[derive(Debug, Clone, Default)]
pub struct BoundArgs {
    values: HashMap<String, Value>,
}

impl BoundArgs {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, param: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(param.into(), value.into());
        self
    }

    pub fn get(&self, param: &str) -> Option<&Value> {
        self.values.get(param)
    }

    /// A parameter the stage cannot run without
    pub fn require(&self, param: &str) -> Result<&Value> {
        self.values.get(param).ok_or_else(|| Error::UnboundReference {
            param: param.to_string(),
            reference: "<not bound>".to_string(),
        })
    }

    pub fn require_text(&self, param: &str) -> Result<&str> {
        let value = self.require(param)?;
        value.as_text().ok_or_else(|| {
            Error::InvalidInput(format!(
                "bound parameter '{}' must be text, got {}",
                param,
                value.kind()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_input_binding() {
        let ctx = PipelineContext::new();
        ctx.capture(CaptureRef::Input, "what is rust".into()).unwrap();

        let args = bind("query", CaptureRef::Input).resolve(&ctx).unwrap();
        assert_eq!(args.require_text("query").unwrap(), "what is rust");
    }

    #[test]
    fn test_unbound_reference() {
        let ctx = PipelineContext::new();
        let err = bind("query", CaptureRef::output("retrieve"))
            .resolve(&ctx)
            .unwrap_err();

        match err {
            Error::UnboundReference { param, reference } => {
                assert_eq!(param, "query");
                assert_eq!(reference, "output of 'retrieve'");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_rebinding_replaces_previous_reference() {
        let bindings = bind("query", CaptureRef::Input).bind("query", CaptureRef::output("rewrite"));
        let refs: Vec<_> = bindings.iter().collect();
        assert_eq!(refs, vec![("query", &CaptureRef::output("rewrite"))]);
    }

    #[test]
    fn test_require_outside_invocation() {
        let args = BoundArgs::empty();
        assert!(matches!(
            args.require("query"),
            Err(Error::UnboundReference { .. })
        ));
    }
}
