//! Pipeline stages

use async_trait::async_trait;
use std::sync::Arc;

use crate::{BoundArgs, Bindings, CaptureRef, Value};
use ragline_core::Result;

/// A unit of work in a pipeline.
///
/// `input` is the current data value; `args` carries the stage's resolved
/// bound parameters (empty when the stage declares none).
#[async_trait]
pub trait Stage: Send + Sync {
    async fn call(&self, input: Value, args: &BoundArgs) -> Result<Value>;
}

#[async_trait]
impl<S: Stage + ?Sized> Stage for Arc<S> {
    async fn call(&self, input: Value, args: &BoundArgs) -> Result<Value> {
        (**self).call(input, args).await
    }
}

/// A stage together with its declared parameter bindings
#[derive(Clone)]
pub struct BoundStage {
    pub(crate) stage: Arc<dyn Stage>,
    pub(crate) bindings: Bindings,
}

impl BoundStage {
    pub fn bind(mut self, param: impl Into<String>, reference: CaptureRef) -> Self {
        self.bindings = self.bindings.bind(param, reference);
        self
    }

    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        for (param, reference) in bindings.iter() {
            self.bindings = self.bindings.bind(param, reference.clone());
        }
        self
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

impl<S: Stage + 'static> From<S> for BoundStage {
    fn from(stage: S) -> Self {
        Self {
            stage: Arc::new(stage),
            bindings: Bindings::default(),
        }
    }
}

/// `stage.bind("query", CaptureRef::Input)` sugar for any stage
pub trait StageExt: Stage + Sized + 'static {
    fn bind(self, param: impl Into<String>, reference: CaptureRef) -> BoundStage {
        BoundStage::from(self).bind(param, reference)
    }
}

impl<S: Stage + 'static> StageExt for S {}

/// A stage backed by a plain function of the current value and bound args
pub struct FnStage<F> {
    f: F,
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(Value, &BoundArgs) -> Result<Value> + Send + Sync,
{
    async fn call(&self, input: Value, args: &BoundArgs) -> Result<Value> {
        (self.f)(input, args)
    }
}

/// Wrap a function as a stage
pub fn stage_fn<F>(f: F) -> FnStage<F>
where
    F: Fn(Value, &BoundArgs) -> Result<Value> + Send + Sync,
{
    FnStage { f }
}
