//! Stage pipelines for ragline
//!
//! A [`Pipeline`] threads one [`Value`] through a declared chain of steps.
//! Steps are plain stages, nested sequences, or parallel fan-out blocks whose
//! members all receive the same input and whose outputs are fused by a
//! [`Combinator`]. Stages can declare bound parameters that are resolved from
//! values captured earlier in the same invocation (the pipeline input, or the
//! output of a named step), see [`Bindings`].

mod binder;
mod builder;
mod context;
mod executor;
mod stage;
mod value;


pub use binder::{BoundArgs, Bindings, CaptureRef, bind};
pub use builder::{ParallelBuilder, PipelineBuilder};
pub use context::{BoundValue, InvocationState, PipelineContext};
pub use executor::Pipeline;
pub use stage::{BoundStage, FnStage, Stage, StageExt, stage_fn};
pub use value::Value;

// Re-export core types for convenience
pub use ragline_core::{Combinator, Error, FanoutPolicy, Result};
