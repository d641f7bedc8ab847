//! Pipeline interpreter

use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    BoundStage, CaptureRef, InvocationState, PipelineBuilder, PipelineContext, Value,
};
use ragline_core::{Combinator, Error, FanoutPolicy, Result, gather};

/// One node of the step graph
pub(crate) enum Step {
    Stage {
        name: String,
        stage: BoundStage,
    },
    Parallel {
        name: String,
        members: Vec<Arc<Step>>,
        combinator: Combinator,
        policy: FanoutPolicy,
    },
    Sequence {
        name: String,
        steps: Vec<Arc<Step>>,
    },
}

impl Step {
    pub(crate) fn name(&self) -> &str {
        match self {
            Step::Stage { name, .. } | Step::Parallel { name, .. } | Step::Sequence { name, .. } => {
                name
            }
        }
    }
}

/// An executable pipeline.
///
/// Each invocation gets its own [`PipelineContext`]; a pipeline can be
/// invoked concurrently from several tasks.
pub struct Pipeline {
    steps: Arc<Vec<Arc<Step>>>,
    deadline: Option<Duration>,
}

impl Pipeline {
    pub(crate) fn new(steps: Vec<Arc<Step>>, deadline: Option<Duration>) -> Self {
        Self {
            steps: Arc::new(steps),
            deadline,
        }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Names of the top-level steps in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run one invocation with the pipeline's default deadline, if any
    pub async fn invoke(&self, input: impl Into<Value>) -> Result<Value> {
        let ctx = PipelineContext::new();
        self.invoke_in(&Arc::new(ctx), input.into(), self.deadline).await
    }

    /// Run one invocation that fails with `Timeout` once `deadline` elapses.
    ///
    /// In-flight stages, including fan-out members, are cancelled.
    pub async fn invoke_with_deadline(
        &self,
        input: impl Into<Value>,
        deadline: Duration,
    ) -> Result<Value> {
        let ctx = PipelineContext::new();
        self.invoke_in(&Arc::new(ctx), input.into(), Some(deadline)).await
    }

    /// Run one invocation inside a caller-provided, unused context.
    ///
    /// The context reports the invocation state once the call returns.
    pub async fn invoke_in(
        &self,
        ctx: &Arc<PipelineContext>,
        input: Value,
        deadline: Option<Duration>,
    ) -> Result<Value> {
        if ctx.state() != InvocationState::Idle {
            return Err(Error::InvalidInput(
                "pipeline context was already used by another invocation".to_string(),
            ));
        }

        let span = info_span!("pipeline", invocation_id = %ctx.id());
        let started = Instant::now();

        ctx.transition(InvocationState::Running);
        ctx.capture(CaptureRef::Input, input.clone())?;

        let run = run_sequence(self.steps.clone(), input, ctx.clone());
        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, run).instrument(span.clone()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!(
                    "pipeline invocation exceeded {:?}",
                    limit
                ))),
            },
            None => run.instrument(span.clone()).await,
        };

        span.in_scope(|| match &outcome {
            Ok(_) => {
                ctx.transition(InvocationState::Completed);
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "invocation completed");
            }
            Err(e) => {
                ctx.transition(InvocationState::Failed);
                warn!(error = %e, "invocation failed");
            }
        });

        outcome
    }
}

fn run_sequence(
    steps: Arc<Vec<Arc<Step>>>,
    input: Value,
    ctx: Arc<PipelineContext>,
) -> BoxFuture<'static, Result<Value>> {
    async move {
        let mut current = input;
        for step in steps.iter() {
            current = run_step(step.clone(), current, ctx.clone()).await?;
        }
        Ok(current)
    }
    .boxed()
}

fn run_step(
    step: Arc<Step>,
    input: Value,
    ctx: Arc<PipelineContext>,
) -> BoxFuture<'static, Result<Value>> {
    async move {
        let output = match step.as_ref() {
            Step::Stage { name, stage } => {
                let args = stage.bindings.resolve(&ctx)?;
                debug!(stage = %name, input = input.kind(), "running stage");
                stage.stage.call(input, &args).await?
            }
            Step::Sequence { steps, .. } => {
                let mut current = input;
                for nested in steps {
                    current = run_step(nested.clone(), current, ctx.clone()).await?;
                }
                current
            }
            Step::Parallel {
                name,
                members,
                combinator,
                policy,
            } => {
                debug!(block = %name, members = members.len(), "fanning out");
                let tasks = members
                    .iter()
                    .map(|member| {
                        (
                            member.name().to_string(),
                            run_step(member.clone(), input.clone(), ctx.clone()),
                        )
                    })
                    .collect();
                let outputs = gather(tasks, *policy).await?;
                Value::combine(*combinator, outputs)?
            }
        };

        ctx.capture(CaptureRef::Output(step.name().to_string()), output.clone())?;
        Ok(output)
    }
    .boxed()
}
