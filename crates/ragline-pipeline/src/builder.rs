//! Builder for pipeline step graphs

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::executor::{Pipeline, Step};
use crate::BoundStage;
use ragline_core::{Combinator, Error, FanoutPolicy, Result};

/// Builds a [`Pipeline`] as an ordered list of steps
#[derive(Default)]
pub struct PipelineBuilder {
    steps: Vec<Step>,
    deadline: Option<Duration>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; its output becomes the next current value
    pub fn stage(mut self, name: impl Into<String>, stage: impl Into<BoundStage>) -> Self {
        self.steps.push(Step::Stage {
            name: name.into(),
            stage: stage.into(),
        });
        self
    }

    /// Append a parallel fan-out block
    pub fn parallel(
        mut self,
        name: impl Into<String>,
        combinator: Combinator,
        build: impl FnOnce(ParallelBuilder) -> ParallelBuilder,
    ) -> Self {
        let block = build(ParallelBuilder::default());
        self.steps.push(Step::Parallel {
            name: name.into(),
            members: block.members.into_iter().map(Arc::new).collect(),
            combinator,
            policy: block.policy,
        });
        self
    }

    /// Append a nested sequence of steps
    pub fn sequence(
        mut self,
        name: impl Into<String>,
        build: impl FnOnce(PipelineBuilder) -> PipelineBuilder,
    ) -> Self {
        let nested = build(PipelineBuilder::default());
        self.steps.push(Step::Sequence {
            name: name.into(),
            steps: nested.steps.into_iter().map(Arc::new).collect(),
        });
        self
    }

    /// Default deadline applied to every invocation
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        if self.steps.is_empty() {
            return Err(Error::Configuration("pipeline has no stages".to_string()));
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            validate(step, &mut names)?;
        }

        Ok(Pipeline::new(
            self.steps.into_iter().map(Arc::new).collect(),
            self.deadline,
        ))
    }
}

/// Members of a parallel block; each receives the block's input
pub struct ParallelBuilder {
    members: Vec<Step>,
    policy: FanoutPolicy,
}

impl Default for ParallelBuilder {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            policy: FanoutPolicy::Strict,
        }
    }
}

impl ParallelBuilder {
    pub fn stage(mut self, name: impl Into<String>, stage: impl Into<BoundStage>) -> Self {
        self.members.push(Step::Stage {
            name: name.into(),
            stage: stage.into(),
        });
        self
    }

    /// A branch made of several sequential steps
    pub fn sequence(
        mut self,
        name: impl Into<String>,
        build: impl FnOnce(PipelineBuilder) -> PipelineBuilder,
    ) -> Self {
        let nested = build(PipelineBuilder::default());
        self.members.push(Step::Sequence {
            name: name.into(),
            steps: nested.steps.into_iter().map(Arc::new).collect(),
        });
        self
    }

    pub fn policy(mut self, policy: FanoutPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn validate(step: &Step, names: &mut HashSet<String>) -> Result<()> {
    if !names.insert(step.name().to_string()) {
        return Err(Error::Configuration(format!(
            "duplicate stage name '{}'",
            step.name()
        )));
    }

    match step {
        Step::Stage { .. } => Ok(()),
        Step::Parallel { name, members, .. } => {
            if members.is_empty() {
                return Err(Error::Configuration(format!(
                    "parallel block '{}' has no members",
                    name
                )));
            }
            members.iter().try_for_each(|m| validate(m, names))
        }
        Step::Sequence { name, steps } => {
            if steps.is_empty() {
                return Err(Error::Configuration(format!(
                    "sequence '{}' has no steps",
                    name
                )));
            }
            steps.iter().try_for_each(|s| validate(s, names))
        }
    }
}
