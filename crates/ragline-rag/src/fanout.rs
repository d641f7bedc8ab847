//! Concurrent retrieval over several retrievers with a merge step

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{Instrument, info, info_span};

use ragline_core::{Combinator, FanoutPolicy, MergedResult, Result, gather};
use ragline_pipeline::{BoundArgs, Stage, Value};

use crate::Retriever;

/// Runs every retriever against the same query as its own task.
///
/// The executor waits for all members before merging; there is no partial
/// join. Under the default strict policy the first failing retriever aborts
/// the others and its error is returned unchanged.
pub struct FanoutExecutor {
    retrievers: Vec<Arc<Retriever>>,
    combinator: Combinator,
    policy: FanoutPolicy,
}

impl FanoutExecutor {
    pub fn new(retrievers: Vec<Arc<Retriever>>) -> Self {
        Self {
            retrievers,
            combinator: Combinator::default(),
            policy: FanoutPolicy::default(),
        }
    }

    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = combinator;
        self
    }

    pub fn with_policy(mut self, policy: FanoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retrievers(&self) -> &[Arc<Retriever>] {
        &self.retrievers
    }

    pub async fn run_fanout(&self, query: &str) -> Result<Vec<MergedResult>> {
        let span = info_span!(
            "fanout",
            retrievers = self.retrievers.len(),
            combinator = ?self.combinator,
            policy = ?self.policy
        );

        let members = self
            .retrievers
            .iter()
            .map(|retriever| {
                let retriever = retriever.clone();
                let query = query.to_string();
                let name = retriever.name().to_string();
                (name, async move { retriever.retrieve(&query).await }.boxed())
            })
            .collect();

        let lists = gather(members, self.policy).instrument(span.clone()).await?;
        let returned = lists.len();
        let merged = self.combinator.merge(lists);

        span.in_scope(|| info!(returned, merged = merged.len(), "fan-out merged"));
        Ok(merged)
    }
}

#[async_trait]
impl Stage for FanoutExecutor {
    async fn call(&self, input: Value, _args: &BoundArgs) -> Result<Value> {
        let query = input.into_text()?;
        Ok(Value::Merged(self.run_fanout(&query).await?))
    }
}
