//! Concurrent fan-out with an explicit failure policy

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::{Error, Result};

/// What a fan-out does when one of its members fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutPolicy {
    /// The first member failure aborts the remaining members and is returned
    #[default]
    Strict,
    /// Failed members are logged and dropped
    BestEffort,
}

/// Run every member concurrently as its own task and wait for all of them.
///
/// Outputs are returned in declared member order. Under
/// [`FanoutPolicy::Strict`] the first failure aborts the still-running members
/// and is returned unchanged. Dropping the returned future aborts all members.
pub async fn gather<T>(
    members: Vec<(String, BoxFuture<'static, Result<T>>)>,
    policy: FanoutPolicy,
) -> Result<Vec<T>>
where
    T: Send + 'static,
{
    let total = members.len();
    let mut names = Vec::with_capacity(total);
    let mut set = JoinSet::new();

    for (index, (name, member)) in members.into_iter().enumerate() {
        names.push(name);
        set.spawn(async move {
            let outcome = AssertUnwindSafe(member)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(Error::Other("fan-out member panicked".to_string())));
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();

    while let Some(joined) = set.join_next().await {
        let (index, outcome) =
            joined.map_err(|e| Error::Other(format!("fan-out task failed to join: {}", e)))?;

        match outcome {
            Ok(value) => {
                debug!(member = %names[index], "fan-out member completed");
                slots[index] = Some(value);
            }
            Err(e) => match policy {
                FanoutPolicy::Strict => {
                    set.abort_all();
                    return Err(e);
                }
                FanoutPolicy::BestEffort => {
                    warn!(member = %names[index], error = %e, "dropping failed fan-out member");
                }
            },
        }
    }

    Ok(slots.into_iter().flatten().collect())
}
