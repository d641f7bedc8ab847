//! Per-invocation pipeline state

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::{CaptureRef, Value};
use ragline_core::{Error, Result};

/// Lifecycle of one pipeline invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// A value captured at one pipeline position, available to later stages
#[derive(Debug, Clone)]
pub struct BoundValue {
    pub reference: CaptureRef,
    pub value: Value,
}

/// State owned by a single invocation: its id, lifecycle state and the
/// capture table. Never shared between invocations.
#[derive(Debug)]
pub struct PipelineContext {
    id: Uuid,
    state: RwLock<InvocationState>,
    captures: RwLock<HashMap<CaptureRef, BoundValue>>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RwLock::new(InvocationState::Idle),
            captures: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> InvocationState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn transition(&self, next: InvocationState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Record `value` under `reference`, replacing an earlier capture
    pub fn capture(&self, reference: CaptureRef, value: Value) -> Result<()> {
        let mut captures = self
            .captures
            .write()
            .map_err(|e| Error::Other(format!("Lock error: {}", e)))?;
        captures.insert(reference.clone(), BoundValue { reference, value });
        Ok(())
    }

    /// Look up a captured value
    pub fn resolve(&self, reference: &CaptureRef) -> Result<Option<Value>> {
        let captures = self
            .captures
            .read()
            .map_err(|e| Error::Other(format!("Lock error: {}", e)))?;
        Ok(captures.get(reference).map(|bound| bound.value.clone()))
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}
