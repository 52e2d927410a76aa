//! Mutations: the only sanctioned path to modify state.
//!
//! A mutation is a named async operation invoked by
//! [`Reactive::dispatch`](crate::Reactive::dispatch). It receives a
//! [`MutationContext`] carrying the state manager and the update service,
//! validates its arguments, optionally awaits the service, and applies the
//! returned records while the gate is open.
//!
//! Contract violations surface as [`StateError`](crate::StateError);
//! service failures travel as `anyhow::Error` and their handling policy is
//! mutation-specific.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::manager::StateManager;
use crate::service::UpdateService;

/// Everything a mutation needs: the tree, the service, and a correlation
/// id for log lines.
pub struct MutationContext<'a> {
    pub manager: &'a mut StateManager,
    pub service: &'a dyn UpdateService,
    /// Ties log lines of one dispatch together.
    pub correlation: Uuid,
}

/// Arguments passed to [`Reactive::dispatch`](crate::Reactive::dispatch),
/// carried as JSON and parsed by each mutation into its own typed struct.
#[derive(Debug, Clone, Default)]
pub struct MutationArgs(Value);

impl MutationArgs {
    /// No arguments.
    pub fn none() -> Self {
        Self(Value::Null)
    }

    /// Wrap any serializable argument struct.
    pub fn new<T: Serialize>(args: T) -> Result<Self> {
        Ok(Self(serde_json::to_value(args)?))
    }

    /// Parse into the mutation's typed argument struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.0.clone()).map_err(Into::into)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for MutationArgs {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A named async state operation.
#[async_trait]
pub trait Mutation: Send + Sync {
    async fn apply(&self, ctx: MutationContext<'_>, args: MutationArgs) -> Result<()>;
}
