//! Resource trait implemented by provider plugins
//!
//! One [`ResourceOps`] implementation handles one resource kind. It works on a
//! typed `Resource` structure; the provider decodes incoming property maps
//! against the kind's schema before calling it.

use crate::context::Context;
use crate::diff::ObjectDiff;
use crate::error::ProviderError;
use crate::property::{CheckFailure, Id, PropertyKey, PropertyMap};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Provider-specific verdict on a proposed change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inspection {
    /// Keys that force replacement beyond the schema's static triggers
    pub replaces: Vec<PropertyKey>,
    /// Property values the provider computed for the new state
    pub changes: PropertyMap,
}

impl Inspection {
    pub fn replace(keys: impl IntoIterator<Item = impl Into<PropertyKey>>) -> Self {
        Self {
            replaces: keys.into_iter().map(Into::into).collect(),
            changes: PropertyMap::new(),
        }
    }
}

/// Lifecycle operations for one resource kind
#[async_trait]
pub trait ResourceOps: Send + Sync + 'static {
    /// Typed form of the kind's properties
    type Resource: Serialize + DeserializeOwned + Send + Sync;

    /// Validation beyond what the schema expresses
    async fn check(&self, _ctx: Context, _resource: Self::Resource) -> Vec<CheckFailure> {
        Vec::new()
    }

    async fn create(&self, ctx: Context, resource: Self::Resource) -> Result<Id, ProviderError>;

    async fn get(&self, ctx: Context, id: Id) -> Result<Self::Resource, ProviderError>;

    /// Reports replacement triggers that depend on the values involved
    ///
    /// Only called when old and new differ.
    async fn inspect_change(
        &self,
        _ctx: Context,
        _id: Id,
        _old: Self::Resource,
        _new: Self::Resource,
        _diff: ObjectDiff,
    ) -> Result<Inspection, ProviderError> {
        Ok(Inspection::default())
    }

    async fn update(
        &self,
        ctx: Context,
        id: Id,
        old: Self::Resource,
        new: Self::Resource,
        diff: ObjectDiff,
    ) -> Result<(), ProviderError>;

    async fn delete(&self, ctx: Context, id: Id) -> Result<(), ProviderError>;
}
