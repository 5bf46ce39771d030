//! API Gateway API key

use async_trait::async_trait;
use lumiplug::diff::ObjectDiff;
use lumiplug::{
    Context, FieldKind, Id, Inspection, ProviderError, ResourceOps, ResourceSchema, Type,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cloud::Cloud;

pub const TOKEN: &str = "aws:apigateway/apiKey:APIKey";

/// Stage the key is bound to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageKey {
    #[serde(rename = "restAPI", skip_serializing_if = "Option::is_none")]
    pub rest_api: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiKey {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_keys: Option<StageKey>,
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::builder(Type::new(TOKEN).expect("valid API key token"))
        .required_replace("name", FieldKind::String)
        .optional_replace("keyName", FieldKind::String)
        .optional("description", FieldKind::String)
        .optional("enabled", FieldKind::Bool)
        .optional("stageKeys", FieldKind::Object)
        .build()
}

pub struct ApiKeyOps {
    cloud: Arc<Cloud>,
}

impl ApiKeyOps {
    pub fn new(cloud: Arc<Cloud>) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl ResourceOps for ApiKeyOps {
    type Resource = ApiKey;

    async fn create(&self, _ctx: Context, mut key: ApiKey) -> Result<Id, ProviderError> {
        key.enabled.get_or_insert(false);
        let id = self.cloud.allocate("ak");
        self.cloud.api_keys.insert(id.clone(), key)?;
        tracing::info!(id = %id, "Created API key");
        Ok(id)
    }

    async fn get(&self, _ctx: Context, id: Id) -> Result<ApiKey, ProviderError> {
        self.cloud.api_keys.get(&id)
    }

    /// A key cannot be moved to another REST API once bound
    async fn inspect_change(
        &self,
        _ctx: Context,
        _id: Id,
        old: ApiKey,
        new: ApiKey,
        _diff: ObjectDiff,
    ) -> Result<Inspection, ProviderError> {
        let bound = old.stage_keys.and_then(|s| s.rest_api);
        let wanted = new.stage_keys.and_then(|s| s.rest_api);
        match (bound, wanted) {
            (Some(bound), Some(wanted)) if bound != wanted => {
                Ok(Inspection::replace(["stageKeys"]))
            }
            (Some(_), None) => Ok(Inspection::replace(["stageKeys"])),
            _ => Ok(Inspection::default()),
        }
    }

    async fn update(
        &self,
        _ctx: Context,
        id: Id,
        _old: ApiKey,
        new: ApiKey,
        diff: ObjectDiff,
    ) -> Result<(), ProviderError> {
        let mut current = self.cloud.api_keys.get(&id)?;
        current.description = new.description;
        current.enabled = new.enabled.or(current.enabled);
        current.stage_keys = new.stage_keys;
        self.cloud.api_keys.put(&id, current)?;

        tracing::info!(id = %id, changed = ?diff.changed_keys(), "Updated API key");
        Ok(())
    }

    async fn delete(&self, _ctx: Context, id: Id) -> Result<(), ProviderError> {
        self.cloud.api_keys.remove(&id)?;
        tracing::info!(id = %id, "Deleted API key");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn bound_to(api: &str) -> ApiKey {
        ApiKey {
            name: "ci".to_string(),
            stage_keys: Some(StageKey {
                rest_api: Some(api.to_string()),
                stage: Some("prod".to_string()),
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rebinding_to_another_api_forces_replacement() {
        let ops = ApiKeyOps::new(Arc::new(Cloud::new()));
        let id = Id::new("ak-1");

        let inspection = ops
            .inspect_change(
                Context::new(),
                id.clone(),
                bound_to("api-1"),
                bound_to("api-2"),
                ObjectDiff::default(),
            )
            .await
            .unwrap();
        assert_eq!(inspection.replaces, vec!["stageKeys".to_string()]);

        let inspection = ops
            .inspect_change(
                Context::new(),
                id,
                ApiKey::default(),
                bound_to("api-1"),
                ObjectDiff::default(),
            )
            .await
            .unwrap();
        assert!(inspection.replaces.is_empty());
    }

    #[tokio::test]
    async fn keys_start_disabled() {
        let ops = ApiKeyOps::new(Arc::new(Cloud::new()));
        let id = ops.create(Context::new(), ApiKey::default()).await.unwrap();
        assert_eq!(ops.get(Context::new(), id).await.unwrap().enabled, Some(false));
    }
}
