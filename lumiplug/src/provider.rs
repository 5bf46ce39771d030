//! Provider-side dispatch of lifecycle calls to resource implementations
//!
//! A [`ResourceProvider`] serves one package. Each resource kind is registered
//! with its schema and a [`ResourceOps`] implementation; incoming calls are
//! routed by type token, decoded against the schema, and handed to the ops as
//! typed values.

use crate::context::Context;
use crate::error::{LumiplugError, ProviderError, Result};
use crate::mapper::{decode, encode};
use crate::plan::static_replaces;
use crate::property::{CheckFailure, Id, PropertyKey, PropertyMap, PropertyValue};
use crate::resource::{Inspection, ResourceOps};
use crate::schema::{ResourceSchema, SchemaRegistry};
use crate::tokens::{Package, Type};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased view of one registered resource kind
#[async_trait]
trait ResourceHandler: Send + Sync {
    fn schema(&self) -> &ResourceSchema;

    async fn check(&self, ctx: Context, props: PropertyMap) -> Vec<CheckFailure>;

    async fn create(&self, ctx: Context, props: PropertyMap) -> std::result::Result<Id, ProviderError>;

    async fn get(&self, ctx: Context, id: Id) -> std::result::Result<PropertyMap, ProviderError>;

    async fn inspect_change(
        &self,
        ctx: Context,
        id: Id,
        olds: PropertyMap,
        news: PropertyMap,
    ) -> std::result::Result<Inspection, ProviderError>;

    async fn update(
        &self,
        ctx: Context,
        id: Id,
        olds: PropertyMap,
        news: PropertyMap,
    ) -> std::result::Result<(), ProviderError>;

    async fn delete(&self, ctx: Context, id: Id) -> std::result::Result<(), ProviderError>;
}

struct TypedHandler<O: ResourceOps> {
    schema: ResourceSchema,
    ops: O,
}

#[async_trait]
impl<O: ResourceOps> ResourceHandler for TypedHandler<O> {
    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    async fn check(&self, ctx: Context, props: PropertyMap) -> Vec<CheckFailure> {
        match decode::<O::Resource>(&self.schema, &props) {
            Ok(resource) => self.ops.check(ctx, resource).await,
            Err(e) => e.failures.into_iter().map(CheckFailure::from).collect(),
        }
    }

    async fn create(&self, ctx: Context, props: PropertyMap) -> std::result::Result<Id, ProviderError> {
        let resource = decode::<O::Resource>(&self.schema, &props)?;
        self.ops.create(ctx, resource).await
    }

    async fn get(&self, ctx: Context, id: Id) -> std::result::Result<PropertyMap, ProviderError> {
        let resource = self.ops.get(ctx, id).await?;
        encode(&resource).map_err(|e| ProviderError::Failed(e.to_string()))
    }

    async fn inspect_change(
        &self,
        ctx: Context,
        id: Id,
        olds: PropertyMap,
        news: PropertyMap,
    ) -> std::result::Result<Inspection, ProviderError> {
        let Some(diff) = olds.diff(&news) else {
            return Ok(Inspection::default());
        };

        let old = decode::<O::Resource>(&self.schema, &olds)?;
        let new = decode::<O::Resource>(&self.schema, &news)?;
        let mut replaces = static_replaces(&self.schema, &diff);

        let inspection = self.ops.inspect_change(ctx, id, old, new, diff).await?;
        replaces.extend(inspection.replaces);

        Ok(Inspection {
            replaces: replaces.into_keys(),
            changes: inspection.changes,
        })
    }

    async fn update(
        &self,
        ctx: Context,
        id: Id,
        olds: PropertyMap,
        news: PropertyMap,
    ) -> std::result::Result<(), ProviderError> {
        let diff = olds.diff(&news).unwrap_or_default();
        let old = decode::<O::Resource>(&self.schema, &olds)?;
        let new = decode::<O::Resource>(&self.schema, &news)?;
        self.ops.update(ctx, id, old, new, diff).await
    }

    async fn delete(&self, ctx: Context, id: Id) -> std::result::Result<(), ProviderError> {
        self.ops.delete(ctx, id).await
    }
}

/// Resource kinds served by one provider plugin
pub struct ResourceProvider {
    package: Package,
    handlers: HashMap<Type, Arc<dyn ResourceHandler>>,
}

impl ResourceProvider {
    pub fn new(package: Package) -> Self {
        Self {
            package,
            handlers: HashMap::new(),
        }
    }

    /// Adds a resource kind
    ///
    /// The schema's token must belong to this provider's package and must not
    /// be registered already.
    pub fn register<O: ResourceOps>(mut self, schema: ResourceSchema, ops: O) -> Result<Self> {
        if schema.token.package() != self.package {
            return Err(LumiplugError::Schema(format!(
                "type '{}' does not belong to package '{}'",
                schema.token, self.package
            )));
        }
        if self.handlers.contains_key(&schema.token) {
            return Err(LumiplugError::Schema(format!(
                "type '{}' is already registered",
                schema.token
            )));
        }

        tracing::debug!(package = %self.package, ty = %schema.token, "Registered resource type");
        self.handlers
            .insert(schema.token.clone(), Arc::new(TypedHandler { schema, ops }));
        Ok(self)
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Schemas of every registered kind, for clients planning changes
    pub fn schemas(&self) -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        for handler in self.handlers.values() {
            // Tokens are unique in the handler map, so this cannot collide.
            let _ = registry.register(handler.schema().clone());
        }
        registry
    }

    fn handler(&self, ty: &str) -> std::result::Result<&Arc<dyn ResourceHandler>, ProviderError> {
        let token = Type::new(ty).map_err(|e| ProviderError::InvalidArgument(e.to_string()))?;
        if token.package() != self.package {
            return Err(ProviderError::InvalidArgument(format!(
                "type '{}' does not belong to package '{}'",
                token, self.package
            )));
        }
        self.handlers
            .get(&token)
            .ok_or_else(|| ProviderError::NotFound(format!("unknown resource type '{}'", token)))
    }

    /// Validates properties; decode problems come back as failures, not errors
    pub async fn check(
        &self,
        ctx: Context,
        ty: &str,
        props: PropertyMap,
    ) -> std::result::Result<Vec<CheckFailure>, ProviderError> {
        let handler = self.handler(ty)?;
        Ok(handler.check(ctx, props).await)
    }

    /// Reads the logical name from the kind's name property
    pub fn name(
        &self,
        ty: &str,
        props: &PropertyMap,
        unknowns: &[PropertyKey],
    ) -> std::result::Result<String, ProviderError> {
        let handler = self.handler(ty)?;
        let key = &handler.schema().name_property;
        let unknown = || {
            ProviderError::InvalidArgument(
                "Name property cannot be computed from unknown outputs".to_string(),
            )
        };

        match props.get(key) {
            Some(PropertyValue::String(name)) if !name.is_empty() => Ok(name.clone()),
            Some(PropertyValue::Unknown) => Err(unknown()),
            _ if unknowns.iter().any(|k| k == key) => Err(unknown()),
            Some(PropertyValue::String(_)) | Some(PropertyValue::Null) | None => Err(
                ProviderError::InvalidArgument("Name property cannot be empty".to_string()),
            ),
            Some(other) => Err(ProviderError::InvalidArgument(format!(
                "Name property must be a string, got {}",
                other.type_name()
            ))),
        }
    }

    pub async fn create(
        &self,
        ctx: Context,
        ty: &str,
        props: PropertyMap,
    ) -> std::result::Result<Id, ProviderError> {
        self.handler(ty)?.create(ctx, props).await
    }

    pub async fn get(
        &self,
        ctx: Context,
        ty: &str,
        id: Id,
    ) -> std::result::Result<PropertyMap, ProviderError> {
        let handler = self.handler(ty)?;
        require_id(&id)?;
        handler.get(ctx, id).await
    }

    /// Static schema triggers first, then the ops' own, without duplicates
    pub async fn inspect_change(
        &self,
        ctx: Context,
        ty: &str,
        id: Id,
        olds: PropertyMap,
        news: PropertyMap,
    ) -> std::result::Result<Inspection, ProviderError> {
        let handler = self.handler(ty)?;
        require_id(&id)?;
        handler.inspect_change(ctx, id, olds, news).await
    }

    pub async fn update(
        &self,
        ctx: Context,
        ty: &str,
        id: Id,
        olds: PropertyMap,
        news: PropertyMap,
    ) -> std::result::Result<(), ProviderError> {
        let handler = self.handler(ty)?;
        require_id(&id)?;
        handler.update(ctx, id, olds, news).await
    }

    pub async fn delete(
        &self,
        ctx: Context,
        ty: &str,
        id: Id,
    ) -> std::result::Result<(), ProviderError> {
        let handler = self.handler(ty)?;
        require_id(&id)?;
        handler.delete(ctx, id).await
    }
}

fn require_id(id: &Id) -> std::result::Result<(), ProviderError> {
    if id.is_empty() {
        return Err(ProviderError::InvalidArgument(
            "resource ID must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::diff::ObjectDiff;
    use crate::schema::FieldKind;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    struct Bucket {
        name: String,
        region: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<f64>,
    }

    #[derive(Default)]
    struct BucketOps {
        stored: Mutex<HashMap<String, Bucket>>,
    }

    #[async_trait]
    impl ResourceOps for BucketOps {
        type Resource = Bucket;

        async fn check(&self, _ctx: Context, bucket: Bucket) -> Vec<CheckFailure> {
            if bucket.name.contains(' ') {
                vec![CheckFailure::new("name", "must not contain spaces")]
            } else {
                Vec::new()
            }
        }

        async fn create(&self, _ctx: Context, bucket: Bucket) -> std::result::Result<Id, ProviderError> {
            let id = format!("bucket-{}", bucket.name);
            self.stored.lock().unwrap().insert(id.clone(), bucket);
            Ok(Id::new(id))
        }

        async fn get(&self, _ctx: Context, id: Id) -> std::result::Result<Bucket, ProviderError> {
            self.stored
                .lock()
                .unwrap()
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| ProviderError::NotFound(id.to_string()))
        }

        async fn inspect_change(
            &self,
            _ctx: Context,
            _id: Id,
            old: Bucket,
            new: Bucket,
            _diff: ObjectDiff,
        ) -> std::result::Result<Inspection, ProviderError> {
            match (old.size, new.size) {
                (Some(old), Some(new)) if new < old => Ok(Inspection::replace(["size", "region"])),
                _ => Ok(Inspection::default()),
            }
        }

        async fn update(
            &self,
            _ctx: Context,
            id: Id,
            _old: Bucket,
            new: Bucket,
            _diff: ObjectDiff,
        ) -> std::result::Result<(), ProviderError> {
            self.stored.lock().unwrap().insert(id.to_string(), new);
            Ok(())
        }

        async fn delete(&self, _ctx: Context, id: Id) -> std::result::Result<(), ProviderError> {
            self.stored.lock().unwrap().remove(id.as_str());
            Ok(())
        }
    }

    const BUCKET: &str = "acme:storage/bucket:Bucket";

    fn provider() -> ResourceProvider {
        let schema = ResourceSchema::builder(Type::new(BUCKET).unwrap())
            .required_replace("name", FieldKind::String)
            .required_replace("region", FieldKind::String)
            .optional("size", FieldKind::Number)
            .build();
        ResourceProvider::new(Package::new("acme").unwrap())
            .register(schema, BucketOps::default())
            .unwrap()
    }

    fn bucket(name: &str, region: &str) -> PropertyMap {
        PropertyMap::new().with("name", name).with("region", region)
    }

    #[test]
    fn register_rejects_foreign_and_duplicate_types() {
        let foreign = ResourceSchema::builder(Type::new("aws:ec2/vpc:VPC").unwrap()).build();
        assert!(provider().register(foreign, BucketOps::default()).is_err());

        let duplicate = ResourceSchema::builder(Type::new(BUCKET).unwrap()).build();
        assert!(provider().register(duplicate, BucketOps::default()).is_err());
        assert_eq!(provider().schemas().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_errors() {
        let provider = provider();
        let props = bucket("b", "eu");

        let err = provider.create(Context::new(), "acme:storage/bucket:Nope", props.clone()).await;
        assert!(matches!(err, Err(ProviderError::NotFound(_))));

        let err = provider.create(Context::new(), "aws:ec2/vpc:VPC", props.clone()).await;
        assert!(matches!(err, Err(ProviderError::InvalidArgument(_))));

        let err = provider.create(Context::new(), "not a token", props).await;
        assert!(matches!(err, Err(ProviderError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn check_returns_decode_failures_then_ops_failures() {
        let provider = provider();

        let failures = provider
            .check(Context::new(), BUCKET, PropertyMap::new().with("size", "big"))
            .await
            .unwrap();
        let fields: Vec<_> = failures.iter().map(|f| f.property.as_str()).collect();
        assert_eq!(fields, vec!["name", "region", "size"]);

        let failures = provider
            .check(Context::new(), BUCKET, bucket("my bucket", "eu"))
            .await
            .unwrap();
        assert_eq!(failures, vec![CheckFailure::new("name", "must not contain spaces")]);

        assert!(provider
            .check(Context::new(), BUCKET, bucket("b", "eu"))
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn name_distinguishes_unknown_from_empty() {
        let provider = provider();

        let props = PropertyMap::new().with("name", "").with("region", "eu");
        let err = provider.name(BUCKET, &props, &["name".to_string()]).unwrap_err();
        assert_eq!(
            err,
            ProviderError::InvalidArgument(
                "Name property cannot be computed from unknown outputs".to_string()
            )
        );

        let err = provider.name(BUCKET, &props, &[]).unwrap_err();
        assert_eq!(
            err,
            ProviderError::InvalidArgument("Name property cannot be empty".to_string())
        );

        let props = PropertyMap::new().with("name", PropertyValue::Unknown);
        assert!(provider.name(BUCKET, &props, &[]).is_err());

        assert_eq!(provider.name(BUCKET, &bucket("b", "eu"), &[]).unwrap(), "b");
    }

    #[tokio::test]
    async fn lifecycle_round_trip() {
        let provider = provider();
        let ctx = Context::new();

        let id = provider.create(ctx.clone(), BUCKET, bucket("b", "eu")).await.unwrap();
        assert_eq!(id.as_str(), "bucket-b");

        let props = provider.get(ctx.clone(), BUCKET, id.clone()).await.unwrap();
        assert_eq!(props, bucket("b", "eu"));

        provider
            .update(ctx.clone(), BUCKET, id.clone(), props, bucket("b", "eu").with("size", 3.0))
            .await
            .unwrap();
        let props = provider.get(ctx.clone(), BUCKET, id.clone()).await.unwrap();
        assert_eq!(props.get("size"), Some(&PropertyValue::Number(3.0)));

        provider.delete(ctx.clone(), BUCKET, id.clone()).await.unwrap();
        assert!(matches!(
            provider.get(ctx, BUCKET, id).await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn inspect_change_unions_static_and_dynamic_triggers() {
        let provider = provider();
        let old = bucket("b", "eu").with("size", 5.0);
        let new = bucket("b", "us").with("size", 2.0);

        let inspection = provider
            .inspect_change(Context::new(), BUCKET, Id::new("bucket-b"), old.clone(), new)
            .await
            .unwrap();
        assert_eq!(inspection.replaces, vec!["region", "size"]);

        let inspection = provider
            .inspect_change(Context::new(), BUCKET, Id::new("bucket-b"), old.clone(), old)
            .await
            .unwrap();
        assert!(inspection.replaces.is_empty());
    }

    #[tokio::test]
    async fn empty_id_is_rejected() {
        let err = provider().delete(Context::new(), BUCKET, Id::default()).await;
        assert!(matches!(err, Err(ProviderError::InvalidArgument(_))));
    }
}
