//! Typed client for the resource lifecycle
//!
//! [`ProviderClient`] drives one provider plugin through Check, Name, Create,
//! Get, InspectChange, Update and Delete. It is `Send + Sync`; concurrent calls
//! share one channel, each on its own stream.
//!
//! Mutating calls return a [`MutationError`] on failure. Once a request has
//! been sent, its state is [`ResourceState::Unknown`] and the resource has to
//! be re-read with [`ProviderClient::get`] before cached properties are
//! trusted.

use crate::config::HostConfig;
use crate::context::{Context, Interrupted};
use crate::error::{CallSite, LumiplugError, MutationError, Operation, Result};
use crate::marshal::{
    marshal_properties, marshal_properties_with_unknowns, unmarshal_properties,
    unmarshal_properties_into, MarshalOptions, NoReferences, ReferenceResolver,
};
use crate::plan::{plan_change, ChangePlan};
use crate::plugin::Plugin;
use crate::property::{CheckFailure, Id, PropertyMap, ResourceState};
use crate::proto;
use crate::proto::ResourceProviderClient;
use crate::schema::SchemaRegistry;
use crate::tokens::{Package, Type};
use std::future::Future;
use std::sync::Arc;
use tonic::transport::Channel;

/// Client for the resource types of one package
pub struct ProviderClient {
    package: Package,
    inner: ResourceProviderClient<Channel>,
    plugin: Option<Plugin>,
    schemas: Arc<SchemaRegistry>,
    resolver: Arc<dyn ReferenceResolver>,
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("package", &self.package)
            .field("plugin", &self.plugin)
            .field("schemas", &self.schemas.len())
            .finish()
    }
}

impl ProviderClient {
    /// Launches the package's plugin and connects to it
    pub async fn launch(config: &HostConfig, package: &Package) -> Result<Self> {
        let plugin = Plugin::launch(config, package).await?;
        let inner = ResourceProviderClient::new(plugin.channel())
            .max_decoding_message_size(config.max_message_size)
            .max_encoding_message_size(config.max_message_size);

        Ok(Self {
            package: package.clone(),
            inner,
            plugin: Some(plugin),
            schemas: Arc::new(SchemaRegistry::new()),
            resolver: Arc::new(NoReferences),
        })
    }

    /// Client over an existing channel, such as an in-process server
    pub fn from_channel(package: Package, channel: Channel) -> Self {
        Self {
            package,
            inner: ResourceProviderClient::new(channel),
            plugin: None,
            schemas: Arc::new(SchemaRegistry::new()),
            resolver: Arc::new(NoReferences),
        }
    }

    /// Schemas consulted for static replace triggers
    pub fn with_schemas(mut self, schemas: Arc<SchemaRegistry>) -> Self {
        self.schemas = schemas;
        self
    }

    /// Resolver used to turn resource references into IDs
    pub fn with_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn plugin(&self) -> Option<&Plugin> {
        self.plugin.as_ref()
    }

    /// Validates candidate properties
    ///
    /// An empty list means the properties are acceptable. Errors are reserved
    /// for calls that could not be answered at all.
    pub async fn check(
        &self,
        ctx: &Context,
        ty: &Type,
        props: &PropertyMap,
    ) -> Result<Vec<CheckFailure>> {
        self.assert_package(ty);
        let site = CallSite::new(Operation::Check, ty, None);
        log_executing(&site);

        let (properties, unknowns) =
            marshal_properties_with_unknowns(props, MarshalOptions::preview(), self.resolver())?;
        let request = proto::CheckRequest {
            r#type: ty.to_string(),
            properties: Some(properties),
            unknowns,
        };

        let response = self
            .invoke(ctx, &site, request, |mut client, request| async move {
                client.check(request).await
            })
            .await;
        let response = log_outcome(&site, response)?;

        Ok(response
            .failures
            .into_iter()
            .map(|f| CheckFailure::new(f.property, f.reason))
            .collect())
    }

    /// Asks the provider for the resource's logical name
    pub async fn name(&self, ctx: &Context, ty: &Type, props: &PropertyMap) -> Result<String> {
        self.assert_package(ty);
        let site = CallSite::new(Operation::Name, ty, None);
        log_executing(&site);

        let (properties, unknowns) =
            marshal_properties_with_unknowns(props, MarshalOptions::preview(), self.resolver())?;
        let request = proto::NameRequest {
            r#type: ty.to_string(),
            properties: Some(properties),
            unknowns,
        };

        let response = self
            .invoke(ctx, &site, request, |mut client, request| async move {
                client.name(request).await
            })
            .await
            .and_then(|response| {
                if response.name.is_empty() {
                    Err(LumiplugError::ContractViolation {
                        site: site.clone(),
                        message: "provider returned an empty name".to_string(),
                    })
                } else {
                    Ok(response)
                }
            });
        Ok(log_outcome(&site, response)?.name)
    }

    /// Creates the resource and returns the ID the provider assigned
    pub async fn create(
        &self,
        ctx: &Context,
        ty: &Type,
        props: &PropertyMap,
    ) -> std::result::Result<(Id, ResourceState), MutationError> {
        self.assert_package(ty);
        let site = CallSite::new(Operation::Create, ty, None);
        log_executing(&site);

        let properties = marshal_properties(props, MarshalOptions::default(), self.resolver())
            .map_err(MutationError::before_call)?;
        let request = proto::CreateRequest {
            r#type: ty.to_string(),
            properties: Some(properties),
        };

        let response = self
            .invoke(ctx, &site, request, |mut client, request| async move {
                client.create(request).await
            })
            .await
            .and_then(|response| {
                if response.id.is_empty() {
                    Err(LumiplugError::ContractViolation {
                        site: site.clone(),
                        message: "provider returned an empty ID".to_string(),
                    })
                } else {
                    Ok(response)
                }
            });
        let response = log_outcome(&site, response).map_err(MutationError::after_call)?;

        Ok((Id::new(response.id), ResourceState::Ok))
    }

    /// Reads the resource's current properties into `props`
    ///
    /// Keys the provider reports overwrite existing ones; other keys are kept.
    pub async fn get(
        &self,
        ctx: &Context,
        id: &Id,
        ty: &Type,
        props: &mut PropertyMap,
    ) -> Result<()> {
        self.assert_package(ty);
        assert_id(Operation::Get, id);
        let site = CallSite::new(Operation::Get, ty, Some(id));
        log_executing(&site);

        let request = proto::GetRequest {
            id: id.to_string(),
            r#type: ty.to_string(),
        };

        let response = self
            .invoke(ctx, &site, request, |mut client, request| async move {
                client.get(request).await
            })
            .await;
        let response = log_outcome(&site, response)?;

        if let Some(properties) = response.properties {
            unmarshal_properties_into(&properties, props, MarshalOptions::default());
        }
        Ok(())
    }

    /// Plans the change from `old` to `new`
    ///
    /// Identical maps are answered locally without asking the provider.
    pub async fn inspect_change(
        &self,
        ctx: &Context,
        id: &Id,
        ty: &Type,
        old: &PropertyMap,
        new: &PropertyMap,
    ) -> Result<ChangePlan> {
        self.assert_package(ty);
        assert_id(Operation::InspectChange, id);
        let site = CallSite::new(Operation::InspectChange, ty, Some(id));

        let Some(diff) = old.diff(new) else {
            tracing::debug!(package = %self.package, ty = %ty, id = %id, "No changes, skipping InspectChange");
            return Ok(ChangePlan::unchanged());
        };
        log_executing(&site);

        let olds = marshal_properties(old, MarshalOptions::raw(), self.resolver())?;
        let (news, unknowns) =
            marshal_properties_with_unknowns(new, MarshalOptions::raw(), self.resolver())?;
        let request = proto::InspectChangeRequest {
            id: id.to_string(),
            r#type: ty.to_string(),
            olds: Some(olds),
            news: Some(news),
            unknowns,
        };

        let response = self
            .invoke(ctx, &site, request, |mut client, request| async move {
                client.inspect_change(request).await
            })
            .await;
        let response = log_outcome(&site, response)?;

        let changes = response
            .changes
            .map(|changes| unmarshal_properties(&changes, MarshalOptions::raw()))
            .unwrap_or_default();
        let schema = self.schemas.get(ty);
        let plan = plan_change(schema.as_deref(), Some(diff), response.replaces, changes);

        tracing::debug!(
            package = %self.package,
            ty = %ty,
            id = %id,
            action = %plan.action,
            replaces = ?plan.replaces.keys(),
            "Planned change"
        );
        Ok(plan)
    }

    /// Updates the resource in place
    pub async fn update(
        &self,
        ctx: &Context,
        id: &Id,
        ty: &Type,
        old: &PropertyMap,
        new: &PropertyMap,
    ) -> std::result::Result<ResourceState, MutationError> {
        self.assert_package(ty);
        assert_id(Operation::Update, id);
        let site = CallSite::new(Operation::Update, ty, Some(id));
        log_executing(&site);

        let olds = marshal_properties(old, MarshalOptions::old_state(), self.resolver())
            .map_err(MutationError::before_call)?;
        let news = marshal_properties(new, MarshalOptions::default(), self.resolver())
            .map_err(MutationError::before_call)?;
        let request = proto::UpdateRequest {
            id: id.to_string(),
            r#type: ty.to_string(),
            olds: Some(olds),
            news: Some(news),
        };

        let response = self
            .invoke(ctx, &site, request, |mut client, request| async move {
                client.update(request).await
            })
            .await;
        log_outcome(&site, response).map_err(MutationError::after_call)?;

        Ok(ResourceState::Ok)
    }

    /// Deletes the resource
    pub async fn delete(
        &self,
        ctx: &Context,
        id: &Id,
        ty: &Type,
    ) -> std::result::Result<ResourceState, MutationError> {
        self.assert_package(ty);
        assert_id(Operation::Delete, id);
        let site = CallSite::new(Operation::Delete, ty, Some(id));
        log_executing(&site);

        let request = proto::DeleteRequest {
            id: id.to_string(),
            r#type: ty.to_string(),
        };

        let response = self
            .invoke(ctx, &site, request, |mut client, request| async move {
                client.delete(request).await
            })
            .await;
        log_outcome(&site, response).map_err(MutationError::after_call)?;

        Ok(ResourceState::Ok)
    }

    /// Shuts down the plugin process, if this client owns one
    pub async fn close(&self) -> Result<()> {
        match &self.plugin {
            Some(plugin) => plugin.close().await,
            None => Ok(()),
        }
    }

    fn resolver(&self) -> &dyn ReferenceResolver {
        self.resolver.as_ref()
    }

    fn assert_package(&self, ty: &Type) {
        assert!(
            ty.package() == self.package,
            "resource type {} does not belong to package {}",
            ty,
            self.package
        );
    }

    /// Sends one request, bounded by the context's deadline and cancellation
    async fn invoke<Req, Resp, F, Fut>(
        &self,
        ctx: &Context,
        site: &CallSite,
        message: Req,
        call: F,
    ) -> Result<Resp>
    where
        F: FnOnce(ResourceProviderClient<Channel>, tonic::Request<Req>) -> Fut,
        Fut: Future<Output = std::result::Result<tonic::Response<Resp>, tonic::Status>>,
    {
        let mut request = tonic::Request::new(message);
        if let Some(remaining) = ctx.remaining() {
            request.set_timeout(remaining);
        }

        match ctx.run(call(self.inner.clone(), request)).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(LumiplugError::from_status(site.clone(), status)),
            Err(Interrupted::DeadlineExceeded) => Err(LumiplugError::Timeout { site: site.clone() }),
            Err(Interrupted::Cancelled) => Err(LumiplugError::Cancelled { site: site.clone() }),
        }
    }
}

fn assert_id(operation: Operation, id: &Id) {
    assert!(!id.is_empty(), "{} requires a resource ID", operation);
}

fn log_executing(site: &CallSite) {
    tracing::debug!(
        operation = %site.operation,
        ty = %site.ty,
        id = ?site.id.as_ref().map(Id::as_str),
        "Executing provider call"
    );
}

fn log_outcome<T>(site: &CallSite, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => tracing::debug!(
            operation = %site.operation,
            ty = %site.ty,
            id = ?site.id.as_ref().map(Id::as_str),
            "Provider call succeeded"
        ),
        Err(e) => tracing::debug!(
            operation = %site.operation,
            ty = %site.ty,
            id = ?site.id.as_ref().map(Id::as_str),
            error = %e,
            "Provider call failed"
        ),
    }
    result
}
