//! gRPC service implementation for [`ResourceProvider`]
//!
//! Converts wire messages to property maps, hands them to the provider and
//! converts results and [`ProviderError`]s back into responses and statuses.
//!
//! [`ProviderError`]: crate::error::ProviderError

use crate::context::Context;
use crate::marshal::{marshal_properties, unmarshal_properties, MarshalOptions, NoReferences};
use crate::property::{Id, PropertyMap};
use crate::proto::{self, ResourceProviderService};
use crate::provider::ResourceProvider;
use std::time::Duration;
use tonic::{Request, Response, Status};

#[tonic::async_trait]
impl ResourceProviderService for ResourceProvider {
    async fn check(
        &self,
        request: Request<proto::CheckRequest>,
    ) -> std::result::Result<Response<proto::CheckResponse>, Status> {
        let ctx = request_context(&request);
        let req = request.into_inner();
        tracing::debug!(ty = %req.r#type, unknowns = ?req.unknowns, "Check");

        let props = wire_to_props(req.properties);
        let failures = ResourceProvider::check(self, ctx, &req.r#type, props).await?;

        Ok(Response::new(proto::CheckResponse {
            failures: failures
                .into_iter()
                .map(|f| proto::CheckFailure {
                    property: f.property,
                    reason: f.reason,
                })
                .collect(),
        }))
    }

    async fn name(
        &self,
        request: Request<proto::NameRequest>,
    ) -> std::result::Result<Response<proto::NameResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(ty = %req.r#type, unknowns = ?req.unknowns, "Name");

        let props = wire_to_props(req.properties);
        let name = ResourceProvider::name(self, &req.r#type, &props, &req.unknowns)?;
        Ok(Response::new(proto::NameResponse { name }))
    }

    async fn create(
        &self,
        request: Request<proto::CreateRequest>,
    ) -> std::result::Result<Response<proto::CreateResponse>, Status> {
        let ctx = request_context(&request);
        let req = request.into_inner();
        tracing::debug!(ty = %req.r#type, "Create");

        let props = wire_to_props(req.properties);
        let id = ResourceProvider::create(self, ctx, &req.r#type, props).await?;
        Ok(Response::new(proto::CreateResponse { id: id.to_string() }))
    }

    async fn get(
        &self,
        request: Request<proto::GetRequest>,
    ) -> std::result::Result<Response<proto::GetResponse>, Status> {
        let ctx = request_context(&request);
        let req = request.into_inner();
        tracing::debug!(ty = %req.r#type, id = %req.id, "Get");

        let props = ResourceProvider::get(self, ctx, &req.r#type, Id::new(req.id)).await?;
        Ok(Response::new(proto::GetResponse {
            properties: Some(props_to_wire(&props)?),
        }))
    }

    async fn inspect_change(
        &self,
        request: Request<proto::InspectChangeRequest>,
    ) -> std::result::Result<Response<proto::InspectChangeResponse>, Status> {
        let ctx = request_context(&request);
        let req = request.into_inner();
        tracing::debug!(ty = %req.r#type, id = %req.id, "InspectChange");

        let olds = wire_to_props(req.olds);
        let news = wire_to_props(req.news);
        let inspection =
            ResourceProvider::inspect_change(self, ctx, &req.r#type, Id::new(req.id), olds, news)
                .await?;

        let changes = if inspection.changes.is_empty() {
            None
        } else {
            Some(props_to_wire(&inspection.changes)?)
        };
        Ok(Response::new(proto::InspectChangeResponse {
            replaces: inspection.replaces,
            changes,
        }))
    }

    async fn update(
        &self,
        request: Request<proto::UpdateRequest>,
    ) -> std::result::Result<Response<()>, Status> {
        let ctx = request_context(&request);
        let req = request.into_inner();
        tracing::debug!(ty = %req.r#type, id = %req.id, "Update");

        let olds = wire_to_props(req.olds);
        let news = wire_to_props(req.news);
        ResourceProvider::update(self, ctx, &req.r#type, Id::new(req.id), olds, news).await?;
        Ok(Response::new(()))
    }

    async fn delete(
        &self,
        request: Request<proto::DeleteRequest>,
    ) -> std::result::Result<Response<()>, Status> {
        let ctx = request_context(&request);
        let req = request.into_inner();
        tracing::debug!(ty = %req.r#type, id = %req.id, "Delete");

        ResourceProvider::delete(self, ctx, &req.r#type, Id::new(req.id)).await?;
        Ok(Response::new(()))
    }
}

fn wire_to_props(wire: Option<prost_types::Struct>) -> PropertyMap {
    wire.map(|s| unmarshal_properties(&s, MarshalOptions::default()))
        .unwrap_or_default()
}

fn props_to_wire(props: &PropertyMap) -> std::result::Result<prost_types::Struct, Status> {
    marshal_properties(props, MarshalOptions::raw(), &NoReferences)
        .map_err(|e| Status::internal(e.to_string()))
}

/// Context bounded by the caller's `grpc-timeout`, if it sent one
fn request_context<T>(request: &Request<T>) -> Context {
    let timeout = request
        .metadata()
        .get("grpc-timeout")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout);

    match timeout {
        Some(timeout) => Context::new().with_timeout(timeout),
        None => Context::new(),
    }
}

/// Parses a `grpc-timeout` header value such as `250m` or `5S`
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let unit = value.chars().last()?;
    let amount: u64 = value[..value.len() - unit.len_utf8()].parse().ok()?;
    match unit {
        'H' => Some(Duration::from_secs(amount.saturating_mul(3600))),
        'M' => Some(Duration::from_secs(amount.saturating_mul(60))),
        'S' => Some(Duration::from_secs(amount)),
        'm' => Some(Duration::from_millis(amount)),
        'u' => Some(Duration::from_micros(amount)),
        'n' => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
