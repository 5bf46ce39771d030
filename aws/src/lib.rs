//! AWS resource provider for Lumi
//!
//! Registers the EC2 and API Gateway resource kinds with a
//! [`lumiplug::ResourceProvider`]. Resources live in an in-memory [`Cloud`].

pub mod apigateway;
pub mod cloud;
pub mod ec2;

pub use cloud::Cloud;

use lumiplug::{Package, ResourceProvider, SchemaRegistry};
use std::sync::Arc;

/// Package every resource type here belongs to
pub const PACKAGE: &str = "aws";

pub fn package() -> Package {
    Package::new(PACKAGE).expect("valid package name")
}

/// Schemas of every resource kind, for hosts that plan changes locally
pub fn schemas() -> lumiplug::Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry.register(ec2::security_group::schema())?;
    registry.register(ec2::security_group_egress::schema())?;
    registry.register(ec2::route_table::schema())?;
    registry.register(apigateway::api_key::schema())?;
    Ok(registry)
}

/// Provider with every resource kind registered against a fresh account
pub fn provider() -> lumiplug::Result<ResourceProvider> {
    provider_with(Arc::new(Cloud::new()))
}

pub fn provider_with(cloud: Arc<Cloud>) -> lumiplug::Result<ResourceProvider> {
    ResourceProvider::new(package())
        .register(
            ec2::security_group::schema(),
            ec2::SecurityGroupOps::new(Arc::clone(&cloud)),
        )?
        .register(
            ec2::security_group_egress::schema(),
            ec2::SecurityGroupEgressOps::new(Arc::clone(&cloud)),
        )?
        .register(
            ec2::route_table::schema(),
            ec2::RouteTableOps::new(Arc::clone(&cloud)),
        )?
        .register(
            apigateway::api_key::schema(),
            apigateway::ApiKeyOps::new(cloud),
        )
}
