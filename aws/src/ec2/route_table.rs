//! EC2 route table

use async_trait::async_trait;
use lumiplug::diff::ObjectDiff;
use lumiplug::{Context, FieldKind, Id, ProviderError, ResourceOps, ResourceSchema, Type};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cloud::Cloud;

pub const TOKEN: &str = "aws:ec2/routeTable:RouteTable";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTable {
    pub name: String,
    pub vpc: String,
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::builder(Type::new(TOKEN).expect("valid route table token"))
        .required_replace("name", FieldKind::String)
        .required_replace("vpc", FieldKind::Id)
        .build()
}

pub struct RouteTableOps {
    cloud: Arc<Cloud>,
}

impl RouteTableOps {
    pub fn new(cloud: Arc<Cloud>) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl ResourceOps for RouteTableOps {
    type Resource = RouteTable;

    async fn create(&self, _ctx: Context, table: RouteTable) -> Result<Id, ProviderError> {
        let id = self.cloud.allocate("rtb");
        self.cloud.route_tables.insert(id.clone(), table)?;
        tracing::info!(id = %id, "Created route table");
        Ok(id)
    }

    async fn get(&self, _ctx: Context, id: Id) -> Result<RouteTable, ProviderError> {
        self.cloud.route_tables.get(&id)
    }

    async fn update(
        &self,
        _ctx: Context,
        id: Id,
        _old: RouteTable,
        _new: RouteTable,
        _diff: ObjectDiff,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::Failed(format!(
            "route table {} cannot be updated in place",
            id
        )))
    }

    async fn delete(&self, _ctx: Context, id: Id) -> Result<(), ProviderError> {
        self.cloud.route_tables.remove(&id)?;
        tracing::info!(id = %id, "Deleted route table");
        Ok(())
    }
}
