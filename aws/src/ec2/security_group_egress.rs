//! Standalone egress rule attached to an EC2 security group
//!
//! Every property forces replacement, so the rule is never updated in place.

use async_trait::async_trait;
use lumiplug::diff::ObjectDiff;
use lumiplug::{
    CheckFailure, Context, FieldKind, Id, ProviderError, ResourceOps, ResourceSchema, Type,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::security_group::port_range_problem;
use crate::cloud::Cloud;

pub const TOKEN: &str = "aws:ec2/securityGroupEgress:SecurityGroupEgress";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityGroupEgress {
    pub name: String,
    pub from_port: f64,
    pub group: String,
    pub ip_protocol: String,
    pub to_port: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_ipv6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_prefix_list_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_security_group: Option<String>,
}

impl SecurityGroupEgress {
    fn destinations(&self) -> usize {
        [
            &self.cidr_ip,
            &self.cidr_ipv6,
            &self.destination_prefix_list_id,
            &self.destination_security_group,
        ]
        .iter()
        .filter(|d| d.is_some())
        .count()
    }
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::builder(Type::new(TOKEN).expect("valid egress token"))
        .required_replace("name", FieldKind::String)
        .required_replace("fromPort", FieldKind::Number)
        .required_replace("group", FieldKind::Id)
        .required_replace("ipProtocol", FieldKind::String)
        .required_replace("toPort", FieldKind::Number)
        .optional_replace("cidrIp", FieldKind::String)
        .optional_replace("cidrIpv6", FieldKind::String)
        .optional_replace("destinationPrefixListId", FieldKind::String)
        .optional_replace("destinationSecurityGroup", FieldKind::Id)
        .build()
}

pub struct SecurityGroupEgressOps {
    cloud: Arc<Cloud>,
}

impl SecurityGroupEgressOps {
    pub fn new(cloud: Arc<Cloud>) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl ResourceOps for SecurityGroupEgressOps {
    type Resource = SecurityGroupEgress;

    async fn check(&self, _ctx: Context, rule: SecurityGroupEgress) -> Vec<CheckFailure> {
        let mut failures = Vec::new();
        if let Some(reason) = port_range_problem(Some(rule.from_port), Some(rule.to_port)) {
            failures.push(CheckFailure::new("fromPort", reason));
        }
        if rule.destinations() > 1 {
            failures.push(CheckFailure::new(
                "cidrIp",
                "only one of cidrIp, cidrIpv6, destinationPrefixListId or destinationSecurityGroup may be set",
            ));
        }
        failures
    }

    async fn create(&self, _ctx: Context, rule: SecurityGroupEgress) -> Result<Id, ProviderError> {
        let group = Id::new(rule.group.clone());
        if !self.cloud.security_groups.contains(&group) {
            return Err(ProviderError::InvalidArgument(format!(
                "security group {} does not exist",
                group
            )));
        }

        let id = self.cloud.allocate("sgr");
        self.cloud.security_group_egress.insert(id.clone(), rule)?;
        tracing::info!(id = %id, group = %group, "Authorized security group egress");
        Ok(id)
    }

    async fn get(&self, _ctx: Context, id: Id) -> Result<SecurityGroupEgress, ProviderError> {
        self.cloud.security_group_egress.get(&id)
    }

    async fn update(
        &self,
        _ctx: Context,
        id: Id,
        _old: SecurityGroupEgress,
        _new: SecurityGroupEgress,
        _diff: ObjectDiff,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::Failed(format!(
            "egress rule {} cannot be updated in place",
            id
        )))
    }

    async fn delete(&self, _ctx: Context, id: Id) -> Result<(), ProviderError> {
        self.cloud.security_group_egress.remove(&id)?;
        tracing::info!(id = %id, "Revoked security group egress");
        Ok(())
    }
}
