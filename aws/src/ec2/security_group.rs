//! EC2 security group

use async_trait::async_trait;
use lumiplug::diff::ObjectDiff;
use lumiplug::{
    CheckFailure, Context, FieldKind, Id, ProviderError, ResourceOps, ResourceSchema, Type,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cloud::Cloud;

pub const TOKEN: &str = "aws:ec2/securityGroup:SecurityGroup";

const MAX_DESCRIPTION_LEN: usize = 255;

/// A single ingress or egress rule embedded in a security group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityGroupRule {
    pub ip_protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_port: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_port: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityGroup {
    pub name: String,
    pub group_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group_egress: Option<Vec<SecurityGroupRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group_ingress: Option<Vec<SecurityGroupRule>>,
    #[serde(rename = "groupID", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::builder(token())
        .required_replace("name", FieldKind::String)
        .required_replace("groupDescription", FieldKind::String)
        .optional_replace("groupName", FieldKind::String)
        .optional_replace("vpc", FieldKind::Id)
        .optional("securityGroupEgress", FieldKind::array_of(FieldKind::Object))
        .optional("securityGroupIngress", FieldKind::array_of(FieldKind::Object))
        .optional("groupID", FieldKind::String)
        .build()
}

fn token() -> Type {
    Type::new(TOKEN).expect("valid security group token")
}

/// Checks port ranges of rules under `key`
pub(crate) fn check_rules(key: &str, rules: &[SecurityGroupRule]) -> Vec<CheckFailure> {
    let mut failures = Vec::new();
    for (i, rule) in rules.iter().enumerate() {
        let at = |field: &str| format!("{}[{}].{}", key, i, field);
        if rule.ip_protocol.is_empty() {
            failures.push(CheckFailure::new(at("ipProtocol"), "must not be empty"));
        }
        if let Some(reason) = port_range_problem(rule.from_port, rule.to_port) {
            failures.push(CheckFailure::new(at("fromPort"), reason));
        }
    }
    failures
}

/// Ports are -1 (all) or 0..=65535, and the range must not be inverted
pub(crate) fn port_range_problem(from: Option<f64>, to: Option<f64>) -> Option<String> {
    let valid = |port: f64| port == -1.0 || (0.0..=65535.0).contains(&port);
    for port in [from, to].into_iter().flatten() {
        if !valid(port) || port.fract() != 0.0 {
            return Some(format!("invalid port {}", port));
        }
    }
    match (from, to) {
        (Some(from), Some(to)) if from > to => {
            Some(format!("port range {}-{} is inverted", from, to))
        }
        _ => None,
    }
}

pub struct SecurityGroupOps {
    cloud: Arc<Cloud>,
}

impl SecurityGroupOps {
    pub fn new(cloud: Arc<Cloud>) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl ResourceOps for SecurityGroupOps {
    type Resource = SecurityGroup;

    async fn check(&self, _ctx: Context, group: SecurityGroup) -> Vec<CheckFailure> {
        let mut failures = Vec::new();
        if group.group_description.len() > MAX_DESCRIPTION_LEN {
            failures.push(CheckFailure::new(
                "groupDescription",
                format!("must be at most {} characters", MAX_DESCRIPTION_LEN),
            ));
        }
        if let Some(rules) = &group.security_group_egress {
            failures.extend(check_rules("securityGroupEgress", rules));
        }
        if let Some(rules) = &group.security_group_ingress {
            failures.extend(check_rules("securityGroupIngress", rules));
        }
        failures
    }

    async fn create(&self, _ctx: Context, mut group: SecurityGroup) -> Result<Id, ProviderError> {
        let id = self.cloud.allocate("sg");
        if group.group_name.is_none() {
            group.group_name = Some(group.name.clone());
        }
        group.group_id = Some(id.to_string());

        self.cloud.security_groups.insert(id.clone(), group)?;
        tracing::info!(id = %id, "Created security group");
        Ok(id)
    }

    async fn get(&self, _ctx: Context, id: Id) -> Result<SecurityGroup, ProviderError> {
        self.cloud.security_groups.get(&id)
    }

    async fn update(
        &self,
        _ctx: Context,
        id: Id,
        _old: SecurityGroup,
        new: SecurityGroup,
        diff: ObjectDiff,
    ) -> Result<(), ProviderError> {
        let mut current = self.cloud.security_groups.get(&id)?;
        current.security_group_egress = new.security_group_egress;
        current.security_group_ingress = new.security_group_ingress;
        self.cloud.security_groups.put(&id, current)?;

        tracing::info!(id = %id, changed = ?diff.changed_keys(), "Updated security group rules");
        Ok(())
    }

    async fn delete(&self, _ctx: Context, id: Id) -> Result<(), ProviderError> {
        let group = id.to_string();
        let dependents = self
            .cloud
            .security_group_egress
            .find(|rule| rule.group == group || rule.destination_security_group.as_ref() == Some(&group));
        if !dependents.is_empty() {
            return Err(ProviderError::Conflict(format!(
                "security group {} is still referenced by {} egress rule(s)",
                id,
                dependents.len()
            )));
        }

        self.cloud.security_groups.remove(&id)?;
        tracing::info!(id = %id, "Deleted security group");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use lumiplug::{decode, encode, PropertyMap, PropertyValue};

    #[test]
    fn port_ranges() {
        assert_eq!(port_range_problem(Some(22.0), Some(22.0)), None);
        assert_eq!(port_range_problem(Some(-1.0), Some(-1.0)), None);
        assert_eq!(port_range_problem(None, None), None);
        assert!(port_range_problem(Some(443.0), Some(80.0)).is_some());
        assert!(port_range_problem(Some(70000.0), None).is_some());
        assert!(port_range_problem(Some(22.5), None).is_some());
    }

    #[test]
    fn decodes_rules_and_group_id() {
        let props = PropertyMap::new()
            .with("name", "web")
            .with("groupDescription", "web tier")
            .with(
                "securityGroupIngress",
                vec![PropertyValue::Object(
                    PropertyMap::new()
                        .with("ipProtocol", "tcp")
                        .with("cidrIp", "0.0.0.0/0")
                        .with("fromPort", 80.0)
                        .with("toPort", 80.0),
                )],
            )
            .with("groupID", "sg-1");

        let group: SecurityGroup = decode(&schema(), &props).unwrap();
        assert_eq!(group.group_id.as_deref(), Some("sg-1"));
        let rules = group.security_group_ingress.as_ref().unwrap();
        assert_eq!(rules[0].from_port, Some(80.0));

        let back = encode(&group).unwrap();
        assert_eq!(back.get("groupID").and_then(|v| v.as_str()), Some("sg-1"));
        assert!(!back.contains_key("groupName"));
    }

    #[tokio::test]
    async fn create_defaults_group_name_and_records_id() {
        let cloud = Arc::new(Cloud::new());
        let ops = SecurityGroupOps::new(Arc::clone(&cloud));
        let group = SecurityGroup {
            name: "web".to_string(),
            group_description: "web tier".to_string(),
            ..Default::default()
        };

        let id = ops.create(Context::new(), group).await.unwrap();
        let stored = ops.get(Context::new(), id.clone()).await.unwrap();
        assert_eq!(stored.group_name.as_deref(), Some("web"));
        assert_eq!(stored.group_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn check_flags_long_descriptions_and_bad_rules() {
        let ops = SecurityGroupOps::new(Arc::new(Cloud::new()));
        let group = SecurityGroup {
            name: "web".to_string(),
            group_description: "x".repeat(300),
            security_group_egress: Some(vec![SecurityGroupRule {
                ip_protocol: String::new(),
                from_port: Some(443.0),
                to_port: Some(80.0),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let failures = ops.check(Context::new(), group).await;
        let properties: Vec<_> = failures.iter().map(|f| f.property.as_str()).collect();
        assert_eq!(
            properties,
            [
                "groupDescription",
                "securityGroupEgress[0].ipProtocol",
                "securityGroupEgress[0].fromPort"
            ]
        );
    }
}
