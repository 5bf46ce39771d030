//! EC2 resource kinds

pub mod route_table;
pub mod security_group;
pub mod security_group_egress;

pub use route_table::{RouteTable, RouteTableOps};
pub use security_group::{SecurityGroup, SecurityGroupOps, SecurityGroupRule};
pub use security_group_egress::{SecurityGroupEgress, SecurityGroupEgressOps};
