//! Resource creation engines
//!
//! Stacks describe what to create as [`Resource`] requests and hand them to an [`Engine`] one at a time, in
//! dependency order. The engine returns an opaque [`ResourceId`] that later requests reference verbatim.
mod aws;
mod recorder;

use std::{collections::BTreeMap, fmt};

use anyhow::Result;
pub use aws::AwsEngine;
use ipnet::Ipv4Net;
pub use recorder::{Record, Recorder};
use serde::{Deserialize, Serialize};

/// Resource tags, ordered by key
pub type Tags = BTreeMap<String, String>;

/// Opaque identifier returned by an engine for a created resource
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ResourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ResourceId {
  fn from(id: &str) -> Self {
    Self(id.to_owned())
  }
}

impl From<String> for ResourceId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

/// The kinds of resources a stack can request
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  Vpc,
  InternetGateway,
  RouteTable,
  Subnet,
  RouteTableAssociation,
  Eip,
  NatGateway,
  SecurityGroup,
  LoadBalancer,
  LaunchTemplate,
  AutoScalingGroup,
}

impl ResourceKind {
  /// Prefix used for identifiers generated locally
  pub fn id_prefix(&self) -> &'static str {
    match self {
      Self::Vpc => "vpc",
      Self::InternetGateway => "igw",
      Self::RouteTable => "rtb",
      Self::Subnet => "subnet",
      Self::RouteTableAssociation => "rtbassoc",
      Self::Eip => "eipalloc",
      Self::NatGateway => "nat",
      Self::SecurityGroup => "sg",
      Self::LoadBalancer => "elb",
      Self::LaunchTemplate => "lt",
      Self::AutoScalingGroup => "asg",
    }
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = match self {
      Self::Vpc => "VPC",
      Self::InternetGateway => "internet gateway",
      Self::RouteTable => "route table",
      Self::Subnet => "subnet",
      Self::RouteTableAssociation => "route table association",
      Self::Eip => "elastic IP",
      Self::NatGateway => "NAT gateway",
      Self::SecurityGroup => "security group",
      Self::LoadBalancer => "load balancer",
      Self::LaunchTemplate => "launch template",
      Self::AutoScalingGroup => "auto scaling group",
    };
    f.write_str(kind)
  }
}

/// Where traffic matching a route is sent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RouteTarget {
  InternetGateway(ResourceId),
  NatGateway(ResourceId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
  pub destination: Ipv4Net,
  pub target: RouteTarget,
}

impl Route {
  /// `0.0.0.0/0` to the given target
  pub fn default_via(target: RouteTarget) -> Self {
    Self {
      destination: Ipv4Net::default(),
      target,
    }
  }
}

/// A single security group ingress or egress rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
  pub description: String,

  /// `tcp`, `udp`, `icmp` or `all`
  pub protocol: String,

  pub from_port: i32,

  pub to_port: i32,

  pub cidr_blocks: Vec<Ipv4Net>,
}

/// Classic load balancer listener
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
  pub lb_port: i32,
  pub lb_protocol: String,
  pub instance_port: i32,
  pub instance_protocol: String,
}

/// A request to create one resource
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
  Vpc {
    cidr_block: Ipv4Net,
    tags: Tags,
  },
  /// Created and attached to the VPC
  InternetGateway {
    vpc_id: ResourceId,
    tags: Tags,
  },
  RouteTable {
    vpc_id: ResourceId,
    routes: Vec<Route>,
    tags: Tags,
  },
  Subnet {
    vpc_id: ResourceId,
    cidr_block: Ipv4Net,
    availability_zone: String,
    tags: Tags,
  },
  RouteTableAssociation {
    route_table_id: ResourceId,
    subnet_id: ResourceId,
  },
  /// Elastic IP allocated for use within a VPC
  Eip,
  NatGateway {
    subnet_id: ResourceId,
    allocation_id: ResourceId,
    tags: Tags,
  },
  SecurityGroup {
    name: String,
    description: String,
    vpc_id: ResourceId,
    ingress: Vec<SecurityGroupRule>,
    egress: Vec<SecurityGroupRule>,
    tags: Tags,
  },
  LoadBalancer {
    name: String,
    subnets: Vec<ResourceId>,
    listeners: Vec<Listener>,
    security_groups: Vec<ResourceId>,
    tags: Tags,
  },
  LaunchTemplate {
    name_prefix: String,
    image_id: String,
    instance_type: String,
    /// Base64 encoded
    user_data: String,
    security_groups: Vec<ResourceId>,
  },
  AutoScalingGroup {
    name: String,
    desired_capacity: i32,
    min_size: i32,
    max_size: i32,
    subnets: Vec<ResourceId>,
    load_balancers: Vec<ResourceId>,
    launch_template_id: ResourceId,
    launch_template_version: String,
  },
}

impl Resource {
  pub fn kind(&self) -> ResourceKind {
    match self {
      Self::Vpc { .. } => ResourceKind::Vpc,
      Self::InternetGateway { .. } => ResourceKind::InternetGateway,
      Self::RouteTable { .. } => ResourceKind::RouteTable,
      Self::Subnet { .. } => ResourceKind::Subnet,
      Self::RouteTableAssociation { .. } => ResourceKind::RouteTableAssociation,
      Self::Eip => ResourceKind::Eip,
      Self::NatGateway { .. } => ResourceKind::NatGateway,
      Self::SecurityGroup { .. } => ResourceKind::SecurityGroup,
      Self::LoadBalancer { .. } => ResourceKind::LoadBalancer,
      Self::LaunchTemplate { .. } => ResourceKind::LaunchTemplate,
      Self::AutoScalingGroup { .. } => ResourceKind::AutoScalingGroup,
    }
  }
}

/// Creates resources and returns their identifiers
///
/// Requests are identified by their kind and logical `name`; creating the same kind and name twice within one run
/// returns the identifier of the first creation instead of creating a second resource.
#[allow(async_fn_in_trait)]
pub trait Engine {
  async fn create(&mut self, name: &str, resource: &Resource) -> Result<ResourceId>;
}
