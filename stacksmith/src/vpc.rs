//! VPC topology builder
//!
//! Lays out a VPC with public and private subnets spread across availability zones. Public subnets route to the
//! internet through an internet gateway; private subnets route out through a single NAT gateway placed in the first
//! public subnet.
use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  engine::{Engine, Resource, ResourceId, Route, RouteTarget},
  tags::StackContext,
};

/// Rejected topology requests
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("not enough availability zones provided: {requested} {tier} subnets requested, {available} zones available")]
  InsufficientZones {
    tier: SubnetTier,
    requested: usize,
    available: usize,
  },
}

/// Whether a subnet (and its route table) is reachable from the internet
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetTier {
  Public,
  Private,
}

impl SubnetTier {
  fn as_str(&self) -> &'static str {
    match self {
      Self::Public => "public",
      Self::Private => "private",
    }
  }
}

impl std::fmt::Display for SubnetTier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcInput {
  pub vpc_cidr_block: Ipv4Net,

  /// Subnet `i` of either tier is placed in zone `i`
  #[serde(default)]
  pub availability_zones: Vec<String>,

  #[serde(default)]
  pub public_subnet_cidr_blocks: Vec<Ipv4Net>,

  #[serde(default)]
  pub private_subnet_cidr_blocks: Vec<Ipv4Net>,
}

/// A subnet CIDR block bound to the zone it will be created in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetSpec {
  pub cidr_block: Ipv4Net,
  pub availability_zone: String,
}

impl VpcInput {
  /// Each tier needs a zone for every subnet requested
  pub fn validate(&self) -> Result<(), ValidationError> {
    let available = self.availability_zones.len();

    for (tier, cidrs) in [
      (SubnetTier::Public, &self.public_subnet_cidr_blocks),
      (SubnetTier::Private, &self.private_subnet_cidr_blocks),
    ] {
      if cidrs.len() > available {
        return Err(ValidationError::InsufficientZones {
          tier,
          requested: cidrs.len(),
          available,
        });
      }
    }

    Ok(())
  }

  /// Pair the subnet CIDR blocks of a tier with their zones, by position
  pub fn subnets(&self, tier: SubnetTier) -> Result<Vec<SubnetSpec>, ValidationError> {
    self.validate()?;

    let cidrs = match tier {
      SubnetTier::Public => &self.public_subnet_cidr_blocks,
      SubnetTier::Private => &self.private_subnet_cidr_blocks,
    };

    Ok(
      cidrs
        .iter()
        .zip(&self.availability_zones)
        .map(|(cidr, az)| SubnetSpec {
          cidr_block: *cidr,
          availability_zone: az.to_owned(),
        })
        .collect(),
    )
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Subnet {
  pub id: ResourceId,
  pub cidr_block: Ipv4Net,
  pub availability_zone: String,
  pub route_table: ResourceId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteTable {
  pub id: ResourceId,
  pub tier: SubnetTier,

  /// Absent for private route tables of a VPC without public subnets
  pub default_route: Option<RouteTarget>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NatGateway {
  pub id: ResourceId,
  pub allocation_id: ResourceId,
  pub subnet: ResourceId,
}

/// Everything created for one VPC
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VpcOutput {
  pub vpc: ResourceId,
  pub public_subnets: Vec<Subnet>,
  pub private_subnets: Vec<Subnet>,
  pub internet_gateway: Option<ResourceId>,
  pub nat_gateway: Option<NatGateway>,
  pub public_route_table: Option<RouteTable>,
  pub private_route_table: Option<RouteTable>,

  /// Private subnets were requested without any public subnet to host a NAT gateway
  pub isolated: bool,
}

impl VpcOutput {
  pub fn public_subnet_ids(&self) -> Vec<String> {
    self.public_subnets.iter().map(|s| s.id.to_string()).collect()
  }

  pub fn private_subnet_ids(&self) -> Vec<String> {
    self.private_subnets.iter().map(|s| s.id.to_string()).collect()
  }
}

/// Create the VPC, its subnets and their routing
///
/// The input is validated before anything is created. Any failure aborts the remaining steps; resources already
/// created are left in place.
pub async fn new_vpc<E: Engine>(engine: &mut E, ctx: &StackContext, input: &VpcInput) -> Result<VpcOutput> {
  input.validate().context("while validating input")?;
  let public = input.subnets(SubnetTier::Public)?;
  let private = input.subnets(SubnetTier::Private)?;
  debug!("VPC input: {input:#?}");

  let vpc = engine
    .create(
      "vpc",
      &Resource::Vpc {
        cidr_block: input.vpc_cidr_block,
        tags: ctx.named_tags("vpc"),
      },
    )
    .await
    .context("while creating VPC")?;
  info!("VPC {vpc} ({})", input.vpc_cidr_block);

  let mut output = VpcOutput {
    vpc,
    public_subnets: Vec::new(),
    private_subnets: Vec::new(),
    internet_gateway: None,
    nat_gateway: None,
    public_route_table: None,
    private_route_table: None,
    isolated: false,
  };

  if !public.is_empty() {
    new_public_subnets(engine, ctx, &public, &mut output)
      .await
      .context("while creating public subnets")?;
  }

  if !private.is_empty() {
    new_private_subnets(engine, ctx, &private, &mut output)
      .await
      .context("while creating private subnets")?;
  }

  Ok(output)
}

async fn new_public_subnets<E: Engine>(
  engine: &mut E,
  ctx: &StackContext,
  subnets: &[SubnetSpec],
  output: &mut VpcOutput,
) -> Result<()> {
  let igw = engine
    .create(
      "igw",
      &Resource::InternetGateway {
        vpc_id: output.vpc.clone(),
        tags: ctx.named_tags("igw"),
      },
    )
    .await
    .context("while creating internet gateway")?;

  let default_route = RouteTarget::InternetGateway(igw.clone());
  let rt = new_route_table(engine, ctx, &output.vpc, SubnetTier::Public, Some(default_route)).await?;

  output.public_subnets = new_subnets(engine, ctx, &output.vpc, SubnetTier::Public, subnets, &rt.id).await?;
  output.internet_gateway = Some(igw);
  output.public_route_table = Some(rt);

  Ok(())
}

async fn new_private_subnets<E: Engine>(
  engine: &mut E,
  ctx: &StackContext,
  subnets: &[SubnetSpec],
  output: &mut VpcOutput,
) -> Result<()> {
  let default_route = match output.public_subnets.first() {
    Some(public) => {
      let nat = new_nat_gateway(engine, ctx, &public.id).await?;
      let target = RouteTarget::NatGateway(nat.id.clone());
      output.nat_gateway = Some(nat);
      Some(target)
    }
    None => {
      warn!("No public subnets to host a NAT gateway - private subnets are isolated from the internet");
      output.isolated = true;
      None
    }
  };

  let rt = new_route_table(engine, ctx, &output.vpc, SubnetTier::Private, default_route).await?;

  output.private_subnets = new_subnets(engine, ctx, &output.vpc, SubnetTier::Private, subnets, &rt.id).await?;
  output.private_route_table = Some(rt);

  Ok(())
}

/// NAT gateway with its own Elastic IP, placed in the given public subnet
async fn new_nat_gateway<E: Engine>(engine: &mut E, ctx: &StackContext, subnet: &ResourceId) -> Result<NatGateway> {
  let allocation_id = engine
    .create("nat-eip", &Resource::Eip)
    .await
    .context("while allocating NAT gateway elastic IP")?;

  let id = engine
    .create(
      "nat-gw",
      &Resource::NatGateway {
        subnet_id: subnet.clone(),
        allocation_id: allocation_id.clone(),
        tags: ctx.common_tags(),
      },
    )
    .await
    .context("while creating NAT gateway")?;
  info!("NAT gateway {id} in subnet {subnet}");

  Ok(NatGateway {
    id,
    allocation_id,
    subnet: subnet.clone(),
  })
}

async fn new_route_table<E: Engine>(
  engine: &mut E,
  ctx: &StackContext,
  vpc: &ResourceId,
  tier: SubnetTier,
  default_route: Option<RouteTarget>,
) -> Result<RouteTable> {
  let name = format!("{tier}-rt");
  let routes = default_route.iter().cloned().map(Route::default_via).collect();

  let id = engine
    .create(
      &name,
      &Resource::RouteTable {
        vpc_id: vpc.clone(),
        routes,
        tags: ctx.named_tags(&name),
      },
    )
    .await
    .with_context(|| format!("while creating {tier} route table"))?;

  Ok(RouteTable {
    id,
    tier,
    default_route,
  })
}

/// Create each subnet and associate it with the route table of its tier
async fn new_subnets<E: Engine>(
  engine: &mut E,
  ctx: &StackContext,
  vpc: &ResourceId,
  tier: SubnetTier,
  subnets: &[SubnetSpec],
  route_table: &ResourceId,
) -> Result<Vec<Subnet>> {
  let mut result = Vec::with_capacity(subnets.len());

  for (i, spec) in subnets.iter().enumerate() {
    let name = format!("{tier}-subnet-{i}");

    let id = engine
      .create(
        &name,
        &Resource::Subnet {
          vpc_id: vpc.clone(),
          cidr_block: spec.cidr_block,
          availability_zone: spec.availability_zone.to_owned(),
          tags: ctx.named_tags(&name),
        },
      )
      .await
      .with_context(|| format!("while creating subnet {name}"))?;

    engine
      .create(
        &name,
        &Resource::RouteTableAssociation {
          route_table_id: route_table.clone(),
          subnet_id: id.clone(),
        },
      )
      .await
      .with_context(|| format!("while associating subnet {name} with route table {route_table}"))?;
    info!("{tier} subnet {id} ({}) in {}", spec.cidr_block, spec.availability_zone);

    result.push(Subnet {
      id,
      cidr_block: spec.cidr_block,
      availability_zone: spec.availability_zone.to_owned(),
      route_table: route_table.clone(),
    });
  }

  Ok(result)
}
