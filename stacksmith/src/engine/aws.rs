use std::{
  collections::HashMap,
  time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{anyhow, bail, Result};
use aws_config::SdkConfig;
use aws_sdk_autoscaling::types::LaunchTemplateSpecification;
use aws_sdk_ec2::types::{
  DomainType, InstanceType, IpPermission, IpRange, NatGatewayState, RequestLaunchTemplateData, ResourceType, Tag,
  TagSpecification,
};
use aws_sdk_elasticloadbalancing::types as elb;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use super::{Engine, Listener, Resource, ResourceId, ResourceKind, Route, RouteTarget, SecurityGroupRule, Tags};

/// Number of times the state of a new NAT gateway is checked before giving up
const NAT_GATEWAY_POLL_ATTEMPTS: u32 = 60;
const NAT_GATEWAY_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Creates resources in AWS through the EC2, Elastic Load Balancing and Auto Scaling APIs
pub struct AwsEngine {
  ec2: aws_sdk_ec2::Client,
  elb: aws_sdk_elasticloadbalancing::Client,
  autoscaling: aws_sdk_autoscaling::Client,

  created: HashMap<(ResourceKind, String), ResourceId>,
}

impl AwsEngine {
  pub fn new(config: &SdkConfig, retries: u32) -> Self {
    Self {
      ec2: crate::ec2::get_client(config, retries),
      elb: crate::elb::get_client(config, retries),
      autoscaling: crate::ec2::get_autoscaling_client(config, retries),
      created: HashMap::new(),
    }
  }

  async fn create_vpc(&self, cidr_block: &ipnet::Ipv4Net, tags: &Tags) -> Result<String> {
    let response = self
      .ec2
      .create_vpc()
      .cidr_block(cidr_block.to_string())
      .tag_specifications(tag_specification(ResourceType::Vpc, tags))
      .send()
      .await?;

    required(response.vpc().and_then(|v| v.vpc_id()), "CreateVpc")
  }

  async fn create_internet_gateway(&self, vpc_id: &ResourceId, tags: &Tags) -> Result<String> {
    let response = self
      .ec2
      .create_internet_gateway()
      .tag_specifications(tag_specification(ResourceType::InternetGateway, tags))
      .send()
      .await?;
    let igw_id = required(
      response.internet_gateway().and_then(|g| g.internet_gateway_id()),
      "CreateInternetGateway",
    )?;

    self
      .ec2
      .attach_internet_gateway()
      .internet_gateway_id(&igw_id)
      .vpc_id(vpc_id.as_str())
      .send()
      .await?;

    Ok(igw_id)
  }

  async fn create_route_table(&self, vpc_id: &ResourceId, routes: &[Route], tags: &Tags) -> Result<String> {
    let response = self
      .ec2
      .create_route_table()
      .vpc_id(vpc_id.as_str())
      .tag_specifications(tag_specification(ResourceType::RouteTable, tags))
      .send()
      .await?;
    let rtb_id = required(response.route_table().and_then(|t| t.route_table_id()), "CreateRouteTable")?;

    for route in routes {
      let request = self
        .ec2
        .create_route()
        .route_table_id(&rtb_id)
        .destination_cidr_block(route.destination.to_string());
      let request = match &route.target {
        RouteTarget::InternetGateway(id) => request.gateway_id(id.as_str()),
        RouteTarget::NatGateway(id) => request.nat_gateway_id(id.as_str()),
      };
      request.send().await?;
    }

    Ok(rtb_id)
  }

  async fn create_subnet(
    &self,
    vpc_id: &ResourceId,
    cidr_block: &ipnet::Ipv4Net,
    availability_zone: &str,
    tags: &Tags,
  ) -> Result<String> {
    let response = self
      .ec2
      .create_subnet()
      .vpc_id(vpc_id.as_str())
      .cidr_block(cidr_block.to_string())
      .availability_zone(availability_zone)
      .tag_specifications(tag_specification(ResourceType::Subnet, tags))
      .send()
      .await?;

    required(response.subnet().and_then(|s| s.subnet_id()), "CreateSubnet")
  }

  async fn associate_route_table(&self, route_table_id: &ResourceId, subnet_id: &ResourceId) -> Result<String> {
    let response = self
      .ec2
      .associate_route_table()
      .route_table_id(route_table_id.as_str())
      .subnet_id(subnet_id.as_str())
      .send()
      .await?;

    required(response.association_id(), "AssociateRouteTable")
  }

  async fn allocate_eip(&self) -> Result<String> {
    let response = self.ec2.allocate_address().domain(DomainType::Vpc).send().await?;

    required(response.allocation_id(), "AllocateAddress")
  }

  async fn create_nat_gateway(&self, subnet_id: &ResourceId, allocation_id: &ResourceId, tags: &Tags) -> Result<String> {
    let response = self
      .ec2
      .create_nat_gateway()
      .subnet_id(subnet_id.as_str())
      .allocation_id(allocation_id.as_str())
      .tag_specifications(tag_specification(ResourceType::Natgateway, tags))
      .send()
      .await?;
    let nat_id = required(response.nat_gateway().and_then(|n| n.nat_gateway_id()), "CreateNatGateway")?;

    self.wait_for_nat_gateway(&nat_id).await?;

    Ok(nat_id)
  }

  /// Routes can only target the NAT gateway once it is available
  async fn wait_for_nat_gateway(&self, nat_id: &str) -> Result<()> {
    for attempt in 1..=NAT_GATEWAY_POLL_ATTEMPTS {
      let response = self.ec2.describe_nat_gateways().nat_gateway_ids(nat_id).send().await?;
      let state = response.nat_gateways().first().and_then(|n| n.state());

      match state {
        Some(NatGatewayState::Available) => return Ok(()),
        Some(NatGatewayState::Failed) | Some(NatGatewayState::Deleted) | Some(NatGatewayState::Deleting) => {
          bail!("NAT gateway {nat_id} entered state {:?}", state)
        }
        _ => {
          debug!("NAT gateway {nat_id} not yet available ({attempt}/{NAT_GATEWAY_POLL_ATTEMPTS})");
          sleep(NAT_GATEWAY_POLL_INTERVAL).await;
        }
      }
    }

    Err(anyhow!("NAT gateway {nat_id} did not become available"))
  }

  #[allow(clippy::too_many_arguments)]
  async fn create_security_group(
    &self,
    name: &str,
    description: &str,
    vpc_id: &ResourceId,
    ingress: &[SecurityGroupRule],
    egress: &[SecurityGroupRule],
    tags: &Tags,
  ) -> Result<String> {
    let response = self
      .ec2
      .create_security_group()
      .group_name(name)
      .description(description)
      .vpc_id(vpc_id.as_str())
      .tag_specifications(tag_specification(ResourceType::SecurityGroup, tags))
      .send()
      .await?;
    let sg_id = required(response.group_id(), "CreateSecurityGroup")?;

    // Egress is exactly what was requested, so drop the allow-all rule EC2 adds to new groups
    self
      .ec2
      .revoke_security_group_egress()
      .group_id(&sg_id)
      .ip_permissions(
        IpPermission::builder()
          .ip_protocol("-1")
          .ip_ranges(IpRange::builder().cidr_ip("0.0.0.0/0").build())
          .build(),
      )
      .send()
      .await?;

    if !ingress.is_empty() {
      self
        .ec2
        .authorize_security_group_ingress()
        .group_id(&sg_id)
        .set_ip_permissions(Some(ingress.iter().map(ip_permission).collect()))
        .send()
        .await?;
    }

    if !egress.is_empty() {
      self
        .ec2
        .authorize_security_group_egress()
        .group_id(&sg_id)
        .set_ip_permissions(Some(egress.iter().map(ip_permission).collect()))
        .send()
        .await?;
    }

    Ok(sg_id)
  }

  async fn create_load_balancer(
    &self,
    name: &str,
    subnets: &[ResourceId],
    listeners: &[Listener],
    security_groups: &[ResourceId],
    tags: &Tags,
  ) -> Result<String> {
    let listeners = listeners
      .iter()
      .map(|l| {
        elb::Listener::builder()
          .protocol(&l.lb_protocol)
          .load_balancer_port(l.lb_port)
          .instance_protocol(&l.instance_protocol)
          .instance_port(l.instance_port)
          .build()
      })
      .collect::<Result<Vec<_>, _>>()?;
    let tags = tags
      .iter()
      .map(|(k, v)| elb::Tag::builder().key(k).value(v).build())
      .collect::<Result<Vec<_>, _>>()?;

    let response = self
      .elb
      .create_load_balancer()
      .load_balancer_name(name)
      .set_subnets(Some(to_strings(subnets)))
      .set_security_groups(Some(to_strings(security_groups)))
      .set_listeners(Some(listeners))
      .set_tags(Some(tags))
      .send()
      .await?;
    debug!("Load balancer {name} DNS name: {:?}", response.dns_name());

    // Classic load balancers are referenced by name
    Ok(name.to_owned())
  }

  async fn create_launch_template(
    &self,
    name_prefix: &str,
    image_id: &str,
    instance_type: &str,
    user_data: &str,
    security_groups: &[ResourceId],
  ) -> Result<String> {
    let suffix = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let data = RequestLaunchTemplateData::builder()
      .image_id(image_id)
      .instance_type(InstanceType::from(instance_type))
      .user_data(user_data)
      .set_security_group_ids(Some(to_strings(security_groups)))
      .build();

    let response = self
      .ec2
      .create_launch_template()
      .launch_template_name(format!("{name_prefix}-{suffix}"))
      .launch_template_data(data)
      .send()
      .await?;

    required(
      response.launch_template().and_then(|t| t.launch_template_id()),
      "CreateLaunchTemplate",
    )
  }

  #[allow(clippy::too_many_arguments)]
  async fn create_auto_scaling_group(
    &self,
    name: &str,
    desired_capacity: i32,
    min_size: i32,
    max_size: i32,
    subnets: &[ResourceId],
    load_balancers: &[ResourceId],
    launch_template_id: &ResourceId,
    launch_template_version: &str,
  ) -> Result<String> {
    self
      .autoscaling
      .create_auto_scaling_group()
      .auto_scaling_group_name(name)
      .desired_capacity(desired_capacity)
      .min_size(min_size)
      .max_size(max_size)
      .vpc_zone_identifier(to_strings(subnets).join(","))
      .set_load_balancer_names(Some(to_strings(load_balancers)))
      .launch_template(
        LaunchTemplateSpecification::builder()
          .launch_template_id(launch_template_id.as_str())
          .version(launch_template_version)
          .build(),
      )
      .send()
      .await?;

    Ok(name.to_owned())
  }
}

impl Engine for AwsEngine {
  async fn create(&mut self, name: &str, resource: &Resource) -> Result<ResourceId> {
    let kind = resource.kind();
    let key = (kind, name.to_owned());
    if let Some(id) = self.created.get(&key) {
      return Ok(id.to_owned());
    }

    let id = match resource {
      Resource::Vpc { cidr_block, tags } => self.create_vpc(cidr_block, tags).await,
      Resource::InternetGateway { vpc_id, tags } => self.create_internet_gateway(vpc_id, tags).await,
      Resource::RouteTable { vpc_id, routes, tags } => self.create_route_table(vpc_id, routes, tags).await,
      Resource::Subnet {
        vpc_id,
        cidr_block,
        availability_zone,
        tags,
      } => self.create_subnet(vpc_id, cidr_block, availability_zone, tags).await,
      Resource::RouteTableAssociation {
        route_table_id,
        subnet_id,
      } => self.associate_route_table(route_table_id, subnet_id).await,
      Resource::Eip => self.allocate_eip().await,
      Resource::NatGateway {
        subnet_id,
        allocation_id,
        tags,
      } => self.create_nat_gateway(subnet_id, allocation_id, tags).await,
      Resource::SecurityGroup {
        name,
        description,
        vpc_id,
        ingress,
        egress,
        tags,
      } => {
        self
          .create_security_group(name, description, vpc_id, ingress, egress, tags)
          .await
      }
      Resource::LoadBalancer {
        name,
        subnets,
        listeners,
        security_groups,
        tags,
      } => {
        self
          .create_load_balancer(name, subnets, listeners, security_groups, tags)
          .await
      }
      Resource::LaunchTemplate {
        name_prefix,
        image_id,
        instance_type,
        user_data,
        security_groups,
      } => {
        self
          .create_launch_template(name_prefix, image_id, instance_type, user_data, security_groups)
          .await
      }
      Resource::AutoScalingGroup {
        name,
        desired_capacity,
        min_size,
        max_size,
        subnets,
        load_balancers,
        launch_template_id,
        launch_template_version,
      } => {
        self
          .create_auto_scaling_group(
            name,
            *desired_capacity,
            *min_size,
            *max_size,
            subnets,
            load_balancers,
            launch_template_id,
            launch_template_version,
          )
          .await
      }
    }
    .map(ResourceId::new)
    .map_err(|e| e.context(format!("Failed to create {kind} {name}")))?;

    info!("Created {kind} {name}: {id}");
    self.created.insert(key, id.clone());

    Ok(id)
  }
}

/// Extract an identifier the API is expected to return
fn required(value: Option<&str>, operation: &str) -> Result<String> {
  value
    .map(str::to_owned)
    .ok_or_else(|| anyhow!("{operation} response did not contain an identifier"))
}

fn tag_specification(resource_type: ResourceType, tags: &Tags) -> TagSpecification {
  let tags = tags
    .iter()
    .map(|(k, v)| Tag::builder().key(k).value(v).build())
    .collect();

  TagSpecification::builder()
    .resource_type(resource_type)
    .set_tags(Some(tags))
    .build()
}

/// EC2 expects `-1` rather than a name for all protocols
fn ip_protocol(protocol: &str) -> String {
  match protocol.to_lowercase().as_str() {
    "all" | "-1" => "-1".to_string(),
    other => other.to_string(),
  }
}

fn ip_permission(rule: &SecurityGroupRule) -> IpPermission {
  let ranges = rule
    .cidr_blocks
    .iter()
    .map(|cidr| {
      IpRange::builder()
        .cidr_ip(cidr.to_string())
        .description(&rule.description)
        .build()
    })
    .collect();

  IpPermission::builder()
    .ip_protocol(ip_protocol(&rule.protocol))
    .from_port(rule.from_port)
    .to_port(rule.to_port)
    .set_ip_ranges(Some(ranges))
    .build()
}

fn to_strings(ids: &[ResourceId]) -> Vec<String> {
  ids.iter().map(|id| id.as_str().to_owned()).collect()
}
