use anyhow::{Context, Result};
use aws_config::SdkConfig;
use aws_sdk_ec2::types::Filter;
use tracing::info;

use crate::{
  engine::{Engine, Resource, ResourceId, SecurityGroupRule},
  tags::StackContext,
};

/// Launch template version used by the auto scaling group
const LAUNCH_TEMPLATE_VERSION: &str = "$Latest";

/// Construct and return the EC2 client
pub(crate) fn get_client(config: &SdkConfig, retries: u32) -> aws_sdk_ec2::Client {
  use aws_sdk_ec2::config::{self, retry::RetryConfig};

  aws_sdk_ec2::Client::from_conf(
    config::Builder::from(config)
      .retry_config(RetryConfig::standard().with_max_attempts(retries))
      .build(),
  )
}

/// EC2 client for one-off lookups, using the shared retry budget
fn get_default_client(config: &SdkConfig) -> aws_sdk_ec2::Client {
  get_client(config, crate::AWS_MAX_ATTEMPTS)
}

/// Construct and return the Auto Scaling client
pub(crate) fn get_autoscaling_client(config: &SdkConfig, retries: u32) -> aws_sdk_autoscaling::Client {
  use aws_sdk_autoscaling::config::{self, retry::RetryConfig};

  aws_sdk_autoscaling::Client::from_conf(
    config::Builder::from(config)
      .retry_config(RetryConfig::standard().with_max_attempts(retries))
      .build(),
  )
}

/// Names of the availability zones currently available in the configured region, sorted
pub async fn get_availability_zones(config: &SdkConfig) -> Result<Vec<String>> {
  let client = get_default_client(config);
  let response = client
    .describe_availability_zones()
    .filters(Filter::builder().name("state").values("available").build())
    .send()
    .await
    .context("while discovering availability zones")?;

  let mut zones: Vec<String> = response
    .availability_zones()
    .iter()
    .filter_map(|az| az.zone_name().map(str::to_owned))
    .collect();
  zones.sort();
  info!("Availability zones: {}", zones.join(", "));

  Ok(zones)
}

#[derive(Clone, Debug)]
pub struct SecurityGroupInput {
  /// Used as the group name, its description and in its `Name` tag
  pub name: String,
  pub vpc_id: ResourceId,
  pub ingress: Vec<SecurityGroupRule>,
  pub egress: Vec<SecurityGroupRule>,
}

pub async fn new_security_group<E: Engine>(
  engine: &mut E,
  ctx: &StackContext,
  input: &SecurityGroupInput,
) -> Result<ResourceId> {
  engine
    .create(
      &input.name,
      &Resource::SecurityGroup {
        name: input.name.to_owned(),
        description: input.name.to_owned(),
        vpc_id: input.vpc_id.clone(),
        ingress: input.ingress.clone(),
        egress: input.egress.clone(),
        tags: ctx.named_tags(&input.name),
      },
    )
    .await
    .with_context(|| format!("while creating security group {}", input.name))
}

#[derive(Clone, Debug)]
pub struct AsgInput {
  pub name: String,

  pub ami_id: String,
  pub instance_type: String,
  /// Base64 encoded
  pub user_data: String,

  pub subnet_ids: Vec<ResourceId>,
  pub load_balancer_id: ResourceId,
  pub security_group_ids: Vec<ResourceId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsgOutput {
  pub launch_template: ResourceId,
  pub group: ResourceId,
}

/// Single instance auto scaling group behind the load balancer, launched from a new launch template
pub async fn new_asg<E: Engine>(engine: &mut E, input: &AsgInput) -> Result<AsgOutput> {
  let launch_template = engine
    .create(
      &input.name,
      &Resource::LaunchTemplate {
        name_prefix: input.name.to_owned(),
        image_id: input.ami_id.to_owned(),
        instance_type: input.instance_type.to_owned(),
        user_data: input.user_data.to_owned(),
        security_groups: input.security_group_ids.clone(),
      },
    )
    .await
    .context("while creating launch template")?;

  let group = engine
    .create(
      &input.name,
      &Resource::AutoScalingGroup {
        name: input.name.to_owned(),
        desired_capacity: 1,
        min_size: 1,
        max_size: 1,
        subnets: input.subnet_ids.clone(),
        load_balancers: vec![input.load_balancer_id.clone()],
        launch_template_id: launch_template.clone(),
        launch_template_version: LAUNCH_TEMPLATE_VERSION.to_string(),
      },
    )
    .await
    .context("while creating auto scaling group")?;

  Ok(AsgOutput { launch_template, group })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::{Recorder, ResourceKind};

  fn http() -> SecurityGroupRule {
    SecurityGroupRule {
      description: "http".to_string(),
      protocol: "tcp".to_string(),
      from_port: 80,
      to_port: 80,
      cidr_blocks: vec!["0.0.0.0/0".parse().unwrap()],
    }
  }

  #[tokio::test]
  async fn zone_lookup_uses_shared_retry_budget() {
    let config = crate::get_sdk_config(Some("us-east-1".to_string())).await.unwrap();
    let client = get_default_client(&config);

    let attempts = client.config().retry_config().map(|retry| retry.max_attempts());
    assert_eq!(attempts, Some(crate::AWS_MAX_ATTEMPTS));
  }

  #[tokio::test]
  async fn it_creates_security_group() {
    let mut recorder = Recorder::new();
    let ctx = StackContext::new("app-modular", "dev");
    let input = SecurityGroupInput {
      name: "app-modular-dev-ec2".to_string(),
      vpc_id: "vpc-1".into(),
      ingress: vec![http()],
      egress: vec![],
    };

    let id = new_security_group(&mut recorder, &ctx, &input).await.unwrap();

    let record = recorder.get(&id).unwrap();
    match &record.resource {
      Resource::SecurityGroup {
        name,
        description,
        vpc_id,
        ingress,
        tags,
        ..
      } => {
        assert_eq!(name, "app-modular-dev-ec2");
        assert_eq!(description, "app-modular-dev-ec2");
        assert_eq!(vpc_id.as_str(), "vpc-1");
        assert_eq!(ingress, &vec![http()]);
        assert_eq!(tags["Name"], "app-modular-dev-app-modular-dev-ec2");
      }
      other => panic!("unexpected resource {other:?}"),
    }
  }

  #[tokio::test]
  async fn it_creates_single_instance_asg() {
    let mut recorder = Recorder::new();
    let input = AsgInput {
      name: "app-modular-dev".to_string(),
      ami_id: "ami-0d1bf5b68307103c2".to_string(),
      instance_type: "t3a.micro".to_string(),
      user_data: "IyEvYmluL2Jhc2g=".to_string(),
      subnet_ids: vec!["subnet-1".into(), "subnet-2".into()],
      load_balancer_id: "elb-1".into(),
      security_group_ids: vec!["sg-1".into()],
    };

    let output = new_asg(&mut recorder, &input).await.unwrap();

    assert_eq!(recorder.count(ResourceKind::LaunchTemplate), 1);
    match &recorder.get(&output.group).unwrap().resource {
      Resource::AutoScalingGroup {
        desired_capacity,
        min_size,
        max_size,
        subnets,
        load_balancers,
        launch_template_id,
        launch_template_version,
        ..
      } => {
        assert_eq!((*desired_capacity, *min_size, *max_size), (1, 1, 1));
        assert_eq!(subnets.len(), 2);
        assert_eq!(load_balancers, &vec![ResourceId::from("elb-1")]);
        assert_eq!(launch_template_id, &output.launch_template);
        assert_eq!(launch_template_version, "$Latest");
      }
      other => panic!("unexpected resource {other:?}"),
    }
  }
}
