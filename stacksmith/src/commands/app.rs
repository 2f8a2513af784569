use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Args;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
  config::{self, AppConfig, AppStackConfig, DEFAULT_APP_CONFIG},
  ec2::{self, AsgInput, SecurityGroupInput},
  elb::{self, ElbInput},
  engine::{AwsEngine, Engine, Listener, Recorder, ResourceId, SecurityGroupRule},
  outputs::{import_output, StackOutputs, StackRef, DEFAULT_STATE_DIR, PUBLIC_SUBNET_IDS, VPC_ID},
  tags::StackContext,
};

/// Project of the VPC stack the application stack imports from, unless told otherwise
const DEFAULT_VPC_PROJECT: &str = "vpc-modular";

pub const LOAD_BALANCER: &str = "loadBalancer";
pub const AUTO_SCALING_GROUP: &str = "autoScalingGroup";

#[derive(Args, Debug)]
pub struct App {
  /// Stack configuration file; the embedded `app.yaml` is used when not provided
  #[arg(short, long)]
  pub config: Option<PathBuf>,

  /// Overrides the project name of the configuration
  #[arg(long)]
  pub project: Option<String>,

  /// Overrides the stack name of the configuration
  #[arg(long)]
  pub stack: Option<String>,

  /// Overrides the region of the configuration
  #[arg(long)]
  pub region: Option<String>,

  /// VPC stack to import `vpcId` and `publicSubnetIDs` from, as `<project>/<stack>`
  #[arg(long)]
  pub vpc_stack: Option<String>,

  /// Directory where stack outputs are stored
  #[arg(long, default_value = DEFAULT_STATE_DIR)]
  pub state_dir: PathBuf,

  /// Print the resources that would be created instead of creating them
  #[arg(long)]
  pub preview: bool,
}

/// Identifiers the application stack is built on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Network {
  pub vpc_id: ResourceId,
  pub public_subnet_ids: Vec<ResourceId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOutput {
  pub instance_security_group: ResourceId,
  pub load_balancer_security_group: ResourceId,
  pub load_balancer: ResourceId,
  pub launch_template: ResourceId,
  pub auto_scaling_group: ResourceId,
}

impl App {
  fn get_config(&self) -> Result<AppStackConfig> {
    let mut config: AppStackConfig = config::load(self.config.as_deref(), DEFAULT_APP_CONFIG)?;

    if let Some(project) = &self.project {
      config.project = project.to_owned();
    }
    if let Some(stack) = &self.stack {
      config.stack = stack.to_owned();
    }
    if let Some(region) = &self.region {
      config.region = Some(region.to_owned());
    }
    if let Some(vpc_stack) = &self.vpc_stack {
      config.vpc_stack = Some(vpc_stack.to_owned());
    }

    Ok(config)
  }

  /// The VPC stack to import from, defaulting to the VPC project under the same stack name
  fn vpc_stack(config: &AppStackConfig) -> Result<StackRef> {
    match &config.vpc_stack {
      Some(reference) => reference.parse(),
      None => Ok(StackRef {
        project: DEFAULT_VPC_PROJECT.to_string(),
        stack: config.stack.to_owned(),
      }),
    }
  }

  fn import_network(&self, config: &AppStackConfig) -> Result<Network> {
    let vpc_stack = Self::vpc_stack(config)?;
    debug!("Importing network from stack {vpc_stack}");

    Ok(Network {
      vpc_id: import_output(&self.state_dir, &vpc_stack, VPC_ID)?,
      public_subnet_ids: import_output(&self.state_dir, &vpc_stack, PUBLIC_SUBNET_IDS)?,
    })
  }

  pub async fn deploy(&self) -> Result<()> {
    let config = self.get_config()?;
    let ctx = config.context();
    debug!("Stack configuration: {config:#?}");

    let network = self.import_network(&config)?;

    if self.preview {
      let mut recorder = Recorder::new();
      let output = build(&mut recorder, &ctx, &network, &config.app).await?;

      return super::print_preview(&recorder, &output);
    }

    let sdk_config = crate::get_sdk_config(config.region.clone()).await?;
    let mut engine = AwsEngine::new(&sdk_config, crate::AWS_MAX_ATTEMPTS);
    let output = build(&mut engine, &ctx, &network, &config.app).await?;

    let stack = StackRef::from(&ctx);
    let mut outputs = StackOutputs::new();
    outputs.export(LOAD_BALANCER, &output.load_balancer)?;
    outputs.export(AUTO_SCALING_GROUP, &output.auto_scaling_group)?;
    outputs.write(&self.state_dir, &stack)?;
    info!("Stack {stack} created");

    print!("{}", serde_yaml::to_string(&output)?);
    Ok(())
  }
}

fn anywhere() -> Vec<Ipv4Net> {
  vec![Ipv4Net::default()]
}

fn http_rule() -> SecurityGroupRule {
  SecurityGroupRule {
    description: "http".to_string(),
    protocol: "tcp".to_string(),
    from_port: 80,
    to_port: 80,
    cidr_blocks: anywhere(),
  }
}

/// Create the security groups, load balancer and auto scaling group of the application
pub async fn build<E: Engine>(
  engine: &mut E,
  ctx: &StackContext,
  network: &Network,
  app: &AppConfig,
) -> Result<AppOutput> {
  let name = ctx.name();

  let instance_security_group = ec2::new_security_group(
    engine,
    ctx,
    &SecurityGroupInput {
      name: format!("{name}-ec2"),
      vpc_id: network.vpc_id.clone(),
      ingress: vec![http_rule()],
      egress: vec![SecurityGroupRule {
        description: "all".to_string(),
        protocol: "all".to_string(),
        from_port: 0,
        to_port: 0,
        cidr_blocks: anywhere(),
      }],
    },
  )
  .await?;

  let load_balancer_security_group = ec2::new_security_group(
    engine,
    ctx,
    &SecurityGroupInput {
      name: format!("{name}-elb"),
      vpc_id: network.vpc_id.clone(),
      ingress: vec![http_rule()],
      egress: vec![SecurityGroupRule {
        description: "all".to_string(),
        ..http_rule()
      }],
    },
  )
  .await?;

  let load_balancer = elb::new_elb(
    engine,
    ctx,
    &ElbInput {
      name: name.to_owned(),
      subnet_ids: network.public_subnet_ids.clone(),
      listeners: vec![Listener {
        lb_port: 80,
        lb_protocol: "http".to_string(),
        instance_port: 80,
        instance_protocol: "http".to_string(),
      }],
      security_group_ids: vec![load_balancer_security_group.clone()],
    },
  )
  .await?;

  let user_data = app.user_data().context("while reading user data")?;
  let asg = ec2::new_asg(
    engine,
    &AsgInput {
      name: name.to_owned(),
      ami_id: app.ami_id.to_owned(),
      instance_type: app.instance_type.to_owned(),
      user_data: STANDARD.encode(user_data),
      subnet_ids: network.public_subnet_ids.clone(),
      load_balancer_id: load_balancer.clone(),
      security_group_ids: vec![instance_security_group.clone()],
    },
  )
  .await?;

  Ok(AppOutput {
    instance_security_group,
    load_balancer_security_group,
    load_balancer,
    launch_template: asg.launch_template,
    auto_scaling_group: asg.group,
  })
}

#[cfg(test)]
mod tests {
  use rstest::*;
  use tempfile::tempdir;

  use super::*;
  use crate::engine::{Resource, ResourceKind};

  fn network() -> Network {
    Network {
      vpc_id: "vpc-1".into(),
      public_subnet_ids: vec!["subnet-1".into(), "subnet-2".into(), "subnet-3".into()],
    }
  }

  fn app_config() -> AppConfig {
    AppConfig {
      ami_id: "ami-0d1bf5b68307103c2".to_string(),
      instance_type: "t3a.micro".to_string(),
      user_data: Some("#!/bin/bash\necho hello\n".to_string()),
    }
  }

  fn app(state_dir: PathBuf, vpc_stack: Option<&str>) -> App {
    App {
      config: None,
      project: None,
      stack: None,
      region: None,
      vpc_stack: vpc_stack.map(str::to_owned),
      state_dir,
      preview: true,
    }
  }

  #[tokio::test]
  async fn it_builds_application_stack() {
    let mut recorder = Recorder::new();
    let ctx = StackContext::new("app-modular", "dev");

    let output = build(&mut recorder, &ctx, &network(), &app_config()).await.unwrap();

    assert_eq!(recorder.count(ResourceKind::SecurityGroup), 2);
    assert_eq!(recorder.count(ResourceKind::LoadBalancer), 1);
    assert_eq!(recorder.count(ResourceKind::LaunchTemplate), 1);
    assert_eq!(recorder.count(ResourceKind::AutoScalingGroup), 1);

    match &recorder.get(&output.instance_security_group).unwrap().resource {
      Resource::SecurityGroup {
        name, ingress, egress, ..
      } => {
        assert_eq!(name, "app-modular-dev-ec2");
        assert_eq!(ingress[0].from_port, 80);
        assert_eq!(egress[0].protocol, "all");
        assert_eq!(egress[0].cidr_blocks[0].to_string(), "0.0.0.0/0");
      }
      other => panic!("unexpected resource {other:?}"),
    }

    match &recorder.get(&output.load_balancer).unwrap().resource {
      Resource::LoadBalancer {
        subnets,
        security_groups,
        ..
      } => {
        assert_eq!(subnets, &network().public_subnet_ids);
        assert_eq!(security_groups, &vec![output.load_balancer_security_group.clone()]);
      }
      other => panic!("unexpected resource {other:?}"),
    }
  }

  #[tokio::test]
  async fn load_balancer_group_only_sends_http() {
    let mut recorder = Recorder::new();
    let ctx = StackContext::new("app-modular", "dev");

    let output = build(&mut recorder, &ctx, &network(), &app_config()).await.unwrap();

    match &recorder.get(&output.load_balancer_security_group).unwrap().resource {
      Resource::SecurityGroup {
        name, ingress, egress, ..
      } => {
        assert_eq!(name, "app-modular-dev-elb");
        assert_eq!(ingress[0].description, "http");
        assert_eq!(egress.len(), 1);
        assert_eq!(egress[0].description, "all");
        assert_eq!(egress[0].protocol, "tcp");
        assert_eq!((egress[0].from_port, egress[0].to_port), (80, 80));
        assert_eq!(egress[0].cidr_blocks[0].to_string(), "0.0.0.0/0");
      }
      other => panic!("unexpected resource {other:?}"),
    }
  }

  #[tokio::test]
  async fn it_encodes_user_data() {
    let mut recorder = Recorder::new();
    let ctx = StackContext::new("app-modular", "dev");

    let output = build(&mut recorder, &ctx, &network(), &app_config()).await.unwrap();

    match &recorder.get(&output.launch_template).unwrap().resource {
      Resource::LaunchTemplate {
        user_data,
        security_groups,
        ..
      } => {
        let decoded = STANDARD.decode(user_data).unwrap();
        assert_eq!(decoded, b"#!/bin/bash\necho hello\n");
        assert_eq!(security_groups, &vec![output.instance_security_group.clone()]);
      }
      other => panic!("unexpected resource {other:?}"),
    }
  }

  #[rstest]
  #[case(None, "vpc-modular/dev")]
  #[case(Some("network/prod"), "network/prod")]
  fn it_resolves_vpc_stack(#[case] reference: Option<&str>, #[case] expected: &str) {
    let app = app(PathBuf::from(DEFAULT_STATE_DIR), reference);
    let config = app.get_config().unwrap();

    assert_eq!(App::vpc_stack(&config).unwrap().to_string(), expected);
  }

  #[test]
  fn it_imports_network_from_vpc_stack() {
    let dir = tempdir().unwrap();
    let stack: StackRef = "vpc-modular/dev".parse().unwrap();
    let mut outputs = StackOutputs::new();
    outputs.export(VPC_ID, "vpc-123").unwrap();
    outputs.export(PUBLIC_SUBNET_IDS, vec!["subnet-1", "subnet-2"]).unwrap();
    outputs.write(dir.path(), &stack).unwrap();

    let app = app(dir.path().to_path_buf(), None);
    let network = app.import_network(&app.get_config().unwrap()).unwrap();

    assert_eq!(network.vpc_id.as_str(), "vpc-123");
    assert_eq!(network.public_subnet_ids.len(), 2);
  }

  #[test]
  fn missing_vpc_stack_is_an_error() {
    let dir = tempdir().unwrap();
    let app = app(dir.path().to_path_buf(), Some("vpc-modular/prod"));

    assert!(app.import_network(&app.get_config().unwrap()).is_err());
  }
}
