use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::{debug, info};

use crate::{
  config::{self, NetworkStackConfig, DEFAULT_VPC_CONFIG},
  ec2,
  engine::{AwsEngine, Engine, Recorder},
  outputs::{StackOutputs, StackRef, DEFAULT_STATE_DIR, PRIVATE_SUBNET_IDS, PUBLIC_SUBNET_IDS, VPC_ID},
  tags::StackContext,
  vpc::{self, VpcInput},
};

#[derive(Args, Debug)]
pub struct Network {
  /// Stack configuration file; the embedded `vpc.yaml` is used when not provided
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

  /// Availability zones to spread subnets across (comma separated)
  ///
  /// When neither provided here nor in the configuration, the zones available in the region are used
  #[arg(long, value_delimiter = ',')]
  pub availability_zones: Vec<String>,

  /// Directory where stack outputs are stored
  #[arg(long, default_value = DEFAULT_STATE_DIR)]
  pub state_dir: PathBuf,

  /// Print the resources that would be created instead of creating them
  #[arg(long)]
  pub preview: bool,
}

impl Network {
  fn get_config(&self) -> Result<NetworkStackConfig> {
    let mut config: NetworkStackConfig = config::load(self.config.as_deref(), DEFAULT_VPC_CONFIG)?;

    if let Some(project) = &self.project {
      config.project = project.to_owned();
    }
    if let Some(stack) = &self.stack {
      config.stack = stack.to_owned();
    }
    if let Some(region) = &self.region {
      config.region = Some(region.to_owned());
    }
    if !self.availability_zones.is_empty() {
      config.network.availability_zones = self.availability_zones.clone();
    }

    Ok(config)
  }

  pub async fn deploy(&self) -> Result<()> {
    let mut config = self.get_config()?;
    let ctx = config.context();
    debug!("Stack configuration: {config:#?}");

    let sdk_config = match (self.preview, config.network.availability_zones.is_empty()) {
      (true, false) => None,
      _ => Some(crate::get_sdk_config(config.region.clone()).await?),
    };

    if config.network.availability_zones.is_empty() {
      if let Some(sdk_config) = &sdk_config {
        config.network.availability_zones = ec2::get_availability_zones(sdk_config).await?;
      }
    }

    match sdk_config {
      Some(sdk_config) if !self.preview => {
        let mut engine = AwsEngine::new(&sdk_config, crate::AWS_MAX_ATTEMPTS);
        let outputs = build(&mut engine, &ctx, &config.network).await?;

        let stack = StackRef::from(&ctx);
        outputs.write(&self.state_dir, &stack)?;
        info!("Stack {stack} created");

        print!("{}", serde_yaml::to_string(&outputs.outputs)?);
        Ok(())
      }
      _ => {
        let mut recorder = Recorder::new();
        let outputs = build(&mut recorder, &ctx, &config.network).await?;

        super::print_preview(&recorder, &outputs.outputs)
      }
    }
  }
}

/// Create the VPC and collect the outputs other stacks consume
pub async fn build<E: Engine>(engine: &mut E, ctx: &StackContext, input: &VpcInput) -> Result<StackOutputs> {
  let vpc = vpc::new_vpc(engine, ctx, input).await?;

  let mut outputs = StackOutputs::new();
  outputs.export(VPC_ID, &vpc.vpc)?;
  outputs.export(PUBLIC_SUBNET_IDS, vpc.public_subnet_ids())?;
  outputs.export(PRIVATE_SUBNET_IDS, vpc.private_subnet_ids())?;

  Ok(outputs)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::ResourceKind;

  #[tokio::test]
  async fn it_exports_vpc_outputs() {
    let config: NetworkStackConfig = config::load(None, DEFAULT_VPC_CONFIG).unwrap();
    let mut input = config.network.clone();
    input.availability_zones = vec!["eu-west-1a".into(), "eu-west-1b".into(), "eu-west-1c".into()];

    let mut recorder = Recorder::new();
    let outputs = build(&mut recorder, &config.context(), &input).await.unwrap();

    let vpc_id: String = outputs.get(VPC_ID).unwrap();
    let public: Vec<String> = outputs.get(PUBLIC_SUBNET_IDS).unwrap();
    let private: Vec<String> = outputs.get(PRIVATE_SUBNET_IDS).unwrap();

    assert_eq!(vpc_id, "vpc-00000001");
    assert_eq!(public.len(), 3);
    assert_eq!(private.len(), 3);
    assert_eq!(recorder.count(ResourceKind::NatGateway), 1);
    assert!(public.iter().chain(&private).all(|id| id.starts_with("subnet-")));
  }

  #[test]
  fn it_overrides_configuration() {
    let network = Network {
      config: None,
      project: Some("network".to_string()),
      stack: Some("prod".to_string()),
      region: Some("us-west-2".to_string()),
      availability_zones: vec!["us-west-2a".to_string(), "us-west-2b".to_string()],
      state_dir: PathBuf::from(DEFAULT_STATE_DIR),
      preview: true,
    };

    let config = network.get_config().unwrap();

    assert_eq!(config.context(), StackContext::new("network", "prod"));
    assert_eq!(config.region.as_deref(), Some("us-west-2"));
    assert_eq!(config.network.availability_zones, ["us-west-2a", "us-west-2b"]);
  }
}
