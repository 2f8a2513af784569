use std::{fs::File, io::BufReader, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::{tags::StackContext, vpc::VpcInput, Assets};

/// Embedded configuration of the VPC stack
pub const DEFAULT_VPC_CONFIG: &str = "vpc.yaml";

/// Embedded configuration of the application stack
pub const DEFAULT_APP_CONFIG: &str = "app.yaml";

/// Embedded user data script for the application instances
pub const DEFAULT_USER_DATA: &str = "user-data.sh";

/// Configuration of the stack that owns the VPC
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkStackConfig {
  pub project: String,
  pub stack: String,

  /// Defaults to the region resolved from the environment
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub region: Option<String>,

  pub network: VpcInput,
}

/// Configuration of the stack that runs the application inside an existing VPC
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppStackConfig {
  pub project: String,
  pub stack: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub region: Option<String>,

  /// Stack that exports the VPC outputs, as `<project>/<stack>`
  ///
  /// Defaults to `vpc-modular/<stack>`
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vpc_stack: Option<String>,

  pub app: AppConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
  pub ami_id: String,

  pub instance_type: String,

  /// Plain text user data script; the embedded `user-data.sh` is used when not set
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_data: Option<String>,
}

impl AppConfig {
  /// The user data script, not yet encoded
  pub fn user_data(&self) -> Result<String> {
    match &self.user_data {
      Some(script) => Ok(script.to_owned()),
      None => read_asset(DEFAULT_USER_DATA),
    }
  }
}

impl NetworkStackConfig {
  pub fn context(&self) -> StackContext {
    StackContext::new(&self.project, &self.stack)
  }
}

impl AppStackConfig {
  pub fn context(&self) -> StackContext {
    StackContext::new(&self.project, &self.stack)
  }
}

/// Read a stack configuration file, falling back to the embedded default when no path is given
pub fn load<T: DeserializeOwned>(path: Option<&Path>, default: &str) -> Result<T> {
  match path {
    Some(path) => {
      debug!("Reading configuration from {}", path.display());
      let file = File::open(path).with_context(|| format!("Unable to open configuration {}", path.display()))?;
      let reader = BufReader::new(file);
      serde_yaml::from_reader(reader).with_context(|| format!("Invalid configuration {}", path.display()))
    }
    None => {
      debug!("Using embedded configuration {default}");
      let contents = read_asset(default)?;
      serde_yaml::from_str(&contents).with_context(|| format!("Invalid embedded configuration {default}"))
    }
  }
}

fn read_asset(name: &str) -> Result<String> {
  let file = Assets::get(name).ok_or_else(|| anyhow!("Embedded file {name} not found"))?;
  let contents = std::str::from_utf8(file.data.as_ref())?;

  Ok(contents.to_owned())
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tempfile::NamedTempFile;

  use super::*;

  #[test]
  fn it_loads_embedded_vpc_config() {
    let config: NetworkStackConfig = load(None, DEFAULT_VPC_CONFIG).unwrap();

    assert_eq!(config.project, "vpc-modular");
    assert_eq!(config.stack, "dev");
    assert_eq!(config.network.vpc_cidr_block.to_string(), "10.0.0.0/16");
    assert!(config.network.availability_zones.is_empty());
    assert_eq!(config.network.public_subnet_cidr_blocks.len(), 3);
    assert_eq!(config.network.private_subnet_cidr_blocks[0].to_string(), "10.0.100.0/24");
  }

  #[test]
  fn it_loads_embedded_app_config() {
    let config: AppStackConfig = load(None, DEFAULT_APP_CONFIG).unwrap();

    assert_eq!(config.context().name(), "app-modular-dev");
    assert_eq!(config.vpc_stack, None);
    assert_eq!(config.app.ami_id, "ami-0d1bf5b68307103c2");
    assert_eq!(config.app.instance_type, "t3a.micro");

    let user_data = config.app.user_data().unwrap();
    assert!(user_data.starts_with("#!/bin/bash"));
    assert!(user_data.contains("systemctl enable nginx"));
  }

  #[test]
  fn it_loads_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
      file,
      r#"
project: network
stack: prod
region: eu-west-1
network:
  vpc_cidr_block: 172.16.0.0/16
  availability_zones: [eu-west-1a, eu-west-1b]
  private_subnet_cidr_blocks: [172.16.10.0/24]
"#
    )
    .unwrap();

    let config: NetworkStackConfig = load(Some(file.path()), DEFAULT_VPC_CONFIG).unwrap();

    assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.context(), StackContext::new("network", "prod"));
    assert_eq!(config.network.availability_zones, ["eu-west-1a", "eu-west-1b"]);
    assert!(config.network.public_subnet_cidr_blocks.is_empty());
  }

  #[test]
  fn it_rejects_invalid_cidr() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
      file,
      r#"
project: network
stack: prod
network:
  vpc_cidr_block: 10.0.0.0/33
"#
    )
    .unwrap();

    assert!(load::<NetworkStackConfig>(Some(file.path()), DEFAULT_VPC_CONFIG).is_err());
  }
}
