pub mod cli;
pub mod commands;
pub mod config;
pub mod ec2;
pub mod elb;
pub mod engine;
pub mod outputs;
pub mod tags;
pub mod vpc;

use std::env;

use anyhow::Result;
use aws_config::{meta::region::RegionProviderChain, SdkConfig};
use aws_types::region::Region;
pub use cli::{Cli, Commands};
use rust_embed::RustEmbed;

/// Embeds the contents of the `files/` directory into the binary
///
/// This struct contains the default stack configurations and the instance user data used within `stacksmith`
#[derive(RustEmbed)]
#[folder = "files/"]
pub struct Assets;

/// Number of attempts the AWS clients make for each request
pub const AWS_MAX_ATTEMPTS: u32 = 3;

/// Get the configuration to authn/authz with AWS that will be used across AWS clients
pub async fn get_sdk_config(region: Option<String>) -> Result<SdkConfig> {
  let aws_region = match region {
    Some(region) => Some(Region::new(region)),
    None => env::var("AWS_DEFAULT_REGION").ok().map(Region::new),
  };

  let region_provider = RegionProviderChain::first_try(aws_region).or_default_provider();

  Ok(aws_config::from_env().region(region_provider).load().await)
}
