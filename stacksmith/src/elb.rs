use anyhow::{Context, Result};
use aws_config::SdkConfig;
use aws_sdk_elasticloadbalancing::{
  config::{self, retry::RetryConfig},
  Client,
};

use crate::{
  engine::{Engine, Listener, Resource, ResourceId},
  tags::StackContext,
};

/// Construct and return the (classic) Elastic Load Balancing client
pub(crate) fn get_client(config: &SdkConfig, retries: u32) -> Client {
  Client::from_conf(
    config::Builder::from(config)
      .retry_config(RetryConfig::standard().with_max_attempts(retries))
      .build(),
  )
}

#[derive(Clone, Debug)]
pub struct ElbInput {
  pub name: String,
  pub subnet_ids: Vec<ResourceId>,
  pub listeners: Vec<Listener>,
  pub security_group_ids: Vec<ResourceId>,
}

/// Classic load balancer spanning the given subnets
pub async fn new_elb<E: Engine>(engine: &mut E, ctx: &StackContext, input: &ElbInput) -> Result<ResourceId> {
  engine
    .create(
      "elb",
      &Resource::LoadBalancer {
        name: input.name.to_owned(),
        subnets: input.subnet_ids.clone(),
        listeners: input.listeners.clone(),
        security_groups: input.security_group_ids.clone(),
        tags: ctx.named_tags(&input.name),
      },
    )
    .await
    .context("while creating load balancer")
}
