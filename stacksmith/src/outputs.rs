//! Cross-stack outputs
//!
//! A stack publishes identifiers (VPC ID, subnet IDs, ...) under well known keys so that independently deployed
//! stacks can consume them by referencing the producing stack. Outputs are persisted as JSON under
//! `<state-dir>/<project>/<stack>.json`.
use std::{
  collections::BTreeMap,
  fmt,
  fs::{self, File},
  io::{BufReader, BufWriter},
  path::{Path, PathBuf},
  str::FromStr,
};

use anyhow::{anyhow, bail, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::tags::StackContext;

/// Default directory where stack outputs are stored
pub const DEFAULT_STATE_DIR: &str = ".stacksmith";

pub const VPC_ID: &str = "vpcId";
pub const PUBLIC_SUBNET_IDS: &str = "publicSubnetIDs";
pub const PRIVATE_SUBNET_IDS: &str = "privateSubnetIDs";

/// Reference to another stack, written as `<project>/<stack>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackRef {
  pub project: String,
  pub stack: String,
}

impl FromStr for StackRef {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.split_once('/') {
      Some((project, stack)) if !project.is_empty() && !stack.is_empty() && !stack.contains('/') => Ok(Self {
        project: project.to_owned(),
        stack: stack.to_owned(),
      }),
      _ => bail!("Invalid stack reference '{s}', expected <project>/<stack>"),
    }
  }
}

impl fmt::Display for StackRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.project, self.stack)
  }
}

impl From<&StackContext> for StackRef {
  fn from(ctx: &StackContext) -> Self {
    Self {
      project: ctx.project.to_owned(),
      stack: ctx.stack.to_owned(),
    }
  }
}

impl StackRef {
  fn path(&self, state_dir: &Path) -> PathBuf {
    state_dir.join(&self.project).join(format!("{}.json", self.stack))
  }
}

/// Outputs exported by one stack
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StackOutputs {
  pub outputs: BTreeMap<String, Value>,
}

impl StackOutputs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Publish a value under `key`, replacing any previous value
  pub fn export<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
    let value = serde_json::to_value(value).with_context(|| format!("while exporting {key}"))?;
    self.outputs.insert(key.to_owned(), value);
    Ok(())
  }

  /// Read the value published under `key`
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
    let value = self
      .outputs
      .get(key)
      .ok_or_else(|| anyhow!("Output {key} not found"))?;

    serde_json::from_value(value.clone()).with_context(|| format!("Output {key} has an unexpected type"))
  }

  /// Load the outputs of the referenced stack
  pub fn read(state_dir: &Path, stack: &StackRef) -> Result<Self> {
    let path = stack.path(state_dir);
    let file = File::open(&path).with_context(|| format!("Stack {stack} has no outputs at {}", path.display()))?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).with_context(|| format!("while reading outputs of stack {stack}"))
  }

  /// Persist the outputs of the given stack
  pub fn write(&self, state_dir: &Path, stack: &StackRef) -> Result<()> {
    let path = stack.path(state_dir);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }

    let file = File::create(&path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, self)?;
    debug!("Outputs of stack {stack} written to {}", path.display());

    Ok(())
  }
}

/// Read a single output of another stack
pub fn import_output<T: DeserializeOwned>(state_dir: &Path, stack: &StackRef, key: &str) -> Result<T> {
  StackOutputs::read(state_dir, stack)?
    .get(key)
    .with_context(|| format!("while importing {key} from stack {stack}"))
}
