use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde_json::Value;

use crate::outputs::{StackOutputs, StackRef, DEFAULT_STATE_DIR};

#[derive(Args, Debug)]
pub struct Outputs {
  /// Stack to print the outputs of, as `<project>/<stack>`
  pub stack_ref: StackRef,

  /// Directory where stack outputs are stored
  #[arg(long, default_value = DEFAULT_STATE_DIR)]
  pub state_dir: PathBuf,

  /// Only print the output with this key
  #[arg(long)]
  pub key: Option<String>,
}

impl Outputs {
  pub fn print(&self) -> Result<()> {
    let outputs = StackOutputs::read(&self.state_dir, &self.stack_ref)?;

    let rendered = match &self.key {
      Some(key) => serde_yaml::to_string(&outputs.get::<Value>(key)?)?,
      None => serde_yaml::to_string(&outputs.outputs)?,
    };
    print!("{rendered}");

    Ok(())
  }
}
