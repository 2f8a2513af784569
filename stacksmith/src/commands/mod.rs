pub mod app;
pub mod outputs;
pub mod vpc;

use anyhow::Result;
use serde::Serialize;

use crate::engine::{Record, Recorder};

#[derive(Serialize)]
struct Preview<'a, T: Serialize> {
  resources: &'a [Record],
  outputs: &'a T,
}

/// Print the resources a stack would create along with what it would output, as YAML
pub(crate) fn print_preview<T: Serialize>(recorder: &Recorder, outputs: &T) -> Result<()> {
  let preview = Preview {
    resources: recorder.records(),
    outputs,
  };
  print!("{}", serde_yaml::to_string(&preview)?);

  Ok(())
}
