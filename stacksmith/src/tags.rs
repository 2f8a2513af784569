use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Project and stack names used to scope every resource of a deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackContext {
  /// Name of the project (i.e. - `vpc-modular`)
  pub project: String,

  /// Name of the stack, which doubles as the environment (i.e. - `dev`)
  pub stack: String,
}

impl StackContext {
  pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
    Self {
      project: project.into(),
      stack: stack.into(),
    }
  }

  /// `<project>-<stack>`
  pub fn name(&self) -> String {
    format!("{}-{}", self.project, self.stack)
  }

  /// Tags applied to every resource created within the stack
  pub fn common_tags(&self) -> BTreeMap<String, String> {
    BTreeMap::from([
      ("Project".to_string(), self.project.to_owned()),
      ("Environment".to_string(), self.stack.to_owned()),
      ("Name".to_string(), self.name()),
    ])
  }

  /// Common tags where `Name` is scoped to the given resource name
  pub fn named_tags(&self, name: &str) -> BTreeMap<String, String> {
    let mut tags = self.common_tags();
    tags.insert("Name".to_string(), format!("{}-{name}", self.name()));
    tags
  }
}
