use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use super::{Engine, Resource, ResourceId, ResourceKind};

/// A resource requested from the [`Recorder`]
#[derive(Clone, Debug, Serialize)]
pub struct Record {
  pub name: String,
  pub id: ResourceId,
  pub resource: Resource,
}

/// In-memory engine that records every request in creation order
///
/// Identifiers are generated locally as `<prefix>-<sequence>` so the same inputs always produce the same plan. Used
/// to preview a stack without touching AWS.
#[derive(Debug, Default, Serialize)]
pub struct Recorder {
  resources: Vec<Record>,

  #[serde(skip)]
  index: HashMap<(ResourceKind, String), ResourceId>,
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  /// All recorded resources, in the order they were requested
  pub fn records(&self) -> &[Record] {
    &self.resources
  }

  /// Recorded resources of the given kind, in the order they were requested
  pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Record> {
    self.resources.iter().filter(move |r| r.resource.kind() == kind)
  }

  pub fn count(&self, kind: ResourceKind) -> usize {
    self.of_kind(kind).count()
  }

  /// Look up a recorded resource by its identifier
  pub fn get(&self, id: &ResourceId) -> Option<&Record> {
    self.resources.iter().find(|r| &r.id == id)
  }

  pub fn is_empty(&self) -> bool {
    self.resources.is_empty()
  }
}

impl Engine for Recorder {
  async fn create(&mut self, name: &str, resource: &Resource) -> Result<ResourceId> {
    let kind = resource.kind();
    let key = (kind, name.to_owned());

    if let Some(id) = self.index.get(&key) {
      debug!("{kind} {name} already recorded as {id}");
      return Ok(id.to_owned());
    }

    let id = ResourceId::new(format!("{}-{:08x}", kind.id_prefix(), self.resources.len() + 1));
    debug!("Recorded {kind} {name} as {id}");

    self.index.insert(key, id.clone());
    self.resources.push(Record {
      name: name.to_owned(),
      id: id.clone(),
      resource: resource.clone(),
    });

    Ok(id)
  }
}
