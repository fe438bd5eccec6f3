//! Response metadata.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where each resource kind appears in a payload, plus the request language.
///
/// Paths are dotted and relative to the payload's data items; the empty path
/// is the item itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "modelnameIndex")]
    pub modelname_index: IndexMap<String, Vec<String>>,
    pub language: String,
}

impl Meta {
    /// Metadata of a fresh retrieval of `model`, which sits at `offset`.
    pub fn new(model: &str, offset: &str, language: &str) -> Self {
        let mut modelname_index = IndexMap::new();
        modelname_index.insert(model.to_string(), vec![offset.to_string()]);
        Self {
            modelname_index,
            language: language.to_string(),
        }
    }

    /// Record that `model` appears at `path`.
    pub fn record(&mut self, model: &str, path: &str) {
        let paths = self.modelname_index.entry(model.to_string()).or_default();
        if !paths.iter().any(|existing| existing == path) {
            paths.push(path.to_string());
        }
    }

    pub fn paths(&self, model: &str) -> &[String] {
        self.modelname_index
            .get(model)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Merge the metadata of a nested fetch that was placed at `prefix`.
    pub fn merge_nested(&mut self, nested: &Meta, prefix: &str) {
        for (model, paths) in &nested.modelname_index {
            for path in paths {
                let full_path = if path.is_empty() {
                    prefix.to_string()
                } else {
                    format!("{prefix}.{path}")
                };
                self.record(model, &full_path);
            }
        }
    }
}
