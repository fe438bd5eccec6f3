//! Field whitelists.
//!
//! A whitelist declares which fields a resource lets callers filter, include
//! or order by. Entries are written either as a bare strategy tag or as a
//! descriptor object:
//!
//! ```json
//! {
//!   "id": "direct",
//!   "tags": "recursive",
//!   "phase": {"strategy": "recursive", "model": "Phase"},
//!   "title": {"translatable": true}
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How an include owns the dotted segments beneath it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeStrategy {
    /// Terminal; deeper segments are resolved by this resource.
    #[default]
    Direct,
    /// The included resource resolves everything beneath this field itself.
    Recursive,
}

/// Capability descriptor of one whitelisted field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntryRepr")]
pub struct WhitelistEntry {
    pub strategy: IncludeStrategy,
    #[serde(default)]
    pub translatable: bool,
    /// Resource kind recorded in response metadata when this field is included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Opaque handler configuration, handed to the field's handler.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl WhitelistEntry {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn recursive() -> Self {
        Self {
            strategy: IncludeStrategy::Recursive,
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn translatable(mut self) -> Self {
        self.translatable = true;
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntryRepr {
    Tag(String),
    Code(u8),
    Descriptor {
        #[serde(default)]
        strategy: Option<StrategyRepr>,
        #[serde(default)]
        translatable: bool,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        config: serde_json::Value,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrategyRepr {
    Tag(String),
    Code(u8),
}

fn strategy_from_tag(tag: &str) -> Result<IncludeStrategy, String> {
    match tag {
        "" | "direct" => Ok(IncludeStrategy::Direct),
        "recursive" => Ok(IncludeStrategy::Recursive),
        other => Err(format!("unknown include strategy `{other}`")),
    }
}

fn strategy_from_code(code: u8) -> Result<IncludeStrategy, String> {
    match code {
        0 => Ok(IncludeStrategy::Direct),
        1 => Ok(IncludeStrategy::Recursive),
        other => Err(format!("unknown include strategy code {other}")),
    }
}

impl TryFrom<EntryRepr> for WhitelistEntry {
    type Error = String;

    fn try_from(repr: EntryRepr) -> Result<Self, Self::Error> {
        match repr {
            EntryRepr::Tag(tag) => Ok(Self {
                strategy: strategy_from_tag(&tag)?,
                ..Self::default()
            }),
            EntryRepr::Code(code) => Ok(Self {
                strategy: strategy_from_code(code)?,
                ..Self::default()
            }),
            EntryRepr::Descriptor {
                strategy,
                translatable,
                model,
                config,
            } => {
                let strategy = match strategy {
                    None => IncludeStrategy::Direct,
                    Some(StrategyRepr::Tag(tag)) => strategy_from_tag(&tag)?,
                    Some(StrategyRepr::Code(code)) => strategy_from_code(code)?,
                };
                Ok(Self {
                    strategy,
                    translatable,
                    model,
                    config,
                })
            }
        }
    }
}

/// Field name → capability descriptor. Immutable while a request is parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Whitelist(IndexMap<String, WhitelistEntry>);

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, entry: WhitelistEntry) -> Self {
        self.insert(field, entry);
        self
    }

    pub fn direct(self, field: impl Into<String>) -> Self {
        self.with(field, WhitelistEntry::direct())
    }

    pub fn recursive(self, field: impl Into<String>) -> Self {
        self.with(field, WhitelistEntry::recursive())
    }

    pub fn insert(&mut self, field: impl Into<String>, entry: WhitelistEntry) {
        self.0.insert(field.into(), entry);
    }

    pub fn get(&self, field: &str) -> Option<&WhitelistEntry> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn strategy(&self, field: &str) -> Option<IncludeStrategy> {
        self.get(field).map(|entry| entry.strategy)
    }

    pub fn is_recursive(&self, field: &str) -> bool {
        self.strategy(field) == Some(IncludeStrategy::Recursive)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, WhitelistEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields whose entry is flagged `translatable`.
    pub fn translatable_fields(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, entry)| entry.translatable)
            .map(|(field, _)| field.as_str())
            .collect()
    }

    /// Merge a resource's own whitelist with the whitelists it builds on.
    ///
    /// Merged left to right: `own` first, then each base in order. The first
    /// declaration of a field wins.
    pub fn compose(own: &Whitelist, bases: &[&Whitelist]) -> Whitelist {
        let mut merged = own.clone();
        for base in bases {
            for (field, entry) in base.iter() {
                if !merged.contains(field) {
                    merged.insert(field.clone(), entry.clone());
                }
            }
        }
        merged
    }
}

impl FromIterator<(String, WhitelistEntry)> for Whitelist {
    fn from_iter<I: IntoIterator<Item = (String, WhitelistEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
