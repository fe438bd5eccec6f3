//! Engine error types.

use std::fmt;

use thiserror::Error;

/// The three facets a request can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Filter,
    Include,
    Order,
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DirectiveKind::Filter => "filter",
            DirectiveKind::Include => "include",
            DirectiveKind::Order => "order",
        };
        f.write_str(name)
    }
}

/// Engine errors.
///
/// Parsing never fails; these are raised while resolving directives against
/// a whitelist, while building queries, or while post-processing rows.
#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "You have used invalid filter modifiers for filtering by {field}. Allowed modifiers are: {}",
        allowed.join(", ")
    )]
    InvalidModifierUsed { field: String, allowed: Vec<String> },

    #[error("{kind} field `{field}` is not whitelisted")]
    UnknownField { kind: DirectiveKind, field: String },

    #[error(
        "filter `{filter}` requires the `{directive}` directive, e.g. {filter}:{directive}({example})"
    )]
    MissingDirective {
        filter: String,
        directive: String,
        example: String,
    },

    #[error("malformed path `{0}`")]
    MalformedPath(String),

    #[error("no handler registered for `{0}`")]
    UnresolvableHandler(String),

    #[error("unknown cast kind `{0}`")]
    InvalidCastKind(String),

    #[error("invalid argument `{argument}` for {field}:{modifier}")]
    InvalidArgument {
        field: String,
        modifier: String,
        argument: String,
    },

    #[error("modifier `{0}` requires an authenticated user")]
    UserRequired(String),

    #[error("filter `{0}` searches all translations but no supported languages are set")]
    SupportedLanguagesMissing(String),

    #[error("unknown resource `{0}`")]
    UnknownResource(String),

    #[error("nested fetch depth {depth} exceeds the limit of {limit}")]
    RecursionTooDeep { depth: u8, limit: u8 },

    #[error("filter template `{template}` needs more than the {given} value(s) it was given")]
    TemplateArguments { template: String, given: usize },

    #[error("value filter `{name}` failed: {reason}")]
    ValueFilter { name: String, reason: String },

    #[error("row source error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Result type alias using the engine error.
pub type Result<T> = std::result::Result<T, Error>;
