//! Request language front end.
//!
//! Filters, includes and order are each one rich parameter:
//! `field:modifier(arg|arg):modifier,field2`. This module turns those strings
//! into [`Directive`]s and resolves include paths against a [`Whitelist`].

pub mod include;
pub mod modifiers;
pub mod parser;
pub mod whitelist;

pub use include::{INCLUDE_MODIFIER, implicit_ancestors, recursion_point, resolve_includes};
pub use modifiers::{parse_arguments, parse_modifiers};
pub use parser::{Directive, Modifiers, parse_rich_param};
pub use whitelist::{IncludeStrategy, Whitelist, WhitelistEntry};
