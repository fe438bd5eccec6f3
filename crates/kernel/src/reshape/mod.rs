//! Row reshaping.
//!
//! Everything that happens to rows after the statement ran: dotted-path
//! access on JSON values, casts, the fix schedule built while resolving a
//! request, named value filters, and the post-processor applying it all.

pub mod cast;
pub mod fixes;
pub mod meta;
pub mod path;
pub mod postprocess;
pub mod reorganizer;
pub mod value_filters;

pub use cast::CastKind;
pub use fixes::{FixDescriptor, FixSchedule, FixSet, NestSpec, ScheduledFix};
pub use meta::Meta;
pub use postprocess::{MetaMode, PostProcessor, flatten_row, format_filter_template};
pub use reorganizer::{Reorganizer, Task};
pub use value_filters::{ValueFilterFn, ValueFilterRegistry};
