//! Kestrel Resolver
//!
//! Every module reads its configuration through this crate. Values are
//! resolved late, against the variables of the running workflow, so the same
//! node config can be re-executed inside a loop and observe fresh values on
//! each iteration.
//!
//! # Placeholders
//! A string may reference variables as `{name}`:
//! ```text
//! "Hello {user.name}, you have {inbox[0]} new messages"
//! ```
//! - a string that is exactly one placeholder resolves to the raw value,
//!   preserving its type
//! - otherwise each placeholder is replaced by the value's string form
//! - placeholders naming missing variables are left as-is
//!
//! # Expressions
//! Conditions and computed variables are evaluated with minijinja
//! expressions after placeholder substitution, e.g. `{count} > 3` or
//! `items | length > 0`.

mod coerce;
mod error;
mod expression;
mod path;
mod resolve;
mod vars;

pub use coerce::{parse_bool, parse_float, parse_int, to_bool, to_float, to_int};
pub use error::ResolveError;
pub use expression::{evaluate_condition, evaluate_expression};
pub use path::lookup;
pub use resolve::{render, resolve, resolve_config, resolve_str, to_display};
pub use vars::Variables;
