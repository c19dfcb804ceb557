pub mod context;
pub(crate) mod eval;
pub mod executor;
mod ops_compare;
mod ops_date;
mod ops_math;
mod ops_string;
mod ops_type;
pub mod value;

pub use context::{Context, Fact, FactFn};
pub use executor::RuleSet;
pub use value::{Callable, Capability, FactObject, Value};
