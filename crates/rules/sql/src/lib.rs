//! SQL `WHERE`-clause rule grammar.
//!
//! ```text
//! age >= 18 AND country IN ('US', 'CA') AND email NOT LIKE '%@test.%'
//! ```

pub mod ast;
mod compiler;
mod frontend;
mod parser;
mod serializer;

pub use compiler::SqlCompiler;
pub use frontend::SqlFrontend;
pub use parser::SqlParser;
pub use serializer::SqlSerializer;
