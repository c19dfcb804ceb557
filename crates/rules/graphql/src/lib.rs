//! GraphQL-filter document rule grammar.
//!
//! ```text
//! {"age": {"gte": 18}, "OR": [{"country": "US"}, {"country": {"in": ["CA", "MX"]}}]}
//! ```

pub mod ast;
mod compiler;
mod frontend;
mod parser;
mod serializer;

pub use compiler::GraphqlCompiler;
pub use frontend::GraphqlFrontend;
pub use parser::GraphqlParser;
pub use serializer::GraphqlSerializer;
