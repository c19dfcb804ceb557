//! Mongo-style document query grammar.
//!
//! ```text
//! {"age": {"$gte": 18}, "$or": [{"country": "US"}, {"name": {"$regex": "^ada", "$options": "i"}}]}
//! ```

pub mod ast;
mod compiler;
mod frontend;
mod parser;
mod serializer;

pub use compiler::MongoCompiler;
pub use frontend::MongoFrontend;
pub use parser::MongoParser;
pub use serializer::MongoSerializer;
