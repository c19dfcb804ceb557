//! English-like rule grammar.
//!
//! ```text
//! age is at least 18 and country is one of "US", "CA"
//! email ends with "@example.com" ignoring case or not (plan equals "free")
//! ```

pub mod ast;
mod compiler;
mod frontend;
mod lexer;
mod parser;
mod serializer;

pub use compiler::NaturalCompiler;
pub use frontend::NaturalFrontend;
pub use parser::NaturalParser;
pub use serializer::NaturalSerializer;
