//! LDAP search-filter rule grammar.
//!
//! ```text
//! (&(age>=18)(|(country=US)(country=CA))(!(mail=*@test.*)))
//! ```

pub mod ast;
mod compiler;
mod frontend;
mod parser;
mod serializer;

pub use compiler::LdapCompiler;
pub use frontend::LdapFrontend;
pub use parser::LdapParser;
pub use serializer::LdapSerializer;
