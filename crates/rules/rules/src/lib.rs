pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod ir;
pub mod text;

pub use config::ParseLimits;
pub use engine::{Context, Fact, FactObject, RuleSet, Value};
pub use error::RuleError;
pub use frontend::{
    Compiler, Parser, RuleFrontend, Serializer, ValidationError, ValidationResult, Validator,
};
pub use ir::operand::{FieldResolver, Operand, Variable, VariableProperty};
pub use ir::operator::{Cardinality, Operator, OperatorKind, Proposition};
pub use ir::rule::{Rule, RuleAction, RuleSource};
