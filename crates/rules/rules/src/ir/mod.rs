pub mod operand;
pub mod operator;
pub mod rule;
