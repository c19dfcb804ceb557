//! Cross-grammar conformance suite.
//!
//! The tests under `tests/` check that every grammar compiles equivalent
//! rules to the same IR, renders them back in its own syntax, and shares
//! the fact store and field-resolution behavior of the core engine.
