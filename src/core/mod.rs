pub mod conditional;
pub mod config;
pub mod evaluator;
pub mod expr;
pub mod format;
pub mod harlowe;
pub mod lexer;
pub mod literal;
pub mod scan;
pub mod simulator;
