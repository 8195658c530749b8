//! Harlowe path simulator: an interpreter for Harlowe story macros and a
//! replay engine that walks a story's link graph.
//!
//! Evaluates Harlowe expressions and conditional chains against a variable
//! state, then replays paths of passages while recording per-step variable
//! changes, health warnings and the links available at each step.

pub mod core;
pub mod schema;

pub use crate::core::format::{FormatRegistry, StoryFormat};
pub use crate::core::simulator::PathSimulator;
pub use crate::schema::story::{Passage, Story};
pub use crate::schema::value::Value;
