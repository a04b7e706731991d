//! Core declaration logic: types, parsing, graph, synthesis, planning, state.

pub mod graph;
pub mod parser;
pub mod planner;
pub mod policy;
pub mod stack;
pub mod state;
pub mod synth;
pub mod template;
pub mod types;
