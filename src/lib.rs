//! Tempmon: typed resource graph for an IoT temperature pipeline.
//!
//! Declares an IoT topic rule, a Timestream database and table, and the IAM
//! role tying them together, then synthesizes a deterministic template for an
//! external provisioning engine. Least-privilege grants and explicit
//! depends-on ordering are checked at declaration time.

pub mod cli;
pub mod core;
pub mod tripwire;
