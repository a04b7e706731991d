//! Tripwire: BLAKE3 hashing, provenance log, drift of emitted templates.

pub mod drift;
pub mod eventlog;
pub mod hasher;
