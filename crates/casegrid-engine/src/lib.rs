//! Case generation pipeline and bounded concurrent validation pool.
//!
//! This crate implements the two halves of the casegrid core: a streaming,
//! constraint-pruning generator that turns a resolved project into a channel
//! of complete cases, and a worker pool that drives a [`Validator`] over that
//! channel with bounded parallelism, optional failure-based pruning, and a
//! single serializing result collector.

pub mod events;
pub mod generator;
pub mod pool;
pub mod validator;

pub use events::{EventEmitter, RunEvent};
pub use generator::{generate, generate_all};
pub use pool::{run, RunOptions};
pub use validator::{HelmValidator, Validator, WorkArea};
