//! Project manifest model, constraint rules, validation, and resolution.
//!
//! A casegrid project manifest declares the chart under test, the overlay
//! parts, the variables with their choices, and the requirement/restriction
//! rules. This crate parses the manifest, checks it for structural problems,
//! and resolves it into a [`ResolvedProject`] ready for case generation.

pub mod manifest;
pub mod resolved;
pub mod rule;
pub mod validate;

pub use manifest::{Project, API_VERSION, PROJECT_KIND};
pub use resolved::ResolvedProject;
pub use rule::{Requirement, Restriction};
pub use validate::{validate, validate_or_raise, CheckRule, Diagnostic, Severity};
