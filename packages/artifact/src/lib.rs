//! Siteforge Artifact - Build-action model and artifact parser
//!
//! This crate turns free-text generation output into an ordered sequence
//! of build actions: the data model (`BuildAction`, `BuildStep`) and the
//! stateless `ArtifactParser`, plus the wire shapes crossing the boundary
//! from the generation backend.

pub mod action;
pub mod exchange;
pub mod parser;

pub use action::{ActionKind, BuildAction, BuildStep, StepStatus};
pub use exchange::{ChatTurn, TemplateResponse};
pub use parser::ArtifactParser;

/// Version information for the artifact crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
