//! # crossimpact
//!
//! Cross-project impact analysis for Java microservice changes.
//!
//! crossimpact takes a diff between two commits of a main repository,
//! materializes a set of related repositories at their configured
//! branches, builds lightweight per-repo symbol indices (classes, Spring
//! routes, Dubbo/Feign injection sites) and traces which code in the
//! related repositories references the changed symbols. The evidence is
//! assembled into a prompt for an external LLM whose structured reply is
//! persisted as one risk report per changed file.
//!
//! ## Module Overview
//!
//! - [`indexer`] - Java line lexer and per-repo symbol indexing
//! - [`trace`] - single-repo usage search, multi-project impact tracing
//! - [`git`] - subprocess adaptor, diff splitting, repo materialization
//! - [`cache`] - symbol-index cache keyed by (root, HEAD commit)
//! - [`analysis`] - orchestration, prompt assembly, reply handling
//! - [`llm`] - LLM client seam (external command, scripted fake)
//! - [`store`] - task/report/relation persistence seam
//! - [`cli`] - command-line interface
//! - [`core`] - shared types, configuration, constants, utilities
//! - [`error`] - domain error types

/// Analysis pipeline: orchestration, prompt assembly, reply handling
pub mod analysis;
/// Symbol-index caching keyed to commit identity
pub mod cache;
/// Command-line interface and argument parsing
pub mod cli;
/// Core types, configuration and shared utilities
pub mod core;
/// Error types and handling utilities
pub mod error;
/// Git orchestration: subprocess adaptor, diff, materializer
pub mod git;
/// Lightweight Java static analysis
pub mod indexer;
/// LLM boundary: client trait and implementations
pub mod llm;
/// Persistence seam: task store implementations
pub mod store;
/// Reference tracing across repositories
pub mod trace;

pub use crate::analysis::{MainSource, Orchestrator, TaskRequest};
pub use crate::core::types::{
    AnalysisReport, AnalysisTask, CrossProjectImpacts, Impact, ImpactKind, ProjectRelation,
    RelatedProject, SymbolIndex, TaskStatus, Usage,
};
pub use crate::core::AnalysisConfig;
pub use crate::error::{EngineError, EngineResult};
