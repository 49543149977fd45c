//! Stratus Pipeline - resumable step pipelines
//!
//! Adapters express every lifecycle operation as a [`Pipeline`] of named
//! [`Step`]s. The [`PipelineRunner`] executes them strictly in order,
//! persisting the instance and the completed step name after each one, so a
//! run interrupted at any point resumes at the step after the last one that
//! was persisted.
//!
//! ## Key Principle
//!
//! Steps are idempotent in their own right ("ensure login", not "create
//! login"). A step may be re-run after its remote effect was applied but
//! before its result was persisted.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod context;
pub mod error;
pub mod pipeline;
pub mod runner;
pub mod step;

pub use context::StepContext;
pub use error::{PipelineError, Result, StepError};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use runner::{PipelineRunner, RunOutcome};
pub use step::{FnStep, Step, StepOutput};
