//! # Buildplan
//!
//! Compile a declarative description of a community into an ordered plan of
//! idempotent steps, then execute that plan durably.
//!
//! ## Core Concepts
//!
//! - **Specification**: normalized intent (community type, games, moderation, size)
//! - **BuildPlan**: a named, ordered list of typed [`BuildStep`]s
//! - **Compiler**: turns a specification plus an optional template into a plan
//! - **Validator**: structural and permission checks run before execution
//! - **Executor**: walks a plan with per-step retry, persisting progress after
//!   every step so an interrupted run resumes where it stopped
//!
//! ## Example
//!
//! ```ignore
//! use buildplan::{Executor, NoopHandler, Specification, compile, validate_all};
//!
//! let spec = Specification { community_type: "gaming".into(), ..Default::default() };
//! let plan = compile(&spec, None, "build-gaming")?;
//! validate_all(&plan).into_result(&plan.name)?;
//!
//! let executor = Executor::new("/var/lib/conditor/runtime");
//! let state = executor.run_plan(&plan, &NoopHandler, true).await?;
//! println!("{:?}", state.summary(&plan));
//! ```
//!
//! ## Provider Traits
//!
//! - [`StepHandler`]: performs one step (live service, sandbox, dry run)
//! - [`ExecutionObserver`]: receives progress updates

pub mod compiler;
pub mod context;
pub mod error;
pub mod executor;
pub mod persistence;
pub mod spec;
pub mod state;
pub mod template;
pub mod types;
pub mod validator;

pub use compiler::compile;
pub use context::{ExecutionObserver, FnHandler, NoProgress, NoopHandler, StepHandler, handler_fn};
pub use error::{Error, Result};
pub use executor::Executor;
pub use persistence::{export_plan, from_json, import_plan, to_json};
pub use spec::Specification;
pub use state::{StateStore, sanitize_name};
pub use template::Template;
pub use types::{
    BuildPlan, BuildStep, ExecuteSummary, ExecutionState, RetryPolicy, StepRecord, StepStatus,
    StepType,
};
pub use validator::{ValidationReport, permission_sanity_check, validate, validate_all};
