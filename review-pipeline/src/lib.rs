//! Multi-stage AI code-review pipeline.
//!
//! One public entry runs the whole review for a pull request:
//!
//! 1. **Stage 0 — Planning**: one structured LLM call produces a prioritized
//!    review plan; a completeness check guarantees every changed file lands
//!    in a group or the skip list.
//! 2. **Stage 1 — Per-batch review**: dependency-aware batches (≤ 7 files)
//!    are reviewed in bounded parallel waves, each with its own retrieval
//!    context.
//! 3. **Stage 1.5 — Reconciliation**: prior issues are matched against new
//!    findings and carried forward or marked resolved.
//! 4. **Stage 2 — Cross-file synthesis**: a single call over slimmed Stage 1
//!    findings, architecture context and migration paths.
//! 5. **Stage 3 — Aggregation**: the executive markdown report.
//!
//! The pipeline uses `tracing` for step logging and avoids `async-trait`
//! and heap trait objects; dependencies are plain `Arc`-shared services.

pub mod batch;
pub mod context;
pub mod diff;
pub mod errors;
pub mod events;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod reconcile;
pub mod schema;
pub mod stages;

pub use errors::{ParseError, ReviewError};
pub use events::{EventSink, ReviewEvent};
pub use model::{
    AnalysisMode, Category, CrossFileResult, Issue, Priority, Recommendation, ReviewOutcome,
    ReviewPlan, ReviewRequest, Severity,
};
pub use stages::{ReviewDeps, orchestrate_review};
