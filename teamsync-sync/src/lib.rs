//! # teamsync-sync
//!
//! Reconciliation of remote team memberships against desired state.
//!
//! Call [`pipeline::run`] to reconcile every configured organization, or
//! [`reconciler::reconcile`] for a single one. [`pipeline::preview`] computes
//! the plan without touching the remote platform.

pub mod error;
pub mod mode;
pub mod mutator;
pub mod pipeline;
pub mod plan;
pub mod reconciler;
pub mod state_cache;

pub use error::SyncError;
pub use mode::{decide_mode, SyncMode};
pub use mutator::{Mutation, RemoteMutator};
pub use pipeline::{preview, run, OrgRunResult, OrgScope, RunOptions};
pub use plan::ReconciliationPlan;
pub use reconciler::{
    reconcile, MutationOutcome, OutcomeStatus, PreparedRun, ReconcileContext, ReconcileReport,
    Sources, UserFailure,
};
pub use state_cache::{StateCache, SyncCacheEntry};
