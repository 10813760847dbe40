//! `grouper-core`: keeps GitHub committer teams in step with the ASF
//! directory.
//!
//! Desired membership comes from three sources: directory groups, the
//! ASF ↔ GitHub link store, and the MFA scan. Observed membership comes
//! from GitHub. [`reconcile::Reconciler`] diffs the two per project and
//! issues the minimal set of writes.

pub mod config;
pub mod directory;
pub mod error;
pub mod github;
pub mod io;
pub mod links;
pub mod mfa;
pub mod paginate;
pub mod project;
pub mod reconcile;
pub mod report;

pub use error::{ErrorClass, GrouperError, Result};
