//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - Reclamation: deletes expired documents at a fixed period

mod reclaim;

pub use reclaim::{spawn_reclaim_task, ReclaimTask};
