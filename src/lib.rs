//! Distributed message-oriented middleware core: topic partitioning,
//! master election over a shared coordination store, cluster membership,
//! and round-robin request dispatch.
//!
//! One compiled binary plays both roles in the cluster (`Role::Worker` /
//! `Role::Master`), selected at runtime by the election engine rather than
//! built as two separate programs.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod election;
pub mod error;
pub mod health;
pub mod membership;
pub mod net;
pub mod rpc;
pub mod scs;
pub mod state_file;
pub mod topic;
pub mod worker;
