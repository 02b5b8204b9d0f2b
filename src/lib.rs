//! Batch submission of scripted outbound voice calls, grouped by recipient language.
//!
//! The flow is linear: raw roster rows are normalized ([`normalize`]), partitioned
//! into language groups ([`grouping`]), turned into one batch request per group and
//! submitted to the remote calling API ([`submitter`], [`calling`]).
//! [`simulation`] builds a single simulated conversation for prompt testing.

pub mod calling;
pub mod config;
pub mod grouping;
pub mod model;
pub mod normalize;
pub mod prompts;
pub mod roster;
pub mod simulation;
pub mod submitter;
