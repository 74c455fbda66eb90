//! Constraint enforcement for growing 3-D vascular trees.
//!
//! Main components:
//! - [`intersection`]: capsule/capsule predicate and topology filter.
//! - [`direction_cycle`]: deterministic arbitrary-normal generator.
//! - [`triangle`] and [`mesh_crossing`]: segment/surface hits and their summary.
//! - [`collision`], [`mesh`], [`implicit`]: violation detectors.
//! - [`recorder`] and [`correction_buffer`]: turning violations into actions.
//! - [`enforcer`]: the detect / resolve / apply loop.
//! - [`tree`], [`spatial`], [`field`]: collaborator traits and reference implementations.
//! - [`config`], [`error`], [`types`]: shared configuration, errors and IDs.

pub mod action;
pub mod collision;
pub mod config;
pub mod correction_buffer;
pub mod direction_cycle;
pub mod enforcer;
pub mod error;
pub mod field;
pub mod implicit;
pub mod intersection;
pub mod linalg;
pub mod mesh;
pub mod mesh_crossing;
pub mod recorder;
pub mod relationship;
pub mod segment;
pub mod spatial;
pub mod tree;
pub mod triangle;
pub mod types;
pub mod violation;
