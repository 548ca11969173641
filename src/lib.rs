//! Sparse conditional constant propagation (SCCP) over SSA-form CFGs.
//!
//! The engine is target-agnostic: the shape of the control-flow graph and
//! the semantics of individual instructions are supplied by a pair of
//! backend traits, and the pass itself is a single library routine,
//! [`propagate`].

#![allow(dead_code)]

pub mod backend;
pub mod entity;
pub mod ir;
pub mod lattice;

mod env;
mod propagate;

pub use backend::{CfgBackend, CodeBackend, Transfer, Update};
pub use ir::IrBackend;
pub use lattice::Lattice;
pub use propagate::propagate;
