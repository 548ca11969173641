//! Backend contracts: what the engine needs to know about a CFG and about
//! the instructions inside it.
//!
//! The propagation engine itself is target-agnostic. Everything specific to
//! an IR lives behind these two traits: [`CfgBackend`] describes the shape
//! of the graph (blocks, predecessors, parameters), [`CodeBackend`]
//! describes the meaning of instructions (which variables they read and
//! define, what they evaluate to over the lattice, how to rewrite them once
//! the analysis is done). A backend is typically a stateless unit struct,
//! but it may carry target context; the engine only ever takes `&self`.

use crate::lattice::Lattice;
use smallvec::SmallVec;
use std::fmt::Debug;
use std::hash::Hash;

/// Shape of the control-flow graph being optimized.
///
/// `Label` and `Var` are opaque handles; the engine only compares, hashes
/// and clones them. `Instr` must be cheap to clone: the def-use index holds
/// cloned instruction handles for the duration of one pass (the code they
/// came from is not mutated until the analysis has converged, so the clones
/// never go stale).
pub trait CfgBackend {
    type Cfg;
    type Label: Copy + Eq + Ord + Hash + Debug;
    type Var: Clone + Eq + Hash + Debug;
    type Instr: Clone + Debug;

    /// The entry block.
    fn start_label(&self, cfg: &Self::Cfg) -> Self::Label;

    /// All block labels, in a deterministic order.
    fn labels(&self, cfg: &Self::Cfg) -> Vec<Self::Label>;

    /// Function parameters. These are unknown at analysis time (the caller
    /// can pass anything), so the engine pins them to `Bottom` up front.
    fn params(&self, cfg: &Self::Cfg) -> Vec<Self::Var>;

    /// Predecessor blocks of `label`.
    fn pred(&self, cfg: &Self::Cfg, label: Self::Label) -> Vec<Self::Label>;

    /// Code of one block, or `None` if the label has no block behind it.
    fn bb(&self, cfg: &Self::Cfg, label: Self::Label) -> Option<Vec<Self::Instr>>;

    /// Replace the code of one block.
    fn bb_add(&self, cfg: &mut Self::Cfg, label: Self::Label, code: Vec<Self::Instr>);

    /// Drop blocks that are no longer reachable from the entry.
    fn remove_unreachable_code(&self, cfg: &mut Self::Cfg);
}

/// Instruction semantics.
pub trait CodeBackend: CfgBackend {
    /// The backend's immediate representation (integer, atom, ...),
    /// carried inside [`Lattice::Const`].
    type Const: Clone + PartialEq + Debug;

    fn is_phi(&self, instr: &Self::Instr) -> bool;

    /// `(predecessor, variable)` pairs of a phi instruction.
    fn phi_arglist(&self, instr: &Self::Instr) -> Vec<(Self::Label, Self::Var)>;

    fn phi_dst(&self, instr: &Self::Instr) -> Self::Var;

    /// Variables read by an instruction. For a phi this is its argument
    /// variables; the def-use index is built from these.
    fn uses(&self, instr: &Self::Instr) -> Vec<Self::Var>;

    /// Symbolically execute one non-phi instruction under the current
    /// lattice (available through `lookup`).
    ///
    /// The returned targets are the successors statically possible right
    /// now: an unconditional branch names its target, a conditional branch
    /// whose condition is `Const` names the taken side only, `Bottom` names
    /// both sides, and `Top` names none at all (the condition may still
    /// become constant, so the engine holds the edges back until it does).
    fn visit<F>(&self, instr: &Self::Instr, lookup: F) -> Transfer<Self>
    where
        F: FnMut(&Self::Var) -> Lattice<Self::Const>;

    /// Rewrite one instruction under the final lattice: materialize
    /// constants, fold decided conditionals into unconditional branches.
    /// One instruction may become zero or more.
    fn rewrite<F>(&self, instr: &Self::Instr, lookup: F) -> Vec<Self::Instr>
    where
        F: FnMut(&Self::Var) -> Lattice<Self::Const>;
}

/// Result of symbolically executing one instruction: the control-flow
/// successors currently possible, and the lattice updates to apply.
pub struct Transfer<B: CodeBackend + ?Sized> {
    pub targets: SmallVec<[B::Label; 2]>,
    pub updates: Vec<Update<B>>,
}

/// One lattice update. Most instructions define a single variable, but some
/// define several at once (multi-return, condition-code bundles), so the
/// destination is a list; the same value is folded over all of them.
pub struct Update<B: CodeBackend + ?Sized> {
    pub dsts: SmallVec<[B::Var; 2]>,
    pub value: Lattice<B::Const>,
}

impl<B: CodeBackend + ?Sized> Transfer<B> {
    /// No successors, no updates (returns, stores, dead ends).
    pub fn empty() -> Self {
        Transfer {
            targets: SmallVec::new(),
            updates: Vec::new(),
        }
    }

    /// A single unconditional successor.
    pub fn jump(target: B::Label) -> Self {
        let mut t = Self::empty();
        t.targets.push(target);
        t
    }

    /// A single-destination definition.
    pub fn def(dst: B::Var, value: Lattice<B::Const>) -> Self {
        let mut t = Self::empty();
        t.updates.push(Update::single(dst, value));
        t
    }
}

impl<B: CodeBackend + ?Sized> Update<B> {
    pub fn single(dst: B::Var, value: Lattice<B::Const>) -> Self {
        let mut dsts = SmallVec::new();
        dsts.push(dst);
        Update { dsts, value }
    }
}
