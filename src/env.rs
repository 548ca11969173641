//! Mutable state of one propagation run.
//!
//! The environment owns the CFG for the duration of the pass and carries
//! everything the fixpoint mutates: the executable-edge set, the
//! handled-block set and the per-variable lattice. The def-use index is
//! built once up front and never changes afterwards. There is exactly one
//! environment per `propagate` call and it is threaded by `&mut` through
//! the engine; nothing is cloned.

use crate::backend::CodeBackend;
use crate::lattice::Lattice;
use fxhash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

pub(crate) struct Env<'a, B: CodeBackend> {
    pub(crate) backend: &'a B,
    pub(crate) cfg: B::Cfg,
    entry: B::Label,
    /// Control-flow edges proven reachable. Grows monotonically; the seed
    /// self-edge `(entry, entry)` makes the entry block reachable.
    executable: FxHashSet<(B::Label, B::Label)>,
    /// Blocks whose non-phi code has been visited through the flow
    /// worklist at least once. Grows monotonically.
    handled: FxHashSet<B::Label>,
    /// Per-variable lattice. A missing key reads as `Top`; parameters are
    /// seeded `Bottom` at construction.
    values: FxHashMap<B::Var, Lattice<B::Const>>,
    /// Def-use index: every `(block, instruction)` site reading a
    /// variable. Immutable after construction.
    ssa_edges: FxHashMap<B::Var, Vec<(B::Label, B::Instr)>>,
}

impl<'a, B: CodeBackend> Env<'a, B> {
    pub(crate) fn new(backend: &'a B, cfg: B::Cfg) -> Self {
        let entry = backend.start_label(&cfg);

        let mut values = FxHashMap::default();
        for param in backend.params(&cfg) {
            values.insert(param, Lattice::Bottom);
        }

        let mut ssa_edges: FxHashMap<B::Var, Vec<(B::Label, B::Instr)>> = FxHashMap::default();
        for label in backend.labels(&cfg) {
            let code = match backend.bb(&cfg, label) {
                Some(code) => code,
                None => {
                    log::warn!("no code for block {:?} while indexing uses", label);
                    continue;
                }
            };
            for instr in code {
                for var in backend.uses(&instr) {
                    ssa_edges.entry(var).or_default().push((label, instr.clone()));
                }
            }
        }

        Env {
            backend,
            cfg,
            entry,
            executable: FxHashSet::default(),
            handled: FxHashSet::default(),
            values,
            ssa_edges,
        }
    }

    pub(crate) fn entry(&self) -> B::Label {
        self.entry
    }

    pub(crate) fn into_cfg(self) -> B::Cfg {
        self.cfg
    }

    pub(crate) fn mark_executable(&mut self, edge: (B::Label, B::Label)) {
        self.executable.insert(edge);
    }

    pub(crate) fn is_executable(&self, edge: (B::Label, B::Label)) -> bool {
        self.executable.contains(&edge)
    }

    pub(crate) fn mark_handled(&mut self, block: B::Label) {
        self.handled.insert(block);
    }

    pub(crate) fn is_handled(&self, block: B::Label) -> bool {
        self.handled.contains(&block)
    }

    /// A block is reachable once any edge into it is executable. The entry
    /// block's incoming edge is the seed self-edge, which does not appear
    /// in the backend's predecessor lists.
    pub(crate) fn reachable(&self, block: B::Label) -> bool {
        if block == self.entry && self.is_executable((self.entry, self.entry)) {
            return true;
        }
        self.preds(block)
            .into_iter()
            .any(|p| self.is_executable((p, block)))
    }

    /// Current abstract value of a variable. A variable nothing has
    /// reached yet reads as `Top`, not `Bottom`.
    pub(crate) fn lookup(&self, var: &B::Var) -> Lattice<B::Const> {
        self.values.get(var).cloned().unwrap_or(Lattice::Top)
    }

    pub(crate) fn use_sites(&self, var: &B::Var) -> &[(B::Label, B::Instr)] {
        self.ssa_edges.get(var).map(|v| &v[..]).unwrap_or(&[])
    }

    /// Lower the value of each destination to `value`, pushing the use
    /// sites of every destination that actually changed onto `ssa_work`.
    pub(crate) fn update(
        &mut self,
        dsts: &[B::Var],
        value: Lattice<B::Const>,
        ssa_work: &mut VecDeque<(B::Label, B::Instr)>,
    ) {
        for dst in dsts {
            match self.values.get(dst) {
                Some(old) if *old == value => continue,
                Some(old) => {
                    debug_assert!(
                        value.le(old),
                        "non-monotone update of {:?}: {:?} -> {:?}",
                        dst,
                        old,
                        value
                    );
                }
                None => {}
            }
            log::trace!("{:?} lowered to {:?}", dst, value);
            self.values.insert(dst.clone(), value.clone());
            for site in self.use_sites(dst) {
                ssa_work.push_back(site.clone());
            }
        }
    }

    pub(crate) fn preds(&self, block: B::Label) -> Vec<B::Label> {
        self.backend.pred(&self.cfg, block)
    }

    /// Code of one block; a label without a block is tolerated as empty.
    pub(crate) fn extract_code(&self, block: B::Label) -> Vec<B::Instr> {
        match self.backend.bb(&self.cfg, block) {
            Some(code) => code,
            None => {
                log::warn!("no code for block {:?}; treating as empty", block);
                Vec::new()
            }
        }
    }

    /// Raw block fetch, distinguishing "no such block" from "empty block".
    pub(crate) fn code(&self, block: B::Label) -> Option<Vec<B::Instr>> {
        self.backend.bb(&self.cfg, block)
    }

    pub(crate) fn replace_code(&mut self, block: B::Label, code: Vec<B::Instr>) {
        let backend = self.backend;
        backend.bb_add(&mut self.cfg, block, code);
    }
}
