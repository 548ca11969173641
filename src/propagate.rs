//! The propagation engine: symbolic execution to a fixpoint, then a
//! rewrite of the CFG under the final lattice.

// This is an implementation of the algorithm described in
//
//   Constant Propagation with Conditional Branches
//   Mark N. Wegman and F. Kenneth Zadeck
//   TOPLAS 13(2), 1991
//
// Constant propagation and unreachable-code detection run interleaved over
// one lattice: a constant condition removes outgoing edges from
// consideration, and removed edges let phi meets stay constant where a
// phase-ordered pipeline of the two analyses would give up.

use crate::backend::{CodeBackend, Transfer};
use crate::env::Env;
use crate::lattice::Lattice;
use anyhow::{bail, Result};
use std::collections::VecDeque;

/// Run sparse conditional constant propagation over `cfg` and return the
/// rewritten graph.
///
/// Two worklists drive the analysis: control-flow edges pending
/// exploration and def-use sites pending re-evaluation. Both are FIFO
/// queues, and flow work drains first; the fixpoint is the same under any
/// draining order, only the number of revisits differs. Termination is
/// bounded by lattice height times edge count: a variable's value can drop
/// at most twice, an edge becomes executable at most once.
///
/// Fails only on backend inconsistency (a block claimed to exist whose
/// code list is empty); a label with no block behind it at all is logged
/// and tolerated as empty.
pub fn propagate<B: CodeBackend>(backend: &B, cfg: B::Cfg) -> Result<B::Cfg> {
    let mut env = Env::new(backend, cfg);
    scc(&mut env)?;
    rewrite_cfg(&mut env);
    let mut cfg = env.into_cfg();
    backend.remove_unreachable_code(&mut cfg);
    Ok(cfg)
}

/// The fixpoint loop, seeded with the entry's synthetic self-edge.
fn scc<B: CodeBackend>(env: &mut Env<B>) -> Result<()> {
    let mut flow: VecDeque<(B::Label, B::Label)> = VecDeque::new();
    let mut ssa: VecDeque<(B::Label, B::Instr)> = VecDeque::new();
    flow.push_back((env.entry(), env.entry()));

    loop {
        if let Some((src, dst)) = flow.pop_front() {
            flow_edge(env, src, dst, &mut flow, &mut ssa)?;
        } else if let Some((block, instr)) = ssa.pop_front() {
            ssa_use(env, block, instr, &mut flow, &mut ssa);
        } else {
            break;
        }
    }
    Ok(())
}

/// Process one control-flow edge.
///
/// An edge is explored at most once. The destination's phis are
/// re-evaluated on every newly executable in-edge (their meet now sees one
/// more predecessor); the non-phi code runs only the first time any edge
/// reaches the block.
fn flow_edge<B: CodeBackend>(
    env: &mut Env<B>,
    src: B::Label,
    dst: B::Label,
    flow: &mut VecDeque<(B::Label, B::Label)>,
    ssa: &mut VecDeque<(B::Label, B::Instr)>,
) -> Result<()> {
    if env.is_executable((src, dst)) {
        return Ok(());
    }
    env.mark_executable((src, dst));
    log::trace!("edge {:?} -> {:?} now executable", src, dst);

    let code = match env.code(dst) {
        Some(code) => {
            if code.is_empty() {
                bail!("scc: phi scan on empty block {:?}", dst);
            }
            code
        }
        None => {
            log::warn!("scc: no code for block {:?}; treating as empty", dst);
            Vec::new()
        }
    };

    for instr in &code {
        if env.backend.is_phi(instr) {
            eval_phi(env, dst, instr, ssa);
        }
    }

    if env.is_handled(dst) {
        return Ok(());
    }
    for instr in &code {
        if !env.backend.is_phi(instr) {
            visit_instr(env, dst, instr, flow, ssa);
        }
    }
    env.mark_handled(dst);
    Ok(())
}

/// Process one def-use site woken by a lattice change.
fn ssa_use<B: CodeBackend>(
    env: &mut Env<B>,
    block: B::Label,
    instr: B::Instr,
    flow: &mut VecDeque<(B::Label, B::Label)>,
    ssa: &mut VecDeque<(B::Label, B::Instr)>,
) {
    if !env.reachable(block) {
        return;
    }
    if env.backend.is_phi(&instr) {
        eval_phi(env, block, &instr, ssa);
    } else {
        visit_instr(env, block, &instr, flow, ssa);
    }
}

/// Meet a phi's operands, ignoring predecessors not yet proven
/// executable: an unexecuted path contributes no evidence, so its operand
/// must not be allowed to pull the meet down.
fn eval_phi<B: CodeBackend>(
    env: &mut Env<B>,
    block: B::Label,
    instr: &B::Instr,
    ssa: &mut VecDeque<(B::Label, B::Instr)>,
) {
    let backend = env.backend;
    let dst = backend.phi_dst(instr);
    let mut acc = Lattice::Top;
    for (pred, var) in backend.phi_arglist(instr) {
        if !env.is_executable((pred, block)) {
            continue;
        }
        acc = acc.meet(&env.lookup(&var));
        if matches!(acc, Lattice::Bottom) {
            break;
        }
    }
    log::trace!("phi {:?} in {:?} meets to {:?}", dst, block, acc);
    env.update(std::slice::from_ref(&dst), acc, ssa);
}

/// Symbolically execute one non-phi instruction and fold its effects into
/// the environment.
fn visit_instr<B: CodeBackend>(
    env: &mut Env<B>,
    block: B::Label,
    instr: &B::Instr,
    flow: &mut VecDeque<(B::Label, B::Label)>,
    ssa: &mut VecDeque<(B::Label, B::Instr)>,
) {
    let Transfer { targets, updates } = {
        let backend = env.backend;
        backend.visit(instr, |v| env.lookup(v))
    };
    for target in targets {
        flow.push_back((block, target));
    }
    for update in updates {
        env.update(&update.dsts, update.value, ssa);
    }
}

/// Rewrite every reachable block under the final lattice. Unreachable
/// blocks are skipped here; the backend prunes them afterwards.
fn rewrite_cfg<B: CodeBackend>(env: &mut Env<B>) {
    for label in env.backend.labels(&env.cfg) {
        if !env.reachable(label) {
            log::trace!("block {:?} unreachable; leaving it for removal", label);
            continue;
        }
        let code = env.extract_code(label);
        let mut new_code = Vec::with_capacity(code.len());
        for instr in &code {
            let backend = env.backend;
            new_code.extend(backend.rewrite(instr, |v| env.lookup(v)));
        }
        let new_code = put_phis_first(env.backend, new_code);
        env.replace_code(label, new_code);
    }
}

/// Rewrites may emit phi instructions anywhere in a block; move them back
/// to the head, preserving relative order, before storing the block.
fn put_phis_first<B: CodeBackend>(backend: &B, code: Vec<B::Instr>) -> Vec<B::Instr> {
    let misplaced = code
        .iter()
        .skip_while(|i| backend.is_phi(*i))
        .any(|i| backend.is_phi(i));
    if !misplaced {
        return code;
    }
    let (phis, rest): (Vec<_>, Vec<_>) = code.into_iter().partition(|i| backend.is_phi(i));
    phis.into_iter().chain(rest).collect()
}
