//! A small SSA IR bundled as the reference backend.
//!
//! Blocks are flat instruction lists; the last instruction of a block is
//! its terminator (`Jump`, `Branch` or `Return`). Values are `i64`
//! immediates. This is the substrate the test suite drives the engine
//! over, and a template for wiring a real IR to the backend traits.

use crate::backend::{CfgBackend, CodeBackend, Transfer};
use crate::declare_entity;
use crate::lattice::Lattice;
use fxhash::{FxHashMap, FxHashSet};

declare_entity!(Block, "block");
declare_entity!(Var, "v");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binop {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    Const {
        dst: Var,
        value: i64,
    },
    Binop {
        op: Binop,
        dst: Var,
        lhs: Var,
        rhs: Var,
    },
    Phi {
        dst: Var,
        args: Vec<(Block, Var)>,
    },
    Jump {
        target: Block,
    },
    /// Two-way conditional: any nonzero condition takes `if_true`.
    Branch {
        cond: Var,
        if_true: Block,
        if_false: Block,
    },
    Return {
        value: Option<Var>,
    },
}

impl Instr {
    pub fn visit_successors<F: FnMut(Block)>(&self, mut f: F) {
        match self {
            &Instr::Jump { target } => f(target),
            &Instr::Branch {
                if_true, if_false, ..
            } => {
                f(if_true);
                f(if_false);
            }
            _ => {}
        }
    }
}

/// Evaluate a binop over two known constants. `None` means the operation
/// cannot be folded (division by zero, overflowing `i64::MIN / -1`);
/// comparisons yield 0 or 1.
fn const_eval(op: Binop, a: i64, b: i64) -> Option<i64> {
    match op {
        Binop::Add => Some(a.wrapping_add(b)),
        Binop::Sub => Some(a.wrapping_sub(b)),
        Binop::Mul => Some(a.wrapping_mul(b)),
        Binop::Div => a.checked_div(b),
        Binop::And => Some(a & b),
        Binop::Or => Some(a | b),
        Binop::Xor => Some(a ^ b),
        Binop::Shl => Some(a.wrapping_shl(b as u32)),
        Binop::Shr => Some(a.wrapping_shr(b as u32)),
        Binop::Eq => Some((a == b) as i64),
        Binop::Ne => Some((a != b) as i64),
        Binop::Lt => Some((a < b) as i64),
        Binop::Le => Some((a <= b) as i64),
        Binop::Gt => Some((a > b) as i64),
        Binop::Ge => Some((a >= b) as i64),
    }
}

/// One function in SSA form. Blocks live in a map keyed by label, so a
/// removed block really is gone (`code` returns `None` for it).
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionBody {
    pub entry: Block,
    params: Vec<Var>,
    blocks: FxHashMap<Block, Vec<Instr>>,
    next_block: u32,
    next_var: u32,
}

impl FunctionBody {
    pub fn new() -> Self {
        let mut f = FunctionBody {
            entry: Block::from(0u32),
            params: Vec::new(),
            blocks: Default::default(),
            next_block: 0,
            next_var: 0,
        };
        f.entry = f.add_block();
        f
    }

    pub fn add_block(&mut self) -> Block {
        let id = Block::from(self.next_block);
        self.next_block += 1;
        self.blocks.insert(id, Vec::new());
        log::trace!("add_block: block {}", id);
        id
    }

    pub fn fresh_var(&mut self) -> Var {
        let id = Var::from(self.next_var);
        self.next_var += 1;
        id
    }

    /// Allocate a variable bound to an incoming argument. Its value is
    /// unknown to the analysis.
    pub fn add_param(&mut self) -> Var {
        let v = self.fresh_var();
        self.params.push(v);
        v
    }

    pub fn params(&self) -> &[Var] {
        &self.params
    }

    pub fn set_code(&mut self, block: Block, code: Vec<Instr>) {
        self.blocks.insert(block, code);
    }

    pub fn code(&self, block: Block) -> Option<&[Instr]> {
        self.blocks.get(&block).map(|c| &c[..])
    }

    /// All labels, sorted for deterministic traversal.
    pub fn labels(&self) -> Vec<Block> {
        let mut labels: Vec<Block> = self.blocks.keys().copied().collect();
        labels.sort();
        labels
    }

    pub fn preds(&self, block: Block) -> Vec<Block> {
        let mut preds = Vec::new();
        for label in self.labels() {
            let mut hit = false;
            for instr in &self.blocks[&label] {
                instr.visit_successors(|s| {
                    if s == block {
                        hit = true;
                    }
                });
            }
            if hit {
                preds.push(label);
            }
        }
        preds
    }

    /// Drop every block no longer reachable from the entry along the
    /// (post-rewrite) static edges.
    pub fn remove_unreachable(&mut self) {
        let mut reachable = FxHashSet::default();
        let mut stack = vec![self.entry];
        reachable.insert(self.entry);
        while let Some(block) = stack.pop() {
            if let Some(code) = self.blocks.get(&block) {
                for instr in code {
                    instr.visit_successors(|succ| {
                        if reachable.insert(succ) {
                            stack.push(succ);
                        }
                    });
                }
            }
        }
        self.blocks.retain(|block, _| {
            let keep = reachable.contains(block);
            if !keep {
                log::trace!("remove_unreachable: dropping block {}", block);
            }
            keep
        });
    }
}

impl Default for FunctionBody {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend wiring [`FunctionBody`] to the engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct IrBackend;

impl CfgBackend for IrBackend {
    type Cfg = FunctionBody;
    type Label = Block;
    type Var = Var;
    type Instr = Instr;

    fn start_label(&self, cfg: &FunctionBody) -> Block {
        cfg.entry
    }

    fn labels(&self, cfg: &FunctionBody) -> Vec<Block> {
        cfg.labels()
    }

    fn params(&self, cfg: &FunctionBody) -> Vec<Var> {
        cfg.params.clone()
    }

    fn pred(&self, cfg: &FunctionBody, label: Block) -> Vec<Block> {
        cfg.preds(label)
    }

    fn bb(&self, cfg: &FunctionBody, label: Block) -> Option<Vec<Instr>> {
        cfg.code(label).map(|c| c.to_vec())
    }

    fn bb_add(&self, cfg: &mut FunctionBody, label: Block, code: Vec<Instr>) {
        cfg.set_code(label, code);
    }

    fn remove_unreachable_code(&self, cfg: &mut FunctionBody) {
        cfg.remove_unreachable();
    }
}

impl CodeBackend for IrBackend {
    type Const = i64;

    fn is_phi(&self, instr: &Instr) -> bool {
        matches!(instr, Instr::Phi { .. })
    }

    fn phi_arglist(&self, instr: &Instr) -> Vec<(Block, Var)> {
        match instr {
            Instr::Phi { args, .. } => args.clone(),
            _ => panic!("phi_arglist on non-phi {:?}", instr),
        }
    }

    fn phi_dst(&self, instr: &Instr) -> Var {
        match instr {
            Instr::Phi { dst, .. } => *dst,
            _ => panic!("phi_dst on non-phi {:?}", instr),
        }
    }

    fn uses(&self, instr: &Instr) -> Vec<Var> {
        match instr {
            Instr::Const { .. } | Instr::Jump { .. } => Vec::new(),
            Instr::Binop { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instr::Phi { args, .. } => args.iter().map(|&(_, v)| v).collect(),
            Instr::Branch { cond, .. } => vec![*cond],
            Instr::Return { value } => value.iter().copied().collect(),
        }
    }

    fn visit<F>(&self, instr: &Instr, mut lookup: F) -> Transfer<Self>
    where
        F: FnMut(&Var) -> Lattice<i64>,
    {
        match instr {
            Instr::Const { dst, value } => Transfer::def(*dst, Lattice::Const(*value)),
            Instr::Binop { op, dst, lhs, rhs } => {
                let value = match (lookup(lhs), lookup(rhs)) {
                    (Lattice::Bottom, _) | (_, Lattice::Bottom) => Lattice::Bottom,
                    (Lattice::Top, _) | (_, Lattice::Top) => Lattice::Top,
                    (Lattice::Const(a), Lattice::Const(b)) => match const_eval(*op, a, b) {
                        Some(v) => Lattice::Const(v),
                        None => Lattice::Bottom,
                    },
                };
                Transfer::def(*dst, value)
            }
            // Phis are evaluated by the engine's meet, never here.
            Instr::Phi { .. } => Transfer::empty(),
            Instr::Jump { target } => Transfer::jump(*target),
            Instr::Branch {
                cond,
                if_true,
                if_false,
            } => {
                let mut t = Transfer::empty();
                match lookup(cond) {
                    Lattice::Top => {}
                    Lattice::Const(c) => {
                        t.targets.push(if c != 0 { *if_true } else { *if_false });
                    }
                    Lattice::Bottom => {
                        t.targets.push(*if_true);
                        t.targets.push(*if_false);
                    }
                }
                t
            }
            Instr::Return { .. } => Transfer::empty(),
        }
    }

    fn rewrite<F>(&self, instr: &Instr, mut lookup: F) -> Vec<Instr>
    where
        F: FnMut(&Var) -> Lattice<i64>,
    {
        match instr {
            Instr::Binop { dst, .. } | Instr::Phi { dst, .. } => {
                if let Lattice::Const(value) = lookup(dst) {
                    return vec![Instr::Const { dst: *dst, value }];
                }
                vec![instr.clone()]
            }
            Instr::Branch {
                cond,
                if_true,
                if_false,
            } => {
                if let Lattice::Const(c) = lookup(cond) {
                    let target = if c != 0 { *if_true } else { *if_false };
                    log::trace!("folding branch on {:?} to jump {}", cond, target);
                    return vec![Instr::Jump { target }];
                }
                vec![instr.clone()]
            }
            _ => vec![instr.clone()],
        }
    }
}
