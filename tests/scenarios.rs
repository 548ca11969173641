//! End-to-end runs of the pass over the bundled IR.

use sccp::ir::{Binop, FunctionBody, Instr};
use sccp::{propagate, IrBackend};

#[test]
fn straight_line_constant_fold() {
    let _ = env_logger::try_init();

    let mut f = FunctionBody::new();
    let b1 = f.add_block();
    let x = f.fresh_var();
    let four = f.fresh_var();
    let y = f.fresh_var();
    f.set_code(
        f.entry,
        vec![
            Instr::Const { dst: x, value: 3 },
            Instr::Const { dst: four, value: 4 },
            Instr::Binop {
                op: Binop::Add,
                dst: y,
                lhs: x,
                rhs: four,
            },
            Instr::Jump { target: b1 },
        ],
    );
    f.set_code(b1, vec![Instr::Return { value: Some(y) }]);
    let entry = f.entry;

    let out = propagate(&IrBackend, f).unwrap();
    assert_eq!(
        out.code(entry).unwrap(),
        &[
            Instr::Const { dst: x, value: 3 },
            Instr::Const { dst: four, value: 4 },
            Instr::Const { dst: y, value: 7 },
            Instr::Jump { target: b1 },
        ]
    );
    assert!(out.code(b1).is_some());
}

#[test]
fn constant_predicate_folds_branch_and_prunes_dead_arm() {
    let _ = env_logger::try_init();

    let mut f = FunctionBody::new();
    let b1 = f.add_block();
    let b2 = f.add_block();
    let c = f.fresh_var();
    f.set_code(
        f.entry,
        vec![
            Instr::Const { dst: c, value: 1 },
            Instr::Branch {
                cond: c,
                if_true: b1,
                if_false: b2,
            },
        ],
    );
    f.set_code(b1, vec![Instr::Return { value: None }]);
    f.set_code(b2, vec![Instr::Return { value: None }]);
    let entry = f.entry;

    let out = propagate(&IrBackend, f).unwrap();
    assert_eq!(
        out.code(entry).unwrap(),
        &[
            Instr::Const { dst: c, value: 1 },
            Instr::Jump { target: b1 },
        ]
    );
    assert!(out.code(b1).is_some());
    assert!(out.code(b2).is_none());
}

/// Both arms of a data diamond feed the same constant into the join phi;
/// the phi folds even though one arm is explored later than the other.
#[test]
fn agreeing_diamond_phi_folds() {
    let _ = env_logger::try_init();

    let mut f = FunctionBody::new();
    let p = f.add_param();
    let join = f.add_block();
    let side = f.add_block();
    let a = f.fresh_var();
    let b = f.fresh_var();
    let x = f.fresh_var();
    f.set_code(
        f.entry,
        vec![
            Instr::Const { dst: a, value: 5 },
            Instr::Branch {
                cond: p,
                if_true: join,
                if_false: side,
            },
        ],
    );
    let entry = f.entry;
    f.set_code(
        side,
        vec![
            Instr::Const { dst: b, value: 5 },
            Instr::Jump { target: join },
        ],
    );
    f.set_code(
        join,
        vec![
            Instr::Phi {
                dst: x,
                args: vec![(entry, a), (side, b)],
            },
            Instr::Return { value: Some(x) },
        ],
    );

    let out = propagate(&IrBackend, f).unwrap();
    assert_eq!(
        out.code(join).unwrap(),
        &[
            Instr::Const { dst: x, value: 5 },
            Instr::Return { value: Some(x) },
        ]
    );
}

#[test]
fn disagreeing_diamond_phi_stays() {
    let _ = env_logger::try_init();

    let mut f = FunctionBody::new();
    let p = f.add_param();
    let join = f.add_block();
    let side = f.add_block();
    let a = f.fresh_var();
    let b = f.fresh_var();
    let x = f.fresh_var();
    f.set_code(
        f.entry,
        vec![
            Instr::Const { dst: a, value: 5 },
            Instr::Branch {
                cond: p,
                if_true: join,
                if_false: side,
            },
        ],
    );
    let entry = f.entry;
    f.set_code(
        side,
        vec![
            Instr::Const { dst: b, value: 6 },
            Instr::Jump { target: join },
        ],
    );
    let phi = Instr::Phi {
        dst: x,
        args: vec![(entry, a), (side, b)],
    };
    f.set_code(join, vec![phi.clone(), Instr::Return { value: Some(x) }]);

    let out = propagate(&IrBackend, f).unwrap();
    assert_eq!(
        out.code(join).unwrap(),
        &[phi, Instr::Return { value: Some(x) }]
    );
}

/// `for (i = 0; i < 10; i++)`: nothing folds, nothing is pruned.
#[test]
fn counting_loop_is_left_alone() {
    let _ = env_logger::try_init();

    let (f, header, latch, exit) = counting_loop();
    let out = propagate(&IrBackend, f).unwrap();

    assert!(out.code(latch).is_some());
    assert!(out.code(exit).is_some());
    let header_code = out.code(header).unwrap();
    assert!(matches!(header_code[0], Instr::Phi { .. }));
    assert!(matches!(header_code[2], Instr::Branch { .. }));
}

/// Same CFG, two runs: structurally identical results.
#[test]
fn output_is_deterministic() {
    let _ = env_logger::try_init();

    let (f1, ..) = counting_loop();
    let (f2, ..) = counting_loop();
    let out1 = propagate(&IrBackend, f1).unwrap();
    let out2 = propagate(&IrBackend, f2).unwrap();
    assert_eq!(out1, out2);
}

fn counting_loop() -> (FunctionBody, sccp::ir::Block, sccp::ir::Block, sccp::ir::Block) {
    let mut f = FunctionBody::new();
    let header = f.add_block();
    let latch = f.add_block();
    let exit = f.add_block();
    let i0 = f.fresh_var();
    let i1 = f.fresh_var();
    let i2 = f.fresh_var();
    let ten = f.fresh_var();
    let one = f.fresh_var();
    let cond = f.fresh_var();

    f.set_code(
        f.entry,
        vec![
            Instr::Const { dst: i0, value: 0 },
            Instr::Const { dst: ten, value: 10 },
            Instr::Jump { target: header },
        ],
    );
    let entry = f.entry;
    f.set_code(
        header,
        vec![
            Instr::Phi {
                dst: i1,
                args: vec![(entry, i0), (latch, i2)],
            },
            Instr::Binop {
                op: Binop::Lt,
                dst: cond,
                lhs: i1,
                rhs: ten,
            },
            Instr::Branch {
                cond,
                if_true: latch,
                if_false: exit,
            },
        ],
    );
    f.set_code(
        latch,
        vec![
            Instr::Const { dst: one, value: 1 },
            Instr::Binop {
                op: Binop::Add,
                dst: i2,
                lhs: i1,
                rhs: one,
            },
            Instr::Jump { target: header },
        ],
    );
    f.set_code(exit, vec![Instr::Return { value: Some(i1) }]);
    (f, header, latch, exit)
}

/// The interleaving the pass exists for: the loop-carried value can only
/// be proven constant because the arm that would change it is proven
/// unreachable, and that arm is only unreachable because the value is
/// constant. Neither plain constant folding nor reachability alone gets
/// there.
#[test]
fn constant_survives_loop_because_dead_arm_never_executes() {
    let _ = env_logger::try_init();

    let mut f = FunctionBody::new();
    let p = f.add_param();
    let header = f.add_block();
    let body = f.add_block();
    let bump = f.add_block();
    let latch = f.add_block();
    let exit = f.add_block();
    let one = f.fresh_var();
    let x0 = f.fresh_var();
    let x1 = f.fresh_var();
    let x2 = f.fresh_var();
    let x3 = f.fresh_var();
    let c = f.fresh_var();

    f.set_code(
        f.entry,
        vec![
            Instr::Const { dst: one, value: 1 },
            Instr::Const { dst: x0, value: 1 },
            Instr::Jump { target: header },
        ],
    );
    let entry = f.entry;
    // while (p) { if (x == 1) x = x; else x = x + 1; }
    f.set_code(
        header,
        vec![
            Instr::Phi {
                dst: x1,
                args: vec![(entry, x0), (latch, x2)],
            },
            Instr::Branch {
                cond: p,
                if_true: body,
                if_false: exit,
            },
        ],
    );
    f.set_code(
        body,
        vec![
            Instr::Binop {
                op: Binop::Eq,
                dst: c,
                lhs: x1,
                rhs: one,
            },
            Instr::Branch {
                cond: c,
                if_true: latch,
                if_false: bump,
            },
        ],
    );
    f.set_code(
        bump,
        vec![
            Instr::Binop {
                op: Binop::Add,
                dst: x3,
                lhs: x1,
                rhs: one,
            },
            Instr::Jump { target: latch },
        ],
    );
    f.set_code(
        latch,
        vec![
            Instr::Phi {
                dst: x2,
                args: vec![(body, x1), (bump, x3)],
            },
            Instr::Jump { target: header },
        ],
    );
    f.set_code(exit, vec![Instr::Return { value: Some(x1) }]);

    let out = propagate(&IrBackend, f).unwrap();

    // The increment arm is gone and every copy of x is the constant 1.
    assert!(out.code(bump).is_none());
    assert_eq!(
        out.code(body).unwrap(),
        &[
            Instr::Const { dst: c, value: 1 },
            Instr::Jump { target: latch },
        ]
    );
    assert_eq!(
        out.code(header).unwrap(),
        &[
            Instr::Const { dst: x1, value: 1 },
            Instr::Branch {
                cond: p,
                if_true: body,
                if_false: exit,
            },
        ]
    );
    assert_eq!(
        out.code(latch).unwrap(),
        &[
            Instr::Const { dst: x2, value: 1 },
            Instr::Jump { target: header },
        ]
    );
}

/// Phis may sit anywhere in a block when it is handed back by the
/// rewriter; stored blocks always have them first.
#[test]
fn phis_end_up_at_the_block_head() {
    let _ = env_logger::try_init();

    let mut f = FunctionBody::new();
    let p = f.add_param();
    let join = f.add_block();
    let side = f.add_block();
    let a = f.fresh_var();
    let b = f.fresh_var();
    let t = f.fresh_var();
    let x = f.fresh_var();
    f.set_code(
        f.entry,
        vec![
            Instr::Const { dst: a, value: 5 },
            Instr::Branch {
                cond: p,
                if_true: join,
                if_false: side,
            },
        ],
    );
    let entry = f.entry;
    f.set_code(
        side,
        vec![
            Instr::Const { dst: b, value: 6 },
            Instr::Jump { target: join },
        ],
    );
    let phi = Instr::Phi {
        dst: x,
        args: vec![(entry, a), (side, b)],
    };
    f.set_code(
        join,
        vec![
            Instr::Const { dst: t, value: 9 },
            phi.clone(),
            Instr::Return { value: Some(x) },
        ],
    );

    let out = propagate(&IrBackend, f).unwrap();
    assert_eq!(
        out.code(join).unwrap(),
        &[
            phi,
            Instr::Const { dst: t, value: 9 },
            Instr::Return { value: Some(x) },
        ]
    );
}
