use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{
    self as ir, ExprOp, Generator, StmtIdx, StmtKind, VarIdx, VarKind,
};
use kratos_utils::Id;

/// Rewrite `if (x == c0) ... else if (x == c1) ... else ...` chains that
/// compare one target var against constants into a switch statement.
/// Chains containing non-constant or non-equality predicates are left
/// alone.
#[derive(Default)]
pub struct TransformIfToCase;

impl Named for TransformIfToCase {
    fn name() -> &'static str {
        "transform_if_to_case"
    }

    fn description() -> &'static str {
        "rewrites constant equality if-chains into case statements"
    }
}

impl Transform for TransformIfToCase {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(gen) = ctx.get_mut(name) else { continue };
            for stmt in gen.body().to_vec() {
                visit(gen, stmt)?;
            }
        }
        Ok(())
    }
}

/// A matched chain: the compared target, the `(constant, body)` pairs,
/// the final else body, and every if shell making up the chain.
struct Chain {
    target: VarIdx,
    branches: Vec<(VarIdx, Vec<StmtIdx>)>,
    default: Vec<StmtIdx>,
}

fn visit(gen: &mut Generator, stmt: StmtIdx) -> PassResult<()> {
    let replacement = match gen.stmt(stmt).kind() {
        StmtKind::If { .. } => match_chain(gen, stmt),
        _ => None,
    };
    if let Some(chain) = replacement {
        let switch = apply(gen, stmt, chain)?;
        return visit_children(gen, switch);
    }
    visit_children(gen, stmt)
}

fn visit_children(gen: &mut Generator, stmt: StmtIdx) -> PassResult<()> {
    let children: Vec<StmtIdx> = match gen.stmt(stmt).kind() {
        StmtKind::Block { body, .. } => body.clone(),
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => then_body.iter().chain(else_body).copied().collect(),
        StmtKind::Switch { cases, .. } => {
            cases.iter().flat_map(|c| c.body.iter().copied()).collect()
        }
        _ => vec![],
    };
    for child in children {
        visit(gen, child)?;
    }
    Ok(())
}

/// Match `stmt` as the head of a rewritable chain. Requires at least one
/// `else if` so trivial single ifs keep their shape.
fn match_chain(gen: &Generator, stmt: StmtIdx) -> Option<Chain> {
    let mut target = None;
    let mut branches = vec![];
    let mut default = vec![];
    let mut cursor = stmt;
    loop {
        let StmtKind::If {
            predicate,
            then_body,
            else_body,
        } = gen.stmt(cursor).kind()
        else {
            return None;
        };
        let (cmp_target, value) = match_eq_const(gen, *predicate)?;
        match target {
            None => target = Some(cmp_target),
            Some(t) if t == cmp_target => {}
            Some(_) => return None,
        }
        branches.push((value, then_body.clone()));
        match else_body.as_slice() {
            [] => break,
            &[next]
                if matches!(gen.stmt(next).kind(), StmtKind::If { .. })
                    && chain_continues(gen, next, target) =>
            {
                cursor = next;
            }
            _ => {
                default = else_body.clone();
                break;
            }
        }
    }
    if branches.len() < 2 {
        return None;
    }
    Some(Chain {
        target: target?,
        branches,
        default,
    })
}

/// Whether a nested if keeps comparing the same target against a
/// constant. A mismatching if is treated as the chain's default body.
fn chain_continues(
    gen: &Generator,
    stmt: StmtIdx,
    target: Option<VarIdx>,
) -> bool {
    let StmtKind::If { predicate, .. } = gen.stmt(stmt).kind() else {
        return false;
    };
    match (match_eq_const(gen, *predicate), target) {
        (Some((t, _)), Some(expected)) => t == expected,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Match `x == constant`, in either operand order.
fn match_eq_const(
    gen: &Generator,
    predicate: VarIdx,
) -> Option<(VarIdx, VarIdx)> {
    let &VarKind::Expression {
        op: ExprOp::Eq,
        left,
        right: Some(right),
    } = gen.var_data(predicate).kind()
    else {
        return None;
    };
    let l_const = gen.var_data(left).const_value().is_some();
    let r_const = gen.var_data(right).const_value().is_some();
    match (l_const, r_const) {
        (false, true) => Some((left, right)),
        (true, false) => Some((right, left)),
        _ => None,
    }
}

/// Build the switch, move the chain bodies over, and swap it into the
/// chain head's slot.
fn apply(
    gen: &mut Generator,
    head: StmtIdx,
    chain: Chain,
) -> PassResult<StmtIdx> {
    let switch = gen.switch_stmt(chain.target);
    for (value, body) in chain.branches {
        for stmt in body {
            gen.detach_stmt(stmt);
            gen.append_switch_case_stmt(switch, Some(value), stmt)?;
        }
    }
    for stmt in chain.default {
        gen.detach_stmt(stmt);
        gen.append_switch_case_stmt(switch, None, stmt)?;
    }
    gen.replace_stmt(head, switch)?;
    // the emptied if shells are no longer reachable
    gen.remove_stmt(head);
    Ok(switch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratos_ir::Context;

    #[test]
    fn rewrites_constant_chain() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let sel = m.port_in("sel", 2).unwrap();
        let o = m.port_out("o", 2).unwrap();
        let comb = m.combinational_block();

        let c0 = m.constant(0, 2).unwrap();
        let c1 = m.constant(1, 2).unwrap();
        let c2 = m.constant(2, 2).unwrap();

        let p0 = m.eq(sel, c0).unwrap();
        let if0 = m.if_stmt(p0).unwrap();
        let s0 = m.assign(o, c0).unwrap();
        m.add_then_stmt(if0, s0).unwrap();

        let p1 = m.eq(sel, c1).unwrap();
        let if1 = m.if_stmt(p1).unwrap();
        let s1 = m.assign(o, c1).unwrap();
        m.add_then_stmt(if1, s1).unwrap();
        let s2 = m.assign(o, c2).unwrap();
        m.add_else_stmt(if1, s2).unwrap();

        m.add_else_stmt(if0, if1).unwrap();
        m.add_block_stmt(comb, if0).unwrap();
        m.add_stmt(comb).unwrap();

        TransformIfToCase::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();

        let m = ctx.get("top").unwrap();
        let StmtKind::Block { body, .. } =
            m.stmt(m.get_stmt(0).unwrap()).kind()
        else {
            panic!("expected the block");
        };
        let StmtKind::Switch { target, cases } = m.stmt(body[0]).kind()
        else {
            panic!("expected a switch statement");
        };
        assert_eq!(*target, sel);
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].body, vec![s0]);
        assert_eq!(cases[1].body, vec![s1]);
        assert!(cases[2].value.is_none());
        assert_eq!(cases[2].body, vec![s2]);
    }

    #[test]
    fn leaves_non_constant_chains_alone() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let sel = m.port_in("sel", 2).unwrap();
        let other = m.port_in("other", 2).unwrap();
        let o = m.port_out("o", 2).unwrap();

        let p0 = m.eq(sel, other).unwrap();
        let if0 = m.if_stmt(p0).unwrap();
        let s0 = m.assign(o, sel).unwrap();
        m.add_then_stmt(if0, s0).unwrap();
        let s1 = m.assign(o, other).unwrap();
        m.add_else_stmt(if0, s1).unwrap();
        m.add_stmt(if0).unwrap();

        TransformIfToCase::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        let m = ctx.get("top").unwrap();
        assert!(matches!(
            m.stmt(m.get_stmt(0).unwrap()).kind(),
            StmtKind::If { .. }
        ));
    }

    #[test]
    fn single_if_is_kept() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let sel = m.port_in("sel", 2).unwrap();
        let o = m.port_out("o", 2).unwrap();
        let c0 = m.constant(0, 2).unwrap();
        let p0 = m.eq(sel, c0).unwrap();
        let if0 = m.if_stmt(p0).unwrap();
        let s0 = m.assign(o, c0).unwrap();
        m.add_then_stmt(if0, s0).unwrap();
        m.add_stmt(if0).unwrap();

        TransformIfToCase::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        let m = ctx.get("top").unwrap();
        assert!(matches!(
            m.stmt(m.get_stmt(0).unwrap()).kind(),
            StmtKind::If { .. }
        ));
    }
}
