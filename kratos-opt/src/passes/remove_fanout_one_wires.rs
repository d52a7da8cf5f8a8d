use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{
    self as ir, AssignType, Endpoint, Generator, StmtKind, StmtParent,
    VarIdx, VarKind,
};
use kratos_utils::Id;
use std::collections::HashSet;

/// Vars referenced outside plain assignments: predicates and their
/// operands, switch targets, sensitivity lists, and instance
/// connections.
fn non_assign_refs(gen: &Generator) -> HashSet<VarIdx> {
    let mut refs = HashSet::new();
    for s in gen.stmt_indices() {
        match gen.stmt(s).kind() {
            StmtKind::Block { sensitivity, .. } => {
                refs.extend(sensitivity.iter().map(|&(_, v)| v));
            }
            StmtKind::If { predicate, .. } => {
                refs.insert(*predicate);
            }
            StmtKind::Switch { target, cases } => {
                refs.insert(*target);
                refs.extend(cases.iter().filter_map(|c| c.value));
            }
            StmtKind::ModuleInstantiation(m) => {
                refs.extend(m.port_mapping.iter().map(|&(_, v)| v));
            }
            StmtKind::Assign(_) => {}
        }
    }
    for child in &gen.children {
        for (_, ep) in child.connections.iter() {
            if let &Endpoint::Var(v) = ep {
                refs.insert(v);
            }
        }
    }
    // expand through derived vertices so an operand buried in a
    // predicate expression is found
    let mut stack: Vec<VarIdx> = refs.iter().copied().collect();
    while let Some(v) = stack.pop() {
        let components: Vec<VarIdx> = match gen.var_data(v).kind() {
            &VarKind::Expression { left, right, .. } => {
                std::iter::once(left).chain(right).collect()
            }
            &VarKind::Slice { parent, .. }
            | &VarKind::Casted { parent, .. } => vec![parent],
            VarKind::Concat { parts } => parts.clone(),
            _ => vec![],
        };
        for component in components {
            if refs.insert(component) {
                stack.push(component);
            }
        }
    }
    refs
}

/// Short-circuit intermediate wires with exactly one driver and one
/// consumer when both ends are plain assignments: the consumer is
/// rewired to the driver's right-hand side and the wire disappears.
#[derive(Default)]
pub struct RemoveFanoutOneWires;

impl Named for RemoveFanoutOneWires {
    fn name() -> &'static str {
        "remove_fanout_one_wires"
    }

    fn description() -> &'static str {
        "short-circuits single-driver single-consumer wires"
    }
}

impl Transform for RemoveFanoutOneWires {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(gen) = ctx.get_mut(name) else { continue };
            let candidates: Vec<_> = gen
                .named_vars()
                .filter(|&(_, idx)| gen.var_data(idx).is_base())
                .map(|(_, idx)| idx)
                .collect();
            for wire in candidates {
                let data = gen.var_data(wire);
                if data.sources().len() != 1 || data.sinks().len() != 1 {
                    continue;
                }
                let (Some(&src), Some(&snk)) = (
                    data.sources().iter().next(),
                    data.sinks().iter().next(),
                ) else {
                    continue;
                };
                if src == snk {
                    continue;
                }
                let Some(sa) = gen.stmt(src).as_assign().copied() else {
                    continue;
                };
                let Some(ka) = gen.stmt(snk).as_assign().copied() else {
                    continue;
                };
                // whole-wire assignments only, with a continuous driver
                if sa.left != wire || ka.right != wire {
                    continue;
                }
                if gen.stmt(src).parent() != StmtParent::Generator {
                    continue;
                }
                if !matches!(
                    sa.assign_type,
                    AssignType::Blocking | AssignType::Undefined
                ) {
                    continue;
                }
                if sa.right == wire {
                    continue;
                }
                // predicates, sensitivity lists, switch targets, and
                // instance connections keep the wire alive
                if non_assign_refs(gen).contains(&wire) {
                    continue;
                }
                gen.rewire_assign_right(snk, sa.right)?;
                gen.remove_stmt(src);
                gen.delete_var(wire);
                log::debug!(
                    "short-circuited `{}.{}'",
                    name,
                    gen.var_str(sa.right)
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratos_ir::Context;

    #[test]
    fn short_circuits_intermediate_wire() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let a = m.port_in("a", 4).unwrap();
        let f = m.port_out("f", 4).unwrap();
        let w = m.var("w", 4).unwrap();
        let s1 = m.assign_typed(w, a, AssignType::Blocking).unwrap();
        let s2 = m.assign_typed(f, w, AssignType::Blocking).unwrap();
        m.add_stmt(s1).unwrap();
        m.add_stmt(s2).unwrap();

        RemoveFanoutOneWires::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();

        let m = ctx.get("top").unwrap();
        assert!(m.get_var("w").is_none());
        assert_eq!(m.stmts_count(), 1);
        let a2 = m.stmt(m.get_stmt(0).unwrap()).as_assign().unwrap();
        assert_eq!(a2.left, f);
        assert_eq!(a2.right, a);
    }

    #[test]
    fn keeps_wires_with_fanout() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let a = m.port_in("a", 4).unwrap();
        let f = m.port_out("f", 4).unwrap();
        let g = m.port_out("g", 4).unwrap();
        let w = m.var("w", 4).unwrap();
        for s in [
            m.assign_typed(w, a, AssignType::Blocking).unwrap(),
            m.assign_typed(f, w, AssignType::Blocking).unwrap(),
            m.assign_typed(g, w, AssignType::Blocking).unwrap(),
        ] {
            m.add_stmt(s).unwrap();
        }
        RemoveFanoutOneWires::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        assert!(ctx.get("top").unwrap().get_var("w").is_some());
    }
}
