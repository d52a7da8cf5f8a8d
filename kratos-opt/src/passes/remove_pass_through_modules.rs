use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{
    self as ir, AssignType, Endpoint, Generator, PortDirection, VarKind,
};
use kratos_utils::Id;

/// Collapse child generators that only forward inputs to outputs: each
/// instantiation site gets direct assignments from the input-side
/// external vars to the output-side external vars, and the definition is
/// dropped once nothing instantiates it.
#[derive(Default)]
pub struct RemovePassThroughModules;

impl Named for RemovePassThroughModules {
    fn name() -> &'static str {
        "remove_pass_through_modules"
    }

    fn description() -> &'static str {
        "collapses modules that only forward inputs to outputs"
    }
}

impl Transform for RemovePassThroughModules {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            if name == root {
                continue;
            }
            let Some(gen) = ctx.get(name) else { continue };
            let Some(forwarding) = pass_through_map(gen) else {
                continue;
            };
            let mut still_used = false;
            for parent_name in ctx.names() {
                if parent_name == name {
                    continue;
                }
                let Some(mut parent) = ctx.remove(parent_name) else {
                    continue;
                };
                let result =
                    rewire_sites(&mut parent, name, &forwarding);
                ctx.insert(parent);
                still_used |= result?;
            }
            if !still_used {
                ctx.remove(name);
                log::debug!("removed pass-through module `{name}'");
            }
        }
        Ok(())
    }
}

/// If `gen` is a pure pass-through, return its `(output, input)` port
/// pairs.
fn pass_through_map(gen: &Generator) -> Option<Vec<(Id, Id)>> {
    if gen.external || !gen.children.is_empty() || gen.body().is_empty() {
        return None;
    }
    let mut pairs = vec![];
    for &stmt in gen.body() {
        let a = gen.stmt(stmt).as_assign()?;
        let out_name = port_name(gen, a.left, PortDirection::Out)?;
        let in_name = port_name(gen, a.right, PortDirection::In)?;
        pairs.push((out_name, in_name));
    }
    // every output forwarded exactly once
    let outputs: Vec<Id> = gen
        .ports()
        .filter(|&(_, idx)| {
            gen.var_data(idx).port_direction() == Some(PortDirection::Out)
        })
        .map(|(name, _)| name)
        .collect();
    if outputs.len() != pairs.len() {
        return None;
    }
    for output in outputs {
        if pairs.iter().filter(|(o, _)| *o == output).count() != 1 {
            return None;
        }
    }
    Some(pairs)
}

fn port_name(
    gen: &Generator,
    var: ir::VarIdx,
    direction: PortDirection,
) -> Option<Id> {
    let data = gen.var_data(var);
    match data.kind() {
        VarKind::Port { direction: d, .. } if *d == direction => {
            Some(data.name)
        }
        _ => None,
    }
}

/// Rewire and drop every instantiation of `target` inside `parent`.
/// Returns whether any site had to be kept.
fn rewire_sites(
    parent: &mut Generator,
    target: Id,
    forwarding: &[(Id, Id)],
) -> PassResult<bool> {
    let mut kept = false;
    let mut removable = vec![];
    for (i, child) in parent.children.iter().enumerate() {
        if child.target != target {
            continue;
        }
        // sibling-port endpoints have not been decoupled yet; such
        // sites keep the module
        let direct = forwarding.iter().all(|(out, input)| {
            matches!(
                child.connections.get(out),
                None | Some(Endpoint::Var(_))
            ) && matches!(
                child.connections.get(input),
                None | Some(Endpoint::Var(_))
            )
        });
        if direct {
            removable.push(i);
        } else {
            kept = true;
        }
    }
    for &i in &removable {
        for (out, input) in forwarding {
            let out_var = match parent.children[i].connections.get(out) {
                Some(&Endpoint::Var(v)) => v,
                _ => continue,
            };
            let in_var = match parent.children[i].connections.get(input) {
                Some(&Endpoint::Var(v)) => v,
                _ => continue,
            };
            let stmt = parent.assign_typed(
                out_var,
                in_var,
                AssignType::Blocking,
            )?;
            parent.add_stmt(stmt)?;
        }
    }
    let mut index = 0;
    parent.children.retain(|_| {
        let keep = !removable.contains(&index);
        index += 1;
        keep
    });
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratos_ir::Context;

    #[test]
    fn collapses_forwarding_module() {
        let mut ctx = Context::new();
        let pt = ctx.generator("pass");
        let i = pt.port_in("in", 4).unwrap();
        let o = pt.port_out("out", 4).unwrap();
        let s = pt.assign(o, i).unwrap();
        pt.add_stmt(s).unwrap();

        let top = ctx.generator("top");
        let a = top.port_in("a", 4).unwrap();
        let f = top.port_out("f", 4).unwrap();
        let inst = top.add_child("pass", "p0");
        top.wire(inst, "in", a).unwrap();
        top.wire(inst, "out", f).unwrap();

        RemovePassThroughModules::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();

        assert!(!ctx.contains("pass"));
        let top = ctx.get("top").unwrap();
        assert!(top.children.is_empty());
        assert_eq!(top.stmts_count(), 1);
        let a2 = top.stmt(top.get_stmt(0).unwrap()).as_assign().unwrap();
        assert_eq!(a2.left, f);
        assert_eq!(a2.right, a);
    }

    #[test]
    fn keeps_real_logic() {
        let mut ctx = Context::new();
        let m = ctx.generator("adder");
        let x = m.port_in("x", 4).unwrap();
        let y = m.port_in("y", 4).unwrap();
        let o = m.port_out("o", 4).unwrap();
        let sum = m.add(x, y).unwrap();
        let s = m.assign(o, sum).unwrap();
        m.add_stmt(s).unwrap();

        let top = ctx.generator("top");
        top.add_child("adder", "a0");

        RemovePassThroughModules::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        assert!(ctx.contains("adder"));
        assert_eq!(ctx.get("top").unwrap().children.len(), 1);
    }
}
