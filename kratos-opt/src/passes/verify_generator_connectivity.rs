use crate::analysis::structural_refs;
use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{self as ir, Endpoint, Generator, PortDirection, VarIdx};
use kratos_utils::{Error, Id};
use std::collections::HashSet;

/// Connectivity lint over the whole hierarchy.
///
/// Hard failures: an output port with no driver, and a child-instance
/// input left unconnected. Dead-but-harmless signals (a consumed wire
/// with no driver, an input port nothing reads, an unconnected instance
/// output) are reported at `warn` level. InOut ports count as both a
/// source and a sink and are never flagged.
#[derive(Default)]
pub struct VerifyGeneratorConnectivity;

impl Named for VerifyGeneratorConnectivity {
    fn name() -> &'static str {
        "verify_generator_connectivity"
    }

    fn description() -> &'static str {
        "checks that ports and instance connections are fully driven"
    }
}

impl Transform for VerifyGeneratorConnectivity {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        let order = post_order(ctx, root)?;
        for &name in &order {
            let Some(gen) = ctx.get(name) else { continue };
            let (instance_driven, instance_consumed) =
                instance_effects(ctx, gen)?;
            check_ports(gen, &instance_driven, &instance_consumed)?;
            check_plain_vars(gen, &instance_driven);
            check_instances(ctx, gen)?;
        }
        Ok(())
    }
}

/// Parent-side vars driven by child outputs and consumed by child
/// inputs.
fn instance_effects(
    ctx: &ir::Context,
    gen: &Generator,
) -> PassResult<(HashSet<VarIdx>, HashSet<VarIdx>)> {
    let mut driven = HashSet::new();
    let mut consumed = HashSet::new();
    for child in &gen.children {
        let target = ctx.get(child.target).ok_or_else(|| {
            Error::lookup_failure(format!(
                "no generator named `{}'",
                child.target
            ))
        })?;
        for (port, ep) in child.connections.iter() {
            let &Endpoint::Var(var) = ep else { continue };
            let Some(pidx) = target.get_var(*port) else { continue };
            match target.var_data(pidx).port_direction() {
                Some(PortDirection::Out) => {
                    driven.insert(var);
                }
                Some(PortDirection::In) => {
                    consumed.insert(var);
                }
                Some(PortDirection::InOut) => {
                    driven.insert(var);
                    consumed.insert(var);
                }
                None => {}
            }
        }
    }
    Ok((driven, consumed))
}

fn check_ports(
    gen: &Generator,
    instance_driven: &HashSet<VarIdx>,
    instance_consumed: &HashSet<VarIdx>,
) -> PassResult<()> {
    let refs = structural_refs(gen);
    for (name, idx) in gen.ports() {
        let data = gen.var_data(idx);
        match data.port_direction() {
            Some(PortDirection::Out) => {
                if data.sources().is_empty()
                    && !instance_driven.contains(&idx)
                {
                    return Err(Error::unconnected(format!(
                        "output port `{}.{name}' is never driven",
                        gen.name
                    ))
                    .with_locs(data.locs.iter().cloned()));
                }
            }
            Some(PortDirection::In) => {
                let read = !data.sinks().is_empty()
                    || instance_consumed.contains(&idx)
                    || refs.contains(&idx);
                if !read {
                    log::warn!(
                        "input port `{}.{name}' is never read",
                        gen.name
                    );
                }
            }
            // InOut ports are both driven and read by construction.
            _ => {}
        }
    }
    Ok(())
}

fn check_plain_vars(gen: &Generator, instance_driven: &HashSet<VarIdx>) {
    for (name, idx) in gen.named_vars() {
        let data = gen.var_data(idx);
        if !data.is_base() {
            continue;
        }
        if data.sources().is_empty()
            && !instance_driven.contains(&idx)
            && !data.sinks().is_empty()
        {
            log::warn!(
                "`{}.{name}' is consumed but never driven",
                gen.name
            );
        }
    }
}

fn check_instances(ctx: &ir::Context, gen: &Generator) -> PassResult<()> {
    for child in &gen.children {
        let target = ctx.get(child.target).ok_or_else(|| {
            Error::lookup_failure(format!(
                "no generator named `{}'",
                child.target
            ))
        })?;
        for (port_name, pidx) in target.ports() {
            let connected = child.connections.contains_key(&port_name);
            match target.var_data(pidx).port_direction() {
                Some(PortDirection::In) if !connected => {
                    return Err(Error::unconnected(format!(
                        "input port `{port_name}' of `{}' (instance \
                         `{}' in `{}') is unconnected",
                        child.target, child.instance_name, gen.name
                    )));
                }
                Some(PortDirection::Out) if !connected => {
                    log::warn!(
                        "output port `{port_name}' of instance `{}' in \
                         `{}' is unconnected",
                        child.instance_name,
                        gen.name
                    );
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratos_ir::Context;

    #[test]
    fn undriven_output_port_fails() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        m.port_out("f", 4).unwrap();
        let err = VerifyGeneratorConnectivity::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            kratos_utils::ErrorKind::UnconnectedSignal(_)
        ));
    }

    #[test]
    fn driven_output_passes() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let f = m.port_out("f", 4).unwrap();
        let a = m.port_in("a", 4).unwrap();
        let s = m.assign(f, a).unwrap();
        m.add_stmt(s).unwrap();
        assert!(VerifyGeneratorConnectivity::default()
            .run(&mut ctx, Id::from("top"))
            .is_ok());
    }

    #[test]
    fn unconnected_instance_input_fails() {
        let mut ctx = Context::new();
        let leaf = ctx.generator("leaf");
        let li = leaf.port_in("in", 1).unwrap();
        let lo = leaf.port_out("out", 1).unwrap();
        let s = leaf.assign(lo, li).unwrap();
        leaf.add_stmt(s).unwrap();

        let top = ctx.generator("top");
        let w = top.var("w", 1).unwrap();
        let inst = top.add_child("leaf", "l0");
        top.wire(inst, "out", w).unwrap();
        // "in" left unconnected
        assert!(VerifyGeneratorConnectivity::default()
            .run(&mut ctx, Id::from("top"))
            .is_err());
    }

    #[test]
    fn instance_output_drives_parent_wire() {
        let mut ctx = Context::new();
        let leaf = ctx.generator("leaf");
        let li = leaf.port_in("in", 1).unwrap();
        let lo = leaf.port_out("out", 1).unwrap();
        let s = leaf.assign(lo, li).unwrap();
        leaf.add_stmt(s).unwrap();

        let top = ctx.generator("top");
        let f = top.port_out("f", 1).unwrap();
        let a = top.port_in("a", 1).unwrap();
        let inst = top.add_child("leaf", "l0");
        top.wire(inst, "in", a).unwrap();
        top.wire(inst, "out", f).unwrap();
        assert!(VerifyGeneratorConnectivity::default()
            .run(&mut ctx, Id::from("top"))
            .is_ok());
    }

    #[test]
    fn inout_is_exempt() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        m.port(PortDirection::InOut, "bus", 8).unwrap();
        assert!(VerifyGeneratorConnectivity::default()
            .run(&mut ctx, Id::from("top"))
            .is_ok());
    }
}
