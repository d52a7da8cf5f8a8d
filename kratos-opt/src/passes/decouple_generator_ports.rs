use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{
    self as ir, AssignType, Endpoint, Generator, PortDirection, VarKind,
};
use kratos_utils::{Error, Id, NameGenerator};

/// Make every instance connection a single printable identifier: direct
/// sibling port-to-port links and expression-valued connections are
/// routed through a fresh intermediate wire on the parent side.
#[derive(Default)]
pub struct DecoupleGeneratorPorts;

impl Named for DecoupleGeneratorPorts {
    fn name() -> &'static str {
        "decouple_generator_ports"
    }

    fn description() -> &'static str {
        "materializes intermediate wires for indirect port connections"
    }
}

impl Transform for DecoupleGeneratorPorts {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(mut gen) = ctx.remove(name) else { continue };
            let result = decouple(&mut gen, ctx);
            ctx.insert(gen);
            result?;
        }
        Ok(())
    }
}

fn decouple(gen: &mut Generator, ctx: &ir::Context) -> PassResult<()> {
    let mut namegen = gen.name_generator();
    for i in 0..gen.children.len() {
        let connections: Vec<(Id, Endpoint)> = gen.children[i]
            .connections
            .iter()
            .map(|(&port, &ep)| (port, ep))
            .collect();
        for (port, ep) in connections {
            match ep {
                Endpoint::ChildPort {
                    instance: j,
                    port: port_j,
                } => {
                    // reuse the var already bound on the far side
                    if let Some(&Endpoint::Var(v)) =
                        gen.children[j].connections.get(&port_j)
                    {
                        gen.children[i]
                            .connections
                            .insert(port, Endpoint::Var(v));
                        continue;
                    }
                    let (width, is_signed, _) =
                        port_shape(ctx, gen, i, port)?;
                    let wire = fresh_wire(
                        gen, &mut namegen, i, port, width, is_signed,
                    )?;
                    gen.children[i]
                        .connections
                        .insert(port, Endpoint::Var(wire));
                    gen.children[j]
                        .connections
                        .insert(port_j, Endpoint::Var(wire));
                }
                Endpoint::Var(v) => {
                    let indirect = matches!(
                        gen.var_data(v).kind(),
                        VarKind::Expression { .. } | VarKind::Concat { .. }
                    );
                    if !indirect {
                        continue;
                    }
                    let (width, is_signed, direction) =
                        port_shape(ctx, gen, i, port)?;
                    if direction != PortDirection::In {
                        return Err(Error::malformed_structure(format!(
                            "cannot drive `{}' of instance `{}' from \
                             expression `{}'",
                            port,
                            gen.children[i].instance_name,
                            gen.var_str(v)
                        )));
                    }
                    let wire = fresh_wire(
                        gen, &mut namegen, i, port, width, is_signed,
                    )?;
                    let stmt =
                        gen.assign_typed(wire, v, AssignType::Blocking)?;
                    gen.add_stmt(stmt)?;
                    gen.children[i]
                        .connections
                        .insert(port, Endpoint::Var(wire));
                }
            }
        }
    }
    Ok(())
}

fn fresh_wire(
    gen: &mut Generator,
    namegen: &mut NameGenerator,
    instance: usize,
    port: Id,
    width: u32,
    is_signed: bool,
) -> PassResult<ir::VarIdx> {
    let base = format!("{}_{}", gen.children[instance].instance_name, port);
    let name = namegen.gen_name(base);
    if is_signed {
        gen.var_signed(name, width)
    } else {
        gen.var(name, width)
    }
}

/// Shape of `port` on the target of child instance `instance`.
fn port_shape(
    ctx: &ir::Context,
    gen: &Generator,
    instance: usize,
    port: Id,
) -> PassResult<(u32, bool, PortDirection)> {
    let target_name = gen.children[instance].target;
    let target = ctx.get(target_name).ok_or_else(|| {
        Error::lookup_failure(format!(
            "no generator named `{target_name}'"
        ))
    })?;
    let idx = target.get_var(port).ok_or_else(|| {
        Error::lookup_failure(format!(
            "`{target_name}' has no port `{port}'"
        ))
    })?;
    let data = target.var_data(idx);
    let direction = data.port_direction().ok_or_else(|| {
        Error::malformed_structure(format!(
            "`{target_name}.{port}' is not a port"
        ))
    })?;
    Ok((data.width, data.is_signed, direction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratos_ir::Context;

    fn leaf(ctx: &mut Context, name: &str) {
        let leaf = ctx.generator(name);
        let i = leaf.port_in("in", 4).unwrap();
        let o = leaf.port_out("out", 4).unwrap();
        let s = leaf.assign(o, i).unwrap();
        leaf.add_stmt(s).unwrap();
    }

    #[test]
    fn decouples_sibling_link() {
        let mut ctx = Context::new();
        leaf(&mut ctx, "leaf");
        let top = ctx.generator("top");
        let a = top.port_in("a", 4).unwrap();
        let f = top.port_out("f", 4).unwrap();
        let i0 = top.add_child("leaf", "l0");
        let i1 = top.add_child("leaf", "l1");
        top.wire(i0, "in", a).unwrap();
        top.wire(i1, "out", f).unwrap();
        top.wire_ports(i1, "in", i0, "out").unwrap();

        DecoupleGeneratorPorts::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();

        let top = ctx.get("top").unwrap();
        let Endpoint::Var(w1) = top.children[1].connections[&Id::from("in")]
        else {
            panic!("expected a decoupled wire");
        };
        let Endpoint::Var(w0) = top.children[0].connections[&Id::from("out")]
        else {
            panic!("expected a decoupled wire");
        };
        assert_eq!(w0, w1);
        assert!(top.var_data(w0).is_base());
    }

    #[test]
    fn decouples_expression_connection() {
        let mut ctx = Context::new();
        leaf(&mut ctx, "leaf");
        let top = ctx.generator("top");
        let a = top.port_in("a", 4).unwrap();
        let b = top.port_in("b", 4).unwrap();
        let f = top.port_out("f", 4).unwrap();
        let sum = top.add(a, b).unwrap();
        let i0 = top.add_child("leaf", "l0");
        top.wire(i0, "in", sum).unwrap();
        top.wire(i0, "out", f).unwrap();

        DecoupleGeneratorPorts::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();

        let top = ctx.get("top").unwrap();
        let Endpoint::Var(w) = top.children[0].connections[&Id::from("in")]
        else {
            panic!("expected a decoupled wire");
        };
        assert!(top.var_data(w).is_base());
        // the wire is driven by the expression at module scope
        assert_eq!(top.var_data(w).sources().len(), 1);
        assert_eq!(top.stmts_count(), 1);
    }
}
