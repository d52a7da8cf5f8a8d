use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{self as ir, AssignType, PortDirection};
use kratos_utils::Id;

/// Give every undriven output port of an external (stub) generator a
/// constant-zero driver so the connectivity check sees fully driven
/// instances. External generators are never emitted, so the synthetic
/// assignments stay invisible in the output.
#[derive(Default)]
pub struct ZeroOutStubs;

impl Named for ZeroOutStubs {
    fn name() -> &'static str {
        "zero_out_stubs"
    }

    fn description() -> &'static str {
        "drives undriven outputs of external stubs with constant zero"
    }
}

impl Transform for ZeroOutStubs {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(gen) = ctx.get_mut(name) else { continue };
            if !gen.external {
                continue;
            }
            let undriven: Vec<_> = gen
                .ports()
                .filter(|&(_, idx)| {
                    let data = gen.var_data(idx);
                    data.port_direction() == Some(PortDirection::Out)
                        && data.sources().is_empty()
                })
                .map(|(_, idx)| idx)
                .collect();
            for port in undriven {
                let width = gen.var_data(port).width;
                let is_signed = gen.var_data(port).is_signed;
                let zero = gen.constant_with(0, width, is_signed)?;
                let stmt =
                    gen.assign_typed(port, zero, AssignType::Blocking)?;
                gen.add_stmt(stmt)?;
                log::debug!(
                    "zeroed stub output `{}.{}'",
                    name,
                    gen.var_str(port)
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
    fn drives_stub_outputs() {
        let mut ctx = Context::new();
        let stub = ctx.generator("stub");
        stub.external = true;
        stub.port_in("a", 4).unwrap();
        let out = stub.port_out("f", 4).unwrap();
        ctx.generator("top").add_child("stub", "s0");

        ZeroOutStubs::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();

        let stub = ctx.get("stub").unwrap();
        assert_eq!(stub.var_data(out).sources().len(), 1);
        assert_eq!(stub.stmts_count(), 1);
    }

    #[test]
    fn leaves_internal_generators_alone() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        m.port_out("f", 4).unwrap();
        ZeroOutStubs::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        assert_eq!(ctx.get("top").unwrap().stmts_count(), 0);
    }
}
