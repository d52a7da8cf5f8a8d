use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{self as ir, Endpoint, Generator, ModInstStmt};
use kratos_utils::{Error, Id};
use itertools::Itertools;

/// Realize one `ModuleInstantiation` statement per recorded child
/// instance, snapshotting the internal-port to external-var mapping and
/// the effective parameter values.
#[derive(Default)]
pub struct CreateModuleInstantiation;

impl Named for CreateModuleInstantiation {
    fn name() -> &'static str {
        "create_module_instantiation"
    }

    fn description() -> &'static str {
        "materializes instantiation statements from recorded connectivity"
    }
}

impl Transform for CreateModuleInstantiation {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(mut gen) = ctx.remove(name) else { continue };
            let result = realize(&mut gen, ctx);
            ctx.insert(gen);
            result?;
        }
        Ok(())
    }
}

fn realize(gen: &mut Generator, ctx: &ir::Context) -> PassResult<()> {
    for i in 0..gen.children.len() {
        let target_name = gen.children[i].target;
        let instance_name = gen.children[i].instance_name;
        let target = ctx.get(target_name).ok_or_else(|| {
            Error::lookup_failure(format!(
                "no generator named `{target_name}'"
            ))
        })?;
        let mut port_mapping = vec![];
        for (port, ep) in gen.children[i]
            .connections
            .iter()
            .sorted_by_key(|(port, _)| **port)
        {
            let &Endpoint::Var(var) = ep else {
                return Err(Error::malformed_structure(format!(
                    "connection `{port}' of instance `{instance_name}' \
                     was never decoupled"
                )));
            };
            let pidx = target.get_var(*port).ok_or_else(|| {
                Error::lookup_failure(format!(
                    "`{target_name}' has no port `{port}'"
                ))
            })?;
            let pw = target.var_data(pidx).width;
            let ew = gen.var_data(var).width;
            if pw != ew {
                return Err(Error::width_mismatch(format!(
                    "port `{target_name}.{port}' is {pw} bits but \
                     `{}' is {ew} bits",
                    gen.var_str(var)
                )));
            }
            port_mapping.push((*port, var));
        }
        let params = target
            .params()
            .map(|(pname, pidx)| {
                let value = gen.children[i]
                    .params
                    .get(&pname)
                    .copied()
                    .or_else(|| target.var_data(pidx).param_value())
                    .unwrap_or(0);
                (pname, value)
            })
            .sorted_by_key(|&(pname, _)| pname)
            .collect();
        let stmt = gen.module_inst_stmt(ModInstStmt {
            target: target_name,
            instance_name,
            port_mapping,
            params,
        });
        gen.add_stmt(stmt)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratos_ir::{Context, StmtKind};

    #[test]
    fn snapshots_connectivity() {
        let mut ctx = Context::new();
        let leaf = ctx.generator("leaf");
        let a = leaf.port_in("a", 4).unwrap();
        let f = leaf.port_out("f", 4).unwrap();
        leaf.parameter("WIDTH", 8, 4).unwrap();
        let s = leaf.assign(f, a).unwrap();
        leaf.add_stmt(s).unwrap();

        let top = ctx.generator("top");
        let x = top.port_in("x", 4).unwrap();
        let y = top.port_out("y", 4).unwrap();
        let inst = top.add_child("leaf", "l0");
        top.wire(inst, "f", y).unwrap();
        top.wire(inst, "a", x).unwrap();

        CreateModuleInstantiation::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();

        let top = ctx.get("top").unwrap();
        assert_eq!(top.stmts_count(), 1);
        let StmtKind::ModuleInstantiation(m) =
            top.stmt(top.get_stmt(0).unwrap()).kind()
        else {
            panic!("expected an instantiation statement");
        };
        assert_eq!(m.target, "leaf");
        assert_eq!(m.instance_name, "l0");
        // mapping is sorted by internal port name
        assert_eq!(m.port_mapping[0], (Id::from("a"), x));
        assert_eq!(m.port_mapping[1], (Id::from("f"), y));
        assert_eq!(m.params, vec![(Id::from("WIDTH"), 4)]);
    }

    #[test]
    fn width_mismatch_is_fatal() {
        let mut ctx = Context::new();
        let leaf = ctx.generator("leaf");
        leaf.port_in("a", 4).unwrap();
        let top = ctx.generator("top");
        let x = top.port_in("x", 8).unwrap();
        let inst = top.add_child("leaf", "l0");
        top.wire(inst, "a", x).unwrap();
        assert!(CreateModuleInstantiation::default()
            .run(&mut ctx, Id::from("top"))
            .is_err());
    }
}
