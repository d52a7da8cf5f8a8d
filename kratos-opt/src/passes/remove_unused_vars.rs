use crate::analysis::used_vars;
use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir as ir;
use kratos_utils::Id;

/// Delete vars that nothing drives, nothing consumes, and no statement
/// or instance connection refers to. Ports and parameters always stay,
/// since they are part of the generator's surface.
#[derive(Default)]
pub struct RemoveUnusedVars;

impl Named for RemoveUnusedVars {
    fn name() -> &'static str {
        "remove_unused_vars"
    }

    fn description() -> &'static str {
        "deletes vars with no drivers, consumers, or structural references"
    }
}

impl Transform for RemoveUnusedVars {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(gen) = ctx.get_mut(name) else { continue };
            // Deleting a var can orphan the vertices built on top of it,
            // so iterate until nothing changes.
            loop {
                let used = used_vars(gen);
                let dead: Vec<_> = gen
                    .var_indices()
                    .filter(|&v| {
                        let data = gen.var_data(v);
                        !data.is_port()
                            && !data.is_param()
                            && data.sources().is_empty()
                            && data.sinks().is_empty()
                            && !used.contains(&v)
                    })
                    .collect();
                if dead.is_empty() {
                    break;
                }
                for v in dead {
                    log::debug!(
                        "removing unused `{}.{}'",
                        name,
                        gen.var_str(v)
                    );
                    gen.delete_var(v);
                }
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
    fn removes_unreferenced_vars() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let a = m.var("a", 2).unwrap();
        let b = m.var("b", 2).unwrap();
        let c = m.var("c", 4).unwrap();
        let d = m.var("d", 4).unwrap();
        let s = m.assign(d, c).unwrap();
        m.add_stmt(s).unwrap();
        // an expression nobody consumes
        m.add(a, b).unwrap();

        RemoveUnusedVars::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();

        let m = ctx.get("top").unwrap();
        assert!(m.get_var("a").is_none());
        assert!(m.get_var("b").is_none());
        assert!(m.get_var("c").is_some());
        assert!(m.get_var("d").is_some());
    }

    #[test]
    fn keeps_ports_and_params() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        m.port_in("unused_in", 1).unwrap();
        m.parameter("P", 4, 3).unwrap();
        RemoveUnusedVars::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        let m = ctx.get("top").unwrap();
        assert!(m.get_var("unused_in").is_some());
        assert!(m.get_var("P").is_some());
    }

    #[test]
    fn keeps_predicate_operands() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let a = m.var("a", 1).unwrap();
        let b = m.var("b", 1).unwrap();
        let c = m.var("c", 1).unwrap();
        let d = m.var("d", 1).unwrap();
        let pred = m.eq(a, b).unwrap();
        let if_ = m.if_stmt(pred).unwrap();
        let s = m.assign(c, d).unwrap();
        m.add_then_stmt(if_, s).unwrap();
        m.add_stmt(if_).unwrap();
        RemoveUnusedVars::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        let m = ctx.get("top").unwrap();
        assert!(m.get_var("a").is_some());
        assert!(m.get_var("b").is_some());
    }
}
