use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{self as ir, AssignType};
use kratos_utils::{Error, Id};

/// Reject designs where a single var is driven by both blocking and
/// non-blocking assignments. Drivers through slices and casts count
/// against the underlying var.
#[derive(Default)]
pub struct CheckMixedAssignment;

impl Named for CheckMixedAssignment {
    fn name() -> &'static str {
        "check_mixed_assignment"
    }

    fn description() -> &'static str {
        "rejects vars driven by both blocking and non-blocking assignments"
    }
}

impl Transform for CheckMixedAssignment {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(gen) = ctx.get(name) else { continue };
            for var in gen.var_indices() {
                let data = gen.var_data(var);
                let mut blocking = false;
                let mut non_blocking = false;
                for &stmt in data.sources() {
                    let Some(a) = gen.stmt(stmt).as_assign() else {
                        continue;
                    };
                    match a.assign_type {
                        AssignType::Blocking => blocking = true,
                        AssignType::NonBlocking => non_blocking = true,
                        AssignType::Undefined => {}
                    }
                }
                if blocking && non_blocking {
                    return Err(Error::mixed_assignment(format!(
                        "`{}.{}' is driven by both blocking and \
                         non-blocking assignments",
                        name,
                        gen.var_str(var)
                    ))
                    .with_locs(data.locs.iter().cloned()));
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
    fn detects_mixed_drivers() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let x = m.var("x", 2).unwrap();
        let a = m.var("a", 2).unwrap();
        let b = m.var("b", 2).unwrap();
        let s1 = m.assign_typed(x, a, AssignType::Blocking).unwrap();
        let s2 = m.assign_typed(x, b, AssignType::NonBlocking).unwrap();
        m.add_stmt(s1).unwrap();
        m.add_stmt(s2).unwrap();
        let err = CheckMixedAssignment::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            kratos_utils::ErrorKind::MixedAssignment(_)
        ));
    }

    #[test]
    fn slice_drivers_count_against_the_base() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let x = m.var("x", 4).unwrap();
        let a = m.var("a", 2).unwrap();
        let b = m.var("b", 2).unwrap();
        let lo = m.slice(x, 1, 0).unwrap();
        let hi = m.slice(x, 3, 2).unwrap();
        let s1 = m.assign_typed(lo, a, AssignType::Blocking).unwrap();
        let s2 = m.assign_typed(hi, b, AssignType::NonBlocking).unwrap();
        m.add_stmt(s1).unwrap();
        m.add_stmt(s2).unwrap();
        assert!(CheckMixedAssignment::default()
            .run(&mut ctx, Id::from("top"))
            .is_err());
    }

    #[test]
    fn uniform_drivers_pass() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let x = m.var("x", 2).unwrap();
        let a = m.var("a", 2).unwrap();
        let b = m.var("b", 2).unwrap();
        let s1 = m.assign_typed(x, a, AssignType::Blocking).unwrap();
        let s2 = m.assign_typed(x, b, AssignType::Blocking).unwrap();
        m.add_stmt(s1).unwrap();
        m.add_stmt(s2).unwrap();
        assert!(CheckMixedAssignment::default()
            .run(&mut ctx, Id::from("top"))
            .is_ok());
    }
}
