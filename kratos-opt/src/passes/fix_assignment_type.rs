use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{
    self as ir, AssignType, BlockType, Generator, StmtIdx, StmtKind,
};
use kratos_utils::Id;

/// The surrounding assignment context of a statement.
#[derive(Clone, Copy)]
enum Scope {
    Top,
    Sequential,
    Combinational,
}

/// Reclassify every `Undefined` assignment based on its enclosing
/// context: module scope and combinational blocks take blocking
/// assignments, sequential blocks take non-blocking ones.
#[derive(Default)]
pub struct FixAssignmentType;

impl Named for FixAssignmentType {
    fn name() -> &'static str {
        "fix_assignment_type"
    }

    fn description() -> &'static str {
        "resolves undefined assignment flavors from their context"
    }
}

impl Transform for FixAssignmentType {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(gen) = ctx.get_mut(name) else { continue };
            for stmt in gen.body().to_vec() {
                fix(gen, stmt, Scope::Top);
            }
        }
        Ok(())
    }
}

fn fix(gen: &mut Generator, stmt: StmtIdx, scope: Scope) {
    enum Walk {
        Assign(AssignType),
        Children(Vec<StmtIdx>, Scope),
    }
    let walk = match gen.stmt(stmt).kind() {
        StmtKind::Assign(a) => Walk::Assign(a.assign_type),
        StmtKind::Block {
            block_type, body, ..
        } => {
            let scope = match block_type {
                BlockType::Sequential => Scope::Sequential,
                BlockType::Combinational => Scope::Combinational,
            };
            Walk::Children(body.clone(), scope)
        }
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => Walk::Children(
            then_body.iter().chain(else_body).copied().collect(),
            scope,
        ),
        StmtKind::Switch { cases, .. } => Walk::Children(
            cases.iter().flat_map(|c| c.body.iter().copied()).collect(),
            scope,
        ),
        StmtKind::ModuleInstantiation(_) => return,
    };
    match walk {
        Walk::Assign(AssignType::Undefined) => {
            let fixed = match scope {
                Scope::Sequential => AssignType::NonBlocking,
                Scope::Top | Scope::Combinational => AssignType::Blocking,
            };
            gen.set_assign_type(stmt, fixed);
        }
        Walk::Assign(_) => {}
        Walk::Children(children, scope) => {
            for child in children {
                fix(gen, child, scope);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratos_ir::Context;

    #[test]
    fn resolves_by_context() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let a = m.var("a", 1).unwrap();
        let b = m.var("b", 1).unwrap();
        let q = m.var("q", 1).unwrap();
        let d = m.var("d", 1).unwrap();
        let clk = m.clock("clk").unwrap();

        let top_assign = m.assign(a, b).unwrap();
        m.add_stmt(top_assign).unwrap();

        let seq = m.sequential_block();
        m.add_condition(seq, ir::EdgeType::Posedge, clk).unwrap();
        let seq_assign = m.assign(q, d).unwrap();
        m.add_block_stmt(seq, seq_assign).unwrap();
        m.add_stmt(seq).unwrap();

        let comb = m.combinational_block();
        let comb_assign = m.assign(b, a).unwrap();
        m.add_block_stmt(comb, comb_assign).unwrap();
        m.add_stmt(comb).unwrap();

        FixAssignmentType::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();

        let m = ctx.get("top").unwrap();
        let ty = |s| m.stmt(s).as_assign().unwrap().assign_type;
        assert_eq!(ty(top_assign), AssignType::Blocking);
        assert_eq!(ty(seq_assign), AssignType::NonBlocking);
        assert_eq!(ty(comb_assign), AssignType::Blocking);
    }
}
