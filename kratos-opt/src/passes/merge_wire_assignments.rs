use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir::{self as ir, AssignType, StmtIdx, VarIdx, VarKind};
use kratos_utils::Id;
use linked_hash_map::LinkedHashMap;

/// One slice-to-slice assignment, with its left and right windows.
struct Piece {
    stmt: StmtIdx,
    left: (u32, u32),
    right: (u32, u32),
}

/// Fuse groups of continuous assignments that copy matching,
/// non-overlapping slices of one source var into slices of one
/// destination var covering its full width:
///
/// ```text
/// assign d[1:0] = c[1:0];
/// assign d[3:2] = c[3:2];
/// ```
///
/// becomes `assign d = c;`.
#[derive(Default)]
pub struct MergeWireAssignments;

impl Named for MergeWireAssignments {
    fn name() -> &'static str {
        "merge_wire_assignments"
    }

    fn description() -> &'static str {
        "fuses full-width groups of slice-to-slice assignments"
    }
}

impl Transform for MergeWireAssignments {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(gen) = ctx.get_mut(name) else { continue };
            // group top-level slice assignments by (dst, src, flavor)
            let mut groups: LinkedHashMap<
                (VarIdx, VarIdx, AssignType),
                Vec<Piece>,
            > = LinkedHashMap::new();
            for &stmt in gen.body() {
                let Some(a) = gen.stmt(stmt).as_assign() else { continue };
                let &VarKind::Slice {
                    parent: dst,
                    high: lh,
                    low: ll,
                } = gen.var_data(a.left).kind()
                else {
                    continue;
                };
                let &VarKind::Slice {
                    parent: src,
                    high: rh,
                    low: rl,
                } = gen.var_data(a.right).kind()
                else {
                    continue;
                };
                groups
                    .entry((dst, src, a.assign_type))
                    .or_insert_with(Vec::new)
                    .push(Piece {
                        stmt,
                        left: (lh, ll),
                        right: (rh, rl),
                    });
            }
            for ((dst, src, assign_type), mut pieces) in groups {
                if !mergeable(gen, dst, src, &mut pieces) {
                    continue;
                }
                let position = gen
                    .body()
                    .iter()
                    .position(|s| pieces.iter().any(|p| p.stmt == *s))
                    .unwrap_or(gen.body().len());
                for piece in &pieces {
                    gen.remove_stmt(piece.stmt);
                }
                let merged = gen.assign_typed(dst, src, assign_type)?;
                gen.insert_stmt(position, merged)?;
                log::debug!(
                    "merged {} slice assignments into `{}' <- `{}'",
                    pieces.len(),
                    gen.var_str(dst),
                    gen.var_str(src)
                );
            }
        }
        Ok(())
    }
}

/// The pieces must pair identical windows on both sides and partition
/// `[0, width)` of a destination whose shape matches the source.
fn mergeable(
    gen: &ir::Generator,
    dst: VarIdx,
    src: VarIdx,
    pieces: &mut [Piece],
) -> bool {
    if pieces.len() < 2 {
        return false;
    }
    let (dw, ds) = (gen.var_data(dst).width, gen.var_data(dst).is_signed);
    let (sw, ss) = (gen.var_data(src).width, gen.var_data(src).is_signed);
    if dw != sw || ds != ss {
        return false;
    }
    pieces.sort_by_key(|p| p.left.1);
    let mut next = 0;
    for piece in pieces.iter() {
        if piece.left != piece.right {
            return false;
        }
        let (high, low) = piece.left;
        if low != next {
            return false;
        }
        next = high + 1;
    }
    next == dw
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratos_ir::Context;

    #[test]
    fn merges_full_cover() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let c = m.port_in("c", 4).unwrap();
        let d = m.port_out("d", 4).unwrap();
        let d_lo = m.slice(d, 1, 0).unwrap();
        let d_hi = m.slice(d, 3, 2).unwrap();
        let c_lo = m.slice(c, 1, 0).unwrap();
        let c_hi = m.slice(c, 3, 2).unwrap();
        for s in [
            m.assign_typed(d_lo, c_lo, AssignType::Blocking).unwrap(),
            m.assign_typed(d_hi, c_hi, AssignType::Blocking).unwrap(),
        ] {
            m.add_stmt(s).unwrap();
        }
        MergeWireAssignments::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        let m = ctx.get("top").unwrap();
        assert_eq!(m.stmts_count(), 1);
        let a = m.stmt(m.get_stmt(0).unwrap()).as_assign().unwrap();
        assert_eq!(a.left, d);
        assert_eq!(a.right, c);
    }

    #[test]
    fn partial_cover_is_kept() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let c = m.port_in("c", 4).unwrap();
        let d = m.port_out("d", 4).unwrap();
        let d_lo = m.slice(d, 1, 0).unwrap();
        let c_lo = m.slice(c, 1, 0).unwrap();
        let d_top = m.slice(d, 3, 3).unwrap();
        let c_top = m.slice(c, 3, 3).unwrap();
        for s in [
            m.assign_typed(d_lo, c_lo, AssignType::Blocking).unwrap(),
            m.assign_typed(d_top, c_top, AssignType::Blocking).unwrap(),
        ] {
            m.add_stmt(s).unwrap();
        }
        MergeWireAssignments::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        // bit 2 is missing, nothing merges
        assert_eq!(ctx.get("top").unwrap().stmts_count(), 2);
    }

    #[test]
    fn mismatched_windows_are_kept() {
        let mut ctx = Context::new();
        let m = ctx.generator("top");
        let c = m.port_in("c", 4).unwrap();
        let d = m.port_out("d", 4).unwrap();
        let d_lo = m.slice(d, 1, 0).unwrap();
        let d_hi = m.slice(d, 3, 2).unwrap();
        let c_lo = m.slice(c, 1, 0).unwrap();
        let c_hi = m.slice(c, 3, 2).unwrap();
        for s in [
            // crossed windows
            m.assign_typed(d_lo, c_hi, AssignType::Blocking).unwrap(),
            m.assign_typed(d_hi, c_lo, AssignType::Blocking).unwrap(),
        ] {
            m.add_stmt(s).unwrap();
        }
        MergeWireAssignments::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        assert_eq!(ctx.get("top").unwrap().stmts_count(), 2);
    }
}
