use crate::analysis::canonical_signature;
use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::post_order;
use kratos_ir as ir;
use kratos_utils::{Error, Id, NameGenerator};
use std::collections::HashMap;

/// Merge structurally identical generator definitions: within each
/// structural-hash group, definitions with equal detailed structure are
/// collapsed onto one surviving definition and every instantiation site
/// is retargeted. Hash collisions are resolved by structural equality,
/// never by hash alone.
#[derive(Default)]
pub struct UniquifyGenerators;

impl Named for UniquifyGenerators {
    fn name() -> &'static str {
        "uniquify_generators"
    }

    fn description() -> &'static str {
        "collapses structurally identical generator definitions"
    }
}

impl Transform for UniquifyGenerators {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        let order = post_order(ctx, root)?;
        // signature of every merged-away definition maps to its keeper;
        // children are processed first, so parent signatures already see
        // retargeted child names
        let mut keeper_by_sig: HashMap<(u64, String), Id> = HashMap::new();
        for name in order {
            if name == root {
                continue;
            }
            let Some(gen) = ctx.get(name) else { continue };
            let hash = gen.structural_hash().ok_or_else(|| {
                Error::misc(format!(
                    "`{name}' has no structural hash; hash_generators \
                     must run first"
                ))
            })?;
            let signature =
                canonical_signature(gen, &|target| target.to_string());
            match keeper_by_sig.get(&(hash, signature.clone())) {
                Some(&keeper) => {
                    retarget(ctx, name, keeper);
                    ctx.remove(name);
                    log::debug!("merged `{name}' into `{keeper}'");
                }
                None => {
                    keeper_by_sig.insert((hash, signature), name);
                }
            }
        }
        Ok(())
    }
}

/// Point every instantiation of `from` at `to`.
fn retarget(ctx: &mut ir::Context, from: Id, to: Id) {
    for name in ctx.names() {
        let Some(gen) = ctx.get_mut(name) else { continue };
        for child in &mut gen.children {
            if child.target == from {
                child.target = to;
            }
        }
    }
}

/// Give every instantiation site a distinct instance name within its
/// parent (base name plus counter), so emitted instance identifiers
/// never collide.
#[derive(Default)]
pub struct UniquifyModuleInstances;

impl Named for UniquifyModuleInstances {
    fn name() -> &'static str {
        "uniquify_module_instances"
    }

    fn description() -> &'static str {
        "assigns distinct instance names within each parent"
    }
}

impl Transform for UniquifyModuleInstances {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        for name in post_order(ctx, root)? {
            let Some(gen) = ctx.get_mut(name) else { continue };
            let mut namegen = NameGenerator::default();
            for i in 0..gen.children.len() {
                let base = gen.children[i].instance_name;
                gen.children[i].instance_name = namegen.gen_name(base);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::HashGenerators;
    use kratos_ir::Context;

    fn clone_pair() -> Context {
        let mut ctx = Context::new();
        for name in ["leaf_a", "leaf_b"] {
            let m = ctx.generator(name);
            let a = m.port_in("a", 4).unwrap();
            let f = m.port_out("f", 4).unwrap();
            let s = m.assign(f, a).unwrap();
            m.add_stmt(s).unwrap();
        }
        let top = ctx.generator("top");
        let a = top.port_in("a", 4).unwrap();
        let f = top.port_out("f", 4).unwrap();
        let w = top.var("w", 4).unwrap();
        let i0 = top.add_child("leaf_a", "inst");
        let i1 = top.add_child("leaf_b", "inst");
        top.wire(i0, "a", a).unwrap();
        top.wire(i0, "f", w).unwrap();
        top.wire(i1, "a", w).unwrap();
        top.wire(i1, "f", f).unwrap();
        ctx
    }

    #[test]
    fn merges_identical_definitions() {
        let mut ctx = clone_pair();
        HashGenerators::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        UniquifyGenerators::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        // one of the two leaves survives and both sites point at it
        let survivors =
            ["leaf_a", "leaf_b"].iter().filter(|&&n| ctx.contains(n));
        assert_eq!(survivors.count(), 1);
        let top = ctx.get("top").unwrap();
        assert_eq!(top.children[0].target, top.children[1].target);
    }

    #[test]
    fn distinct_instance_names() {
        let mut ctx = clone_pair();
        UniquifyModuleInstances::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        let top = ctx.get("top").unwrap();
        assert_ne!(
            top.children[0].instance_name,
            top.children[1].instance_name
        );
        assert_eq!(top.children[0].instance_name, Id::from("inst"));
        assert_eq!(top.children[1].instance_name, Id::from("inst_0"));
    }

    #[test]
    fn requires_hashes() {
        let mut ctx = clone_pair();
        assert!(UniquifyGenerators::default()
            .run(&mut ctx, Id::from("top"))
            .is_err());
    }
}
