use crate::analysis::canonical_signature;
use crate::pass_manager::{Named, PassResult, Transform};
use crate::traversal::{depth_levels, post_order};
use kratos_ir as ir;
use kratos_utils::{Error, Id};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::Hasher;

/// How the structural hashes of a hierarchy are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashStrategy {
    /// Single-threaded deterministic walk, children before parents.
    #[default]
    Sequential,
    /// Generators at the same hierarchy depth are hashed concurrently;
    /// results are combined bottom-up. Produces the same hashes as
    /// [`HashStrategy::Sequential`].
    Parallel,
}

/// Compute a structural hash for every generator reachable from the
/// root. The hash covers the interface, declared state, statements, and
/// child instantiations (by child hash), but not the definition name, so
/// structurally identical generators collide on purpose.
pub struct HashGenerators {
    strategy: HashStrategy,
}

impl Default for HashGenerators {
    fn default() -> Self {
        Self::with_strategy(HashStrategy::Sequential)
    }
}

impl HashGenerators {
    pub fn with_strategy(strategy: HashStrategy) -> Self {
        Self { strategy }
    }
}

impl Named for HashGenerators {
    fn name() -> &'static str {
        "hash_generators"
    }

    fn description() -> &'static str {
        "computes structural hashes over the generator hierarchy"
    }
}

impl Transform for HashGenerators {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()> {
        let hashes = match self.strategy {
            HashStrategy::Sequential => sequential(ctx, root)?,
            HashStrategy::Parallel => parallel(ctx, root)?,
        };
        for (name, hash) in hashes {
            if let Some(gen) = ctx.get_mut(name) {
                gen.set_structural_hash(hash);
            }
        }
        Ok(())
    }
}

fn hash_one(
    gen: &ir::Generator,
    hashes: &HashMap<Id, u64>,
) -> u64 {
    let signature = canonical_signature(gen, &|target| {
        // children are hashed before their parents
        match hashes.get(&target) {
            Some(hash) => format!("{hash:016x}"),
            None => unreachable!(
                "child `{target}' hashed after its parent"
            ),
        }
    });
    let mut hasher = DefaultHasher::new();
    hasher.write(signature.as_bytes());
    hasher.finish()
}

fn sequential(
    ctx: &ir::Context,
    root: Id,
) -> PassResult<HashMap<Id, u64>> {
    let mut hashes = HashMap::new();
    for name in post_order(ctx, root)? {
        let Some(gen) = ctx.get(name) else { continue };
        let hash = hash_one(gen, &hashes);
        hashes.insert(name, hash);
    }
    Ok(hashes)
}

fn parallel(ctx: &ir::Context, root: Id) -> PassResult<HashMap<Id, u64>> {
    let mut hashes: HashMap<Id, u64> = HashMap::new();
    for level in depth_levels(ctx, root)? {
        // members of one level never instantiate each other, so they
        // can be hashed from shared references
        let results: Vec<(Id, u64)> = {
            let hashes = &hashes;
            let ctx = &*ctx;
            std::thread::scope(|scope| {
                let handles: Vec<_> = level
                    .iter()
                    .map(|&name| {
                        scope.spawn(move || {
                            let Some(gen) = ctx.get(name) else {
                                unreachable!(
                                    "level member `{name}' disappeared"
                                )
                            };
                            (name, hash_one(gen, hashes))
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join())
                    .collect::<Result<Vec<_>, _>>()
            })
            .map_err(|_| Error::misc("hash worker panicked"))?
        };
        hashes.extend(results);
    }
    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratos_ir::Context;

    fn build(ctx: &mut Context, name: &str) {
        let m = ctx.generator(name);
        let a = m.port_in("a", 4).unwrap();
        let f = m.port_out("f", 4).unwrap();
        let s = m.assign(f, a).unwrap();
        m.add_stmt(s).unwrap();
    }

    fn hierarchy() -> Context {
        let mut ctx = Context::new();
        build(&mut ctx, "leaf_a");
        build(&mut ctx, "leaf_b");
        let top = ctx.generator("top");
        let a = top.port_in("a", 4).unwrap();
        let f = top.port_out("f", 4).unwrap();
        let w = top.var("w", 4).unwrap();
        let i0 = top.add_child("leaf_a", "l0");
        let i1 = top.add_child("leaf_b", "l1");
        top.wire(i0, "a", a).unwrap();
        top.wire(i0, "f", w).unwrap();
        top.wire(i1, "a", w).unwrap();
        top.wire(i1, "f", f).unwrap();
        ctx
    }

    #[test]
    fn identical_structure_same_hash() {
        let mut ctx = hierarchy();
        HashGenerators::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        let ha = ctx.get("leaf_a").unwrap().structural_hash().unwrap();
        let hb = ctx.get("leaf_b").unwrap().structural_hash().unwrap();
        assert_eq!(ha, hb);
        let ht = ctx.get("top").unwrap().structural_hash().unwrap();
        assert_ne!(ha, ht);
    }

    #[test]
    fn strategies_agree() {
        let mut seq_ctx = hierarchy();
        HashGenerators::with_strategy(HashStrategy::Sequential)
            .run(&mut seq_ctx, Id::from("top"))
            .unwrap();
        let mut par_ctx = hierarchy();
        HashGenerators::with_strategy(HashStrategy::Parallel)
            .run(&mut par_ctx, Id::from("top"))
            .unwrap();
        for name in ["leaf_a", "leaf_b", "top"] {
            assert_eq!(
                seq_ctx.get(name).unwrap().structural_hash(),
                par_ctx.get(name).unwrap().structural_hash()
            );
        }
    }

    #[test]
    fn different_structure_different_hash() {
        let mut ctx = Context::new();
        build(&mut ctx, "leaf_a");
        let m = ctx.generator("leaf_c");
        let a = m.port_in("a", 8).unwrap();
        let f = m.port_out("f", 8).unwrap();
        let s = m.assign(f, a).unwrap();
        m.add_stmt(s).unwrap();
        let top = ctx.generator("top");
        top.add_child("leaf_a", "l0");
        top.add_child("leaf_c", "l1");
        HashGenerators::default()
            .run(&mut ctx, Id::from("top"))
            .unwrap();
        assert_ne!(
            ctx.get("leaf_a").unwrap().structural_hash(),
            ctx.get("leaf_c").unwrap().structural_hash()
        );
    }
}
