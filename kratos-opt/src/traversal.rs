//! Hierarchy traversal helpers shared by the passes.
use kratos_ir as ir;
use kratos_utils::{Error, Id, KratosResult};
use std::collections::{HashMap, HashSet};

/// Generators reachable from `root`, children before parents, each name
/// exactly once. Fails on a missing child target or an instantiation
/// cycle.
pub fn post_order(ctx: &ir::Context, root: Id) -> KratosResult<Vec<Id>> {
    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    let mut order = vec![];
    visit(ctx, root, &mut visiting, &mut visited, &mut order)?;
    Ok(order)
}

fn visit(
    ctx: &ir::Context,
    name: Id,
    visiting: &mut HashSet<Id>,
    visited: &mut HashSet<Id>,
    order: &mut Vec<Id>,
) -> KratosResult<()> {
    if visited.contains(&name) {
        return Ok(());
    }
    if !visiting.insert(name) {
        return Err(Error::malformed_structure(format!(
            "generator hierarchy contains a cycle through `{name}'"
        )));
    }
    let gen = ctx.get(name).ok_or_else(|| {
        Error::lookup_failure(format!("no generator named `{name}'"))
    })?;
    let targets: Vec<Id> = gen.children.iter().map(|c| c.target).collect();
    for target in targets {
        visit(ctx, target, visiting, visited, order)?;
    }
    visiting.remove(&name);
    visited.insert(name);
    order.push(name);
    Ok(())
}

/// Partition the hierarchy into depth levels: level 0 holds the leaves,
/// and every generator sits one level above its deepest child. Members
/// of one level never instantiate each other, so they can be processed
/// concurrently.
pub fn depth_levels(
    ctx: &ir::Context,
    root: Id,
) -> KratosResult<Vec<Vec<Id>>> {
    let order = post_order(ctx, root)?;
    let mut depth: HashMap<Id, usize> = HashMap::new();
    let mut levels: Vec<Vec<Id>> = vec![];
    for name in order {
        let gen = ctx.get(name).ok_or_else(|| {
            Error::lookup_failure(format!("no generator named `{name}'"))
        })?;
        let d = gen
            .children
            .iter()
            .map(|c| depth[&c.target] + 1)
            .max()
            .unwrap_or(0);
        depth.insert(name, d);
        if levels.len() <= d {
            levels.resize_with(d + 1, Vec::new);
        }
        levels[d].push(name);
    }
    Ok(levels)
}
