//! Read-only analyses shared between passes.
use itertools::Itertools;
use kratos_ir::{Endpoint, Generator, StmtIdx, StmtKind, VarIdx, VarKind};
use kratos_utils::Id;
use std::collections::HashSet;
use std::fmt::Write as _;

/// Vars referenced directly by statements (including detached ones) and
/// child-instance connections.
pub fn structural_refs(gen: &Generator) -> HashSet<VarIdx> {
    let mut refs = HashSet::new();
    for s in gen.stmt_indices() {
        match gen.stmt(s).kind() {
            StmtKind::Assign(a) => {
                refs.insert(a.left);
                refs.insert(a.right);
            }
            StmtKind::Block { sensitivity, .. } => {
                refs.extend(sensitivity.iter().map(|&(_, v)| v));
            }
            StmtKind::If { predicate, .. } => {
                refs.insert(*predicate);
            }
            StmtKind::Switch { target, cases } => {
                refs.insert(*target);
                refs.extend(cases.iter().filter_map(|c| c.value));
            }
            StmtKind::ModuleInstantiation(m) => {
                refs.extend(m.port_mapping.iter().map(|&(_, v)| v));
            }
        }
    }
    for child in &gen.children {
        for (_, ep) in child.connections.iter() {
            if let &Endpoint::Var(v) = ep {
                refs.insert(v);
            }
        }
    }
    refs
}

/// [`structural_refs`] expanded through derived-vertex components:
/// a referenced expression keeps its operands alive, a slice its base,
/// a concatenation its parts.
pub fn used_vars(gen: &Generator) -> HashSet<VarIdx> {
    let mut used = structural_refs(gen);
    let mut stack: Vec<VarIdx> = used.iter().copied().collect();
    while let Some(v) = stack.pop() {
        let components: Vec<VarIdx> = match gen.var_data(v).kind() {
            &VarKind::Expression { left, right, .. } => {
                std::iter::once(left).chain(right).collect()
            }
            &VarKind::Slice { parent, .. }
            | &VarKind::Casted { parent, .. } => vec![parent],
            VarKind::Concat { parts } => parts.clone(),
            _ => vec![],
        };
        for component in components {
            if used.insert(component) {
                stack.push(component);
            }
        }
    }
    used
}

/// Canonical structural rendering of a generator: interface, declared
/// state, statements, and child instantiations, independent of the
/// definition name. `child_token` supplies the identity written for a
/// child target, so callers can choose between hash-based and name-based
/// child identities. Equal output means equal structure.
pub fn canonical_signature(
    gen: &Generator,
    child_token: &dyn Fn(Id) -> String,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "external:{}", gen.external);
    for name in gen.port_names() {
        let Some(idx) = gen.get_var(name) else { continue };
        let data = gen.var_data(idx);
        let _ = writeln!(
            out,
            "port:{name}:{:?}:{}:{}:{:?}",
            data.port_direction(),
            data.width,
            data.is_signed,
            data.port_type()
        );
    }
    for (name, idx) in gen.params() {
        let data = gen.var_data(idx);
        let _ = writeln!(
            out,
            "param:{name}:{}:{:?}",
            data.width,
            data.param_value()
        );
    }
    for (name, idx) in gen.named_vars() {
        let data = gen.var_data(idx);
        if data.is_base() {
            let _ = writeln!(
                out,
                "var:{name}:{}:{}",
                data.width, data.is_signed
            );
        }
    }
    for &s in gen.body() {
        write_stmt(gen, s, &mut out);
    }
    for child in &gen.children {
        let _ = writeln!(
            out,
            "child:{}:{}",
            child_token(child.target),
            child.instance_name
        );
        for (port, ep) in child
            .connections
            .iter()
            .sorted_by_key(|(port, _)| **port)
        {
            let ep = match ep {
                &Endpoint::Var(v) => gen.var_str(v).to_string(),
                Endpoint::ChildPort { instance, port } => {
                    format!("child#{instance}.{port}")
                }
            };
            let _ = writeln!(out, " conn:{port}:{ep}");
        }
        for (param, value) in
            child.params.iter().sorted_by_key(|(param, _)| **param)
        {
            let _ = writeln!(out, " override:{param}:{value}");
        }
    }
    out
}

fn write_stmt(gen: &Generator, s: StmtIdx, out: &mut String) {
    match gen.stmt(s).kind() {
        StmtKind::Assign(a) => {
            let _ = writeln!(
                out,
                "assign:{}:{:?}:{}",
                gen.var_str(a.left),
                a.assign_type,
                gen.var_str(a.right)
            );
        }
        StmtKind::Block {
            block_type,
            sensitivity,
            body,
        } => {
            let _ = writeln!(out, "block:{block_type:?}");
            for &(edge, var) in sensitivity {
                let _ =
                    writeln!(out, " sens:{:?}:{}", edge, gen.var_str(var));
            }
            let _ = writeln!(out, "{{");
            for &child in body {
                write_stmt(gen, child, out);
            }
            let _ = writeln!(out, "}}");
        }
        StmtKind::If {
            predicate,
            then_body,
            else_body,
        } => {
            let _ = writeln!(out, "if:{}", gen.var_str(*predicate));
            let _ = writeln!(out, "{{");
            for &child in then_body {
                write_stmt(gen, child, out);
            }
            let _ = writeln!(out, "}}{{");
            for &child in else_body {
                write_stmt(gen, child, out);
            }
            let _ = writeln!(out, "}}");
        }
        StmtKind::Switch { target, cases } => {
            let _ = writeln!(out, "switch:{}", gen.var_str(*target));
            for case in cases {
                let label = match case.value {
                    Some(v) => gen.var_str(v).to_string(),
                    None => "default".to_string(),
                };
                let _ = writeln!(out, "case:{label}");
                let _ = writeln!(out, "{{");
                for &child in &case.body {
                    write_stmt(gen, child, out);
                }
                let _ = writeln!(out, "}}");
            }
        }
        StmtKind::ModuleInstantiation(m) => {
            let _ = writeln!(out, "inst:{}:{}", m.target, m.instance_name);
            for (port, var) in &m.port_mapping {
                let _ = writeln!(out, " map:{port}:{}", gen.var_str(*var));
            }
            for (param, value) in &m.params {
                let _ = writeln!(out, " p:{param}:{value}");
            }
        }
    }
}
