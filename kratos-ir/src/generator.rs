//! The [`Generator`]: a named hardware module owning its ports, vars,
//! parameters, statements, and child-instance records.
use crate::context::{ConstKey, ConstPool};
use crate::idx::{StmtIdx, VarIdx};
use crate::stmt::StmtData;
use crate::var::{
    ExprOp, PortDirection, PortType, VarData, VarKind,
};
use itertools::Itertools;
use kratos_utils::{Error, GetName, Id, KratosResult, NameGenerator, SourceLoc};
use linked_hash_map::LinkedHashMap;
use std::collections::HashMap;

/// Where a child-instance port connection terminates on the parent side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// A value vertex in the parent generator.
    Var(VarIdx),
    /// A port of a sibling instance. Decoupled into an intermediate wire
    /// before instantiation statements are materialized.
    ChildPort { instance: usize, port: Id },
}

/// An instantiation site of a child generator, with the connectivity
/// recorded by the host. `create_module_instantiation` turns this record
/// into a statement.
#[derive(Debug, Clone)]
pub struct ChildInstance {
    /// Name of the target generator definition in the context.
    pub target: Id,
    /// Instance identifier, uniquified before emission.
    pub instance_name: Id,
    /// Internal port name → parent-side endpoint.
    pub connections: LinkedHashMap<Id, Endpoint>,
    /// Per-instance parameter overrides.
    pub params: LinkedHashMap<Id, i64>,
}

/// In-memory representation of a hardware module.
#[derive(Debug, Clone)]
pub struct Generator {
    /// Definition name, unique within the context.
    pub name: Id,
    /// Instance identifier used when this module is instantiated.
    pub instance_name: Id,
    /// External modules are consumed but never emitted.
    pub external: bool,
    /// When set, emission stamps produced line numbers onto IR nodes.
    pub debug: bool,
    pub(crate) vars: Vec<Option<VarData>>,
    pub(crate) names: LinkedHashMap<Id, VarIdx>,
    pub(crate) exprs: HashMap<(ExprOp, VarIdx, Option<VarIdx>), VarIdx>,
    /// Local vertex per shape interned in the context's shared pool.
    pub(crate) consts: HashMap<ConstKey, VarIdx>,
    /// Handle to the owning context's constant pool.
    pub(crate) pool: ConstPool,
    pub(crate) stmts: Vec<Option<StmtData>>,
    pub(crate) body: Vec<StmtIdx>,
    /// Instantiation sites of child generators, in creation order.
    pub children: Vec<ChildInstance>,
    hash: Option<u64>,
}

impl GetName for Generator {
    fn name(&self) -> Id {
        self.name
    }
}

impl Generator {
    pub(crate) fn new(name: Id, pool: ConstPool) -> Self {
        Self {
            name,
            instance_name: name,
            external: false,
            debug: false,
            vars: vec![],
            names: LinkedHashMap::new(),
            exprs: HashMap::new(),
            consts: HashMap::new(),
            pool,
            stmts: vec![],
            body: vec![],
            children: vec![],
            hash: None,
        }
    }

    /* ============================ arenas ============================= */

    pub(crate) fn alloc_var(&mut self, data: VarData) -> VarIdx {
        let idx = VarIdx::new(self.vars.len());
        self.vars.push(Some(data));
        idx
    }

    /// Read a value vertex. Panics on a handle that was deleted or that
    /// belongs to a different generator's arena.
    pub fn var_data(&self, idx: VarIdx) -> &VarData {
        self.vars[idx.index()].as_ref().unwrap_or_else(|| {
            unreachable!("var handle {idx} points to a deleted vertex")
        })
    }

    pub fn var_data_mut(&mut self, idx: VarIdx) -> &mut VarData {
        self.vars[idx.index()].as_mut().unwrap_or_else(|| {
            unreachable!("var handle {idx} points to a deleted vertex")
        })
    }

    /// Live value handles, in allocation order.
    pub fn var_indices(&self) -> impl Iterator<Item = VarIdx> + '_ {
        self.vars.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|_| VarIdx::new(i))
        })
    }

    /// Live statement handles, in allocation order.
    pub fn stmt_indices(&self) -> impl Iterator<Item = StmtIdx> + '_ {
        self.stmts.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|_| StmtIdx::new(i))
        })
    }

    /// Delete a value vertex from the arena and every index that refers
    /// to it. The caller is responsible for making sure nothing still
    /// consumes the handle.
    pub fn delete_var(&mut self, idx: VarIdx) {
        let Some(data) = self.vars[idx.index()].take() else {
            return;
        };
        match data.kind() {
            VarKind::Base | VarKind::Port { .. } | VarKind::Parameter { .. } => {
                if self.names.get(&data.name) == Some(&idx) {
                    self.names.remove(&data.name);
                }
            }
            &VarKind::ConstValue { value } => {
                self.consts.remove(&ConstKey {
                    value,
                    width: data.width,
                    is_signed: data.is_signed,
                });
            }
            &VarKind::Expression { op, left, right } => {
                self.exprs.remove(&(op, left, right));
            }
            &VarKind::Slice {
                parent, high, low, ..
            } => {
                if let Some(p) = self.vars[parent.index()].as_mut() {
                    p.slices.remove(&(high, low));
                }
            }
            &VarKind::Casted { parent, cast } => {
                if let Some(p) = self.vars[parent.index()].as_mut() {
                    p.casts.remove(&cast);
                }
            }
            VarKind::Concat { .. } => {}
        }
    }

    /* ======================== named factories ======================== */

    fn check_name(&self, name: Id) -> KratosResult<()> {
        if self.names.contains_key(&name) {
            return Err(Error::name_collision(format!(
                "`{name}' already exists in generator `{}'",
                self.name
            )));
        }
        Ok(())
    }

    fn named_var(
        &mut self,
        name: Id,
        width: u32,
        is_signed: bool,
        kind: VarKind,
    ) -> KratosResult<VarIdx> {
        if width == 0 {
            return Err(Error::malformed_structure(format!(
                "`{name}' must be at least one bit wide"
            )));
        }
        self.check_name(name)?;
        let idx = self.alloc_var(VarData::new(name, width, is_signed, kind));
        self.names.insert(name, idx);
        Ok(idx)
    }

    /// Declare a register/wire.
    pub fn var<S: Into<Id>>(
        &mut self,
        name: S,
        width: u32,
    ) -> KratosResult<VarIdx> {
        self.named_var(name.into(), width, false, VarKind::Base)
    }

    /// Declare a signed register/wire.
    pub fn var_signed<S: Into<Id>>(
        &mut self,
        name: S,
        width: u32,
    ) -> KratosResult<VarIdx> {
        self.named_var(name.into(), width, true, VarKind::Base)
    }

    /// Declare a port with an explicit type and signedness.
    pub fn port_with<S: Into<Id>>(
        &mut self,
        direction: PortDirection,
        name: S,
        width: u32,
        port_type: PortType,
        is_signed: bool,
    ) -> KratosResult<VarIdx> {
        self.named_var(
            name.into(),
            width,
            is_signed,
            VarKind::Port {
                direction,
                port_type,
            },
        )
    }

    /// Declare an unsigned data port.
    pub fn port<S: Into<Id>>(
        &mut self,
        direction: PortDirection,
        name: S,
        width: u32,
    ) -> KratosResult<VarIdx> {
        self.port_with(direction, name, width, PortType::Data, false)
    }

    pub fn port_in<S: Into<Id>>(
        &mut self,
        name: S,
        width: u32,
    ) -> KratosResult<VarIdx> {
        self.port(PortDirection::In, name, width)
    }

    pub fn port_out<S: Into<Id>>(
        &mut self,
        name: S,
        width: u32,
    ) -> KratosResult<VarIdx> {
        self.port(PortDirection::Out, name, width)
    }

    /// Declare a clock input.
    pub fn clock<S: Into<Id>>(&mut self, name: S) -> KratosResult<VarIdx> {
        self.port_with(PortDirection::In, name, 1, PortType::Clock, false)
    }

    /// Declare a parameter with its current value.
    pub fn parameter<S: Into<Id>>(
        &mut self,
        name: S,
        width: u32,
        value: i64,
    ) -> KratosResult<VarIdx> {
        if !kratos_utils::value_fits_width(value, width, false) {
            return Err(Error::width_mismatch(format!(
                "parameter value {value} does not fit in {width} bits"
            )));
        }
        self.named_var(name.into(), width, false, VarKind::Parameter { value })
    }

    /// Update a parameter's current value.
    pub fn set_param_value(
        &mut self,
        param: VarIdx,
        value: i64,
    ) -> KratosResult<()> {
        let width = self.var_data(param).width;
        if !kratos_utils::value_fits_width(value, width, false) {
            return Err(Error::width_mismatch(format!(
                "parameter value {value} does not fit in {width} bits"
            )));
        }
        match self.var_data_mut(param).kind_mut() {
            VarKind::Parameter { value: v } => {
                *v = value;
                Ok(())
            }
            _ => Err(Error::malformed_structure(format!(
                "`{}' is not a parameter",
                self.var_str(param)
            ))),
        }
    }

    /* =========================== look-ups ============================ */

    /// Look up a named port, var, or parameter.
    pub fn get_var<S: Into<Id>>(&self, name: S) -> Option<VarIdx> {
        self.names.get(&name.into()).copied()
    }

    /// Named entities in declaration order.
    pub fn named_vars(
        &self,
    ) -> impl Iterator<Item = (Id, VarIdx)> + '_ {
        self.names.iter().map(|(&name, &idx)| (name, idx))
    }

    /// Port names, sorted lexicographically (the emission order).
    pub fn port_names(&self) -> Vec<Id> {
        self.names
            .iter()
            .filter(|(_, &idx)| self.var_data(idx).is_port())
            .map(|(&name, _)| name)
            .sorted()
            .collect()
    }

    /// Ports in declaration order.
    pub fn ports(&self) -> impl Iterator<Item = (Id, VarIdx)> + '_ {
        self.named_vars()
            .filter(|&(_, idx)| self.var_data(idx).is_port())
    }

    /// Parameters in declaration order.
    pub fn params(&self) -> impl Iterator<Item = (Id, VarIdx)> + '_ {
        self.named_vars()
            .filter(|&(_, idx)| self.var_data(idx).is_param())
    }

    /// A name generator seeded with every name declared here.
    pub fn name_generator(&self) -> NameGenerator {
        NameGenerator::with_prev_defined_names(
            self.names.keys().copied().collect(),
        )
    }

    /// Record a host source location on a value vertex.
    pub fn add_var_loc(&mut self, var: VarIdx, loc: SourceLoc) {
        self.var_data_mut(var).locs.push(loc);
    }

    /// Record a host source location on a statement.
    pub fn add_stmt_loc(&mut self, stmt: StmtIdx, loc: SourceLoc) {
        self.stmt_mut(stmt).locs.push(loc);
    }

    /* ========================== hierarchy ============================ */

    /// Register an instantiation site of `target`. Connectivity is added
    /// afterwards with [`Generator::wire`] / [`Generator::wire_ports`].
    pub fn add_child<S: Into<Id>, T: Into<Id>>(
        &mut self,
        target: S,
        instance_name: T,
    ) -> usize {
        self.children.push(ChildInstance {
            target: target.into(),
            instance_name: instance_name.into(),
            connections: LinkedHashMap::new(),
            params: LinkedHashMap::new(),
        });
        self.children.len() - 1
    }

    /// Connect `port` of child instance `instance` to a parent-side value.
    pub fn wire<S: Into<Id>>(
        &mut self,
        instance: usize,
        port: S,
        var: VarIdx,
    ) -> KratosResult<()> {
        let child = self.child_mut(instance)?;
        child.connections.insert(port.into(), Endpoint::Var(var));
        Ok(())
    }

    /// Connect `port_a` of instance `a` directly to `port_b` of instance
    /// `b`. The connection is recorded on `a` and decoupled into a wire
    /// by the port-decoupling pass.
    pub fn wire_ports<S: Into<Id>, T: Into<Id>>(
        &mut self,
        a: usize,
        port_a: S,
        b: usize,
        port_b: T,
    ) -> KratosResult<()> {
        if b >= self.children.len() {
            return Err(Error::lookup_failure(format!(
                "no child instance {b} in generator `{}'",
                self.name
            )));
        }
        let port_b = port_b.into();
        let child = self.child_mut(a)?;
        child.connections.insert(
            port_a.into(),
            Endpoint::ChildPort {
                instance: b,
                port: port_b,
            },
        );
        Ok(())
    }

    /// Override a parameter value for one instantiation site.
    pub fn set_child_param<S: Into<Id>>(
        &mut self,
        instance: usize,
        param: S,
        value: i64,
    ) -> KratosResult<()> {
        let child = self.child_mut(instance)?;
        child.params.insert(param.into(), value);
        Ok(())
    }

    fn child_mut(&mut self, instance: usize) -> KratosResult<&mut ChildInstance> {
        let name = self.name;
        self.children.get_mut(instance).ok_or_else(|| {
            Error::lookup_failure(format!(
                "no child instance {instance} in generator `{name}'"
            ))
        })
    }

    /* ============================ hashing ============================ */

    /// The structural hash computed by the hash pass, if any.
    pub fn structural_hash(&self) -> Option<u64> {
        self.hash
    }

    pub fn set_structural_hash(&mut self, hash: u64) {
        self.hash = Some(hash);
    }
}
