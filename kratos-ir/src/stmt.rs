//! The statement tree: assignments, blocks, branches, switches, and
//! module instantiations, stored in the owning generator's arena.
use crate::generator::Generator;
use crate::idx::{StmtIdx, VarIdx};
use crate::var::{CastKind, VarKind};
use kratos_utils::{Error, Id, KratosResult, SourceLoc};
use smallvec::SmallVec;

/// Assignment flavor. `Undefined` is resolved from context by the
/// fix-assignment-type pass; nothing `Undefined` survives to emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignType {
    Blocking,
    NonBlocking,
    Undefined,
}

impl std::fmt::Display for AssignType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssignType::Blocking => "blocking",
            AssignType::NonBlocking => "non-blocking",
            AssignType::Undefined => "undefined",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Sequential,
    Combinational,
}

/// Edge of a sensitivity-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    Posedge,
    Negedge,
}

impl EdgeType {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Posedge => "posedge",
            EdgeType::Negedge => "negedge",
        }
    }
}

/// `left` receives `right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignStmt {
    pub left: VarIdx,
    pub right: VarIdx,
    pub assign_type: AssignType,
}

/// One arm of a switch statement; `value: None` is the default arm.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub value: Option<VarIdx>,
    pub body: Vec<StmtIdx>,
}

/// A realized instantiation statement, snapshotted from a
/// [`ChildInstance`](crate::ChildInstance) record by the instantiation
/// pass. The port mapping is sorted by internal port name.
#[derive(Debug, Clone)]
pub struct ModInstStmt {
    pub target: Id,
    pub instance_name: Id,
    pub port_mapping: Vec<(Id, VarIdx)>,
    pub params: Vec<(Id, i64)>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Assign(AssignStmt),
    Block {
        block_type: BlockType,
        sensitivity: SmallVec<[(EdgeType, VarIdx); 2]>,
        body: Vec<StmtIdx>,
    },
    If {
        predicate: VarIdx,
        then_body: Vec<StmtIdx>,
        else_body: Vec<StmtIdx>,
    },
    Switch {
        target: VarIdx,
        cases: Vec<SwitchCase>,
    },
    ModuleInstantiation(ModInstStmt),
}

/// Attachment point of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtParent {
    /// Created but not yet attached anywhere.
    Detached,
    /// Attached at module scope.
    Generator,
    /// Nested under another statement.
    Stmt(StmtIdx),
}

/// A statement: kind payload, attachment point, and debug metadata.
#[derive(Debug, Clone)]
pub struct StmtData {
    kind: StmtKind,
    parent: StmtParent,
    pub locs: Vec<SourceLoc>,
    pub verilog_ln: u32,
}

impl StmtData {
    fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            parent: StmtParent::Detached,
            locs: vec![],
            verilog_ln: 0,
        }
    }

    pub fn kind(&self) -> &StmtKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut StmtKind {
        &mut self.kind
    }

    pub fn parent(&self) -> StmtParent {
        self.parent
    }

    pub fn as_assign(&self) -> Option<&AssignStmt> {
        match &self.kind {
            StmtKind::Assign(a) => Some(a),
            _ => None,
        }
    }
}

impl Generator {
    /* ============================ arena ============================= */

    fn alloc_stmt(&mut self, kind: StmtKind) -> StmtIdx {
        let idx = StmtIdx::new(self.stmts.len());
        self.stmts.push(Some(StmtData::new(kind)));
        idx
    }

    /// Read a statement. Panics on a deleted handle.
    pub fn stmt(&self, idx: StmtIdx) -> &StmtData {
        self.stmts[idx.index()].as_ref().unwrap_or_else(|| {
            unreachable!("stmt handle {idx} points to a deleted statement")
        })
    }

    pub fn stmt_mut(&mut self, idx: StmtIdx) -> &mut StmtData {
        self.stmts[idx.index()].as_mut().unwrap_or_else(|| {
            unreachable!("stmt handle {idx} points to a deleted statement")
        })
    }

    /// Module-scope statements, in attachment order.
    pub fn body(&self) -> &[StmtIdx] {
        &self.body
    }

    pub fn stmts_count(&self) -> usize {
        self.body.len()
    }

    /// The `i`-th module-scope statement.
    pub fn get_stmt(&self, i: usize) -> Option<StmtIdx> {
        self.body.get(i).copied()
    }

    /* ======================== index upkeep ========================== */

    fn register_source(&mut self, var: VarIdx, stmt: StmtIdx) {
        self.var_data_mut(var).add_source(stmt);
        match self.var_data(var).kind() {
            &VarKind::Slice { parent, .. }
            | &VarKind::Casted { parent, .. } => {
                self.register_source(parent, stmt)
            }
            _ => {}
        }
    }

    fn unregister_source(&mut self, var: VarIdx, stmt: StmtIdx) {
        self.var_data_mut(var).remove_source(stmt);
        match self.var_data(var).kind() {
            &VarKind::Slice { parent, .. }
            | &VarKind::Casted { parent, .. } => {
                self.unregister_source(parent, stmt)
            }
            _ => {}
        }
    }

    fn register_sink(&mut self, var: VarIdx, stmt: StmtIdx) {
        self.var_data_mut(var).add_sink(stmt);
        let operands: SmallVec<[VarIdx; 2]> = match self.var_data(var).kind() {
            &VarKind::Expression { left, right, .. } => {
                std::iter::once(left).chain(right).collect()
            }
            &VarKind::Slice { parent, .. }
            | &VarKind::Casted { parent, .. } => std::iter::once(parent).collect(),
            VarKind::Concat { parts } => parts.iter().copied().collect(),
            _ => SmallVec::new(),
        };
        for operand in operands {
            self.register_sink(operand, stmt);
        }
    }

    fn unregister_sink(&mut self, var: VarIdx, stmt: StmtIdx) {
        self.var_data_mut(var).remove_sink(stmt);
        let operands: SmallVec<[VarIdx; 2]> = match self.var_data(var).kind() {
            &VarKind::Expression { left, right, .. } => {
                std::iter::once(left).chain(right).collect()
            }
            &VarKind::Slice { parent, .. }
            | &VarKind::Casted { parent, .. } => std::iter::once(parent).collect(),
            VarKind::Concat { parts } => parts.iter().copied().collect(),
            _ => SmallVec::new(),
        };
        for operand in operands {
            self.unregister_sink(operand, stmt);
        }
    }

    /* ========================= assignments ========================== */

    /// Create (or find) the assignment `left <- right` with an undefined
    /// flavor, to be resolved from context later.
    pub fn assign(
        &mut self,
        left: VarIdx,
        right: VarIdx,
    ) -> KratosResult<StmtIdx> {
        self.assign_typed(left, right, AssignType::Undefined)
    }

    /// Create the assignment `left <- right`. Identical triples resolve
    /// to the same statement handle; conflicting concrete flavors on the
    /// same pair fail with `MixedAssignment`.
    pub fn assign_typed(
        &mut self,
        left: VarIdx,
        right: VarIdx,
        assign_type: AssignType,
    ) -> KratosResult<StmtIdx> {
        match self.var_data(left).kind() {
            VarKind::Base
            | VarKind::Port { .. }
            | VarKind::Slice { .. }
            | VarKind::Casted { .. } => {}
            _ => {
                return Err(Error::malformed_structure(format!(
                    "cannot assign to `{}'",
                    self.var_str(left)
                ))
                .with_locs(self.var_locs(left).iter().cloned()));
            }
        }
        let (lw, ls) =
            (self.var_data(left).width, self.var_data(left).is_signed);
        let right = self.coerce_const(right, lw, ls)?;
        let (rw, rs) =
            (self.var_data(right).width, self.var_data(right).is_signed);
        if lw != rw {
            return Err(Error::width_mismatch(format!(
                "cannot assign `{}' ({rw} bits) to `{}' ({lw} bits)",
                self.var_str(right),
                self.var_str(left)
            ))
            .with_locs(self.var_locs(left).iter().cloned())
            .with_locs(self.var_locs(right).iter().cloned()));
        }
        if ls != rs {
            return Err(Error::signedness_mismatch(format!(
                "cannot assign `{}' to `{}'",
                self.var_str(right),
                self.var_str(left)
            ))
            .with_locs(self.var_locs(left).iter().cloned())
            .with_locs(self.var_locs(right).iter().cloned()));
        }
        // Idempotence and conflict detection against existing drivers.
        let existing: SmallVec<[StmtIdx; 4]> =
            self.var_data(left).sources().iter().copied().collect();
        for s in existing {
            let Some(a) = self.stmt(s).as_assign() else {
                continue;
            };
            if a.left != left || a.right != right {
                continue;
            }
            let current = a.assign_type;
            return match (current, assign_type) {
                (c, n) if c == n => Ok(s),
                (_, AssignType::Undefined) => Ok(s),
                (AssignType::Undefined, n) => {
                    self.set_assign_type(s, n);
                    Ok(s)
                }
                (c, n) => Err(Error::mixed_assignment(format!(
                    "`{}' <- `{}' is already {c}, cannot redeclare as {n}",
                    self.var_str(left),
                    self.var_str(right)
                ))
                .with_locs(self.var_locs(left).iter().cloned())),
            };
        }
        let idx = self.alloc_stmt(StmtKind::Assign(AssignStmt {
            left,
            right,
            assign_type,
        }));
        self.register_source(left, idx);
        self.register_sink(right, idx);
        Ok(idx)
    }

    /// Remove an assignment and unregister it from both endpoint index
    /// sets. Detaches it from its parent first if necessary.
    pub fn unassign(&mut self, stmt: StmtIdx) -> KratosResult<()> {
        if self.stmt(stmt).as_assign().is_none() {
            return Err(Error::malformed_structure(
                "unassign expects an assignment statement",
            ));
        }
        self.remove_stmt(stmt);
        Ok(())
    }

    /// Change an assignment's flavor in place.
    pub fn set_assign_type(&mut self, stmt: StmtIdx, assign_type: AssignType) {
        if let StmtKind::Assign(a) = self.stmt_mut(stmt).kind_mut() {
            a.assign_type = assign_type;
        }
    }

    /// Substitute the right-hand side of an assignment, keeping the
    /// back-indexes consistent.
    pub fn rewire_assign_right(
        &mut self,
        stmt: StmtIdx,
        new_right: VarIdx,
    ) -> KratosResult<()> {
        let Some(a) = self.stmt(stmt).as_assign().copied() else {
            return Err(Error::malformed_structure(
                "rewire expects an assignment statement",
            ));
        };
        let lw = self.var_data(a.left).width;
        let rw = self.var_data(new_right).width;
        if lw != rw {
            return Err(Error::width_mismatch(format!(
                "cannot rewire `{}' ({lw} bits) to `{}' ({rw} bits)",
                self.var_str(a.left),
                self.var_str(new_right)
            )));
        }
        self.unregister_sink(a.right, stmt);
        if let StmtKind::Assign(a) = self.stmt_mut(stmt).kind_mut() {
            a.right = new_right;
        }
        self.register_sink(new_right, stmt);
        Ok(())
    }

    /* ========================= attachment =========================== */

    fn attach(&mut self, stmt: StmtIdx, parent: StmtParent) -> KratosResult<()> {
        if self.stmt(stmt).parent != StmtParent::Detached {
            return Err(Error::malformed_structure(
                "statement is already attached",
            )
            .with_locs(self.stmt(stmt).locs.iter().cloned()));
        }
        self.stmt_mut(stmt).parent = parent;
        Ok(())
    }

    /// Attach a statement at module scope.
    pub fn add_stmt(&mut self, stmt: StmtIdx) -> KratosResult<()> {
        self.attach(stmt, StmtParent::Generator)?;
        self.body.push(stmt);
        Ok(())
    }

    /// Attach a statement at module scope at a specific position.
    pub fn insert_stmt(
        &mut self,
        position: usize,
        stmt: StmtIdx,
    ) -> KratosResult<()> {
        self.attach(stmt, StmtParent::Generator)?;
        let position = position.min(self.body.len());
        self.body.insert(position, stmt);
        Ok(())
    }

    /// Detach a statement from its parent list, keeping it alive.
    pub fn detach_stmt(&mut self, stmt: StmtIdx) {
        match self.stmt(stmt).parent {
            StmtParent::Detached => return,
            StmtParent::Generator => {
                self.body.retain(|&s| s != stmt);
            }
            StmtParent::Stmt(p) => {
                for list in Self::kind_lists(self.stmt_mut(p).kind_mut()) {
                    list.retain(|&s| s != stmt);
                }
            }
        }
        self.stmt_mut(stmt).parent = StmtParent::Detached;
    }

    /// Replace `old` with `new` in whatever list `old` is attached to.
    pub fn replace_stmt(
        &mut self,
        old: StmtIdx,
        new: StmtIdx,
    ) -> KratosResult<()> {
        if self.stmt(new).parent != StmtParent::Detached {
            return Err(Error::malformed_structure(
                "replacement statement is already attached",
            ));
        }
        let parent = self.stmt(old).parent;
        match parent {
            StmtParent::Detached => {
                return Err(Error::malformed_structure(
                    "cannot replace a detached statement",
                ));
            }
            StmtParent::Generator => {
                for slot in &mut self.body {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
            StmtParent::Stmt(p) => {
                for list in Self::kind_lists(self.stmt_mut(p).kind_mut()) {
                    for slot in list {
                        if *slot == old {
                            *slot = new;
                        }
                    }
                }
            }
        }
        self.stmt_mut(new).parent = parent;
        self.stmt_mut(old).parent = StmtParent::Detached;
        Ok(())
    }

    fn kind_lists(kind: &mut StmtKind) -> Vec<&mut Vec<StmtIdx>> {
        match kind {
            StmtKind::Block { body, .. } => vec![body],
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => vec![then_body, else_body],
            StmtKind::Switch { cases, .. } => {
                cases.iter_mut().map(|c| &mut c.body).collect()
            }
            _ => vec![],
        }
    }

    /// Detach and destroy a statement, its nested statements, and every
    /// back-index entry pointing at any of them.
    pub fn remove_stmt(&mut self, stmt: StmtIdx) {
        self.detach_stmt(stmt);
        self.destroy_stmt(stmt);
    }

    fn destroy_stmt(&mut self, stmt: StmtIdx) {
        if let Some(a) = self.stmt(stmt).as_assign().copied() {
            self.unregister_source(a.left, stmt);
            self.unregister_sink(a.right, stmt);
        }
        let children: Vec<StmtIdx> = match self.stmt(stmt).kind() {
            StmtKind::Block { body, .. } => body.clone(),
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => then_body.iter().chain(else_body).copied().collect(),
            StmtKind::Switch { cases, .. } => cases
                .iter()
                .flat_map(|c| c.body.iter().copied())
                .collect(),
            _ => vec![],
        };
        for child in children {
            self.destroy_stmt(child);
        }
        self.stmts[stmt.index()] = None;
    }

    /* =========================== blocks ============================= */

    /// Create a sequential (clocked) block. Conditions are added with
    /// [`Generator::add_condition`].
    pub fn sequential_block(&mut self) -> StmtIdx {
        self.alloc_stmt(StmtKind::Block {
            block_type: BlockType::Sequential,
            sensitivity: SmallVec::new(),
            body: vec![],
        })
    }

    /// Create a combinational block.
    pub fn combinational_block(&mut self) -> StmtIdx {
        self.alloc_stmt(StmtKind::Block {
            block_type: BlockType::Combinational,
            sensitivity: SmallVec::new(),
            body: vec![],
        })
    }

    /// Append `(edge, var)` to a sequential block's sensitivity list.
    /// The var must be a one-bit clock-like port (or a clock-like cast).
    pub fn add_condition(
        &mut self,
        block: StmtIdx,
        edge: EdgeType,
        var: VarIdx,
    ) -> KratosResult<()> {
        let clock_like = self.var_data(var).width == 1
            && match self.var_data(var).kind() {
                VarKind::Port { port_type, .. } => port_type.is_clock_like(),
                VarKind::Casted { cast, .. } => {
                    matches!(cast, CastKind::Clock | CastKind::AsyncReset)
                }
                _ => false,
            };
        if !clock_like {
            return Err(Error::malformed_structure(format!(
                "`{}' cannot appear in a sensitivity list; it must be a \
                 1-bit clock, reset, or async-reset port",
                self.var_str(var)
            ))
            .with_locs(self.var_locs(var).iter().cloned()));
        }
        match self.stmt_mut(block).kind_mut() {
            StmtKind::Block {
                block_type: BlockType::Sequential,
                sensitivity,
                ..
            } => {
                if !sensitivity.contains(&(edge, var)) {
                    sensitivity.push((edge, var));
                }
                Ok(())
            }
            _ => Err(Error::malformed_structure(
                "only sequential blocks have sensitivity lists",
            )),
        }
    }

    /// Append a statement to a block body, enforcing the block's
    /// assignment-flavor rule.
    pub fn add_block_stmt(
        &mut self,
        block: StmtIdx,
        stmt: StmtIdx,
    ) -> KratosResult<()> {
        let StmtKind::Block { block_type, .. } = self.stmt(block).kind() else {
            return Err(Error::malformed_structure(
                "statement is not a block",
            ));
        };
        let block_type = *block_type;
        if let Some(a) = self.stmt(stmt).as_assign() {
            let bad = match block_type {
                BlockType::Sequential => {
                    a.assign_type == AssignType::Blocking
                }
                BlockType::Combinational => {
                    a.assign_type == AssignType::NonBlocking
                }
            };
            if bad {
                let left = a.left;
                return Err(Error::invalid_assignment_type(format!(
                    "cannot add {} assignment to `{}' inside a {} block",
                    a.assign_type,
                    self.var_str(left),
                    match block_type {
                        BlockType::Sequential => "sequential",
                        BlockType::Combinational => "combinational",
                    }
                ))
                .with_locs(self.stmt(stmt).locs.iter().cloned()));
            }
        }
        self.attach(stmt, StmtParent::Stmt(block))?;
        match self.stmt_mut(block).kind_mut() {
            StmtKind::Block { body, .. } => body.push(stmt),
            _ => unreachable!(),
        }
        Ok(())
    }

    /* ========================= if / switch ========================== */

    /// Create an if statement over a one-bit predicate.
    pub fn if_stmt(&mut self, predicate: VarIdx) -> KratosResult<StmtIdx> {
        if self.var_data(predicate).width != 1 {
            return Err(Error::malformed_structure(format!(
                "if predicate `{}' must be one bit wide",
                self.var_str(predicate)
            ))
            .with_locs(self.var_locs(predicate).iter().cloned()));
        }
        Ok(self.alloc_stmt(StmtKind::If {
            predicate,
            then_body: vec![],
            else_body: vec![],
        }))
    }

    pub fn add_then_stmt(
        &mut self,
        if_stmt: StmtIdx,
        stmt: StmtIdx,
    ) -> KratosResult<()> {
        self.add_branch_stmt(if_stmt, stmt, true)
    }

    pub fn add_else_stmt(
        &mut self,
        if_stmt: StmtIdx,
        stmt: StmtIdx,
    ) -> KratosResult<()> {
        self.add_branch_stmt(if_stmt, stmt, false)
    }

    fn add_branch_stmt(
        &mut self,
        if_stmt: StmtIdx,
        stmt: StmtIdx,
        then_branch: bool,
    ) -> KratosResult<()> {
        if !matches!(self.stmt(if_stmt).kind(), StmtKind::If { .. }) {
            return Err(Error::malformed_structure(
                "statement is not an if statement",
            ));
        }
        self.attach(stmt, StmtParent::Stmt(if_stmt))?;
        match self.stmt_mut(if_stmt).kind_mut() {
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                if then_branch {
                    then_body.push(stmt);
                } else {
                    else_body.push(stmt);
                }
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Create a switch statement over `target`.
    pub fn switch_stmt(&mut self, target: VarIdx) -> StmtIdx {
        self.alloc_stmt(StmtKind::Switch {
            target,
            cases: vec![],
        })
    }

    /// Open a new case arm (`value: None` for the default arm) holding
    /// `stmt`. Case constants are re-interned at the target's width;
    /// duplicate case values and second defaults are rejected.
    pub fn add_switch_case(
        &mut self,
        switch: StmtIdx,
        value: Option<VarIdx>,
        stmt: StmtIdx,
    ) -> KratosResult<()> {
        let value = self.check_switch_case(switch, value)?;
        let exists = match self.stmt(switch).kind() {
            StmtKind::Switch { cases, .. } => {
                cases.iter().any(|c| c.value == value)
            }
            _ => unreachable!(),
        };
        if exists {
            let label = match value {
                Some(v) => self.var_str(v).to_string(),
                None => "default".to_string(),
            };
            return Err(Error::malformed_structure(format!(
                "switch case `{label}' is already defined"
            )));
        }
        self.attach(stmt, StmtParent::Stmt(switch))?;
        match self.stmt_mut(switch).kind_mut() {
            StmtKind::Switch { cases, .. } => cases.push(SwitchCase {
                value,
                body: vec![stmt],
            }),
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Append `stmt` to the case arm for `value`, opening the arm if it
    /// does not exist yet.
    pub fn append_switch_case_stmt(
        &mut self,
        switch: StmtIdx,
        value: Option<VarIdx>,
        stmt: StmtIdx,
    ) -> KratosResult<()> {
        let value = self.check_switch_case(switch, value)?;
        self.attach(stmt, StmtParent::Stmt(switch))?;
        match self.stmt_mut(switch).kind_mut() {
            StmtKind::Switch { cases, .. } => {
                if let Some(case) =
                    cases.iter_mut().find(|c| c.value == value)
                {
                    case.body.push(stmt);
                } else {
                    cases.push(SwitchCase {
                        value,
                        body: vec![stmt],
                    });
                }
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Validate the switch handle and coerce a case constant to the
    /// target's shape.
    fn check_switch_case(
        &mut self,
        switch: StmtIdx,
        value: Option<VarIdx>,
    ) -> KratosResult<Option<VarIdx>> {
        let StmtKind::Switch { target, .. } = self.stmt(switch).kind() else {
            return Err(Error::malformed_structure(
                "statement is not a switch statement",
            ));
        };
        let target = *target;
        let Some(v) = value else { return Ok(None) };
        if self.var_data(v).const_value().is_none() {
            return Err(Error::malformed_structure(format!(
                "switch case `{}' must be a constant",
                self.var_str(v)
            )));
        }
        let (tw, ts) =
            (self.var_data(target).width, self.var_data(target).is_signed);
        Ok(Some(self.coerce_const(v, tw, ts)?))
    }

    /// Realize an instantiation statement. Used by the instantiation
    /// pass once connectivity has been decoupled and validated.
    pub fn module_inst_stmt(&mut self, inst: ModInstStmt) -> StmtIdx {
        self.alloc_stmt(StmtKind::ModuleInstantiation(inst))
    }
}
