//! The value graph: typed dataflow vertices and their algebra.
use crate::context::ConstKey;
use crate::generator::Generator;
use crate::idx::{StmtIdx, VarIdx};
use kratos_utils::{Error, Id, KratosResult, SourceLoc};
use std::collections::{BTreeSet, HashMap};

/// Operators available on the value graph. The split mirrors the
/// SystemVerilog operator families: unary, arithmetic, shifts, bitwise,
/// and relational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExprOp {
    // unary
    UInvert,
    UMinus,
    UPlus,
    // binary
    Add,
    Minus,
    Divide,
    Multiply,
    Mod,
    LogicalShiftRight,
    SignedShiftRight,
    ShiftLeft,
    Or,
    And,
    Xor,
    // relational
    LessThan,
    GreaterThan,
    LessEqThan,
    GreaterEqThan,
    Eq,
    Neq,
}

impl ExprOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            ExprOp::LessThan
                | ExprOp::GreaterThan
                | ExprOp::LessEqThan
                | ExprOp::GreaterEqThan
                | ExprOp::Eq
                | ExprOp::Neq
        )
    }

    pub fn is_unary(self) -> bool {
        matches!(self, ExprOp::UInvert | ExprOp::UMinus | ExprOp::UPlus)
    }

    pub fn is_shift(self) -> bool {
        matches!(
            self,
            ExprOp::ShiftLeft
                | ExprOp::LogicalShiftRight
                | ExprOp::SignedShiftRight
        )
    }

    /// The SystemVerilog spelling, used both for display and emission.
    pub fn symbol(self) -> &'static str {
        match self {
            ExprOp::UInvert => "~",
            ExprOp::UMinus => "-",
            ExprOp::UPlus => "+",
            ExprOp::Add => "+",
            ExprOp::Minus => "-",
            ExprOp::Divide => "/",
            ExprOp::Multiply => "*",
            ExprOp::Mod => "%",
            ExprOp::LogicalShiftRight => ">>",
            ExprOp::SignedShiftRight => ">>>",
            ExprOp::ShiftLeft => "<<",
            ExprOp::Or => "|",
            ExprOp::And => "&",
            ExprOp::Xor => "^",
            ExprOp::LessThan => "<",
            ExprOp::GreaterThan => ">",
            ExprOp::LessEqThan => "<=",
            ExprOp::GreaterEqThan => ">=",
            ExprOp::Eq => "==",
            ExprOp::Neq => "!=",
        }
    }
}

/// Direction of a port on a generator's interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    In,
    Out,
    InOut,
}

impl PortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            PortDirection::In => "input",
            PortDirection::Out => "output",
            PortDirection::InOut => "inout",
        }
    }
}

/// Semantic role of a port. Sensitivity lists only accept clock-like
/// roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    Data,
    Clock,
    AsyncReset,
    Reset,
}

impl PortType {
    pub fn is_clock_like(self) -> bool {
        matches!(
            self,
            PortType::Clock | PortType::AsyncReset | PortType::Reset
        )
    }
}

/// Reinterpretation applied by a `Casted` vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    Signed,
    Clock,
    AsyncReset,
}

/// The variant payload of a value vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKind {
    /// A declared register or wire.
    Base,
    /// Part of the generator's interface.
    Port {
        direction: PortDirection,
        port_type: PortType,
    },
    /// An interned integer literal.
    ConstValue { value: i64 },
    /// A named constant placeholder with a current value.
    Parameter { value: i64 },
    /// An operator node. `right` is `None` for unary operators.
    Expression {
        op: ExprOp,
        left: VarIdx,
        right: Option<VarIdx>,
    },
    /// A bit-range view of a non-slice parent.
    Slice {
        parent: VarIdx,
        high: u32,
        low: u32,
    },
    /// MSB-first concatenation.
    Concat { parts: Vec<VarIdx> },
    /// A cached reinterpretation of `parent`.
    Casted { parent: VarIdx, cast: CastKind },
}

/// A value vertex: common header plus the [`VarKind`] payload. `sources`
/// are the assignments that drive this vertex; `sinks` are the
/// assignments that consume it.
#[derive(Debug, Clone)]
pub struct VarData {
    pub name: Id,
    pub width: u32,
    pub is_signed: bool,
    kind: VarKind,
    sources: BTreeSet<StmtIdx>,
    sinks: BTreeSet<StmtIdx>,
    pub(crate) slices: HashMap<(u32, u32), VarIdx>,
    pub(crate) casts: HashMap<CastKind, VarIdx>,
    pub locs: Vec<SourceLoc>,
    pub verilog_ln: u32,
}

impl VarData {
    pub(crate) fn new(
        name: Id,
        width: u32,
        is_signed: bool,
        kind: VarKind,
    ) -> Self {
        Self {
            name,
            width,
            is_signed,
            kind,
            sources: BTreeSet::new(),
            sinks: BTreeSet::new(),
            slices: HashMap::new(),
            casts: HashMap::new(),
            locs: vec![],
            verilog_ln: 0,
        }
    }

    pub fn kind(&self) -> &VarKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut VarKind {
        &mut self.kind
    }

    /// Assignments driving this vertex.
    pub fn sources(&self) -> &BTreeSet<StmtIdx> {
        &self.sources
    }

    /// Assignments consuming this vertex.
    pub fn sinks(&self) -> &BTreeSet<StmtIdx> {
        &self.sinks
    }

    pub(crate) fn add_source(&mut self, stmt: StmtIdx) {
        self.sources.insert(stmt);
    }

    pub(crate) fn remove_source(&mut self, stmt: StmtIdx) {
        self.sources.remove(&stmt);
    }

    pub(crate) fn add_sink(&mut self, stmt: StmtIdx) {
        self.sinks.insert(stmt);
    }

    pub(crate) fn remove_sink(&mut self, stmt: StmtIdx) {
        self.sinks.remove(&stmt);
    }

    pub fn is_port(&self) -> bool {
        matches!(self.kind, VarKind::Port { .. })
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, VarKind::Parameter { .. })
    }

    pub fn is_base(&self) -> bool {
        matches!(self.kind, VarKind::Base)
    }

    pub fn port_direction(&self) -> Option<PortDirection> {
        match self.kind {
            VarKind::Port { direction, .. } => Some(direction),
            _ => None,
        }
    }

    pub fn port_type(&self) -> Option<PortType> {
        match self.kind {
            VarKind::Port { port_type, .. } => Some(port_type),
            _ => None,
        }
    }

    pub fn const_value(&self) -> Option<i64> {
        match self.kind {
            VarKind::ConstValue { value } => Some(value),
            _ => None,
        }
    }

    pub fn param_value(&self) -> Option<i64> {
        match self.kind {
            VarKind::Parameter { value } => Some(value),
            _ => None,
        }
    }
}

/// Display form of an interned literal, e.g. `4'hA` or `-4'h2`.
pub(crate) fn const_str(value: i64, width: u32) -> String {
    if value < 0 {
        format!("-{}'h{:x}", width, value.unsigned_abs())
    } else {
        format!("{}'h{:x}", width, value)
    }
}

/// Value-graph construction. Every method interns: repeated construction
/// of an equivalent vertex returns the original handle.
impl Generator {
    /// Intern the literal `(value, width, is_signed)`: the shape goes
    /// through the context's shared pool, the vertex is cached locally.
    pub fn constant_with(
        &mut self,
        value: i64,
        width: u32,
        is_signed: bool,
    ) -> KratosResult<VarIdx> {
        let key = self.pool.intern(value, width, is_signed)?;
        if let Some(&idx) = self.consts.get(&key) {
            return Ok(idx);
        }
        let name = Id::new(const_str(value, width));
        let idx = self.alloc_var(VarData::new(
            name,
            width,
            is_signed,
            VarKind::ConstValue { value },
        ));
        self.consts.insert(key, idx);
        Ok(idx)
    }

    /// Intern an unsigned literal.
    pub fn constant(&mut self, value: i64, width: u32) -> KratosResult<VarIdx> {
        self.constant_with(value, width, false)
    }

    /// Materialize the local vertex for a shape pooled with
    /// [`Context::constant`](crate::Context::constant).
    pub fn constant_of(&mut self, key: ConstKey) -> KratosResult<VarIdx> {
        self.constant_with(key.value, key.width, key.is_signed)
    }

    /// Re-intern a constant vertex at a different shape, through the
    /// shared pool. Non-constant vertices pass through untouched.
    pub(crate) fn coerce_const(
        &mut self,
        var: VarIdx,
        width: u32,
        is_signed: bool,
    ) -> KratosResult<VarIdx> {
        let data = self.var_data(var);
        let &VarKind::ConstValue { value } = data.kind() else {
            return Ok(var);
        };
        if data.width == width && data.is_signed == is_signed {
            return Ok(var);
        }
        self.constant_with(value, width, is_signed)
    }

    /// Build (or look up) the binary expression `left op right`.
    pub fn binary(
        &mut self,
        op: ExprOp,
        left: VarIdx,
        right: VarIdx,
    ) -> KratosResult<VarIdx> {
        if op.is_unary() {
            return Err(Error::malformed_structure(format!(
                "operator `{}' is unary",
                op.symbol()
            )));
        }
        // A constant operand follows the shape of the other side.
        let (left, right) = {
            let l_const = self.var_data(left).const_value().is_some();
            let r_const = self.var_data(right).const_value().is_some();
            if r_const && !l_const {
                let (w, s) =
                    (self.var_data(left).width, self.var_data(left).is_signed);
                (left, self.coerce_const(right, w, s)?)
            } else if l_const && !r_const {
                let (w, s) = (
                    self.var_data(right).width,
                    self.var_data(right).is_signed,
                );
                (self.coerce_const(left, w, s)?, right)
            } else {
                (left, right)
            }
        };
        let (lw, ls) = (self.var_data(left).width, self.var_data(left).is_signed);
        let (rw, rs) =
            (self.var_data(right).width, self.var_data(right).is_signed);
        if ls != rs {
            return Err(Error::signedness_mismatch(format!(
                "cannot mix `{}' and `{}' in `{}'",
                self.var_str(left),
                self.var_str(right),
                op.symbol()
            ))
            .with_locs(self.var_locs(left).iter().cloned())
            .with_locs(self.var_locs(right).iter().cloned()));
        }
        if let Some(&idx) = self.exprs.get(&(op, left, Some(right))) {
            return Ok(idx);
        }
        let width = if op.is_relational() {
            1
        } else if op.is_shift() {
            lw
        } else {
            lw.max(rw)
        };
        let is_signed = if op == ExprOp::SignedShiftRight {
            true
        } else if op.is_relational() {
            false
        } else {
            ls
        };
        let name = Id::new(format!(
            "({} {} {})",
            self.var_str(left),
            op.symbol(),
            self.var_str(right)
        ));
        let idx = self.alloc_var(VarData::new(
            name,
            width,
            is_signed,
            VarKind::Expression {
                op,
                left,
                right: Some(right),
            },
        ));
        self.exprs.insert((op, left, Some(right)), idx);
        Ok(idx)
    }

    /// Build (or look up) the unary expression `op operand`.
    pub fn unary(&mut self, op: ExprOp, operand: VarIdx) -> KratosResult<VarIdx> {
        if !op.is_unary() {
            return Err(Error::malformed_structure(format!(
                "operator `{}' is not unary",
                op.symbol()
            )));
        }
        if let Some(&idx) = self.exprs.get(&(op, operand, None)) {
            return Ok(idx);
        }
        let (width, is_signed) =
            (self.var_data(operand).width, self.var_data(operand).is_signed);
        let name = Id::new(format!(
            "({} {})",
            op.symbol(),
            self.var_str(operand)
        ));
        let idx = self.alloc_var(VarData::new(
            name,
            width,
            is_signed,
            VarKind::Expression {
                op,
                left: operand,
                right: None,
            },
        ));
        self.exprs.insert((op, operand, None), idx);
        Ok(idx)
    }

    pub fn add(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::Add, a, b)
    }

    pub fn sub(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::Minus, a, b)
    }

    pub fn mul(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::Multiply, a, b)
    }

    pub fn div(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::Divide, a, b)
    }

    pub fn rem(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::Mod, a, b)
    }

    pub fn shl(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::ShiftLeft, a, b)
    }

    pub fn shr(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::LogicalShiftRight, a, b)
    }

    /// Arithmetic (sign-preserving) shift right.
    pub fn ashr(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::SignedShiftRight, a, b)
    }

    pub fn bit_and(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::And, a, b)
    }

    pub fn bit_or(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::Or, a, b)
    }

    pub fn bit_xor(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::Xor, a, b)
    }

    pub fn lt(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::LessThan, a, b)
    }

    pub fn gt(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::GreaterThan, a, b)
    }

    pub fn le(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::LessEqThan, a, b)
    }

    pub fn ge(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::GreaterEqThan, a, b)
    }

    pub fn eq(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::Eq, a, b)
    }

    pub fn neq(&mut self, a: VarIdx, b: VarIdx) -> KratosResult<VarIdx> {
        self.binary(ExprOp::Neq, a, b)
    }

    pub fn invert(&mut self, a: VarIdx) -> KratosResult<VarIdx> {
        self.unary(ExprOp::UInvert, a)
    }

    pub fn uminus(&mut self, a: VarIdx) -> KratosResult<VarIdx> {
        self.unary(ExprOp::UMinus, a)
    }

    pub fn uplus(&mut self, a: VarIdx) -> KratosResult<VarIdx> {
        self.unary(ExprOp::UPlus, a)
    }

    /// Return the cached bit-range view `var[high:low]`. Slicing a slice
    /// narrows the window relative to the underlying base vertex.
    pub fn slice(
        &mut self,
        var: VarIdx,
        high: u32,
        low: u32,
    ) -> KratosResult<VarIdx> {
        if low > high {
            return Err(Error::malformed_structure(format!(
                "invalid slice [{high}:{low}] on `{}'",
                self.var_str(var)
            )));
        }
        let (base, high, low) = match self.var_data(var).kind() {
            &VarKind::Slice {
                parent, low: plo, ..
            } => (parent, plo + high, plo + low),
            _ => (var, high, low),
        };
        let base_width = self.var_data(base).width;
        if high >= base_width {
            return Err(Error::malformed_structure(format!(
                "slice [{high}:{low}] out of range for `{}' ({base_width} bits)",
                self.var_str(base)
            ))
            .with_locs(self.var_locs(base).iter().cloned()));
        }
        if let Some(&idx) = self.var_data(base).slices.get(&(high, low)) {
            return Ok(idx);
        }
        let name = if high == low {
            Id::new(format!("{}[{}]", self.var_str(base), high))
        } else {
            Id::new(format!("{}[{}:{}]", self.var_str(base), high, low))
        };
        let is_signed = self.var_data(base).is_signed;
        let idx = self.alloc_var(VarData::new(
            name,
            high - low + 1,
            is_signed,
            VarKind::Slice {
                parent: base,
                high,
                low,
            },
        ));
        self.var_data_mut(base).slices.insert((high, low), idx);
        Ok(idx)
    }

    /// Return the cached single-bit view `var[bit]`.
    pub fn bit(&mut self, var: VarIdx, bit: u32) -> KratosResult<VarIdx> {
        self.slice(var, bit, bit)
    }

    /// Concatenate `other` onto `var`, MSB-first. When `var` is already a
    /// concatenation the new part is appended in place and the same
    /// handle is returned.
    pub fn concat(&mut self, var: VarIdx, other: VarIdx) -> VarIdx {
        let other_width = self.var_data(other).width;
        if matches!(self.var_data(var).kind(), VarKind::Concat { .. }) {
            let parts = {
                let VarKind::Concat { parts } =
                    self.var_data_mut(var).kind_mut()
                else {
                    unreachable!()
                };
                parts.push(other);
                parts.clone()
            };
            let name = Id::new(self.concat_str(&parts));
            let data = self.var_data_mut(var);
            data.width += other_width;
            data.name = name;
            return var;
        }
        let width = self.var_data(var).width + other_width;
        let parts = vec![var, other];
        let name = Id::new(self.concat_str(&parts));
        self.alloc_var(VarData::new(
            name,
            width,
            false,
            VarKind::Concat { parts },
        ))
    }

    fn concat_str(&self, parts: &[VarIdx]) -> String {
        use itertools::Itertools;
        format!(
            "{{{}}}",
            parts.iter().map(|&p| self.var_str(p)).join(", ")
        )
    }

    /// Return the cached reinterpretation of `var` under `cast`. A vertex
    /// carries at most one cast per kind.
    pub fn cast(&mut self, var: VarIdx, cast: CastKind) -> VarIdx {
        if let Some(&idx) = self.var_data(var).casts.get(&cast) {
            return idx;
        }
        let (width, parent_signed) =
            (self.var_data(var).width, self.var_data(var).is_signed);
        let name = match cast {
            CastKind::Signed => {
                Id::new(format!("$signed({})", self.var_str(var)))
            }
            CastKind::Clock | CastKind::AsyncReset => self.var_data(var).name,
        };
        let is_signed = match cast {
            CastKind::Signed => true,
            _ => parent_signed,
        };
        let idx = self.alloc_var(VarData::new(
            name,
            width,
            is_signed,
            VarKind::Casted { parent: var, cast },
        ));
        self.var_data_mut(var).casts.insert(cast, idx);
        idx
    }

    /// Canonical display form of a vertex; also the literal emitted into
    /// SystemVerilog text.
    pub fn var_str(&self, var: VarIdx) -> &'static str {
        self.var_data(var).name.id.as_str()
    }

    pub fn var_locs(&self, var: VarIdx) -> &[SourceLoc] {
        &self.var_data(var).locs
    }
}
