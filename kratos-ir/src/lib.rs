//! Internal representation for the Kratos hardware framework.
//!
//! The IR is rooted at a [`Context`] that owns every [`Generator`]
//! (hardware module). A generator owns two arenas: one for dataflow
//! vertices ([`VarData`], addressed by [`VarIdx`]) and one for statements
//! ([`StmtData`], addressed by [`StmtIdx`]). Cross-references between
//! values and statements are index sets resolved through the owning
//! generator, so the graph has no ownership cycles.

mod context;
mod from_verilog;
mod generator;
mod idx;
mod stmt;
mod var;

pub use context::{ConstKey, ConstPool, Context};
pub use from_verilog::{ExternalModule, ExternalPort};
pub use generator::{ChildInstance, Endpoint, Generator};
pub use idx::{StmtIdx, VarIdx};
pub use stmt::{
    AssignStmt, AssignType, BlockType, EdgeType, ModInstStmt, StmtData,
    StmtKind, StmtParent, SwitchCase,
};
pub use var::{
    CastKind, ExprOp, PortDirection, PortType, VarData, VarKind,
};

// Re-export the pieces of the utility crate the IR surface exposes.
pub use kratos_utils::{Error, GetName, Id, KratosResult, SourceLoc};
