//! Error type shared by IR construction, the pass pipeline, and emission.
use crate::SourceLoc;
use thiserror::Error;

/// Convenience alias for results produced anywhere in the framework.
pub type KratosResult<T> = std::result::Result<T, Error>;

/// Classification of a failure. Every variant carries a human-readable
/// message; the surrounding [Error] carries the source locations recorded
/// on the offending IR nodes.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("width mismatch: {0}")]
    WidthMismatch(String),
    #[error("signedness mismatch: {0}")]
    SignednessMismatch(String),
    #[error("name collision: {0}")]
    NameCollision(String),
    #[error("invalid assignment type: {0}")]
    InvalidAssignmentType(String),
    #[error("mixed assignment: {0}")]
    MixedAssignment(String),
    #[error("unconnected signal: {0}")]
    UnconnectedSignal(String),
    #[error("structural error: {0}")]
    StructuralError(String),
    #[error("lookup failure: {0}")]
    LookupFailure(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Misc(String),
}

/// An error with the AST context needed to point the user back at the
/// host code that built the offending IR nodes.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    locs: Vec<SourceLoc>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, locs: vec![] }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Source locations recorded on the IR nodes involved in the failure.
    pub fn locations(&self) -> &[SourceLoc] {
        &self.locs
    }

    /// Attach a single source location.
    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        self.locs.push(loc);
        self
    }

    /// Attach every location recorded on an offending node.
    pub fn with_locs<I>(mut self, locs: I) -> Self
    where
        I: IntoIterator<Item = SourceLoc>,
    {
        self.locs.extend(locs);
        self
    }

    pub fn width_mismatch<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::WidthMismatch(msg.to_string()))
    }

    pub fn signedness_mismatch<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::SignednessMismatch(msg.to_string()))
    }

    pub fn name_collision<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::NameCollision(msg.to_string()))
    }

    pub fn invalid_assignment_type<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::InvalidAssignmentType(msg.to_string()))
    }

    pub fn mixed_assignment<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MixedAssignment(msg.to_string()))
    }

    pub fn unconnected<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::UnconnectedSignal(msg.to_string()))
    }

    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::StructuralError(msg.to_string()))
    }

    pub fn lookup_failure<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::LookupFailure(msg.to_string()))
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Misc(msg.to_string()))
    }

    /// Print the source excerpts for every recorded location to stderr.
    pub fn report(&self) {
        crate::diagnostics::print_source_locs(&self.locs);
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(e))
    }
}

impl From<std::fmt::Error> for Error {
    fn from(e: std::fmt::Error) -> Self {
        Self::misc(format!("formatting failed: {e}"))
    }
}
