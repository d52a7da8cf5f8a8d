//! Shared utilities for the Kratos hardware framework.
mod diagnostics;
mod errors;
mod id;
mod math;
mod namegenerator;

pub use diagnostics::{print_source_locs, SourceLoc};
pub use errors::{Error, ErrorKind, KratosResult};
pub use id::{GSym, GetName, Id};
pub use math::value_fits_width;
pub use namegenerator::NameGenerator;
