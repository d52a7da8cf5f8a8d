//! Arena handles for the per-generator value and statement stores.
use std::fmt;

/// Handle to a value vertex inside a [`Generator`](crate::Generator)'s
/// arena. Only meaningful together with the generator that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct VarIdx(u32);

/// Handle to a statement inside a [`Generator`](crate::Generator)'s
/// arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct StmtIdx(u32);

macro_rules! impl_idx {
    ($name:ident, $tag:literal) => {
        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                debug_assert!(index <= u32::MAX as usize);
                Self(index as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "{}"), self.0)
            }
        }
    };
}

impl_idx!(VarIdx, "v");
impl_idx!(StmtIdx, "s");
