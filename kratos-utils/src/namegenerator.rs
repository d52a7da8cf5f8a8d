use crate::Id;
use std::collections::{HashMap, HashSet};

/// Mints names that do not collide with a known set of existing names.
/// The first request for a free prefix returns it unchanged; subsequent
/// requests return `prefix_0`, `prefix_1`, and so on.
#[derive(Debug, Default, Clone)]
pub struct NameGenerator {
    used: HashSet<Id>,
    counters: HashMap<Id, u32>,
}

impl NameGenerator {
    /// Construct a generator that avoids the given names.
    pub fn with_prev_defined_names(names: HashSet<Id>) -> Self {
        Self {
            used: names,
            counters: HashMap::new(),
        }
    }

    /// Add more reserved names.
    pub fn add_names<I>(&mut self, names: I)
    where
        I: IntoIterator<Item = Id>,
    {
        self.used.extend(names);
    }

    /// Return a fresh name derived from `prefix`.
    pub fn gen_name<S: Into<Id>>(&mut self, prefix: S) -> Id {
        let prefix = prefix.into();
        if self.used.insert(prefix) && !self.counters.contains_key(&prefix) {
            return prefix;
        }
        let counter = self.counters.entry(prefix).or_insert(0);
        loop {
            let candidate = Id::new(format!("{prefix}_{counter}"));
            *counter += 1;
            if self.used.insert(candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_prefix_is_kept() {
        let mut gen = NameGenerator::default();
        assert_eq!(gen.gen_name("inst"), Id::new("inst"));
        assert_eq!(gen.gen_name("inst"), Id::new("inst_0"));
        assert_eq!(gen.gen_name("inst"), Id::new("inst_1"));
    }

    #[test]
    fn avoids_reserved_names() {
        let reserved = ["wire", "wire_0"].map(Id::new).into_iter().collect();
        let mut gen = NameGenerator::with_prev_defined_names(reserved);
        assert_eq!(gen.gen_name("wire"), Id::new("wire_1"));
    }
}
