//! The [`Context`]: process-wide root that owns every generator and the
//! shared interned-constant pool.
use crate::from_verilog::ExternalModule;
use crate::generator::Generator;
use kratos_utils::{value_fits_width, Error, Id, KratosResult};
use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// The shape of an interned constant: `(value, width, signedness)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstKey {
    pub value: i64,
    pub width: u32,
    pub is_signed: bool,
}

/// Interned pool of constant shapes, shared between the context and
/// every generator it owns. All constant creation and coercion interns
/// its shape here before the owning generator materializes a local
/// vertex. Insertions are confined to the single-threaded construction
/// phase; the parallel hash strategy only reads, which the lock serves
/// concurrently.
#[derive(Debug, Clone, Default)]
pub struct ConstPool {
    keys: Arc<RwLock<HashSet<ConstKey>>>,
}

impl ConstPool {
    /// Validate and intern a literal shape.
    pub fn intern(
        &self,
        value: i64,
        width: u32,
        is_signed: bool,
    ) -> KratosResult<ConstKey> {
        if !value_fits_width(value, width, is_signed) {
            return Err(Error::width_mismatch(format!(
                "constant {value} does not fit in {width} bits{}",
                if is_signed { " (signed)" } else { "" }
            )));
        }
        let key = ConstKey {
            value,
            width,
            is_signed,
        };
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        Ok(key)
    }

    /// Whether a shape has been interned.
    pub fn contains(&self, key: &ConstKey) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Root of the IR. Generators are stored by definition name in insertion
/// order; each one is handed a handle to the shared constant pool at
/// creation. All owned entities are dropped with the context.
#[derive(Debug, Default)]
pub struct Context {
    generators: LinkedHashMap<Id, Generator>,
    pool: ConstPool,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the generator named `name`, creating it if necessary.
    pub fn generator<S: Into<Id>>(&mut self, name: S) -> &mut Generator {
        let name = name.into();
        let pool = self.pool.clone();
        self.generators
            .entry(name)
            .or_insert_with(|| Generator::new(name, pool))
    }

    pub fn get<S: Into<Id>>(&self, name: S) -> Option<&Generator> {
        self.generators.get(&name.into())
    }

    pub fn get_mut<S: Into<Id>>(&mut self, name: S) -> Option<&mut Generator> {
        self.generators.get_mut(&name.into())
    }

    /// Detach a generator from the context, e.g. to mutate it while
    /// reading its siblings. Pair with [`Context::insert`].
    pub fn remove<S: Into<Id>>(&mut self, name: S) -> Option<Generator> {
        self.generators.remove(&name.into())
    }

    pub fn insert(&mut self, generator: Generator) {
        self.generators.insert(generator.name, generator);
    }

    pub fn contains<S: Into<Id>>(&self, name: S) -> bool {
        self.generators.contains_key(&name.into())
    }

    /// Definition names, in insertion order.
    pub fn names(&self) -> Vec<Id> {
        self.generators.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &Generator)> {
        self.generators.iter().map(|(&name, gen)| (name, gen))
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Validate and intern a literal shape in the shared pool. The
    /// returned key can be materialized in any generator with
    /// [`Generator::constant_of`](crate::Generator::constant_of).
    pub fn constant(
        &self,
        value: i64,
        width: u32,
        is_signed: bool,
    ) -> KratosResult<ConstKey> {
        self.pool.intern(value, width, is_signed)
    }

    /// Whether a literal shape has been interned, by this context or by
    /// any of its generators.
    pub fn has_constant(&self, key: &ConstKey) -> bool {
        self.pool.contains(key)
    }

    /// The shared constant pool.
    pub fn constant_pool(&self) -> &ConstPool {
        &self.pool
    }

    /// Create an external generator from a module header read from disk.
    /// External generators are instantiated but never emitted.
    pub fn external_generator(
        &mut self,
        module: &ExternalModule,
    ) -> KratosResult<Id> {
        if self.contains(module.name) {
            return Err(Error::name_collision(format!(
                "generator `{}' already exists",
                module.name
            )));
        }
        let gen = self.generator(module.name);
        gen.external = true;
        for (&name, port) in &module.ports {
            gen.port_with(
                port.direction,
                name,
                port.width,
                port.port_type,
                port.is_signed,
            )?;
        }
        Ok(module.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_is_create_or_get() {
        let mut c = Context::new();
        c.generator("mod").var("a", 1).unwrap();
        // same name returns the same generator
        assert!(c.generator("mod").get_var("a").is_some());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn constant_pool() {
        let c = Context::new();
        let k = c.constant(7, 3, false).unwrap();
        assert!(c.has_constant(&k));
        assert!(c.constant(8, 3, false).is_err());
        assert!(c.constant(-4, 3, true).is_ok());
        assert!(c.constant(-5, 3, true).is_err());
    }

    #[test]
    fn generator_constants_share_the_pool() {
        let mut c = Context::new();
        let m = c.generator("m");
        let a = m.var("a", 4).unwrap();
        let one = m.constant(1, 1).unwrap();
        // the binary coercion widens the constant through the pool
        m.add(a, one).unwrap();
        assert!(c.has_constant(&ConstKey {
            value: 1,
            width: 1,
            is_signed: false,
        }));
        assert!(c.has_constant(&ConstKey {
            value: 1,
            width: 4,
            is_signed: false,
        }));
    }

    #[test]
    fn pooled_key_materializes_anywhere() {
        let mut c = Context::new();
        let key = c.constant(5, 4, false).unwrap();
        let v1 = c.generator("m1").constant_of(key).unwrap();
        let v2 = c.generator("m2").constant_of(key).unwrap();
        assert_eq!(
            c.get("m1").unwrap().var_data(v1).const_value(),
            Some(5)
        );
        assert_eq!(
            c.get("m2").unwrap().var_data(v2).const_value(),
            Some(5)
        );
    }
}
