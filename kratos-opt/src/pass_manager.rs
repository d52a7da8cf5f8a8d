//! Define the PassManager structure used to construct and run the pass
//! pipeline over a generator hierarchy.
use kratos_ir as ir;
use kratos_utils::{Error, Id, KratosResult};
use std::time::Instant;

pub type PassResult<T> = KratosResult<T>;

/// Top-level type for all passes that transform an [ir::Context] rooted
/// at a generator.
pub type PassClosure = Box<dyn Fn(&mut ir::Context, Id) -> PassResult<()>>;

/// Trait that describes named things. Required to register a pass.
pub trait Named {
    /// The name of a pass. Used for identification and logging.
    fn name() -> &'static str;
    /// A short description of the pass.
    fn description() -> &'static str;
}

/// A transformation or check over the IR rooted at `root`.
pub trait Transform {
    fn run(&mut self, ctx: &mut ir::Context, root: Id) -> PassResult<()>;
}

/// Ordered registry of passes. Passes run in registration order; each
/// sees the IR left by its predecessor, and the first failure aborts the
/// rest of the sequence.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<(String, PassClosure)>,
}

impl PassManager {
    /// Register a pass type, constructed fresh via [Default] at run time.
    /// Returns an error if a pass with the same name is already
    /// registered.
    pub fn register_pass<Pass>(&mut self) -> PassResult<()>
    where
        Pass: Transform + Named + Default,
    {
        self.add_pass(
            Pass::name(),
            Box::new(|ctx, root| Pass::default().run(ctx, root)),
        )
    }

    /// Register a pass under an explicit name, e.g. a closure capturing
    /// configuration.
    pub fn add_pass<S: ToString>(
        &mut self,
        name: S,
        pass: PassClosure,
    ) -> PassResult<()> {
        let name = name.to_string();
        if self.passes.iter().any(|(n, _)| *n == name) {
            return Err(Error::misc(format!(
                "Pass with name '{}' is already registered.",
                name
            )));
        }
        self.passes.push((name, pass));
        Ok(())
    }

    /// Names of the registered passes, in execution order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Run every registered pass over the hierarchy rooted at `root`.
    pub fn run_passes(
        &self,
        ctx: &mut ir::Context,
        root: Id,
    ) -> PassResult<()> {
        for (name, pass) in &self.passes {
            let start = Instant::now();
            pass(ctx, root)?;
            let elapsed = start.elapsed();
            // Flag passes that take unexpectedly long.
            if elapsed.as_secs() > 5 {
                log::warn!("{name}: {}ms", elapsed.as_millis());
            } else {
                log::info!("{name}: {}ms", elapsed.as_millis());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Nop;

    impl Named for Nop {
        fn name() -> &'static str {
            "nop"
        }

        fn description() -> &'static str {
            "does nothing"
        }
    }

    impl Transform for Nop {
        fn run(
            &mut self,
            _ctx: &mut ir::Context,
            _root: Id,
        ) -> PassResult<()> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut pm = PassManager::default();
        pm.register_pass::<Nop>().unwrap();
        assert!(pm.register_pass::<Nop>().is_err());
        assert_eq!(pm.pass_names(), vec!["nop"]);
    }

    #[test]
    fn runs_in_registration_order() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        let order = Arc::new(AtomicUsize::new(0));
        let mut pm = PassManager::default();
        for i in 0..3usize {
            let order = Arc::clone(&order);
            pm.add_pass(
                format!("p{i}"),
                Box::new(move |_, _| {
                    let seen = order.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(seen, i);
                    Ok(())
                }),
            )
            .unwrap();
        }
        let mut ctx = ir::Context::new();
        ctx.generator("top");
        pm.run_passes(&mut ctx, Id::from("top")).unwrap();
        assert_eq!(order.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn aborts_on_first_failure() {
        let mut pm = PassManager::default();
        pm.add_pass("ok", Box::new(|_, _| Ok(()))).unwrap();
        pm.add_pass("fail", Box::new(|_, _| Err(Error::misc("boom"))))
            .unwrap();
        pm.add_pass(
            "unreached",
            Box::new(|_, _| panic!("must not run")),
        )
        .unwrap();
        let mut ctx = ir::Context::new();
        ctx.generator("top");
        assert!(pm.run_passes(&mut ctx, Id::from("top")).is_err());
    }
}
