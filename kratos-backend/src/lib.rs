//! SystemVerilog backend for the Kratos hardware framework.
//!
//! Transforms a [`Context`] rooted at a generator into a formatted
//! string that represents a valid SystemVerilog program.
mod verilog;

pub use verilog::{generate_verilog, SystemVerilogCodeGen};

use kratos_ir::{Context, Id, KratosResult};
use kratos_opt::{PassManager, PassOptions};

/// Driver tying the pieces together: owns the context, runs the default
/// pass pipeline over the root generator, and caches the emitted source.
pub struct VerilogModule {
    ctx: Context,
    root: Id,
    verilog: Option<String>,
}

impl VerilogModule {
    pub fn new<S: Into<Id>>(ctx: Context, root: S) -> Self {
        Self {
            ctx,
            root: root.into(),
            verilog: None,
        }
    }

    /// Run the default pass pipeline and regenerate the source text.
    /// Fails at the first offending pass; no later pass executes.
    pub fn run_passes(&mut self, opts: &PassOptions) -> KratosResult<()> {
        let pm = PassManager::default_passes(opts)?;
        pm.run_passes(&mut self.ctx, self.root)?;
        self.verilog = Some(generate_verilog(&mut self.ctx, self.root)?);
        Ok(())
    }

    /// The emitted source. Empty until [`VerilogModule::run_passes`]
    /// succeeds.
    pub fn verilog_src(&self) -> &str {
        self.verilog.as_deref().unwrap_or("")
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn into_context(self) -> Context {
        self.ctx
    }
}
