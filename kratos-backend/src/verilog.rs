//! Deterministic SystemVerilog emission: one module per non-external
//! generator, children before parents.
use itertools::Itertools;
use kratos_ir::{
    AssignType, BlockType, Context, Generator, Id, KratosResult, StmtIdx,
    StmtKind, StmtParent,
};
use kratos_utils::Error;

const INDENT_SIZE: usize = 2;

/// Output buffer that tracks the current line number, so debug mode can
/// stamp emitted positions back onto the IR.
struct Stream {
    buf: String,
    line_no: u32,
}

impl Stream {
    fn new() -> Self {
        Self {
            buf: String::new(),
            line_no: 1,
        }
    }

    fn push(&mut self, text: &str) {
        self.line_no += text.matches('\n').count() as u32;
        self.buf.push_str(text);
    }

    fn endl(&mut self) {
        self.push("\n");
    }

    fn line_no(&self) -> u32 {
        self.line_no
    }
}

/// Emits one generator as a SystemVerilog module. Produces no side
/// effects on the IR except, in debug mode, the emitted line number
/// stamped on each statement, port, and declared var.
pub struct SystemVerilogCodeGen<'a> {
    gen: &'a mut Generator,
    stream: Stream,
    indent: usize,
    skip_indent: bool,
}

impl<'a> SystemVerilogCodeGen<'a> {
    /// Render `gen` to module text. External generators produce nothing.
    pub fn generate(gen: &'a mut Generator) -> KratosResult<String> {
        let mut codegen = Self {
            gen,
            stream: Stream::new(),
            indent: 0,
            skip_indent: false,
        };
        if !codegen.gen.external {
            codegen.emit_module()?;
        }
        Ok(codegen.stream.buf)
    }

    fn emit_module(&mut self) -> KratosResult<()> {
        let name = self.gen.name;
        self.stream.push(&format!("module {name} ("));
        self.stream.endl();
        self.generate_ports();
        self.stream.push(");");
        self.stream.endl();
        self.stream.endl();
        self.generate_parameters();
        self.generate_variables();

        for i in 0..self.gen.stmts_count() {
            let stmt = self.gen.get_stmt(i).unwrap_or_else(|| {
                unreachable!("statement {i} disappeared during emission")
            });
            self.dispatch(stmt)?;
        }

        self.stream.push(&format!("endmodule   // {name}"));
        self.stream.endl();
        Ok(())
    }

    fn indent(&mut self) -> String {
        if self.skip_indent {
            self.skip_indent = false;
            return String::new();
        }
        " ".repeat(self.indent * INDENT_SIZE)
    }

    fn width_str(width: u32) -> String {
        if width > 1 {
            format!("[{}:0]", width - 1)
        } else {
            String::new()
        }
    }

    fn generate_ports(&mut self) {
        self.indent += 1;
        let names = self.gen.port_names();
        for (i, name) in names.iter().enumerate() {
            let Some(idx) = self.gen.get_var(*name) else { continue };
            if self.gen.debug {
                self.gen.var_data_mut(idx).verilog_ln =
                    self.stream.line_no();
            }
            let data = self.gen.var_data(idx);
            let direction = data
                .port_direction()
                .unwrap_or_else(|| unreachable!("`{name}' is not a port"));
            let mut tokens = vec![direction.as_str().to_string()];
            tokens.push("logic".to_string());
            if data.is_signed {
                tokens.push("signed".to_string());
            }
            let width = Self::width_str(data.width);
            if !width.is_empty() {
                tokens.push(width);
            }
            tokens.push(name.to_string());
            let end = if i == names.len() - 1 { "" } else { "," };
            let line =
                format!("{}{}{end}", self.indent(), tokens.join(" "));
            self.stream.push(&line);
            self.stream.endl();
        }
        self.indent -= 1;
    }

    fn generate_parameters(&mut self) {
        let params: Vec<_> = self.gen.params().collect();
        for (name, idx) in params {
            let value =
                self.gen.var_data(idx).param_value().unwrap_or_default();
            self.stream
                .push(&format!("parameter {name} = {value};"));
            self.stream.endl();
        }
    }

    fn generate_variables(&mut self) {
        let vars: Vec<_> = self
            .gen
            .named_vars()
            .filter(|&(_, idx)| self.gen.var_data(idx).is_base())
            .collect();
        for (name, idx) in vars {
            if self.gen.debug {
                self.gen.var_data_mut(idx).verilog_ln =
                    self.stream.line_no();
            }
            let data = self.gen.var_data(idx);
            let mut tokens = vec!["logic".to_string()];
            if data.is_signed {
                tokens.push("signed".to_string());
            }
            let width = Self::width_str(data.width);
            if !width.is_empty() {
                tokens.push(width);
            }
            tokens.push(name.to_string());
            self.stream.push(&format!("{};", tokens.join(" ")));
            self.stream.endl();
        }
    }

    fn stamp(&mut self, stmt: StmtIdx) {
        if self.gen.debug {
            self.gen.stmt_mut(stmt).verilog_ln = self.stream.line_no();
        }
    }

    fn dispatch(&mut self, stmt: StmtIdx) -> KratosResult<()> {
        match self.gen.stmt(stmt).kind() {
            StmtKind::Assign(_) => self.stmt_assign(stmt),
            StmtKind::Block { .. } => self.stmt_block(stmt),
            StmtKind::If { .. } => self.stmt_if(stmt),
            StmtKind::Switch { .. } => self.stmt_switch(stmt),
            StmtKind::ModuleInstantiation(_) => self.stmt_inst(stmt),
        }
    }

    fn stmt_assign(&mut self, stmt: StmtIdx) -> KratosResult<()> {
        self.stamp(stmt);
        let assign = self
            .gen
            .stmt(stmt)
            .as_assign()
            .copied()
            .unwrap_or_else(|| unreachable!("dispatched as assignment"));
        let left = self.gen.var_str(assign.left);
        let right = self.gen.var_str(assign.right);
        if self.gen.stmt(stmt).parent() == StmtParent::Generator {
            if assign.assign_type != AssignType::Blocking {
                return Err(Error::invalid_assignment_type(format!(
                    "top level assignment for {left} <- {right} has to \
                     be blocking"
                ))
                .with_locs(self.gen.stmt(stmt).locs.iter().cloned()));
            }
            self.stream.push(&format!("assign {left} = {right};"));
            self.stream.endl();
        } else {
            let line = match assign.assign_type {
                AssignType::Blocking => {
                    format!("{}{left} = {right};", self.indent())
                }
                AssignType::NonBlocking => {
                    format!("{}{left} <= {right};", self.indent())
                }
                AssignType::Undefined => {
                    return Err(Error::invalid_assignment_type(format!(
                        "undefined assignment for {left} <- {right}"
                    ))
                    .with_locs(
                        self.gen.stmt(stmt).locs.iter().cloned(),
                    ));
                }
            };
            self.stream.push(&line);
            self.stream.endl();
        }
        Ok(())
    }

    fn stmt_block(&mut self, stmt: StmtIdx) -> KratosResult<()> {
        let StmtKind::Block {
            block_type,
            sensitivity,
            body,
        } = self.gen.stmt(stmt).kind()
        else {
            unreachable!("dispatched as block")
        };
        let block_type = *block_type;
        let sensitivity = sensitivity.clone();
        let body = body.clone();
        match block_type {
            BlockType::Sequential => {
                let list = sensitivity
                    .iter()
                    .map(|&(edge, var)| {
                        format!(
                            "{} {}",
                            edge.as_str(),
                            self.gen.var_str(var)
                        )
                    })
                    .join(", ");
                self.stream.endl();
                self.stamp(stmt);
                self.stream.push(&format!("always @({list}) begin"));
                self.stream.endl();
            }
            BlockType::Combinational => {
                self.stamp(stmt);
                self.stream.push("always_comb begin");
                self.stream.endl();
            }
        }
        self.indent += 1;
        for child in body {
            self.dispatch(child)?;
        }
        self.indent -= 1;
        let end = format!("{}end", self.indent());
        self.stream.push(&end);
        self.stream.endl();
        Ok(())
    }

    fn stmt_if(&mut self, stmt: StmtIdx) -> KratosResult<()> {
        self.stamp(stmt);
        let StmtKind::If {
            predicate,
            then_body,
            else_body,
        } = self.gen.stmt(stmt).kind()
        else {
            unreachable!("dispatched as if statement")
        };
        let predicate = *predicate;
        let then_body = then_body.clone();
        let else_body = else_body.clone();

        let header = format!(
            "{}if ({}) begin",
            self.indent(),
            self.gen.var_str(predicate)
        );
        self.stream.push(&header);
        self.stream.endl();
        self.indent += 1;
        for child in &then_body {
            self.dispatch(*child)?;
        }
        self.indent -= 1;
        let end = format!("{}end", self.indent());
        self.stream.push(&end);
        self.stream.endl();

        if else_body.is_empty() {
            return Ok(());
        }
        // a lone nested if prints as `else if`
        let chain = else_body.len() == 1
            && matches!(
                self.gen.stmt(else_body[0]).kind(),
                StmtKind::If { .. }
            );
        if chain {
            let prefix = format!("{}else ", self.indent());
            self.stream.push(&prefix);
            self.skip_indent = true;
            self.dispatch(else_body[0])?;
        } else {
            let prefix = format!("{}else begin", self.indent());
            self.stream.push(&prefix);
            self.stream.endl();
            self.indent += 1;
            for child in &else_body {
                self.dispatch(*child)?;
            }
            self.indent -= 1;
            let end = format!("{}end", self.indent());
            self.stream.push(&end);
            self.stream.endl();
        }
        Ok(())
    }

    fn stmt_switch(&mut self, stmt: StmtIdx) -> KratosResult<()> {
        self.stamp(stmt);
        let StmtKind::Switch { target, cases } = self.gen.stmt(stmt).kind()
        else {
            unreachable!("dispatched as switch statement")
        };
        let target = *target;
        let cases = cases.clone();

        let header =
            format!("{}case ({})", self.indent(), self.gen.var_str(target));
        self.stream.push(&header);
        self.stream.endl();
        self.indent += 1;
        for case in &cases {
            let label = match case.value {
                Some(v) => self.gen.var_str(v).to_string(),
                None => "default".to_string(),
            };
            if case.body.is_empty() {
                return Err(Error::malformed_structure(format!(
                    "switch statement case {label} is empty"
                ))
                .with_locs(self.gen.stmt(stmt).locs.iter().cloned()));
            }
            let line = format!("{}{label}: begin", self.indent());
            self.stream.push(&line);
            self.stream.endl();
            self.indent += 1;
            for child in &case.body {
                self.dispatch(*child)?;
            }
            self.indent -= 1;
            let end = format!("{}end", self.indent());
            self.stream.push(&end);
            self.stream.endl();
        }
        self.indent -= 1;
        let end = format!("{}endcase", self.indent());
        self.stream.push(&end);
        self.stream.endl();
        Ok(())
    }

    fn stmt_inst(&mut self, stmt: StmtIdx) -> KratosResult<()> {
        self.stamp(stmt);
        let StmtKind::ModuleInstantiation(inst) = self.gen.stmt(stmt).kind()
        else {
            unreachable!("dispatched as instantiation")
        };
        let inst = inst.clone();

        let header = format!("{}{}", self.indent(), inst.target);
        self.stream.push(&header);
        if !inst.params.is_empty() {
            self.stream.push(" #(");
            self.stream.endl();
            self.indent += 1;
            for (i, (name, value)) in inst.params.iter().enumerate() {
                let end = if i == inst.params.len() - 1 {
                    ")".to_string()
                } else {
                    ",\n".to_string()
                };
                let line =
                    format!("{}.{name}({value}){end}", self.indent());
                self.stream.push(&line);
            }
            self.indent -= 1;
        }
        self.stream.push(&format!(" {} (", inst.instance_name));
        self.stream.endl();
        self.indent += 1;
        for (i, (port, var)) in inst.port_mapping.iter().enumerate() {
            let end = if i == inst.port_mapping.len() - 1 {
                ")"
            } else {
                "),"
            };
            let line = format!(
                "{}.{port}({}{end}",
                self.indent(),
                self.gen.var_str(*var)
            );
            self.stream.push(&line);
            self.stream.endl();
        }
        self.stream.push(");");
        self.stream.endl();
        self.stream.endl();
        self.indent -= 1;
        Ok(())
    }
}

/// Render the whole hierarchy rooted at `root`: one module per
/// non-external generator, children before parents, byte-identical
/// across runs for the same IR.
pub fn generate_verilog(
    ctx: &mut Context,
    root: Id,
) -> KratosResult<String> {
    let order = kratos_opt::post_order(ctx, root)?;
    let mut modules = vec![];
    for name in order {
        let Some(gen) = ctx.get_mut(name) else { continue };
        if gen.external {
            continue;
        }
        log::debug!("generating verilog for `{name}'");
        modules.push(SystemVerilogCodeGen::generate(gen)?);
    }
    Ok(modules.join("\n"))
}
