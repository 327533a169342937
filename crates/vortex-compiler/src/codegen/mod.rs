//! Dispatcher / code generator
//!
//! Consumes the optimized IR and emits the output program: decoder,
//! string pool, global memory, preloaders, the VM function with one of
//! the four dispatcher shapes, function wrappers, the entry call and the
//! module surface.

pub mod decoder;
pub mod dispatch;
pub mod opaque;
pub mod ops;
pub mod writer;

use crate::error::{CompileError, CompileResult};
use crate::ir::Ir;
use crate::lower::preprocess::ModuleSplit;
use crate::lower::IrOutput;
use crate::memory::MemoryMap;
use crate::options::{DispatcherKind, Options};
use crate::rng::Prng;
use crate::strings::StringPool;
use dispatch::{emit_dispatcher, loop_shape, prepare_chaos};
use opaque::OpaquePool;
use ops::{wrapper_body, EmitCtx, IdSpace, StateSink, VmNames};
use vortex_ast::print::{print_statement_to_string, quote_string};
use vortex_ast::Statement;
use writer::JsWriter;

/// Per-frame slots reserved past the locals for the EH stack
const EH_CAPACITY: u32 = 64;

pub struct CodeGenerator<'a> {
    ir: &'a Ir,
    output: &'a IrOutput,
    memory: &'a MemoryMap,
    pool: &'a StringPool,
    options: &'a Options,
    module: &'a ModuleSplit,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        ir: &'a Ir,
        output: &'a IrOutput,
        memory: &'a MemoryMap,
        pool: &'a StringPool,
        options: &'a Options,
        module: &'a ModuleSplit,
    ) -> Self {
        Self {
            ir,
            output,
            memory,
            pool,
            options,
            module,
        }
    }

    pub fn generate(&self, prng: &mut Prng) -> CompileResult<String> {
        let names = VmNames::generate(prng);
        let encrypted = !self.options.no_encryption;

        let mut ids = if self.options.state_randomization {
            IdSpace::randomized(self.ir, prng)
        } else {
            IdSpace::identity(self.ir)
        };
        if self.options.dispatcher == DispatcherKind::Chaos {
            prepare_chaos(&mut ids, self.ir, prng);
        }

        let sink = match self.options.dispatcher {
            DispatcherKind::Chaos => StateSink::Horcrux {
                k: ["K0".into(), "K1".into(), "K2".into()],
            },
            _ => StateSink::Direct,
        };
        let ctx = EmitCtx {
            memory: self.memory,
            pool: self.pool,
            encrypted,
            names: &names,
            ids: &ids,
            sink,
            randomize: self.options.state_randomization,
            eh_base: self.memory.local_slot_count(),
        };
        let opaque = OpaquePool::new(self.options, prng);

        let mut w = JsWriter::new();

        for import in &self.module.imports {
            w.line(print_statement_to_string(import));
        }
        if !self.module.imports.is_empty() {
            w.blank();
        }

        if encrypted {
            decoder::emit_decoder(&mut w, &names);
            w.blank();
        }

        self.emit_pool(&mut w, &names);
        for decl in opaque.declarations(prng) {
            w.line(decl);
        }
        self.emit_memory(&mut w, &names)?;
        w.blank();

        self.emit_vm(&mut w, &ctx, &opaque, prng)?;
        w.blank();

        if self.output.partial {
            self.emit_partial_wrappers(&mut w, &ctx, prng)?;
            for stmt in &self.output.retained {
                w.line(print_statement_to_string(stmt));
            }
        } else {
            // The whole program lives in the VM; kick it off at state 0.
            let entry = ctx.ids.primary(0)?;
            w.line(format!(
                "{}({}, [], false, void 0, void 0);",
                names.vm,
                ctx.int_expr(prng, entry)
            ));
            self.emit_export_bindings(&mut w, &names)?;
        }

        if !self.module.exports.is_empty() {
            w.blank();
            for export in &self.module.exports {
                w.line(print_statement_to_string(export));
            }
        }

        Ok(w.finish())
    }

    fn emit_pool(&self, w: &mut JsWriter, names: &VmNames) {
        let payloads: Vec<String> = self
            .pool
            .payloads()
            .iter()
            .map(|p| quote_string(p))
            .collect();
        w.line(format!("const {} = [{}];", names.pool, payloads.join(", ")));
    }

    fn emit_memory(&self, w: &mut JsWriter, names: &VmNames) -> CompileResult<()> {
        w.line(format!(
            "const {} = new Array({}).fill(void 0);",
            names.gm,
            self.memory.global_memory_len()
        ));
        // Preload host globals into their shared slots.
        for name in &self.output.globals_used {
            let slot = self.memory.lookup(name)?;
            if !slot.is_global {
                return Err(CompileError::internal(format!(
                    "preloaded global {name} landed in a local slot"
                )));
            }
            w.line(format!(
                "{}[{}] = typeof {} === \"undefined\" ? void 0 : {};",
                names.gm, slot.index, name, name
            ));
        }
        let locals = self.memory.local_slot_count();
        w.line(format!(
            "const {} = () => {{ const m = new Array({}).fill(void 0); m[2] = {}; return m; }};",
            names.frame,
            locals + EH_CAPACITY,
            locals
        ));
        Ok(())
    }

    fn emit_vm(
        &self,
        w: &mut JsWriter,
        ctx: &EmitCtx,
        opaque: &OpaquePool,
        prng: &mut Prng,
    ) -> CompileResult<()> {
        let names = ctx.names;
        let chaos = self.options.dispatcher == DispatcherKind::Chaos;

        w.open(&format!("const {} = (C, I, IsErr, Tv, Nt) =>", names.vm));
        w.line(format!(
            "if (typeof C === \"number\") C = {{ M: {}(), S: C, T: null, A: I || [], VS: [] }};",
            names.frame
        ));
        w.line("let M = C.M, S = C.S, A = C.A, VS = C.VS, R = void 0;");
        if chaos {
            w.line("let K0 = 0, K1 = 0, K2 = S;");
        }
        w.line("if (C.T !== null) { if (!IsErr && I !== void 0) M[C.T] = I; C.T = null; }");

        let (loop_head, loop_tail) = loop_shape(self.options.dispatcher, prng);
        w.open(loop_head);
        w.open("try");
        w.line("if (IsErr) { IsErr = false; const e = I; I = void 0; throw e; }");
        if let Some(step) = opaque.step_statement() {
            w.line(step);
        }
        if chaos {
            w.line("if ((K0 ^ K1 ^ K2) !== S) { K0 = S; K1 = 0; K2 = 0; }");
        }
        emit_dispatcher(self.options.dispatcher, ctx, prng, w, self.ir, opaque)?;
        w.close("");

        // Virtual unwinding: in-frame handlers first, then saved frames,
        // then the host.
        w.open("catch (e)");
        w.open("for (;;)");
        w.open(&format!("if (M[2] > {})", ctx.eh_base));
        w.line("S = M[--M[2]];");
        w.line("M[3] = e;");
        if chaos {
            w.line("K0 = S; K1 = 0; K2 = 0;");
        }
        w.line("continue L;");
        w.close("");
        w.line("if (!VS.length) throw e;");
        w.line("const F = VS.pop();");
        w.line("M = F.m;");
        w.line("A = F.a;");
        w.close("");
        w.close("");

        w.close(loop_tail);
        w.close(";");
        Ok(())
    }

    /// Partial mode: opted functions become host-named wrappers ahead of
    /// the retained source.
    fn emit_partial_wrappers(
        &self,
        w: &mut JsWriter,
        ctx: &EmitCtx,
        prng: &mut Prng,
    ) -> CompileResult<()> {
        let mut names: Vec<&String> = self.output.functions.keys().collect();
        names.sort();
        for name in names {
            let info = &self.output.functions[name];
            // Entry ids were renumbered by compaction; the function table
            // inside the IR is the authority.
            let entry = self
                .ir
                .entry_of(name)
                .ok_or_else(|| CompileError::UnknownFunction { name: name.clone() })?;
            let entry_id = ctx.ids.primary(entry)?;
            // Captured names are host bindings referenced directly.
            let caps: Vec<String> = info.captured.clone();
            let body = wrapper_body(
                ctx,
                prng,
                entry_id,
                &caps,
                info.is_generator,
                info.is_async,
            );
            w.line(format!("const {} = {};", name, body));
        }
        Ok(())
    }

    /// Exported locals live in the shared memory; surface them as host
    /// bindings for the export lists.
    fn emit_export_bindings(&self, w: &mut JsWriter, names: &VmNames) -> CompileResult<()> {
        for export in &self.module.exports {
            let Statement::Export(vortex_ast::ExportDecl::Named {
                specifiers,
                source: None,
            }) = export
            else {
                continue;
            };
            for spec in specifiers {
                let slot = self.memory.lookup(&spec.local)?;
                if slot.is_global {
                    w.line(format!(
                        "const {} = {}[{}];",
                        spec.local, names.gm, slot.index
                    ));
                }
            }
        }
        Ok(())
    }
}
