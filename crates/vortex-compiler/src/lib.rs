//! Vortex Compiler - Virtualizing Source-to-Source Obfuscation
//!
//! Lowers an ECMAScript-like AST into an equivalent program whose control
//! flow runs inside an embedded stackless register VM: a flat state-machine
//! IR, a transactional fixed-point optimizer, four dispatcher shapes and a
//! wave-transform string concealment engine.

pub mod codegen;
pub mod error;
pub mod ir;
pub mod lower;
pub mod memory;
pub mod optimize;
pub mod options;
pub mod rng;
pub mod strings;

pub use error::{CompileError, CompileResult};
pub use optimize::OptStats;
pub use options::{DispatcherKind, OpaqueLevel, Options};

use codegen::CodeGenerator;
use lower::desugar::Desugarer;
use lower::preprocess::{self, has_directive};
use lower::{IrGenerator, IrOutput};
use memory::MemoryMap;
use optimize::Optimizer;
use rng::Prng;
use strings::StringPool;
use vortex_ast::{Program, Statement};

/// Everything a compilation produces beyond the output text
pub struct Compilation {
    /// The emitted program
    pub code: String,
    /// Optimizer statistics (zeroed when optimization is off)
    pub opt_stats: OptStats,
    /// Live IR states after optimization and compaction
    pub state_count: usize,
    /// Whether the run was a partial (directive-scoped) virtualization
    pub partial: bool,
}

/// Main compiler entry point
pub struct Compiler {
    options: Options,
}

impl Compiler {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Compile a parsed program into the virtualized output text
    pub fn compile(&self, program: Program) -> CompileResult<String> {
        Ok(self.compile_detailed(program)?.code)
    }

    /// Compile, keeping pipeline statistics for inspection
    pub fn compile_detailed(&self, program: Program) -> CompileResult<Compilation> {
        let mut prng = Prng::new(self.options.seed);

        // Module surface off, executable body out.
        let mut split = preprocess::split_module(program);

        // Pre-lowering rewrites. Partial mode leaves retained code exactly
        // as written and desugars only the opted functions.
        if split.partial {
            let mut desugarer = Desugarer::new();
            for stmt in &mut split.body {
                if let Statement::FunctionDecl(decl) = stmt {
                    if has_directive(&decl.function.body.statements) {
                        desugarer.run_function(&mut decl.function);
                    }
                }
            }
        } else {
            let mut body = Program::new(std::mem::take(&mut split.body));
            Desugarer::new().run(&mut body);
            split.body = body.body;
        }

        // Gather every string the emitted program will query.
        let mut pool = StringPool::new();
        pool.collect(&split.body);

        // Lower to the flat state list.
        let mut memory = MemoryMap::new();
        let generator = IrGenerator::new(&mut memory);
        let mut output: IrOutput = if split.partial {
            generator.transform_partial(&split.body)?
        } else {
            generator.transform_to_states(&split.body)?
        };

        let opt_stats = if self.options.no_optimize {
            OptStats::default()
        } else {
            Optimizer::new(&mut memory, self.options.max_superblock_size)
                .optimize(&mut output.ir)
        };
        output.ir.compact();

        // Shared slots for the host globals the program reads.
        for name in &output.globals_used {
            memory.allocate(name, true);
        }

        pool.finalize(&mut prng, !self.options.no_encryption);

        let code = CodeGenerator::new(
            &output.ir,
            &output,
            &memory,
            &pool,
            &self.options,
            &split,
        )
        .generate(&mut prng)?;

        Ok(Compilation {
            code,
            opt_stats,
            state_count: output.ir.live_count(),
            partial: output.partial,
        })
    }
}
