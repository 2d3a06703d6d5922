//! # idlc
//!
//! `idlc` compiles declarative message-interface definitions into the C data
//! structures and helper macros a microkernel's IPC layer uses at the wire
//! level. It is the single source of truth that keeps client stubs, server
//! dispatch tables, and the on-the-wire struct layout in sync.
//!
//! ## Pipeline
//!
//! - **Lexer** ([`lexer`]): tokenizes the IDL source text.
//! - **Parser** ([`parser`]): builds the raw statement list, validating the
//!   grammar.
//! - **Builder** ([`builder`]): flattens namespaces, attaches doc comments,
//!   and recursively expands `include` statements (with cyclic-include
//!   detection).
//! - **Resolver** ([`resolver`]): collects the user-type symbol table, then
//!   resolves every type reference against builtins, enums, and typedefs.
//! - **Layout planner** ([`layout`]): classifies fields into inline vs.
//!   bulk, enforces per-message invariants, and assigns globally unique
//!   message ids.
//! - **Generators** ([`generators`]): render the planned unit into C (the
//!   wire-contract header) or HTML (interface documentation).
//!
//! Each stage consumes only the previous stage's output; the message-id
//! counter and symbol tables are scoped to one [`compile`] call, so separate
//! invocations never share id space.
//!
//! ## Example
//!
//! ```rust
//! use idlc::{compile, Options};
//! use std::path::Path;
//!
//! let source = "
//!     namespace fs {
//!         rpc open(path: str, flags: int32) -> (fd: handle);
//!     }
//! ";
//!
//! let header = compile(source, Path::new("."), &Options::default()).unwrap();
//! assert!(header.contains("struct fs_open_fields"));
//! ```

pub mod ast;
pub mod builder;
pub mod color;
pub mod error;
pub mod generators;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod resolver;

use std::path::Path;

use crate::{
    ast::Target,
    error::CompileError,
    generators::Lang,
    layout::Plan,
};

/// Per-invocation compilation options.
#[derive(Debug, Clone)]
pub struct Options {
    pub lang: Lang,
    pub target: Target,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            lang: Lang::C,
            target: Target::default(),
        }
    }
}

/// Runs the front half of the pipeline (parse, build, resolve, layout) and
/// returns the planned unit. `base_dir` anchors relative include patterns.
pub fn analyze(source: &str, base_dir: &Path, target: &Target) -> Result<Plan, CompileError> {
    let stmts = parser::Parser::new(source).parse_unit()?;
    let mut unit = builder::build(stmts, base_dir)?;
    resolver::resolve(&mut unit, target)?;
    layout::plan(unit, target)
}

/// Compiles one merged compilation unit to the selected output language.
///
/// The whole output is buffered in memory; on error nothing is produced, so
/// callers never observe a partial, possibly-truncated artifact.
pub fn compile(source: &str, base_dir: &Path, options: &Options) -> Result<String, CompileError> {
    let plan = analyze(source, base_dir, &options.target)?;
    generators::for_lang(options.lang).generate(&plan)
}
