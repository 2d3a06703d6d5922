use std::{
    fs,
    mem,
    path::{Path, PathBuf},
};

use crate::{
    ast::{NamespaceDef, Stmt, Unit},
    error::CompileError,
    parser::Parser,
};

/// Walks parsed statements into the merged [`Unit`]: flattens namespaces,
/// attaches pending doc comments, and expands `include` statements by
/// recursively running the parse pipeline over every glob match.
///
/// The include stack guards against a file transitively including itself.
/// It is a stack rather than a visited set on purpose: including the same
/// file twice from sibling positions is legal (the original tool's glob
/// semantics) and simply splices its contents again under fresh message ids.
pub struct Builder {
    unit: Unit,
    include_stack: Vec<PathBuf>,
}

/// Builds the merged unit for one top-level source text. Include patterns
/// are resolved relative to `base_dir`.
pub fn build(stmts: Vec<Stmt>, base_dir: &Path) -> Result<Unit, CompileError> {
    let mut builder = Builder {
        unit: Unit::default(),
        include_stack: Vec::new(),
    };
    // The implicit global namespace is always present.
    builder.register_namespace(String::new(), String::new());
    builder.visit_stmts(stmts, "", base_dir)?;
    Ok(builder.unit)
}

impl Builder {
    fn register_namespace(&mut self, name: String, doc: String) {
        // Namespaces are keyed by name; re-opening one merges into it.
        if self.unit.namespaces.iter().any(|ns| ns.name == name) {
            return;
        }
        self.unit.namespaces.push(NamespaceDef { name, doc });
    }

    fn visit_stmts(
        &mut self,
        stmts: Vec<Stmt>,
        namespace: &str,
        base_dir: &Path,
    ) -> Result<(), CompileError> {
        let mut pending_doc = String::new();

        for stmt in stmts {
            match stmt {
                Stmt::Doc(text) => {
                    // A later block replaces an earlier, detached one.
                    pending_doc = text;
                }
                Stmt::Namespace { name, body } => {
                    let doc = mem::take(&mut pending_doc);
                    self.register_namespace(name.clone(), doc);
                    // Nesting in source flattens to the inner namespace name.
                    self.visit_stmts(body, &name, base_dir)?;
                }
                Stmt::Include { pattern } => {
                    pending_doc.clear();
                    self.expand_include(&pattern, base_dir)?;
                }
                Stmt::Message(mut msg) => {
                    msg.namespace = namespace.to_string();
                    msg.doc = mem::take(&mut pending_doc);
                    self.unit.messages.push(msg);
                }
                Stmt::Enum(mut def) => {
                    def.namespace = namespace.to_string();
                    def.doc = mem::take(&mut pending_doc);
                    self.unit.enums.push(def);
                }
                Stmt::TypeDef(mut def) => {
                    def.namespace = namespace.to_string();
                    def.doc = mem::take(&mut pending_doc);
                    self.unit.typedefs.push(def);
                }
                Stmt::Const(mut def) => {
                    def.namespace = namespace.to_string();
                    def.doc = mem::take(&mut pending_doc);
                    self.unit.consts.push(def);
                }
            }
        }
        Ok(())
    }

    fn expand_include(&mut self, pattern: &str, base_dir: &Path) -> Result<(), CompileError> {
        let full_pattern = if Path::new(pattern).is_absolute() {
            PathBuf::from(pattern)
        } else {
            base_dir.join(pattern)
        };

        let matches = glob::glob(&full_pattern.to_string_lossy()).map_err(|err| {
            CompileError::semantic(format!("invalid include pattern '{pattern}': {err}"))
        })?;

        let mut paths: Vec<PathBuf> = matches.filter_map(Result::ok).collect();
        paths.sort();

        for path in paths {
            self.include_file(&path)?;
        }
        Ok(())
    }

    fn include_file(&mut self, path: &Path) -> Result<(), CompileError> {
        let canonical = path.canonicalize().map_err(|source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if self.include_stack.contains(&canonical) {
            let chain = self
                .include_stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(CompileError::semantic(format!(
                "cyclic include detected: {chain}"
            )));
        }

        let source = fs::read_to_string(path).map_err(|source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let stmts = Parser::new(&source).parse_unit()?;

        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        self.include_stack.push(canonical);
        // Included statements splice in at the root namespace context.
        let result = self.visit_stmts(stmts, "", &base_dir);
        self.include_stack.pop();
        result
    }
}
