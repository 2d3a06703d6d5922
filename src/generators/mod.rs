use crate::{error::CompileError, layout::Plan};

pub mod c;
pub mod html;

/// Output languages. Only the C renderer is required by the IPC runtime;
/// the HTML renderer produces interface documentation from the same plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Lang {
    C,
    Html,
}

/// A code generator renders the planned compilation unit into one output
/// text. Rendering is deterministic: the same plan always produces
/// byte-identical output.
pub trait CodeGenerator {
    fn generate(&mut self, plan: &Plan) -> Result<String, CompileError>;
}

pub fn for_lang(lang: Lang) -> Box<dyn CodeGenerator> {
    match lang {
        Lang::C => Box::new(c::CGenerator::new()),
        Lang::Html => Box::new(html::HtmlGenerator::new()),
    }
}

/// `<namespace>_<name>`, with no leading underscore for the global
/// namespace.
pub(crate) fn prefixed(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}_{name}")
    }
}
