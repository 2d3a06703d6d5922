use std::fmt::Write;

use crate::{
    ast::Field,
    error::CompileError,
    generators::CodeGenerator,
    layout::{MessagePlan, Plan},
};

/// Renders the plan into a single interface-documentation HTML page,
/// sectioned by namespace. Shares the resolved model with the C renderer;
/// nothing here affects the wire contract.
pub struct HtmlGenerator {
    out: String,
}

impl HtmlGenerator {
    pub fn new() -> Self {
        HtmlGenerator { out: String::new() }
    }

    fn emit_namespace(&mut self, plan: &Plan, namespace: &str, doc: &str) {
        let title = if namespace.is_empty() {
            "(global)"
        } else {
            namespace
        };
        let _ = writeln!(self.out, "<h2><code>{}</code></h2>", escape(title));
        if !doc.is_empty() {
            let _ = writeln!(self.out, "<p>{}</p>", escape(doc));
        }

        for def in plan.enums.iter().filter(|e| e.namespace == namespace) {
            let _ = writeln!(self.out, "<h3>enum <code>{}</code></h3>", escape(&def.name));
            let _ = writeln!(self.out, "<ul>");
            for item in &def.items {
                let _ = writeln!(
                    self.out,
                    "<li><code>{} = {}</code></li>",
                    escape(&item.name),
                    item.value
                );
            }
            let _ = writeln!(self.out, "</ul>");
        }

        for def in plan.consts.iter().filter(|c| c.namespace == namespace) {
            let _ = writeln!(
                self.out,
                "<p>const <code>{}: {} = {}</code></p>",
                escape(&def.name),
                escape(&def.ty.name),
                def.value
            );
        }

        for msg in plan.messages.iter().filter(|m| m.namespace == namespace) {
            self.emit_message(msg);
        }
    }

    fn emit_message(&mut self, msg: &MessagePlan) {
        let _ = writeln!(
            self.out,
            "<h3><code>{}</code></h3>",
            escape(&signature(msg))
        );
        let ids = match msg.reply_id {
            Some(reply_id) => format!("id {}, reply id {}", msg.id, reply_id),
            None => format!("id {}", msg.id),
        };
        let _ = writeln!(self.out, "<p class=\"ids\">{ids}</p>");
        if !msg.doc.is_empty() {
            let _ = writeln!(self.out, "<p>{}</p>", escape(&msg.doc));
        }
    }
}

fn signature(msg: &MessagePlan) -> String {
    let kind = if msg.oneway { "oneway" } else { "rpc" };
    let mut sig = format!("{kind} {}({})", msg.name, field_list(&msg.args.fields));
    if msg.reply_id.is_some() {
        let _ = write!(sig, " -> ({})", field_list(&msg.rets.fields));
    }
    sig
}

fn field_list(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| match f.ty.arity {
            Some(arity) => format!("{}: {}[{arity}]", f.name, f.ty.name),
            None => format!("{}: {}", f.name, f.ty.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl Default for HtmlGenerator {
    fn default() -> Self {
        HtmlGenerator::new()
    }
}

impl CodeGenerator for HtmlGenerator {
    fn generate(&mut self, plan: &Plan) -> Result<String, CompileError> {
        self.out.clear();
        let _ = writeln!(self.out, "<!DOCTYPE html>");
        let _ = writeln!(self.out, "<html><head><meta charset=\"utf-8\">");
        let _ = writeln!(self.out, "<title>Interface Definitions</title>");
        let _ = writeln!(
            self.out,
            "<style>body {{ font-family: sans-serif; max-width: 50em; margin: auto; }} \
             .ids {{ color: #666; }}</style>"
        );
        let _ = writeln!(self.out, "</head><body>");
        let _ = writeln!(self.out, "<h1>Interface Definitions</h1>");

        for ns in &plan.namespaces {
            self.emit_namespace(plan, &ns.name, &ns.doc);
        }

        let _ = writeln!(self.out, "</body></html>");
        Ok(std::mem::take(&mut self.out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analyze, ast::Target};
    use std::path::Path;

    fn generate(source: &str) -> String {
        let plan = analyze(source, Path::new("."), &Target::default()).unwrap();
        HtmlGenerator::new().generate(&plan).unwrap()
    }

    #[test]
    fn test_message_signature_and_doc() {
        let page = generate(
            "namespace fs {\n/// Opens a file.\nrpc open(path: str) -> (fd: handle);\n}",
        );
        assert!(page.contains("rpc open(path: str) -&gt; (fd: handle)"));
        assert!(page.contains("<p>Opens a file.</p>"));
        assert!(page.contains("id 1, reply id 2"));
    }

    #[test]
    fn test_namespace_sections() {
        let page = generate("namespace fs { oneway sync(); }\noneway nop();");
        assert!(page.contains("<h2><code>fs</code></h2>"));
        assert!(page.contains("<h2><code>(global)</code></h2>"));
    }

    #[test]
    fn test_escapes_markup_in_docs() {
        let page = generate("/// Uses <vector> internally.\noneway nop();");
        assert!(page.contains("&lt;vector&gt;"));
    }
}
