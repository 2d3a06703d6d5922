use std::fmt::Write;

use crate::{
    ast::{Builtin, BulkKind, ConstDef, EnumDef, ResolvedType, TypeDef},
    error::CompileError,
    generators::{prefixed, CodeGenerator},
    layout::{FieldSet, MessagePlan, Plan, MSG_BULK, MSG_ID_OFFSET, MSG_STR},
};

/// Renders the plan into a single self-contained C header: constants,
/// typedefs, enums, per-message struct pairs, packed header macros, the
/// id-to-string dispatch table, and the static-assertion block, in that
/// order. Section order and within-section ordering follow source
/// visitation order, so output is stable across builds.
pub struct CGenerator {
    out: String,
}

impl CGenerator {
    pub fn new() -> Self {
        CGenerator { out: String::new() }
    }

    fn section(&mut self, title: &str) {
        let _ = write!(self.out, "\n//\n//  {title}\n//\n");
    }

    fn emit_consts(&mut self, consts: &[ConstDef]) -> Result<(), CompileError> {
        self.section("Constants");
        for def in consts {
            let resolved = def.resolved.as_ref().ok_or_else(|| {
                CompileError::Internal(format!("const '{}' reached codegen unresolved", def.name))
            })?;
            let name = prefixed(&def.namespace, &def.name).to_uppercase();
            let _ = writeln!(
                self.out,
                "static const {} {} = {};",
                c_type(resolved),
                name,
                def.value
            );
        }
        Ok(())
    }

    fn emit_typedefs(&mut self, typedefs: &[TypeDef]) -> Result<(), CompileError> {
        self.section("Typedefs");
        for def in typedefs {
            let resolved = def.resolved.as_ref().ok_or_else(|| {
                CompileError::Internal(format!(
                    "typedef '{}' reached codegen unresolved",
                    def.name
                ))
            })?;
            let mut line = format!(
                "typedef {} {}_t",
                c_type(resolved),
                prefixed(&def.namespace, &def.name)
            );
            if let Some(arity) = def.ty.arity {
                let _ = write!(line, "[{arity}]");
            }
            let _ = writeln!(self.out, "{line};");
        }
        Ok(())
    }

    fn emit_enums(&mut self, enums: &[EnumDef]) {
        self.section("Enums");
        for def in enums {
            let _ = writeln!(self.out, "enum {} {{", prefixed(&def.namespace, &def.name));
            for item in &def.items {
                let item_name =
                    format!("{}_{}", prefixed(&def.namespace, &def.name), item.name).to_uppercase();
                let _ = writeln!(self.out, "    {item_name} = {},", item.value);
            }
            let _ = writeln!(self.out, "}};");
        }
    }

    fn emit_fields_struct(&mut self, struct_name: &str, fields: &FieldSet) {
        let _ = writeln!(self.out, "struct {struct_name} {{");
        if let Some(bulk) = &fields.bulk {
            let ptr_type = match bulk.kind {
                BulkKind::Str => "const char *",
                BulkKind::Bytes => "const void *",
            };
            let _ = writeln!(self.out, "    {ptr_type}{};", bulk.name);
            let _ = writeln!(self.out, "    size_t {}_len;", bulk.name);
        }
        for field in &fields.inlines {
            let mut line = format!("    {} {}", c_type(&field.resolved), field.name);
            if let Some(arity) = field.arity {
                let _ = write!(line, "[{arity}]");
            }
            let _ = writeln!(self.out, "{line};");
        }
        let _ = writeln!(self.out, "}};");
    }

    fn emit_message_structs(&mut self, messages: &[MessagePlan]) {
        self.section("Message Fields");
        for msg in messages {
            let name = prefixed(&msg.namespace, &msg.name);
            self.emit_fields_struct(&format!("{name}_fields"), &msg.args);
            if !msg.oneway {
                let _ = writeln!(self.out);
                self.emit_fields_struct(&format!("{name}_reply_fields"), &msg.rets);
            }
            let _ = writeln!(self.out);
        }
    }

    fn emit_header_macros(&mut self, messages: &[MessagePlan]) {
        self.section("Message Types");
        let _ = writeln!(self.out, "#define MSG_ID_OFFSET {MSG_ID_OFFSET}");
        let _ = writeln!(self.out, "#define MSG_BULK {MSG_BULK}u");
        let _ = writeln!(self.out, "#define MSG_STR {MSG_STR}u");
        let _ = writeln!(self.out);
        for msg in messages {
            let name = prefixed(&msg.namespace, &msg.name).to_uppercase();
            let _ = writeln!(
                self.out,
                "#define {name}_MSG ({})",
                header_expr(msg.id, &msg.args)
            );
            if let Some(reply_id) = msg.reply_id {
                let _ = writeln!(
                    self.out,
                    "#define {name}_REPLY_MSG ({})",
                    header_expr(reply_id, &msg.rets)
                );
            }
        }
    }

    fn emit_macros(&mut self, plan: &Plan) {
        self.section("Macros");

        let mut members = Vec::new();
        for msg in &plan.messages {
            let name = prefixed(&msg.namespace, &msg.name);
            members.push(format!("    struct {name}_fields {name};"));
            if !msg.oneway {
                members.push(format!("    struct {name}_reply_fields {name}_reply;"));
            }
        }
        self.emit_multiline_macro("#define IDLC_MESSAGE_FIELDS", members);

        let _ = writeln!(self.out);
        let _ = writeln!(self.out, "#define IDLC_MSGID_MAX {}", plan.id_max);

        let mut table = vec!["    (const char *[]){".to_string()];
        for msg in &plan.messages {
            let qualified = msg.qualified_name();
            table.push(format!("        [{}] = \"{qualified}\",", msg.id));
            if let Some(reply_id) = msg.reply_id {
                table.push(format!("        [{reply_id}] = \"{qualified}_reply\","));
            }
        }
        table.push("    }".to_string());
        self.emit_multiline_macro("#define IDLC_MSGID2STR", table);
    }

    fn emit_static_asserts(&mut self, plan: &Plan) {
        self.section("Static Assertions");

        let mut asserts = Vec::new();
        for msg in &plan.messages {
            let name = prefixed(&msg.namespace, &msg.name);
            push_fieldset_asserts(&mut asserts, &name, &msg.args);
            if !msg.oneway {
                push_fieldset_asserts(&mut asserts, &format!("{name}_reply"), &msg.rets);
            }
        }
        self.emit_multiline_macro("#define IDLC_STATIC_ASSERTS", asserts);
    }

    /// Emits `#define NAME \` followed by backslash-continued lines, with no
    /// trailing backslash on the last one.
    fn emit_multiline_macro(&mut self, define: &str, lines: Vec<String>) {
        if lines.is_empty() {
            let _ = writeln!(self.out, "{define}");
            return;
        }
        let _ = writeln!(self.out, "{define} \\");
        let _ = writeln!(self.out, "{}", lines.join(" \\\n"));
    }
}

fn push_fieldset_asserts(asserts: &mut Vec<String>, member: &str, fields: &FieldSet) {
    if let Some(bulk) = &fields.bulk {
        asserts.push(format!(
            "    _Static_assert(offsetof(struct message, {member}.{bulk_name}) == \
             offsetof(struct message, bulk_ptr), \
             \"'{member}.{bulk_name}' must line up with the envelope bulk pointer\");",
            bulk_name = bulk.name
        ));
        asserts.push(format!(
            "    _Static_assert(offsetof(struct message, {member}.{bulk_name}_len) == \
             offsetof(struct message, bulk_len), \
             \"'{member}.{bulk_name}_len' must line up with the envelope bulk length\");",
            bulk_name = bulk.name
        ));
    }
    asserts.push(format!(
        "    _Static_assert(sizeof(struct {member}_fields) < 4096, \
         \"'{member}' message is too large, should be less than 4096 bytes\");"
    ));
}

/// The packed header expression, spelled symbolically so the generated
/// header documents its own bit layout.
fn header_expr(id: u32, fields: &FieldSet) -> String {
    let mut expr = format!("({id} << MSG_ID_OFFSET)");
    if let Some(bulk) = &fields.bulk {
        expr.push_str(" | MSG_BULK");
        if bulk.is_string() {
            expr.push_str(" | MSG_STR");
        }
    }
    expr
}

fn c_type(resolved: &ResolvedType) -> String {
    match resolved {
        ResolvedType::Builtin(builtin) => builtin_c_type(*builtin).to_string(),
        ResolvedType::Enum { namespace, name } => format!("enum {}", prefixed(namespace, name)),
        ResolvedType::Alias {
            namespace, name, ..
        } => format!("{}_t", prefixed(namespace, name)),
    }
}

fn builtin_c_type(builtin: Builtin) -> &'static str {
    match builtin {
        Builtin::Int8 => "int8_t",
        Builtin::Int16 => "int16_t",
        Builtin::Int32 => "int32_t",
        Builtin::Int64 => "int64_t",
        Builtin::UInt8 => "uint8_t",
        Builtin::UInt16 => "uint16_t",
        Builtin::UInt32 => "uint32_t",
        Builtin::UInt64 => "uint64_t",
        Builtin::Char => "char",
        Builtin::Bool => "bool",
        Builtin::IntMax => "intmax_t",
        Builtin::UIntMax => "uintmax_t",
        Builtin::Size => "size_t",
        Builtin::UIntPtr => "uintptr_t",
        Builtin::PAddr => "paddr_t",
        Builtin::Cid => "cid_t",
        Builtin::Handle => "handle_t",
        Builtin::Task => "task_t",
        Builtin::Str => "const char *",
        Builtin::Bytes => "const void *",
    }
}

impl Default for CGenerator {
    fn default() -> Self {
        CGenerator::new()
    }
}

impl CodeGenerator for CGenerator {
    fn generate(&mut self, plan: &Plan) -> Result<String, CompileError> {
        self.out.clear();
        let _ = writeln!(self.out, "#pragma once");
        let _ = writeln!(self.out, "//");
        let _ = writeln!(self.out, "//  Generated by idlc. DO NOT EDIT!");
        let _ = writeln!(self.out, "//");
        let _ = writeln!(self.out, "#include <types.h>");

        self.emit_consts(&plan.consts)?;
        self.emit_typedefs(&plan.typedefs)?;
        self.emit_enums(&plan.enums);
        self.emit_message_structs(&plan.messages);
        self.emit_header_macros(&plan.messages);
        self.emit_macros(plan);
        self.emit_static_asserts(plan);

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
        CGenerator::new().generate(&plan).unwrap()
    }

    #[test]
    fn test_bulk_field_renders_first_as_pointer_and_length() {
        let header = generate("namespace fs { rpc open(flags: int32, path: str) -> (fd: handle); }");
        let open_struct = header
            .split("struct fs_open_fields {")
            .nth(1)
            .unwrap()
            .split("};")
            .next()
            .unwrap();
        let lines: Vec<&str> = open_struct.trim().lines().map(str::trim).collect();
        assert_eq!(
            lines,
            vec!["const char *path;", "size_t path_len;", "int32_t flags;"]
        );
    }

    #[test]
    fn test_header_macros_encode_flags() {
        let header = generate("oneway log(msg: str);\noneway raw(data: bytes);");
        assert!(header.contains("#define LOG_MSG ((1 << MSG_ID_OFFSET) | MSG_BULK | MSG_STR)"));
        assert!(header.contains("#define RAW_MSG ((2 << MSG_ID_OFFSET) | MSG_BULK)"));
    }

    #[test]
    fn test_dispatch_table_covers_reply_ids() {
        let header = generate("namespace fs { rpc open(path: str) -> (fd: handle); }");
        assert!(header.contains("#define IDLC_MSGID_MAX 2"));
        assert!(header.contains("[1] = \"fs.open\","));
        assert!(header.contains("[2] = \"fs.open_reply\","));
    }

    #[test]
    fn test_static_asserts_pin_bulk_offsets() {
        let header = generate("namespace fs { rpc open(path: str) -> (fd: handle); }");
        assert!(header.contains(
            "offsetof(struct message, fs_open.path) == offsetof(struct message, bulk_ptr)"
        ));
        assert!(header.contains(
            "offsetof(struct message, fs_open.path_len) == offsetof(struct message, bulk_len)"
        ));
    }

    #[test]
    fn test_enum_and_typedef_rendering() {
        let header = generate(
            "namespace fs { enum filetype { REG = 1, DIR = 2 }; type buf = uint8[16]; }",
        );
        assert!(header.contains("enum fs_filetype {"));
        assert!(header.contains("    FS_FILETYPE_REG = 1,"));
        assert!(header.contains("typedef uint8_t fs_buf_t[16];"));
    }

    #[test]
    fn test_const_rendering() {
        let header = generate("namespace fs { const MAX_PATH: size = 256; }");
        assert!(header.contains("static const size_t FS_MAX_PATH = 256;"));
    }

    #[test]
    fn test_oneway_has_no_reply_struct() {
        let header = generate("oneway log(msg: str);");
        assert!(header.contains("struct log_fields {"));
        assert!(!header.contains("log_reply"));
    }
}
