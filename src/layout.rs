use std::collections::HashSet;

use crate::{
    ast::{
        Builtin, BulkKind, ConstDef, EnumDef, Field, MessageDef, NamespaceDef, ResolvedType,
        Target, TypeDef, Unit,
    },
    error::CompileError,
};

/// Bit position of the message id inside the packed header word. The low
/// bits carry the flags. This layout is part of the wire contract: the IPC
/// runtime inspects it at dispatch time.
pub const MSG_ID_OFFSET: u32 = 16;
/// Flag: the message carries a bulk (out-of-band) payload.
pub const MSG_BULK: u32 = 1 << 0;
/// Flag: the bulk payload is NUL-terminated text rather than opaque bytes.
pub const MSG_STR: u32 = 1 << 1;

/// Fixed offsets of the bulk pointer+length slot shared by every message,
/// relative to the start of the per-message fields struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub bulk_ptr_offset: usize,
    pub bulk_len_offset: usize,
}

impl Envelope {
    pub fn for_target(target: &Target) -> Envelope {
        Envelope {
            bulk_ptr_offset: 0,
            bulk_len_offset: target.pointer_size,
        }
    }
}

/// Hands out globally unique message ids, one invocation's worth. Ids are
/// assigned sequentially in visitation order starting at 1, so reordering
/// declarations changes the wire protocol.
struct MsgIdAllocator {
    next: u32,
}

impl MsgIdAllocator {
    fn new() -> Self {
        MsgIdAllocator { next: 1 }
    }

    fn alloc(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    fn max_assigned(&self) -> u32 {
        self.next - 1
    }
}

/// The bulk field of a field set, if any.
#[derive(Debug, PartialEq, Clone)]
pub struct BulkField {
    pub name: String,
    pub kind: BulkKind,
}

impl BulkField {
    pub fn is_string(&self) -> bool {
        self.kind == BulkKind::Str
    }
}

/// An inline field with its computed layout.
#[derive(Debug, PartialEq, Clone)]
pub struct InlineField {
    pub name: String,
    pub resolved: ResolvedType,
    pub arity: Option<u64>,
    /// Byte offset within the fields struct (after the bulk slot, if any).
    pub offset: usize,
    pub size: usize,
}

/// A planned field set: the declared fields in source order plus the
/// bulk/inline classification and computed offsets.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct FieldSet {
    pub fields: Vec<Field>,
    pub bulk: Option<BulkField>,
    pub inlines: Vec<InlineField>,
    /// Total inline payload size; excludes the bulk pointer+length pair.
    pub inline_size: usize,
}

/// A message with everything the generators need: ids, classification, and
/// the packed header words.
#[derive(Debug, PartialEq, Clone)]
pub struct MessagePlan {
    pub name: String,
    pub namespace: String,
    pub doc: String,
    pub oneway: bool,
    pub id: u32,
    pub reply_id: Option<u32>,
    pub args: FieldSet,
    pub rets: FieldSet,
}

impl MessagePlan {
    /// `"namespace.message"`, the diagnostics spelling.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn header(&self) -> u32 {
        packed_header(self.id, &self.args)
    }

    pub fn reply_header(&self) -> Option<u32> {
        self.reply_id.map(|id| packed_header(id, &self.rets))
    }
}

/// Packs `(id << MSG_ID_OFFSET) | flags` the way the runtime expects it.
pub fn packed_header(id: u32, fields: &FieldSet) -> u32 {
    let mut header = id << MSG_ID_OFFSET;
    if let Some(bulk) = &fields.bulk {
        header |= MSG_BULK;
        if bulk.is_string() {
            header |= MSG_STR;
        }
    }
    header
}

/// The fully planned compilation unit handed to the code generators.
#[derive(Debug, PartialEq)]
pub struct Plan {
    pub namespaces: Vec<NamespaceDef>,
    pub consts: Vec<ConstDef>,
    pub typedefs: Vec<TypeDef>,
    pub enums: Vec<EnumDef>,
    pub messages: Vec<MessagePlan>,
    pub id_max: u32,
    pub target: Target,
    pub envelope: Envelope,
}

/// Runs the layout pass over a resolved unit: classifies fields, enforces
/// the per-message invariants, and assigns ids.
pub fn plan(unit: Unit, target: &Target) -> Result<Plan, CompileError> {
    let envelope = Envelope::for_target(target);
    let mut ids = MsgIdAllocator::new();
    let mut messages = Vec::with_capacity(unit.messages.len());

    for msg in &unit.messages {
        messages.push(plan_message(msg, &mut ids, target, &envelope)?);
    }

    let id_max = ids.max_assigned();
    verify_ids(&messages, id_max)?;

    Ok(Plan {
        namespaces: unit.namespaces,
        consts: unit.consts,
        typedefs: unit.typedefs,
        enums: unit.enums,
        messages,
        id_max,
        target: target.clone(),
        envelope,
    })
}

fn plan_message(
    msg: &MessageDef,
    ids: &mut MsgIdAllocator,
    target: &Target,
    envelope: &Envelope,
) -> Result<MessagePlan, CompileError> {
    let qualified = if msg.namespace.is_empty() {
        msg.name.clone()
    } else {
        format!("{}.{}", msg.namespace, msg.name)
    };

    let args = plan_fields(&msg.args, &qualified, target, envelope)?;
    let id = ids.alloc();

    let (rets, reply_id) = match (&msg.rets, msg.oneway()) {
        (Some(fields), false) => {
            let rets = plan_fields(fields, &qualified, target, envelope)?;
            (rets, Some(ids.alloc()))
        }
        (None, true) => (FieldSet::default(), None),
        (None, false) => {
            return Err(CompileError::semantic_with_hint(
                format!("{qualified}: return values are not specified"),
                "Add '-> ()' or consider defining it as 'oneway' message",
            ));
        }
        (Some(_), true) => {
            return Err(CompileError::semantic_with_hint(
                format!("{qualified}: a oneway message cannot have return values"),
                "Remove the '-> (...)' clause or define the message as 'rpc'",
            ));
        }
    };

    Ok(MessagePlan {
        name: msg.name.clone(),
        namespace: msg.namespace.clone(),
        doc: msg.doc.clone(),
        oneway: msg.oneway(),
        id,
        reply_id,
        args,
        rets,
    })
}

/// Classifies a field list into the bulk field (at most one) and the inline
/// fields, and computes inline byte offsets. Inline fields start right
/// after the envelope's bulk slot when a bulk field is present, so the bulk
/// pointer+length pair always sits at the envelope offsets.
fn plan_fields(
    fields: &[Field],
    message: &str,
    target: &Target,
    envelope: &Envelope,
) -> Result<FieldSet, CompileError> {
    let mut bulk: Option<BulkField> = None;
    let mut pending = Vec::new();

    for field in fields {
        let resolved = field.resolved.as_ref().ok_or_else(|| {
            CompileError::Internal(format!(
                "field '{}' in '{message}' reached layout unresolved",
                field.name
            ))
        })?;

        if let Some(kind) = resolved.bulk_kind() {
            if field.ty.arity.is_some() {
                return Err(CompileError::semantic(format!(
                    "{message}: bulk field '{}' cannot have an array arity",
                    field.name
                )));
            }
            if let Some(existing) = &bulk {
                return Err(CompileError::semantic(format!(
                    "{message}: multiple bulk fields are not allowed: '{}', '{}'",
                    existing.name, field.name
                )));
            }
            bulk = Some(BulkField {
                name: field.name.clone(),
                kind,
            });
        } else {
            pending.push((field, resolved.clone()));
        }
    }

    let base = if bulk.is_some() {
        envelope.bulk_len_offset + Builtin::Size.byte_size(target)
    } else {
        0
    };

    let mut inlines = Vec::with_capacity(pending.len());
    let mut offset = base;
    for (field, resolved) in pending {
        let size = resolved.byte_size(target) * field.ty.arity.unwrap_or(1) as usize;
        inlines.push(InlineField {
            name: field.name.clone(),
            resolved,
            arity: field.ty.arity,
            offset,
            size,
        });
        offset += size;
    }

    Ok(FieldSet {
        fields: fields.to_vec(),
        inline_size: offset - base,
        bulk,
        inlines,
    })
}

/// Id uniqueness is guaranteed by construction; a violation here means the
/// allocator desynchronized, which is a compiler bug.
fn verify_ids(messages: &[MessagePlan], id_max: u32) -> Result<(), CompileError> {
    let mut seen = HashSet::new();
    for msg in messages {
        for id in std::iter::once(msg.id).chain(msg.reply_id) {
            if id == 0 || id > id_max || !seen.insert(id) {
                return Err(CompileError::Internal(format!(
                    "message id {id} assigned to '{}' is out of range or duplicated",
                    msg.qualified_name()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder, parser::Parser, resolver};
    use std::path::Path;

    fn plan_source(source: &str) -> Result<Plan, CompileError> {
        let stmts = Parser::new(source).parse_unit()?;
        let mut unit = builder::build(stmts, Path::new("."))?;
        resolver::resolve(&mut unit, &Target::default())?;
        plan(unit, &Target::default())
    }

    #[test]
    fn test_rpc_consumes_two_ids() {
        let plan = plan_source("rpc ping() -> (value: int32);").unwrap();
        let msg = &plan.messages[0];
        assert_eq!(msg.id, 1);
        assert_eq!(msg.reply_id, Some(2));
        assert_eq!(plan.id_max, 2);
        assert_eq!(msg.rets.inlines[0].size, 4);
    }

    #[test]
    fn test_oneway_consumes_one_id() {
        let plan = plan_source("oneway log(msg: str);\nrpc ping() -> ();").unwrap();
        assert_eq!(plan.messages[0].id, 1);
        assert_eq!(plan.messages[0].reply_id, None);
        assert_eq!(plan.messages[1].id, 2);
        assert_eq!(plan.messages[1].reply_id, Some(3));
        assert_eq!(plan.id_max, 3);
    }

    #[test]
    fn test_ids_are_globally_unique() {
        let plan = plan_source(
            "rpc a() -> ();\noneway b();\nnamespace ns { rpc c(x: int32) -> (y: int32); }",
        )
        .unwrap();
        let mut seen = std::collections::HashSet::new();
        for msg in &plan.messages {
            assert!(seen.insert(msg.id));
            if let Some(reply_id) = msg.reply_id {
                assert!(seen.insert(reply_id));
            }
        }
        assert_eq!(plan.id_max as usize, seen.len());
    }

    #[test]
    fn test_bulk_field_classification() {
        let plan = plan_source("oneway log(msg: str);").unwrap();
        let args = &plan.messages[0].args;
        let bulk = args.bulk.as_ref().unwrap();
        assert_eq!(bulk.name, "msg");
        assert!(bulk.is_string());
        assert!(args.inlines.is_empty());
        assert_eq!(args.inline_size, 0);
    }

    #[test]
    fn test_second_bulk_field_names_both() {
        let err = plan_source("oneway copy(src: str, dst: str);").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'src'"));
        assert!(msg.contains("'dst'"));
        assert!(msg.contains("multiple bulk fields"));
    }

    #[test]
    fn test_missing_return_clause_is_rejected_with_hint() {
        let err = plan_source("rpc foo(x: int32);").unwrap_err();
        assert!(err.to_string().contains("return values are not specified"));
        assert_eq!(
            err.hint(),
            Some("Add '-> ()' or consider defining it as 'oneway' message")
        );
    }

    #[test]
    fn test_oneway_with_return_clause_is_rejected() {
        let err = plan_source("oneway bad() -> (x: int32);").unwrap_err();
        assert!(err.to_string().contains("cannot have return values"));
    }

    #[test]
    fn test_async_rpc_is_laid_out_as_oneway() {
        let plan = plan_source("async rpc exited(status: int32);").unwrap();
        assert_eq!(plan.messages[0].reply_id, None);
        assert_eq!(plan.id_max, 1);
    }

    #[test]
    fn test_inline_offsets_follow_bulk_slot() {
        let plan = plan_source("oneway write(data: bytes, offset: int64, count: uint32);").unwrap();
        let args = &plan.messages[0].args;
        // bulk ptr at 0, size_t len at 8, inlines from 16.
        assert_eq!(plan.envelope.bulk_ptr_offset, 0);
        assert_eq!(plan.envelope.bulk_len_offset, 8);
        assert_eq!(args.inlines[0].offset, 16);
        assert_eq!(args.inlines[1].offset, 24);
        assert_eq!(args.inline_size, 12);
    }

    #[test]
    fn test_inline_offsets_without_bulk_start_at_zero() {
        let plan = plan_source("oneway seek(pos: int64, whence: int32);").unwrap();
        let args = &plan.messages[0].args;
        assert_eq!(args.inlines[0].offset, 0);
        assert_eq!(args.inlines[1].offset, 8);
    }

    #[test]
    fn test_packed_header_bits() {
        let plan = plan_source("oneway log(msg: str);\noneway raw(data: bytes);\nrpc ping() -> ();")
            .unwrap();
        assert_eq!(
            plan.messages[0].header(),
            (1 << MSG_ID_OFFSET) | MSG_BULK | MSG_STR
        );
        assert_eq!(plan.messages[1].header(), (2 << MSG_ID_OFFSET) | MSG_BULK);
        assert_eq!(plan.messages[2].header(), 3 << MSG_ID_OFFSET);
        assert_eq!(plan.messages[2].reply_header(), Some(4 << MSG_ID_OFFSET));
    }

    #[test]
    fn test_array_arity_multiplies_width() {
        let plan = plan_source("oneway mac(addr: uint8[6]);").unwrap();
        assert_eq!(plan.messages[0].args.inlines[0].size, 6);
    }

    #[test]
    fn test_bulk_array_is_rejected() {
        let err = plan_source("oneway bad(data: bytes[4]);").unwrap_err();
        assert!(err.to_string().contains("array arity"));
    }
}
