/// Builtin primitive types with fixed byte widths.
///
/// The widths are load-bearing for struct layout: the resolver must honor
/// them exactly. `Str` and `Bytes` are the bulk (out-of-band) builtins; they
/// contribute a pointer+length pair instead of inline bytes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Builtin {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Char,
    Bool,
    IntMax,
    UIntMax,
    Size,
    UIntPtr,
    PAddr,
    Cid,
    Handle,
    Task,
    Str,
    Bytes,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        let builtin = match name {
            "int8" => Builtin::Int8,
            "int16" => Builtin::Int16,
            "int32" => Builtin::Int32,
            "int64" => Builtin::Int64,
            "uint8" => Builtin::UInt8,
            "uint16" => Builtin::UInt16,
            "uint32" => Builtin::UInt32,
            "uint64" => Builtin::UInt64,
            "char" => Builtin::Char,
            "bool" => Builtin::Bool,
            "intmax" => Builtin::IntMax,
            "uintmax" => Builtin::UIntMax,
            "size" => Builtin::Size,
            "uintptr" => Builtin::UIntPtr,
            "paddr" => Builtin::PAddr,
            "cid" => Builtin::Cid,
            "handle" => Builtin::Handle,
            "task" => Builtin::Task,
            "str" => Builtin::Str,
            "bytes" => Builtin::Bytes,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, Builtin::Str | Builtin::Bytes)
    }

    /// Inline byte width. Bulk builtins occupy no inline bytes; their
    /// pointer+length pair lives in the envelope's bulk slot.
    pub fn byte_size(&self, target: &Target) -> usize {
        match self {
            Builtin::Int8 | Builtin::UInt8 | Builtin::Char | Builtin::Bool => 1,
            Builtin::Int16 | Builtin::UInt16 => 2,
            Builtin::Int32 | Builtin::UInt32 => 4,
            Builtin::Int64
            | Builtin::UInt64
            | Builtin::IntMax
            | Builtin::UIntMax
            | Builtin::Size
            | Builtin::UIntPtr
            | Builtin::PAddr => 8,
            Builtin::Cid | Builtin::Handle | Builtin::Task => target.handle_size,
            Builtin::Str | Builtin::Bytes => 0,
        }
    }
}

/// Inline width of an enum-typed field (C `enum`).
pub const ENUM_BYTE_SIZE: usize = 4;

/// Target ABI parameters the layout depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// Byte width of the kernel object handles (`cid`, `handle`, `task`).
    pub handle_size: usize,
    /// Byte width of a data pointer, used for the envelope's bulk slot.
    pub pointer_size: usize,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            handle_size: 4,
            pointer_size: 8,
        }
    }
}

/// An unresolved type reference as written in source: a name plus an
/// optional fixed array arity.
#[derive(Debug, PartialEq, Clone)]
pub struct TypeRef {
    pub name: String,
    pub arity: Option<u64>,
}

/// What a bulk field carries: opaque bytes or NUL-terminated text.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BulkKind {
    Bytes,
    Str,
}

/// A fully resolved type reference.
#[derive(Debug, PartialEq, Clone)]
pub enum ResolvedType {
    Builtin(Builtin),
    Enum {
        namespace: String,
        name: String,
    },
    /// A typedef, resolved through its alias chain to a terminal width.
    Alias {
        namespace: String,
        name: String,
        width: usize,
        bulk: Option<BulkKind>,
    },
}

impl ResolvedType {
    pub fn bulk_kind(&self) -> Option<BulkKind> {
        match self {
            ResolvedType::Builtin(Builtin::Str) => Some(BulkKind::Str),
            ResolvedType::Builtin(Builtin::Bytes) => Some(BulkKind::Bytes),
            ResolvedType::Builtin(_) | ResolvedType::Enum { .. } => None,
            ResolvedType::Alias { bulk, .. } => *bulk,
        }
    }

    /// Inline byte width, not counting the referencing field's own arity.
    pub fn byte_size(&self, target: &Target) -> usize {
        match self {
            ResolvedType::Builtin(b) => b.byte_size(target),
            ResolvedType::Enum { .. } => ENUM_BYTE_SIZE,
            ResolvedType::Alias { width, .. } => *width,
        }
    }
}

/// A message field. `resolved` is filled in by the resolver pass; the
/// generator treats a missing resolution as an internal invariant violation.
#[derive(Debug, PartialEq, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub resolved: Option<ResolvedType>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Field {
            name: name.into(),
            ty,
            resolved: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MessageKind {
    Rpc,
    Oneway,
}

/// A message declaration.
///
/// `rets` distinguishes "no `->` clause at all" (`None`, only legal for
/// oneway messages) from an explicit empty `-> ()` (`Some(vec![])`).
#[derive(Debug, PartialEq, Clone)]
pub struct MessageDef {
    pub name: String,
    pub namespace: String,
    pub doc: String,
    pub kind: MessageKind,
    pub is_async: bool,
    pub args: Vec<Field>,
    pub rets: Option<Vec<Field>>,
}

impl MessageDef {
    /// `async` is semantically equivalent to oneway for id and layout
    /// purposes.
    pub fn oneway(&self) -> bool {
        self.kind == MessageKind::Oneway || self.is_async
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct EnumItem {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct EnumDef {
    pub name: String,
    pub namespace: String,
    pub doc: String,
    pub items: Vec<EnumItem>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TypeDef {
    pub name: String,
    pub namespace: String,
    pub doc: String,
    pub ty: TypeRef,
    pub resolved: Option<ResolvedType>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ConstDef {
    pub name: String,
    pub namespace: String,
    pub doc: String,
    pub ty: TypeRef,
    pub value: u64,
    pub resolved: Option<ResolvedType>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NamespaceDef {
    pub name: String,
    pub doc: String,
}

/// One statement as parsed from source, before namespace flattening, doc
/// attachment, and include expansion.
#[derive(Debug, PartialEq)]
pub enum Stmt {
    /// One accumulated block of consecutive `///` lines.
    Doc(String),
    Namespace { name: String, body: Vec<Stmt> },
    Include { pattern: String },
    Message(MessageDef),
    Enum(EnumDef),
    TypeDef(TypeDef),
    Const(ConstDef),
}

/// The fully merged compilation unit: every included file spliced in,
/// namespaces flattened, doc comments attached.
///
/// All lists are in source visitation order. Id assignment depends on that
/// order, so it must never be re-sorted.
#[derive(Debug, Default, PartialEq)]
pub struct Unit {
    pub namespaces: Vec<NamespaceDef>,
    pub messages: Vec<MessageDef>,
    pub consts: Vec<ConstDef>,
    pub typedefs: Vec<TypeDef>,
    pub enums: Vec<EnumDef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_widths() {
        let target = Target::default();
        assert_eq!(Builtin::Bool.byte_size(&target), 1);
        assert_eq!(Builtin::UInt16.byte_size(&target), 2);
        assert_eq!(Builtin::Int32.byte_size(&target), 4);
        assert_eq!(Builtin::PAddr.byte_size(&target), 8);
        assert_eq!(Builtin::Handle.byte_size(&target), 4);

        let wide = Target {
            handle_size: 8,
            ..Target::default()
        };
        assert_eq!(Builtin::Task.byte_size(&wide), 8);
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(Builtin::from_name("uint64"), Some(Builtin::UInt64));
        assert_eq!(Builtin::from_name("str"), Some(Builtin::Str));
        assert_eq!(Builtin::from_name("u64"), None);
    }

    #[test]
    fn test_bulk_kinds() {
        assert!(Builtin::Str.is_bulk());
        assert!(Builtin::Bytes.is_bulk());
        assert!(!Builtin::Size.is_bulk());

        let alias = ResolvedType::Alias {
            namespace: String::new(),
            name: "path".to_string(),
            width: 0,
            bulk: Some(BulkKind::Str),
        };
        assert_eq!(alias.bulk_kind(), Some(BulkKind::Str));
    }

    #[test]
    fn test_async_is_oneway() {
        let msg = MessageDef {
            name: "notify".to_string(),
            namespace: String::new(),
            doc: String::new(),
            kind: MessageKind::Rpc,
            is_async: true,
            args: vec![],
            rets: None,
        };
        assert!(msg.oneway());
    }
}
