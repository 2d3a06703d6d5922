use std::collections::HashMap;

use crate::{
    ast::{Builtin, BulkKind, ResolvedType, Target, TypeRef, Unit, ENUM_BYTE_SIZE},
    error::CompileError,
};

/// What a user-defined type name stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Enum,
    Alias,
}

#[derive(Debug, Clone)]
struct Symbol {
    kind: SymbolKind,
    /// The *defining* namespace; resolution is fully qualified, so a
    /// cross-namespace reference still renders the defining prefix.
    namespace: String,
}

/// Resolves every field, const, and typedef type reference in the unit.
///
/// Two passes: first collect all enum and typedef names into a flat symbol
/// table (order-independent, so forward references work), then resolve every
/// reference against the builtin table, the enums, and the typedefs,
/// following alias chains to a terminal width.
pub fn resolve(unit: &mut Unit, target: &Target) -> Result<(), CompileError> {
    let resolver = Resolver::collect(unit)?;

    for i in 0..unit.typedefs.len() {
        let context = format!("typedef '{}'", qualified(&unit.typedefs[i].namespace, &unit.typedefs[i].name));
        let resolved = resolver.resolve_ref(&unit.typedefs[i].ty, &context, target)?;
        unit.typedefs[i].resolved = Some(resolved);
    }

    for def in &mut unit.consts {
        let context = format!("const '{}'", qualified(&def.namespace, &def.name));
        if def.ty.arity.is_some() {
            return Err(CompileError::semantic(format!(
                "{context}: array types are not allowed for constants"
            )));
        }
        def.resolved = Some(resolver.resolve_ref(&def.ty, &context, target)?);
    }

    for msg in &mut unit.messages {
        let msg_name = qualified(&msg.namespace, &msg.name);
        for field in msg.args.iter_mut() {
            let context = format!("field '{}' in message '{msg_name}'", field.name);
            field.resolved = Some(resolver.resolve_ref(&field.ty, &context, target)?);
        }
        for field in msg.rets.iter_mut().flatten() {
            let context = format!("field '{}' in reply of message '{msg_name}'", field.name);
            field.resolved = Some(resolver.resolve_ref(&field.ty, &context, target)?);
        }
    }

    Ok(())
}

fn qualified(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

struct Resolver {
    symbols: HashMap<String, Symbol>,
    /// Typedef name -> its aliasee reference, for chain following.
    aliasees: HashMap<String, TypeRef>,
}

impl Resolver {
    /// Pass 1: the flat user-type symbol table. All user-type names share
    /// one namespace-independent table, so a duplicate name anywhere is a
    /// naming collision.
    fn collect(unit: &Unit) -> Result<Resolver, CompileError> {
        let mut symbols: HashMap<String, Symbol> = HashMap::new();
        let mut aliasees = HashMap::new();

        let mut insert = |name: &str, symbol: Symbol| -> Result<(), CompileError> {
            if let Some(existing) = symbols.get(name) {
                return Err(CompileError::semantic(format!(
                    "user type '{name}' is defined twice (in namespace '{}' and '{}')",
                    display_ns(&existing.namespace),
                    display_ns(&symbol.namespace),
                )));
            }
            symbols.insert(name.to_string(), symbol);
            Ok(())
        };

        for def in &unit.enums {
            insert(
                &def.name,
                Symbol {
                    kind: SymbolKind::Enum,
                    namespace: def.namespace.clone(),
                },
            )?;
        }
        for def in &unit.typedefs {
            insert(
                &def.name,
                Symbol {
                    kind: SymbolKind::Alias,
                    namespace: def.namespace.clone(),
                },
            )?;
            aliasees.insert(def.name.clone(), def.ty.clone());
        }

        Ok(Resolver { symbols, aliasees })
    }

    /// Pass 2: one reference. Builtins win over nothing (user types may not
    /// shadow them since duplicates with builtin names simply never match
    /// first); unknown names are a hard error naming the referencing
    /// declaration.
    fn resolve_ref(
        &self,
        ty: &TypeRef,
        context: &str,
        target: &Target,
    ) -> Result<ResolvedType, CompileError> {
        if let Some(builtin) = Builtin::from_name(&ty.name) {
            return Ok(ResolvedType::Builtin(builtin));
        }

        match self.symbols.get(&ty.name) {
            Some(symbol) if symbol.kind == SymbolKind::Enum => Ok(ResolvedType::Enum {
                namespace: symbol.namespace.clone(),
                name: ty.name.clone(),
            }),
            Some(symbol) => {
                let mut visiting = Vec::new();
                let (width, bulk) = self.terminal_of(&ty.name, context, target, &mut visiting)?;
                Ok(ResolvedType::Alias {
                    namespace: symbol.namespace.clone(),
                    name: ty.name.clone(),
                    width,
                    bulk,
                })
            }
            None => Err(CompileError::semantic(format!(
                "unknown data type '{}' ({context})",
                ty.name
            ))),
        }
    }

    /// Follows a typedef's alias chain to its terminal byte width and bulk
    /// classification. Each link's declared arity multiplies the width.
    fn terminal_of(
        &self,
        name: &str,
        context: &str,
        target: &Target,
        visiting: &mut Vec<String>,
    ) -> Result<(usize, Option<BulkKind>), CompileError> {
        if visiting.iter().any(|n| n == name) {
            let chain = visiting
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(name))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(CompileError::semantic(format!(
                "cyclic typedef: {chain}"
            )));
        }
        visiting.push(name.to_string());

        let aliasee = self
            .aliasees
            .get(name)
            .ok_or_else(|| CompileError::Internal(format!("typedef '{name}' has no aliasee")))?;

        let (base_width, bulk) = if let Some(builtin) = Builtin::from_name(&aliasee.name) {
            let bulk = match builtin {
                Builtin::Str => Some(BulkKind::Str),
                Builtin::Bytes => Some(BulkKind::Bytes),
                _ => None,
            };
            (builtin.byte_size(target), bulk)
        } else {
            match self.symbols.get(&aliasee.name) {
                Some(symbol) if symbol.kind == SymbolKind::Enum => (ENUM_BYTE_SIZE, None),
                Some(_) => self.terminal_of(&aliasee.name, context, target, visiting)?,
                None => {
                    return Err(CompileError::semantic(format!(
                        "unknown data type '{}' (aliased by typedef '{name}', {context})",
                        aliasee.name
                    )));
                }
            }
        };

        visiting.pop();
        Ok((base_width * aliasee.arity.unwrap_or(1) as usize, bulk))
    }
}

fn display_ns(namespace: &str) -> &str {
    if namespace.is_empty() {
        "(global)"
    } else {
        namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder, parser::Parser};
    use std::path::Path;

    fn resolve_source(source: &str) -> Result<Unit, CompileError> {
        let stmts = Parser::new(source).parse_unit()?;
        let mut unit = builder::build(stmts, Path::new("."))?;
        resolve(&mut unit, &Target::default())?;
        Ok(unit)
    }

    #[test]
    fn test_builtin_field_resolves() {
        let unit = resolve_source("oneway log(level: int32);").unwrap();
        assert_eq!(
            unit.messages[0].args[0].resolved,
            Some(ResolvedType::Builtin(Builtin::Int32))
        );
    }

    #[test]
    fn test_enum_reference_resolves_with_defining_namespace() {
        let unit = resolve_source(
            "namespace fs { enum filetype { REG = 1 }; }\noneway stat(kind: filetype);",
        )
        .unwrap();
        assert_eq!(
            unit.messages[0].args[0].resolved,
            Some(ResolvedType::Enum {
                namespace: "fs".to_string(),
                name: "filetype".to_string()
            })
        );
    }

    #[test]
    fn test_alias_of_enum_resolves_to_enum_width() {
        let unit = resolve_source(
            "enum color { RED = 0, GREEN = 1 };\ntype colort = color;\noneway paint(c: colort);",
        )
        .unwrap();
        let resolved = unit.messages[0].args[0].resolved.as_ref().unwrap();
        assert_eq!(resolved.byte_size(&Target::default()), ENUM_BYTE_SIZE);
        assert_eq!(resolved.bulk_kind(), None);
    }

    #[test]
    fn test_alias_chain_multiplies_arity() {
        let unit = resolve_source("type sector = uint8[512];\noneway write(data: sector);").unwrap();
        let resolved = unit.messages[0].args[0].resolved.as_ref().unwrap();
        assert_eq!(resolved.byte_size(&Target::default()), 512);
    }

    #[test]
    fn test_alias_of_str_is_bulk() {
        let unit = resolve_source("type path = str;\noneway open(p: path);").unwrap();
        let resolved = unit.messages[0].args[0].resolved.as_ref().unwrap();
        assert_eq!(resolved.bulk_kind(), Some(BulkKind::Str));
    }

    #[test]
    fn test_unknown_type_names_field_and_message() {
        let err = resolve_source("namespace fs { rpc open(path: pathname) -> (); }").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pathname"));
        assert!(msg.contains("path"));
        assert!(msg.contains("fs.open"));
    }

    #[test]
    fn test_duplicate_user_type_is_an_error() {
        let err = resolve_source(
            "namespace a { enum kind { X = 1 }; }\nnamespace b { type kind = int32; }",
        )
        .unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_cyclic_typedef_is_an_error() {
        let err = resolve_source("type a = b;\ntype b = a;\noneway f(x: a);").unwrap_err();
        assert!(err.to_string().contains("cyclic typedef"));
    }

    #[test]
    fn test_const_with_array_type_is_rejected() {
        let err = resolve_source("const X: uint8[4] = 1;").unwrap_err();
        assert!(err.to_string().contains("array types"));
    }
}
