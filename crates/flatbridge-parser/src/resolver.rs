//! Type resolution: turns a declared type string into a [`TypeAnalysis`].
//!
//! Rules are tried in a fixed order and the first match wins. A string no rule
//! matches is an error, never a silent default.

use flatbridge_ast::{BridgeError, Category, Dialect, Result, Scope, TypeAnalysis};

/// Primitive spellings and their ABI spelling.
const PRIMITIVES: &[(&str, &str)] = &[
    ("char", "char"),
    ("int", "int"),
    ("long", "long"),
    ("long long", "long long"),
    ("unsigned", "unsigned"),
    ("unsigned int", "unsigned int"),
    ("unsigned long", "unsigned long"),
    ("float", "float"),
    ("double", "double"),
    ("size_t", "size_t"),
    ("time_t", "time_t"),
    ("char16_t", "char16_t"),
    ("int8", "int8_t"),
    ("uint8", "uint8_t"),
    ("int16", "int16_t"),
    ("uint16", "uint16_t"),
    ("int32", "int32_t"),
    ("uint32", "uint32_t"),
    ("int64", "int64_t"),
    ("uint64", "uint64_t"),
    ("int8_t", "int8_t"),
    ("uint8_t", "uint8_t"),
    ("int16_t", "int16_t"),
    ("uint16_t", "uint16_t"),
    ("int32_t", "int32_t"),
    ("uint32_t", "uint32_t"),
    ("int64_t", "int64_t"),
    ("uint64_t", "uint64_t"),
    ("void", "void"),
];

const SEQUENCE: &str = "std::vector";
const MAP: &str = "std::map";
const MULTIMAP: &str = "std::multimap";

/// Every primitive spelling the resolver knows, for callers that enumerate.
pub fn primitive_names() -> impl Iterator<Item = &'static str> {
    PRIMITIVES.iter().map(|(name, _)| *name)
}

/// Resolve `raw` against the dialect and the typedef scopes.
///
/// `named` means the string ends with a parameter name that is stripped first
/// (`const ModuleString& url`). `scopes` are searched innermost first.
pub fn resolve(raw: &str, named: bool, scopes: &[&Scope], dialect: &Dialect) -> Result<TypeAnalysis> {
    let text = raw.trim();
    let text = if named {
        let (ty, _) = split_name(text).ok_or_else(|| BridgeError::unknown_type(raw))?;
        ty
    } else {
        text
    };
    resolve_qualified(text, scopes, dialect, true)
}

/// Split a trailing parameter name off a declared argument.
pub fn split_name(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    let boundary = text
        .char_indices()
        .rev()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, c)| i + c.len_utf8())?;
    let (ty, name) = text.split_at(boundary);
    let ty = ty.trim_end();
    if ty.is_empty() || name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    // `unsigned int` without a name would otherwise lose its second word.
    if !ty.ends_with(['&', '*', '>']) && is_type_word(ty, name) {
        return None;
    }
    Some((ty, name))
}

fn is_type_word(ty: &str, name: &str) -> bool {
    let joined = format!("{ty} {name}");
    PRIMITIVES.iter().any(|(p, _)| *p == joined)
}

fn resolve_qualified(
    text: &str,
    scopes: &[&Scope],
    dialect: &Dialect,
    allow_containers: bool,
) -> Result<TypeAnalysis> {
    let mut base = text.trim();
    let mut is_const = false;
    let mut by_ref = false;
    let mut by_addr = false;

    if let Some(rest) = base.strip_prefix("const ") {
        is_const = true;
        base = rest.trim_start();
    }
    if let Some(rest) = base.strip_suffix('&') {
        by_ref = true;
        base = rest.trim_end();
    } else if let Some(rest) = base.strip_suffix('*') {
        by_addr = true;
        base = rest.trim_end();
    }
    if let Some(rest) = base.strip_suffix(" const") {
        is_const = true;
        base = rest.trim_end();
    }

    let category = match resolve_base(base, scopes, dialect, allow_containers)? {
        Resolved::Category(category) => category,
        Resolved::Typedef(adopted) => {
            return Ok(TypeAnalysis {
                raw: text.to_string(),
                category: adopted.category,
                is_const: is_const || adopted.is_const,
                by_ref: by_ref || adopted.by_ref,
                by_addr: by_addr || adopted.by_addr,
            });
        }
    };

    // `void` only stands alone; `void*` is an opaque pointer value.
    let category = match category {
        Category::Void if by_addr => Category::Primitive {
            name: "void".to_string(),
            abi: "void".to_string(),
        },
        other => other,
    };

    Ok(TypeAnalysis {
        raw: text.to_string(),
        category,
        is_const,
        by_ref,
        by_addr,
    })
}

enum Resolved {
    Category(Category),
    Typedef(TypeAnalysis),
}

fn resolve_base(
    base: &str,
    scopes: &[&Scope],
    dialect: &Dialect,
    allow_containers: bool,
) -> Result<Resolved> {
    let element = |arg: &str| -> Result<Box<TypeAnalysis>> {
        resolve_qualified(arg, scopes, dialect, false).map(Box::new)
    };

    for container in [SEQUENCE, MAP, MULTIMAP] {
        let Some(args) = template_args(base, container) else {
            continue;
        };
        if !allow_containers {
            return Err(BridgeError::unknown_type(base));
        }
        let category = match (container, args.as_slice()) {
            (SEQUENCE, [elem]) => Category::Sequence(element(*elem)?),
            (MAP, [key, value]) => Category::Map {
                key: element(*key)?,
                value: element(*value)?,
            },
            (MULTIMAP, [key, value]) => Category::MultiMap {
                key: element(*key)?,
                value: element(*value)?,
            },
            _ => return Err(BridgeError::unknown_type(base)),
        };
        return Ok(Resolved::Category(category));
    }

    if let Some(category) = match_rules(base, dialect) {
        return Ok(Resolved::Category(category));
    }

    for scope in scopes {
        if let Some(typedef) = scope.lookup(base) {
            tracing::trace!(alias = base, scope = %scope.name, "resolved through typedef");
            return Ok(Resolved::Typedef(typedef.ty.clone()));
        }
    }

    Err(BridgeError::unknown_type(base))
}

/// The non-container, non-typedef rules, in priority order.
fn match_rules(base: &str, dialect: &Dialect) -> Option<Category> {
    match base {
        "void" => return Some(Category::Void),
        "bool" => return Some(Category::Bool),
        _ => {}
    }
    if let Some((name, abi)) = PRIMITIVES.iter().find(|(name, _)| *name == base) {
        return Some(Category::Primitive {
            name: name.to_string(),
            abi: abi.to_string(),
        });
    }
    if let Some(abi) = dialect.extra_primitive(base) {
        return Some(Category::Primitive {
            name: base.to_string(),
            abi: abi.to_string(),
        });
    }
    if base == dialect.string_type() {
        return Some(Category::String);
    }
    if let Some(abi) = dialect.value_struct(base) {
        return Some(Category::Struct {
            name: base.to_string(),
            abi: abi.to_string(),
        });
    }
    if is_identifier(base) && base.ends_with(dialect.naming().type_suffix()) {
        return Some(Category::Enum {
            abi: base.to_string(),
        });
    }

    let pointers: [(String, fn(String) -> Category); 3] = [
        (dialect.ref_ptr(), |class| Category::SharedRef { class }),
        (dialect.own_ptr(), |class| Category::ExclusiveOwn { class }),
        (dialect.raw_ptr(), |class| Category::RawRef { class }),
    ];
    for (pointer, make) in &pointers {
        if let Some(args) = template_args(base, pointer) {
            return match args.as_slice() {
                [class] if is_identifier(class) => Some(make(class.to_string())),
                _ => None,
            };
        }
    }

    if is_identifier(base) {
        if let Some(rest) = base.strip_prefix(dialect.module()) {
            if rest.starts_with(|c: char| c.is_ascii_uppercase()) {
                return Some(Category::Struct {
                    name: base.to_string(),
                    abi: dialect.class_abi_name(base),
                });
            }
        }
    }
    None
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

/// Top-level template arguments of `name<...>`, or `None` if `text` is not an
/// instantiation of `name`.
fn template_args<'a>(text: &'a str, name: &str) -> Option<Vec<&'a str>> {
    let inner = text
        .strip_prefix(name)?
        .trim_start()
        .strip_prefix('<')?
        .strip_suffix('>')?;

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    args.push(inner[start..].trim());
    if args.iter().any(|a| a.is_empty()) {
        return None;
    }
    Some(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatbridge_ast::Typedef;

    fn resolve_plain(raw: &str) -> TypeAnalysis {
        resolve(raw, false, &[], &Dialect::default()).unwrap()
    }

    #[test]
    fn test_every_primitive_resolves_with_every_qualifier() {
        let dialect = Dialect::default();
        for name in primitive_names().filter(|n| *n != "void") {
            for qualified in [
                name.to_string(),
                format!("{name}&"),
                format!("{name}*"),
                format!("const {name}&"),
                format!("const {name}*"),
            ] {
                let ty = resolve(&qualified, false, &[], &dialect)
                    .unwrap_or_else(|e| panic!("{qualified}: {e}"));
                assert!(
                    matches!(ty.category, Category::Primitive { .. }),
                    "{qualified} resolved to {:?}",
                    ty.category
                );
                assert_eq!(ty.is_const, qualified.starts_with("const"));
                assert_eq!(ty.by_ref, qualified.ends_with('&'));
                assert_eq!(ty.by_addr, qualified.ends_with('*'));
            }
        }
    }

    #[test]
    fn test_string_and_handles() {
        let ty = resolve("const ModuleString& url", true, &[], &Dialect::default()).unwrap();
        assert_eq!(ty.category, Category::String);
        assert!(ty.is_const && ty.by_ref);

        assert_eq!(
            resolve_plain("ModuleRefPtr<ModuleFrame>").category,
            Category::SharedRef {
                class: "ModuleFrame".to_string()
            }
        );
        assert_eq!(
            resolve_plain("ModuleOwnPtr<ModuleTask>").category,
            Category::ExclusiveOwn {
                class: "ModuleTask".to_string()
            }
        );
        assert_eq!(
            resolve_plain("ModuleRawPtr<ModuleTask>").category,
            Category::RawRef {
                class: "ModuleTask".to_string()
            }
        );
    }

    #[test]
    fn test_structs_enums_and_bool() {
        assert_eq!(
            resolve_plain("const ModuleRect&").category,
            Category::Struct {
                name: "ModuleRect".to_string(),
                abi: "module_rect_t".to_string()
            }
        );
        assert_eq!(
            resolve_plain("module_color_type_t").category,
            Category::Enum {
                abi: "module_color_type_t".to_string()
            }
        );
        assert_eq!(
            resolve_plain("ModuleCookieInfo").category,
            Category::Struct {
                name: "ModuleCookieInfo".to_string(),
                abi: "module_cookie_info_t".to_string()
            }
        );
        assert_eq!(resolve_plain("bool").category, Category::Bool);
        assert_eq!(resolve_plain("void").category, Category::Void);
        assert!(matches!(resolve_plain("void*").category, Category::Primitive { .. }));
    }

    #[test]
    fn test_containers() {
        let ty = resolve_plain("std::vector<ModuleRefPtr<ModuleFrame>>&");
        assert!(ty.by_ref && !ty.is_const);
        let Category::Sequence(elem) = &ty.category else {
            panic!("expected a sequence, got {:?}", ty.category);
        };
        assert_eq!(elem.category.class_name(), Some("ModuleFrame"));

        let ty = resolve_plain("const std::multimap<ModuleString, ModuleString>&");
        assert!(matches!(ty.category, Category::MultiMap { .. }));
    }

    #[test]
    fn test_nested_containers_are_unknown() {
        let err = resolve("std::vector<std::vector<int>>", false, &[], &Dialect::default())
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownType { .. }));

        let err = resolve("std::map<int>", false, &[], &Dialect::default()).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownType { .. }));
    }

    #[test]
    fn test_typedef_lookup_innermost_first_and_merges_qualifiers() {
        let dialect = Dialect::default();
        let mut outer = Scope::new("<root>");
        outer.typedefs.push(Typedef {
            alias: "Handle".to_string(),
            ty: resolve("int", false, &[], &dialect).unwrap(),
            span: 0..0,
        });
        let mut inner = Scope::new("ModuleWidget");
        inner.typedefs.push(Typedef {
            alias: "Handle".to_string(),
            ty: resolve("ModuleString", false, &[], &dialect).unwrap(),
            span: 0..0,
        });

        let ty = resolve("const Handle& h", true, &[&inner, &outer], &dialect).unwrap();
        assert_eq!(ty.category, Category::String);
        assert!(ty.is_const && ty.by_ref);

        let ty = resolve("Handle", false, &[&outer], &dialect).unwrap();
        assert!(matches!(ty.category, Category::Primitive { .. }));
    }

    #[test]
    fn test_unresolvable_is_an_error() {
        for raw in ["Widget", "std::deque<int>", "ModuleRefPtr<>", "struct tm"] {
            let err = resolve(raw, false, &[], &Dialect::default()).unwrap_err();
            assert!(matches!(err, BridgeError::UnknownType { .. }), "{raw}");
        }
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("const ModuleString& url"), Some(("const ModuleString&", "url")));
        assert_eq!(split_name("int count"), Some(("int", "count")));
        assert_eq!(split_name("unsigned long"), None);
        assert_eq!(split_name("count"), None);
    }
}
