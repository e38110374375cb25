//! The declaration model: classes, functions and typedefs for one run.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::attrs::Attributes;
use crate::dialect::Dialect;
use crate::error::{BridgeError, Result, Span};
use crate::types::{Category, TypeAnalysis};

/// How instances of a class hierarchy are owned across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// Reference counted, shared by any number of holders.
    Shared,
    /// Exactly one holder; ownership moves.
    Exclusive,
}

impl Ownership {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "shared" | "refcounted" => Some(Ownership::Shared),
            "exclusive" | "scoped" => Some(Ownership::Exclusive),
            _ => None,
        }
    }
}

/// Which side of the boundary implements a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Library,
    Client,
}

impl Side {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "library" => Some(Side::Library),
            "client" => Some(Side::Client),
            _ => None,
        }
    }
}

/// The ABI versions a declaration exists in: `added <= v < removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionRange {
    pub added: Option<u32>,
    pub removed: Option<u32>,
}

impl VersionRange {
    pub fn from_attributes(attrs: &Attributes) -> Result<Self> {
        let added = attrs.get_version("added")?;
        let removed = attrs.get_version("removed")?;
        if let (Some(a), Some(r)) = (added, removed) {
            if r <= a {
                return Err(BridgeError::malformed(
                    format!("removed version {r} is not after added version {a}"),
                    format!("added={a},removed={r}"),
                ));
            }
        }
        Ok(Self { added, removed })
    }

    pub fn contains(&self, version: u32) -> bool {
        self.added.map_or(true, |a| version >= a) && self.removed.map_or(true, |r| version < r)
    }

    /// Present, but retired at `version`.
    pub fn is_retired_at(&self, version: u32) -> bool {
        self.removed.is_some_and(|r| version >= r)
    }

    pub fn is_unbounded(&self) -> bool {
        self.added.is_none() && self.removed.is_none()
    }

    pub fn bounds(&self) -> impl Iterator<Item = u32> {
        self.added.into_iter().chain(self.removed)
    }
}

/// Typed view of a class marker's attributes.
#[derive(Debug, Clone, Default)]
pub struct ClassAttributes {
    pub source: Side,
    pub ownership: Option<Ownership>,
    pub abi_name: Option<String>,
    pub raw: Attributes,
}

impl ClassAttributes {
    pub fn from_attributes(raw: Attributes) -> Result<Self> {
        let source = match raw.get("source") {
            None => Side::Library,
            Some(value) => Side::parse(value).ok_or_else(|| {
                BridgeError::malformed(
                    format!("unknown source side `{value}`"),
                    format!("source={value}"),
                )
            })?,
        };
        let ownership = match raw.get("ownership") {
            None => None,
            Some(value) => Some(Ownership::parse(value).ok_or_else(|| {
                BridgeError::malformed(
                    format!("unknown ownership kind `{value}`"),
                    format!("ownership={value}"),
                )
            })?),
        };
        let abi_name = raw.get("capi_name").map(str::to_string);
        Ok(Self {
            source,
            ownership,
            abi_name,
            raw,
        })
    }
}

/// Where a function is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Global,
    Static,
    Virtual,
}

/// A function argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDecl {
    pub ty: TypeAnalysis,
    pub name: String,
}

/// A global, static or virtual function.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub kind: FunctionKind,
    pub name: String,
    pub attributes: Attributes,
    pub return_type: TypeAnalysis,
    pub args: Vec<ArgumentDecl>,
    pub doc: Vec<String>,
    /// Trailing `const` on a virtual function.
    pub is_const: bool,
    pub versions: VersionRange,
    /// Comment-stripped, whitespace-collapsed declaration text.
    pub canonical: String,
    pub span: Span,
}

impl FunctionDecl {
    /// Explicit ABI name from `capi_name=`.
    pub fn capi_name(&self) -> Option<&str> {
        self.attributes.get("capi_name")
    }

    /// Whether `arg` is exempt from null/empty verification. Matching is by
    /// exact parameter name and scoped to this function only.
    pub fn is_optional(&self, arg: &str) -> bool {
        self.attributes.get_all("optional_param").any(|p| p == arg)
    }

    /// Count accessor for a mutable sequence argument (`count_func=arg:Func`).
    pub fn count_func(&self, arg: &str) -> Option<&str> {
        self.attributes
            .get_all("count_func")
            .filter_map(|v| v.split_once(':'))
            .find(|(param, _)| *param == arg)
            .map(|(_, func)| func)
    }

    /// Value returned when the call cannot be made (`default_retval=`).
    pub fn default_retval(&self) -> Option<&str> {
        self.attributes.get("default_retval")
    }

    pub fn arg_names(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.name.as_str())
    }

    fn check_attribute_targets(&self) -> Result<()> {
        for param in self.attributes.get_all("optional_param") {
            if !self.arg_names().any(|n| n == param) {
                return Err(BridgeError::malformed(
                    format!("optional_param `{param}` is not a parameter of `{}`", self.name),
                    &self.canonical,
                )
                .with_span(self.span.clone()));
            }
        }
        for value in self.attributes.get_all("count_func") {
            let Some((param, func)) = value.split_once(':') else {
                return Err(BridgeError::malformed(
                    "count_func must have the form `param:Function`",
                    format!("count_func={value}"),
                )
                .with_span(self.span.clone()));
            };
            let arg = self.args.iter().find(|a| a.name == param);
            let is_mutable_sequence = arg.is_some_and(|a| {
                matches!(a.ty.category, Category::Sequence(_)) && a.ty.by_ref && !a.ty.is_const
            });
            if func.is_empty() || !is_mutable_sequence {
                return Err(BridgeError::malformed(
                    format!("count_func `{value}` must name a mutable sequence parameter"),
                    &self.canonical,
                )
                .with_span(self.span.clone()));
            }
        }
        Ok(())
    }
}

/// A named type alias.
#[derive(Debug, Clone)]
pub struct Typedef {
    pub alias: String,
    pub ty: TypeAnalysis,
    pub span: Span,
}

/// One level of typedef lookup: a class body or a file/model root.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub name: String,
    pub typedefs: Vec<Typedef>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            typedefs: Vec::new(),
        }
    }

    pub fn lookup(&self, alias: &str) -> Option<&Typedef> {
        self.typedefs.iter().find(|t| t.alias == alias)
    }
}

/// An annotated class.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub attributes: ClassAttributes,
    /// Final ownership kind, settled by [`DeclarationModel::link`].
    pub ownership: Ownership,
    pub doc: Vec<String>,
    pub parent: String,
    pub scope: Scope,
    pub statics: Vec<FunctionDecl>,
    pub virtuals: Vec<FunctionDecl>,
    pub versions: VersionRange,
    pub canonical: String,
    pub span: Span,
}

impl ClassDecl {
    pub fn source(&self) -> Side {
        self.attributes.source
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.statics.iter().chain(self.virtuals.iter())
    }

    /// Whether any part of the class carries version bounds.
    pub fn is_versioned(&self) -> bool {
        !self.versions.is_unbounded() || self.virtuals.iter().any(|f| !f.versions.is_unbounded())
    }
}

/// What parsing one declaration file produces.
#[derive(Debug, Clone, Default)]
pub struct ModelFragment {
    pub classes: Vec<ClassDecl>,
    pub functions: Vec<FunctionDecl>,
    pub typedefs: Vec<Typedef>,
}

/// Canonical text of one declaration, for API hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalDecl {
    pub name: String,
    pub text: String,
}

/// All declarations of one run.
#[derive(Debug, Clone, Default)]
pub struct DeclarationModel {
    classes: IndexMap<String, ClassDecl>,
    functions: Vec<FunctionDecl>,
    root: Scope,
}

impl DeclarationModel {
    pub fn new() -> Self {
        Self {
            classes: IndexMap::new(),
            functions: Vec::new(),
            root: Scope::new("<root>"),
        }
    }

    /// Merge and link a list of fragments in one step.
    pub fn build(fragments: Vec<ModelFragment>, dialect: &Dialect) -> Result<Self> {
        let mut model = Self::new();
        for fragment in fragments {
            model.add_fragment(fragment)?;
        }
        model.link(dialect)?;
        Ok(model)
    }

    pub fn add_fragment(&mut self, fragment: ModelFragment) -> Result<()> {
        for class in fragment.classes {
            if self.classes.contains_key(&class.name) {
                return Err(BridgeError::malformed(
                    format!("class `{}` is declared twice", class.name),
                    class.canonical.clone(),
                )
                .with_span(class.span.clone()));
            }
            self.classes.insert(class.name.clone(), class);
        }
        self.functions.extend(fragment.functions);
        self.root.typedefs.extend(fragment.typedefs);
        Ok(())
    }

    /// Settle ownership kinds and check every cross-declaration rule.
    pub fn link(&mut self, dialect: &Dialect) -> Result<()> {
        let names: Vec<String> = self.classes.keys().cloned().collect();
        for name in &names {
            let ownership = self.derive_ownership(name, dialect)?;
            if let Some(class) = self.classes.get_mut(name) {
                class.ownership = ownership;
            }
        }

        for class in self.classes.values() {
            for func in &class.virtuals {
                self.check_references(func, dialect)?;
                func.check_attribute_targets()?;
            }
            for func in &class.statics {
                self.check_references(func, dialect)?;
                func.check_attribute_targets()?;
            }
            check_append_only(class)?;
        }
        for func in &self.functions {
            self.check_references(func, dialect)?;
            func.check_attribute_targets()?;
        }

        tracing::debug!(
            classes = self.classes.len(),
            functions = self.functions.len(),
            "linked declaration model"
        );
        Ok(())
    }

    fn derive_ownership(&self, name: &str, dialect: &Dialect) -> Result<Ownership> {
        let mut visited = HashSet::new();
        let mut current = self.class_or_err(name)?;
        let declared = current.attributes.ownership;

        let inherited = loop {
            if !visited.insert(current.name.as_str()) {
                return Err(BridgeError::malformed(
                    format!("class `{name}` has a cyclic parent chain"),
                    current.canonical.clone(),
                )
                .with_span(current.span.clone()));
            }
            if current.parent == dialect.shared_root() {
                break Ownership::Shared;
            }
            if current.parent == dialect.scoped_root() {
                break Ownership::Exclusive;
            }
            current = self.classes.get(&current.parent).ok_or_else(|| {
                BridgeError::malformed(
                    format!("parent `{}` of `{}` is not declared", current.parent, current.name),
                    current.canonical.clone(),
                )
                .with_span(current.span.clone())
            })?;
        };

        if let Some(declared) = declared {
            if declared != inherited {
                let class = self.class_or_err(name)?;
                return Err(BridgeError::malformed(
                    format!(
                        "class `{name}` declares {declared:?} ownership but inherits {inherited:?}"
                    ),
                    class.canonical.clone(),
                )
                .with_span(class.span.clone()));
            }
        }
        Ok(inherited)
    }

    fn class_or_err(&self, name: &str) -> Result<&ClassDecl> {
        self.classes
            .get(name)
            .ok_or_else(|| BridgeError::malformed(format!("class `{name}` is not declared"), name))
    }

    fn check_references(&self, func: &FunctionDecl, dialect: &Dialect) -> Result<()> {
        let types = std::iter::once(&func.return_type).chain(func.args.iter().map(|a| &a.ty));
        for ty in types {
            check_type_references(ty, &self.classes, dialect)
                .map_err(|err| err.with_span(func.span.clone()))?;
        }
        Ok(())
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDecl> {
        self.classes.values()
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.get(name)
    }

    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }

    pub fn root_scope(&self) -> &Scope {
        &self.root
    }

    /// Parent class, if it is a declared class rather than a root.
    pub fn parent_of(&self, class: &ClassDecl) -> Option<&ClassDecl> {
        self.classes.get(&class.parent)
    }

    /// Canonical text for every class and global function, in declaration order.
    pub fn canonical_declarations(&self) -> Vec<CanonicalDecl> {
        let classes = self.classes.values().map(|c| CanonicalDecl {
            name: c.name.clone(),
            text: c.canonical.clone(),
        });
        let functions = self.functions.iter().map(|f| CanonicalDecl {
            name: f.name.clone(),
            text: f.canonical.clone(),
        });
        classes.chain(functions).collect()
    }
}

fn check_type_references(
    ty: &TypeAnalysis,
    classes: &IndexMap<String, ClassDecl>,
    dialect: &Dialect,
) -> Result<()> {
    match &ty.category {
        Category::SharedRef { class } | Category::ExclusiveOwn { class } | Category::RawRef { class } => {
            if dialect.is_root(class) {
                return Ok(());
            }
            let Some(target) = classes.get(class) else {
                return Err(BridgeError::malformed(
                    format!("references undeclared class `{class}`"),
                    ty.raw.clone(),
                ));
            };
            let expected = match &ty.category {
                Category::SharedRef { .. } => Some(Ownership::Shared),
                Category::ExclusiveOwn { .. } => Some(Ownership::Exclusive),
                _ => None,
            };
            if let Some(expected) = expected {
                if target.ownership != expected {
                    return Err(BridgeError::malformed(
                        format!(
                            "`{class}` has {:?} ownership and cannot be held as {expected:?}",
                            target.ownership
                        ),
                        ty.raw.clone(),
                    ));
                }
            }
            Ok(())
        }
        Category::Sequence(elem) => check_type_references(elem, classes, dialect),
        Category::Map { key, value } | Category::MultiMap { key, value } => {
            check_type_references(key, classes, dialect)?;
            check_type_references(value, classes, dialect)
        }
        Category::Void
        | Category::Primitive { .. }
        | Category::Bool
        | Category::String
        | Category::Struct { .. }
        | Category::Enum { .. } => Ok(()),
    }
}

/// Virtual functions may only be appended: a later declaration cannot be
/// introduced in an earlier version than one before it.
fn check_append_only(class: &ClassDecl) -> Result<()> {
    let mut last_added = 0;
    for func in &class.virtuals {
        let added = func.versions.added.unwrap_or(0);
        if added < last_added {
            return Err(BridgeError::malformed(
                format!(
                    "`{}::{}` (added={added}) is declared after a function added in {last_added}; \
                     new virtual functions must be appended",
                    class.name, func.name
                ),
                func.canonical.clone(),
            )
            .with_span(func.span.clone()));
        }
        last_added = added;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(raw: &str, category: Category) -> TypeAnalysis {
        TypeAnalysis::new(raw, category)
    }

    fn virtual_fn(name: &str, args: Vec<ArgumentDecl>, attrs: &str) -> FunctionDecl {
        let attributes = Attributes::parse(attrs).unwrap();
        FunctionDecl {
            kind: FunctionKind::Virtual,
            name: name.to_string(),
            versions: VersionRange::from_attributes(&attributes).unwrap(),
            attributes,
            return_type: ty("void", Category::Void),
            args,
            doc: Vec::new(),
            is_const: false,
            canonical: format!("virtual void {name}() = 0;"),
            span: 0..0,
        }
    }

    fn class(name: &str, parent: &str, attrs: &str, virtuals: Vec<FunctionDecl>) -> ClassDecl {
        ClassDecl {
            name: name.to_string(),
            attributes: ClassAttributes::from_attributes(Attributes::parse(attrs).unwrap()).unwrap(),
            ownership: Ownership::Shared,
            doc: Vec::new(),
            parent: parent.to_string(),
            scope: Scope::new(name),
            statics: Vec::new(),
            virtuals,
            versions: VersionRange::default(),
            canonical: format!("class {name} : public {parent} {{}};"),
            span: 0..0,
        }
    }

    fn build(classes: Vec<ClassDecl>) -> Result<DeclarationModel> {
        DeclarationModel::build(
            vec![ModelFragment {
                classes,
                ..Default::default()
            }],
            &Dialect::default(),
        )
    }

    #[test]
    fn test_ownership_is_inherited_from_root() {
        let model = build(vec![
            class("ModuleScopedThing", "ModuleBaseScoped", "", vec![]),
            class("ModuleChild", "ModuleScopedThing", "", vec![]),
        ])
        .unwrap();
        assert_eq!(model.class("ModuleChild").unwrap().ownership, Ownership::Exclusive);
    }

    #[test]
    fn test_conflicting_ownership_is_rejected() {
        let err = build(vec![
            class("ModuleScopedThing", "ModuleBaseScoped", "", vec![]),
            class("ModuleChild", "ModuleScopedThing", "ownership=shared", vec![]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("inherits Exclusive"));
    }

    #[test]
    fn test_undeclared_class_reference_is_malformed() {
        let arg = ArgumentDecl {
            ty: ty(
                "ModuleRefPtr<ModuleFrame>",
                Category::SharedRef {
                    class: "ModuleFrame".to_string(),
                },
            ),
            name: "frame".to_string(),
        };
        let err = build(vec![class(
            "ModuleWidget",
            "ModuleBaseRefCounted",
            "",
            vec![virtual_fn("SetFrame", vec![arg], "")],
        )])
        .unwrap_err();
        assert!(matches!(err, BridgeError::MalformedDeclaration { .. }));
        assert!(err.to_string().contains("ModuleFrame"));
    }

    #[test]
    fn test_virtuals_must_be_appended() {
        let err = build(vec![class(
            "ModuleWidget",
            "ModuleBaseRefCounted",
            "",
            vec![virtual_fn("Late", vec![], "added=3"), virtual_fn("Early", vec![], "added=2")],
        )])
        .unwrap_err();
        assert!(err.to_string().contains("must be appended"));
    }

    #[test]
    fn test_optional_param_must_exist() {
        let err = build(vec![class(
            "ModuleWidget",
            "ModuleBaseRefCounted",
            "",
            vec![virtual_fn("Run", vec![], "optional_param=nothing")],
        )])
        .unwrap_err();
        assert!(err.to_string().contains("optional_param `nothing`"));
    }

    #[test]
    fn test_version_range() {
        let attrs = Attributes::parse("added=2,removed=4").unwrap();
        let range = VersionRange::from_attributes(&attrs).unwrap();
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(3));
        assert!(!range.contains(4));
        assert!(range.is_retired_at(4));
        assert!(!range.is_retired_at(1));

        let bad = Attributes::parse("added=4,removed=4").unwrap();
        assert!(VersionRange::from_attributes(&bad).is_err());
    }
}
