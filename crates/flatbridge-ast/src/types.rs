//! Resolved type analysis.

use std::fmt;

/// The semantic category the resolver assigns to a type.
///
/// Every generator matches on this exhaustively, so a new category is a
/// compile error until each generator knows how to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    /// `void` as a return type.
    Void,
    /// A plain C-compatible value: `int`, `double`, `size_t`, `void*`.
    Primitive { name: String, abi: String },
    /// `bool`, carried as `int` across the boundary.
    Bool,
    /// The project string class.
    String,
    /// A reference-counted class handle (`ModuleRefPtr<T>`).
    SharedRef { class: String },
    /// A single-owner class handle (`ModuleOwnPtr<T>`).
    ExclusiveOwn { class: String },
    /// A non-owning class pointer (`ModuleRawPtr<T>`).
    RawRef { class: String },
    /// A value struct with an ABI mirror (`ModuleRect` -> `module_rect_t`).
    Struct { name: String, abi: String },
    /// A name that is already ABI-shaped (`module_color_type_t`).
    Enum { abi: String },
    /// `std::vector<T>`.
    Sequence(Box<TypeAnalysis>),
    /// `std::map<K, V>`.
    Map {
        key: Box<TypeAnalysis>,
        value: Box<TypeAnalysis>,
    },
    /// `std::multimap<K, V>`.
    MultiMap {
        key: Box<TypeAnalysis>,
        value: Box<TypeAnalysis>,
    },
}

impl Category {
    /// Short label used in generated comments and diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Void => "void",
            Category::Primitive { .. } => "simple",
            Category::Bool => "bool",
            Category::String => "string",
            Category::SharedRef { .. } => "refptr",
            Category::ExclusiveOwn { .. } => "ownptr",
            Category::RawRef { .. } => "rawptr",
            Category::Struct { .. } => "struct",
            Category::Enum { .. } => "enum",
            Category::Sequence(_) => "vec",
            Category::Map { .. } => "map",
            Category::MultiMap { .. } => "multimap",
        }
    }

    /// The class a handle category points at.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Category::SharedRef { class }
            | Category::ExclusiveOwn { class }
            | Category::RawRef { class } => Some(class),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Category::Sequence(_) | Category::Map { .. } | Category::MultiMap { .. }
        )
    }
}

/// A type string resolved into a category plus qualifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnalysis {
    /// The type text as written, kept for diagnostics.
    pub raw: String,
    pub category: Category,
    pub is_const: bool,
    pub by_ref: bool,
    pub by_addr: bool,
}

impl TypeAnalysis {
    pub fn new(raw: impl Into<String>, category: Category) -> Self {
        Self {
            raw: raw.into(),
            category,
            is_const: false,
            by_ref: false,
            by_addr: false,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.category, Category::Void)
    }

    /// Passed by reference or by address.
    pub fn is_indirect(&self) -> bool {
        self.by_ref || self.by_addr
    }

    /// Every class referenced anywhere in this type, element types included.
    pub fn referenced_classes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_classes(&mut out);
        out
    }

    fn collect_classes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match &self.category {
            Category::SharedRef { class }
            | Category::ExclusiveOwn { class }
            | Category::RawRef { class } => out.push(class),
            Category::Sequence(elem) => elem.collect_classes(out),
            Category::Map { key, value } | Category::MultiMap { key, value } => {
                key.collect_classes(out);
                value.collect_classes(out);
            }
            Category::Void
            | Category::Primitive { .. }
            | Category::Bool
            | Category::String
            | Category::Struct { .. }
            | Category::Enum { .. } => {}
        }
    }

    /// Label combining category and qualifiers, e.g. `string_byref_const`.
    pub fn label(&self) -> String {
        let mut label = self.category.label().to_string();
        if self.by_ref {
            label.push_str("_byref");
        } else if self.by_addr {
            label.push_str("_byaddr");
        }
        if self.is_const {
            label.push_str("_const");
        }
        label
    }
}

impl fmt::Display for TypeAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_includes_qualifiers() {
        let mut ty = TypeAnalysis::new("const ModuleString&", Category::String);
        ty.is_const = true;
        ty.by_ref = true;
        assert_eq!(ty.label(), "string_byref_const");
    }

    #[test]
    fn test_referenced_classes_descends_into_elements() {
        let elem = TypeAnalysis::new(
            "ModuleRefPtr<ModuleFrame>",
            Category::SharedRef {
                class: "ModuleFrame".to_string(),
            },
        );
        let seq = TypeAnalysis::new(
            "std::vector<ModuleRefPtr<ModuleFrame>>",
            Category::Sequence(Box::new(elem)),
        );
        assert_eq!(seq.referenced_classes(), vec!["ModuleFrame"]);
        assert!(seq.category.is_container());
    }
}
