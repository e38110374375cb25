//! Project-specific spellings shared by the resolver and the generators.

use indexmap::IndexMap;

use crate::model::DeclarationModel;
use crate::naming::{Transliterator, snake_case};

/// Value structs every project gets, as object-dialect names without the
/// module prefix.
const DEFAULT_VALUE_STRUCTS: &[&str] = &["Rect", "Point", "Size", "Range", "Insets", "Time"];

/// The names a project uses on both sides of the boundary.
///
/// Everything is derived from one PascalCase module name (`Module`): the
/// string class is `ModuleString`, the shared handle is `ModuleRefPtr<T>`,
/// the ABI string struct is `module_string_t`, and so on.
#[derive(Debug, Clone)]
pub struct Dialect {
    module: String,
    naming: Transliterator,
    value_structs: IndexMap<String, String>,
    primitives: IndexMap<String, String>,
    /// Explicit class struct names from `capi_name=`.
    class_names: IndexMap<String, String>,
}

impl Dialect {
    pub fn new(module: impl Into<String>) -> Self {
        let module = module.into();
        let naming = Transliterator::new(snake_case(&module));
        let value_structs = DEFAULT_VALUE_STRUCTS
            .iter()
            .map(|base| {
                let name = format!("{module}{base}");
                let abi = naming.to_abi_name(&name, true, None);
                (name, abi)
            })
            .collect();
        Self {
            module,
            naming,
            value_structs,
            primitives: IndexMap::new(),
            class_names: IndexMap::new(),
        }
    }

    /// Register an extra value struct (`ModuleCookie` -> `module_cookie_t`).
    pub fn with_value_struct(mut self, name: impl Into<String>, abi: impl Into<String>) -> Self {
        self.value_structs.insert(name.into(), abi.into());
        self
    }

    /// Register an extra primitive spelling (`uint8` -> `uint8_t`).
    pub fn with_primitive(mut self, name: impl Into<String>, abi: impl Into<String>) -> Self {
        self.primitives.insert(name.into(), abi.into());
        self
    }

    /// Give `class` an explicit ABI struct name (`module_custom_t`).
    pub fn with_class_abi_name(mut self, class: impl Into<String>, abi: impl Into<String>) -> Self {
        self.class_names.insert(class.into(), abi.into());
        self
    }

    /// This dialect plus the `capi_name=` of every class in `model`.
    pub fn for_model(&self, model: &DeclarationModel) -> Self {
        let mut dialect = self.clone();
        for class in model.classes() {
            if let Some(abi) = &class.attributes.abi_name {
                dialect.class_names.insert(class.name.clone(), abi.clone());
            }
        }
        dialect
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn naming(&self) -> &Transliterator {
        &self.naming
    }

    pub fn value_struct(&self, name: &str) -> Option<&str> {
        self.value_structs.get(name).map(String::as_str)
    }

    pub fn extra_primitive(&self, name: &str) -> Option<&str> {
        self.primitives.get(name).map(String::as_str)
    }

    /// Lowercase module token (`module`).
    pub fn token(&self) -> &str {
        self.naming.module_token()
    }

    pub fn string_type(&self) -> String {
        format!("{}String", self.module)
    }

    pub fn ref_ptr(&self) -> String {
        format!("{}RefPtr", self.module)
    }

    pub fn own_ptr(&self) -> String {
        format!("{}OwnPtr", self.module)
    }

    pub fn raw_ptr(&self) -> String {
        format!("{}RawPtr", self.module)
    }

    pub fn shared_root(&self) -> String {
        format!("{}BaseRefCounted", self.module)
    }

    pub fn scoped_root(&self) -> String {
        format!("{}BaseScoped", self.module)
    }

    pub fn is_root(&self, name: &str) -> bool {
        name == self.shared_root() || name == self.scoped_root()
    }

    /// ABI struct name for a class (`ModuleWidget` -> `module_widget_t`).
    pub fn class_abi_name(&self, class: &str) -> String {
        match self.class_names.get(class) {
            Some(abi) => abi.clone(),
            None => self.naming.to_abi_name(class, true, None),
        }
    }

    /// ABI struct name for a class at one layout version.
    pub fn versioned_abi_name(&self, class: &str, version: u32) -> String {
        let stem = match self.class_names.get(class) {
            Some(abi) => abi.strip_suffix("_t").unwrap_or(abi).to_string(),
            None => self.naming.class_prefix(class),
        };
        format!("{stem}_v{version}_t")
    }

    pub fn abi_string(&self) -> String {
        format!("{}_string_t", self.token())
    }

    pub fn abi_string_userfree(&self) -> String {
        format!("{}_string_userfree_t", self.token())
    }

    pub fn abi_string_list(&self) -> String {
        format!("{}_string_list_t", self.token())
    }

    pub fn abi_string_map(&self) -> String {
        format!("{}_string_map_t", self.token())
    }

    pub fn abi_string_multimap(&self) -> String {
        format!("{}_string_multimap_t", self.token())
    }

    pub fn version_macro(&self) -> String {
        format!("{}_ABI_VERSION", self.token().to_uppercase())
    }

    pub fn version_fn(&self) -> String {
        format!("{}_api_version", self.token())
    }

    pub fn export_macro(&self) -> String {
        format!("{}_EXPORT", self.token().to_uppercase())
    }

    pub fn callback_macro(&self) -> String {
        format!("{}_CALLBACK", self.token().to_uppercase())
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::new("Module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spellings() {
        let dialect = Dialect::default();
        assert_eq!(dialect.string_type(), "ModuleString");
        assert_eq!(dialect.ref_ptr(), "ModuleRefPtr");
        assert_eq!(dialect.abi_string(), "module_string_t");
        assert_eq!(dialect.version_macro(), "MODULE_ABI_VERSION");
        assert_eq!(dialect.class_abi_name("ModuleWidget"), "module_widget_t");
        assert_eq!(dialect.versioned_abi_name("ModuleWidget", 3), "module_widget_v3_t");
        assert_eq!(dialect.value_struct("ModuleRect"), Some("module_rect_t"));
    }

    #[test]
    fn test_custom_module() {
        let dialect = Dialect::new("Acme").with_value_struct("AcmeCookie", "acme_cookie_t");
        assert_eq!(dialect.token(), "acme");
        assert_eq!(dialect.shared_root(), "AcmeBaseRefCounted");
        assert!(dialect.is_root("AcmeBaseScoped"));
        assert_eq!(dialect.value_struct("AcmeCookie"), Some("acme_cookie_t"));
    }

    #[test]
    fn test_explicit_class_abi_name() {
        let dialect = Dialect::default().with_class_abi_name("ModuleWidget", "module_custom_t");
        assert_eq!(dialect.class_abi_name("ModuleWidget"), "module_custom_t");
        assert_eq!(dialect.versioned_abi_name("ModuleWidget", 2), "module_custom_v2_t");
        assert_eq!(dialect.class_abi_name("ModuleFrame"), "module_frame_t");
    }
}
