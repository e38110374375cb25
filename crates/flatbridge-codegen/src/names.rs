//! Names of generated files, symbols and adapter classes.

use flatbridge_ast::{ClassDecl, Dialect, FunctionDecl};

/// `module_widget_capi.h`.
pub(crate) fn capi_header(class: &str, dialect: &Dialect) -> String {
    format!("{}_capi.h", dialect.naming().class_prefix(class))
}

pub(crate) fn base_header(dialect: &Dialect) -> String {
    format!("{}_base_capi.h", dialect.token())
}

pub(crate) fn types_header(dialect: &Dialect) -> String {
    format!("{}_types_capi.h", dialect.token())
}

pub(crate) fn globals_header(dialect: &Dialect) -> String {
    format!("{}_globals_capi.h", dialect.token())
}

/// The object-side header a class is declared in, `include/module_widget.h`.
pub(crate) fn object_header(class: &str, dialect: &Dialect) -> String {
    format!("include/{}.h", dialect.naming().class_prefix(class))
}

/// `widget_to_abi` / `widget_from_abi`, without extension.
pub(crate) fn adapter_stem(class: &str, dialect: &Dialect, suffix: &str) -> String {
    format!("{}_{suffix}", dialect.naming().short_prefix(class))
}

pub(crate) fn globals_stem(dialect: &Dialect, suffix: &str) -> String {
    format!("{}_globals_{suffix}", dialect.token())
}

/// Struct member for a virtual function, `get_size`.
pub(crate) fn struct_member(func: &FunctionDecl, dialect: &Dialect) -> String {
    dialect.naming().to_abi_name(&func.name, false, None)
}

/// Adapter-local C callback for a virtual function, `widget_get_size`.
pub(crate) fn callback(class: &ClassDecl, func: &FunctionDecl, dialect: &Dialect) -> String {
    let prefix = dialect.naming().short_prefix(&class.name);
    dialect.naming().to_abi_name(&func.name, false, Some(&prefix))
}

/// Exported C function for a static, `module_widget_create`.
pub(crate) fn static_export(class: &ClassDecl, func: &FunctionDecl, dialect: &Dialect) -> String {
    match func.capi_name() {
        Some(name) => name.to_string(),
        None => {
            let prefix = dialect.naming().class_prefix(&class.name);
            dialect.naming().to_abi_name(&func.name, false, Some(&prefix))
        }
    }
}

/// Exported C function for a global, `module_initialize`.
pub(crate) fn global_export(func: &FunctionDecl, dialect: &Dialect) -> String {
    match func.capi_name() {
        Some(name) => name.to_string(),
        None => {
            let name = dialect.naming().to_abi_name(&func.name, false, None);
            format!("{}_{name}", dialect.token())
        }
    }
}

/// `ModuleWidgetToAbi`, or `ModuleWidgetToAbi_v2` for one layout group.
pub(crate) fn to_abi_class(class: &str, version: Option<u32>) -> String {
    versioned(format!("{class}ToAbi"), version)
}

pub(crate) fn from_abi_class(class: &str, version: Option<u32>) -> String {
    versioned(format!("{class}FromAbi"), version)
}

fn versioned(name: String, version: Option<u32>) -> String {
    match version {
        Some(v) => format!("{name}_v{v}"),
        None => name,
    }
}
