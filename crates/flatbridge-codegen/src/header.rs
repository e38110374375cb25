//! C mirror headers: one `<x>_capi.h` per class plus a globals header.

use std::collections::BTreeSet;

use flatbridge_ast::{
    BridgeError, ClassDecl, DeclarationModel, Dialect, FunctionDecl, Result, VersionRange,
};

use crate::code::Code;
use crate::layout::{ClassLayouts, LayoutGroup, Slot};
use crate::marshal::{handle_abi_type, plan_function};
use crate::{header_guard, names, GeneratedFiles, OutputDirs};

const GENERATED_NOTICE: &str =
    "// Generated by flatbridge from the annotated declarations. Do not edit.";

pub struct HeaderGenerator<'a> {
    dialect: &'a Dialect,
    dirs: &'a OutputDirs,
}

impl<'a> HeaderGenerator<'a> {
    pub fn new(dialect: &'a Dialect, dirs: &'a OutputDirs) -> Self {
        Self { dialect, dirs }
    }

    pub fn generate(&self, model: &DeclarationModel) -> Result<GeneratedFiles> {
        let dialect = self.dialect.for_model(model);
        HeaderGenerator::new(&dialect, self.dirs).model_headers(model)
    }

    fn model_headers(&self, model: &DeclarationModel) -> Result<GeneratedFiles> {
        let mut files = GeneratedFiles::new();
        for class in model.classes() {
            let file = names::capi_header(&class.name, self.dialect);
            let contents = self.class_header(model, class, &file)?;
            files.push(self.dirs.abi_dir.join(&file), contents);
            tracing::debug!(class = %class.name, file = %file, "generated header");
        }
        if !model.functions().is_empty() {
            let file = names::globals_header(self.dialect);
            let contents = self.globals_header(model, &file)?;
            files.push(self.dirs.abi_dir.join(&file), contents);
        }
        Ok(files)
    }

    fn class_header(&self, model: &DeclarationModel, class: &ClassDecl, file: &str) -> Result<String> {
        let layouts = ClassLayouts::compute(model, class, self.dialect)?;
        let guard = header_guard(&self.dirs.abi_dir.join(file));

        let mut code = Code::new();
        self.open_header(&mut code, &guard);
        code.line(format!(
            "#include \"{}\"",
            self.dirs.abi_include(&names::base_header(self.dialect))
        ));
        code.line(format!(
            "#include \"{}\"",
            self.dirs.abi_include(&names::types_header(self.dialect))
        ));
        if let Some(parent) = model.parent_of(class) {
            code.line(format!(
                "#include \"{}\"",
                self.dirs.abi_include(&names::capi_header(&parent.name, self.dialect))
            ));
        }
        code.blank();
        open_extern_c(&mut code);

        let referenced = referenced_classes(model, class.functions(), Some(&class.name))?;
        self.forward_declarations(&mut code, &referenced);

        if layouts.is_dispatched() {
            for group in &layouts.groups {
                self.versioned_struct(&mut code, class, group, &layouts);
                code.blank();
            }
            self.version_select(&mut code, class, &layouts);
        } else if let Some(group) = layouts.current() {
            code.doc(&class.doc);
            self.struct_body(&mut code, class, group, &self.dialect.class_abi_name(&class.name));
        }

        for func in &class.statics {
            code.blank();
            let name = names::static_export(class, func, self.dialect);
            self.export_prototype(&mut code, class.name.as_str(), func, &name);
        }

        code.blank();
        close_extern_c(&mut code);
        code.line(format!("#endif  // {guard}"));
        Ok(code.finish())
    }

    fn globals_header(&self, model: &DeclarationModel, file: &str) -> Result<String> {
        let guard = header_guard(&self.dirs.abi_dir.join(file));
        let mut code = Code::new();
        self.open_header(&mut code, &guard);
        code.line(format!(
            "#include \"{}\"",
            self.dirs.abi_include(&names::base_header(self.dialect))
        ));
        code.line(format!(
            "#include \"{}\"",
            self.dirs.abi_include(&names::types_header(self.dialect))
        ));
        code.blank();
        open_extern_c(&mut code);

        let referenced = referenced_classes(model, model.functions().iter(), None)?;
        self.forward_declarations(&mut code, &referenced);

        for (i, func) in model.functions().iter().enumerate() {
            if i > 0 {
                code.blank();
            }
            let name = names::global_export(func, self.dialect);
            self.export_prototype(&mut code, &func.name, func, &name);
        }

        code.blank();
        close_extern_c(&mut code);
        code.line(format!("#endif  // {guard}"));
        Ok(code.finish())
    }

    fn open_header(&self, code: &mut Code, guard: &str) {
        code.line(GENERATED_NOTICE);
        code.blank();
        code.line(format!("#ifndef {guard}"));
        code.line(format!("#define {guard}"));
        code.line("#pragma once");
        code.blank();
    }

    fn forward_declarations(&self, code: &mut Code, classes: &BTreeSet<String>) {
        if classes.is_empty() {
            return;
        }
        for class in classes {
            code.line(format!("struct _{};", self.dialect.class_abi_name(class)));
        }
        code.blank();
    }

    /// `typedef struct _x_t { ... } x_t;` for one layout.
    fn struct_body(&self, code: &mut Code, class: &ClassDecl, group: &LayoutGroup, abi: &str) {
        let self_type = self_param(class, self.dialect);
        code.open(format!("typedef struct _{abi}"));
        for member in &group.layout.members {
            match &member.slot {
                Slot::Base { abi } => {
                    code.doc(&["Base structure.".to_string()]);
                    code.line(format!("{abi} base;"));
                }
                Slot::Function { name, member: field } => {
                    code.blank();
                    let Some(func) = class.virtuals.iter().find(|f| &f.name == name) else {
                        continue;
                    };
                    code.doc(&func.doc);
                    match plan_function(func, self.dialect) {
                        Ok(plan) => {
                            let mut params = vec![self_type.clone()];
                            params.extend(plan.abi_params(self.dialect));
                            code.line(format!(
                                "{}({}* {field})({});",
                                plan.ret.abi_type(self.dialect),
                                self.dialect.callback_macro(),
                                params.join(", ")
                            ));
                        }
                        Err(err) => {
                            code.line(format!("// Not generatable: {err}"));
                            code.line(format!("uintptr_t {field};"));
                        }
                    }
                }
                Slot::Placeholder { name, .. } => {
                    code.blank();
                    let removed = class
                        .virtuals
                        .iter()
                        .find(|f| &f.name == name)
                        .and_then(|f| f.versions.removed);
                    if let Some(version) = removed {
                        code.doc(&[format!("Removed in version {version}.")]);
                    }
                    code.line(format!("uintptr_t {};", member.field()));
                }
            }
        }
        code.close(&format!(" {abi};"));
    }

    fn versioned_struct(
        &self,
        code: &mut Code,
        class: &ClassDecl,
        group: &LayoutGroup,
        layouts: &ClassLayouts,
    ) {
        let mut doc = class.doc.clone();
        if !doc.is_empty() {
            doc.push(String::new());
        }
        doc.push(match group.end {
            Some(end) => format!("Layout for API versions {} to {}.", group.first, end - 1),
            None => format!("Layout for API version {} and later.", group.first),
        });
        code.doc(&doc);
        let abi = self.dialect.versioned_abi_name(&class.name, group.first);
        self.struct_body(code, class, group, &abi);
        tracing::trace!(class = %layouts.class, version = group.first, "versioned struct");
    }

    /// `#if MODULE_ABI_VERSION >= N` chain defining the unversioned tag with
    /// the layout of the compiled-for version. Callbacks name that tag, so
    /// it needs a complete definition in every branch.
    fn version_select(&self, code: &mut Code, class: &ClassDecl, layouts: &ClassLayouts) {
        let abi = self.dialect.class_abi_name(&class.name);
        let macro_name = self.dialect.version_macro();
        let groups: Vec<&LayoutGroup> = layouts.newest_first().collect();
        code.doc(&class.doc);
        for (i, group) in groups.iter().enumerate() {
            if i + 1 == groups.len() {
                if i > 0 {
                    code.line("#else");
                }
            } else if i == 0 {
                code.line(format!("#if {macro_name} >= {}", group.first));
            } else {
                code.line(format!("#elif {macro_name} >= {}", group.first));
            }
            self.struct_body(code, class, group, &abi);
        }
        if groups.len() > 1 {
            code.line("#endif");
        }
    }

    fn export_prototype(&self, code: &mut Code, subject: &str, func: &FunctionDecl, name: &str) {
        let condition = version_condition(&func.versions, self.dialect);
        if let Some(condition) = &condition {
            code.line(format!("#if {condition}"));
        }
        code.doc(&func.doc);
        match plan_function(func, self.dialect) {
            Ok(plan) => {
                let params = plan.abi_params(self.dialect);
                code.line(format!(
                    "{} {} {name}({});",
                    self.dialect.export_macro(),
                    plan.ret.abi_type(self.dialect),
                    if params.is_empty() { "void".to_string() } else { params.join(", ") }
                ));
            }
            Err(err) => {
                tracing::debug!(function = %func.name, owner = %subject, "export not generatable");
                code.line(format!("// {name}: not generatable: {err}"));
                code.line(format!("{} void {name}(void);", self.dialect.export_macro()));
            }
        }
        if condition.is_some() {
            code.line("#endif");
        }
    }
}

/// Preprocessor condition for a bounded declaration, e.g.
/// `MODULE_ABI_VERSION >= 2 && MODULE_ABI_VERSION < 4`.
pub(crate) fn version_condition(range: &VersionRange, dialect: &Dialect) -> Option<String> {
    let macro_name = dialect.version_macro();
    match (range.added, range.removed) {
        (None, None) => None,
        (Some(a), None) => Some(format!("{macro_name} >= {a}")),
        (None, Some(r)) => Some(format!("{macro_name} < {r}")),
        (Some(a), Some(r)) => Some(format!("{macro_name} >= {a} && {macro_name} < {r}")),
    }
}

fn open_extern_c(code: &mut Code) {
    code.line("#ifdef __cplusplus");
    code.line("extern \"C\" {");
    code.line("#endif");
    code.blank();
}

fn close_extern_c(code: &mut Code) {
    code.line("#ifdef __cplusplus");
    code.line("}");
    code.line("#endif");
    code.blank();
}

/// Classes referenced by `functions`, minus `owner`. Every one of them must
/// be declared.
pub(crate) fn referenced_classes<'f>(
    model: &DeclarationModel,
    functions: impl Iterator<Item = &'f FunctionDecl>,
    owner: Option<&str>,
) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for func in functions {
        let types = std::iter::once(&func.return_type).chain(func.args.iter().map(|a| &a.ty));
        for class in types.flat_map(|t| t.referenced_classes()) {
            if Some(class) == owner {
                continue;
            }
            if model.class(class).is_none() {
                return Err(BridgeError::malformed(
                    format!("`{}` references undeclared class `{class}`", func.name),
                    func.canonical.clone(),
                ));
            }
            out.insert(class.to_string());
        }
    }
    Ok(out)
}

/// Self parameter type for a class's callbacks.
pub(crate) fn self_param(class: &ClassDecl, dialect: &Dialect) -> String {
    format!("{} self", handle_abi_type(&class.name, dialect))
}
