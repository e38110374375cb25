//! Bridge adapters between the C++ object API and the C ABI.
//!
//! For every class two translation units are produced:
//!
//! - `<x>_to_abi.cc` exposes a C++ implementation through the ABI struct:
//!   each virtual function gets a C callback bound into the struct, each
//!   static function an exported C symbol.
//! - `<x>_from_abi.cc` implements the C++ interface on top of an ABI struct
//!   received from the other side.
//!
//! Function bodies are assembled per argument from the [`marshal`](crate::marshal)
//! plan and merged with the previous output, see [`merge`](crate::merge).

use std::collections::BTreeSet;
use std::path::Path;

use flatbridge_ast::{
    ClassDecl, DeclarationModel, DiagnosticKind, Diagnostics, Dialect, FunctionDecl, FunctionKind,
    Result, Side,
};
use indexmap::IndexMap;

use crate::code::Code;
use crate::layout::ClassLayouts;
use crate::marshal::{plan_function, Element, FunctionPlan, Handle};
use crate::merge::{self, ExistingFunction, FunctionText};
use crate::writer::FileReader;
use crate::{dispatch, header_guard, names, GeneratedFiles, OutputDirs};

mod from_abi;
mod to_abi;

pub(crate) use to_abi::template as to_abi_template;

const GENERATED_NOTICE: &str = "// Generated by flatbridge. Function bodies that no longer start with the\n\
                                // AUTO-GENERATED marker are kept when this file is regenerated.";

/// Key used in [`GeneratedFiles::classes`] for the global functions.
pub const GLOBALS: &str = "globals";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Object implementation exposed through the ABI.
    ToAbi,
    /// ABI struct used through the object interface.
    FromAbi,
}

impl Direction {
    fn opposite(self) -> Self {
        match self {
            Direction::ToAbi => Direction::FromAbi,
            Direction::FromAbi => Direction::ToAbi,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Direction::ToAbi => "to_abi",
            Direction::FromAbi => "from_abi",
        }
    }
}

/// Who owns the functions being generated.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Owner<'a> {
    Class(&'a ClassDecl),
    Globals,
}

impl Owner<'_> {
    fn tag(&self, func: &FunctionDecl) -> String {
        match self {
            Owner::Class(class) => format!("{}::{}", class.name, func.name),
            Owner::Globals => func.name.clone(),
        }
    }
}

/// Everything a body generator needs to know about the file it writes into.
pub(crate) struct Context<'a> {
    pub dialect: &'a Dialect,
    pub model: &'a DeclarationModel,
    pub direction: Direction,
    /// Side implementing the functions of this file.
    pub side: Side,
}

impl Context<'_> {
    /// Which adapter converts handles of `class`: the class's own direction
    /// when it lives on this file's side, the opposite one otherwise.
    fn adapter(&self, class: &str) -> Direction {
        let same_side = self
            .model
            .class(class)
            .map_or(true, |c| c.source() == self.side);
        if same_side {
            self.direction
        } else {
            self.direction.opposite()
        }
    }

    pub fn same_side(&self, class: &str) -> bool {
        self.adapter(class) == self.direction
    }

    /// ABI pointer to object handle.
    pub fn handle_to_object(&self, kind: Handle, class: &str, expr: &str) -> String {
        let raw = if kind == Handle::Raw { "Raw" } else { "" };
        match self.adapter(class) {
            Direction::ToAbi => format!("{}::Unwrap{raw}({expr})", names::to_abi_class(class, None)),
            Direction::FromAbi => format!("{}::Wrap{raw}({expr})", names::from_abi_class(class, None)),
        }
    }

    /// Object handle to ABI pointer. Exclusive handles are moved out.
    pub fn handle_to_abi(&self, kind: Handle, class: &str, expr: &str) -> String {
        let (raw, expr) = match kind {
            Handle::Exclusive => ("", format!("std::move({expr})")),
            Handle::Raw => ("Raw", expr.to_string()),
            Handle::Shared => ("", expr.to_string()),
        };
        match self.adapter(class) {
            Direction::ToAbi => format!("{}::Wrap{raw}({expr})", names::to_abi_class(class, None)),
            Direction::FromAbi => format!("{}::Unwrap{raw}({expr})", names::from_abi_class(class, None)),
        }
    }

    pub fn element_to_object(&self, element: &Element, expr: &str) -> String {
        match element {
            Element::Simple { .. } => expr.to_string(),
            Element::Bool => format!("{expr} ? true : false"),
            Element::Struct { object, .. } => format!("{object}({expr})"),
            Element::Handle { kind, class } => self.handle_to_object(*kind, class, expr),
        }
    }

    pub fn element_to_abi(&self, element: &Element, expr: &str) -> String {
        match element {
            Element::Simple { .. } | Element::Struct { .. } => expr.to_string(),
            Element::Bool => format!("{expr} ? 1 : 0"),
            Element::Handle { kind, class } => self.handle_to_abi(*kind, class, expr),
        }
    }

    pub fn string_list_fn(&self, op: &str) -> String {
        format!("{}_string_list_{op}", self.dialect.token())
    }

    /// `("map", "module_string_map_t")` or the multimap pair.
    pub fn map_names(&self, multi: bool) -> (&'static str, String) {
        if multi {
            ("multimap", self.dialect.abi_string_multimap())
        } else {
            ("map", self.dialect.abi_string_map())
        }
    }
}

/// `return x;`, or `return;` for void.
pub(crate) fn bail(default: Option<&str>) -> String {
    match default {
        Some(value) => format!("return {value};"),
        None => "return;".to_string(),
    }
}

/// `if (cond) { bail }` on three lines.
pub(crate) fn guard(code: &mut Code, condition: &str, bail: &str) {
    code.open(format!("if ({condition})"));
    code.line(bail);
    code.close("");
}

/// Object-side parameter list, `const ModuleString& name, int count`.
pub(crate) fn object_params(func: &FunctionDecl) -> String {
    func.args
        .iter()
        .map(|a| format!("{} {}", a.ty.raw, a.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split an indented [`Code`] buffer into body lines.
pub(crate) fn body_lines(code: Code) -> Vec<String> {
    code.finish().lines().map(str::to_string).collect()
}

/// The stub body shared by both directions.
pub(crate) fn stub_body(tag: &str, reason: &str, returns_value: bool) -> Vec<String> {
    let mut code = Code::new();
    code.indent();
    code.line(merge::AUTOGEN_MARKER);
    code.blank();
    code.line(format!(
        "#pragma message(\"Warning: \" __FILE__ \": {tag} is not implemented\")"
    ));
    code.line(format!("// Not generatable: {reason}"));
    code.line("NOTIMPLEMENTED();");
    if returns_value {
        code.line("return {};");
    }
    body_lines(code)
}

/// A function that could not be planned, with the reason.
pub(crate) type Planned<'a> = std::result::Result<FunctionPlan<'a>, String>;

fn plan<'a>(
    owner: Owner<'_>,
    func: &'a FunctionDecl,
    dialect: &Dialect,
    diags: &mut Diagnostics,
) -> Result<Planned<'a>> {
    match plan_function(func, dialect) {
        Ok(plan) => Ok(Ok(plan)),
        Err(err) if !err.is_fatal() => {
            diags.warn(
                DiagnosticKind::NotGeneratable,
                owner.tag(func),
                format!("emitted a stub: {err}"),
            );
            Ok(Err(err.to_string()))
        }
        Err(err) => Err(err),
    }
}

/// One bridge translation unit after merging.
struct Merged {
    functions: String,
    customized: bool,
}

/// Merge generated functions with the file's previous content.
fn merge_all(
    generated: &[FunctionText],
    existing: &IndexMap<String, ExistingFunction>,
    diags: &mut Diagnostics,
) -> Merged {
    let mut functions = String::new();
    let mut customized = false;
    for (i, function) in generated.iter().enumerate() {
        if i > 0 {
            functions.push('\n');
        }
        let merged = merge::merge_function(function, existing.get(&function.tag), diags);
        customized |= merged.preserved || function.stub;
        functions.push_str(&merged.text);
    }
    Merged {
        functions,
        customized,
    }
}

pub struct BridgeGenerator<'a> {
    dialect: &'a Dialect,
    dirs: &'a OutputDirs,
}

impl<'a> BridgeGenerator<'a> {
    pub fn new(dialect: &'a Dialect, dirs: &'a OutputDirs) -> Self {
        Self { dialect, dirs }
    }

    pub fn generate(
        &self,
        model: &DeclarationModel,
        reader: &dyn FileReader,
        diags: &mut Diagnostics,
    ) -> Result<GeneratedFiles> {
        let dialect = self.dialect.for_model(model);
        BridgeGenerator::new(&dialect, self.dirs).model_bridges(model, reader, diags)
    }

    fn model_bridges(
        &self,
        model: &DeclarationModel,
        reader: &dyn FileReader,
        diags: &mut Diagnostics,
    ) -> Result<GeneratedFiles> {
        let mut files = GeneratedFiles::new();
        for class in model.classes() {
            self.class_files(model, class, reader, diags, &mut files)?;
        }
        if !model.functions().is_empty() {
            self.global_files(model, reader, diags, &mut files)?;
        }
        Ok(files)
    }

    fn existing(&self, reader: &dyn FileReader, path: &Path) -> Result<IndexMap<String, ExistingFunction>> {
        Ok(reader
            .read(path)?
            .map(|text| merge::parse_existing(&text))
            .unwrap_or_default())
    }

    fn class_files(
        &self,
        model: &DeclarationModel,
        class: &ClassDecl,
        reader: &dyn FileReader,
        diags: &mut Diagnostics,
        files: &mut GeneratedFiles,
    ) -> Result<()> {
        let layouts = ClassLayouts::compute(model, class, self.dialect)?;
        let owner = Owner::Class(class);

        let mut plans = Vec::new();
        for func in class.functions() {
            plans.push((func, plan(owner, func, self.dialect, diags)?));
        }
        let referenced =
            crate::header::referenced_classes(model, class.functions(), Some(&class.name))?;

        let mut customized = false;
        for direction in [Direction::ToAbi, Direction::FromAbi] {
            let ctx = Context {
                dialect: self.dialect,
                model,
                direction,
                side: class.source(),
            };
            let stem = names::adapter_stem(&class.name, self.dialect, direction.suffix());

            let header_path = self.dirs.bridge_dir.join(format!("{stem}.h"));
            let header = match direction {
                Direction::ToAbi => to_abi::class_header(&ctx, class, &layouts, &header_path, self.dirs),
                Direction::FromAbi => {
                    from_abi::class_header(&ctx, class, &layouts, &header_path, self.dirs)
                }
            };
            files.push(header_path, header);

            let source_path = self.dirs.bridge_dir.join(format!("{stem}.cc"));
            let existing = self.existing(reader, &source_path)?;
            let emit = |virtuals: bool| -> Vec<FunctionText> {
                plans
                    .iter()
                    .filter(|(func, _)| (func.kind == FunctionKind::Virtual) == virtuals)
                    .map(|(func, plan)| match direction {
                        Direction::ToAbi => to_abi::function(&ctx, owner, func, plan),
                        Direction::FromAbi => from_abi::function(&ctx, owner, func, plan),
                    })
                    .collect()
            };
            let virtuals = emit(true);
            let statics = emit(false);
            let merged_virtuals = merge_all(&virtuals, &existing, diags);
            let merged_statics = merge_all(&statics, &existing, diags);
            merge::report_dropped(
                &existing,
                virtuals.iter().chain(&statics).map(|f| f.tag.as_str()),
                diags,
            );
            customized |= merged_virtuals.customized || merged_statics.customized;

            let mut code = Code::new();
            code.raw(GENERATED_NOTICE);
            code.blank();
            code.line(format!("#include \"{}\"", self.dirs.bridge_include(&format!("{stem}.h"))));
            self.includes(&mut code, &referenced, &plans);
            code.blank();

            match direction {
                Direction::ToAbi => to_abi::class_source(
                    &ctx,
                    class,
                    &layouts,
                    &plans,
                    &merged_virtuals.functions,
                    &merged_statics.functions,
                    &mut code,
                ),
                Direction::FromAbi => from_abi::class_source(
                    class,
                    &merged_virtuals.functions,
                    &merged_statics.functions,
                    &mut code,
                ),
            }
            if layouts.is_dispatched() {
                code.blank();
                match direction {
                    Direction::ToAbi => dispatch::to_abi_dispatch(&ctx, class, &layouts, &plans, &mut code),
                    Direction::FromAbi => dispatch::from_abi_dispatch(&ctx, class, &layouts, &mut code),
                }
            }
            files.push(source_path, code.finish());
        }

        tracing::debug!(class = %class.name, customized, "generated bridge");
        files.record(&class.name, customized);
        Ok(())
    }

    fn global_files(
        &self,
        model: &DeclarationModel,
        reader: &dyn FileReader,
        diags: &mut Diagnostics,
        files: &mut GeneratedFiles,
    ) -> Result<()> {
        let mut plans = Vec::new();
        for func in model.functions() {
            plans.push((func, plan(Owner::Globals, func, self.dialect, diags)?));
        }
        let referenced = crate::header::referenced_classes(model, model.functions().iter(), None)?;

        let mut customized = false;
        for direction in [Direction::ToAbi, Direction::FromAbi] {
            let ctx = Context {
                dialect: self.dialect,
                model,
                direction,
                side: Side::Library,
            };
            let stem = names::globals_stem(self.dialect, direction.suffix());
            let path = self.dirs.bridge_dir.join(format!("{stem}.cc"));
            let existing = self.existing(reader, &path)?;
            let generated: Vec<FunctionText> = plans
                .iter()
                .map(|(func, plan)| match direction {
                    Direction::ToAbi => to_abi::function(&ctx, Owner::Globals, func, plan),
                    Direction::FromAbi => from_abi::function(&ctx, Owner::Globals, func, plan),
                })
                .collect();
            let merged = merge_all(&generated, &existing, diags);
            merge::report_dropped(&existing, generated.iter().map(|f| f.tag.as_str()), diags);
            customized |= merged.customized;

            let mut code = Code::new();
            code.raw(GENERATED_NOTICE);
            code.blank();
            code.line(format!(
                "#include \"{}\"",
                self.dirs.abi_include(&names::globals_header(self.dialect))
            ));
            self.includes(&mut code, &referenced, &plans);
            code.blank();
            code.raw(&merged.functions);
            files.push(path, code.finish());
        }
        files.record(GLOBALS, customized);
        Ok(())
    }

    /// Adapter headers of referenced classes plus runtime helpers.
    fn includes(
        &self,
        code: &mut Code,
        referenced: &BTreeSet<String>,
        plans: &[(&FunctionDecl, Planned<'_>)],
    ) {
        let mut includes = Vec::new();
        if plans.iter().any(|(_, p)| p.as_ref().is_ok_and(uses_transfer)) {
            includes.push(self.dirs.bridge_include("transfer_util.h"));
        }
        for class in referenced {
            for direction in [Direction::FromAbi, Direction::ToAbi] {
                let stem = names::adapter_stem(class, self.dialect, direction.suffix());
                includes.push(self.dirs.bridge_include(&format!("{stem}.h")));
            }
        }
        includes.sort();
        for include in includes {
            code.line(format!("#include \"{include}\""));
        }
        if plans.iter().any(|(_, p)| p.as_ref().is_ok_and(uses_algorithm)) {
            code.line("#include <algorithm>");
        }
    }
}

fn uses_transfer(plan: &FunctionPlan<'_>) -> bool {
    use crate::marshal::ArgPlan;
    plan.args.iter().any(|a| {
        matches!(
            a.plan,
            ArgPlan::StringListIn | ArgPlan::StringListOut | ArgPlan::MapIn { .. } | ArgPlan::MapOut { .. }
        )
    })
}

fn uses_algorithm(plan: &FunctionPlan<'_>) -> bool {
    plan.args
        .iter()
        .any(|a| matches!(a.plan, crate::marshal::ArgPlan::SequenceOut { .. }))
}

/// `#include` block for an adapter header.
pub(crate) fn open_adapter_header(code: &mut Code, path: &std::path::Path) -> String {
    let guard = header_guard(path);
    code.line("// Generated by flatbridge. Do not edit.");
    code.blank();
    code.line(format!("#ifndef {guard}"));
    code.line(format!("#define {guard}"));
    code.line("#pragma once");
    code.blank();
    guard
}
