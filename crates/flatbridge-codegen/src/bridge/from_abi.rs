//! ABI struct used through the C++ object interface.

use std::path::Path;

use flatbridge_ast::{ClassDecl, FunctionDecl, FunctionKind, Ownership};

use super::{
    bail, body_lines, guard, object_params, open_adapter_header, stub_body, Context, Owner,
    Planned,
};
use crate::code::Code;
use crate::dispatch;
use crate::header::version_condition;
use crate::layout::ClassLayouts;
use crate::marshal::{ArgPlan, FunctionPlan, MarshalArg, ReturnPlan};
use crate::merge::{FunctionText, AUTOGEN_MARKER};
use crate::{names, OutputDirs};

pub(crate) fn template(ownership: Ownership) -> &'static str {
    match ownership {
        Ownership::Shared => "BridgeFromAbiRefCounted",
        Ownership::Exclusive => "BridgeFromAbiScoped",
    }
}

pub(super) fn class_header(
    ctx: &Context<'_>,
    class: &ClassDecl,
    layouts: &ClassLayouts,
    path: &Path,
    dirs: &OutputDirs,
) -> String {
    let adapter = names::from_abi_class(&class.name, None);
    let abi = ctx.dialect.class_abi_name(&class.name);

    let mut code = Code::new();
    let guard = open_adapter_header(&mut code, path);
    code.line(format!("#include \"{}\"", names::object_header(&class.name, ctx.dialect)));
    code.line(format!(
        "#include \"{}\"",
        dirs.abi_include(&names::capi_header(&class.name, ctx.dialect))
    ));
    code.line(format!("#include \"{}\"", dirs.bridge_include("from_abi_base.h")));
    code.blank();

    code.line(format!("// Calls a {abi} through the C++ {} interface.", class.name));
    code.line(format!("class {adapter}"));
    code.open(format!(
        "    : public {}<{adapter}, {}, {abi}>",
        template(class.ownership),
        class.name
    ));
    code.dedent();
    code.line(" public:");
    code.indent();
    code.line(format!("{adapter}();"));
    if layouts.is_dispatched() {
        code.blank();
        dispatch::from_abi_entry_points(ctx, class, &mut code);
    }

    if !class.virtuals.is_empty() {
        code.blank();
        code.line(format!("// {} methods.", class.name));
        for func in &class.virtuals {
            let constness = if func.is_const { " const" } else { "" };
            code.line(format!(
                "{} {}({}){constness} override;",
                func.return_type.raw,
                func.name,
                object_params(func)
            ));
        }
    }
    code.close(";");

    if layouts.is_dispatched() {
        code.blank();
        dispatch::from_abi_aliases(ctx, class, layouts, &mut code);
    }

    code.blank();
    code.line(format!("#endif  // {guard}"));
    code.finish()
}

pub(super) fn class_source(class: &ClassDecl, virtuals: &str, statics: &str, code: &mut Code) {
    if !virtuals.is_empty() {
        code.line("// VIRTUAL METHODS - Body may be edited by hand.");
        code.blank();
        code.raw(virtuals);
        code.blank();
    }
    if !statics.is_empty() {
        code.line("// STATIC METHODS - Body may be edited by hand.");
        code.blank();
        code.raw(statics);
        code.blank();
    }
    let adapter = names::from_abi_class(&class.name, None);
    code.line("// CONSTRUCTOR - Do not edit by hand.");
    code.blank();
    code.line(format!("{adapter}::{adapter}() {{}}"));
}

pub(super) fn function(
    ctx: &Context<'_>,
    owner: Owner<'_>,
    func: &FunctionDecl,
    planned: &Planned<'_>,
) -> FunctionText {
    let tag = owner.tag(func);
    let signature = signature(owner, func);
    match planned {
        Ok(plan) => FunctionText {
            body: body(ctx, owner, plan),
            signature,
            tag,
            stub: false,
        },
        Err(reason) => FunctionText {
            body: stub_body(&tag, reason, !func.return_type.is_void()),
            signature,
            tag,
            stub: true,
        },
    }
}

fn signature(owner: Owner<'_>, func: &FunctionDecl) -> String {
    let qualified = match (owner, func.kind) {
        (Owner::Class(class), FunctionKind::Virtual) => {
            format!("{}::{}", names::from_abi_class(&class.name, None), func.name)
        }
        (Owner::Class(class), _) => format!("{}::{}", class.name, func.name),
        (Owner::Globals, _) => func.name.clone(),
    };
    let constness = if func.is_const { " const" } else { "" };
    format!(
        "{} {qualified}({}){constness} {{",
        func.return_type.raw,
        object_params(func)
    )
}

fn body(ctx: &Context<'_>, owner: Owner<'_>, plan: &FunctionPlan<'_>) -> Vec<String> {
    let func = plan.func;
    let dialect = ctx.dialect;
    let default = plan.ret.object_default(func, dialect);
    let bail = bail(default.as_deref());

    let mut code = Code::new();
    code.indent();
    code.line(AUTOGEN_MARKER);
    code.blank();

    // The compiled-for layout or export set may lack this function.
    let compiled = version_condition(&func.versions, dialect);
    if let Some(condition) = &compiled {
        code.raw(&format!("#if {condition}"));
    }

    let member = names::struct_member(func, dialect);
    let is_member = func.kind == FunctionKind::Virtual;
    if let (Owner::Class(class), true) = (owner, is_member) {
        code.line(format!(
            "{}* _struct = GetStruct();",
            dialect.class_abi_name(&class.name)
        ));
        guard(&mut code, &format!("!_struct->{member}"), &bail);
    }
    if let Some(condition) = version_check(func) {
        code.line(format!("const int _version = {}();", dialect.version_fn()));
        guard(&mut code, &condition, &bail);
    }

    for arg in &plan.args {
        verify(arg, &bail, &mut code);
    }
    for arg in &plan.args {
        translate(ctx, owner, func, arg, &mut code);
    }

    code.line("// Execute");
    let mut args: Vec<String> = plan.args.iter().map(|a| call_arg(ctx, a)).collect();
    let callee = match owner {
        Owner::Class(_) if is_member => {
            args.insert(0, "_struct".to_string());
            format!("_struct->{member}")
        }
        Owner::Class(class) => names::static_export(class, func, dialect),
        Owner::Globals => names::global_export(func, dialect),
    };
    let call = format!("{callee}({})", args.join(", "));
    if plan.ret.is_void() {
        code.line(format!("{call};"));
    } else {
        code.line(format!("{} _retval = {call};", plan.ret.abi_type(dialect)));
    }

    let mut restored = false;
    for arg in &plan.args {
        restored |= restore(ctx, arg, &mut code, !restored);
    }

    if !plan.ret.is_void() {
        code.blank();
        code.line(format!("// Return type: {}", plan.ret.label()));
        match &plan.ret {
            ReturnPlan::Bool => code.line("return _retval ? true : false;"),
            ReturnPlan::String => {
                let string = dialect.string_type();
                code.line(format!("{string} _retvalStr;"));
                code.line("_retvalStr.AttachToUserFree(_retval);");
                code.line("return _retvalStr;");
            }
            ReturnPlan::Handle { kind, class } => code.line(format!(
                "return {};",
                ctx.handle_to_object(*kind, class, "_retval")
            )),
            ReturnPlan::Struct { object, .. } => code.line(format!("return {object}(_retval);")),
            ReturnPlan::Void
            | ReturnPlan::Simple { .. }
            | ReturnPlan::Pointer { .. }
            | ReturnPlan::Enum { .. } => code.line("return _retval;"),
        }
    }
    if compiled.is_some() {
        code.raw("#else");
        code.line(&bail);
        code.raw("#endif");
    }
    body_lines(code)
}

/// Guard for a function that only exists in some ABI versions.
fn version_check(func: &FunctionDecl) -> Option<String> {
    match (func.versions.added, func.versions.removed) {
        (None, None) => None,
        (Some(a), None) => Some(format!("_version < {a}")),
        (None, Some(r)) => Some(format!("_version >= {r}")),
        (Some(a), Some(r)) => Some(format!("_version < {a} || _version >= {r}")),
    }
}

fn verify(arg: &MarshalArg<'_>, bail: &str, code: &mut Code) {
    if arg.optional {
        return;
    }
    let n = arg.name();
    let condition = match &arg.plan {
        ArgPlan::SimpleIndirect { by_addr: true, .. } | ArgPlan::Handle { .. } => format!("!{n}"),
        ArgPlan::StringIn => format!("{n}.empty()"),
        _ => return,
    };
    code.line(format!("// Verify param: {n}; type: {}", arg.decl.ty.label()));
    guard(code, &condition, bail);
}

fn translate(
    ctx: &Context<'_>,
    owner: Owner<'_>,
    func: &FunctionDecl,
    arg: &MarshalArg<'_>,
    code: &mut Code,
) {
    let n = arg.name();
    let header = |code: &mut Code| {
        code.line(format!("// Translate param: {n}; type: {}", arg.decl.ty.label()));
    };
    match &arg.plan {
        ArgPlan::BoolIndirect { by_addr: true } => {
            header(code);
            code.line(format!("int {n}Int = {n} ? *{n} : 0;"));
        }
        ArgPlan::BoolIndirect { by_addr: false } => {
            header(code);
            code.line(format!("int {n}Int = {n};"));
        }
        ArgPlan::SequenceIn(element) => {
            header(code);
            let abi = element.abi_type(ctx.dialect);
            code.line(format!("const size_t {n}Count = {n}.size();"));
            code.line(format!("{abi}* {n}List = nullptr;"));
            code.open(format!("if ({n}Count > 0)"));
            code.line(format!("{n}List = new {abi}[{n}Count];"));
            code.open(format!("for (size_t i = 0; i < {n}Count; ++i)"));
            code.line(format!(
                "{n}List[i] = {};",
                ctx.element_to_abi(element, &format!("{n}[i]"))
            ));
            code.close("");
            code.close("");
        }
        ArgPlan::SequenceOut {
            element,
            count_func,
        } => {
            header(code);
            let abi = element.abi_type(ctx.dialect);
            code.line(format!("size_t {n}Size = {n}.size();"));
            match count_func {
                Some(count) => {
                    let count = match owner {
                        Owner::Class(class) if func.kind == FunctionKind::Static => {
                            format!("{}::{count}()", class.name)
                        }
                        _ => format!("{count}()"),
                    };
                    code.line(format!(
                        "size_t {n}Count = std::max(static_cast<size_t>({count}), {n}Size);"
                    ));
                }
                None => code.line(format!("size_t {n}Count = {n}Size;")),
            }
            code.line(format!("{abi}* {n}List = nullptr;"));
            code.open(format!("if ({n}Count > 0)"));
            code.line(format!("{n}List = new {abi}[{n}Count]();"));
            code.open(format!("for (size_t i = 0; i < {n}Size; ++i)"));
            code.line(format!(
                "{n}List[i] = {};",
                ctx.element_to_abi(element, &format!("{n}[i]"))
            ));
            code.close("");
            code.close("");
        }
        ArgPlan::StringListIn | ArgPlan::StringListOut => {
            header(code);
            code.line(format!(
                "{} {n}List = {}();",
                ctx.dialect.abi_string_list(),
                ctx.string_list_fn("alloc")
            ));
            code.open(format!("if ({n}List)"));
            code.line(format!("transfer_string_list_contents({n}, {n}List);"));
            code.close("");
        }
        ArgPlan::MapIn { multi } | ArgPlan::MapOut { multi } => {
            header(code);
            let (kind, abi) = ctx.map_names(*multi);
            code.line(format!(
                "{abi} {n}Map = {}_string_{kind}_alloc();",
                ctx.dialect.token()
            ));
            code.open(format!("if ({n}Map)"));
            code.line(format!("transfer_string_{kind}_contents({n}, {n}Map);"));
            code.close("");
        }
        ArgPlan::Simple { .. }
        | ArgPlan::SimpleIndirect { .. }
        | ArgPlan::Bool
        | ArgPlan::StringIn
        | ArgPlan::StringOut
        | ArgPlan::Handle { .. }
        | ArgPlan::StructValue { .. }
        | ArgPlan::StructIndirect { .. } => {}
    }
}

fn call_arg(ctx: &Context<'_>, arg: &MarshalArg<'_>) -> String {
    let n = arg.name();
    match &arg.plan {
        ArgPlan::Simple { .. } | ArgPlan::Bool | ArgPlan::StructValue { .. } => n.to_string(),
        ArgPlan::SimpleIndirect { by_addr: true, .. }
        | ArgPlan::StructIndirect { by_addr: true, .. } => n.to_string(),
        ArgPlan::SimpleIndirect { by_addr: false, .. }
        | ArgPlan::StructIndirect { by_addr: false, .. } => format!("&{n}"),
        ArgPlan::BoolIndirect { by_addr: true } => format!("{n} ? &{n}Int : nullptr"),
        ArgPlan::BoolIndirect { by_addr: false } => format!("&{n}Int"),
        ArgPlan::StringIn => format!("{n}.GetStruct()"),
        ArgPlan::StringOut => format!("{n}.GetWritableStruct()"),
        ArgPlan::Handle { kind, class } => ctx.handle_to_abi(*kind, class, n),
        ArgPlan::SequenceIn(_) => format!("{n}Count, {n}List"),
        ArgPlan::SequenceOut { .. } => format!("&{n}Count, {n}List"),
        ArgPlan::StringListIn | ArgPlan::StringListOut => format!("{n}List"),
        ArgPlan::MapIn { .. } | ArgPlan::MapOut { .. } => format!("{n}Map"),
    }
}

fn restore(ctx: &Context<'_>, arg: &MarshalArg<'_>, code: &mut Code, first: bool) -> bool {
    let n = arg.name();
    let header = |code: &mut Code| {
        if first {
            code.blank();
        }
        code.line(format!("// Restore param: {n}; type: {}", arg.decl.ty.label()));
    };
    match &arg.plan {
        ArgPlan::BoolIndirect { by_addr: true } => {
            header(code);
            code.open(format!("if ({n})"));
            code.line(format!("*{n} = {n}Int ? true : false;"));
            code.close("");
        }
        ArgPlan::BoolIndirect { by_addr: false } => {
            header(code);
            code.line(format!("{n} = {n}Int ? true : false;"));
        }
        ArgPlan::SequenceIn(_) => {
            header(code);
            code.open(format!("if ({n}List)"));
            code.line(format!("delete[] {n}List;"));
            code.close("");
        }
        ArgPlan::SequenceOut { element, .. } => {
            header(code);
            code.line(format!("{n}.clear();"));
            code.open(format!("if ({n}Count > 0 && {n}List)"));
            code.open(format!("for (size_t i = 0; i < {n}Count; ++i)"));
            code.line(format!(
                "{n}.push_back({});",
                ctx.element_to_object(element, &format!("{n}List[i]"))
            ));
            code.close("");
            code.line(format!("delete[] {n}List;"));
            code.close("");
        }
        ArgPlan::StringListIn | ArgPlan::StringListOut => {
            header(code);
            code.open(format!("if ({n}List)"));
            if arg.plan == ArgPlan::StringListOut {
                code.line(format!("{n}.clear();"));
                code.line(format!("transfer_string_list_contents({n}List, {n});"));
            }
            code.line(format!("{}({n}List);", ctx.string_list_fn("free")));
            code.close("");
        }
        ArgPlan::MapIn { multi } | ArgPlan::MapOut { multi } => {
            header(code);
            let (kind, _) = ctx.map_names(*multi);
            code.open(format!("if ({n}Map)"));
            if matches!(arg.plan, ArgPlan::MapOut { .. }) {
                code.line(format!("{n}.clear();"));
                code.line(format!("transfer_string_{kind}_contents({n}Map, {n});"));
            }
            code.line(format!("{}_string_{kind}_free({n}Map);", ctx.dialect.token()));
            code.close("");
        }
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::super::tests::generate_one;

    #[test]
    fn test_method_reads_struct_member() {
        let files = generate_one(
            r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi()--*/
  virtual int GetSize() const = 0;
};
"#,
        );
        let cc = files.text("bridge/widget_from_abi.cc");
        assert!(cc.contains(
            "// [bridge] ModuleWidget::GetSize\n\
             int ModuleWidgetFromAbi::GetSize() const {\n\
             \x20 // AUTO-GENERATED CONTENT - DELETE THIS COMMENT BEFORE MODIFYING\n\
             \n\
             \x20 module_widget_t* _struct = GetStruct();\n\
             \x20 if (!_struct->get_size) {\n\
             \x20   return 0;\n\
             \x20 }\n\
             \x20 // Execute\n\
             \x20 int _retval = _struct->get_size(_struct);\n\
             \n\
             \x20 // Return type: simple\n\
             \x20 return _retval;\n\
             }\n"
        ));
        let h = files.text("bridge/widget_from_abi.h");
        assert!(h.contains("  int GetSize() const override;\n"));
    }

    #[test]
    fn test_bounded_function_checks_version() {
        let files = generate_one(
            r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi(added=2, default_retval=true)--*/
  virtual bool IsVisible() = 0;
};
"#,
        );
        let cc = files.text("bridge/widget_from_abi.cc");
        assert!(cc.contains(
            "  const int _version = module_api_version();\n  if (_version < 2) {\n    return true;\n  }\n"
        ));
        assert!(cc.contains("  return _retval ? true : false;\n"));
        assert!(cc.contains(
            "  return _retval ? true : false;\n#else\n  return true;\n#endif\n}\n"
        ));
    }

    #[test]
    fn test_retired_member_access_is_compiled_out() {
        let files = generate_one(
            r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi(removed=2)--*/
  virtual void Resize(int size) = 0;
  /*--abi(added=3)--*/
  virtual void Hide() = 0;
};
"#,
        );
        let cc = files.text("bridge/widget_from_abi.cc");
        let resize = &cc[cc.find("void ModuleWidgetFromAbi::Resize(int size) {").unwrap()..];
        let guard = resize.find("#if MODULE_ABI_VERSION < 2\n").unwrap();
        let access = resize.find("_struct->resize").unwrap();
        let end = resize.find("#endif\n").unwrap();
        assert!(guard < access && access < end);
        assert!(resize[..end].contains("  if (_version >= 2) {\n"));
        assert!(resize.contains("#else\n  return;\n#endif\n}\n"));

        let hide = &cc[cc.find("void ModuleWidgetFromAbi::Hide() {").unwrap()..];
        let guard = hide.find("#if MODULE_ABI_VERSION >= 3\n").unwrap();
        assert!(guard < hide.find("_struct->hide").unwrap());
    }

    #[test]
    fn test_shared_handle_sequence_argument() {
        let files = generate_one(
            r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi()--*/
  virtual void SetFrames(const std::vector<ModuleRefPtr<ModuleFrame>>& frames) = 0;
};

/*--abi()--*/
class ModuleFrame : public ModuleBaseRefCounted {
};
"#,
        );
        let cc = files.text("bridge/widget_from_abi.cc");
        let body = &cc[cc.find("void ModuleWidgetFromAbi::SetFrames(").unwrap()..];
        let body = &body[..body.find("\n}\n").unwrap()];
        let count = body.find("  const size_t framesCount = frames.size();\n").unwrap();
        let alloc = body
            .find("    framesList = new struct _module_frame_t*[framesCount];\n")
            .unwrap();
        let fill = body.find("      framesList[i] = ").unwrap();
        let call = body
            .find("  _struct->set_frames(_struct, framesCount, framesList);\n")
            .unwrap();
        let release = body.find("    delete[] framesList;\n").unwrap();
        assert!(count < alloc && alloc < fill && fill < call && call < release);
        assert!(body[fill..call].contains("frames[i]"));
        assert!(!body.contains("#if"));
    }

    #[test]
    fn test_mutable_sequence_uses_count_accessor() {
        let files = generate_one(
            r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi()--*/
  virtual size_t GetSizeCount() = 0;
  /*--abi(count_func=sizes:GetSizeCount)--*/
  virtual void GetSizes(std::vector<int>& sizes) = 0;
};
"#,
        );
        let cc = files.text("bridge/widget_from_abi.cc");
        assert!(cc.contains(
            "  size_t sizesSize = sizes.size();\n\
             \x20 size_t sizesCount = std::max(static_cast<size_t>(GetSizeCount()), sizesSize);\n\
             \x20 int* sizesList = nullptr;\n\
             \x20 if (sizesCount > 0) {\n\
             \x20   sizesList = new int[sizesCount]();\n\
             \x20   for (size_t i = 0; i < sizesSize; ++i) {\n\
             \x20     sizesList[i] = sizes[i];\n\
             \x20   }\n\
             \x20 }\n"
        ));
        assert!(cc.contains("  _struct->get_sizes(_struct, &sizesCount, sizesList);\n"));
        assert!(cc.contains(
            "  sizes.clear();\n\
             \x20 if (sizesCount > 0 && sizesList) {\n\
             \x20   for (size_t i = 0; i < sizesCount; ++i) {\n\
             \x20     sizes.push_back(sizesList[i]);\n\
             \x20   }\n\
             \x20   delete[] sizesList;\n\
             \x20 }\n"
        ));
        assert!(cc.contains("#include <algorithm>\n"));
    }

    #[test]
    fn test_string_return_and_map_argument() {
        let files = generate_one(
            r#"
/*--abi()--*/
ModuleString Describe(const std::map<ModuleString, ModuleString>& values);
"#,
        );
        let cc = files.text("bridge/module_globals_from_abi.cc");
        assert!(cc.contains("ModuleString Describe(const std::map<ModuleString, ModuleString>& values) {"));
        assert!(cc.contains("  module_string_map_t valuesMap = module_string_map_alloc();\n"));
        assert!(cc.contains("  module_string_userfree_t _retval = module_describe(valuesMap);\n"));
        assert!(cc.contains("    module_string_map_free(valuesMap);\n"));
        assert!(cc.contains("  _retvalStr.AttachToUserFree(_retval);\n"));
    }
}
