//! Object implementation exposed through the ABI.

use std::path::Path;

use flatbridge_ast::{ClassDecl, FunctionDecl, FunctionKind, Ownership};

use super::{
    bail, body_lines, guard, open_adapter_header, stub_body, Context, Owner, Planned,
};
use crate::code::Code;
use crate::dispatch;
use crate::header::self_param;
use crate::layout::ClassLayouts;
use crate::marshal::{ArgPlan, FunctionPlan, MarshalArg, ReturnPlan};
use crate::merge::{FunctionText, AUTOGEN_MARKER};
use crate::{names, OutputDirs};

pub(crate) fn template(ownership: Ownership) -> &'static str {
    match ownership {
        Ownership::Shared => "BridgeToAbiRefCounted",
        Ownership::Exclusive => "BridgeToAbiScoped",
    }
}

pub(super) fn class_header(
    ctx: &Context<'_>,
    class: &ClassDecl,
    layouts: &ClassLayouts,
    path: &Path,
    dirs: &OutputDirs,
) -> String {
    let mut code = Code::new();
    let guard = open_adapter_header(&mut code, path);
    code.line(format!("#include \"{}\"", names::object_header(&class.name, ctx.dialect)));
    code.line(format!(
        "#include \"{}\"",
        dirs.abi_include(&names::capi_header(&class.name, ctx.dialect))
    ));
    code.line(format!("#include \"{}\"", dirs.bridge_include("to_abi_base.h")));
    code.blank();

    if layouts.is_dispatched() {
        dispatch::to_abi_declarations(ctx, class, layouts, &mut code);
    } else {
        let adapter = names::to_abi_class(&class.name, None);
        code.line(format!("// Wraps a C++ {} implementation in a {}.", class.name, ctx.dialect.class_abi_name(&class.name)));
        code.line(format!("class {adapter}"));
        code.open(format!(
            "    : public {}<{adapter}, {}, {}>",
            template(class.ownership),
            class.name,
            ctx.dialect.class_abi_name(&class.name)
        ));
        code.dedent();
        code.line(" public:");
        code.indent();
        code.line(format!("{adapter}();"));
        code.close(";");
    }

    code.blank();
    code.line(format!("#endif  // {guard}"));
    code.finish()
}

/// Member callbacks in an anonymous namespace, exported statics, then the
/// constructor binding callbacks into the struct.
pub(super) fn class_source(
    ctx: &Context<'_>,
    class: &ClassDecl,
    layouts: &ClassLayouts,
    plans: &[(&FunctionDecl, Planned<'_>)],
    virtuals: &str,
    statics: &str,
    code: &mut Code,
) {
    if !virtuals.is_empty() {
        code.line("namespace {");
        code.blank();
        code.line("// MEMBER FUNCTIONS - Body may be edited by hand.");
        code.blank();
        code.raw(virtuals);
        code.blank();
        code.line("}  // namespace");
        code.blank();
    }
    if !statics.is_empty() {
        code.line("// GLOBAL FUNCTIONS - Body may be edited by hand.");
        code.blank();
        code.raw(statics);
        code.blank();
    }

    if layouts.is_dispatched() {
        return;
    }
    code.line("// CONSTRUCTOR - Do not edit by hand.");
    code.blank();
    let adapter = names::to_abi_class(&class.name, None);
    code.open(format!("{adapter}::{adapter}()"));
    for (func, plan) in plans.iter().filter(|(f, _)| f.kind == FunctionKind::Virtual) {
        let member = names::struct_member(func, ctx.dialect);
        match plan {
            Ok(_) => code.line(format!(
                "GetStruct()->{member} = {};",
                names::callback(class, func, ctx.dialect)
            )),
            Err(_) => code.line(format!("// {member}: not generatable")),
        }
    }
    code.close("");
}

pub(super) fn function(
    ctx: &Context<'_>,
    owner: Owner<'_>,
    func: &FunctionDecl,
    planned: &Planned<'_>,
) -> FunctionText {
    let tag = owner.tag(func);
    let symbol = symbol(ctx, owner, func);
    match planned {
        Ok(plan) => {
            let mut params = Vec::new();
            if let (Owner::Class(class), FunctionKind::Virtual) = (owner, func.kind) {
                params.push(self_param(class, ctx.dialect));
            }
            params.extend(plan.abi_params(ctx.dialect));
            FunctionText {
                signature: signature(ctx, func, &plan.ret.abi_type(ctx.dialect), &symbol, &params),
                body: body(ctx, owner, plan),
                tag,
                stub: false,
            }
        }
        Err(reason) => {
            let mut params = Vec::new();
            if let (Owner::Class(class), FunctionKind::Virtual) = (owner, func.kind) {
                params.push(self_param(class, ctx.dialect));
            }
            FunctionText {
                signature: signature(ctx, func, "void", &symbol, &params),
                body: stub_body(&tag, reason, false),
                tag,
                stub: true,
            }
        }
    }
}

fn symbol(ctx: &Context<'_>, owner: Owner<'_>, func: &FunctionDecl) -> String {
    match (owner, func.kind) {
        (Owner::Class(class), FunctionKind::Virtual) => names::callback(class, func, ctx.dialect),
        (Owner::Class(class), _) => names::static_export(class, func, ctx.dialect),
        (Owner::Globals, _) => names::global_export(func, ctx.dialect),
    }
}

fn signature(ctx: &Context<'_>, func: &FunctionDecl, ret: &str, symbol: &str, params: &[String]) -> String {
    let params = params.join(", ");
    if func.kind == FunctionKind::Virtual {
        format!("{ret} {} {symbol}({params}) {{", ctx.dialect.callback_macro())
    } else {
        format!("{} {ret} {symbol}({params}) {{", ctx.dialect.export_macro())
    }
}

fn body(ctx: &Context<'_>, owner: Owner<'_>, plan: &FunctionPlan<'_>) -> Vec<String> {
    let func = plan.func;
    let default = plan.ret.abi_default(func, ctx.dialect);
    let bail = bail(default.as_deref());

    let mut code = Code::new();
    code.indent();
    code.line(AUTOGEN_MARKER);
    code.blank();

    let is_member = func.kind == FunctionKind::Virtual;
    if is_member {
        guard(&mut code, "!self", &bail);
    }
    for arg in &plan.args {
        verify(ctx, arg, &bail, &mut code);
    }
    for arg in &plan.args {
        translate(ctx, arg, &mut code);
    }

    code.line("// Execute");
    let args = plan
        .args
        .iter()
        .map(|a| call_arg(ctx, a))
        .collect::<Vec<_>>()
        .join(", ");
    let callee = match owner {
        Owner::Class(class) if is_member => format!(
            "{}::Get(self)->{}",
            names::to_abi_class(&class.name, None),
            func.name
        ),
        Owner::Class(class) => format!("{}::{}", class.name, func.name),
        Owner::Globals => func.name.clone(),
    };
    if plan.ret.is_void() {
        code.line(format!("{callee}({args});"));
    } else {
        code.line(format!("{} _retval = {callee}({args});", func.return_type.raw));
    }

    let mut restored = false;
    for arg in &plan.args {
        restored |= restore(ctx, arg, &mut code, !restored);
    }

    if !plan.ret.is_void() {
        code.blank();
        code.line(format!("// Return type: {}", plan.ret.label()));
        let value = match &plan.ret {
            ReturnPlan::String => "_retval.DetachToUserFree()".to_string(),
            ReturnPlan::Handle { kind, class } => ctx.handle_to_abi(*kind, class, "_retval"),
            _ => "_retval".to_string(),
        };
        code.line(format!("return {value};"));
    }
    body_lines(code)
}

fn verify(ctx: &Context<'_>, arg: &MarshalArg<'_>, bail: &str, code: &mut Code) {
    let n = arg.name();
    let condition = match &arg.plan {
        ArgPlan::SimpleIndirect { .. } | ArgPlan::StringIn | ArgPlan::Handle { .. } if !arg.optional => {
            format!("!{n}")
        }
        ArgPlan::SequenceIn(_) => format!("{n}Count > 0 && !{n}"),
        ArgPlan::SequenceOut { .. } => format!("{n}Count && *{n}Count > 0 && !{n}"),
        _ => return,
    };
    let label = match &arg.plan {
        ArgPlan::Handle { kind, class } => format!(
            "{}_{}",
            kind.label(),
            if ctx.same_side(class) { "same" } else { "diff" }
        ),
        _ => arg.decl.ty.label(),
    };
    code.line(format!("// Verify param: {n}; type: {label}"));
    guard(code, &condition, bail);
}

fn translate(ctx: &Context<'_>, arg: &MarshalArg<'_>, code: &mut Code) {
    let n = arg.name();
    let string = ctx.dialect.string_type();
    let header = |code: &mut Code| {
        code.line(format!("// Translate param: {n}; type: {}", arg.decl.ty.label()));
    };
    match &arg.plan {
        ArgPlan::BoolIndirect { .. } => {
            header(code);
            code.line(format!("bool {n}Bool = ({n} && *{n}) ? true : false;"));
        }
        ArgPlan::StringOut => {
            header(code);
            code.line(format!("{string} {n}Str({n});"));
        }
        ArgPlan::StructIndirect { object, .. } => {
            header(code);
            code.line(format!("{object} {n}Val = {n} ? {object}(*{n}) : {object}();"));
        }
        ArgPlan::SequenceIn(element) => {
            header(code);
            code.line(format!("std::vector<{}> {n}List;", element.object_type(ctx.dialect)));
            code.open(format!("if ({n}Count && {n})"));
            code.open(format!("for (size_t i = 0; i < {n}Count; ++i)"));
            code.line(format!(
                "{n}List.push_back({});",
                ctx.element_to_object(element, &format!("{n}[i]"))
            ));
            code.close("");
            code.close("");
        }
        ArgPlan::SequenceOut { element, .. } => {
            header(code);
            code.line(format!("std::vector<{}> {n}List;", element.object_type(ctx.dialect)));
            code.open(format!("if ({n}Count && *{n}Count > 0 && {n})"));
            code.open(format!("for (size_t i = 0; i < *{n}Count; ++i)"));
            code.line(format!(
                "{n}List.push_back({});",
                ctx.element_to_object(element, &format!("{n}[i]"))
            ));
            code.close("");
            code.close("");
        }
        ArgPlan::StringListIn | ArgPlan::StringListOut => {
            header(code);
            code.line(format!("std::vector<{string}> {n}List;"));
            code.line(format!("transfer_string_list_contents({n}, {n}List);"));
        }
        ArgPlan::MapIn { multi } | ArgPlan::MapOut { multi } => {
            header(code);
            let (kind, _) = ctx.map_names(*multi);
            code.line(format!("std::{kind}<{string}, {string}> {n}Map;"));
            code.line(format!("transfer_string_{kind}_contents({n}, {n}Map);"));
        }
        ArgPlan::Simple { .. }
        | ArgPlan::SimpleIndirect { .. }
        | ArgPlan::Bool
        | ArgPlan::StringIn
        | ArgPlan::Handle { .. }
        | ArgPlan::StructValue { .. } => {}
    }
}

fn call_arg(ctx: &Context<'_>, arg: &MarshalArg<'_>) -> String {
    let n = arg.name();
    match &arg.plan {
        ArgPlan::Simple { .. } => n.to_string(),
        ArgPlan::SimpleIndirect { by_addr: true, .. } => n.to_string(),
        ArgPlan::SimpleIndirect { by_addr: false, .. } => format!("*{n}"),
        ArgPlan::Bool => format!("{n} ? true : false"),
        ArgPlan::BoolIndirect { by_addr: true } => format!("{n} ? &{n}Bool : nullptr"),
        ArgPlan::BoolIndirect { by_addr: false } => format!("{n}Bool"),
        ArgPlan::StringIn => format!("{}({n})", ctx.dialect.string_type()),
        ArgPlan::StringOut => format!("{n}Str"),
        ArgPlan::Handle { kind, class } => ctx.handle_to_object(*kind, class, n),
        ArgPlan::StructValue { object, .. } => format!("{object}({n})"),
        ArgPlan::StructIndirect { by_addr: true, .. } => format!("&{n}Val"),
        ArgPlan::StructIndirect { by_addr: false, .. } => format!("{n}Val"),
        ArgPlan::SequenceIn(_)
        | ArgPlan::SequenceOut { .. }
        | ArgPlan::StringListIn
        | ArgPlan::StringListOut => format!("{n}List"),
        ArgPlan::MapIn { .. } | ArgPlan::MapOut { .. } => format!("{n}Map"),
    }
}

/// Copy results back into out-parameters. Returns whether anything was
/// emitted.
fn restore(ctx: &Context<'_>, arg: &MarshalArg<'_>, code: &mut Code, first: bool) -> bool {
    let n = arg.name();
    let header = |code: &mut Code| {
        if first {
            code.blank();
        }
        code.line(format!("// Restore param: {n}; type: {}", arg.decl.ty.label()));
    };
    match &arg.plan {
        ArgPlan::BoolIndirect { .. } => {
            header(code);
            code.open(format!("if ({n})"));
            code.line(format!("*{n} = {n}Bool ? 1 : 0;"));
            code.close("");
        }
        ArgPlan::StructIndirect { is_const: false, .. } => {
            header(code);
            code.open(format!("if ({n})"));
            code.line(format!("*{n} = {n}Val;"));
            code.close("");
        }
        ArgPlan::SequenceOut { element, .. } => {
            header(code);
            code.open(format!("if ({n}Count && {n})"));
            code.line(format!("*{n}Count = std::min({n}List.size(), *{n}Count);"));
            code.open(format!("for (size_t i = 0; i < *{n}Count; ++i)"));
            code.line(format!(
                "{n}[i] = {};",
                ctx.element_to_abi(element, &format!("{n}List[i]"))
            ));
            code.close("");
            code.close("");
        }
        ArgPlan::StringListOut => {
            header(code);
            code.line(format!("{}({n});", ctx.string_list_fn("clear")));
            code.line(format!("transfer_string_list_contents({n}List, {n});"));
        }
        ArgPlan::MapOut { multi } => {
            header(code);
            let (kind, _) = ctx.map_names(*multi);
            code.line(format!("{}_string_{kind}_clear({n});", ctx.dialect.token()));
            code.line(format!("transfer_string_{kind}_contents({n}Map, {n});"));
        }
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::super::tests::generate_one;

    #[test]
    fn test_member_callback_body() {
        let files = generate_one(
            r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi()--*/
  virtual int GetSize() = 0;
};
"#,
        );
        let cc = files.text("bridge/widget_to_abi.cc");
        assert!(cc.contains(
            "// [bridge] ModuleWidget::GetSize\n\
             int MODULE_CALLBACK widget_get_size(struct _module_widget_t* self) {\n\
             \x20 // AUTO-GENERATED CONTENT - DELETE THIS COMMENT BEFORE MODIFYING\n\
             \n\
             \x20 if (!self) {\n\
             \x20   return 0;\n\
             \x20 }\n\
             \x20 // Execute\n\
             \x20 int _retval = ModuleWidgetToAbi::Get(self)->GetSize();\n\
             \n\
             \x20 // Return type: simple\n\
             \x20 return _retval;\n\
             }\n"
        ));
        assert!(cc.contains("namespace {\n"));
        assert!(cc.contains("ModuleWidgetToAbi::ModuleWidgetToAbi() {\n  GetStruct()->get_size = widget_get_size;\n}\n"));

        let h = files.text("bridge/widget_to_abi.h");
        assert!(h.contains(
            "class ModuleWidgetToAbi\n    : public BridgeToAbiRefCounted<ModuleWidgetToAbi, ModuleWidget, module_widget_t> {\n public:\n  ModuleWidgetToAbi();\n};\n"
        ));
    }

    #[test]
    fn test_string_and_bool_out_params() {
        let files = generate_one(
            r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi(optional_param=title)--*/
  virtual bool Describe(const ModuleString& title, ModuleString& out, bool* flag) = 0;
};
"#,
        );
        let cc = files.text("bridge/widget_to_abi.cc");
        assert!(cc.contains(
            "int MODULE_CALLBACK widget_describe(struct _module_widget_t* self, \
             const module_string_t* title, module_string_t* out, int* flag) {"
        ));
        assert!(!cc.contains("// Verify param: title"));
        assert!(cc.contains("  ModuleString outStr(out);\n"));
        assert!(cc.contains("  bool flagBool = (flag && *flag) ? true : false;\n"));
        assert!(cc.contains(
            "  bool _retval = ModuleWidgetToAbi::Get(self)->Describe(ModuleString(title), outStr, flag ? &flagBool : nullptr);\n"
        ));
        assert!(cc.contains("  if (flag) {\n    *flag = flagBool ? 1 : 0;\n  }\n"));
    }

    #[test]
    fn test_sequence_of_handles_keeps_order() {
        let files = generate_one(
            r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi()--*/
  virtual void SetChildren(const std::vector<ModuleRefPtr<ModuleFrame>>& children) = 0;
};
/*--abi(source=client)--*/
class ModuleFrame : public ModuleBaseRefCounted {
};
"#,
        );
        let cc = files.text("bridge/widget_to_abi.cc");
        assert!(cc.contains(
            "  if (childrenCount > 0 && !children) {\n    return;\n  }\n"
        ));
        assert!(cc.contains(
            "  std::vector<ModuleRefPtr<ModuleFrame>> childrenList;\n\
             \x20 if (childrenCount && children) {\n\
             \x20   for (size_t i = 0; i < childrenCount; ++i) {\n\
             \x20     childrenList.push_back(ModuleFrameFromAbi::Wrap(children[i]));\n\
             \x20   }\n\
             \x20 }\n"
        ));
        assert!(cc.contains("#include \"bridge/frame_from_abi.h\"\n"));
    }

    #[test]
    fn test_static_export_returns_wrapped_handle() {
        let files = generate_one(
            r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi()--*/
  static ModuleRefPtr<ModuleWidget> Create(const ModuleString& name);
};
"#,
        );
        let cc = files.text("bridge/widget_to_abi.cc");
        assert!(cc.contains(
            "MODULE_EXPORT struct _module_widget_t* module_widget_create(const module_string_t* name) {"
        ));
        assert!(cc.contains("  ModuleRefPtr<ModuleWidget> _retval = ModuleWidget::Create(ModuleString(name));\n"));
        assert!(cc.contains("  return ModuleWidgetToAbi::Wrap(_retval);\n"));
        assert!(!cc.contains("namespace {"));
    }
}
