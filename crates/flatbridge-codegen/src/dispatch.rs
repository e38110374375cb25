//! Run-time version dispatch for classes with more than one struct layout.
//!
//! Each layout group gets its own adapter (`XToAbi_vN`, `XFromAbi_vN`). The
//! unversioned `Wrap`/`Unwrap` entry points ask the runtime for the API
//! version, try the groups from newest to oldest and hand the pointer to the
//! first group that covers the version. Falling through is fatal.

use flatbridge_ast::{ClassDecl, FunctionDecl, FunctionKind, Ownership};

use crate::bridge::{Context, Planned};
use crate::code::Code;
use crate::layout::{ClassLayouts, LayoutGroup, Slot};
use crate::marshal::{handle_abi_type, handle_object_type, Handle};
use crate::names;

fn handle_kind(class: &ClassDecl) -> Handle {
    match class.ownership {
        Ownership::Shared => Handle::Shared,
        Ownership::Exclusive => Handle::Exclusive,
    }
}

/// Pass an object handle on, moving it when ownership is exclusive.
fn forward(class: &ClassDecl, name: &str) -> String {
    match class.ownership {
        Ownership::Shared => name.to_string(),
        Ownership::Exclusive => format!("std::move({name})"),
    }
}

/// `if (version >= N)` chain, newest group first, ending in `ABI_FATAL`.
fn branches(
    ctx: &Context<'_>,
    layouts: &ClassLayouts,
    entry: &str,
    code: &mut Code,
    mut statement: impl FnMut(&LayoutGroup) -> String,
) {
    code.line(format!("const int version = {}();", ctx.dialect.version_fn()));
    for (i, group) in layouts.newest_first().enumerate() {
        let condition = match group.end {
            Some(end) if i == 0 => format!("version >= {} && version < {end}", group.first),
            _ => format!("version >= {}", group.first),
        };
        code.open(format!("if ({condition})"));
        code.line(statement(group));
        code.close("");
    }
    code.line(format!(
        "ABI_FATAL(\"{entry} called with unsupported API version %d\", version);"
    ));
    code.line("return nullptr;");
}

/// Header part: the dispatching `XToAbi` plus one adapter per group.
pub(crate) fn to_abi_declarations(
    ctx: &Context<'_>,
    class: &ClassDecl,
    layouts: &ClassLayouts,
    code: &mut Code,
) {
    let dialect = ctx.dialect;
    let adapter = names::to_abi_class(&class.name, None);
    let handle = handle_abi_type(&class.name, dialect);
    let object = handle_object_type(handle_kind(class), &class.name, dialect);

    code.line("// Selects the versioned adapter matching the runtime API version.");
    code.open(format!("class {adapter}"));
    code.dedent();
    code.line(" public:");
    code.indent();
    code.line(format!("static {handle} Wrap({object} c);"));
    code.line(format!("static {object} Unwrap({handle} s);"));
    code.line(format!("static {}* Get({handle} s);", class.name));
    code.close(";");

    for group in &layouts.groups {
        let versioned = names::to_abi_class(&class.name, Some(group.first));
        code.blank();
        code.line(format!("class {versioned}"));
        code.open(format!(
            "    : public {}<{versioned}, {}, {}>",
            crate::bridge::to_abi_template(class.ownership),
            class.name,
            dialect.versioned_abi_name(&class.name, group.first)
        ));
        code.dedent();
        code.line(" public:");
        code.indent();
        code.line(format!("{versioned}();"));
        code.close(";");
    }
}

/// Source part: group constructors and the dispatching entry points.
pub(crate) fn to_abi_dispatch(
    ctx: &Context<'_>,
    class: &ClassDecl,
    layouts: &ClassLayouts,
    plans: &[(&FunctionDecl, Planned<'_>)],
    code: &mut Code,
) {
    let dialect = ctx.dialect;
    let adapter = names::to_abi_class(&class.name, None);
    let handle = handle_abi_type(&class.name, dialect);
    let object = handle_object_type(handle_kind(class), &class.name, dialect);

    code.line("// CONSTRUCTORS - Do not edit by hand.");
    for group in &layouts.groups {
        let versioned = names::to_abi_class(&class.name, Some(group.first));
        code.blank();
        code.open(format!("{versioned}::{versioned}()"));
        for member in &group.layout.members {
            match &member.slot {
                Slot::Base { .. } => {}
                Slot::Function { name, member: field } => {
                    let plan = plans
                        .iter()
                        .find(|(f, _)| f.kind == FunctionKind::Virtual && &f.name == name);
                    match plan {
                        Some((func, Ok(_))) => code.line(format!(
                            "GetStruct()->{field} = {};",
                            names::callback(class, func, dialect)
                        )),
                        _ => code.line(format!("// {field}: not generatable")),
                    }
                }
                Slot::Placeholder { .. } => {
                    code.line(format!("GetStruct()->{} = 0;", member.field()));
                }
            }
        }
        code.close("");
    }

    code.blank();
    code.line("// DISPATCH - Do not edit by hand.");
    code.blank();
    code.open(format!("{handle} {adapter}::Wrap({object} c)"));
    branches(ctx, layouts, &format!("{adapter}::Wrap"), code, |group| {
        format!(
            "return reinterpret_cast<{handle}>({}::Wrap({}));",
            names::to_abi_class(&class.name, Some(group.first)),
            forward(class, "c")
        )
    });
    code.close("");

    code.blank();
    code.open(format!("{object} {adapter}::Unwrap({handle} s)"));
    branches(ctx, layouts, &format!("{adapter}::Unwrap"), code, |group| {
        format!(
            "return {}::Unwrap(reinterpret_cast<{}*>(s));",
            names::to_abi_class(&class.name, Some(group.first)),
            dialect.versioned_abi_name(&class.name, group.first)
        )
    });
    code.close("");

    code.blank();
    code.open(format!("{}* {adapter}::Get({handle} s)", class.name));
    branches(ctx, layouts, &format!("{adapter}::Get"), code, |group| {
        format!(
            "return {}::Get(reinterpret_cast<{}*>(s));",
            names::to_abi_class(&class.name, Some(group.first)),
            dialect.versioned_abi_name(&class.name, group.first)
        )
    });
    code.close("");
}

/// Static entry points declared inside `XFromAbi`.
pub(crate) fn from_abi_entry_points(ctx: &Context<'_>, class: &ClassDecl, code: &mut Code) {
    let handle = handle_abi_type(&class.name, ctx.dialect);
    let object = handle_object_type(handle_kind(class), &class.name, ctx.dialect);
    code.line(format!("static {object} Wrap({handle} s);"));
    code.line(format!("static {handle} Unwrap({object} c);"));
}

/// `using XFromAbi_vN = ...;` per layout group.
pub(crate) fn from_abi_aliases(
    ctx: &Context<'_>,
    class: &ClassDecl,
    layouts: &ClassLayouts,
    code: &mut Code,
) {
    let adapter = names::from_abi_class(&class.name, None);
    for group in &layouts.groups {
        code.line(format!(
            "using {} = BridgeFromAbiVersioned<{adapter}, {}, {}>;",
            names::from_abi_class(&class.name, Some(group.first)),
            class.name,
            ctx.dialect.versioned_abi_name(&class.name, group.first)
        ));
    }
}

pub(crate) fn from_abi_dispatch(
    ctx: &Context<'_>,
    class: &ClassDecl,
    layouts: &ClassLayouts,
    code: &mut Code,
) {
    let dialect = ctx.dialect;
    let adapter = names::from_abi_class(&class.name, None);
    let handle = handle_abi_type(&class.name, dialect);
    let object = handle_object_type(handle_kind(class), &class.name, dialect);

    code.line("// DISPATCH - Do not edit by hand.");
    code.blank();
    code.open(format!("{object} {adapter}::Wrap({handle} s)"));
    branches(ctx, layouts, &format!("{adapter}::Wrap"), code, |group| {
        format!(
            "return {}::Wrap(reinterpret_cast<{}*>(s));",
            names::from_abi_class(&class.name, Some(group.first)),
            dialect.versioned_abi_name(&class.name, group.first)
        )
    });
    code.close("");

    code.blank();
    code.open(format!("{handle} {adapter}::Unwrap({object} c)"));
    branches(ctx, layouts, &format!("{adapter}::Unwrap"), code, |group| {
        format!(
            "return reinterpret_cast<{handle}>({}::Unwrap({}));",
            names::from_abi_class(&class.name, Some(group.first)),
            forward(class, "c")
        )
    });
    code.close("");
}

#[cfg(test)]
mod tests {
    use crate::bridge::tests::generate_one;

    const WIDGET: &str = r#"
/*--abi()--*/
class ModuleWidget : public ModuleBaseRefCounted {
  /*--abi()--*/
  virtual int GetSize() = 0;
  /*--abi(removed=3)--*/
  virtual void Resize(int size) = 0;
  /*--abi(added=2)--*/
  virtual void Hide() = 0;
};
"#;

    #[test]
    fn test_wrap_branches_newest_first() {
        let files = generate_one(WIDGET);
        let cc = files.text("bridge/widget_to_abi.cc");

        let v3 = cc.find("if (version >= 3) {").unwrap();
        let v2 = cc.find("if (version >= 2) {").unwrap();
        let v1 = cc.find("if (version >= 1) {").unwrap();
        assert!(v3 < v2 && v2 < v1);
        assert!(cc.contains(
            "    return reinterpret_cast<struct _module_widget_t*>(ModuleWidgetToAbi_v3::Wrap(c));\n"
        ));
        assert!(cc.contains(
            "  ABI_FATAL(\"ModuleWidgetToAbi::Wrap called with unsupported API version %d\", version);\n  return nullptr;\n"
        ));
        assert!(cc.contains("    return ModuleWidgetToAbi_v2::Unwrap(reinterpret_cast<module_widget_v2_t*>(s));\n"));
    }

    #[test]
    fn test_group_constructors_bind_live_slots_only() {
        let files = generate_one(WIDGET);
        let cc = files.text("bridge/widget_to_abi.cc");
        assert!(cc.contains(
            "ModuleWidgetToAbi_v1::ModuleWidgetToAbi_v1() {\n\
             \x20 GetStruct()->get_size = widget_get_size;\n\
             \x20 GetStruct()->resize = widget_resize;\n\
             }\n"
        ));
        assert!(cc.contains(
            "ModuleWidgetToAbi_v3::ModuleWidgetToAbi_v3() {\n\
             \x20 GetStruct()->get_size = widget_get_size;\n\
             \x20 GetStruct()->unused_resize = 0;\n\
             \x20 GetStruct()->hide = widget_hide;\n\
             }\n"
        ));
        assert!(!cc.contains("ModuleWidgetToAbi::ModuleWidgetToAbi()"));
    }

    #[test]
    fn test_from_abi_dispatch_and_aliases() {
        let files = generate_one(WIDGET);
        let h = files.text("bridge/widget_from_abi.h");
        assert!(h.contains(
            "using ModuleWidgetFromAbi_v2 = BridgeFromAbiVersioned<ModuleWidgetFromAbi, ModuleWidget, module_widget_v2_t>;\n"
        ));
        assert!(h.contains("  static ModuleRefPtr<ModuleWidget> Wrap(struct _module_widget_t* s);\n"));

        let cc = files.text("bridge/widget_from_abi.cc");
        assert!(cc.contains("    return ModuleWidgetFromAbi_v1::Wrap(reinterpret_cast<module_widget_v1_t*>(s));\n"));
        assert!(cc.contains("ModuleWidgetFromAbi::Unwrap called with unsupported API version %d"));
    }

    #[test]
    fn test_removed_class_bounds_top_branch() {
        let files = generate_one(
            r#"
/*--abi(removed=5)--*/
class ModuleTask : public ModuleBaseScoped {
  /*--abi(added=2)--*/
  virtual void Run() = 0;
};
"#,
        );
        let cc = files.text("bridge/task_to_abi.cc");
        assert!(cc.contains("  if (version >= 2 && version < 5) {\n"));
        assert!(cc.contains("ModuleTaskToAbi_v2::Wrap(std::move(c))"));
    }
}
