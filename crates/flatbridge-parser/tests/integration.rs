//! Integration tests for flatbridge-parser across several declaration files.

use flatbridge_ast::{Category, DeclarationModel, Diagnostics, Dialect, Ownership, Scope};
use flatbridge_parser::parse;

const BASE_TYPES: &str = r#"
// Shared aliases.

/*--abi()--*/
typedef std::vector<ModuleString> StringList;
"#;

const FRAME: &str = r#"
///
// A frame inside a browser.
///
/*--abi(source=library)--*/
class ModuleFrame : public ModuleBaseRefCounted {
 public:
  /*--abi()--*/
  virtual ModuleString GetName() = 0;

  /*--abi()--*/
  virtual void GetChildNames(StringList& names) = 0;
};
"#;

const VISITOR: &str = r#"
/*--abi(source=client)--*/
class ModuleFrameVisitor : public ModuleBaseScoped {
 public:
  /*--abi(optional_param=frame)--*/
  virtual bool Visit(ModuleRefPtr<ModuleFrame> frame, int depth) = 0;
};
"#;

/// Parse files in order, each one seeing the typedefs of the ones before it.
fn parse_all(files: &[&str]) -> DeclarationModel {
    let dialect = Dialect::default();
    let mut diags = Diagnostics::new();
    let mut root = Scope::new("<root>");
    let mut fragments = Vec::new();
    for src in files {
        let fragment = parse(src, &[&root], &dialect, &mut diags)
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        root.typedefs.extend(fragment.typedefs.iter().cloned());
        fragments.push(fragment);
    }
    DeclarationModel::build(fragments, &dialect).unwrap_or_else(|e| panic!("link failed: {e}"))
}

#[test]
fn test_typedefs_flow_into_later_files() {
    let model = parse_all(&[BASE_TYPES, FRAME, VISITOR]);

    let frame = model.class("ModuleFrame").unwrap();
    let names = &frame.virtuals[1].args[0].ty;
    assert!(names.by_ref);
    let Category::Sequence(elem) = &names.category else {
        panic!("expected a sequence, got {:?}", names.category);
    };
    assert_eq!(elem.category, Category::String);
}

#[test]
fn test_ownership_and_sides() {
    let model = parse_all(&[BASE_TYPES, FRAME, VISITOR]);

    let visitor = model.class("ModuleFrameVisitor").unwrap();
    assert_eq!(visitor.ownership, Ownership::Exclusive);
    assert_eq!(visitor.source(), flatbridge_ast::Side::Client);
    assert_eq!(model.class("ModuleFrame").unwrap().ownership, Ownership::Shared);
    assert_eq!(model.root_scope().typedefs.len(), 1);
}

#[test]
fn test_canonical_text_ignores_formatting() {
    let reformatted = FRAME
        .replace("  virtual ModuleString GetName() = 0;", "  virtual   ModuleString\n    GetName() = 0;  // name")
        .replace("// A frame inside a browser.", "// A frame. Docs do not count.");

    let a = parse_all(&[BASE_TYPES, FRAME]).canonical_declarations();
    let b = parse_all(&[BASE_TYPES, reformatted.as_str()]).canonical_declarations();
    assert_eq!(a, b);
}

#[test]
fn test_file_order_matters_for_typedefs() {
    let dialect = Dialect::default();
    let mut diags = Diagnostics::new();
    let err = parse(FRAME, &[], &dialect, &mut diags).unwrap_err();
    assert!(err.to_string().contains("StringList"));
}
