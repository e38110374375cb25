//! Merge-on-regeneration for bridge files.
//!
//! Every generated function is framed as:
//!
//! ```text
//! // [bridge] ModuleWidget::GetSize
//! int MODULE_CALLBACK widget_get_size(struct _module_widget_t* self) {
//!   // AUTO-GENERATED CONTENT - DELETE THIS COMMENT BEFORE MODIFYING
//!   ...
//! }
//! ```
//!
//! A body that no longer starts with the marker belongs to a human. It is
//! carried over verbatim; if the function's signature moved underneath it, a
//! warning block is placed right after the signature line.

use indexmap::IndexMap;

use flatbridge_ast::{DiagnosticKind, Diagnostics};

pub const AUTOGEN_MARKER: &str = "// AUTO-GENERATED CONTENT - DELETE THIS COMMENT BEFORE MODIFYING";
pub const TAG_PREFIX: &str = "// [bridge] ";
pub const WARNING_HEADER: &str = "// WARNING - CHANGED ATTRIBUTES";

/// Column-0 lines that open a new section of a bridge file.
const SECTION_STARTS: &[&str] = &[
    "// MEMBER FUNCTIONS",
    "// GLOBAL FUNCTIONS",
    "// VIRTUAL METHODS",
    "// STATIC METHODS",
    "// CONSTRUCTOR",
    "// DISPATCH",
    "}  // namespace",
];

fn starts_section(line: &str) -> bool {
    line.starts_with(TAG_PREFIX) || SECTION_STARTS.iter().any(|s| line.starts_with(s))
}

/// A freshly generated function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionText {
    /// `Class::Function`, or the bare function name for globals.
    pub tag: String,
    /// Full signature line, ending in `{`.
    pub signature: String,
    /// Body lines, already indented, starting with the marker.
    pub body: Vec<String>,
    /// No marshaling rule applied; the body is a stub.
    pub stub: bool,
}

impl FunctionText {
    pub fn render(&self) -> String {
        render(&self.tag, &self.signature, &[], &self.body)
    }
}

/// A function as found in a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingFunction {
    pub signature: String,
    /// A previously injected warning block, if any.
    pub warning: Vec<String>,
    pub body: Vec<String>,
}

impl ExistingFunction {
    /// The body still carries the marker, so it may be regenerated freely.
    pub fn is_generated(&self) -> bool {
        self.body
            .first()
            .is_some_and(|line| line.trim() == AUTOGEN_MARKER)
    }
}

/// Scan a bridge file for tagged functions.
pub fn parse_existing(text: &str) -> IndexMap<String, ExistingFunction> {
    let mut functions = IndexMap::new();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(tag) = line.strip_prefix(TAG_PREFIX) else {
            continue;
        };
        let Some(signature) = lines.next() else {
            break;
        };
        // A hand-written body may hold column-0 braces of its own, so the
        // function runs to the next tag or section and ends at its last `}`.
        let mut body = Vec::new();
        while let Some(line) = lines.next_if(|l| !starts_section(l)) {
            body.push(line.to_string());
        }
        if let Some(close) = body.iter().rposition(|l| l.starts_with('}')) {
            body.truncate(close);
        }
        let warning = take_warning_block(&mut body);
        functions.insert(
            tag.trim().to_string(),
            ExistingFunction {
                signature: signature.to_string(),
                warning,
                body,
            },
        );
    }
    functions
}

fn take_warning_block(body: &mut Vec<String>) -> Vec<String> {
    if !body.first().is_some_and(|l| l.trim() == WARNING_HEADER) {
        return Vec::new();
    }
    let end = body
        .iter()
        .position(|l| l.trim_start().starts_with("#pragma message"))
        .map_or(1, |i| i + 1);
    body.drain(..end).collect()
}

/// Parameter and return-type differences between two signature lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureDelta {
    pub removed: Vec<String>,
    pub added: Vec<String>,
    pub return_changed: bool,
}

impl SignatureDelta {
    pub fn between(old: &str, new: &str) -> Self {
        let (old_ret, old_params) = split_signature(old);
        let (new_ret, new_params) = split_signature(new);
        Self {
            removed: old_params
                .iter()
                .filter(|p| !new_params.contains(p))
                .cloned()
                .collect(),
            added: new_params
                .iter()
                .filter(|p| !old_params.contains(p))
                .cloned()
                .collect(),
            return_changed: old_ret != new_ret,
        }
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.removed.is_empty() {
            parts.push(format!("removed `{}`", self.removed.join("`, `")));
        }
        if !self.added.is_empty() {
            parts.push(format!("added `{}`", self.added.join("`, `")));
        }
        if self.return_changed {
            parts.push("return type changed".to_string());
        }
        if parts.is_empty() {
            "qualifiers changed".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Return part (everything before the function name) and parameter list.
fn split_signature(signature: &str) -> (String, Vec<String>) {
    let Some(open) = signature.find('(') else {
        return (signature.trim().to_string(), Vec::new());
    };
    let head = signature[..open].trim_end();
    let ret = head
        .rsplit_once(char::is_whitespace)
        .map_or("", |(ret, _)| ret)
        .trim()
        .to_string();

    let close = signature.rfind(')').unwrap_or(signature.len());
    let inner = if close > open { &signature[open + 1..close] } else { "" };

    let mut params = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' | '(' => depth += 1,
            '>' | ')' => depth -= 1,
            ',' if depth == 0 => {
                params.push(inner[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(inner[start..].trim().to_string());
    params.retain(|p| !p.is_empty() && p != "void");
    (ret, params)
}

fn render(tag: &str, signature: &str, warning: &[String], body: &[String]) -> String {
    let mut out = String::new();
    out.push_str(TAG_PREFIX);
    out.push_str(tag);
    out.push('\n');
    out.push_str(signature);
    out.push('\n');
    for line in warning.iter().chain(body) {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

fn warning_block(tag: &str, delta: &SignatureDelta) -> Vec<String> {
    let mut block = vec![format!("  {WARNING_HEADER}")];
    block.extend(delta.removed.iter().map(|p| format!("  // REMOVED: {p}")));
    block.extend(delta.added.iter().map(|p| format!("  // ADDED: {p}")));
    if delta.return_changed {
        block.push("  // CHANGED: return type".to_string());
    }
    block.push(format!(
        "  #pragma message(\"Warning: \" __FILE__ \": {tag} prototype has changed\")"
    ));
    block
}

/// Outcome of merging one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub text: String,
    /// A hand-edited body was kept.
    pub preserved: bool,
}

/// Merge a generated function with what is on disk.
pub fn merge_function(
    generated: &FunctionText,
    existing: Option<&ExistingFunction>,
    diags: &mut Diagnostics,
) -> Merged {
    let Some(existing) = existing.filter(|e| !e.is_generated()) else {
        return Merged {
            text: generated.render(),
            preserved: false,
        };
    };

    let warning = if existing.signature.trim() == generated.signature.trim() {
        existing.warning.clone()
    } else {
        let delta = SignatureDelta::between(&existing.signature, &generated.signature);
        diags.warn(
            DiagnosticKind::SignatureChanged,
            generated.tag.as_str(),
            format!("prototype of a hand-edited body changed: {}", delta.describe()),
        );
        warning_block(&generated.tag, &delta)
    };
    diags.info(
        DiagnosticKind::PreservedBody,
        generated.tag.as_str(),
        "kept hand-edited body",
    );

    Merged {
        text: render(&generated.tag, &generated.signature, &warning, &existing.body),
        preserved: true,
    }
}

/// Report hand-edited bodies whose function is no longer generated.
pub fn report_dropped<'a>(
    existing: &IndexMap<String, ExistingFunction>,
    generated: impl IntoIterator<Item = &'a str>,
    diags: &mut Diagnostics,
) {
    let generated: Vec<&str> = generated.into_iter().collect();
    for (tag, function) in existing {
        if !function.is_generated() && !generated.contains(&tag.as_str()) {
            diags.warn(
                DiagnosticKind::PreservedBody,
                tag.as_str(),
                "hand-edited body dropped: the function is no longer declared",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(signature: &str) -> FunctionText {
        FunctionText {
            tag: "ModuleWidget::Resize".to_string(),
            signature: signature.to_string(),
            body: vec![
                format!("  {AUTOGEN_MARKER}"),
                String::new(),
                "  ModuleWidgetToAbi::Get(self)->Resize(size);".to_string(),
            ],
            stub: false,
        }
    }

    const CUSTOMIZED: &str = "\
// [bridge] ModuleWidget::Resize
void MODULE_CALLBACK widget_resize(struct _module_widget_t* self, int size) {
  // Hand-written: clamp first.
  ModuleWidgetToAbi::Get(self)->Resize(size < 0 ? 0 : size);
}
";

    #[test]
    fn test_customized_body_with_column_zero_braces() {
        let text = "\
// VIRTUAL METHODS - Body may be edited by hand.

// [bridge] ModuleWidget::Resize
void ModuleWidgetFromAbi::Resize(int size) {
  module_widget_t* _struct = GetStruct();
#if defined(OS_WIN)
  auto clamp = [](int v) {
  return v < 0 ? 0 : v;
};
#endif
  _struct->resize(_struct, clamp(size));
}

// [bridge] ModuleWidget::Hide
void ModuleWidgetFromAbi::Hide() {
  Hidden();
}

// CONSTRUCTOR - Do not edit by hand.

ModuleWidgetFromAbi::ModuleWidgetFromAbi() {}
";
        let existing = parse_existing(text);
        assert_eq!(existing.len(), 2);
        let resize = &existing["ModuleWidget::Resize"];
        assert_eq!(resize.body.len(), 7);
        assert_eq!(resize.body[4], "};");
        assert_eq!(resize.body[6], "  _struct->resize(_struct, clamp(size));");
        assert_eq!(existing["ModuleWidget::Hide"].body, vec!["  Hidden();".to_string()]);

        let fresh = FunctionText {
            tag: "ModuleWidget::Resize".to_string(),
            signature: "void ModuleWidgetFromAbi::Resize(int size) {".to_string(),
            body: vec![format!("  {AUTOGEN_MARKER}")],
            stub: false,
        };
        let mut diags = Diagnostics::new();
        let merged = merge_function(&fresh, Some(resize), &mut diags);
        assert!(merged.preserved);
        assert!(merged.text.contains("};\n#endif\n  _struct->resize(_struct, clamp(size));\n}\n"));
    }

    #[test]
    fn test_generated_body_is_replaced() {
        let on_disk = generated("void MODULE_CALLBACK widget_resize(struct _module_widget_t* self) {");
        let existing = parse_existing(&on_disk.render());
        let fresh =
            generated("void MODULE_CALLBACK widget_resize(struct _module_widget_t* self, int size) {");

        let mut diags = Diagnostics::new();
        let merged = merge_function(&fresh, existing.get("ModuleWidget::Resize"), &mut diags);
        assert!(!merged.preserved);
        assert_eq!(merged.text, fresh.render());
        assert!(diags.is_empty());
    }

    #[test]
    fn test_customized_body_is_kept_byte_for_byte() {
        let existing = parse_existing(CUSTOMIZED);
        let fresh =
            generated("void MODULE_CALLBACK widget_resize(struct _module_widget_t* self, int size) {");

        let mut diags = Diagnostics::new();
        let merged = merge_function(&fresh, existing.get("ModuleWidget::Resize"), &mut diags);
        assert!(merged.preserved);
        assert_eq!(merged.text, CUSTOMIZED);
        assert_eq!(diags.of_kind(DiagnosticKind::SignatureChanged).count(), 0);
    }

    #[test]
    fn test_changed_signature_injects_warning_block() {
        let existing = parse_existing(CUSTOMIZED);
        let fresh = generated(
            "void MODULE_CALLBACK widget_resize(struct _module_widget_t* self, int width, int height) {",
        );

        let mut diags = Diagnostics::new();
        let merged = merge_function(&fresh, existing.get("ModuleWidget::Resize"), &mut diags);
        assert!(merged.preserved);
        assert!(merged.text.contains("  // WARNING - CHANGED ATTRIBUTES\n"));
        assert!(merged.text.contains("  // REMOVED: int size\n"));
        assert!(merged.text.contains("  // ADDED: int width\n"));
        assert!(merged.text.contains("  // ADDED: int height\n"));
        assert!(merged.text.contains("ModuleWidget::Resize prototype has changed"));
        assert!(merged.text.contains("  ModuleWidgetToAbi::Get(self)->Resize(size < 0 ? 0 : size);\n"));
        assert_eq!(diags.of_kind(DiagnosticKind::SignatureChanged).count(), 1);

        // A second run keeps the block once, without duplicating it.
        let reparsed = parse_existing(&merged.text);
        let mut diags = Diagnostics::new();
        let again = merge_function(&fresh, reparsed.get("ModuleWidget::Resize"), &mut diags);
        assert_eq!(again.text, merged.text);
        assert_eq!(diags.of_kind(DiagnosticKind::SignatureChanged).count(), 0);
    }

    #[test]
    fn test_return_type_change_is_reported() {
        let delta = SignatureDelta::between(
            "int ModuleWidgetFromAbi::GetSize() const {",
            "double ModuleWidgetFromAbi::GetSize() const {",
        );
        assert!(delta.return_changed);
        assert!(delta.removed.is_empty() && delta.added.is_empty());
    }

    #[test]
    fn test_template_parameters_are_not_split() {
        let delta = SignatureDelta::between(
            "void f(const std::map<ModuleString, ModuleString>& a) {",
            "void f(const std::map<ModuleString, ModuleString>& a, int b) {",
        );
        assert_eq!(delta.added, vec!["int b".to_string()]);
        assert!(delta.removed.is_empty());
    }

    #[test]
    fn test_dropped_customizations_are_reported() {
        let existing = parse_existing(CUSTOMIZED);
        let mut diags = Diagnostics::new();
        report_dropped(&existing, ["ModuleWidget::Other"], &mut diags);
        assert_eq!(diags.warning_count(), 1);
    }
}
