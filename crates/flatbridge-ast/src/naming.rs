//! Identifier transliteration from the object dialect (PascalCase) to the
//! ABI dialect (snake_case).

/// Suffix appended to every transliterated class name.
pub const DEFAULT_TYPE_SUFFIX: &str = "_t";

/// Converts object-dialect identifiers into ABI-dialect identifiers.
///
/// The module token is the lowercase project prefix that every class carries
/// (`module` for `ModuleWidget`). It is what gets elided, together with the
/// class part of a prefix, when a function name repeats its owner's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transliterator {
    module_token: String,
    type_suffix: String,
}

impl Transliterator {
    pub fn new(module_token: impl Into<String>) -> Self {
        Self {
            module_token: module_token.into().to_lowercase(),
            type_suffix: DEFAULT_TYPE_SUFFIX.to_string(),
        }
    }

    pub fn module_token(&self) -> &str {
        &self.module_token
    }

    pub fn type_suffix(&self) -> &str {
        &self.type_suffix
    }

    /// Transliterate `name` into its ABI spelling.
    ///
    /// - `is_class` appends the type suffix (`ModuleWidget` -> `module_widget_t`).
    /// - `prefix` is prepended as `prefix_`. If the prefix (without the module
    ///   token) already occurs inside the computed name, that occurrence is
    ///   removed once first, so `GetModuleWidgetSize` with prefix `widget`
    ///   becomes `widget_get_size`.
    pub fn to_abi_name(&self, name: &str, is_class: bool, prefix: Option<&str>) -> String {
        let mut result = snake_case(name);
        if is_class {
            result.push_str(&self.type_suffix);
        }

        let Some(prefix) = prefix else {
            return result;
        };

        let rest = prefix
            .strip_prefix(self.module_token.as_str())
            .unwrap_or(prefix)
            .trim_start_matches('_');
        if !rest.is_empty() {
            let candidates = [
                format!("_{}_{}", self.module_token, rest),
                format!("_{rest}"),
            ];
            for candidate in &candidates {
                if let Some(pos) = find_word(&result, candidate) {
                    result.replace_range(pos..pos + candidate.len(), "");
                    break;
                }
            }
        }

        format!("{prefix}_{result}")
    }

    /// The function prefix used for a class's exported globals
    /// (`ModuleWidget` -> `module_widget`).
    pub fn class_prefix(&self, class_name: &str) -> String {
        snake_case(class_name)
    }

    /// The class prefix without the module token
    /// (`ModuleWidget` -> `widget`), used for adapter-local callbacks.
    pub fn short_prefix(&self, class_name: &str) -> String {
        let full = snake_case(class_name);
        let module = format!("{}_", self.module_token);
        match full.strip_prefix(module.as_str()) {
            Some(rest) if !rest.is_empty() => rest.to_string(),
            _ => full,
        }
    }
}

/// Lowercase `name`, inserting `_` before an uppercase letter that follows a
/// lowercase one. Runs of uppercase letters stay together.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for ch in name.chars() {
        if ch.is_uppercase() && prev.is_some_and(|p| p.is_lowercase()) {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
        prev = Some(ch);
    }
    out
}

/// Find `needle` in `haystack` where it ends on a word boundary.
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(found) = haystack[from..].find(needle) {
        let start = from + found;
        let end = start + needle.len();
        if end == haystack.len() || haystack[end..].starts_with('_') {
            return Some(start);
        }
        from = start + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case_keeps_uppercase_runs() {
        assert_eq!(snake_case("GetSize"), "get_size");
        assert_eq!(snake_case("GetURLValue"), "get_urlvalue");
        assert_eq!(snake_case("ID"), "id");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_class_names_get_type_suffix() {
        let names = Transliterator::new("module");
        assert_eq!(names.to_abi_name("ModuleWidget", true, None), "module_widget_t");
    }

    #[test]
    fn test_prefix_elides_module_and_class_once() {
        let names = Transliterator::new("module");
        assert_eq!(
            names.to_abi_name("GetModuleWidgetSize", false, Some("widget")),
            "widget_get_size"
        );
        assert_eq!(
            names.to_abi_name("GetOtherThing", false, Some("widget")),
            "widget_get_other_thing"
        );
    }

    #[test]
    fn test_full_class_prefix_elides_class_part() {
        let names = Transliterator::new("module");
        assert_eq!(
            names.to_abi_name("GetWidgetSize", false, Some("module_widget")),
            "module_widget_get_size"
        );
    }

    #[test]
    fn test_elision_respects_word_boundary() {
        let names = Transliterator::new("module");
        assert_eq!(
            names.to_abi_name("GetWidgetsCount", false, Some("widget")),
            "widget_get_widgets_count"
        );
    }

    #[test]
    fn test_short_prefix() {
        let names = Transliterator::new("module");
        assert_eq!(names.short_prefix("ModuleWidget"), "widget");
        assert_eq!(names.short_prefix("Widget"), "widget");
        assert_eq!(names.class_prefix("ModuleWidget"), "module_widget");
    }
}
