//! Recursive-descent parser for annotated declaration files.
//!
//! Only constructs that sit directly below a `/*--abi(...)--*/` marker become
//! part of the model. Everything else is skipped with brace balancing, so a
//! declaration file can hold arbitrary unannotated code around the parts the
//! generators care about.

use std::collections::BTreeMap;

use flatbridge_ast::{
    ArgumentDecl, Attributes, BridgeError, ClassAttributes, ClassDecl, DiagnosticKind,
    Diagnostics, Dialect, FunctionDecl, FunctionKind, ModelFragment, Ownership, Result, Scope,
    Span, TypeAnalysis, Typedef, VersionRange,
};

use crate::canonical::canonicalize;
use crate::lexer::{CommentLine, Lexer, Token, TokenKind};
use crate::resolver::{resolve, split_name};

/// Parse one declaration file into a model fragment.
///
/// `scopes` are the typedef scopes already known from earlier files,
/// innermost first. Typedefs declared in this file are visible to everything
/// after them in the same file and are returned in the fragment.
pub fn parse(
    src: &str,
    scopes: &[&Scope],
    dialect: &Dialect,
    diags: &mut Diagnostics,
) -> Result<ModelFragment> {
    let parser = Parser::new(src, scopes, dialect, diags);
    parser.parse_file()
}

struct Parser<'a, 's> {
    src: &'a str,
    tokens: Vec<Token>,
    comments: BTreeMap<usize, CommentLine>,
    pos: usize,
    outer: &'a [&'s Scope],
    dialect: &'a Dialect,
    diags: &'a mut Diagnostics,
    file_scope: Scope,
    fragment: ModelFragment,
}

impl<'a, 's> Parser<'a, 's> {
    fn new(
        src: &'a str,
        outer: &'a [&'s Scope],
        dialect: &'a Dialect,
        diags: &'a mut Diagnostics,
    ) -> Self {
        let lexed = Lexer::new(src).tokenize();
        Self {
            src,
            tokens: lexed.tokens,
            comments: lexed.comments,
            pos: 0,
            outer,
            dialect,
            diags,
            file_scope: Scope::new("<file>"),
            fragment: ModelFragment::default(),
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "expected `{}`, found `{}`",
                kind.text(),
                self.peek().text()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!("expected identifier, found `{}`", other.text()))),
        }
    }

    /// Malformed-declaration error pointing at the current token.
    fn error_here(&self, detail: String) -> BridgeError {
        let token = self.current();
        BridgeError::malformed(detail, self.line_text(token)).with_span(token.start..token.end)
    }

    fn line_text(&self, token: &Token) -> String {
        let start = self.src[..token.start].rfind('\n').map_or(0, |i| i + 1);
        let end = self.src[token.start..]
            .find('\n')
            .map_or(self.src.len(), |i| token.start + i);
        self.src[start..end].trim().to_string()
    }

    fn parse_file(mut self) -> Result<ModelFragment> {
        while !self.check(&TokenKind::Eof) {
            match self.peek() {
                TokenKind::Marker(_) => self.parse_annotated_item()?,
                TokenKind::Class | TokenKind::Struct => self.skip_declaration(),
                _ => {
                    self.advance();
                }
            }
        }

        tracing::debug!(
            classes = self.fragment.classes.len(),
            functions = self.fragment.functions.len(),
            typedefs = self.file_scope.typedefs.len(),
            "parsed declaration file"
        );

        let mut fragment = self.fragment;
        fragment.typedefs = self.file_scope.typedefs;
        Ok(fragment)
    }

    fn parse_annotated_item(&mut self) -> Result<()> {
        let marker = self.advance();
        let attrs = marker_attributes(&marker)?;
        let doc = self.doc_for(marker.line);

        match self.peek() {
            TokenKind::Class | TokenKind::Struct => {
                let class = self.parse_class(&marker, attrs, doc)?;
                self.fragment.classes.push(class);
            }
            TokenKind::Typedef => {
                let typedef = self.parse_typedef(&marker, None)?;
                self.file_scope.typedefs.push(typedef);
            }
            _ => {
                let func = self.parse_function(&marker, attrs, doc, None)?;
                if func.kind != FunctionKind::Global {
                    return Err(BridgeError::malformed(
                        format!("`{}` is static or virtual outside a class", func.name),
                        func.canonical,
                    )
                    .with_span(func.span));
                }
                self.fragment.functions.push(func);
            }
        }
        Ok(())
    }

    /// The contiguous `//` lines ending on the line directly above a marker.
    fn doc_for(&self, marker_line: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut line = marker_line;
        while line > 1 {
            line -= 1;
            let Some(comment) = self.comments.get(&line) else {
                break;
            };
            let text = comment.text.trim_start_matches('/');
            let text = text.strip_prefix(' ').unwrap_or(text);
            lines.push(text.trim_end().to_string());
        }
        lines.reverse();

        while lines.first().is_some_and(|l| l.is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }

    fn parse_class(&mut self, marker: &Token, attrs: Attributes, doc: Vec<String>) -> Result<ClassDecl> {
        self.advance(); // class / struct
        let name = self.expect_ident()?;

        if self.check(&TokenKind::Semicolon) {
            return Err(BridgeError::malformed(
                format!("annotated class `{name}` has no body"),
                self.line_text(marker),
            )
            .with_span(marker.start..self.current().end));
        }
        if !self.matches(&TokenKind::Colon) {
            return Err(self.error_here(format!(
                "class `{name}` must derive from {} or {}",
                self.dialect.shared_root(),
                self.dialect.scoped_root()
            )));
        }
        while matches!(
            self.peek(),
            TokenKind::Public | TokenKind::Protected | TokenKind::Private | TokenKind::Virtual
        ) {
            self.advance();
        }
        let parent = self.parse_qualified_name()?;
        if self.check(&TokenKind::Comma) {
            return Err(self.error_here(format!("class `{name}` has more than one parent")));
        }
        self.expect(&TokenKind::LBrace)?;

        let mut scope = Scope::new(name.clone());
        let mut statics = Vec::new();
        let mut virtuals = Vec::new();

        loop {
            match self.peek() {
                TokenKind::RBrace => break,
                TokenKind::Eof => {
                    return Err(self.error_here(format!("unterminated body of class `{name}`")));
                }
                TokenKind::Public | TokenKind::Protected | TokenKind::Private => {
                    self.advance();
                    self.matches(&TokenKind::Colon);
                }
                TokenKind::Marker(_) => {
                    let member_marker = self.advance();
                    let member_attrs = marker_attributes(&member_marker)?;
                    let member_doc = self.doc_for(member_marker.line);
                    match self.peek() {
                        TokenKind::Typedef => {
                            let typedef = self.parse_typedef(&member_marker, Some(&scope))?;
                            scope.typedefs.push(typedef);
                        }
                        TokenKind::Class | TokenKind::Struct => {
                            return Err(self.error_here(format!(
                                "nested annotated class inside `{name}`"
                            )));
                        }
                        _ => {
                            let func =
                                self.parse_function(&member_marker, member_attrs, member_doc, Some(&scope))?;
                            match func.kind {
                                FunctionKind::Static => statics.push(func),
                                FunctionKind::Virtual => virtuals.push(func),
                                FunctionKind::Global => {
                                    return Err(BridgeError::malformed(
                                        format!("member `{name}::{}` must be static or virtual", func.name),
                                        func.canonical,
                                    )
                                    .with_span(func.span));
                                }
                            }
                        }
                    }
                }
                _ => self.skip_member(&name),
            }
        }

        self.expect(&TokenKind::RBrace)?;
        let semi = self.expect(&TokenKind::Semicolon)?;
        let span = marker.start..semi.end;
        let marker_span = marker.start..marker.end;

        let attributes =
            ClassAttributes::from_attributes(attrs).map_err(|e| e.with_span(marker_span.clone()))?;
        let versions =
            VersionRange::from_attributes(&attributes.raw).map_err(|e| e.with_span(marker_span))?;

        Ok(ClassDecl {
            name,
            ownership: attributes.ownership.unwrap_or(Ownership::Shared),
            attributes,
            doc,
            parent,
            scope,
            statics,
            virtuals,
            versions,
            canonical: canonicalize(&self.src[span.clone()]),
            span,
        })
    }

    fn parse_qualified_name(&mut self) -> Result<String> {
        let mut name = self.expect_ident()?;
        while self.matches(&TokenKind::ColonColon) {
            name.push_str("::");
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    fn parse_function(
        &mut self,
        marker: &Token,
        attributes: Attributes,
        doc: Vec<String>,
        scope: Option<&Scope>,
    ) -> Result<FunctionDecl> {
        let kind = if self.matches(&TokenKind::Static) {
            FunctionKind::Static
        } else if self.matches(&TokenKind::Virtual) {
            FunctionKind::Virtual
        } else {
            FunctionKind::Global
        };

        let head_start = self.pos;
        let mut angle = 0usize;
        loop {
            match self.peek() {
                TokenKind::LAngle => angle += 1,
                TokenKind::RAngle => angle = angle.saturating_sub(1),
                TokenKind::LParen if angle == 0 => break,
                TokenKind::Semicolon
                | TokenKind::LBrace
                | TokenKind::RBrace
                | TokenKind::Marker(_)
                | TokenKind::Eof => {
                    return Err(self.error_here("expected a function declaration".to_string()));
                }
                _ => {}
            }
            self.advance();
        }

        let head = &self.tokens[head_start..self.pos];
        let (name, ret) = match head.split_last() {
            Some((
                Token {
                    kind: TokenKind::Ident(name),
                    ..
                },
                ret,
            )) if !ret.is_empty() => (name.clone(), ret),
            _ => return Err(self.error_here("expected a return type and function name".to_string())),
        };
        let ret_span = tokens_span(ret);
        let ret_text = render(ret);
        let return_type = self
            .resolve_in(&ret_text, false, scope)
            .map_err(|e| e.with_span(ret_span))?;

        self.expect(&TokenKind::LParen)?;
        let args = self.parse_args(scope)?;

        let is_const = self.matches(&TokenKind::Const);
        if self.matches(&TokenKind::Eq) {
            self.expect(&TokenKind::Number(String::new()))?;
        }
        if self.check(&TokenKind::LBrace) {
            return Err(self.error_here(format!("annotated function `{name}` must not have a body")));
        }
        let semi = self.expect(&TokenKind::Semicolon)?;

        let span = marker.start..semi.end;
        let versions = VersionRange::from_attributes(&attributes)
            .map_err(|e| e.with_span(marker.start..marker.end))?;

        Ok(FunctionDecl {
            kind,
            name,
            attributes,
            return_type,
            args,
            doc,
            is_const,
            versions,
            canonical: canonicalize(&self.src[span.clone()]),
            span,
        })
    }

    fn parse_args(&mut self, scope: Option<&Scope>) -> Result<Vec<ArgumentDecl>> {
        let mut args = Vec::new();
        if self.matches(&TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            let arg_start = self.pos;
            let mut default_at = None;
            let mut angle = 0usize;
            let mut parens = 0usize;
            loop {
                match self.peek() {
                    TokenKind::LAngle => angle += 1,
                    TokenKind::RAngle => angle = angle.saturating_sub(1),
                    TokenKind::LParen => parens += 1,
                    TokenKind::RParen if parens > 0 => parens -= 1,
                    TokenKind::Comma | TokenKind::RParen if angle == 0 && parens == 0 => break,
                    TokenKind::Eq if angle == 0 && default_at.is_none() => default_at = Some(self.pos),
                    TokenKind::Semicolon | TokenKind::LBrace | TokenKind::Eof => {
                        return Err(self.error_here("unterminated parameter list".to_string()));
                    }
                    _ => {}
                }
                self.advance();
            }

            let tokens = &self.tokens[arg_start..default_at.unwrap_or(self.pos)];
            let text = render(tokens);
            let is_void_list = args.is_empty() && text == "void" && self.check(&TokenKind::RParen);
            if !is_void_list {
                let span = tokens_span(tokens);
                let Some((_, name)) = split_name(&text) else {
                    return Err(BridgeError::malformed(
                        format!("parameter `{text}` has no name"),
                        text.clone(),
                    )
                    .with_span(span));
                };
                let name = name.to_string();
                let ty = self
                    .resolve_in(&text, true, scope)
                    .map_err(|e| e.with_span(span))?;
                args.push(ArgumentDecl { ty, name });
            }

            if self.matches(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::RParen)?;
            break;
        }
        Ok(args)
    }

    fn parse_typedef(&mut self, marker: &Token, scope: Option<&Scope>) -> Result<Typedef> {
        self.expect(&TokenKind::Typedef)?;
        let start = self.pos;
        while !matches!(self.peek(), TokenKind::Semicolon | TokenKind::Eof) {
            self.advance();
        }
        let (alias, ty_tokens) = match self.tokens[start..self.pos].split_last() {
            Some((
                Token {
                    kind: TokenKind::Ident(alias),
                    ..
                },
                rest,
            )) if !rest.is_empty() => (alias.clone(), rest),
            _ => return Err(self.error_here("expected `typedef <type> <alias>;`".to_string())),
        };
        let ty_span = tokens_span(ty_tokens);
        let ty = self
            .resolve_in(&render(ty_tokens), false, scope)
            .map_err(|e| e.with_span(ty_span))?;
        let semi = self.expect(&TokenKind::Semicolon)?;
        Ok(Typedef {
            alias,
            ty,
            span: marker.start..semi.end,
        })
    }

    /// Resolve against the class scope, this file's typedefs, then the
    /// caller's scopes.
    fn resolve_in(&self, raw: &str, named: bool, scope: Option<&Scope>) -> Result<TypeAnalysis> {
        let mut chain: Vec<&Scope> = Vec::with_capacity(self.outer.len() + 2);
        chain.extend(scope);
        chain.push(&self.file_scope);
        chain.extend(self.outer.iter().copied());
        resolve(raw, named, &chain, self.dialect)
    }

    /// Skip an unannotated class member.
    fn skip_member(&mut self, class: &str) {
        let start = self.pos;
        loop {
            match self.peek() {
                TokenKind::Semicolon => {
                    self.advance();
                    break;
                }
                TokenKind::LBrace => {
                    self.skip_balanced();
                    self.matches(&TokenKind::Semicolon);
                    break;
                }
                TokenKind::RBrace | TokenKind::Marker(_) | TokenKind::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }
        let skipped = &self.tokens[start..self.pos];
        if let Some(first) = skipped.iter().find(|t| t.kind == TokenKind::Virtual) {
            let text = self.line_text(first);
            self.diags.info(
                DiagnosticKind::Declaration,
                class,
                format!("skipped unannotated member `{text}`"),
            );
        }
    }

    /// Skip an unannotated class, struct or forward declaration.
    fn skip_declaration(&mut self) {
        loop {
            match self.peek() {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::LBrace => {
                    self.skip_balanced();
                    self.matches(&TokenKind::Semicolon);
                    return;
                }
                TokenKind::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn skip_balanced(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.advance().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {}
            }
        }
    }
}

fn marker_attributes(marker: &Token) -> Result<Attributes> {
    let text = match &marker.kind {
        TokenKind::Marker(text) => text.as_str(),
        _ => "",
    };
    Attributes::parse(text).map_err(|e| e.with_span(marker.start..marker.end))
}

fn tokens_span(tokens: &[Token]) -> Span {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => first.start..last.end,
        _ => 0..0,
    }
}

/// Rebuild type text from tokens: words are space separated, punctuation is
/// tight except for a space after `,` and before a name following `&`/`*`.
fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&TokenKind> = None;
    for token in tokens {
        if let Some(prev) = prev {
            let spaced = (prev.is_word() && token.kind.is_word())
                || *prev == TokenKind::Comma
                || (matches!(prev, TokenKind::Amp | TokenKind::Star) && token.kind.is_word());
            if spaced {
                out.push(' ');
            }
        }
        out.push_str(&token.kind.text());
        prev = Some(&token.kind);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatbridge_ast::Category;

    const WIDGET: &str = r#"
#ifndef MODULE_WIDGET_H_
#define MODULE_WIDGET_H_

#include "include/module_base.h"

class ModuleFrame;

///
// A widget that can be sized and named.
///
/*--abi(source=library)--*/
class ModuleWidget : public ModuleBaseRefCounted {
 public:
  /*--abi()--*/
  typedef std::vector<ModuleString> NameList;

  ///
  // Create a new widget.
  ///
  /*--abi(optional_param=name)--*/
  static ModuleRefPtr<ModuleWidget> Create(const ModuleString& name);

  // Returns the size.
  /*--abi()--*/
  virtual int GetSize() const = 0;

  /*--abi(added=2)--*/
  virtual void GetNames(NameList& names) = 0;

  virtual void NotExported() = 0;

 private:
  int helper_ = 0;
  void Inline() { if (helper_) { helper_ = 1; } }
};

/*--abi()--*/
bool module_widget_enabled(int flags, void* user_data);

#endif
"#;

    fn parse_default(src: &str) -> Result<ModelFragment> {
        let mut diags = Diagnostics::new();
        parse(src, &[], &Dialect::default(), &mut diags)
    }

    #[test]
    fn test_parse_class_with_members() {
        let mut diags = Diagnostics::new();
        let fragment = parse(WIDGET, &[], &Dialect::default(), &mut diags).unwrap();

        assert_eq!(fragment.classes.len(), 1);
        let class = &fragment.classes[0];
        assert_eq!(class.name, "ModuleWidget");
        assert_eq!(class.parent, "ModuleBaseRefCounted");
        assert_eq!(class.doc, vec!["A widget that can be sized and named."]);
        assert_eq!(class.scope.typedefs.len(), 1);

        assert_eq!(class.statics.len(), 1);
        let create = &class.statics[0];
        assert_eq!(create.name, "Create");
        assert_eq!(create.doc, vec!["Create a new widget."]);
        assert!(create.is_optional("name"));
        assert_eq!(create.args[0].ty.category, Category::String);

        let names: Vec<_> = class.virtuals.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["GetSize", "GetNames"]);
        assert!(class.virtuals[0].is_const);
        assert_eq!(class.virtuals[0].doc, vec!["Returns the size."]);
        assert_eq!(class.virtuals[1].versions.added, Some(2));

        let names_arg = &class.virtuals[1].args[0];
        assert!(names_arg.ty.by_ref);
        assert!(matches!(names_arg.ty.category, Category::Sequence(_)));

        assert_eq!(diags.of_kind(DiagnosticKind::Declaration).count(), 1);
    }

    #[test]
    fn test_parse_global_function() {
        let fragment = parse_default(WIDGET).unwrap();
        assert_eq!(fragment.functions.len(), 1);
        let func = &fragment.functions[0];
        assert_eq!(func.kind, FunctionKind::Global);
        assert_eq!(func.return_type.category, Category::Bool);
        assert_eq!(func.arg_names().collect::<Vec<_>>(), vec!["flags", "user_data"]);
        assert_eq!(func.canonical, "/*--abi()--*/ bool module_widget_enabled(int flags, void* user_data);");
    }

    #[test]
    fn test_file_typedefs_are_returned_and_visible() {
        let src = r#"
/*--abi()--*/
typedef ModuleString UrlString;

/*--abi()--*/
void module_open(const UrlString& url);
"#;
        let fragment = parse_default(src).unwrap();
        assert_eq!(fragment.typedefs.len(), 1);
        assert_eq!(fragment.functions[0].args[0].ty.category, Category::String);
    }

    #[test]
    fn test_outer_scopes_are_consulted() {
        let dialect = Dialect::default();
        let mut root = Scope::new("<root>");
        root.typedefs.push(Typedef {
            alias: "UrlString".to_string(),
            ty: resolve("ModuleString", false, &[], &dialect).unwrap(),
            span: 0..0,
        });
        let mut diags = Diagnostics::new();
        let fragment = parse(
            "/*--abi()--*/\nvoid module_open(const UrlString& url);",
            &[&root],
            &dialect,
            &mut diags,
        )
        .unwrap();
        assert_eq!(fragment.functions[0].args[0].ty.category, Category::String);
    }

    #[test]
    fn test_unknown_type_carries_span() {
        let src = "/*--abi()--*/\nvoid module_run(Mystery value);";
        let err = parse_default(src).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownType { .. }));
        let span = err.span().cloned().unwrap();
        assert_eq!(&src[span], "Mystery value");
    }

    #[test]
    fn test_class_without_parent_is_malformed() {
        let err = parse_default("/*--abi()--*/\nclass ModuleLonely {\n};").unwrap_err();
        assert!(err.to_string().contains("must derive from"));
    }

    #[test]
    fn test_annotated_member_must_be_static_or_virtual() {
        let src = r#"
/*--abi()--*/
class ModuleThing : public ModuleBaseRefCounted {
  /*--abi()--*/
  int Plain();
};
"#;
        let err = parse_default(src).unwrap_err();
        assert!(err.to_string().contains("must be static or virtual"));
    }

    #[test]
    fn test_bad_attributes_are_malformed() {
        let err = parse_default("/*--abi(added=soon)--*/\nvoid module_x();").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedDeclaration { .. }));
    }

    #[test]
    fn test_void_parameter_list_and_defaults() {
        let src = "/*--abi()--*/\nint module_count(void);\n/*--abi()--*/\nvoid module_set(int value = 3, bool flag = false);";
        let fragment = parse_default(src).unwrap();
        assert!(fragment.functions[0].args.is_empty());
        assert_eq!(fragment.functions[1].arg_names().collect::<Vec<_>>(), vec!["value", "flag"]);
    }
}
