//! Marshaling rules: how each argument and return value crosses the boundary.
//!
//! Classification happens once per function. A category combination without
//! a rule is reported as [`BridgeError::UnsupportedCategoryCombination`] so the
//! caller can stub out that one function and keep going.

use flatbridge_ast::{
    ArgumentDecl, BridgeError, Category, Dialect, FunctionDecl, Result, TypeAnalysis,
};

/// Ownership flavor of a class handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Shared,
    Exclusive,
    Raw,
}

impl Handle {
    pub fn label(&self) -> &'static str {
        match self {
            Handle::Shared => "refptr",
            Handle::Exclusive => "ownptr",
            Handle::Raw => "rawptr",
        }
    }
}

/// Element type of a non-string sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// Primitive or enum, identical on both sides.
    Simple { object: String, abi: String },
    Bool,
    Struct { object: String, abi: String },
    Handle { kind: Handle, class: String },
}

impl Element {
    pub fn abi_type(&self, dialect: &Dialect) -> String {
        match self {
            Element::Simple { abi, .. } | Element::Struct { abi, .. } => abi.clone(),
            Element::Bool => "int".to_string(),
            Element::Handle { class, .. } => handle_abi_type(class, dialect),
        }
    }

    pub fn object_type(&self, dialect: &Dialect) -> String {
        match self {
            Element::Simple { object, .. } | Element::Struct { object, .. } => object.clone(),
            Element::Bool => "bool".to_string(),
            Element::Handle { kind, class } => handle_object_type(*kind, class, dialect),
        }
    }
}

/// How one argument is marshaled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgPlan {
    /// Primitive or enum by value.
    Simple { abi: String },
    /// Primitive or enum by reference or address.
    SimpleIndirect {
        abi: String,
        is_const: bool,
        by_addr: bool,
    },
    Bool,
    BoolIndirect { by_addr: bool },
    /// `const ModuleString&`.
    StringIn,
    /// `ModuleString&`, filled in place by the callee.
    StringOut,
    Handle { kind: Handle, class: String },
    StructValue { object: String, abi: String },
    StructIndirect {
        object: String,
        abi: String,
        is_const: bool,
        by_addr: bool,
    },
    SequenceIn(Element),
    SequenceOut {
        element: Element,
        /// Method reporting how many elements the callee will produce.
        count_func: Option<String>,
    },
    StringListIn,
    StringListOut,
    MapIn { multi: bool },
    MapOut { multi: bool },
}

impl ArgPlan {
    /// ABI parameter declarations for an argument named `name`.
    pub fn abi_params(&self, name: &str, dialect: &Dialect) -> Vec<String> {
        let constness = |is_const: bool| if is_const { "const " } else { "" };
        match self {
            ArgPlan::Simple { abi } | ArgPlan::StructValue { abi, .. } => vec![format!("{abi} {name}")],
            ArgPlan::SimpleIndirect { abi, is_const, .. }
            | ArgPlan::StructIndirect { abi, is_const, .. } => {
                vec![format!("{}{abi}* {name}", constness(*is_const))]
            }
            ArgPlan::Bool => vec![format!("int {name}")],
            ArgPlan::BoolIndirect { .. } => vec![format!("int* {name}")],
            ArgPlan::StringIn => vec![format!("const {}* {name}", dialect.abi_string())],
            ArgPlan::StringOut => vec![format!("{}* {name}", dialect.abi_string())],
            ArgPlan::Handle { class, .. } => vec![format!("{} {name}", handle_abi_type(class, dialect))],
            ArgPlan::SequenceIn(element) => vec![
                format!("size_t {name}Count"),
                format!("{} const* {name}", element.abi_type(dialect)),
            ],
            ArgPlan::SequenceOut { element, .. } => vec![
                format!("size_t* {name}Count"),
                format!("{}* {name}", element.abi_type(dialect)),
            ],
            ArgPlan::StringListIn | ArgPlan::StringListOut => {
                vec![format!("{} {name}", dialect.abi_string_list())]
            }
            ArgPlan::MapIn { multi } | ArgPlan::MapOut { multi } => {
                vec![format!("{} {name}", string_map_type(*multi, dialect))]
            }
        }
    }
}

/// How a return value is marshaled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnPlan {
    Void,
    Simple { abi: String },
    /// Primitive returned by address, e.g. `void*`.
    Pointer { abi: String },
    Enum { abi: String },
    Bool,
    /// Returned by value as a caller-owned `userfree` string.
    String,
    Handle { kind: Handle, class: String },
    Struct { object: String, abi: String },
}

impl ReturnPlan {
    pub fn abi_type(&self, dialect: &Dialect) -> String {
        match self {
            ReturnPlan::Void => "void".to_string(),
            ReturnPlan::Simple { abi }
            | ReturnPlan::Pointer { abi }
            | ReturnPlan::Enum { abi }
            | ReturnPlan::Struct { abi, .. } => abi.clone(),
            ReturnPlan::Bool => "int".to_string(),
            ReturnPlan::String => dialect.abi_string_userfree(),
            ReturnPlan::Handle { class, .. } => handle_abi_type(class, dialect),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ReturnPlan::Void)
    }

    /// Value an object-side method returns when the call cannot be made.
    pub fn object_default(&self, func: &FunctionDecl, dialect: &Dialect) -> Option<String> {
        let explicit = func.default_retval().map(str::to_string);
        match self {
            ReturnPlan::Void => None,
            ReturnPlan::Simple { .. } => Some(explicit.unwrap_or_else(|| "0".to_string())),
            ReturnPlan::Enum { abi } => {
                Some(explicit.unwrap_or_else(|| format!("static_cast<{abi}>(0)")))
            }
            ReturnPlan::Pointer { .. } | ReturnPlan::Handle { .. } => Some("nullptr".to_string()),
            ReturnPlan::Bool => Some(explicit.unwrap_or_else(|| "false".to_string())),
            ReturnPlan::String => Some(format!("{}()", dialect.string_type())),
            ReturnPlan::Struct { object, .. } => Some(format!("{object}()")),
        }
    }

    /// Value a C callback returns when verification fails.
    pub fn abi_default(&self, func: &FunctionDecl, dialect: &Dialect) -> Option<String> {
        match self {
            ReturnPlan::Bool => Some(match func.default_retval() {
                Some("true") => "1".to_string(),
                _ => "0".to_string(),
            }),
            ReturnPlan::String => Some("nullptr".to_string()),
            other => other.object_default(func, dialect),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReturnPlan::Void => "void",
            ReturnPlan::Simple { .. } | ReturnPlan::Pointer { .. } => "simple",
            ReturnPlan::Enum { .. } => "enum",
            ReturnPlan::Bool => "bool",
            ReturnPlan::String => "string",
            ReturnPlan::Handle { kind, .. } => kind.label(),
            ReturnPlan::Struct { .. } => "struct",
        }
    }
}

/// One classified argument.
#[derive(Debug, Clone)]
pub struct MarshalArg<'a> {
    pub decl: &'a ArgumentDecl,
    pub plan: ArgPlan,
    /// Exempt from null/empty verification (`optional_param=`).
    pub optional: bool,
}

impl MarshalArg<'_> {
    pub fn name(&self) -> &str {
        &self.decl.name
    }
}

/// A fully classified function.
#[derive(Debug, Clone)]
pub struct FunctionPlan<'a> {
    pub func: &'a FunctionDecl,
    pub ret: ReturnPlan,
    pub args: Vec<MarshalArg<'a>>,
}

impl<'a> FunctionPlan<'a> {
    pub fn abi_params(&self, dialect: &Dialect) -> Vec<String> {
        self.args
            .iter()
            .flat_map(|a| a.plan.abi_params(a.name(), dialect))
            .collect()
    }
}

/// Classify every argument and the return value of `func`.
pub fn plan_function<'a>(func: &'a FunctionDecl, dialect: &Dialect) -> Result<FunctionPlan<'a>> {
    let ret = classify_return(&func.return_type, dialect)?;
    let args = func
        .args
        .iter()
        .map(|arg| {
            Ok(MarshalArg {
                decl: arg,
                plan: classify_arg(func, arg, dialect)?,
                optional: func.is_optional(&arg.name),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FunctionPlan { func, ret, args })
}

pub fn classify_arg(func: &FunctionDecl, arg: &ArgumentDecl, dialect: &Dialect) -> Result<ArgPlan> {
    let ty = &arg.ty;
    let unsupported = |what: &str| -> Result<ArgPlan> {
        Err(BridgeError::unsupported(
            format!("{what} for parameter `{}`", arg.name),
            ty.raw.clone(),
        ))
    };

    match &ty.category {
        Category::Void => unsupported("void"),
        Category::Primitive { abi, .. } | Category::Enum { abi } => {
            if ty.is_indirect() {
                Ok(ArgPlan::SimpleIndirect {
                    abi: abi.clone(),
                    is_const: ty.is_const,
                    by_addr: ty.by_addr,
                })
            } else {
                Ok(ArgPlan::Simple { abi: abi.clone() })
            }
        }
        Category::Bool => {
            if ty.by_addr || (ty.by_ref && !ty.is_const) {
                Ok(ArgPlan::BoolIndirect { by_addr: ty.by_addr })
            } else {
                Ok(ArgPlan::Bool)
            }
        }
        Category::String => match (ty.by_ref, ty.is_const) {
            (true, true) => Ok(ArgPlan::StringIn),
            (true, false) => Ok(ArgPlan::StringOut),
            (false, _) => unsupported("string passed by value or address"),
        },
        Category::SharedRef { class } | Category::ExclusiveOwn { class } | Category::RawRef { class } => {
            if dialect.is_root(class) {
                return unsupported("root class handle");
            }
            if ty.by_addr || (ty.by_ref && !ty.is_const) {
                return unsupported("handle passed by mutable reference or address");
            }
            Ok(ArgPlan::Handle {
                kind: handle_kind(&ty.category),
                class: class.clone(),
            })
        }
        Category::Struct { name, abi } => {
            if ty.is_indirect() {
                Ok(ArgPlan::StructIndirect {
                    object: name.clone(),
                    abi: abi.clone(),
                    is_const: ty.is_const,
                    by_addr: ty.by_addr,
                })
            } else {
                Ok(ArgPlan::StructValue {
                    object: name.clone(),
                    abi: abi.clone(),
                })
            }
        }
        Category::Sequence(elem) => {
            if !ty.by_ref {
                return unsupported("sequence passed by value or address");
            }
            match (is_plain_string(elem), ty.is_const) {
                (true, true) => Ok(ArgPlan::StringListIn),
                (true, false) => Ok(ArgPlan::StringListOut),
                (false, true) => Ok(ArgPlan::SequenceIn(element(elem, dialect)?)),
                (false, false) => Ok(ArgPlan::SequenceOut {
                    element: element(elem, dialect)?,
                    count_func: func.count_func(&arg.name).map(str::to_string),
                }),
            }
        }
        Category::Map { key, value } | Category::MultiMap { key, value } => {
            if !ty.by_ref {
                return unsupported("map passed by value or address");
            }
            if !is_plain_string(key) || !is_plain_string(value) {
                return unsupported("map with non-string elements");
            }
            let multi = matches!(ty.category, Category::MultiMap { .. });
            if ty.is_const {
                Ok(ArgPlan::MapIn { multi })
            } else {
                Ok(ArgPlan::MapOut { multi })
            }
        }
    }
}

pub fn classify_return(ty: &TypeAnalysis, dialect: &Dialect) -> Result<ReturnPlan> {
    let unsupported = |what: &str| -> Result<ReturnPlan> {
        Err(BridgeError::unsupported(what.to_string(), ty.raw.clone()))
    };
    if ty.by_ref {
        return unsupported("return by reference");
    }

    match &ty.category {
        Category::Void => Ok(ReturnPlan::Void),
        Category::Primitive { abi, .. } if ty.by_addr => Ok(ReturnPlan::Pointer {
            abi: format!("{}{abi}*", if ty.is_const { "const " } else { "" }),
        }),
        Category::Primitive { abi, .. } => Ok(ReturnPlan::Simple { abi: abi.clone() }),
        _ if ty.by_addr => unsupported("return by address"),
        Category::Enum { abi } => Ok(ReturnPlan::Enum { abi: abi.clone() }),
        Category::Bool => Ok(ReturnPlan::Bool),
        Category::String => Ok(ReturnPlan::String),
        Category::SharedRef { class } | Category::ExclusiveOwn { class } | Category::RawRef { class } => {
            if dialect.is_root(class) {
                return unsupported("root class handle return");
            }
            Ok(ReturnPlan::Handle {
                kind: handle_kind(&ty.category),
                class: class.clone(),
            })
        }
        Category::Struct { name, abi } => Ok(ReturnPlan::Struct {
            object: name.clone(),
            abi: abi.clone(),
        }),
        Category::Sequence(_) => unsupported("sequence return"),
        Category::Map { .. } | Category::MultiMap { .. } => unsupported("map return"),
    }
}

fn element(elem: &TypeAnalysis, dialect: &Dialect) -> Result<Element> {
    let unsupported = |what: &str| -> Result<Element> {
        Err(BridgeError::unsupported(what.to_string(), elem.raw.clone()))
    };
    if elem.is_indirect() {
        return unsupported("sequence of references or pointers");
    }
    match &elem.category {
        Category::Primitive { abi, .. } | Category::Enum { abi } => Ok(Element::Simple {
            object: elem.raw.clone(),
            abi: abi.clone(),
        }),
        Category::Bool => Ok(Element::Bool),
        Category::Struct { name, abi } => Ok(Element::Struct {
            object: name.clone(),
            abi: abi.clone(),
        }),
        Category::SharedRef { class } | Category::RawRef { class } => {
            if dialect.is_root(class) {
                return unsupported("sequence of root class handles");
            }
            Ok(Element::Handle {
                kind: handle_kind(&elem.category),
                class: class.clone(),
            })
        }
        Category::ExclusiveOwn { .. } => unsupported("sequence of exclusively owned handles"),
        Category::Void
        | Category::String
        | Category::Sequence(_)
        | Category::Map { .. }
        | Category::MultiMap { .. } => unsupported("unsupported sequence element"),
    }
}

fn is_plain_string(ty: &TypeAnalysis) -> bool {
    ty.category == Category::String && !ty.is_indirect()
}

fn handle_kind(category: &Category) -> Handle {
    match category {
        Category::ExclusiveOwn { .. } => Handle::Exclusive,
        Category::RawRef { .. } => Handle::Raw,
        _ => Handle::Shared,
    }
}

/// `struct _module_frame_t*`.
pub fn handle_abi_type(class: &str, dialect: &Dialect) -> String {
    format!("struct _{}*", dialect.class_abi_name(class))
}

/// `ModuleRefPtr<ModuleFrame>` and friends.
pub fn handle_object_type(kind: Handle, class: &str, dialect: &Dialect) -> String {
    let pointer = match kind {
        Handle::Shared => dialect.ref_ptr(),
        Handle::Exclusive => dialect.own_ptr(),
        Handle::Raw => dialect.raw_ptr(),
    };
    format!("{pointer}<{class}>")
}

pub fn string_map_type(multi: bool, dialect: &Dialect) -> String {
    if multi {
        dialect.abi_string_multimap()
    } else {
        dialect.abi_string_map()
    }
}
