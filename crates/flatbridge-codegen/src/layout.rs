//! Versioned struct layouts.
//!
//! A class's ABI struct embeds its parent's struct by value, followed by one
//! function pointer per virtual function in declaration order. Functions that
//! are not yet added at a version are left out; functions that were removed
//! keep their slot as a pointer-width placeholder, so later members never
//! move.

use std::collections::BTreeSet;

use flatbridge_ast::{BridgeError, ClassDecl, DeclarationModel, Dialect, Result};

/// Width of a function pointer and of a placeholder slot.
pub const POINTER_WIDTH: usize = 8;

/// Lowest ABI version a class without `added=` exists in.
pub const FIRST_VERSION: u32 = 1;

/// Slot counts of the two root structs: a `size` field plus the ownership
/// callbacks (add_ref, release, has_one_ref, has_at_least_one_ref for shared;
/// del for scoped).
const SHARED_ROOT_SLOTS: usize = 5;
const SCOPED_ROOT_SLOTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// The parent struct, embedded by value as `base`.
    Base { abi: String },
    /// A live virtual function.
    Function { name: String, member: String },
    /// A removed virtual function: `uintptr_t unused_<member>`.
    Placeholder { name: String, member: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub slot: Slot,
    pub offset: usize,
    pub size: usize,
}

impl Member {
    /// Field name in the generated struct.
    pub fn field(&self) -> String {
        match &self.slot {
            Slot::Base { .. } => "base".to_string(),
            Slot::Function { member, .. } => member.clone(),
            Slot::Placeholder { member, .. } => format!("unused_{member}"),
        }
    }
}

/// The struct layout of one class at one ABI version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub version: u32,
    pub members: Vec<Member>,
}

impl StructLayout {
    pub fn size(&self) -> usize {
        self.members.last().map_or(0, |m| m.offset + m.size)
    }

    /// Same members at the same offsets, regardless of version.
    pub fn same_shape(&self, other: &StructLayout) -> bool {
        self.members == other.members
    }

    /// The member for a virtual function, live or retired.
    pub fn member_for(&self, function: &str) -> Option<&Member> {
        self.members.iter().find(|m| match &m.slot {
            Slot::Function { name, .. } | Slot::Placeholder { name, .. } => name == function,
            Slot::Base { .. } => false,
        })
    }
}

/// A run of consecutive versions sharing one layout: `first <= v < end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutGroup {
    pub first: u32,
    pub end: Option<u32>,
    pub layout: StructLayout,
}

impl LayoutGroup {
    pub fn contains(&self, version: u32) -> bool {
        version >= self.first && self.end.map_or(true, |end| version < end)
    }
}

/// All layout groups of one class, lowest version first.
#[derive(Debug, Clone)]
pub struct ClassLayouts {
    pub class: String,
    pub groups: Vec<LayoutGroup>,
}

impl ClassLayouts {
    pub fn compute(model: &DeclarationModel, class: &ClassDecl, dialect: &Dialect) -> Result<Self> {
        let versions = covered_versions(model, class);
        let mut groups: Vec<LayoutGroup> = Vec::new();

        for &version in &versions {
            let layout = layout_at(model, class, version, dialect)?;
            match groups.last_mut() {
                Some(group) if group.layout.same_shape(&layout) => {}
                Some(group) => {
                    group.end = Some(version);
                    groups.push(LayoutGroup {
                        first: version,
                        end: None,
                        layout,
                    });
                }
                None => groups.push(LayoutGroup {
                    first: version,
                    end: None,
                    layout,
                }),
            }
        }
        if let Some(last) = groups.last_mut() {
            last.end = class.versions.removed;
        }

        tracing::debug!(
            class = %class.name,
            versions = versions.len(),
            groups = groups.len(),
            "computed struct layouts"
        );
        Ok(Self {
            class: class.name.clone(),
            groups,
        })
    }

    /// More than one layout exists, so callers must dispatch at run time.
    pub fn is_dispatched(&self) -> bool {
        self.groups.len() > 1
    }

    pub fn group_for(&self, version: u32) -> Option<&LayoutGroup> {
        self.groups.iter().find(|g| g.contains(version))
    }

    /// The newest layout.
    pub fn current(&self) -> Option<&LayoutGroup> {
        self.groups.last()
    }

    /// Groups from the newest version down, the order dispatch branches in.
    pub fn newest_first(&self) -> impl Iterator<Item = &LayoutGroup> {
        self.groups.iter().rev()
    }
}

/// Versions at which the layout of `class` may change: its lower bound plus
/// every bound of its own and its ancestors' virtual functions.
pub fn covered_versions(model: &DeclarationModel, class: &ClassDecl) -> Vec<u32> {
    let lower = class.versions.added.unwrap_or(FIRST_VERSION);
    let upper = class.versions.removed;

    let mut versions = BTreeSet::from([lower]);
    let mut current = Some(class);
    while let Some(c) = current {
        for bound in c.virtuals.iter().flat_map(|f| f.versions.bounds()) {
            if bound > lower && upper.map_or(true, |u| bound < u) {
                versions.insert(bound);
            }
        }
        current = model.parent_of(c);
    }
    versions.into_iter().collect()
}

/// The layout of `class` at `version`.
pub fn layout_at(
    model: &DeclarationModel,
    class: &ClassDecl,
    version: u32,
    dialect: &Dialect,
) -> Result<StructLayout> {
    let (base_abi, base_size) = match model.parent_of(class) {
        Some(parent) => {
            let parent_layouts = ClassLayouts::compute(model, parent, dialect)?;
            let group = parent_layouts
                .group_for(version)
                .or_else(|| parent_layouts.groups.first())
                .ok_or_else(|| {
                    BridgeError::malformed(
                        format!("parent `{}` has no layout at version {version}", parent.name),
                        class.canonical.clone(),
                    )
                })?;
            let abi = if parent_layouts.is_dispatched() {
                dialect.versioned_abi_name(&parent.name, group.first)
            } else {
                dialect.class_abi_name(&parent.name)
            };
            (abi, group.layout.size())
        }
        None if class.parent == dialect.scoped_root() => (
            dialect.class_abi_name(&class.parent),
            SCOPED_ROOT_SLOTS * POINTER_WIDTH,
        ),
        None => (
            dialect.class_abi_name(&class.parent),
            SHARED_ROOT_SLOTS * POINTER_WIDTH,
        ),
    };

    let mut members = vec![Member {
        slot: Slot::Base { abi: base_abi },
        offset: 0,
        size: base_size,
    }];
    let mut offset = base_size;

    for func in &class.virtuals {
        if func.versions.added.is_some_and(|a| version < a) {
            continue;
        }
        let member = dialect.naming().to_abi_name(&func.name, false, None);
        let slot = if func.versions.is_retired_at(version) {
            Slot::Placeholder {
                name: func.name.clone(),
                member,
            }
        } else {
            Slot::Function {
                name: func.name.clone(),
                member,
            }
        };
        members.push(Member {
            slot,
            offset,
            size: POINTER_WIDTH,
        });
        offset += POINTER_WIDTH;
    }

    Ok(StructLayout { version, members })
}
