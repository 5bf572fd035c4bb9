//! Filesystem Visibility Restriction (Unveil)
//!
//! A per-process trie over path components.  Until the first unveil a
//! process sees the whole filesystem; after that, only unveiled prefixes
//! are visible with the permissions recorded at the most specific
//! matching ancestor.  Locking the veil is one-way and freezes the tree.
//!
//! Path *resolution* (symlinks, mount points) belongs to the VFS
//! collaborator; paths here are already absolute and are only normalized
//! lexically.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use bitflags::bitflags;

use crate::errno::{Errno, SysResult};

bitflags! {
    /// Permissions attached to an unveiled path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UnveilPerms: u8 {
        /// Path may be read.
        const READ = 0b0001;
        /// Path may be written.
        const WRITE = 0b0010;
        /// Path may be executed.
        const EXECUTE = 0b0100;
        /// Path may be created or removed.
        const CREATE = 0b1000;
    }
}

impl UnveilPerms {
    /// Parse the permission letters accepted by the syscall.
    pub fn parse(spec: &str) -> SysResult<UnveilPerms> {
        let mut perms = UnveilPerms::empty();
        for c in spec.chars() {
            match c {
                'r' => perms |= UnveilPerms::READ,
                'w' => perms |= UnveilPerms::WRITE,
                'x' => perms |= UnveilPerms::EXECUTE,
                'c' => perms |= UnveilPerms::CREATE,
                _ => return Err(Errno::EINVAL),
            }
        }
        Ok(perms)
    }
}

/// Veil progression. Forward-only: None → Dropped → Locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VeilState {
    /// No unveil has happened; everything is visible.
    None,
    /// At least one path is unveiled; unlisted paths are denied.
    Dropped,
    /// The tree is frozen; further unveils fail.
    Locked,
}

/// One node in the unveil trie.
#[derive(Debug, Clone)]
pub struct UnveilNode {
    /// Path component this node is keyed by.
    component: String,
    /// Permissions granted at this node.
    permissions: UnveilPerms,
    /// Placeholder created on the way to a deeper explicit node; its
    /// permissions mirror the nearest explicit ancestor.
    inherited: bool,
    children: BTreeMap<String, UnveilNode>,
}

impl UnveilNode {
    fn new(component: String, permissions: UnveilPerms, inherited: bool) -> Self {
        UnveilNode {
            component,
            permissions,
            inherited,
            children: BTreeMap::new(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn permissions(&self) -> UnveilPerms {
        self.permissions
    }

    pub fn is_inherited(&self) -> bool {
        self.inherited
    }
}

/// Lexical normalization of an absolute path into its components.
///
/// `.` collapses, `..` pops (never above the root), repeated slashes are
/// ignored. Relative paths are the caller's bug, not ours to guess at.
pub fn normalize_path(path: &str) -> SysResult<Vec<String>> {
    if !path.starts_with('/') {
        return Err(Errno::EINVAL);
    }
    let mut components: Vec<String> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other.to_string()),
        }
    }
    Ok(components)
}

/// The unveil state of one process.
#[derive(Debug, Clone)]
pub struct UnveilTree {
    state: VeilState,
    root: UnveilNode,
}

impl UnveilTree {
    pub fn new() -> Self {
        UnveilTree {
            state: VeilState::None,
            root: UnveilNode::new(String::from("/"), UnveilPerms::empty(), true),
        }
    }

    pub fn state(&self) -> VeilState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == VeilState::Locked
    }

    /// Unveil `path` with `permissions`.
    ///
    /// Re-unveiling an explicitly unveiled path only ever narrows: a
    /// request carrying any permission bit the node does not already have
    /// fails with `EPERM` and leaves the node untouched.
    pub fn add(&mut self, path: &str, permissions: UnveilPerms) -> SysResult<()> {
        if self.state == VeilState::Locked {
            return Err(Errno::EPERM);
        }
        let components = normalize_path(path)?;

        // Walk with insertion; everything created on the way down is an
        // inherited placeholder until the final component.
        let mut node = &mut self.root;
        for component in &components {
            let inherited_perms = node.permissions;
            node = node
                .children
                .entry(component.clone())
                .or_insert_with(|| UnveilNode::new(component.clone(), inherited_perms, true));
        }

        if !node.inherited && !node.permissions.contains(permissions) {
            return Err(Errno::EPERM);
        }
        node.permissions = permissions;
        node.inherited = false;

        if self.state == VeilState::None {
            self.state = VeilState::Dropped;
        }
        Ok(())
    }

    /// Freeze the tree. One-way.
    pub fn lock(&mut self) {
        self.state = VeilState::Locked;
    }

    /// Effective permissions for `path`: those of the most specific
    /// explicitly unveiled ancestor.  With no veil in place everything is
    /// permitted; with one, an unmatched path has no permissions at all.
    pub fn lookup(&self, path: &str) -> SysResult<UnveilPerms> {
        if self.state == VeilState::None {
            return Ok(UnveilPerms::all());
        }
        let components = normalize_path(path)?;

        let mut node = &self.root;
        let mut effective = if node.inherited {
            UnveilPerms::empty()
        } else {
            node.permissions
        };
        for component in &components {
            match node.children.get(component) {
                Some(child) => {
                    if !child.inherited {
                        effective = child.permissions;
                    }
                    node = child;
                }
                None => break,
            }
        }
        Ok(effective)
    }

    /// Number of explicitly unveiled paths.
    pub fn unveiled_count(&self) -> usize {
        fn count(node: &UnveilNode) -> usize {
            let own = if node.inherited { 0 } else { 1 };
            own + node.children.values().map(count).sum::<usize>()
        }
        count(&self.root)
    }
}

impl Default for UnveilTree {
    fn default() -> Self {
        Self::new()
    }
}
