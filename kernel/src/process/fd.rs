//! Per-Process File Descriptor Table
//!
//! A dense slot vector mapping small integers to open resource handles.
//! The open resource itself (`FileDescription`) is shared (dup and fork
//! alias it) while the slots and their flag words are always private to
//! one table.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;

use crate::errno::{Errno, SysResult};

/// Fixed upper bound on open descriptors per process.
pub const MAX_OPEN_FDS: usize = 256;

bitflags! {
    /// Per-slot flag word.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct FdFlags: u32 {
        /// Close this descriptor on exec.
        const CLOEXEC = 0b0001;
    }
}

/// Handle to an open resource.
///
/// What the resource *is* (inode, pipe end, socket) belongs to the
/// filesystem and device collaborators; the process subsystem only
/// holds and releases references.
#[derive(Debug)]
pub struct FileDescription {
    label: String,
}

impl FileDescription {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(FileDescription {
            label: label.into(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// One populated descriptor slot.
#[derive(Debug, Clone)]
pub struct FdEntry {
    description: Arc<FileDescription>,
    flags: FdFlags,
}

impl FdEntry {
    pub fn description(&self) -> &Arc<FileDescription> {
        &self.description
    }

    pub fn flags(&self) -> FdFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: FdFlags) {
        self.flags = flags;
    }
}

/// The descriptor table of one process.
#[derive(Debug)]
pub struct FdTable {
    slots: Vec<Option<FdEntry>>,
}

impl FdTable {
    pub fn new() -> Self {
        FdTable { slots: Vec::new() }
    }

    /// Lowest free descriptor at or above `hint`.
    pub fn allocate(&self, hint: i32) -> SysResult<i32> {
        let hint = hint.max(0) as usize;
        for fd in hint..MAX_OPEN_FDS {
            if self.slots.get(fd).map_or(true, |slot| slot.is_none()) {
                return Ok(fd as i32);
            }
        }
        Err(Errno::EMFILE)
    }

    /// Install a resource into a specific slot.
    ///
    /// The slot must be empty: reuse requires explicit clearing first.
    pub fn install(
        &mut self,
        fd: i32,
        description: Arc<FileDescription>,
        flags: FdFlags,
    ) -> SysResult<()> {
        let index = self.index(fd)?;
        if self.slots[index].is_some() {
            return Err(Errno::EBUSY);
        }
        self.slots[index] = Some(FdEntry { description, flags });
        Ok(())
    }

    pub fn get(&self, fd: i32) -> Option<&FdEntry> {
        if fd < 0 {
            return None;
        }
        self.slots.get(fd as usize).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, fd: i32) -> Option<&mut FdEntry> {
        if fd < 0 {
            return None;
        }
        self.slots
            .get_mut(fd as usize)
            .and_then(|slot| slot.as_mut())
    }

    /// Empty a slot, releasing its reference to the open resource.
    pub fn clear(&mut self, fd: i32) -> SysResult<FdEntry> {
        if fd < 0 || fd as usize >= self.slots.len() {
            return Err(Errno::EBADF);
        }
        self.slots[fd as usize].take().ok_or(Errno::EBADF)
    }

    /// `dup2`-style duplication: `new` ends up referencing `old`'s
    /// resource.  If `new` is occupied its prior occupant is released
    /// first; the replacement is one atomic step from the table's point
    /// of view.
    pub fn duplicate(&mut self, old: i32, new: i32) -> SysResult<()> {
        let entry = self.get(old).cloned().ok_or(Errno::EBADF)?;
        if old == new {
            return Ok(());
        }
        let index = self.index(new)?;
        // Flags are per-slot and do not travel with the resource.
        self.slots[index] = Some(FdEntry {
            description: entry.description,
            flags: FdFlags::empty(),
        });
        Ok(())
    }

    /// Duplicate every populated slot for a forked child.  Both tables
    /// then reference the same open resources but evolve independently.
    pub fn clone_for_fork(&self) -> FdTable {
        FdTable {
            slots: self.slots.clone(),
        }
    }

    /// Release every slot marked close-on-exec.
    pub fn close_on_exec(&mut self) {
        for slot in &mut self.slots {
            if slot
                .as_ref()
                .map_or(false, |e| e.flags.contains(FdFlags::CLOEXEC))
            {
                *slot = None;
            }
        }
    }

    /// Number of populated slots.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn index(&mut self, fd: i32) -> SysResult<usize> {
        if fd < 0 || fd as usize >= MAX_OPEN_FDS {
            return Err(Errno::EBADF);
        }
        let index = fd as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        Ok(index)
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
