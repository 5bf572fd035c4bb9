//! Program Image Interface
//!
//! Narrow boundary to the executable loader and virtual-memory
//! collaborators.  Parsing the binary format and building page tables are
//! their business; the process subsystem only needs an opaque address
//! space, an entry point, and the image-scoped TLS prototype, delivered
//! atomically so a failed load leaves the caller's current image alone.

use alloc::string::String;

use crate::errno::SysResult;

/// Opaque handle to a process address space.
///
/// Owned by the VM collaborator; the process subsystem only creates,
/// duplicates (fork) and swaps (exec) whole handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpace {
    /// Page-table root, as handed out by the VM layer.
    page_table_root: u64,
}

impl AddressSpace {
    pub fn new(page_table_root: u64) -> Self {
        AddressSpace { page_table_root }
    }

    /// An empty address space for kernel processes.
    pub fn kernel() -> Self {
        AddressSpace { page_table_root: 0 }
    }

    pub fn page_table_root(&self) -> u64 {
        self.page_table_root
    }

    /// Copy-on-write duplicate for fork. The real copying is the VM
    /// collaborator's job.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }
}

/// Master thread-local-storage prototype of the loaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterTls {
    pub region_base: u64,
    pub size: usize,
    pub alignment: usize,
}

/// Everything the lifecycle controller needs back from a successful load.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Program entry point.
    pub entry_point: u64,
    /// Freshly built address space for the new image.
    pub space: AddressSpace,
    /// TLS prototype, if the image carries one.
    pub master_tls: Option<MasterTls>,
    /// Resolved absolute path of the executable.
    pub executable_path: String,
}

/// The executable-loader collaborator.
///
/// `load` either returns a complete image or an error with no side
/// effects; the caller's current image is never touched.
pub trait ImageLoader {
    fn load(&self, path: &str) -> SysResult<LoadedImage>;
}
