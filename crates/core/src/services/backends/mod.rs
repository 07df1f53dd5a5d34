#[cfg(feature = "capstone-backend")]
pub mod capstone;
pub mod elf;
#[cfg(feature = "objdump-backend")]
pub mod objdump;

#[cfg(feature = "capstone-backend")]
pub use capstone::{capstone_version, DisasmError, MipsDisassembler};
pub use elf::{ElfBackend, ElfFile};
#[cfg(feature = "objdump-backend")]
pub use objdump::{ObjdumpBackend, ObjdumpFile};
