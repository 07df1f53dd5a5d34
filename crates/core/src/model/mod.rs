//! Core data model for registry entries and extracted instructions.
//!
//! Everything here is immutable once built:
//! - `FunctionRecord` describes one function of the reference image.
//! - `InstructionWord` is one fixed-width instruction read from a binary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width of one instruction word in bytes.
pub const INSTRUCTION_WIDTH: u64 = 4;

/// How a registry entry takes part in verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Rebuilt from source and compared instruction by instruction.
    Normal,
    /// Exempt from comparison; counted but never extracted.
    HardwareStubbed,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Normal => "normal",
            Category::HardwareStubbed => "hardware",
        }
    }
}

/// One named function of the reference image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub category: Category,
}

impl FunctionRecord {
    pub fn new(name: impl Into<String>, address: u64, size: u64, category: Category) -> Self {
        Self { name: name.into(), address, size, category }
    }

    /// First address past the end of the function.
    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.size)
    }

    /// Number of instruction words the function spans.
    pub fn word_count(&self) -> usize {
        (self.size / INSTRUCTION_WIDTH) as usize
    }

    pub fn is_hardware(&self) -> bool {
        self.category == Category::HardwareStubbed
    }
}

/// A raw instruction word and the address it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstructionWord {
    pub address: u64,
    pub bits: u32,
}

impl InstructionWord {
    pub fn new(address: u64, bits: u32) -> Self {
        Self { address, bits }
    }
}

impl fmt::Display for InstructionWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.bits)
    }
}
