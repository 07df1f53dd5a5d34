use capstone::{arch, prelude::*, Capstone};
use thiserror::Error;

use crate::services::equivalence::DiagnosticWord;

#[derive(Debug, Error)]
pub enum DisasmError {
    #[error("capstone init failed: {0}")]
    Init(String),
}

pub fn capstone_version() -> String {
    let (major, minor) = Capstone::lib_version();
    format!("{major}.{minor}")
}

/// Renders diagnostic words as MIPS assembly for failure reports.
///
/// Capstone handles are not `Sync`, so this lives on the reporting thread
/// rather than inside the worker pool.
pub struct MipsDisassembler {
    cs: Capstone,
}

impl MipsDisassembler {
    pub fn new() -> Result<Self, DisasmError> {
        let cs = Capstone::new()
            .mips()
            .mode(arch::mips::ArchMode::Mips64)
            .endian(capstone::Endian::Little)
            .detail(false)
            .build()
            .map_err(|e| DisasmError::Init(e.to_string()))?;
        Ok(Self { cs })
    }

    /// `mnemonic operands` for one raw word, or `None` if capstone cannot
    /// decode it (e.g. R5900-only multimedia instructions).
    pub fn describe(&self, bits: u32, address: u64) -> Option<String> {
        let insns = self.cs.disasm_count(&bits.to_le_bytes(), address, 1).ok()?;
        let insn = insns.iter().next()?;
        let text = format!("{} {}", insn.mnemonic().unwrap_or(""), insn.op_str().unwrap_or(""));
        let text = text.trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn describe_word(&self, word: &DiagnosticWord) -> Option<String> {
        self.describe(word.raw, word.address)
    }
}
