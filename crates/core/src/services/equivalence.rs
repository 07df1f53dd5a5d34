//! Instruction-word canonicalization and sequence comparison.
//!
//! Two independently linked binaries may encode the same call with different
//! target fields, and the assembler may emit either of two `break` encodings.
//! Before comparing, every word is reduced to a `CanonicalWord`:
//!
//! 1. A direct call (MIPS `jal` by default) keeps only its opcode.
//! 2. Any `break` (SPECIAL opcode, funct 0x0D) becomes `Trap`.
//! 3. Everything else is kept bit for bit.
//!
//! Sequences match only if they have the same length and every canonical word
//! is equal. There is no further tolerance.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::model::InstructionWord;

pub const OPCODE_SHIFT: u32 = 26;
pub const OPCODE_MASK: u32 = 0xFC00_0000;
/// Primary opcode of `jal`.
pub const JAL_OPCODE: u8 = 0x03;
/// Mask selecting the SPECIAL opcode and funct fields.
pub const TRAP_PATTERN_MASK: u32 = 0xFC00_003F;
/// SPECIAL/`break` pattern under `TRAP_PATTERN_MASK`.
pub const TRAP_FUNCT: u32 = 0x0000_000D;
/// Representative bits of `CanonicalWord::Trap` (`break 0`).
pub const TRAP_SENTINEL: u32 = TRAP_FUNCT;
/// The two `break` encodings the toolchains are known to emit.
pub const KNOWN_TRAP_ENCODINGS: [u32; 2] = [0x0007_000D, 0x0000_01CD];

pub const DEFAULT_DIAGNOSTIC_WORDS: usize = 8;

/// Whether the masking rules are applied at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPolicy {
    #[default]
    Masked,
    /// Plain bit equality.
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    pub policy: MaskPolicy,
    /// Primary opcodes whose 26-bit target field is ignored.
    pub call_opcodes: Vec<u8>,
    /// Unify all `break` encodings.
    pub traps: bool,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self { policy: MaskPolicy::Masked, call_opcodes: vec![JAL_OPCODE], traps: true }
    }
}

impl MaskConfig {
    pub fn raw() -> Self {
        Self { policy: MaskPolicy::Raw, ..Self::default() }
    }
}

/// Comparison form of one instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalWord {
    Exact(u32),
    /// A direct call with its target field dropped.
    Call { opcode: u8 },
    Trap,
}

impl CanonicalWord {
    /// Representative bit pattern; canonicalizing it yields `self` again.
    pub fn bits(&self) -> u32 {
        match self {
            CanonicalWord::Exact(bits) => *bits,
            CanonicalWord::Call { opcode } => (*opcode as u32) << OPCODE_SHIFT,
            CanonicalWord::Trap => TRAP_SENTINEL,
        }
    }
}

impl fmt::Display for CanonicalWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalWord::Trap => f.write_str("BREAK"),
            other => write!(f, "{:08x}", other.bits()),
        }
    }
}

impl Serialize for CanonicalWord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One word shown in failure diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticWord {
    pub address: u64,
    pub raw: u32,
    pub canonical: CanonicalWord,
}

/// Where and how two sequences stopped matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    /// Index of the first differing word (the shorter length if one sequence
    /// is a prefix of the other).
    pub index: usize,
    pub original_len: usize,
    pub rebuilt_len: usize,
    /// Leading words of each sequence.
    pub original: Vec<DiagnosticWord>,
    pub rebuilt: Vec<DiagnosticWord>,
    /// Words at `index`, when the sequence reaches that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_at: Option<DiagnosticWord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuilt_at: Option<DiagnosticWord>,
}

impl Divergence {
    pub fn length_mismatch(&self) -> bool {
        self.original_len != self.rebuilt_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Equivalent,
    Divergent(Divergence),
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Equivalent)
    }

    pub fn divergence(&self) -> Option<&Divergence> {
        match self {
            Comparison::Equivalent => None,
            Comparison::Divergent(d) => Some(d),
        }
    }
}

/// Applies the masking rules and compares word sequences.
#[derive(Debug, Clone)]
pub struct EquivalenceEngine {
    config: MaskConfig,
    diagnostic_words: usize,
}

impl Default for EquivalenceEngine {
    fn default() -> Self {
        Self::new(MaskConfig::default(), DEFAULT_DIAGNOSTIC_WORDS)
    }
}

impl EquivalenceEngine {
    pub fn new(mut config: MaskConfig, diagnostic_words: usize) -> Self {
        // SPECIAL (0) is never a direct call, and opcodes are six bits wide.
        config.call_opcodes.retain(|op| {
            let valid = *op != 0 && *op < 64;
            if !valid {
                log::warn!("ignoring invalid call opcode 0x{op:02X} in masking config");
            }
            valid
        });
        config.call_opcodes.sort_unstable();
        config.call_opcodes.dedup();
        Self { config, diagnostic_words }
    }

    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    pub fn canonicalize(&self, bits: u32) -> CanonicalWord {
        if self.config.policy == MaskPolicy::Raw {
            return CanonicalWord::Exact(bits);
        }
        let opcode = ((bits & OPCODE_MASK) >> OPCODE_SHIFT) as u8;
        if self.config.call_opcodes.contains(&opcode) {
            return CanonicalWord::Call { opcode };
        }
        if self.config.traps && bits & TRAP_PATTERN_MASK == TRAP_FUNCT {
            return CanonicalWord::Trap;
        }
        CanonicalWord::Exact(bits)
    }

    fn diagnostic(&self, word: &InstructionWord) -> DiagnosticWord {
        DiagnosticWord {
            address: word.address,
            raw: word.bits,
            canonical: self.canonicalize(word.bits),
        }
    }

    pub fn compare(&self, original: &[InstructionWord], rebuilt: &[InstructionWord]) -> Comparison {
        let first_diff = original
            .iter()
            .zip(rebuilt)
            .position(|(o, r)| self.canonicalize(o.bits) != self.canonicalize(r.bits));

        let index = match first_diff {
            Some(idx) => idx,
            None if original.len() == rebuilt.len() => return Comparison::Equivalent,
            None => original.len().min(rebuilt.len()),
        };

        let k = self.diagnostic_words;
        Comparison::Divergent(Divergence {
            index,
            original_len: original.len(),
            rebuilt_len: rebuilt.len(),
            original: original.iter().take(k).map(|w| self.diagnostic(w)).collect(),
            rebuilt: rebuilt.iter().take(k).map(|w| self.diagnostic(w)).collect(),
            original_at: original.get(index).map(|w| self.diagnostic(w)),
            rebuilt_at: rebuilt.get(index).map(|w| self.diagnostic(w)),
        })
    }
}
