#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use matchcheck_core::model::InstructionWord;
use matchcheck_core::services::extract::{
    AddressRange, ExtractError, InstructionSource, LocalAddress, ObjectArtifact, SymbolLookup,
    SymbolTable,
};
use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

pub const NOP: u32 = 0x0000_0000;
pub const JR_RA: u32 = 0x03E0_0008;
pub const ADDIU_SP: u32 = 0x27BD_FFF0;
pub const LW_V0: u32 = 0x8C82_0000;
pub const SW_V0: u32 = 0xAC82_0000;
pub const JAL_A: u32 = 0x0C04_0000;
pub const JAL_B: u32 = 0x0C04_0010;
pub const BREAK_A: u32 = 0x0007_000D;
pub const BREAK_B: u32 = 0x0000_01CD;

pub fn le_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn text_symbol(name: &str, value: u64, size: u64, section: object::write::SectionId) -> Symbol {
    Symbol {
        name: name.as_bytes().to_vec(),
        value,
        size,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(section),
        flags: SymbolFlags::None,
    }
}

/// Little-endian MIPS ELF with every function laid out back to back in `.text`.
pub fn mips_elf(functions: &[(&str, &[u32])]) -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Mips, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    for (name, words) in functions {
        let bytes = le_bytes(words);
        let offset = obj.append_section_data(text, &bytes, 4);
        obj.add_symbol(text_symbol(name, offset, bytes.len() as u64, text));
    }
    obj.write().expect("write elf fixture")
}

/// Like `mips_elf`, but each function gets its own `.text.<name>` section.
pub fn mips_elf_split(functions: &[(&str, &[u32])]) -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Mips, Endianness::Little);
    for (name, words) in functions {
        let section_name = format!(".text.{name}").into_bytes();
        let section = obj.add_section(Vec::new(), section_name, SectionKind::Text);
        let bytes = le_bytes(words);
        let offset = obj.append_section_data(section, &bytes, 4);
        obj.add_symbol(text_symbol(name, offset, bytes.len() as u64, section));
    }
    obj.write().expect("write split elf fixture")
}

/// Like `mips_elf_split`, but with caller-chosen section names so several
/// sections can share one name the way COMDAT groups do.
pub fn mips_elf_sections(functions: &[(&str, &str, &[u32])]) -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Mips, Endianness::Little);
    for (section_name, name, words) in functions {
        let section =
            obj.add_section(Vec::new(), section_name.as_bytes().to_vec(), SectionKind::Text);
        let bytes = le_bytes(words);
        let offset = obj.append_section_data(section, &bytes, 4);
        obj.add_symbol(text_symbol(name, offset, bytes.len() as u64, section));
    }
    obj.write().expect("write elf fixture with named sections")
}

/// Little-endian MIPS ELF32 executable with no section headers: one
/// `PT_LOAD` segment (R+X) holding `words` at virtual address `base`.
pub fn stripped_mips_elf(base: u32, words: &[u32]) -> Vec<u8> {
    const EHDR_SIZE: u16 = 52;
    const PHDR_SIZE: u16 = 32;
    let code = le_bytes(words);
    let code_len = code.len() as u32;

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    out.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    out.extend_from_slice(&8u16.to_le_bytes()); // EM_MIPS
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&base.to_le_bytes());
    out.extend_from_slice(&u32::from(EHDR_SIZE).to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&EHDR_SIZE.to_le_bytes());
    out.extend_from_slice(&PHDR_SIZE.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&40u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());

    // PT_LOAD with PF_R | PF_X.
    let code_offset = u32::from(EHDR_SIZE + PHDR_SIZE);
    for field in [1, code_offset, base, base, code_len, code_len, 5, 4] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&code);
    out
}

/// In-memory instruction source keyed by word address.
pub struct FakeSource {
    pub label: String,
    pub words: BTreeMap<u64, u32>,
    pub calls: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new(label: &str, base: u64, words: &[u32]) -> Self {
        let words = words.iter().enumerate().map(|(i, w)| (base + 4 * i as u64, *w)).collect();
        Self { label: label.to_string(), words, calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn add(&mut self, base: u64, words: &[u32]) {
        for (i, w) in words.iter().enumerate() {
            self.words.insert(base + 4 * i as u64, *w);
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl InstructionSource for FakeSource {
    fn label(&self) -> &str {
        &self.label
    }

    /// Words from `range.start` up to the first hole, like a section that
    /// ends early. Errors only when not a single word is present.
    fn extract(&self, range: &AddressRange) -> Result<Vec<InstructionWord>, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let words: Vec<InstructionWord> = (range.start..range.end)
            .step_by(4)
            .map_while(|addr| self.words.get(&addr).map(|bits| InstructionWord::new(addr, *bits)))
            .collect();
        if words.is_empty() {
            return Err(ExtractError::range(&self.label, range, "hole in fake image"));
        }
        Ok(words)
    }
}

/// Fake object: a `FakeSource` plus a symbol table.
pub struct FakeObject {
    pub source: FakeSource,
    pub symbols: SymbolTable,
}

impl FakeObject {
    pub fn new(label: &str) -> Self {
        Self { source: FakeSource::new(label, 0, &[]), symbols: SymbolTable::new() }
    }

    /// Define `name` at `offset` with the given body.
    pub fn define(mut self, name: &str, offset: u64, words: &[u32]) -> Self {
        self.source.add(offset, words);
        self.symbols.insert(name, Some(LocalAddress::absolute(offset)), false);
        self
    }

    /// Define `name` without a usable address.
    pub fn define_unlocated(mut self, name: &str) -> Self {
        self.symbols.insert(name, None, false);
        self
    }
}

impl InstructionSource for FakeObject {
    fn label(&self) -> &str {
        self.source.label()
    }

    fn extract(&self, range: &AddressRange) -> Result<Vec<InstructionWord>, ExtractError> {
        self.source.extract(range)
    }
}

impl ObjectArtifact for FakeObject {
    fn lookup(&self, name: &str) -> SymbolLookup {
        self.symbols.lookup(name)
    }
}
