use std::collections::HashSet;
use std::fs;
use std::path::Path;

use goblin::elf::{self, Elf};

use crate::model::{InstructionWord, INSTRUCTION_WIDTH};
use crate::services::extract::{
    AddressRange, ExtractError, ExtractionBackend, InstructionSource, LocalAddress,
    ObjectArtifact, SymbolLookup, SymbolTable,
};

/// In-process ELF reader for both the reference image and rebuilt objects.
pub struct ElfBackend;

impl ExtractionBackend for ElfBackend {
    fn name(&self) -> &'static str {
        "elf"
    }

    fn description(&self) -> String {
        "In-process ELF reader (goblin); reads section bytes directly".to_string()
    }

    fn open_image(
        &self,
        path: &Path,
        section: Option<&str>,
    ) -> Result<Box<dyn InstructionSource>, ExtractError> {
        let file = ElfFile::open(path)?.with_image_section(section.map(str::to_string));
        Ok(Box::new(file))
    }

    fn open_object(&self, path: &Path) -> Result<Box<dyn ObjectArtifact>, ExtractError> {
        Ok(Box::new(ElfFile::open(path)?))
    }
}

/// Bytes of one section, or of one executable segment when the file has no
/// usable section headers. Segment spans carry no index and no name.
#[derive(Debug, Clone)]
struct SectionSpan {
    index: Option<usize>,
    name: String,
    start: u64,
    size: u64,
    file_offset: u64,
    executable: bool,
}

impl SectionSpan {
    fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    fn covers(&self, address: u64) -> bool {
        address >= self.start && address < self.end()
    }

    fn is_segment(&self) -> bool {
        self.index.is_none()
    }
}

/// A parsed ELF file. Section spans and the symbol table are collected once
/// at open time; the raw bytes are kept for extraction.
#[derive(Debug)]
pub struct ElfFile {
    label: String,
    bytes: Vec<u8>,
    little_endian: bool,
    sections: Vec<SectionSpan>,
    symbols: SymbolTable,
    image_section: Option<String>,
}

impl ElfFile {
    /// Read and parse the file at `path`.
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let bytes = fs::read(path).map_err(|e| ExtractError::artifact(path, e.to_string()))?;
        Self::parse(path.display().to_string(), bytes)
    }

    /// Parse an in-memory ELF image; `label` names it in errors and reports.
    pub fn parse(label: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ExtractError> {
        let label = label.into();
        let elf = Elf::parse(&bytes).map_err(|e| ExtractError::ArtifactUnavailable {
            artifact: label.clone(),
            reason: format!("not a readable ELF file: {e}"),
        })?;

        let little_endian = elf.little_endian;
        let sections = collect_sections(&elf);
        let symbols = collect_symbols(&elf);
        drop(elf);

        log::debug!("{label}: {} sections, {} symbols", sections.len(), symbols.len());
        Ok(Self { label, bytes, little_endian, sections, symbols, image_section: None })
    }

    /// Serve section-less ranges from `section` instead of searching all
    /// executable sections.
    pub fn with_image_section(mut self, section: Option<String>) -> Self {
        self.image_section = section;
        self
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The span `range` starts in. Ranges pinned to a section index or name
    /// only look there; an image section that a stripped file lacks falls
    /// back to its executable segments.
    fn span_for(&self, range: &AddressRange) -> Result<&SectionSpan, ExtractError> {
        let span = if let Some(index) = range.section_index {
            self.sections.iter().find(|s| s.index == Some(index)).ok_or_else(|| {
                ExtractError::range(&self.label, range, format!("no section at index {index}"))
            })?
        } else {
            match range.section.as_deref().or(self.image_section.as_deref()) {
                Some(name) => match self.sections.iter().find(|s| s.name == name) {
                    Some(span) => span,
                    None if self.sections.iter().any(SectionSpan::is_segment) => {
                        log::debug!("{}: no section named {name}, using segments", self.label);
                        self.executable_span(range)?
                    }
                    None => {
                        return Err(ExtractError::range(
                            &self.label,
                            range,
                            format!("no section named {name}"),
                        ))
                    }
                },
                None => self.executable_span(range)?,
            }
        };

        if span.covers(range.start) {
            Ok(span)
        } else {
            Err(ExtractError::range(
                &self.label,
                range,
                format!("outside section {} (0x{:X}..0x{:X})", span.name, span.start, span.end()),
            ))
        }
    }

    fn executable_span(&self, range: &AddressRange) -> Result<&SectionSpan, ExtractError> {
        self.sections.iter().find(|s| s.executable && s.covers(range.start)).ok_or_else(|| {
            ExtractError::range(&self.label, range, "no executable section covers range")
        })
    }

    fn decode(&self, chunk: &[u8]) -> u32 {
        let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
        if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        }
    }
}

impl InstructionSource for ElfFile {
    fn label(&self) -> &str {
        &self.label
    }

    fn extract(&self, range: &AddressRange) -> Result<Vec<InstructionWord>, ExtractError> {
        if range.is_empty() {
            return Err(ExtractError::range(&self.label, range, "empty range"));
        }
        if range.len() % INSTRUCTION_WIDTH != 0 {
            return Err(ExtractError::range(
                &self.label,
                range,
                format!("length is not a multiple of {INSTRUCTION_WIDTH}"),
            ));
        }

        // Functions at the tail of a section may be shorter than requested;
        // hand back the whole words that exist and let the caller judge.
        let span = self.span_for(range)?;
        let available = range.end.min(span.end()) - range.start;
        let len = available - available % INSTRUCTION_WIDTH;
        if len == 0 {
            return Err(ExtractError::range(&self.label, range, "no whole word before section end"));
        }
        if len < range.len() {
            log::debug!(
                "{}: range 0x{:X}..0x{:X} clipped at section end 0x{:X}",
                self.label,
                range.start,
                range.end,
                span.end()
            );
        }
        let start = span.file_offset.saturating_add(range.start - span.start);
        let end = start.saturating_add(len);
        let bytes = usize::try_from(start)
            .ok()
            .zip(usize::try_from(end).ok())
            .and_then(|(s, e)| self.bytes.get(s..e))
            .ok_or_else(|| ExtractError::range(&self.label, range, "file is truncated"))?;

        Ok(bytes
            .chunks_exact(INSTRUCTION_WIDTH as usize)
            .enumerate()
            .map(|(idx, chunk)| {
                InstructionWord::new(range.start + idx as u64 * INSTRUCTION_WIDTH, self.decode(chunk))
            })
            .collect())
    }
}

impl ObjectArtifact for ElfFile {
    fn lookup(&self, name: &str) -> SymbolLookup {
        self.symbols.lookup(name)
    }
}

fn section_name<'a>(elf: &'a Elf, index: usize) -> Option<&'a str> {
    let header = elf.section_headers.get(index)?;
    elf.shdr_strtab.get_at(header.sh_name)
}

fn collect_sections(elf: &Elf) -> Vec<SectionSpan> {
    let mut spans: Vec<SectionSpan> = elf
        .section_headers
        .iter()
        .enumerate()
        .filter(|(_, sh)| sh.sh_type != elf::section_header::SHT_NOBITS && sh.sh_size > 0)
        .map(|(idx, sh)| SectionSpan {
            index: Some(idx),
            name: section_name(elf, idx).unwrap_or("").to_string(),
            start: sh.sh_addr,
            size: sh.sh_size,
            file_offset: sh.sh_offset,
            executable: sh.sh_flags & u64::from(elf::section_header::SHF_EXECINSTR) != 0,
        })
        .collect();

    // Stripped images may lack section headers; fall back to executable segments.
    if !spans.iter().any(|s| s.executable) {
        spans.extend(
            elf.program_headers
                .iter()
                .filter(|ph| {
                    ph.p_type == elf::program_header::PT_LOAD
                        && ph.p_flags & elf::program_header::PF_X != 0
                        && ph.p_filesz > 0
                })
                .map(|ph| SectionSpan {
                    index: None,
                    name: String::new(),
                    start: ph.p_vaddr,
                    size: ph.p_filesz,
                    file_offset: ph.p_offset,
                    executable: true,
                }),
        );
    }
    spans
}

fn collect_symbols(elf: &Elf) -> SymbolTable {
    let mut table = SymbolTable::new();
    let mut globals = HashSet::new();

    for sym in elf.syms.iter() {
        if sym.st_shndx == elf::section_header::SHN_UNDEF as usize {
            continue;
        }
        let kind = sym.st_type();
        if kind == elf::sym::STT_SECTION || kind == elf::sym::STT_FILE {
            continue;
        }
        let name = elf.strtab.get_at(sym.st_name).unwrap_or("");
        if name.is_empty() {
            continue;
        }

        // Absolute/common symbols and dangling section indices have no bytes to read.
        let address = section_name(elf, sym.st_shndx).map(|section| LocalAddress {
            section: Some(section.to_string()),
            section_index: Some(sym.st_shndx),
            offset: sym.st_value,
        });

        let bind = sym.st_bind();
        let is_global = bind == elf::sym::STB_GLOBAL || bind == elf::sym::STB_WEAK;
        let replace = is_global && globals.insert(name.to_string());
        table.insert(name, address, replace);
    }
    table
}
