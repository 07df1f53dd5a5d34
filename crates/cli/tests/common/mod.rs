#![allow(dead_code)]

use std::path::Path;

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

/// Little-endian MIPS ELF with the functions laid out back to back in `.text`.
pub fn mips_elf(functions: &[(&str, &[u32])]) -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Mips, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    for (name, words) in functions {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let offset = obj.append_section_data(text, &bytes, 4);
        obj.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value: offset,
            size: bytes.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
    }
    obj.write().expect("write elf fixture")
}

/// Write a project in the default layout. `foo` matches with a differing
/// call target, `bar` matches exactly, and `dma` is a hardware stub.
pub fn write_matching_project(root: &Path) {
    write_project(
        root,
        "foo = 0x0, 0xC;\nbar = 0xC, 0x8;\ndma = 0x14, 0x8; // HARDWARE\n",
        &[("foo", &[ADDIU_SP, JAL_B, JR_RA]), ("bar", &[LW_V0, JR_RA])],
    );
}

/// Like `write_matching_project`, plus a mismatching `baz` and an unbuilt `qux`.
pub fn write_failing_project(root: &Path) {
    write_project(
        root,
        "foo = 0x0, 0xC;\nbar = 0xC, 0x8;\ndma = 0x14, 0x8; // HARDWARE\n\
         baz = 0x1C, 0x8;\nqux = 0x24, 0x8;\n",
        &[("foo", &[ADDIU_SP, JAL_B, JR_RA]), ("bar", &[LW_V0, JR_RA]), ("baz", &[SW_V0, JR_RA])],
    );
}

/// Write a project whose image holds `foo`, `bar`, `dma`, `baz` and `qux`.
pub fn write_project(root: &Path, registry: &str, rebuilt: &[(&str, &[u32])]) {
    std::fs::create_dir_all(root.join("config")).unwrap();
    std::fs::create_dir_all(root.join("elf")).unwrap();
    std::fs::create_dir_all(root.join("build/src")).unwrap();
    std::fs::write(root.join("config/decompiled.txt"), registry).unwrap();
    std::fs::write(
        root.join("elf/SLUS_204.69"),
        mips_elf(&[
            ("foo", &[ADDIU_SP, JAL_A, JR_RA]),
            ("bar", &[LW_V0, JR_RA]),
            ("dma", &[NOP, JR_RA]),
            ("baz", &[LW_V0, JR_RA]),
            ("qux", &[NOP, JR_RA]),
        ]),
    )
    .unwrap();
    std::fs::write(root.join("build/src/main.o"), mips_elf(rebuilt)).unwrap();
}
