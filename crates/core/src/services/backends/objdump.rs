use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::model::InstructionWord;
use crate::services::extract::{
    AddressRange, ExtractError, ExtractionBackend, InstructionSource, LocalAddress,
    ObjectArtifact, SymbolLookup, SymbolTable,
};

/// Toolchain objdump used when neither config nor environment name one.
pub const DEFAULT_OBJDUMP: &str = "/usr/local/ps2dev/ee/bin/mips64r5900el-ps2-elf-objdump";

/// Backend that shells out to a (cross) objdump for symbols and disassembly.
#[derive(Debug, Clone)]
pub struct ObjdumpBackend {
    tool: PathBuf,
}

impl Default for ObjdumpBackend {
    fn default() -> Self {
        Self::new(resolve_objdump_path())
    }
}

impl ObjdumpBackend {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    fn open(&self, path: &Path, with_symbols: bool) -> Result<ObjdumpFile, ExtractError> {
        if !path.is_file() {
            return Err(ExtractError::artifact(path, "file not found"));
        }
        let symbols = if with_symbols {
            let body = run_objdump(&self.tool, &["-t".to_string()], path)
                .map_err(|reason| ExtractError::artifact(path, reason))?;
            parse_symbol_table(&body)
        } else {
            SymbolTable::new()
        };
        Ok(ObjdumpFile {
            tool: self.tool.clone(),
            path: path.to_path_buf(),
            label: path.display().to_string(),
            symbols,
            image_section: None,
        })
    }
}

impl ExtractionBackend for ObjdumpBackend {
    fn name(&self) -> &'static str {
        "objdump"
    }

    fn description(&self) -> String {
        format!("External objdump ({}); one process per range", self.tool.display())
    }

    fn open_image(
        &self,
        path: &Path,
        section: Option<&str>,
    ) -> Result<Box<dyn InstructionSource>, ExtractError> {
        let mut file = self.open(path, false)?;
        file.image_section = section.map(str::to_string);
        Ok(Box::new(file))
    }

    fn open_object(&self, path: &Path) -> Result<Box<dyn ObjectArtifact>, ExtractError> {
        Ok(Box::new(self.open(path, true)?))
    }
}

/// A binary read through objdump. The symbol table is read once at open.
#[derive(Debug)]
pub struct ObjdumpFile {
    tool: PathBuf,
    path: PathBuf,
    label: String,
    symbols: SymbolTable,
    image_section: Option<String>,
}

impl InstructionSource for ObjdumpFile {
    fn label(&self) -> &str {
        &self.label
    }

    fn extract(&self, range: &AddressRange) -> Result<Vec<InstructionWord>, ExtractError> {
        if range.is_empty() {
            return Err(ExtractError::range(&self.label, range, "empty range"));
        }
        let mut args = vec!["-d".to_string()];
        if let Some(section) = range.section.as_deref().or(self.image_section.as_deref()) {
            args.push("-j".to_string());
            args.push(section.to_string());
        }
        args.push(format!("--start-address=0x{:x}", range.start));
        args.push(format!("--stop-address=0x{:x}", range.end));

        let body = run_objdump(&self.tool, &args, &self.path)
            .map_err(|reason| ExtractError::range(&self.label, range, reason))?;
        let words: Vec<InstructionWord> = parse_disassembly(&body)
            .into_iter()
            .filter(|w| w.address >= range.start && w.address < range.end)
            .collect();
        if words.is_empty() {
            return Err(ExtractError::range(&self.label, range, "objdump produced no words"));
        }
        Ok(words)
    }
}

impl ObjectArtifact for ObjdumpFile {
    fn lookup(&self, name: &str) -> SymbolLookup {
        self.symbols.lookup(name)
    }
}

fn resolve_objdump_path() -> PathBuf {
    std::env::var_os("MATCHCHECK_OBJDUMP")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OBJDUMP))
}

fn run_objdump(tool: &Path, args: &[String], binary: &Path) -> Result<String, String> {
    let output = Command::new(tool)
        .args(args)
        .arg(binary)
        .output()
        .map_err(|e| format!("failed to spawn {}: {e}", tool.display()))?;
    if !output.status.success() {
        return Err(format!("{} exited with {}", tool.display(), output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn is_hex(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse `objdump -d` output into words.
///
/// Only lines shaped like `  20b1d8:\t8c820000 \tlw v0,0(a0)` count; labels,
/// headers, and relocation annotations are ignored.
pub fn parse_disassembly(body: &str) -> Vec<InstructionWord> {
    let mut words = Vec::new();
    for line in body.lines() {
        let Some((addr, rest)) = line.trim_start().split_once(':') else { continue };
        if !is_hex(addr) {
            continue;
        }
        let Some(word) = rest.split_whitespace().next() else { continue };
        if word.len() != 8 || !is_hex(word) {
            continue;
        }
        if let (Ok(address), Ok(bits)) =
            (u64::from_str_radix(addr, 16), u32::from_str_radix(word, 16))
        {
            words.push(InstructionWord::new(address, bits));
        }
    }
    words
}

/// Parse `objdump -t` output into a symbol table.
///
/// Rows look like `00000010 g     F .text\t00000020 name`. Undefined, file,
/// and section/debug symbols are skipped. A row whose address field is not
/// hex, or whose section is `*ABS*`/`*COM*`, is kept without an address.
pub fn parse_symbol_table(body: &str) -> SymbolTable {
    let mut table = SymbolTable::new();
    let mut globals = HashSet::new();

    for line in body.lines() {
        let Some((head, tail)) = line.split_once('\t') else { continue };
        let tail_tokens: Vec<&str> = tail.split_whitespace().collect();
        if tail_tokens.len() < 2 {
            continue;
        }
        let Some(&name) = tail_tokens.last() else { continue };

        let head_tokens: Vec<&str> = head.split_whitespace().collect();
        let (Some(&addr), Some(&section)) = (head_tokens.first(), head_tokens.last()) else {
            continue;
        };
        if head_tokens.len() < 2 || section == "*UND*" {
            continue;
        }
        let flags = &head_tokens[1..head_tokens.len() - 1];
        if flags.iter().any(|f| f.contains('f') || f.contains('d')) {
            continue;
        }

        let address = match (is_hex(addr), section) {
            (false, _) | (_, "*ABS*") | (_, "*COM*") => None,
            (true, section) => u64::from_str_radix(addr, 16)
                .ok()
                .map(|offset| LocalAddress::in_section(section, offset)),
        };

        let is_global = flags.iter().any(|f| f.contains('g') || f.contains('w'));
        let replace = is_global && globals.insert(name.to_string());
        table.insert(name, address, replace);
    }
    table
}
