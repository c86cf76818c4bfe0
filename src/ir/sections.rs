use std::{
    fmt::Write,
    hash::{Hash, Hasher},
};

use rustc_hash::{FxHashMap, FxHasher};

/// The module regions, in the order they appear in the final module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionKind {
    Capabilities,
    Extensions,
    ExtInstImports,
    MemoryModel,
    EntryPoints,
    ExecutionModes,
    DebugSources,
    DebugNames,
    Annotations,
    TypeDeclarations,
    FunctionDeclarations,
    FunctionDefinitions,
}

impl SectionKind {
    /// Layout order mandated by the SPIR-V logical module layout.
    pub const ORDER: [SectionKind; 12] = [
        SectionKind::Capabilities,
        SectionKind::Extensions,
        SectionKind::ExtInstImports,
        SectionKind::MemoryModel,
        SectionKind::EntryPoints,
        SectionKind::ExecutionModes,
        SectionKind::DebugSources,
        SectionKind::DebugNames,
        SectionKind::Annotations,
        SectionKind::TypeDeclarations,
        SectionKind::FunctionDeclarations,
        SectionKind::FunctionDefinitions,
    ];

    /// Whether appending the same line twice keeps a single copy.
    pub fn is_unique(self) -> bool {
        matches!(
            self,
            SectionKind::Capabilities
                | SectionKind::Extensions
                | SectionKind::ExtInstImports
                | SectionKind::TypeDeclarations
        )
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// 64-bit content hash used to de-duplicate instructions.
pub fn content_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

/// An append-only list of instruction lines.
#[derive(Debug, Clone, Default)]
pub struct InstructionSection {
    lines: Vec<String>,
    unique: bool,
    /// Content hash to the indices of the lines with that hash.
    seen: FxHashMap<u64, Vec<usize>>,
}

impl InstructionSection {
    pub fn new(unique: bool) -> Self {
        Self {
            lines: Vec::new(),
            unique,
            seen: FxHashMap::default(),
        }
    }

    /// Appends a line. Unique sections ignore lines they already hold and
    /// return `false` in that case.
    ///
    /// A hash match is confirmed against the stored text, so colliding lines
    /// are still both kept.
    pub fn append(&mut self, line: String) -> bool {
        if self.unique {
            let hash = content_hash(line.as_str());
            let candidates = self.seen.entry(hash).or_default();
            if candidates.iter().any(|&idx| self.lines[idx] == line) {
                return false;
            }
            candidates.push(self.lines.len());
        }
        self.lines.push(line);
        true
    }

    pub fn contains(&self, line: &str) -> bool {
        if self.unique {
            self.seen
                .get(&content_hash(line))
                .is_some_and(|candidates| candidates.iter().any(|&idx| self.lines[idx] == line))
        } else {
            self.lines.iter().any(|x| x == line)
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn clear(&mut self) {
        self.lines.clear();
        self.seen.clear();
    }
}

/// Header values written as comments before the first instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub version: (u8, u8),
    pub generator: String,
    pub bound: u32,
}

/// All the sections of one module.
#[derive(Debug, Clone)]
pub struct SectionStore {
    sections: Vec<InstructionSection>,
}

impl Default for SectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionStore {
    pub fn new() -> Self {
        Self {
            sections: SectionKind::ORDER
                .iter()
                .map(|kind| InstructionSection::new(kind.is_unique()))
                .collect(),
        }
    }

    pub fn append(&mut self, kind: SectionKind, line: impl Into<String>) -> bool {
        self.sections[kind.index()].append(line.into())
    }

    /// Replaces the whole content of a section with a single line.
    ///
    /// Only used for the memory model, of which a module has exactly one.
    pub fn replace(&mut self, kind: SectionKind, line: impl Into<String>) {
        let section = &mut self.sections[kind.index()];
        section.clear();
        section.append(line.into());
    }

    pub fn section(&self, kind: SectionKind) -> &InstructionSection {
        &self.sections[kind.index()]
    }

    /// Concatenates the preamble and every section in layout order.
    pub fn render(&self, preamble: &Preamble) -> String {
        let mut out = String::new();
        // Writing into a String can't fail.
        let _ = writeln!(out, "; SPIR-V");
        let _ = writeln!(out, "; Version: {}.{}", preamble.version.0, preamble.version.1);
        let _ = writeln!(out, "; Generator: {}", preamble.generator);
        let _ = writeln!(out, "; Bound: {}", preamble.bound);
        let _ = writeln!(out, "; Schema: 0");

        for kind in SectionKind::ORDER {
            for line in self.section(kind).lines() {
                out.push_str(line);
                out.push('\n');
            }
        }

        out
    }
}
