//! Symbol table record types

/// A source file referenced by line entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Unique ID for this source (index in the table's sources array)
    pub id: u32,
    /// Path or identifier for the source
    pub path: String,
}

bitflags::bitflags! {
    /// Flags for line entries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LineFlags: u8 {
        /// This entry maps one source line to one instruction address
        /// and is a valid stop location
        const STATEMENT = 0b0000_0001;
        /// Continuation of a multi-byte/multi-line construct
        const CONTINUATION = 0b0000_0010;
    }
}

/// Mapping from a simulator address to a source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    /// Source file ID
    pub file_id: u32,
    /// Line number (1-based)
    pub line: u32,
    /// Simulator address of the first instruction for this line
    pub address: u16,
    /// Flags for this entry
    pub flags: LineFlags,
}

/// Kind of label, for formats that distinguish code from data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// Label on executable code
    Code,
    /// Label on a data region
    Data,
}

/// A named address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    /// Label name
    pub name: String,
    /// Simulator address the label refers to
    pub address: u16,
    /// `None` when the source format does not distinguish code/data
    pub kind: Option<LabelKind>,
}
