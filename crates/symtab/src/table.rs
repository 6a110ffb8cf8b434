//! Symbol table queries
//!
//! All queries return `Option`; the debug orchestrator maps misses to its
//! own error taxonomy.

use crate::types::{LabelEntry, LabelKind, LineEntry, LineFlags, SourceFile};

/// Queryable symbol table for one loaded module.
///
/// Line and label entries are kept ordered by increasing address; the
/// builder sorts them once at construction so queries can rely on order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    sources: Vec<SourceFile>,
    lines: Vec<LineEntry>,
    labels: Vec<LabelEntry>,
    distinguishes_kind: bool,
}

impl SymbolTable {
    /// All source files referenced by this table.
    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    /// Whether the underlying format distinguishes code labels from data
    /// labels. When false, [`symbol_at`](Self::symbol_at) ignores its kind
    /// argument.
    pub fn distinguishes_kind(&self) -> bool {
        self.distinguishes_kind
    }

    /// Map an address to `(file, line)`.
    ///
    /// The match is the statement entry with the greatest address not
    /// exceeding `addr`. Returns `None` if `addr` precedes every statement
    /// entry.
    pub fn line_for_address(&self, addr: u16) -> Option<(&str, u32)> {
        let entry = self
            .lines
            .iter()
            .filter(|e| e.flags.contains(LineFlags::STATEMENT) && e.address <= addr)
            .last()?;
        let source = self.sources.iter().find(|s| s.id == entry.file_id)?;
        Some((&source.path, entry.line))
    }

    /// Map a source line to an address.
    ///
    /// Returns the first statement entry for `file` whose line number is
    /// greater than or equal to `line`, so a line with no code resolves to
    /// the following statement.
    pub fn address_for_line(&self, file: &str, line: u32) -> Option<u16> {
        let source_id = self
            .sources
            .iter()
            .find(|s| s.path == file || s.path.ends_with(file))
            .map(|s| s.id)?;

        self.lines
            .iter()
            .filter(|e| {
                e.file_id == source_id
                    && e.flags.contains(LineFlags::STATEMENT)
                    && e.line >= line
            })
            .min_by_key(|e| e.line)
            .map(|e| e.address)
    }

    /// Find the label at or preceding `addr`.
    ///
    /// With `exact_only`, only an exact address match succeeds. Otherwise
    /// the nearest preceding label is returned together with the positive
    /// offset of `addr` from it. The kind filter applies only when the
    /// format distinguishes code/data labels.
    pub fn symbol_at(
        &self,
        addr: u16,
        kind: LabelKind,
        exact_only: bool,
    ) -> Option<(&str, u16)> {
        let mut candidates = self
            .labels
            .iter()
            .filter(|l| !self.distinguishes_kind || l.kind == Some(kind));

        if exact_only {
            candidates
                .find(|l| l.address == addr)
                .map(|l| (l.name.as_str(), 0))
        } else {
            candidates
                .filter(|l| l.address <= addr)
                .last()
                .map(|l| (l.name.as_str(), addr - l.address))
        }
    }

    /// Resolve a label name to its address. Linear scan.
    pub fn address_for_symbol(&self, name: &str) -> Option<u16> {
        self.labels.iter().find(|l| l.name == name).map(|l| l.address)
    }
}

/// Accumulates records and produces a sorted [`SymbolTable`].
#[derive(Debug, Default)]
pub struct SymbolTableBuilder {
    sources: Vec<SourceFile>,
    lines: Vec<LineEntry>,
    labels: Vec<LabelEntry>,
}

impl SymbolTableBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source file and return its ID.
    pub fn add_source(&mut self, path: impl Into<String>) -> u32 {
        let id = self.sources.len() as u32;
        self.sources.push(SourceFile {
            id,
            path: path.into(),
        });
        id
    }

    /// Add a line entry.
    pub fn add_line(&mut self, file_id: u32, line: u32, address: u16, flags: LineFlags) {
        self.lines.push(LineEntry {
            file_id,
            line,
            address,
            flags,
        });
    }

    /// Add a label entry.
    pub fn add_label(&mut self, name: impl Into<String>, address: u16, kind: Option<LabelKind>) {
        self.labels.push(LabelEntry {
            name: name.into(),
            address,
            kind,
        });
    }

    /// Sort entries by address and build the table.
    ///
    /// The table distinguishes code/data labels only when every label
    /// carries a kind.
    pub fn build(mut self) -> SymbolTable {
        self.lines.sort_by_key(|e| e.address);
        self.labels.sort_by_key(|l| l.address);
        let distinguishes_kind =
            !self.labels.is_empty() && self.labels.iter().all(|l| l.kind.is_some());
        SymbolTable {
            sources: self.sources,
            lines: self.lines,
            labels: self.labels,
            distinguishes_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One source, statements at 0x8000 (line 10), 0x8003 (line 12),
    /// 0x8007 (line 15), plus a non-statement record at 0x8005.
    fn make_table() -> SymbolTable {
        let mut b = SymbolTableBuilder::new();
        let f = b.add_source("game.asm");
        b.add_line(f, 10, 0x8000, LineFlags::STATEMENT);
        b.add_line(f, 12, 0x8003, LineFlags::STATEMENT);
        b.add_line(f, 13, 0x8005, LineFlags::CONTINUATION);
        b.add_line(f, 15, 0x8007, LineFlags::STATEMENT);
        b.add_label("start", 0x8000, Some(LabelKind::Code));
        b.add_label("loop", 0x8003, Some(LabelKind::Code));
        b.add_label("score", 0x9000, Some(LabelKind::Data));
        b.build()
    }

    #[test]
    fn test_line_for_address_exact() {
        let table = make_table();
        assert_eq!(table.line_for_address(0x8000), Some(("game.asm", 10)));
        assert_eq!(table.line_for_address(0x8003), Some(("game.asm", 12)));
    }

    #[test]
    fn test_line_for_address_between_entries() {
        let table = make_table();
        // 0x8001 falls inside the instruction starting at 0x8000
        assert_eq!(table.line_for_address(0x8001), Some(("game.asm", 10)));
        // 0x8005 has only a continuation record; the statement at 0x8003 wins
        assert_eq!(table.line_for_address(0x8005), Some(("game.asm", 12)));
    }

    #[test]
    fn test_line_for_address_before_all_statements() {
        let table = make_table();
        assert_eq!(table.line_for_address(0x7FFF), None);
    }

    #[test]
    fn test_line_for_address_past_end() {
        let table = make_table();
        // Past the last statement still maps to it
        assert_eq!(table.line_for_address(0xFFFF), Some(("game.asm", 15)));
    }

    #[test]
    fn test_address_for_line_exact() {
        let table = make_table();
        assert_eq!(table.address_for_line("game.asm", 12), Some(0x8003));
    }

    #[test]
    fn test_address_for_line_no_code_on_line() {
        let table = make_table();
        // Line 11 has no statement; the following statement (line 12) wins
        assert_eq!(table.address_for_line("game.asm", 11), Some(0x8003));
        // Line 13 is a continuation record, not a statement
        assert_eq!(table.address_for_line("game.asm", 13), Some(0x8007));
    }

    #[test]
    fn test_address_for_line_past_last_statement() {
        let table = make_table();
        assert_eq!(table.address_for_line("game.asm", 16), None);
    }

    #[test]
    fn test_address_for_line_suffix_match() {
        let table = make_table();
        assert_eq!(table.address_for_line("asm", 10), Some(0x8000));
    }

    #[test]
    fn test_address_for_line_unknown_file() {
        let table = make_table();
        assert_eq!(table.address_for_line("other.asm", 10), None);
    }

    #[test]
    fn test_round_trip_line_address() {
        // address_for_line then line_for_address yields a line >= requested
        let table = make_table();
        for requested in [10u32, 11, 12, 14, 15] {
            let addr = table.address_for_line("game.asm", requested).unwrap();
            let (file, line) = table.line_for_address(addr).unwrap();
            assert_eq!(file, "game.asm");
            assert!(line >= requested);
        }
        // Idempotent on exact hits
        let addr = table.address_for_line("game.asm", 12).unwrap();
        assert_eq!(table.line_for_address(addr), Some(("game.asm", 12)));
    }

    #[test]
    fn test_symbol_at_exact() {
        let table = make_table();
        assert_eq!(
            table.symbol_at(0x8003, LabelKind::Code, true),
            Some(("loop", 0))
        );
    }

    #[test]
    fn test_symbol_at_exact_only_misses_between_labels() {
        let table = make_table();
        // Strictly between "loop" (0x8003) and "score" (0x9000)
        for addr in [0x8004u16, 0x8100, 0x8FFF] {
            assert_eq!(table.symbol_at(addr, LabelKind::Code, true), None);
        }
    }

    #[test]
    fn test_symbol_at_nearest_preceding_with_offset() {
        let table = make_table();
        let (name, off) = table.symbol_at(0x8004, LabelKind::Code, false).unwrap();
        assert_eq!(name, "loop");
        assert_eq!(off, 1);

        // Offset strictly increases with distance
        let mut last = 0;
        for addr in [0x8004u16, 0x8010, 0x8100] {
            let (name, off) = table.symbol_at(addr, LabelKind::Code, false).unwrap();
            assert_eq!(name, "loop");
            assert!(off > last || addr == 0x8004);
            last = off;
        }
    }

    #[test]
    fn test_symbol_at_kind_filter_honored() {
        let table = make_table();
        assert!(table.distinguishes_kind());
        // "score" is a data label; a code query at its address skips it and
        // falls back to the preceding code label
        let (name, off) = table.symbol_at(0x9000, LabelKind::Code, false).unwrap();
        assert_eq!(name, "loop");
        assert_eq!(off, 0x9000 - 0x8003);
        assert_eq!(
            table.symbol_at(0x9000, LabelKind::Data, true),
            Some(("score", 0))
        );
    }

    #[test]
    fn test_symbol_at_kind_ignored_without_distinction() {
        let mut b = SymbolTableBuilder::new();
        b.add_label("anon", 0x4000, None);
        let table = b.build();
        assert!(!table.distinguishes_kind());
        // First structural match regardless of kind
        assert_eq!(
            table.symbol_at(0x4000, LabelKind::Code, true),
            Some(("anon", 0))
        );
        assert_eq!(
            table.symbol_at(0x4000, LabelKind::Data, true),
            Some(("anon", 0))
        );
    }

    #[test]
    fn test_symbol_at_before_all_labels() {
        let table = make_table();
        assert_eq!(table.symbol_at(0x7FFF, LabelKind::Code, false), None);
    }

    #[test]
    fn test_address_for_symbol() {
        let table = make_table();
        assert_eq!(table.address_for_symbol("start"), Some(0x8000));
        assert_eq!(table.address_for_symbol("score"), Some(0x9000));
        assert_eq!(table.address_for_symbol("missing"), None);
    }

    #[test]
    fn test_builder_sorts_entries() {
        let mut b = SymbolTableBuilder::new();
        let f = b.add_source("a.asm");
        b.add_line(f, 3, 0x8020, LineFlags::STATEMENT);
        b.add_line(f, 1, 0x8000, LineFlags::STATEMENT);
        b.add_label("late", 0xC000, Some(LabelKind::Code));
        b.add_label("early", 0x8000, Some(LabelKind::Code));
        let table = b.build();

        assert_eq!(table.line_for_address(0x8010), Some(("a.asm", 1)));
        let (name, _) = table.symbol_at(0x8001, LabelKind::Code, false).unwrap();
        assert_eq!(name, "early");
    }

    #[test]
    fn test_empty_table() {
        let table = SymbolTableBuilder::new().build();
        assert_eq!(table.line_for_address(0), None);
        assert_eq!(table.address_for_line("a.asm", 1), None);
        assert_eq!(table.symbol_at(0, LabelKind::Code, false), None);
        assert_eq!(table.address_for_symbol("x"), None);
        assert!(!table.distinguishes_kind());
    }
}
