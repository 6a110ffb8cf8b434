//! Per-module symbol tables for the simulated Z80 target.
//!
//! A [`SymbolTable`] is the queryable result of parsing one module's symbol
//! file. Parsing itself lives outside this crate; callers feed already-split
//! records into a [`SymbolTableBuilder`] and query the built table for
//! address/line/name resolution in both directions.
//!
//! The main types are:
//! - [`SymbolTable`] - Bidirectional address/line/name lookup for one module
//! - [`SymbolTableBuilder`] - Accumulates entries and produces a sorted table
//! - [`LineEntry`] / [`LabelEntry`] - The two record shapes a table holds

pub mod table;
pub mod types;

pub use table::{SymbolTable, SymbolTableBuilder};
pub use types::{LabelEntry, LabelKind, LineEntry, LineFlags, SourceFile};
