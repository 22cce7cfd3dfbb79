//! # Symbols
//!
//! Everything the engine knows about what an address *is*: the resolver
//! abstraction over dynamic-symbol lookup, the frame validator built on it,
//! the fixed system/application classification, and demangling for output.
//!
//! None of this is DWARF-based. Names come from the dynamic symbol table
//! (or from an unwinding library), which is all that is reliably available
//! inside a signal handler.

pub mod classify;
pub mod demangle;
pub mod resolver;

pub use classify::{in_project, is_system_file, is_system_method};
pub use demangle::{write_demangled, SymbolLanguage};
pub use resolver::{is_plausible_return_address, SymbolInfo, SymbolResolver};
