// We are writing very specific, well defined formats, so it makes it easier to
// see exactly what is being written if we explicitly write out `\n` instead of
// hoping somebody notices the `writeln!` instead of `write!`.
#![allow(clippy::write_with_newline)]

mod alignment;
mod archive;
mod coff;
mod coff_builder;
mod error;
mod implib_fix;
mod import;
mod manifest;
mod pe_export;
mod section;
mod string_table;
mod symbol_table;

pub use archive::{LibraryBuilder, MAX_MEMBER_NAME_LEN};
pub use coff::{ComdatSelection, MachineTypes, RelocKind, SectionFlags, StorageClass};
pub use coff_builder::CoffBuilder;
pub use error::{Error, Result};
pub use implib_fix::rename_implib_objects;
pub use import::{ImpSectionBuilder, ImportLibraryBuilder};
pub use manifest::{CallingConvention, ImportManifest, ImportSymbol};
pub use pe_export::{read_exports, write_manifest, DllExport, DllExports};
pub use section::{RelocatableVar, SectionBuilder};
pub use string_table::StringTable;
pub use symbol_table::SymbolTable;
