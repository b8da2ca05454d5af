use serde::{Deserialize, Serialize};

use crate::coff::MachineTypes;
use crate::error::{Error, Result};
use crate::import::ImportLibraryBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallingConvention {
    Stdcall,
    Cdecl,
}

/// One entry of the JSON manifest. An empty `name` means the import binds by
/// ordinal; otherwise by name with `ord` as the hint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportSymbol {
    pub cconv: CallingConvention,
    pub name: String,
    pub ord: u16,
    pub thunk: String,
    pub pubname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportManifest {
    pub dllname: String,
    pub arch: u32,
    pub symbols: Vec<ImportSymbol>,
}

impl ImportManifest {
    pub fn from_json(text: &str) -> Result<ImportManifest> {
        serde_json::from_str(text).map_err(|e| Error::BadInput(format!("invalid manifest: {e}")))
    }

    pub fn machine(&self) -> Result<MachineTypes> {
        match self.arch {
            32 => Ok(MachineTypes::I386),
            64 => Ok(MachineTypes::AMD64),
            other => Err(Error::BadInput(format!("unsupported arch {other}"))),
        }
    }

    /// Runs the whole build: descriptor members, one thunk member per symbol,
    /// null thunk, layout. The DLL name doubles as the member name.
    pub fn build_library(&self) -> Result<ImportLibraryBuilder> {
        let machine = self.machine()?;
        let mut builder = ImportLibraryBuilder::new(&self.dllname, &self.dllname, machine)?;
        for symbol in &self.symbols {
            if symbol.name.is_empty() {
                builder.add_import_by_ordinal(&symbol.pubname, &symbol.thunk, symbol.ord)?;
            } else {
                builder.add_import_by_name_with_hint(
                    &symbol.pubname,
                    &symbol.thunk,
                    &symbol.name,
                    symbol.ord,
                )?;
            }
        }
        builder.build()?;
        Ok(builder)
    }
}
