use std::io::{self, Write};

use crate::coff::{ComdatSelection, MachineTypes, RelocKind, SectionFlags};
use crate::error::{Error, Result};
use crate::symbol_table::SymbolTable;

pub(crate) const SECTION_HEADER_SIZE: u32 = 40;
pub(crate) const RELOCATION_SIZE: u32 = 10;

/// One pending relocation: the site is `offset` bytes into the owning
/// section's raw data, the target is looked up by symbol name when the
/// section's relocations are pushed to the symbol table.
#[derive(Debug, Clone)]
pub struct RelocatableVar {
    symbol: String,
    offset: u32,
    kind: RelocKind,
}

impl RelocatableVar {
    pub fn new(symbol: impl Into<String>, offset: u32, kind: RelocKind) -> RelocatableVar {
        RelocatableVar {
            symbol: symbol.into(),
            offset,
            kind,
        }
    }

    /// Shifts the stored site offset; used when raw blocks are concatenated.
    pub fn shift(&mut self, delta: u32) {
        self.offset += delta;
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn kind(&self) -> RelocKind {
        self.kind
    }
}

/// A resolved relocation table entry.
#[derive(Debug, Clone, Copy)]
struct CoffRelocation {
    virtual_address: u32,
    symbol_table_index: u32,
    typ: u16,
}

/// One section of a COFF object under construction: name, characteristics,
/// raw bytes, and the relocations it owns.
#[derive(Debug)]
pub struct SectionBuilder {
    name: String,
    flags: SectionFlags,
    data: Vec<u8>,
    pending: Vec<RelocatableVar>,
    resolved: Vec<CoffRelocation>,
    /// 1-based, assigned when the section is appended to a builder.
    index: u16,
}

impl SectionBuilder {
    pub fn new(name: &str, flags: SectionFlags) -> Result<SectionBuilder> {
        if name.len() > 8 {
            return Err(Error::BadName(name.to_string()));
        }
        Ok(SectionBuilder {
            name: name.to_string(),
            flags,
            data: Vec::new(),
            pending: Vec::new(),
            resolved: Vec::new(),
            index: 0,
        })
    }

    /// Section names are stored inline only; 8 bytes is a hard cap.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if name.len() > 8 {
            return Err(Error::BadName(name.to_string()));
        }
        self.name = name.to_string();
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_flags(&mut self, flags: SectionFlags) {
        self.flags = flags;
    }

    pub fn flags(&self) -> SectionFlags {
        self.flags
    }

    pub fn flags_raw(&self) -> u32 {
        self.flags.to_raw()
    }

    /// Concatenates `bytes` onto the raw buffer and takes ownership of the
    /// relocations, shifting each site by the pre-append length.
    pub fn append_data(&mut self, bytes: &[u8], relocs: Vec<RelocatableVar>) {
        let base = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        for mut reloc in relocs {
            reloc.shift(base);
            self.pending.push(reloc);
        }
    }

    pub fn data_len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn relocs_len(&self) -> u32 {
        self.num_relocs() * RELOCATION_SIZE
    }

    fn num_relocs(&self) -> u32 {
        (self.pending.len() + self.resolved.len()) as u32
    }

    pub(crate) fn set_index(&mut self, index: u16) {
        self.index = index;
    }

    /// 1-based position in the owning object's section vector; 0 before the
    /// section has been appended.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Resolves every pending relocation against `symbols` (most recently
    /// added match wins) and freezes the relocation table.
    pub(crate) fn push_relocs(
        &mut self,
        symbols: &SymbolTable,
        machine: MachineTypes,
    ) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for reloc in pending {
            let symbol_table_index = symbols.index_of(reloc.symbol()).ok_or_else(|| {
                Error::BadInput(format!(
                    "relocation in {} against unknown symbol `{}`",
                    self.name,
                    reloc.symbol()
                ))
            })?;
            self.resolved.push(CoffRelocation {
                virtual_address: reloc.offset(),
                symbol_table_index,
                typ: reloc.kind().raw_type(machine)?,
            });
        }
        Ok(())
    }

    /// Writes the 40-byte section header. `raw_offset` is the file offset the
    /// section's raw data will land at; the relocation table follows the data
    /// directly.
    pub(crate) fn write_header<W: Write>(&self, w: &mut W, raw_offset: u32) -> io::Result<()> {
        let mut name = [0u8; 8];
        name[..self.name.len()].copy_from_slice(self.name.as_bytes());
        w.write_all(&name)?;
        w.write_all(&0u32.to_le_bytes())?; // VirtualSize
        w.write_all(&0u32.to_le_bytes())?; // VirtualAddress
        w.write_all(&self.data_len().to_le_bytes())?;
        let data_ptr = if self.data.is_empty() { 0 } else { raw_offset };
        w.write_all(&data_ptr.to_le_bytes())?;
        let reloc_ptr = if self.resolved.is_empty() {
            0
        } else {
            raw_offset + self.data_len()
        };
        w.write_all(&reloc_ptr.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // PointerToLinenumbers
        // The count field is 16-bit; larger tables saturate rather than use
        // the overflow encoding.
        let num_relocs = u16::try_from(self.num_relocs()).unwrap_or(u16::MAX);
        w.write_all(&num_relocs.to_le_bytes())?;
        w.write_all(&0u16.to_le_bytes())?; // NumberOfLinenumbers
        w.write_all(&self.flags_raw().to_le_bytes())
    }

    pub(crate) fn write_data<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.data)
    }

    pub(crate) fn write_relocs<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for reloc in &self.resolved {
            w.write_all(&reloc.virtual_address.to_le_bytes())?;
            w.write_all(&reloc.symbol_table_index.to_le_bytes())?;
            w.write_all(&reloc.typ.to_le_bytes())?;
        }
        Ok(())
    }

    /// Builds the 18-byte COMDAT aux record for this section's symbol. No
    /// checksum is generated.
    pub fn create_aux_symbol(
        &self,
        associated: Option<&SectionBuilder>,
        selection: ComdatSelection,
    ) -> [u8; 18] {
        let mut aux = [0u8; 18];
        aux[..4].copy_from_slice(&self.data_len().to_le_bytes());
        let num_relocs = u16::try_from(self.num_relocs()).unwrap_or(u16::MAX);
        aux[4..6].copy_from_slice(&num_relocs.to_le_bytes());
        // NumberOfLinenumbers and CheckSum stay zero.
        let number = associated.map_or(0, |section| section.index());
        aux[12..14].copy_from_slice(&number.to_le_bytes());
        aux[14] = selection as u8;
        aux
    }
}
