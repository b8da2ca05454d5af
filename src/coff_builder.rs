use std::io::{self, Write};

use crate::coff::{MachineTypes, StorageClass};
use crate::error::{Error, Result};
use crate::section::{SectionBuilder, SECTION_HEADER_SIZE};
use crate::string_table::StringTable;
use crate::symbol_table::SymbolTable;

pub(crate) const FILE_HEADER_SIZE: u32 = 20;

/// Composes sections, the symbol table and the string table into one COFF
/// object image.
///
/// Correct call order is `append_section`* then `add_symbol`/`add_aux`* then
/// `push_relocs` exactly once, then `data_len`/`write_to`.
#[derive(Debug)]
pub struct CoffBuilder {
    machine: MachineTypes,
    sections: Vec<SectionBuilder>,
    symbols: SymbolTable,
    strings: StringTable,
    relocs_pushed: bool,
}

impl CoffBuilder {
    pub fn new(machine: MachineTypes) -> CoffBuilder {
        CoffBuilder {
            machine,
            sections: Vec::new(),
            symbols: SymbolTable::new(),
            strings: StringTable::new(),
            relocs_pushed: false,
        }
    }

    pub fn machine(&self) -> MachineTypes {
        self.machine
    }

    /// Takes ownership of `section` and returns its 1-based index.
    pub fn append_section(&mut self, mut section: SectionBuilder) -> u16 {
        let index = self.sections.len() as u16 + 1;
        section.set_index(index);
        self.sections.push(section);
        index
    }

    /// Appends one symbol record. `section_number` is 0 for externals, -1 for
    /// absolute, -2 for debug, else the 1-based section index.
    pub fn add_symbol(
        &mut self,
        section_number: i16,
        value: u32,
        name: &str,
        class: StorageClass,
        aux_count: u8,
    ) -> u32 {
        self.symbols
            .add_symbol(&mut self.strings, section_number, value, name, class, aux_count)
    }

    pub fn add_aux(&mut self, record: &[u8; 18]) -> u32 {
        self.symbols.add_aux(record)
    }

    /// Resolves every section's pending relocations against the symbols added
    /// so far. Must be called exactly once, after the last symbol.
    pub fn push_relocs(&mut self) -> Result<()> {
        if self.relocs_pushed {
            return Err(Error::BadInput(
                "relocations were already resolved".to_string(),
            ));
        }
        self.relocs_pushed = true;
        let machine = self.machine;
        for section in &mut self.sections {
            section.push_relocs(&self.symbols, machine)?;
        }
        Ok(())
    }

    fn symbol_table_offset(&self) -> u32 {
        let mut offset = FILE_HEADER_SIZE + SECTION_HEADER_SIZE * self.sections.len() as u32;
        for section in &self.sections {
            offset += section.data_len() + section.relocs_len();
        }
        offset
    }

    pub fn data_len(&self) -> u32 {
        self.symbol_table_offset() + self.symbols.data_len() + self.strings.data_len()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&u16::from(self.machine).to_le_bytes())?;
        w.write_all(&(self.sections.len() as u16).to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // TimeDateStamp
        w.write_all(&self.symbol_table_offset().to_le_bytes())?;
        w.write_all(&self.symbols.num_slots().to_le_bytes())?;
        w.write_all(&0u16.to_le_bytes())?; // SizeOfOptionalHeader
        w.write_all(&self.machine.file_characteristics().to_le_bytes())?;

        let mut raw_offset = FILE_HEADER_SIZE + SECTION_HEADER_SIZE * self.sections.len() as u32;
        for section in &self.sections {
            section.write_header(w, raw_offset)?;
            raw_offset += section.data_len() + section.relocs_len();
        }
        for section in &self.sections {
            section.write_data(w)?;
            section.write_relocs(w)?;
        }
        self.symbols.write_to(w)?;
        self.strings.write_to(w)
    }

    /// Externally visible defined symbols, for the archive linker members.
    pub fn public_symbol_names(&self) -> Vec<&str> {
        self.symbols.public_symbol_names()
    }
}
