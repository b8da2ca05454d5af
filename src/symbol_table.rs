use std::io::{self, Write};

use object::pe;

use crate::coff::StorageClass;
use crate::string_table::StringTable;

/// Symbol records and aux records both occupy one 18-byte slot.
pub(crate) const SYMBOL_SIZE: u32 = 18;

#[derive(Debug)]
struct Symbol {
    name: String,
    /// Inline name, or `{0, string-table offset}` for names over 8 bytes.
    name_field: [u8; 8],
    value: u32,
    /// 0 external, -1 absolute, -2 debug, else the 1-based section index.
    section_number: i16,
    typ: u16,
    storage_class: u8,
    number_of_aux: u8,
}

#[derive(Debug)]
enum Record {
    Symbol(Symbol),
    Aux([u8; 18]),
}

/// Ordered symbol table. Aux records are opaque 18-byte blobs supplied by
/// their producers and copied on ingest.
#[derive(Debug, Default)]
pub struct SymbolTable {
    records: Vec<Record>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Appends one primary record and returns its slot index. The caller is
    /// expected to follow up with `aux_count` calls to [SymbolTable::add_aux];
    /// aux slots do not get their own public index.
    ///
    /// Names over 8 bytes are interned in `strings` for the duration of this
    /// call.
    pub fn add_symbol(
        &mut self,
        strings: &mut StringTable,
        section_number: i16,
        value: u32,
        name: &str,
        class: StorageClass,
        aux_count: u8,
    ) -> u32 {
        let index = self.num_slots();
        let mut name_field = [0u8; 8];
        if name.len() <= 8 {
            name_field[..name.len()].copy_from_slice(name.as_bytes());
        } else {
            name_field[4..].copy_from_slice(&strings.append(name).to_le_bytes());
        }
        self.records.push(Record::Symbol(Symbol {
            name: name.to_string(),
            name_field,
            value,
            section_number,
            typ: class.sym_type(),
            storage_class: class.sym_class(),
            number_of_aux: aux_count,
        }));
        index
    }

    /// Copies an 18-byte aux record into the next slot.
    pub fn add_aux(&mut self, record: &[u8; 18]) -> u32 {
        let index = self.num_slots();
        self.records.push(Record::Aux(*record));
        index
    }

    /// Slot count, aux records included. This is what the file header's
    /// `NumberOfSymbols` reports.
    pub fn num_slots(&self) -> u32 {
        self.records.len() as u32
    }

    /// Resolves `name` to a slot index; the most recently added match wins.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.records.iter().enumerate().rev().find_map(|(i, r)| match r {
            Record::Symbol(sym) if sym.name == name => Some(i as u32),
            _ => None,
        })
    }

    /// Externally visible defined symbols, in insertion order. This feeds the
    /// archive linker members; undefined references don't qualify.
    pub fn public_symbol_names(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter_map(|r| match r {
                Record::Symbol(sym)
                    if sym.storage_class == pe::IMAGE_SYM_CLASS_EXTERNAL
                        && sym.section_number > 0 =>
                {
                    Some(sym.name.as_str())
                }
                _ => None,
            })
            .collect()
    }

    pub fn data_len(&self) -> u32 {
        self.num_slots() * SYMBOL_SIZE
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for record in &self.records {
            match record {
                Record::Symbol(sym) => {
                    w.write_all(&sym.name_field)?;
                    w.write_all(&sym.value.to_le_bytes())?;
                    w.write_all(&sym.section_number.to_le_bytes())?;
                    w.write_all(&sym.typ.to_le_bytes())?;
                    w.write_all(&[sym.storage_class, sym.number_of_aux])?;
                }
                Record::Aux(data) => w.write_all(data)?,
            }
        }
        Ok(())
    }
}
