use std::io::Write;

use object::pe;

use crate::archive::LibraryBuilder;
use crate::coff::{ComdatSelection, MachineTypes, RelocKind, SectionFlags, StorageClass};
use crate::coff_builder::CoffBuilder;
use crate::error::{Error, Result};
use crate::section::{RelocatableVar, SectionBuilder};

const IMPORT_DESCRIPTOR_PREFIX: &str = "__IMPORT_DESCRIPTOR_";
const NULL_IMPORT_DESCRIPTOR_SYMBOL_NAME: &str = "__NULL_IMPORT_DESCRIPTOR";
const NULL_THUNK_DATA_PREFIX: &str = "\x7f";
const NULL_THUNK_DATA_SUFFIX: &str = "_NULL_THUNK_DATA";

/// The indirect-jump stub; the four displacement bytes are filled by a
/// relocation against the `__imp_` pointer.
const JMP_INDIRECT: [u8; 6] = [0xff, 0x25, 0x00, 0x00, 0x00, 0x00];

/// "kernel32.dll" -> "kernel32", the spelling used inside the descriptor and
/// null-thunk symbol names.
fn dll_stem(dll_name: &str) -> &str {
    dll_name
        .rsplit_once('.')
        .map_or(dll_name, |(stem, _)| stem)
}

fn text_flags() -> SectionFlags {
    SectionFlags::READ | SectionFlags::EXEC | SectionFlags::CODE | SectionFlags::ALIGN2
}

/// Factory of the pre-shaped COFF objects an import library is made of. Each
/// `build_*` call fills one `CoffBuilder` with the complete member, symbols
/// and relocations resolved.
#[derive(Debug, Clone, Copy)]
pub struct ImpSectionBuilder {
    machine: MachineTypes,
}

impl ImpSectionBuilder {
    pub fn new(machine: MachineTypes) -> Result<ImpSectionBuilder> {
        match machine {
            MachineTypes::I386 | MachineTypes::AMD64 => Ok(ImpSectionBuilder { machine }),
            MachineTypes::IA64 => Err(Error::BadInput(
                "import sections are not implemented for IA64".to_string(),
            )),
        }
    }

    pub fn x86() -> ImpSectionBuilder {
        ImpSectionBuilder {
            machine: MachineTypes::I386,
        }
    }

    pub fn x64() -> ImpSectionBuilder {
        ImpSectionBuilder {
            machine: MachineTypes::AMD64,
        }
    }

    pub fn machine(&self) -> MachineTypes {
        self.machine
    }

    fn idata_flags(&self) -> SectionFlags {
        let align = if self.machine.is_64_bit() {
            SectionFlags::ALIGN8
        } else {
            SectionFlags::ALIGN4
        };
        SectionFlags::READ | SectionFlags::WRITE | align | SectionFlags::COMDAT
    }

    fn name_flags(&self) -> SectionFlags {
        SectionFlags::READ | SectionFlags::WRITE | SectionFlags::ALIGN2 | SectionFlags::COMDAT
    }

    fn zero_ptr(&self) -> Vec<u8> {
        vec![0u8; self.machine.ptr_size()]
    }

    fn ordinal_ptr(&self, ordinal: u16) -> Vec<u8> {
        if self.machine.is_64_bit() {
            (u64::from(ordinal) | pe::IMAGE_ORDINAL_FLAG64)
                .to_le_bytes()
                .to_vec()
        } else {
            (u32::from(ordinal) | pe::IMAGE_ORDINAL_FLAG32)
                .to_le_bytes()
                .to_vec()
        }
    }

    /// Appends a finished `.idata$*` section along with its section symbol
    /// and SELECTANY COMDAT aux record.
    fn append_idata(&self, coff: &mut CoffBuilder, section: SectionBuilder) -> u16 {
        let name = section.name().to_string();
        let aux = section.create_aux_symbol(None, ComdatSelection::Any);
        let index = coff.append_section(section);
        coff.add_symbol(index as i16, 0, &name, StorageClass::Section, 1);
        coff.add_aux(&aux);
        index
    }

    /// `.idata$2` import directory entry plus the `.idata$6` DLL name string.
    pub fn build_import_descriptor(&self, dll_name: &str, coff: &mut CoffBuilder) -> Result<()> {
        let mut directory = SectionBuilder::new(".idata$2", self.idata_flags())?;
        directory.append_data(
            &[0u8; 20],
            vec![
                RelocatableVar::new(".idata$4", 0, RelocKind::Rva),
                RelocatableVar::new(".idata$6", 12, RelocKind::Rva),
                RelocatableVar::new(".idata$5", 16, RelocKind::Rva),
            ],
        );

        let mut name_entry = dll_name.as_bytes().to_vec();
        name_entry.push(0);
        if name_entry.len() % 2 != 0 {
            name_entry.push(0);
        }
        let mut dll_name_section = SectionBuilder::new(".idata$6", self.name_flags())?;
        dll_name_section.append_data(&name_entry, vec![]);

        let descriptor = format!("{IMPORT_DESCRIPTOR_PREFIX}{}", dll_stem(dll_name));
        let directory_index = self.append_idata(coff, directory);
        coff.add_symbol(directory_index as i16, 0, &descriptor, StorageClass::Extern, 0);
        self.append_idata(coff, dll_name_section);
        // The lookup table and address table heads live in other members of
        // the library; reference them by section name.
        coff.add_symbol(0, 0, ".idata$4", StorageClass::Static, 0);
        coff.add_symbol(0, 0, ".idata$5", StorageClass::Static, 0);
        coff.push_relocs()
    }

    /// `.idata$3` all-zero terminator for the import directory table.
    pub fn build_null_descriptor(&self, coff: &mut CoffBuilder) -> Result<()> {
        let mut terminator = SectionBuilder::new(".idata$3", self.idata_flags())?;
        terminator.append_data(&[0u8; 20], vec![]);
        let index = self.append_idata(coff, terminator);
        coff.add_symbol(
            index as i16,
            0,
            NULL_IMPORT_DESCRIPTOR_SYMBOL_NAME,
            StorageClass::Extern,
            0,
        );
        coff.push_relocs()
    }

    /// One by-name import: stub thunk, lookup and address table entries, and
    /// the `{hint, name}` entry they point at. An empty `func_name` skips the
    /// stub.
    pub fn build_import_by_name_thunk(
        &self,
        _dll_name: &str,
        imp_name: &str,
        func_name: &str,
        export_name: &str,
        hint: u16,
        coff: &mut CoffBuilder,
    ) -> Result<()> {
        let text_index = if func_name.is_empty() {
            None
        } else {
            let mut text = SectionBuilder::new(".text", text_flags())?;
            let kind = if self.machine.is_64_bit() {
                RelocKind::Rel32
            } else {
                RelocKind::Abs32
            };
            text.append_data(&JMP_INDIRECT, vec![RelocatableVar::new(imp_name, 2, kind)]);
            Some(coff.append_section(text))
        };

        let mut lookup = SectionBuilder::new(".idata$4", self.idata_flags())?;
        lookup.append_data(
            &self.zero_ptr(),
            vec![RelocatableVar::new(".idata$6", 0, RelocKind::Rva)],
        );
        let mut address = SectionBuilder::new(".idata$5", self.idata_flags())?;
        address.append_data(
            &self.zero_ptr(),
            vec![RelocatableVar::new(".idata$6", 0, RelocKind::Rva)],
        );

        let mut hint_name = hint.to_le_bytes().to_vec();
        hint_name.extend_from_slice(export_name.as_bytes());
        hint_name.push(0);
        if hint_name.len() % 2 != 0 {
            hint_name.push(0);
        }
        let mut entry = SectionBuilder::new(".idata$6", self.name_flags())?;
        entry.append_data(&hint_name, vec![]);

        self.append_idata(coff, lookup);
        let address_index = self.append_idata(coff, address);
        self.append_idata(coff, entry);

        if let Some(text_index) = text_index {
            coff.add_symbol(text_index as i16, 0, func_name, StorageClass::Function, 0);
        }
        coff.add_symbol(address_index as i16, 0, imp_name, StorageClass::Extern, 0);
        coff.push_relocs()
    }

    /// One by-ordinal import: the table entries carry the ordinal with the
    /// high bit of the pointer set, and there is no name entry.
    pub fn build_import_by_ordinal_thunk(
        &self,
        _dll_name: &str,
        imp_name: &str,
        func_name: &str,
        ordinal: u16,
        coff: &mut CoffBuilder,
    ) -> Result<()> {
        let text_index = if func_name.is_empty() {
            None
        } else {
            let mut text = SectionBuilder::new(".text", text_flags())?;
            let kind = if self.machine.is_64_bit() {
                RelocKind::Rel32
            } else {
                RelocKind::Abs32
            };
            text.append_data(&JMP_INDIRECT, vec![RelocatableVar::new(imp_name, 2, kind)]);
            Some(coff.append_section(text))
        };

        let entry = self.ordinal_ptr(ordinal);
        let mut lookup = SectionBuilder::new(".idata$4", self.idata_flags())?;
        lookup.append_data(&entry, vec![]);
        let mut address = SectionBuilder::new(".idata$5", self.idata_flags())?;
        address.append_data(&entry, vec![]);

        self.append_idata(coff, lookup);
        let address_index = self.append_idata(coff, address);

        if let Some(text_index) = text_index {
            coff.add_symbol(text_index as i16, 0, func_name, StorageClass::Function, 0);
        }
        coff.add_symbol(address_index as i16, 0, imp_name, StorageClass::Extern, 0);
        coff.push_relocs()
    }

    /// By-name import with the hint taken from `ordinal`.
    pub fn build_import_thunk(
        &self,
        dll_name: &str,
        imp_name: &str,
        func_name: &str,
        export_name: &str,
        ordinal: u16,
        coff: &mut CoffBuilder,
    ) -> Result<()> {
        self.build_import_by_name_thunk(dll_name, imp_name, func_name, export_name, ordinal, coff)
    }

    /// Zero entries terminating the lookup and address tables.
    pub fn build_null_thunk(&self, dll_name: &str, coff: &mut CoffBuilder) -> Result<()> {
        let mut lookup = SectionBuilder::new(".idata$4", self.idata_flags())?;
        lookup.append_data(&self.zero_ptr(), vec![]);
        let mut address = SectionBuilder::new(".idata$5", self.idata_flags())?;
        address.append_data(&self.zero_ptr(), vec![]);

        self.append_idata(coff, lookup);
        let address_index = self.append_idata(coff, address);
        let null_thunk = format!(
            "{NULL_THUNK_DATA_PREFIX}{}{NULL_THUNK_DATA_SUFFIX}",
            dll_stem(dll_name)
        );
        coff.add_symbol(address_index as i16, 0, &null_thunk, StorageClass::Extern, 0);
        coff.push_relocs()
    }
}

/// High-level driver: descriptor and null descriptor up front, one thunk
/// member per import, null thunk on `build`.
pub struct ImportLibraryBuilder {
    dll_name: String,
    member_name: String,
    sections: ImpSectionBuilder,
    lib: LibraryBuilder,
    built: bool,
}

impl ImportLibraryBuilder {
    pub fn new(
        dll_name: &str,
        member_name: &str,
        machine: MachineTypes,
    ) -> Result<ImportLibraryBuilder> {
        let sections = ImpSectionBuilder::new(machine)?;
        let mut lib = LibraryBuilder::new();

        let mut descriptor = CoffBuilder::new(machine);
        sections.build_import_descriptor(dll_name, &mut descriptor)?;
        lib.add_object(member_name, descriptor)?;

        let mut null_descriptor = CoffBuilder::new(machine);
        sections.build_null_descriptor(&mut null_descriptor)?;
        lib.add_object(member_name, null_descriptor)?;

        Ok(ImportLibraryBuilder {
            dll_name: dll_name.to_string(),
            member_name: member_name.to_string(),
            sections,
            lib,
            built: false,
        })
    }

    pub fn add_import_by_name(
        &mut self,
        imp_name: &str,
        func_name: &str,
        export_name: &str,
    ) -> Result<()> {
        self.add_import_by_name_with_hint(imp_name, func_name, export_name, 0)
    }

    pub fn add_import_by_name_with_hint(
        &mut self,
        imp_name: &str,
        func_name: &str,
        export_name: &str,
        hint: u16,
    ) -> Result<()> {
        let mut member = CoffBuilder::new(self.sections.machine());
        self.sections.build_import_thunk(
            &self.dll_name,
            imp_name,
            func_name,
            export_name,
            hint,
            &mut member,
        )?;
        self.lib.add_object(&self.member_name, member)
    }

    pub fn add_import_by_ordinal(
        &mut self,
        imp_name: &str,
        func_name: &str,
        ordinal: u16,
    ) -> Result<()> {
        let mut member = CoffBuilder::new(self.sections.machine());
        self.sections.build_import_by_ordinal_thunk(
            &self.dll_name,
            imp_name,
            func_name,
            ordinal,
            &mut member,
        )?;
        self.lib.add_object(&self.member_name, member)
    }

    /// Appends the null thunk member and lays the archive out. Call after the
    /// last import has been added.
    pub fn build(&mut self) -> Result<()> {
        if self.built {
            return Err(Error::BadInput("import library already built".to_string()));
        }
        self.built = true;
        let mut null_thunk = CoffBuilder::new(self.sections.machine());
        self.sections.build_null_thunk(&self.dll_name, &mut null_thunk)?;
        self.lib.add_object(&self.member_name, null_thunk)?;
        self.lib.fill_offsets()?;
        tracing::debug!(dll = %self.dll_name, size = self.lib.data_len(), "import library built");
        Ok(())
    }

    pub fn data_len(&self) -> u64 {
        self.lib.data_len()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        self.lib.write_to(w)
    }
}
