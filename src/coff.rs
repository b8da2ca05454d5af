// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

use std::ops::{BitOr, BitOrAssign};

use object::pe;

use crate::error::{Error, Result};

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u16)]
#[allow(clippy::upper_case_acronyms)]
pub enum MachineTypes {
    I386 = pe::IMAGE_FILE_MACHINE_I386,
    AMD64 = pe::IMAGE_FILE_MACHINE_AMD64,
    IA64 = pe::IMAGE_FILE_MACHINE_IA64,
}

impl From<MachineTypes> for u16 {
    fn from(val: MachineTypes) -> Self {
        val as u16
    }
}

impl MachineTypes {
    pub fn is_64_bit(self) -> bool {
        self != MachineTypes::I386
    }

    /// Import thunk pointer width: 4 on x86, 8 otherwise.
    pub fn ptr_size(self) -> usize {
        if self.is_64_bit() {
            8
        } else {
            4
        }
    }

    pub(crate) fn file_characteristics(self) -> u16 {
        match self {
            MachineTypes::I386 => pe::IMAGE_FILE_32BIT_MACHINE,
            MachineTypes::AMD64 | MachineTypes::IA64 => 0,
        }
    }
}

/// Builder-level section attributes, translated to the PE characteristics
/// bitmap by [SectionFlags::to_raw].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionFlags(u32);

impl SectionFlags {
    pub const NONE: SectionFlags = SectionFlags(0);
    pub const READ: SectionFlags = SectionFlags(1);
    pub const WRITE: SectionFlags = SectionFlags(2);
    pub const EXEC: SectionFlags = SectionFlags(4);
    pub const CODE: SectionFlags = SectionFlags(8);
    pub const ALIGN1: SectionFlags = SectionFlags(16);
    pub const ALIGN2: SectionFlags = SectionFlags(32);
    pub const ALIGN4: SectionFlags = SectionFlags(64);
    pub const ALIGN8: SectionFlags = SectionFlags(128);
    pub const ALIGN16: SectionFlags = SectionFlags(256);
    pub const ALIGN32: SectionFlags = SectionFlags(512);
    pub const ALIGN64: SectionFlags = SectionFlags(1024);
    pub const UNINIT: SectionFlags = SectionFlags(2048);
    pub const COMDAT: SectionFlags = SectionFlags(4096);

    pub fn contains(self, other: SectionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Translates into the `IMAGE_SCN_*` bit pattern of the section header.
    pub fn to_raw(self) -> u32 {
        let mut raw = 0;
        for (flag, scn) in [
            (SectionFlags::READ, pe::IMAGE_SCN_MEM_READ),
            (SectionFlags::WRITE, pe::IMAGE_SCN_MEM_WRITE),
            (SectionFlags::EXEC, pe::IMAGE_SCN_MEM_EXECUTE),
            (SectionFlags::CODE, pe::IMAGE_SCN_CNT_CODE),
            (SectionFlags::ALIGN1, pe::IMAGE_SCN_ALIGN_1BYTES),
            (SectionFlags::ALIGN2, pe::IMAGE_SCN_ALIGN_2BYTES),
            (SectionFlags::ALIGN4, pe::IMAGE_SCN_ALIGN_4BYTES),
            (SectionFlags::ALIGN8, pe::IMAGE_SCN_ALIGN_8BYTES),
            (SectionFlags::ALIGN16, pe::IMAGE_SCN_ALIGN_16BYTES),
            (SectionFlags::ALIGN32, pe::IMAGE_SCN_ALIGN_32BYTES),
            (SectionFlags::ALIGN64, pe::IMAGE_SCN_ALIGN_64BYTES),
            (SectionFlags::UNINIT, pe::IMAGE_SCN_CNT_UNINITIALIZED_DATA),
            (SectionFlags::COMDAT, pe::IMAGE_SCN_LNK_COMDAT),
        ] {
            if self.contains(flag) {
                raw |= scn;
            }
        }
        raw
    }
}

impl BitOr for SectionFlags {
    type Output = SectionFlags;

    fn bitor(self, rhs: SectionFlags) -> SectionFlags {
        SectionFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SectionFlags {
    fn bitor_assign(&mut self, rhs: SectionFlags) {
        self.0 |= rhs.0;
    }
}

/// Storage class of a symbol-table record, carrying the implied type field.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum StorageClass {
    Extern,
    Static,
    /// A section symbol; the caller is expected to follow it with an aux
    /// record from [crate::SectionBuilder::create_aux_symbol].
    Section,
    Function,
    StaticFunction,
}

impl StorageClass {
    pub(crate) fn sym_class(self) -> u8 {
        match self {
            StorageClass::Extern | StorageClass::Function => pe::IMAGE_SYM_CLASS_EXTERNAL,
            StorageClass::Static | StorageClass::Section | StorageClass::StaticFunction => {
                pe::IMAGE_SYM_CLASS_STATIC
            }
        }
    }

    pub(crate) fn sym_type(self) -> u16 {
        match self {
            StorageClass::Function | StorageClass::StaticFunction => {
                pe::IMAGE_SYM_DTYPE_FUNCTION << pe::IMAGE_SYM_DTYPE_SHIFT
            }
            _ => pe::IMAGE_SYM_TYPE_NULL,
        }
    }
}

/// COMDAT selection policy recorded in a section's aux symbol.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum ComdatSelection {
    NoDuplicates = 1,
    Any = 2,
    SameSize = 3,
    ExactMatch = 4,
    Associative = 5,
    Largest = 6,
}

/// Width of a pending relocation. Translation into the machine-specific
/// relocation type constants follows Microsoft's tables.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum RelocKind {
    /// 32-bit absolute virtual address.
    Abs32,
    /// 64-bit absolute virtual address.
    Abs64,
    /// 32-bit image-relative address.
    Rva,
    /// 32-bit PC-relative displacement, used by the x64 `jmp [rip+disp32]`
    /// thunk.
    Rel32,
}

impl RelocKind {
    pub fn raw_type(self, machine: MachineTypes) -> Result<u16> {
        match machine {
            MachineTypes::I386 => match self {
                RelocKind::Abs32 => Ok(pe::IMAGE_REL_I386_DIR32),
                RelocKind::Rva => Ok(pe::IMAGE_REL_I386_DIR32NB),
                RelocKind::Rel32 => Ok(pe::IMAGE_REL_I386_REL32),
                RelocKind::Abs64 => Err(Error::BadInput(
                    "64-bit absolute relocation is not representable on x86".to_string(),
                )),
            },
            MachineTypes::AMD64 => match self {
                RelocKind::Abs32 => Ok(pe::IMAGE_REL_AMD64_ADDR32),
                RelocKind::Abs64 => Ok(pe::IMAGE_REL_AMD64_ADDR64),
                RelocKind::Rva => Ok(pe::IMAGE_REL_AMD64_ADDR32NB),
                RelocKind::Rel32 => Ok(pe::IMAGE_REL_AMD64_REL32),
            },
            MachineTypes::IA64 => Err(Error::BadInput(
                "relocations are not implemented for IA64".to_string(),
            )),
        }
    }
}
