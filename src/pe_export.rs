use std::io::{self, Write};

use object::pe;

use crate::error::{Error, Result};

/// Export names longer than this are truncated, matching the classic
/// dump-tool buffer bound.
const MAX_EXPORT_NAME_LEN: usize = 77;
const MAX_FORWARDER_LEN: usize = 512;

/// One exported symbol. `name` is absent for exports reachable only by
/// ordinal; `forwarder` carries the target string when the export forwards
/// into another DLL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DllExport {
    pub name: Option<String>,
    /// Biased ordinal (`OrdinalBase` already added).
    pub ordinal: u32,
    pub forwarder: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DllExports {
    pub machine: u16,
    pub is_64: bool,
    pub ordinal_base: u32,
    pub exports: Vec<DllExport>,
}

/// `{VirtualAddress, VirtualSize, FileOffset}` record of one section, for
/// RVA translation.
#[derive(Debug, Clone, Copy)]
struct SectionRange {
    virtual_address: u32,
    virtual_size: u32,
    file_offset: u32,
}

fn u16_at(image: &[u8], offset: usize) -> Result<u16> {
    image
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(Error::PeParse("unexpected end of image"))
}

fn u32_at(image: &[u8], offset: usize) -> Result<u32> {
    image
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(Error::PeParse("unexpected end of image"))
}

fn rva_to_offset(sections: &[SectionRange], rva: u32) -> Option<u32> {
    sections
        .iter()
        .find(|s| rva >= s.virtual_address && rva <= s.virtual_address + s.virtual_size)
        .map(|s| rva - s.virtual_address + s.file_offset)
}

/// Reads a null-terminated string, truncating at `max` bytes.
fn cstr_at(image: &[u8], offset: usize, max: usize) -> Result<String> {
    let bytes = image
        .get(offset..)
        .ok_or(Error::PeParse("string outside image"))?;
    let bytes = &bytes[..bytes.len().min(max)];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// Walks a PE32/PE32+ image and returns its export directory contents.
pub fn read_exports(image: &[u8]) -> Result<DllExports> {
    if u16_at(image, 0)? != pe::IMAGE_DOS_SIGNATURE {
        return Err(Error::PeParse("missing MZ signature"));
    }
    let e_lfanew = u32_at(image, 0x3c)? as usize;
    if u32_at(image, e_lfanew)? != pe::IMAGE_NT_SIGNATURE {
        return Err(Error::PeParse("missing PE signature"));
    }
    let machine = u16_at(image, e_lfanew + 4)?;
    let num_sections = usize::from(u16_at(image, e_lfanew + 6)?);
    let size_of_optional = usize::from(u16_at(image, e_lfanew + 20)?);

    let opt = e_lfanew + 24;
    let is_64 = match u16_at(image, opt)? {
        pe::IMAGE_NT_OPTIONAL_HDR32_MAGIC => false,
        pe::IMAGE_NT_OPTIONAL_HDR64_MAGIC => true,
        _ => return Err(Error::PeParse("bad optional header magic")),
    };

    // DataDirectory[IMAGE_DIRECTORY_ENTRY_EXPORT].
    let dir_offset = if is_64 { 0x70 } else { 0x60 };
    if size_of_optional < dir_offset + 8 {
        return Err(Error::NoExports);
    }
    let export_rva = u32_at(image, opt + dir_offset)?;
    let export_size = u32_at(image, opt + dir_offset + 4)?;
    if export_rva == 0 || export_size == 0 {
        return Err(Error::NoExports);
    }

    let mut sections = Vec::with_capacity(num_sections);
    let section_table = opt + size_of_optional;
    for i in 0..num_sections {
        let header = section_table + i * 40;
        sections.push(SectionRange {
            virtual_size: u32_at(image, header + 8)?,
            virtual_address: u32_at(image, header + 12)?,
            file_offset: u32_at(image, header + 20)?,
        });
    }

    let dir = rva_to_offset(&sections, export_rva)
        .ok_or(Error::PeParse("export directory outside any section"))? as usize;
    let ordinal_base = u32_at(image, dir + 16)?;
    let number_of_functions = u32_at(image, dir + 20)?;
    let number_of_names = u32_at(image, dir + 24)?;
    let functions_rva = u32_at(image, dir + 28)?;
    let names_rva = u32_at(image, dir + 32)?;
    let ordinals_rva = u32_at(image, dir + 36)?;
    if number_of_functions == 0 || number_of_names == 0 {
        return Err(Error::NoExports);
    }
    let functions = rva_to_offset(&sections, functions_rva)
        .ok_or(Error::NoExports)? as usize;
    let names = rva_to_offset(&sections, names_rva).ok_or(Error::NoExports)? as usize;
    let ordinals = rva_to_offset(&sections, ordinals_rva).ok_or(Error::NoExports)? as usize;

    let mut exports = Vec::with_capacity(number_of_names as usize);
    for i in 0..number_of_names as usize {
        let name_rva = u32_at(image, names + i * 4)?;
        let name = if name_rva != 0 {
            let offset = rva_to_offset(&sections, name_rva)
                .ok_or(Error::PeParse("export name outside any section"))?;
            Some(cstr_at(image, offset as usize, MAX_EXPORT_NAME_LEN)?)
        } else {
            None
        };

        let ordinal_index = u32::from(u16_at(image, ordinals + i * 2)?);
        if ordinal_index >= number_of_functions {
            return Err(Error::PeParse("export ordinal out of range"));
        }
        // A function RVA pointing back into the export directory marks a
        // forwarder; the "address" is really a target string.
        let function_rva = u32_at(image, functions + ordinal_index as usize * 4)?;
        let forwarder = if function_rva >= export_rva && function_rva < export_rva + export_size {
            let offset = rva_to_offset(&sections, function_rva)
                .ok_or(Error::PeParse("forwarder string outside any section"))?;
            Some(cstr_at(image, offset as usize, MAX_FORWARDER_LEN)?)
        } else {
            None
        };

        exports.push(DllExport {
            name,
            ordinal: ordinal_base + ordinal_index,
            forwarder,
        });
    }

    tracing::debug!(count = exports.len(), ordinal_base, "parsed export directory");
    Ok(DllExports {
        machine,
        is_64,
        ordinal_base,
        exports,
    })
}

/// Writes the textual manifest consumed by the import-library tooling:
/// an `include` header, one `implib` record per export, `endlib` at the end.
/// `compact` suppresses the comment lines.
pub fn write_manifest<W: Write>(
    w: &mut W,
    dll_file: &str,
    dll_stem: &str,
    exports: &DllExports,
    compact: bool,
) -> io::Result<()> {
    write!(
        w,
        "include 'implib{}.inc'\n\n",
        if exports.is_64 { "64" } else { "" }
    )?;
    for export in &exports.exports {
        let display = match &export.name {
            Some(name) => name.clone(),
            None => format!("ord.{}", export.ordinal),
        };
        if !compact {
            write!(w, "; {}.{} ord.{}\n", dll_stem, display, export.ordinal)?;
            if let Some(forwarder) = &export.forwarder {
                let forwarder = if forwarder.is_empty() { "..." } else { forwarder };
                write!(w, "; -> {}\n", forwarder)?;
            }
        }
        write!(w, "implib {}, {}\n", dll_file, display)?;
    }
    write!(w, "\nendlib\n")
}
