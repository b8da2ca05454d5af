#![allow(dead_code)]

use object::{Object, ObjectSection, ObjectSymbol};

use implib_writer::{CoffBuilder, LibraryBuilder};

/// Serialises a COFF builder and checks the reported length on the way.
pub fn coff_bytes(coff: &CoffBuilder) -> Vec<u8> {
    let mut out = Vec::new();
    coff.write_to(&mut out).unwrap();
    assert_eq!(out.len() as u32, coff.data_len());
    out
}

pub fn lib_bytes(lib: &LibraryBuilder) -> Vec<u8> {
    let mut out = Vec::new();
    lib.write_to(&mut out).unwrap();
    assert_eq!(out.len() as u64, lib.data_len());
    out
}

/// One raw archive member, as found by walking the 60-byte headers.
pub struct RawMember {
    pub header_offset: usize,
    /// Name field with trailing spaces stripped (keeps the `/` terminator).
    pub name: String,
    pub data: Vec<u8>,
}

pub fn walk_members(archive: &[u8]) -> Vec<RawMember> {
    assert_eq!(&archive[..8], b"!<arch>\n");
    let mut members = Vec::new();
    let mut pos = 8;
    while pos + 60 <= archive.len() {
        let header = &archive[pos..pos + 60];
        assert_eq!(&header[58..60], b"`\n", "header end marker at {pos}");
        let name = std::str::from_utf8(&header[..16])
            .unwrap()
            .trim_end()
            .to_string();
        let size: usize = std::str::from_utf8(&header[48..58])
            .unwrap()
            .trim_end()
            .parse()
            .unwrap();
        members.push(RawMember {
            header_offset: pos,
            name,
            data: archive[pos + 60..pos + 60 + size].to_vec(),
        });
        if size % 2 != 0 {
            assert_eq!(archive[pos + 60 + size], b'\n', "pad byte at {pos}");
        }
        pos += 60 + size + size % 2;
    }
    members
}

/// First linker member contents: per-symbol member offsets and the name blob,
/// both in the member's own (sorted) order.
pub fn read_first_linker_member(archive: &[u8]) -> (Vec<u32>, Vec<String>) {
    let members = walk_members(archive);
    let data = &members[0].data;
    assert_eq!(members[0].name, "/");
    let count = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
    let offsets = (0..count)
        .map(|i| u32::from_be_bytes(data[4 + i * 4..8 + i * 4].try_into().unwrap()))
        .collect();
    let names = split_names(&data[4 + count * 4..], count);
    (offsets, names)
}

/// Second linker member contents: member offsets in insertion order, 1-based
/// member index per symbol, and the sorted name blob.
pub fn read_second_linker_member(archive: &[u8]) -> (Vec<u32>, Vec<u16>, Vec<String>) {
    let members = walk_members(archive);
    let data = &members[1].data;
    assert_eq!(members[1].name, "/");
    let num_members = u32::from_le_bytes(data[..4].try_into().unwrap()) as usize;
    let offsets: Vec<u32> = (0..num_members)
        .map(|i| u32::from_le_bytes(data[4 + i * 4..8 + i * 4].try_into().unwrap()))
        .collect();
    let pos = 4 + num_members * 4;
    let num_syms = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
    let pos = pos + 4;
    let indices = (0..num_syms)
        .map(|i| u16::from_le_bytes(data[pos + i * 2..pos + i * 2 + 2].try_into().unwrap()))
        .collect();
    let names = split_names(&data[pos + num_syms * 2..], num_syms);
    (offsets, indices, names)
}

fn split_names(blob: &[u8], count: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(count);
    let mut rest = blob;
    for _ in 0..count {
        let end = rest.iter().position(|&b| b == 0).unwrap();
        names.push(String::from_utf8(rest[..end].to_vec()).unwrap());
        rest = &rest[end + 1..];
    }
    names
}

pub fn section_names(data: &[u8]) -> Vec<String> {
    let file = object::File::parse(data).unwrap();
    file.sections()
        .map(|s| s.name().unwrap().to_string())
        .collect()
}

pub fn symbol_names(data: &[u8]) -> Vec<String> {
    let file = object::File::parse(data).unwrap();
    file.symbols()
        .map(|s| s.name().unwrap().to_string())
        .collect()
}

pub fn section_data(data: &[u8], name: &str) -> Vec<u8> {
    let file = object::File::parse(data).unwrap();
    let section = file
        .sections()
        .find(|s| s.name().map_or(false, |n| n == name))
        .unwrap_or_else(|| panic!("no section {name}"));
    section.data().unwrap().to_vec()
}

/// `(offset, coff type, target symbol name)` triples of one section.
pub fn section_relocations(data: &[u8], name: &str) -> Vec<(u64, u16, String)> {
    let file = object::File::parse(data).unwrap();
    let section = file
        .sections()
        .find(|s| s.name().map_or(false, |n| n == name))
        .unwrap_or_else(|| panic!("no section {name}"));
    section
        .relocations()
        .map(|(offset, reloc)| {
            let typ = match reloc.flags() {
                object::RelocationFlags::Coff { typ } => typ,
                other => panic!("unexpected relocation flags {other:?}"),
            };
            let target = match reloc.target() {
                object::RelocationTarget::Symbol(index) => file
                    .symbol_by_index(index)
                    .unwrap()
                    .name()
                    .unwrap()
                    .to_string(),
                other => panic!("unexpected relocation target {other:?}"),
            };
            (offset, typ, target)
        })
        .collect()
}
