use implib_writer::{
    CoffBuilder, MachineTypes, RelocKind, RelocatableVar, SectionBuilder, SectionFlags,
    StorageClass, StringTable, SymbolTable,
};
use object::pe;
use pretty_assertions::assert_eq;

mod common;

#[test]
fn string_table_prefix_matches_length() {
    let mut strings = StringTable::new();
    assert_eq!(strings.append("hello"), 4);
    assert_eq!(strings.append("x"), 10);
    assert_eq!(strings.get(4), Some("hello"));
    assert_eq!(strings.get(10), Some("x"));
    assert_eq!(strings.data_len(), 12);

    let mut out = Vec::new();
    strings.write_to(&mut out).unwrap();
    assert_eq!(out.len() as u32, strings.data_len());
    assert_eq!(u32::from_le_bytes(out[..4].try_into().unwrap()), 12);
}

#[test]
fn symbol_index_counts_aux_slots() {
    let mut strings = StringTable::new();
    let mut symbols = SymbolTable::new();
    assert_eq!(
        symbols.add_symbol(&mut strings, 1, 0, ".text", StorageClass::Section, 1),
        0
    );
    assert_eq!(symbols.add_aux(&[0u8; 18]), 1);
    assert_eq!(
        symbols.add_symbol(&mut strings, 0, 0, "ext", StorageClass::Extern, 0),
        2
    );
    assert_eq!(symbols.num_slots(), 3);
    assert_eq!(symbols.data_len(), 54);
}

#[test]
fn symbol_lookup_prefers_latest_match() {
    let mut strings = StringTable::new();
    let mut symbols = SymbolTable::new();
    symbols.add_symbol(&mut strings, 1, 0, "dup", StorageClass::Static, 0);
    symbols.add_symbol(&mut strings, 2, 0, "dup", StorageClass::Static, 0);
    assert_eq!(symbols.index_of("dup"), Some(1));
    assert_eq!(symbols.index_of("missing"), None);
}

#[test]
fn long_symbol_names_go_through_the_string_table() {
    let mut coff = CoffBuilder::new(MachineTypes::I386);
    let mut text = SectionBuilder::new(
        ".text",
        SectionFlags::READ | SectionFlags::EXEC | SectionFlags::CODE,
    )
    .unwrap();
    text.append_data(&[0xc3], vec![]);
    let index = coff.append_section(text);
    coff.add_symbol(
        index as i16,
        0,
        "a_name_well_past_eight_bytes",
        StorageClass::Function,
        0,
    );
    coff.push_relocs().unwrap();

    let bytes = common::coff_bytes(&coff);
    assert_eq!(
        common::symbol_names(&bytes),
        vec!["a_name_well_past_eight_bytes".to_string()]
    );
}

/// One `.text` section of six bytes, one relocation against an external, one
/// static section symbol: the canonical smallest thunk-shaped object.
#[test]
fn sleep_thunk_object_layout() {
    let mut coff = CoffBuilder::new(MachineTypes::I386);
    let mut text = SectionBuilder::new(
        ".text",
        SectionFlags::READ | SectionFlags::EXEC | SectionFlags::CODE,
    )
    .unwrap();
    text.append_data(
        &[0xff, 0x25, 0x00, 0x00, 0x00, 0x00],
        vec![RelocatableVar::new("__imp__Sleep@4", 2, RelocKind::Abs32)],
    );
    let index = coff.append_section(text);
    coff.add_symbol(index as i16, 0, ".text", StorageClass::Static, 0);
    coff.add_symbol(0, 0, "__imp__Sleep@4", StorageClass::Extern, 0);
    coff.push_relocs().unwrap();

    let bytes = common::coff_bytes(&coff);
    assert_eq!(bytes.len(), 20 + 40 + 6 + 10 + 2 * 18 + 4 + "__imp__Sleep@4".len() + 1);
    // PointerToSymbolTable sits right behind the raw data and relocations.
    assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 76);
    // NumberOfSymbols includes both records.
    assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 2);
}

#[test]
fn produced_object_round_trips_through_object_crate() {
    let mut coff = CoffBuilder::new(MachineTypes::I386);
    let mut text = SectionBuilder::new(
        ".text",
        SectionFlags::READ | SectionFlags::EXEC | SectionFlags::CODE,
    )
    .unwrap();
    text.append_data(
        &[0xff, 0x25, 0x00, 0x00, 0x00, 0x00],
        vec![RelocatableVar::new("__imp__Sleep@4", 2, RelocKind::Abs32)],
    );
    let index = coff.append_section(text);
    coff.add_symbol(index as i16, 0, ".text", StorageClass::Static, 0);
    coff.add_symbol(0, 0, "__imp__Sleep@4", StorageClass::Extern, 0);
    coff.push_relocs().unwrap();

    let bytes = common::coff_bytes(&coff);
    assert_eq!(common::section_names(&bytes), vec![".text".to_string()]);
    assert_eq!(
        common::symbol_names(&bytes),
        vec![".text".to_string(), "__imp__Sleep@4".to_string()]
    );
    assert_eq!(
        common::section_relocations(&bytes, ".text"),
        vec![(2, pe::IMAGE_REL_I386_DIR32, "__imp__Sleep@4".to_string())]
    );
}

#[test]
fn push_relocs_twice_fails_fast() {
    let mut coff = CoffBuilder::new(MachineTypes::AMD64);
    coff.push_relocs().unwrap();
    assert!(coff.push_relocs().is_err());
}

#[test]
fn unresolved_relocation_symbol_is_an_error() {
    let mut coff = CoffBuilder::new(MachineTypes::I386);
    let mut text = SectionBuilder::new(".text", SectionFlags::READ | SectionFlags::CODE).unwrap();
    text.append_data(
        &[0x00; 4],
        vec![RelocatableVar::new("nowhere", 0, RelocKind::Abs32)],
    );
    coff.append_section(text);
    assert!(coff.push_relocs().is_err());
}

#[test]
fn section_name_over_eight_bytes_is_rejected() {
    assert!(SectionBuilder::new(".a_long_name", SectionFlags::READ).is_err());
}
