use implib_writer::{read_exports, write_manifest, DllExport, Error};
use pretty_assertions::assert_eq;

fn put16(image: &mut [u8], offset: usize, value: u16) {
    image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Builds a minimal PE image with one `.edata` section at RVA 0x1000 (file
/// offset 0x200) exporting: a named function, a forwarder, and a nameless
/// by-ordinal entry. Ordinal base 5.
fn build_pe(is_64: bool) -> Vec<u8> {
    let opt_size: usize = if is_64 { 0xf0 } else { 0xe0 };
    let e_lfanew = 0x40;
    let opt = e_lfanew + 24;
    let section_header = opt + opt_size;

    let mut image = vec![0u8; 0x400];
    image[0] = b'M';
    image[1] = b'Z';
    put32(&mut image, 0x3c, e_lfanew as u32);
    image[e_lfanew..e_lfanew + 4].copy_from_slice(b"PE\0\0");
    put16(&mut image, e_lfanew + 4, if is_64 { 0x8664 } else { 0x14c });
    put16(&mut image, e_lfanew + 6, 1); // NumberOfSections
    put16(&mut image, e_lfanew + 20, opt_size as u16);
    put16(&mut image, opt, if is_64 { 0x20b } else { 0x10b });
    let dir = opt + if is_64 { 0x70 } else { 0x60 };
    put32(&mut image, dir, 0x1000); // export directory RVA
    put32(&mut image, dir + 4, 0x200); // export directory size

    image[section_header..section_header + 6].copy_from_slice(b".edata");
    put32(&mut image, section_header + 8, 0x200); // VirtualSize
    put32(&mut image, section_header + 12, 0x1000); // VirtualAddress
    put32(&mut image, section_header + 16, 0x200); // SizeOfRawData
    put32(&mut image, section_header + 20, 0x200); // PointerToRawData

    let base = 0x200;
    put32(&mut image, base + 16, 5); // OrdinalBase
    put32(&mut image, base + 20, 3); // NumberOfFunctions
    put32(&mut image, base + 24, 3); // NumberOfNames
    put32(&mut image, base + 28, 0x1028); // AddressOfFunctions
    put32(&mut image, base + 32, 0x1034); // AddressOfNames
    put32(&mut image, base + 36, 0x1040); // AddressOfNameOrdinals

    // Function RVAs; the middle one points back into the export directory,
    // marking a forwarder.
    put32(&mut image, 0x228, 0x2000);
    put32(&mut image, 0x22c, 0x1056);
    put32(&mut image, 0x230, 0x2004);
    // Name RVAs; the last entry is nameless.
    put32(&mut image, 0x234, 0x1046);
    put32(&mut image, 0x238, 0x1052);
    put32(&mut image, 0x23c, 0);
    // Name ordinals (unbiased).
    put16(&mut image, 0x240, 0);
    put16(&mut image, 0x242, 1);
    put16(&mut image, 0x244, 2);
    image[0x246..0x252].copy_from_slice(b"ExitProcess\0");
    image[0x252..0x256].copy_from_slice(b"Fwd\0");
    image[0x256..0x261].copy_from_slice(b"OTHER.Impl\0");
    image
}

fn expected_exports() -> Vec<DllExport> {
    vec![
        DllExport {
            name: Some("ExitProcess".to_string()),
            ordinal: 5,
            forwarder: None,
        },
        DllExport {
            name: Some("Fwd".to_string()),
            ordinal: 6,
            forwarder: Some("OTHER.Impl".to_string()),
        },
        DllExport {
            name: None,
            ordinal: 7,
            forwarder: None,
        },
    ]
}

#[test]
fn reads_pe32_exports() {
    let image = build_pe(false);
    let exports = read_exports(&image).unwrap();
    assert!(!exports.is_64);
    assert_eq!(exports.machine, 0x14c);
    assert_eq!(exports.ordinal_base, 5);
    assert_eq!(exports.exports, expected_exports());
}

#[test]
fn reads_pe32_plus_exports() {
    let image = build_pe(true);
    let exports = read_exports(&image).unwrap();
    assert!(exports.is_64);
    assert_eq!(exports.machine, 0x8664);
    assert_eq!(exports.exports, expected_exports());
}

#[test]
fn missing_export_directory_is_no_exports() {
    let mut image = build_pe(false);
    let dir = 0x40 + 24 + 0x60;
    put32(&mut image, dir, 0);
    put32(&mut image, dir + 4, 0);
    assert!(matches!(read_exports(&image), Err(Error::NoExports)));
}

#[test]
fn truncated_image_is_a_parse_error() {
    let image = build_pe(false);
    assert!(matches!(read_exports(&image[..0x30]), Err(Error::PeParse(_))));
}

#[test]
fn garbage_is_a_parse_error() {
    assert!(matches!(read_exports(b"not a dll"), Err(Error::PeParse(_))));
}

#[test]
fn manifest_text_format() {
    let image = build_pe(false);
    let exports = read_exports(&image).unwrap();

    let mut out = Vec::new();
    write_manifest(&mut out, "mylib.dll", "mylib", &exports, false).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "include 'implib.inc'\n\
         \n\
         ; mylib.ExitProcess ord.5\n\
         implib mylib.dll, ExitProcess\n\
         ; mylib.Fwd ord.6\n\
         ; -> OTHER.Impl\n\
         implib mylib.dll, Fwd\n\
         ; mylib.ord.7 ord.7\n\
         implib mylib.dll, ord.7\n\
         \n\
         endlib\n"
    );

    let mut out = Vec::new();
    write_manifest(&mut out, "mylib.dll", "mylib", &exports, true).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "include 'implib.inc'\n\
         \n\
         implib mylib.dll, ExitProcess\n\
         implib mylib.dll, Fwd\n\
         implib mylib.dll, ord.7\n\
         \n\
         endlib\n"
    );
}

#[test]
fn manifest_header_marks_64_bit_images() {
    let image = build_pe(true);
    let exports = read_exports(&image).unwrap();
    let mut out = Vec::new();
    write_manifest(&mut out, "mylib.dll", "mylib", &exports, true).unwrap();
    assert!(String::from_utf8(out).unwrap().starts_with("include 'implib64.inc'\n"));
}
