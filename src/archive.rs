// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::alignment::even_pad;
use crate::coff_builder::CoffBuilder;
use crate::error::{Error, Result};

pub(crate) const ARCHIVE_SIGNATURE: &[u8; 8] = b"!<arch>\n";
pub(crate) const MEMBER_HEADER_SIZE: u64 = 60;

/// Member names are stored inline in the 16-byte header field, leaving 15
/// bytes next to the `/` terminator. No longname support.
pub const MAX_MEMBER_NAME_LEN: usize = 15;

/// Size field is 10 decimal digits long
const MAX_MEMBER_SIZE: u64 = 9999999999;

struct Member {
    name: String,
    coff: CoffBuilder,
    /// Absolute file offset of the member's header, filled by `fill_offsets`.
    offset: u64,
}

/// Builds a COFF static library: signature, first and second linker members,
/// an (empty) longnames member, then the object members in insertion order.
#[derive(Default)]
pub struct LibraryBuilder {
    members: Vec<Member>,
    /// Public symbol name -> 1-based member index. The first member defining
    /// a name wins; later duplicates are ignored.
    sym_map: BTreeMap<Box<[u8]>, u16>,
    total_len: u64,
    offsets_filled: bool,
}

fn write_member_header<W: Write>(w: &mut W, name: &str, size: u64) -> io::Result<()> {
    write!(w, "{:<16}", name)?;
    write!(w, "{:<12}{:<6}{:<6}{:<8o}{:<10}`\n", 0, 0, 0, 0, size)
}

impl LibraryBuilder {
    pub fn new() -> LibraryBuilder {
        LibraryBuilder {
            members: Vec::new(),
            sym_map: BTreeMap::new(),
            total_len: 0,
            offsets_filled: false,
        }
    }

    /// Takes ownership of `coff` as the next object member.
    pub fn add_object(&mut self, name: &str, coff: CoffBuilder) -> Result<()> {
        if name.len() > MAX_MEMBER_NAME_LEN {
            return Err(Error::BadName(name.to_string()));
        }
        self.offsets_filled = false;
        self.members.push(Member {
            name: name.to_string(),
            coff,
            offset: 0,
        });
        Ok(())
    }

    fn sym_names_len(&self) -> u64 {
        self.sym_map.keys().map(|name| name.len() as u64 + 1).sum()
    }

    fn first_member_size(&self) -> u64 {
        4 + 4 * self.sym_map.len() as u64 + self.sym_names_len()
    }

    fn second_member_size(&self) -> u64 {
        4 + 4 * self.members.len() as u64 + 4 + 2 * self.sym_map.len() as u64 + self.sym_names_len()
    }

    /// Two-pass layout: enumerate public symbols, then compute the absolute
    /// file offset of every member assuming the three directory members sit
    /// in front. Must run before `data_len`/`write_to`.
    pub fn fill_offsets(&mut self) -> Result<()> {
        self.sym_map.clear();
        for (i, member) in self.members.iter().enumerate() {
            let index = i as u16 + 1;
            for name in member.coff.public_symbol_names() {
                self.sym_map
                    .entry(name.as_bytes().to_vec().into_boxed_slice())
                    .or_insert(index);
            }
        }

        let first_size = self.first_member_size();
        let second_size = self.second_member_size();
        let mut pos = ARCHIVE_SIGNATURE.len() as u64
            + MEMBER_HEADER_SIZE + first_size + even_pad(first_size)
            + MEMBER_HEADER_SIZE + second_size + even_pad(second_size)
            + MEMBER_HEADER_SIZE; // empty longnames member
        for member in &mut self.members {
            member.offset = pos;
            let size = u64::from(member.coff.data_len());
            if size > MAX_MEMBER_SIZE {
                return Err(Error::BadInput(format!(
                    "archive member {} is too big",
                    member.name
                )));
            }
            pos += MEMBER_HEADER_SIZE + size + even_pad(size);
        }
        if pos > u64::from(u32::MAX) {
            return Err(Error::BadInput("archive exceeds 4 GiB".to_string()));
        }
        self.total_len = pos;
        self.offsets_filled = true;
        tracing::debug!(
            members = self.members.len(),
            symbols = self.sym_map.len(),
            total = self.total_len,
            "library layout filled"
        );
        Ok(())
    }

    /// Total archive size. Valid once `fill_offsets` has run.
    pub fn data_len(&self) -> u64 {
        self.total_len
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        if !self.offsets_filled {
            return Err(Error::BadInput(
                "fill_offsets must run before the archive is written".to_string(),
            ));
        }
        w.write_all(ARCHIVE_SIGNATURE)?;

        // First linker member: big-endian symbol count, one member offset per
        // public symbol, then the name blob. The BTreeMap iterates in sorted
        // name order, which is the order all three arrays share.
        let first_size = self.first_member_size();
        write_member_header(w, "/", first_size)?;
        w.write_all(&(self.sym_map.len() as u32).to_be_bytes())?;
        for &index in self.sym_map.values() {
            let offset = self.members[usize::from(index) - 1].offset as u32;
            w.write_all(&offset.to_be_bytes())?;
        }
        for name in self.sym_map.keys() {
            w.write_all(name)?;
            w.write_all(&[0])?;
        }
        if even_pad(first_size) != 0 {
            w.write_all(b"\n")?;
        }

        // Second linker member: everything little-endian; member offsets in
        // insertion order, per-symbol member indices in sorted name order.
        let second_size = self.second_member_size();
        write_member_header(w, "/", second_size)?;
        w.write_all(&(self.members.len() as u32).to_le_bytes())?;
        for member in &self.members {
            w.write_all(&(member.offset as u32).to_le_bytes())?;
        }
        w.write_all(&(self.sym_map.len() as u32).to_le_bytes())?;
        for &index in self.sym_map.values() {
            w.write_all(&index.to_le_bytes())?;
        }
        for name in self.sym_map.keys() {
            w.write_all(name)?;
            w.write_all(&[0])?;
        }
        if even_pad(second_size) != 0 {
            w.write_all(b"\n")?;
        }

        // Longnames member; always present, empty under the 15-byte name cap.
        write_member_header(w, "//", 0)?;

        for member in &self.members {
            let size = u64::from(member.coff.data_len());
            write_member_header(w, &format!("{}/", member.name), size)?;
            member.coff.write_to(w)?;
            if even_pad(size) != 0 {
                w.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}
