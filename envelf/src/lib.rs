// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal ELF64 parser for loading environment images.
//!
//! Reads the ELF header, program headers, and (when present) the section
//! header table, symbol table and string table needed to bind kernel-exported
//! symbols into a freshly loaded image. Does not parse relocations or dynamic
//! linking info — loaded images are always static, position-independent only
//! insofar as the loader copies them to their linked `p_vaddr`.
//!
//! # Usage
//!
//! ```ignore
//! let mut phdrs = [envelf::Elf64Phdr::zeroed(); 8];
//! let elf = envelf::parse_elf(data, &mut phdrs)?;
//! for phdr in elf.program_headers {
//!     if phdr.p_type == envelf::PT_LOAD {
//!         // copy phdr.p_filesz bytes from the file, zero-fill the rest
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]

/// ELF magic bytes: `\x7fELF`.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// ELF class: 64-bit objects.
pub const ELFCLASS64: u8 = 2;

/// ELF data encoding: little-endian.
pub const ELFDATA2LSB: u8 = 1;

/// Program header type: loadable segment.
pub const PT_LOAD: u32 = 1;

/// Segment flag: executable.
pub const PF_X: u32 = 1;
/// Segment flag: writable.
pub const PF_W: u32 = 2;
/// Segment flag: readable.
pub const PF_R: u32 = 4;

/// Section type: symbol table.
pub const SHT_SYMTAB: u32 = 2;
/// Section type: string table.
pub const SHT_STRTAB: u32 = 3;

/// Symbol binding: global.
pub const STB_GLOBAL: u8 = 1;
/// Symbol type: data object.
pub const STT_OBJECT: u8 = 1;

/// Size of the ELF64 header in bytes.
pub const SIZEOF_EHDR: usize = 64;
/// Size of an ELF64 program header entry in bytes.
pub const SIZEOF_PHDR: usize = 56;
/// Size of an ELF64 section header entry in bytes.
pub const SIZEOF_SHDR: usize = 64;
/// Size of an ELF64 symbol table entry in bytes.
pub const SIZEOF_SYM: usize = 24;

/// Errors returned when parsing or loading an ELF binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    /// File is too small to contain the expected structure.
    FileTooSmall,
    /// The ELF magic number is wrong.
    InvalidMagic,
    /// The binary is not 64-bit.
    Not64Bit,
    /// Unsupported endianness (only little-endian is supported).
    UnsupportedEndianness,
    /// Header entry sizes don't match what this parser expects.
    UnexpectedEntrySize(&'static str),
    /// Arithmetic overflow in header size calculations.
    Overflow(&'static str),
    /// A structure extends beyond the end of the file.
    OutOfBounds(&'static str),
    /// A `PT_LOAD` segment's `p_memsz` is smaller than its `p_filesz`.
    SegmentShrinks,
}

/// Minimal ELF64 header — only the fields needed for loading and symbol
/// binding.
#[derive(Debug, Clone, Copy)]
pub struct Elf64Header {
    /// Entry point virtual address.
    pub entry: u64,
    pub phoff: u64,
    pub phentsize: u16,
    pub phnum: u16,
    pub shoff: u64,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

/// Minimal ELF64 program header — only the fields needed for loading.
#[derive(Debug, Clone, Copy, Default)]
pub struct Elf64Phdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
}

impl Elf64Phdr {
    pub fn is_read(&self) -> bool {
        self.p_flags & PF_R != 0
    }
    pub fn is_write(&self) -> bool {
        self.p_flags & PF_W != 0
    }
    pub fn is_executable(&self) -> bool {
        self.p_flags & PF_X != 0
    }
}

/// Minimal ELF64 section header.
#[derive(Debug, Clone, Copy, Default)]
pub struct Elf64Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_entsize: u64,
}

/// A single exported symbol discovered while binding: its name and the
/// virtual address at which the loader should patch in a kernel-provided
/// value.
#[derive(Debug, Clone, Copy)]
pub struct ExportedSymbol<'a> {
    pub name: &'a str,
    pub value_vaddr: u64,
}

/// Result of parsing an ELF64 binary.
pub struct ParsedElf<'a> {
    pub header: Elf64Header,
    /// Only `PT_LOAD` segments are relevant for loading; other segment types
    /// are included too, since callers may want to inspect them.
    pub program_headers: &'a [Elf64Phdr],
    pub data: &'a [u8],
}

#[inline]
fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
fn read_u64_le(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
        data[offset + 4],
        data[offset + 5],
        data[offset + 6],
        data[offset + 7],
    ])
}

fn parse_phdr(data: &[u8]) -> Elf64Phdr {
    Elf64Phdr {
        p_type: read_u32_le(data, 0),
        p_flags: read_u32_le(data, 4),
        p_offset: read_u64_le(data, 8),
        p_vaddr: read_u64_le(data, 16),
        p_filesz: read_u64_le(data, 32),
        p_memsz: read_u64_le(data, 40),
    }
}

fn parse_shdr(data: &[u8]) -> Elf64Shdr {
    Elf64Shdr {
        sh_name: read_u32_le(data, 0),
        sh_type: read_u32_le(data, 4),
        sh_offset: read_u64_le(data, 24),
        sh_size: read_u64_le(data, 32),
        sh_link: read_u32_le(data, 40),
        sh_entsize: read_u64_le(data, 56),
    }
}

fn parse_header(data: &[u8]) -> Result<Elf64Header, ElfError> {
    if data.len() < SIZEOF_EHDR {
        return Err(ElfError::FileTooSmall);
    }
    if data[0..4] != ELF_MAGIC {
        return Err(ElfError::InvalidMagic);
    }
    if data[4] != ELFCLASS64 {
        return Err(ElfError::Not64Bit);
    }
    if data[5] != ELFDATA2LSB {
        return Err(ElfError::UnsupportedEndianness);
    }
    Ok(Elf64Header {
        entry: read_u64_le(data, 24),
        phoff: read_u64_le(data, 32),
        phentsize: read_u16_le(data, 54),
        phnum: read_u16_le(data, 56),
        shoff: read_u64_le(data, 40),
        shentsize: read_u16_le(data, 58),
        shnum: read_u16_le(data, 60),
        shstrndx: read_u16_le(data, 62),
    })
}

fn table_bounds(
    off: u64,
    entsize: usize,
    count: usize,
    data_len: usize,
    what: &'static str,
) -> Result<(usize, usize), ElfError> {
    let size = entsize
        .checked_mul(count)
        .ok_or(ElfError::Overflow(what))?;
    let end = (off as usize).checked_add(size).ok_or(ElfError::Overflow(what))?;
    if end > data_len {
        return Err(ElfError::OutOfBounds(what));
    }
    Ok((off as usize, size))
}

/// Returns the number of program headers declared in the ELF header, for
/// sizing a scratch buffer ahead of [`parse_elf`].
pub fn program_headers_count(data: &[u8]) -> Option<usize> {
    let hdr = parse_header(data).ok()?;
    Some(hdr.phnum as usize)
}

/// Parse an ELF64 binary's header and program header table.
///
/// `buf` must have room for at least `e_phnum` entries; use
/// [`program_headers_count`] to size it.
pub fn parse_elf<'a>(data: &'a [u8], buf: &'a mut [Elf64Phdr]) -> Result<ParsedElf<'a>, ElfError> {
    let header = parse_header(data)?;

    if header.phentsize != 0 && header.phentsize as usize != SIZEOF_PHDR {
        return Err(ElfError::UnexpectedEntrySize("program header"));
    }

    let count = header.phnum as usize;
    let (start, _) = table_bounds(
        header.phoff,
        SIZEOF_PHDR,
        count,
        data.len(),
        "program header table",
    )?;
    if buf.len() < count {
        return Err(ElfError::OutOfBounds("program header scratch buffer"));
    }
    for (i, slot) in buf.iter_mut().take(count).enumerate() {
        let base = start + i * SIZEOF_PHDR;
        *slot = parse_phdr(&data[base..]);
    }

    for phdr in &buf[..count] {
        if phdr.p_type == PT_LOAD && phdr.p_memsz < phdr.p_filesz {
            return Err(ElfError::SegmentShrinks);
        }
    }

    Ok(ParsedElf {
        header,
        program_headers: &buf[..count],
        data,
    })
}

/// Walk the section header table looking for exported symbols the kernel
/// should bind: `STT_OBJECT` symbols with `STB_GLOBAL` binding whose size
/// matches a pointer (4 bytes, since loaded images here are 32-bit address
/// spaces laid over a 64-bit ELF container). Unmatched symbols, and symbols
/// of any other type or binding, are silently skipped — binding only ever
/// patches in values the kernel recognizes by name.
///
/// `f` is called once per candidate symbol with its name and declared
/// virtual address; it returns `true` if the caller consumed (bound) it.
/// This function does no allocation and never collects symbols into a list.
pub fn for_each_global_object<'a>(
    data: &'a [u8],
    mut f: impl FnMut(ExportedSymbol<'a>) -> bool,
) -> Result<usize, ElfError> {
    let header = parse_header(data)?;
    if header.shoff == 0 || header.shnum == 0 {
        return Ok(0);
    }
    if header.shentsize as usize != SIZEOF_SHDR {
        return Err(ElfError::UnexpectedEntrySize("section header"));
    }

    let shnum = header.shnum as usize;
    let (shoff, _) = table_bounds(header.shoff, SIZEOF_SHDR, shnum, data.len(), "section header table")?;

    let mut symtab: Option<Elf64Shdr> = None;
    for i in 0..shnum {
        let sh = parse_shdr(&data[shoff + i * SIZEOF_SHDR..]);
        if sh.sh_type == SHT_SYMTAB {
            symtab = Some(sh);
            break;
        }
    }
    let symtab = match symtab {
        Some(s) => s,
        None => return Ok(0),
    };

    let strtab_idx = symtab.sh_link as usize;
    if strtab_idx >= shnum {
        return Err(ElfError::OutOfBounds("symtab sh_link"));
    }
    let strtab = parse_shdr(&data[shoff + strtab_idx * SIZEOF_SHDR..]);
    if strtab.sh_type != SHT_STRTAB {
        return Err(ElfError::OutOfBounds("symtab string table"));
    }
    let (str_start, str_len) = table_bounds(strtab.sh_offset, 1, strtab.sh_size as usize, data.len(), "string table")?;
    let strtab_bytes = &data[str_start..str_start + str_len];

    if symtab.sh_entsize != 0 && symtab.sh_entsize as usize != SIZEOF_SYM {
        return Err(ElfError::UnexpectedEntrySize("symbol table entry"));
    }
    let sym_count = if symtab.sh_entsize == 0 {
        0
    } else {
        (symtab.sh_size / symtab.sh_entsize) as usize
    };
    let (sym_start, _) = table_bounds(symtab.sh_offset, SIZEOF_SYM, sym_count, data.len(), "symbol table")?;

    let mut bound = 0usize;
    for i in 0..sym_count {
        let base = sym_start + i * SIZEOF_SYM;
        let st_name = read_u32_le(data, base);
        let st_info = data[base + 4];
        let st_size = read_u64_le(data, base + 16);
        let st_value = read_u64_le(data, base + 8);

        let bind = st_info >> 4;
        let ty = st_info & 0xf;
        if bind != STB_GLOBAL || ty != STT_OBJECT || st_size != 4 {
            continue;
        }

        let name = read_c_str(strtab_bytes, st_name as usize).ok_or(ElfError::OutOfBounds("symbol name"))?;
        if f(ExportedSymbol {
            name,
            value_vaddr: st_value,
        }) {
            bound += 1;
        }
    }

    Ok(bound)
}

fn read_c_str(bytes: &[u8], offset: usize) -> Option<&str> {
    if offset >= bytes.len() {
        return None;
    }
    let rest = &bytes[offset..];
    let end = rest.iter().position(|&b| b == 0)?;
    core::str::from_utf8(&rest[..end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le32(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }
    fn le64(v: u64) -> [u8; 8] {
        v.to_le_bytes()
    }

    fn minimal_ehdr(phoff: u64, phnum: u16, shoff: u64, shnum: u16, shstrndx: u16) -> Vec<u8> {
        let mut h = vec![0u8; SIZEOF_EHDR];
        h[0..4].copy_from_slice(&ELF_MAGIC);
        h[4] = ELFCLASS64;
        h[5] = ELFDATA2LSB;
        h[24..32].copy_from_slice(&le64(0x1000));
        h[32..40].copy_from_slice(&le64(phoff));
        h[40..48].copy_from_slice(&le64(shoff));
        h[54..56].copy_from_slice(&le32(SIZEOF_PHDR as u32)[0..2]);
        h[56..58].copy_from_slice(&(phnum).to_le_bytes());
        h[58..60].copy_from_slice(&(SIZEOF_SHDR as u16).to_le_bytes());
        h[60..62].copy_from_slice(&(shnum).to_le_bytes());
        h[62..64].copy_from_slice(&(shstrndx).to_le_bytes());
        h
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = minimal_ehdr(SIZEOF_EHDR as u64, 0, 0, 0, 0);
        data[0] = 0;
        let mut buf = [Elf64Phdr::default(); 4];
        assert_eq!(parse_elf(&data, &mut buf).unwrap_err(), ElfError::InvalidMagic);
    }

    #[test]
    fn parses_one_load_segment() {
        let mut data = minimal_ehdr(SIZEOF_EHDR as u64, 1, 0, 0, 0);
        let mut phdr = vec![0u8; SIZEOF_PHDR];
        phdr[0..4].copy_from_slice(&le32(PT_LOAD));
        phdr[4..8].copy_from_slice(&le32(PF_R | PF_W));
        phdr[8..16].copy_from_slice(&le64(SIZEOF_EHDR as u64 + SIZEOF_PHDR as u64));
        phdr[16..24].copy_from_slice(&le64(0x1000));
        phdr[32..40].copy_from_slice(&le64(4));
        phdr[40..48].copy_from_slice(&le64(8));
        data.extend_from_slice(&phdr);
        data.extend_from_slice(&[1, 2, 3, 4]);

        let mut buf = [Elf64Phdr::default(); 4];
        let parsed = parse_elf(&data, &mut buf).unwrap();
        assert_eq!(parsed.program_headers.len(), 1);
        let seg = &parsed.program_headers[0];
        assert_eq!(seg.p_vaddr, 0x1000);
        assert_eq!(seg.p_filesz, 4);
        assert_eq!(seg.p_memsz, 8);
        assert!(seg.is_read() && seg.is_write());
    }

    #[test]
    fn rejects_segment_that_shrinks() {
        let mut data = minimal_ehdr(SIZEOF_EHDR as u64, 1, 0, 0, 0);
        let mut phdr = vec![0u8; SIZEOF_PHDR];
        phdr[0..4].copy_from_slice(&le32(PT_LOAD));
        phdr[8..16].copy_from_slice(&le64(SIZEOF_EHDR as u64));
        phdr[32..40].copy_from_slice(&le64(8));
        phdr[40..48].copy_from_slice(&le64(4));
        data.extend_from_slice(&phdr);

        let mut buf = [Elf64Phdr::default(); 4];
        assert_eq!(parse_elf(&data, &mut buf).unwrap_err(), ElfError::SegmentShrinks);
    }

    #[test]
    fn binds_matching_global_object_symbols() {
        // Layout: ehdr, then one section header table with 3 entries
        // (null, symtab, strtab), then the symtab (2 entries: null + one
        // global object), then the strtab bytes.
        let shoff = SIZEOF_EHDR as u64;
        let mut data = minimal_ehdr(0, 0, shoff, 3, 2);

        let symtab_off = shoff + 3 * SIZEOF_SHDR as u64;
        let strtab_bytes = b"\0kernel_version\0";
        let strtab_off = symtab_off + 2 * SIZEOF_SYM as u64;

        // section 0: null
        data.extend_from_slice(&[0u8; SIZEOF_SHDR]);
        // section 1: symtab, sh_link -> section 2 (strtab)
        let mut symtab_sh = vec![0u8; SIZEOF_SHDR];
        symtab_sh[4..8].copy_from_slice(&le32(SHT_SYMTAB));
        symtab_sh[24..32].copy_from_slice(&le64(symtab_off));
        symtab_sh[32..40].copy_from_slice(&le64(2 * SIZEOF_SYM as u64));
        symtab_sh[40..44].copy_from_slice(&le32(2));
        symtab_sh[56..64].copy_from_slice(&le64(SIZEOF_SYM as u64));
        data.extend_from_slice(&symtab_sh);
        // section 2: strtab
        let mut strtab_sh = vec![0u8; SIZEOF_SHDR];
        strtab_sh[4..8].copy_from_slice(&le32(SHT_STRTAB));
        strtab_sh[24..32].copy_from_slice(&le64(strtab_off));
        strtab_sh[32..40].copy_from_slice(&le64(strtab_bytes.len() as u64));
        data.extend_from_slice(&strtab_sh);

        // symtab entry 0: null symbol
        data.extend_from_slice(&[0u8; SIZEOF_SYM]);
        // symtab entry 1: global object "kernel_version" at 0x2000, size 4
        let mut sym = vec![0u8; SIZEOF_SYM];
        sym[0..4].copy_from_slice(&le32(1)); // st_name -> offset 1 in strtab
        sym[4] = (STB_GLOBAL << 4) | STT_OBJECT;
        sym[8..16].copy_from_slice(&le64(0x2000));
        sym[16..24].copy_from_slice(&le64(4));
        data.extend_from_slice(&sym);

        data.extend_from_slice(strtab_bytes);

        let mut found = None;
        let bound = for_each_global_object(&data, |sym| {
            if sym.name == "kernel_version" {
                found = Some(sym.value_vaddr);
                true
            } else {
                false
            }
        })
        .unwrap();

        assert_eq!(bound, 1);
        assert_eq!(found, Some(0x2000));
    }
}
