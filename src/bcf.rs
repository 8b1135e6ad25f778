//! BCF 2.x: header block, string and contig dictionaries, and the
//! site-level part of each record. Per-sample data is skipped.

use std::collections::HashMap;
use std::io::{self, BufRead, Read};
use std::mem::size_of;

use indexmap::IndexMap;
use nom::multi::count;

use crate::error::{from_read_error, Result, VcfError};
use crate::header::{Header, HeaderRef};
use crate::parser;
use crate::record::{decode, Info, VariantRecord};
use crate::types::{Filter, TypedValue, MISSING, MISSING_FLOAT};

const BCF_MAJOR_VERSION: u8 = 2;
const PASS: &str = "PASS";

pub(crate) struct BcfReader {
    inner: Box<dyn BufRead>,
    /// Dictionary offset to FILTER/INFO/FORMAT ID.
    strings: HashMap<usize, String>,
    /// Dictionary offset to contig name.
    contigs: HashMap<usize, String>,
    length_buf: [u8; size_of::<u32>() * 2],
    record_buf: Vec<u8>,
    l_shared: usize,
    record_number: usize,
}

fn malformed<E>(record: usize, field: &'static str) -> impl FnOnce(E) -> VcfError {
    move |_| VcfError::invalid_value(record, field, "malformed BCF record")
}

impl BcfReader {
    /// Consumes the magic and the header block.
    pub(crate) fn new(mut inner: Box<dyn BufRead>) -> Result<(Self, Header)> {
        let mut magic = [0u8; 5];
        inner.read_exact(&mut magic).map_err(from_read_error)?;
        let (_, (major, minor)) = parser::bcf_version(&magic)
            .map_err(|_| VcfError::UnsupportedEncoding("missing BCF magic".into()))?;
        if major != BCF_MAJOR_VERSION {
            return Err(VcfError::UnsupportedEncoding(format!(
                "BCF version {}.{}",
                major, minor
            )));
        }

        let mut length = [0u8; size_of::<u32>()];
        inner.read_exact(&mut length).map_err(from_read_error)?;
        let (_, l_text) = parser::header_length(&length)
            .map_err(|_| VcfError::TruncatedInput("BCF header length".into()))?;

        let mut text = Vec::new();
        read_block(&mut inner, u64::from(l_text), &mut text, "BCF header")?;
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        let text = std::str::from_utf8(&text[..end])
            .map_err(|e| VcfError::malformed_header(0, e.to_string()))?;
        let header = Header::from_text(text)?;
        log::debug!("BCF {}.{} header of {} bytes", major, minor, l_text);

        let reader = Self {
            inner,
            strings: string_dictionary(&header),
            contigs: contig_dictionary(&header),
            length_buf: [0u8; size_of::<u32>() * 2],
            record_buf: Vec::new(),
            l_shared: 0,
            record_number: 0,
        };
        Ok((reader, header))
    }

    /// 1-based number of the record last read.
    pub(crate) fn record_number(&self) -> usize {
        self.record_number
    }

    /// Reads the next record into the buffer. `false` at a clean end of
    /// stream.
    pub(crate) fn read_next(&mut self) -> Result<bool> {
        let filled = fill(&mut self.inner, &mut self.length_buf)?;
        if filled == 0 {
            return Ok(false);
        }
        if filled < self.length_buf.len() {
            return Err(VcfError::TruncatedInput(format!(
                "record {} length prefix",
                self.record_number + 1
            )));
        }
        let (_, (l_shared, l_indiv)) = parser::record_length(&self.length_buf)
            .map_err(|_| VcfError::TruncatedInput("record length prefix".into()))?;
        let record = self.record_number + 1;
        read_block(
            &mut self.inner,
            u64::from(l_shared) + u64::from(l_indiv),
            &mut self.record_buf,
            &format!("BCF record {}", record),
        )?;
        self.l_shared = l_shared as usize;
        self.record_number = record;
        Ok(true)
    }

    /// CHROM of the buffered record, without decoding anything else.
    pub(crate) fn chrom(&self) -> Result<&str> {
        let record = self.record_number;
        let (_, site) = parser::site_fields(&self.record_buf[..self.l_shared])
            .map_err(malformed(record, "CHROM"))?;
        self.contig(site.chrom)
    }

    /// Decodes the site-level fields of the buffered record.
    pub(crate) fn decode(&self, header: &HeaderRef, strict: bool) -> Result<VariantRecord> {
        let record = self.record_number;
        let shared = &self.record_buf[..self.l_shared];
        let (input, site) = parser::site_fields(shared).map_err(malformed(record, "CHROM"))?;
        let chrom = self.contig(site.chrom)?.to_owned();
        if site.pos < 0 {
            return Err(VcfError::InvalidPosition {
                line: record,
                value: site.pos.to_string(),
            });
        }
        let qual = if site.qual.to_bits() == MISSING_FLOAT {
            None
        } else {
            Some(site.qual)
        };

        let (input, id) = parser::typed_string(input).map_err(malformed(record, "ID"))?;
        let (input, alleles) =
            count(parser::typed_string, site.n_allele)(input).map_err(malformed(record, "ALT"))?;
        let (mut input, filter) =
            parser::typed_value(input).map_err(malformed(record, "FILTER"))?;

        let mut alleles = alleles
            .into_iter()
            .map(|a| utf8(a, record, "ALT"))
            .collect::<Result<Vec<_>>>()?
            .into_iter();
        let ref_allele = alleles.next().unwrap_or_default();
        let alt_alleles: Vec<String> = alleles.collect();

        let mut info = IndexMap::with_capacity(site.n_info);
        for _ in 0..site.n_info {
            let (rest, key) = parser::typed_int(input).map_err(malformed(record, "INFO"))?;
            let (rest, value) = parser::typed_value(rest).map_err(malformed(record, "INFO"))?;
            input = rest;
            let key = self.string(key)?;
            let spec = match header.info_spec(key) {
                Some(spec) => spec,
                None if strict => {
                    return Err(VcfError::UnknownInfoKey {
                        line: record,
                        key: key.to_owned(),
                    })
                }
                None => {
                    log::warn!("record {}: dropping undeclared INFO key {}", record, key);
                    continue;
                }
            };
            let value = decode::typed_value(spec, value, alt_alleles.len(), strict, record)?;
            info.insert(key.to_owned(), value);
        }

        let id = utf8(id, record, "ID")?;
        let ids = if id.is_empty() || id == MISSING {
            Vec::new()
        } else {
            id.split(';').map(str::to_owned).collect()
        };

        Ok(VariantRecord {
            chrom,
            pos: site.pos as u64 + 1,
            ids,
            ref_allele,
            alt_alleles,
            qual,
            filter: self.filter(filter)?,
            info: Info::Decoded(info),
            header: header.clone(),
        })
    }

    fn contig(&self, offset: i32) -> Result<&str> {
        usize::try_from(offset)
            .ok()
            .and_then(|offset| self.contigs.get(&offset))
            .map(String::as_str)
            .ok_or_else(|| {
                VcfError::invalid_value(
                    self.record_number,
                    "CHROM",
                    format!("no contig at dictionary offset {}", offset),
                )
            })
    }

    fn string(&self, offset: i32) -> Result<&str> {
        usize::try_from(offset)
            .ok()
            .and_then(|offset| self.strings.get(&offset))
            .map(String::as_str)
            .ok_or_else(|| {
                VcfError::invalid_value(
                    self.record_number,
                    "INFO",
                    format!("no string at dictionary offset {}", offset),
                )
            })
    }

    fn filter(&self, value: TypedValue) -> Result<Filter> {
        let offsets = match value {
            TypedValue::Missing => return Ok(Filter::Missing),
            TypedValue::Int(offsets) => offsets,
            _ => {
                return Err(VcfError::invalid_value(
                    self.record_number,
                    "FILTER",
                    "expected integer dictionary offsets",
                ))
            }
        };
        let names = offsets
            .into_iter()
            .flatten()
            .map(|offset| self.string(offset).map(str::to_owned))
            .collect::<Result<Vec<_>>>()?;
        Ok(match names.as_slice() {
            [] => Filter::Missing,
            [name] if name == PASS => Filter::Pass,
            _ => Filter::Failed(names),
        })
    }
}

fn utf8(bytes: Vec<u8>, record: usize, field: &str) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| VcfError::invalid_value(record, field, e.to_string()))
}

/// Replaces the contents of `buf` with the next `len` bytes. The buffer
/// grows with the bytes actually read, not with the declared length.
fn read_block(reader: &mut dyn Read, len: u64, buf: &mut Vec<u8>, what: &str) -> Result<()> {
    buf.clear();
    let read = reader.take(len).read_to_end(buf).map_err(from_read_error)? as u64;
    if read < len {
        return Err(VcfError::TruncatedInput(format!(
            "{}: expected {} bytes, found {}",
            what, len, read
        )));
    }
    Ok(())
}

/// Reads until `buf` is full or the stream ends, returning the byte count.
fn fill(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(from_read_error(e)),
        }
    }
    Ok(filled)
}

/// PASS at offset 0, then FILTER/INFO/FORMAT IDs in order of first
/// appearance. An explicit `IDX=` overrides the position.
fn string_dictionary(header: &Header) -> HashMap<usize, String> {
    let mut strings = HashMap::new();
    strings.insert(0, PASS.to_owned());
    let mut seen: HashMap<&str, usize> = HashMap::new();
    seen.insert(PASS, 0);
    let mut next = 1;
    for (id, idx) in &header.dictionary_ids {
        if seen.contains_key(id.as_str()) {
            continue;
        }
        let offset = idx.unwrap_or(next);
        next = offset.max(next) + 1;
        seen.insert(id, offset);
        strings.insert(offset, id.clone());
    }
    strings
}

fn contig_dictionary(header: &Header) -> HashMap<usize, String> {
    header
        .contigs()
        .iter()
        .zip(&header.contig_idx)
        .enumerate()
        .map(|(i, (contig, idx))| (idx.unwrap_or(i), contig.id().clone()))
        .collect()
}
