//! Line classification and column splitting for VCF text.

use std::io::BufRead;

use crate::error::{from_read_error, Result, VcfError};

const FIXED_COLUMN_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LineKind {
    /// `##key=value`
    MetaHeader,
    /// `#CHROM…`
    ColumnHeader,
    DataRecord,
}

impl LineKind {
    pub fn classify(line: &str) -> Self {
        if line.starts_with("##") {
            LineKind::MetaHeader
        } else if line.starts_with('#') {
            LineKind::ColumnHeader
        } else {
            LineKind::DataRecord
        }
    }
}

/// One non-empty line, without its terminator.
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    /// 1-based, counting blank lines too.
    pub number: usize,
    pub kind: LineKind,
    pub text: &'a str,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Section {
    Meta,
    Data,
}

/// Pulls lines from a byte stream, enforcing that all meta lines precede
/// the single `#CHROM` line, which precedes all data lines.
///
/// Not seekable: restarting means re-opening the source.
pub struct Tokenizer<R: BufRead> {
    inner: R,
    buf: Vec<u8>,
    line_number: usize,
    section: Section,
}

impl<R: BufRead> Tokenizer<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            line_number: 0,
            section: Section::Meta,
        }
    }

    /// Advances to the next non-empty line. The returned text borrows the
    /// tokenizer's buffer.
    ///
    /// A data line that is not valid UTF-8 is a record error; the next
    /// call continues with the following line.
    pub fn next_line(&mut self) -> Result<Option<Line<'_>>> {
        loop {
            self.buf.clear();
            let n = self
                .inner
                .read_until(b'\n', &mut self.buf)
                .map_err(from_read_error)?;
            if n == 0 {
                if self.section == Section::Meta {
                    return Err(VcfError::malformed_header(
                        self.line_number,
                        "missing #CHROM line",
                    ));
                }
                return Ok(None);
            }
            self.line_number += 1;
            while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                self.buf.pop();
            }
            if self.buf.is_empty() {
                continue;
            }
            let text = match std::str::from_utf8(&self.buf) {
                Ok(text) => text,
                Err(e) if self.section == Section::Data && self.buf[0] != b'#' => {
                    return Err(VcfError::invalid_value(self.line_number, "line", e.to_string()))
                }
                Err(e) => return Err(VcfError::malformed_header(self.line_number, e.to_string())),
            };
            let kind = LineKind::classify(text);
            self.section = match (self.section, kind) {
                (Section::Meta, LineKind::MetaHeader) => Section::Meta,
                (Section::Meta, LineKind::ColumnHeader) => Section::Data,
                (Section::Meta, LineKind::DataRecord) => {
                    return Err(VcfError::malformed_header(
                        self.line_number,
                        "data line before the #CHROM line",
                    ))
                }
                (Section::Data, LineKind::DataRecord) => Section::Data,
                (Section::Data, _) => {
                    return Err(VcfError::malformed_header(
                        self.line_number,
                        "header line after the #CHROM line",
                    ))
                }
            };
            return Ok(Some(Line {
                number: self.line_number,
                kind,
                text,
            }));
        }
    }
}

/// The columns of one data line.
#[derive(Debug, Clone, Copy)]
pub struct Columns<'a> {
    pub chrom: &'a str,
    pub pos: &'a str,
    pub id: &'a str,
    pub ref_allele: &'a str,
    pub alt: &'a str,
    pub qual: &'a str,
    pub filter: &'a str,
    pub info: &'a str,
    pub format: Option<&'a str>,
    samples: Option<&'a str>,
}

impl<'a> Columns<'a> {
    /// Splits a data line on tabs. Sample columns are split on demand.
    pub fn split(line: &'a str, line_number: usize) -> Result<Self> {
        let mut fields = line.splitn(FIXED_COLUMN_COUNT + 2, '\t');
        let mut fixed = [""; FIXED_COLUMN_COUNT];
        for (i, slot) in fixed.iter_mut().enumerate() {
            *slot = fields.next().ok_or(VcfError::ColumnCount {
                line: line_number,
                found: i,
            })?;
        }
        let [chrom, pos, id, ref_allele, alt, qual, filter, info] = fixed;
        Ok(Columns {
            chrom,
            pos,
            id,
            ref_allele,
            alt,
            qual,
            filter,
            info,
            format: fields.next(),
            samples: fields.next(),
        })
    }

    pub fn samples(&self) -> impl Iterator<Item = &'a str> {
        self.samples.into_iter().flat_map(|s| s.split('\t'))
    }
}
