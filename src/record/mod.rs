pub(crate) mod decode;

use std::fmt;

use indexmap::IndexMap;

use crate::error::Result;
use crate::header::{Header, HeaderRef};
use crate::tokenizer::Columns;
use crate::types::{Filter, InfoValue};

/// INFO values, either decoded up front or kept as raw text and decoded
/// per key on access.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Info {
    Decoded(IndexMap<String, InfoValue>),
    Deferred {
        raw: String,
        strict: bool,
        line: usize,
    },
}

/// One variant site.
#[derive(Debug, Clone)]
pub struct VariantRecord {
    pub(crate) chrom: String,
    pub(crate) pos: u64,
    pub(crate) ids: Vec<String>,
    pub(crate) ref_allele: String,
    pub(crate) alt_alleles: Vec<String>,
    pub(crate) qual: Option<f32>,
    pub(crate) filter: Filter,
    pub(crate) info: Info,
    pub(crate) header: HeaderRef,
}

impl PartialEq for VariantRecord {
    fn eq(&self, other: &Self) -> bool {
        self.chrom == other.chrom
            && self.pos == other.pos
            && self.ids == other.ids
            && self.ref_allele == other.ref_allele
            && self.alt_alleles == other.alt_alleles
            && self.qual == other.qual
            && self.filter == other.filter
            && self.info == other.info
    }
}

impl VariantRecord {
    /// Decodes one tokenized data line.
    pub(crate) fn from_columns(
        columns: &Columns<'_>,
        header: HeaderRef,
        lazy: bool,
        strict: bool,
        line: usize,
    ) -> Result<Self> {
        let site = decode::site(columns, line)?;
        let info = if lazy {
            Info::Deferred {
                raw: columns.info.to_owned(),
                strict,
                line,
            }
        } else {
            Info::Decoded(decode::info_column(
                &header,
                columns.info,
                site.alt_alleles.len(),
                strict,
                line,
            )?)
        };
        Ok(VariantRecord {
            chrom: site.chrom,
            pos: site.pos,
            ids: site.ids,
            ref_allele: site.ref_allele,
            alt_alleles: site.alt_alleles,
            qual: site.qual,
            filter: site.filter,
            info,
            header,
        })
    }

    /// Returns the target sequence identifier of this record, i.e. CHROM.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Cursor;
    /// use vcf_info::{Config, Reader};
    ///
    /// let vcf = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\nchr1\t817186\t.\tG\tA\t50\tPASS\t.\n";
    /// let mut records = Reader::new(Cursor::new(vcf), Config::default()).unwrap();
    /// let record = records.next().unwrap().unwrap();
    /// assert_eq!(record.chrom(), "chr1");
    /// ```
    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    /// Returns the 1-based position of this record, i.e. POS.
    ///
    /// BCF stores positions 0-based; they are converted when decoding.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Returns the IDs of this record. Empty if not set (`.` in VCF).
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn ref_allele(&self) -> &str {
        &self.ref_allele
    }

    /// Returns the alternative alleles of this record, i.e. ALT.
    /// A lone `.` yields no alleles.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Cursor;
    /// use vcf_info::{Config, Reader};
    ///
    /// let vcf = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\nchr1\t1\t.\tG\t.\t.\t.\t.\n";
    /// let mut records = Reader::new(Cursor::new(vcf), Config::default()).unwrap();
    /// let record = records.next().unwrap().unwrap();
    /// assert!(record.alt_alleles().is_empty());
    /// ```
    pub fn alt_alleles(&self) -> &[String] {
        &self.alt_alleles
    }

    /// Returns the quality value of this record, i.e. QUAL.
    /// If not set (`.` in VCF), return `None`.
    pub fn qual(&self) -> Option<f32> {
        self.qual
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// For a given INFO key, return its decoded value, or `None` if the key
    /// does not occur on this record.
    ///
    /// Absence is not an error. Errors can only occur for records read with
    /// `Config::lazy`, whose INFO column is decoded here.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Cursor;
    /// use vcf_info::{Config, InfoValue, Reader};
    ///
    /// let vcf = concat!(
    ///     "##fileformat=VCFv4.2\n",
    ///     "##INFO=<ID=AN,Number=1,Type=Integer,Description=\"Total Allele Number\">\n",
    ///     "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n",
    ///     "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n",
    ///     "chr1\t1\t.\tG\tA\t.\t.\tAN=4;DP=10\n",
    ///     "chr1\t2\t.\tG\tA\t.\t.\tDP=10\n",
    /// );
    /// let mut records = Reader::new(Cursor::new(vcf), Config::default()).unwrap();
    /// let first = records.next().unwrap().unwrap();
    /// assert_eq!(first.info_get("AN").unwrap(), Some(InfoValue::Integer(4)));
    /// let second = records.next().unwrap().unwrap();
    /// assert_eq!(second.info_get("AN").unwrap(), None);
    /// ```
    pub fn info_get(&self, key: &str) -> Result<Option<InfoValue>> {
        match &self.info {
            Info::Decoded(info) => Ok(info.get(key).cloned()),
            Info::Deferred { raw, strict, line } => decode::info_pairs(raw)
                .find(|(k, _)| *k == key)
                .map(|(k, value)| {
                    decode::info_field(
                        &self.header,
                        k,
                        value,
                        self.alt_alleles.len(),
                        *strict,
                        *line,
                    )
                })
                .transpose(),
        }
    }

    /// Whether `key` occurs on this record as a Flag, i.e. without a value.
    pub fn has_flag(&self, key: &str) -> bool {
        matches!(self.info_get(key), Ok(Some(InfoValue::Flag)))
    }

    /// Whether `key` occurs on this record, whatever its type.
    pub fn contains_key(&self, key: &str) -> bool {
        match &self.info {
            Info::Decoded(info) => info.contains_key(key),
            Info::Deferred { raw, .. } => decode::info_pairs(raw).any(|(k, _)| k == key),
        }
    }

    /// All INFO values in column order.
    pub fn info(&self) -> Result<IndexMap<String, InfoValue>> {
        match &self.info {
            Info::Decoded(info) => Ok(info.clone()),
            Info::Deferred { raw, strict, line } => decode::info_column(
                &self.header,
                raw,
                self.alt_alleles.len(),
                *strict,
                *line,
            ),
        }
    }

    /// Serializes the INFO values back to a VCF INFO column.
    pub fn info_column(&self) -> Result<String> {
        Ok(InfoColumn(&self.info()?).to_string())
    }
}

struct InfoColumn<'a>(&'a IndexMap<String, InfoValue>);

impl fmt::Display for InfoColumn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            match value {
                InfoValue::Flag => f.write_str(key)?,
                value => write!(f, "{}={}", key, value)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::VcfError;

    const HEADER: &str = "##fileformat=VCFv4.2
##INFO=<ID=AN,Number=1,Type=Integer,Description=\"Total Allele Number\">
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">
##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO
";

    fn record(line: &str, lazy: bool) -> Result<VariantRecord> {
        let header = HeaderRef::new(Header::from_text(HEADER).unwrap());
        let columns = Columns::split(line, 6)?;
        VariantRecord::from_columns(&columns, header, lazy, true, 6)
    }

    #[test]
    fn test_eager_and_lazy_agree() {
        let line = "chr1\t5\trs7\tA\tC,T\t29.5\tPASS\tAN=4;DP=10;DB";
        let eager = record(line, false).unwrap();
        let lazy = record(line, true).unwrap();
        for key in ["AN", "DP", "DB", "XX"] {
            assert_eq!(eager.info_get(key).unwrap(), lazy.info_get(key).unwrap());
        }
        assert_eq!(eager.info().unwrap(), lazy.info().unwrap());
        assert!(eager.has_flag("DB") && lazy.has_flag("DB"));
        assert!(!eager.has_flag("AN") && !lazy.has_flag("AN"));
        assert!(eager.contains_key("AN") && lazy.contains_key("AN"));
        assert!(!eager.contains_key("XX") && !lazy.contains_key("XX"));
        assert_eq!(eager.alt_alleles(), ["C", "T"]);
        assert_eq!(eager.qual(), Some(29.5));
        assert!(eager.filter().is_pass());
    }

    #[test]
    fn test_lazy_defers_errors() {
        let line = "chr1\t5\t.\tA\tC\t.\t.\tAN=x;DP=10";
        assert!(matches!(
            record(line, false).unwrap_err(),
            VcfError::InvalidValue { line: 6, .. }
        ));
        let lazy = record(line, true).unwrap();
        assert_eq!(lazy.info_get("DP").unwrap(), Some(InfoValue::Integer(10)));
        assert!(lazy.info_get("AN").is_err());
    }

    #[test]
    fn test_info_column_round_trip() {
        let line = "chr1\t5\t.\tA\tC\t.\t.\tAN=4;DB;DP=.";
        let eager = record(line, false).unwrap();
        assert_eq!(eager.info_column().unwrap(), "AN=4;DB;DP=.");

        let line = "chr1\t5\t.\tA\tC\t.\t.\t.";
        let lazy = record(line, true).unwrap();
        assert_eq!(lazy.info_column().unwrap(), ".");
    }

    #[test]
    fn test_decoding_twice_is_equal() {
        let line = "chr2\t100\t.\tG\tA\t.\tq10\tAN=6";
        assert_eq!(record(line, false).unwrap(), record(line, false).unwrap());
    }
}
