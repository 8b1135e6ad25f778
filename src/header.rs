use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
#[cfg(not(feature = "sync"))]
use std::rc::Rc;
#[cfg(feature = "sync")]
use std::sync::Arc;

use getset::{CopyGetters, Getters};
use indexmap::IndexMap;
use multimap::MultiMap;
use strum::{Display, EnumString};

use crate::error::{Result, VcfError};
use crate::parser;

/// Shared, immutable handle on a parsed header.
#[cfg(not(feature = "sync"))]
pub type HeaderRef = Rc<Header>;
#[cfg(feature = "sync")]
pub type HeaderRef = Arc<Header>;

pub const FIXED_COLUMNS: [&str; 8] = ["CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO"];
pub const FORMAT_COLUMN: &str = "FORMAT";

#[derive(Debug, Clone, Copy, Eq, PartialEq, EnumString, Display)]
pub enum FieldType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

/// Cardinality rule declared by a field's `Number=` attribute.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Number {
    Count(usize),
    /// `A`: one value per alternate allele.
    AlternateAlleles,
    /// `R`: one value per allele, including the reference.
    Alleles,
    /// `G`: one value per genotype.
    Genotypes,
    /// `.`
    Unknown,
}

impl Number {
    /// The number of values this rule requires for a site with `n_alt`
    /// alternate alleles, if that number is known at site level.
    ///
    /// `G` is resolved assuming diploid genotypes.
    pub fn resolve(&self, n_alt: usize) -> Option<usize> {
        match *self {
            Number::Count(n) => Some(n),
            Number::AlternateAlleles => Some(n_alt),
            Number::Alleles => Some(n_alt + 1),
            Number::Genotypes => {
                let n_alleles = n_alt + 1;
                Some(n_alleles * (n_alleles + 1) / 2)
            }
            Number::Unknown => None,
        }
    }
}

impl FromStr for Number {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parser::number(s).map_err(|_| ())
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Count(n) => write!(f, "{}", n),
            Number::AlternateAlleles => f.write_str("A"),
            Number::Alleles => f.write_str("R"),
            Number::Genotypes => f.write_str("G"),
            Number::Unknown => f.write_str("."),
        }
    }
}

/// A typed `##INFO` or `##FORMAT` declaration.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct HeaderFieldSpec {
    #[getset(get = "pub")]
    id: String,
    #[getset(get_copy = "pub")]
    number: Number,
    #[getset(get_copy = "pub")]
    kind: FieldType,
    #[getset(get = "pub")]
    description: String,
    #[getset(get = "pub")]
    source: Option<String>,
    #[getset(get = "pub")]
    version: Option<String>,
    #[getset(get_copy = "pub")]
    idx: Option<usize>,
    #[getset(get = "pub")]
    additional: IndexMap<String, String>,
}

impl HeaderFieldSpec {
    pub fn new(id: &str, number: Number, kind: FieldType, description: &str) -> Self {
        HeaderFieldSpec {
            id: id.to_owned(),
            number,
            kind,
            description: description.to_owned(),
            source: None,
            version: None,
            idx: None,
            additional: IndexMap::new(),
        }
    }

    fn from_pairs(line: usize, data: Vec<(&str, String)>) -> Result<Self> {
        let mut h: IndexMap<_, _> = data.into_iter().collect();
        let mut required = |key: &str| {
            h.shift_remove(key)
                .ok_or_else(|| VcfError::malformed_header(line, format!("{} is mandatory", key)))
        };
        let id = required("ID")?;
        let number = required("Number")?;
        let kind = required("Type")?;

        let number = number.parse::<Number>().map_err(|_| {
            VcfError::malformed_header(line, format!("invalid Number '{}' for {}", number, id))
        })?;
        let kind = FieldType::from_str(&kind).map_err(|_| VcfError::UnknownType {
            id: id.clone(),
            kind: kind.clone(),
        })?;
        match (kind, number) {
            (FieldType::Flag, Number::Count(0)) => {}
            (FieldType::Flag, other) => {
                return Err(VcfError::malformed_header(
                    line,
                    format!("Flag field {} must have Number=0, found {}", id, other),
                ))
            }
            (_, Number::Count(0)) => {
                return Err(VcfError::malformed_header(
                    line,
                    format!("only Flag fields may have Number=0, {} is {}", id, kind),
                ))
            }
            _ => {}
        }

        let idx = match h.shift_remove("IDX") {
            Some(idx) => Some(idx.parse().map_err(|_| {
                VcfError::malformed_header(line, format!("invalid IDX '{}' for {}", idx, id))
            })?),
            None => None,
        };
        Ok(HeaderFieldSpec {
            id,
            number,
            kind,
            description: h.shift_remove("Description").unwrap_or_default(),
            source: h.shift_remove("Source"),
            version: h.shift_remove("Version"),
            idx,
            additional: h.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct HeaderFilter {
    id: String,
    description: String,
}

#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct HeaderContig {
    #[getset(get = "pub")]
    id: String,
    #[getset(get_copy = "pub")]
    length: Option<u64>,
    #[getset(get = "pub")]
    additional: IndexMap<String, String>,
}

#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Header {
    file_format: Option<String>,
    /// Unstructured and unrecognized meta lines, by key.
    meta: MultiMap<String, String>,
    info: IndexMap<String, HeaderFieldSpec>,
    format: IndexMap<String, HeaderFieldSpec>,
    filters: IndexMap<String, HeaderFilter>,
    contigs: Vec<HeaderContig>,
    samples: Vec<String>,
    /// IDs entering the BCF string dictionary, in order of appearance,
    /// with their explicit `IDX=` if any.
    #[getset(skip)]
    pub(crate) dictionary_ids: Vec<(String, Option<usize>)>,
    #[getset(skip)]
    pub(crate) contig_idx: Vec<Option<usize>>,
}

impl Header {
    pub fn info_spec(&self, id: &str) -> Option<&HeaderFieldSpec> {
        self.info.get(id)
    }

    pub fn format_spec(&self, id: &str) -> Option<&HeaderFieldSpec> {
        self.format.get(id)
    }

    /// Parses a complete header from its text: all meta lines followed by
    /// the `#CHROM` line.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut builder = HeaderBuilder::default();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if line.starts_with("##") {
                builder.meta_line(i + 1, line)?;
            } else if line.starts_with('#') {
                return builder.column_line(i + 1, line);
            } else {
                return Err(VcfError::malformed_header(
                    i + 1,
                    "data line before the #CHROM line",
                ));
            }
        }
        Err(VcfError::malformed_header(0, "missing #CHROM line"))
    }
}

/// Accumulates meta lines until the `#CHROM` line completes the header.
#[derive(Debug, Default)]
pub(crate) struct HeaderBuilder {
    file_format: Option<String>,
    meta: MultiMap<String, String>,
    info: IndexMap<String, HeaderFieldSpec>,
    format: IndexMap<String, HeaderFieldSpec>,
    filters: IndexMap<String, HeaderFilter>,
    contigs: Vec<HeaderContig>,
    contig_idx: Vec<Option<usize>>,
    dictionary_ids: Vec<(String, Option<usize>)>,
}

impl HeaderBuilder {
    pub(crate) fn meta_line(&mut self, line: usize, text: &str) -> Result<()> {
        let (key, value) = parser::meta_line(text)
            .ok_or_else(|| VcfError::malformed_header(line, "expected ##key=value"))?;
        match key {
            "INFO" | "FORMAT" | "FILTER" | "contig" => {
                let pairs = parser::structured_value(value).ok_or_else(|| {
                    VcfError::malformed_header(line, format!("malformed ##{} line", key))
                })?;
                self.structured(line, key, pairs)
            }
            "fileformat" => {
                self.file_format = Some(value.to_owned());
                Ok(())
            }
            _ => {
                self.meta.insert(key.to_owned(), value.to_owned());
                Ok(())
            }
        }
    }

    fn structured(&mut self, line: usize, key: &str, pairs: Vec<(&str, String)>) -> Result<()> {
        match key {
            "INFO" | "FORMAT" => {
                let spec = HeaderFieldSpec::from_pairs(line, pairs)?;
                let (namespace, specs) = if key == "INFO" {
                    ("INFO", &mut self.info)
                } else {
                    ("FORMAT", &mut self.format)
                };
                if specs.contains_key(&spec.id) {
                    return Err(VcfError::DuplicateField {
                        namespace,
                        id: spec.id,
                    });
                }
                self.dictionary_ids.push((spec.id.clone(), spec.idx));
                specs.insert(spec.id.clone(), spec);
            }
            "FILTER" => {
                let mut h: HashMap<_, _> = pairs.into_iter().collect();
                let id = h
                    .remove("ID")
                    .ok_or_else(|| VcfError::malformed_header(line, "ID is mandatory"))?;
                let idx = h.remove("IDX").and_then(|idx| idx.parse().ok());
                if self.filters.contains_key(&id) {
                    return Err(VcfError::DuplicateField {
                        namespace: "FILTER",
                        id,
                    });
                }
                self.dictionary_ids.push((id.clone(), idx));
                let filter = HeaderFilter {
                    id: id.clone(),
                    description: h.remove("Description").unwrap_or_default(),
                };
                self.filters.insert(id, filter);
            }
            _ => {
                let mut h: IndexMap<_, _> = pairs.into_iter().collect();
                let id = h
                    .shift_remove("ID")
                    .ok_or_else(|| VcfError::malformed_header(line, "ID is mandatory"))?;
                let length = h.shift_remove("length").and_then(|s| s.parse().ok());
                let idx = h.shift_remove("IDX").and_then(|s| s.parse().ok());
                self.contig_idx.push(idx);
                self.contigs.push(HeaderContig {
                    id,
                    length,
                    additional: h.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
                });
            }
        }
        Ok(())
    }

    /// Validates the `#CHROM` line and finishes the header.
    pub(crate) fn column_line(self, line: usize, text: &str) -> Result<Header> {
        let columns: Vec<&str> = text
            .strip_prefix('#')
            .unwrap_or(text)
            .split('\t')
            .collect();
        if columns.len() < FIXED_COLUMNS.len() || columns[..FIXED_COLUMNS.len()] != FIXED_COLUMNS {
            return Err(VcfError::malformed_header(
                line,
                format!("expected columns {}", FIXED_COLUMNS.join(" ")),
            ));
        }
        let samples = match columns.get(FIXED_COLUMNS.len()) {
            Some(&FORMAT_COLUMN) => columns[FIXED_COLUMNS.len() + 1..]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            Some(other) => {
                return Err(VcfError::malformed_header(
                    line,
                    format!("expected FORMAT as 9th column, found '{}'", other),
                ))
            }
            None => Vec::new(),
        };
        let header = Header {
            file_format: self.file_format,
            meta: self.meta,
            info: self.info,
            format: self.format,
            filters: self.filters,
            contigs: self.contigs,
            samples,
            dictionary_ids: self.dictionary_ids,
            contig_idx: self.contig_idx,
        };
        log::debug!(
            "parsed header: {} INFO, {} FORMAT, {} FILTER, {} contigs, {} samples",
            header.info.len(),
            header.format.len(),
            header.filters.len(),
            header.contigs.len(),
            header.samples.len()
        );
        Ok(header)
    }
}
