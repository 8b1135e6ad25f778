use std::io::{BufRead, Read};
use std::path::Path;

use crate::bcf::BcfReader;
use crate::config::Config;
use crate::decompress::{Compression, Container, Stream};
use crate::error::{Result, VcfError};
use crate::header::{Header, HeaderBuilder, HeaderRef};
use crate::record::VariantRecord;
use crate::tokenizer::{Columns, LineKind, Tokenizer};

enum Source {
    Text(Tokenizer<Box<dyn BufRead>>),
    Binary(BcfReader),
}

/// Outcome of pulling one record from the source.
enum Step {
    Record(VariantRecord),
    /// Rejected by the region filter before decoding.
    Filtered,
    End,
}

/// Forward-only cursor over the records of a VCF or BCF stream.
///
/// The header is parsed on construction. With `Config::strict` the first
/// malformed record is returned as an error and iteration ends; otherwise
/// malformed records are logged, counted and skipped.
pub struct Reader {
    header: HeaderRef,
    source: Source,
    config: Config,
    compression: Compression,
    skipped: usize,
    done: bool,
}

impl Reader {
    pub fn from_path<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        Self::from_stream(Stream::from_path(path)?, None, config)
    }

    pub fn new<R: Read + 'static>(reader: R, config: Config) -> Result<Self> {
        Self::from_stream(Stream::new(reader)?, None, config)
    }

    /// Opens another reader over the same file, attaching records to an
    /// existing header instead of a fresh copy. The stream's own header is
    /// still consumed and must declare the same INFO fields.
    ///
    /// With the `sync` feature the header is an `Arc`, so readers on
    /// separate threads (say, one per chromosome) can share it.
    pub fn with_header<R: Read + 'static>(
        reader: R,
        header: HeaderRef,
        config: Config,
    ) -> Result<Self> {
        Self::from_stream(Stream::new(reader)?, Some(header), config)
    }

    fn from_stream(stream: Stream, shared: Option<HeaderRef>, config: Config) -> Result<Self> {
        let compression = stream.compression;
        let (source, header) = match stream.container {
            Container::Vcf => {
                let mut tokenizer = Tokenizer::new(stream.inner);
                let header = read_text_header(&mut tokenizer)?;
                (Source::Text(tokenizer), header)
            }
            Container::Bcf => {
                let (reader, header) = BcfReader::new(stream.inner)?;
                (Source::Binary(reader), header)
            }
        };
        let header = match shared {
            Some(shared) => {
                if !header.info().keys().eq(shared.info().keys()) {
                    return Err(VcfError::malformed_header(
                        0,
                        "INFO declarations differ from the shared header",
                    ));
                }
                shared
            }
            None => HeaderRef::new(header),
        };
        Ok(Self {
            header,
            source,
            config,
            compression,
            skipped: 0,
            done: false,
        })
    }

    pub fn header(&self) -> &Header {
        self.header.as_ref()
    }

    /// A shared handle on the header, for `Reader::with_header`.
    pub fn header_ref(&self) -> HeaderRef {
        self.header.clone()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn container(&self) -> Container {
        match self.source {
            Source::Text(_) => Container::Vcf,
            Source::Binary(_) => Container::Bcf,
        }
    }

    /// Number of malformed records skipped so far in lenient mode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Replaces the region filter for the records not yet read.
    pub fn set_region_filter(&mut self, filter: Option<crate::config::RegionFilter>) {
        self.config.region_filter = filter;
    }

    fn step(&mut self) -> Result<Step> {
        let config = &self.config;
        match &mut self.source {
            Source::Text(tokenizer) => {
                let line = match tokenizer.next_line()? {
                    Some(line) => line,
                    None => return Ok(Step::End),
                };
                let columns = Columns::split(line.text, line.number)?;
                if !config.accepts(columns.chrom) {
                    return Ok(Step::Filtered);
                }
                log::trace!("line {}: {}:{}", line.number, columns.chrom, columns.pos);
                VariantRecord::from_columns(
                    &columns,
                    self.header.clone(),
                    config.lazy,
                    config.strict,
                    line.number,
                )
                .map(Step::Record)
            }
            Source::Binary(reader) => {
                if !reader.read_next()? {
                    return Ok(Step::End);
                }
                if !config.accepts(reader.chrom()?) {
                    return Ok(Step::Filtered);
                }
                log::trace!("record {}", reader.record_number());
                reader.decode(&self.header, config.strict).map(Step::Record)
            }
        }
    }
}

fn read_text_header(tokenizer: &mut Tokenizer<Box<dyn BufRead>>) -> Result<Header> {
    let mut builder = HeaderBuilder::default();
    loop {
        let line = tokenizer
            .next_line()?
            .ok_or_else(|| VcfError::malformed_header(0, "missing #CHROM line"))?;
        match line.kind {
            LineKind::MetaHeader => builder.meta_line(line.number, line.text)?,
            LineKind::ColumnHeader => return builder.column_line(line.number, line.text),
            LineKind::DataRecord => {
                return Err(VcfError::malformed_header(
                    line.number,
                    "data line before the #CHROM line",
                ))
            }
        }
    }
}

impl Iterator for Reader {
    type Item = Result<VariantRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.step() {
                Ok(Step::Record(record)) => return Some(Ok(record)),
                Ok(Step::Filtered) => continue,
                Ok(Step::End) => self.done = true,
                Err(e) if e.is_record_error() && !self.config.strict => {
                    log::warn!("skipping malformed record: {}", e);
                    self.skipped += 1;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bcf::test::{bcf, sites};
    use crate::decompress::test::{bgzip, gzip};
    use crate::types::{Filter, InfoValue};
    use std::io::Cursor;

    const VCF: &str = "##fileformat=VCFv4.2
##FILTER=<ID=q10,Description=\"Quality below 10\">
##INFO=<ID=AN,Number=1,Type=Integer,Description=\"Total Allele Number\">
##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">
##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership\">
##contig=<ID=chr1>
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO
chr1\t100\trs1\tA\tG\t30\tPASS\tAN=4;AF=0.5;DB
chr1\t200\t.\tC\tT,G\t.\tq10\tAF=0.25,.
chr2\t300\t.\tT\t.\t.\t.\tAN=6
";

    fn records(reader: Reader) -> Vec<VariantRecord> {
        reader.collect::<Result<Vec<_>>>().unwrap()
    }

    fn allele_number_mean(reader: Reader) -> f64 {
        let values: Vec<i32> = reader
            .map(|record| record.unwrap().info_get("AN").unwrap())
            .filter_map(|value| value.and_then(|v| v.as_integer()))
            .collect();
        values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_allele_number_mean() {
        let reader = Reader::new(Cursor::new(VCF), Config::default()).unwrap();
        assert_eq!(reader.header().info().len(), 3);
        assert_eq!(allele_number_mean(reader), 5.0);

        let lazy = Reader::new(Cursor::new(VCF), Config::default().lazy(true)).unwrap();
        assert_eq!(allele_number_mean(lazy), 5.0);
    }

    #[test]
    fn test_compressed_input_is_transparent() {
        let plain = records(Reader::new(Cursor::new(VCF), Config::default()).unwrap());
        for bytes in [gzip(VCF.as_bytes()), bgzip(VCF.as_bytes())] {
            let reader = Reader::new(Cursor::new(bytes), Config::default()).unwrap();
            assert_ne!(reader.compression(), Compression::None);
            assert_eq!(records(reader), plain);
        }
    }

    #[test]
    fn test_site_columns() {
        let records = records(Reader::new(Cursor::new(VCF), Config::default()).unwrap());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ids(), ["rs1"]);
        assert_eq!(records[1].filter(), &Filter::Failed(vec!["q10".to_owned()]));
        assert_eq!(
            records[1].info_get("AF").unwrap(),
            Some(InfoValue::FloatArray(vec![Some(0.25), None]))
        );
        assert_eq!(records[2].info_get("DB").unwrap(), None);
    }

    #[test]
    fn test_region_filter() {
        let config = Config::default().chromosomes(["chr2"]);
        let records = records(Reader::new(Cursor::new(VCF), config).unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pos(), 300);

        let mut reader = Reader::new(Cursor::new(VCF), Config::default()).unwrap();
        assert_eq!(reader.next().unwrap().unwrap().pos(), 100);
        reader.set_region_filter(Some(Box::new(|chrom: &str| chrom == "chr2")));
        assert_eq!(reader.next().unwrap().unwrap().chrom(), "chr2");
        assert!(reader.next().is_none());
    }

    fn with_bad_lines() -> String {
        VCF.replace("chr1\t200\t", "chr1\t0\t")
            .replace("AN=6", "AN=6\nchr2\t400\t.\tA")
    }

    #[test]
    fn test_strict_stops_at_first_error() {
        let mut reader = Reader::new(Cursor::new(with_bad_lines()), Config::default()).unwrap();
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, VcfError::InvalidPosition { line: 9, .. }));
        assert_eq!(err.line(), Some(9));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_lenient_skips_and_counts() {
        let config = Config::default().strict(false);
        let mut reader = Reader::new(Cursor::new(with_bad_lines()), config).unwrap();
        let positions: Vec<u64> = reader.by_ref().map(|r| r.unwrap().pos()).collect();
        assert_eq!(positions, [100, 300]);
        assert_eq!(reader.skipped(), 2);
    }

    fn with_invalid_utf8() -> Vec<u8> {
        let at = VCF.find("chr1\t200").unwrap();
        let mut bytes = VCF[..at].as_bytes().to_vec();
        bytes.extend_from_slice(b"chr1\t150\tid\xff\tA\tG\t.\t.\tAN=2\n");
        bytes.extend_from_slice(VCF[at..].as_bytes());
        bytes
    }

    #[test]
    fn test_invalid_utf8_line() {
        let mut reader = Reader::new(Cursor::new(with_invalid_utf8()), Config::default()).unwrap();
        assert_eq!(reader.next().unwrap().unwrap().pos(), 100);
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, VcfError::InvalidValue { line: 9, .. }));
        assert!(reader.next().is_none());

        let config = Config::default().strict(false);
        let mut reader = Reader::new(Cursor::new(with_invalid_utf8()), config).unwrap();
        let positions: Vec<u64> = reader.by_ref().map(|r| r.unwrap().pos()).collect();
        assert_eq!(positions, [100, 200, 300]);
        assert_eq!(reader.skipped(), 1);
    }

    #[test]
    fn test_lenient_keeps_first_of_repeated_key() {
        let text = VCF.replace("AN=6", "AN=6;AN=x");
        let config = Config::default().strict(false);
        let mut reader = Reader::new(Cursor::new(text), config).unwrap();
        let last = reader.by_ref().last().unwrap().unwrap();
        assert_eq!(last.info_get("AN").unwrap(), Some(InfoValue::Integer(6)));
        assert_eq!(reader.skipped(), 0);
    }

    #[test]
    fn test_shared_header() {
        let first = Reader::new(Cursor::new(VCF), Config::default()).unwrap();
        let shared = first.header_ref();
        let second = Reader::with_header(
            Cursor::new(VCF),
            shared.clone(),
            Config::default().chromosomes(["chr2"]),
        )
        .unwrap();
        for record in second {
            assert!(std::ptr::eq(record.unwrap().header(), &*shared));
        }

        let other = VCF.replace("##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership\">\n", "");
        let result = Reader::with_header(Cursor::new(other), shared, Config::default());
        assert!(matches!(result, Err(VcfError::MalformedHeader { .. })));
    }

    #[cfg(feature = "sync")]
    #[test]
    fn test_shared_header_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Header>();
        assert_send_sync::<HeaderRef>();
        assert_send_sync::<VariantRecord>();
        assert_send_sync::<Config>();

        let shared = Reader::new(Cursor::new(VCF), Config::default())
            .unwrap()
            .header_ref();
        let handles: Vec<_> = ["chr1", "chr2"]
            .into_iter()
            .map(|chrom| {
                let header = shared.clone();
                std::thread::spawn(move || {
                    let config = Config::default().chromosomes([chrom]);
                    Reader::with_header(Cursor::new(VCF), header, config)
                        .unwrap()
                        .collect::<Result<Vec<_>>>()
                        .unwrap()
                })
            })
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap().len()).collect();
        assert_eq!(counts, [2, 1]);
    }

    #[test]
    fn test_header_errors_are_fatal_even_when_lenient() {
        let text = VCF.replace("Type=Flag", "Type=Bogus");
        let result = Reader::new(Cursor::new(text), Config::default().strict(false));
        assert!(matches!(result, Err(VcfError::UnknownType { .. })));
    }

    #[test]
    fn test_unsupported_and_empty_input() {
        let result = Reader::new(Cursor::new(b"not a vcf".to_vec()), Config::default());
        assert!(matches!(result, Err(VcfError::UnsupportedEncoding(_))));
        let result = Reader::new(Cursor::new(Vec::new()), Config::default());
        assert!(matches!(result, Err(VcfError::TruncatedInput(_))));
    }

    #[test]
    fn test_reading_twice_is_idempotent() {
        let first = records(Reader::new(Cursor::new(VCF), Config::default()).unwrap());
        let second = records(Reader::new(Cursor::new(VCF), Config::default()).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_bcf_through_reader() {
        for bytes in [bcf(&sites()), bgzip(&bcf(&sites()))] {
            let reader = Reader::new(Cursor::new(bytes), Config::default()).unwrap();
            assert_eq!(reader.container(), Container::Bcf);
            assert_eq!(allele_number_mean(reader), (4.0 + 300.0) / 2.0);
        }

        let config = Config::default().chromosomes(["chr2"]);
        let records = records(Reader::new(Cursor::new(bcf(&sites())), config).unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pos(), 1);
    }
}
