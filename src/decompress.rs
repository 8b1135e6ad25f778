//! Magic-byte sniffing and transparent gzip/BGZF decompression.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::Path;

use strum::Display;

use crate::error::{from_read_error, Result, VcfError};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z'];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const BCF_MAGIC: &[u8] = b"BCF\x02";

const GZIP_FLAG_FEXTRA: u8 = 0x04;
// gzip header up to and including the first extra subfield identifier
const SNIFF_LENGTH: usize = 14;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum Compression {
    None,
    Gzip,
    /// Block gzip: a series of gzip members each carrying a `BC` extra
    /// subfield. Decompressed sequentially here.
    Bgzf,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum Container {
    Vcf,
    Bcf,
}

/// A decompressed byte stream, classified by content.
pub struct Stream {
    pub(crate) inner: Box<dyn BufRead>,
    pub(crate) compression: Compression,
    pub(crate) container: Container,
}

impl Stream {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file)
    }

    pub fn new<R: Read + 'static>(reader: R) -> Result<Self> {
        let (magic, reader) = sniff(Box::new(reader), SNIFF_LENGTH)?;
        let compression = detect_compression(&magic)?;
        let reader = match compression {
            Compression::None => reader,
            Compression::Gzip | Compression::Bgzf => niffler::get_reader(reader)?.0,
        };

        let (content, reader) = sniff(reader, BCF_MAGIC.len())?;
        let container = detect_container(&content)?;
        log::debug!("detected {} input ({} compression)", container, compression);
        Ok(Self {
            inner: Box::new(BufReader::new(reader)),
            compression,
            container,
        })
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn container(&self) -> Container {
        self.container
    }
}

/// Reads up to `length` leading bytes and returns them together with a
/// reader that still yields the full stream.
fn sniff(mut reader: Box<dyn Read>, length: usize) -> Result<(Vec<u8>, Box<dyn Read>)> {
    let mut magic = vec![0u8; length];
    let mut filled = 0;
    while filled < length {
        match reader.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(from_read_error(e)),
        }
    }
    magic.truncate(filled);
    let chained = Cursor::new(magic.clone()).chain(reader);
    Ok((magic, Box::new(chained)))
}

fn detect_compression(magic: &[u8]) -> Result<Compression> {
    if magic.is_empty() {
        return Err(VcfError::TruncatedInput("input is empty".into()));
    }
    if magic.starts_with(GZIP_MAGIC) {
        let is_bgzf = magic.len() >= SNIFF_LENGTH
            && magic[3] & GZIP_FLAG_FEXTRA != 0
            && &magic[12..14] == b"BC";
        return Ok(if is_bgzf {
            Compression::Bgzf
        } else {
            Compression::Gzip
        });
    }
    for (name, other) in [("bzip2", BZIP2_MAGIC), ("xz", XZ_MAGIC), ("zstd", ZSTD_MAGIC)] {
        if magic.starts_with(other) {
            return Err(VcfError::UnsupportedEncoding(format!(
                "{} compressed input",
                name
            )));
        }
    }
    Ok(Compression::None)
}

fn detect_container(content: &[u8]) -> Result<Container> {
    if content.is_empty() {
        return Err(VcfError::TruncatedInput(
            "no data after decompression".into(),
        ));
    }
    if content.starts_with(BCF_MAGIC) {
        Ok(Container::Bcf)
    } else if content[0] == b'#' {
        Ok(Container::Vcf)
    } else {
        Err(VcfError::UnsupportedEncoding(format!(
            "unrecognized leading bytes {:02x?}",
            content
        )))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::GzBuilder;
    use std::io::Write;

    pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    pub(crate) fn bgzip(data: &[u8]) -> Vec<u8> {
        // BSIZE is not inspected while decompressing sequentially
        let mut encoder = GzBuilder::new()
            .extra(vec![b'B', b'C', 2, 0, 0, 0])
            .write(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn read_all(stream: Stream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut inner = stream.inner;
        inner.read_to_end(&mut out).unwrap();
        out
    }

    const TEXT: &[u8] = b"##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

    #[test]
    fn test_plain_text_passes_through() {
        let stream = Stream::new(Cursor::new(TEXT.to_vec())).unwrap();
        assert_eq!(stream.compression(), Compression::None);
        assert_eq!(stream.container(), Container::Vcf);
        assert_eq!(read_all(stream), TEXT);
    }

    #[test]
    fn test_gzip_is_detected_and_decompressed() {
        let stream = Stream::new(Cursor::new(gzip(TEXT))).unwrap();
        assert_eq!(stream.compression(), Compression::Gzip);
        assert_eq!(read_all(stream), TEXT);
    }

    #[test]
    fn test_bgzf_is_detected() {
        let stream = Stream::new(Cursor::new(bgzip(TEXT))).unwrap();
        assert_eq!(stream.compression(), Compression::Bgzf);
        assert_eq!(stream.container(), Container::Vcf);
        assert_eq!(read_all(stream), TEXT);
    }

    #[test]
    fn test_bcf_magic_is_detected_after_decompression() {
        let mut data = b"BCF\x02\x02".to_vec();
        data.extend_from_slice(&[0, 0, 0, 0]);
        let stream = Stream::new(Cursor::new(gzip(&data))).unwrap();
        assert_eq!(stream.container(), Container::Bcf);
    }

    #[test]
    fn test_unsupported_magic() {
        let err = Stream::new(Cursor::new(b"BZh91AY&SY".to_vec())).err().unwrap();
        assert!(matches!(err, VcfError::UnsupportedEncoding(_)));
        let err = Stream::new(Cursor::new(b"\x00\x01garbage".to_vec())).err().unwrap();
        assert!(matches!(err, VcfError::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_empty_input_is_truncated() {
        let err = Stream::new(Cursor::new(Vec::new())).err().unwrap();
        assert!(matches!(err, VcfError::TruncatedInput(_)));
    }

    #[test]
    fn test_truncated_gzip_block() {
        let compressed = gzip(&TEXT.repeat(50));
        let cut = compressed[..compressed.len() / 2].to_vec();
        let result = Stream::new(Cursor::new(cut)).and_then(|stream| {
            let mut out = Vec::new();
            let mut inner = stream.inner;
            inner.read_to_end(&mut out).map_err(from_read_error)?;
            Ok(out)
        });
        assert!(matches!(result, Err(VcfError::TruncatedInput(_))));
    }
}
