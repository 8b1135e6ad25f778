//! Streaming reader for the site-level part of VCF and BCF files, with
//! typed INFO decoding driven by the header declarations.
//!
//! ```no_run
//! let reader = vcf_info::open("calls.vcf.gz")?;
//! for record in reader {
//!     let record = record?;
//!     if let Some(an) = record.info_get("AN")?.and_then(|v| v.as_integer()) {
//!         println!("{}:{} AN={}", record.chrom(), record.pos(), an);
//!     }
//! }
//! # Ok::<(), vcf_info::VcfError>(())
//! ```

use std::path::Path;

mod bcf;
pub mod config;
pub mod decompress;
pub mod error;
pub mod header;
pub(crate) mod parser;
pub mod reader;
pub mod record;
pub mod tokenizer;
pub mod types;

pub use config::Config;
pub use decompress::{Compression, Container};
pub use error::{Result, VcfError};
pub use header::{FieldType, Header, HeaderFieldSpec, Number};
pub use reader::Reader;
pub use record::VariantRecord;
pub use types::{Filter, InfoValue};

/// Opens a VCF or BCF file, plain, gzip or BGZF compressed, with the
/// default configuration.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Reader> {
    open_with(path, Config::default())
}

pub fn open_with<P: AsRef<Path>>(path: P, config: Config) -> Result<Reader> {
    Reader::from_path(path, config)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_samples() {
        let reader = open("resources/example.vcf").unwrap();
        assert_eq!(reader.header().samples(), &["HG001", "HG002", "HG003"]);
        assert_eq!(reader.header().file_format().as_deref(), Some("VCFv4.2"));
    }

    #[test]
    fn test_example_file() {
        let records = open("resources/example.vcf")
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].info_get("AN").unwrap(), Some(InfoValue::Integer(6)));
        assert_eq!(
            records[3].info_get("AC").unwrap(),
            Some(InfoValue::IntegerArray(vec![Some(1), Some(2)]))
        );
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            open("resources/does-not-exist.vcf"),
            Err(VcfError::Io(_))
        ));
    }
}
