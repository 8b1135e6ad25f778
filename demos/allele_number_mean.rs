//! Prints the mean of the AN INFO field over all records of a VCF/BCF file.
//!
//! cargo run --example allele_number_mean -- calls.vcf.gz

use anyhow::{bail, Context};
use vcf_info::{Config, InfoValue};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => bail!("usage: allele_number_mean <file.vcf[.gz]|file.bcf>"),
    };
    let lenient = std::env::args().any(|arg| arg == "--lenient");

    let reader = vcf_info::open_with(&path, Config::default().lazy(true).strict(!lenient))
        .with_context(|| format!("failed to open {}", path))?;
    let (mut sum, mut n) = (0f64, 0usize);
    for record in reader {
        let record = record?;
        if let Some(InfoValue::Integer(an)) = record.info_get("AN")? {
            sum += an as f64;
            n += 1;
        }
    }
    if n == 0 {
        bail!("no record in {} carries AN", path);
    }
    println!("{}", sum / n as f64);
    Ok(())
}
