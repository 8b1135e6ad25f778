use std::collections::HashSet;
use std::fmt;

/// Predicate over CHROM deciding whether a record is decoded at all.
#[cfg(not(feature = "sync"))]
pub type RegionFilter = Box<dyn Fn(&str) -> bool>;
#[cfg(feature = "sync")]
pub type RegionFilter = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Options passed when opening a file.
///
/// ```
/// use vcf_info::Config;
///
/// let config = Config::default()
///     .strict(false)
///     .chromosomes(["chr1", "chr2"]);
/// assert!(config.accepts("chr2"));
/// assert!(!config.accepts("chrX"));
/// ```
pub struct Config {
    /// Decode INFO per key on access instead of while reading.
    pub lazy: bool,
    /// Stop at the first malformed record instead of skipping it; also
    /// makes undeclared INFO keys and arity mismatches errors.
    pub strict: bool,
    pub region_filter: Option<RegionFilter>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            lazy: false,
            strict: true,
            region_filter: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("lazy", &self.lazy)
            .field("strict", &self.strict)
            .field("region_filter", &self.region_filter.is_some())
            .finish()
    }
}

impl Config {
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[cfg(not(feature = "sync"))]
    pub fn region_filter<F: Fn(&str) -> bool + 'static>(mut self, filter: F) -> Self {
        self.region_filter = Some(Box::new(filter));
        self
    }

    #[cfg(feature = "sync")]
    pub fn region_filter<F: Fn(&str) -> bool + Send + Sync + 'static>(mut self, filter: F) -> Self {
        self.region_filter = Some(Box::new(filter));
        self
    }

    /// Restricts reading to the given chromosomes.
    pub fn chromosomes<I, S>(self, chromosomes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wanted: HashSet<String> = chromosomes.into_iter().map(Into::into).collect();
        self.region_filter(move |chrom| wanted.contains(chrom))
    }

    /// Whether records on `chrom` pass the region filter.
    pub fn accepts(&self, chrom: &str) -> bool {
        self.region_filter.as_ref().map_or(true, |filter| filter(chrom))
    }
}
