//! Typed decoding of INFO values and of the fixed VCF columns.

use indexmap::IndexMap;

use crate::error::{Result, VcfError};
use crate::header::{FieldType, Header, HeaderFieldSpec, Number};
use crate::tokenizer::Columns;
use crate::types::{percent_decode, Filter, InfoValue, TypedValue, MISSING};

/// `KEY` / `KEY=VALUE` pairs of an INFO column, in order.
pub(crate) fn info_pairs(column: &str) -> impl Iterator<Item = (&str, Option<&str>)> {
    let column = if column == MISSING { "" } else { column };
    column
        .split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (pair, None),
        })
}

/// Decodes a whole INFO column.
pub(crate) fn info_column(
    header: &Header,
    column: &str,
    n_alt: usize,
    strict: bool,
    line: usize,
) -> Result<IndexMap<String, InfoValue>> {
    let mut info = IndexMap::new();
    for (key, raw) in info_pairs(column) {
        if info.contains_key(key) {
            if strict {
                return Err(VcfError::invalid_value(line, key, "key occurs twice"));
            }
            log::warn!("line {}: ignoring repeated INFO key {}", line, key);
            continue;
        }
        let value = info_field(header, key, raw, n_alt, strict, line)?;
        info.insert(key.to_owned(), value);
    }
    Ok(info)
}

/// Decodes the raw value of one INFO key according to its header
/// declaration.
pub(crate) fn info_field(
    header: &Header,
    key: &str,
    raw: Option<&str>,
    n_alt: usize,
    strict: bool,
    line: usize,
) -> Result<InfoValue> {
    let spec = match header.info_spec(key) {
        Some(spec) => spec,
        None if strict => {
            return Err(VcfError::UnknownInfoKey {
                line,
                key: key.to_owned(),
            })
        }
        None => {
            log::warn!("line {}: INFO key {} is not declared, keeping it untyped", line, key);
            return Ok(untyped(raw));
        }
    };
    match (spec.kind(), raw) {
        (FieldType::Flag, None) => Ok(InfoValue::Flag),
        (FieldType::Flag, Some(value)) => Err(VcfError::invalid_value(
            line,
            key,
            format!("Flag must not have a value, found '{}'", value),
        )),
        (_, None) => Err(VcfError::invalid_value(line, key, "value is missing")),
        (_, Some(MISSING)) => Ok(InfoValue::Missing),
        (_, Some(raw)) => text_value(spec, raw, n_alt, strict, line),
    }
}

fn untyped(raw: Option<&str>) -> InfoValue {
    match raw {
        None => InfoValue::Flag,
        Some(MISSING) => InfoValue::Missing,
        Some(raw) if raw.contains(',') => InfoValue::StringArray(
            raw.split(',')
                .map(|t| if t == MISSING { None } else { Some(percent_decode(t)) })
                .collect(),
        ),
        Some(raw) => InfoValue::String(percent_decode(raw)),
    }
}

/// Checks the number of values against the declaration and tells whether
/// the value is a scalar.
fn arity(spec: &HeaderFieldSpec, found: usize, n_alt: usize, strict: bool, line: usize) -> Result<bool> {
    // G depends on ploidy, which is unknown at site level
    let expected = match spec.number() {
        Number::Genotypes | Number::Unknown => None,
        number => number.resolve(n_alt),
    };
    if let Some(expected) = expected {
        if strict && expected != found {
            return Err(VcfError::ArityMismatch {
                line,
                key: spec.id().clone(),
                expected,
                found,
            });
        }
    }
    Ok(expected == Some(1) && found == 1)
}

fn shape<T>(
    values: Vec<Option<T>>,
    scalar: bool,
    one: fn(T) -> InfoValue,
    many: fn(Vec<Option<T>>) -> InfoValue,
) -> InfoValue {
    if scalar {
        match values.into_iter().next().flatten() {
            Some(v) => one(v),
            None => InfoValue::Missing,
        }
    } else {
        many(values)
    }
}

fn tokens<T, F>(raw: &str, key: &str, line: usize, parse: F) -> Result<Vec<Option<T>>>
where
    F: Fn(&str) -> Option<T>,
{
    raw.split(',')
        .map(|token| {
            if token == MISSING {
                return Ok(None);
            }
            parse(token).map(Some).ok_or_else(|| {
                VcfError::invalid_value(line, key, format!("cannot parse '{}'", token))
            })
        })
        .collect()
}

fn single_char(token: &str) -> Option<char> {
    let decoded = percent_decode(token);
    let mut chars = decoded.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn text_value(
    spec: &HeaderFieldSpec,
    raw: &str,
    n_alt: usize,
    strict: bool,
    line: usize,
) -> Result<InfoValue> {
    let key = spec.id().as_str();
    let found = raw.split(',').count();
    let scalar = arity(spec, found, n_alt, strict, line)?;
    let value = match spec.kind() {
        FieldType::Integer => shape(
            tokens(raw, key, line, |t| t.parse::<i32>().ok())?,
            scalar,
            InfoValue::Integer,
            InfoValue::IntegerArray,
        ),
        FieldType::Float => shape(
            tokens(raw, key, line, |t| t.parse::<f32>().ok())?,
            scalar,
            InfoValue::Float,
            InfoValue::FloatArray,
        ),
        FieldType::Character => shape(
            tokens(raw, key, line, single_char)?,
            scalar,
            InfoValue::Character,
            InfoValue::CharacterArray,
        ),
        FieldType::String => shape(
            tokens(raw, key, line, |t| Some(percent_decode(t)))?,
            scalar,
            InfoValue::String,
            InfoValue::StringArray,
        ),
        FieldType::Flag => InfoValue::Flag,
    };
    Ok(value)
}

/// Converts a BCF typed vector according to the field's declaration.
pub(crate) fn typed_value(
    spec: &HeaderFieldSpec,
    value: TypedValue,
    n_alt: usize,
    strict: bool,
    line: usize,
) -> Result<InfoValue> {
    let key = spec.id().as_str();
    let mismatch = || {
        VcfError::invalid_value(
            line,
            key,
            format!("encoded type does not match declared {}", spec.kind()),
        )
    };
    match (spec.kind(), value) {
        (FieldType::Flag, _) => Ok(InfoValue::Flag),
        (_, TypedValue::Missing) => Ok(InfoValue::Missing),
        (FieldType::Integer, TypedValue::Int(values)) => {
            if values.iter().all(Option::is_none) && values.len() <= 1 {
                return Ok(InfoValue::Missing);
            }
            let scalar = arity(spec, values.len(), n_alt, strict, line)?;
            Ok(shape(values, scalar, InfoValue::Integer, InfoValue::IntegerArray))
        }
        (FieldType::Float, TypedValue::Float(values)) => {
            if values.iter().all(Option::is_none) && values.len() <= 1 {
                return Ok(InfoValue::Missing);
            }
            let scalar = arity(spec, values.len(), n_alt, strict, line)?;
            Ok(shape(values, scalar, InfoValue::Float, InfoValue::FloatArray))
        }
        (FieldType::String, TypedValue::Char(bytes))
        | (FieldType::Character, TypedValue::Char(bytes)) => {
            let raw = std::str::from_utf8(&bytes)
                .map_err(|e| VcfError::invalid_value(line, key, e.to_string()))?;
            if raw.is_empty() || raw == MISSING {
                return Ok(InfoValue::Missing);
            }
            text_value(spec, raw, n_alt, strict, line)
        }
        _ => Err(mismatch()),
    }
}

/// The decoded fixed columns of a data line, INFO excluded.
pub(crate) struct Site {
    pub(crate) chrom: String,
    pub(crate) pos: u64,
    pub(crate) ids: Vec<String>,
    pub(crate) ref_allele: String,
    pub(crate) alt_alleles: Vec<String>,
    pub(crate) qual: Option<f32>,
    pub(crate) filter: Filter,
}

pub(crate) fn site(columns: &Columns<'_>, line: usize) -> Result<Site> {
    let pos = columns
        .pos
        .parse::<u64>()
        .ok()
        .filter(|&pos| pos > 0)
        .ok_or_else(|| VcfError::InvalidPosition {
            line,
            value: columns.pos.to_owned(),
        })?;
    let qual = match columns.qual {
        MISSING => None,
        qual => Some(
            qual.parse::<f32>()
                .map_err(|_| VcfError::invalid_value(line, "QUAL", format!("'{}'", qual)))?,
        ),
    };
    Ok(Site {
        chrom: columns.chrom.to_owned(),
        pos,
        ids: split_list(columns.id, ';'),
        ref_allele: columns.ref_allele.to_owned(),
        alt_alleles: split_list(columns.alt, ','),
        qual,
        filter: filter(columns.filter),
    })
}

fn split_list(column: &str, separator: char) -> Vec<String> {
    if column == MISSING || column.is_empty() {
        Vec::new()
    } else {
        column.split(separator).map(str::to_owned).collect()
    }
}

pub(crate) fn filter(column: &str) -> Filter {
    match column {
        MISSING | "" => Filter::Missing,
        "PASS" => Filter::Pass,
        names => Filter::Failed(names.split(';').map(str::to_owned).collect()),
    }
}
