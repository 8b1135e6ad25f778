use std::convert::TryFrom;

use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take};
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map, map_res, opt, rest, value, verify};
use nom::error::{Error, ErrorKind};
use nom::multi::{count, separated_list1};
use nom::number::complete::{le_f32, le_i16, le_i32, le_i8, le_u16, le_u32, le_u8};
use nom::sequence::{delimited, preceded, separated_pair, tuple};
use nom::IResult;

use crate::header::Number;
use crate::types::{
    TypeDescriptor, TypeKind, TypedValue, END_OF_VECTOR_FLOAT, END_OF_VECTOR_INT_16,
    END_OF_VECTOR_INT_32, END_OF_VECTOR_INT_8, MISSING_FLOAT, MISSING_INT_16, MISSING_INT_32,
    MISSING_INT_8,
};

// --- header text ---

pub(crate) fn number(input: &str) -> Result<Number, nom::Err<Error<&str>>> {
    let (_, number) = all_consuming(alt((
        map_res(digit1, |d: &str| d.parse().map(Number::Count)),
        value(Number::AlternateAlleles, tag("A")),
        value(Number::Alleles, tag("R")),
        value(Number::Genotypes, tag("G")),
        value(Number::Unknown, tag(".")),
    )))(input)?;
    Ok(number)
}

/// Splits `##key=value` into key and value.
pub(crate) fn meta_line(input: &str) -> Option<(&str, &str)> {
    let parsed: IResult<&str, (&str, &str)> =
        preceded(tag("##"), separated_pair(is_not("="), char('='), rest))(input);
    parsed.ok().map(|(_, pair)| pair)
}

fn quoted(input: &str) -> IResult<&str, String> {
    let escapes = escaped_transform(
        is_not("\\\""),
        '\\',
        alt((value("\\", tag("\\")), value("\"", tag("\"")))),
    );
    map(delimited(char('"'), opt(escapes), char('"')), Option::unwrap_or_default)(input)
}

fn key_value(input: &str) -> IResult<&str, (&str, String)> {
    separated_pair(
        is_not("<>,="),
        char('='),
        alt((
            quoted,
            map(verify(is_not(",>"), |v: &str| !v.starts_with('"')), str::to_owned),
        )),
    )(input)
}

/// Parses the `<ID=…,Number=…,Description="…">` part of a structured meta
/// line. Quoted values may contain commas and `\"` escapes.
pub(crate) fn structured_value(input: &str) -> Option<Vec<(&str, String)>> {
    let parsed: IResult<&str, Vec<(&str, String)>> = all_consuming(delimited(
        char('<'),
        separated_list1(char(','), key_value),
        char('>'),
    ))(input.trim_end());
    parsed.ok().map(|(_, pairs)| pairs)
}

// --- BCF binary ---

pub(crate) fn bcf_version(input: &[u8]) -> IResult<&[u8], (u8, u8)> {
    let (input, _) = tag(&b"BCF"[..])(input)?;
    tuple((le_u8, le_u8))(input)
}

pub(crate) fn header_length(input: &[u8]) -> IResult<&[u8], u32> {
    le_u32(input)
}

pub(crate) fn record_length(input: &[u8]) -> IResult<&[u8], (u32, u32)> {
    tuple((le_u32, le_u32))(input)
}

/// The fixed-width prefix of a record's shared block.
#[derive(Debug)]
pub(crate) struct SiteFields {
    pub(crate) chrom: i32,
    pub(crate) pos: i32,
    pub(crate) qual: f32,
    pub(crate) n_info: usize,
    pub(crate) n_allele: usize,
}

pub(crate) fn site_fields(input: &[u8]) -> IResult<&[u8], SiteFields> {
    // rlen, n_sample and n_fmt are not needed for site-level decoding
    let (input, (chrom, pos, _rlen, qual, n_info, n_allele, _n_fmt_sample)) =
        tuple((le_i32, le_i32, le_i32, le_f32, le_u16, le_u16, le_u32))(input)?;
    Ok((
        input,
        SiteFields {
            chrom,
            pos,
            qual,
            n_info: n_info as usize,
            n_allele: n_allele as usize,
        },
    ))
}

pub(crate) fn type_descriptor(input: &[u8]) -> IResult<&[u8], TypeDescriptor> {
    let (input, type_descriptor_byte) = le_u8(input)?;
    let kind = TypeKind::try_from(type_descriptor_byte & 0b1111)
        .map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Verify)))?;
    let num_elements = (type_descriptor_byte >> 4) & 0b1111;
    // 15 means the actual length follows as a typed integer
    let (input, num_elements) = if num_elements == 15 {
        let (input, n) = typed_int(input)?;
        let n = usize::try_from(n).map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Verify)))?;
        (input, n)
    } else {
        (input, num_elements as usize)
    };
    Ok((input, TypeDescriptor { kind, num_elements }))
}

/// A single integer preceded by its own type descriptor, as used for
/// dictionary offsets and vector lengths.
pub(crate) fn typed_int(input: &[u8]) -> IResult<&[u8], i32> {
    let (input, TypeDescriptor { kind, num_elements }) = type_descriptor(input)?;
    if num_elements != 1 {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)));
    }
    match kind {
        TypeKind::Int8 => map(le_i8, i32::from)(input),
        TypeKind::Int16 => map(le_i16, i32::from)(input),
        TypeKind::Int32 => le_i32(input),
        _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Verify))),
    }
}

pub(crate) fn typed_string(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (input, value) = typed_value(input)?;
    match value {
        TypedValue::Missing => Ok((input, Vec::new())),
        TypedValue::Char(s) => Ok((input, s)),
        _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Verify))),
    }
}

fn int_values<'a, F>(
    num_elements: usize,
    element: F,
    missing: i32,
    end_of_vector: i32,
) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Vec<Option<i32>>>
where
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], i32>,
{
    map(count(element, num_elements), move |raw: Vec<i32>| {
        raw.into_iter()
            .take_while(|&v| v != end_of_vector)
            .map(|v| if v == missing { None } else { Some(v) })
            .collect()
    })
}

pub(crate) fn typed_value(input: &[u8]) -> IResult<&[u8], TypedValue> {
    let (input, TypeDescriptor { kind, num_elements }) = type_descriptor(input)?;
    match kind {
        TypeKind::Missing => Ok((input, TypedValue::Missing)),
        TypeKind::Int8 => map(
            int_values(
                num_elements,
                map(le_i8, i32::from),
                MISSING_INT_8,
                END_OF_VECTOR_INT_8,
            ),
            TypedValue::Int,
        )(input),
        TypeKind::Int16 => map(
            int_values(
                num_elements,
                map(le_i16, i32::from),
                MISSING_INT_16,
                END_OF_VECTOR_INT_16,
            ),
            TypedValue::Int,
        )(input),
        TypeKind::Int32 => map(
            int_values(num_elements, le_i32, MISSING_INT_32, END_OF_VECTOR_INT_32),
            TypedValue::Int,
        )(input),
        TypeKind::Float32 => {
            let (input, raw) = count(le_u32, num_elements)(input)?;
            let values = raw
                .into_iter()
                .take_while(|&bits| bits != END_OF_VECTOR_FLOAT)
                .map(|bits| {
                    if bits == MISSING_FLOAT {
                        None
                    } else {
                        Some(f32::from_bits(bits))
                    }
                })
                .collect();
            Ok((input, TypedValue::Float(values)))
        }
        TypeKind::Char => {
            let (input, bytes) = take(num_elements)(input)?;
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Ok((input, TypedValue::Char(bytes[..end].to_vec())))
        }
    }
}
