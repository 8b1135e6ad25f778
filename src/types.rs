use std::fmt;

use itertools::Itertools;
use num_enum::TryFromPrimitive;

pub(crate) const MISSING_INT_8: i32 = i8::MIN as i32;
pub(crate) const END_OF_VECTOR_INT_8: i32 = i8::MIN as i32 + 1;
pub(crate) const MISSING_INT_16: i32 = i16::MIN as i32;
pub(crate) const END_OF_VECTOR_INT_16: i32 = i16::MIN as i32 + 1;
pub(crate) const MISSING_INT_32: i32 = i32::MIN;
pub(crate) const END_OF_VECTOR_INT_32: i32 = i32::MIN + 1;
pub(crate) const MISSING_FLOAT: u32 = 0x7F80_0001;
pub(crate) const END_OF_VECTOR_FLOAT: u32 = 0x7F80_0002;

pub(crate) const MISSING: &str = ".";

#[derive(Debug)]
pub struct TypeDescriptor {
    pub(crate) kind: TypeKind,
    pub(crate) num_elements: usize,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, TryFromPrimitive)]
#[repr(u8)]
pub enum TypeKind {
    Missing = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    // 4 is reserved
    Float32 = 5,
    // 6 is reserved
    Char = 7,
}

/// A BCF typed vector with sentinels already resolved: missing elements
/// are `None`, end-of-vector padding is dropped.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TypedValue {
    Missing,
    Int(Vec<Option<i32>>),
    Float(Vec<Option<f32>>),
    Char(Vec<u8>),
}

/// A decoded INFO value.
///
/// Sequence variants hold `None` for individual missing (`.`) elements.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    Integer(i32),
    Float(f32),
    Flag,
    Character(char),
    String(String),
    IntegerArray(Vec<Option<i32>>),
    FloatArray(Vec<Option<f32>>),
    CharacterArray(Vec<Option<char>>),
    StringArray(Vec<Option<String>>),
    /// The whole value was `.`.
    Missing,
}

impl InfoValue {
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            InfoValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            InfoValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            InfoValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Integer elements of a scalar or sequence value.
    pub fn integers(&self) -> Option<Vec<Option<i32>>> {
        match self {
            InfoValue::Integer(v) => Some(vec![Some(*v)]),
            InfoValue::IntegerArray(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Float elements of a scalar or sequence value.
    pub fn floats(&self) -> Option<Vec<Option<f32>>> {
        match self {
            InfoValue::Float(v) => Some(vec![Some(*v)]),
            InfoValue::FloatArray(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, InfoValue::Missing)
    }

    /// Number of comma-separated values, as written in VCF.
    pub fn len(&self) -> usize {
        match self {
            InfoValue::Flag => 0,
            InfoValue::IntegerArray(v) => v.len(),
            InfoValue::FloatArray(v) => v.len(),
            InfoValue::CharacterArray(v) => v.len(),
            InfoValue::StringArray(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Percent-encodes the characters VCF reserves inside INFO values.
pub(crate) fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ';' => out.push_str("%3B"),
            '=' => out.push_str("%3D"),
            ',' => out.push_str("%2C"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            '\t' => out.push_str("%09"),
            c => out.push(c),
        }
    }
    out
}

/// Decodes `%XX` escapes; malformed escapes are kept verbatim.
pub(crate) fn percent_decode(s: &str) -> String {
    if !s.contains('%') {
        return s.to_owned();
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1..i + 3].iter().all(u8::is_ascii_hexdigit)
        {
            if let Some(b) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn write_elements<T, F>(f: &mut fmt::Formatter<'_>, values: &[Option<T>], display: F) -> fmt::Result
where
    F: Fn(&T) -> String,
{
    let joined = values
        .iter()
        .map(|v| v.as_ref().map(&display).unwrap_or_else(|| MISSING.to_owned()))
        .join(",");
    f.write_str(&joined)
}

impl fmt::Display for InfoValue {
    /// Writes the value as it appears after `KEY=` in a VCF INFO column.
    /// A `Flag` writes nothing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoValue::Integer(v) => write!(f, "{}", v),
            InfoValue::Float(v) => write!(f, "{}", v),
            InfoValue::Flag => Ok(()),
            InfoValue::Character(c) => f.write_str(&percent_encode(&c.to_string())),
            InfoValue::String(s) => f.write_str(&percent_encode(s)),
            InfoValue::IntegerArray(v) => write_elements(f, v, i32::to_string),
            InfoValue::FloatArray(v) => write_elements(f, v, f32::to_string),
            InfoValue::CharacterArray(v) => {
                write_elements(f, v, |c: &char| percent_encode(&c.to_string()))
            }
            InfoValue::StringArray(v) => write_elements(f, v, |s: &String| percent_encode(s)),
            InfoValue::Missing => f.write_str(MISSING),
        }
    }
}

/// The FILTER column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `.`: filters have not been applied.
    Missing,
    Pass,
    /// Names of the filters this site failed.
    Failed(Vec<String>),
}

impl Filter {
    pub fn is_pass(&self) -> bool {
        matches!(self, Filter::Pass)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Missing => f.write_str(MISSING),
            Filter::Pass => f.write_str("PASS"),
            Filter::Failed(names) => f.write_str(&names.join(";")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_sequences_with_missing() {
        assert_eq!(
            InfoValue::IntegerArray(vec![Some(1), None, Some(3)]).to_string(),
            "1,.,3"
        );
        assert_eq!(InfoValue::FloatArray(vec![Some(0.25), None]).to_string(), "0.25,.");
        assert_eq!(InfoValue::Missing.to_string(), ".");
        assert_eq!(InfoValue::Flag.to_string(), "");
    }

    #[test]
    fn test_percent_coding() {
        assert_eq!(percent_decode("a%3Bb%3Dc"), "a;b=c");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("a%+5b"), "a%+5b");
        assert_eq!(percent_decode("%2c%2C"), ",,");
        assert_eq!(percent_encode("a;b=c,d%"), "a%3Bb%3Dc%2Cd%25");
        assert_eq!(
            InfoValue::String("x;y".into()).to_string(),
            "x%3By"
        );
    }

    #[test]
    fn test_accessors() {
        assert_eq!(InfoValue::Integer(4).as_integer(), Some(4));
        assert_eq!(InfoValue::Float(4.0).as_integer(), None);
        assert_eq!(
            InfoValue::Integer(4).integers(),
            Some(vec![Some(4)])
        );
        assert_eq!(InfoValue::StringArray(vec![None, None]).len(), 2);
        assert!(InfoValue::Flag.is_empty());
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(Filter::Missing.to_string(), ".");
        assert_eq!(Filter::Pass.to_string(), "PASS");
        assert_eq!(
            Filter::Failed(vec!["q10".into(), "s50".into()]).to_string(),
            "q10;s50"
        );
    }
}
