//! The built-in datatypes and their lexical spaces.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

pub(crate) const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub(crate) const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Xs {
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NCName,
    NmToken,
    NmTokens,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    QName,
    Notation,
    AnyUri,
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    NonNegativeInteger,
    PositiveInteger,
    Long,
    Int,
    Short,
    Byte,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Float,
    Double,
    Duration,
    DateTime,
    Date,
    Time,
    GYear,
    GYearMonth,
    GMonth,
    GMonthDay,
    GDay,
    HexBinary,
    Base64Binary,
}

/// How whitespace in a value is normalized before checking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    pub(crate) fn by_name(name: &str) -> Option<Self> {
        match name {
            "preserve" => Some(WhiteSpace::Preserve),
            "replace" => Some(WhiteSpace::Replace),
            "collapse" => Some(WhiteSpace::Collapse),
            _ => None,
        }
    }

    pub(crate) fn apply(self, value: &str) -> String {
        match self {
            WhiteSpace::Preserve => value.to_string(),
            WhiteSpace::Replace => value
                .chars()
                .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
                .collect(),
            WhiteSpace::Collapse => value.split_ascii_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// A value in the value space of a built-in type, as far as ordering and
/// equality go.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Atomic {
    Decimal(Decimal),
    Double(f64),
    Boolean(bool),
    /// Everything else compares by its normalized lexical form.
    Text(String),
}

impl Atomic {
    pub(crate) fn compare(&self, other: &Atomic) -> Option<Ordering> {
        match (self, other) {
            (Atomic::Decimal(a), Atomic::Decimal(b)) => Some(a.cmp(b)),
            (Atomic::Double(a), Atomic::Double(b)) => a.partial_cmp(b),
            (Atomic::Text(a), Atomic::Text(b)) => Some(a.cmp(b)),
            (Atomic::Boolean(a), Atomic::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

static NCNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{L}_][\p{L}\p{N}\p{M}._\-\x{B7}]*$").expect("valid regex")
});
static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{L}_:][\p{L}\p{N}\p{M}._:\-\x{B7}]*$").expect("valid regex")
});
static NMTOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{N}\p{M}._:\-\x{B7}]+$").expect("valid regex"));
static LANGUAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").expect("valid regex"));
static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").expect("valid regex"));
static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+-]?\d+$").expect("valid regex"));
static DOUBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?|[+-]?INF|NaN)$").expect("valid regex")
});
static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$").expect("valid regex")
});
static DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^-?(\d{4,})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})(\.\d+)?(Z|[+-]\d{2}:\d{2})?$",
    )
    .expect("valid regex")
});
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?(\d{4,})-(\d{2})-(\d{2})(Z|[+-]\d{2}:\d{2})?$").expect("valid regex")
});
static TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}):(\d{2}):(\d{2})(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").expect("valid regex")
});
static G_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static G_YEAR_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d{4,}-(\d{2})(Z|[+-]\d{2}:\d{2})?$").expect("valid regex")
});
static G_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--(\d{2})(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static G_MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^--(\d{2})-(\d{2})(Z|[+-]\d{2}:\d{2})?$").expect("valid regex")
});
static G_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^---(\d{2})(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static HEX_BINARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-fA-F]{2})*$").expect("valid regex"));
static BASE64_BINARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9+/]{4})*([A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$")
        .expect("valid regex")
});

impl Xs {
    pub(crate) const ALL: [Xs; 45] = [
        Xs::AnySimpleType,
        Xs::String,
        Xs::NormalizedString,
        Xs::Token,
        Xs::Language,
        Xs::Name,
        Xs::NCName,
        Xs::NmToken,
        Xs::NmTokens,
        Xs::Id,
        Xs::IdRef,
        Xs::IdRefs,
        Xs::Entity,
        Xs::Entities,
        Xs::QName,
        Xs::Notation,
        Xs::AnyUri,
        Xs::Boolean,
        Xs::Decimal,
        Xs::Integer,
        Xs::NonPositiveInteger,
        Xs::NegativeInteger,
        Xs::NonNegativeInteger,
        Xs::PositiveInteger,
        Xs::Long,
        Xs::Int,
        Xs::Short,
        Xs::Byte,
        Xs::UnsignedLong,
        Xs::UnsignedInt,
        Xs::UnsignedShort,
        Xs::UnsignedByte,
        Xs::Float,
        Xs::Double,
        Xs::Duration,
        Xs::DateTime,
        Xs::Date,
        Xs::Time,
        Xs::GYear,
        Xs::GYearMonth,
        Xs::GMonth,
        Xs::GMonthDay,
        Xs::GDay,
        Xs::HexBinary,
        Xs::Base64Binary,
    ];

    pub(crate) fn white_space(&self) -> WhiteSpace {
        match self {
            Xs::String | Xs::AnySimpleType => WhiteSpace::Preserve,
            Xs::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Built-in list types; their length facets count items.
    pub(crate) fn is_list(&self) -> bool {
        matches!(self, Xs::NmTokens | Xs::IdRefs | Xs::Entities)
    }

    fn integer_bounds(&self) -> Option<(Option<Decimal>, Option<Decimal>)> {
        let bounds = match self {
            Xs::Integer => (None, None),
            Xs::NonPositiveInteger => (None, Some(Decimal::ZERO)),
            Xs::NegativeInteger => (None, Some(Decimal::NEGATIVE_ONE)),
            Xs::NonNegativeInteger => (Some(Decimal::ZERO), None),
            Xs::PositiveInteger => (Some(Decimal::ONE), None),
            Xs::Long => (Some(Decimal::from(i64::MIN)), Some(Decimal::from(i64::MAX))),
            Xs::Int => (Some(Decimal::from(i32::MIN)), Some(Decimal::from(i32::MAX))),
            Xs::Short => (Some(Decimal::from(i16::MIN)), Some(Decimal::from(i16::MAX))),
            Xs::Byte => (Some(Decimal::from(i8::MIN)), Some(Decimal::from(i8::MAX))),
            Xs::UnsignedLong => (Some(Decimal::ZERO), Some(Decimal::from(u64::MAX))),
            Xs::UnsignedInt => (Some(Decimal::ZERO), Some(Decimal::from(u32::MAX))),
            Xs::UnsignedShort => (Some(Decimal::ZERO), Some(Decimal::from(u16::MAX))),
            Xs::UnsignedByte => (Some(Decimal::ZERO), Some(Decimal::from(u8::MAX))),
            _ => return None,
        };
        Some(bounds)
    }

    /// Check a whitespace-normalized value against the lexical space and
    /// return its value. The error is a short description of what's wrong.
    pub(crate) fn parse(&self, value: &str) -> Result<Atomic, String> {
        let text = || Atomic::Text(value.to_string());
        let lexical = |regex: &Regex| {
            if regex.is_match(value) {
                Ok(text())
            } else {
                Err(format!("'{}' is not a valid {}", value, self.local_name()))
            }
        };
        match self {
            Xs::AnySimpleType | Xs::String | Xs::NormalizedString | Xs::Token | Xs::AnyUri => {
                Ok(text())
            }
            Xs::Language => lexical(&LANGUAGE),
            Xs::Name => lexical(&NAME),
            Xs::NCName | Xs::Id | Xs::IdRef | Xs::Entity => lexical(&NCNAME),
            Xs::NmToken => lexical(&NMTOKEN),
            Xs::NmTokens | Xs::IdRefs | Xs::Entities => {
                let item = match self {
                    Xs::NmTokens => &*NMTOKEN,
                    _ => &*NCNAME,
                };
                if value.is_empty() {
                    return Err(format!("{} must not be empty", self.local_name()));
                }
                match value.split(' ').find(|token| !item.is_match(token)) {
                    Some(token) => Err(format!(
                        "'{}' is not a valid item of {}",
                        token,
                        self.local_name()
                    )),
                    None => Ok(text()),
                }
            }
            Xs::QName | Xs::Notation => match value.split_once(':') {
                Some((prefix, local)) if NCNAME.is_match(prefix) && NCNAME.is_match(local) => {
                    Ok(text())
                }
                None if NCNAME.is_match(value) => Ok(text()),
                _ => Err(format!("'{}' is not a valid {}", value, self.local_name())),
            },
            Xs::Boolean => match value {
                "true" | "1" => Ok(Atomic::Boolean(true)),
                "false" | "0" => Ok(Atomic::Boolean(false)),
                _ => Err(format!("'{}' is not a valid boolean", value)),
            },
            Xs::Decimal => {
                if !DECIMAL.is_match(value) {
                    return Err(format!("'{}' is not a valid decimal", value));
                }
                parse_decimal(value)
                    .map(Atomic::Decimal)
                    .ok_or_else(|| format!("'{}' is out of range for decimal", value))
            }
            Xs::Float | Xs::Double => {
                if !DOUBLE.is_match(value) {
                    return Err(format!("'{}' is not a valid {}", value, self.local_name()));
                }
                let number = match value {
                    "INF" | "+INF" => f64::INFINITY,
                    "-INF" => f64::NEG_INFINITY,
                    "NaN" => f64::NAN,
                    _ => value
                        .parse::<f64>()
                        .map_err(|_| format!("'{}' is not a valid {}", value, self.local_name()))?,
                };
                Ok(Atomic::Double(number))
            }
            Xs::Duration => {
                if DURATION.is_match(value)
                    && value.bytes().any(|b| b.is_ascii_digit())
                    && !value.ends_with('T')
                {
                    Ok(text())
                } else {
                    Err(format!("'{}' is not a valid duration", value))
                }
            }
            Xs::DateTime => {
                let captures = DATE_TIME
                    .captures(value)
                    .ok_or_else(|| format!("'{}' is not a valid dateTime", value))?;
                check_ranges(value, self, &captures, &[(2, 1, 12), (3, 1, 31), (4, 0, 24), (5, 0, 59), (6, 0, 60)])
            }
            Xs::Date => {
                let captures = DATE
                    .captures(value)
                    .ok_or_else(|| format!("'{}' is not a valid date", value))?;
                check_ranges(value, self, &captures, &[(2, 1, 12), (3, 1, 31)])
            }
            Xs::Time => {
                let captures = TIME
                    .captures(value)
                    .ok_or_else(|| format!("'{}' is not a valid time", value))?;
                check_ranges(value, self, &captures, &[(1, 0, 24), (2, 0, 59), (3, 0, 60)])
            }
            Xs::GYear => lexical(&G_YEAR),
            Xs::GYearMonth => {
                let captures = G_YEAR_MONTH
                    .captures(value)
                    .ok_or_else(|| format!("'{}' is not a valid gYearMonth", value))?;
                check_ranges(value, self, &captures, &[(1, 1, 12)])
            }
            Xs::GMonth => {
                let captures = G_MONTH
                    .captures(value)
                    .ok_or_else(|| format!("'{}' is not a valid gMonth", value))?;
                check_ranges(value, self, &captures, &[(1, 1, 12)])
            }
            Xs::GMonthDay => {
                let captures = G_MONTH_DAY
                    .captures(value)
                    .ok_or_else(|| format!("'{}' is not a valid gMonthDay", value))?;
                check_ranges(value, self, &captures, &[(1, 1, 12), (2, 1, 31)])
            }
            Xs::GDay => {
                let captures = G_DAY
                    .captures(value)
                    .ok_or_else(|| format!("'{}' is not a valid gDay", value))?;
                check_ranges(value, self, &captures, &[(1, 1, 31)])
            }
            Xs::HexBinary => lexical(&HEX_BINARY),
            Xs::Base64Binary => {
                let compact: std::string::String =
                    value.chars().filter(|c| !c.is_whitespace()).collect();
                if BASE64_BINARY.is_match(&compact) {
                    Ok(Atomic::Text(compact))
                } else {
                    Err(format!("'{}' is not a valid base64Binary", value))
                }
            }
            Xs::Integer
            | Xs::NonPositiveInteger
            | Xs::NegativeInteger
            | Xs::NonNegativeInteger
            | Xs::PositiveInteger
            | Xs::Long
            | Xs::Int
            | Xs::Short
            | Xs::Byte
            | Xs::UnsignedLong
            | Xs::UnsignedInt
            | Xs::UnsignedShort
            | Xs::UnsignedByte => {
                if !INTEGER.is_match(value) {
                    return Err(format!("'{}' is not a valid {}", value, self.local_name()));
                }
                let number = parse_decimal(value)
                    .ok_or_else(|| format!("'{}' is out of range for {}", value, self.local_name()))?;
                if let Some((min, max)) = self.integer_bounds() {
                    if min.is_some_and(|min| number < min) || max.is_some_and(|max| number > max) {
                        return Err(format!(
                            "'{}' is out of range for {}",
                            value,
                            self.local_name()
                        ));
                    }
                }
                Ok(Atomic::Decimal(number))
            }
        }
    }

    /// The length of a value as the length facets count it.
    pub(crate) fn length(&self, value: &str) -> usize {
        match self {
            Xs::HexBinary => value.len() / 2,
            Xs::Base64Binary => {
                let data = value.chars().filter(|c| !c.is_whitespace()).count();
                let padding = value.chars().rev().take_while(|c| *c == '=').count();
                (data / 4) * 3 - padding.min(2)
            }
            _ if self.is_list() => value.split(' ').filter(|s| !s.is_empty()).count(),
            _ => value.chars().count(),
        }
    }

    pub(crate) fn local_name(&self) -> &'static str {
        use Xs::*;
        match self {
            AnySimpleType => "anySimpleType",
            String => "string",
            NormalizedString => "normalizedString",
            Token => "token",
            Language => "language",
            Name => "Name",
            NCName => "NCName",
            NmToken => "NMTOKEN",
            NmTokens => "NMTOKENS",
            Id => "ID",
            IdRef => "IDREF",
            IdRefs => "IDREFS",
            Entity => "ENTITY",
            Entities => "ENTITIES",
            QName => "QName",
            Notation => "NOTATION",
            AnyUri => "anyURI",
            Boolean => "boolean",
            Decimal => "decimal",
            Integer => "integer",
            NonPositiveInteger => "nonPositiveInteger",
            NegativeInteger => "negativeInteger",
            NonNegativeInteger => "nonNegativeInteger",
            PositiveInteger => "positiveInteger",
            Long => "long",
            Int => "int",
            Short => "short",
            Byte => "byte",
            UnsignedLong => "unsignedLong",
            UnsignedInt => "unsignedInt",
            UnsignedShort => "unsignedShort",
            UnsignedByte => "unsignedByte",
            Float => "float",
            Double => "double",
            Duration => "duration",
            DateTime => "dateTime",
            Date => "date",
            Time => "time",
            GYear => "gYear",
            GYearMonth => "gYearMonth",
            GMonth => "gMonth",
            GMonthDay => "gMonthDay",
            GDay => "gDay",
            HexBinary => "hexBinary",
            Base64Binary => "base64Binary",
        }
    }
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    let value = value.strip_prefix('+').unwrap_or(value);
    let value = if value.starts_with('.') {
        format!("0{}", value)
    } else if let Some(rest) = value.strip_prefix("-.") {
        format!("-0.{}", rest)
    } else {
        value.to_string()
    };
    let value = value.strip_suffix('.').unwrap_or(&value);
    Decimal::from_str(value).ok().map(|d| d.normalize())
}

/// Check numbered capture groups against inclusive ranges.
fn check_ranges(
    value: &str,
    xs: &Xs,
    captures: &regex::Captures,
    ranges: &[(usize, u32, u32)],
) -> Result<Atomic, String> {
    for (group, min, max) in ranges {
        let field = captures
            .get(*group)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        if field < *min || field > *max {
            return Err(format!("'{}' is not a valid {}", value, xs.local_name()));
        }
    }
    Ok(Atomic::Text(value.to_string()))
}

/// Total and fraction digit counts of a decimal.
pub(crate) fn digits(value: &Decimal) -> (u32, u32) {
    let normalized = value.normalize();
    let fraction = normalized.scale();
    let mantissa = normalized.mantissa().unsigned_abs();
    let total = if mantissa == 0 {
        1
    } else {
        mantissa.to_string().len() as u32
    };
    (total.max(fraction), fraction)
}
