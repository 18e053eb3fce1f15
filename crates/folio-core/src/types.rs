use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Number
// ---------------------------------------------------------------------------

/// Volume or chapter number: `3` or `10.5`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(u32),
    Decimal(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => f64::from(i),
            Number::Decimal(f) => f,
        }
    }

    /// Integer part.
    pub fn base(self) -> u32 {
        match self {
            Number::Int(i) => i,
            Number::Decimal(f) => f.trunc() as u32,
        }
    }

    /// Digits after the decimal point as written (`"05"` for `10.05`), `None` for integers.
    pub fn floating(self) -> Option<String> {
        match self {
            Number::Int(_) => None,
            Number::Decimal(f) => {
                let text = f.to_string();
                Some(match text.split_once('.') {
                    Some((_, frac)) => frac.to_string(),
                    None => "0".to_string(),
                })
            }
        }
    }

    /// Split part for a single fractional digit of 5 and above: `.5` is part 1.
    pub fn split_part(self) -> Option<u32> {
        let digits = self.floating()?;
        match digits.parse::<u32>() {
            Ok(d) if digits.len() == 1 && d >= 5 => Some(d - 4),
            _ => None,
        }
    }

    pub fn is_negative(self) -> bool {
        self.as_f64() < 0.0
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.as_f64() == other.as_f64()
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.as_f64().partial_cmp(&other.as_f64())
    }
}

impl From<u32> for Number {
    fn from(v: u32) -> Self {
        Number::Int(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Decimal(v)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Decimal(d) => write!(f, "{d}"),
        }
    }
}

impl std::str::FromStr for Number {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(i) = s.parse::<u32>() {
            return Ok(Number::Int(i));
        }
        match s.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 => Ok(Number::Decimal(f)),
            _ => Err(format!("'{s}' is not a volume number")),
        }
    }
}

// ---------------------------------------------------------------------------
// BracketStyle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketStyle {
    Square,
    #[default]
    Round,
    Curly,
}

impl BracketStyle {
    pub fn pair(self) -> (&'static str, &'static str) {
        match self {
            BracketStyle::Square => ("[", "]"),
            BracketStyle::Round => ("(", ")"),
            BracketStyle::Curly => ("{", "}"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BracketStyle::Square => "square",
            BracketStyle::Round => "round",
            BracketStyle::Curly => "curly",
        }
    }
}

impl fmt::Display for BracketStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BracketStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "square" => Ok(BracketStyle::Square),
            "round" => Ok(BracketStyle::Round),
            "curly" => Ok(BracketStyle::Curly),
            _ => Err(format!("unknown bracket style '{s}' (square, round, curly)")),
        }
    }
}

// ---------------------------------------------------------------------------
// PublicationType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublicationType {
    #[default]
    Digital,
    Magazine,
    Scan,
    Web,
    DigitalRaw,
    MagazineRaw,
    Mix,
    None,
}

impl PublicationType {
    /// Tag used inside page filenames.
    pub fn image_tag(self) -> &'static str {
        match self {
            PublicationType::Digital => "dig",
            PublicationType::Magazine => "mag",
            PublicationType::Scan => "c2c",
            PublicationType::Web => "web",
            PublicationType::DigitalRaw => "raw-d",
            PublicationType::MagazineRaw => "raw-m",
            PublicationType::Mix => "mix",
            PublicationType::None => "",
        }
    }

    /// Tag used inside archive filenames.
    pub fn archive_tag(self) -> &'static str {
        match self {
            PublicationType::Magazine | PublicationType::Scan | PublicationType::MagazineRaw => {
                "c2c"
            }
            _ => "Digital",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PublicationType::Digital => "digital",
            PublicationType::Magazine => "magazine",
            PublicationType::Scan => "scan",
            PublicationType::Web => "web",
            PublicationType::DigitalRaw => "digital-raw",
            PublicationType::MagazineRaw => "magazine-raw",
            PublicationType::Mix => "mix",
            PublicationType::None => "none",
        }
    }
}

impl fmt::Display for PublicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quality {
    Lq,
    Hq,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quality::Lq => "LQ",
            Quality::Hq => "HQ",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_parses_int_or_decimal() {
        let n: Number = serde_yaml::from_str("3").unwrap();
        assert!(matches!(n, Number::Int(3)));
        let d: Number = serde_yaml::from_str("10.5").unwrap();
        assert_eq!(d.base(), 10);
        assert_eq!(d.floating().as_deref(), Some("5"));
        assert_eq!(Number::Int(2), Number::Decimal(2.0));
    }

    #[test]
    fn fraction_digits_keep_leading_zeros() {
        let narrow: Number = serde_yaml::from_str("10.05").unwrap();
        let half: Number = serde_yaml::from_str("10.5").unwrap();
        assert_eq!(narrow.floating().as_deref(), Some("05"));
        assert_ne!(narrow.floating(), half.floating());
        assert_eq!(narrow.split_part(), None);
        assert_eq!(half.split_part(), Some(1));
        assert_eq!(Number::Decimal(3.9).split_part(), Some(5));
        assert_eq!(Number::Decimal(3.2).split_part(), None);
        assert_eq!(Number::Int(3).split_part(), None);
    }

    #[test]
    fn number_from_cli_text() {
        assert!(matches!("7".parse::<Number>(), Ok(Number::Int(7))));
        assert_eq!("7.5".parse::<Number>().unwrap().floating().as_deref(), Some("5"));
        assert!("-1".parse::<Number>().is_err());
        assert!("seven".parse::<Number>().is_err());
    }

    #[test]
    fn publication_tags() {
        let p: PublicationType = serde_yaml::from_str("digital-raw").unwrap();
        assert_eq!(p.image_tag(), "raw-d");
        assert_eq!(p.archive_tag(), "Digital");
        assert_eq!(PublicationType::Scan.archive_tag(), "c2c");
        assert_eq!(PublicationType::None.image_tag(), "");
    }

    #[test]
    fn quality_uses_upper_case() {
        let q: Quality = serde_yaml::from_str("HQ").unwrap();
        assert_eq!(q, Quality::Hq);
        assert_eq!(q.to_string(), "HQ");
    }
}
