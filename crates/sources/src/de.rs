//! Lenient field decoders. Both APIs send numbers as JSON strings in some
//! responses and as numbers in others.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Loose {
    fn into_string(self) -> String {
        match self {
            Loose::Int(n) => n.to_string(),
            Loose::Float(f) => f.to_string(),
            Loose::Str(s) => s,
        }
    }
}

pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?
        .map(Loose::into_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Loose::deserialize(d)? {
        Loose::Int(n) => Ok(n),
        Loose::Float(f) if f.fract() == 0.0 => Ok(f as i64),
        Loose::Float(f) => Err(serde::de::Error::custom(format!("expected integer, got {f}"))),
        Loose::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected integer, got '{s}'"))),
    }
}

pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Option::<Loose>::deserialize(d)? {
        None => Ok(None),
        Some(Loose::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(Loose::Int(n)) => Ok(Some(n)),
        Some(other) => {
            let s = other.into_string();
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.fract() == 0.0)
                .map(|f| Some(f as i64))
                .ok_or_else(|| serde::de::Error::custom(format!("expected integer, got '{s}'")))
        }
    }
}
