//! Quantisation catalogues: named schemes and their bits-per-weight.
//!
//! Two catalogues are provided:
//! - [`QuantCatalog::Gguf`]: the discrete set of llama.cpp quantisation types
//! - [`QuantCatalog::Exl2`]: a continuous 2.00–6.00 BPW range in 0.05 steps
//!
//! Both are stored highest-BPW first so a linear scan visits the most
//! precise scheme before any cheaper one.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantError {
    #[error("Invalid quantisation '{token}' (did you mean '{suggestion}'?)")]
    InvalidQuantisation { token: String, suggestion: String },

    #[error("Unknown quantisation catalogue '{0}' (expected 'gguf' or 'exl2')")]
    UnknownCatalog(String),
}

/// A single catalogue entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantEntry {
    /// Catalogue key (e.g. "Q4_K_M" or "4.85").
    pub name: String,

    /// Average bits per weight.
    pub bpw: f64,
}

/// llama.cpp quantisation types, descending by BPW. Equal BPW keeps
/// declaration order.
const GGUF_TABLE: &[(&str, f64)] = &[
    ("Q8_0", 8.5),
    ("Q6_K", 6.59),
    ("Q5_K_L", 5.75),
    ("Q5_K_M", 5.69),
    ("Q5_K_S", 5.54),
    ("Q5_0", 5.54),
    ("Q4_K_L", 4.9),
    ("Q4_K_M", 4.85),
    ("Q4_K_S", 4.58),
    ("Q4_0", 4.55),
    ("IQ4_NL", 4.5),
    ("Q3_K_L", 4.27),
    ("IQ4_XS", 4.25),
    ("Q3_K_M", 3.91),
    ("IQ3_M", 3.7),
    ("IQ3_S", 3.5),
    ("Q3_K_S", 3.5),
    ("Q2_K", 3.35),
    ("IQ3_XS", 3.3),
    ("IQ3_XXS", 3.06),
    ("IQ2_M", 2.7),
    ("IQ2_S", 2.5),
    ("IQ2_XS", 2.31),
    ("IQ2_XXS", 2.06),
    ("IQ1_S", 1.56),
];

const EXL2_MAX_CENTI_BPW: u32 = 600;
const EXL2_MIN_CENTI_BPW: u32 = 200;
const EXL2_STEP_CENTI_BPW: u32 = 5;

static GGUF_ENTRIES: LazyLock<Vec<QuantEntry>> = LazyLock::new(|| {
    GGUF_TABLE
        .iter()
        .map(|&(name, bpw)| QuantEntry {
            name: name.to_string(),
            bpw,
        })
        .collect()
});

static EXL2_ENTRIES: LazyLock<Vec<QuantEntry>> = LazyLock::new(|| {
    // Integer hundredths avoid accumulating float error across 81 steps.
    (EXL2_MIN_CENTI_BPW..=EXL2_MAX_CENTI_BPW)
        .rev()
        .step_by(EXL2_STEP_CENTI_BPW as usize)
        .map(|centi| {
            let bpw = f64::from(centi) / 100.0;
            QuantEntry {
                name: format!("{bpw:.2}"),
                bpw,
            }
        })
        .collect()
});

/// Selects one of the two quantisation catalogues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantCatalog {
    /// Named llama.cpp types (Q8_0, Q4_K_M, IQ2_XS, ...).
    Gguf,
    /// ExLlamaV2 continuous BPW range.
    Exl2,
}

impl QuantCatalog {
    /// Catalogue entries, highest BPW first.
    pub fn entries(&self) -> &'static [QuantEntry] {
        match self {
            QuantCatalog::Gguf => &GGUF_ENTRIES,
            QuantCatalog::Exl2 => &EXL2_ENTRIES,
        }
    }

    /// Case-insensitive exact lookup of a catalogue key.
    pub fn lookup(&self, name: &str) -> Option<&'static QuantEntry> {
        self.entries()
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for QuantCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantCatalog::Gguf => write!(f, "gguf"),
            QuantCatalog::Exl2 => write!(f, "exl2"),
        }
    }
}

impl FromStr for QuantCatalog {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gguf" => Ok(QuantCatalog::Gguf),
            "exl2" => Ok(QuantCatalog::Exl2),
            _ => Err(QuantError::UnknownCatalog(s.to_string())),
        }
    }
}

/// Resolve a BPW token: a literal number, or a catalogue key (any case).
///
/// On a miss the error carries the closest catalogue key by edit distance.
pub fn resolve_bpw(token: &str) -> Result<f64, QuantError> {
    let token = token.trim();

    if let Ok(bpw) = token.parse::<f64>() {
        if bpw.is_finite() && bpw > 0.0 {
            return Ok(bpw);
        }
    }

    for catalog in [QuantCatalog::Gguf, QuantCatalog::Exl2] {
        if let Some(entry) = catalog.lookup(token) {
            return Ok(entry.bpw);
        }
    }

    Err(QuantError::InvalidQuantisation {
        token: token.to_string(),
        suggestion: nearest_key(token).to_string(),
    })
}

/// The catalogue key (across both catalogues) with the smallest
/// case-insensitive edit distance to `token`. Ties go to the earlier key.
pub fn nearest_key(token: &str) -> &'static str {
    let needle = token.to_ascii_uppercase();
    let mut best: Option<(&'static str, usize)> = None;

    for entry in GGUF_ENTRIES.iter().chain(EXL2_ENTRIES.iter()) {
        let distance = levenshtein(&needle, &entry.name.to_ascii_uppercase());
        match best {
            Some((_, d)) if d <= distance => {}
            _ => best = Some((entry.name.as_str(), distance)),
        }
    }

    best.map(|(name, _)| name).unwrap_or_default()
}

/// Classic two-row Levenshtein distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_catalogue_keys() {
        assert_eq!(resolve_bpw("Q4_K_M").unwrap(), 4.85);
        assert_eq!(resolve_bpw("q4_k_m").unwrap(), 4.85);
        assert_eq!(resolve_bpw(" IQ2_XXS ").unwrap(), 2.06);
        assert_eq!(resolve_bpw("Q8_0").unwrap(), 8.5);
    }

    #[test]
    fn test_resolve_numeric_token() {
        assert_eq!(resolve_bpw("5.5").unwrap(), 5.5);
        assert_eq!(resolve_bpw("16").unwrap(), 16.0);
    }

    #[test]
    fn test_resolve_rejects_non_positive() {
        assert!(resolve_bpw("0").is_err());
        assert!(resolve_bpw("-4").is_err());
        assert!(resolve_bpw("NaN").is_err());
    }

    #[test]
    fn test_invalid_token_suggests_nearest() {
        let err = resolve_bpw("Q4_KM").unwrap_err();
        assert_eq!(
            err,
            QuantError::InvalidQuantisation {
                token: "Q4_KM".to_string(),
                suggestion: "Q4_K_M".to_string(),
            }
        );

        match resolve_bpw("iq3_xxx").unwrap_err() {
            QuantError::InvalidQuantisation { suggestion, .. } => assert_eq!(suggestion, "IQ3_XXS"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_every_key_resolves_to_its_bpw() {
        for catalog in [QuantCatalog::Gguf, QuantCatalog::Exl2] {
            for entry in catalog.entries() {
                assert_eq!(resolve_bpw(&entry.name).unwrap(), entry.bpw);
                assert_eq!(resolve_bpw(&entry.name.to_lowercase()).unwrap(), entry.bpw);
            }
        }
    }

    #[test]
    fn test_exl2_bpw_formats_back_to_key() {
        for entry in QuantCatalog::Exl2.entries() {
            let bpw = resolve_bpw(&entry.name).unwrap();
            let formatted = format!("{bpw:.2}");
            assert_eq!(nearest_key(&formatted), entry.name);
            assert_eq!(QuantCatalog::Exl2.lookup(&formatted).map(|e| e.bpw), Some(bpw));
        }
    }

    #[test]
    fn test_catalogues_sorted_descending() {
        for catalog in [QuantCatalog::Gguf, QuantCatalog::Exl2] {
            let entries = catalog.entries();
            assert!(entries.windows(2).all(|w| w[0].bpw >= w[1].bpw), "{catalog}");
        }
    }

    #[test]
    fn test_exl2_range() {
        let entries = QuantCatalog::Exl2.entries();
        assert_eq!(entries.len(), 81);
        assert_eq!(entries[0].name, "6.00");
        assert_eq!(entries[0].bpw, 6.0);
        assert_eq!(entries[80].name, "2.00");
        assert_eq!(entries[80].bpw, 2.0);
        assert!(QuantCatalog::Exl2.lookup("4.85").is_some());
    }

    #[test]
    fn test_gguf_size() {
        assert_eq!(QuantCatalog::Gguf.entries().len(), 25);
    }

    #[test]
    fn test_catalog_from_str() {
        assert_eq!("GGUF".parse::<QuantCatalog>().unwrap(), QuantCatalog::Gguf);
        assert_eq!("exl2".parse::<QuantCatalog>().unwrap(), QuantCatalog::Exl2);
        assert!("awq".parse::<QuantCatalog>().is_err());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("KITTEN", "SITTING"), 3);
        assert_eq!(levenshtein("", "ABC"), 3);
        assert_eq!(levenshtein("Q4_0", "Q4_0"), 0);
    }
}
