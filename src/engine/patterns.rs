use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CATEGORY_PREFIXES: [&str; 13] = [
    "PLE", "CWS", "CE", "RE", "CL", "RL", "TER", "JER", "CEX", "REX", "ORD", "TRX", "SBM",
];
pub const DEFAULT_COMPOUND_PREFIXES: [&str; 4] = ["CC", "RC", "TC", "JC"];

const QUALIFIER_LEN: usize = 5;

/// Token families in the order the alternation tries them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFamily {
    Dotted,
    ExhibitRexDotted,
    ExhibitCompound,
    ExhibitHyphenated,
    RexDotted,
    Compound,
    Hyphenated,
}

impl PatternFamily {
    pub const ALL: [PatternFamily; 7] = [
        Self::Dotted,
        Self::ExhibitRexDotted,
        Self::ExhibitCompound,
        Self::ExhibitHyphenated,
        Self::RexDotted,
        Self::Compound,
        Self::Hyphenated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dotted => "dotted",
            Self::ExhibitRexDotted => "exhibit_rex_dotted",
            Self::ExhibitCompound => "exhibit_compound",
            Self::ExhibitHyphenated => "exhibit_hyphenated",
            Self::RexDotted => "rex_dotted",
            Self::Compound => "compound",
            Self::Hyphenated => "hyphenated",
        }
    }
}

/// Character class allowed inside code blocks. Older prefix sets were digit-only.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeClass {
    #[default]
    Alphanumeric,
    Digits,
}

impl CodeClass {
    fn regex_class(self) -> &'static str {
        match self {
            Self::Alphanumeric => "[A-Z0-9]",
            Self::Digits => "[0-9]",
        }
    }
}

/// Versionable recognizer configuration, loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub version: String,
    pub category_prefixes: Vec<String>,
    pub compound_prefixes: Vec<String>,
    pub code_class: CodeClass,
    /// Identifiers dropped after matching, compared case-insensitively.
    pub ignore_terms: Vec<String>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            version: "2".to_string(),
            category_prefixes: DEFAULT_CATEGORY_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            compound_prefixes: DEFAULT_COMPOUND_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            code_class: CodeClass::Alphanumeric,
            ignore_terms: Vec::new(),
        }
    }
}

pub fn load_pattern_config(path: Option<&Path>) -> Result<PatternConfig> {
    let Some(path) = path else {
        return Ok(PatternConfig::default());
    };

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let config: PatternConfig = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    info!(
        path = %path.display(),
        version = %config.version,
        category_prefixes = config.category_prefixes.len(),
        compound_prefixes = config.compound_prefixes.len(),
        "loaded pattern config"
    );

    Ok(config)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMatch {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub family: PatternFamily,
}

/// A recognized identifier with its comparison form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceToken {
    pub raw: String,
    /// Matched text without the `Exhibit` prefix and with line breaks collapsed.
    pub identifier: String,
    pub normalized: String,
    pub family: PatternFamily,
}

impl ReferenceToken {
    pub fn from_match(found: &ReferenceMatch) -> Self {
        let display = collapse_line_breaks(&found.text);
        Self {
            identifier: strip_exhibit_prefix(&display).to_string(),
            normalized: normalize_identifier(&found.text),
            raw: found.text.clone(),
            family: found.family,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReferencePattern {
    regex: Regex,
    families: Vec<PatternFamily>,
    ignore_terms: Vec<String>,
}

impl ReferencePattern {
    pub fn new(config: &PatternConfig) -> Result<Self> {
        let code = config.code_class.regex_class();
        let category = prefix_alternation(&config.category_prefixes);
        let compound = prefix_alternation(&config.compound_prefixes);

        let mut branches = Vec::<String>::new();
        let mut families = Vec::<PatternFamily>::new();

        for family in PatternFamily::ALL {
            let body = match family {
                PatternFamily::Dotted => Some(
                    r"[A-Z]{3,5}\.\s*[A-Z0-9]{3,4}\.\s*[0-9]{3,4}\.\s*[0-9]{3,6}".to_string(),
                ),
                PatternFamily::ExhibitRexDotted => {
                    Some(format!(r"Exhibit\s+REX-{code}{{3,4}}\.{code}{{3,4}}"))
                }
                PatternFamily::ExhibitCompound => compound.as_ref().map(|prefixes| {
                    format!(r"Exhibit\s+(?:{prefixes})\.{code}{{3,4}}[A-Z]?\.{code}{{3}}")
                }),
                PatternFamily::ExhibitHyphenated => category.as_ref().map(|prefixes| {
                    format!(r"Exhibit\s+(?:{prefixes})-{code}{{3,4}}(?:-{code}{{2,4}})?")
                }),
                PatternFamily::RexDotted => Some(format!(r"REX-{code}{{3,4}}\.{code}{{3,4}}")),
                PatternFamily::Compound => compound.as_ref().map(|prefixes| {
                    format!(r"(?:{prefixes})\.{code}{{3,4}}[A-Z]?\.{code}{{3}}")
                }),
                PatternFamily::Hyphenated => category
                    .as_ref()
                    .map(|prefixes| format!(r"(?:{prefixes})-{code}{{2,4}}(?:-{code}{{2,4}})?")),
            };

            if let Some(body) = body {
                branches.push(format!(r"(?P<{}>\b{body}(?:_\d{{4}})?)", family.as_str()));
                families.push(family);
            }
        }

        if branches.is_empty() {
            bail!("pattern config enables no reference families");
        }

        let source = format!("(?i){}", branches.join("|"));
        let regex = Regex::new(&source).context("failed to compile reference pattern")?;

        let mut pattern = Self {
            regex,
            families,
            ignore_terms: Vec::new(),
        };

        for term in &config.ignore_terms {
            let normalized = normalize_identifier(term);
            if normalized.is_empty() {
                continue;
            }
            if pattern.classify(&normalized).is_none() {
                warn!(term = %term, "ignore term does not match any reference family");
            }
            pattern.ignore_terms.push(normalized);
        }

        Ok(pattern)
    }

    /// Leftmost-first, non-overlapping matches over one page of text.
    pub fn match_all<'a>(&'a self, text: &'a str) -> impl Iterator<Item = ReferenceMatch> + 'a {
        self.regex.captures_iter(text).filter_map(move |captures| {
            self.families.iter().find_map(|family| {
                captures.name(family.as_str()).map(|found| ReferenceMatch {
                    start: found.start(),
                    end: found.end(),
                    text: found.as_str().to_string(),
                    family: *family,
                })
            })
        })
    }

    /// Family of `text` when the whole of it is one reference.
    pub fn classify(&self, text: &str) -> Option<PatternFamily> {
        self.match_all(text)
            .find(|found| found.start == 0 && found.end == text.len())
            .map(|found| found.family)
    }

    pub fn is_ignored(&self, token: &ReferenceToken) -> bool {
        self.ignore_terms.iter().any(|term| *term == token.normalized)
    }
}

fn prefix_alternation(prefixes: &[String]) -> Option<String> {
    let escaped = prefixes
        .iter()
        .map(|prefix| prefix.trim())
        .filter(|prefix| !prefix.is_empty())
        .map(regex::escape)
        .collect::<Vec<String>>();

    if escaped.is_empty() {
        None
    } else {
        Some(escaped.join("|"))
    }
}

pub fn collapse_line_breaks(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<&str>>()
        .join(" ")
}

pub fn strip_exhibit_prefix(text: &str) -> &str {
    let trimmed = text.trim_start();
    let Some(head) = trimmed.get(..7) else {
        return trimmed;
    };
    if !head.eq_ignore_ascii_case("exhibit") {
        return trimmed;
    }

    let rest = &trimmed[7..];
    let body = rest.trim_start();
    if body.len() == rest.len() {
        trimmed
    } else {
        body
    }
}

/// Removes every trailing `_NNNN` page/part qualifier.
pub fn strip_qualifier(text: &str) -> &str {
    let mut current = text;
    loop {
        let bytes = current.as_bytes();
        if bytes.len() <= QUALIFIER_LEN {
            return current;
        }
        let tail = &bytes[bytes.len() - QUALIFIER_LEN..];
        if tail[0] == b'_' && tail[1..].iter().all(u8::is_ascii_digit) {
            current = &current[..current.len() - QUALIFIER_LEN];
        } else {
            return current;
        }
    }
}

/// Comparison form of an identifier: no `Exhibit` prefix, no whitespace,
/// no trailing qualifiers, ASCII uppercase.
pub fn normalize_identifier(text: &str) -> String {
    let compact = strip_exhibit_prefix(text)
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>();
    strip_qualifier(&compact).to_ascii_uppercase()
}
