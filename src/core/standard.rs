//! Language dialects and the standard-selection algebra.
//!
//! A compiler reports its supported standards as an ordered list of alias
//! groups per dialect (e.g. `("c++17", "gnu++17")`). User queries - a bare
//! `17`, a name, a list, a comparison like `">=17"`, or a closed range -
//! resolve against that list into an ordered, deduplicated selection of
//! concrete standard names.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::util::dedup_preserving;

/// A language crossed with the GNU-extensions switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Dialect {
    #[serde(rename = "c")]
    C,
    #[serde(rename = "gnu")]
    Gnu,
    #[serde(rename = "c++")]
    Cpp,
    #[serde(rename = "gnu++")]
    GnuCpp,
}

impl Dialect {
    /// All dialects, in display order.
    pub const ALL: [Dialect; 4] = [Dialect::C, Dialect::Gnu, Dialect::Cpp, Dialect::GnuCpp];

    /// The dialect key as it prefixes standard names (`c++` in `c++17`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::C => "c",
            Dialect::Gnu => "gnu",
            Dialect::Cpp => "c++",
            Dialect::GnuCpp => "gnu++",
        }
    }

    /// Parse a dialect key.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "c" => Some(Dialect::C),
            "gnu" => Some(Dialect::Gnu),
            "c++" => Some(Dialect::Cpp),
            "gnu++" => Some(Dialect::GnuCpp),
            _ => None,
        }
    }

    /// Whether this is a C++ dialect.
    pub fn is_cpp(&self) -> bool {
        matches!(self, Dialect::Cpp | Dialect::GnuCpp)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered group of names one compiler accepts for the same standard,
/// canonical name first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StandardGroup(pub Vec<String>);

impl StandardGroup {
    /// The canonical (first) name.
    pub fn canonical(&self) -> &str {
        &self.0[0]
    }

    /// Whether any alias in the group equals `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|alias| alias == name)
    }
}

/// One term of a standard query: a bare number (`17`) or a name (`"c++17"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandardTerm {
    Number(u32),
    Name(String),
}

impl fmt::Display for StandardTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StandardTerm::Number(n) => write!(f, "{}", n),
            StandardTerm::Name(name) => f.write_str(name),
        }
    }
}

/// A user query over a dialect's standards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandardQuery {
    /// A single standard (`17`, `"c++17"`, `"gnu++2b"`).
    Exact(StandardTerm),
    /// Several standards, expanded independently, first occurrence kept.
    List(Vec<StandardTerm>),
    /// An open comparison: `">17"`, `">=17"`, `"<23"`, `"<=20"`.
    Comparison(String),
    /// A closed range `(">lo", "<hi")`.
    Range { lower: String, upper: String },
}

/// Failure to resolve a query against a dialect's standards.
#[derive(Debug, Error)]
pub enum StandardError {
    #[error("unknown standard `{query}`; available: {}", .available.join(", "))]
    Unknown {
        query: String,
        available: Vec<String>,
    },

    #[error("standard ranges take the form (\">lo\", \"<hi\")")]
    InvalidRange,
}

/// The ordered alias-group list one compiler supports for one dialect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StandardSet {
    dialect_key: String,
    groups: Vec<StandardGroup>,
}

impl StandardSet {
    /// Build a set from alias groups, in the compiler's canonical order.
    pub fn new(dialect: Dialect, groups: Vec<StandardGroup>) -> Self {
        StandardSet {
            dialect_key: dialect.as_str().to_string(),
            groups,
        }
    }

    /// The alias groups, in order.
    pub fn groups(&self) -> &[StandardGroup] {
        &self.groups
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether `name` is a known alias in any group.
    pub fn has_standard(&self, name: &str) -> bool {
        self.groups.iter().any(|group| group.contains(name))
    }

    /// Every alias of every group, for error messages.
    fn available(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|group| group.0.iter().cloned())
            .collect()
    }

    /// Expand a query term to a concrete standard name.
    ///
    /// A name that is already a known alias is returned verbatim; otherwise
    /// the dialect key is prefixed (`17` becomes `c++17`) and re-checked.
    pub fn expand(&self, term: &StandardTerm) -> Result<String, StandardError> {
        if let StandardTerm::Name(name) = term {
            if self.has_standard(name) {
                return Ok(name.clone());
            }
        }

        let expanded = format!("{}{}", self.dialect_key, term);
        if self.has_standard(&expanded) {
            return Ok(expanded);
        }

        Err(StandardError::Unknown {
            query: term.to_string(),
            available: self.available(),
        })
    }

    /// Slice `groups` by one comparison query like `">=17"`.
    fn filter<'a>(
        &self,
        query: &str,
        groups: &'a [StandardGroup],
    ) -> Result<&'a [StandardGroup], StandardError> {
        let mut chars = query.chars();
        let op = chars.next();
        let greater = match op {
            Some('>') => true,
            Some('<') => false,
            _ => return Err(StandardError::InvalidRange),
        };
        let inclusive = chars.clone().next() == Some('=');
        let rest = if inclusive {
            chars.as_str()[1..].to_string()
        } else {
            chars.as_str().to_string()
        };

        let term = match rest.parse::<u32>() {
            Ok(number) => StandardTerm::Number(number),
            Err(_) => StandardTerm::Name(rest),
        };
        let version = self.expand(&term)?;

        let mut index = groups
            .iter()
            .position(|group| group.contains(&version))
            .ok_or_else(|| StandardError::Unknown {
                query: version.clone(),
                available: self.available(),
            })?;
        // Shift the cut by one so the bound lands on the inclusive side.
        index += usize::from(inclusive ^ greater);

        Ok(if greater {
            &groups[index..]
        } else {
            &groups[..index]
        })
    }

    fn flatten(groups: &[StandardGroup]) -> Vec<String> {
        dedup_preserving(
            groups
                .iter()
                .map(|group| group.canonical().to_string())
                .collect(),
        )
    }

    /// Resolve a query into an ordered, deduplicated list of standard names.
    ///
    /// `None` selects every group's canonical name in descriptor order.
    pub fn select(&self, query: Option<&StandardQuery>) -> Result<Vec<String>, StandardError> {
        let Some(query) = query else {
            return Ok(Self::flatten(&self.groups));
        };

        match query {
            StandardQuery::Exact(term) => Ok(vec![self.expand(term)?]),
            StandardQuery::List(terms) => {
                let expanded = terms
                    .iter()
                    .map(|term| self.expand(term))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(dedup_preserving(expanded))
            }
            StandardQuery::Comparison(query) => Ok(Self::flatten(self.filter(query, &self.groups)?)),
            StandardQuery::Range { lower, upper } => {
                if !lower.starts_with('>') || !upper.starts_with('<') {
                    return Err(StandardError::InvalidRange);
                }
                let above = self.filter(lower, &self.groups)?;
                Ok(Self::flatten(self.filter(upper, above)?))
            }
        }
    }
}
