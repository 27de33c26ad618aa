use std::cmp::Ordering;
use std::fmt;

use crate::version::{padded_cmp, version_key};
use crate::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Ge,
    Le,
    Gt,
    Lt,
    Compatible,
    Arbitrary,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Compatible => "~=",
            Self::Arbitrary => "===",
        }
    }

    // Longest tokens first so `===` is not read as `==`.
    const TOKENS: [(&'static str, Operator); 8] = [
        ("===", Operator::Arbitrary),
        ("==", Operator::Eq),
        ("!=", Operator::NotEq),
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        ("~=", Operator::Compatible),
        (">", Operator::Gt),
        ("<", Operator::Lt),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub operator: Operator,
    pub version: String,
    pub wildcard: bool,
}

impl Clause {
    fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let Some((token, operator)) = Operator::TOKENS
            .iter()
            .find(|(token, _)| raw.starts_with(token))
        else {
            return Err(format!("unknown version operator in '{raw}'"));
        };

        let mut version = raw[token.len()..].trim().to_string();
        let mut wildcard = false;
        if let Some(prefix) = version.strip_suffix(".*") {
            if !matches!(operator, Operator::Eq | Operator::NotEq) {
                return Err(format!("wildcard is only allowed with == and != in '{raw}'"));
            }
            wildcard = true;
            version = prefix.to_string();
        }

        if version.is_empty() {
            return Err(format!("missing version in '{raw}'"));
        }
        if *operator != Operator::Arbitrary && version_key(&version).is_empty() {
            return Err(format!("version '{version}' has no numeric components"));
        }
        if *operator == Operator::Compatible && version_key(&version).len() < 2 {
            return Err(format!("~= needs at least two version components in '{raw}'"));
        }

        Ok(Self {
            operator: *operator,
            version,
            wildcard,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let have = version_key(candidate);
        let want = version_key(&self.version);
        let prefix_match = || have.len() >= want.len() && have[..want.len()] == want[..];

        match self.operator {
            Operator::Eq if self.wildcard => prefix_match(),
            Operator::NotEq if self.wildcard => !prefix_match(),
            Operator::Eq => padded_cmp(&have, &want) == Ordering::Equal,
            Operator::NotEq => padded_cmp(&have, &want) != Ordering::Equal,
            Operator::Ge => padded_cmp(&have, &want) != Ordering::Less,
            Operator::Le => padded_cmp(&have, &want) != Ordering::Greater,
            Operator::Gt => padded_cmp(&have, &want) == Ordering::Greater,
            Operator::Lt => padded_cmp(&have, &want) == Ordering::Less,
            Operator::Compatible => {
                let stem = &want[..want.len().saturating_sub(1)];
                padded_cmp(&have, &want) != Ordering::Less
                    && have.len() >= stem.len()
                    && have[..stem.len()] == *stem
            }
            Operator::Arbitrary => candidate == self.version,
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.version)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

/// Comma separated version clauses; empty means "any version".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionConstraint {
    clauses: Vec<Clause>,
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let clauses = raw
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Clause::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, version: &str) -> bool {
        self.clauses.iter().all(|clause| clause.matches(version))
    }

    /// True when the constraint names one exact version.
    pub fn is_exact_pin(&self) -> bool {
        self.clauses.iter().any(|clause| {
            matches!(clause.operator, Operator::Eq | Operator::Arbitrary) && !clause.wildcard
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, clause) in self.clauses.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

/// A requested application: package name plus optional version constraint,
/// written like `bumper`, `bumper==0.1.*` or `bumper>=1.0,<2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSpec {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl AppSpec {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        let invalid = |reason: String| AppError::InvalidSpec {
            spec: raw.to_string(),
            reason,
        };

        let name_end = trimmed
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(trimmed.len());
        let name = &trimmed[..name_end];
        if name.is_empty() {
            return Err(invalid("missing app name".to_string()));
        }
        if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(invalid("app name must start with a letter or digit".to_string()));
        }

        let constraint = VersionConstraint::parse(&trimmed[name_end..]).map_err(invalid)?;
        Ok(Self {
            name: name.to_string(),
            constraint,
        })
    }

    pub fn matches(&self, version: &str) -> bool {
        self.constraint.matches(version)
    }

    pub fn is_pinned(&self) -> bool {
        self.constraint.is_exact_pin()
    }

    /// The constraint part alone, e.g. `==0.1.10`; empty when unconstrained.
    pub fn pin_label(&self) -> String {
        self.constraint.to_string()
    }
}

impl fmt::Display for AppSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.constraint)
    }
}
