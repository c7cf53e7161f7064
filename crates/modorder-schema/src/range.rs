//! Version range expressions.
//!
//! The grammar follows node-semver: comparator sets joined by `||`, each set
//! being whitespace- or comma-separated comparators that must all hold.
//! Supported comparators are `<`, `<=`, `>`, `>=`, `=`, `==`, bare versions,
//! caret (`^1.2.3`), tilde (`~1.2.3`), wildcards (`1.x`, `1.2.*`, `*`), and
//! hyphen ranges (`1.0.0 - 2.0.0`). Partial versions widen the bound they
//! describe, so `>1.2` means `>=1.3.0` and `<=1` means `<2.0.0`.

use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid version range '{expr}': {reason}")]
pub struct RangeError {
    pub expr: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    fn matches(&self, v: &Version) -> bool {
        match self.op {
            Op::Lt => *v < self.version,
            Op::Le => *v <= self.version,
            Op::Gt => *v > self.version,
            Op::Ge => *v >= self.version,
            Op::Eq => *v == self.version,
        }
    }
}

/// A parsed version range. An empty range matches every version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Range {
    source: String,
    sets: Vec<Vec<Comparator>>,
}

impl Range {
    /// The range that accepts any version.
    pub fn any() -> Self {
        Self {
            source: String::new(),
            sets: vec![Vec::new()],
        }
    }

    pub fn parse(expr: &str) -> Result<Self, RangeError> {
        let source = expr.trim().to_owned();
        let mut sets = Vec::new();
        for set in source.split("||") {
            sets.push(parse_set(set).map_err(|reason| RangeError {
                expr: source.clone(),
                reason,
            })?);
        }
        Ok(Self { source, sets })
    }

    pub fn is_any(&self) -> bool {
        self.sets.iter().any(Vec::is_empty)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.sets
            .iter()
            .any(|set| set.iter().all(|c| c.matches(version)))
    }

    /// Test a version string. With `loose` the version may be partial or
    /// prefixed (`v1.2`); otherwise it must be an exact `N.N.N` triplet.
    /// Unparseable versions never satisfy.
    pub fn satisfied_by(&self, version: &str, loose: bool) -> bool {
        Version::parse(version, loose).is_ok_and(|v| self.matches(&v))
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&self.source)
        }
    }
}

impl TryFrom<String> for Range {
    type Error = RangeError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Range> for String {
    fn from(value: Range) -> Self {
        value.source
    }
}

/// A version with optional (wildcard) components.
#[derive(Debug, Clone, Copy)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
}

impl Partial {
    fn parse(token: &str) -> Result<Self, String> {
        let body = token.trim_start_matches(['v', 'V']);
        let core = body.split(['-', '+']).next().unwrap_or(body);
        if core.is_empty() {
            return Err(format!("missing version in '{token}'"));
        }
        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 4 {
            return Err(format!("too many components in '{token}'"));
        }
        let mut nums = [None; 3];
        let mut wildcard_seen = false;
        for (i, part) in parts.iter().take(3).enumerate() {
            if matches!(*part, "x" | "X" | "*") {
                wildcard_seen = true;
                continue;
            }
            if wildcard_seen {
                return Err(format!("number after wildcard in '{token}'"));
            }
            let value = part
                .parse::<u64>()
                .map_err(|_| format!("invalid component '{part}' in '{token}'"))?;
            nums[i] = Some(value);
        }
        Ok(Self {
            major: nums[0],
            minor: nums[1],
            patch: nums[2],
        })
    }

    fn is_wildcard(&self) -> bool {
        self.major.is_none()
    }

    fn is_full(&self) -> bool {
        self.patch.is_some()
    }

    fn floor(&self) -> Version {
        Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
        )
    }

    /// Smallest version above every version the partial describes, with the
    /// patch component ignored (the tilde bound). Meaningless for wildcards.
    fn ceiling(&self) -> Result<Version, String> {
        Ok(match (self.major, self.minor) {
            (Some(major), Some(minor)) => Version::new(major, bump(minor)?, 0),
            (Some(major), None) => Version::new(bump(major)?, 0, 0),
            _ => Version::ZERO,
        })
    }
}

fn bump(component: u64) -> Result<u64, String> {
    component
        .checked_add(1)
        .ok_or_else(|| format!("version component too large: {component}"))
}

fn parse_set(set: &str) -> Result<Vec<Comparator>, String> {
    let tokens = tokenize(set);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    if tokens.len() == 3 && tokens[1] == "-" {
        return hyphen(&tokens[0], &tokens[2]);
    }
    let mut out = Vec::new();
    for token in &tokens {
        out.extend(comparator(token)?);
    }
    Ok(out)
}

/// Split on whitespace and commas, gluing a bare operator to the version that
/// follows it (`>= 1.2` becomes `>=1.2`).
fn tokenize(set: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;
    for raw in set.split(|c: char| c.is_whitespace() || c == ',') {
        if raw.is_empty() {
            continue;
        }
        if raw.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~')) {
            pending_op = Some(pending_op.unwrap_or_default() + raw);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(op + raw),
            None => tokens.push(raw.to_owned()),
        }
    }
    if let Some(op) = pending_op {
        tokens.push(op);
    }
    tokens
}

fn hyphen(low: &str, high: &str) -> Result<Vec<Comparator>, String> {
    let low = Partial::parse(low)?;
    let high = Partial::parse(high)?;
    let mut out = Vec::new();
    if !low.is_wildcard() {
        out.push(Comparator::new(Op::Ge, low.floor()));
    }
    if high.is_full() {
        out.push(Comparator::new(Op::Le, high.floor()));
    } else if !high.is_wildcard() {
        out.push(Comparator::new(Op::Lt, high.ceiling()?));
    }
    Ok(out)
}

fn comparator(token: &str) -> Result<Vec<Comparator>, String> {
    let (op, rest) = split_operator(token);
    let partial = Partial::parse(rest)?;
    if partial.is_wildcard() {
        return match op {
            "<" | ">" => Err(format!("'{token}' matches nothing")),
            _ => Ok(Vec::new()),
        };
    }
    let floor = partial.floor();
    let out = match op {
        "^" => vec![
            Comparator::new(Op::Ge, floor),
            Comparator::new(Op::Lt, caret_ceiling(&partial)?),
        ],
        "~" => vec![
            Comparator::new(Op::Ge, floor),
            Comparator::new(Op::Lt, partial.ceiling()?),
        ],
        "" | "=" | "==" if partial.is_full() => vec![Comparator::new(Op::Eq, floor)],
        "" | "=" | "==" => vec![
            Comparator::new(Op::Ge, floor),
            Comparator::new(Op::Lt, partial.ceiling()?),
        ],
        ">=" => vec![Comparator::new(Op::Ge, floor)],
        ">" if partial.is_full() => vec![Comparator::new(Op::Gt, floor)],
        ">" => vec![Comparator::new(Op::Ge, partial.ceiling()?)],
        "<" => vec![Comparator::new(Op::Lt, floor)],
        "<=" if partial.is_full() => vec![Comparator::new(Op::Le, floor)],
        "<=" => vec![Comparator::new(Op::Lt, partial.ceiling()?)],
        other => return Err(format!("unknown operator '{other}'")),
    };
    Ok(out)
}

fn split_operator(token: &str) -> (&str, &str) {
    let end = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '^' | '~'))
        .unwrap_or(token.len());
    (&token[..end], token[end..].trim())
}

fn caret_ceiling(p: &Partial) -> Result<Version, String> {
    Ok(match (p.major, p.minor, p.patch) {
        (Some(0), Some(0), Some(patch)) => Version::new(0, 0, bump(patch)?),
        (Some(0), Some(minor), _) => Version::new(0, bump(minor)?, 0),
        (Some(major), _, _) => Version::new(bump(major)?, 0, 0),
        _ => Version::ZERO,
    })
}
