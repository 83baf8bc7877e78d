use std::collections::BTreeSet;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("'{input}' matches several collections: {}", candidates.join(", "))]
    Ambiguous {
        input: String,
        candidates: Vec<String>,
    },
    #[error("a philosopher collection must be provided")]
    Missing { known: Vec<String> },
    #[error("collection '{name}' not found")]
    NotFound { name: String, known: Vec<String> },
}

/// Case-insensitive lookup of `input` among `known`.
///
/// Stages run from strictest to loosest: exact, whole word, prefix or suffix,
/// substring. The first stage with a single match wins; a stage with several
/// matches is an error rather than a reason to keep looking. Without any match
/// the trimmed input comes back.
pub fn resolve<'a, I>(input: &str, known: I) -> Result<String, ResolveError>
where
    I: IntoIterator<Item = &'a str>,
{
    let input = input.trim();
    let needle = input.to_lowercase();
    if needle.is_empty() {
        return Ok(input.to_string());
    }

    let known: Vec<(&str, String)> = known
        .into_iter()
        .map(|name| (name, name.to_lowercase()))
        .collect();

    if let Some((name, _)) = known.iter().find(|(_, lower)| *lower == needle) {
        return Ok((*name).to_string());
    }

    for stage in [
        MatchStage::WholeWord,
        MatchStage::PrefixOrSuffix,
        MatchStage::Substring,
    ] {
        let candidates: BTreeSet<&str> = known
            .iter()
            .filter(|(_, lower)| stage.matches(lower, &needle))
            .map(|(name, _)| *name)
            .collect();

        if candidates.len() > 1 {
            return Err(ResolveError::Ambiguous {
                input: input.to_string(),
                candidates: candidates.into_iter().map(str::to_string).collect(),
            });
        }
        if let Some(name) = candidates.into_iter().next() {
            return Ok(name.to_string());
        }
    }

    Ok(input.to_string())
}

#[derive(Debug, Clone, Copy)]
enum MatchStage {
    WholeWord,
    PrefixOrSuffix,
    Substring,
}

impl MatchStage {
    fn matches(self, candidate: &str, needle: &str) -> bool {
        match self {
            Self::WholeWord => contains_delimited(candidate, needle),
            Self::PrefixOrSuffix => candidate.starts_with(needle) || candidate.ends_with(needle),
            Self::Substring => candidate.contains(needle) || needle.contains(candidate),
        }
    }
}

/// True when `needle` occurs in `candidate` bounded on both sides by a
/// non-alphanumeric character or the string edge.
fn contains_delimited(candidate: &str, needle: &str) -> bool {
    candidate.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = candidate[..start].chars().next_back();
        let after = candidate[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Resolves `input` and insists that the result is a known collection.
pub fn validate_collection(input: &str, known: &[String]) -> Result<String, ResolveError> {
    let mut listed: Vec<String> = known.to_vec();
    listed.sort();

    if input.trim().is_empty() {
        return Err(ResolveError::Missing { known: listed });
    }

    let resolved = resolve(input, known.iter().map(String::as_str))?;
    if known.iter().any(|name| *name == resolved) {
        Ok(resolved)
    } else {
        Err(ResolveError::NotFound {
            name: resolved,
            known: listed,
        })
    }
}
