use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::locator::{extract_url_domain, extract_url_path};

const LOCAL_OWNER: &str = "local";
const LOCAL_REPO_FALLBACK: &str = "local-repo";

/// Hosting family a repository reference resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    Github,
    Gitlab,
    Bitbucket,
    /// Any other git host reachable over the web.
    Web,
    /// A directory on the machine running the wiki backend.
    Local,
}

impl RepoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoKind::Github => "github",
            RepoKind::Gitlab => "gitlab",
            RepoKind::Bitbucket => "bitbucket",
            RepoKind::Web => "web",
            RepoKind::Local => "local",
        }
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical identification of a target repository or local folder.
///
/// Local references carry `local_path` and never `full_path`; every other
/// kind carries `full_path` and never `local_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "type")]
    pub kind: RepoKind,
    #[serde(rename = "fullPath", skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(rename = "localPath", skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

impl Reference {
    pub fn is_local(&self) -> bool {
        self.kind == RepoKind::Local
    }

    /// `owner/repo`, as used in the navigation path.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("repository input is empty")]
    Empty,
    #[error("unsupported repository format: '{0}'")]
    Unsupported(String),
    #[error("could not determine owner and repository from '{0}'")]
    MissingOwnerOrRepo(String),
}

/// Fields extracted by a rule before normalisation.
#[derive(Debug)]
struct Draft {
    owner: String,
    repo: String,
    kind: RepoKind,
    full_path: Option<String>,
    local_path: Option<String>,
}

/// A named classification rule. Rules are tried in `RULES` order and the
/// first whose predicate accepts the input produces the draft.
struct Rule {
    name: &'static str,
    matches: fn(&str) -> bool,
    extract: fn(&str) -> Draft,
}

static RULES: [Rule; 3] = [
    Rule {
        name: "windows-path",
        matches: is_windows_absolute_path,
        extract: extract_windows_path,
    },
    Rule {
        name: "unix-path",
        matches: is_unix_absolute_path,
        extract: extract_unix_path,
    },
    Rule {
        name: "generic-host",
        matches: matches_host_owner_repo,
        extract: extract_hosted,
    },
];

/// Classify and normalise raw user input into a [`Reference`].
pub fn parse(input: &str) -> Result<Reference, ReferenceError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ReferenceError::Empty);
    }
    let Some(rule) = RULES.iter().find(|rule| (rule.matches)(input)) else {
        warn!(input, "unsupported repository format");
        return Err(ReferenceError::Unsupported(input.to_string()));
    };
    debug!(rule = rule.name, input, "matched repository rule");

    let draft = (rule.extract)(input);
    let owner = draft.owner.trim();
    let repo = draft.repo.trim();
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() {
        return Err(ReferenceError::MissingOwnerOrRepo(input.to_string()));
    }

    Ok(Reference {
        owner: owner.to_string(),
        repo: repo.to_string(),
        kind: draft.kind,
        full_path: draft.full_path,
        local_path: draft.local_path,
    })
}

fn is_windows_path_char(ch: char) -> bool {
    !matches!(
        ch,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\r' | '\n'
    )
}

/// `X:\dir\...\leaf`, where every directory segment is non-empty and the leaf may be empty.
fn is_windows_absolute_path(input: &str) -> bool {
    let bytes = input.as_bytes();
    if bytes.len() < 3 || !bytes[0].is_ascii_alphabetic() || bytes[1] != b':' || bytes[2] != b'\\'
    {
        return false;
    }
    let segments: Vec<&str> = input[3..].split('\\').collect();
    let Some((leaf, directories)) = segments.split_last() else {
        return false;
    };
    directories
        .iter()
        .all(|segment| !segment.is_empty() && segment.chars().all(is_windows_path_char))
        && leaf.chars().all(is_windows_path_char)
}

fn extract_windows_path(input: &str) -> Draft {
    let leaf = input.rsplit('\\').next().unwrap_or_default();
    local_draft(input, leaf)
}

fn is_unix_absolute_path(input: &str) -> bool {
    input.starts_with('/')
}

fn extract_unix_path(input: &str) -> Draft {
    let leaf = input
        .split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .unwrap_or_default();
    local_draft(input, leaf)
}

fn local_draft(input: &str, leaf: &str) -> Draft {
    let repo = if leaf.is_empty() {
        LOCAL_REPO_FALLBACK
    } else {
        leaf
    };
    Draft {
        owner: LOCAL_OWNER.into(),
        repo: repo.into(),
        kind: RepoKind::Local,
        full_path: None,
        local_path: Some(input.to_string()),
    }
}

/// Optional `http(s)://`, then `host/<one or more segments>/repo`, with an
/// optional trailing slash.
fn matches_host_owner_repo(input: &str) -> bool {
    let without_scheme = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"));
    // The scheme is optional, so `https:` may itself be read as the host.
    without_scheme.is_some_and(host_owner_repo_shape) || host_owner_repo_shape(input)
}

fn host_owner_repo_shape(rest: &str) -> bool {
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    let Some((host, remainder)) = rest.split_once('/') else {
        return false;
    };
    let Some((middle, leaf)) = remainder.rsplit_once('/') else {
        return false;
    };
    !host.is_empty()
        && !middle.is_empty()
        && !middle.contains(['\n', '\r', '\u{2028}', '\u{2029}'])
        && !leaf.is_empty()
}

fn classify_domain(domain: Option<&str>) -> RepoKind {
    let Some(domain) = domain else {
        return RepoKind::Web;
    };
    if domain.contains("github.com") {
        RepoKind::Github
    } else if domain.contains("gitlab.com") || domain.contains("gitlab.") {
        RepoKind::Gitlab
    } else if domain.contains("bitbucket.org") || domain.contains("bitbucket.") {
        RepoKind::Bitbucket
    } else {
        RepoKind::Web
    }
}

fn extract_hosted(input: &str) -> Draft {
    let kind = classify_domain(extract_url_domain(input).as_deref());
    let full_path = extract_url_path(input)
        .map(|path| path.strip_suffix(".git").map(str::to_string).unwrap_or(path));

    let (owner, repo) = full_path
        .as_deref()
        .and_then(|path| {
            let parts: Vec<&str> = path.split('/').collect();
            match parts.as_slice() {
                [.., owner, repo] => Some((owner.to_string(), repo.to_string())),
                _ => None,
            }
        })
        .unwrap_or_default();
    Draft {
        owner,
        repo,
        kind,
        full_path,
        local_path: None,
    }
}
