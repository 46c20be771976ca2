use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::form_urlencoded;

use crate::config::RepoConfig;
use crate::reference::Reference;

/// Inputs to a launch besides the parsed reference.
#[derive(Debug, Clone, Copy)]
pub struct LaunchOptions<'a> {
    pub config: &'a RepoConfig,
    pub access_token: &'a str,
    /// The repository input exactly as the user typed it.
    pub raw_input: &'a str,
}

/// Ordered query parameters for the wiki page. Order is part of the
/// contract: the rendered string must be byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchQuery {
    pairs: Vec<(String, String)>,
}

impl LaunchQuery {
    fn push(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.push((key.to_string(), value.into()));
    }

    fn push_non_empty(&mut self, key: &str, value: &str) {
        if !value.is_empty() {
            self.push(key, value);
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn keys(&self) -> Vec<&str> {
        self.pairs.iter().map(|(key, _)| key.as_str()).collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `application/x-www-form-urlencoded` rendering, without the leading `?`.
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// Where to send the user: `/{owner}/{repo}` plus the ordered query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    pub path: String,
    pub query: LaunchQuery,
}

impl LaunchTarget {
    /// Origin-relative href, e.g. `/owner/repo?type=github&...`.
    pub fn href(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query.to_query_string())
        }
    }

    pub fn absolute_url(&self, origin: &str) -> String {
        format!("{}{}", origin.trim_end_matches('/'), self.href())
    }
}

impl fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href())
    }
}

/// Everything ECMAScript `encodeURIComponent` escapes: all but ASCII
/// alphanumerics and `- _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

pub fn build(reference: &Reference, options: &LaunchOptions<'_>) -> LaunchTarget {
    let config = options.config;
    let mut query = LaunchQuery::default();

    query.push_non_empty("token", options.access_token);
    let repo_type = if reference.is_local() {
        reference.kind.as_str()
    } else {
        config.selected_platform.as_str()
    };
    query.push("type", repo_type);
    match reference.local_path.as_deref() {
        Some(local_path) => query.push("local_path", encode_uri_component(local_path)),
        None => query.push("repo_url", encode_uri_component(options.raw_input)),
    }
    query.push("provider", config.provider.as_str());
    query.push("model", config.model.as_str());
    if let Some(custom_model) = config.effective_custom_model() {
        query.push("custom_model", custom_model);
    }
    query.push_non_empty("excluded_dirs", &config.excluded_dirs);
    query.push_non_empty("excluded_files", &config.excluded_files);
    query.push_non_empty("included_dirs", &config.included_dirs);
    query.push_non_empty("included_files", &config.included_files);
    query.push("language", config.selected_language.as_str());
    query.push("comprehensive", config.is_comprehensive_view.to_string());

    LaunchTarget {
        path: format!("/{}/{}", reference.owner, reference.repo),
        query,
    }
}
