// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository URL handling.
//!
//! The control plane hands the agent either an `owner/repo` shorthand or a
//! full clone URL. Shorthand always means github.com. Tokens are spliced
//! into the clone URL only for github.com and only for the clone itself —
//! the remote is rewritten back to the clean form afterwards so no secret
//! lands in repository metadata.

use std::fmt;

/// A canonicalized clone URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl(String);

impl RepoUrl {
    /// Canonicalize `raw`. Returns `None` for an empty value (no repository
    /// configured).
    ///
    /// `owner/repo` shorthand becomes `https://github.com/owner/repo.git`;
    /// anything carrying a scheme (or an scp-style ssh address) passes
    /// through unchanged.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains("://") || raw.starts_with("git@") {
            return Some(Self(raw.to_string()));
        }
        let mut url = format!("https://github.com/{raw}");
        if !url.ends_with(".git") {
            url.push_str(".git");
        }
        Some(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host portion of the URL, for `https://` and scp-style forms.
    fn host(&self) -> Option<&str> {
        if let Some(rest) = self.0.split_once("://").map(|(_, rest)| rest) {
            let rest = rest.split_once('@').map_or(rest, |(_, host)| host);
            return rest.split(['/', ':']).next();
        }
        if let Some(rest) = self.0.strip_prefix("git@") {
            return rest.split(':').next();
        }
        None
    }

    /// Whether this repository is hosted on github.com.
    pub fn is_github(&self) -> bool {
        matches!(self.host(), Some("github.com") | Some("www.github.com"))
    }

    /// Clone URL with an access token spliced in.
    ///
    /// Only https github.com URLs are augmented; every other form is
    /// returned unchanged (never put a github token in a foreign URL).
    pub fn with_token(&self, token: &str) -> String {
        if !self.is_github() || token.is_empty() {
            return self.0.clone();
        }
        match self.0.split_once("://") {
            Some((scheme, rest)) if scheme == "https" || scheme == "http" => {
                format!("{scheme}://x-access-token:{token}@{rest}")
            }
            _ => self.0.clone(),
        }
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;
