//! Editor pages.
//!
//! Server pages hold live dags. A template page (`tpl:<name>|<version>`)
//! edits a local [`TemplateDraft`](crate::template::TemplateDraft) instead.

use std::fmt;
use std::str::FromStr;

/// Name of the default server page.
pub const MAIN_PAGE: &str = "main";

const TEMPLATE_PREFIX: &str = "tpl:";

/// Identity of a template: name plus version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateKey {
    /// Template name.
    pub name: String,
    /// Template version.
    pub version: String,
}

impl TemplateKey {
    /// Build a key.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.version)
    }
}

/// The page graph operations apply to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Page {
    /// The default server page.
    #[default]
    Main,
    /// Another server page.
    Named(String),
    /// Local template editor.
    Template(TemplateKey),
}

impl Page {
    /// Template editor page for `name`/`version`.
    pub fn template(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Template(TemplateKey::new(name, version))
    }

    /// Template being edited, if this is a template page.
    #[must_use]
    pub fn template_key(&self) -> Option<&TemplateKey> {
        match self {
            Self::Template(key) => Some(key),
            _ => None,
        }
    }

    /// Whether graph operations go to the server.
    #[must_use]
    pub fn is_server_page(&self) -> bool {
        !matches!(self, Self::Template(_))
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str(MAIN_PAGE),
            Self::Named(name) => f.write_str(name),
            Self::Template(key) => write!(f, "{TEMPLATE_PREFIX}{key}"),
        }
    }
}

impl FromStr for Page {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(TEMPLATE_PREFIX) {
            let (name, version) = rest.split_once('|').unwrap_or((rest, ""));
            return Ok(Self::template(name, version));
        }
        Ok(match s {
            "" | MAIN_PAGE => Self::Main,
            other => Self::Named(other.to_string()),
        })
    }
}

impl From<&str> for Page {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(page) => page,
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pages() {
        assert_eq!(Page::from("main"), Page::Main);
        assert_eq!(Page::from(""), Page::Main);
        assert_eq!(Page::from("garden"), Page::Named("garden".into()));
        assert_eq!(Page::from("tpl:pump|2"), Page::template("pump", "2"));
        assert_eq!(Page::from("tpl:pump"), Page::template("pump", ""));
    }

    #[test]
    fn display_round_trips() {
        for s in ["main", "garden", "tpl:pump|1.0"] {
            assert_eq!(Page::from(s).to_string(), s);
        }
    }

    #[test]
    fn server_pages() {
        assert!(Page::Main.is_server_page());
        assert!(Page::Named("x".into()).is_server_page());
        assert!(!Page::template("a", "1").is_server_page());
        assert_eq!(
            Page::template("a", "1").template_key(),
            Some(&TemplateKey::new("a", "1"))
        );
    }
}
