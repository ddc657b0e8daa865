//! Candidate locator expressions.

use serde::{Deserialize, Deserializer};
use std::fmt;

/// One candidate lookup query, interpreted by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// `css:form button` - CSS selector
    Css(String),
    /// `xpath://label[@for='x']` - XPath expression
    XPath(String),
    /// `id:submit` - exact element ID
    Id(String),
    /// `id-contains:Senior` - `<input>` whose ID contains the value
    IdContains(String),
    /// `label-for:Senior` - `<label>` whose `for` attribute contains the value
    LabelFor(String),
    /// `name:courses` - `name` attribute
    Name(String),
    /// `tag:tr` - tag name
    Tag(String),
    /// `link:Top` - anchor with exactly this visible text
    LinkText(String),
}

impl Query {
    pub fn css(s: impl Into<String>) -> Self {
        Query::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Query::XPath(s.into())
    }

    pub fn id(s: impl Into<String>) -> Self {
        Query::Id(s.into())
    }

    pub fn id_contains(s: impl Into<String>) -> Self {
        Query::IdContains(s.into())
    }

    pub fn label_for(s: impl Into<String>) -> Self {
        Query::LabelFor(s.into())
    }

    pub fn name(s: impl Into<String>) -> Self {
        Query::Name(s.into())
    }

    pub fn tag(s: impl Into<String>) -> Self {
        Query::Tag(s.into())
    }

    pub fn link_text(s: impl Into<String>) -> Self {
        Query::LinkText(s.into())
    }

    /// Parse the prefixed string form. Unprefixed strings that look like
    /// XPath (`/`, `./`, `(`) are XPath; everything else is CSS.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(v) = s.strip_prefix("css:") {
            return Query::Css(v.into());
        }
        if let Some(v) = s.strip_prefix("xpath:") {
            return Query::XPath(v.into());
        }
        if let Some(v) = s.strip_prefix("id-contains:") {
            return Query::IdContains(v.into());
        }
        if let Some(v) = s.strip_prefix("id:") {
            return Query::Id(v.into());
        }
        if let Some(v) = s.strip_prefix("label-for:") {
            return Query::LabelFor(v.into());
        }
        if let Some(v) = s.strip_prefix("name:") {
            return Query::Name(v.into());
        }
        if let Some(v) = s.strip_prefix("tag:") {
            return Query::Tag(v.into());
        }
        if let Some(v) = s.strip_prefix("link:") {
            return Query::LinkText(v.into());
        }
        if s.starts_with('/') || s.starts_with("./") || s.starts_with('(') {
            return Query::XPath(s.into());
        }
        Query::Css(s.into())
    }

    /// XPath equivalent of this query. `None` for CSS, which has no
    /// general translation.
    pub fn to_xpath(&self) -> Option<String> {
        let xp = match self {
            Query::Css(_) => return None,
            Query::XPath(x) => x.clone(),
            Query::Id(v) => format!("//*[@id={}]", xpath_literal(v)),
            Query::IdContains(v) => format!("//input[contains(@id,{})]", xpath_literal(v)),
            Query::LabelFor(v) => format!("//label[contains(@for,{})]", xpath_literal(v)),
            Query::Name(v) => format!("//*[@name={}]", xpath_literal(v)),
            Query::Tag(v) => format!("//{}", v),
            Query::LinkText(v) => format!("//a[normalize-space(.)={}]", xpath_literal(v)),
        };
        Some(xp)
    }

    /// The same query made relative to a context element (`//x` becomes
    /// `.//x`). CSS is already relative under `querySelectorAll`.
    pub fn scoped_xpath(&self) -> Option<String> {
        let xp = self.to_xpath()?;
        if xp.starts_with("//") {
            Some(format!(".{}", xp))
        } else {
            Some(xp)
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Css(v) => write!(f, "css:{}", v),
            Query::XPath(v) => write!(f, "xpath:{}", v),
            Query::Id(v) => write!(f, "id:{}", v),
            Query::IdContains(v) => write!(f, "id-contains:{}", v),
            Query::LabelFor(v) => write!(f, "label-for:{}", v),
            Query::Name(v) => write!(f, "name:{}", v),
            Query::Tag(v) => write!(f, "tag:{}", v),
            Query::LinkText(v) => write!(f, "link:{}", v),
        }
    }
}

impl<'de> Deserialize<'de> for Query {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Query::parse(&s))
    }
}

/// Quote a string as an XPath 1.0 literal.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{}'", s);
    }
    if !s.contains('"') {
        return format!("\"{}\"", s);
    }
    let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}
