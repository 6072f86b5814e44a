//! Turning user input (profile URL, bare id or a name) into something the
//! resolver can work with.

use once_cell::sync::Lazy;
use pubrecon_core::SourceKind;
use regex::Regex;

static CITATION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"authorId=(\d+)").expect("valid regex"));
static REGISTRY_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:Detay/(\d+)|authorId=([A-Za-z0-9]+))").expect("valid regex")
});
static XPLORE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/author/(\d+)").expect("valid regex"));

/// Shortest bare number accepted as a citation index author id.
const MIN_CITATION_ID_DIGITS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierInput {
    /// A per-source identifier, taken as-is.
    Id(String),
    /// Anything else; the resolver searches for it.
    Name(String),
}

impl IdentifierInput {
    pub fn parse(source: SourceKind, text: &str) -> Self {
        let text = text.trim();

        let pattern: &Regex = match source {
            SourceKind::CitationIndex => &CITATION_ID_RE,
            SourceKind::Registry => &REGISTRY_ID_RE,
            SourceKind::Xplore => &XPLORE_ID_RE,
        };
        if let Some(id) = pattern
            .captures(text)
            .and_then(|c| c.iter().skip(1).flatten().next())
        {
            return Self::Id(id.as_str().to_string());
        }

        let digits = !text.is_empty() && text.chars().all(|c| c.is_ascii_digit());
        let long_enough =
            source != SourceKind::CitationIndex || text.len() >= MIN_CITATION_ID_DIGITS;
        if digits && long_enough {
            Self::Id(text.to_string())
        } else {
            Self::Name(text.to_string())
        }
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            Self::Name(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_urls() {
        assert_eq!(
            IdentifierInput::parse(
                SourceKind::CitationIndex,
                "https://www.scopus.com/authid/detail.uri?authorId=57190000001"
            ),
            IdentifierInput::Id("57190000001".into())
        );
        assert_eq!(
            IdentifierInput::parse(
                SourceKind::Registry,
                "https://akademik.yok.gov.tr/AkademikArama/view/viewAuthor.jsp?authorId=AB12CD34"
            ),
            IdentifierInput::Id("AB12CD34".into())
        );
        assert_eq!(
            IdentifierInput::parse(
                SourceKind::Registry,
                "https://akademik.yok.gov.tr/AkademikArama/Akademisyen/Detay/12345"
            ),
            IdentifierInput::Id("12345".into())
        );
        assert_eq!(
            IdentifierInput::parse(SourceKind::Xplore, "https://ieeexplore.ieee.org/author/37285846700"),
            IdentifierInput::Id("37285846700".into())
        );
    }

    #[test]
    fn test_bare_ids_and_names() {
        assert_eq!(
            IdentifierInput::parse(SourceKind::CitationIndex, " 57190000001 "),
            IdentifierInput::Id("57190000001".into())
        );
        assert_eq!(
            IdentifierInput::parse(SourceKind::CitationIndex, "1234"),
            IdentifierInput::Name("1234".into())
        );
        assert_eq!(
            IdentifierInput::parse(SourceKind::Registry, "1234").as_id(),
            Some("1234")
        );
        assert_eq!(
            IdentifierInput::parse(SourceKind::Xplore, "Ayşe Yılmaz"),
            IdentifierInput::Name("Ayşe Yılmaz".into())
        );
    }
}
