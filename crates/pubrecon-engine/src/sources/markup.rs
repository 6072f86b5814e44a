//! Defensive extraction of publication entries from noisy listing markup.

use std::collections::HashSet;

use chrono::Datelike;
use once_cell::sync::Lazy;
use pubrecon_core::{PublicationRecord, PublicationType, SourceKind};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::text::{fold, normalize, squash_whitespace};

pub const MIN_YEAR: i32 = 1990;
const MIN_TITLE_CHARS: usize = 15;
const MIN_ENTRY_CHARS: usize = 10;
const MIN_LINK_TITLE_CHARS: usize = 20;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid regex"));
static EMPTY_BRACKETS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\)|\[\s*\]").expect("valid regex"));

static CANDIDATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr, li, div, p, article").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[class*=title], h2, h3, h4, strong, b").expect("valid selector")
});
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("valid selector"));
static VENUE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[class*=venue], [class*=journal], [class*=publication-name], [class*=description] a, em, i")
        .expect("valid selector")
});

const JOURNAL_KEYWORDS: &[&str] = &["journal", "transactions", "letters", "article", "makale", "dergi"];
const CONFERENCE_KEYWORDS: &[&str] = &[
    "conference",
    "proceeding",
    "symposium",
    "workshop",
    "bildiri",
    "konferans",
    "kongre",
    "sempozyum",
];
const BOOK_KEYWORDS: &[&str] = &["book", "chapter", "kitap", "bolum"];

/// Classifies an entry by keyword. `None` when no class or more than one class
/// is signalled.
pub fn classify(text: &str) -> Option<PublicationType> {
    let folded = fold(text);
    let tokens: Vec<&str> = folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has = |keywords: &[&str]| {
        tokens
            .iter()
            .any(|t| keywords.iter().any(|k| t.starts_with(k)))
    };

    let hits: Vec<PublicationType> = [
        (PublicationType::Journal, has(JOURNAL_KEYWORDS)),
        (PublicationType::Conference, has(CONFERENCE_KEYWORDS)),
        (PublicationType::Book, has(BOOK_KEYWORDS)),
    ]
    .into_iter()
    .filter_map(|(kind, hit)| hit.then_some(kind))
    .collect();

    match hits.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

/// Keyword class first, then the section's declared type, then `Other`.
pub fn classify_with_hint(text: &str, hint: Option<PublicationType>) -> PublicationType {
    classify(text).or(hint).unwrap_or_default()
}

/// Bare URLs, DOIs and long unbroken tokens are not titles.
pub fn looks_like_url(fragment: &str) -> bool {
    let lower = fragment.trim().to_lowercase();
    lower.contains("http")
        || lower.contains("www.")
        || lower.contains("doi.org")
        || lower.contains("dx.doi")
        || (!lower.contains(char::is_whitespace) && lower.chars().count() > MIN_LINK_TITLE_CHARS)
}

fn element_text(el: ElementRef<'_>) -> String {
    squash_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

struct Candidate {
    title: String,
    /// Title taken from a heading or link rather than the bare text.
    structural: bool,
    year: String,
    venue: Option<String>,
    kind: PublicationType,
}

/// Turns a listing page into publication records.
#[derive(Debug, Clone)]
pub struct ListingParser {
    source: SourceKind,
    noise: Vec<String>,
    default_venue: Option<String>,
    min_year: i32,
    max_year: i32,
}

impl ListingParser {
    pub fn new(source: SourceKind, noise: Vec<String>) -> Self {
        Self {
            source,
            noise,
            default_venue: None,
            min_year: MIN_YEAR,
            max_year: chrono::Utc::now().year() + 1,
        }
    }

    pub fn with_default_venue(mut self, venue: impl Into<String>) -> Self {
        self.default_venue = Some(venue.into());
        self
    }

    pub fn with_max_year(mut self, max_year: i32) -> Self {
        self.max_year = max_year;
        self
    }

    /// Number of entries the page currently shows.
    pub fn count(&self, html: &str) -> usize {
        self.parse(html, None).len()
    }

    /// Extracts entries in document order, deduplicated by normalized title.
    ///
    /// An entry whose title comes from a heading or link is kept only if it wraps no
    /// other such entry. An entry titled from its bare text is kept only if it wraps
    /// no accepted entry and sits inside no kept heading entry, where it would be a
    /// fragment (venue line, metadata row) of that entry.
    pub fn parse(&self, html: &str, hint: Option<PublicationType>) -> Vec<PublicationRecord> {
        let doc = Html::parse_document(html);
        let accepted: Vec<(ElementRef<'_>, Candidate)> = doc
            .select(&CANDIDATE)
            .filter_map(|el| self.candidate(el, hint).map(|c| (el, c)))
            .collect();

        let all_ids: HashSet<_> = accepted.iter().map(|(el, _)| (**el).id()).collect();
        let structural_ids: HashSet<_> = accepted
            .iter()
            .filter(|(_, c)| c.structural)
            .map(|(el, _)| (**el).id())
            .collect();
        let wraps = |el: &ElementRef<'_>, ids: &HashSet<_>| {
            (**el).descendants().skip(1).any(|n| ids.contains(&n.id()))
        };
        let kept_structural: HashSet<_> = accepted
            .iter()
            .filter(|(el, c)| c.structural && !wraps(el, &structural_ids))
            .map(|(el, _)| (**el).id())
            .collect();

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for (el, candidate) in accepted {
            let keep = if candidate.structural {
                kept_structural.contains(&(*el).id())
            } else {
                !wraps(&el, &all_ids)
                    && !(*el).ancestors().any(|a| kept_structural.contains(&a.id()))
            };
            if !keep || !seen.insert(normalize(&candidate.title)) {
                continue;
            }
            let venue = candidate
                .venue
                .or_else(|| self.default_venue.clone())
                .unwrap_or_default();
            match PublicationRecord::new(
                candidate.title,
                Some(candidate.year),
                venue,
                candidate.kind,
                self.source,
            ) {
                Ok(record) => records.push(record),
                Err(e) => tracing::debug!(error = %e, "dropping malformed entry"),
            }
        }
        records
    }

    fn candidate(&self, el: ElementRef<'_>, hint: Option<PublicationType>) -> Option<Candidate> {
        let text = element_text(el);
        if text.chars().count() < MIN_ENTRY_CHARS {
            return None;
        }

        let year = YEAR_RE
            .find_iter(&text)
            .filter_map(|m| m.as_str().parse::<i32>().ok())
            .filter(|y| (self.min_year..=self.max_year).contains(y))
            .last()?;

        let (title, structural) = self.pick_title(el, &text)?;
        if self.noise.iter().any(|marker| title.contains(marker.as_str())) {
            return None;
        }
        if looks_like_url(&title) || normalize(&title).chars().count() < MIN_TITLE_CHARS {
            return None;
        }

        let venue = el
            .select(&VENUE)
            .map(element_text)
            .find(|v| !v.is_empty() && *v != title && !looks_like_url(v));

        Some(Candidate {
            kind: classify_with_hint(&text, hint),
            title,
            structural,
            year: year.to_string(),
            venue,
        })
    }

    fn pick_title(&self, el: ElementRef<'_>, text: &str) -> Option<(String, bool)> {
        let usable = |t: &String| {
            normalize(t).chars().count() >= MIN_TITLE_CHARS && !looks_like_url(t)
        };

        if let Some(title) = el.select(&TITLE).map(element_text).find(usable) {
            return Some((title, true));
        }
        if let Some(title) = el
            .select(&ANCHOR)
            .filter(|a| !is_venue_link(el, *a))
            .map(element_text)
            .find(|t| t.chars().count() > MIN_LINK_TITLE_CHARS && !looks_like_url(t))
        {
            return Some((title, true));
        }

        let without_years = YEAR_RE.replace_all(text, "");
        let cleaned = squash_whitespace(&EMPTY_BRACKETS_RE.replace_all(&without_years, ""));
        let cleaned = cleaned
            .trim_matches(|c: char| c.is_whitespace() || ",.;:-|".contains(c))
            .to_string();
        (!cleaned.is_empty()).then_some((cleaned, false))
    }
}

/// A link that names the venue, by itself or through an enclosing venue block
/// inside `entry`.
fn is_venue_link(entry: ElementRef<'_>, anchor: ElementRef<'_>) -> bool {
    VENUE.matches(&anchor)
        || anchor
            .ancestors()
            .take_while(|n| n.id() != entry.id())
            .filter_map(ElementRef::wrap)
            .any(|parent| VENUE.matches(&parent))
}

/// Whether a page carries one of the source's explicit "not found" markers.
pub fn has_marker(html: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| !m.is_empty() && html.contains(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
    <html><body>
      <nav><div>Toggle navigation Anasayfa 2024</div></nav>
      <div class="list">
        <ul>
          <li><strong>Thin film infrared detectors for space</strong>
              <em>Journal of Applied Physics</em> 2019</li>
          <li><a href="/pub/2">Uncooled microbolometer arrays revisited in depth</a>
              Proceedings of SPIE, 2021</li>
          <li><a href="https://doi.org/10.1000/xyz">https://doi.org/10.1000/xyz</a> 2020</li>
          <li>Short 2018</li>
          <li>An entry without a year that is otherwise long enough</li>
          <li><strong>Thin film infrared detectors for space</strong> 2019</li>
          <li><strong>A very old paper on transistor physics</strong> 1985</li>
        </ul>
      </div>
      <table><tr><td>Bir kitap bölümü: Yarı iletken fizik uygulamaları</td><td>2016</td></tr></table>
    </body></html>"#;

    fn parser() -> ListingParser {
        ListingParser::new(SourceKind::Registry, vec!["Toggle navigation".into(), "Anasayfa".into()])
            .with_max_year(2026)
    }

    #[test]
    fn test_parse_keeps_innermost_valid_entries() {
        let records = parser().parse(LISTING, Some(PublicationType::Journal));
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Thin film infrared detectors for space",
                "Uncooled microbolometer arrays revisited in depth",
                "Bir kitap bölümü: Yarı iletken fizik uygulamaları",
            ]
        );

        assert_eq!(records[0].year, "2019");
        assert_eq!(records[0].venue, "Journal of Applied Physics");
        assert_eq!(records[0].kind, PublicationType::Journal);
        assert_eq!(records[1].kind, PublicationType::Conference);
        assert_eq!(records[1].year, "2021");
        assert_eq!(records[2].kind, PublicationType::Book);
        assert!(records.iter().all(|r| r.source == SourceKind::Registry));
    }

    #[test]
    fn test_linked_venue_does_not_replace_heading_title() {
        let html = r#"
        <div class="List-results-items">
          <div class="result-item">
            <h3><a href="/document/1">Advanced Radar Systems for Drones</a></h3>
            <div class="description">
              <a href="/xpl/RecentIssue.jsp?punumber=7">IEEE Transactions on Aerospace and Electronic Systems</a>
              <span>Year: 2023</span>
            </div>
          </div>
        </div>"#;
        let records = ListingParser::new(SourceKind::Xplore, vec![])
            .with_max_year(2026)
            .parse(html, None);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Advanced Radar Systems for Drones");
        assert_eq!(records[0].venue, "IEEE Transactions on Aerospace and Electronic Systems");
        assert_eq!(records[0].year, "2023");
        assert_eq!(records[0].kind, PublicationType::Journal);
    }

    #[test]
    fn test_hint_applies_when_keywords_absent() {
        let html = "<ul><li><b>Graphene based gas sensing layers</b> 2022</li></ul>";
        let as_conf = parser().parse(html, Some(PublicationType::Conference));
        assert_eq!(as_conf[0].kind, PublicationType::Conference);
        let unhinted = parser().parse(html, None);
        assert_eq!(unhinted[0].kind, PublicationType::Other);
    }

    #[test]
    fn test_default_venue() {
        let html = "<div><h3>Radar signal processing with deep nets</h3> Conference 2020</div>";
        let records = ListingParser::new(SourceKind::Xplore, vec![])
            .with_default_venue("IEEE Xplore")
            .with_max_year(2026)
            .parse(html, None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].venue, "IEEE Xplore");
    }

    #[test]
    fn test_classify_ambiguity() {
        assert_eq!(classify("IEEE Transactions on Electron Devices"), Some(PublicationType::Journal));
        assert_eq!(classify("Uluslararası Sempozyum bildirisi"), Some(PublicationType::Conference));
        assert_eq!(classify("Journal article presented at a conference"), None);
        assert_eq!(classify("nothing here"), None);
    }

    #[test]
    fn test_url_filter() {
        assert!(looks_like_url("https://example.org/paper"));
        assert!(looks_like_url("10.1109/LED.2020.1234567-extended"));
        assert!(!looks_like_url("Life on the www of things"));
        assert!(!looks_like_url("Normal publication title"));
    }

    #[test]
    fn test_not_found_markers() {
        let markers = vec!["Records not found".to_string()];
        assert!(has_marker("<p>Records not found</p>", &markers));
        assert!(!has_marker("<p>ok</p>", &markers));
        assert!(!has_marker("<p>ok</p>", &[String::new()]));
    }
}
