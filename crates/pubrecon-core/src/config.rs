use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::models::{PublicationType, SourceKind};

/// Root application configuration, loaded from `~/.config/pubrecon/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub matcher: MatcherConfig,
    pub resolver: ResolverConfig,
    pub scan: ScanConfig,
    pub grouping: GroupingConfig,
    pub survey: SurveyConfig,
    pub search: SearchConfig,
    pub render: RenderConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub threshold: f64,
    /// Lower threshold used when checking supervised theses against publications.
    pub thesis_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub strategy_timeout_secs: u64,
    /// Prefixes stripped from names before they are typed into a search box.
    pub honorifics: Vec<String>,
    /// Affiliation keywords used to pick among author-search candidates.
    /// When empty the person's institution is used instead.
    pub affiliation_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub inter_person_delay_ms: u64,
    /// Side A of every comparison.
    pub source_a: SourceKind,
    /// Side B of every comparison.
    pub source_b: SourceKind,
    pub compared_types: Vec<PublicationType>,
    /// Upper bound on next-page / scroll triggers per listing.
    pub max_load_more: u32,
    /// Consecutive no-growth triggers before a listing counts as fully loaded.
    pub stuck_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherBucket {
    pub publisher: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Ordered buckets; the first bucket whose keyword matches a venue wins.
    pub buckets: Vec<PublisherBucket>,
    pub other_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    pub delay_ms: u64,
    pub page_size: u32,
    pub national_keywords: Vec<String>,
    /// Roster used when a survey is started without names: the institution (or its
    /// citation index affiliation id) and a department keyword.
    pub institution: Option<String>,
    pub affiliation_id: Option<String>,
    pub department_keyword: Option<String>,
    pub roster_size: u32,
}

/// Restricted web search used to find profile links on a source's domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub query_param: String,
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub page_timeout_secs: u64,
    /// Minimum gap between page loads across all rendered sources.
    pub min_interval_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub registry: RegistryConfig,
    pub citation_index: CitationIndexConfig,
    pub xplore: XploreConfig,
}

/// A tab on a rendered profile page and the publication type it lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionConfig {
    pub label: String,
    pub kind: PublicationType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Profile path, `{id}` is replaced by the identifier.
    pub profile_path: String,
    /// Internal search path, `{query}` is replaced by the encoded name.
    pub search_path: String,
    /// Tab to activate on the search results page before reading links.
    pub search_tab: Option<String>,
    pub site_domain: String,
    /// Regexes whose first capture group is the identifier.
    pub profile_link_patterns: Vec<String>,
    pub not_found_markers: Vec<String>,
    pub sections: Vec<SectionConfig>,
    pub noise_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationIndexConfig {
    pub enabled: bool,
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub page_size: u32,
    pub max_pages: u32,
    pub author_candidates: u32,
    pub site_domain: String,
    pub profile_link_patterns: Vec<String>,
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XploreConfig {
    pub enabled: bool,
    pub base_url: String,
    pub profile_path: String,
    pub search_path: String,
    pub search_tab: Option<String>,
    pub site_domain: String,
    pub profile_link_patterns: Vec<String>,
    pub not_found_markers: Vec<String>,
    pub noise_markers: Vec<String>,
    /// Venue recorded for every item, the profile page does not carry one reliably.
    pub venue_label: String,
}

// ─── Defaults ──────────────────────────────────────────────

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("pubrecon");
        Self {
            database_path: data_dir.join("pubrecon.db").to_string_lossy().to_string(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            thesis_threshold: 0.6,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_secs: 30,
            honorifics: strings(&[
                "Prof.", "Dr.", "Doç.", "Doc.", "Assoc.", "Asst.", "Arş.", "Gör.", "Öğr.",
                "Üyesi", "Yrd.",
            ]),
            affiliation_keywords: Vec::new(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            inter_person_delay_ms: 2000,
            source_a: SourceKind::Registry,
            source_b: SourceKind::CitationIndex,
            compared_types: PublicationType::COMPARED.to_vec(),
            max_load_more: 10,
            stuck_limit: 2,
        }
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        let bucket = |publisher: &str, keywords: &[&str]| PublisherBucket {
            publisher: publisher.to_string(),
            keywords: strings(keywords),
        };
        Self {
            buckets: vec![
                bucket("IEEE", &["IEEE", "Institute of Electrical-Electronics"]),
                bucket("Springer", &["Springer", "Nature"]),
                bucket("Wiley", &["Wiley"]),
                bucket("Elsevier", &["Elsevier", "ScienceDirect"]),
                bucket("ACM", &["ACM", "Association for Computing Machinery"]),
                bucket("Taylor & Francis", &["Taylor", "Francis"]),
                bucket("Sage", &["Sage"]),
                bucket("IOP", &["IOP", "Institute of Physics"]),
                bucket("AIP", &["AIP", "American Institute of Physics"]),
                bucket("MDPI", &["MDPI"]),
                bucket("Frontiers", &["Frontiers"]),
                bucket("PLOS", &["PLOS", "Public Library of Science"]),
                bucket("Oxford", &["Oxford"]),
                bucket("Cambridge", &["Cambridge"]),
            ],
            other_label: "Other".to_string(),
        }
    }
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            delay_ms: 400,
            page_size: 200,
            national_keywords: strings(&[
                "turkey", "turkish", "türk", "ankara", "istanbul", "izmir", "ulusal",
                "national", "türkiye",
            ]),
            institution: None,
            affiliation_id: None,
            department_keyword: None,
            roster_size: 25,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
            query_param: "q".to_string(),
            min_interval_ms: 1000,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: 30,
            min_interval_ms: 1500,
            user_agent: format!("pubrecon/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://akademik.yok.gov.tr".to_string(),
            profile_path: "/AkademikArama/Akademisyen/Detay/{id}".to_string(),
            search_path: "/AkademikArama/AkademisyenArama?aramaTerim={query}".to_string(),
            search_tab: Some("Akademisyenler".to_string()),
            site_domain: "akademik.yok.gov.tr".to_string(),
            profile_link_patterns: strings(&[r"Detay/(\d+)", r"authorId=([A-Za-z0-9]+)"]),
            not_found_markers: strings(&[
                "İstediğiniz işleme cevap veremiyoruz",
                "Records not found",
            ]),
            sections: vec![
                SectionConfig {
                    label: "Makale".to_string(),
                    kind: PublicationType::Journal,
                },
                SectionConfig {
                    label: "Bildiri".to_string(),
                    kind: PublicationType::Conference,
                },
            ],
            noise_markers: strings(&[
                "Toggle navigation",
                "Yükseköğretim Kurulu",
                "Kişisel Bilgiler",
                "Telif Hakkı",
                "Anasayfa",
                "Birlikte çalıştığı kişiler",
                "Detaylı Arama",
                "Akademisyenler",
                "Bölümler",
            ]),
        }
    }
}

impl Default for CitationIndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.elsevier.com".to_string(),
            api_key: None,
            page_size: 25,
            max_pages: 10,
            author_candidates: 10,
            site_domain: "scopus.com".to_string(),
            profile_link_patterns: strings(&[r"authorId=(\d+)"]),
            min_interval_ms: 400,
        }
    }
}

impl Default for XploreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://ieeexplore.ieee.org".to_string(),
            profile_path: "/author/{id}".to_string(),
            search_path: "/search/searchresult.jsp?newsearch=true&queryText={query}".to_string(),
            search_tab: Some("Authors".to_string()),
            site_domain: "ieeexplore.ieee.org".to_string(),
            profile_link_patterns: strings(&[r"/author/(\d+)"]),
            not_found_markers: strings(&["Page Not Found", "Author not found"]),
            noise_markers: strings(&["Sign In", "Cookie", "Export to Collabratec"]),
            venue_label: "IEEE Xplore".to_string(),
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/pubrecon/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PUBRECON_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("pubrecon")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults, then apply env overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Secrets live in the environment, not in the config file.
    pub fn apply_env_overrides(&mut self) {
        let key = std::env::var("PUBRECON_SCOPUS_API_KEY")
            .or_else(|_| std::env::var("SCOPUS_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Some(key) = key {
            self.sources.citation_index.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("matcher.threshold", self.matcher.threshold),
            ("matcher.thesis_threshold", self.matcher.thesis_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::ConfigError(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.scan.source_a == self.scan.source_b {
            return Err(CoreError::ConfigError(
                "scan.source_a and scan.source_b must differ".to_string(),
            ));
        }
        if self.scan.stuck_limit == 0 {
            return Err(CoreError::ConfigError(
                "scan.stuck_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.database_path)
    }

    pub fn is_enabled(&self, source: SourceKind) -> bool {
        match source {
            SourceKind::Registry => self.sources.registry.enabled,
            SourceKind::CitationIndex => self.sources.citation_index.enabled,
            SourceKind::Xplore => self.sources.xplore.enabled,
        }
    }
}
