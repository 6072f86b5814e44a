//! pubrecon engine: identifier resolution, publication extraction and cross-source
//! reconciliation.

pub mod analyzer;
pub mod error;
pub mod grouper;
pub mod http;
pub mod identifier;
pub mod matcher;
pub mod reconcile;
pub mod render;
pub mod resolver;
pub mod sources;
pub mod survey;
pub mod text;

pub use analyzer::{
    AnalysisOutcome, AnalyzeOptions, Analyzer, ExtractionSummary, ScanSummary, ThesisCheck,
};
pub use error::{EngineError, Result};
pub use grouper::ReportGrouper;
pub use identifier::IdentifierInput;
pub use matcher::TitleMatcher;
pub use reconcile::{Reconciler, cross_check_theses};
pub use resolver::{AffiliationQuery, IdentifierResolver, PersonQuery, Resolution, ResolutionState};
pub use sources::{
    Extraction, PublicationSource, SourceAdapter, SourceContext, extract_publications,
};
pub use survey::{DepartmentSurvey, SurveyCounts, SurveyReport, SurveyRow};
pub use text::normalize;
