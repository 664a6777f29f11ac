//! Run result and diagnostics.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::FetchError;
use crate::types::content::PageExtraction;
use crate::types::page::DiscoveredPage;

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Robots,
    Discovery,
    Fetch,
    Render,
    Extraction,
    Orchestration,
}

/// Machine-readable cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    NoTherapistsFound,
    NoSpecialtiesFound,
    SpecialtyNotMatched,
    FetchTimeout,
    FetchHttp(u16),
    Blocked,
    Network,
    RenderFailed,
    RenderUnavailable,
    ExtractionEmpty,
    RobotsDisallowed,
    InvalidManualUrl,
    BudgetExhausted,
    Cancelled,
}

impl From<&FetchError> for DiagnosticKind {
    fn from(error: &FetchError) -> Self {
        match error {
            FetchError::Timeout { .. } => DiagnosticKind::FetchTimeout,
            FetchError::Http { status, .. } => DiagnosticKind::FetchHttp(*status),
            FetchError::Blocked { .. } => DiagnosticKind::Blocked,
            FetchError::Network { .. } => DiagnosticKind::Network,
            FetchError::Render { .. } => DiagnosticKind::RenderFailed,
            FetchError::RenderUnavailable => DiagnosticKind::RenderUnavailable,
            FetchError::Cancelled => DiagnosticKind::Cancelled,
        }
    }
}

/// A non-fatal problem reported alongside the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    pub kind: DiagnosticKind,
    pub url: Option<Url>,
    pub specialty: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(stage: Stage, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            stage,
            kind,
            url: None,
            specialty: None,
            message: message.into(),
        }
    }

    pub fn error(stage: Stage, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::warning(stage, kind, message)
        }
    }

    /// Diagnostic for a failed fetch. Cancellation is a warning; the rest are errors.
    pub fn from_fetch_error(stage: Stage, error: &FetchError) -> Self {
        let kind = DiagnosticKind::from(error);
        match error {
            FetchError::Cancelled | FetchError::RenderUnavailable => {
                Self::warning(stage, kind, error.to_string())
            }
            _ => Self::error(stage, kind, error.to_string()),
        }
    }

    pub fn with_url(mut self, url: &Url) -> Self {
        self.url = Some(url.clone());
        self
    }

    pub fn with_specialty(mut self, name: impl Into<String>) -> Self {
        self.specialty = Some(name.into());
        self
    }
}

/// Everything one run produced. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteScrapeResult {
    pub run_id: Uuid,
    pub root_url: Url,
    pub therapist_name: Option<String>,

    /// Absent only when no therapist page was found or supplied
    pub therapist: Option<PageExtraction>,

    /// Keyed by requested specialty name, in request order
    pub specialties: IndexMap<String, PageExtraction>,

    /// Every page the finder classified, plus manual pages
    pub pages: Vec<DiscoveredPage>,

    pub diagnostics: Vec<Diagnostic>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SiteScrapeResult {
    /// Diagnostics of one kind.
    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn has_diagnostic(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics_of(kind).next().is_some()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fetch_error() {
        let url = Url::parse("https://example.com/anxiety").unwrap();
        let diag = Diagnostic::from_fetch_error(
            Stage::Fetch,
            &FetchError::Http {
                url: url.to_string(),
                status: 404,
            },
        )
        .with_url(&url)
        .with_specialty("Anxiety");

        assert_eq!(diag.kind, DiagnosticKind::FetchHttp(404));
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.specialty.as_deref(), Some("Anxiety"));

        let diag = Diagnostic::from_fetch_error(Stage::Fetch, &FetchError::Cancelled);
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.kind, DiagnosticKind::Cancelled);
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&DiagnosticKind::NoTherapistsFound).unwrap(),
            "\"no_therapists_found\""
        );
        assert_eq!(
            serde_json::to_string(&DiagnosticKind::FetchHttp(503)).unwrap(),
            "{\"fetch_http\":503}"
        );
    }
}
