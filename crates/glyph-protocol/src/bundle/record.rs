//! The web bundle record carried by a transmission.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Kind of experience a bundle holds.
///
/// The set is open: tags this build does not know are kept verbatim in
/// [`TemplateType::Other`] so they survive a decode/encode cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TemplateType {
    /// Multiple-choice quiz.
    Trivia,
    /// Long-form text.
    Article,
    /// Interactive drawing canvas.
    Art,
    /// Branching story.
    Adventure,
    /// Any other tag.
    Other(String),
}

impl TemplateType {
    /// Wire name of the template type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Trivia => "trivia",
            Self::Article => "article",
            Self::Art => "art",
            Self::Adventure => "adventure",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for TemplateType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "trivia" => Self::Trivia,
            "article" => Self::Article,
            "art" => Self::Art,
            "adventure" => Self::Adventure,
            _ => Self::Other(tag),
        }
    }
}

impl From<&str> for TemplateType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<TemplateType> for String {
    fn from(template: TemplateType) -> Self {
        match template {
            TemplateType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A self-contained web experience: a title, an HTML document, an optional
/// template tag and a creation time.
///
/// Field order is the canonical serialization order, so equal bundles
/// always serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawWebBundle")]
pub struct WebBundle {
    title: String,
    html: String,
    template_type: Option<TemplateType>,
    /// Seconds since the Unix epoch, with fractional precision.
    created_at: f64,
}

impl WebBundle {
    /// Create a bundle stamped with the current time.
    pub fn new(
        title: impl Into<String>,
        html: impl Into<String>,
        template_type: Option<TemplateType>,
    ) -> Self {
        Self {
            title: title.into(),
            html: html.into(),
            template_type,
            created_at: now_fractional_secs(),
        }
    }

    /// Replace the creation timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidBundle`] if the timestamp is not a
    /// finite, non-negative number (it could not be serialized as a JSON
    /// number otherwise).
    pub fn with_created_at(mut self, created_at: f64) -> Result<Self> {
        if !created_at.is_finite() || created_at < 0.0 {
            return Err(ProtocolError::InvalidBundle(format!(
                "createdAt must be a finite non-negative number, got {created_at}"
            )));
        }
        self.created_at = created_at;
        Ok(self)
    }

    /// Bundle title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// HTML document.
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Template tag, if any.
    pub fn template_type(&self) -> Option<&TemplateType> {
        self.template_type.as_ref()
    }

    /// Creation time in seconds since the Unix epoch.
    pub fn created_at(&self) -> f64 {
        self.created_at
    }
}

/// Wire shape of a bundle before its timestamp is checked.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWebBundle {
    title: String,
    html: String,
    template_type: Option<TemplateType>,
    created_at: f64,
}

impl TryFrom<RawWebBundle> for WebBundle {
    type Error = ProtocolError;

    fn try_from(raw: RawWebBundle) -> Result<Self> {
        Self::new(raw.title, raw.html, raw.template_type).with_created_at(raw.created_at)
    }
}

fn now_fractional_secs() -> f64 {
    // A clock before the epoch is treated as the epoch itself.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
