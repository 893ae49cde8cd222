// src/envelope.rs
// Uniform response envelope builder (spec §3, §4.3)

use serde::Serialize;
use serde_json::Value;

/// Current envelope schema version. Every successful `tools/call` response
/// body carries this value (spec invariant, P2).
pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    Speculative,
}

impl ConfidenceTier {
    /// Deterministic score → tier mapping (spec §3, P8).
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            ConfidenceTier::High
        } else if score >= 0.6 {
            ConfidenceTier::Medium
        } else if score >= 0.3 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::Speculative
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Confidence {
    pub score: f64,
    pub tier: ConfidenceTier,
}

#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub backends: Vec<String>,
    #[serde(rename = "repoStateId")]
    pub repo_state_id: String,
    pub completeness: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Truncation {
    #[serde(rename = "isTruncated")]
    pub is_truncated: bool,
    pub shown: u64,
    pub total: u64,
    pub reason: Option<String>,
}

impl Truncation {
    /// Construct, enforcing `total >= shown >= 0` and `isTruncated ⇔ shown <
    /// total` (spec invariant, P3).
    pub fn new(shown: u64, total: u64, reason: Option<String>) -> Self {
        let total = total.max(shown);
        Truncation {
            is_truncated: shown < total,
            shown,
            total,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexAge {
    #[serde(rename = "commitsBehind")]
    pub commits_behind: u64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Freshness {
    #[serde(rename = "indexAge")]
    pub index_age: IndexAge,
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestedCall {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnvelopeMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<Truncation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<EnvelopeMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<Warning>>,
    #[serde(rename = "suggestedNextCalls", skip_serializing_if = "Option::is_none")]
    pub suggested_next_calls: Option<Vec<SuggestedCall>>,
}

/// Builds an [`Envelope`] incrementally, deriving `meta.confidence.tier` from
/// the raw score unless the cross-repo flag forces `speculative` (spec §4.3,
/// P8).
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    data: Option<Value>,
    confidence_score: Option<f64>,
    provenance: Option<Provenance>,
    truncation: Option<Truncation>,
    freshness: Option<Freshness>,
    warnings: Vec<Warning>,
    suggested_next_calls: Vec<SuggestedCall>,
    cross_repo: bool,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn confidence(mut self, score: f64) -> Self {
        self.confidence_score = Some(score.clamp(0.0, 1.0));
        self
    }

    pub fn provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn truncation(mut self, truncation: Truncation) -> Self {
        self.truncation = Some(truncation);
        self
    }

    pub fn freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = Some(freshness);
        self
    }

    pub fn warn(mut self, message: impl Into<String>) -> Self {
        self.warnings.push(Warning {
            message: message.into(),
        });
        self
    }

    pub fn suggest(mut self, tool: impl Into<String>, args: Option<Value>, reason: impl Into<String>) -> Self {
        self.suggested_next_calls.push(SuggestedCall {
            tool: tool.into(),
            args,
            reason: reason.into(),
        });
        self
    }

    /// Forces the tier to `speculative` regardless of score (spec §3, P8).
    /// Federation/cross-repo tools call this unconditionally.
    pub fn cross_repo(mut self) -> Self {
        self.cross_repo = true;
        self
    }

    pub fn build(self) -> Envelope {
        let confidence = self.confidence_score.map(|score| {
            let tier = if self.cross_repo {
                ConfidenceTier::Speculative
            } else {
                ConfidenceTier::from_score(score)
            };
            Confidence { score, tier }
        });

        let meta = if confidence.is_some()
            || self.provenance.is_some()
            || self.truncation.is_some()
            || self.freshness.is_some()
        {
            Some(EnvelopeMeta {
                confidence,
                provenance: self.provenance,
                truncation: self.truncation,
                freshness: self.freshness,
            })
        } else {
            None
        };

        Envelope {
            schema_version: SCHEMA_VERSION.to_string(),
            data: self.data.unwrap_or(Value::Null),
            meta,
            warnings: (!self.warnings.is_empty()).then_some(self.warnings),
            suggested_next_calls: (!self.suggested_next_calls.is_empty())
                .then_some(self.suggested_next_calls),
        }
    }

    /// Shortcut for operational tools (status, doctor, decision CRUD, ...):
    /// factual state with no provenance, maximal confidence.
    pub fn operational(data: Value) -> Envelope {
        EnvelopeBuilder::new()
            .data(data)
            .confidence(1.0)
            .build()
    }
}
