use crate::types::{EvidenceKind, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// An attachment substantiating a step: photo, signature, or note.
/// Immutable once attached — removal rebuilds the sequence without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub kind: EvidenceKind,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub captured_at: DateTime<Utc>,
}

impl Evidence {
    pub fn new(kind: EvidenceKind, metadata: BTreeMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            metadata,
            captured_at: Utc::now(),
        }
    }

    pub fn photo(metadata: BTreeMap<String, String>) -> Self {
        Self::new(EvidenceKind::Photo, metadata)
    }

    pub fn signature(metadata: BTreeMap<String, String>) -> Self {
        Self::new(EvidenceKind::Signature, metadata)
    }

    pub fn note(text: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("text".to_string(), text.into());
        Self::new(EvidenceKind::Note, metadata)
    }
}

// ---------------------------------------------------------------------------
// EvidenceRequirements
// ---------------------------------------------------------------------------

/// Declared minimums a completed step must carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRequirements {
    #[serde(default)]
    pub min_photos: u32,
    #[serde(default)]
    pub signature_required: bool,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub status: StepStatus,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub evidence_requirements: EvidenceRequirements,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn new(id: impl Into<String>, title: impl Into<String>, required: bool) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: StepStatus::Pending,
            required,
            dependencies: Vec::new(),
            data: BTreeMap::new(),
            evidence: Vec::new(),
            evidence_requirements: EvidenceRequirements::default(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn add_evidence(&mut self, evidence: Evidence) {
        self.evidence.push(evidence);
    }

    /// Remove an evidence item by id. Returns `false` if not present.
    pub fn remove_evidence(&mut self, evidence_id: &str) -> bool {
        let before = self.evidence.len();
        self.evidence.retain(|e| e.id != evidence_id);
        self.evidence.len() < before
    }

    pub fn photo_count(&self) -> usize {
        self.evidence
            .iter()
            .filter(|e| e.kind == EvidenceKind::Photo)
            .count()
    }

    pub fn has_signature(&self) -> bool {
        self.evidence
            .iter()
            .any(|e| e.kind == EvidenceKind::Signature)
    }

    /// Human-readable evidence deficiencies, empty when the minimums are met.
    pub fn evidence_gaps(&self) -> Vec<String> {
        let mut gaps = Vec::new();
        let req = &self.evidence_requirements;
        let photos = self.photo_count();
        if photos < req.min_photos as usize {
            gaps.push(format!(
                "needs {} photo(s), has {}",
                req.min_photos, photos
            ));
        }
        if req.signature_required && !self.has_signature() {
            gaps.push("missing signature".to_string());
        }
        gaps
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_ids_are_unique() {
        let a = Evidence::note("arrived on site");
        let b = Evidence::note("arrived on site");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn remove_evidence_filters_by_id() {
        let mut step = Step::new("s1", "Install ONT", true);
        let photo = Evidence::photo(BTreeMap::new());
        let photo_id = photo.id.clone();
        step.add_evidence(photo);
        step.add_evidence(Evidence::note("serial recorded"));

        assert!(step.remove_evidence(&photo_id));
        assert_eq!(step.evidence.len(), 1);
        assert_eq!(step.photo_count(), 0);

        // Second removal finds nothing
        assert!(!step.remove_evidence(&photo_id));
    }

    #[test]
    fn evidence_gaps_report_missing_minimums() {
        let mut step = Step::new("s1", "Splice fiber", true);
        step.evidence_requirements = EvidenceRequirements {
            min_photos: 2,
            signature_required: true,
        };
        step.add_evidence(Evidence::photo(BTreeMap::new()));

        let gaps = step.evidence_gaps();
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0].contains("photo"));
        assert!(gaps[1].contains("signature"));

        step.add_evidence(Evidence::photo(BTreeMap::new()));
        step.add_evidence(Evidence::signature(BTreeMap::new()));
        assert!(step.evidence_gaps().is_empty());
    }

    #[test]
    fn no_requirements_no_gaps() {
        let step = Step::new("s1", "Confirm appointment", false);
        assert!(step.evidence_gaps().is_empty());
    }
}
