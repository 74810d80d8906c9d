//! Artifact lifecycle and revision chains.
//!
//! Artifact ids follow `art_{base}` or `art_{base}_v{n}`. Requesting
//! changes on an artifact creates the next revision of its chain; approving
//! one supersedes the older revisions of the same task and type.

use std::collections::BTreeMap;

use officeclaw_types::{Artifact, ArtifactId, ArtifactStatus};

/// Base id used for artifacts whose id does not follow the chain format.
pub const GENERATED_ARTIFACT_BASE: &str = "art_generated";

/// Whether `from -> to` is a legal artifact status transition.
pub const fn can_transition(from: ArtifactStatus, to: ArtifactStatus) -> bool {
    use ArtifactStatus::{
        Approved, Archived, ChangesRequested, Created, Delivered, InReview, Superseded,
    };
    matches!(
        (from, to),
        (Created, Created | Delivered | Superseded)
            | (Delivered, Delivered | InReview | Approved | ChangesRequested | Superseded)
            | (InReview, InReview | Approved | ChangesRequested | Superseded)
            | (ChangesRequested, ChangesRequested | InReview | Superseded)
            | (Approved, Approved | Archived | Superseded)
            | (Superseded, Superseded | Archived)
            | (Archived, Archived)
    )
}

/// Apply a transition if it is legal. Returns whether it was applied.
pub fn transition(artifact: &mut Artifact, to: ArtifactStatus) -> bool {
    if !can_transition(artifact.status, to) {
        return false;
    }
    artifact.status = to;
    true
}

/// Chain identity of an artifact: its base id and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionIdentity {
    /// Id without the `_v{n}` suffix.
    pub base_id: String,
    /// Version within the chain.
    pub version: u32,
}

fn is_chain_base(candidate: &str) -> bool {
    let Some(rest) = candidate.strip_prefix("art_") else {
        return false;
    };
    let mut tokens = rest.split('_');
    let first_ok = tokens.next().is_some_and(|first| {
        first.starts_with(|c: char| c.is_ascii_lowercase())
            && first
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    });
    first_ok
        && tokens.all(|token| {
            !token.is_empty()
                && token
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

fn version_suffix(digits: &str) -> Option<u32> {
    let first = digits.chars().next()?;
    if first == '0' || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Split an artifact id into its chain base and version.
///
/// `version_hint` (clamped to at least 1) is used when the id carries no
/// version, and acts as a floor when it does. Ids outside the chain format
/// all share the [`GENERATED_ARTIFACT_BASE`] chain.
pub fn parse_revision_identity(artifact_id: &str, version_hint: u32) -> RevisionIdentity {
    let hint = version_hint.max(1);
    let id = artifact_id.trim();
    if let Some((base, digits)) = id.rsplit_once("_v")
        && is_chain_base(base)
        && let Some(version) = version_suffix(digits)
    {
        return RevisionIdentity {
            base_id: base.to_owned(),
            version: version.max(hint),
        };
    }
    if is_chain_base(id) {
        return RevisionIdentity {
            base_id: id.to_owned(),
            version: hint,
        };
    }
    RevisionIdentity {
        base_id: GENERATED_ARTIFACT_BASE.to_owned(),
        version: hint,
    }
}

/// Id and version of the next revision in `source`'s chain.
///
/// The version is one past the highest version in the chain, bumped further
/// while the resulting id is already taken.
pub fn next_revision(
    source: &Artifact,
    artifacts: &BTreeMap<ArtifactId, Artifact>,
) -> (ArtifactId, u32) {
    let identity = parse_revision_identity(source.artifact_id.as_str(), source.version);
    let max_version = artifacts
        .values()
        .map(|artifact| parse_revision_identity(artifact.artifact_id.as_str(), artifact.version))
        .filter(|other| other.base_id == identity.base_id)
        .map(|other| other.version)
        .fold(identity.version, u32::max);

    let mut version = max_version.saturating_add(1);
    let mut candidate = ArtifactId::new(format!("{}_v{version}", identity.base_id));
    while artifacts.contains_key(&candidate) && version < u32::MAX {
        version = version.saturating_add(1);
        candidate = ArtifactId::new(format!("{}_v{version}", identity.base_id));
    }
    (candidate, version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use officeclaw_types::ProjectId;

    fn artifact(id: &str, version: u32, status: ArtifactStatus) -> Artifact {
        Artifact {
            artifact_id: ArtifactId::from(id),
            project_id: ProjectId::from("proj_abc"),
            artifact_type: String::from("report"),
            status,
            version,
            task_id: None,
            poi_id: None,
        }
    }

    #[test]
    fn archived_is_absorbing() {
        assert!(!can_transition(ArtifactStatus::Archived, ArtifactStatus::Delivered));
        assert!(can_transition(ArtifactStatus::Archived, ArtifactStatus::Archived));
        assert!(!can_transition(ArtifactStatus::Approved, ArtifactStatus::ChangesRequested));
        assert!(can_transition(ArtifactStatus::ChangesRequested, ArtifactStatus::InReview));
        assert!(!can_transition(ArtifactStatus::ChangesRequested, ArtifactStatus::Approved));
    }

    #[test]
    fn revision_identity_parses_chain_ids() {
        assert_eq!(
            parse_revision_identity("art_research_report_v1", 1),
            RevisionIdentity {
                base_id: String::from("art_research_report"),
                version: 1
            }
        );
        assert_eq!(
            parse_revision_identity("art_research_report_v3", 5).version,
            5
        );
        assert_eq!(
            parse_revision_identity(" art_plan ", 2),
            RevisionIdentity {
                base_id: String::from("art_plan"),
                version: 2
            }
        );
        assert_eq!(parse_revision_identity("art_v2", 1).base_id, "art_v2");
        assert_eq!(parse_revision_identity("art_x_v01", 1).base_id, "art_x_v01");
        assert_eq!(
            parse_revision_identity("Report-Final", 0),
            RevisionIdentity {
                base_id: String::from(GENERATED_ARTIFACT_BASE),
                version: 1
            }
        );
    }

    #[test]
    fn next_revision_skips_taken_versions() {
        let mut artifacts = BTreeMap::new();
        for (id, version) in [("art_report_v1", 1), ("art_report_v2", 2), ("art_other_v7", 7)] {
            artifacts.insert(
                ArtifactId::from(id),
                artifact(id, version, ArtifactStatus::Delivered),
            );
        }
        let source = artifact("art_report_v1", 1, ArtifactStatus::ChangesRequested);
        let (id, version) = next_revision(&source, &artifacts);
        assert_eq!(id.as_str(), "art_report_v3");
        assert_eq!(version, 3);
    }

    #[test]
    fn illegal_transition_leaves_status() {
        let mut item = artifact("art_a_v1", 1, ArtifactStatus::Archived);
        assert!(!transition(&mut item, ArtifactStatus::Approved));
        assert_eq!(item.status, ArtifactStatus::Archived);
    }
}
