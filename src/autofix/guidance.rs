// src/autofix/guidance.rs
//
// Post-update guidance records.
//
// Purely advisory output attached to fix reports: what still needs a
// human, in what order, and roughly how long it will take. Guidance
// generation must never fail a fix run; anything that can't be computed
// is simply omitted.

use super::migration::{self, ChangeKind};
use super::{Confidence, FixOp, FixType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Complete,
    Partial,
    ManualRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceAction {
    pub priority: ActionPriority,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// Under five minutes.
    Quick,
    /// Five to fifteen minutes.
    Short,
    /// Fifteen to forty-five minutes.
    Moderate,
    /// Anything longer.
    Extended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostUpdateGuidance {
    pub node_name: String,
    pub migration_status: MigrationStatus,
    pub actions: Vec<GuidanceAction>,
    pub deprecated_properties: Vec<String>,
    pub behavior_changes: Vec<String>,
    /// Ordered steps; follow top to bottom.
    pub migration_steps: Vec<String>,
    pub confidence: Confidence,
    pub estimated_time: TimeBucket,
}

/// Build guidance for one node from the fixes that touched it.
/// Returns None when there is nothing useful to say.
pub fn build(node_name: &str, node_type: &str, fixes: &[&FixOp]) -> Option<PostUpdateGuidance> {
    if fixes.is_empty() {
        return None;
    }

    let mut actions: Vec<GuidanceAction> = Vec::new();
    let mut deprecated: Vec<String> = Vec::new();
    let mut steps: Vec<String> = Vec::new();
    let mut remaining_total = 0usize;

    for fix in fixes {
        match fix.fix_type {
            FixType::TypeversionUpgrade => {
                if let Some(meta) = &fix.migration {
                    remaining_total += meta.remaining.len();
                    for hint in &meta.remaining {
                        actions.push(GuidanceAction {
                            priority: ActionPriority::High,
                            description: hint.clone(),
                        });
                    }
                    for applied in &meta.applied {
                        if applied.action == "remove_property" {
                            deprecated.push(applied.property.clone());
                        }
                        steps.push(format!("{} ({})", applied.property, applied.action));
                    }
                }
            }
            FixType::VersionMigration => {
                actions.push(GuidanceAction {
                    priority: ActionPriority::Medium,
                    description: fix.description.clone(),
                });
            }
            FixType::NodeTypeCorrection => {
                actions.push(GuidanceAction {
                    priority: ActionPriority::Critical,
                    description: format!(
                        "verify that the corrected node type preserves the intended behavior of '{node_name}'"
                    ),
                });
            }
            _ => {
                actions.push(GuidanceAction {
                    priority: ActionPriority::Low,
                    description: fix.description.clone(),
                });
            }
        }
    }

    let behavior_changes = curated_behavior_changes(node_type);
    steps.extend(
        actions
            .iter()
            .filter(|a| a.priority >= ActionPriority::High)
            .map(|a| a.description.clone()),
    );

    let migration_status = if remaining_total == 0 {
        MigrationStatus::Complete
    } else if remaining_total <= 2 {
        MigrationStatus::Partial
    } else {
        MigrationStatus::ManualRequired
    };

    let confidence = match migration_status {
        MigrationStatus::Complete => Confidence::High,
        MigrationStatus::Partial => Confidence::Medium,
        MigrationStatus::ManualRequired => Confidence::Low,
    };

    Some(PostUpdateGuidance {
        node_name: node_name.to_string(),
        migration_status,
        estimated_time: estimate_time(&actions),
        actions,
        deprecated_properties: deprecated,
        behavior_changes,
        migration_steps: steps,
        confidence,
    })
}

/// Weighted minutes per action priority, then bucketed.
fn estimate_time(actions: &[GuidanceAction]) -> TimeBucket {
    let minutes: u32 = actions
        .iter()
        .map(|a| match a.priority {
            ActionPriority::Critical => 15,
            ActionPriority::High => 10,
            ActionPriority::Medium => 5,
            ActionPriority::Low => 1,
        })
        .sum();
    match minutes {
        0..=4 => TimeBucket::Quick,
        5..=14 => TimeBucket::Short,
        15..=44 => TimeBucket::Moderate,
        _ => TimeBucket::Extended,
    }
}

/// Curated, per-type notes about behavior that changes silently across
/// versions (nothing the registry can express as a property edit).
fn curated_behavior_changes(node_type: &str) -> Vec<String> {
    let mut out = Vec::new();
    match node_type {
        "n8n-nodes-base.switch" => {
            out.push("v3 evaluates rules with strict type validation; string/number coercions that matched before may stop matching".to_string());
        }
        "n8n-nodes-base.httpRequest" => {
            out.push("v3 no longer follows redirects by default; enable options.redirect if the old behavior is needed".to_string());
        }
        "n8n-nodes-base.set" => {
            out.push("v3 keeps only declared fields unless includeOtherFields is set".to_string());
        }
        "n8n-nodes-base.merge" => {
            out.push("combine mode pairs items by position instead of appending streams".to_string());
        }
        _ => {}
    }
    // Registry hints for breaking changes double as behavior notes.
    for change in migration::REGISTRY {
        if change.node_type == node_type
            && change.is_breaking
            && change.kind == ChangeKind::TypeChanged
        {
            out.push(change.hint.to_string());
        }
    }
    out.dedup();
    out
}
