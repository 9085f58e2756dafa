//! Phase history of a deal, rebuilt from its audit log.
use crate::error::{Error, Result};
use crate::model::{Deal, DealUpdate, PhaseTransition, PipelineChangeResult, Stage};

/// Change-log field name of a stage move.
pub const PHASE_FIELD: &str = "Phase";
pub const EDIT_ACTION: &str = "edit";

/// Seed the history with the first stage at the deal's creation time, then
/// append one transition per `edit` story whose first change is a Phase
/// change. Entries without a story are skipped. Returns `None` when the deal
/// never moved.
///
/// Only the first change-log entry of a story is inspected; the audit log
/// records one field per story. The output is sorted by time, with the seed
/// kept first on ties.
pub fn reconstruct(
    deal: Deal,
    updates: Vec<DealUpdate>,
    stages: &[Stage],
) -> Result<Option<PipelineChangeResult>> {
    let first = stages.first().ok_or_else(|| {
        Error::InvalidInput(format!("deal {}: pipeline has no stages", deal.id))
    })?;

    let mut transitions = vec![PhaseTransition {
        phase: first.name.clone(),
        at: deal.add_time,
    }];
    for update in &updates {
        let Some(story) = &update.story_data else {
            continue;
        };
        if story.action_type != EDIT_ACTION {
            continue;
        }
        let Some(change) = story.change_log.first() else {
            continue;
        };
        if change.field_name != PHASE_FIELD {
            continue;
        }
        let phase = change.new_value.as_str().ok_or_else(|| Error::FieldType {
            deal_id: deal.id,
            field: change.field_name.clone(),
            value: change.new_value.clone(),
        })?;
        let at = story.add_time.or(update.add_time).ok_or_else(|| {
            Error::Protocol(format!("deal {}: phase change without add_time", deal.id))
        })?;
        transitions.push(PhaseTransition {
            phase: phase.to_string(),
            at,
        });
    }

    if transitions.len() == 1 {
        return Ok(None);
    }
    transitions.sort_by_key(|t| t.at);
    Ok(Some(PipelineChangeResult {
        deal,
        pipeline_updates: transitions,
        updates,
    }))
}
