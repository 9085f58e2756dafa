use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Decoded custom fields keyed by display name.
pub type CustomFields = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    #[default]
    Open,
    Won,
    Lost,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Open => "open",
            DealStatus::Won => "won",
            DealStatus::Lost => "lost",
            DealStatus::Deleted => "deleted",
            DealStatus::Unknown => "unknown",
        }
    }
}

/// Deal as returned by pipeline listings: related entities are bare ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deal {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub stage_id: u64,
    #[serde(default)]
    pub person_id: Option<u64>,
    #[serde(default)]
    pub org_id: Option<u64>,
    #[serde(default)]
    pub status: DealStatus,
    #[serde(with = "crate::time")]
    pub add_time: DateTime<Utc>,
    #[serde(default, with = "crate::time::option")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub stage_change_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub won_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub lost_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lost_reason: Option<String>,
    #[serde(default)]
    pub last_activity_date: Option<NaiveDate>,
    #[serde(default, skip_deserializing)]
    pub custom_fields: CustomFields,
}

impl Deal {
    /// Won/lost time for closed deals, `now` while the decision is pending.
    pub fn decision_time_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        decision_time(self.status, self.won_time, self.lost_time, now)
    }
}

fn decision_time(
    status: DealStatus,
    won: Option<DateTime<Utc>>,
    lost: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match status {
        DealStatus::Won => won.unwrap_or(now),
        DealStatus::Lost => lost.unwrap_or(now),
        _ => now,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailEntry {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonRef {
    #[serde(rename = "value")]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Vec<EmailEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrgRef {
    #[serde(rename = "value")]
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub active_flag: bool,
}

/// Deal as returned by the deal detail and deal list endpoints: related
/// entities are embedded objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DealRef {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub stage_id: u64,
    #[serde(default)]
    pub person_id: Option<PersonRef>,
    #[serde(default)]
    pub org_id: Option<OrgRef>,
    #[serde(default)]
    pub user_id: Option<UserRef>,
    #[serde(default)]
    pub status: DealStatus,
    #[serde(with = "crate::time")]
    pub add_time: DateTime<Utc>,
    #[serde(default, with = "crate::time::option")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub stage_change_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub won_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub lost_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lost_reason: Option<String>,
    #[serde(default)]
    pub last_activity_date: Option<NaiveDate>,
    #[serde(default, skip_deserializing)]
    pub custom_fields: CustomFields,
}

impl DealRef {
    pub fn decision_time_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        decision_time(self.status, self.won_time, self.lost_time, now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeLogEntry {
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub field_key: Option<String>,
    #[serde(default)]
    pub old_value: Value,
    #[serde(default)]
    pub new_value: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoryData {
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub change_log: Vec<ChangeLogEntry>,
    #[serde(default, with = "crate::time::option")]
    pub add_time: Option<DateTime<Utc>>,
}

/// One entry from a deal's update stream. Entries that are not deal changes
/// (activities, notes, files) come without a story.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DealUpdate {
    #[serde(default)]
    pub story_data: Option<StoryData>,
    #[serde(default, with = "crate::time::option")]
    pub add_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pipeline {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub url_title: Option<String>,
    #[serde(default)]
    pub order_nr: i64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default, with = "crate::time::option")]
    pub add_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stage {
    pub id: u64,
    #[serde(default)]
    pub order_nr: i64,
    pub name: String,
    #[serde(default)]
    pub active_flag: bool,
    #[serde(default)]
    pub deal_probability: u32,
    #[serde(default)]
    pub pipeline_id: u64,
    #[serde(default)]
    pub pipeline_name: Option<String>,
    #[serde(default)]
    pub rotten_flag: bool,
    #[serde(default)]
    pub rotten_days: Option<u32>,
    #[serde(default, with = "crate::time::option")]
    pub add_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Filter {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub active_flag: bool,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub visible_to: Option<String>,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default, with = "crate::time::option")]
    pub add_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldOption {
    pub id: Value,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DealField {
    pub id: u64,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub order_nr: i64,
    #[serde(default)]
    pub field_type: String,
    #[serde(default)]
    pub options: Option<Vec<FieldOption>>,
    #[serde(default, with = "crate::time::option")]
    pub add_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Owner {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub active_flag: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: u64,
    #[serde(default)]
    pub company_id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<Owner>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub cc_email: Option<String>,
    #[serde(default)]
    pub people_count: u32,
    #[serde(default)]
    pub open_deals_count: u32,
    #[serde(default)]
    pub closed_deals_count: u32,
    #[serde(default)]
    pub won_deals_count: u32,
    #[serde(default)]
    pub lost_deals_count: u32,
    #[serde(default)]
    pub activities_count: u32,
    #[serde(default)]
    pub active_flag: bool,
    #[serde(default, with = "crate::time::option")]
    pub add_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_deserializing)]
    pub custom_fields: CustomFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: u64,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub due_time: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default, with = "crate::time::option")]
    pub add_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::option")]
    pub marked_as_done_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deal_id: Option<u64>,
    #[serde(default)]
    pub org_id: Option<u64>,
    #[serde(default)]
    pub person_id: Option<u64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub person_name: Option<String>,
    #[serde(default)]
    pub org_name: Option<String>,
    #[serde(default)]
    pub deal_title: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
}

/// A deal entering a pipeline phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseTransition {
    pub phase: String,
    #[serde(with = "crate::time")]
    pub at: DateTime<Utc>,
}

/// Time spent in one phase over a deal's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseStat {
    pub phase: String,
    pub days: f64,
    pub touchdowns: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PipelineChangeResult {
    pub deal: Deal,
    /// Chronological, starting with the synthetic entry into the first stage.
    pub pipeline_updates: Vec<PhaseTransition>,
    pub updates: Vec<DealUpdate>,
}

impl PipelineChangeResult {
    pub fn decision_time(&self) -> DateTime<Utc> {
        self.decision_time_at(Utc::now())
    }

    pub fn decision_time_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.deal.decision_time_at(now)
    }

    /// Per-phase dwell time in first-seen order. Each transition lasts until
    /// the next one; the last lasts until the decision time.
    pub fn phase_stats_at(&self, now: DateTime<Utc>) -> Vec<PhaseStat> {
        let end = self.decision_time_at(now);
        let mut stats: Vec<PhaseStat> = Vec::new();
        for (i, transition) in self.pipeline_updates.iter().enumerate() {
            let until = self
                .pipeline_updates
                .get(i + 1)
                .map(|next| next.at)
                .unwrap_or(end);
            let days = ((until - transition.at).num_seconds() as f64 / 86_400.0).max(0.0);
            match stats.iter_mut().find(|s| s.phase == transition.phase) {
                Some(stat) => {
                    stat.days += days;
                    stat.touchdowns += 1;
                }
                None => stats.push(PhaseStat {
                    phase: transition.phase.clone(),
                    days,
                    touchdowns: 1,
                }),
            }
        }
        stats
    }
}
