//! `circleci_schedule`: scheduled pipeline triggers.
//!
//! A timetable fires `per_hour` times during each of `hours_of_day`, on
//! either selected weekdays or selected days of the month, never both.

use super::{found, required, Resource};
use crate::client::{escape_project_slug, CircleCiClient};
use crate::error::ProviderError;
use crate::ids::parse_composite_id;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, Diagnostic, NestedBlock, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const IMPORT_FORMAT: &str = "project_slug:schedule_id";

/// Timetable block as stored in state and returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timetable {
    /// Triggers per hour, 1 to 60.
    pub per_hour: Option<i64>,
    /// Hours of the day, 0 to 23.
    pub hours_of_day: Option<Vec<i64>>,
    /// Weekdays such as `MON`.
    pub days_of_week: Option<Vec<String>>,
    /// Days of the month, 1 to 31.
    pub days_of_month: Option<Vec<i64>>,
    /// Months such as `JAN`.
    pub months: Option<Vec<String>>,
}

/// Which days a timetable fires on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DaySelector {
    /// Fire on these weekdays.
    Week {
        /// Weekdays such as `MON`.
        days_of_week: Vec<String>,
    },
    /// Fire on these days of the month.
    Month {
        /// Days of the month.
        days_of_month: Vec<i64>,
    },
}

impl Timetable {
    /// The day selection, or `None` unless exactly one kind is set.
    pub fn days(&self) -> Option<DaySelector> {
        let week = self.days_of_week.as_ref().filter(|d| !d.is_empty());
        let month = self.days_of_month.as_ref().filter(|d| !d.is_empty());
        match (week, month) {
            (Some(days), None) => Some(DaySelector::Week {
                days_of_week: days.clone(),
            }),
            (None, Some(days)) => Some(DaySelector::Month {
                days_of_month: days.clone(),
            }),
            _ => None,
        }
    }

    fn check(&self) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        if let Some(per_hour) = self.per_hour {
            if !(1..=60).contains(&per_hour) {
                diags.push(
                    Diagnostic::error("Invalid timetable")
                        .with_detail(format!("per_hour must be between 1 and 60, got {}", per_hour))
                        .with_attribute("timetable.per_hour"),
                );
            }
        }
        let hours = self.hours_of_day.as_deref().unwrap_or_default();
        if let Some(hour) = hours.iter().find(|h| !(0..=23).contains(*h)) {
            diags.push(
                Diagnostic::error("Invalid timetable")
                    .with_detail(format!("hours_of_day must be between 0 and 23, got {}", hour))
                    .with_attribute("timetable.hours_of_day"),
            );
        }
        if self.days().is_none() {
            diags.push(
                Diagnostic::error("Invalid timetable")
                    .with_detail("Specify exactly one of 'days_of_week' or 'days_of_month'.")
                    .with_attribute("timetable"),
            );
        }
        diags
    }
}

#[derive(Debug, Serialize)]
struct TimetableRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    per_hour: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hours_of_day: Option<&'a [i64]>,
    #[serde(flatten)]
    days: DaySelector,
    #[serde(skip_serializing_if = "Option::is_none")]
    months: Option<&'a [String]>,
}

/// The user CircleCI impersonates when the schedule fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionActor {
    /// User id.
    pub id: String,
    /// Login name.
    pub login: Option<String>,
    /// Display name.
    pub name: Option<String>,
}

/// A schedule as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScheduleResponse {
    /// Schedule id.
    pub id: String,
    /// Name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Timetable.
    pub timetable: Timetable,
    /// Attribution actor.
    pub attribution_actor: AttributionActor,
    /// Pipeline parameters; values may be any JSON scalar.
    pub parameters: BTreeMap<String, Value>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
struct ScheduleRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    timetable: TimetableRequest<'a>,
    attribution_actor: &'a AttributionActor,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<&'a BTreeMap<String, String>>,
}

/// Terraform state of a schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleState {
    /// Schedule id.
    pub id: Option<String>,
    /// Owning project.
    pub project_slug: String,
    /// Name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// When the schedule fires.
    pub timetable: Option<Timetable>,
    /// Impersonated user.
    pub attribution_actor: Option<AttributionActor>,
    /// Pipeline parameters.
    pub parameters: Option<BTreeMap<String, String>>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last update timestamp.
    pub updated_at: Option<String>,
}

impl ScheduleState {
    fn collection_path(&self) -> String {
        format!("/project/{}/schedule", escape_project_slug(&self.project_slug))
    }

    fn request(&self) -> Result<ScheduleRequest<'_>, ProviderError> {
        let timetable = self
            .timetable
            .as_ref()
            .ok_or_else(|| ProviderError::Validation("'timetable' must be set".to_string()))?;
        let days = timetable.days().ok_or_else(|| {
            ProviderError::Validation(
                "Specify exactly one of 'days_of_week' or 'days_of_month'.".to_string(),
            )
        })?;
        let attribution_actor = self.attribution_actor.as_ref().ok_or_else(|| {
            ProviderError::Validation("'attribution_actor' must be set".to_string())
        })?;

        Ok(ScheduleRequest {
            name: &self.name,
            description: self.description.as_deref(),
            timetable: TimetableRequest {
                per_hour: timetable.per_hour,
                hours_of_day: timetable.hours_of_day.as_deref(),
                days,
                months: timetable.months.as_deref().filter(|m| !m.is_empty()),
            },
            attribution_actor,
            parameters: self.parameters.as_ref().filter(|p| !p.is_empty()),
        })
    }

    fn refresh(&mut self, schedule: ScheduleResponse) {
        self.id = Some(schedule.id);
        self.name = schedule.name;
        self.description = schedule.description.filter(|d| !d.is_empty());
        self.timetable = Some(schedule.timetable);
        self.attribution_actor = Some(schedule.attribution_actor);
        if !schedule.parameters.is_empty() || self.parameters.is_some() {
            self.parameters = Some(
                schedule
                    .parameters
                    .into_iter()
                    .map(|(k, v)| match v {
                        Value::String(s) => (k, s),
                        other => (k, other.to_string()),
                    })
                    .collect(),
            );
        }
        self.created_at = Some(schedule.created_at);
        self.updated_at = Some(schedule.updated_at);
    }
}

/// Manages project schedules.
pub struct ScheduleResource {
    client: Arc<CircleCiClient>,
}

impl ScheduleResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

fn timetable_block() -> Block {
    Block::new()
        .with_description("The timetable that describes when a schedule triggers.")
        .with_attribute(
            "per_hour",
            Attribute::optional_int64()
                .with_description("Number of times a schedule triggers per hour (1-60)."),
        )
        .with_attribute(
            "hours_of_day",
            Attribute::new(AttributeType::list(AttributeType::Int64), AttributeFlags::optional())
                .with_description("Hours of the day in which a schedule triggers (0-23)."),
        )
        .with_attribute(
            "days_of_week",
            Attribute::new(AttributeType::list(AttributeType::String), AttributeFlags::optional())
                .with_description("Days of the week in which a schedule triggers."),
        )
        .with_attribute(
            "days_of_month",
            Attribute::new(AttributeType::list(AttributeType::Int64), AttributeFlags::optional())
                .with_description("Days of the month in which a schedule triggers (1-31)."),
        )
        .with_attribute(
            "months",
            Attribute::new(AttributeType::list(AttributeType::String), AttributeFlags::optional())
                .with_description("Months in which a schedule triggers."),
        )
}

#[async_trait]
impl Resource for ScheduleResource {
    type State = ScheduleState;
    const KIND: &'static str = "schedule";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "CircleCI Schedule resource. Schedules allow you to trigger pipelines at regular intervals.",
            )
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "project_slug",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The project slug in the form 'vcs-slug/org-name/repo-name'."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "parameters",
                Attribute::optional_string_map()
                    .with_description("Pipeline parameters to pass to the scheduled pipeline."),
            )
            .with_attribute("created_at", Attribute::computed_string())
            .with_attribute("updated_at", Attribute::computed_string())
            .with_block("timetable", NestedBlock::single(timetable_block()).required())
            .with_block(
                "attribution_actor",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("id", Attribute::required_string())
                        .with_attribute(
                            "login",
                            Attribute::new(AttributeType::String, AttributeFlags::optional_computed()),
                        )
                        .with_attribute(
                            "name",
                            Attribute::new(AttributeType::String, AttributeFlags::optional_computed()),
                        ),
                )
                .required(),
            )
    }

    fn validate(&self, config: &ScheduleState) -> Vec<Diagnostic> {
        config
            .timetable
            .as_ref()
            .map(Timetable::check)
            .unwrap_or_default()
    }

    async fn create(&self, planned: ScheduleState) -> Result<ScheduleState, ProviderError> {
        let schedule: ScheduleResponse = self
            .client
            .post(&planned.collection_path(), &planned.request()?)
            .await
            .map_err(|e| ProviderError::client("create schedule", e))?;

        info!(project_slug = %planned.project_slug, schedule_id = %schedule.id, "Created schedule");

        let mut state = planned;
        state.refresh(schedule);
        Ok(state)
    }

    async fn read(&self, current: ScheduleState) -> Result<Option<ScheduleState>, ProviderError> {
        let id = required(&current.id, "id")?;
        let path = format!("{}/{}", current.collection_path(), id);
        let fetched = self.client.get::<ScheduleResponse>(&path).await;
        let Some(schedule) = found(fetched, "read schedule")? else {
            return Ok(None);
        };

        let mut state = current;
        state.refresh(schedule);
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: ScheduleState,
        planned: ScheduleState,
    ) -> Result<(ScheduleState, Vec<Diagnostic>), ProviderError> {
        let id = required(&prior.id, "id")?;
        let path = format!("{}/{}", planned.collection_path(), id);
        let schedule: ScheduleResponse = self
            .client
            .put(&path, &planned.request()?)
            .await
            .map_err(|e| ProviderError::client("update schedule", e))?;

        info!(schedule_id = %id, "Updated schedule");

        let mut state = planned;
        state.refresh(schedule);
        Ok((state, Vec::new()))
    }

    async fn delete(&self, current: ScheduleState) -> Result<Vec<Diagnostic>, ProviderError> {
        let id = required(&current.id, "id")?;
        let path = format!("{}/{}", current.collection_path(), id);
        self.client
            .delete(&path)
            .await
            .map_err(|e| ProviderError::client("delete schedule", e))?;
        info!(schedule_id = %id, "Deleted schedule");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<ScheduleState, ProviderError> {
        let (project_slug, schedule_id) = parse_composite_id(id, IMPORT_FORMAT)?;
        Ok(ScheduleState {
            id: Some(schedule_id),
            project_slug,
            ..Default::default()
        })
    }
}
