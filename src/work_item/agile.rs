//! Work item types of the Agile process template.

use chrono::{DateTime, Utc};
use std::sync::LazyLock;

use super::{TrackedItem, WorkItem};
use crate::binding::{FieldMap, FieldSpec};
use crate::convert;
use crate::fields;
use crate::value::LabeledEnum;

/// Severity of a [`Bug`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BugSeverity {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
}

impl LabeledEnum for BugSeverity {
    fn variants() -> &'static [Self] {
        &[Self::Critical, Self::High, Self::Medium, Self::Low]
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    fn label(&self) -> Option<&'static str> {
        Some(match self {
            Self::Critical => "1 - Critical",
            Self::High => "2 - High",
            Self::Medium => "3 - Medium",
            Self::Low => "4 - Low",
        })
    }

    fn ordinal(&self) -> i64 {
        *self as i64
    }
}

macro_rules! tracked_item {
    ($ty:ident, $name:literal, $fields:ident) => {
        impl TrackedItem for $ty {
            const TYPE_NAME: Option<&'static str> = Some($name);

            fn fields() -> &'static FieldMap<Self> {
                &$fields
            }

            fn core(&self) -> &WorkItem {
                &self.base
            }

            fn core_mut(&mut self) -> &mut WorkItem {
                &mut self.base
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.base == other.base
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.base, f)
            }
        }
    };
}

/// A defect.
#[derive(Debug, Clone, Default)]
pub struct Bug {
    pub base: WorkItem,
    pub repro_steps: Option<String>,
    pub system_info: Option<String>,
    pub story_points: Option<f64>,
    pub activity: Option<String>,
    pub severity: Option<BugSeverity>,
    pub original_estimate: Option<f64>,
    pub remaining_work: Option<f64>,
    pub completed_work: Option<f64>,
    pub found_in_build: Option<String>,
    pub fixed_in_build: Option<String>,
    pub value_area: Option<String>,
}

static BUG_FIELDS: LazyLock<FieldMap<Bug>> = LazyLock::new(|| {
    FieldMap::<Bug>::builder("Bug")
        .inherit(WorkItem::fields(), |b| &b.base, |b| &mut b.base)
        .bind(FieldSpec::new("repro_steps", fields::REPRO_STEPS), |b| &b.repro_steps, |b| &mut b.repro_steps)
        .bind(FieldSpec::new("system_info", fields::SYSTEM_INFO), |b| &b.system_info, |b| &mut b.system_info)
        .bind(FieldSpec::new("story_points", fields::STORY_POINTS), |b| &b.story_points, |b| &mut b.story_points)
        .bind(FieldSpec::new("activity", fields::ACTIVITY), |b| &b.activity, |b| &mut b.activity)
        .bind(
            FieldSpec::new("severity", fields::SEVERITY).with_converter(convert::enum_label::<BugSeverity>()),
            |b| &b.severity,
            |b| &mut b.severity,
        )
        .bind(
            FieldSpec::new("original_estimate", fields::ORIGINAL_ESTIMATE),
            |b| &b.original_estimate,
            |b| &mut b.original_estimate,
        )
        .bind(FieldSpec::new("remaining_work", fields::REMAINING_WORK), |b| &b.remaining_work, |b| &mut b.remaining_work)
        .bind(FieldSpec::new("completed_work", fields::COMPLETED_WORK), |b| &b.completed_work, |b| &mut b.completed_work)
        .bind(FieldSpec::new("found_in_build", fields::FOUND_IN), |b| &b.found_in_build, |b| &mut b.found_in_build)
        .bind(
            FieldSpec::new("fixed_in_build", fields::INTEGRATION_BUILD),
            |b| &b.fixed_in_build,
            |b| &mut b.fixed_in_build,
        )
        .bind(FieldSpec::new("value_area", fields::VALUE_AREA), |b| &b.value_area, |b| &mut b.value_area)
        .build()
        .expect("Bug field bindings are valid")
});

tracked_item!(Bug, "Bug", BUG_FIELDS);

/// A large body of work spanning several releases.
#[derive(Debug, Clone, Default)]
pub struct Epic {
    pub base: WorkItem,
    pub risk: Option<String>,
    pub business_value: Option<i64>,
    pub effort: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub target_date: Option<DateTime<Utc>>,
    pub time_criticality: Option<f64>,
    pub integration_build: Option<String>,
    pub value_area: Option<String>,
}

static EPIC_FIELDS: LazyLock<FieldMap<Epic>> = LazyLock::new(|| {
    FieldMap::<Epic>::builder("Epic")
        .inherit(WorkItem::fields(), |e| &e.base, |e| &mut e.base)
        .bind(FieldSpec::new("risk", fields::RISK), |e| &e.risk, |e| &mut e.risk)
        .bind(FieldSpec::new("business_value", fields::BUSINESS_VALUE), |e| &e.business_value, |e| &mut e.business_value)
        .bind(FieldSpec::new("effort", fields::EFFORT), |e| &e.effort, |e| &mut e.effort)
        .bind(FieldSpec::new("start_date", fields::START_DATE), |e| &e.start_date, |e| &mut e.start_date)
        .bind(FieldSpec::new("target_date", fields::TARGET_DATE), |e| &e.target_date, |e| &mut e.target_date)
        .bind(
            FieldSpec::new("time_criticality", fields::TIME_CRITICALITY),
            |e| &e.time_criticality,
            |e| &mut e.time_criticality,
        )
        .bind(
            FieldSpec::new("integration_build", fields::INTEGRATION_BUILD),
            |e| &e.integration_build,
            |e| &mut e.integration_build,
        )
        .bind(FieldSpec::new("value_area", fields::VALUE_AREA), |e| &e.value_area, |e| &mut e.value_area)
        .build()
        .expect("Epic field bindings are valid")
});

tracked_item!(Epic, "Epic", EPIC_FIELDS);

/// A shippable capability, usually the child of an [`Epic`].
#[derive(Debug, Clone, Default)]
pub struct Feature {
    pub base: WorkItem,
    pub risk: Option<String>,
    pub business_value: Option<i64>,
    pub effort: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub target_date: Option<DateTime<Utc>>,
    pub time_criticality: Option<f64>,
    pub integration_build: Option<String>,
    pub value_area: Option<String>,
}

static FEATURE_FIELDS: LazyLock<FieldMap<Feature>> = LazyLock::new(|| {
    FieldMap::<Feature>::builder("Feature")
        .inherit(WorkItem::fields(), |f| &f.base, |f| &mut f.base)
        .bind(FieldSpec::new("risk", fields::RISK), |f| &f.risk, |f| &mut f.risk)
        .bind(FieldSpec::new("business_value", fields::BUSINESS_VALUE), |f| &f.business_value, |f| &mut f.business_value)
        .bind(FieldSpec::new("effort", fields::EFFORT), |f| &f.effort, |f| &mut f.effort)
        .bind(FieldSpec::new("start_date", fields::START_DATE), |f| &f.start_date, |f| &mut f.start_date)
        .bind(FieldSpec::new("target_date", fields::TARGET_DATE), |f| &f.target_date, |f| &mut f.target_date)
        .bind(
            FieldSpec::new("time_criticality", fields::TIME_CRITICALITY),
            |f| &f.time_criticality,
            |f| &mut f.time_criticality,
        )
        .bind(
            FieldSpec::new("integration_build", fields::INTEGRATION_BUILD),
            |f| &f.integration_build,
            |f| &mut f.integration_build,
        )
        .bind(FieldSpec::new("value_area", fields::VALUE_AREA), |f| &f.value_area, |f| &mut f.value_area)
        .build()
        .expect("Feature field bindings are valid")
});

tracked_item!(Feature, "Feature", FEATURE_FIELDS);

/// A unit of work.
#[derive(Debug, Clone, Default)]
pub struct Task {
    pub base: WorkItem,
    pub activity: Option<String>,
    pub original_estimate: Option<f64>,
    pub remaining_work: Option<f64>,
    pub completed_work: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub finish_date: Option<DateTime<Utc>>,
    pub integration_build: Option<String>,
}

static TASK_FIELDS: LazyLock<FieldMap<Task>> = LazyLock::new(|| {
    FieldMap::<Task>::builder("Task")
        .inherit(WorkItem::fields(), |t| &t.base, |t| &mut t.base)
        .bind(FieldSpec::new("activity", fields::ACTIVITY), |t| &t.activity, |t| &mut t.activity)
        .bind(
            FieldSpec::new("original_estimate", fields::ORIGINAL_ESTIMATE),
            |t| &t.original_estimate,
            |t| &mut t.original_estimate,
        )
        .bind(FieldSpec::new("remaining_work", fields::REMAINING_WORK), |t| &t.remaining_work, |t| &mut t.remaining_work)
        .bind(FieldSpec::new("completed_work", fields::COMPLETED_WORK), |t| &t.completed_work, |t| &mut t.completed_work)
        .bind(FieldSpec::new("start_date", fields::START_DATE), |t| &t.start_date, |t| &mut t.start_date)
        .bind(FieldSpec::new("finish_date", fields::FINISH_DATE), |t| &t.finish_date, |t| &mut t.finish_date)
        .bind(
            FieldSpec::new("integration_build", fields::INTEGRATION_BUILD),
            |t| &t.integration_build,
            |t| &mut t.integration_build,
        )
        .build()
        .expect("Task field bindings are valid")
});

tracked_item!(Task, "Task", TASK_FIELDS);

/// A user-facing requirement.
#[derive(Debug, Clone, Default)]
pub struct UserStory {
    pub base: WorkItem,
    pub story_points: Option<f64>,
    pub acceptance_criteria: Option<String>,
    pub risk: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub finish_date: Option<DateTime<Utc>>,
    pub value_area: Option<String>,
    pub integration_build: Option<String>,
}

static USER_STORY_FIELDS: LazyLock<FieldMap<UserStory>> = LazyLock::new(|| {
    FieldMap::<UserStory>::builder("UserStory")
        .inherit(WorkItem::fields(), |s| &s.base, |s| &mut s.base)
        .bind(FieldSpec::new("story_points", fields::STORY_POINTS), |s| &s.story_points, |s| &mut s.story_points)
        .bind(
            FieldSpec::new("acceptance_criteria", fields::ACCEPTANCE_CRITERIA),
            |s| &s.acceptance_criteria,
            |s| &mut s.acceptance_criteria,
        )
        .bind(FieldSpec::new("risk", fields::RISK), |s| &s.risk, |s| &mut s.risk)
        .bind(FieldSpec::new("start_date", fields::START_DATE), |s| &s.start_date, |s| &mut s.start_date)
        .bind(FieldSpec::new("finish_date", fields::FINISH_DATE), |s| &s.finish_date, |s| &mut s.finish_date)
        .bind(FieldSpec::new("value_area", fields::VALUE_AREA), |s| &s.value_area, |s| &mut s.value_area)
        .bind(
            FieldSpec::new("integration_build", fields::INTEGRATION_BUILD),
            |s| &s.integration_build,
            |s| &mut s.integration_build,
        )
        .build()
        .expect("UserStory field bindings are valid")
});

tracked_item!(UserStory, "User Story", USER_STORY_FIELDS);
