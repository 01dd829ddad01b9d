//! Recurrence rules and the master state machine.
//!
//! A master task is the anchor occurrence of its series. Children are
//! materialised up front for every date strictly after the anchor, up to the
//! end date (inclusive) or the configured horizon.

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::sea_orm_active_enums::{RecurrenceState, RecurrenceType};

/// Upper bound on children generated for one master.
pub const MAX_RECURRENCE_CHILDREN: usize = 366;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecurrenceError {
    #[error("recurrence_type is required for recurring tasks")]
    MissingType,
    #[error("due_date is required for recurring tasks")]
    MissingDueDate,
    #[error("recurrence_interval must be at least 1")]
    InvalidInterval,
    #[error("recurrence_days_of_week entries must be between 1 and 7, got {0}")]
    InvalidWeekday(i32),
    #[error("recurrence_end_date must not be before due_date")]
    EndBeforeAnchor,
    #[error("due_date is too close to the supported date range for a weekly series")]
    AnchorOutOfRange,
    #[error("too_many_recurrence_children")]
    TooManyChildren,
    #[error("cannot {action:?} a series that is {from:?}")]
    InvalidTransition {
        action: RecurrenceAction,
        from: RecurrenceState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub kind: RecurrenceType,
    pub interval: u32,
    /// ISO weekdays, 1 = Monday. Sorted, no duplicates. Only used by weekly rules.
    pub days_of_week: Vec<u32>,
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    /// Validates the raw recurrence fields of a task anchored at `anchor`.
    pub fn new(
        kind: Option<RecurrenceType>,
        interval: Option<i32>,
        days_of_week: Option<&[i32]>,
        end_date: Option<NaiveDate>,
        anchor: Option<NaiveDate>,
    ) -> Result<Self, RecurrenceError> {
        let kind = kind.ok_or(RecurrenceError::MissingType)?;
        let anchor = anchor.ok_or(RecurrenceError::MissingDueDate)?;
        let interval = interval.unwrap_or(1);
        if interval < 1 {
            return Err(RecurrenceError::InvalidInterval);
        }
        let mut days: Vec<u32> = Vec::new();
        for &day in days_of_week.unwrap_or_default() {
            if !(1..=7).contains(&day) {
                return Err(RecurrenceError::InvalidWeekday(day));
            }
            days.push(day as u32);
        }
        days.sort_unstable();
        days.dedup();
        if end_date.is_some_and(|end| end < anchor) {
            return Err(RecurrenceError::EndBeforeAnchor);
        }
        if kind == RecurrenceType::Weekly && !days.is_empty() && monday_of(anchor).is_none() {
            return Err(RecurrenceError::AnchorOutOfRange);
        }

        Ok(Self {
            kind,
            interval: interval as u32,
            days_of_week: days,
            end_date,
        })
    }

    /// Dates of the children of a series anchored at `anchor`, ascending.
    ///
    /// Without an end date generation stops `horizon_days` after the anchor
    /// and is silently capped at [`MAX_RECURRENCE_CHILDREN`]. An explicit end
    /// date that needs more children than that is rejected.
    pub fn occurrences(
        &self,
        anchor: NaiveDate,
        horizon_days: i64,
    ) -> Result<Vec<NaiveDate>, RecurrenceError> {
        let limit = match self.end_date {
            Some(end_date) => end_date,
            None => anchor
                .checked_add_signed(Duration::days(horizon_days.max(0)))
                .unwrap_or(NaiveDate::MAX),
        };

        let mut dates = Vec::new();
        for candidate in self.candidates(anchor, limit) {
            if dates.len() == MAX_RECURRENCE_CHILDREN {
                if self.end_date.is_some() {
                    return Err(RecurrenceError::TooManyChildren);
                }
                break;
            }
            dates.push(candidate);
        }
        Ok(dates)
    }

    fn candidates(
        &self,
        anchor: NaiveDate,
        limit: NaiveDate,
    ) -> Box<dyn Iterator<Item = NaiveDate> + '_> {
        let interval = self.interval;
        match self.kind {
            RecurrenceType::Daily => Box::new(
                stepped(anchor, move |k| {
                    anchor.checked_add_signed(Duration::days(k * interval as i64))
                })
                .take_while(move |date| *date <= limit),
            ),
            RecurrenceType::Weekly if self.days_of_week.is_empty() => Box::new(
                stepped(anchor, move |k| {
                    anchor.checked_add_signed(Duration::weeks(k * interval as i64))
                })
                .take_while(move |date| *date <= limit),
            ),
            RecurrenceType::Weekly => {
                let Some(anchor_monday) = monday_of(anchor) else {
                    return Box::new(std::iter::empty());
                };
                Box::new(
                    (0_i64..)
                        .map_while(move |k| {
                            anchor_monday.checked_add_signed(Duration::weeks(k * interval as i64))
                        })
                        .take_while(move |week_start| *week_start <= limit)
                        .flat_map(move |week_start| {
                            self.days_of_week.iter().filter_map(move |&day| {
                                week_start.checked_add_signed(Duration::days(day as i64 - 1))
                            })
                        })
                        .filter(move |date| *date > anchor && *date <= limit),
                )
            }
            RecurrenceType::Monthly => Box::new(
                stepped(anchor, move |k| {
                    add_months(anchor, u32::try_from(k).ok()?.checked_mul(interval)?)
                })
                    .take_while(move |date| *date <= limit),
            ),
            RecurrenceType::Yearly => Box::new(
                stepped(anchor, move |k| {
                    let months = u32::try_from(k).ok()?.checked_mul(interval)?.checked_mul(12)?;
                    add_months(anchor, months)
                })
                    .take_while(move |date| *date <= limit),
            ),
        }
    }
}

/// Occurrence k = 1, 2, ... computed from the anchor each time so clamped
/// month ends never drift.
fn stepped(
    anchor: NaiveDate,
    nth: impl Fn(i64) -> Option<NaiveDate>,
) -> impl Iterator<Item = NaiveDate> {
    (1_i64..)
        .map_while(nth)
        .filter(move |date| *date > anchor)
}

/// Adds calendar months, clamping the day to the end of the target month.
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

fn monday_of(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_sub_signed(Duration::days(date.weekday().num_days_from_monday() as i64))
}

/// Operator request on a recurring master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceAction {
    Pause,
    Resume,
    Stop,
}

impl RecurrenceAction {
    /// `active ⇄ paused`, `active | paused → stopped`. Nothing leaves `stopped`.
    pub fn apply(self, from: RecurrenceState) -> Result<RecurrenceState, RecurrenceError> {
        match (self, from) {
            (RecurrenceAction::Pause, RecurrenceState::Active) => Ok(RecurrenceState::Paused),
            (RecurrenceAction::Resume, RecurrenceState::Paused) => Ok(RecurrenceState::Active),
            (RecurrenceAction::Stop, RecurrenceState::Active | RecurrenceState::Paused) => {
                Ok(RecurrenceState::Stopped)
            }
            (action, from) => Err(RecurrenceError::InvalidTransition { action, from }),
        }
    }
}
