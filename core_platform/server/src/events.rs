//! Domain event log. Events are stored in the mutating transaction and
//! dispatched synchronously to the handlers subscribed to their type.

use crate::entities::*;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::*;
use std::collections::HashMap;
use std::sync::Arc;

pub const TASK_CREATED: &str = "task.created";
pub const TASK_UPDATED: &str = "task.updated";
pub const TASK_COMPLETED: &str = "task.completed";
pub const TASK_VERIFIED: &str = "task.verified";
pub const TASK_DELETED: &str = "task.deleted";
pub const RECURRENCE_CHANGED: &str = "task.recurrence_changed";

/// A fact about an entity, kept forever in `domain_events`.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub id: String,
    pub event_type: String,
    pub entity: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        event_type: &str,
        entity: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            entity: entity.to_string(),
            entity_id: entity_id.to_string(),
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// Calendar day the event belongs to: `payload.date` when it holds an
    /// ISO date, the occurrence date otherwise.
    pub fn day(&self) -> NaiveDate {
        self.payload
            .get("date")
            .and_then(serde_json::Value::as_str)
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
            .unwrap_or_else(|| self.occurred_at.date_naive())
    }
}

impl From<domain_event::Model> for DomainEvent {
    fn from(model: domain_event::Model) -> Self {
        Self {
            id: model.id,
            event_type: model.event_type,
            entity: model.entity,
            entity_id: model.entity_id,
            payload: model.payload,
            occurred_at: model.occurred_at,
        }
    }
}

/// Read-model updater run inside the publishing transaction.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, txn: &DatabaseTransaction, event: &DomainEvent) -> Result<(), DbErr>;
}

#[derive(Default, Clone)]
pub struct EventPublisher {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher with the platform's read aggregates subscribed.
    pub fn with_default_handlers() -> Self {
        let mut publisher = Self::new();
        publisher.subscribe(TASK_CREATED, Arc::new(CalendarDaySummaryHandler));
        publisher
    }

    pub fn subscribe(&mut self, event_type: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Stores the event and runs its handlers. Both happen in `txn`, so a
    /// rolled back mutation leaves no trace.
    #[tracing::instrument(skip(self, txn, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn publish(&self, txn: &DatabaseTransaction, event: DomainEvent) -> Result<(), DbErr> {
        tracing::info!(
            "Publishing {} for {} {}",
            event.event_type,
            event.entity,
            event.entity_id
        );
        domain_event::ActiveModel {
            id: ActiveValue::Set(event.id.clone()),
            event_type: ActiveValue::Set(event.event_type.clone()),
            entity: ActiveValue::Set(event.entity.clone()),
            entity_id: ActiveValue::Set(event.entity_id.clone()),
            payload: ActiveValue::Set(event.payload.clone()),
            occurred_at: ActiveValue::Set(event.occurred_at),
        }
        .insert(txn)
        .await?;

        if let Some(handlers) = self.handlers.get(&event.event_type) {
            for handler in handlers {
                tracing::debug!("Handling {} with {}", event.id, handler.name());
                handler.handle(txn, &event).await?;
            }
        }
        Ok(())
    }
}

/// Keeps `calendar_day_summary` counting events per day.
pub struct CalendarDaySummaryHandler;

#[async_trait]
impl EventHandler for CalendarDaySummaryHandler {
    fn name(&self) -> &'static str {
        "calendar_day_summary"
    }

    async fn handle(&self, txn: &DatabaseTransaction, event: &DomainEvent) -> Result<(), DbErr> {
        let day = event.day();
        match calendar_day_summary::Entity::find_by_id(day).one(txn).await? {
            Some(summary) => {
                let last_event_at = summary.last_event_at.max(event.occurred_at);
                let events_count = summary.events_count + 1;
                let mut active_model: calendar_day_summary::ActiveModel = summary.into();
                active_model.events_count = ActiveValue::Set(events_count);
                active_model.last_event_at = ActiveValue::Set(last_event_at);
                active_model.update(txn).await?;
            }
            None => {
                calendar_day_summary::ActiveModel {
                    day: ActiveValue::Set(day),
                    events_count: ActiveValue::Set(1),
                    last_event_at: ActiveValue::Set(event.occurred_at),
                }
                .insert(txn)
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn can_take_day_from_payload_date() {
        let event = DomainEvent::new(TASK_CREATED, "task", "t-1", json!({"date": "2025-03-14"}));

        assert_eq!(event.day(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
    }

    #[test]
    fn can_fall_back_to_occurrence_day() {
        let event = DomainEvent::new(TASK_CREATED, "task", "t-1", json!({"date": "not a date"}));

        assert_eq!(event.day(), event.occurred_at.date_naive());
    }
}
