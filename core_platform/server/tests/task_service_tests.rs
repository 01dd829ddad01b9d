use chrono::{Duration, Local, NaiveDate};
use core_platform_server::entities::sea_orm_active_enums::{RecurrenceType, TaskPriority, TaskStatus};
use core_platform_server::entities::{calendar_day_summary, domain_event, task};
use core_platform_server::events;
use core_platform_server::tasks::recurrence::RecurrenceAction;
use core_platform_server::tasks::{
    ApplyScope, NewTask, TaskChanges, TaskServiceError, TaskView,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};

mod common;

use common::TestContext;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn titled(title: &str, due_date: NaiveDate) -> NewTask {
    NewTask {
        title: title.to_string(),
        due_date: Some(due_date),
        ..Default::default()
    }
}

fn titles(views: &[TaskView]) -> Vec<&str> {
    views.iter().map(|view| view.task.title.as_str()).collect()
}

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

#[tokio::test]
async fn can_list_day_as_actual_then_overdue_then_done() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (mia, _) = ctx.employee("mia").await?;
    let tasks = ctx.tasks();

    tasks.create(mia.id, titled("Late by three", today() - Duration::days(3))).await?;
    tasks.create(mia.id, titled("Late by one", today() - Duration::days(1))).await?;
    tasks.create(mia.id, titled("Normal today", today())).await?;
    tasks
        .create(
            mia.id,
            NewTask {
                priority: TaskPriority::VeryUrgent,
                ..titled("Very urgent today", today())
            },
        )
        .await?;
    let finished = tasks.create(mia.id, titled("Finished today", today())).await?;
    tasks.complete(mia.id, &finished.task.id).await?;
    tasks.create(mia.id, titled("Tomorrow", today() + Duration::days(1))).await?;

    let listed = tasks.list_for_date(mia.id, today(), None).await?;

    assert_eq!(
        titles(&listed),
        vec![
            "Very urgent today",
            "Normal today",
            "Late by three",
            "Late by one",
            "Finished today",
        ]
    );
    assert!(listed[2].is_overdue);
    assert!(!listed[0].is_overdue);
    Ok(())
}

#[tokio::test]
async fn can_keep_overdue_task_out_of_actual_on_its_due_date() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (noah, _) = ctx.employee("noah").await?;
    let tasks = ctx.tasks();
    let yesterday = today() - Duration::days(1);
    tasks.create(noah.id, titled("Forgotten", yesterday)).await?;

    let listed = tasks.list_for_date(noah.id, yesterday, None).await?;

    assert_eq!(titles(&listed), vec!["Forgotten"]);
    assert!(listed[0].is_overdue);
    Ok(())
}

#[tokio::test]
async fn can_route_completion_through_verification() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (owner, _) = ctx.employee("olivia").await?;
    let (worker, _) = ctx.employee("peter").await?;
    let tasks = ctx.tasks();
    let created = tasks
        .create(
            owner.id,
            NewTask {
                assignee_user_ids: vec![worker.id],
                ..titled("Clean the fridge", today())
            },
        )
        .await?;

    let completed = tasks.complete(worker.id, &created.task.id).await?;
    assert_eq!(completed.task.status, TaskStatus::DonePendingVerify);
    assert!(completed.task.completed_at.is_some());
    assert!(completed.task.verified_at.is_none());

    let waiting = tasks.attention(owner.id).await?;
    assert_eq!(titles(&waiting), vec!["Clean the fridge"]);
    assert!(waiting[0].needs_attention_for_verifier);
    let badges = tasks.badges(owner.id).await?;
    assert_eq!(badges.pending_verify_count, 1);
    assert!(badges.fresh_completed_flag);
    assert_eq!(tasks.badges(worker.id).await?.pending_verify_count, 0);

    assert!(matches!(
        tasks.verify(worker.id, &created.task.id).await,
        Err(TaskServiceError::Forbidden(_))
    ));
    let verified = tasks.verify(owner.id, &created.task.id).await?;
    assert_eq!(verified.task.status, TaskStatus::Done);
    assert!(verified.task.verified_at.is_some());

    assert!(matches!(
        tasks.verify(owner.id, &created.task.id).await,
        Err(TaskServiceError::VerificationNotRequired)
    ));
    assert!(matches!(
        tasks.complete(owner.id, &created.task.id).await,
        Err(TaskServiceError::CompleteOnlyActive)
    ));
    Ok(())
}

#[tokio::test]
async fn can_keep_verification_when_status_is_edited() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (owner, _) = ctx.employee("oskar").await?;
    let (worker, _) = ctx.employee("pia").await?;
    let (boss, _) = ctx.employee("ravi").await?;
    let tasks = ctx.tasks();
    let created = tasks
        .create(
            owner.id,
            NewTask {
                assignee_user_ids: vec![worker.id],
                verifier_user_ids: vec![boss.id],
                ..titled("Count the till", today())
            },
        )
        .await?;
    let set_status = |status| TaskChanges {
        status: Some(status),
        ..Default::default()
    };

    let edited = tasks
        .update(worker.id, &created.task.id, set_status(TaskStatus::Done))
        .await?;
    assert_eq!(edited.task.status, TaskStatus::DonePendingVerify);
    assert!(edited.task.completed_at.is_some());
    assert!(edited.task.verified_at.is_none());

    for status in [TaskStatus::Done, TaskStatus::Active] {
        assert!(matches!(
            tasks
                .update(worker.id, &created.task.id, set_status(status))
                .await,
            Err(TaskServiceError::Forbidden("verify"))
        ));
    }
    assert_eq!(
        tasks.get(owner.id, &created.task.id).await?.task.status,
        TaskStatus::DonePendingVerify
    );

    let settled = tasks
        .update(boss.id, &created.task.id, set_status(TaskStatus::Done))
        .await?;
    assert_eq!(settled.task.status, TaskStatus::Done);
    assert!(settled.task.verified_at.is_some());
    Ok(())
}

#[tokio::test]
async fn can_finish_directly_when_completer_may_verify() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (owner, _) = ctx.employee("quinn").await?;
    let (checker, _) = ctx.employee("rosa").await?;
    let tasks = ctx.tasks();
    let created = tasks
        .create(
            owner.id,
            NewTask {
                verifier_user_ids: vec![checker.id],
                ..titled("Sign delivery note", today())
            },
        )
        .await?;
    assert_eq!(created.assignee_user_ids(), vec![owner.id]);

    let completed = tasks.complete(checker.id, &created.task.id).await?;

    assert_eq!(completed.task.status, TaskStatus::Done);
    assert_eq!(completed.task.completed_at, completed.task.verified_at);
    Ok(())
}

#[tokio::test]
async fn can_hide_tasks_from_unrelated_users() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (owner, _) = ctx.employee("sam").await?;
    let (stranger, _) = ctx.employee("tina").await?;
    let (admin, _) = ctx.admin().await?;
    let tasks = ctx.tasks();
    let created = tasks.create(owner.id, titled("Private errand", today())).await?;

    assert!(matches!(
        tasks.get(stranger.id, &created.task.id).await,
        Err(TaskServiceError::Forbidden(_))
    ));
    assert!(matches!(
        tasks.complete(stranger.id, &created.task.id).await,
        Err(TaskServiceError::Forbidden(_))
    ));
    assert!(tasks.list_for_date(stranger.id, today(), None).await?.is_empty());
    assert!(tasks.calendar(stranger.id, today(), today()).await?.is_empty());

    assert_eq!(
        titles(&tasks.list_for_date(admin.id, today(), None).await?),
        vec!["Private errand"]
    );
    assert!(matches!(
        tasks.get(owner.id, "missing").await,
        Err(TaskServiceError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn can_reject_unknown_people_and_blank_titles() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (uma, _) = ctx.employee("uma").await?;
    let tasks = ctx.tasks();

    assert!(matches!(
        tasks
            .create(
                uma.id,
                NewTask {
                    verifier_user_ids: vec![9999],
                    ..titled("Ghost check", today())
                },
            )
            .await,
        Err(TaskServiceError::UnknownUser(9999))
    ));
    assert!(matches!(
        tasks.create(uma.id, titled("   ", today())).await,
        Err(TaskServiceError::Validation(_))
    ));
    assert!(matches!(
        tasks.calendar(uma.id, today(), today() - Duration::days(1)).await,
        Err(TaskServiceError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn can_clamp_monthly_series_without_drift() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (vera, _) = ctx.employee("vera").await?;
    let master = ctx
        .tasks()
        .create(
            vera.id,
            NewTask {
                is_recurring: true,
                recurrence_type: Some(RecurrenceType::Monthly),
                recurrence_end_date: Some(date("2025-05-31")),
                ..titled("Month end close", date("2025-01-31"))
            },
        )
        .await?;

    let children: Vec<Option<NaiveDate>> = task::Entity::find()
        .filter(task::Column::RecurrenceMasterTaskId.eq(master.task.id.clone()))
        .order_by_asc(task::Column::DueDate)
        .all(&ctx.db)
        .await?
        .into_iter()
        .map(|child| child.due_date)
        .collect();

    assert_eq!(
        children,
        vec![
            Some(date("2025-02-28")),
            Some(date("2025-03-31")),
            Some(date("2025-04-30")),
            Some(date("2025-05-31")),
        ]
    );
    assert!(master.task.is_recurring);
    assert_eq!(master.task.recurrence_interval, Some(1));
    Ok(())
}

#[tokio::test]
async fn can_update_rest_of_series_only() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (walt, _) = ctx.employee("walt").await?;
    let tasks = ctx.tasks();
    let anchor = today() + Duration::days(1);
    let master = tasks
        .create(
            walt.id,
            NewTask {
                is_recurring: true,
                recurrence_type: Some(RecurrenceType::Daily),
                recurrence_end_date: Some(anchor + Duration::days(4)),
                ..titled("Water plants", anchor)
            },
        )
        .await?;
    let third = task::Entity::find()
        .filter(task::Column::RecurrenceMasterTaskId.eq(master.task.id.clone()))
        .filter(task::Column::DueDate.eq(anchor + Duration::days(2)))
        .one(&ctx.db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("missing child"))?;

    assert!(matches!(
        tasks
            .update(
                walt.id,
                &third.id,
                TaskChanges {
                    due_date: Some(Some(today())),
                    apply_scope: ApplyScope::Future,
                    ..Default::default()
                },
            )
            .await,
        Err(TaskServiceError::Validation(_))
    ));

    tasks
        .update(
            walt.id,
            &third.id,
            TaskChanges {
                title: Some("Water plants twice".to_string()),
                priority: Some(TaskPriority::Urgent),
                apply_scope: ApplyScope::Future,
                ..Default::default()
            },
        )
        .await?;

    let series: Vec<(Option<NaiveDate>, String)> = task::Entity::find()
        .filter(
            task::Column::RecurrenceMasterTaskId
                .eq(master.task.id.clone())
                .or(task::Column::Id.eq(master.task.id.clone())),
        )
        .order_by_asc(task::Column::DueDate)
        .all(&ctx.db)
        .await?
        .into_iter()
        .map(|member| (member.due_date, member.title))
        .collect();
    let renamed: Vec<bool> = series
        .iter()
        .map(|(_, title)| title == "Water plants twice")
        .collect();
    assert_eq!(renamed, vec![false, false, true, true, true]);

    let master_wide = tasks
        .update(
            walt.id,
            &master.task.id,
            TaskChanges {
                description: Some(Some("Use the blue can".to_string())),
                apply_scope: ApplyScope::Master,
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(master_wide.task.description.as_deref(), Some("Use the blue can"));
    let described = task::Entity::find()
        .filter(task::Column::Description.eq("Use the blue can"))
        .count(&ctx.db)
        .await?;
    assert_eq!(described, 5);
    Ok(())
}

#[tokio::test]
async fn can_stamp_completion_when_status_is_set_done() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (xena, _) = ctx.employee("xena").await?;
    let tasks = ctx.tasks();
    let created = tasks.create(xena.id, titled("Archive invoices", today())).await?;

    let updated = tasks
        .update(
            xena.id,
            &created.task.id,
            TaskChanges {
                status: Some(TaskStatus::Done),
                due_time: Some(None),
                ..Default::default()
            },
        )
        .await?;

    assert_eq!(updated.task.status, TaskStatus::Done);
    assert!(updated.task.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn can_delete_only_active_tasks_and_detach_children() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (yuri, _) = ctx.employee("yuri").await?;
    let tasks = ctx.tasks();
    let done = tasks.create(yuri.id, titled("Already done", today())).await?;
    tasks.complete(yuri.id, &done.task.id).await?;
    assert!(matches!(
        tasks.delete(yuri.id, &done.task.id).await,
        Err(TaskServiceError::DoneDeleteForbidden)
    ));

    let master = tasks
        .create(
            yuri.id,
            NewTask {
                is_recurring: true,
                recurrence_type: Some(RecurrenceType::Weekly),
                recurrence_end_date: Some(today() + Duration::days(21)),
                ..titled("Weekly report", today())
            },
        )
        .await?;
    tasks.delete(yuri.id, &master.task.id).await?;

    let orphans = task::Entity::find()
        .filter(task::Column::Title.eq("Weekly report"))
        .all(&ctx.db)
        .await?;
    assert_eq!(orphans.len(), 3);
    assert!(orphans.iter().all(|child| child.recurrence_master_task_id.is_none()));
    Ok(())
}

#[tokio::test]
async fn can_record_domain_events_and_day_summary() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (zoe, _) = ctx.employee("zoe").await?;
    let tasks = ctx.tasks();
    let due = date("2030-06-14");
    let created = tasks.create(zoe.id, titled("Plan summer party", due)).await?;
    tasks.create(zoe.id, titled("Book venue", due)).await?;
    tasks.complete(zoe.id, &created.task.id).await?;

    let recorded: Vec<String> = domain_event::Entity::find()
        .filter(domain_event::Column::EntityId.eq(created.task.id.clone()))
        .order_by_asc(domain_event::Column::OccurredAt)
        .all(&ctx.db)
        .await?
        .into_iter()
        .map(|event| event.event_type)
        .collect();
    assert_eq!(recorded, vec![events::TASK_CREATED, events::TASK_COMPLETED]);

    let summary = calendar_day_summary::Entity::find_by_id(due)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("missing summary"))?;
    assert_eq!(summary.events_count, 2);
    Ok(())
}

#[tokio::test]
async fn can_show_children_that_passed_while_paused() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (yara, _) = ctx.employee("yara").await?;
    let tasks = ctx.tasks();
    let master = tasks
        .create(
            yara.id,
            NewTask {
                is_recurring: true,
                recurrence_type: Some(RecurrenceType::Daily),
                recurrence_end_date: Some(today() + Duration::days(4)),
                ..titled("Sweep the yard", today())
            },
        )
        .await?;
    tasks
        .recurrence_action(yara.id, &master.task.id, RecurrenceAction::Pause)
        .await?;

    // Three days go by while the series is paused.
    let children = task::Entity::find()
        .filter(task::Column::RecurrenceMasterTaskId.eq(master.task.id.clone()))
        .all(&ctx.db)
        .await?;
    assert!(children.iter().all(|child| child.is_hidden));
    for child in children {
        let due_date = child.due_date.map(|due_date| due_date - Duration::days(3));
        let mut active_model: task::ActiveModel = child.into();
        active_model.due_date = ActiveValue::Set(due_date);
        active_model.update(&ctx.db).await?;
    }

    tasks
        .recurrence_action(yara.id, &master.task.id, RecurrenceAction::Resume)
        .await?;

    let still_hidden = task::Entity::find()
        .filter(task::Column::RecurrenceMasterTaskId.eq(master.task.id.clone()))
        .filter(task::Column::IsHidden.eq(true))
        .count(&ctx.db)
        .await?;
    assert_eq!(still_hidden, 0);
    let counts: Vec<(NaiveDate, u64)> = tasks
        .calendar(yara.id, today() - Duration::days(2), today() + Duration::days(1))
        .await?
        .into_iter()
        .map(|day| (day.date, day.count))
        .collect();
    assert_eq!(
        counts,
        vec![
            (today() - Duration::days(2), 1),
            (today() - Duration::days(1), 1),
            (today(), 2),
            (today() + Duration::days(1), 1),
        ]
    );
    let yesterday = tasks
        .list_for_date(yara.id, today() - Duration::days(1), None)
        .await?;
    assert!(
        yesterday
            .iter()
            .any(|view| view.task.due_date == Some(today() - Duration::days(1)) && view.is_overdue)
    );
    Ok(())
}
