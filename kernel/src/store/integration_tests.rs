use super::*;
use anyhow::Result;
use supervisor::domain::{
    GateDecision, GateType, Initiative, InitiativeId, InitiativeStatus, Task, TaskId, TaskStatus,
    Weight,
};
use supervisor::repository::{BatchInitiativeLoader, EntityStore};

async fn setup_store() -> Result<SqliteEntityStore> {
    Ok(SqliteEntityStore::connect("sqlite::memory:", 1).await?)
}

fn task(n: u64) -> Task {
    Task::new(TaskId::from_sequence(n), format!("Task {n}")).unwrap()
}

fn initiative(n: u64) -> Initiative {
    Initiative::new(InitiativeId::from_sequence(n), format!("Initiative {n}")).unwrap()
}

#[tokio::test]
async fn test_task_round_trip_preserves_every_field() -> Result<()> {
    let store = setup_store().await?;
    let mut original = task(1);
    original.description = Some("Mentions TASK-002".into());
    original.status = TaskStatus::Blocked;
    original.weight = Weight::Large;
    original.blocked_by = vec![TaskId::from_sequence(2)];
    original.related_to = vec![TaskId::from_sequence(3)];
    original.initiative_id = Some(InitiativeId::from_sequence(1));
    original.phases = vec!["spec".into(), "implement".into()];
    original.current_phase = Some("spec".into());
    original.pending_gate = Some(GateType::Ai);
    original.gates = vec![GateDecision {
        phase: "research".into(),
        gate_type: GateType::Human,
        approved: true,
        reason: Some("ok".into()),
        timestamp: chrono::Utc::now(),
    }];

    store.save_task(&original).await?;
    let loaded = store.load_task(&original.id).await?.expect("task stored");
    assert_eq!(loaded, original);

    store.delete_task(&original.id).await?;
    assert!(store.load_task(&original.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_junction_keeps_insertion_order_and_ignores_repeats() -> Result<()> {
    let store = setup_store().await?;
    let init = initiative(1);
    store.save_initiative(&init).await?;
    for n in 1..=3 {
        store.save_task(&task(n)).await?;
    }

    store.add_task_to_initiative(&init.id, &TaskId::from_sequence(3), 0).await?;
    store.add_task_to_initiative(&init.id, &TaskId::from_sequence(1), 1).await?;
    store.add_task_to_initiative(&init.id, &TaskId::from_sequence(3), 9).await?;

    let ids = store.get_initiative_tasks(&init.id).await?;
    assert_eq!(ids, vec![TaskId::from_sequence(3), TaskId::from_sequence(1)]);

    let loaded = store.load_initiative(&init.id).await?.expect("initiative stored");
    let titles: Vec<&str> = loaded.tasks.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Task 3", "Task 1"]);
    Ok(())
}

#[tokio::test]
async fn test_dangling_junction_entries_are_hidden_from_loads() -> Result<()> {
    let store = setup_store().await?;
    let init = initiative(1);
    store.save_initiative(&init).await?;
    store.save_task(&task(1)).await?;
    store.add_task_to_initiative(&init.id, &TaskId::from_sequence(1), 0).await?;
    store.add_task_to_initiative(&init.id, &TaskId::from_sequence(9), 1).await?;

    assert_eq!(store.get_initiative_tasks(&init.id).await?.len(), 2);
    assert_eq!(store.load_all_initiatives().await?[0].tasks.len(), 1);

    let statuses = store.load_member_statuses(&[init.id.clone(), InitiativeId::from_sequence(2)]).await?;
    assert_eq!(statuses[&init.id], vec![TaskStatus::Created]);
    assert!(statuses[&InitiativeId::from_sequence(2)].is_empty());
    Ok(())
}

#[tokio::test]
async fn test_junction_sequence_continues_past_removed_entries() -> Result<()> {
    let store = setup_store().await?;
    let init = initiative(1);
    store.save_initiative(&init).await?;
    assert_eq!(store.next_junction_sequence(&init.id).await?, 0);

    for n in 1..=3 {
        let sequence = store.next_junction_sequence(&init.id).await?;
        store.add_task_to_initiative(&init.id, &TaskId::from_sequence(n), sequence).await?;
    }
    store.remove_task_from_initiative(&init.id, &TaskId::from_sequence(1)).await?;
    store.remove_task_from_initiative(&init.id, &TaskId::from_sequence(2)).await?;

    let sequence = store.next_junction_sequence(&init.id).await?;
    assert_eq!(sequence, 3);
    store.add_task_to_initiative(&init.id, &TaskId::from_sequence(4), sequence).await?;
    assert_eq!(
        store.get_initiative_tasks(&init.id).await?,
        vec![TaskId::from_sequence(3), TaskId::from_sequence(4)]
    );
    Ok(())
}

#[tokio::test]
async fn test_save_initiative_does_not_touch_junction() -> Result<()> {
    let store = setup_store().await?;
    let mut init = initiative(1);
    store.save_initiative(&init).await?;
    store.save_task(&task(1)).await?;
    store.add_task_to_initiative(&init.id, &TaskId::from_sequence(1), 0).await?;

    init.status = InitiativeStatus::Completed;
    init.record_decision("Ship it", None, Some("lead".into()))?;
    store.save_initiative(&init).await?;

    let loaded = store.load_initiative(&init.id).await?.expect("initiative stored");
    assert_eq!(loaded.status, InitiativeStatus::Completed);
    assert_eq!(loaded.decisions.len(), 1);
    assert_eq!(loaded.tasks.len(), 1);

    store.delete_initiative(&init.id).await?;
    assert!(store.load_initiative(&init.id).await?.is_none());
    assert!(store.get_initiative_tasks(&init.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_id_allocation_skips_imported_ids() -> Result<()> {
    let store = setup_store().await?;
    assert_eq!(store.next_task_id().await?.as_str(), "TASK-001");
    store.save_task(&task(7)).await?;
    assert_eq!(store.next_task_id().await?.as_str(), "TASK-008");
    assert_eq!(store.next_task_id().await?.as_str(), "TASK-009");
    assert_eq!(store.next_initiative_id().await?.as_str(), "INIT-001");
    Ok(())
}

#[tokio::test]
async fn test_file_database_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("keel.db").display());

    let store = SqliteEntityStore::connect(&url, 2).await?;
    store.save_task(&task(1)).await?;
    store.pool().close().await;

    let reopened = SqliteEntityStore::connect(&url, 2).await?;
    assert_eq!(reopened.load_all_tasks().await?.len(), 1);
    assert_eq!(reopened.next_task_id().await?.as_str(), "TASK-002");
    Ok(())
}

#[tokio::test]
async fn test_corrupt_rows_surface_as_store_errors() -> Result<()> {
    let store = setup_store().await?;
    store.save_task(&task(1)).await?;
    sqlx::query("UPDATE tasks SET status = 'exploded' WHERE id = 'TASK-001'")
        .execute(store.pool())
        .await?;

    let err = store.load_task(&TaskId::from_sequence(1)).await.unwrap_err();
    assert!(matches!(err, supervisor::StoreError::Corrupt { .. }));
    Ok(())
}
