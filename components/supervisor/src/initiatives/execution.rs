//! Ready sets, dependency graphs and run planning for an initiative.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::InitiativeManager;
use crate::domain::{InitiativeId, TaskId, TaskStatus, TaskView};
use crate::error::{EngineError, EngineResult};
use crate::graph::{index_by_id, populate_task_views, unmet_dependencies};

/// A task vertex in an initiative graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Task id.
    pub id: TaskId,
    /// Task title.
    pub title: String,
    /// Task status.
    pub status: TaskStatus,
}

/// Kind of edge in a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// `from` must complete before `to` may start.
    Blocks,
    /// Informational relation from `from` to `to`.
    Related,
}

/// A directed edge between two member tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source task.
    pub from: TaskId,
    /// Target task.
    pub to: TaskId,
    /// Edge type.
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// Member tasks of an initiative and the edges between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Initiative the graph was built for.
    pub initiative_id: InitiativeId,
    /// Member tasks in junction order.
    pub nodes: Vec<GraphNode>,
    /// Blocking edges first, then related edges.
    pub edges: Vec<GraphEdge>,
}

/// Result of [`InitiativeManager::run_initiative`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Initiative planned.
    pub initiative_id: InitiativeId,
    /// Ready tasks the caller should start, at most `max_parallel`.
    pub ready: Vec<TaskId>,
    /// Explanation when nothing is ready.
    #[serde(default)]
    pub message: Option<String>,
}

impl InitiativeManager {
    /// Returns member tasks that are ready to start.
    ///
    /// Blockers are resolved against every task, not only members.
    ///
    /// # Errors
    /// Returns `InitiativeNotFound` or `Store`.
    pub async fn get_ready_tasks(&self, id: &InitiativeId) -> EngineResult<Vec<TaskView>> {
        Ok(self
            .list_initiative_tasks(id)
            .await?
            .into_iter()
            .filter(|view| view.task.status.is_schedulable() && view.unmet_blockers.is_empty())
            .collect())
    }

    /// Builds the graph of member tasks. Edges to tasks outside the initiative
    /// are left out.
    ///
    /// # Errors
    /// Returns `InitiativeNotFound` or `Store`.
    pub async fn get_dependency_graph(&self, id: &InitiativeId) -> EngineResult<DependencyGraph> {
        let members = self.list_initiative_tasks(id).await?;
        let inside: HashSet<&TaskId> = members.iter().map(|v| &v.task.id).collect();

        let mut edges = Vec::new();
        for view in &members {
            edges.extend(
                view.task
                    .blocked_by
                    .iter()
                    .filter(|blocker| inside.contains(blocker))
                    .map(|blocker| GraphEdge {
                        from: blocker.clone(),
                        to: view.task.id.clone(),
                        kind: EdgeKind::Blocks,
                    }),
            );
        }
        for view in &members {
            edges.extend(
                view.task
                    .related_to
                    .iter()
                    .filter(|related| inside.contains(related))
                    .map(|related| GraphEdge {
                        from: view.task.id.clone(),
                        to: related.clone(),
                        kind: EdgeKind::Related,
                    }),
            );
        }

        let nodes = members
            .iter()
            .map(|view| GraphNode {
                id: view.task.id.clone(),
                title: view.task.title.clone(),
                status: view.task.status,
            })
            .collect();
        Ok(DependencyGraph {
            initiative_id: id.clone(),
            nodes,
            edges,
        })
    }

    /// Picks up to `max_parallel` ready member tasks for the caller to run.
    ///
    /// Nothing is started here. A blocked initiative yields no tasks. A
    /// `max_parallel` of zero means no limit.
    ///
    /// # Errors
    /// Returns `InitiativeNotFound` or `Store`.
    #[instrument(skip(self), fields(initiative = %id))]
    pub async fn run_initiative(
        &self,
        id: &InitiativeId,
        max_parallel: Option<usize>,
    ) -> EngineResult<RunPlan> {
        let initiatives = self.store.load_all_initiatives().await?;
        let by_id = index_by_id(&initiatives);
        let initiative = by_id
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::InitiativeNotFound(id.clone()))?;
        let unmet = unmet_dependencies(initiative, &by_id);
        if !unmet.is_empty() {
            let unmet: Vec<&str> = unmet.iter().map(InitiativeId::as_str).collect();
            return Ok(RunPlan {
                initiative_id: id.clone(),
                ready: Vec::new(),
                message: Some(format!(
                    "Initiative is blocked by: [{}]. Complete blocking initiatives first.",
                    unmet.join(" ")
                )),
            });
        }

        let members: HashSet<&TaskId> = initiative.tasks.iter().map(|r| &r.id).collect();
        let views: Vec<TaskView> = populate_task_views(self.store.load_all_tasks().await?)
            .into_iter()
            .filter(|v| members.contains(&v.task.id))
            .collect();

        let ready: Vec<TaskId> = initiative
            .tasks
            .iter()
            .filter_map(|r| views.iter().find(|v| v.task.id == r.id))
            .filter(|v| v.task.status.is_schedulable() && v.unmet_blockers.is_empty())
            .map(|v| v.task.id.clone())
            .take(max_parallel.filter(|n| *n > 0).unwrap_or(usize::MAX))
            .collect();

        let message = ready.is_empty().then(|| summarize(&views));
        debug!(ready = ready.len(), "Run plan computed");
        Ok(RunPlan {
            initiative_id: id.clone(),
            ready,
            message,
        })
    }
}

fn summarize(members: &[TaskView]) -> String {
    let count = |status: TaskStatus| members.iter().filter(|v| v.task.status == status).count();
    let completed = count(TaskStatus::Completed);
    let running = count(TaskStatus::Running);
    let blocked = members
        .iter()
        .filter(|v| v.task.status.is_schedulable() && !v.unmet_blockers.is_empty())
        .count();

    if completed == members.len() {
        "All tasks are completed.".into()
    } else if running > 0 {
        format!("No tasks ready. {running} running, {completed} completed, {blocked} blocked.")
    } else if blocked > 0 {
        format!("No tasks ready. {blocked} blocked by dependencies, {completed} completed.")
    } else {
        "No tasks ready to run.".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initiatives::tests::{fixture, seed_task};
    use crate::initiatives::NewInitiative;
    use crate::repository::EntityStore;

    async fn initiative(fx: &crate::initiatives::tests::Fixture, title: &str) -> InitiativeId {
        fx.manager
            .create_initiative(NewInitiative {
                title: title.into(),
                ..NewInitiative::default()
            })
            .await
            .unwrap()
            .initiative
            .id
    }

    #[tokio::test]
    async fn ready_tasks_respect_outside_blockers() {
        let fx = fixture();
        let id = initiative(&fx, "Ready").await;
        let outside = seed_task(&fx.store, 1, TaskStatus::Planned).await;
        let a = seed_task(&fx.store, 2, TaskStatus::Planned).await;
        let b = seed_task(&fx.store, 3, TaskStatus::Planned).await;
        let mut task_b = fx.store.load_task(&b).await.unwrap().unwrap();
        task_b.blocked_by = vec![outside];
        fx.store.save_task(&task_b).await.unwrap();
        fx.manager.link_tasks(&id, &[a.clone(), b]).await.unwrap();

        let ready: Vec<TaskId> = fx
            .manager
            .get_ready_tasks(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.task.id)
            .collect();
        assert_eq!(ready, vec![a]);
    }

    #[tokio::test]
    async fn graph_tags_edges() {
        let fx = fixture();
        let id = initiative(&fx, "Graph").await;
        let a = seed_task(&fx.store, 1, TaskStatus::Created).await;
        let b = seed_task(&fx.store, 2, TaskStatus::Created).await;
        let mut task_b = fx.store.load_task(&b).await.unwrap().unwrap();
        task_b.blocked_by = vec![a.clone()];
        task_b.related_to = vec![a.clone()];
        fx.store.save_task(&task_b).await.unwrap();
        fx.manager.link_tasks(&id, &[a.clone(), b.clone()]).await.unwrap();

        let graph = fx.manager.get_dependency_graph(&id).await.unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(
            graph.edges,
            vec![
                GraphEdge { from: a.clone(), to: b.clone(), kind: EdgeKind::Blocks },
                GraphEdge { from: b, to: a, kind: EdgeKind::Related },
            ]
        );
        let json = serde_json::to_value(&graph.edges[0]).unwrap();
        assert_eq!(json["type"], "blocks");
    }

    #[tokio::test]
    async fn run_caps_parallelism_and_explains_empty_plans() {
        let fx = fixture();
        let id = initiative(&fx, "Run").await;
        let mut ids = Vec::new();
        for n in 1..=3 {
            ids.push(seed_task(&fx.store, n, TaskStatus::Planned).await);
        }
        fx.manager.link_tasks(&id, &ids).await.unwrap();

        let plan = fx.manager.run_initiative(&id, Some(2)).await.unwrap();
        assert_eq!(plan.ready, ids[..2].to_vec());
        assert!(plan.message.is_none());

        for task_id in &ids {
            let mut task = fx.store.load_task(task_id).await.unwrap().unwrap();
            task.status = TaskStatus::Running;
            fx.store.save_task(&task).await.unwrap();
        }
        let plan = fx.manager.run_initiative(&id, None).await.unwrap();
        assert_eq!(
            plan.message.as_deref(),
            Some("No tasks ready. 3 running, 0 completed, 0 blocked.")
        );
    }

    #[tokio::test]
    async fn run_reports_blocking_initiatives() {
        let fx = fixture();
        let first = initiative(&fx, "First").await;
        let second = fx
            .manager
            .create_initiative(NewInitiative {
                title: "Second".into(),
                blocked_by: vec![first],
                ..NewInitiative::default()
            })
            .await
            .unwrap()
            .initiative
            .id;
        let plan = fx.manager.run_initiative(&second, None).await.unwrap();
        assert!(plan.ready.is_empty());
        assert_eq!(
            plan.message.as_deref(),
            Some("Initiative is blocked by: [INIT-001]. Complete blocking initiatives first.")
        );
    }

    #[test]
    fn summary_for_finished_initiative() {
        assert_eq!(summarize(&[]), "All tasks are completed.");
    }
}
