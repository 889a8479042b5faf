//! Async tagging task queue
//!
//! Event handlers enqueue tagging work here instead of calling the vendor
//! inline. A single worker task drains the channel and hands each task to a
//! [`TaskRunner`].

use super::{SkillRefresher, XBlockRefresher, XBlockTarget};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use taxonomy_common::db::ProductType;
use taxonomy_common::{Error, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Work item produced by an event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaggingTask {
    XBlock { usage_key: String },
    Course { course_key: String },
    Program { program_uuid: String },
}

/// Executes tagging tasks
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &TaggingTask) -> anyhow::Result<()>;
}

/// Runs tasks through the skill refreshers
pub struct RefreshTaskRunner {
    skills: SkillRefresher,
    xblocks: XBlockRefresher,
}

impl RefreshTaskRunner {
    pub fn new(skills: SkillRefresher, xblocks: XBlockRefresher) -> Self {
        Self { skills, xblocks }
    }
}

#[async_trait]
impl TaskRunner for RefreshTaskRunner {
    async fn run(&self, task: &TaggingTask) -> anyhow::Result<()> {
        match task {
            TaggingTask::XBlock { usage_key } => {
                self.xblocks
                    .refresh(XBlockTarget::XBlocks(vec![usage_key.clone()]))
                    .await?;
            }
            TaggingTask::Course { course_key } => {
                self.skills
                    .refresh(ProductType::Course, Some(vec![course_key.clone()]))
                    .await?;
            }
            TaggingTask::Program { program_uuid } => {
                self.skills
                    .refresh(ProductType::Program, Some(vec![program_uuid.clone()]))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Runner used when no vendor credentials are configured
pub struct DisabledTaskRunner;

#[async_trait]
impl TaskRunner for DisabledTaskRunner {
    async fn run(&self, task: &TaggingTask) -> anyhow::Result<()> {
        anyhow::bail!("vendor client not configured, dropping {:?}", task)
    }
}

struct QueuedTask {
    id: Uuid,
    task: TaggingTask,
}

/// Handle for enqueueing tagging tasks
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<QueuedTask>,
}

impl TaskQueue {
    /// Spawn the worker; it exits once every handle is dropped
    pub fn start(runner: Arc<dyn TaskRunner>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<QueuedTask>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(queued) = receiver.recv().await {
                tracing::debug!(task_id = %queued.id, task = ?queued.task, "Running tagging task");
                if let Err(e) = runner.run(&queued.task).await {
                    tracing::error!(task_id = %queued.id, task = ?queued.task, "Tagging task failed: {:#}", e);
                }
            }
            tracing::info!("Tagging task queue closed");
        });

        (Self { sender }, worker)
    }

    /// Enqueue a task, waiting for room when the queue is full
    pub async fn enqueue(&self, task: TaggingTask) -> Result<Uuid> {
        let id = Uuid::new_v4();
        tracing::info!(task_id = %id, task = ?task, "Tagging task enqueued");
        self.sender
            .send(QueuedTask { id, task })
            .await
            .map_err(|_| Error::Internal("tagging task queue is closed".to_string()))?;
        Ok(id)
    }
}
