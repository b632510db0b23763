//! Executes scripts against an in-process service

use std::collections::HashMap;

use anyhow::{anyhow, Context};
use framegraph_service::FrameGraphService;
use framegraph_triggers::TriggerMessage;
use framegraph_types::{
    DataBlob, DataType, Epsilon, FrameId, LinkContent, LinkId, TimeStamp, Transform,
    TransactionId, TriggerId,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::script::{Op, Script, Step};

/// One line of run output.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// Result of a step or operation
    Result { step: usize, op: String, value: Value },
    /// A request-local failure; the run continues
    Error { step: usize, op: String, error: String },
    Commit { step: usize, committed: bool, message: String },
    Notification { message: TriggerMessage },
}

pub struct Runner {
    service: FrameGraphService,
    notifications: mpsc::Receiver<TriggerMessage>,
    links: HashMap<String, LinkId>,
    triggers: HashMap<String, TriggerId>,
    records: Vec<Record>,
}

impl Runner {
    pub async fn new(service: FrameGraphService) -> Self {
        let (_, notifications) = service.subscribe(None).await;
        Self {
            service,
            notifications,
            links: HashMap::new(),
            triggers: HashMap::new(),
            records: Vec::new(),
        }
    }

    /// Run every step and return the records produced.
    pub async fn run(mut self, script: &Script) -> Vec<Record> {
        for (step, entry) in script.steps.iter().enumerate() {
            match entry {
                Step::Transaction { ops, abort } => {
                    self.transaction(step, ops, abort.as_deref()).await
                }
                other => {
                    let name = step_name(other);
                    match self.bookkeeping(other).await {
                        Ok(value) => self.result(step, name, value),
                        Err(e) => self.error(step, name, e),
                    }
                }
            }
            self.drain().await;
        }
        self.records
    }

    async fn transaction(&mut self, step: usize, ops: &[Op], abort: Option<&str>) {
        let tx = self.service.start_transaction().await;
        for op in ops {
            let name = op_name(op);
            match self.apply(tx, op).await {
                Ok(value) => self.result(step, name, value),
                Err(e) => self.error(step, name, e),
            }
        }
        match abort {
            Some(reason) => {
                self.service.abort_transaction(tx, reason).await;
                self.records.push(Record::Commit {
                    step,
                    committed: false,
                    message: format!("aborted: {reason}"),
                });
            }
            None => {
                let (committed, message) = self.service.commit_transaction(tx).await;
                self.records.push(Record::Commit {
                    step,
                    committed,
                    message,
                });
            }
        }
    }

    async fn apply(&mut self, tx: TransactionId, op: &Op) -> anyhow::Result<Value> {
        let value = match op {
            Op::CreateFrame { name } => json!(self.service.create_frame(tx, Some(name)).await?),
            Op::SetFrameName { frame, name } => {
                let frame = self.frame(tx, frame).await?;
                json!(self.service.set_frame_name(tx, frame, name).await?)
            }
            Op::DeleteFrame { frame } => {
                let frame = self.frame(tx, frame).await?;
                self.service.delete_frame(tx, frame).await?;
                Value::Null
            }
            Op::SetLink {
                alias,
                parent,
                child,
                translation: [x, y, z],
                rotation: [roll, pitch, yaw],
                label,
                confidence,
                time,
            } => {
                let parent = self.frame(tx, parent).await?;
                let child = self.frame(tx, child).await?;
                let content = LinkContent::new(
                    parent,
                    child,
                    Transform::from_xyz_rpy(*x, *y, *z, *roll, *pitch, *yaw),
                )
                .with_label(label.as_str())
                .with_confidence(*confidence)
                .with_time(TimeStamp::from_secs(*time));
                let reuse = self.links.get(alias).copied();
                let id = self.service.set_link(tx, content, reuse).await?;
                self.links.insert(alias.clone(), id);
                json!(id)
            }
            Op::DeleteLinks { links } => {
                let ids = self.link_ids(links)?;
                self.service.delete_links(tx, &ids).await?;
                Value::Null
            }
            Op::SetFrameData {
                frame,
                data_type,
                value,
            } => {
                let frame = self.frame(tx, frame).await?;
                let blob = DataBlob::new(value.clone().into_bytes());
                self.service
                    .set_frame_data(tx, frame, DataType::new(data_type.as_str()), blob)
                    .await?;
                Value::Null
            }
            Op::DeleteFrameData { frame, types } => {
                let frame = self.frame(tx, frame).await?;
                self.service.delete_frame_data(tx, frame, &data_types(types)).await?;
                Value::Null
            }
            Op::SetLinkData {
                link,
                data_type,
                value,
            } => {
                let link = self.link(link)?;
                let blob = DataBlob::new(value.clone().into_bytes());
                self.service
                    .set_link_data(tx, link, DataType::new(data_type.as_str()), blob)
                    .await?;
                Value::Null
            }
            Op::DeleteLinkData { link, types } => {
                let link = self.link(link)?;
                self.service.delete_link_data(tx, link, &data_types(types)).await?;
                Value::Null
            }
            Op::Estimate {
                origin,
                links,
                max_hops,
                strategy,
            } => {
                let origin = self.frame(tx, origin).await?;
                let set = match links {
                    Some(links) => {
                        let ids = self.link_ids(links)?;
                        self.service.estimate_frames(tx, &ids, origin, strategy).await?
                    }
                    None => {
                        self.service
                            .estimate_neighboring_frames(tx, origin, *max_hops, None, None, strategy)
                            .await?
                    }
                };
                let mut poses = Vec::with_capacity(set.len());
                for (frame, pose) in &set.frames {
                    let t = pose.translation();
                    poses.push(json!({
                        "frame": frame,
                        "name": self.service.get_frame_name(tx, *frame).await?,
                        "translation": [t.x, t.y, t.z],
                    }));
                }
                json!({ "origin": set.origin, "frames": poses })
            }
            Op::GetLinks { frames, foreign } => {
                let frames = self.frames(tx, frames).await?;
                json!(self.service.get_links(tx, &frames, *foreign, None, None).await?)
            }
            Op::GetFrameData { frame } => {
                let frame = self.frame(tx, frame).await?;
                let data = self.service.get_frame_data(tx, frame, &[]).await?;
                let text: HashMap<&str, String> = data
                    .iter()
                    .map(|(t, blob)| (t.as_str(), String::from_utf8_lossy(blob.as_bytes()).into_owned()))
                    .collect();
                json!(text)
            }
        };
        Ok(value)
    }

    async fn bookkeeping(&mut self, step: &Step) -> anyhow::Result<Value> {
        let (alias, id) = match step {
            Step::WatchLinks { alias, frames } => {
                let frames = self.committed_frames(frames).await?;
                (alias, self.service.watch_links(&frames, self.triggers.get(alias).copied()).await)
            }
            Step::WatchEstimatedTransforms {
                alias,
                frames,
                origin,
                epsilon: [translation, rotation],
                strategy,
            } => {
                let frames = self.committed_frames(frames).await?;
                let origin = self.committed_frames(std::slice::from_ref(origin)).await?[0];
                let id = self
                    .service
                    .watch_estimated_transforms(
                        &frames,
                        origin,
                        Epsilon::new(*translation, *rotation),
                        strategy,
                        self.triggers.get(alias).copied(),
                    )
                    .await;
                (alias, id)
            }
            Step::WatchFrameData { alias, frames } => {
                let frames = self.committed_frames(frames).await?;
                let reuse = self.triggers.get(alias).copied();
                (alias, self.service.watch_frame_data(&frames, reuse).await)
            }
            Step::WatchLinkData { alias, links } => {
                let links = self.link_ids(links)?;
                let reuse = self.triggers.get(alias).copied();
                (alias, self.service.watch_link_data(&links, reuse).await)
            }
            Step::DeleteTriggers { triggers } => {
                let ids: Vec<TriggerId> = triggers
                    .iter()
                    .filter_map(|alias| self.triggers.remove(alias))
                    .collect();
                self.service.delete_triggers(&ids).await;
                return Ok(json!(ids));
            }
            Step::Transaction { .. } => return Err(anyhow!("nested transaction step")),
        };
        if !id.is_valid() {
            return Err(anyhow!("trigger registration for {alias:?} was refused"));
        }
        self.triggers.insert(alias.clone(), id);
        Ok(json!(id))
    }

    /// Hand every pending notification to the output.
    async fn drain(&mut self) {
        self.service.flush_triggers().await;
        while let Ok(message) = self.notifications.try_recv() {
            self.records.push(Record::Notification { message });
        }
    }

    async fn frame(&self, tx: TransactionId, name: &str) -> anyhow::Result<FrameId> {
        self.service
            .get_frame_id(tx, name)
            .await?
            .ok_or_else(|| anyhow!("no frame named {name:?}"))
    }

    async fn frames(&self, tx: TransactionId, names: &[String]) -> anyhow::Result<Vec<FrameId>> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            ids.push(self.frame(tx, name).await?);
        }
        Ok(ids)
    }

    /// Resolve names against the latest committed state.
    async fn committed_frames(&self, names: &[String]) -> anyhow::Result<Vec<FrameId>> {
        let tx = self.service.start_transaction().await;
        let resolved = self.frames(tx, names).await;
        self.service.commit_transaction(tx).await;
        resolved
    }

    fn link(&self, alias: &str) -> anyhow::Result<LinkId> {
        self.links
            .get(alias)
            .copied()
            .with_context(|| format!("no link aliased {alias:?}"))
    }

    fn link_ids(&self, aliases: &[String]) -> anyhow::Result<Vec<LinkId>> {
        aliases.iter().map(|a| self.link(a)).collect()
    }

    fn result(&mut self, step: usize, op: &str, value: Value) {
        debug!(step, op, "Step completed");
        self.records.push(Record::Result {
            step,
            op: op.to_string(),
            value,
        });
    }

    fn error(&mut self, step: usize, op: &str, error: anyhow::Error) {
        warn!(step, op, error = %error, "Step failed");
        self.records.push(Record::Error {
            step,
            op: op.to_string(),
            error: format!("{error:#}"),
        });
    }
}

fn data_types(types: &[String]) -> Vec<DataType> {
    types.iter().map(|t| DataType::new(t.as_str())).collect()
}

fn step_name(step: &Step) -> &'static str {
    match step {
        Step::Transaction { .. } => "transaction",
        Step::WatchLinks { .. } => "watch_links",
        Step::WatchEstimatedTransforms { .. } => "watch_estimated_transforms",
        Step::WatchFrameData { .. } => "watch_frame_data",
        Step::WatchLinkData { .. } => "watch_link_data",
        Step::DeleteTriggers { .. } => "delete_triggers",
    }
}

fn op_name(op: &Op) -> &'static str {
    match op {
        Op::CreateFrame { .. } => "create_frame",
        Op::SetFrameName { .. } => "set_frame_name",
        Op::DeleteFrame { .. } => "delete_frame",
        Op::SetLink { .. } => "set_link",
        Op::DeleteLinks { .. } => "delete_links",
        Op::SetFrameData { .. } => "set_frame_data",
        Op::DeleteFrameData { .. } => "delete_frame_data",
        Op::SetLinkData { .. } => "set_link_data",
        Op::DeleteLinkData { .. } => "delete_link_data",
        Op::Estimate { .. } => "estimate",
        Op::GetLinks { .. } => "get_links",
        Op::GetFrameData { .. } => "get_frame_data",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framegraph_service::FrameGraphConfig;
    use framegraph_triggers::Notification;

    async fn run(yaml: &str) -> Vec<Record> {
        let service = FrameGraphService::new(&FrameGraphConfig::default()).unwrap();
        let script: Script = serde_yaml::from_str(yaml).unwrap();
        Runner::new(service).await.run(&script).await
    }

    #[tokio::test]
    async fn estimates_and_notifies() {
        let records = run(r#"
steps:
  - op: transaction
    ops:
      - { op: create_frame, name: world }
      - { op: create_frame, name: robot }
      - { op: set_link, alias: odom, parent: world, child: robot, translation: [2, 0, 0] }
  - { op: watch_links, alias: w, frames: [robot] }
  - op: transaction
    ops:
      - { op: create_frame, name: camera }
      - { op: set_link, alias: mount, parent: robot, child: camera, translation: [0, 0, 1] }
      - { op: estimate, origin: world }
"#)
        .await;

        let commits = records
            .iter()
            .filter(|r| matches!(r, Record::Commit { committed: true, .. }))
            .count();
        assert_eq!(commits, 2);

        let estimate = records
            .iter()
            .find_map(|r| match r {
                Record::Result { op, value, .. } if op == "estimate" => Some(value.clone()),
                _ => None,
            })
            .unwrap();
        let frames = estimate["frames"].as_array().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2]["name"], "camera");
        assert_eq!(frames[2]["translation"], json!([2.0, 0.0, 1.0]));

        let notified = records.iter().any(|r| {
            matches!(
                r,
                Record::Notification {
                    message: TriggerMessage {
                        notification: Notification::LinksChanged { .. },
                        ..
                    }
                }
            )
        });
        assert!(notified);
    }

    #[tokio::test]
    async fn failures_are_recorded_and_run_continues() {
        let records = run(r#"
steps:
  - op: transaction
    ops:
      - { op: delete_frame, frame: nowhere }
      - { op: create_frame, name: here }
  - { op: watch_links, alias: w, frames: [nowhere] }
  - op: transaction
    abort: "dry run"
    ops:
      - { op: create_frame, name: scratch }
"#)
        .await;

        let errors: Vec<&str> = records
            .iter()
            .filter_map(|r| match r {
                Record::Error { op, .. } => Some(op.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec!["delete_frame", "watch_links"]);
        assert!(records
            .iter()
            .any(|r| matches!(r, Record::Commit { step: 2, committed: false, .. })));
    }
}
