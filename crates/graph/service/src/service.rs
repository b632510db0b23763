use std::sync::Arc;

use framegraph_estimation::{EstimationEngine, RelaxationStrategy, StrategyRegistry};
use framegraph_store::{CommitDiff, CommitOutcome, GraphStore, GraphVersion, StoreStats};
use framegraph_triggers::{SubscriberId, TriggerManager, TriggerMessage};
use framegraph_types::{
    BoundingBox, DataBlob, DataMap, DataType, Epsilon, EstimatedFrameSet, FrameId, GlobalId,
    HostId, IdMapper, LabelFilter, Link, LinkContent, LinkId, Sphere, TimeFilter, TransactionId,
    TriggerId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FrameGraphConfig;
use crate::error::{Result, ServiceError};

/// Work handed to the trigger evaluation task, processed in order.
enum Evaluation {
    /// A commit's diff and the version it installed.
    Commit(CommitDiff, Arc<GraphVersion>),
    Flush(oneshot::Sender<()>),
}

/// Snapshot of service counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub store: StoreStats,
    pub triggers: usize,
    pub strategies: Vec<String>,
    pub default_strategy: String,
}

/// The FrameGraph service: every RPC of the store as an async method.
///
/// Transactions, reads and writes go to the [`GraphStore`]; estimation
/// requests run the [`EstimationEngine`] against the transaction's view.
/// Committed diffs are evaluated by a single background task, so
/// notifications for consecutive commits are produced in commit order.
///
/// Must be created inside a tokio runtime.
pub struct FrameGraphService {
    store: Arc<GraphStore>,
    engine: Arc<EstimationEngine>,
    triggers: Arc<TriggerManager>,
    evaluations: mpsc::UnboundedSender<Evaluation>,
    evaluator: JoinHandle<()>,
    frame_ids: RwLock<IdMapper>,
    link_ids: RwLock<IdMapper>,
}

impl FrameGraphService {
    pub fn new(config: &FrameGraphConfig) -> Result<Self> {
        Self::with_host(config, HostId::new())
    }

    /// Create a service whose distributed ids carry `host`.
    pub fn with_host(config: &FrameGraphConfig, host: HostId) -> Result<Self> {
        let mut registry = StrategyRegistry::new();
        let strategy = &config.estimation.default_strategy;
        if !registry.set_default(strategy) {
            return Err(ServiceError::UnknownStrategy(strategy.clone()));
        }

        let store = Arc::new(GraphStore::with_retention_warning(
            config.store.max_retained_versions,
        ));
        let engine = Arc::new(EstimationEngine::with_registry(registry));
        let triggers = Arc::new(TriggerManager::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            config.triggers.channel_capacity,
        ));

        let (evaluations, rx) = mpsc::unbounded_channel();
        let evaluator = tokio::spawn(evaluate(Arc::clone(&triggers), rx));

        info!(
            host = %host.0,
            default_strategy = %strategy,
            channel_capacity = config.triggers.channel_capacity,
            "FrameGraph service started"
        );

        Ok(Self {
            store,
            engine,
            triggers,
            evaluations,
            evaluator,
            frame_ids: RwLock::new(IdMapper::new(host)),
            link_ids: RwLock::new(IdMapper::new(host)),
        })
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    // =========================================================================
    // Transaction control
    // =========================================================================

    pub async fn start_transaction(&self) -> TransactionId {
        self.store.start_transaction()
    }

    /// Commit `tx`. Returns `(true, "")` on success and `(false, reason)`
    /// when the commit conflicted or `tx` is not active.
    pub async fn commit_transaction(&self, tx: TransactionId) -> (bool, String) {
        match self.store.commit_transaction(tx) {
            Ok(CommitOutcome::Committed { diff, state, .. }) => {
                if let Some(diff) = diff.filter(|d| !d.is_empty()) {
                    if self.evaluations.send(Evaluation::Commit(diff, state)).is_err() {
                        warn!(tx = %tx, "Trigger evaluation stopped; commit not evaluated");
                    }
                }
                (true, String::new())
            }
            Ok(outcome) => outcome.to_status(),
            Err(e) => (false, e.to_string()),
        }
    }

    pub async fn abort_transaction(&self, tx: TransactionId, reason: &str) {
        self.store.abort_transaction(tx, reason)
    }

    // =========================================================================
    // Estimation
    // =========================================================================

    pub async fn estimate_frames(
        &self,
        tx: TransactionId,
        links: &[LinkId],
        origin: FrameId,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        Ok(self.store.read(tx, |view| {
            self.engine.estimate_frames(view, links, origin, strategy)
        })?)
    }

    pub async fn estimate_frames_within_box(
        &self,
        tx: TransactionId,
        origin: FrameId,
        bbox: &BoundingBox,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        Ok(self.store.read(tx, |view| {
            self.engine
                .estimate_frames_within_box(view, origin, bbox, time, label, strategy)
        })?)
    }

    pub async fn estimate_frames_within_sphere(
        &self,
        tx: TransactionId,
        origin: FrameId,
        sphere: &Sphere,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        Ok(self.store.read(tx, |view| {
            self.engine
                .estimate_frames_within_sphere(view, origin, sphere, time, label, strategy)
        })?)
    }

    pub async fn estimate_neighboring_frames(
        &self,
        tx: TransactionId,
        origin: FrameId,
        max_link_count: usize,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        Ok(self.store.read(tx, |view| {
            self.engine
                .estimate_neighboring_frames(view, origin, max_link_count, time, label, strategy)
        })?)
    }

    /// Make a custom strategy available by its name.
    pub fn register_strategy(&self, strategy: Arc<dyn RelaxationStrategy>) {
        self.engine.registry().register(strategy)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_links(
        &self,
        tx: TransactionId,
        frames: &[FrameId],
        return_foreign: bool,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
    ) -> Result<Vec<LinkId>> {
        Ok(self.store.get_links(tx, frames, return_foreign, time, label)?)
    }

    pub async fn get_neighbour_frames(
        &self,
        tx: TransactionId,
        frames: &[FrameId],
        max_link_count: usize,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
    ) -> Result<Vec<FrameId>> {
        Ok(self
            .store
            .get_neighbour_frames(tx, frames, max_link_count, time, label)?)
    }

    pub async fn resolve_links(&self, tx: TransactionId, links: &[LinkId]) -> Result<Vec<Link>> {
        Ok(self.store.resolve_links(tx, links)?)
    }

    /// Data of `frame` restricted to `types` (all data when empty).
    pub async fn get_frame_data(
        &self,
        tx: TransactionId,
        frame: FrameId,
        types: &[DataType],
    ) -> Result<DataMap> {
        Ok(self.store.get_frame_data(tx, frame, types)?)
    }

    pub async fn get_link_data(
        &self,
        tx: TransactionId,
        link: LinkId,
        types: &[DataType],
    ) -> Result<DataMap> {
        Ok(self.store.get_link_data(tx, link, types)?)
    }

    pub async fn get_frame_name(&self, tx: TransactionId, frame: FrameId) -> Result<Option<String>> {
        Ok(self.store.get_frame_name(tx, frame)?)
    }

    pub async fn get_frame_id(&self, tx: TransactionId, name: &str) -> Result<Option<FrameId>> {
        Ok(self.store.get_frame_id(tx, name)?)
    }

    pub async fn list_frames(&self, tx: TransactionId) -> Result<Vec<FrameId>> {
        Ok(self.store.list_frames(tx)?)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn create_frame(&self, tx: TransactionId, name: Option<&str>) -> Result<FrameId> {
        Ok(self.store.create_frame(tx, name)?)
    }

    /// Name `frame`. Returns false when another frame holds the name.
    pub async fn set_frame_name(&self, tx: TransactionId, frame: FrameId, name: &str) -> Result<bool> {
        Ok(self.store.set_frame_name(tx, frame, name)?)
    }

    pub async fn delete_frame(&self, tx: TransactionId, frame: FrameId) -> Result<()> {
        Ok(self.store.delete_frame(tx, frame)?)
    }

    /// Create a link, or replace the content of `reuse` keeping its data.
    pub async fn set_link(
        &self,
        tx: TransactionId,
        content: LinkContent,
        reuse: Option<LinkId>,
    ) -> Result<LinkId> {
        Ok(self.store.set_link(tx, content, reuse)?)
    }

    pub async fn delete_links(&self, tx: TransactionId, links: &[LinkId]) -> Result<()> {
        Ok(self.store.delete_links(tx, links)?)
    }

    pub async fn set_frame_data(
        &self,
        tx: TransactionId,
        frame: FrameId,
        data_type: DataType,
        blob: DataBlob,
    ) -> Result<()> {
        Ok(self.store.set_frame_data(tx, frame, data_type, blob)?)
    }

    pub async fn delete_frame_data(
        &self,
        tx: TransactionId,
        frame: FrameId,
        types: &[DataType],
    ) -> Result<()> {
        Ok(self.store.delete_frame_data(tx, frame, types)?)
    }

    pub async fn set_link_data(
        &self,
        tx: TransactionId,
        link: LinkId,
        data_type: DataType,
        blob: DataBlob,
    ) -> Result<()> {
        Ok(self.store.set_link_data(tx, link, data_type, blob)?)
    }

    pub async fn delete_link_data(
        &self,
        tx: TransactionId,
        link: LinkId,
        types: &[DataType],
    ) -> Result<()> {
        Ok(self.store.delete_link_data(tx, link, types)?)
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    pub async fn watch_links(&self, frames: &[FrameId], reuse: Option<TriggerId>) -> TriggerId {
        self.triggers.watch_links(frames, reuse).await
    }

    pub async fn watch_estimated_transforms(
        &self,
        frames: &[FrameId],
        origin: FrameId,
        epsilon: Epsilon,
        strategy: &str,
        reuse: Option<TriggerId>,
    ) -> TriggerId {
        self.triggers
            .watch_estimated_transforms(frames, origin, epsilon, strategy, reuse)
            .await
    }

    pub async fn watch_frame_data(&self, frames: &[FrameId], reuse: Option<TriggerId>) -> TriggerId {
        self.triggers.watch_frame_data(frames, reuse).await
    }

    pub async fn watch_link_data(&self, links: &[LinkId], reuse: Option<TriggerId>) -> TriggerId {
        self.triggers.watch_link_data(links, reuse).await
    }

    pub async fn delete_triggers(&self, triggers: &[TriggerId]) {
        self.triggers.delete_triggers(triggers).await
    }

    /// Receive notifications of the given triggers (None = all).
    pub async fn subscribe(
        &self,
        triggers: Option<Vec<TriggerId>>,
    ) -> (SubscriberId, mpsc::Receiver<TriggerMessage>) {
        self.triggers.subscribe(triggers).await
    }

    pub async fn unsubscribe(&self, subscriber: &SubscriberId) {
        self.triggers.unsubscribe(subscriber).await
    }

    /// Wait until every commit made so far has been evaluated and its
    /// notifications handed to subscriber channels.
    pub async fn flush_triggers(&self) {
        let (done, wait) = oneshot::channel();
        if self.evaluations.send(Evaluation::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    // =========================================================================
    // Distributed identifiers
    // =========================================================================

    pub async fn export_frame_id(&self, frame: FrameId) -> Result<GlobalId> {
        let mapper = self.frame_ids.read().await;
        if mapper.global_of(frame.0).is_none() && !self.store.head().has_frame(frame) {
            return Err(ServiceError::Store(
                framegraph_store::StoreError::FrameNotFound(frame),
            ));
        }
        Ok(mapper.export(frame.0))
    }

    pub async fn import_frame_id(&self, global: GlobalId) -> Result<FrameId> {
        import(&self.frame_ids, global).await.map(FrameId)
    }

    pub async fn export_link_id(&self, link: LinkId) -> Result<GlobalId> {
        let mapper = self.link_ids.read().await;
        if mapper.global_of(link.0).is_none() && !self.store.head().has_link(link) {
            return Err(ServiceError::Store(
                framegraph_store::StoreError::LinkNotFound(link),
            ));
        }
        Ok(mapper.export(link.0))
    }

    pub async fn import_link_id(&self, global: GlobalId) -> Result<LinkId> {
        import(&self.link_ids, global).await.map(LinkId)
    }

    // =========================================================================
    // Monitoring
    // =========================================================================

    pub async fn stats(&self) -> ServiceStats {
        let registry = self.engine.registry();
        ServiceStats {
            store: self.store.stats(),
            triggers: self.triggers.trigger_count().await,
            strategies: registry.names(),
            default_strategy: registry.default_name().to_string(),
        }
    }
}

impl Drop for FrameGraphService {
    fn drop(&mut self) {
        self.evaluator.abort();
    }
}

/// Evaluate commits in arrival order until the service is dropped.
async fn evaluate(triggers: Arc<TriggerManager>, mut rx: mpsc::UnboundedReceiver<Evaluation>) {
    while let Some(work) = rx.recv().await {
        match work {
            Evaluation::Commit(diff, state) => {
                triggers.on_commit(&diff, &state).await;
            }
            Evaluation::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Trigger evaluation task stopped");
}

/// Local form of `global`. Ids minted by this host must map to a local id;
/// foreign ids get an alias on first sight.
async fn import(mapper: &RwLock<IdMapper>, global: GlobalId) -> Result<u64> {
    {
        let mapper = mapper.read().await;
        if let Some(local) = mapper.local_of(&global) {
            return Ok(local);
        }
        if global.host() == mapper.host() {
            return Err(ServiceError::GlobalIdNotFound(global));
        }
    }
    let local = mapper.write().await.import(global);
    debug!(global = %global, local, "Foreign id imported");
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framegraph_types::Transform;

    async fn service() -> FrameGraphService {
        FrameGraphService::new(&FrameGraphConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn unknown_default_strategy_is_rejected() {
        let mut config = FrameGraphConfig::default();
        config.estimation.default_strategy = "gauss_newton".into();
        assert!(matches!(
            FrameGraphService::new(&config),
            Err(ServiceError::UnknownStrategy(_))
        ));
    }

    #[tokio::test]
    async fn commit_of_unknown_transaction_reports_failure() {
        let svc = service().await;
        let (ok, reason) = svc.commit_transaction(TransactionId(42)).await;
        assert!(!ok);
        assert!(!reason.is_empty());
    }

    #[tokio::test]
    async fn frame_ids_round_trip_through_global_form() {
        let svc = service().await;
        let tx = svc.start_transaction().await;
        let frame = svc.create_frame(tx, None).await.unwrap();
        assert_eq!(svc.commit_transaction(tx).await, (true, String::new()));

        let global = svc.export_frame_id(frame).await.unwrap();
        assert_eq!(svc.import_frame_id(global).await.unwrap(), frame);
        assert!(svc.export_frame_id(FrameId(999)).await.is_err());
    }

    #[tokio::test]
    async fn foreign_ids_get_stable_aliases() {
        let svc = service().await;
        let foreign = GlobalId::new(HostId::new(), 7);
        let alias = svc.import_link_id(foreign).await.unwrap();
        assert_eq!(svc.import_link_id(foreign).await.unwrap(), alias);
        assert_eq!(svc.export_link_id(alias).await.unwrap(), foreign);
    }

    #[tokio::test]
    async fn own_ids_beyond_local_range_are_not_found() {
        let host = HostId::new();
        let svc = FrameGraphService::with_host(&FrameGraphConfig::default(), host).unwrap();
        let bogus = GlobalId::new(host, u128::from(u64::MAX) + 1);
        assert!(matches!(
            svc.import_frame_id(bogus).await,
            Err(ServiceError::GlobalIdNotFound(_))
        ));
    }

    #[tokio::test]
    async fn stats_reflect_activity() {
        let svc = service().await;
        let tx = svc.start_transaction().await;
        let a = svc.create_frame(tx, None).await.unwrap();
        let b = svc.create_frame(tx, None).await.unwrap();
        svc.set_link(tx, LinkContent::new(a, b, Transform::identity()), None)
            .await
            .unwrap();
        svc.commit_transaction(tx).await;
        svc.watch_links(&[a], None).await;

        let stats = svc.stats().await;
        assert_eq!(stats.store.committed, 1);
        assert_eq!(stats.store.head_version, 1);
        assert_eq!(stats.triggers, 1);
        assert_eq!(stats.default_strategy, "min_uncertainty");
        assert!(stats.strategies.contains(&"spanning_tree".to_string()));
    }
}
