//! Shared test support utilities
//!
//! Stub remote clients and recording sinks used by unit and integration tests.
//! Every stub counts its calls so tests can assert on fan-out.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::app::{ComponentRegistry, ServiceSettings};
use crate::clients::{ActivityApi, MemberApi, RemoteClients, RemoteError, TimelineApi};
use crate::domain::{ActivityRequest, DeadLetter, MemberSummary, PostItemCounts};
use crate::observability::{Telemetry, metrics::Metrics};
use crate::publish::{ActivityDispatcher, ActivityPublisher, PublishError, PublishType};
use crate::service::{CommentService, PostService};
use crate::store::{DeadLetterDao, Stores, memory::MemoryStore};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Member service stub that knows a fixed set of ids.
pub struct StubMemberApi {
    known: BTreeSet<i64>,
    calls: AtomicUsize,
    should_fail: AtomicBool,
}

impl StubMemberApi {
    pub fn with_members(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            known: ids.into_iter().collect(),
            calls: AtomicUsize::new(0),
            should_fail: AtomicBool::new(false),
        }
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn summary(id: i64) -> MemberSummary {
        MemberSummary {
            id,
            member_name: format!("member-{id}"),
            display_name: Some(format!("Member {id}")),
            member_handle: Some(format!("@member{id}")),
            avatar_url: None,
        }
    }
}

#[async_trait]
impl MemberApi for StubMemberApi {
    async fn member_summary(
        &self,
        member_id: i64,
        _token: Option<&str>,
    ) -> Result<MemberSummary, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Failed {
                service: "member",
                source: anyhow::anyhow!("mock member failure"),
            });
        }
        if self.known.contains(&member_id) {
            Ok(Self::summary(member_id))
        } else {
            Err(RemoteError::NotFound { service: "member" })
        }
    }
}

/// Timeline service stub returning the same counts for every post.
pub struct StubTimelineApi {
    counts: PostItemCounts,
    should_fail: AtomicBool,
}

impl StubTimelineApi {
    pub fn with_counts(like_count: i64, comment_count: i64) -> Self {
        Self {
            counts: PostItemCounts {
                like_count,
                comment_count,
            },
            should_fail: AtomicBool::new(false),
        }
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }
}

impl Default for StubTimelineApi {
    fn default() -> Self {
        Self::with_counts(0, 0)
    }
}

#[async_trait]
impl TimelineApi for StubTimelineApi {
    async fn post_item_counts(
        &self,
        _post_id: i64,
        _token: Option<&str>,
    ) -> Result<PostItemCounts, RemoteError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Failed {
                service: "timeline",
                source: anyhow::anyhow!("mock timeline failure"),
            });
        }
        Ok(self.counts)
    }
}

/// Member-activity API mock that captures sent requests.
#[derive(Default)]
pub struct RecordingActivityApi {
    sent: Mutex<Vec<(ActivityRequest, Option<String>)>>,
    should_fail: AtomicBool,
    throttled: AtomicBool,
}

impl RecordingActivityApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_throttled(&self, throttled: bool) {
        self.throttled.store(throttled, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ActivityRequest> {
        guard(&self.sent)
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        guard(&self.sent)
            .iter()
            .map(|(_, token)| token.clone())
            .collect()
    }
}

#[async_trait]
impl ActivityApi for RecordingActivityApi {
    async fn send(
        &self,
        request: &ActivityRequest,
        token: Option<&str>,
    ) -> Result<(), RemoteError> {
        if self.throttled.load(Ordering::SeqCst) {
            return Err(RemoteError::TooManyRequests("member-activity"));
        }
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Failed {
                service: "member-activity",
                source: anyhow::anyhow!("mock activity failure"),
            });
        }
        guard(&self.sent).push((request.clone(), token.map(str::to_string)));
        Ok(())
    }
}

/// Queue publisher mock that captures published requests.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<ActivityRequest>>,
    should_fail: AtomicBool,
    throttled: AtomicBool,
    key_failure: AtomicBool,
    purges: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_throttled(&self, throttled: bool) {
        self.throttled.store(throttled, Ordering::SeqCst);
    }

    pub fn set_key_failure(&self, fail: bool) {
        self.key_failure.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<ActivityRequest> {
        guard(&self.published).clone()
    }

    pub fn purges(&self) -> usize {
        self.purges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivityPublisher for RecordingPublisher {
    async fn publish(&self, request: &ActivityRequest) -> Result<(), PublishError> {
        if self.key_failure.load(Ordering::SeqCst) {
            return Err(PublishError::KeyCreation(
                "mock message key failure".to_string(),
            ));
        }
        if self.throttled.load(Ordering::SeqCst) {
            return Err(PublishError::TooManyRequests);
        }
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable(anyhow::anyhow!(
                "mock queue failure"
            )));
        }
        guard(&self.published).push(request.clone());
        Ok(())
    }

    async fn purge_expired(&self, _retention: Duration) -> anyhow::Result<u64> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

/// Dead letter store whose writes always fail.
#[derive(Default)]
pub struct FailingDeadLetterDao;

#[async_trait]
impl DeadLetterDao for FailingDeadLetterDao {
    async fn insert(&self, _letter: &DeadLetter) -> anyhow::Result<()> {
        anyhow::bail!("mock dead letter store failure")
    }

    async fn claim_pending(
        &self,
        _limit: u32,
        _max_attempts: u32,
        _lease: Duration,
    ) -> anyhow::Result<Vec<DeadLetter>> {
        anyhow::bail!("mock dead letter store failure")
    }

    async fn mark_completed(&self, _id: Uuid) -> anyhow::Result<()> {
        anyhow::bail!("mock dead letter store failure")
    }

    async fn release(&self, _id: Uuid, _error: &str) -> anyhow::Result<()> {
        anyhow::bail!("mock dead letter store failure")
    }

    async fn find_by_message_key(&self, _message_key: &str) -> anyhow::Result<Vec<DeadLetter>> {
        anyhow::bail!("mock dead letter store failure")
    }
}

/// Remote clients built from the given stubs.
pub fn remote_clients(
    members: Arc<StubMemberApi>,
    timeline: Arc<StubTimelineApi>,
    activity: Arc<RecordingActivityApi>,
) -> RemoteClients {
    RemoteClients {
        members,
        timeline,
        activity,
    }
}

/// In-memory wiring with every stub exposed for assertions.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub members: Arc<StubMemberApi>,
    pub timeline: Arc<StubTimelineApi>,
    pub activity: Arc<RecordingActivityApi>,
    pub stores: Stores,
}

impl TestHarness {
    /// Members `1..=5` exist; the timeline reports zero counts.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            stores: Stores::memory(&store),
            store,
            members: Arc::new(StubMemberApi::with_members(1..=5)),
            timeline: Arc::new(StubTimelineApi::default()),
            activity: Arc::new(RecordingActivityApi::new()),
        }
    }

    /// Routes queue publishes to `publisher` instead of the memory outbox.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn ActivityPublisher>) -> Self {
        self.stores.outbox = publisher;
        self
    }

    #[must_use]
    pub fn with_dead_letters(mut self, dead_letters: Arc<dyn DeadLetterDao>) -> Self {
        self.stores.dead_letters = dead_letters;
        self
    }

    #[must_use]
    pub fn with_timeline(mut self, timeline: Arc<StubTimelineApi>) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn remotes(&self) -> RemoteClients {
        remote_clients(
            Arc::clone(&self.members),
            Arc::clone(&self.timeline),
            Arc::clone(&self.activity),
        )
    }

    /// # Errors
    /// メトリクスの生成に失敗した場合。
    pub fn dispatcher(&self, publish_type: PublishType) -> anyhow::Result<ActivityDispatcher> {
        Ok(ActivityDispatcher::new(
            publish_type,
            Arc::clone(&self.stores.outbox),
            Arc::clone(&self.activity) as Arc<dyn ActivityApi>,
            Arc::clone(&self.stores.dead_letters),
            Arc::new(Metrics::detached()?),
        ))
    }

    /// # Errors
    /// メトリクスの生成に失敗した場合。
    pub fn post_service(&self, publish_type: PublishType) -> anyhow::Result<PostService> {
        Ok(PostService::new(
            self.stores.clone(),
            self.remotes(),
            self.dispatcher(publish_type)?,
            Arc::new(Metrics::detached()?),
        ))
    }

    /// # Errors
    /// メトリクスの生成に失敗した場合。
    pub fn comment_service(
        &self,
        publish_type: PublishType,
        max_depth: i32,
    ) -> anyhow::Result<CommentService> {
        Ok(CommentService::new(
            self.stores.clone(),
            self.remotes(),
            self.dispatcher(publish_type)?,
            Arc::new(Metrics::detached()?),
            max_depth,
        ))
    }

    /// # Errors
    /// Telemetry の初期化に失敗した場合。
    pub fn registry(&self, settings: ServiceSettings) -> anyhow::Result<ComponentRegistry> {
        Ok(ComponentRegistry::assemble(
            Telemetry::new()?,
            self.stores.clone(),
            self.remotes(),
            settings,
            None,
        ))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
