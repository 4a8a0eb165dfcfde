use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::errors::CoreError;
use crate::events::{DiffContext, SessionEvent};
use crate::extract::ExtractionResult;
use crate::prompt::build_user_prompt;
use crate::session::{GenerationSession, SessionState};
use crate::transport::{HttpTransport, Transport, TransportRequest};

const DEFAULT_EVENT_BUFFER: usize = 128;

/// Handle used to abandon a running generation.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// No events are delivered once the request is observed, and `finish()`
    /// returns `CoreError::Cancelled`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Starts generation sessions against one immutable configuration.
#[derive(Clone)]
pub struct Generator {
    config: Arc<GenerationConfig>,
    transport: Arc<dyn Transport>,
    event_buffer: usize,
}

impl Generator {
    /// Creates a generator with the default HTTP transport.
    ///
    /// Fails with `ConfigurationMissing` when no API key is configured.
    pub fn new(config: GenerationConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)
            .map_err(|e| CoreError::ConfigurationMissing(e.to_string()))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a generator that reads chunks from `transport`.
    pub fn with_transport(config: GenerationConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Sets the bounded event buffer between the session task and the consumer.
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Validates the configuration and starts one session in a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, context: DiffContext) -> Result<GenerationStream, CoreError> {
        self.config.validate()?;

        let user_prompt = build_user_prompt(&context.diff, &context.commits);
        let session = GenerationSession::new(self.config.provider_family, context);
        let session_id = session.id();
        let request = TransportRequest::from_config(session_id, &self.config, user_prompt);

        let (tx, rx) = mpsc::channel(self.event_buffer);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);

        tokio::spawn(session_task(
            self.transport.clone(),
            session,
            request,
            tx,
            final_tx,
            abort_rx,
        ));

        Ok(GenerationStream {
            session_id,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        })
    }

    /// Runs one session to completion and returns its extraction result.
    pub async fn generate(&self, context: DiffContext) -> Result<ExtractionResult, CoreError> {
        self.start(context)?.finish().await
    }
}

/// Live event feed for one session.
///
/// Use `next_event()` to follow the stream and `finish()` to obtain the
/// result after the terminal event.
pub struct GenerationStream {
    session_id: uuid::Uuid,
    rx: mpsc::Receiver<SessionEvent>,
    final_rx: oneshot::Receiver<Result<ExtractionResult, CoreError>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl GenerationStream {
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns a handle that can cancel the session.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event; `None` once the session task has stopped or
    /// the session was aborted.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if *self.abort_handle.tx.borrow() {
            self.rx.close();
            return None;
        }
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(SessionEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events and returns the session outcome.
    pub async fn finish(mut self) -> Result<ExtractionResult, CoreError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(CoreError::protocol_msg(format!(
                "session task {} ended without a result",
                self.session_id
            ))),
        }
    }
}

async fn session_task(
    transport: Arc<dyn Transport>,
    mut session: GenerationSession,
    request: TransportRequest,
    tx: mpsc::Sender<SessionEvent>,
    final_tx: oneshot::Sender<Result<ExtractionResult, CoreError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let session_id = session.id();
    let family = session.family();

    if !send_all(&tx, session.start()).await {
        let _ = final_tx.send(Err(CoreError::protocol_msg(
            "event receiver dropped before stream start",
        )));
        return;
    }

    let opened = tokio::select! {
        _ = wait_for_abort(&mut abort_rx) => None,
        opened = transport.open(request) => Some(opened),
    };
    let mut chunks = match opened {
        None => {
            session.cancel();
            let _ = final_tx.send(Err(CoreError::Cancelled));
            return;
        }
        Some(Ok(chunks)) => chunks,
        Some(Err(err)) => {
            let _ = send_all(&tx, session.fail(&err)).await;
            let _ = final_tx.send(Err(CoreError::Failed(err)));
            return;
        }
    };

    let mut chunk_count = 0_u64;
    loop {
        let events = tokio::select! {
            _ = wait_for_abort(&mut abort_rx) => {
                session.cancel();
                debug!(session_id = %session_id, chunk_count, "session aborted by caller");
                let _ = final_tx.send(Err(CoreError::Cancelled));
                return;
            }
            next = chunks.next() => match next {
                Some(Ok(chunk)) => {
                    chunk_count = chunk_count.saturating_add(1);
                    session.ingest(&chunk)
                }
                Some(Err(err)) => {
                    let events = session.fail(&err);
                    let _ = send_all(&tx, events).await;
                    let _ = final_tx.send(Err(CoreError::Failed(err)));
                    return;
                }
                None => {
                    debug!(session_id = %session_id, family = %family, chunk_count, "transport ended");
                    session.end_of_stream()
                }
            },
        };

        if !send_all(&tx, events).await {
            session.cancel();
            let outcome = if *abort_rx.borrow() {
                CoreError::Cancelled
            } else {
                CoreError::protocol_msg("event receiver dropped during stream")
            };
            let _ = final_tx.send(Err(outcome));
            return;
        }

        if session.state() == SessionState::Done {
            let result = session
                .result()
                .cloned()
                .ok_or_else(|| CoreError::protocol_msg("session finished without a result"));
            let _ = final_tx.send(result);
            return;
        }
    }
}

/// Resolves once an abort has been requested; pends forever if the handle is gone.
async fn wait_for_abort(abort_rx: &mut watch::Receiver<bool>) {
    loop {
        if *abort_rx.borrow_and_update() {
            return;
        }
        if abort_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn send_all(tx: &mpsc::Sender<SessionEvent>, events: Vec<SessionEvent>) -> bool {
    for event in events {
        if tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderFamily;
    use crate::errors::{ProviderError, StatusCategory};
    use crate::transport::ChunkStream;
    use futures::stream;
    use std::sync::Mutex;

    enum FakeBehavior {
        OpenError(ProviderError),
        Chunks(Vec<Result<&'static str, ProviderError>>),
        Pending,
    }

    struct FakeTransport {
        behavior: FakeBehavior,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl FakeTransport {
        fn new(behavior: FakeBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn open(&self, request: TransportRequest) -> Result<ChunkStream, ProviderError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request);
            }
            match &self.behavior {
                FakeBehavior::OpenError(err) => Err(err.clone()),
                FakeBehavior::Chunks(chunks) => {
                    let items: Vec<Result<bytes::Bytes, ProviderError>> = chunks
                        .iter()
                        .map(|c| c.clone().map(|s| bytes::Bytes::from_static(s.as_bytes())))
                        .collect();
                    Ok(Box::pin(stream::iter(items)))
                }
                FakeBehavior::Pending => Ok(Box::pin(stream::pending::<
                    Result<bytes::Bytes, ProviderError>,
                >())),
            }
        }
    }

    fn config() -> GenerationConfig {
        GenerationConfig::new(ProviderFamily::DeltaStyle, "sk-test")
    }

    fn context() -> DiffContext {
        DiffContext::new("feature/lockout", "+lock()")
            .files(vec!["src/login.rs".into()])
            .commits(vec!["abc123 add lockout".into()])
    }

    async fn collect(stream: &mut GenerationStream) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }
        events
    }

    const CHUNK_A: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"### 需求\\n登录失败重试限制。\\n\"}}]}\n\ndata: {\"choi";
    const CHUNK_B: &str = "ces\":[{\"delta\":{\"content\":\"### 测试用例\\n一、基础流程\\n用例1：输入错误密码三次后锁定账户\"}}]}\n\n";

    #[tokio::test]
    async fn streams_chunks_then_structured_result() {
        let transport = FakeTransport::new(FakeBehavior::Chunks(vec![Ok(CHUNK_A), Ok(CHUNK_B)]));
        let generator = Generator::with_transport(config(), transport.clone());
        let mut stream = generator.start(context()).expect("start");

        let events = collect(&mut stream).await;
        assert_eq!(events[0], SessionEvent::Loading { active: true });
        assert!(matches!(events[1], SessionEvent::StreamStart { .. }));
        let chunks: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StreamChunk { cumulative_text } => Some(cumulative_text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].starts_with(chunks[0]));
        assert!(matches!(events.last(), Some(SessionEvent::StreamEnd { .. })));

        let result = stream.finish().await.expect("result");
        assert_eq!(result.requirement, "登录失败重试限制。");
        assert_eq!(result.categories[0].cases[0].title, "输入错误密码三次后锁定账户");

        let seen = transport.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].user_prompt.contains("abc123 add lockout"));
        assert!(seen[0].user_prompt.contains("+lock()"));
    }

    #[tokio::test]
    async fn terminator_ends_session_before_transport_does() {
        let transport = FakeTransport::new(FakeBehavior::Chunks(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"需求：离线\"}}]}\n\ndata: [DONE]\n\n"),
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n"),
        ]));
        let generator = Generator::with_transport(config(), transport);
        let mut stream = generator.start(context()).expect("start");
        let events = collect(&mut stream).await;

        let chunk_count = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::StreamChunk { .. }))
            .count();
        assert_eq!(chunk_count, 1);
        assert!(matches!(events.last(), Some(SessionEvent::StreamEnd { .. })));
        let result = stream.finish().await.expect("result");
        assert_eq!(result.raw_text, "需求：离线");
        assert_eq!(result.requirement, "离线");
    }

    #[tokio::test]
    async fn open_failure_reports_single_error_event() {
        let transport = FakeTransport::new(FakeBehavior::OpenError(ProviderError::status(
            ProviderFamily::DeltaStyle,
            401,
            "bad key",
        )));
        let generator = Generator::with_transport(config(), transport);
        let mut stream = generator.start(context()).expect("start");
        let events = collect(&mut stream).await;

        let errors = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Error { .. }))
            .count();
        assert_eq!(errors, 1);
        assert!(matches!(events.last(), Some(SessionEvent::Error { .. })));
        assert!(matches!(
            stream.finish().await,
            Err(CoreError::Failed(ProviderError::Status {
                category: StatusCategory::Unauthorized,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn mid_stream_transport_error_fails_session() {
        let transport = FakeTransport::new(FakeBehavior::Chunks(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n"),
            Err(ProviderError::transport(ProviderFamily::DeltaStyle, "connection reset")),
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n"),
        ]));
        let generator = Generator::with_transport(config(), transport);
        let mut stream = generator.start(context()).expect("start");
        let events = collect(&mut stream).await;

        assert!(matches!(events.last(), Some(SessionEvent::Error { message }) if message.contains("connection reset")));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::StreamEnd { .. })));
        assert!(matches!(
            stream.finish().await,
            Err(CoreError::Failed(ProviderError::Transport { .. }))
        ));
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_session() {
        let transport = FakeTransport::new(FakeBehavior::Pending);
        let generator = Generator::with_transport(
            GenerationConfig::new(ProviderFamily::ContentBlock, "  "),
            transport.clone(),
        );
        let result = generator.start(context());
        assert!(matches!(result, Err(CoreError::ConfigurationMissing(_))));
        assert!(transport.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn abort_stops_event_delivery() {
        let transport = FakeTransport::new(FakeBehavior::Pending);
        let generator = Generator::with_transport(config(), transport);
        let mut stream = generator.start(context()).expect("start");

        assert_eq!(
            stream.next_event().await,
            Some(SessionEvent::Loading { active: true })
        );
        assert!(matches!(
            stream.next_event().await,
            Some(SessionEvent::StreamStart { .. })
        ));
        stream.abort_handle().abort();

        assert_eq!(stream.next_event().await, None);
        assert!(matches!(stream.finish().await, Err(CoreError::Cancelled)));
    }

    #[tokio::test]
    async fn generate_collects_result() {
        let transport = FakeTransport::new(FakeBehavior::Chunks(vec![Ok(CHUNK_A), Ok(CHUNK_B)]));
        let generator = Generator::with_transport(config(), transport).event_buffer(1);
        let result = generator.generate(context()).await.expect("result");
        assert_eq!(result.case_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_sessions_are_independent() {
        let generator = Generator::with_transport(
            config(),
            FakeTransport::new(FakeBehavior::Chunks(vec![Ok(CHUNK_A), Ok(CHUNK_B)])),
        );
        let (a, b) = tokio::join!(generator.generate(context()), generator.generate(context()));
        let a = a.expect("first");
        let b = b.expect("second");
        assert_eq!(a, b);
        assert_eq!(a.raw_text.matches("### 需求").count(), 1);
    }
}
