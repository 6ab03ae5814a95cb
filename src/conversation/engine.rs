//! The conversation state machine.
//!
//! One engine instance serves every session; per-session data lives in the
//! `SessionStore`. Inbound events mutate the session and produce outbound
//! prompts; finalizing hands an immutable snapshot to the dispatch engine
//! on a background task, so a session can be reused (or cancelled) while a
//! broadcast is still running.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::dispatch::{DispatchEngine, ProgressSink};
use crate::phone::{extract_from_file, extract_from_text, PhoneNumber};
use crate::session::{SessionStore, Step};
use crate::transport::{InboundDocument, InboundEvent, MessageTransport, SendOptions};

use super::{keywords, prompts};

/// MIME types accepted for recipient-list uploads.
const ACCEPTED_MIME: [&str; 3] = ["text/csv", "text/plain", "application/csv"];

/// File extensions accepted for recipient-list uploads.
const ACCEPTED_EXTENSIONS: [&str; 2] = ["csv", "txt"];

pub struct ConversationEngine {
    store: Arc<SessionStore>,
    transport: Arc<dyn MessageTransport>,
    dispatcher: Arc<DispatchEngine>,
    access_secret: SecretString,
    download_dir: PathBuf,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn MessageTransport>,
        dispatcher: Arc<DispatchEngine>,
        access_secret: SecretString,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            transport,
            dispatcher,
            access_secret,
            download_dir,
        }
    }

    /// Handle one inbound event for its session.
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Text(msg) => self.handle_text(&msg.from, &msg.body).await,
            InboundEvent::Document(doc) => self.handle_document(&doc).await,
        }
    }

    async fn handle_text(&self, from: &str, body: &str) {
        let text = body.trim();

        if !self.store.is_authorized(from).await {
            // Unauthenticated callers get nothing except the welcome on the
            // correct secret. Cancellation included: a session that never
            // authorized has nothing to cancel.
            if text == self.access_secret.expose_secret() {
                self.store.authorize(from).await;
                self.store.update(from, |_| ()).await;
                self.reply(from, prompts::welcome()).await;
            }
            return;
        }

        if keywords::is_cancellation(text) {
            self.store.update(from, |s| s.reset()).await;
            self.store.revoke(from).await;
            self.reply(from, prompts::cancelled()).await;
            return;
        }

        let step = self.store.update(from, |s| s.step).await;

        if step.accepts_numbers() {
            self.handle_numbers_text(from, step, text).await;
        } else if step.accepts_messages() {
            self.handle_messages_text(from, text).await;
        } else if keywords::is_start(text) {
            self.store
                .update(from, |s| {
                    s.reset();
                    s.step = Step::WaitingNumbers;
                })
                .await;
            self.reply(from, prompts::ask_numbers()).await;
        } else {
            self.reply(from, prompts::idle_hint()).await;
        }
    }

    async fn handle_numbers_text(&self, from: &str, step: Step, text: &str) {
        if keywords::is_confirmation(text) {
            let total = self
                .store
                .update(from, |s| {
                    if s.numbers.is_empty() {
                        None
                    } else {
                        s.step = Step::WaitingMessages;
                        s.messages.clear();
                        Some(s.numbers.len())
                    }
                })
                .await;

            match total {
                Some(total) => self.reply(from, prompts::ask_messages(total)).await,
                None => self.reply(from, prompts::confirm_empty_numbers()).await,
            }
            return;
        }

        let extracted = extract_from_text(text);
        if extracted.is_empty() {
            let reprompt = match step {
                Step::WaitingNumbers => prompts::no_numbers_found(),
                _ => prompts::no_more_numbers_found(),
            };
            self.reply(from, reprompt).await;
            return;
        }

        self.merge_and_report(from, extracted).await;
    }

    async fn handle_messages_text(&self, from: &str, text: &str) {
        if keywords::is_send_trigger(text) {
            let snapshot = self
                .store
                .update(from, |s| {
                    if s.messages.is_empty() {
                        None
                    } else {
                        let snapshot = (s.numbers.clone(), s.messages.clone());
                        s.reset();
                        Some(snapshot)
                    }
                })
                .await;

            match snapshot {
                Some((numbers, messages)) => self.finalize(from, numbers, messages).await,
                None => self.reply(from, prompts::send_empty_queue()).await,
            }
            return;
        }

        let queue = self
            .store
            .update(from, |s| {
                s.push_message(text);
                s.step = Step::ConfirmingMessages;
                s.messages.clone()
            })
            .await;
        self.reply(from, prompts::queue_echo(&queue)).await;
    }

    async fn handle_document(&self, doc: &InboundDocument) {
        let from = doc.from.as_str();

        if !self.store.is_authorized(from).await {
            return;
        }

        let step = self.store.update(from, |s| s.step).await;
        if !step.accepts_numbers() {
            self.reply(from, prompts::not_expecting_document()).await;
            return;
        }

        if !is_supported_document(&doc.mime_type, &doc.file_name) {
            self.reply(from, prompts::unsupported_document()).await;
            return;
        }

        let path = match self.transport.save_document(doc, &self.download_dir).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(from, error = %e, "Document save failed");
                self.reply(from, prompts::document_failed()).await;
                return;
            }
        };

        let extracted = match extract_from_file(&path).await {
            Ok(numbers) => numbers,
            Err(e) => {
                tracing::warn!(from, path = %path.display(), error = %e, "Document extraction failed");
                self.reply(from, prompts::document_failed()).await;
                return;
            }
        };

        self.merge_and_report(from, extracted).await;
    }

    /// Merge extracted numbers into the session and report the running
    /// state. Used by both text and file ingestion.
    async fn merge_and_report(&self, from: &str, extracted: Vec<PhoneNumber>) {
        let (added, numbers) = self
            .store
            .update(from, |s| {
                let added = s.merge_numbers(extracted);
                s.step = Step::ConfirmingNumbers;
                (added, s.numbers.clone())
            })
            .await;
        self.reply(from, prompts::numbers_added(added, &numbers)).await;
    }

    /// Kick off the broadcast on a background task and acknowledge
    /// immediately. The snapshot lists are already decoupled from the
    /// session, which was reset before this point.
    async fn finalize(&self, from: &str, numbers: Vec<PhoneNumber>, messages: Vec<String>) {
        self.reply(from, prompts::dispatch_started(numbers.len(), messages.len()))
            .await;

        let dispatcher = Arc::clone(&self.dispatcher);
        let transport = Arc::clone(&self.transport);
        let chat = from.to_string();

        tokio::spawn(async move {
            let progress: ProgressSink = Box::new(|completed, total| {
                tracing::debug!(completed, total, "Dispatch progress");
            });
            let report = dispatcher
                .dispatch_bulk(&numbers, &messages, Some(progress))
                .await;

            let summary = prompts::dispatch_summary(&report);
            if let Err(e) = transport
                .send_message(&chat, &summary, &SendOptions::default())
                .await
            {
                tracing::warn!(chat = %chat, error = %e, "Failed to deliver dispatch summary");
            }
        });
    }

    async fn reply(&self, to: &str, body: String) {
        if let Err(e) = self
            .transport
            .send_message(to, &body, &SendOptions::default())
            .await
        {
            tracing::warn!(to, error = %e, "Failed to send reply");
        }
    }
}

/// Uploads are accepted by MIME type or, failing that, by extension.
fn is_supported_document(mime_type: &str, file_name: &str) -> bool {
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if ACCEPTED_MIME.contains(&mime.as_str()) {
        return true;
    }
    Path::new(&file_name.to_ascii_lowercase())
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::dispatch::JitterPolicy;
    use crate::error::TransportError;
    use crate::transport::EventStream;

    /// Transport that records outbound messages and serves scripted
    /// document content.
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
        document_content: Option<Vec<u8>>,
        fail_saves: bool,
        dir: tempfile::TempDir,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                document_content: None,
                fail_saves: false,
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn with_document(content: &[u8]) -> Self {
            Self {
                document_content: Some(content.to_vec()),
                ..Self::new()
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }

        fn last_reply(&self) -> Option<String> {
            self.sent.lock().unwrap().last().map(|(_, body)| body.clone())
        }
    }

    #[async_trait]
    impl MessageTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn start(&self) -> Result<EventStream, TransportError> {
            unimplemented!("not used in engine tests")
        }

        async fn send_message(
            &self,
            to: &str,
            body: &str,
            _options: &SendOptions,
        ) -> Result<(), TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(())
        }

        async fn save_document(
            &self,
            doc: &InboundDocument,
            dest_dir: &Path,
        ) -> Result<PathBuf, TransportError> {
            if self.fail_saves {
                return Err(TransportError::SaveFailed("scripted".into()));
            }
            let content = self
                .document_content
                .clone()
                .ok_or_else(|| TransportError::SaveFailed("no scripted content".into()))?;
            let path = dest_dir.join(&doc.file_name);
            std::fs::create_dir_all(dest_dir).unwrap();
            std::fs::write(&path, content).unwrap();
            Ok(path)
        }

        async fn blacklist_add(&self, _number: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn blacklist_remove(&self, _number: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn blacklist_list(&self) -> Result<Vec<String>, TransportError> {
            Ok(vec![])
        }

        async fn health_check(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    const SECRET: &str = "clave-secreta";
    const CHAT: &str = "51987000001";

    fn engine_with(transport: Arc<RecordingTransport>) -> (ConversationEngine, Arc<SessionStore>) {
        let store = SessionStore::new(Duration::from_secs(3600));
        let download_dir = transport.dir.path().to_path_buf();
        let dispatcher = Arc::new(DispatchEngine::new(
            Arc::clone(&transport) as Arc<dyn MessageTransport>,
            JitterPolicy::zero(),
        ));
        let engine = ConversationEngine::new(
            Arc::clone(&store),
            Arc::clone(&transport) as Arc<dyn MessageTransport>,
            dispatcher,
            SecretString::from(SECRET.to_string()),
            download_dir,
        );
        (engine, store)
    }

    async fn say(engine: &ConversationEngine, body: &str) {
        engine
            .handle(InboundEvent::Text(crate::transport::InboundMessage {
                from: CHAT.to_string(),
                body: body.to_string(),
            }))
            .await;
    }

    async fn authorize_and_start(engine: &ConversationEngine) {
        say(engine, SECRET).await;
        say(engine, "spam").await;
    }

    // ── Authorization gate ──────────────────────────────────────────

    #[tokio::test]
    async fn unauthorized_text_gets_no_reply() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        say(&engine, "hola").await;
        say(&engine, "spam").await;

        assert!(transport.sent().is_empty());
        assert!(!store.is_authorized(CHAT).await);
    }

    #[tokio::test]
    async fn unauthorized_cancellation_is_a_silent_noop() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        say(&engine, "cancelar").await;

        assert!(transport.sent().is_empty());
        assert!(!store.is_authorized(CHAT).await);
    }

    #[tokio::test]
    async fn correct_secret_authorizes_and_welcomes() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        say(&engine, SECRET).await;

        assert!(store.is_authorized(CHAT).await);
        assert!(transport.last_reply().unwrap().contains("Acceso concedido"));
    }

    // ── Number collection ───────────────────────────────────────────

    #[tokio::test]
    async fn start_keyword_moves_to_waiting_numbers() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;

        assert_eq!(store.snapshot(CHAT).await.step, Step::WaitingNumbers);
        assert!(transport.last_reply().unwrap().contains("números"));
    }

    #[tokio::test]
    async fn text_numbers_merge_and_confirm_state() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "987654321, 912345678").await;

        let snap = store.snapshot(CHAT).await;
        assert_eq!(snap.step, Step::ConfirmingNumbers);
        assert_eq!(snap.numbers.len(), 2);
        assert!(transport.last_reply().unwrap().contains("Total: 2"));
    }

    #[tokio::test]
    async fn repeated_numbers_add_zero() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "987654321").await;
        say(&engine, "51987654321").await;

        let snap = store.snapshot(CHAT).await;
        assert_eq!(snap.numbers.len(), 1);
        assert!(transport.last_reply().unwrap().contains("0 número(s) nuevo(s)"));
    }

    #[tokio::test]
    async fn gibberish_reprompts_without_transition() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "qué tal?").await;

        assert_eq!(store.snapshot(CHAT).await.step, Step::WaitingNumbers);
        assert!(transport
            .last_reply()
            .unwrap()
            .contains("No encontré números válidos"));
    }

    #[tokio::test]
    async fn confirm_with_empty_list_reprompts() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "confirmar").await;

        assert_eq!(store.snapshot(CHAT).await.step, Step::WaitingNumbers);
        assert!(transport.last_reply().unwrap().contains("vacía"));
    }

    #[tokio::test]
    async fn confirm_with_numbers_moves_to_messages() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "987654321").await;
        say(&engine, "listo").await;

        let snap = store.snapshot(CHAT).await;
        assert_eq!(snap.step, Step::WaitingMessages);
        assert!(snap.messages.is_empty());
    }

    // ── Message collection ──────────────────────────────────────────

    #[tokio::test]
    async fn messages_queue_and_echo() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "987654321").await;
        say(&engine, "confirmar").await;
        say(&engine, "Primer aviso").await;
        say(&engine, "Segundo aviso").await;

        let snap = store.snapshot(CHAT).await;
        assert_eq!(snap.step, Step::ConfirmingMessages);
        assert_eq!(snap.messages.len(), 2);
        let echo = transport.last_reply().unwrap();
        assert!(echo.contains("1. Primer aviso"));
        assert!(echo.contains("2. Segundo aviso"));
    }

    #[tokio::test]
    async fn send_trigger_with_empty_queue_reprompts_and_does_not_dispatch() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "987654321").await;
        say(&engine, "confirmar").await;
        let sends_before = transport.sent().len();

        say(&engine, "ENVIAR").await;

        assert_eq!(store.snapshot(CHAT).await.step, Step::WaitingMessages);
        assert!(transport.last_reply().unwrap().contains("No hay mensajes"));
        // Only the reprompt itself went out: nothing was dispatched.
        assert_eq!(transport.sent().len(), sends_before + 1);
    }

    #[tokio::test]
    async fn lowercase_send_trigger_is_queued_as_a_message() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "987654321").await;
        say(&engine, "confirmar").await;
        say(&engine, "enviar").await;

        let snap = store.snapshot(CHAT).await;
        assert_eq!(snap.messages, vec!["enviar"]);
    }

    // ── Finalize ────────────────────────────────────────────────────

    #[tokio::test]
    async fn send_trigger_dispatches_and_reports_summary() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "987654321, 912345678").await;
        say(&engine, "confirmar").await;
        say(&engine, "Hola!").await;
        say(&engine, "ENVIAR").await;

        // Session resets immediately; authorization survives.
        let snap = store.snapshot(CHAT).await;
        assert_eq!(snap.step, Step::Idle);
        assert!(snap.numbers.is_empty());
        assert!(store.is_authorized(CHAT).await);

        // The spawned dispatch delivers to both recipients and then sends
        // the summary back to the chat.
        let summary = wait_for_reply(&transport, "Difusión terminada").await;
        assert!(summary.contains("Enviados: 2"));

        let sent = transport.sent();
        assert!(sent.iter().any(|(to, body)| to == "51987654321" && body == "Hola!"));
        assert!(sent.iter().any(|(to, body)| to == "51912345678" && body == "Hola!"));
    }

    /// Poll the recorded sends until one contains `needle`.
    async fn wait_for_reply(transport: &RecordingTransport, needle: &str) -> String {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(body) = transport
                    .sent()
                    .iter()
                    .map(|(_, body)| body.clone())
                    .find(|body| body.contains(needle))
                {
                    return body;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("expected reply did not arrive")
    }

    // ── Cancellation ────────────────────────────────────────────────

    #[tokio::test]
    async fn cancellation_resets_and_revokes() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        say(&engine, "987654321").await;
        say(&engine, "cancelar").await;

        let snap = store.snapshot(CHAT).await;
        assert_eq!(snap.step, Step::Idle);
        assert!(snap.numbers.is_empty());
        assert!(!store.is_authorized(CHAT).await);
        assert!(transport.last_reply().unwrap().contains("cancelada"));
    }

    // ── Documents ───────────────────────────────────────────────────

    fn document(file_name: &str, mime_type: &str) -> InboundDocument {
        InboundDocument {
            from: CHAT.to_string(),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            media_url: "http://gw.local/media/1".to_string(),
        }
    }

    #[tokio::test]
    async fn csv_upload_merges_numbers() {
        let transport = Arc::new(RecordingTransport::with_document(
            b"987654321,Juan\n912345678,Ana\n987654321,dup\n",
        ));
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        engine
            .handle(InboundEvent::Document(document("numeros.csv", "text/csv")))
            .await;

        let snap = store.snapshot(CHAT).await;
        assert_eq!(snap.step, Step::ConfirmingNumbers);
        assert_eq!(snap.numbers.len(), 2);
        assert!(transport.last_reply().unwrap().contains("2 número(s) nuevo(s)"));
    }

    #[tokio::test]
    async fn document_outside_number_collection_is_noticed() {
        let transport = Arc::new(RecordingTransport::with_document(b"987654321\n"));
        let (engine, store) = engine_with(Arc::clone(&transport));

        say(&engine, SECRET).await;
        engine
            .handle(InboundEvent::Document(document("numeros.csv", "text/csv")))
            .await;

        assert_eq!(store.snapshot(CHAT).await.step, Step::Idle);
        assert!(transport
            .last_reply()
            .unwrap()
            .contains("No estoy esperando un documento"));
    }

    #[tokio::test]
    async fn unsupported_document_is_rejected_without_transition() {
        let transport = Arc::new(RecordingTransport::with_document(b"binary"));
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        engine
            .handle(InboundEvent::Document(document("foto.jpg", "image/jpeg")))
            .await;

        assert_eq!(store.snapshot(CHAT).await.step, Step::WaitingNumbers);
        assert!(transport
            .last_reply()
            .unwrap()
            .contains("Formato no soportado"));
    }

    #[tokio::test]
    async fn failed_save_reports_error_without_transition() {
        let mut inner = RecordingTransport::new();
        inner.fail_saves = true;
        let transport = Arc::new(inner);
        let (engine, store) = engine_with(Arc::clone(&transport));

        authorize_and_start(&engine).await;
        engine
            .handle(InboundEvent::Document(document("numeros.csv", "text/csv")))
            .await;

        assert_eq!(store.snapshot(CHAT).await.step, Step::WaitingNumbers);
        assert!(transport.last_reply().unwrap().contains("No pude procesar"));
    }

    #[tokio::test]
    async fn unauthorized_document_gets_no_reply() {
        let transport = Arc::new(RecordingTransport::with_document(b"987654321\n"));
        let (engine, _store) = engine_with(Arc::clone(&transport));

        engine
            .handle(InboundEvent::Document(document("numeros.csv", "text/csv")))
            .await;

        assert!(transport.sent().is_empty());
    }

    // ── Document type detection ─────────────────────────────────────

    #[test]
    fn supported_documents() {
        assert!(is_supported_document("text/csv", "numeros.csv"));
        assert!(is_supported_document("text/plain; charset=utf-8", "lista"));
        assert!(is_supported_document("application/octet-stream", "lista.TXT"));
        assert!(!is_supported_document("image/jpeg", "foto.jpg"));
        assert!(!is_supported_document("application/pdf", "doc.pdf"));
    }
}
