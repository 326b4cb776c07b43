use gemini_bot_core::adapter::{
    MessageAdapter, TextOutcome, CLEAR_CONFIRMATION, VISION_PLACEHOLDER,
};
use gemini_bot_core::config::GeminiSettings;
use gemini_bot_core::llm::{Content, GenerativeModel, LlmError, ModelSpec};
use gemini_bot_core::transport::{
    ChatTransport, IncomingMessage, PhotoVariant, ReplyFormat, SentMessage, TransportError,
};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Echoes the prompt and records the history length of every call
#[derive(Default)]
struct EchoModel {
    history_lens: Mutex<Vec<usize>>,
    vision_calls: AtomicUsize,
}

#[async_trait::async_trait]
impl GenerativeModel for EchoModel {
    async fn chat_completion(
        &self,
        model: &ModelSpec,
        history: &[Content],
        user_message: &str,
    ) -> Result<String, LlmError> {
        assert!(model.generation.is_some());
        self.history_lens
            .lock()
            .expect("lock")
            .push(history.len());
        Ok(format!("echo {user_message}"))
    }

    async fn analyze_image(
        &self,
        _model: &ModelSpec,
        image_bytes: Vec<u8>,
        _mime_type: &str,
        _text_prompt: &str,
    ) -> Result<String, LlmError> {
        self.vision_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} bytes", image_bytes.len()))
    }
}

/// Records every transport call
#[derive(Default)]
struct RecordingTransport {
    replies: Mutex<Vec<(String, ReplyFormat)>>,
    deleted: Mutex<Vec<i32>>,
    next_id: AtomicI32,
    fail_downloads: bool,
}

#[async_trait::async_trait]
impl ChatTransport for RecordingTransport {
    async fn reply(
        &self,
        to: &IncomingMessage,
        text: &str,
        format: ReplyFormat,
    ) -> Result<SentMessage, TransportError> {
        self.replies
            .lock()
            .expect("lock")
            .push((text.to_string(), format));
        Ok(SentMessage {
            chat_id: to.chat_id,
            message_id: 100 + self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        if self.fail_downloads {
            return Err(TransportError::Download(format!("{file_id} unavailable")));
        }
        Ok(vec![0u8; file_id.len()])
    }

    async fn delete_message(&self, message: &SentMessage) -> Result<(), TransportError> {
        self.deleted.lock().expect("lock").push(message.message_id);
        Ok(())
    }
}

fn text_from(sender_id: i64, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: 1,
        message_id: 1,
        sender_id,
        text: Some(text.to_string()),
        ..IncomingMessage::default()
    }
}

fn photo_from(sender_id: i64) -> IncomingMessage {
    IncomingMessage {
        chat_id: 1,
        message_id: 2,
        sender_id,
        caption: Some("/gemini".to_string()),
        photo: vec![
            PhotoVariant {
                file_id: "small".to_string(),
                file_size: 10,
                width: 90,
                height: 90,
            },
            PhotoVariant {
                file_id: "largest-file".to_string(),
                file_size: 900,
                width: 1280,
                height: 1280,
            },
        ],
        ..IncomingMessage::default()
    }
}

#[tokio::test]
async fn test_long_conversation_stays_bounded() {
    let model = Arc::new(EchoModel::default());
    let adapter = MessageAdapter::new(model.clone(), &GeminiSettings::default());
    let transport = RecordingTransport::default();

    for i in 0..20 {
        let outcome = adapter
            .handle_text(&text_from(7, &format!("/gemini question {i}")), &transport)
            .await
            .expect("answered");
        assert!(matches!(outcome, TextOutcome::Answered(_)));
    }

    let lens = model.history_lens.lock().expect("lock").clone();
    assert_eq!(lens.len(), 20);
    assert!(lens.iter().all(|&len| len <= 10));
    assert_eq!(&lens[..6], &[0, 2, 4, 6, 8, 10]);
    // Once the window is full every call sees 10 prior turns
    assert!(lens[6..].iter().all(|&len| len == 10));
}

#[tokio::test]
async fn test_users_have_independent_histories() {
    let model = Arc::new(EchoModel::default());
    let adapter = MessageAdapter::new(model.clone(), &GeminiSettings::default());
    let transport = RecordingTransport::default();

    adapter
        .handle_text(&text_from(1, "gemini: a"), &transport)
        .await
        .expect("answered");
    adapter
        .handle_text(&text_from(1, "gemini: b"), &transport)
        .await
        .expect("answered");
    adapter
        .handle_text(&text_from(2, "gemini: c"), &transport)
        .await
        .expect("answered");
    adapter
        .handle_text(&text_from(2, "/gemini clear"), &transport)
        .await
        .expect("cleared");

    assert_eq!(*model.history_lens.lock().expect("lock"), vec![0, 2, 0]);
    assert_eq!(adapter.sessions().len().await, 2);

    let first = adapter.sessions().get("1").await.expect("user 1");
    assert_eq!(first.lock().await.history().len(), 4);
    let second = adapter.sessions().get("2").await.expect("user 2");
    assert!(second.lock().await.history().is_empty());

    let replies = transport.replies.lock().expect("lock");
    assert_eq!(replies.last().map(|(t, _)| t.as_str()), Some(CLEAR_CONFIRMATION));
}

#[tokio::test]
async fn test_concurrent_users_do_not_interfere() {
    let model = Arc::new(EchoModel::default());
    let adapter = Arc::new(MessageAdapter::new(model.clone(), &GeminiSettings::default()));
    let transport = Arc::new(RecordingTransport::default());

    let mut tasks = Vec::new();
    for user in 0..8_i64 {
        let adapter = adapter.clone();
        let transport = transport.clone();
        tasks.push(tokio::spawn(async move {
            for turn in 0..3 {
                adapter
                    .handle_text(&text_from(user, &format!("/gemini {turn}")), transport.as_ref())
                    .await
                    .expect("answered");
            }
        }));
    }
    for task in tasks {
        task.await.expect("task completes");
    }

    assert_eq!(adapter.sessions().len().await, 8);
    for user in 0..8 {
        let handle = adapter
            .sessions()
            .get(&user.to_string())
            .await
            .expect("handle exists");
        assert_eq!(handle.lock().await.history().len(), 6);
    }
}

#[tokio::test]
async fn test_photo_flow_deletes_placeholder() {
    let model = Arc::new(EchoModel::default());
    let adapter = MessageAdapter::new(model.clone(), &GeminiSettings::default());
    let transport = RecordingTransport::default();

    adapter
        .handle_photo(&photo_from(3), &transport)
        .await
        .expect("vision answer");

    let replies = transport.replies.lock().expect("lock").clone();
    assert_eq!(replies[0].0, VISION_PLACEHOLDER);
    // "largest-file" is 12 bytes long
    assert_eq!(replies[1].0, "Gemini vision answer:\n12 bytes");
    assert_eq!(*transport.deleted.lock().expect("lock"), vec![100]);
    assert_eq!(model.vision_calls.load(Ordering::SeqCst), 1);
    assert!(adapter.sessions().is_empty().await);
}

#[tokio::test]
async fn test_failed_download_still_deletes_placeholder() {
    let model = Arc::new(EchoModel::default());
    let adapter = MessageAdapter::new(model.clone(), &GeminiSettings::default());
    let transport = RecordingTransport {
        fail_downloads: true,
        ..RecordingTransport::default()
    };

    let result = adapter.handle_photo(&photo_from(3), &transport).await;

    assert!(result.is_err());
    assert_eq!(*transport.deleted.lock().expect("lock"), vec![100]);
    assert_eq!(model.vision_calls.load(Ordering::SeqCst), 0);
    assert_eq!(transport.replies.lock().expect("lock").len(), 1);
}
