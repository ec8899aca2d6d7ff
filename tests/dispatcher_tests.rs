use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use imagewiki_bot::bot::{
    BotTransport, ConversationDispatcher, Dispatch, InlineButton, MenuCommand, MessageHandle,
};
use imagewiki_bot::encyclopedia::Encyclopedia;
use imagewiki_bot::errors::{GenerationError, LookupError};
use imagewiki_bot::image_job::ImageGenerator;
use imagewiki_bot::localization::{t, t_args};
use imagewiki_bot::user_state::{Expectation, InMemoryUserStore, UserId, UserRepository};

const USER: UserId = 42;

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text(String),
    Menu(String),
    Photo(PathBuf),
    Actions(String, Vec<Vec<InlineButton>>),
    Deleted(MessageHandle),
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(UserId, Sent)>>,
    next_id: AtomicI32,
    /// Number of upcoming photo sends to reject
    rejected_photos: AtomicUsize,
}

impl RecordingTransport {
    fn record(&self, user: UserId, event: Sent) {
        self.sent.lock().unwrap().push((user, event));
    }

    fn events(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    fn texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Sent::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn photos(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Sent::Photo(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn actions(&self) -> Vec<(String, Vec<Vec<InlineButton>>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Sent::Actions(text, rows) => Some((text, rows)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl BotTransport for RecordingTransport {
    async fn send_text(&self, user: UserId, text: &str) -> Result<MessageHandle> {
        self.record(user, Sent::Text(text.to_string()));
        Ok(MessageHandle(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn send_menu(&self, user: UserId, text: &str) -> Result<()> {
        self.record(user, Sent::Menu(text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, user: UserId, path: &Path) -> Result<()> {
        let rejected = self
            .rejected_photos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(anyhow!("Bad Request: file rejected"));
        }
        self.record(user, Sent::Photo(path.to_path_buf()));
        Ok(())
    }

    async fn send_actions(&self, user: UserId, text: &str, rows: &[Vec<InlineButton>]) -> Result<()> {
        self.record(user, Sent::Actions(text.to_string(), rows.to_vec()));
        Ok(())
    }

    async fn delete_message(&self, user: UserId, message: MessageHandle) -> Result<()> {
        self.record(user, Sent::Deleted(message));
        Ok(())
    }
}

struct FakeGenerator {
    outcome: Result<Vec<String>, GenerationError>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outcome.clone()
    }
}

struct FakeEncyclopedia {
    outcome: Result<Option<String>, LookupError>,
}

#[async_trait]
impl Encyclopedia for FakeEncyclopedia {
    async fn lookup(&self, _query: &str) -> Result<Option<String>, LookupError> {
        self.outcome.clone()
    }
}

struct Harness {
    dispatcher: ConversationDispatcher,
    users: Arc<InMemoryUserStore>,
    generator: Arc<FakeGenerator>,
    transport: Arc<RecordingTransport>,
    data_dir: TempDir,
}

impl Harness {
    fn new(images: Result<Vec<String>, GenerationError>) -> Self {
        Self::with_encyclopedia(images, Ok(None))
    }

    fn with_encyclopedia(
        images: Result<Vec<String>, GenerationError>,
        lookup: Result<Option<String>, LookupError>,
    ) -> Self {
        let users = Arc::new(InMemoryUserStore::new());
        let generator = Arc::new(FakeGenerator {
            outcome: images,
            prompts: Mutex::new(Vec::new()),
        });
        let transport = Arc::new(RecordingTransport::default());
        let data_dir = TempDir::new().unwrap();

        let dispatcher = ConversationDispatcher::new(
            users.clone(),
            generator.clone(),
            Arc::new(FakeEncyclopedia { outcome: lookup }),
            transport.clone(),
            data_dir.path(),
        );

        Self {
            dispatcher,
            users,
            generator,
            transport,
            data_dir,
        }
    }

    async fn text(&self, text: &str) {
        let dispatch = self.dispatcher.handle_text(USER, text).await.unwrap();
        finish(dispatch).await;
    }

    async fn press(&self, data: &str) {
        let dispatch = self.dispatcher.handle_callback(USER, data).await.unwrap();
        finish(dispatch).await;
    }

    fn prompts(&self) -> Vec<String> {
        self.generator.prompts.lock().unwrap().clone()
    }

    /// Put a real image file into the user's gallery
    fn seed_gallery_image(&self, name: &str) -> PathBuf {
        let path = self.data_dir.path().join(name);
        std::fs::write(&path, b"jpeg").unwrap();
        self.users.append_gallery_image(USER, path.clone());
        path
    }
}

async fn finish(dispatch: Dispatch) {
    if let Dispatch::Spawned(handle) = dispatch {
        handle.await.unwrap();
    }
}

fn png_base64() -> String {
    let image = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 200, 30, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .unwrap();
    BASE64.encode(bytes.into_inner())
}

#[tokio::test]
async fn test_start_sends_menu() {
    let harness = Harness::new(Ok(vec![]));
    harness.text("/start").await;
    assert_eq!(harness.transport.events(), vec![Sent::Menu(t("welcome"))]);
}

#[tokio::test]
async fn test_generate_image_scenario() {
    let harness = Harness::new(Ok(vec![png_base64()]));

    harness.text(&MenuCommand::GenerateImage.label()).await;
    assert_eq!(harness.transport.texts(), vec![t("ask-image-prompt")]);
    assert_eq!(
        harness.users.get_or_create(USER).pending,
        Some(Expectation::ImagePrompt)
    );

    harness.text("!cat on moon").await;

    assert_eq!(harness.prompts(), vec!["cat on moon".to_string()]);

    let record = harness.users.get_or_create(USER);
    assert_eq!(record.image_requests, 1);
    assert_eq!(record.pending, None);
    assert_eq!(record.gallery.len(), 1);

    let stored = &record.gallery[0];
    assert!(stored.exists());
    assert_eq!(stored.file_name().unwrap(), "generated_image_0.jpg");
    let batch = stored.parent().unwrap();
    assert!(batch.file_name().unwrap().to_string_lossy().starts_with("batch_"));
    assert_eq!(batch.parent().unwrap(), harness.data_dir.path().join("42"));

    assert_eq!(harness.transport.photos(), vec![stored.clone()]);
    let actions = harness.transport.actions();
    assert_eq!(actions.len(), 1);
    let data: Vec<&str> = actions[0].1[0].iter().map(|b| b.data.as_str()).collect();
    assert_eq!(data, vec!["add_42_0", "retry_42_cat on moon"]);

    // The progress message is the second text sent and is removed afterwards
    let events = harness.transport.events();
    assert!(events.contains(&Sent::Text(t("generating"))));
    assert!(events.contains(&Sent::Deleted(MessageHandle(1))));
}

#[tokio::test]
async fn test_generation_timeout_is_reported_and_not_counted() {
    let harness = Harness::new(Err(GenerationError::Timeout("slow".into())));

    harness.text(&MenuCommand::GenerateImage.label()).await;
    harness.text("!cat").await;

    let texts = harness.transport.texts();
    assert!(texts.contains(&t("error-generation-timeout")));
    assert_eq!(harness.users.get_or_create(USER).image_requests, 0);
    assert!(harness
        .transport
        .events()
        .iter()
        .any(|e| matches!(e, Sent::Deleted(_))));
}

#[tokio::test]
async fn test_generation_transport_error_is_generic_failure() {
    let harness = Harness::new(Err(GenerationError::Transport("502".into())));

    harness.text(&MenuCommand::GenerateImage.label()).await;
    harness.text("!cat").await;

    assert!(harness.transport.texts().contains(&t("error-generation-failed")));
    assert_eq!(harness.users.get_or_create(USER).image_requests, 0);
    assert!(harness.transport.photos().is_empty());
}

#[tokio::test]
async fn test_partial_batch_still_delivers_good_images() {
    let harness = Harness::new(Ok(vec![png_base64(), "not an image".to_string()]));

    harness.text(&MenuCommand::GenerateImage.label()).await;
    harness.text("!two cats").await;

    assert_eq!(harness.transport.photos().len(), 1);
    assert!(harness
        .transport
        .texts()
        .contains(&t_args("error-image-decode", &[("number", "2")])));
    let record = harness.users.get_or_create(USER);
    assert_eq!(record.image_requests, 1);
    assert_eq!(record.gallery.len(), 1);
}

#[tokio::test]
async fn test_failed_photo_send_does_not_stop_batch() {
    let harness = Harness::new(Ok(vec![png_base64(), png_base64()]));
    harness.transport.rejected_photos.store(1, Ordering::SeqCst);

    harness.text(&MenuCommand::GenerateImage.label()).await;
    harness.text("!two cats").await;

    let photos = harness.transport.photos();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].file_name().unwrap(), "generated_image_1.jpg");

    let record = harness.users.get_or_create(USER);
    assert_eq!(record.gallery, photos);
    assert_eq!(record.image_requests, 1);

    let actions = harness.transport.actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].1[0][0].data, "add_42_0");
    assert!(harness
        .transport
        .events()
        .iter()
        .any(|e| matches!(e, Sent::Deleted(_))));
}

#[tokio::test]
async fn test_prompt_is_passed_verbatim() {
    let harness = Harness::new(Ok(vec![png_base64()]));

    harness.text(&MenuCommand::GenerateImage.label()).await;
    harness.text("  !cat  in a   hat ").await;

    assert_eq!(harness.prompts(), vec!["cat  in a   hat".to_string()]);
}

#[tokio::test]
async fn test_empty_prompt_is_rejected() {
    let harness = Harness::new(Ok(vec![png_base64()]));

    harness.text(&MenuCommand::GenerateImage.label()).await;
    harness.text("!").await;

    assert!(harness.prompts().is_empty());
    assert!(harness.transport.texts().contains(&t("empty-prompt")));
}

#[tokio::test]
async fn test_pending_expectation_wins_over_menu_labels() {
    let harness = Harness::new(Ok(vec![png_base64()]));

    harness.text(&MenuCommand::GenerateImage.label()).await;
    harness.text(&MenuCommand::Statistics.label()).await;

    assert_eq!(harness.prompts(), vec![MenuCommand::Statistics.label()]);
}

#[tokio::test]
async fn test_unknown_text_asks_for_menu_choice() {
    let harness = Harness::new(Ok(vec![]));
    harness.text("привет").await;

    assert_eq!(harness.transport.texts(), vec![t("choose-menu-option")]);
    assert_eq!(harness.users.get_or_create(USER).pending, None);
}

#[tokio::test]
async fn test_empty_gallery() {
    let harness = Harness::new(Ok(vec![]));
    harness.text(&MenuCommand::Gallery.label()).await;

    assert_eq!(harness.transport.events(), vec![Sent::Text(t("gallery-empty"))]);
}

#[tokio::test]
async fn test_gallery_navigation() {
    let harness = Harness::new(Ok(vec![]));
    let images: Vec<PathBuf> = (0..3)
        .map(|i| harness.seed_gallery_image(&format!("img_{i}.jpg")))
        .collect();

    harness.press("gallery_42_1").await;

    assert_eq!(harness.transport.photos(), vec![images[1].clone()]);
    let actions = harness.transport.actions();
    let data: Vec<&str> = actions[0].1[0].iter().map(|b| b.data.as_str()).collect();
    assert_eq!(data, vec!["gallery_42_0", "gallery_42_2"]);
}

#[tokio::test]
async fn test_gallery_out_of_range_is_unavailable() {
    let harness = Harness::new(Ok(vec![]));
    harness.seed_gallery_image("only.jpg");

    harness.press("gallery_42_5").await;

    assert_eq!(harness.transport.texts(), vec![t("gallery-unavailable")]);
    assert_eq!(harness.users.gallery_len(USER), 1);
}

#[tokio::test]
async fn test_gallery_missing_file() {
    let harness = Harness::new(Ok(vec![]));
    harness
        .users
        .append_gallery_image(USER, harness.data_dir.path().join("gone.jpg"));

    harness.text(&MenuCommand::Gallery.label()).await;

    assert_eq!(harness.transport.texts(), vec![t("error-image-missing")]);
    assert!(harness.transport.photos().is_empty());
}

#[tokio::test]
async fn test_add_appends_duplicate() {
    let harness = Harness::new(Ok(vec![]));
    let image = harness.seed_gallery_image("first.jpg");

    harness.press("add_42_0").await;

    let record = harness.users.get_or_create(USER);
    assert_eq!(record.gallery, vec![image.clone(), image]);
    assert_eq!(
        harness.transport.texts(),
        vec![t_args("gallery-added", &[("number", "2")])]
    );
}

#[tokio::test]
async fn test_add_without_images() {
    let harness = Harness::new(Ok(vec![]));
    harness.press("add_42_0").await;

    assert_eq!(harness.transport.texts(), vec![t("error-no-saved-images")]);
    assert_eq!(harness.users.gallery_len(USER), 0);
}

#[tokio::test]
async fn test_corrupted_payloads_change_nothing() {
    let harness = Harness::new(Ok(vec![png_base64()]));
    harness.seed_gallery_image("first.jpg");

    for data in ["add_42", "retry_42_cat_moon", "zoom_42_1", "add_7_0", "gallery_42_x"] {
        harness.press(data).await;
    }

    let texts = harness.transport.texts();
    assert_eq!(texts.len(), 5);
    assert!(texts.iter().all(|text| *text == t("error-corrupted-data")));
    assert_eq!(harness.users.gallery_len(USER), 1);
    assert!(harness.prompts().is_empty());
}

#[tokio::test]
async fn test_retry_regenerates_same_prompt() {
    let harness = Harness::new(Ok(vec![png_base64()]));

    harness.press("retry_42_cat on moon").await;

    assert_eq!(harness.prompts(), vec!["cat on moon".to_string()]);
    let texts = harness.transport.texts();
    assert_eq!(
        texts[0],
        t_args("regenerating", &[("prompt", "!cat on moon")])
    );
    assert_eq!(harness.users.get_or_create(USER).image_requests, 1);
}

#[tokio::test]
async fn test_wiki_lookup_found() {
    let harness = Harness::with_encyclopedia(
        Ok(vec![]),
        Ok(Some("Москва — столица России.".to_string())),
    );

    harness.text(&MenuCommand::WikiLookup.label()).await;
    harness.text("Москва").await;

    assert_eq!(
        harness.transport.texts(),
        vec![t("ask-wiki-query"), "Москва — столица России.".to_string()]
    );
    assert_eq!(harness.users.get_or_create(USER).wiki_requests, 1);
}

#[tokio::test]
async fn test_wiki_lookup_miss_is_counted() {
    let harness = Harness::with_encyclopedia(Ok(vec![]), Ok(None));

    harness.text(&MenuCommand::WikiLookup.label()).await;
    harness.text("абракадабра").await;

    assert!(harness.transport.texts().contains(&t("wiki-not-found")));
    assert_eq!(harness.users.get_or_create(USER).wiki_requests, 1);
}

#[tokio::test]
async fn test_wiki_lookup_failure_is_not_counted() {
    let harness = Harness::with_encyclopedia(
        Ok(vec![]),
        Err(LookupError::Transport("offline".into())),
    );

    harness.text(&MenuCommand::WikiLookup.label()).await;
    harness.text("Москва").await;

    assert!(harness.transport.texts().contains(&t("error-wiki-failed")));
    assert_eq!(harness.users.get_or_create(USER).wiki_requests, 0);
}

#[tokio::test]
async fn test_statistics_reflect_counters() {
    let harness = Harness::with_encyclopedia(Ok(vec![]), Ok(None));

    harness.text(&MenuCommand::WikiLookup.label()).await;
    harness.text("что-нибудь").await;
    harness.text(&MenuCommand::Statistics.label()).await;

    let expected = t_args(
        "stats",
        &[("image_requests", "0"), ("wiki_requests", "1")],
    );
    assert_eq!(harness.transport.texts().last(), Some(&expected));
}

#[tokio::test]
async fn test_concurrent_generations_use_distinct_paths() {
    let harness = Harness::new(Ok(vec![png_base64()]));

    let (first, second) = tokio::join!(
        harness.dispatcher.generate_and_deliver(USER, "first"),
        harness.dispatcher.generate_and_deliver(USER, "second"),
    );
    first.unwrap();
    second.unwrap();

    let record = harness.users.get_or_create(USER);
    assert_eq!(record.gallery.len(), 2);
    assert_ne!(record.gallery[0], record.gallery[1]);
    assert!(record.gallery.iter().all(|path| path.exists()));
    assert_eq!(record.image_requests, 2);
}
