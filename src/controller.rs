//! Digitize lifecycle: idle, loading, then a result or an error.

use std::{sync::Arc, time::Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    encoder::{self, SourceImage},
    gemini::DigitizationClient,
    prompt::{self, ClothingPart, DEFAULT_BACKGROUND_COLOR},
    DigitizerError, Result,
};

pub const OUTPUT_MEDIA_TYPE: &str = "image/png";
pub const DOWNLOAD_FILE_NAME: &str = "digitized-embroidery.png";
pub const NO_SOURCE_MESSAGE: &str = "Please upload an image first.";

/// Base64 image returned by the model. Always presented as PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitizedImage {
    pub base64: String,
}

impl DigitizedImage {
    pub fn data_uri(&self) -> String {
        encoder::to_data_uri(OUTPUT_MEDIA_TYPE, &self.base64)
    }
}

impl Serialize for DigitizedImage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.data_uri())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    #[default]
    Idle,
    Loading,
    Succeeded { image: DigitizedImage },
    Failed { message: String },
}

impl UiState {
    pub fn is_loading(&self) -> bool {
        matches!(self, UiState::Loading)
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    FileSelected,
    DigitizeStarted,
    Rejected(String),
    Succeeded(DigitizedImage),
    Failed(String),
    Superseded,
}

/// Pure state transition. Results only land while loading; a rejection
/// never enters `Loading`, and a new file never leaves it.
pub fn transition(state: &UiState, event: UiEvent) -> UiState {
    match (state, event) {
        (UiState::Loading, UiEvent::FileSelected) => UiState::Loading,
        (_, UiEvent::FileSelected) => UiState::Idle,
        (UiState::Loading, UiEvent::Superseded) => UiState::Idle,
        (other, UiEvent::Superseded) => other.clone(),
        (_, UiEvent::DigitizeStarted) => UiState::Loading,
        (UiState::Loading, UiEvent::Rejected(_)) => UiState::Loading,
        (_, UiEvent::Rejected(message)) => UiState::Failed { message },
        (UiState::Loading, UiEvent::Succeeded(image)) => UiState::Succeeded { image },
        (UiState::Loading, UiEvent::Failed(message)) => UiState::Failed { message },
        (other, UiEvent::Succeeded(_)) | (other, UiEvent::Failed(_)) => other.clone(),
    }
}

/// Inputs captured when a cycle starts, tagged with the generation it
/// belongs to.
#[derive(Debug, Clone)]
pub struct Cycle {
    pub generation: u64,
    pub source: SourceImage,
    pub background_color: String,
    pub clothing_part: ClothingPart,
}

#[derive(Debug, Clone)]
pub struct Session {
    source: Option<SourceImage>,
    background_color: String,
    clothing_part: ClothingPart,
    state: UiState,
    generation: u64,
    in_flight: Option<u64>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            source: None,
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            clothing_part: ClothingPart::default(),
            state: UiState::Idle,
            generation: 0,
            in_flight: None,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn background_color(&self) -> &str {
        &self.background_color
    }

    pub fn clothing_part(&self) -> ClothingPart {
        self.clothing_part
    }

    pub fn set_background_color(&mut self, color: impl Into<String>) {
        self.background_color = color.into();
    }

    pub fn set_clothing_part(&mut self, part: ClothingPart) {
        self.clothing_part = part;
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Replaces the source image and clears any result. A pending cycle is
    /// superseded but keeps the session loading until it lands.
    pub fn select_file(&mut self, source: SourceImage) {
        self.source = Some(source);
        self.generation += 1;
        self.state = transition(&self.state, UiEvent::FileSelected);
    }

    pub fn begin_digitize(&mut self) -> Result<Cycle> {
        if self.in_flight.is_some() {
            return Err(DigitizerError::Busy);
        }
        let Some(source) = self.source.clone() else {
            self.state = transition(&self.state, UiEvent::Rejected(NO_SOURCE_MESSAGE.into()));
            return Err(DigitizerError::Validation(NO_SOURCE_MESSAGE.into()));
        };
        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.state = transition(&self.state, UiEvent::DigitizeStarted);
        Ok(Cycle {
            generation: self.generation,
            source,
            background_color: self.background_color.clone(),
            clothing_part: self.clothing_part,
        })
    }

    /// Applies a finished cycle and frees the in-flight slot. Returns
    /// `false` when the cycle was superseded and its outcome dropped.
    pub fn complete(&mut self, cycle: &Cycle, outcome: &Result<DigitizedImage>) -> bool {
        if self.in_flight == Some(cycle.generation) {
            self.in_flight = None;
        }
        if cycle.generation != self.generation {
            warn!(
                cycle = cycle.generation,
                current = self.generation,
                "dropping stale digitize result"
            );
            self.state = transition(&self.state, UiEvent::Superseded);
            return false;
        }
        let event = match outcome {
            Ok(image) => UiEvent::Succeeded(image.clone()),
            Err(err) => UiEvent::Failed(err.user_message()),
        };
        self.state = transition(&self.state, event);
        true
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state.clone(),
            file_name: self.source.as_ref().map(|source| source.name.clone()),
            background_color: self.background_color.clone(),
            clothing_part: self.clothing_part,
            is_loading: self.state.is_loading(),
        }
    }
}

/// What the page renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub state: UiState,
    pub file_name: Option<String>,
    pub background_color: String,
    pub clothing_part: ClothingPart,
    pub is_loading: bool,
}

/// Encode, assemble the prompt, make the remote call.
pub async fn digitize_embroidery<C>(
    client: &C,
    source: &SourceImage,
    background_color: &str,
    clothing_part: ClothingPart,
) -> Result<DigitizedImage>
where
    C: DigitizationClient + ?Sized,
{
    let payload = encoder::encode(source);
    let instructions = prompt::build_prompt(background_color, clothing_part);
    let base64 = client.generate_blueprint(&payload, &instructions).await?;
    Ok(DigitizedImage {
        base64: encoder::strip_data_uri_prefix(&base64).to_string(),
    })
}

pub struct Controller<C> {
    client: Arc<C>,
    session: Mutex<Session>,
}

impl<C> Controller<C>
where
    C: DigitizationClient,
{
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            session: Mutex::new(Session::new()),
        }
    }

    pub async fn view(&self) -> SessionView {
        self.session.lock().await.view()
    }

    pub async fn select_file(&self, source: SourceImage) -> SessionView {
        let mut session = self.session.lock().await;
        info!(
            name = %source.name,
            media_type = %source.media_type,
            size = source.bytes.len(),
            "source image selected"
        );
        session.select_file(source);
        session.view()
    }

    pub async fn update_settings(
        &self,
        background_color: Option<String>,
        clothing_part: Option<ClothingPart>,
    ) -> SessionView {
        let mut session = self.session.lock().await;
        if let Some(color) = background_color {
            session.set_background_color(color);
        }
        if let Some(part) = clothing_part {
            session.set_clothing_part(part);
        }
        session.view()
    }

    /// Runs one cycle. The session lock is released for the remote call.
    pub async fn digitize(&self) -> (SessionView, Result<()>) {
        let cycle = {
            let mut session = self.session.lock().await;
            match session.begin_digitize() {
                Ok(cycle) => cycle,
                Err(err) => return (session.view(), Err(err)),
            }
        };

        info!(
            generation = cycle.generation,
            clothing_part = %cycle.clothing_part,
            background_color = %cycle.background_color,
            "digitize started"
        );
        let started = Instant::now();
        let outcome = digitize_embroidery(
            self.client.as_ref(),
            &cycle.source,
            &cycle.background_color,
            cycle.clothing_part,
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => info!(generation = cycle.generation, elapsed_ms, "digitize succeeded"),
            Err(err) => warn!(generation = cycle.generation, elapsed_ms, error = %err, "digitize failed"),
        }

        let mut session = self.session.lock().await;
        if !session.complete(&cycle, &outcome) {
            return (session.view(), Err(DigitizerError::Superseded));
        }
        (session.view(), outcome.map(|_| ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodedPayload;
    use async_trait::async_trait;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    };
    use tokio::sync::Notify;

    enum Script {
        Image(&'static str),
        NoImage,
        Transport,
    }

    struct ScriptedClient {
        script: Script,
        calls: StdMutex<Vec<(EncodedPayload, String)>>,
    }

    impl ScriptedClient {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(EncodedPayload, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DigitizationClient for ScriptedClient {
        async fn generate_blueprint(&self, payload: &EncodedPayload, prompt: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((payload.clone(), prompt.to_string()));
            match self.script {
                Script::Image(data) => Ok(data.to_string()),
                Script::NoImage => Err(DigitizerError::NoImageReturned),
                Script::Transport => Err(DigitizerError::remote("connection reset by peer")),
            }
        }
    }

    fn png_source(len: usize) -> SourceImage {
        SourceImage::new(vec![7u8; len], Some("image/png"), "stitch.png")
    }

    #[tokio::test]
    async fn digitize_without_source_never_calls_remote() {
        let client = ScriptedClient::new(Script::Image("QUJD"));
        let controller = Controller::new(client.clone());

        let (view, result) = controller.digitize().await;

        assert!(matches!(result, Err(DigitizerError::Validation(_))));
        assert_eq!(
            view.state,
            UiState::Failed {
                message: NO_SOURCE_MESSAGE.into()
            }
        );
        assert!(!view.is_loading);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn successful_cycle_carries_exact_bytes() {
        let client = ScriptedClient::new(Script::Image("YmxvYg=="));
        let controller = Controller::new(client.clone());
        controller.select_file(png_source(50 * 1024)).await;
        controller
            .update_settings(Some("#FF0000".into()), Some(ClothingPart::Cuff))
            .await;

        let (view, result) = controller.digitize().await;

        assert!(result.is_ok());
        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        let (payload, prompt) = &calls[0];
        assert_eq!(payload.media_type, "image/png");
        assert!(prompt.contains("#FF0000"));
        assert!(prompt.contains("Cuff"));

        let UiState::Succeeded { image } = &view.state else {
            panic!("expected success, got {:?}", view.state);
        };
        assert_eq!(image.base64, "YmxvYg==");
        assert_eq!(image.data_uri(), "data:image/png;base64,YmxvYg==");
        assert!(!view.is_loading);
    }

    #[tokio::test]
    async fn missing_image_part_fails_the_cycle() {
        let controller = Controller::new(ScriptedClient::new(Script::NoImage));
        controller.select_file(png_source(16)).await;

        let (view, result) = controller.digitize().await;

        assert!(matches!(result, Err(DigitizerError::NoImageReturned)));
        assert!(matches!(view.state, UiState::Failed { .. }));
        assert!(!view.is_loading);
    }

    #[tokio::test]
    async fn transport_error_fails_with_message_and_no_image() {
        let controller = Controller::new(ScriptedClient::new(Script::Transport));
        controller.select_file(png_source(16)).await;

        let (view, _) = controller.digitize().await;

        let UiState::Failed { message } = &view.state else {
            panic!("expected failure, got {:?}", view.state);
        };
        assert!(!message.is_empty());
        assert!(!message.contains("connection reset"));
        assert!(!view.is_loading);
    }

    #[test]
    fn selecting_a_file_clears_previous_result() {
        let mut session = Session::new();
        session.select_file(png_source(4));
        let cycle = session.begin_digitize().unwrap();
        assert!(session.state().is_loading());
        session.complete(
            &cycle,
            &Ok(DigitizedImage {
                base64: "QUJD".into(),
            }),
        );
        assert!(matches!(session.state(), UiState::Succeeded { .. }));

        session.select_file(png_source(8));
        assert_eq!(session.state(), &UiState::Idle);
        assert_eq!(session.source().unwrap().bytes.len(), 8);
    }

    #[test]
    fn stale_result_is_dropped_after_new_selection() {
        let mut session = Session::new();
        session.select_file(png_source(4));
        let stale = session.begin_digitize().unwrap();

        session.select_file(png_source(8));
        assert!(session.state().is_loading());
        assert!(matches!(session.begin_digitize(), Err(DigitizerError::Busy)));
        assert_eq!(session.in_flight(), Some(stale.generation));

        let applied = session.complete(
            &stale,
            &Ok(DigitizedImage {
                base64: "b2xk".into(),
            }),
        );

        assert!(!applied);
        assert_eq!(session.state(), &UiState::Idle);
        assert_eq!(session.in_flight(), None);

        let next = session.begin_digitize().unwrap();
        assert_eq!(next.source.bytes.len(), 8);
        assert_eq!(session.in_flight(), Some(next.generation));
    }

    struct GatedClient {
        started: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DigitizationClient for GatedClient {
        async fn generate_blueprint(&self, _payload: &EncodedPayload, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            Ok("b2xk".to_string())
        }
    }

    #[tokio::test]
    async fn reselect_during_call_keeps_one_request_outstanding() {
        let client = Arc::new(GatedClient {
            started: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let controller = Arc::new(Controller::new(client.clone()));
        controller.select_file(png_source(4)).await;

        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.digitize().await }
        });
        client.started.notified().await;

        let view = controller.select_file(png_source(8)).await;
        assert!(view.is_loading);

        let (view, result) = controller.digitize().await;
        assert!(matches!(result, Err(DigitizerError::Busy)));
        assert!(view.is_loading);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        client.release.notify_one();
        let (view, result) = first.await.unwrap();
        assert!(matches!(result, Err(DigitizerError::Superseded)));
        assert_eq!(view.state, UiState::Idle);
        assert!(!view.is_loading);
        assert_eq!(view.file_name.as_deref(), Some("stitch.png"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_trigger_while_loading_is_busy() {
        let mut session = Session::new();
        session.select_file(png_source(4));
        let _cycle = session.begin_digitize().unwrap();

        assert!(matches!(session.begin_digitize(), Err(DigitizerError::Busy)));
        assert!(session.state().is_loading());
    }

    #[test]
    fn retry_after_failure_re_enters_loading() {
        let mut session = Session::new();
        session.select_file(png_source(4));
        let cycle = session.begin_digitize().unwrap();
        session.complete(&cycle, &Err(DigitizerError::NoImageReturned));
        assert!(matches!(session.state(), UiState::Failed { .. }));

        let retry = session.begin_digitize().unwrap();
        assert!(retry.generation > cycle.generation);
        assert!(session.state().is_loading());
    }

    #[test]
    fn results_outside_loading_are_ignored() {
        let image = DigitizedImage {
            base64: "QUJD".into(),
        };
        assert_eq!(
            transition(&UiState::Idle, UiEvent::Succeeded(image)),
            UiState::Idle
        );
        assert_eq!(
            transition(&UiState::Idle, UiEvent::Failed("x".into())),
            UiState::Idle
        );
        assert_eq!(
            transition(&UiState::Loading, UiEvent::FileSelected),
            UiState::Loading
        );
    }

    #[test]
    fn view_serializes_flat_status() {
        let mut session = Session::new();
        session.select_file(png_source(4));
        let value = serde_json::to_value(session.view()).unwrap();
        assert_eq!(value["status"], "idle");
        assert_eq!(value["fileName"], "stitch.png");
        assert_eq!(value["backgroundColor"], DEFAULT_BACKGROUND_COLOR);
        assert_eq!(value["clothingPart"], "Neckline");
        assert_eq!(value["isLoading"], false);
    }
}
