//! In-process fake providers shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wayfinder_core::knowledge::{PlaceRecord, StaticCorpus};
use wayfinder_core::providers::{
    Embedder, Encyclopedia, EncyclopediaPage, Generator, HashingEmbedder, LlmSummarizer, SpeechSynthesizer,
    SyncEmbedder,
};
use wayfinder_core::{Assistant, GuideConfig, GuideError, GuideResult, Providers};

/// Hashing embedder that counts calls.
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    pub calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(256),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str) -> GuideResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_sync(text)
    }

    fn name(&self) -> &str {
        "counting-hashing"
    }
}

/// Answers by prompt kind: planner, summarizer, composer.
pub struct ScriptedGenerator {
    pub plan: Option<String>,
    pub answer: Option<String>,
    pub summary: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(plan: Option<&str>, answer: Option<&str>) -> Self {
        Self {
            plan: plan.map(str::to_string),
            answer: answer.map(str::to_string),
            summary: Some(r#"{"summary": "A short summary."}"#.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _max_tokens: u32, _temperature: f32) -> GuideResult<String> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        let out = if prompt.starts_with("You are a planner") {
            &self.plan
        } else if prompt.starts_with("Summarize") {
            &self.summary
        } else {
            &self.answer
        };
        out.clone()
            .ok_or_else(|| GuideError::provider("generator", "scripted failure"))
    }
}

pub struct BeepSpeech {
    pub calls: AtomicUsize,
}

impl BeepSpeech {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for BeepSpeech {
    async fn synthesize(&self, _text: &str, _voice: &str, _format: &str) -> GuideResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0x49, 0x44, 0x33])
    }
}

/// Every synthesis attempt fails.
pub struct BrokenSpeech;

#[async_trait]
impl SpeechSynthesizer for BrokenSpeech {
    async fn synthesize(&self, _text: &str, _voice: &str, _format: &str) -> GuideResult<Vec<u8>> {
        Err(GuideError::provider("tts", "speech service unavailable"))
    }
}

/// Panics on any call.
pub struct PanickingGenerator;

#[async_trait]
impl Generator for PanickingGenerator {
    async fn generate(&self, _prompt: &str, _max_tokens: u32, _temperature: f32) -> GuideResult<String> {
        panic!("generator blew up")
    }
}

/// Returns one fixed page for any search.
pub struct OnePageEncyclopedia {
    pub page: EncyclopediaPage,
    pub searches: AtomicUsize,
}

impl OnePageEncyclopedia {
    pub fn new(title: &str, summary: &str) -> Self {
        Self {
            page: EncyclopediaPage {
                title: title.to_string(),
                summary: summary.to_string(),
                body: String::new(),
                images: vec![
                    "https://upload.example/Wikipedia-logo.png".to_string(),
                    format!("https://upload.example/{}.jpg", title.replace(' ', "_")),
                ],
            },
            searches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Encyclopedia for OnePageEncyclopedia {
    async fn search(&self, _query: &str) -> GuideResult<Vec<String>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![self.page.title.clone()])
    }

    async fn fetch_page(&self, _title: &str) -> GuideResult<EncyclopediaPage> {
        Ok(self.page.clone())
    }
}

pub fn place(id: &str, name: &str, category: &str, description: &str, related: &[&str]) -> PlaceRecord {
    PlaceRecord {
        id: Some(id.to_string()),
        name: name.to_string(),
        description: description.to_string(),
        category: Some(category.to_string()),
        related: related.iter().map(|r| r.to_string()).collect(),
        ..Default::default()
    }
}

pub fn chennai() -> Vec<PlaceRecord> {
    vec![
        place(
            "p_kapaleeswarar",
            "Kapaleeshwarar Temple",
            "Temple",
            "An ancient Dravidian temple in Mylapore dedicated to Lord Shiva.",
            &["p_mylapore_tank"],
        ),
        place(
            "p_marina",
            "Marina Beach",
            "Beach",
            "Marina Beach, the longest urban beach in the city, known for sunrise and food stalls.",
            &["p_santhome", "p_light_house"],
        ),
        place(
            "p_guindy",
            "Guindy National Park",
            "Park",
            "A protected park hosting blackbucks, spotted deer and over 100 bird species.",
            &["p_snakepark"],
        ),
    ]
}

pub fn config(audio_dir: &Path) -> GuideConfig {
    GuideConfig {
        audio_dir: Some(audio_dir.to_string_lossy().into_owned()),
        provider_timeout_secs: 5,
        ..GuideConfig::default()
    }
}

pub struct Harness {
    pub assistant: Assistant,
    pub embedder: Arc<CountingEmbedder>,
    pub generator: Arc<ScriptedGenerator>,
    pub speech: Arc<BeepSpeech>,
    pub audio_dir: tempfile::TempDir,
}

pub fn harness(
    generator: ScriptedGenerator,
    encyclopedia: Option<Arc<dyn Encyclopedia>>,
    records: Vec<PlaceRecord>,
) -> Harness {
    let audio_dir = tempfile::tempdir().expect("tempdir");
    let embedder = Arc::new(CountingEmbedder::new());
    let generator = Arc::new(generator);
    let speech = Arc::new(BeepSpeech::new());
    let assistant = assemble(
        embedder.clone(),
        generator.clone(),
        speech.clone(),
        encyclopedia,
        records,
        audio_dir.path(),
    );
    Harness {
        assistant,
        embedder,
        generator,
        speech,
        audio_dir,
    }
}

/// Wires an assistant from arbitrary providers over a static corpus.
pub fn assemble(
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    speech: Arc<dyn SpeechSynthesizer>,
    encyclopedia: Option<Arc<dyn Encyclopedia>>,
    records: Vec<PlaceRecord>,
    audio_dir: &Path,
) -> Assistant {
    let providers = Providers {
        embedder,
        generator: generator.clone(),
        summarizer: Arc::new(LlmSummarizer::new(generator)),
        speech,
        encyclopedia,
    };
    Assistant::build(providers, Arc::new(StaticCorpus::new(records)), &config(audio_dir))
}
