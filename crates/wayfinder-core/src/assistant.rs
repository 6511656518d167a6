//! Wiring: builds the shared services and the orchestrator from providers,
//! a corpus source and configuration.

use crate::cache::{AudioCache, EmbeddingCache};
use crate::config::{env_opt_string, GuideConfig};
use crate::error::GuideResult;
use crate::knowledge::{CorpusIndex, CorpusSource, JsonFileCorpus, SledCorpus};
use crate::orchestrator::{AnswerComposer, Orchestrator, PlanGenerator, StepExecutor};
use crate::providers::{
    BlockingEmbedder, Embedder, Encyclopedia, Generator, HashingEmbedder, HttpEmbedder, LlmSummarizer,
    NoGenerator, OpenAiSpeech, OpenRouterGenerator, SilentSpeech, SpeechSynthesizer, Summarizer,
    WikipediaClient,
};
use crate::retrieval::{EncyclopediaFallback, HybridRetriever};
use crate::session::SessionStore;
use crate::speech::SpeechService;
use std::sync::Arc;
use tracing::{info, warn};

/// The external capabilities the core talks to.
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub summarizer: Arc<dyn Summarizer>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// `None` disables the encyclopedia fallback.
    pub encyclopedia: Option<Arc<dyn Encyclopedia>>,
}

impl Providers {
    /// Providers from configuration and API keys in the environment. Missing
    /// keys select offline stand-ins instead of failing.
    pub fn from_config(config: &GuideConfig) -> Self {
        let embedder: Arc<dyn Embedder> = match &config.embedding_base_url {
            Some(base) => {
                info!(base = %base, model = %config.embedding_model, "using HTTP embeddings");
                Arc::new(HttpEmbedder::new(base, &config.embedding_model, env_opt_string("EMBEDDING_API_KEY")))
            }
            None => {
                info!(dims = config.embedding_dimensions, "using local hashing embeddings");
                Arc::new(BlockingEmbedder::new(HashingEmbedder::new(config.embedding_dimensions)))
            }
        };

        let generator: Arc<dyn Generator> = match OpenRouterGenerator::from_env() {
            Some(g) => Arc::new(
                g.with_base_url(&config.openrouter_base_url)
                    .with_model(&config.openrouter_model),
            ),
            None => {
                warn!("OPENROUTER_API_KEY not set; planning and answering use fallbacks");
                Arc::new(NoGenerator)
            }
        };

        let speech: Arc<dyn SpeechSynthesizer> = match OpenAiSpeech::from_env(&config.tts_base_url, &config.tts_model) {
            Some(s) => Arc::new(s),
            None => {
                warn!("no TTS key set; answers will have no audio");
                Arc::new(SilentSpeech)
            }
        };

        Self {
            embedder,
            summarizer: Arc::new(LlmSummarizer::new(Arc::clone(&generator))),
            generator,
            speech,
            encyclopedia: Some(Arc::new(WikipediaClient::new())),
        }
    }
}

/// Process-wide services plus the orchestrator built on them.
pub struct Assistant {
    pub orchestrator: Arc<Orchestrator>,
    pub index: Arc<CorpusIndex>,
    pub sessions: Arc<SessionStore>,
    pub embeddings: Arc<EmbeddingCache>,
    pub audio: Arc<AudioCache>,
}

impl Assistant {
    pub fn build(providers: Providers, corpus: Arc<dyn CorpusSource>, config: &GuideConfig) -> Self {
        let timeout = config.provider_timeout();
        let embeddings = Arc::new(EmbeddingCache::new(
            providers.embedder,
            config.embedding_cache_capacity,
            timeout,
        ));
        let index = Arc::new(CorpusIndex::new(corpus, Arc::clone(&embeddings)));

        let mut retriever = HybridRetriever::new(Arc::clone(&index), Arc::clone(&embeddings));
        if let Some(encyclopedia) = providers.encyclopedia {
            retriever = retriever.with_fallback(EncyclopediaFallback::new(encyclopedia, timeout));
        }

        let audio = Arc::new(AudioCache::new(config.audio_ttl()));
        let speech = Arc::new(SpeechService::new(
            providers.speech,
            Arc::clone(&audio),
            config.audio_dir(),
            timeout,
        ));
        let sessions = Arc::new(SessionStore::new(config.max_sessions, config.session_idle_ttl()));

        let executor = StepExecutor::new(
            Arc::new(retriever),
            providers.summarizer,
            Arc::clone(&speech),
            Arc::clone(&embeddings),
            timeout,
        );
        let orchestrator = Orchestrator::new(
            Arc::clone(&sessions),
            PlanGenerator::new(Arc::clone(&providers.generator), timeout),
            executor,
            AnswerComposer::new(providers.generator, timeout),
            speech,
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            index,
            sessions,
            embeddings,
            audio,
        }
    }

    /// Corpus from config: sled when `storage_path` is set (seeded from the
    /// JSON file while empty), otherwise the JSON file itself.
    pub async fn corpus_from_config(config: &GuideConfig) -> GuideResult<Arc<dyn CorpusSource>> {
        let json = JsonFileCorpus::new(&config.corpus_path);
        match &config.storage_path {
            Some(path) => {
                let store = SledCorpus::open(path)?;
                if store.is_empty() {
                    match store.seed_from(&json).await {
                        Ok(n) => info!(records = n, path = %path, "seeded sled corpus"),
                        Err(e) => warn!(error = %e, "could not seed sled corpus"),
                    }
                }
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(json)),
        }
    }

    /// Drops expired audio entries and idle sessions.
    pub fn sweep(&self) {
        let audio = self.audio.purge_expired();
        let sessions = self.sessions.evict_idle();
        if audio + sessions > 0 {
            info!(audio, sessions, "swept expired state");
        }
    }
}
