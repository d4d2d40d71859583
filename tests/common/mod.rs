#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use kbase::app::{KnowledgeBase, Parts};
use kbase::blob::{blob_key, BlobStore};
use kbase::config::Config;
use kbase::embedding::EmbeddingGateway;
use kbase::llm::{ChatMessage, CompletionClient, CompletionOptions};
use kbase::memory::InMemoryStore;
use kbase::store::query_terms;

pub const DIMS: usize = 64;

/// Bag-of-words embedder: every term adds 1.0 to a hashed bucket. Texts that
/// share words get similar vectors, which is all ranking tests need.
pub struct FakeEmbedder {
    /// Texts containing this marker fail to embed.
    pub fail_marker: Option<String>,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self { fail_marker: None }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
        }
    }
}

fn bucket(term: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in term.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

pub fn fake_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMS];
    for term in query_terms(text) {
        vector[bucket(&term)] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingGateway for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embedder"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn try_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                bail!("embedding service unavailable");
            }
        }
        Ok(texts.iter().map(|t| fake_vector(t)).collect())
    }
}

/// Chat model that answers every call with the same scripted reply and
/// records what it was asked.
pub struct ScriptedLlm {
    reply: Option<String>,
    pub calls: Mutex<Vec<(Vec<ChatMessage>, CompletionOptions)>>,
}

impl ScriptedLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The user message of the most recent call.
    pub fn last_prompt(&self) -> String {
        let calls = self.calls.lock().unwrap();
        let (messages, _) = calls.last().expect("llm was never called");
        messages.last().map(|m| m.content.clone()).unwrap_or_default()
    }

    pub fn last_options(&self) -> CompletionOptions {
        let calls = self.calls.lock().unwrap();
        calls.last().expect("llm was never called").1
    }
}

#[async_trait]
impl CompletionClient for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), options));
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => bail!("model overloaded"),
        }
    }
}

#[derive(Default)]
pub struct MemoryBlobs {
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn put(&self, content_id: &str, ext: &str, bytes: &[u8]) -> Result<String> {
        let key = blob_key(content_id, ext);
        self.blobs
            .lock()
            .unwrap()
            .insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }
}

/// Everything a pipeline test needs to inspect after driving the services.
pub struct Harness {
    pub kb: KnowledgeBase,
    pub store: Arc<InMemoryStore>,
    pub blobs: Arc<MemoryBlobs>,
    pub llm: Arc<ScriptedLlm>,
}

pub fn test_config() -> Config {
    let mut config = Config::minimal("unused.sqlite");
    config.chunking.max_chars = 200;
    config.chunking.overlap_chars = 20;
    config
}

pub fn harness_with(embedder: FakeEmbedder, llm: ScriptedLlm) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let blobs = Arc::new(MemoryBlobs::default());
    let llm = Arc::new(llm);

    let kb = KnowledgeBase::from_parts(
        &test_config(),
        Parts {
            blobs: blobs.clone(),
            metadata: store.clone(),
            index: store.clone(),
            embedder: Arc::new(embedder),
            llm: llm.clone(),
            http: reqwest::Client::new(),
        },
    )
    .unwrap();

    Harness {
        kb,
        store,
        blobs,
        llm,
    }
}

pub fn harness(llm: ScriptedLlm) -> Harness {
    harness_with(FakeEmbedder::new(), llm)
}

/// Config for an on-disk knowledge base rooted in a temp dir.
pub fn disk_config(tmp: &TempDir) -> Config {
    let mut config = Config::minimal(tmp.path().join("data/kb.sqlite"));
    config.storage.root = tmp.path().join("data/blobs");
    config
}

pub const RAFT_NOTE: &str = "Raft elects a leader using randomized election timeouts. \
The leader replicates log entries to followers and commits them once a majority acknowledges.";

pub const COFFEE_NOTE: &str = "Espresso is brewed by forcing hot water through finely ground coffee. \
A good shot takes about twenty five seconds.";
