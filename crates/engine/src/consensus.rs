//! Consensus Engine (spec.md §4.7 — "the hard part"): committee fan-out
//! under a three-phase deadline policy, conductor synthesis, confidence
//! scoring, and exact-key caching of outcomes.
//!
//! Grounded on `original_source/core/consensus.py`'s `vote()` (the
//! authoritative source for the `asyncio.wait(..., return_when=
//! FIRST_COMPLETED)` → grace → hard → cancel-pending sequence),
//! reimplemented with `tokio::spawn` + `JoinHandle::abort_handle()`
//! captured before each `tokio::select!`, following the teacher's
//! `speculative.rs` P0-fix discipline ("get abort handles before select,
//! which moves the JoinHandles").

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant as TokioInstant};

use orchestrator_core::traits::GenerateOptions;
use orchestrator_core::{CacheBackend, CommitteeMember, LanguageModel, Mode, ModeConfig, Vote, VoteOutcome, VoteStatus};
use orchestrator_llm::HeavyGate;

use crate::context::ContextBuilder;
use crate::EngineError;

const FIXED_CONSTRAINTS_LINE: &str = "Constraints: be concise and faithful to the context. Do not invent acronyms.";
const CONDUCTOR_TIMEOUT_S: f32 = 10.0;
const VOTE_CACHE_PREFIX: &str = "vote";

pub fn mode_name(mode: Mode) -> &'static str {
    match mode {
        Mode::Precision => "precision",
        Mode::Interactive => "interactive",
    }
}

pub struct ConsensusEngine {
    llm: Arc<dyn LanguageModel>,
    gate: Arc<HeavyGate>,
    cache_backend: Arc<dyn CacheBackend>,
    context_builder: Arc<ContextBuilder>,
    glossary_terms: Vec<String>,
    cache_ttl_s: u64,
}

impl ConsensusEngine {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        gate: Arc<HeavyGate>,
        cache_backend: Arc<dyn CacheBackend>,
        context_builder: Arc<ContextBuilder>,
        glossary_terms: Vec<String>,
        cache_ttl_s: u64,
    ) -> Self {
        Self { llm, gate, cache_backend, context_builder, glossary_terms, cache_ttl_s }
    }

    fn exact_key(&self, prompt: &str, context: &str, mode: Mode, config_path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        hasher.update(b"|");
        hasher.update(context.as_bytes());
        hasher.update(b"|");
        hasher.update(mode_name(mode).as_bytes());
        hasher.update(b"|");
        hasher.update(config_path.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    async fn cache_get(&self, key: &str) -> Option<VoteOutcome> {
        let raw = self.cache_backend.get(&format!("{VOTE_CACHE_PREFIX}:{key}")).await?;
        serde_json::from_str(&raw).ok()
    }

    /// Same TTL for `ok` and `timeout` outcomes — spec.md Design Notes §9's
    /// Open Question is resolved by preserving the source's behavior
    /// (DESIGN.md records this).
    async fn cache_set(&self, key: &str, outcome: &VoteOutcome) {
        if let Ok(raw) = serde_json::to_string(outcome) {
            self.cache_backend
                .setex(&format!("{VOTE_CACHE_PREFIX}:{key}"), self.cache_ttl_s, raw)
                .await;
        }
    }

    /// `vote(prompt, context, mode, config-path) -> VoteOutcome` (spec.md
    /// §4.7). `mode_config` is already loaded and validated by the caller
    /// (configuration load is a hard-failure concern handled at the HTTP
    /// boundary, spec.md §7) — `config_path` is passed through only to
    /// compute the exact cache key's config fingerprint.
    pub async fn vote(
        &self,
        prompt: &str,
        context: &str,
        mode: Mode,
        config_path: &str,
        mode_config: &ModeConfig,
    ) -> Result<VoteOutcome, EngineError> {
        let key = self.exact_key(prompt, context, mode, config_path);
        if let Some(mut cached) = self.cache_get(&key).await {
            cached.cache_hit = true;
            return Ok(cached);
        }

        let committee = &mode_config.committee;

        let unique_models: Vec<String> = {
            let mut seen = HashSet::new();
            committee
                .iter()
                .map(|m| m.model_id.clone())
                .filter(|m| seen.insert(m.clone()))
                .collect()
        };
        self.llm.prewarm(&unique_models).await;

        let grounded_context = self
            .context_builder
            .build_context(context, &self.glossary_terms)
            .map_err(|e| EngineError::Context(e.to_string()))?;

        let start = TokioInstant::now();
        let mut handles: Vec<JoinHandle<Vote>> = Vec::with_capacity(committee.len());
        for member in committee {
            let llm = Arc::clone(&self.llm);
            let gate = Arc::clone(&self.gate);
            let member = member.clone();
            let grounded_context = grounded_context.clone();
            let prompt = prompt.to_string();
            handles.push(tokio::spawn(async move {
                ask_member(llm, gate, member, grounded_context, prompt).await
            }));
        }
        let abort_handles: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let mut pending: FuturesUnordered<JoinHandle<Vote>> = handles.into_iter().collect();

        let mut results: Vec<Vote> = Vec::new();

        // SOFT: wait for the earlier of soft-deadline or first completion.
        let soft_deadline = start + Duration::from_secs_f32(mode_config.soft_deadline_s);
        if !pending.is_empty() {
            tokio::select! {
                _ = sleep_until(soft_deadline) => {},
                maybe = pending.next() => {
                    if let Some(Ok(vote)) = maybe { results.push(vote); }
                }
            }
        }
        drain_ready(&mut pending, &mut results);

        let have_heavy = |results: &[Vote]| {
            committee
                .iter()
                .filter(|m| self.gate.is_heavy(&m.model_id))
                .any(|m| results.iter().any(|r| r.success && r.model_id == m.model_id))
        };

        // GRACE: only if require_heavy and no heavy success yet.
        if mode_config.require_heavy && !have_heavy(&results) && !pending.is_empty() {
            let grace_deadline = TokioInstant::now() + Duration::from_secs_f32(mode_config.grace_s);
            tokio::select! {
                _ = sleep_until(grace_deadline) => {},
                maybe = pending.next() => {
                    if let Some(Ok(vote)) = maybe { results.push(vote); }
                }
            }
            drain_ready(&mut pending, &mut results);
        }

        // HARD: only if still no heavy success.
        if mode_config.require_heavy && !have_heavy(&results) && !pending.is_empty() {
            let hard_deadline = start + Duration::from_secs_f32(mode_config.hard_deadline_s);
            tokio::select! {
                _ = sleep_until(hard_deadline) => {},
                maybe = pending.next() => {
                    if let Some(Ok(vote)) = maybe { results.push(vote); }
                }
            }
            drain_ready(&mut pending, &mut results);
        }

        // CLOSED: cancel everything still pending. Cooperative — cancelled
        // tasks may still run to their next .await point, but their
        // eventual results are discarded (we drop `pending` without
        // draining further).
        for handle in abort_handles {
            handle.abort();
        }

        let elapsed_s = start.elapsed().as_secs_f64();

        if mode_config.require_heavy && !have_heavy(&results) {
            let outcome = VoteOutcome {
                status: VoteStatus::Timeout,
                final_answer: "precision mode: heavy model unavailable".to_string(),
                votes: results,
                confidence: 0.0,
                elapsed_s,
                mode,
                cache_hit: false,
            };
            self.cache_set(&key, &outcome).await;
            return Ok(outcome);
        }

        // Single-member shortcut.
        if committee.len() == 1 {
            if let Some(only) = results.first() {
                if only.success {
                    let outcome = VoteOutcome {
                        status: VoteStatus::Ok,
                        final_answer: only.answer.clone(),
                        votes: results.clone(),
                        confidence: 0.9,
                        elapsed_s,
                        mode,
                        cache_hit: false,
                    };
                    self.cache_set(&key, &outcome).await;
                    return Ok(outcome);
                }
            }
        }

        let valid: Vec<&Vote> = results.iter().filter(|v| v.success).collect();

        let conductor_prompt = format!(
            "{}\nContext:\n{}\n\nCommittee answers:\n{}\n\nProduce a single short synthesis faithful to context.",
            mode_config.conductor.system_prompt,
            grounded_context,
            serde_json::to_string(&valid).unwrap_or_default(),
        );

        let conductor_opts = GenerateOptions {
            max_tokens: mode_config.conductor.max_tokens,
            temperature: mode_config.conductor.temperature,
            top_p: mode_config.conductor.top_p,
            repetition_penalty: mode_config.conductor.repetition_penalty,
        };

        let final_answer = match self
            .llm
            .generate(&mode_config.conductor.model_id, &conductor_prompt, conductor_opts, CONDUCTOR_TIMEOUT_S)
            .await
        {
            Ok(text) => text,
            Err(e) => sentinel_for(&e, CONDUCTOR_TIMEOUT_S),
        };

        let base = if valid.iter().any(|v| self.gate.is_heavy(&v.model_id)) { 0.7 } else { 0.55 };
        let confidence = round2((base + 0.15_f32).min(0.95));

        let outcome = VoteOutcome {
            status: VoteStatus::Ok,
            final_answer,
            votes: results,
            confidence,
            elapsed_s,
            mode,
            cache_hit: false,
        };
        self.cache_set(&key, &outcome).await;
        Ok(outcome)
    }
}

fn drain_ready(pending: &mut FuturesUnordered<JoinHandle<Vote>>, results: &mut Vec<Vote>) {
    while let Some(Some(Ok(vote))) = pending.next().now_or_never() {
        results.push(vote);
    }
}

async fn ask_member(
    llm: Arc<dyn LanguageModel>,
    gate: Arc<HeavyGate>,
    member: CommitteeMember,
    grounded_context: String,
    question: String,
) -> Vote {
    let full_prompt = format!(
        "{}\n{}\n\nQuestion:\n{}\n\n{}",
        member.system_prompt, grounded_context, question, FIXED_CONSTRAINTS_LINE
    );
    let options = GenerateOptions {
        max_tokens: member.max_tokens,
        temperature: member.temperature,
        top_p: member.top_p,
        repetition_penalty: member.repetition_penalty,
    };

    let _guard = gate.acquire(&member.model_id).await;
    match llm.generate(&member.model_id, &full_prompt, options, member.per_call_timeout_s).await {
        Ok(answer) => Vote { role: member.role, model_id: member.model_id, answer, success: true },
        Err(e) => Vote {
            role: member.role,
            model_id: member.model_id,
            answer: sentinel_for(&e, member.per_call_timeout_s),
            success: false,
        },
    }
}

/// Byte-compatible sentinel strings for interop, produced only at this
/// boundary (spec.md §4.1, Design Notes §9) — the adapter itself returns a
/// typed `Result`.
fn sentinel_for(err: &orchestrator_core::Error, timeout_s: f32) -> String {
    let msg = err.to_string();
    if msg.contains("timed out") {
        format!("[TIMEOUT_{timeout_s}s]")
    } else {
        format!("[ERROR {msg}]")
    }
}

fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use orchestrator_core::CacheBackend as _;

    struct FakeBackend {
        calls: AtomicUsize,
        behavior: fn(&str) -> FakeBehavior,
    }

    enum FakeBehavior {
        Echo,
        Error,
        Sleep(f32),
    }

    #[async_trait]
    impl LanguageModel for FakeBackend {
        async fn generate(
            &self,
            model_id: &str,
            _prompt: &str,
            _options: GenerateOptions,
            timeout_s: f32,
        ) -> Result<String, orchestrator_core::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match (self.behavior)(model_id) {
                FakeBehavior::Echo => Ok(format!("answer from {model_id}")),
                FakeBehavior::Error => Err(orchestrator_core::Error::Llm("boom".to_string())),
                FakeBehavior::Sleep(extra) => {
                    tokio::time::sleep(StdDuration::from_secs_f32(timeout_s + extra)).await;
                    Err(orchestrator_core::Error::Llm("request timed out after Xs".to_string()))
                }
            }
        }

        async fn prewarm(&self, _model_ids: &[String]) {}

        async fn health_check(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct MemBackend {
        map: dashmap_shim::Map,
    }

    mod dashmap_shim {
        use std::collections::HashMap;
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct Map(pub Mutex<HashMap<String, String>>);
    }

    #[async_trait]
    impl CacheBackend for MemBackend {
        async fn get(&self, key: &str) -> Option<String> {
            self.map.0.lock().unwrap().get(key).cloned()
        }
        async fn setex(&self, key: &str, _ttl_s: u64, value: String) {
            self.map.0.lock().unwrap().insert(key.to_string(), value);
        }
        async fn scan_prefix(&self, _prefix: &str, _limit: usize) -> Vec<String> {
            Vec::new()
        }
    }

    fn member(role: &str, model_id: &str) -> CommitteeMember {
        CommitteeMember {
            role: role.to_string(),
            model_id: model_id.to_string(),
            system_prompt: "You are helpful.".to_string(),
            max_tokens: 64,
            temperature: 0.2,
            top_p: 0.9,
            repetition_penalty: 1.1,
            per_call_timeout_s: 2.0,
        }
    }

    fn glossary_path() -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        f.write_all(b"terms: {}\nnotes: {constraints: \"\"}\n").unwrap();
        f
    }

    fn engine(llm: Arc<dyn LanguageModel>) -> (ConsensusEngine, tempfile::NamedTempFile) {
        let f = glossary_path();
        let gate = Arc::new(HeavyGate::new(1, vec!["32b".to_string()]));
        let cache: Arc<dyn CacheBackend> = Arc::new(MemBackend::default());
        let ctx = Arc::new(ContextBuilder::new(f.path().to_str().unwrap().to_string()));
        (ConsensusEngine::new(llm, gate, cache, ctx, vec![], 3600), f)
    }

    fn two_member_config(require_heavy: bool) -> ModeConfig {
        ModeConfig {
            committee: vec![member("analyst", "llama3.2:3b"), member("creative", "llama3.2:3b")],
            soft_deadline_s: 2.0,
            grace_s: 1.0,
            hard_deadline_s: 4.0,
            require_heavy,
            conductor: member("conductor", "llama3.2:3b"),
        }
    }

    #[tokio::test]
    async fn consensus_like_scenario_returns_ok_with_two_votes() {
        let llm: Arc<dyn LanguageModel> = Arc::new(FakeBackend {
            calls: AtomicUsize::new(0),
            behavior: |_| FakeBehavior::Echo,
        });
        let (engine, _f) = engine(llm);
        let cfg = two_member_config(false);
        let out = engine.vote("question", "", Mode::Interactive, "cfg.yaml", &cfg).await.unwrap();
        assert_eq!(out.status, VoteStatus::Ok);
        assert_eq!(out.votes.len(), 2);
        assert!(out.confidence >= 0.55 && out.confidence <= 1.0);
        assert!(!out.final_answer.is_empty());
    }

    #[tokio::test]
    async fn partial_failure_still_produces_ok_outcome() {
        let llm: Arc<dyn LanguageModel> = Arc::new(FakeBackend {
            calls: AtomicUsize::new(0),
            behavior: |model_id| if model_id == "bad" { FakeBehavior::Error } else { FakeBehavior::Echo },
        });
        let (engine, _f) = engine(llm);
        let mut cfg = two_member_config(false);
        cfg.committee[0].model_id = "bad".to_string();
        let out = engine.vote("question", "", Mode::Interactive, "cfg.yaml", &cfg).await.unwrap();
        assert_eq!(out.status, VoteStatus::Ok);
        assert!(out.votes.iter().any(|v| !v.success));
        assert!(out.confidence >= 0.55);
        assert!(!out.final_answer.is_empty());
    }

    #[tokio::test]
    async fn heavy_timeout_yields_timeout_status_and_zero_confidence() {
        let llm: Arc<dyn LanguageModel> = Arc::new(FakeBackend {
            calls: AtomicUsize::new(0),
            behavior: |_| FakeBehavior::Sleep(5.0),
        });
        let (engine, _f) = engine(llm);
        let mut cfg = two_member_config(true);
        cfg.committee = vec![member("analyst", "qwen32b-instruct")];
        cfg.conductor = member("conductor", "qwen32b-instruct");
        cfg.soft_deadline_s = 0.1;
        cfg.grace_s = 0.1;
        cfg.hard_deadline_s = 0.3;
        cfg.committee[0].per_call_timeout_s = 10.0;

        let out = engine.vote("question", "", Mode::Precision, "cfg.yaml", &cfg).await.unwrap();
        assert_eq!(out.status, VoteStatus::Timeout);
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.final_answer, "precision mode: heavy model unavailable");
    }

    #[tokio::test]
    async fn cache_hit_on_second_call_skips_llm() {
        let calls = Arc::new(AtomicUsize::new(0));
        struct CountingBackend(Arc<AtomicUsize>);
        #[async_trait]
        impl LanguageModel for CountingBackend {
            async fn generate(
                &self,
                model_id: &str,
                _p: &str,
                _o: GenerateOptions,
                _t: f32,
            ) -> Result<String, orchestrator_core::Error> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(format!("answer from {model_id}"))
            }
            async fn prewarm(&self, _m: &[String]) {}
            async fn health_check(&self) -> bool {
                true
            }
        }
        let llm: Arc<dyn LanguageModel> = Arc::new(CountingBackend(calls.clone()));
        let (engine, _f) = engine(llm);
        let cfg = two_member_config(false);

        let out1 = engine.vote("q", "", Mode::Interactive, "cfg.yaml", &cfg).await.unwrap();
        assert!(!out1.cache_hit);
        let calls_after_first = calls.load(Ordering::SeqCst);
        assert!(calls_after_first > 0);

        let out2 = engine.vote("q", "", Mode::Interactive, "cfg.yaml", &cfg).await.unwrap();
        assert!(out2.cache_hit);
        assert_eq!(calls.load(Ordering::SeqCst), calls_after_first, "no new llm calls on cache hit");
    }
}
