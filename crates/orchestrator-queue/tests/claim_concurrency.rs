// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Exactly-once claim under real concurrency: spec.md §8's property
//! that no two workers ever observe `running` on the same row.

use orchestrator_queue::store::TaskQueue;
use orchestrator_queue::task::QueueTask;
use orchestrator_queue::memory::InMemoryQueue;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn concurrent_workers_never_double_claim() {
    const TASKS: usize = 50;
    const WORKERS: usize = 16;

    let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryQueue::new(TASKS, Duration::from_secs(60)));
    let mut enqueued = HashSet::new();
    for i in 0..TASKS {
        let id = queue
            .enqueue(QueueTask::new("app", format!("wf-{i}"), serde_json::json!({})))
            .await
            .unwrap();
        enqueued.insert(id);
    }

    let mut handles = Vec::new();
    for w in 0..WORKERS {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                match queue.claim(&format!("worker-{w}")).await.unwrap() {
                    Some(task) => claimed.push(task.id),
                    None => break,
                }
            }
            claimed
        }));
    }

    let mut all_claimed = Vec::new();
    for handle in handles {
        all_claimed.extend(handle.await.unwrap());
    }

    let claimed_set: HashSet<_> = all_claimed.iter().copied().collect();
    assert_eq!(all_claimed.len(), claimed_set.len(), "a task id was claimed more than once");
    assert_eq!(claimed_set, enqueued, "every enqueued task was claimed exactly once");
}
