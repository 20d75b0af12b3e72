use crate::agent::controller::Controller;
use crate::agent::outcome::RunReport;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// answer independent questions concurrently, at most `concurrency` at a time.
///
/// every question is its own invocation with its own state; reports come
/// back in the order the questions were given.
pub async fn run_batch(
    controller: Arc<Controller>,
    questions: Vec<String>,
    max_iterations: u32,
    concurrency: usize,
    cancel: CancellationToken,
) -> Vec<(String, RunReport)> {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = questions.len();
    // kept so a crashed task still gets a report under its question
    let asked = questions.clone();

    tracing::info!(total, concurrency, "starting batch");

    let mut join_set = JoinSet::new();

    for (idx, question) in questions.into_iter().enumerate() {
        let controller = Arc::clone(&controller);
        let permits = Arc::clone(&permits);
        let cancel = cancel.clone();

        let span = tracing::info_span!("batch_item", batch.index = idx);

        join_set.spawn(
            async move {
                // the semaphore lives as long as this function, so acquire can't fail
                let _permit = permits.acquire_owned().await.ok();
                let report = controller
                    .run_with_cancel(&question, max_iterations, &cancel)
                    .await;
                (idx, question, report)
            }
            .instrument(span),
        );
    }

    let mut slots: Vec<Option<(String, RunReport)>> = (0..total).map(|_| None).collect();
    let mut failures = 0;

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, question, report)) => slots[idx] = Some((question, report)),
            Err(e) => {
                tracing::error!("batch task join error: {}", e);
                failures += 1;
            }
        }
    }

    let reports: Vec<(String, RunReport)> = slots
        .into_iter()
        .zip(asked)
        .map(|(slot, question)| {
            slot.unwrap_or_else(|| {
                (question, RunReport::aborted("invocation task failed before reporting"))
            })
        })
        .collect();

    tracing::info!(
        completed = reports.len(),
        failures,
        succeeded = reports.iter().filter(|(_, r)| r.is_success()).count(),
        "batch complete"
    );

    reports
}
