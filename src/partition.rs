//! Splitting jobs into batches that fit the backend's input budget.

use crate::error::TranslateError;
use crate::job::Job;
use crate::tokens::TokenEstimator;
use tracing::debug;

/// A contiguous slice of a job together with its estimated input size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub job: Job,
    pub input_tokens: usize,
}

/// Halve `job` until every part fits into `limit` tokens together with `prompt`.
///
/// Oversized parts are replaced in place by their two halves (the left half
/// takes `n / 2` keys) and re-examined before moving on, so the output keeps
/// the original key order. Fails with [`TranslateError::OversizeEntry`] when a
/// part that no longer splits still does not fit.
pub fn partition<E>(
    job: Job,
    prompt: &str,
    limit: usize,
    estimator: &E,
) -> Result<Vec<Batch>, TranslateError>
where
    E: TokenEstimator + ?Sized,
{
    if job.is_empty() {
        return Ok(Vec::new());
    }

    let mut parts = vec![job];
    let mut fitted = Vec::with_capacity(1);
    let mut idx = 0;

    while idx < parts.len() {
        let tokens = estimator.estimate(prompt, &parts[idx]);
        if tokens <= limit {
            fitted.push(tokens);
            idx += 1;
            continue;
        }

        let part = std::mem::take(&mut parts[idx]);
        if part.len() < 2 {
            return Err(TranslateError::OversizeEntry {
                key: part.keys().next().map(str::to_string),
                tokens,
                limit,
            });
        }

        debug!(
            "Batch of {} keys needs {} tokens (limit {}), splitting",
            part.len(),
            tokens,
            limit
        );
        let midpoint = part.len() / 2;
        let (left, right) = part.split_at(midpoint);
        parts[idx] = left;
        parts.insert(idx + 1, right);
    }

    Ok(parts
        .into_iter()
        .zip(fitted)
        .map(|(job, input_tokens)| Batch { job, input_tokens })
        .collect())
}
