use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::collector::{PriceCache, PriceSource};

const INITIAL_BACKOFF: Duration = Duration::from_secs(5);

/// Next delay after a failed refresh: doubles, never above the interval.
fn next_backoff(current: Duration, interval: Duration) -> Duration {
    (current * 2).min(interval)
}

pub fn spawn<S>(cache: Arc<PriceCache>, source: S, interval: Duration)
where
    S: PriceSource + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut backoff = INITIAL_BACKOFF.min(interval);
        loop {
            let sleep_duration = match cache.refresh(&source).await {
                Ok(()) => {
                    backoff = INITIAL_BACKOFF.min(interval);
                    interval
                }
                Err(e) => {
                    error!("Failed to refresh prices: {e}");
                    let wait = backoff;
                    backoff = next_backoff(backoff, interval);
                    wait
                }
            };
            info!("Next refresh in {}s", sleep_duration.as_secs());
            tokio::time::sleep(sleep_duration).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_interval() {
        let interval = Duration::from_secs(300);
        let mut d = INITIAL_BACKOFF;
        let mut seen = vec![];
        for _ in 0..8 {
            seen.push(d.as_secs());
            d = next_backoff(d, interval);
        }
        assert_eq!(seen, vec![5, 10, 20, 40, 80, 160, 300, 300]);
    }
}
