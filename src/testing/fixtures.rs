//! Ready-made configurations, orchestrators and data for tests.

use crate::checksum::attach_checksum;
use crate::clock::ManualClock;
use crate::config::OrchestratorConfig;
use crate::orchestrator::Orchestrator;
use crate::poller::PollConfig;
use crate::retry::RetryPolicy;
use crate::rpc::{Payload, ResultPage};
use crate::stream::PaginationConfig;
use serde::{Deserialize, Serialize};

/// Small delays and a short deadline so virtual-time tests stay readable.
///
/// Retries: 3 attempts, 10 ms doubling to at most 100 ms. Polling: every
/// 100 ms, deadline 1 s. Pages of 10.
#[must_use]
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            backoff_multiplier: 2.0,
        },
        poll: PollConfig {
            interval_ms: 100,
            max_interval_ms: 100,
            multiplier: 1.0,
            timeout_ms: 1000,
        },
        pagination: PaginationConfig {
            page_size: 10,
            max_pages: None,
        },
        verify_checksums: true,
    }
}

/// Orchestrator running on a fresh [`ManualClock`], returned alongside it.
#[must_use]
pub fn manual_orchestrator(config: OrchestratorConfig) -> (Orchestrator, ManualClock) {
    let clock = ManualClock::new();
    let orchestrator = Orchestrator::new(config).with_clock(clock.clone().into_shared());
    (orchestrator, clock)
}

/// Payload shaped like a secret value, with its checksum attached.
#[must_use]
pub fn sample_secret_payload() -> Payload {
    attach_checksum(b"my super secret data".to_vec())
}

/// A record type for listing fixtures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleFinding {
    pub name: String,
    pub category: String,
    pub state: String,
}

/// `count` findings spread over three categories, alternating active/inactive.
#[must_use]
pub fn sample_findings(count: usize) -> Vec<SampleFinding> {
    const CATEGORIES: [&str; 3] = ["OPEN_FIREWALL", "PUBLIC_BUCKET_ACL", "WEAK_PASSWORD"];
    (0..count)
        .map(|i| SampleFinding {
            name: format!("organizations/1/sources/2/findings/f{i}"),
            category: CATEGORIES[i % CATEGORIES.len()].to_string(),
            state: if i % 2 == 0 { "ACTIVE" } else { "INACTIVE" }.to_string(),
        })
        .collect()
}

/// `pages` pages of `per_page` consecutive numbers linked by tokens `t1`, `t2`, ...
#[must_use]
pub fn numbered_pages(pages: u32, per_page: u32) -> Vec<ResultPage<u32>> {
    (0..pages)
        .map(|p| {
            let items = (p * per_page..(p + 1) * per_page).collect();
            if p + 1 == pages {
                ResultPage::last(items)
            } else {
                ResultPage::with_token(items, format!("t{}", p + 1))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_config_is_valid() {
        assert!(fast_config().validate().is_ok());
    }

    #[test]
    fn test_numbered_pages_chain() {
        let pages = numbered_pages(3, 2);
        assert_eq!(pages[0].continuation(), Some("t1"));
        assert_eq!(pages[1].items, vec![2, 3]);
        assert_eq!(pages[2].continuation(), None);
    }
}
