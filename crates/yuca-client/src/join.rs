// Join protocol: register this node as a voter with the current leader,
// following leader-redirect hints

use std::time::Duration;

use tracing::{info, warn};

use yuca_api::{AddVoterRequest, WriteOutcome, http_base};

use crate::error::JoinError;

/// Join protocol settings for one startup attempt.
#[derive(Clone, Debug)]
pub struct JoinConfig {
    /// Address of any existing cluster member to contact first.
    pub seed_addr: String,
    /// Shared retry budget; redirects and failures both consume from it.
    pub max_retries: u32,
    /// Delay before the first attempt, letting the target cluster's leader
    /// election stabilize.
    pub settle_delay: Duration,
    /// Fixed delay between attempts, regardless of failure kind.
    pub backoff: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            seed_addr: String::new(),
            max_retries: 5,
            settle_delay: Duration::from_secs(10),
            backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Client side of the cluster-join protocol.
pub struct JoinClient {
    client: reqwest::Client,
    config: JoinConfig,
}

impl JoinClient {
    pub fn new(config: JoinConfig) -> Result<Self, JoinError> {
        // The redirect hint lives in the response body; transport-level
        // redirect following must stay off.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Register this node as a voter, retargeting on leader redirects.
    ///
    /// Returns once the leader acknowledges the membership change, or
    /// [`JoinError::Exhausted`] when the retry budget runs out.
    pub async fn join(&self, id: u64, address: &str) -> Result<(), JoinError> {
        let request = AddVoterRequest {
            id,
            address: address.to_string(),
        };

        info!(
            seed = %self.config.seed_addr,
            settle = ?self.config.settle_delay,
            "waiting for cluster to settle before joining"
        );
        tokio::time::sleep(self.config.settle_delay).await;

        let mut target = self.config.seed_addr.clone();
        for attempt in 1..=self.config.max_retries {
            match self.attempt(&target, &request).await {
                Ok(WriteOutcome::Ok) => {
                    info!(attempt, %target, "joined cluster as voter");
                    return Ok(());
                }
                Ok(WriteOutcome::Redirect { leader_addr }) if !leader_addr.is_empty() => {
                    info!(attempt, %target, %leader_addr, "redirected to leader");
                    target = leader_addr;
                }
                Ok(outcome) => {
                    warn!(attempt, %target, ?outcome, "join attempt rejected");
                }
                Err(e) => {
                    warn!(attempt, %target, "join attempt failed: {}", e);
                }
            }

            tokio::time::sleep(self.config.backoff).await;
        }

        Err(JoinError::Exhausted {
            attempts: self.config.max_retries,
        })
    }

    async fn attempt(
        &self,
        target: &str,
        request: &AddVoterRequest,
    ) -> Result<WriteOutcome, reqwest::Error> {
        let url = format!("{}/cluster/add-voter", http_base(target));
        let response = self.client.post(&url).json(request).send().await?;
        response.json::<WriteOutcome>().await
    }
}
