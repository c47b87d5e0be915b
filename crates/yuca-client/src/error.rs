use thiserror::Error;

/// Closed error kinds for the join protocol.
///
/// Individual attempt failures (network errors, rejections, redirects to a
/// dead leader) are consumed by the retry loop; what surfaces is whether
/// the budget ran out. Exhaustion is startup-fatal for the owning process.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("could not join cluster within {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("join client construction failed: {0}")]
    Client(#[from] reqwest::Error),
}
