use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Default)]
pub struct RaftOptions {
    pub leader_heartbeat_duration: Option<Duration>,
    pub follower_min_timeout: Option<Duration>,
    pub follower_max_timeout: Option<Duration>,
    pub leader_append_entries_timeout: Option<Duration>,
    /// Upper bound for any single RPC to a peer.
    pub rpc_timeout: Option<Duration>,
    /// Connections kept per peer.
    pub max_pool: Option<usize>,
    pub max_entries_per_append: Option<usize>,
}

pub(super) struct RaftOptionsValidated {
    pub leader_heartbeat_duration: Duration,
    pub follower_min_timeout: Duration,
    pub follower_max_timeout: Duration,
    pub leader_append_entries_timeout: Duration,
    pub rpc_timeout: Duration,
    pub max_pool: usize,
    pub max_entries_per_append: usize,
}

impl RaftOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.leader_heartbeat_duration * 10 > self.follower_min_timeout {
            return Err("Leader's heartbeat must be at most a tenth of the follower minimum timeout");
        }
        if self.follower_min_timeout >= self.follower_max_timeout {
            return Err("Follower minimum timeout must be less than maximum timeout");
        }
        if self.leader_append_entries_timeout >= self.follower_min_timeout {
            return Err("Leader's AppendEntries RPC timeout must be less than the follower's minimum timeout");
        }
        if self.max_pool == 0 {
            return Err("Connection pool must hold at least one connection per peer");
        }
        if self.max_entries_per_append == 0 {
            return Err("AppendEntries must be allowed to carry at least one entry");
        }

        Ok(())
    }
}

impl TryFrom<RaftOptions> for RaftOptionsValidated {
    type Error = &'static str;

    fn try_from(options: RaftOptions) -> Result<Self, Self::Error> {
        let values = RaftOptionsValidated {
            leader_heartbeat_duration: options.leader_heartbeat_duration.unwrap_or(Duration::from_millis(100)),
            follower_min_timeout: options.follower_min_timeout.unwrap_or(Duration::from_millis(1000)),
            follower_max_timeout: options.follower_max_timeout.unwrap_or(Duration::from_millis(2000)),
            leader_append_entries_timeout: options
                .leader_append_entries_timeout
                .unwrap_or(Duration::from_millis(300)),
            rpc_timeout: options.rpc_timeout.unwrap_or(Duration::from_secs(10)),
            max_pool: options.max_pool.unwrap_or(3),
            max_entries_per_append: options.max_entries_per_append.unwrap_or(64),
        };

        values.validate()?;
        Ok(values)
    }
}
