//! Lightning channel balance snapshots used for solvency reconciliation.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Balances of a single Lightning channel, in satoshis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelBalance {
    /// Balance on the bridge's side.
    pub local_balance: u64,
    /// Balance on the peer's side.
    pub remote_balance: u64,
    /// Value locked in in-flight HTLCs.
    pub unsettled_balance: u64,
}

/// Aggregated channel balances at a point in time.
///
/// `combined_balance` is `local + remote`; unsettled value is tracked
/// separately and deliberately excluded from the solvency baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelBalanceSnapshot {
    /// When the balances were measured.
    pub date: DateTime<Utc>,
    /// Sum of local balances.
    pub total_local_balance: u64,
    /// Sum of remote balances.
    pub total_remote_balance: u64,
    /// Sum of unsettled balances.
    pub total_unsettled_balance: u64,
    /// `total_local_balance + total_remote_balance`.
    pub combined_balance: u64,
}

impl ChannelBalanceSnapshot {
    /// Sums the given channels into a snapshot dated `date`.
    #[must_use]
    pub fn from_channels(channels: &[ChannelBalance], date: DateTime<Utc>) -> Self {
        let (local, remote, unsettled) =
            channels
                .iter()
                .fold((0u64, 0u64, 0u64), |(l, r, u), channel| {
                    (
                        l.saturating_add(channel.local_balance),
                        r.saturating_add(channel.remote_balance),
                        u.saturating_add(channel.unsettled_balance),
                    )
                });
        Self {
            date,
            total_local_balance: local,
            total_remote_balance: remote,
            total_unsettled_balance: unsettled,
            combined_balance: local.saturating_add(remote),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_channels_and_excludes_unsettled_from_combined() {
        let channels = [
            ChannelBalance {
                local_balance: 100,
                remote_balance: 50,
                unsettled_balance: 7,
            },
            ChannelBalance {
                local_balance: 10,
                remote_balance: 5,
                unsettled_balance: 0,
            },
        ];
        let snap = ChannelBalanceSnapshot::from_channels(&channels, Utc::now());
        assert_eq!(snap.total_local_balance, 110);
        assert_eq!(snap.total_remote_balance, 55);
        assert_eq!(snap.total_unsettled_balance, 7);
        assert_eq!(snap.combined_balance, 165);
    }

    #[test]
    fn no_channels_is_all_zero() {
        let snap = ChannelBalanceSnapshot::from_channels(&[], Utc::now());
        assert_eq!(snap.combined_balance, 0);
        assert_eq!(snap.total_unsettled_balance, 0);
    }
}
