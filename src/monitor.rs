//! Asset silence and speed monitoring
//!
//! Neither check touches geofence state. Silence is tracked per asset in a
//! `DashMap` so positions can be recorded from any consumer worker while a
//! periodic sweep runs elsewhere.

use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::model::{AssetOffline, Position, SpeedLimitExceeded};

#[derive(Clone, Copy, Debug)]
struct LastSeen {
    at: OffsetDateTime,
    /// Offline already reported for this silence
    reported: bool,
}

#[derive(Default)]
pub struct OfflineMonitor {
    assets: DashMap<String, LastSeen>,
}

impl OfflineMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that the asset reported. Older timestamps never move it back.
    pub fn record(&self, position: &Position) {
        let at = position.timestamp();

        self.assets
            .entry(position.asset_id().to_string())
            .and_modify(|seen| {
                if at >= seen.at {
                    *seen = LastSeen { at, reported: false };
                }
            })
            .or_insert(LastSeen { at, reported: false });
    }

    pub fn last_seen(&self, asset_id: &str) -> Option<OffsetDateTime> {
        self.assets.get(asset_id).map(|seen| seen.at)
    }

    /// One event per asset silent for at least `threshold` at `now`.
    ///
    /// An asset is reported once per silence; it becomes eligible again
    /// after its next recorded position.
    pub fn sweep(&self, now: OffsetDateTime, threshold: Duration) -> Vec<AssetOffline> {
        let mut offline = vec![];

        for mut entry in self.assets.iter_mut() {
            let seen = entry.value_mut();
            if seen.reported || now - seen.at < threshold {
                continue;
            }
            seen.reported = true;

            debug!(asset_id = %entry.key(), last_seen = %entry.value().at, "Asset went silent");
            offline.push(AssetOffline::create(entry.key().clone(), entry.value().at, now));
        }

        offline
    }
}

/// Speed alert for a position above `limit_kmh`
pub fn check_speed(position: &Position, limit_kmh: f64) -> Option<SpeedLimitExceeded> {
    if position.speed() > limit_kmh {
        Some(SpeedLimitExceeded::create(limit_kmh, position.clone()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn seen(asset: &str, at: OffsetDateTime) -> Position {
        Position::basic(asset, 54.97, -1.61, at).expect("valid position")
    }

    #[test]
    fn reports_silent_assets_once() {
        let monitor = OfflineMonitor::new();
        monitor.record(&seen("A", datetime!(2024-03-01 11:00 UTC)));
        monitor.record(&seen("B", datetime!(2024-03-01 11:58 UTC)));

        let now = datetime!(2024-03-01 12:00 UTC);
        let offline = monitor.sweep(now, Duration::minutes(5));
        assert_eq!(1, offline.len());
        assert_eq!("A", offline[0].asset_id);
        assert_eq!(Duration::hours(1), offline[0].silence_duration);
        assert_eq!(datetime!(2024-03-01 11:00 UTC), offline[0].last_seen_at);

        // A was already reported and B has only been quiet for 3 minutes
        assert!(monitor.sweep(now + Duration::minutes(1), Duration::minutes(5)).is_empty());
        assert_eq!(1, monitor.sweep(now + Duration::minutes(10), Duration::minutes(5)).len());
    }

    #[test]
    fn new_report_rearms() {
        let monitor = OfflineMonitor::new();
        monitor.record(&seen("A", datetime!(2024-03-01 11:00 UTC)));
        assert_eq!(1, monitor.sweep(datetime!(2024-03-01 12:00 UTC), Duration::minutes(5)).len());

        monitor.record(&seen("A", datetime!(2024-03-01 12:01 UTC)));
        assert!(monitor.sweep(datetime!(2024-03-01 12:02 UTC), Duration::minutes(5)).is_empty());
        assert_eq!(1, monitor.sweep(datetime!(2024-03-01 12:30 UTC), Duration::minutes(5)).len());
    }

    #[test]
    fn late_report_does_not_rewind() {
        let monitor = OfflineMonitor::new();
        monitor.record(&seen("A", datetime!(2024-03-01 12:00 UTC)));
        monitor.record(&seen("A", datetime!(2024-03-01 11:00 UTC)));

        assert_eq!(Some(datetime!(2024-03-01 12:00 UTC)), monitor.last_seen("A"));
        assert_eq!(None, monitor.last_seen("B"));
    }

    #[test]
    fn speed_above_limit() {
        let ts = datetime!(2024-03-01 12:00 UTC);
        let fast = Position::builder("CAR", 54.0, -1.0, ts).speed(95.0).build().expect("valid position");
        let legal = Position::builder("CAR", 54.0, -1.0, ts).speed(50.0).build().expect("valid position");

        let alert = check_speed(&fast, 70.0);
        assert_eq!(Some(95.0), alert.map(|a| a.current_speed_kmh));
        assert!(check_speed(&legal, 70.0).is_none());
        assert!(check_speed(&legal, 50.0).is_none());
    }
}
