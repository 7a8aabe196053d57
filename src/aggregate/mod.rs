use std::collections::BTreeMap;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::Mode;
use crate::core::{Dataset, Statistics, TypeStatistics, utilization};
use crate::process::ProcessOutcome;

/// 種別ごとの合計をデータセット全体の統計に畳み込む。updateCount は
/// 前回値（無ければ 0）に 1 を加えた、実行をまたぐ唯一の状態。
pub fn aggregate(
    dataset: &mut Dataset,
    outcome: &ProcessOutcome,
    mode: Mode,
    now: OffsetDateTime,
) -> Statistics {
    let by_type: BTreeMap<_, _> = outcome
        .totals
        .iter()
        .map(|(vehicle_type, totals)| {
            (
                *vehicle_type,
                TypeStatistics {
                    capacity: totals.capacity,
                    available: totals.available,
                    utilization: utilization(totals.capacity, totals.available),
                },
            )
        })
        .collect();

    let total_capacity: i64 = by_type.values().map(|t| t.capacity).sum();
    let total_available: i64 = by_type.values().map(|t| t.available).sum();

    let statistics = Statistics {
        total_capacity,
        total_available,
        overall_utilization: utilization(total_capacity, total_available),
        by_type,
        location_count: dataset.locations.len(),
        issue_count: outcome.issues.len() as u64,
        fix_count: outcome.fixes.len() as u64,
        mode: mode.as_str().to_string(),
        last_updated: now.format(&Rfc3339).ok(),
        update_count: dataset.statistics.update_count + 1,
    };

    dataset.statistics = statistics.clone();
    statistics
}
