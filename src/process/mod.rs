use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{
    Dataset, Fix, Issue, Location, PipelineError, Recommendation, Severity, VehicleType,
    coerce_int, utilization,
};
use crate::logs::Logger;

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub force_fix: bool,
    pub min_capacity: i64,
    pub max_capacity: i64,
    pub default_count: i64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub batch_size: usize,
    pub budget: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeTotals {
    pub capacity: i64,
    pub available: i64,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub issues: Vec<Issue>,
    pub fixes: Vec<Fix>,
    pub recommendations: Vec<Recommendation>,
    pub totals: BTreeMap<VehicleType, TypeTotals>,
    pub processed: usize,
    pub elapsed: Duration,
}

pub struct RecordProcessor<'a> {
    opts: ProcessorOptions,
    logger: &'a Logger,
}

impl<'a> RecordProcessor<'a> {
    pub fn new(opts: ProcessorOptions, logger: &'a Logger) -> Self {
        Self { opts, logger }
    }

    /// 全ロケーションをバッチ単位で検証・補正する。構造警告（ローダー由来）は
    /// ここで合流させ、各ロケーションの validationIssues に算入する。
    pub fn process(
        &self,
        dataset: &mut Dataset,
        structural: Vec<Issue>,
        now: OffsetDateTime,
    ) -> Result<ProcessOutcome> {
        let start = Instant::now();

        let mut structural_counts: BTreeMap<String, u64> = BTreeMap::new();
        for warning in &structural {
            *structural_counts.entry(warning.location.clone()).or_default() += 1;
        }

        let mut outcome = ProcessOutcome {
            issues: structural,
            fixes: Vec::new(),
            recommendations: Vec::new(),
            totals: VehicleType::ALL
                .into_iter()
                .map(|t| (t, TypeTotals::default()))
                .collect(),
            processed: 0,
            elapsed: Duration::ZERO,
        };

        let now_s = now
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());
        let batch_size = self.opts.batch_size.max(1);

        for chunk in dataset.locations.chunks_mut(batch_size) {
            let elapsed = start.elapsed();
            if elapsed > self.opts.budget {
                self.logger.error(
                    "処理時間が上限を超えたため中断します",
                    Some(json!({
                        "budget_ms": self.opts.budget.as_millis() as u64,
                        "elapsed_ms": elapsed.as_millis() as u64,
                        "processed": outcome.processed,
                    })),
                );
                return Err(PipelineError::Timeout {
                    budget: self.opts.budget,
                    elapsed,
                }
                .into());
            }

            for location in chunk {
                self.process_location(location, &structural_counts, &now_s, &mut outcome);
                outcome.processed += 1;
            }
        }

        outcome.elapsed = start.elapsed();
        self.logger.info(
            "検証が完了しました",
            Some(json!({
                "locations": outcome.processed,
                "issues": outcome.issues.len(),
                "fixes": outcome.fixes.len(),
                "elapsed_ms": outcome.elapsed.as_millis() as u64,
            })),
        );
        Ok(outcome)
    }

    fn process_location(
        &self,
        location: &mut Location,
        structural_counts: &BTreeMap<String, u64>,
        now_s: &str,
        outcome: &mut ProcessOutcome,
    ) {
        let name = location.name.clone();
        let issues_before = outcome.issues.len();

        for vehicle_type in VehicleType::ALL {
            let slot = location.slot_mut(vehicle_type);
            let raw_total = slot.total.clone();
            let raw_available = slot.available.clone();

            let parsed_total = coerce_int(&raw_total, self.opts.default_count);
            if parsed_total.warned {
                outcome.issues.push(Issue {
                    severity: Severity::Warning,
                    location: name.clone(),
                    vehicle_type: Some(vehicle_type),
                    message: format!(
                        "{}の収容台数が数値ではありません（値: {raw_total}）。{} を使用します",
                        vehicle_type.label(),
                        self.opts.default_count
                    ),
                });
            }
            let parsed_available = coerce_int(&raw_available, self.opts.default_count);
            if parsed_available.warned {
                outcome.issues.push(Issue {
                    severity: Severity::Warning,
                    location: name.clone(),
                    vehicle_type: Some(vehicle_type),
                    message: format!(
                        "{}の空き台数が数値ではありません（値: {raw_available}）。{} を使用します",
                        vehicle_type.label(),
                        self.opts.default_count
                    ),
                });
            }

            let mut total = parsed_total.value;
            let mut available = parsed_available.value;

            // 範囲逸脱はポリシー違反。常に記録し、補正は force 時のみ。
            if total > self.opts.max_capacity {
                outcome.issues.push(Issue {
                    severity: Severity::Critical,
                    location: name.clone(),
                    vehicle_type: Some(vehicle_type),
                    message: format!(
                        "{}の収容台数 {total} が上限 {} を超えています",
                        vehicle_type.label(),
                        self.opts.max_capacity
                    ),
                });
                if self.opts.force_fix {
                    outcome.fixes.push(Fix {
                        location: name.clone(),
                        vehicle_type,
                        message: format!(
                            "収容台数を {total} → {} に修正しました",
                            self.opts.max_capacity
                        ),
                    });
                    total = self.opts.max_capacity;
                }
            } else if total < self.opts.min_capacity {
                outcome.issues.push(Issue {
                    severity: Severity::Warning,
                    location: name.clone(),
                    vehicle_type: Some(vehicle_type),
                    message: format!(
                        "{}の収容台数 {total} が下限 {} を下回っています",
                        vehicle_type.label(),
                        self.opts.min_capacity
                    ),
                });
                if self.opts.force_fix {
                    outcome.fixes.push(Fix {
                        location: name.clone(),
                        vehicle_type,
                        message: format!(
                            "収容台数を {total} → {} に修正しました",
                            self.opts.min_capacity
                        ),
                    });
                    total = self.opts.min_capacity;
                }
            }

            // 整合性違反は物理的にあり得ない状態。force に関わらず常に補正する。
            if available < 0 {
                outcome.issues.push(Issue {
                    severity: Severity::Warning,
                    location: name.clone(),
                    vehicle_type: Some(vehicle_type),
                    message: format!(
                        "{}の空き台数が負の値です: {available}",
                        vehicle_type.label()
                    ),
                });
                outcome.fixes.push(Fix {
                    location: name.clone(),
                    vehicle_type,
                    message: format!("空き台数を {available} → 0 に修正しました"),
                });
                available = 0;
            }
            if available > total {
                outcome.issues.push(Issue {
                    severity: Severity::Critical,
                    location: name.clone(),
                    vehicle_type: Some(vehicle_type),
                    message: format!(
                        "{}の空き台数 {available} が収容台数 {total} を超えています",
                        vehicle_type.label()
                    ),
                });
                outcome.fixes.push(Fix {
                    location: name.clone(),
                    vehicle_type,
                    message: format!("空き台数を {available} → {total} に修正しました"),
                });
                available = total;
            }

            slot.set_counts(total, available);

            let totals = outcome
                .totals
                .entry(vehicle_type)
                .or_default();
            totals.capacity += total;
            totals.available += available;

            self.recommend(&name, vehicle_type, total, available, outcome);
        }

        let structural = structural_counts.get(&name).copied().unwrap_or(0);
        location.last_validated = Some(now_s.to_string());
        location.validation_issues = structural + (outcome.issues.len() - issues_before) as u64;

        self.logger.debug(
            "ロケーションを検証しました",
            Some(json!({
                "location": name,
                "issues": location.validation_issues,
            })),
        );
    }

    fn recommend(
        &self,
        name: &str,
        vehicle_type: VehicleType,
        total: i64,
        available: i64,
        outcome: &mut ProcessOutcome,
    ) {
        if total == 0 && available == 0 {
            outcome.recommendations.push(Recommendation {
                severity: Severity::Info,
                location: name.to_string(),
                vehicle_type,
                message: format!(
                    "{}の収容台数が未設定です。枠数を定義してください",
                    vehicle_type.label()
                ),
            });
            return;
        }

        let util = utilization(total, available);
        if util >= self.opts.critical_threshold {
            outcome.recommendations.push(Recommendation {
                severity: Severity::Critical,
                location: name.to_string(),
                vehicle_type,
                message: format!(
                    "{}の利用率 {util:.1}% が危険水準 {}% 以上です。増設を検討してください",
                    vehicle_type.label(),
                    self.opts.critical_threshold
                ),
            });
        } else if util >= self.opts.warning_threshold {
            outcome.recommendations.push(Recommendation {
                severity: Severity::Warning,
                location: name.to_string(),
                vehicle_type,
                message: format!(
                    "{}の利用率 {util:.1}% が警戒水準 {}% 以上です",
                    vehicle_type.label(),
                    self.opts.warning_threshold
                ),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogLevel;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_temp_dir() -> PathBuf {
        static DIR_SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = DIR_SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("parkir-process-test-{}-{seq}", std::process::id()))
    }

    fn test_logger(dir: &PathBuf) -> Logger {
        Logger::new(dir, LogLevel::Error, false)
    }

    fn default_options() -> ProcessorOptions {
        ProcessorOptions {
            force_fix: false,
            min_capacity: 0,
            max_capacity: 1000,
            default_count: 0,
            warning_threshold: 75.0,
            critical_threshold: 90.0,
            batch_size: 10,
            budget: Duration::from_secs(30),
        }
    }

    fn dataset(locations: serde_json::Value) -> Dataset {
        serde_json::from_value(json!({ "locations": locations, "statistics": {} }))
            .expect("build dataset")
    }

    fn scenario_dataset() -> Dataset {
        dataset(json!([
            {
                "name": "Lokasi A",
                "bus": { "total": 10, "available": 3 },
                "mobil": { "total": 20, "available": 10 },
                "motor": { "total": 30, "available": 20 }
            },
            {
                "name": "Lokasi B",
                "bus": { "total": 5, "available": 2 },
                "mobil": { "total": 15, "available": 5 },
                "motor": { "total": 25, "available": 15 }
            }
        ]))
    }

    fn run(
        opts: ProcessorOptions,
        dataset: &mut Dataset,
        structural: Vec<Issue>,
    ) -> ProcessOutcome {
        let dir = make_temp_dir();
        let logger = test_logger(&dir);
        let processor = RecordProcessor::new(opts, &logger);
        let outcome = processor
            .process(dataset, structural, OffsetDateTime::now_utc())
            .expect("process");
        let _ = std::fs::remove_dir_all(&dir);
        outcome
    }

    #[test]
    fn clean_scenario_accumulates_per_type_totals() {
        let mut ds = scenario_dataset();
        let outcome = run(default_options(), &mut ds, vec![]);

        assert_eq!(outcome.processed, 2);
        assert!(outcome.issues.is_empty());
        assert!(outcome.fixes.is_empty());
        assert_eq!(
            outcome.totals[&VehicleType::Bus],
            TypeTotals {
                capacity: 15,
                available: 5
            }
        );
        assert_eq!(
            outcome.totals[&VehicleType::Mobil],
            TypeTotals {
                capacity: 35,
                available: 15
            }
        );
        assert_eq!(
            outcome.totals[&VehicleType::Motor],
            TypeTotals {
                capacity: 55,
                available: 35
            }
        );
    }

    #[test]
    fn accumulation_is_order_independent() {
        let mut forward = scenario_dataset();
        let mut reversed = scenario_dataset();
        reversed.locations.reverse();

        let a = run(default_options(), &mut forward, vec![]);
        let b = run(default_options(), &mut reversed, vec![]);
        assert_eq!(a.totals, b.totals);
    }

    #[test]
    fn negative_total_without_force_is_flagged_but_not_corrected() {
        let mut ds = dataset(json!([
            {
                "name": "Lokasi X",
                "bus": { "total": -5, "available": 10 },
                "mobil": { "total": 0, "available": 0 },
                "motor": { "total": 0, "available": 0 }
            }
        ]));
        let outcome = run(default_options(), &mut ds, vec![]);

        let bus = &ds.locations[0].bus;
        assert_eq!(bus.total, serde_json::Value::from(-5));
        // 超過分は force に関わらず total まで切り詰められる。
        assert_eq!(bus.available, serde_json::Value::from(-5));

        assert!(
            outcome
                .issues
                .iter()
                .any(|i| i.message.contains("-5") && i.message.contains("下限"))
        );
        assert!(
            outcome
                .fixes
                .iter()
                .any(|f| f.message.contains("10 → -5"))
        );
        assert!(!outcome.fixes.iter().any(|f| f.message.contains("収容台数")));
    }

    #[test]
    fn force_clamps_out_of_range_totals_to_nearest_bound() {
        let mut ds = dataset(json!([
            {
                "name": "Lokasi Y",
                "bus": { "total": 5000, "available": 10 },
                "mobil": { "total": -3, "available": 0 },
                "motor": { "total": 30, "available": 20 }
            }
        ]));
        let mut opts = default_options();
        opts.force_fix = true;
        let outcome = run(opts, &mut ds, vec![]);

        let loc = &ds.locations[0];
        assert_eq!(loc.bus.total, serde_json::Value::from(1000));
        assert_eq!(loc.mobil.total, serde_json::Value::from(0));
        assert!(
            outcome
                .fixes
                .iter()
                .any(|f| f.message.contains("5000 → 1000"))
        );
        assert!(outcome.fixes.iter().any(|f| f.message.contains("-3 → 0")));
        assert!(
            outcome
                .issues
                .iter()
                .any(|i| i.severity == Severity::Critical && i.message.contains("上限"))
        );
    }

    #[test]
    fn negative_available_is_reset_unconditionally() {
        let mut ds = dataset(json!([
            {
                "name": "Lokasi Z",
                "bus": { "total": 10, "available": -3 },
                "mobil": { "total": 0, "available": 0 },
                "motor": { "total": 0, "available": 0 }
            }
        ]));
        let outcome = run(default_options(), &mut ds, vec![]);

        assert_eq!(ds.locations[0].bus.available, serde_json::Value::from(0));
        assert!(outcome.fixes.iter().any(|f| f.message.contains("-3 → 0")));
    }

    #[test]
    fn available_never_exceeds_total_after_processing() {
        let mut ds = dataset(json!([
            {
                "name": "Penuh",
                "bus": { "total": 10, "available": 99 },
                "mobil": { "total": "7", "available": "abc" },
                "motor": { "total": null, "available": 4 }
            }
        ]));
        let outcome = run(default_options(), &mut ds, vec![]);

        for vehicle_type in VehicleType::ALL {
            let slot = ds.locations[0].slot(vehicle_type);
            let total = slot.total.as_i64().expect("numeric total");
            let available = slot.available.as_i64().expect("numeric available");
            assert!(
                (0..=total).contains(&available),
                "{vehicle_type}: total={total} available={available}"
            );
        }
        // "abc" の空き台数は警告付きで 0 に落ちる。
        assert!(
            outcome
                .issues
                .iter()
                .any(|i| i.message.contains("数値ではありません"))
        );
        // motor: total null → 0、available 4 → 0 に切り詰め。
        assert_eq!(ds.locations[0].motor.available, serde_json::Value::from(0));
    }

    #[test]
    fn every_location_gets_last_validated_and_issue_count() {
        let mut ds = scenario_dataset();
        let structural = vec![Issue {
            severity: Severity::Warning,
            location: "Lokasi B".to_string(),
            vehicle_type: Some(VehicleType::Bus),
            message: "構造警告: 補完".to_string(),
        }];
        run(default_options(), &mut ds, structural);

        for loc in &ds.locations {
            assert!(loc.last_validated.is_some());
        }
        assert_eq!(ds.locations[0].validation_issues, 0);
        assert_eq!(ds.locations[1].validation_issues, 1);
    }

    #[test]
    fn recommendations_follow_thresholds_and_zero_capacity() {
        let mut ds = dataset(json!([
            {
                "name": "Campuran",
                "bus": { "total": 100, "available": 5 },
                "mobil": { "total": 100, "available": 20 },
                "motor": { "total": 0, "available": 0 }
            }
        ]));
        let outcome = run(default_options(), &mut ds, vec![]);

        let severities: Vec<(VehicleType, Severity)> = outcome
            .recommendations
            .iter()
            .map(|r| (r.vehicle_type, r.severity))
            .collect();
        assert!(severities.contains(&(VehicleType::Bus, Severity::Critical)));
        assert!(severities.contains(&(VehicleType::Mobil, Severity::Warning)));
        assert!(severities.contains(&(VehicleType::Motor, Severity::Info)));
        assert!(
            outcome
                .recommendations
                .iter()
                .any(|r| r.message.contains("95.0%"))
        );
    }

    #[test]
    fn exhausted_budget_fails_with_timeout_error() {
        let mut ds = dataset(json!([
            { "name": "L1", "bus": { "total": 1, "available": 1 },
              "mobil": { "total": 1, "available": 1 }, "motor": { "total": 1, "available": 1 } },
            { "name": "L2", "bus": { "total": 1, "available": 1 },
              "mobil": { "total": 1, "available": 1 }, "motor": { "total": 1, "available": 1 } },
            { "name": "L3", "bus": { "total": 1, "available": 1 },
              "mobil": { "total": 1, "available": 1 }, "motor": { "total": 1, "available": 1 } }
        ]));
        let mut opts = default_options();
        opts.batch_size = 1;
        opts.budget = Duration::from_nanos(1);

        let dir = make_temp_dir();
        let logger = test_logger(&dir);
        let processor = RecordProcessor::new(opts, &logger);
        let err = processor
            .process(&mut ds, vec![], OffsetDateTime::now_utc())
            .expect_err("timeout");
        let kind = err
            .downcast_ref::<PipelineError>()
            .map(PipelineError::kind);
        assert_eq!(kind, Some("timeout_error"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
