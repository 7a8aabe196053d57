use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::core::{Dataset, Issue, PipelineError, Severity, VehicleType};

#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    pub raw_bytes: Vec<u8>,
    pub structural_warnings: Vec<Issue>,
}

pub fn load(path: &Path) -> Result<LoadedDataset> {
    let raw_bytes = std::fs::read(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut root: Value =
        serde_json::from_slice(&raw_bytes).map_err(|source| PipelineError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let structural_warnings = validate_shape(&mut root)?;

    let dataset: Dataset = serde_json::from_value(root).map_err(|err| PipelineError::Schema {
        detail: format!("データセットを復元できません（{err}）"),
    })?;

    Ok(LoadedDataset {
        dataset,
        raw_bytes,
        structural_warnings,
    })
}

fn validate_shape(root: &mut Value) -> Result<Vec<Issue>> {
    let obj = root.as_object_mut().ok_or_else(|| PipelineError::Schema {
        detail: "ルートがオブジェクトではありません".to_string(),
    })?;

    if !obj.get("statistics").is_some_and(Value::is_object) {
        return Err(PipelineError::Schema {
            detail: "statistics がオブジェクトとして存在しません".to_string(),
        }
        .into());
    }

    let locations = obj
        .get_mut("locations")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| PipelineError::Schema {
            detail: "locations が配列として存在しません".to_string(),
        })?;

    let mut warnings = Vec::new();
    for (i, entry) in locations.iter_mut().enumerate() {
        let loc = entry.as_object_mut().ok_or_else(|| PipelineError::Schema {
            detail: format!("locations[{i}] がオブジェクトではありません"),
        })?;

        let name = loc
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::Schema {
                detail: format!("locations[{i}] に name がありません"),
            })?
            .to_string();

        for vehicle_type in VehicleType::ALL {
            let key = vehicle_type.as_str();
            if loc.get(key).is_some_and(Value::is_object) {
                continue;
            }
            loc.insert(key.to_string(), json!({ "total": 0, "available": 0 }));
            warnings.push(Issue {
                severity: Severity::Warning,
                location: name.clone(),
                vehicle_type: Some(vehicle_type),
                message: format!(
                    "構造警告: {}（{key}）の枠データがないため 0 で補完しました",
                    vehicle_type.label()
                ),
            });
        }
    }

    Ok(warnings)
}

pub fn save(path: &Path, dataset: &Dataset) -> Result<()> {
    let buf =
        serde_json::to_vec_pretty(dataset).context("データセット(JSON)のシリアライズに失敗しました")?;
    std::fs::write(path, buf)
        .with_context(|| format!("データセットの書き込みに失敗しました: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_temp_dir() -> PathBuf {
        static DIR_SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = DIR_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir =
            std::env::temp_dir().join(format!("parkir-loader-test-{}-{seq}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create dir");
        dir
    }

    fn error_kind(err: &anyhow::Error) -> &'static str {
        err.downcast_ref::<PipelineError>()
            .map(PipelineError::kind)
            .unwrap_or("other")
    }

    #[test]
    fn missing_file_is_io_error_naming_the_path() {
        let dir = make_temp_dir();
        let path = dir.join("nope.json");
        let err = load(&path).expect_err("missing file");
        assert_eq!(error_kind(&err), "io_error");
        assert!(err.to_string().contains("nope.json"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_json_is_parse_error_not_schema_error() {
        let dir = make_temp_dir();
        let path = dir.join("broken.json");
        std::fs::write(&path, b"{ locations: ").expect("write");
        let err = load(&path).expect_err("broken json");
        assert_eq!(error_kind(&err), "parse_error");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_statistics_is_schema_error() {
        let dir = make_temp_dir();
        let path = dir.join("no-stats.json");
        std::fs::write(&path, br#"{ "locations": [] }"#).expect("write");
        let err = load(&path).expect_err("missing statistics");
        assert_eq!(error_kind(&err), "schema_error");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn locations_must_be_an_array() {
        let dir = make_temp_dir();
        let path = dir.join("bad-locations.json");
        std::fs::write(&path, br#"{ "locations": {}, "statistics": {} }"#).expect("write");
        let err = load(&path).expect_err("bad locations");
        assert_eq!(error_kind(&err), "schema_error");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_slot_is_synthesized_with_a_warning() {
        let dir = make_temp_dir();
        let path = dir.join("partial.json");
        std::fs::write(
            &path,
            br#"{
  "locations": [
    { "name": "Lokasi A", "bus": { "total": 10, "available": 3 } }
  ],
  "statistics": {}
}"#,
        )
        .expect("write");

        let loaded = load(&path).expect("load");
        assert_eq!(loaded.structural_warnings.len(), 2);
        assert!(
            loaded
                .structural_warnings
                .iter()
                .all(|w| w.severity == Severity::Warning && w.location == "Lokasi A")
        );
        let synthesized: Vec<VehicleType> = loaded
            .structural_warnings
            .iter()
            .filter_map(|w| w.vehicle_type)
            .collect();
        assert_eq!(synthesized, vec![VehicleType::Mobil, VehicleType::Motor]);

        let loc = &loaded.dataset.locations[0];
        assert_eq!(loc.mobil.total, Value::from(0));
        assert_eq!(loc.motor.available, Value::from(0));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn garbage_slot_values_survive_loading_for_the_processor() {
        let dir = make_temp_dir();
        let path = dir.join("garbage.json");
        std::fs::write(
            &path,
            br#"{
  "locations": [
    {
      "name": "Lokasi B",
      "bus": { "total": "abc", "available": null },
      "mobil": { "total": 20, "available": 10 },
      "motor": { "total": 30, "available": 20 }
    }
  ],
  "statistics": { "updateCount": 4 }
}"#,
        )
        .expect("write");

        let loaded = load(&path).expect("load");
        assert!(loaded.structural_warnings.is_empty());
        let loc = &loaded.dataset.locations[0];
        assert_eq!(loc.bus.total, Value::from("abc"));
        assert_eq!(loc.bus.available, Value::Null);
        assert_eq!(loaded.dataset.statistics.update_count, 4);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_round_trips_through_load() {
        let dir = make_temp_dir();
        let path = dir.join("saved.json");
        let dataset: Dataset = serde_json::from_value(serde_json::json!({
            "locations": [
                {
                    "name": "Lokasi C",
                    "bus": { "total": 5, "available": 2 },
                    "mobil": { "total": 15, "available": 5 },
                    "motor": { "total": 25, "available": 15 }
                }
            ],
            "statistics": {}
        }))
        .expect("build dataset");

        save(&path, &dataset).expect("save");
        let loaded = load(&path).expect("reload");
        assert_eq!(loaded.dataset, dataset);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
