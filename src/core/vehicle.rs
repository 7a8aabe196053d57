use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Bus,
    Mobil,
    Motor,
}

impl VehicleType {
    pub const ALL: [VehicleType; 3] = [VehicleType::Bus, VehicleType::Mobil, VehicleType::Motor];

    pub const fn as_str(self) -> &'static str {
        match self {
            VehicleType::Bus => "bus",
            VehicleType::Mobil => "mobil",
            VehicleType::Motor => "motor",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            VehicleType::Bus => "バス",
            VehicleType::Mobil => "自動車",
            VehicleType::Motor => "バイク",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bus" => Ok(VehicleType::Bus),
            "mobil" => Ok(VehicleType::Mobil),
            "motor" => Ok(VehicleType::Motor),
            _ => Err(format!(
                "車種が不正です: {s}（bus|mobil|motor を指定してください）"
            )),
        }
    }
}
