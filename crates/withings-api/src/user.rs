//! `user` service: linked devices and user goals

use serde::{Deserialize, Serialize};
use withings_core::{Action, Params, Result};

use crate::Withings;

/// Kind of a linked device, as reported by Withings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Scale,
    Babyphone,
    #[serde(rename = "Blood Pressure Monitor")]
    BloodPressureMonitor,
    #[serde(rename = "Activity Tracker")]
    ActivityTracker,
    #[serde(rename = "Sleep Monitor")]
    SleepMonitor,
    #[serde(rename = "Smart Connected Thermometer")]
    SmartConnectedThermometer,
    Gateway,
    /// A device type this client does not know yet.
    #[serde(other)]
    Unknown,
}

/// A device linked to the user's account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "type")]
    pub kind: DeviceType,
    pub model: String,
    pub model_id: u32,
    /// `low`, `medium` or `high`
    pub battery: String,
    #[serde(rename = "deviceid")]
    pub device_id: String,
    #[serde(rename = "hash_deviceid", default)]
    pub hash_device_id: Option<String>,
    pub timezone: String,
    /// Unix seconds of the last sync, absent for never-synced devices
    #[serde(default)]
    pub last_session_date: Option<i64>,
}

/// The user's daily goals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Goals {
    #[serde(default)]
    pub steps: Option<u64>,
    /// Seconds of sleep
    #[serde(default)]
    pub sleep: Option<u64>,
    #[serde(default)]
    pub weight: Option<WeightGoal>,
}

/// Target weight as `value * 10^unit` kilograms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightGoal {
    pub value: i64,
    pub unit: i32,
}

impl WeightGoal {
    pub fn kilograms(&self) -> f64 {
        self.value as f64 * 10f64.powi(self.unit)
    }
}

#[derive(Deserialize)]
struct DevicesBody {
    devices: Vec<Device>,
}

#[derive(Deserialize)]
struct GoalsBody {
    goals: Goals,
}

/// View on the `user` service.
#[derive(Debug, Clone, Copy)]
pub struct UserApi<'a> {
    session: &'a Withings,
}

impl<'a> UserApi<'a> {
    pub(crate) fn new(session: &'a Withings) -> Self {
        Self { session }
    }

    /// Devices linked to the user's account.
    pub async fn get_devices(&self) -> Result<Vec<Device>> {
        let body: DevicesBody = self.session.call(Action::GetDevice, Params::new()).await?;
        Ok(body.devices)
    }

    pub async fn get_goals(&self) -> Result<Goals> {
        let body: GoalsBody = self.session.call(Action::GetGoals, Params::new()).await?;
        Ok(body.goals)
    }
}
