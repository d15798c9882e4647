use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One forecast sample. Fields missing from the payload hold their zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    /// True only for the sample describing "now".
    pub is_current: bool,
    /// Unix seconds, UTC.
    pub timestamp: i64,
    pub date_time: DateTime<Utc>,
    /// The payload's `dt_txt`, if any.
    pub date_text: String,
    pub city_name: String,
    pub condition_id: String,
    pub condition_main: String,
    pub condition_description: String,
    pub icon_id: String,
    /// °C
    pub temperature: f64,
    pub temperature_min: f64,
    pub temperature_max: f64,
    /// m/s
    pub wind_speed: f64,
    /// Percent.
    pub humidity: i64,
    /// Percent.
    pub cloudiness: i64,
    /// 0.0..=1.0
    pub precipitation_probability: f64,
    /// mm over the last 3h
    pub rain_volume_3h: f64,
    /// mm over the last 3h
    pub snow_volume_3h: f64,
}

/// Field accessor used by list bindings in the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    CityName,
    IsCurrentWeather,
    Timestamp,
    DateAndTime,
    ConditionId,
    WeatherDescription,
    WeatherMain,
    WeatherIcon,
    Temperature,
    MinTemperature,
    MaxTemperature,
    WindSpeed,
    Humidity,
    Cloudiness,
    Rain3h,
    Snow3h,
    Pop,
}

impl Role {
    pub const ALL: [Role; 17] = [
        Role::CityName,
        Role::IsCurrentWeather,
        Role::Timestamp,
        Role::DateAndTime,
        Role::ConditionId,
        Role::WeatherDescription,
        Role::WeatherMain,
        Role::WeatherIcon,
        Role::Temperature,
        Role::MinTemperature,
        Role::MaxTemperature,
        Role::WindSpeed,
        Role::Humidity,
        Role::Cloudiness,
        Role::Rain3h,
        Role::Snow3h,
        Role::Pop,
    ];

    /// Binding name exposed to the UI.
    pub fn name(self) -> &'static str {
        match self {
            Role::CityName => "cityName",
            Role::IsCurrentWeather => "isCurrentWeather",
            Role::Timestamp => "timestamp",
            Role::DateAndTime => "dateAndTime",
            Role::ConditionId => "conditionId",
            Role::WeatherDescription => "weatherDescription",
            Role::WeatherMain => "weatherMain",
            Role::WeatherIcon => "weatherIcon",
            Role::Temperature => "mainTemp",
            Role::MinTemperature => "mainTempMin",
            Role::MaxTemperature => "mainTempMax",
            Role::WindSpeed => "windSpeed",
            Role::Humidity => "humidity",
            Role::Cloudiness => "cloudiness",
            Role::Rain3h => "rain3h",
            Role::Snow3h => "snow3h",
            Role::Pop => "pop",
        }
    }

    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.name() == name)
    }
}

/// A single field pulled off a record by role.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
}

impl ForecastRecord {
    pub fn field(&self, role: Role) -> RoleValue {
        match role {
            Role::CityName => RoleValue::Text(self.city_name.clone()),
            Role::IsCurrentWeather => RoleValue::Bool(self.is_current),
            Role::Timestamp => RoleValue::Int(self.timestamp),
            Role::DateAndTime => RoleValue::DateTime(self.date_time),
            Role::ConditionId => RoleValue::Text(self.condition_id.clone()),
            Role::WeatherDescription => RoleValue::Text(self.condition_description.clone()),
            Role::WeatherMain => RoleValue::Text(self.condition_main.clone()),
            Role::WeatherIcon => RoleValue::Text(self.icon_id.clone()),
            Role::Temperature => RoleValue::Float(self.temperature),
            Role::MinTemperature => RoleValue::Float(self.temperature_min),
            Role::MaxTemperature => RoleValue::Float(self.temperature_max),
            Role::WindSpeed => RoleValue::Float(self.wind_speed),
            Role::Humidity => RoleValue::Int(self.humidity),
            Role::Cloudiness => RoleValue::Int(self.cloudiness),
            Role::Rain3h => RoleValue::Float(self.rain_volume_3h),
            Role::Snow3h => RoleValue::Float(self.snow_volume_3h),
            Role::Pop => RoleValue::Float(self.precipitation_probability),
        }
    }
}

impl std::fmt::Display for RoleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleValue::Bool(b) => write!(f, "{}", b),
            RoleValue::Int(i) => write!(f, "{}", i),
            RoleValue::Float(x) => write!(f, "{:.1}", x),
            RoleValue::Text(s) => write!(f, "{}", s),
            RoleValue::DateTime(dt) => write!(f, "{}", dt.format("%a %d.%m %H:%M")),
        }
    }
}
