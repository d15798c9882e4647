use crate::data::collection::ForecastCollection;
use crate::data::types::{Role, RoleValue};

/// One line per record, built only through role lookups on a single batch.
pub fn summary_lines(collection: &ForecastCollection) -> Vec<String> {
    collection
        .snapshot()
        .iter()
        .map(|record| {
            let label = match record.field(Role::IsCurrentWeather) {
                RoleValue::Bool(true) => "now".to_string(),
                _ => record.field(Role::DateAndTime).to_string(),
            };
            format!(
                "{:<16} {:>6}°C  {:<16} wind {} m/s  pop {}",
                label,
                record.field(Role::Temperature).to_string(),
                record.field(Role::WeatherDescription).to_string(),
                record.field(Role::WindSpeed),
                record.field(Role::Pop),
            )
        })
        .collect()
}
