use crate::format::{format_decimal, round_to};
use crate::provider::{LoadAverage, MetricsProvider};
use tracing::warn;

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq)]
pub struct LoadInfo {
    pub one: Option<f64>,
    pub five: Option<f64>,
    pub fifteen: Option<f64>,
}

impl LoadInfo {
    pub fn unsupported() -> Self {
        Self {
            one: None,
            five: None,
            fifteen: None,
        }
    }

    pub fn render(value: Option<f64>) -> String {
        value
            .map(format_decimal)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

impl From<LoadAverage> for LoadInfo {
    fn from(load: LoadAverage) -> Self {
        Self {
            one: Some(round_to(load.one, 2)),
            five: Some(round_to(load.five, 2)),
            fifteen: Some(round_to(load.fifteen, 2)),
        }
    }
}

pub fn sample_load(provider: &mut dyn MetricsProvider) -> LoadInfo {
    match provider.load_average() {
        Some(load) => LoadInfo::from(load),
        None => {
            warn!("средняя загрузка не поддерживается на этой платформе");
            LoadInfo::unsupported()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeProvider;

    #[test]
    fn load_is_rounded_to_two_decimals() {
        let mut provider = FakeProvider {
            load: Some(LoadAverage {
                one: 1.23456,
                five: 0.999,
                fifteen: 2.0,
            }),
            ..FakeProvider::default()
        };
        let load = sample_load(&mut provider);
        assert_eq!(LoadInfo::render(load.one), "1.23");
        assert_eq!(LoadInfo::render(load.five), "1.0");
        assert_eq!(LoadInfo::render(load.fifteen), "2.0");
    }

    #[test]
    fn unsupported_platform_reports_sentinel() {
        let mut provider = FakeProvider {
            load: None,
            ..FakeProvider::default()
        };
        let load = sample_load(&mut provider);
        for value in [load.one, load.five, load.fifteen] {
            assert_eq!(LoadInfo::render(value), "N/A");
        }
    }
}
