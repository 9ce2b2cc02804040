//! Atmospheric Δ¹⁴C forcing.
//!
//! The record is a table of `(year, Δ¹⁴C)` points read between with
//! straight lines and continued beyond both ends. Model time in days is
//! mapped onto calendar years with a [`CalendarConversion`].

use crate::config::{AtmosphereSource, CalendarConversion, Delta14CConfig};
use c14_core::errors::{C14Error, C14Result};
use c14_core::interpolate::{Interpolator, LinearSplineStrategy};
use c14_core::system::RatioFunction;
use c14_core::timeseries::{FloatValue, Time};
use log::debug;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct AtmosphericForcing {
    table: Interpolator<LinearSplineStrategy>,
    calendar: CalendarConversion,
}

impl AtmosphericForcing {
    pub fn from_points(
        points: &[(FloatValue, FloatValue)],
        calendar: CalendarConversion,
    ) -> C14Result<Self> {
        let (years, deltas): (Vec<_>, Vec<_>) = points.iter().copied().unzip();
        let table = Interpolator::new(years, deltas, LinearSplineStrategy::new(true))?;
        Ok(Self { table, calendar })
    }

    /// Parses `year,delta` records following one header row.
    ///
    /// Columns after the second are ignored, as are blank lines. Fields may
    /// be quoted.
    pub fn from_csv_str(
        source_name: &str,
        text: &str,
        calendar: CalendarConversion,
    ) -> C14Result<Self> {
        let table_error = |details: String| C14Error::AtmosphericTable {
            source_name: source_name.to_string(),
            details,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let points = reader
            .deserialize::<(FloatValue, FloatValue)>()
            .collect::<Result<Vec<_>, csv::Error>>()
            .map_err(|e| table_error(e.to_string()))?;

        let forcing =
            Self::from_points(&points, calendar).map_err(|e| table_error(e.to_string()))?;
        debug!(
            "atmospheric Δ14C table '{source_name}': {} points covering {:?}",
            points.len(),
            forcing.table.range()
        );
        Ok(forcing)
    }

    pub fn from_file<P: AsRef<Path>>(path: P, calendar: CalendarConversion) -> C14Result<Self> {
        let path = path.as_ref();
        let source_name = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| C14Error::AtmosphericTable {
            source_name: source_name.clone(),
            details: e.to_string(),
        })?;
        Self::from_csv_str(&source_name, &text, calendar)
    }

    pub fn from_config(config: &Delta14CConfig) -> C14Result<Self> {
        match &config.atmosphere {
            AtmosphereSource::File { path } => Self::from_file(path, config.calendar),
            AtmosphereSource::Table { points } => Self::from_points(points, config.calendar),
        }
    }

    pub fn calendar(&self) -> &CalendarConversion {
        &self.calendar
    }

    /// Δ¹⁴C in permille at a decimal calendar year.
    pub fn delta_at_year(&self, year: FloatValue) -> FloatValue {
        self.table.interpolate(year).unwrap_or(FloatValue::NAN)
    }

    /// Δ¹⁴C in permille at model time `t` in days.
    pub fn delta_at(&self, t: Time) -> FloatValue {
        self.delta_at_year(self.calendar.to_calendar_year(t))
    }

    /// Atmospheric ¹⁴C/¹²C ratio at model time `t`:
    ///
    /// $$ F_a(t) = \alpha \left(1 + \frac{\Delta^{14}C(t)}{1000}\right) $$
    pub fn ratio_at(&self, t: Time, alpha: FloatValue) -> FloatValue {
        alpha * (1.0 + self.delta_at(t) / 1000.0)
    }

    pub fn ratio_function(&self, alpha: FloatValue) -> RatioFunction {
        let forcing = self.clone();
        Arc::new(move |t| forcing.ratio_at(t, alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ALPHA;
    use approx::assert_relative_eq;
    use is_close::is_close;

    const TABLE: &str = "year,Delta14C,sd\n2000.0,80.0,1\n2002.0,60.0,1\n\n2004.0,50.0,1\n";

    fn calendar() -> CalendarConversion {
        CalendarConversion {
            epoch_year: 2001.0,
            offset_days: 0.0,
            days_per_year: 365.25,
        }
    }

    #[test]
    fn reads_csv() {
        let forcing = AtmosphericForcing::from_csv_str("test", TABLE, calendar()).unwrap();
        assert!(is_close!(forcing.delta_at_year(2001.0), 70.0));
        assert!(is_close!(forcing.delta_at_year(2003.0), 55.0));
        // continued beyond both ends
        assert!(is_close!(forcing.delta_at_year(1999.0), 90.0));
        assert!(is_close!(forcing.delta_at_year(2006.0), 40.0));
    }

    #[test]
    fn reads_quoted_csv() {
        let quoted = "\"year\",\"Delta14C\"\n\"2000.0\",\"80.0\"\n\"2002.0\", \"60.0\" \n";
        let forcing = AtmosphericForcing::from_csv_str("quoted", quoted, calendar()).unwrap();
        assert!(is_close!(forcing.delta_at_year(2000.0), 80.0));
        assert!(is_close!(forcing.delta_at_year(2001.0), 70.0));
    }

    #[test]
    fn model_time_in_days() {
        let forcing = AtmosphericForcing::from_csv_str("test", TABLE, calendar()).unwrap();
        assert!(is_close!(forcing.delta_at(0.0), 70.0));
        assert!(is_close!(forcing.delta_at(365.25), 60.0));
        assert_relative_eq!(
            forcing.ratio_at(365.25, ALPHA),
            ALPHA * 1.06,
            max_relative = 1e-12
        );

        let ratio = forcing.ratio_function(ALPHA);
        assert_relative_eq!(ratio(0.0), ALPHA * 1.07, max_relative = 1e-12);
    }

    #[test]
    fn constant_record() {
        let forcing =
            AtmosphericForcing::from_points(&[(1900.0, 0.0), (2100.0, 0.0)], calendar()).unwrap();
        assert_eq!(forcing.delta_at(1234.0), 0.0);
        assert_eq!(forcing.ratio_at(1234.0, 2.0), 2.0);
    }

    #[test]
    fn bad_tables() {
        let bad_value = "year,delta\n2000.0,abc\n2001.0,1.0\n";
        assert!(matches!(
            AtmosphericForcing::from_csv_str("bad", bad_value, calendar()),
            Err(C14Error::AtmosphericTable { source_name, .. }) if source_name == "bad"
        ));

        let missing_column = "year,delta\n2000.0\n2001.0,1.0\n";
        assert!(matches!(
            AtmosphericForcing::from_csv_str("bad", missing_column, calendar()),
            Err(C14Error::AtmosphericTable { .. })
        ));

        let header_only = "year,delta\n";
        assert!(matches!(
            AtmosphericForcing::from_csv_str("bad", header_only, calendar()),
            Err(C14Error::AtmosphericTable { .. })
        ));

        let one_point = "year,delta\n2000.0,1.0\n";
        assert!(matches!(
            AtmosphericForcing::from_csv_str("bad", one_point, calendar()),
            Err(C14Error::AtmosphericTable { .. })
        ));

        assert!(matches!(
            AtmosphericForcing::from_file("/nonexistent/C14Atm_NH.csv", calendar()),
            Err(C14Error::AtmosphericTable { .. })
        ));
    }

    #[test]
    fn from_config_table() {
        let config = Delta14CConfig::with_atmosphere_points(vec![(2000.0, 10.0), (2010.0, 10.0)]);
        let forcing = AtmosphericForcing::from_config(&config).unwrap();
        assert!(is_close!(forcing.delta_at(100.0), 10.0));
    }
}
