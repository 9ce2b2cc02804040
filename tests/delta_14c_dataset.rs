//! End-to-end Δ¹⁴C runs over CARDAMOM datasets.

use approx::assert_relative_eq;
use c14_core::adapter::ModelData;
use c14_core::dataset::{Dataset, TIME_DIM, UNITS_ATTR};
use c14_core::errors::C14Error;
use c14_core::units::{conversion_factor, DAYS_PER_MONTH};
use cardamom_c14::cardamom::load_model_structure;
use cardamom_c14::compare::compare_datasets;
use cardamom_c14::config::{AtmosphereSource, Delta14CConfig};
use cardamom_c14::diagnostic::delta_14c_series;
use cardamom_c14::example_datasets::{
    batched, constant_atmosphere_config, constant_dataset, seasonal_dataset, steady_state_dataset,
    steady_state_values, STOCK_UNIT,
};
use cardamom_c14::pipeline::{load_delta_14c_dataset, DELTA_UNITS, LOG, MAX_ABS_ERR, MAX_REL_ERR};
use ndarray::{array, ArrayD, IxDyn};
use std::path::PathBuf;

const METHODS: [&str; 2] = ["discrete", "continuous"];

fn values(ds: &Dataset, name: &str) -> ArrayD<f64> {
    ds.get(name)
        .unwrap_or_else(|| panic!("no variable {name}"))
        .data()
        .clone()
}

fn logs(ds: &Dataset) -> Vec<String> {
    ds.get_text(LOG).unwrap().data().iter().cloned().collect()
}

mod shape {
    use super::*;

    #[test]
    fn test_batch_shape_is_kept() {
        let structure = load_model_structure().unwrap();
        let config = constant_atmosphere_config(20.0);
        let ds = batched(&seasonal_dataset(13).unwrap(), 2, 3).unwrap();

        for method in METHODS {
            let out = load_delta_14c_dataset(&ds, method, &structure, &config).unwrap();

            for name in structure.variables() {
                let var = out.get(name).unwrap();
                assert_eq!(var.dims(), ["ens", "lat", TIME_DIM]);
                assert_eq!(var.shape(), [2, 3, 13]);
                assert_eq!(var.attr(UNITS_ATTR), Some(DELTA_UNITS));
            }
            for name in [MAX_ABS_ERR, MAX_REL_ERR] {
                assert_eq!(out.get(name).unwrap().shape(), [2, 3]);
            }
            assert_eq!(out.get(MAX_REL_ERR).unwrap().attr(UNITS_ATTR), Some("%"));
            assert_eq!(
                out.get(MAX_ABS_ERR).unwrap().attr("long_name"),
                Some("max. abs. error on reconstructed stock sizes")
            );
            assert_eq!(logs(&out), vec![String::new(); 6]);

            assert_eq!(out.coord("ens").unwrap().len(), 2);
            assert_eq!(out.coord(TIME_DIM).unwrap().len(), 13);
            assert_eq!(
                out.attrs().get("title").map(String::as_str),
                Some("synthetic CARDAMOM output")
            );
        }
    }

    #[test]
    fn test_cells_match_single_runs() {
        let structure = load_model_structure().unwrap();
        let config = constant_atmosphere_config(20.0);
        let single = seasonal_dataset(13).unwrap();
        let ds = batched(&single, 2, 2).unwrap();

        let single_out = load_delta_14c_dataset(&single, "discrete", &structure, &config).unwrap();
        let out = load_delta_14c_dataset(&ds, "discrete", &structure, &config).unwrap();

        let soil = values(&out, "Soil");
        let expected = values(&single_out, "Soil");
        for k in 0..13 {
            assert_eq!(soil[IxDyn(&[1, 0, k])], expected[IxDyn(&[k])]);
        }
        assert_eq!(
            values(&out, MAX_ABS_ERR)[IxDyn(&[1, 1])],
            values(&single_out, MAX_ABS_ERR)[IxDyn(&[])]
        );
    }

    /// An empty batch returns at once, without reading the atmospheric record.
    #[test]
    fn test_empty_batch() {
        let structure = load_model_structure().unwrap();
        let config = Delta14CConfig {
            atmosphere: AtmosphereSource::File {
                path: PathBuf::from("/nonexistent/C14Atm_NH.csv"),
            },
            ..Delta14CConfig::default()
        };
        let ds = batched(&steady_state_dataset(6).unwrap(), 0, 3).unwrap();

        for method in METHODS {
            let out = load_delta_14c_dataset(&ds, method, &structure, &config).unwrap();
            assert_eq!(out.get("Soil").unwrap().shape(), [0, 3, 6]);
            assert_eq!(out.get(MAX_ABS_ERR).unwrap().shape(), [0, 3]);
            assert_eq!(out.get_text(LOG).unwrap().shape(), [0, 3]);
            assert!(logs(&out).is_empty());
        }
    }

    #[test]
    fn test_invalid_method() {
        let structure = load_model_structure().unwrap();
        let config = Delta14CConfig::default();
        let ds = steady_state_dataset(6).unwrap();

        for method in ["hybrid", "Discrete", ""] {
            assert!(matches!(
                load_delta_14c_dataset(&ds, method, &structure, &config),
                Err(C14Error::InvalidArgument(_))
            ));
        }
        // rejected before the dataset is looked at
        assert!(matches!(
            load_delta_14c_dataset(&Dataset::new(), "hybrid", &structure, &config),
            Err(C14Error::InvalidArgument(_))
        ));
    }
}

mod delta {
    use super::*;

    #[test]
    fn test_standard_ratio_is_zero() {
        let alpha = 1.18e-12;
        let c12 = array![1.0, 250.0, 3.5e4];
        let c14 = c12.mapv(|v| v * alpha);
        let delta = delta_14c_series(c12.view(), c14.view(), alpha);
        assert!(delta.iter().all(|v| v.abs() < 1e-9));
    }

    /// Without decay and with the standard ratio in the atmosphere, every
    /// steady state quantity carries the standard ratio.
    #[test]
    fn test_standard_atmosphere_without_decay() {
        let structure = load_model_structure().unwrap();
        let config = Delta14CConfig {
            decay_rate: 0.0,
            ..constant_atmosphere_config(0.0)
        };
        let ds = steady_state_dataset(12).unwrap();

        for method in METHODS {
            let out = load_delta_14c_dataset(&ds, method, &structure, &config).unwrap();
            for name in structure.variables() {
                let delta = values(&out, name);
                assert!(
                    delta.iter().filter(|v| !v.is_nan()).all(|v| v.abs() < 1e-6),
                    "{method} {name}: {delta}"
                );
                // fluxes have no value at the first time point
                let missing = usize::from(!structure.stock_variables().contains(&name));
                assert_eq!(delta.iter().filter(|v| v.is_nan()).count(), missing);
            }
        }
    }

    /// Discrete stocks are sampled right after a step's input lands, so the
    /// two methods differ by a few permille; bound that gap and the ratio.
    #[test]
    fn test_discrete_and_continuous_isotope_ratios_close() {
        let structure = load_model_structure().unwrap();
        let config = constant_atmosphere_config(100.0);
        let ds = steady_state_dataset(24).unwrap();

        let discrete = load_delta_14c_dataset(&ds, "discrete", &structure, &config).unwrap();
        let continuous = load_delta_14c_dataset(&ds, "continuous", &structure, &config).unwrap();

        let differences = compare_datasets(&discrete, &continuous).unwrap();
        assert_eq!(differences.len(), structure.variables().len());
        for (name, difference) in &differences {
            assert!(difference.max_abs_diff < 10.0, "{name}: {difference:?}");
        }

        for name in structure.variables() {
            let d = values(&discrete, name);
            let c = values(&continuous, name);
            for (&a, &b) in d.iter().zip(c.iter()).filter(|(a, _)| !a.is_nan()) {
                let ratio_diff = (a - b).abs() / (1000.0 + b);
                assert!(ratio_diff < 0.01, "{name}: {a} vs {b}");
            }
        }

        // inputs carry the atmospheric signature exactly
        for name in ["NPP_to_Leaf", "NPP_to_Wood"] {
            for delta in [&discrete, &continuous] {
                let series = values(delta, name);
                assert!(series.iter().skip(1).all(|v| (v - 100.0).abs() < 1e-6));
            }
        }
    }
}

mod degenerate {
    use super::*;

    fn without_wood() -> Dataset {
        let mut values = steady_state_values();
        for name in ["Wood", "NPP_to_Wood", "Wood_to_Soil"] {
            values.insert(name, 0.0);
        }
        values.insert("Soil", 5000.0);
        values.insert("Soil_to_RH", 1.0);
        constant_dataset(&values, 12).unwrap()
    }

    /// An empty pool without decay makes the tracer equilibrium singular.
    #[test]
    fn test_singular_equilibrium_degrades() {
        let structure = load_model_structure().unwrap();
        let config = Delta14CConfig {
            decay_rate: 0.0,
            ..constant_atmosphere_config(0.0)
        };
        let ds = batched(&without_wood(), 2, 1).unwrap();

        for method in METHODS {
            let out = load_delta_14c_dataset(&ds, method, &structure, &config).unwrap();
            for log in logs(&out) {
                assert!(log.starts_with("Singular matrix"), "{method}: {log}");
            }
            for name in structure.variables() {
                assert!(values(&out, name).iter().all(|v| v.is_nan()), "{method} {name}");
            }
            assert!(values(&out, MAX_ABS_ERR).iter().all(|v| v.is_nan()));
            assert!(values(&out, MAX_REL_ERR).iter().all(|v| v.is_nan()));
        }
    }

    /// With decay the same pool no longer blocks the equilibrium.
    #[test]
    fn test_empty_pool_with_decay() {
        let structure = load_model_structure().unwrap();
        let config = constant_atmosphere_config(0.0);
        let ds = without_wood();

        for method in METHODS {
            let out = load_delta_14c_dataset(&ds, method, &structure, &config).unwrap();
            assert_eq!(logs(&out), vec![String::new()]);
            assert!(values(&out, "Wood").iter().all(|v| v.is_nan()));
            assert!(values(&out, "Soil").iter().all(|v| !v.is_nan()));
        }
    }

    #[test]
    fn test_missing_stock_is_not_degraded() {
        let structure = load_model_structure().unwrap();
        let config = constant_atmosphere_config(0.0);
        let full = steady_state_dataset(4).unwrap();
        let mut ds = Dataset::new();
        for (name, var) in full.data_vars().filter(|(name, _)| name.as_str() != "Litter") {
            ds.insert(name, var.clone()).unwrap();
        }

        assert_eq!(
            load_delta_14c_dataset(&ds, "continuous", &structure, &config),
            Err(C14Error::MissingVariable("Litter".into()))
        );
    }
}

mod units {
    use super::*;

    fn per_month() -> Dataset {
        let mut values = steady_state_values();
        let structure = load_model_structure().unwrap();
        for name in structure.flux_variables() {
            if let Some(v) = values.get_mut(name) {
                *v *= DAYS_PER_MONTH;
            }
        }
        let daily = constant_dataset(&values, 12).unwrap();
        let mut ds = Dataset::new();
        for (name, values) in daily.coords() {
            ds.insert_coord(name, values.clone()).unwrap();
        }
        for (name, var) in daily.data_vars() {
            let var = if structure.flux_variables().contains(&name.as_str()) {
                var.clone().with_unit("gC/m2/month")
            } else {
                var.clone()
            };
            ds.insert(name, var).unwrap();
        }
        ds
    }

    #[test]
    fn test_monthly_fluxes_scale_to_daily() {
        let factor = conversion_factor("gC/m2/month", "gC/m2/day").unwrap();
        assert_relative_eq!(factor, 1.0 / (365.25 / 12.0), max_relative = 1e-12);

        let structure = load_model_structure().unwrap();
        let monthly = per_month();
        let daily = steady_state_dataset(12).unwrap();
        let amounts = |ds: &Dataset| {
            ModelData::new(&structure, ds, STOCK_UNIT, DAYS_PER_MONTH)
                .unwrap()
                .external_input_amounts()
                .unwrap()
        };
        let (m, d) = (amounts(&monthly), amounts(&daily));
        for (a, b) in m.iter().zip(d.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_monthly_fluxes_give_same_delta() {
        let structure = load_model_structure().unwrap();
        let config = constant_atmosphere_config(30.0);
        for method in METHODS {
            let daily = steady_state_dataset(12).unwrap();
            let monthly =
                load_delta_14c_dataset(&per_month(), method, &structure, &config).unwrap();
            let daily = load_delta_14c_dataset(&daily, method, &structure, &config).unwrap();
            for (name, difference) in compare_datasets(&daily, &monthly).unwrap() {
                assert!(difference.max_abs_diff < 1e-6, "{method} {name}: {difference:?}");
            }
        }
    }
}
