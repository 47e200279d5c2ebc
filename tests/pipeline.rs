//! End-to-end tests for the forecasting pipeline using in-memory batches.

use approx::assert_relative_eq;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use daily_insights::{
    BusinessCalendar, CapacityTier, DayInputs, DailyPanel, Feature, FeatureEngine, FeatureSpec,
    KinkSelection, PanelBuilder, PrecipCategory, PrecipEncoding, SaleBatch, SaleRecord, Term,
    WeatherBatch, WeatherObservation, build_panel, config::CalendarConfig,
    config::CapacityConfig, diagnostics, engineer_features, fit, predict,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn engine() -> FeatureEngine {
    FeatureEngine::new(
        BusinessCalendar::new(&CalendarConfig::default()),
        chrono::Weekday::Mon,
    )
}

fn builder() -> PanelBuilder {
    PanelBuilder::new(chrono_tz::US::Pacific, chrono_tz::US::Eastern, "Pho")
}

/// One sale line at 09:00 register time (noon on the East Coast).
fn sale(id: usize, day: NaiveDate, qty: f64) -> SaleRecord {
    SaleRecord {
        transaction_id: format!("T{id}"),
        item: "Pho Dac Biet".to_string(),
        quantity: qty,
        gross_amount: qty * 15.5,
        local_timestamp: day.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
        customer_name: None,
    }
}

fn batches(days: &[(NaiveDate, f64, f64)]) -> (Vec<SaleBatch>, Vec<WeatherBatch>) {
    let sales = SaleBatch {
        source: "sales.csv".to_string(),
        records: days
            .iter()
            .enumerate()
            .filter(|(_, (_, _, bowls))| *bowls > 0.0)
            .map(|(i, (d, _, bowls))| sale(i, *d, *bowls))
            .collect(),
        skipped_rows: 0,
    };
    let weather = WeatherBatch {
        source: "weather.csv".to_string(),
        observations: days
            .iter()
            .map(|(d, temp, _)| WeatherObservation {
                date: *d,
                temp_high: format!("{temp}°F"),
                precip_type: "None".to_string(),
            })
            .collect(),
        skipped_rows: 0,
    };
    (vec![sales], vec![weather])
}

fn centered_weekend_spec() -> FeatureSpec {
    FeatureSpec {
        name: "centered_weekend".to_string(),
        features: vec![Feature::TempCentered, Feature::Weekend],
        year_dummies: false,
        ..FeatureSpec::centered(PrecipEncoding::Categories)
    }
}

// ==================== End-to-End Scenario ====================

/// Ten operating days generated from
/// `bowls = 50 - 0.8 * (temp - 35) + 10 * weekend`, plus a Monday and a
/// closed day that the operating-day filter must drop.
fn ten_day_scenario() -> DailyPanel {
    let days = [
        (date(2026, 1, 6), 30.0, 54.0),
        (date(2026, 1, 7), 34.0, 50.8),
        (date(2026, 1, 8), 28.0, 55.6),
        (date(2026, 1, 9), 40.0, 56.0),
        (date(2026, 1, 10), 36.0, 59.2),
        (date(2026, 1, 11), 25.0, 68.0),
        (date(2026, 1, 12), 31.0, 30.0), // Monday
        (date(2026, 1, 13), 45.0, 42.0),
        (date(2026, 1, 14), 38.0, 47.6),
        (date(2026, 1, 15), 32.0, 52.4),
        (date(2026, 1, 16), 42.0, 54.4),
        (date(2026, 1, 17), 20.0, 0.0), // closed for snow
    ];
    let (sales, weather) = batches(&days);
    build_panel(&builder(), &sales, &weather).unwrap()
}

#[test]
fn test_ten_day_scenario_predicts_held_out_day() {
    let panel = ten_day_scenario();
    assert_eq!(panel.len(), 12);

    let spec = centered_weekend_spec();
    let table = engineer_features(&engine(), &panel, &spec).unwrap();
    assert_eq!(table.len(), 10);

    let model = fit(&table, &spec).unwrap();

    // Mean of the ten training temperatures
    assert_relative_eq!(model.params.temp_mean, 35.0, epsilon = 1e-9);
    assert_relative_eq!(model.intercept(), 50.0, epsilon = 1e-6);
    assert_relative_eq!(
        model.coefficient(Term::Feature(Feature::TempCentered)).unwrap().estimate,
        -0.8,
        epsilon = 1e-6
    );
    assert_relative_eq!(
        model.coefficient(Term::Feature(Feature::Weekend)).unwrap().estimate,
        10.0,
        epsilon = 1e-6
    );

    // Sunday 2026-01-18 at 20°F: 50 + 0.8 * 15 + 10 = 72
    let held_out = DayInputs {
        year: None,
        ..engine().day_inputs(date(2026, 1, 18), 20.0, PrecipCategory::Clear, &spec)
    };
    let forecast = predict(&model, &held_out, &CapacityConfig::default());

    assert_relative_eq!(forecast.value, 72.0, epsilon = 1e-6);
    assert_eq!(forecast.tier, CapacityTier::High);
    assert!(!forecast.degenerate);
}

#[test]
fn test_ten_day_scenario_diagnostics_are_exact() {
    let panel = ten_day_scenario();
    let spec = centered_weekend_spec();
    let table = engineer_features(&engine(), &panel, &spec).unwrap();
    let model = fit(&table, &spec).unwrap();

    let diag = diagnostics(&model, &table).unwrap();

    assert_relative_eq!(diag.r_squared, 1.0, epsilon = 1e-9);
    assert!(diag.mae < 1e-6);
    assert!(diag.mape < 1e-6);
    assert_eq!(diag.bands.within_5, 10);
}

// ==================== Prediction Consistency ====================

/// Two years of noisy days with a hockey-stick temperature response.
fn two_year_panel() -> DailyPanel {
    let start = date(2024, 10, 1);
    let days: Vec<(NaiveDate, f64, f64)> = (0..540)
        .map(|i| {
            let d = start + Duration::days(i);
            let seasonal = 55.0 - 25.0 * ((i as f64) * std::f64::consts::TAU / 365.0).cos();
            let temp = (seasonal + ((i * 37) % 11) as f64 - 5.0).round();
            let weekend = matches!(d.weekday(), chrono::Weekday::Fri | chrono::Weekday::Sat | chrono::Weekday::Sun);
            let noise = ((i * 53) % 9) as f64 - 4.0;
            let bowls = 70.0 - 0.3 * temp.min(62.0) - 1.2 * (temp - 62.0).max(0.0)
                + if weekend { 12.0 } else { 0.0 }
                + if d.year() == 2024 { -6.0 } else { 0.0 }
                + noise;
            let bowls = if i % 97 == 0 { 0.0 } else { bowls.max(1.0).round() };
            (d, temp, bowls)
        })
        .collect();
    let (sales, weather) = batches(&days);
    build_panel(&builder(), &sales, &weather).unwrap()
}

#[test]
fn test_prediction_reproduces_fitted_values() {
    let panel = two_year_panel();
    for spec in [
        FeatureSpec::piecewise(PrecipEncoding::Categories),
        FeatureSpec::centered(PrecipEncoding::Any),
        FeatureSpec::calendar_full(PrecipEncoding::Categories),
    ] {
        let table = engineer_features(&engine(), &panel, &spec).unwrap();
        let model = fit(&table, &spec).unwrap();

        for (row, fitted) in table.rows().iter().zip(&model.fitted) {
            let forecast = predict(&model, &row.inputs, &CapacityConfig::default());
            assert_relative_eq!(forecast.raw, *fitted, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_year_dummies_use_latest_year_as_baseline() {
    let panel = two_year_panel();
    let spec = FeatureSpec::piecewise(PrecipEncoding::Categories);
    let table = engineer_features(&engine(), &panel, &spec).unwrap();
    let model = fit(&table, &spec).unwrap();

    assert_eq!(table.years(), vec![2024, 2025, 2026]);
    assert!(model.features.contains(&Feature::Year(2024)));
    assert!(model.features.contains(&Feature::Year(2025)));
    assert!(!model.features.contains(&Feature::Year(2026)));
}

#[test]
fn test_piecewise_search_picks_a_candidate_deterministically() {
    let panel = two_year_panel();
    let spec = FeatureSpec::piecewise(PrecipEncoding::Categories);
    let table = engineer_features(&engine(), &panel, &spec).unwrap();

    let first = fit(&table, &spec).unwrap();
    let second = fit(&table, &spec).unwrap();

    let report = first.kink_report.clone().unwrap();
    let second_report = second.kink_report.clone().unwrap();
    assert_eq!(report.selected, second_report.selected);
    assert!(!report.fell_back);
    assert!([50.0, 55.0, 60.0, 65.0, 70.0].contains(&report.selected));
    assert_eq!(first.params.kink, Some(report.selected));

    // Aliased estimates are NaN, so compare bit patterns
    let bits = |m: &daily_insights::FittedModel| -> Vec<u64> {
        m.coefficients.iter().map(|c| c.estimate.to_bits()).collect()
    };
    assert_eq!(bits(&first), bits(&second));
}

#[test]
fn test_fixed_kink_applies_at_prediction_time() {
    let panel = two_year_panel();
    let spec = FeatureSpec::piecewise(PrecipEncoding::Categories).with_kink(KinkSelection::Fixed(60.0));
    let table = engineer_features(&engine(), &panel, &spec).unwrap();
    let model = fit(&table, &spec).unwrap();

    let cold = model.coefficient(Term::Feature(Feature::TempCold)).unwrap().estimate;
    let hot = model.coefficient(Term::Feature(Feature::TempHot)).unwrap().estimate;
    let base = DayInputs::new(60.0, chrono::Weekday::Wed, false);
    let warmer = DayInputs::new(70.0, chrono::Weekday::Wed, false);

    let capacity = CapacityConfig::default();
    let delta = predict(&model, &warmer, &capacity).raw - predict(&model, &base, &capacity).raw;
    assert_relative_eq!(delta, 10.0 * hot, epsilon = 1e-9);
    assert!(cold.is_finite());
}

#[test]
fn test_extreme_inputs_never_predict_negative_demand() {
    let panel = two_year_panel();
    let spec = FeatureSpec::centered(PrecipEncoding::Categories);
    let table = engineer_features(&engine(), &panel, &spec).unwrap();
    let model = fit(&table, &spec).unwrap();

    for temp in [-100.0, 0.0, 150.0, 1_000.0] {
        let forecast = predict(
            &model,
            &DayInputs::new(temp, chrono::Weekday::Tue, false),
            &CapacityConfig::default(),
        );
        assert!(forecast.value >= 0.0);
    }
}
