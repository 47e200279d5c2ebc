use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use daily_insights::{
    AppConfig, Clock, FittedModel, PanelCache, Pipeline, PipelineRun, PrecipCategory,
    SystemClock, compare_outcomes, diagnostics, recent_days,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "daily-insights")]
#[command(about = "Daily soup demand forecast from sales and weather history")]
struct Args {
    /// Feature specification preset (overrides features.spec)
    #[arg(long, global = true)]
    spec: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict bowls for one day
    Forecast {
        /// Target date (default: tomorrow in the reporting timezone)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Forecast high temperature in °F
        #[arg(long, allow_hyphen_values = true)]
        temp: f64,
        /// Precipitation, e.g. "Rain" or "Snow Showers"
        #[arg(long, default_value = "None")]
        precip: String,
        /// Override the weekend flag derived from the date
        #[arg(long)]
        weekend: Option<bool>,
        /// Override the federal payday flag
        #[arg(long)]
        payday: Option<bool>,
        /// Override the payday-weekend flag
        #[arg(long)]
        payday_weekend: Option<bool>,
        /// Override season impact (-1, 0 or 1)
        #[arg(long, allow_hyphen_values = true)]
        season: Option<i8>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Fit statistics, error bands and recent-day accuracy
    Diagnostics {
        /// Number of recent operating days to list
        #[arg(long)]
        recent: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Compare the candidate temperature kink points
    Kinks,
    /// Summarize the merged daily panel
    Panel {
        /// Show the last N days
        #[arg(long, default_value_t = 10)]
        tail: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("daily_insights=debug");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(spec) = args.spec {
        config.features.spec = spec;
    }

    let pipeline = Pipeline::new(config).context("Failed to configure pipeline")?;
    let mut cache = PanelCache::new();

    match args.command {
        Command::Forecast {
            date,
            temp,
            precip,
            weekend,
            payday,
            payday_weekend,
            season,
            json,
        } => {
            let run = pipeline.run(&mut cache).context("Pipeline run failed")?;
            let tz = pipeline.config().pipeline.reporting_tz()?;
            let date = date.unwrap_or_else(|| SystemClock.tomorrow_in(tz));

            let mut inputs = pipeline.forecast_inputs(date, temp, PrecipCategory::normalize(&precip));
            if let Some(v) = weekend {
                inputs.is_weekend = v;
            }
            if let Some(v) = payday {
                inputs.is_federal_payday = v;
            }
            if let Some(v) = payday_weekend {
                inputs.is_payday_weekend = v;
            }
            if let Some(v) = season {
                inputs.season_impact = v.clamp(-1, 1);
            }

            let forecast = pipeline.forecast(&run, &inputs);

            if json {
                let out = serde_json::json!({
                    "date": date,
                    "inputs": inputs,
                    "forecast": forecast,
                    "warnings": run.warnings(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            print_caveats(&run);
            println!("Forecast for {} ({})", date, date.format("%A"));
            println!(
                "  {:.0}°F, {}, weekend={}, payday={}, payday weekend={}",
                inputs.temp_high,
                inputs.precip.label(),
                inputs.is_weekend,
                inputs.is_federal_payday,
                inputs.is_payday_weekend
            );
            println!("  Predicted bowls: {}", forecast.bowls);
            println!("  Capacity: {}", forecast.tier);
            print_model_line(&run.model);
        }
        Command::Diagnostics { recent, json } => {
            let run = pipeline.run(&mut cache).context("Pipeline run failed")?;
            let days = recent.unwrap_or(pipeline.config().pipeline.recent_days);
            let diag = diagnostics(&run.model, &run.table)?;
            let comparison = compare_outcomes(&run.model, &run.table)?;
            let recent = recent_days(&run.model, &run.table, days)?;

            if json {
                let out = serde_json::json!({
                    "model": run.model,
                    "diagnostics": diag,
                    "outcomes": comparison,
                    "recent": recent,
                    "warnings": run.warnings(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            print_caveats(&run);
            print_coefficients(&run.model);

            println!();
            println!("Observations:        {}", run.model.nobs);
            println!("R²:                  {:.3}", diag.r_squared);
            println!("Adj. R²:             {:.3}", diag.adj_r_squared);
            println!(
                "F-statistic:         {:.2} (p = {:.4})",
                run.model.f_statistic, run.model.f_p_value
            );
            println!("Residual std. error: {:.2}", run.model.residual_std_error());
            println!("MAE:                 {:.2} bowls", diag.mae);
            println!("RMSE:                {:.2} bowls", diag.rmse);
            println!("MAPE:                {:.1}%", diag.mape);

            let bands = &diag.bands;
            println!();
            println!("Error bands ({} days):", bands.total);
            for (label, count) in [
                ("within 5%", bands.within_5),
                ("within 10%", bands.within_10),
                ("within 20%", bands.within_20),
            ] {
                println!("  {:<11} {:>4} ({:.0}%)", label, count, bands.share(count));
            }

            println!();
            println!("Outcome comparison (same features):");
            for d in [&comparison.bowls, &comparison.transactions] {
                println!(
                    "  {:<12} R² {:.3}  adj. R² {:.3}  MAPE {:.1}%",
                    d.outcome.to_string(),
                    d.r_squared,
                    d.adj_r_squared,
                    d.mape
                );
            }
            println!("  Better predicted: {}", comparison.better());

            println!();
            println!("Last {} operating days:", recent.len());
            println!("  {:<10} {:>7} {:>9} {:>7} {:>8}", "Date", "Actual", "Predicted", "Error", "Error %");
            for r in &recent {
                println!(
                    "  {:<10} {:>7.0} {:>9.1} {:>7.1} {:>7.1}%{}",
                    r.date.to_string(),
                    r.actual,
                    r.predicted,
                    r.error,
                    r.error_pct,
                    if r.flagged { "  !" } else { "" }
                );
            }
        }
        Command::Kinks => {
            let run = pipeline.run(&mut cache).context("Pipeline run failed")?;
            let Some(report) = &run.model.kink_report else {
                println!(
                    "Specification '{}' does not search for a kink point",
                    run.model.spec.name
                );
                return Ok(());
            };

            println!(
                "  {:>5} {:>7} {:>10} {:>10} {:>10} {:>10}",
                "Kink", "R²", "cold coef", "cold p", "hot coef", "hot p"
            );
            for c in &report.candidates {
                println!(
                    "  {:>5.0} {:>7.4} {:>10.3} {:>10.4} {:>10.3} {:>10.4}{}",
                    c.kink,
                    c.r_squared,
                    c.cold_coef,
                    c.cold_p_value,
                    c.hot_coef,
                    c.hot_p_value,
                    if c.kink == report.selected { "  <- selected" } else { "" }
                );
            }
            if report.fell_back {
                println!("No candidate produced a finite R²; default kink {} used", report.selected);
            }
        }
        Command::Panel { tail } => {
            let cached = pipeline.load_panel(&mut cache).context("Failed to build daily panel")?;
            let panel = &cached.panel;
            for path in &cached.skipped_files {
                println!("warning: optional source not found: {}", path.display());
            }
            if let Some((first, last)) = panel.date_range() {
                println!(
                    "{} days from {} to {} ({} without sales)",
                    panel.len(),
                    first,
                    last,
                    panel.closed_days()
                );
            }
            let start = panel.len().saturating_sub(tail);
            for row in &panel.rows()[start..] {
                println!(
                    "  {} {:<9} {:>6} {:<10} {:>5.0} bowls {:>4} tickets ${:.2}",
                    row.date,
                    row.day_of_week.to_string(),
                    row.temp_high.map_or("NA".to_string(), |t| format!("{t:.0}°F")),
                    row.precip.label(),
                    row.bowls_sold,
                    row.transactions,
                    row.gross_sales
                );
            }
        }
    }

    Ok(())
}

fn print_caveats(run: &PipelineRun) {
    for warning in run.warnings() {
        println!("warning: {warning}");
    }
    if run.model.is_degenerate() {
        println!("caveat: the fit is degenerate; treat predictions with caution");
    }
}

fn print_model_line(model: &FittedModel) {
    let kink = model
        .params
        .kink
        .map(|k| format!(", kink {k:.0}°F"))
        .unwrap_or_default();
    println!(
        "  Model '{}' v{}: {} features{}, R² {:.3}, fitted on {} days",
        model.spec.name,
        model.spec.version,
        model.features.len(),
        kink,
        model.r_squared,
        model.nobs
    );
}

fn print_coefficients(model: &FittedModel) {
    println!(
        "{} ~ '{}' v{}",
        model.outcome, model.spec.name, model.spec.version
    );
    println!(
        "  {:<24} {:>10} {:>10} {:>8} {:>8}",
        "Variable", "Coef", "Std.Err", "t", "P>|t|"
    );
    for c in &model.coefficients {
        if c.aliased {
            println!("  {:<24} {:>10}", c.term.to_string(), "undefined");
            continue;
        }
        println!(
            "  {:<24} {:>10.3} {:>10.3} {:>8.2} {:>8.4} {}",
            c.term.to_string(),
            c.estimate,
            c.std_error,
            c.t_value,
            c.p_value,
            c.significance()
        );
    }
    println!("  Signif. codes: 0 '***' 0.001 '**' 0.01 '*' 0.05 '.' 0.1");
}
