use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::Path;

use sleep_posture::comparison::{
    distinct_mattresses, distinct_postures, filter_by_mattress, filter_by_posture,
    fit_linear_trend, group_means, sorted_by_age, supine_selections, GroupBy, LabelEncoding,
    Measure,
};
use sleep_posture::config::{Args, ChartTheme, Command};
use sleep_posture::data_loading::load_signal;
use sleep_posture::experiment::{is_supine, ExperimentKind, Mattress};
use sleep_posture::indexing::{
    analyze_selection, list_data_files, list_experiments, scan_experiment_one,
    scan_experiment_two, Selection,
};
use sleep_posture::output::{
    autocorrelation_chart, group_bar_chart, print_group_means, print_row_table,
    print_signal_summary, print_warnings, signal_chart, slug, spectrum_chart,
    subject_bar_chart, trend_chart, write_chart_json, write_rows_to_csv, ChartPayload,
};
use sleep_posture::signal_analysis::analyze_signal;
use sleep_posture::{ScanReport, StatisticRow};

fn emit_rows(args: &Args, rows: &[StatisticRow]) -> Result<()> {
    if let Some(path) = &args.csv_output {
        write_rows_to_csv(path, rows)
            .with_context(|| format!("Failed to write rows to {}", path.display()))?;
    }
    Ok(())
}

fn emit_chart(args: &Args, name: &str, payload: &ChartPayload) -> Result<()> {
    if let Some(dir) = &args.json_output {
        write_chart_json(dir, name, payload)
            .with_context(|| format!("Failed to write chart {} to {}", name, dir.display()))?;
    }
    Ok(())
}

/// Experiment I table, or `None` when its metadata cannot be read.
fn load_experiment_one(args: &Args) -> Option<ScanReport> {
    let root = args.experiment_root(ExperimentKind::I);
    let metadata = args.metadata_path();

    match scan_experiment_one(&root, &metadata) {
        Ok(report) => {
            print_warnings(&report.warnings);
            Some(report)
        }
        Err(e) => {
            warn!("Experiment I unavailable: {}", e);
            println!("Warning: experiment I unavailable: {}", e);
            None
        }
    }
}

fn load_experiment_two(args: &Args) -> ScanReport {
    let report = scan_experiment_two(&args.experiment_root(ExperimentKind::II));
    print_warnings(&report.warnings);
    report
}

fn run_postures(args: &Args, theme: &ChartTheme) -> Result<()> {
    let Some(report) = load_experiment_one(args) else {
        return Ok(());
    };

    println!("\nStatistics for all subjects in experiment I");
    print_row_table(&report.rows, args.max_rows);
    emit_rows(args, &report.rows)?;

    for measure in [Measure::Mean, Measure::Variance] {
        let groups = group_means(&report.rows, GroupBy::Posture, measure)?;
        let title = format!("{} per posture", measure.label());
        print_group_means(&title, measure, &groups);

        let chart = group_bar_chart(&title, "Posture", measure, &groups, theme);
        emit_chart(args, &format!("posture_{}", slug(measure.label())), &chart)?;
    }

    Ok(())
}

fn run_posture(args: &Args, theme: &ChartTheme, label: &str) -> Result<()> {
    let Some(report) = load_experiment_one(args) else {
        return Ok(());
    };

    let rows = sorted_by_age(filter_by_posture(&report.rows, label));
    if rows.is_empty() {
        println!(
            "No recordings for posture '{}'. Available postures: {}",
            label,
            distinct_postures(&report.rows).join(", ")
        );
        return Ok(());
    }

    println!("\nMean pressure by age - {}", label);
    print_row_table(&rows, args.max_rows);
    emit_rows(args, &rows)?;
    emit_chart(
        args,
        &format!("subjects_{}", slug(label)),
        &subject_bar_chart(label, &rows, theme),
    )
}

fn run_autocorr(
    args: &Args,
    theme: &ChartTheme,
    subject: Option<&str>,
    code: Option<&str>,
) -> Result<()> {
    let (Some(subject), Some(code)) = (subject, code) else {
        let Some(report) = load_experiment_one(args) else {
            return Ok(());
        };
        let selections = supine_selections(&report.rows);
        if selections.is_empty() {
            println!("No supine recordings found");
            return Ok(());
        }
        println!("\nSupine recordings (pick one with --subject and --code):");
        for selection in &selections {
            println!("  {}", selection);
        }
        return Ok(());
    };

    let kind = ExperimentKind::I;
    let selection = Selection {
        subject: subject.to_string(),
        mattress: None,
        posture_code: code.to_string(),
    };
    let label = kind.label_for(code).unwrap_or_else(|| code.to_string());
    if !is_supine(&label) {
        info!("{} is not a supine posture", label);
    }

    match analyze_selection(kind, &args.experiment_root(kind), &selection) {
        Ok(analysis) => {
            let title = format!("Autocorrelation - {} - {}", subject, label);
            println!("\n{}", title);
            println!("Frames: {}", analysis.series.len());
            print_signal_summary(&analysis, 0);
            emit_chart(
                args,
                &format!("autocorrelation_{}_{}", slug(subject), slug(code)),
                &autocorrelation_chart(&title, &analysis.autocorrelation, theme),
            )?;
        }
        Err(e) => {
            warn!("Autocorrelation failed for {} #{}: {}", subject, code, e);
            println!("Warning: could not compute autocorrelation: {}", e);
        }
    }

    Ok(())
}

fn run_mattress(args: &Args, theme: &ChartTheme, only: Option<Mattress>) -> Result<()> {
    let report = load_experiment_two(args);
    if report.is_empty() {
        println!("No experiment II recordings found");
        return Ok(());
    }

    println!("\nPressure per position and mattress (experiment II)");
    print_row_table(&report.rows, args.max_rows);
    emit_rows(args, &report.rows)?;

    let overall = group_means(&report.rows, GroupBy::Mattress, Measure::Mean)?;
    print_group_means("Mean pressure per mattress", Measure::Mean, &overall);

    let mattresses = distinct_mattresses(&report.rows);
    let selected: Vec<Mattress> = match only {
        Some(m) => vec![m],
        None => mattresses.clone(),
    };

    for mattress in selected {
        let rows = filter_by_mattress(&report.rows, mattress);
        let groups = group_means(&rows, GroupBy::Posture, Measure::Mean)?;
        let title = format!("Mean pressure per position ({})", mattress);
        print_group_means(&title, Measure::Mean, &groups);
        emit_chart(
            args,
            &format!("positions_mean_{}", slug(mattress.name())),
            &group_bar_chart(&title, "Position", Measure::Mean, &groups, theme),
        )?;
    }

    for mattress in mattresses {
        let rows = filter_by_mattress(&report.rows, mattress);
        let groups = group_means(&rows, GroupBy::Posture, Measure::Variance)?;
        let title = format!("Pressure variance per position - mattress: {}", mattress);
        print_group_means(&title, Measure::Variance, &groups);
        emit_chart(
            args,
            &format!("positions_variance_{}", slug(mattress.name())),
            &group_bar_chart(&title, "Position", Measure::Variance, &groups, theme),
        )?;
    }

    Ok(())
}

fn run_regression(args: &Args, theme: &ChartTheme, mattress: Mattress) -> Result<()> {
    let report = load_experiment_two(args);

    // Encode over every position seen, on either mattress.
    let codes: Vec<&str> = report.rows.iter().map(|r| r.posture_code.as_str()).collect();
    let encoding = LabelEncoding::fit(&codes);
    let rows = filter_by_mattress(&report.rows, mattress);

    let Some(trend) = fit_linear_trend(&rows, &encoding) else {
        println!("No {} mattress recordings to fit", mattress);
        return Ok(());
    };

    println!("\nLinear trend - mattress {}", mattress);
    println!("Positions: {}", encoding.classes.join(", "));
    println!("Slope:     {:.4}", trend.slope);
    println!("Intercept: {:.4}", trend.intercept);
    println!("R^2:       {:.4}", trend.r_squared);

    emit_rows(args, &rows)?;
    emit_chart(
        args,
        &format!("regression_{}", slug(mattress.name())),
        &trend_chart(&format!("Regression - mattress {}", mattress), &trend, theme),
    )
}

fn run_files(args: &Args, experiment: Option<&str>) -> Result<()> {
    let Some(experiment) = experiment else {
        let experiments = list_experiments(&args.dataset);
        if experiments.is_empty() {
            println!("No experiments found under {}", args.dataset.display());
        }
        for dir in experiments {
            println!("{}", dir.display());
        }
        return Ok(());
    };

    let files = list_data_files(&args.dataset.join(experiment));
    if files.is_empty() {
        println!("No .txt files found for {}", experiment);
    }
    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}

fn run_signal(args: &Args, theme: &ChartTheme, path: &Path, top: usize) -> Result<()> {
    let signal = match load_signal(path) {
        Ok(signal) => signal,
        Err(e) => {
            warn!("Failed to analyse {}: {}", path.display(), e);
            println!("Error reading file: {}", e);
            return Ok(());
        }
    };

    println!("Signal analysis of {}\n", path.display());
    let analysis = analyze_signal(&signal);
    print_signal_summary(&analysis, top);

    let stem = slug(
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("signal"),
    );
    emit_chart(args, &format!("{}_signal", stem), &signal_chart(&analysis, theme))?;
    emit_chart(
        args,
        &format!("{}_autocorrelation", stem),
        &autocorrelation_chart("Autocorrelation", &analysis.autocorrelation, theme),
    )?;
    emit_chart(
        args,
        &format!("{}_spectrum", stem),
        &spectrum_chart(&analysis.spectrum, theme),
    )
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();
    let theme = args.theme();

    match &args.command {
        Command::Postures => run_postures(&args, &theme),
        Command::Posture { label } => run_posture(&args, &theme, label),
        Command::Autocorr { subject, code } => {
            run_autocorr(&args, &theme, subject.as_deref(), code.as_deref())
        }
        Command::Mattress { mattress } => run_mattress(&args, &theme, *mattress),
        Command::Regression { mattress } => run_regression(&args, &theme, *mattress),
        Command::Files { experiment } => run_files(&args, experiment.as_deref()),
        Command::Signal { path, top } => run_signal(&args, &theme, path, *top),
    }
}
