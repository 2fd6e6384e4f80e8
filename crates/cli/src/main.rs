//! CLI tool for exporting crosstabs to PowerPoint and keeping tagged decks
//! in sync with their data.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use xtab_core::{
    inventory, resolve, validate_deck, CrosstabDataset, ExportOptions, Exporter, MappingStatus,
    MappingTemplate, Reconciler, Visual,
};
use xtab_pptx::PptxPackage;

/// Map crosstab tables onto PowerPoint shapes and refresh them from new data.
#[derive(Parser, Debug)]
#[command(name = "xtab-deck")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every shape with its kind and mapping status
    List {
        /// Deck (.pptx)
        deck: PathBuf,
    },

    /// Write a mapping template for a deck
    Template {
        /// Deck (.pptx)
        deck: PathBuf,

        /// Data file (.csv or .json) whose tables are listed in the template
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a filled-in template into the deck's alt text
    Apply {
        /// Deck (.pptx)
        deck: PathBuf,

        /// Mapping template (.json)
        template: PathBuf,

        /// Output deck (default: <deck>_mapped.pptx)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check every mapping in a deck against a dataset
    Validate {
        /// Deck (.pptx)
        deck: PathBuf,

        /// Data file (.csv or .json)
        data: PathBuf,
    },

    /// Refresh every mapped shape from a dataset
    Update {
        /// Deck (.pptx)
        deck: PathBuf,

        /// Data file (.csv or .json)
        data: PathBuf,

        /// Output deck (default: <deck>_updated.pptx)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create a new, fully mapped deck with one slide per table
    Export {
        /// Data file (.csv or .json)
        data: PathBuf,

        /// Output deck
        #[arg(short, long, default_value = "report.pptx")]
        output: PathBuf,

        /// Default visual: bar_h, bar_v, donut, line or chart+table
        #[arg(long)]
        visual: Option<Visual>,

        /// Export options (.json) with per-table overrides
        #[arg(short, long)]
        selections: Option<PathBuf>,

        /// Leave out the title slide
        #[arg(long)]
        no_title_slide: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    match args.command {
        Command::List { deck } => list(&deck),
        Command::Template { deck, data, output } => template(&deck, data.as_deref(), output.as_deref()),
        Command::Apply {
            deck,
            template,
            output,
        } => apply(&deck, &template, output),
        Command::Validate { deck, data } => validate(&deck, &data),
        Command::Update { deck, data, output } => update(&deck, &data, output),
        Command::Export {
            data,
            output,
            visual,
            selections,
            no_title_slide,
        } => export(&data, &output, visual, selections.as_deref(), no_title_slide),
    }
}

fn open_deck(path: &Path) -> Result<PptxPackage> {
    PptxPackage::open_path(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Load a dataset from a crosstab CSV or a serialized dataset.
fn load_dataset(path: &Path) -> Result<CrosstabDataset> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let dataset = match extension.as_str() {
        "csv" => xtab_csv::read_file(path)
            .with_context(|| format!("Failed to read crosstabs from {}", path.display()))?,
        "json" => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            CrosstabDataset::from_json(&text)
                .with_context(|| format!("Failed to load dataset from {}", path.display()))?
        }
        _ => {
            return Err(xtab_core::Error::UnsupportedFormat(format!(
                "{} (expected .csv or .json)",
                path.display()
            ))
            .into())
        }
    };

    log::info!("Loaded {} tables from {}", dataset.len(), path.display());
    Ok(dataset)
}

/// `<dir>/<stem><suffix>.pptx` next to the input.
fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let file_name = format!("{}{}.pptx", stem, suffix);
    match input.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

fn list(path: &Path) -> Result<()> {
    let package = open_deck(path)?;
    for summary in inventory(package.deck()) {
        let detail = match &summary.status {
            MappingStatus::Mapped(record) => format!("{} '{}'", record.kind.as_str(), record.table_title),
            MappingStatus::Invalid(err) => err.to_string(),
            _ => String::new(),
        };
        println!(
            "{:<7} {:<6} {:<24} {:<18} {}",
            summary.key.to_string(),
            summary.kind.to_string(),
            summary.name,
            summary.status.label(),
            detail
        );
    }
    Ok(())
}

fn template(path: &Path, data: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let package = open_deck(path)?;
    let dataset = data.map(load_dataset).transpose()?;
    let json = MappingTemplate::generate(package.deck(), dataset.as_ref()).to_json()?;

    match output {
        Some(output) => {
            fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;
            eprintln!("Template written to: {}", output.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn apply(path: &Path, template_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let mut package = open_deck(path)?;
    let text = fs::read_to_string(template_path)
        .with_context(|| format!("Failed to read {}", template_path.display()))?;
    let template = MappingTemplate::from_json(&text)
        .with_context(|| format!("Failed to parse template {}", template_path.display()))?;

    let mut deck = package.deck().clone();
    let report = template.apply(&mut deck);
    for rejection in &report.rejected {
        eprintln!("Rejected {}: {}", rejection.key, rejection.reason);
    }

    package.apply(&deck)?;
    let output = output.unwrap_or_else(|| sibling_path(path, "_mapped"));
    package
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Applied {} mappings ({} rejected), written to: {}",
        report.applied.len(),
        report.rejected.len(),
        output.display()
    );
    Ok(())
}

fn validate(path: &Path, data: &Path) -> Result<()> {
    let package = open_deck(path)?;
    let dataset = load_dataset(data)?;
    let report = validate_deck(package.deck(), &dataset);

    for finding in &report.findings {
        println!(
            "{} {} [{}] {}",
            finding.key,
            finding.name,
            finding.issue.code(),
            finding.issue
        );
    }
    println!(
        "{} shapes, {} mapped, {} valid, {} invalid",
        report.total_shapes, report.mapped, report.valid, report.invalid
    );

    if !report.is_clean() {
        bail!("{} mappings failed validation", report.invalid);
    }
    Ok(())
}

fn update(path: &Path, data: &Path, output: Option<PathBuf>) -> Result<()> {
    let mut package = open_deck(path)?;
    let dataset = load_dataset(data)?;

    let mut deck = package.deck().clone();
    let resolution = resolve(&deck);
    let report = Reconciler::new(&dataset).reconcile_resolved(&mut deck, &resolution);

    for failure in &report.failed {
        for issue in &failure.issues {
            eprintln!("Failed {} {}: {}", failure.key, failure.name, issue);
        }
    }
    for warning in &report.warnings {
        eprintln!("Warning: {}", warning);
    }

    let rewritten = package.apply(&deck)?;
    let output = output.unwrap_or_else(|| sibling_path(path, "_updated"));
    package
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Updated {} shapes ({} changed, {} companions), preserved {}, failed {}, unmapped {}",
        report.updated.len(),
        report.changed.len(),
        report.companions.len(),
        report.preserved.len(),
        report.failed.len(),
        report.unmapped.len()
    );
    log::debug!("Rewrote {} parts", rewritten);
    println!("Written to: {}", output.display());
    Ok(())
}

fn export(
    data: &Path,
    output: &Path,
    visual: Option<Visual>,
    selections: Option<&Path>,
    no_title_slide: bool,
) -> Result<()> {
    let dataset = load_dataset(data)?;

    let mut options = match selections {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ExportOptions::from_json(&text)
                .with_context(|| format!("Failed to parse export options {}", path.display()))?
        }
        None => ExportOptions::default(),
    };
    if let Some(visual) = visual {
        options.visual = visual;
    }
    if no_title_slide {
        options.report_title = None;
    }

    let export = Exporter::new(options).export(&dataset);
    for skipped in &export.skipped {
        for issue in &skipped.issues {
            eprintln!("Skipped '{}': {}", skipped.title, issue);
        }
    }
    if export.deck.slides.is_empty() {
        bail!("Nothing to export from {}", data.display());
    }

    xtab_pptx::save_deck(&export.deck, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Exported {} slides ({} tables skipped) to: {}",
        export.deck.slides.len(),
        export.skipped.len(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtab_core::{Deck, MappingKind, ShapeContent, ShapeKey};

    const WAVE_1: &str = "\
\"Q1. Age
(single answer)\"
How old are you?
,Male,Female,Total
Base,480,520,1000
Under 35,40,35,37.5
35+,60,65,62.5

Q2. Region
,North,South,Total
Base,300,700,1000
Urban,70,40,49
Rural,30,60,51
";

    const AGE: &str = "Q1. Age\n(single answer)";

    fn read_csv(text: &str) -> CrosstabDataset {
        xtab_csv::CrosstabReader::new("wave")
            .read_dataset(text.as_bytes())
            .unwrap()
    }

    fn age_chart(deck: &Deck) -> ShapeKey {
        resolve(deck)
            .mapped
            .iter()
            .find(|r| r.record.kind == MappingKind::Chart && r.record.table_title == AGE)
            .map(|r| r.key)
            .unwrap()
    }

    fn chart_values(deck: &Deck, key: ShapeKey) -> Vec<Option<f64>> {
        match deck.shape(key).map(|shape| &shape.content) {
            Some(ShapeContent::Chart(chart)) => chart.series[0].values.clone(),
            other => panic!("expected a chart at {}, found {:?}", key, other),
        }
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling_path(Path::new("decks/q3.pptx"), "_updated"),
            PathBuf::from("decks/q3_updated.pptx")
        );
        assert_eq!(sibling_path(Path::new("q3.pptx"), "_mapped"), PathBuf::from("q3_mapped.pptx"));
    }

    #[test]
    fn test_csv_export_then_update() {
        let wave_1 = read_csv(WAVE_1);
        assert_eq!(wave_1.len(), 2);

        let export = Exporter::new(ExportOptions::default()).export(&wave_1);
        assert!(export.skipped.is_empty());
        let bytes = xtab_pptx::build(&export.deck).unwrap();

        let mut package = PptxPackage::from_bytes(&bytes).unwrap();
        let key = age_chart(package.deck());
        assert_eq!(chart_values(package.deck(), key), vec![Some(37.5), Some(62.5)]);

        let wave_2 = read_csv(&WAVE_1.replace("37.5", "41.5").replace("62.5", "58.5"));
        let mut deck = package.deck().clone();
        let report = Reconciler::new(&wave_2).reconcile(&mut deck);
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.changed, vec![key]);
        assert!(package.apply(&deck).unwrap() > 0);

        let reopened = PptxPackage::from_bytes(&package.to_bytes().unwrap()).unwrap();
        assert_eq!(age_chart(reopened.deck()), key);
        assert_eq!(chart_values(reopened.deck(), key), vec![Some(41.5), Some(58.5)]);
    }

    #[test]
    fn test_unsupported_data_file() {
        let err = load_dataset(Path::new("data.xlsx")).unwrap_err();
        assert!(err.to_string().contains("data.xlsx"));
    }

    #[test]
    fn test_parse_export_command() {
        let args = Args::parse_from([
            "xtab-deck",
            "export",
            "tables.csv",
            "--visual",
            "donut",
            "--no-title-slide",
        ]);
        match args.command {
            Command::Export {
                visual,
                no_title_slide,
                output,
                ..
            } => {
                assert_eq!(visual, Some(Visual::Donut));
                assert!(no_title_slide);
                assert_eq!(output, PathBuf::from("report.pptx"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
