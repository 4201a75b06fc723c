use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pasture_lens::attribution::{Attribution, TreeShapAttributor};
use pasture_lens::config::AppConfig;
use pasture_lens::dataset::{Aggregate, SurveyData};
use pasture_lens::descriptive::{BoxSummary, Descriptive, GroupBy};
use pasture_lens::map::ThematicMap;
use pasture_lens::model::{DegradationClass, TreeEnsemble};
use pasture_lens::narrator::{presentation_order, Narrator};
use pasture_lens::prediction::{predict_points, FeatureInput, Predictor};
use pasture_lens::waterfall::{WaterfallChart, DEFAULT_MAX_DISPLAY};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pasture-lens")]
#[command(about = "Explore and explain pasture degradation predictions")]
struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Survey scores CSV (one row per rater evaluation)
    #[arg(long, global = true)]
    scores: Option<PathBuf>,

    /// Class and geolocation CSV
    #[arg(long, global = true)]
    classes: Option<PathBuf>,

    /// Tree ensemble model (JSON)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Narrative language: en or pt
    #[arg(long, global = true)]
    locale: Option<String>,

    /// Decimal places in the narrative
    #[arg(long, global = true)]
    precision: Option<usize>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MapFormat {
    Geojson,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict degradation for one pasture from mean rater scores
    Predict {
        #[arg(long)]
        altura: Option<f64>,
        #[arg(long)]
        est_desenv: Option<f64>,
        #[arg(long)]
        invasoras: Option<f64>,
        #[arg(long)]
        cupins: Option<f64>,
        #[arg(long)]
        cobert_solo: Option<f64>,
        #[arg(long)]
        disp_forr: Option<f64>,
        #[arg(long)]
        disp_folh_verd: Option<f64>,
        #[arg(long)]
        cond_atual: Option<f64>,
        #[arg(long)]
        pot_prod: Option<f64>,

        /// Bars shown in the waterfall before folding the rest
        #[arg(long, default_value_t = DEFAULT_MAX_DISPLAY)]
        max_display: usize,
    },
    /// Narrate a precomputed attribution (JSON with feature_names, baseline, contributions)
    Explain {
        attribution: PathBuf,

        /// Keep input order instead of ascending impact
        #[arg(long)]
        original_order: bool,
    },
    /// Thematic map of predictions for every classified point
    Map {
        #[arg(long, value_enum, default_value_t = MapFormat::Geojson)]
        map_format: MapFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Descriptive summaries of mean scores
    Describe {
        #[command(subcommand)]
        view: DescribeView,
    },
    /// Spread between raters (max - min score per point)
    Disagreement {
        /// Single range column to break down by class, e.g. Cupins_max_min_diff
        #[arg(long)]
        column: Option<String>,

        /// CLASS_DED or y_pred_class
        #[arg(long, default_value = "CLASS_DED")]
        by: String,

        /// Override the DispFolhVerd range cap
        #[arg(long)]
        cap: Option<f64>,
    },
}

#[derive(Subcommand)]
enum DescribeView {
    /// Boxplot of one mean score per class
    Boxplot {
        #[arg(long, default_value = "Altura_mean")]
        column: String,

        /// CLASS_DED or y_pred_class
        #[arg(long, default_value = "CLASS_DED")]
        by: String,
    },
    /// Two mean scores against each other
    Scatter {
        #[arg(long)]
        x: String,
        #[arg(long)]
        y: String,

        /// CLASS_DED or y_pred_class
        #[arg(long, default_value = "CLASS_DED")]
        color: String,
    },
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    match args.command {
        Commands::Predict {
            altura,
            est_desenv,
            invasoras,
            cupins,
            cobert_solo,
            disp_forr,
            disp_folh_verd,
            cond_atual,
            pot_prod,
            max_display,
        } => {
            let sliders = [
                ("Altura", altura),
                ("EstDesenv", est_desenv),
                ("Invasoras", invasoras),
                ("Cupins", cupins),
                ("CobertSolo", cobert_solo),
                ("DispForr", disp_forr),
                ("DispFolhVerd", disp_folh_verd),
                ("CondAtual", cond_atual),
                ("PotProd", pot_prod),
            ];
            let overrides: HashMap<String, f64> = sliders
                .iter()
                .filter_map(|(score, v)| v.map(|v| (Aggregate::Mean.column(score), v)))
                .collect();
            run_predict(&config, overrides, max_display, args.format)
        }
        Commands::Explain {
            attribution,
            original_order,
        } => run_explain(&config, attribution, original_order, args.format),
        Commands::Map { map_format, output } => run_map(&config, map_format, output),
        Commands::Describe { view } => run_describe(&config, view, args.format),
        Commands::Disagreement { column, by, cap } => {
            run_disagreement(&config, column, &by, cap, args.format)
        }
    }
}

fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(p) = &args.scores {
        config.scores_path = p.clone();
    }
    if let Some(p) = &args.classes {
        config.classes_path = p.clone();
    }
    if let Some(p) = &args.model {
        config.model_path = p.clone();
    }
    if let Some(l) = &args.locale {
        config.locale = l.parse()?;
    }
    if let Some(p) = args.precision {
        config.precision = p;
    }
    config.validate()?;
    Ok(config)
}

fn load_inputs(config: &AppConfig) -> Result<(SurveyData, TreeEnsemble)> {
    info!("Loading survey data from {:?}", config.scores_path);
    let data = SurveyData::load(config).context("Failed to load survey data")?;
    let model = TreeEnsemble::load(&config.model_path)
        .with_context(|| format!("Failed to load model {:?}", config.model_path))?;
    Ok((data, model))
}

fn point_predictions(data: &SurveyData, model: &TreeEnsemble) -> Result<Vec<DegradationClass>> {
    let rows = data.feature_matrix(model.feature_names())?;
    Ok(predict_points(model, &rows)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_predict(
    config: &AppConfig,
    overrides: HashMap<String, f64>,
    max_display: usize,
    format: OutputFormat,
) -> Result<()> {
    let (data, model) = load_inputs(config)?;
    let ranges = data.feature_ranges(model.feature_names())?;
    let input = FeatureInput::from_overrides(&ranges, &overrides)?;

    let narrator = Narrator::new(config.locale, config.precision);
    let predictor = Predictor::new(&model, TreeShapAttributor::new(&model), narrator, max_display);
    let report = predictor.predict(&input)?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!("\n=== Prediction ===");
            for (name, value) in input.feature_names.iter().zip(&input.values) {
                println!("  {:<20} {:.1}", name, value);
            }
            println!("\nThe pasture with the given scores was predicted as: {}", report.class);
            println!("\n=== Interpreting the prediction (SHAP values) ===");
            println!("{}", report.narrative_text());
            println!("\n{}", report.waterfall.render_text());
            Ok(())
        }
    }
}

fn run_explain(config: &AppConfig, path: PathBuf, original_order: bool, format: OutputFormat) -> Result<()> {
    let text = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
    let attribution: Attribution = serde_json::from_str(&text)?;
    attribution.validate()?;

    let order = if original_order {
        (0..attribution.contributions.len()).collect()
    } else {
        presentation_order(&attribution.contributions)
    };
    let narrator = Narrator::new(config.locale, config.precision);
    let narrative = narrator.narrate(
        &attribution.feature_names,
        &attribution.contributions,
        attribution.baseline,
        attribution.probability(),
        &order,
    )?;

    match format {
        OutputFormat::Json => print_json(&narrative),
        OutputFormat::Text => {
            println!("{}", narrative);
            let chart = WaterfallChart::from_attribution(&attribution, DEFAULT_MAX_DISPLAY)?;
            println!("\n{}", chart.render_text());
            Ok(())
        }
    }
}

fn run_map(config: &AppConfig, format: MapFormat, output: Option<PathBuf>) -> Result<()> {
    let (data, model) = load_inputs(config)?;
    let predicted = point_predictions(&data, &model)?;
    let map = ThematicMap::build(&data, &predicted)?;
    info!(
        "Map of {} points ({} degraded)",
        map.markers.len(),
        map.degraded_count()
    );

    let mut writer: Box<dyn Write> = match &output {
        Some(p) => Box::new(File::create(p).with_context(|| format!("Failed to create {:?}", p))?),
        None => Box::new(io::stdout()),
    };
    match format {
        MapFormat::Geojson => {
            serde_json::to_writer_pretty(&mut writer, &map.to_geojson())?;
            writeln!(writer)?;
        }
        MapFormat::Csv => map.write_csv(&mut writer)?,
    }
    Ok(())
}

fn print_boxes(title: &str, boxes: &[BoxSummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&boxes),
        OutputFormat::Text => {
            println!("\n=== {} ===", title);
            for b in boxes {
                println!("{}", b);
            }
            Ok(())
        }
    }
}

fn run_describe(config: &AppConfig, view: DescribeView, format: OutputFormat) -> Result<()> {
    let (data, model) = load_inputs(config)?;
    let predicted = point_predictions(&data, &model)?;
    let descriptive = Descriptive::new(&data, predicted)?;

    match view {
        DescribeView::Boxplot { column, by } => {
            let boxes = descriptive.boxplot(&column, by.parse::<GroupBy>()?)?;
            print_boxes(&format!("{} by {}", column, by), &boxes, format)
        }
        DescribeView::Scatter { x, y, color } => {
            let series = descriptive.scatter(&x, &y, color.parse::<GroupBy>()?)?;
            match format {
                OutputFormat::Json => print_json(&series),
                OutputFormat::Text => {
                    println!("\n=== {} vs {} by {} ===", y, x, color);
                    for s in &series {
                        println!("{} ({} points)", s.group, s.points.len());
                        for (px, py) in &s.points {
                            println!("  {:.2}\t{:.2}", px, py);
                        }
                    }
                    Ok(())
                }
            }
        }
    }
}

fn run_disagreement(
    config: &AppConfig,
    column: Option<String>,
    by: &str,
    cap: Option<f64>,
    format: OutputFormat,
) -> Result<()> {
    let (data, model) = load_inputs(config)?;
    let predicted = point_predictions(&data, &model)?;
    let descriptive = Descriptive::new(&data, predicted)?;

    match column {
        Some(column) => {
            let boxes = descriptive.disagreement_by_class(&column, by.parse::<GroupBy>()?)?;
            print_boxes(&format!("{} by {}", column, by), &boxes, format)
        }
        None => {
            let cap = cap.unwrap_or(config.disagreement_cap);
            let boxes = descriptive.disagreement_overview(cap)?;
            print_boxes("Rater disagreement (max - min) per score", &boxes, format)
        }
    }
}
