use pasture_lens::attribution::{Attributor, TreeShapAttributor};
use pasture_lens::config::AppConfig;
use pasture_lens::dataset::SurveyData;
use pasture_lens::descriptive::{Descriptive, GroupBy};
use pasture_lens::map::ThematicMap;
use pasture_lens::model::{DegradationClass, TreeEnsemble};
use pasture_lens::narrator::{Locale, Narrator};
use pasture_lens::prediction::{predict_points, FeatureInput, Predictor};
use pasture_lens::PastureError;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const SCORES_CSV: &str = "\
Ponto,PontoID,Data,Avaliador,Altura,EstDesenv,Invasoras,Cupins,CobertSolo,DispForr,DispFolhVerd,CondAtual,PotProd,Degrad,Manejo
P1,1,2024-03-01,ana,10,2,5,6,2,2,2,2,3,6,2
P1,1,2024-03-01,rui,12,3,6,5,3,2,7,3,3,5,3
P2,2,2024-03-02,ana,30,6,1,1,6,6,4,6,6,1,6
P2,2,2024-03-02,rui,34,5,2,2,7,5,5,5,6,2,5
P3,3,2024-03-03,ana,25,4,3,3,4,4,3,3,4,3,4
P3,3,2024-03-03,rui,27,4,3,4,5,4,3,3,5,4,4
P4,4,2024-03-04,ana,5,1,7,7,1,1,1,1,1,7,1
";

const CLASSES_CSV: &str = "\
PontoID,Ponto,CLASS_DED,LAT,LON
1,P1,Degradação Alta,-16.5,-49.2
2,P2,Não degradada,-17.1,-50.3
3,P3,Degradação Baixa,-15.9,-48.8
";

const MODEL_JSON: &str = r#"{
    "base_score": 0.5,
    "feature_names": [
        "Altura_mean", "EstDesenv_mean", "Invasoras_mean", "Cupins_mean", "CobertSolo_mean",
        "DispForr_mean", "DispFolhVerd_mean", "CondAtual_mean", "PotProd_mean"
    ],
    "trees": [
        {"nodes": [
            {"split": 0, "threshold": 20.0, "yes": 1, "no": 2, "missing": 1, "cover": 8.0},
            {"leaf": 0.9, "cover": 4.0},
            {"leaf": -0.7, "cover": 4.0}
        ]},
        {"nodes": [
            {"split": 7, "threshold": 4.0, "yes": 1, "no": 2, "missing": 2, "cover": 8.0},
            {"leaf": 0.6, "cover": 3.0},
            {"leaf": -0.5, "cover": 5.0}
        ]}
    ]
}"#;

/// Write the fixture files into a fresh scratch directory.
fn create_test_data_files(name: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let dir: PathBuf = std::env::temp_dir().join(format!("pasture_lens_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir)?;

    let config = AppConfig {
        scores_path: dir.join("scores.csv"),
        classes_path: dir.join("classes.csv"),
        model_path: dir.join("model.json"),
        ..AppConfig::default()
    };
    fs::write(&config.scores_path, SCORES_CSV)?;
    fs::write(&config.classes_path, CLASSES_CSV)?;
    fs::write(&config.model_path, MODEL_JSON)?;
    Ok(config)
}

fn load(name: &str) -> (SurveyData, TreeEnsemble) {
    let config = create_test_data_files(name).unwrap();
    let data = SurveyData::load(&config).unwrap();
    let model = TreeEnsemble::load(&config.model_path).unwrap();
    (data, model)
}

#[test]
fn test_load_and_aggregate() {
    let (data, model) = load("aggregate");

    assert_eq!(data.len(), 3);
    assert_eq!(data.scores().len(), 11);
    assert_eq!(data.model_scores().len(), 9);
    assert_eq!(data.column_f64("Altura_mean").unwrap(), vec![11.0, 32.0, 26.0]);
    assert_eq!(data.column_f64("DispFolhVerd_max_min_diff").unwrap(), vec![5.0, 1.0, 0.0]);
    assert_eq!(data.targets().unwrap(), vec![1, 0, 0]);

    let expected: Vec<String> = data.model_scores().iter().map(|s| format!("{}_mean", s)).collect();
    assert_eq!(model.feature_names(), expected.as_slice());

    // Unclassified point 4 survives the left join only.
    assert_eq!(data.detail().unwrap().height(), 7);
}

#[test]
fn test_batch_predictions_and_map() {
    let (data, model) = load("map");
    let rows = data.feature_matrix(model.feature_names()).unwrap();
    let predicted = predict_points(&model, &rows).unwrap();
    assert_eq!(
        predicted,
        vec![
            DegradationClass::Degraded,
            DegradationClass::NotDegraded,
            DegradationClass::NotDegraded
        ]
    );

    let map = ThematicMap::build(&data, &predicted).unwrap();
    assert_eq!(map.markers.len(), 3);
    assert_eq!(map.markers[0].name, "P1");
    assert_eq!(map.markers[0].color, [255, 0, 0]);
    assert!((map.view.latitude - (-16.5 - 17.1 - 15.9) / 3.0).abs() < 1e-9);

    let geojson = map.to_geojson();
    assert_eq!(geojson["features"].as_array().unwrap().len(), 3);
    assert_eq!(geojson["view_state"]["zoom"], 5.5);
}

#[test]
fn test_user_prediction_with_narrative() {
    let (data, model) = load("predict");
    let ranges = data.feature_ranges(model.feature_names()).unwrap();
    assert_eq!((ranges[0].min, ranges[0].max), (11.0, 32.0));

    let overrides: HashMap<String, f64> = [("Altura_mean".to_string(), 12.0)].into_iter().collect();
    let input = FeatureInput::from_overrides(&ranges, &overrides).unwrap();

    let attributor = TreeShapAttributor::new(&model);
    assert!((attributor.baseline() - 0.0125).abs() < 1e-12);

    let predictor = Predictor::new(&model, attributor, Narrator::new(Locale::English, 4), 5);
    let report = predictor.predict(&input).unwrap();

    assert_eq!(report.class, DegradationClass::Degraded);
    assert!((report.attribution.contributions[0] - 0.8).abs() < 1e-12);
    assert!((report.attribution.contributions[7] - 0.6875).abs() < 1e-12);
    assert!((report.trace.final_log_odds() - 1.5).abs() < 1e-12);

    // 9 features: baseline + 9 + closing
    assert_eq!(report.narrative.len(), 11);
    assert!(report.narrative[8].contains("'CondAtual_mean' increased the log-odds by 0.6875"));
    assert!(report.narrative[9].contains("'Altura_mean' increased the log-odds by 0.8000"));
    // Unused features contribute nothing and are worded as decreases.
    assert!(report.narrative[1].contains("'EstDesenv_mean' decreased the log-odds by 0.0000"));
    assert!(report.narrative[10].contains("81.7574%"));

    assert_eq!(report.waterfall.bars[0].label, "12.000 = Altura_mean");
    assert_eq!(report.waterfall.bars.len(), 5);
    assert_eq!(report.waterfall.bars[4].label, "5 other features");
    assert!((report.waterfall.output - 1.5).abs() < 1e-12);
}

#[test]
fn test_out_of_range_slider() {
    let (data, model) = load("range");
    let ranges = data.feature_ranges(model.feature_names()).unwrap();
    let overrides: HashMap<String, f64> = [("Cupins_mean".to_string(), 0.5)].into_iter().collect();
    assert!(matches!(
        FeatureInput::from_overrides(&ranges, &overrides),
        Err(PastureError::InputOutOfRange { .. })
    ));
}

#[test]
fn test_descriptive_views() {
    let (data, model) = load("describe");
    let rows = data.feature_matrix(model.feature_names()).unwrap();
    let predicted = predict_points(&model, &rows).unwrap();
    let descriptive = Descriptive::new(&data, predicted).unwrap();

    let boxes = descriptive.boxplot("Altura_mean", GroupBy::Predicted).unwrap();
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[1].group, "NÃO DEGRADADA");
    assert_eq!(boxes[1].median, 29.0);

    let series = descriptive
        .scatter("Cupins_mean", "Altura_mean", GroupBy::Class)
        .unwrap();
    assert_eq!(series.len(), 3);

    let overview = descriptive.disagreement_overview(4.0).unwrap();
    assert_eq!(overview.len(), 11);
    assert!(overview.iter().all(|b| b.count == 2));

    let by_class = descriptive
        .disagreement_by_class("Cupins_max_min_diff", GroupBy::Class)
        .unwrap();
    assert_eq!(by_class.len(), 3);
}

#[test]
fn test_missing_files() {
    let config = AppConfig {
        scores_path: PathBuf::from("does/not/exist.csv"),
        ..AppConfig::default()
    };
    assert!(matches!(SurveyData::load(&config), Err(PastureError::Io(_))));
    assert!(TreeEnsemble::load(&PathBuf::from("does/not/exist.json")).is_err());
}

#[test]
fn test_attributor_trait_object() {
    let (_, model) = load("trait");
    let attributor: Box<dyn Attributor + '_> = Box::new(TreeShapAttributor::new(&model));
    assert_eq!(attributor.feature_names().len(), 9);
    let row = vec![30.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 6.0, 4.0];
    let attribution = attributor.attribute(&row).unwrap();
    assert!((attribution.total_log_odds() - model.margin(&row).unwrap()).abs() < 1e-9);
}
