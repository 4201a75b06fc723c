//! Thematic map of model predictions.
//!
//! Produces marker layers for an external map renderer: one marker per
//! survey point, colored by predicted class, plus the initial view state.

use crate::dataset::{SurveyData, LATITUDE, LONGITUDE, POINT_ID, POINT_NAME};
use crate::error::{PastureError, Result};
use crate::model::DegradationClass;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;

pub const MARKER_RADIUS: f64 = 1000.0;
pub const DEFAULT_ZOOM: f64 = 5.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub point_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub prediction: DegradationClass,
    pub label: String,
    pub color: [u8; 3],
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub pitch: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThematicMap {
    pub view: ViewState,
    pub markers: Vec<MapMarker>,
}

impl ThematicMap {
    /// `predicted` holds one class per point, in `data` row order. Points
    /// without coordinates are left off the map.
    pub fn build(data: &SurveyData, predicted: &[DegradationClass]) -> Result<Self> {
        if predicted.len() != data.len() {
            return Err(PastureError::ShapeMismatch {
                what: "predictions per point".to_string(),
                expected: data.len(),
                got: predicted.len(),
            });
        }
        let ids = data.point_ids()?;
        let names = if data.has_column(POINT_NAME) {
            data.column_str(POINT_NAME)?
        } else {
            ids.clone()
        };
        let lats = data.column_f64(LATITUDE)?;
        let lons = data.column_f64(LONGITUDE)?;

        let markers: Vec<MapMarker> = (0..data.len())
            .filter(|&i| lats[i].is_finite() && lons[i].is_finite())
            .map(|i| MapMarker {
                point_id: ids[i].clone(),
                name: names[i].clone(),
                latitude: lats[i],
                longitude: lons[i],
                prediction: predicted[i],
                label: predicted[i].label().to_string(),
                color: predicted[i].color(),
                radius: MARKER_RADIUS,
            })
            .collect();

        if markers.is_empty() {
            return Err(PastureError::Schema(format!(
                "no point has both {} and {}",
                LATITUDE, LONGITUDE
            )));
        }

        let n = markers.len() as f64;
        let view = ViewState {
            latitude: markers.iter().map(|m| m.latitude).sum::<f64>() / n,
            longitude: markers.iter().map(|m| m.longitude).sum::<f64>() / n,
            zoom: DEFAULT_ZOOM,
            pitch: 0.0,
        };

        Ok(Self { view, markers })
    }

    pub fn degraded_count(&self) -> usize {
        self.markers
            .iter()
            .filter(|m| m.prediction == DegradationClass::Degraded)
            .count()
    }

    /// GeoJSON `FeatureCollection`; coordinates are `[lon, lat]`.
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self
            .markers
            .iter()
            .map(|m| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [m.longitude, m.latitude],
                    },
                    "properties": {
                        "PontoID": m.point_id,
                        "Ponto": m.name,
                        "y_pred_class": m.label,
                        "color": m.color,
                        "radius": m.radius,
                        "tooltip": format!("ID: {} | Predição: {}", m.name, m.label),
                    },
                })
            })
            .collect();
        json!({
            "type": "FeatureCollection",
            "view_state": self.view,
            "features": features,
        })
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record([POINT_ID, POINT_NAME, LATITUDE, LONGITUDE, "y_pred_class", "color"])?;
        for m in &self.markers {
            let color = format!("#{:02X}{:02X}{:02X}", m.color[0], m.color[1], m.color[2]);
            wtr.write_record([
                m.point_id.clone(),
                m.name.clone(),
                m.latitude.to_string(),
                m.longitude.to_string(),
                m.label.clone(),
                color,
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}
