//! Boundary dataset loading (GeoJSON, optionally gzipped).
//!
//! Accepts Eurostat GISCO NUTS files (`NUTS_ID`, `LEVL_CODE`, `CNTR_CODE`,
//! `NUTS_NAME`) as well as a plain `code` / `level` / `country` / `name`
//! property set.

use flate2::read::GzDecoder;
use geo::{BoundingRect, Coord, InteriorPoint, LineString, MultiPolygon, Point, Polygon};
use hashbrown::HashMap;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::level_for_code;

/// One region polygon with its hierarchy metadata.
#[derive(Debug, Clone)]
pub struct Region {
    pub code: String,
    pub level: u8,
    /// Dataset country code (`UK`, `EL`, ...)
    pub country: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn new(code: &str, level: u8, name: &str, geometry: MultiPolygon<f64>) -> Self {
        Self {
            code: code.to_string(),
            level,
            country: code.chars().take(2).collect(),
            name: name.to_string(),
            geometry,
        }
    }

    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        self.geometry
            .bounding_rect()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    /// A point guaranteed to lie inside the geometry
    pub fn interior_point(&self) -> Option<Point<f64>> {
        self.geometry.interior_point()
    }
}

/// Immutable set of regions, shared via `Arc` once loaded.
#[derive(Debug, Default)]
pub struct BoundaryDataset {
    regions: Vec<Arc<Region>>,
    by_code: HashMap<String, usize>,
    levels: Vec<u8>,
}

impl BoundaryDataset {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading boundary dataset from {}", path.display());

        let file = File::open(path).map_err(|e| {
            Error::Dataset(format!("cannot open '{}': {}", path.display(), e))
        })?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let value: Value = serde_json::from_reader(BufReader::new(reader))?;
        Self::from_geojson(&value)
    }

    /// Build from a parsed GeoJSON FeatureCollection.
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let features = value
            .get("features")
            .and_then(|f| f.as_array())
            .ok_or_else(|| Error::Dataset("expected a FeatureCollection".to_string()))?;

        let mut regions = Vec::with_capacity(features.len());
        let mut skipped = 0usize;
        for (i, feature) in features.iter().enumerate() {
            match parse_feature(feature) {
                Ok(region) => regions.push(region),
                Err(reason) => {
                    warn!("Skipping feature {}: {}", i, reason);
                    skipped += 1;
                }
            }
        }

        let dataset = Self::from_regions(regions);
        info!(
            "Loaded {} regions on levels {:?} ({} features skipped)",
            dataset.len(),
            dataset.levels,
            skipped
        );
        Ok(dataset)
    }

    /// Build from in-memory regions. Duplicate codes keep the first one.
    pub fn from_regions(regions: Vec<Region>) -> Self {
        let mut dataset = Self::default();
        for region in regions {
            if dataset.by_code.contains_key(&region.code) {
                warn!("Duplicate region code {}, keeping the first", region.code);
                continue;
            }
            if !dataset.levels.contains(&region.level) {
                dataset.levels.push(region.level);
            }
            dataset
                .by_code
                .insert(region.code.clone(), dataset.regions.len());
            dataset.regions.push(Arc::new(region));
        }
        dataset.levels.sort_unstable();
        dataset
    }

    pub fn get(&self, code: &str) -> Option<&Arc<Region>> {
        self.by_code.get(code).map(|&i| &self.regions[i])
    }

    pub fn regions(&self) -> &[Arc<Region>] {
        &self.regions
    }

    pub fn at_level(&self, level: u8) -> impl Iterator<Item = &Arc<Region>> {
        self.regions.iter().filter(move |r| r.level == level)
    }

    /// Distinct levels present, ascending
    pub fn levels(&self) -> &[u8] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn string_prop(props: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| props.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn parse_feature(feature: &Value) -> std::result::Result<Region, String> {
    let props = feature.get("properties").unwrap_or(&Value::Null);

    let code = string_prop(props, &["NUTS_ID", "code", "id"]).ok_or("missing code")?;
    let level = match string_prop(props, &["LEVL_CODE", "level"]) {
        Some(l) => l.parse::<u8>().map_err(|_| format!("{}: invalid level '{}'", code, l))?,
        None => level_for_code(&code).ok_or_else(|| format!("{}: missing level", code))?,
    };
    let country = string_prop(props, &["CNTR_CODE", "country"])
        .unwrap_or_else(|| code.chars().take(2).collect());
    let name = string_prop(props, &["NUTS_NAME", "NAME_LATN", "name"]).unwrap_or_default();

    let geometry = feature
        .get("geometry")
        .ok_or_else(|| format!("{}: missing geometry", code))
        .and_then(|g| parse_geometry(g).map_err(|e| format!("{}: {}", code, e)))?;

    Ok(Region {
        code,
        level,
        country,
        name,
        geometry,
    })
}

fn parse_geometry(geometry: &Value) -> std::result::Result<MultiPolygon<f64>, String> {
    let coords = geometry.get("coordinates").ok_or("no coordinates")?;
    let polygons = match geometry.get("type").and_then(|t| t.as_str()) {
        Some("Polygon") => vec![parse_polygon(coords)?],
        Some("MultiPolygon") => coords
            .as_array()
            .ok_or("invalid MultiPolygon")?
            .iter()
            .map(parse_polygon)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        other => return Err(format!("unsupported geometry type {:?}", other)),
    };
    if polygons.is_empty() {
        return Err("empty geometry".to_string());
    }
    Ok(MultiPolygon::new(polygons))
}

fn parse_polygon(value: &Value) -> std::result::Result<Polygon<f64>, String> {
    let mut rings = value
        .as_array()
        .ok_or("invalid polygon")?
        .iter()
        .map(parse_ring);
    let exterior = rings.next().ok_or("polygon without rings")??;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    // Polygon::new closes open rings
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(value: &Value) -> std::result::Result<LineString<f64>, String> {
    let coords = value
        .as_array()
        .ok_or("invalid ring")?
        .iter()
        .map(|pos| {
            let x = pos.get(0).and_then(|v| v.as_f64());
            let y = pos.get(1).and_then(|v| v.as_f64());
            match (x, y) {
                (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(Coord { x, y }),
                _ => Err(format!("invalid position {}", pos)),
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if coords.len() < 3 {
        return Err(format!("ring with {} positions", coords.len()));
    }
    Ok(LineString::new(coords))
}

/// Axis-aligned rectangle as a one-polygon geometry (tests, synthetic data).
pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> MultiPolygon<f64> {
    let ring = LineString::from(vec![
        (min_x, min_y),
        (max_x, min_y),
        (max_x, max_y),
        (min_x, max_y),
        (min_x, min_y),
    ]);
    MultiPolygon::new(vec![Polygon::new(ring, vec![])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn collection() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"NUTS_ID": "UK", "LEVL_CODE": 0, "CNTR_CODE": "UK", "NUTS_NAME": "United Kingdom"},
                    "geometry": {"type": "Polygon", "coordinates": [[[-8, 49], [2, 49], [2, 59], [-8, 59]]]}
                },
                {
                    "type": "Feature",
                    "properties": {"code": "UKH", "level": "1", "name": "East of England"},
                    "geometry": {"type": "MultiPolygon", "coordinates": [[[[-1, 51], [2, 51], [2, 53], [-1, 53], [-1, 51]]]]}
                },
                {
                    "type": "Feature",
                    "properties": {"NUTS_ID": "UK", "LEVL_CODE": 0, "NUTS_NAME": "Duplicate"},
                    "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}
                },
                {"type": "Feature", "properties": {"NUTS_ID": "XX1"}, "geometry": null},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [0, 0]}}
            ]
        })
    }

    #[test]
    fn test_from_geojson() {
        let dataset = BoundaryDataset::from_geojson(&collection()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.levels(), &[0, 1]);

        let uk = dataset.get("UK").unwrap();
        assert_eq!(uk.name, "United Kingdom");
        assert_eq!(uk.country, "UK");
        // open ring got closed
        let exterior = uk.geometry.0[0].exterior();
        assert_eq!(exterior.0.first(), exterior.0.last());

        let ukh = dataset.get("UKH").unwrap();
        assert_eq!(ukh.level, 1);
        assert_eq!(ukh.country, "UK");
    }

    #[test]
    fn test_load_gzip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("regions.geojson.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        encoder
            .write_all(collection().to_string().as_bytes())
            .unwrap();
        encoder.finish().unwrap();

        let dataset = BoundaryDataset::load(&path).unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_rejects_non_collection() {
        assert!(BoundaryDataset::from_geojson(&json!({"type": "Feature"})).is_err());
        assert!(BoundaryDataset::load("/nonexistent/regions.geojson").is_err());
    }
}
