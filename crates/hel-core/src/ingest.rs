//! GeoJSON ingestion of field (CLU) and soil layers, plus the selection and
//! attribute checks that must pass before any geoprocessing starts.
use std::collections::BTreeSet;
use std::path::Path;

use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use tracing::{debug, info};

use crate::config::{FieldSchema, SoilSchema};
use crate::error::{HelError, Result};
use crate::geometry::{Point, Polygon};
use crate::model::{Field, HelCategory, SoilPolygon};
use crate::units::LinearUnit;

/// A soil feature exploded to a single part, before category validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SoilFeature {
    pub label: Option<String>,
    pub musym: String,
    pub k: Option<f64>,
    pub t: Option<f64>,
    pub r: Option<f64>,
    pub geometry: Polygon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoilLayer {
    pub name: String,
    pub features: Vec<SoilFeature>,
}

// ── Reading ───────────────────────────────────────────────────────────────────

pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path)?;
    parse_feature_collection(&text)
}

pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(f) => Ok(FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        }),
        GeoJson::Geometry(_) => Err(HelError::Unsupported(
            "bare GeoJSON geometry; a Feature or FeatureCollection is required".into(),
        )),
    }
}

fn attribute<'a>(props: Option<&'a JsonObject>, name: &str) -> Option<&'a JsonValue> {
    props?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn attribute_text(props: Option<&JsonObject>, name: &str) -> Option<String> {
    match attribute(props, name)? {
        JsonValue::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        JsonValue::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn attribute_number(props: Option<&JsonObject>, name: &str) -> Option<f64> {
    match attribute(props, name)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn ring(positions: &[Vec<f64>]) -> Vec<Point> {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| (p[0], p[1]))
        .collect()
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Option<Polygon> {
    let (exterior, holes) = rings.split_first()?;
    let poly = Polygon::new(ring(exterior), holes.iter().map(|h| ring(h)).collect());
    (poly.exterior.len() >= 3).then_some(poly)
}

/// Single-part polygons of a feature geometry. Non-areal geometries yield
/// nothing.
pub fn explode(geometry: &geojson::Geometry) -> Vec<Polygon> {
    match &geometry.value {
        geojson::Value::Polygon(rings) => polygon_from_rings(rings).into_iter().collect(),
        geojson::Value::MultiPolygon(parts) => {
            parts.iter().filter_map(|p| polygon_from_rings(p)).collect()
        }
        geojson::Value::GeometryCollection(items) => items.iter().flat_map(explode).collect(),
        _ => Vec::new(),
    }
}

// ── Fields ────────────────────────────────────────────────────────────────────

/// Build fields from a CLU feature collection, dissolving features that share
/// a field id. Order follows the first appearance of each id.
pub fn load_fields(
    fc: &FeatureCollection,
    schema: &FieldSchema,
    units: LinearUnit,
) -> Result<Vec<Field>> {
    let mut fields: Vec<Field> = Vec::new();
    for feature in &fc.features {
        let props = feature.properties.as_ref();
        let id = attribute_text(props, &schema.field_id).ok_or_else(|| {
            HelError::MissingAttribute {
                layer: "fields".into(),
                attribute: schema.field_id.clone(),
            }
        })?;
        let parts = feature.geometry.as_ref().map(explode).unwrap_or_default();
        match fields.iter_mut().find(|f| f.id == id) {
            Some(existing) => existing.geometry.extend(parts),
            None => fields.push(Field {
                id,
                tract: attribute_text(props, &schema.tract).unwrap_or_default(),
                farm: attribute_text(props, &schema.farm).unwrap_or_default(),
                county: attribute_text(props, &schema.county).unwrap_or_default(),
                geometry: parts,
                acres: 0.0,
            }),
        }
    }
    let per_acre = units.square_units_per_acre();
    for field in &mut fields {
        field.acres = field.area() / per_acre;
    }
    debug!(count = fields.len(), "fields loaded");
    Ok(fields)
}

/// Keep the selected field ids; `None` keeps everything.
pub fn select_fields(fields: Vec<Field>, selection: Option<&[String]>) -> Result<Vec<Field>> {
    let selected: Vec<Field> = match selection {
        None => fields,
        Some(ids) => fields
            .into_iter()
            .filter(|f| ids.iter().any(|id| id.trim() == f.id))
            .collect(),
    };
    if selected.is_empty() {
        return Err(HelError::EmptySelection);
    }
    Ok(selected)
}

/// The single (tract, farm) pair shared by every selected field.
pub fn single_owner(fields: &[Field]) -> Result<(String, String)> {
    fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
        values.map(str::to_string).collect::<BTreeSet<_>>().into_iter().collect()
    }
    let tracts = distinct(fields.iter().map(|f| f.tract.as_str()));
    if tracts.len() != 1 {
        return Err(HelError::MultipleOwners { what: "tract", count: tracts.len(), values: tracts });
    }
    let farms = distinct(fields.iter().map(|f| f.farm.as_str()));
    if farms.len() != 1 {
        return Err(HelError::MultipleOwners { what: "farm", count: farms.len(), values: farms });
    }
    Ok((tracts[0].clone(), farms[0].clone()))
}

// ── Soils ─────────────────────────────────────────────────────────────────────

/// Read one soils layer, rejecting it when a required attribute is absent
/// from every feature.
pub fn load_soil_layer(name: &str, fc: &FeatureCollection, schema: &SoilSchema) -> Result<SoilLayer> {
    for attr in [&schema.hel, &schema.k, &schema.t, &schema.r] {
        let present = fc
            .features
            .iter()
            .any(|f| attribute(f.properties.as_ref(), attr).is_some());
        if !present {
            return Err(HelError::MissingAttribute {
                layer: name.to_string(),
                attribute: attr.clone(),
            });
        }
    }

    let mut features = Vec::new();
    for feature in &fc.features {
        let props = feature.properties.as_ref();
        let Some(geometry) = feature.geometry.as_ref() else {
            continue;
        };
        for part in explode(geometry) {
            features.push(SoilFeature {
                label: attribute_text(props, &schema.hel),
                musym: attribute_text(props, &schema.musym).unwrap_or_default(),
                k: attribute_number(props, &schema.k),
                t: attribute_number(props, &schema.t),
                r: attribute_number(props, &schema.r),
                geometry: part,
            });
        }
    }
    Ok(SoilLayer { name: name.to_string(), features })
}

/// Clip soil features to the selected fields and validate categories and
/// erosion factors of everything that actually overlaps a field.
pub fn prepare_soils(layers: &[SoilLayer], fields: &[Field]) -> Result<Vec<SoilPolygon>> {
    let field_parts: Vec<&Polygon> = fields.iter().flat_map(|f| f.geometry.iter()).collect();
    let Some(envelope) = field_parts
        .iter()
        .map(|p| p.extent())
        .reduce(|a, b| a.union(&b))
    else {
        return Ok(Vec::new());
    };

    let mut null_count = 0usize;
    let mut invalid: BTreeSet<String> = BTreeSet::new();
    let mut soils = Vec::new();

    for layer in layers {
        for feature in &layer.features {
            let extent = feature.geometry.extent();
            if !extent.intersects(&envelope) {
                continue;
            }
            let overlaps = field_parts.iter().any(|p| {
                p.extent().intersects(&extent) && p.intersection_area(&feature.geometry) > 0.0
            });
            if !overlaps {
                continue;
            }
            let category = match feature.label.as_deref() {
                None => {
                    null_count += 1;
                    continue;
                }
                Some(label) => match HelCategory::parse(label) {
                    Some(c) => c,
                    None => {
                        invalid.insert(label.to_string());
                        continue;
                    }
                },
            };
            soils.push(SoilPolygon {
                layer: layer.name.clone(),
                musym: feature.musym.clone(),
                category,
                k: feature.k.unwrap_or(0.0),
                t: feature.t.unwrap_or(0.0),
                r: feature.r.unwrap_or(0.0),
                geometry: feature.geometry.clone(),
            });
        }
    }

    if null_count > 0 || !invalid.is_empty() {
        return Err(HelError::InvalidHelCategory {
            null_count,
            invalid: invalid.into_iter().collect(),
        });
    }
    for (index, soil) in soils.iter().enumerate() {
        soil.check_factors(index)?;
    }
    info!(layers = layers.len(), polygons = soils.len(), "soil polygons clipped to fields");
    Ok(soils)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        { "type": "Feature",
          "properties": { "clunbr": 1, "TRACTNBR": "1234", "FARMNBR": "56", "COUNTYCD": "001" },
          "geometry": { "type": "Polygon",
            "coordinates": [[[0,0],[100,0],[100,100],[0,100],[0,0]]] } },
        { "type": "Feature",
          "properties": { "CLUNBR": "1", "TRACTNBR": "1234", "FARMNBR": "56", "COUNTYCD": "001" },
          "geometry": { "type": "Polygon",
            "coordinates": [[[200,0],[300,0],[300,100],[200,100],[200,0]]] } },
        { "type": "Feature",
          "properties": { "CLUNBR": 2, "TRACTNBR": "9999", "FARMNBR": "56", "COUNTYCD": "001" },
          "geometry": { "type": "Polygon",
            "coordinates": [[[0,200],[100,200],[100,300],[0,300],[0,200]]] } }
      ]
    }"#;

    fn soils_json(label: &str, t: &str) -> String {
        format!(
            r#"{{
          "type": "FeatureCollection",
          "features": [
            {{ "type": "Feature",
              "properties": {{ "MUHELCL": {label}, "K": 0.3, "T": {t}, "R": 150, "MUSYM": "CaB" }},
              "geometry": {{ "type": "MultiPolygon",
                "coordinates": [[[[0,0],[50,0],[50,100],[0,100],[0,0]]],
                                [[[1000,1000],[1010,1000],[1010,1010],[1000,1000]]]] }} }}
          ]
        }}"#
        )
    }

    fn fields() -> Vec<Field> {
        let fc = parse_feature_collection(FIELDS).unwrap();
        load_fields(&fc, &FieldSchema::default(), LinearUnit::Meter).unwrap()
    }

    #[test]
    fn features_sharing_an_id_are_dissolved() {
        let fields = fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].id, "1");
        assert_eq!(fields[0].geometry.len(), 2);
        assert!((fields[0].acres - 20_000.0 / 4046.8564224).abs() < 1e-9);
    }

    #[test]
    fn selection_and_owner_checks() {
        let all = fields();
        let err = single_owner(&all).unwrap_err();
        assert!(matches!(err, HelError::MultipleOwners { what: "tract", count: 2, .. }));

        let one = select_fields(all.clone(), Some(&["1".to_string()])).unwrap();
        assert_eq!(single_owner(&one).unwrap(), ("1234".into(), "56".into()));

        let none = select_fields(all, Some(&["77".to_string()]));
        assert!(matches!(none, Err(HelError::EmptySelection)));
    }

    #[test]
    fn soil_layer_schema_check() {
        let fc = parse_feature_collection(&soils_json("\"PHEL\"", "5")).unwrap();
        let schema = SoilSchema { r: "R_FACTOR".into(), ..SoilSchema::default() };
        let err = load_soil_layer("ssurgo", &fc, &schema).unwrap_err();
        assert!(matches!(err, HelError::MissingAttribute { ref attribute, .. } if attribute == "R_FACTOR"));
    }

    #[test]
    fn multipolygons_explode_and_clip() {
        let fc = parse_feature_collection(&soils_json("\"PHEL\"", "5")).unwrap();
        let layer = load_soil_layer("ssurgo", &fc, &SoilSchema::default()).unwrap();
        assert_eq!(layer.features.len(), 2);
        let soils = prepare_soils(&[layer], &fields()).unwrap();
        assert_eq!(soils.len(), 1);
        assert_eq!(soils[0].category, HelCategory::Phel);
    }

    #[test]
    fn null_and_invalid_categories_are_fatal() {
        for label in ["null", "\"MAYBE\""] {
            let fc = parse_feature_collection(&soils_json(label, "5")).unwrap();
            let layer = load_soil_layer("ssurgo", &fc, &SoilSchema::default()).unwrap();
            let err = prepare_soils(&[layer], &fields()).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::DataQuality);
        }
    }

    #[test]
    fn zero_t_factor_is_rejected_for_phel() {
        let fc = parse_feature_collection(&soils_json("\"PHEL\"", "0")).unwrap();
        let layer = load_soil_layer("ssurgo", &fc, &SoilSchema::default()).unwrap();
        let err = prepare_soils(&[layer], &fields()).unwrap_err();
        assert!(matches!(err, HelError::InvalidFactor { factor: "T", .. }));
    }
}
