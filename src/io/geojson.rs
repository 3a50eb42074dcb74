//! GeoJSON boundary: training-polygon writer and overlay reader.
//!
//! The pipeline itself never touches files; callers hand in readers and
//! writers, keeping raster and vector storage external.

use crate::types::{
    CoordinateSystem, LabelError, LabelResult, OverlayLayer, PolygonRecord,
};
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPolygon, Polygon};
use serde_json::{json, Value};
use std::io::{Read, Write};

/// Write polygon records as a GeoJSON FeatureCollection.
///
/// Each feature carries the polygon geometry plus `class`, `class_name` and
/// `area_m2` properties.
pub fn write_polygons<W: Write>(writer: W, records: &[PolygonRecord]) -> LabelResult<()> {
    let features: Vec<Value> = records
        .iter()
        .map(|record| {
            json!({
                "type": "Feature",
                "geometry": polygon_value(&record.geometry),
                "properties": {
                    "class": record.class.code(),
                    "class_name": record.class.to_string(),
                    "area_m2": record.area_m2,
                },
            })
        })
        .collect();

    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    serde_json::to_writer_pretty(writer, &collection)?;
    Ok(())
}

fn polygon_value(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_value(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_value));
    json!({ "type": "Polygon", "coordinates": rings })
}

fn ring_value(ring: &LineString<f64>) -> Value {
    Value::Array(
        ring.0
            .iter()
            .map(|c| json!([c.x, c.y]))
            .collect(),
    )
}

/// Read overlay geometries from GeoJSON.
///
/// Accepts a FeatureCollection, a single Feature, or a bare geometry;
/// Polygon, MultiPolygon, LineString and MultiLineString geometries are
/// supported. The caller supplies the layer's coordinate reference, or
/// `None` to defer to the raster's.
pub fn read_overlay<R: Read>(
    mut reader: R,
    crs: Option<CoordinateSystem>,
) -> LabelResult<OverlayLayer> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let root: Value = serde_json::from_str(&text)?;

    let mut geometries = Vec::new();
    collect_geometries(&root, &mut geometries)?;
    log::debug!("Read {} overlay geometries", geometries.len());

    Ok(OverlayLayer { geometries, crs })
}

fn collect_geometries(value: &Value, out: &mut Vec<Geometry<f64>>) -> LabelResult<()> {
    match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    LabelError::InvalidFormat("FeatureCollection without features".to_string())
                })?;
            for feature in features {
                collect_geometries(feature, out)?;
            }
            Ok(())
        }
        Some("Feature") => {
            match value.get("geometry") {
                Some(Value::Null) | None => Ok(()), // geometry-less feature
                Some(geometry) => collect_geometries(geometry, out),
            }
        }
        Some("GeometryCollection") => {
            let members = value
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    LabelError::InvalidFormat("GeometryCollection without geometries".to_string())
                })?;
            for member in members {
                collect_geometries(member, out)?;
            }
            Ok(())
        }
        Some(kind) => {
            out.push(parse_geometry(kind, value)?);
            Ok(())
        }
        None => Err(LabelError::InvalidFormat(
            "GeoJSON object without a type".to_string(),
        )),
    }
}

fn parse_geometry(kind: &str, value: &Value) -> LabelResult<Geometry<f64>> {
    let coordinates = value
        .get("coordinates")
        .ok_or_else(|| LabelError::InvalidFormat(format!("{} without coordinates", kind)))?;

    match kind {
        "LineString" => Ok(Geometry::LineString(parse_line(coordinates)?)),
        "MultiLineString" => {
            let lines = as_array(coordinates)?
                .iter()
                .map(parse_line)
                .collect::<LabelResult<Vec<_>>>()?;
            Ok(Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        "Polygon" => Ok(Geometry::Polygon(parse_polygon(coordinates)?)),
        "MultiPolygon" => {
            let polygons = as_array(coordinates)?
                .iter()
                .map(parse_polygon)
                .collect::<LabelResult<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
        }
        other => Err(LabelError::InvalidFormat(format!(
            "unsupported overlay geometry type: {}",
            other
        ))),
    }
}

fn parse_polygon(value: &Value) -> LabelResult<Polygon<f64>> {
    let rings = as_array(value)?
        .iter()
        .map(parse_line)
        .collect::<LabelResult<Vec<_>>>()?;
    let mut rings = rings.into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| LabelError::InvalidFormat("Polygon without rings".to_string()))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

fn parse_line(value: &Value) -> LabelResult<LineString<f64>> {
    let coords = as_array(value)?
        .iter()
        .map(parse_position)
        .collect::<LabelResult<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

fn parse_position(value: &Value) -> LabelResult<Coord<f64>> {
    let pair = as_array(value)?;
    if pair.len() < 2 {
        return Err(LabelError::InvalidFormat(
            "position with fewer than two ordinates".to_string(),
        ));
    }
    let x = pair[0]
        .as_f64()
        .ok_or_else(|| LabelError::InvalidFormat("non-numeric ordinate".to_string()))?;
    let y = pair[1]
        .as_f64()
        .ok_or_else(|| LabelError::InvalidFormat("non-numeric ordinate".to_string()))?;
    Ok(Coord { x, y })
}

fn as_array(value: &Value) -> LabelResult<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| LabelError::InvalidFormat("expected a JSON array".to_string()))
}
