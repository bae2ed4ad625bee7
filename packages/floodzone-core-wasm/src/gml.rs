// Parser for the GML-ish XML the building feature service returns.
//
// The walk is namespace-agnostic on purpose: elements are matched on their
// local (unqualified) name only, so prefix choices like wfs:member vs
// gml:member never matter. Every <member> wraps one feature payload; the
// first <pos> descendant of that payload carries the point coordinate.
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{json, Map, Value};

use crate::errors::PipelineError;
use crate::models::{Feature, FeatureCollection, Geometry};

fn xml_err(e: quick_xml::Error) -> PipelineError {
    PipelineError::Xml(e.to_string())
}

fn local_name_of(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn is_exception_name(name: &str) -> bool {
    name == "ExceptionText" || name == "ServiceException"
}

/// Fails with the embedded service-exception text when the document carries
/// one. Document order, first match wins.
fn check_service_exception(xml: &str) -> Result<(), PipelineError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut exception_depth: Option<usize> = None;
    let mut message = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                if exception_depth.is_none() && is_exception_name(&local_name_of(&e)) {
                    exception_depth = Some(depth);
                }
            }
            Ok(Event::Empty(e)) => {
                if exception_depth.is_none() && is_exception_name(&local_name_of(&e)) {
                    return Err(PipelineError::Protocol(String::new()));
                }
            }
            Ok(Event::Text(t)) => {
                if exception_depth.is_some() {
                    message.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Ok(Event::End(_)) => {
                if exception_depth == Some(depth) {
                    return Err(PipelineError::Protocol(message.trim().to_string()));
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_err(e)),
        }
    }
    Ok(())
}

struct Frame {
    name: String,
    has_child_elements: bool,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Frame {
            name,
            has_child_elements: false,
            text: String::new(),
        }
    }
}

/// Parses a GetFeature response into a collection of point features.
///
/// Members whose payload has no `pos` descendant are skipped silently
/// (heterogeneous feature types are expected); so are members whose `pos`
/// text does not yield two numeric tokens. Properties come from the
/// payload's direct children that have no child elements of their own and
/// non-blank text; on a key collision the last write wins.
pub fn parse(xml: &str) -> Result<FeatureCollection, PipelineError> {
    check_service_exception(xml)?;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut collection = FeatureCollection::new();
    let mut stack: Vec<Frame> = Vec::new();
    // stack index of the currently open <member>, if any
    let mut member_depth: Option<usize> = None;
    // direct children of the member seen so far; only the first one is the
    // feature payload
    let mut payload_children_seen = 0usize;
    let mut pos_text: Option<String> = None;
    let mut properties: Map<String, Value> = Map::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name_of(&e);
                if let Some(parent) = stack.last_mut() {
                    parent.has_child_elements = true;
                }
                match member_depth {
                    Some(md) => {
                        if stack.len() == md + 1 {
                            payload_children_seen += 1;
                        }
                    }
                    None => {
                        if name == "member" {
                            member_depth = Some(stack.len());
                            payload_children_seen = 0;
                            pos_text = None;
                            properties = Map::new();
                        }
                    }
                }
                stack.push(Frame::new(name));
            }
            Ok(Event::Empty(_)) => {
                // self-closing: a childless element with no text, so never a
                // property, a pos, or a usable payload
                if let Some(parent) = stack.last_mut() {
                    parent.has_child_elements = true;
                }
                if let Some(md) = member_depth {
                    if stack.len() == md + 1 {
                        payload_children_seen += 1;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Ok(Event::End(_)) => {
                let Some(frame) = stack.pop() else { continue };
                let Some(md) = member_depth else { continue };

                if stack.len() == md {
                    // member closed; emit the feature if it produced a point
                    if let Some(feature) =
                        build_point_feature(pos_text.take(), std::mem::take(&mut properties))
                    {
                        collection.features.push(feature);
                    }
                    member_depth = None;
                } else if payload_children_seen == 1 && stack.len() > md + 1 {
                    // inside the payload subtree
                    if frame.name == "pos" && pos_text.is_none() {
                        pos_text = Some(frame.text.clone());
                    }
                    if stack.len() == md + 2 && !frame.has_child_elements {
                        let text = frame.text.trim();
                        if !text.is_empty() {
                            properties.insert(frame.name, Value::String(text.to_string()));
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_err(e)),
        }
    }
    Ok(collection)
}

fn build_point_feature(pos: Option<String>, properties: Map<String, Value>) -> Option<Feature> {
    let pos = pos?;
    let tokens: Vec<f64> = pos
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if tokens.len() < 2 {
        return None;
    }

    // Primary reading is request order, lon/lat. Some services answer in
    // lat/lon regardless of the requested srsName; swap when the primary
    // reading is out of geographic range. Deliberately no re-validation
    // after the swap: a pair that is out of range both ways is emitted
    // as-is (original behavior, preserved).
    let (mut lon, mut lat) = (tokens[0], tokens[1]);
    if lon.abs() > 180.0 || lat.abs() > 90.0 {
        std::mem::swap(&mut lon, &mut lat);
    }

    Some(Feature {
        r#type: "Feature".to_string(),
        geometry: Some(Geometry {
            r#type: "Point".to_string(),
            coordinates: json!([lon, lat]),
        }),
        properties: Value::Object(properties),
    })
}

/// Total hit count from a `resultType=hits` response: the `numberMatched`
/// attribute on the document root, 0 when absent or non-numeric. The
/// service-exception check runs first, same as `parse`.
pub fn parse_hits_total(xml: &str) -> Result<u64, PipelineError> {
    check_service_exception(xml)?;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"numberMatched" {
                        let value = String::from_utf8_lossy(&attr.value);
                        return Ok(value.trim().parse().unwrap_or(0));
                    }
                }
                // only the root element is consulted
                return Ok(0);
            }
            Ok(Event::Eof) => return Ok(0),
            Ok(_) => {}
            Err(e) => return Err(xml_err(e)),
        }
    }
}
