//! Measure and patient bundle construction for the calculation engine.
//!
//! The engine takes one transaction bundle describing the measure (Measure resource plus the
//! logic Library carrying CQL and ELM) and one bundle per patient. Patient ids must be unique
//! across the batch, so each test case's Patient resources are re-identified with the test case
//! id before calculation; the engine then reports results keyed by that id.

use crate::population_code::MEASURE_POPULATION_SYSTEM;
use crate::{FhirError, FhirResult, MeasurePopulationCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

const LIBRARY_BASE_URL: &str = "http://ecqi.healthit.gov/ecqms/Library";
const LIBRARY_TYPE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/library-type";

/// Everything needed to shape a measure bundle.
#[derive(Clone, Debug)]
pub struct MeasureBundleInput<'a> {
    pub cql_library_name: &'a str,
    pub cql: &'a str,
    pub elm_json: Option<&'a str>,
    /// One entry per measure group, each listing its populations.
    pub groups: Vec<Vec<BundlePopulation<'a>>>,
}

/// A single population criterion within a measure group.
#[derive(Clone, Debug)]
pub struct BundlePopulation<'a> {
    pub code: MeasurePopulationCode,
    pub display: &'a str,
    /// Name of the CQL definition backing this population.
    pub expression: &'a str,
}

/// Build the transaction bundle describing a measure and its logic library.
pub fn build_measure_bundle(input: &MeasureBundleInput<'_>) -> Value {
    let library_url = format!("{LIBRARY_BASE_URL}/{}", input.cql_library_name);

    let groups: Vec<Value> = input
        .groups
        .iter()
        .map(|populations| {
            json!({
                "population": populations.iter().map(group_population).collect::<Vec<_>>()
            })
        })
        .collect();

    let mut content = vec![json!({
        "contentType": "text/cql",
        "data": STANDARD.encode(input.cql.as_bytes()),
    })];
    if let Some(elm) = input.elm_json {
        content.push(json!({
            "contentType": "application/elm+json",
            "data": STANDARD.encode(elm.as_bytes()),
        }));
    }

    json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": [
            {
                "resource": {
                    "resourceType": "Measure",
                    "status": "draft",
                    "library": [library_url],
                    "group": groups,
                },
                "request": { "method": "PUT", "url": format!("Measure/{}", input.cql_library_name) }
            },
            {
                "resource": {
                    "resourceType": "Library",
                    "url": library_url,
                    "status": "active",
                    "type": {
                        "coding": [{ "system": LIBRARY_TYPE_SYSTEM, "code": "logic-library" }]
                    },
                    "content": content,
                },
                "request": { "method": "PUT", "url": format!("Library/{}", input.cql_library_name) }
            }
        ]
    })
}

fn group_population(population: &BundlePopulation<'_>) -> Value {
    json!({
        "code": {
            "coding": [{
                "system": MEASURE_POPULATION_SYSTEM,
                "code": population.code.to_wire(),
                "display": population.display,
            }]
        },
        "criteria": {
            "language": "text/cql.identifier",
            "expression": population.expression,
        }
    })
}

/// Parse a test case's bundle JSON and stamp `patient_id` onto every Patient resource.
///
/// # Errors
///
/// Returns [`FhirError::InvalidJson`] when the text does not parse, or
/// [`FhirError::InvalidInput`] when it is not a JSON object or `entry` is not an array.
pub fn build_patient_bundle(bundle_json: &str, patient_id: &str) -> FhirResult<Value> {
    let mut bundle: Value = serde_json::from_str(bundle_json)?;

    let object = bundle
        .as_object_mut()
        .ok_or_else(|| FhirError::InvalidInput("patient bundle must be a JSON object".into()))?;

    let Some(entries) = object.get_mut("entry") else {
        return Ok(bundle);
    };
    let entries = entries
        .as_array_mut()
        .ok_or_else(|| FhirError::InvalidInput("patient bundle entry must be an array".into()))?;

    for resource in entries.iter_mut().filter_map(|e| e.get_mut("resource")) {
        if resource.get("resourceType").and_then(Value::as_str) == Some("Patient") {
            resource["id"] = Value::String(patient_id.to_owned());
        }
    }

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_bundle_carries_groups_and_encoded_logic() {
        let input = MeasureBundleInput {
            cql_library_name: "OfficeVisit",
            cql: "library OfficeVisit version '0.0.001'",
            elm_json: Some("{}"),
            groups: vec![vec![
                BundlePopulation {
                    code: MeasurePopulationCode::InitialPopulation,
                    display: "Initial Population",
                    expression: "ipp",
                },
                BundlePopulation {
                    code: MeasurePopulationCode::Numerator,
                    display: "Numerator",
                    expression: "num",
                },
            ]],
        };

        let bundle = build_measure_bundle(&input);
        let measure = &bundle["entry"][0]["resource"];
        assert_eq!(measure["resourceType"], "Measure");
        assert_eq!(
            measure["library"][0],
            "http://ecqi.healthit.gov/ecqms/Library/OfficeVisit"
        );
        let populations = &measure["group"][0]["population"];
        assert_eq!(populations[0]["code"]["coding"][0]["code"], "initial-population");
        assert_eq!(populations[1]["criteria"]["expression"], "num");

        let library = &bundle["entry"][1]["resource"];
        assert_eq!(
            library["content"][0]["data"],
            STANDARD.encode("library OfficeVisit version '0.0.001'")
        );
        assert_eq!(library["content"][1]["contentType"], "application/elm+json");
    }

    #[test]
    fn patient_bundle_rewrites_only_patient_ids() {
        let text = r#"{
            "resourceType": "Bundle",
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "original" } },
                { "resource": { "resourceType": "Encounter", "id": "enc-1" } }
            ]
        }"#;

        let bundle = build_patient_bundle(text, "tc-42").unwrap();
        assert_eq!(bundle["entry"][0]["resource"]["id"], "tc-42");
        assert_eq!(bundle["entry"][1]["resource"]["id"], "enc-1");
    }

    #[test]
    fn patient_bundle_without_entries_is_returned_as_is() {
        let bundle = build_patient_bundle(r#"{"resourceType":"Bundle"}"#, "tc-1").unwrap();
        assert_eq!(bundle["resourceType"], "Bundle");
    }

    #[test]
    fn patient_bundle_rejects_non_objects() {
        assert!(matches!(
            build_patient_bundle("[]", "tc-1"),
            Err(FhirError::InvalidInput(_))
        ));
        assert!(matches!(
            build_patient_bundle("not json", "tc-1"),
            Err(FhirError::InvalidJson(_))
        ));
    }
}
