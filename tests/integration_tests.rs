// tests/integration_tests.rs

use visform::compiler::{Compiler, Error};
use visform::output::component_to_json;
use visform::provider::{Request, Resource, ResourceProvider, TransportError};
use visform::value::Value;

const MAP: &str = "\
StartUpForm: patients.vis
--------------------------
Database: pgsql
Source: \"schema.json\"
--------------------------
Table: Patient
Activity: many, join Activity on Patient.patientID = Activity.patientID
--------------------------
";

const FORM: &str = "\
Name: Patients
Width: 800
--------------------------
TextBox: PatientData
Rows: Map.Patient WHERE Map.Patient.ward = \"North\"
Text: Map.Patient.name
Top: 10 + index * 30
--------------------------
TextBox: ActivityData
Rows: Form.PatientData -< Map.Activity
Text: Map.Activity.actName
Top: Parent.Top + 20
--------------------------
TextBox: Title
Text: \"Ward North\"
--------------------------
";

const SCHEMA: &str = r#"{
    "resources": [{ "name": "Patient" }, { "name": "Activity" }],
    "schemas": {
        "Patient": {
            "fields": [
                { "name": "patientID", "type": "integer" },
                { "name": "name", "type": "string" },
                { "name": "ward", "type": "string" }
            ],
            "primaryKey": ["patientID"]
        },
        "Activity": {
            "fields": [
                { "name": "actID", "type": "integer" },
                { "name": "patientID", "type": "integer" },
                { "name": "actName", "type": "string" }
            ],
            "primaryKey": ["actID"]
        }
    }
}"#;

/// Answers every request from canned text, the way a database adapter
/// would after executing the translated statement.
struct MemoryProvider {
    reject_queries: bool,
}

impl MemoryProvider {
    fn new() -> Self {
        MemoryProvider {
            reject_queries: false,
        }
    }
}

impl ResourceProvider for MemoryProvider {
    fn fetch(&self, request: Request<'_>) -> Result<Resource, TransportError> {
        match request {
            Request::MapFile { name: "ward.map" } => Ok(Resource::Text(MAP.to_string())),
            Request::FormFile {
                name: "patients.vis",
            } => Ok(Resource::Text(FORM.to_string())),
            Request::DataSchema {
                source: "schema.json",
            } => Ok(Resource::Text(SCHEMA.to_string())),
            Request::Query { relation, sql, .. } => {
                if self.reject_queries {
                    return Err(TransportError::Rejected {
                        reason: "no connection".to_string(),
                    });
                }
                assert_eq!(relation, "Patient");
                assert!(sql.contains("WHERE Patient.ward = 'North'"), "{sql}");
                let rows = serde_json::json!([
                    {
                        "patientID": 1, "name": "Alice", "ward": "North",
                        "Activity": [
                            { "actID": 10, "patientID": 1, "actName": "Checkup" },
                            { "actID": 11, "patientID": 1, "actName": "X-ray" }
                        ]
                    },
                    {
                        "patientID": 2, "name": "Bob", "ward": "North",
                        "Activity": []
                    }
                ]);
                match rows {
                    serde_json::Value::Array(rows) => Ok(Resource::Rows(rows)),
                    _ => unreachable!(),
                }
            }
            other => Err(TransportError::Rejected {
                reason: format!("unexpected request {other:?}"),
            }),
        }
    }
}

fn property<'a>(
    component: &'a visform::evaluator::Component,
    key: &str,
) -> &'a Value {
    component
        .properties
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
        .unwrap_or_else(|| panic!("property {key} missing"))
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_run_builds_the_whole_component_tree() {
    let compiler = Compiler::new(MemoryProvider::new());
    let root = compiler.run("ward.map").unwrap();

    assert_eq!(root.component_type, "Canvas");
    assert_eq!(root.name.as_deref(), Some("Patients"));
    assert_eq!(*property(&root, "Width"), Value::Num(800.0));
    // two patient rows plus the unbound title
    assert_eq!(root.children.len(), 3);

    let alice = &root.children[0];
    assert_eq!(*property(alice, "Text"), Value::Str("Alice".to_string()));
    assert_eq!(*property(alice, "Top"), Value::Num(10.0));
    assert_eq!(alice.children.len(), 2);
    assert_eq!(
        *property(&alice.children[1], "Text"),
        Value::Str("X-ray".to_string())
    );
    assert_eq!(*property(&alice.children[0], "Top"), Value::Num(30.0));

    let bob = &root.children[1];
    assert_eq!(*property(bob, "Text"), Value::Str("Bob".to_string()));
    assert!(bob.children.is_empty());

    let title = &root.children[2];
    assert_eq!(title.name.as_deref(), Some("Title"));
    assert_eq!(title.index, None);
    assert_eq!(
        *property(title, "Text"),
        Value::Str("Ward North".to_string())
    );
}

#[test]
fn test_statements_cover_every_bound_template() {
    let compiler = Compiler::new(MemoryProvider::new());
    let compilation = compiler.bind_form("ward.map").unwrap();
    let statements = compiler.statements(&compilation).unwrap();

    // ActivityData rides on PatientData's query, Title has none
    assert_eq!(statements.len(), 1);
    let (template, sql) = &statements[0];
    assert_eq!(template, "PatientData");
    assert!(sql.starts_with("SELECT Patient."));
    assert!(sql.contains("LEFT JOIN"));
    assert!(sql.contains("json_agg"));
}

#[test]
fn test_transport_errors_surface() {
    let provider = MemoryProvider {
        reject_queries: true,
    };
    let compiler = Compiler::new(provider);
    match compiler.run("ward.map") {
        Err(Error::Transport(TransportError::Rejected { reason })) => {
            assert_eq!(reason, "no connection");
        }
        other => panic!("expected a rejected transport, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_map_is_a_transport_error() {
    let compiler = Compiler::new(MemoryProvider::new());
    assert!(matches!(
        compiler.run("nope.map"),
        Err(Error::Transport(TransportError::Rejected { .. }))
    ));
}

// ============================================================================
// Serialized output
// ============================================================================

#[test]
fn test_component_tree_serializes() {
    let compiler = Compiler::new(MemoryProvider::new());
    let root = compiler.run("ward.map").unwrap();
    let json = component_to_json(&root);

    assert!(json.starts_with("{\"type\":\"Canvas\",\"name\":\"Patients\""));
    assert!(json.contains("\"Text\":\"Alice\""));
    assert!(json.contains("\"index\":1"));

    // the output is valid JSON
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["children"][0]["properties"]["Text"], "Alice");
}
