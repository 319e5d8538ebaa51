// tests/evaluator_tests.rs

use std::collections::HashMap;

use visform::binder::bind;
use visform::evaluator::{Component, EvalError, Evaluator};
use visform::form_parser::parse_form;
use visform::map_parser::parse_map;
use visform::registry::TypeRegistry;
use visform::schema::{build_entity_schemas, EntitySchema, SchemaDoc};
use visform::template::FormModel;
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

fn schemas() -> HashMap<String, EntitySchema> {
    let map = parse_map(MAP).expect("map parses");
    let doc: SchemaDoc = serde_json::from_str(SCHEMA).expect("schema parses");
    build_entity_schemas(&map, &doc).expect("schemas build")
}

/// Parse and bind a form, then install canned Patient rows on the template
/// that owns the query, the way the compiler would after fetching.
fn bound_form_with_data(form_source: &str, owner: &str) -> FormModel {
    let registry = TypeRegistry::with_builtins();
    let form = parse_form(form_source, "patients.vis", &registry).expect("form parses");
    bind(&form, &schemas(), &registry).expect("binds");

    let rows = serde_json::json!([
        {
            "patientID": 1, "name": "Alice", "ward": "North",
            "Activity": [
                { "actID": 10, "patientID": 1, "actName": "Checkup" },
                { "actID": 11, "patientID": 1, "actName": "X-ray" }
            ]
        },
        {
            "patientID": 2, "name": "Bob", "ward": "South",
            "Activity": [
                { "actID": 12, "patientID": 2, "actName": "Surgery" }
            ]
        }
    ]);
    let rows = match rows {
        serde_json::Value::Array(items) => items.iter().map(Value::from_json).collect(),
        _ => unreachable!(),
    };

    let template = form.find_template(owner).expect("owner exists");
    template
        .borrow_mut()
        .data
        .insert("Patient".to_string(), rows);
    form
}

fn evaluate(form: &FormModel) -> Component {
    let registry = TypeRegistry::with_builtins();
    let evaluator = Evaluator::new(form, &registry);
    evaluator.evaluate_tree().expect("evaluates")
}

fn property<'a>(component: &'a Component, key: &str) -> &'a Value {
    component
        .properties
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
        .unwrap_or_else(|| panic!("property {key} missing"))
}

const FORM: &str = "\
Name: Patients
--------------------------
TextBox: PatientData
Rows: Map.Patient
Text: Map.Patient.name
Top: 10 + index * 30
--------------------------
TextBox: ActivityData
Rows: Form.PatientData -< Map.Activity
Text: Map.Activity.actName
Top: Parent.Top + 20
--------------------------
";

// ============================================================================
// Row expansion
// ============================================================================

#[test]
fn test_one_component_per_row() {
    let form = bound_form_with_data(FORM, "PatientData");
    let root = evaluate(&form);

    assert_eq!(root.component_type, "Canvas");
    assert_eq!(root.name.as_deref(), Some("Patients"));
    assert_eq!(root.children.len(), 2);

    let alice = &root.children[0];
    let bob = &root.children[1];
    assert_eq!(alice.index, Some(0));
    assert_eq!(bob.index, Some(1));
    assert_eq!(*property(alice, "Text"), Value::Str("Alice".to_string()));
    assert_eq!(*property(bob, "Text"), Value::Str("Bob".to_string()));
}

#[test]
fn test_nested_rows_follow_the_parent_row() {
    let form = bound_form_with_data(FORM, "PatientData");
    let root = evaluate(&form);

    let alice = &root.children[0];
    assert_eq!(alice.children.len(), 2);
    assert_eq!(
        *property(&alice.children[0], "Text"),
        Value::Str("Checkup".to_string())
    );
    assert_eq!(
        *property(&alice.children[1], "Text"),
        Value::Str("X-ray".to_string())
    );

    let bob = &root.children[1];
    assert_eq!(bob.children.len(), 1);
    assert_eq!(
        *property(&bob.children[0], "Text"),
        Value::Str("Surgery".to_string())
    );
}

#[test]
fn test_index_drives_arithmetic() {
    let form = bound_form_with_data(FORM, "PatientData");
    let root = evaluate(&form);

    assert_eq!(*property(&root.children[0], "Top"), Value::Num(10.0));
    assert_eq!(*property(&root.children[1], "Top"), Value::Num(40.0));
}

#[test]
fn test_parent_reads_see_the_current_row() {
    let form = bound_form_with_data(FORM, "PatientData");
    let root = evaluate(&form);

    // Parent.Top + 20, with the parent's Top being 10 and 40
    assert_eq!(
        *property(&root.children[0].children[0], "Top"),
        Value::Num(30.0)
    );
    assert_eq!(
        *property(&root.children[1].children[0], "Top"),
        Value::Num(60.0)
    );
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_plus_concatenates_mixed_operands() {
    let form = bound_form_with_data(
        "TextBox: A\nRows: Map.Patient\n\
         Text: Map.Patient.name + \" (\" + index + \")\"\n----\n",
        "A",
    );
    let root = evaluate(&form);
    assert_eq!(
        *property(&root.children[0], "Text"),
        Value::Str("Alice (0)".to_string())
    );
}

#[test]
fn test_non_numeric_arithmetic_is_an_error() {
    let registry = TypeRegistry::with_builtins();
    let form = bound_form_with_data(
        "TextBox: A\nRows: Map.Patient\nText: Map.Patient.name * 2\n----\n",
        "A",
    );
    let evaluator = Evaluator::new(&form, &registry);
    assert!(matches!(
        evaluator.evaluate_tree(),
        Err(EvalError::NonNumericOperand { .. })
    ));
}

#[test]
fn test_subscript_addresses_an_explicit_row() {
    let form = bound_form_with_data(
        "TextBox: A\nRows: Map.Patient\nText: Map.Patient[0].name\n----\n",
        "A",
    );
    let root = evaluate(&form);
    // both rows read row 0
    assert_eq!(
        *property(&root.children[1], "Text"),
        Value::Str("Alice".to_string())
    );
}

#[test]
fn test_subscript_out_of_range() {
    let registry = TypeRegistry::with_builtins();
    let form = bound_form_with_data(
        "TextBox: A\nRows: Map.Patient\nText: Map.Patient[5].name\n----\n",
        "A",
    );
    let evaluator = Evaluator::new(&form, &registry);
    assert!(matches!(
        evaluator.evaluate_tree(),
        Err(EvalError::RowIndexOutOfRange { index: 5, len: 2 })
    ));
}

// ============================================================================
// Property cache
// ============================================================================

#[test]
fn test_form_reads_hit_the_property_cache() {
    let registry = TypeRegistry::with_builtins();
    let form = parse_form(
        "Name: X\n----\n\
         TextBox: A\nText: \"a\" + \"b\"\n----\n\
         TextBox: B\nText: Form.A.Text\n----\n\
         TextBox: C\nText: Form.A.Text\n----\n",
        "x.vis",
        &registry,
    )
    .unwrap();
    bind(&form, &HashMap::new(), &registry).unwrap();

    let evaluator = Evaluator::new(&form, &registry);
    let root = evaluator.evaluate_tree().unwrap();

    // root Width + Height, A.Text once; B and C read the cache
    assert_eq!(evaluator.formula_evaluations(), 5);
    for child in &root.children {
        assert_eq!(*property(child, "Text"), Value::Str("ab".to_string()));
    }
}

// ============================================================================
// Errors and defaults
// ============================================================================

#[test]
fn test_index_outside_a_bound_template() {
    let registry = TypeRegistry::with_builtins();
    let form = parse_form("TextBox: A\nTop: index\n----\n", "x.vis", &registry).unwrap();
    bind(&form, &HashMap::new(), &registry).unwrap();
    let evaluator = Evaluator::new(&form, &registry);
    assert!(matches!(
        evaluator.evaluate_tree(),
        Err(EvalError::NoRowContext { .. })
    ));
}

#[test]
fn test_property_values_are_validated() {
    let registry = TypeRegistry::with_builtins();
    let form = parse_form(
        "TextBox: A\nColor: \"notacolor\"\n----\n",
        "x.vis",
        &registry,
    )
    .unwrap();
    bind(&form, &HashMap::new(), &registry).unwrap();
    let evaluator = Evaluator::new(&form, &registry);
    assert!(matches!(
        evaluator.evaluate_tree(),
        Err(EvalError::InvalidValue(_))
    ));
}

#[test]
fn test_color_names_evaluate_as_text() {
    let registry = TypeRegistry::with_builtins();
    let form = parse_form("TextBox: A\nColor: Crimson\n----\n", "x.vis", &registry).unwrap();
    bind(&form, &HashMap::new(), &registry).unwrap();
    let evaluator = Evaluator::new(&form, &registry);
    let root = evaluator.evaluate_tree().unwrap();
    assert_eq!(
        *property(&root.children[0], "Color"),
        Value::Str("Crimson".to_string())
    );
}
