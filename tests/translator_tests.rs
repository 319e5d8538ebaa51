// tests/translator_tests.rs

use visform::query::{Cardinality, CompareOp, Filter, Query};
use visform::schema::{ForeignKey, KeyReference};
use visform::translator::{translate, TranslateError};
use visform::value::Value;

fn patient_query() -> Query {
    Query {
        name: "Patient".to_string(),
        cardinality: Cardinality::Many,
        primary_key: vec!["patientID".to_string()],
        foreign_keys: Vec::new(),
        properties: vec!["name".to_string()],
        filter: None,
        expand: None,
    }
}

fn activity_query(cardinality: Cardinality) -> Query {
    Query {
        name: "Activity".to_string(),
        cardinality,
        primary_key: vec!["actID".to_string()],
        foreign_keys: vec![ForeignKey {
            fields: vec!["patientID".to_string()],
            reference: KeyReference {
                resource: "Patient".to_string(),
                fields: vec!["patientID".to_string()],
            },
        }],
        properties: vec!["actName".to_string()],
        filter: None,
        expand: None,
    }
}

// ============================================================================
// Select lists
// ============================================================================

#[test]
fn test_flat_select() {
    let sql = translate(&patient_query()).unwrap();
    assert_eq!(sql, "SELECT Patient.name, Patient.patientID FROM Patient");
}

#[test]
fn test_primary_key_is_not_selected_twice() {
    let mut query = patient_query();
    query.properties = vec!["patientID".to_string(), "name".to_string()];
    let sql = translate(&query).unwrap();
    assert_eq!(sql, "SELECT Patient.patientID, Patient.name FROM Patient");
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_where_clause() {
    let mut query = patient_query();
    query.filter = Some(Filter {
        resource: "Patient".to_string(),
        field: "ward".to_string(),
        op: CompareOp::Eq,
        value: Value::Str("North".to_string()),
    });
    let sql = translate(&query).unwrap();
    assert!(sql.ends_with("FROM Patient WHERE Patient.ward = 'North'"));
}

#[test]
fn test_string_literals_are_escaped() {
    let mut query = patient_query();
    query.filter = Some(Filter {
        resource: "Patient".to_string(),
        field: "name".to_string(),
        op: CompareOp::Eq,
        value: Value::Str("O'Brien".to_string()),
    });
    let sql = translate(&query).unwrap();
    assert!(sql.contains("Patient.name = 'O''Brien'"));
}

#[test]
fn test_numeric_filters_print_bare() {
    let mut query = patient_query();
    query.filter = Some(Filter {
        resource: "Patient".to_string(),
        field: "patientID".to_string(),
        op: CompareOp::Gt,
        value: Value::Num(12.0),
    });
    let sql = translate(&query).unwrap();
    assert!(sql.contains("Patient.patientID > 12"));
}

// ============================================================================
// Expanded record sets
// ============================================================================

#[test]
fn test_many_expand_aggregates_json() {
    let mut query = patient_query();
    query.expand = Some(Box::new(activity_query(Cardinality::Many)));
    let sql = translate(&query).unwrap();

    assert_eq!(
        sql,
        "SELECT Patient.name, Patient.patientID, Activity.fields AS \"Activity\" \
         FROM Patient \
         LEFT JOIN (SELECT Activity.patientID, \
         json_agg(json_build_object('actName', Activity.actName, 'actID', Activity.actID)) \
         AS fields FROM Activity GROUP BY Activity.patientID) AS Activity \
         ON Patient.patientID = Activity.patientID"
    );
}

#[test]
fn test_one_expand_builds_a_single_object() {
    let mut query = activity_query(Cardinality::Many);
    query.foreign_keys = Vec::new();
    let mut patient = patient_query();
    patient.cardinality = Cardinality::One;
    patient.foreign_keys = vec![ForeignKey {
        fields: vec!["patientID".to_string()],
        reference: KeyReference {
            resource: "Activity".to_string(),
            fields: vec!["patientID".to_string()],
        },
    }];
    query.expand = Some(Box::new(patient));

    let sql = translate(&query).unwrap();
    assert!(sql.contains("json_build_object('name', Patient.name"));
    assert!(!sql.contains("json_agg"));
    assert!(!sql.contains("GROUP BY Patient"));
}

#[test]
fn test_child_filter_lands_in_the_subselect() {
    let mut child = activity_query(Cardinality::Many);
    child.filter = Some(Filter {
        resource: "Activity".to_string(),
        field: "actName".to_string(),
        op: CompareOp::Eq,
        value: Value::Str("Checkup".to_string()),
    });
    let mut query = patient_query();
    query.expand = Some(Box::new(child));

    let sql = translate(&query).unwrap();
    assert!(sql.contains(
        "FROM Activity WHERE Activity.actName = 'Checkup' GROUP BY Activity.patientID"
    ));
}

#[test]
fn test_join_follows_the_parents_foreign_key_too() {
    // the fk sits on the parent, pointing at the child
    let mut parent = patient_query();
    parent.foreign_keys = vec![ForeignKey {
        fields: vec!["patientID".to_string()],
        reference: KeyReference {
            resource: "Activity".to_string(),
            fields: vec!["patientID".to_string()],
        },
    }];
    let mut child = activity_query(Cardinality::Many);
    child.foreign_keys = Vec::new();
    parent.expand = Some(Box::new(child));

    let sql = translate(&parent).unwrap();
    assert!(sql.contains("ON Patient.patientID = Activity.patientID"));
}

#[test]
fn test_missing_relation_is_an_error() {
    let mut query = patient_query();
    let mut child = activity_query(Cardinality::Many);
    child.foreign_keys = Vec::new();
    query.expand = Some(Box::new(child));

    assert!(matches!(
        translate(&query),
        Err(TranslateError::MissingRelation { .. })
    ));
}

#[test]
fn test_two_level_expand_nests_subselects() {
    let mut ward = Query {
        name: "Ward".to_string(),
        cardinality: Cardinality::One,
        primary_key: vec!["wardID".to_string()],
        foreign_keys: vec![ForeignKey {
            fields: vec!["wardID".to_string()],
            reference: KeyReference {
                resource: "Activity".to_string(),
                fields: vec!["wardID".to_string()],
            },
        }],
        properties: vec!["wardName".to_string()],
        filter: None,
        expand: None,
    };
    ward.properties.push("wardID".to_string());

    let mut activity = activity_query(Cardinality::Many);
    activity.expand = Some(Box::new(ward));
    let mut query = patient_query();
    query.expand = Some(Box::new(activity));

    let sql = translate(&query).unwrap();
    assert!(sql.contains("'Ward', Ward.fields"));
    assert!(sql.matches("LEFT JOIN").count() == 2);
}
