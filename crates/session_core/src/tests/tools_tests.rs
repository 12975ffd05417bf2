use super::*;

#[test]
fn parses_set_parameter_with_partial_fields() {
    let request = ToolRequest::parse(
        "set-parameter",
        &json!({ "name": "radius", "value": 50.0, "vary": true }),
    )
    .expect("parse");
    assert_eq!(
        request,
        ToolRequest::SetParameter {
            name: "radius".to_string(),
            update: ParameterUpdate {
                value: Some(50.0),
                min: None,
                max: None,
                vary: Some(true),
            },
        }
    );
    assert_eq!(request.tool(), ToolName::SetParameter);
}

#[test]
fn batch_accepts_updates_as_the_mapping_name() {
    let request = ToolRequest::parse(
        "set-multiple-parameters",
        &json!({ "updates": { "radius": { "value": 50 } } }),
    )
    .expect("parse");
    let ToolRequest::SetMultipleParameters { updates } = request else {
        panic!("expected a batch request");
    };
    assert_eq!(updates["radius"], ParameterUpdate::value(50.0));
}

#[test]
fn parses_bounds_under_both_spellings_in_batches() {
    let request = ToolRequest::parse(
        "set-multiple-parameters",
        &json!({
            "parameters": {
                "radius": { "value": 40, "min": 10, "max_bound": 90 },
                "scale": { "vary": true }
            }
        }),
    )
    .expect("parse");
    let ToolRequest::SetMultipleParameters { updates } = request else {
        panic!("expected a batch request");
    };
    assert_eq!(updates.len(), 2);
    assert_eq!(updates["radius"].min, Some(10.0));
    assert_eq!(updates["radius"].max, Some(90.0));
    assert_eq!(updates["scale"], ParameterUpdate::vary(true));
}

#[test]
fn enable_polydispersity_defaults_to_gaussian_and_ten_percent() {
    let request = ToolRequest::parse("enable-polydispersity", &json!({ "parameter_name": "radius" }))
        .expect("parse");
    assert_eq!(
        request,
        ToolRequest::EnablePolydispersity {
            parameter_name: "radius".to_string(),
            distribution: Distribution::Gaussian,
            width: DEFAULT_PD_WIDTH,
        }
    );

    let request = ToolRequest::parse(
        "enable-polydispersity",
        &json!({ "parameter_name": "length", "pd_type": "Schulz", "pd_value": 0.2 }),
    )
    .expect("parse");
    assert!(matches!(
        request,
        ToolRequest::EnablePolydispersity {
            distribution: Distribution::Schulz,
            ..
        }
    ));
}

#[test]
fn unknown_tool_is_reported_with_its_own_code() {
    let err = ToolRequest::parse("delete-everything", &json!({})).expect_err("unknown tool");
    assert_eq!(err.code, ErrorCode::UnknownTool);
    assert_eq!(err.message, "Unknown tool: delete-everything");
}

#[test]
fn malformed_arguments_are_validation_errors() {
    let cases = [
        ("set-model", json!({})),
        ("set-model", json!({ "model_name": 3 })),
        ("set-parameter", json!({ "name": "radius", "value": "big" })),
        ("set-parameter", json!({ "name": "radius", "colour": "red" })),
        ("enable-polydispersity", json!({ "parameter_name": "radius", "pd_type": "cauchy" })),
        ("run-fit", json!({ "now": true })),
        ("list-sans-models", json!([1, 2])),
    ];
    for (tool, arguments) in cases {
        let err = ToolRequest::parse(tool, &arguments).expect_err(tool);
        assert_eq!(err.code, ErrorCode::Validation, "{tool}: {}", err.message);
        assert!(
            err.message.starts_with(&format!("Tool parameter error for '{tool}'")),
            "{}",
            err.message
        );
    }
}

#[test]
fn argument_free_tools_accept_null_or_empty_objects() {
    for tool in ["list-sans-models", "get-current-state", "get-fit-results", "remove-structure-factor", "run-fit"] {
        ToolRequest::parse(tool, &Value::Null).expect(tool);
        ToolRequest::parse(tool, &json!({})).expect(tool);
    }
}

#[test]
fn schemas_cover_every_tool_in_order() {
    let schemas = tool_schemas();
    let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
    let expected: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
    assert_eq!(names, expected);

    for schema in &schemas {
        assert_eq!(schema.input_schema["type"], "object", "{}", schema.name);
        assert!(!schema.description.is_empty());
    }

    let set_parameter = &schemas[5];
    assert_eq!(set_parameter.input_schema["required"], json!(["name"]));
    let pd = &schemas[7];
    assert_eq!(
        pd.input_schema["properties"]["pd_type"]["enum"],
        json!(["gaussian", "lognormal", "schulz", "rectangle", "boltzmann"])
    );
}
