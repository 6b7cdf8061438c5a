//! Error handling and edge case testing
//!
//! Failure codes at the request boundary, model failure isolation, and
//! geometry that falls partly or wholly outside the image.

mod common;

use common::{gradient, init_logging, solid, Script, ScriptedLoader, Workspace};
use photo_ops::{
    channel::{MethodCall, MethodHandler, MethodResponse, OperationChannel},
    config::FallbackStyle,
    dispatcher::params,
    registry::ModelStatus,
    BundledAssets, Color, EditorConfig, FallbackPolicy, FixedCoordinates, ImageIOService,
    ModelKind, ModelRegistry, Operation, OperationDispatcher, OperationRequest, Result,
};
use std::sync::Arc;

const IMAGE_OPERATIONS: [Operation; 4] = [
    Operation::RemoveBackground,
    Operation::ApplyFilter,
    Operation::AddObject,
    Operation::RemoveObject,
];

#[test]
fn test_missing_image_path_is_rejected_without_side_effects() {
    init_logging();
    let ws = Workspace::new();
    ws.install_model(ModelKind::Segmentation);
    let loader = ScriptedLoader::new(Script::Echo);
    let dispatcher = ws.dispatcher(&loader, FallbackPolicy::Placeholder);

    for operation in IMAGE_OPERATIONS {
        let err = dispatcher
            .dispatch(&OperationRequest::new(operation))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT", "{operation}");
        assert_eq!(err.message(), "Image path is required.");
    }
    assert!(!ws.output_dir().exists());
    assert_eq!(loader.loads(), 0);
}

#[test]
fn test_unreadable_source_is_decode_failed() {
    let ws = Workspace::new();
    let dispatcher = ws.dispatcher(&ScriptedLoader::new(Script::Echo), FallbackPolicy::Placeholder);
    let garbage = ws.dir.path().join("garbage.png");
    std::fs::write(&garbage, b"\x89PNG but not really").unwrap();

    for path in [
        ws.dir.path().join("missing.png").to_string_lossy().into_owned(),
        garbage.to_string_lossy().into_owned(),
    ] {
        for operation in IMAGE_OPERATIONS {
            let request = OperationRequest::new(operation)
                .with_image(&path)
                .with_param(params::FILTER_TYPE, "grayscale");
            let err = dispatcher.dispatch(&request).unwrap_err();
            assert_eq!(err.code(), "DECODE_FAILED", "{operation} on {path}");
        }
    }
    assert!(ws.output_files().is_empty());
}

#[test]
fn test_malformed_parameters_are_invalid_argument() {
    let ws = Workspace::new();
    let dispatcher = ws.dispatcher(&ScriptedLoader::new(Script::Echo), FallbackPolicy::Placeholder);
    let input = ws.write_input("in.png", &gradient(8, 8));

    let cases = [
        (Operation::RemoveBackground, params::BACKGROUND_COLOR, "blue"),
        (Operation::RemoveBackground, params::BACKGROUND_COLOR, "#12345"),
        (Operation::AddObject, params::RADIUS, "-3"),
        (Operation::RemoveObject, params::WIDTH, "wide"),
        (Operation::RemoveObject, params::Y, "1.5"),
    ];
    for (operation, key, value) in cases {
        let request = OperationRequest::new(operation)
            .with_image(&input)
            .with_param(key, value);
        let err = dispatcher.dispatch(&request).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT", "{key}={value}");
    }
    assert!(ws.output_files().is_empty());
}

#[test]
fn test_unknown_operation_name() {
    let err = OperationRequest::named("sharpen").unwrap_err();
    assert_eq!(err.code(), "NOT_IMPLEMENTED");
    assert!(OperationRequest::named("removeObject").is_ok());
}

#[tokio::test]
async fn test_channel_reports_codes() {
    let ws = Workspace::new();
    let dispatcher = ws.dispatcher(&ScriptedLoader::new(Script::Echo), FallbackPolicy::Placeholder);
    let channel = OperationChannel::new(Arc::new(dispatcher));
    let input = ws.write_input("in.png", &gradient(4, 4));

    assert_eq!(
        channel.handle(MethodCall::new("sharpen")).await,
        MethodResponse::NotImplemented
    );

    let response = channel
        .handle(MethodCall::new("removeBackground").with_argument("imagePath", input))
        .await;
    match response {
        MethodResponse::Error { code, details, .. } => {
            assert_eq!(code, "MODEL_NOT_FOUND");
            assert_eq!(
                details,
                Some(serde_json::json!({ "method": "removeBackground" }))
            );
        },
        other => panic!("expected MODEL_NOT_FOUND, got {other:?}"),
    }
}

#[test]
fn test_model_failures_are_isolated() {
    let ws = Workspace::new();
    ws.install_corrupt_model(ModelKind::Segmentation);
    ws.install_model(ModelKind::StyleTransfer);
    let dispatcher = ws.dispatcher(&ScriptedLoader::new(Script::Echo), FallbackPolicy::Placeholder);
    let input = ws.write_input("in.png", &gradient(16, 16));

    let report = dispatcher.initialize_models();
    assert!(!report.all_loaded());
    assert!(matches!(report.status("segmentation"), Some(ModelStatus::Failed(_))));
    assert_eq!(report.status("styleTransfer"), Some(&ModelStatus::Loaded));
    assert_eq!(report.status("inpainting"), Some(&ModelStatus::Missing));

    let err = dispatcher
        .dispatch(&OperationRequest::new(Operation::RemoveBackground).with_image(&input))
        .unwrap_err();
    assert_eq!(err.code(), "MODEL_LOAD_FAILED");

    // Unrelated operations keep working
    for filter in ["popart", "grayscale"] {
        let request = OperationRequest::new(Operation::ApplyFilter)
            .with_image(&input)
            .with_param(params::FILTER_TYPE, filter);
        assert!(dispatcher.dispatch(&request).is_ok(), "{filter}");
    }
    let request = OperationRequest::new(Operation::RemoveObject).with_image(&input);
    assert!(dispatcher.dispatch(&request).is_ok());
}

#[test]
fn test_inference_failure_leaves_no_file() {
    let ws = Workspace::new();
    ws.install_model(ModelKind::Segmentation);
    let dispatcher = ws.dispatcher(&ScriptedLoader::new(Script::Broken), FallbackPolicy::Placeholder);
    let input = ws.write_input("in.png", &gradient(16, 16));

    let err = dispatcher
        .dispatch(&OperationRequest::new(Operation::RemoveBackground).with_image(&input))
        .unwrap_err();
    assert_eq!(err.code(), "INFERENCE_FAILED");
    assert!(ws.output_files().is_empty());
}

#[test]
fn test_unwritable_output_is_save_failed() -> Result<()> {
    let ws = Workspace::new();
    let blocker = ws.dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"file")?;
    let config = EditorConfig::builder()
        .assets_dir(ws.assets_dir())
        .output_dir(blocker.join("out"))
        .build()?;
    let registry = Arc::new(ModelRegistry::new(
        config.models.clone(),
        Box::new(BundledAssets::new(ws.assets_dir())),
        Arc::new(ScriptedLoader::new(Script::Echo)),
    ));
    let dispatcher = OperationDispatcher::new(config, registry)?;
    let input = ws.write_input("in.png", &gradient(8, 8));

    let err = dispatcher
        .dispatch(
            &OperationRequest::new(Operation::ApplyFilter)
                .with_image(&input)
                .with_param(params::FILTER_TYPE, "grayscale"),
        )
        .unwrap_err();
    assert_eq!(err.code(), "SAVE_FAILED");
    assert_eq!(std::fs::read(&blocker)?, b"file");
    Ok(())
}

#[test]
fn test_marker_outside_image_is_recovered() {
    let ws = Workspace::new();
    let image = solid(50, 50, Color::BLACK);
    let input = ws.write_input("in.png", &image);
    let dispatcher =
        ws.dispatcher(&ScriptedLoader::new(Script::Echo), FallbackPolicy::Placeholder);

    // Far outside: unchanged, with a warning
    let request = OperationRequest::new(Operation::AddObject)
        .with_image(&input)
        .with_param(params::X, "-500")
        .with_param(params::Y, "900");
    let result = dispatcher.dispatch(&request).unwrap();
    let result = result.result().unwrap();
    assert_eq!(result.metadata.warnings.len(), 1);
    assert_eq!(ImageIOService::load_image(&result.output_path).unwrap(), image);

    // Just past the edge: clamped onto the border
    let request = OperationRequest::new(Operation::AddObject)
        .with_image(&input)
        .with_param(params::X, "55")
        .with_param(params::Y, "25")
        .with_param(params::RADIUS, "10");
    let result = dispatcher.dispatch(&request).unwrap();
    let result = result.result().unwrap();
    assert_eq!(result.metadata.warnings.len(), 1);
    let output = ImageIOService::load_image(&result.output_path).unwrap();
    assert_eq!(output.pixel(49, 25), Some([255, 0, 0, 255]));
    assert_eq!(output.pixel(20, 25), Some([0, 0, 0, 255]));
}

#[test]
fn test_region_geometry_edge_cases() {
    let ws = Workspace::new();
    let image = solid(60, 40, Color::RED);
    let input = ws.write_input("in.png", &image);
    let dispatcher = ws
        .dispatcher(&ScriptedLoader::new(Script::Echo), FallbackPolicy::Placeholder)
        // left, top, width, height beyond the right and bottom edges
        .with_coordinates(FixedCoordinates::new(vec![50, 30, 100, 100]));

    let result = dispatcher
        .dispatch(&OperationRequest::new(Operation::RemoveObject).with_image(&input))
        .unwrap();
    let result = result.result().unwrap();
    assert_eq!(result.metadata.warnings.len(), 1);
    let output = ImageIOService::load_image(&result.output_path).unwrap();
    assert_eq!(output.pixel(59, 39), Some([0, 0, 0, 255]));
    assert_eq!(output.pixel(49, 29), Some([255, 0, 0, 255]));

    // Zero-area region: nothing painted
    let request = OperationRequest::new(Operation::RemoveObject)
        .with_image(&input)
        .with_param(params::X, "5")
        .with_param(params::Y, "5")
        .with_param(params::WIDTH, "0")
        .with_param(params::HEIGHT, "10");
    let result = dispatcher.dispatch(&request).unwrap();
    let result = result.result().unwrap();
    assert_eq!(result.metadata.warnings.len(), 1);
    assert_eq!(ImageIOService::load_image(&result.output_path).unwrap(), image);
}

#[test]
fn test_extreme_geometry_parameters_are_recovered() {
    let ws = Workspace::new();
    let image = solid(20, 20, Color::BLACK);
    let input = ws.write_input("in.png", &image);
    let dispatcher =
        ws.dispatcher(&ScriptedLoader::new(Script::Echo), FallbackPolicy::Placeholder);

    // A disc this large covers the whole image
    let request = OperationRequest::new(Operation::AddObject)
        .with_image(&input)
        .with_param(params::X, "5")
        .with_param(params::Y, "5")
        .with_param(params::RADIUS, "3000000000");
    let result = dispatcher.dispatch(&request).unwrap();
    let result = result.result().unwrap();
    assert_eq!(result.metadata.warnings.len(), 1);
    let output = ImageIOService::load_image(&result.output_path).unwrap();
    assert_eq!(output.pixel(0, 0), Some([255, 0, 0, 255]));
    assert_eq!(output.pixel(19, 19), Some([255, 0, 0, 255]));

    let cases = [
        (i64::MAX.to_string(), i64::MAX.to_string(), u32::MAX.to_string()),
        (i64::MIN.to_string(), i64::MIN.to_string(), u32::MAX.to_string()),
    ];
    for (x, y, side) in cases {
        let request = OperationRequest::new(Operation::RemoveObject)
            .with_image(&input)
            .with_param(params::X, &x)
            .with_param(params::Y, &y)
            .with_param(params::WIDTH, &side)
            .with_param(params::HEIGHT, &side);
        let result = dispatcher.dispatch(&request).unwrap();
        let result = result.result().unwrap();
        assert_eq!(result.metadata.warnings.len(), 1, "x={x}");
        assert_eq!(ImageIOService::load_image(&result.output_path).unwrap(), image);

        let request = OperationRequest::new(Operation::AddObject)
            .with_image(&input)
            .with_param(params::X, &x)
            .with_param(params::Y, &y)
            .with_param(params::RADIUS, &side);
        assert!(dispatcher.dispatch(&request).is_ok(), "x={x}");
    }
}

#[test]
fn test_extreme_geometry_through_inpainting() {
    let ws = Workspace::new();
    ws.install_model(ModelKind::Inpainting);
    let dispatcher = ws.dispatcher(&ScriptedLoader::new(Script::Fill(1.0)), FallbackPolicy::Strict);
    dispatcher.initialize_models();
    let input = ws.write_input("in.png", &solid(24, 16, Color::BLACK));

    let request = OperationRequest::new(Operation::AddObject)
        .with_image(&input)
        .with_param(params::X, "3")
        .with_param(params::Y, "3")
        .with_param(params::RADIUS, &u32::MAX.to_string());
    let result = dispatcher.dispatch(&request).unwrap();
    let output = ImageIOService::load_image(&result.result().unwrap().output_path).unwrap();
    assert_eq!(output.dimensions(), (24, 16));
    assert_eq!(output.pixel(23, 15), Some([255, 255, 255, 255]));

    let request = OperationRequest::new(Operation::RemoveObject)
        .with_image(&input)
        .with_param(params::X, &i64::MAX.to_string())
        .with_param(params::Y, "0");
    let result = dispatcher.dispatch(&request).unwrap();
    assert_eq!(result.result().unwrap().metadata.warnings.len(), 1);
}

#[test]
fn test_tiny_images_survive_every_operation() {
    let ws = Workspace::new();
    ws.install_model(ModelKind::Segmentation);
    ws.install_model(ModelKind::StyleTransfer);
    let dispatcher = ws.dispatcher(&ScriptedLoader::new(Script::Fill(1.0)), FallbackPolicy::Placeholder);
    let input = ws.write_input("dot.png", &solid(1, 1, Color::rgba(9, 9, 9, 255)));

    for operation in IMAGE_OPERATIONS {
        let request = OperationRequest::new(operation)
            .with_image(&input)
            .with_param(params::FILTER_TYPE, "popart");
        let result = dispatcher.dispatch(&request).unwrap();
        let output = ImageIOService::load_image(&result.result().unwrap().output_path).unwrap();
        assert_eq!(output.dimensions(), (1, 1), "{operation}");
    }
}

#[test]
fn test_invalid_configuration_rejected() {
    let style = FallbackStyle {
        region_opacity: 1.5,
        ..FallbackStyle::default()
    };
    let err = EditorConfig::builder().fallback_style(style).build().unwrap_err();
    assert_eq!(err.code(), "INVALID_CONFIG");

    let style = FallbackStyle {
        region_size: (200, 50),
        ..FallbackStyle::default()
    };
    assert!(EditorConfig::builder().fallback_style(style).build().is_err());
}
