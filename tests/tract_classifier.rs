use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use ndarray::Array4;
use prost::Message;
use serde_json::Value;
use tract_onnx::pb::attribute_proto::AttributeType;
use tract_onnx::pb::tensor_proto::DataType;
use tract_onnx::pb::tensor_shape_proto::{dimension, Dimension};
use tract_onnx::pb::type_proto;
use tract_onnx::pb::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto,
};

use image_classifier::classifier::Layout;
use image_classifier::{configure, AppState, Classifier, LabelSource, ModelManifest, TractClassifier};

const SIZE: i64 = 4;

fn float_tensor(name: &str, dims: &[Option<i64>]) -> ValueInfoProto {
    let dim = dims
        .iter()
        .map(|d| Dimension {
            value: Some(match d {
                Some(n) => dimension::Value::DimValue(*n),
                None => dimension::Value::DimParam("unk__0".to_string()),
            }),
            ..Default::default()
        })
        .collect();
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: DataType::Float as i32,
                shape: Some(TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn ints(name: &str, values: &[i64]) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Ints as i32,
        ints: values.to_vec(),
        ..Default::default()
    }
}

fn int(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

/// A Keras-style export: optional `rescaling/mul` by 1/255, then a per-channel
/// mean. Input and output both carry a symbolic batch dimension.
fn write_model(dir: &Path, layout: Layout, rescaling: bool) -> PathBuf {
    let (input_dims, axes) = match layout {
        Layout::Nhwc => (vec![None, Some(SIZE), Some(SIZE), Some(3)], vec![1, 2]),
        Layout::Nchw => (vec![None, Some(3), Some(SIZE), Some(SIZE)], vec![2, 3]),
    };

    let mut node = Vec::new();
    let mut initializer = Vec::new();
    let mut pooled_input = "input_1".to_string();
    if rescaling {
        initializer.push(TensorProto {
            name: "scale".to_string(),
            data_type: DataType::Float as i32,
            float_data: vec![1.0 / 255.0],
            ..Default::default()
        });
        node.push(NodeProto {
            name: "StatefulPartitionedCall/sequential/rescaling/mul".to_string(),
            op_type: "Mul".to_string(),
            input: vec!["input_1".to_string(), "scale".to_string()],
            output: vec!["rescaled".to_string()],
            ..Default::default()
        });
        pooled_input = "rescaled".to_string();
    }
    node.push(NodeProto {
        name: "StatefulPartitionedCall/sequential/global_average_pooling2d/Mean".to_string(),
        op_type: "ReduceMean".to_string(),
        input: vec![pooled_input],
        output: vec!["dense".to_string()],
        attribute: vec![ints("axes", &axes), int("keepdims", 0)],
        ..Default::default()
    });

    let model = ModelProto {
        ir_version: 7,
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: 13,
        }],
        graph: Some(GraphProto {
            name: "sequential".to_string(),
            node,
            initializer,
            input: vec![float_tensor("input_1", &input_dims)],
            output: vec![float_tensor("dense", &[None, Some(3)])],
            ..Default::default()
        }),
        ..Default::default()
    };

    let path = dir.join("model.onnx");
    fs::write(&path, model.encode_to_vec()).unwrap();
    path
}

fn manifest(layout: Layout) -> ModelManifest {
    ModelManifest {
        input_size: (SIZE as u32, SIZE as u32),
        layout,
        rescales_input: None,
    }
}

/// NHWC batch whose channels are constant at `rgb`.
fn uniform_batch(rgb: [f32; 3]) -> Array4<f32> {
    let size = SIZE as usize;
    Array4::from_shape_fn((1, size, size, 3), |(_, _, _, c)| rgb[c])
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-5, "{:?} != {:?}", actual, expected);
    }
}

#[::core::prelude::v1::test]
fn loads_export_with_symbolic_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), Layout::Nhwc, true);

    let classifier = TractClassifier::load(&path, manifest(Layout::Nhwc)).unwrap();
    assert_eq!(classifier.output_width(), Some(3));
    assert_eq!(classifier.input_size(), (4, 4));
}

#[::core::prelude::v1::test]
fn detects_rescaling_layer_after_import() {
    let dir = tempfile::tempdir().unwrap();

    let path = write_model(dir.path(), Layout::Nhwc, true);
    let classifier = TractClassifier::load(&path, manifest(Layout::Nhwc)).unwrap();
    assert!(classifier.rescales_input());

    let path = write_model(dir.path(), Layout::Nhwc, false);
    let classifier = TractClassifier::load(&path, manifest(Layout::Nhwc)).unwrap();
    assert!(!classifier.rescales_input());
}

#[::core::prelude::v1::test]
fn manifest_declaration_overrides_graph_inspection() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), Layout::Nhwc, true);
    let declared = ModelManifest {
        rescales_input: Some(false),
        ..manifest(Layout::Nhwc)
    };
    let classifier = TractClassifier::load(&path, declared).unwrap();
    assert!(!classifier.rescales_input());
}

#[::core::prelude::v1::test]
fn predicts_channel_means_nhwc() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), Layout::Nhwc, true);
    let classifier = TractClassifier::load(&path, manifest(Layout::Nhwc)).unwrap();

    let output = classifier.predict(uniform_batch([255.0, 0.0, 51.0])).unwrap();
    assert_eq!(output.shape(), &[1, 3]);
    assert_close(output.as_slice().unwrap(), &[1.0, 0.0, 0.2]);
}

#[::core::prelude::v1::test]
fn nchw_models_receive_channel_first_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), Layout::Nchw, false);
    let classifier = TractClassifier::load(&path, manifest(Layout::Nchw)).unwrap();

    let output = classifier.predict(uniform_batch([0.1, 0.5, 0.9])).unwrap();
    assert_eq!(output.shape(), &[1, 3]);
    assert_close(output.as_slice().unwrap(), &[0.1, 0.5, 0.9]);
}

#[actix_rt::test]
async fn rescaling_model_is_served_unscaled_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), Layout::Nhwc, true);
    let classifier = TractClassifier::load(&path, manifest(Layout::Nhwc)).unwrap();
    fs::write(dir.path().join("class_names.json"), r#"["red", "green", "blue"]"#).unwrap();

    let state = AppState::new(
        Arc::new(classifier),
        LabelSource::new(dir.path().join("class_names.json")),
        1 << 20,
    );
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure),
    )
    .await;

    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 100, 50])));
    let mut png = std::io::Cursor::new(Vec::new());
    img.write_to(&mut png, ImageOutputFormat::Png).unwrap();

    let mut body = Vec::new();
    body.extend_from_slice(b"--b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan.png\"\r\n");
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(png.get_ref());
    body.extend_from_slice(b"\r\n--b--\r\n");

    let req = test::TestRequest::post()
        .uri("/predict")
        .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=b"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Divided by 255 exactly once, inside the model.
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["prediction"], "red");
    assert_eq!(json["all_probabilities"]["red"], 0.784314);
    assert_eq!(json["all_probabilities"]["green"], 0.392157);
    assert_eq!(json["all_probabilities"]["blue"], 0.196078);
}
