//! Cache persistence: compiling with a cache directory populates it, a fresh
//! compilation restores from it, and the buffer export/import path preserves the
//! prepared model's identity.

use kitsune_runtime::{
    Compilation, DataType, Executor, Model, OperatorType, TensorDesc, TensorRole, CPU_BACKEND_ID,
};
use pretty_assertions::assert_eq;

fn float_desc(shape: &[i32]) -> TensorDesc {
    let mut desc = TensorDesc::new();
    desc.set_dtype(DataType::Float32);
    desc.set_shape(shape).unwrap();
    desc
}

fn mul_model() -> Model {
    let mut model = Model::new();
    let a = model.add_tensor(float_desc(&[2, 3])).unwrap();
    let b = model.add_tensor(float_desc(&[2, 3])).unwrap();

    let mut scalar = TensorDesc::new();
    scalar.set_dtype(DataType::Int8);
    scalar.set_shape([]).unwrap();
    let activation = model.add_tensor(scalar).unwrap();
    model.set_tensor_role(activation, TensorRole::MulActivation).unwrap();
    model.set_tensor_value(activation, &[0]).unwrap();

    let out = model.add_tensor(float_desc(&[2, 3])).unwrap();
    model
        .add_operation(OperatorType::Mul, &[activation], &[a, b], &[out])
        .unwrap();
    model.specify_inputs_and_outputs(&[a, b], &[out]).unwrap();
    model.build().unwrap();
    model
}

#[test]
fn directory_round_trip_restores_io_counts() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("mul-model");

    let mut original = Compilation::from_model(mul_model()).unwrap();
    original.set_device(CPU_BACKEND_ID).unwrap();
    original.set_cache(&cache_path, 1).unwrap();
    original.build().unwrap();

    // The build persisted a manifest and at least one blob file.
    assert!(cache_path.join("manifest").is_file());
    assert!(cache_path.join("blob_0.bin").is_file());

    // A fresh compilation with no model restores from the same directory.
    let mut restored = Compilation::for_cache();
    restored.set_device(CPU_BACKEND_ID).unwrap();
    restored.set_cache(&cache_path, 1).unwrap();
    restored.build().unwrap();

    let original_executor = Executor::new(&original).unwrap();
    let restored_executor = Executor::new(&restored).unwrap();
    assert_eq!(restored_executor.input_count(), original_executor.input_count());
    assert_eq!(restored_executor.output_count(), original_executor.output_count());
    assert_eq!(
        restored.prepared_model_id().unwrap(),
        original.prepared_model_id().unwrap()
    );
}

#[test]
fn version_mismatch_rejects_restore() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("versioned");

    let mut original = Compilation::from_model(mul_model()).unwrap();
    original.set_device(CPU_BACKEND_ID).unwrap();
    original.set_cache(&cache_path, 1).unwrap();
    original.build().unwrap();

    let mut restored = Compilation::for_cache();
    restored.set_device(CPU_BACKEND_ID).unwrap();
    restored.set_cache(&cache_path, 2).unwrap();
    assert!(restored.build().is_err());
}

#[test]
fn offline_blob_compiles_to_the_same_model() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("offline-source");

    let mut original = Compilation::from_model(mul_model()).unwrap();
    original.set_device(CPU_BACKEND_ID).unwrap();
    original.set_cache(&cache_path, 1).unwrap();
    original.build().unwrap();

    // The cpu backend's offline format is its exported cache blob.
    let mut offline = Compilation::from_offline_file(cache_path.join("blob_0.bin"));
    offline.set_device(CPU_BACKEND_ID).unwrap();
    offline.build().unwrap();

    assert_eq!(
        offline.prepared_model_id().unwrap(),
        original.prepared_model_id().unwrap()
    );
    let executor = Executor::new(&offline).unwrap();
    assert_eq!(executor.input_count(), 2);
}

#[test]
fn buffer_round_trip_preserves_model_id() {
    let mut original = Compilation::from_model(mul_model()).unwrap();
    original.set_device(CPU_BACKEND_ID).unwrap();
    original.build().unwrap();

    let bytes = original.export_cache_to_buffer().unwrap();
    assert!(!bytes.is_empty());

    let mut imported = Compilation::for_cache();
    imported.set_device(CPU_BACKEND_ID).unwrap();
    imported.import_cache_from_buffer(bytes).unwrap();
    imported.build().unwrap();

    assert_eq!(
        imported.prepared_model_id().unwrap(),
        original.prepared_model_id().unwrap()
    );

    let executor = Executor::new(&imported).unwrap();
    assert_eq!(executor.input_count(), 2);
    assert_eq!(executor.output_count(), 1);
}
