use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use proptest::prelude::*;
use shapeflow_core::geometry::host_values;
use shapeflow_core::sampler::ShapeSampler;
use shapeflow_core::shape::{create_shape_pair, PairRecord, Shape, ShapeRecord};

type B = NdArray<f32>;

fn points_strategy() -> impl Strategy<Value = (usize, usize, usize, Vec<f32>)> {
    (1usize..3, 1usize..20, 2usize..4).prop_flat_map(|(b, n, d)| {
        proptest::collection::vec(-10.0f32..10.0, b * n * d).prop_map(move |v| (b, n, d, v))
    })
}

proptest! {
    #[test]
    fn prop_default_weights_match_points((b, n, d, values) in points_strategy()) {
        let device = Default::default();
        let points = Tensor::<B, 3>::from_data(TensorData::new(values, [b, n, d]), &device);
        let shape = Shape::new(points).unwrap();

        let [wb, wn, _] = shape.weights().dims();
        prop_assert_eq!((wb, wn), (b, n));
        let totals = host_values(&shape.weights().clone().sum_dim(1)).unwrap();
        for total in totals {
            prop_assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn prop_pointfea_must_match_points((b, n, d, values) in points_strategy(), fea in 1usize..5) {
        let device = Default::default();
        let points = Tensor::<B, 3>::from_data(TensorData::new(values, [b, n, d]), &device);
        let good = Tensor::<B, 3>::zeros([b, n, fea], &device);
        let bad = Tensor::<B, 3>::zeros([b, n + 1, fea], &device);

        let shape = Shape::set_data(points.clone(), None, Some(good)).unwrap();
        let [fb, fn_, _] = shape.pointfea().unwrap().dims();
        prop_assert_eq!((fb, fn_), (b, n));
        prop_assert!(Shape::set_data(points, None, Some(bad)).is_err());
    }

    #[test]
    fn prop_grid_sampler_preserves_mass((_, n, d, values) in points_strategy(), spacing in 0.5f64..5.0) {
        let device = Default::default();
        let first = values[..n * d].to_vec();
        let points = Tensor::<B, 3>::from_data(TensorData::new(first, [1, n, d]), &device);
        let shape = Shape::new(points).unwrap();
        let (cp, cw) = ShapeSampler::PointGrid { spacing }.sample(&shape).unwrap();

        prop_assert!(cp.dims()[1] <= n);
        let mass = host_values(&cw.sum()).unwrap()[0];
        prop_assert!((mass - 1.0).abs() < 1e-4);
    }
}

#[test]
fn test_pair_record_round_trip_through_pair() {
    let device = Default::default();
    let square = ShapeRecord::from_points([1, 4, 2], vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
    let mut shifted = square.clone();
    shifted.points.iter_mut().for_each(|v| *v += 0.5);
    let record = PairRecord {
        source: square,
        target: shifted,
        toflow: None,
    };

    let pair = create_shape_pair::<B>(&record, &device).unwrap();
    assert!(pair.dense_mode());
    let target = host_values(pair.target().points()).unwrap();
    assert_eq!(target[0], 0.5);
}

#[test]
fn test_sparse_control_points_leave_dense_mode() {
    let device = Default::default();
    let values: Vec<f32> = (0..40).map(|i| i as f32 * 0.1).collect();
    let points = Tensor::<B, 3>::from_data(TensorData::new(values, [1, 20, 2]), &device);
    let source = Shape::new(points.clone()).unwrap();
    let target = Shape::new(points).unwrap();
    let mut pair = shapeflow_core::ShapePair::new(source, target).unwrap();

    let (cp, cw) = ShapeSampler::Uniform { num_points: 5, seed: 3 }
        .sample(pair.source())
        .unwrap();
    pair.set_control_points(cp, Some(cw)).unwrap();
    assert!(!pair.dense_mode());
    assert_eq!(pair.control_points().dims(), [1, 5, 2]);
    assert!(pair.reg_param().is_none());
}
