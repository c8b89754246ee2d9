use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use shapeflow_core::geometry::host_values;
use shapeflow_core::kernel::{
    AnisotropyConfig, GaussianKernelConfig, InterpolatorKernel, Kernel, KernelInterpolator,
    KernelInterpolatorConfig,
};

type B = NdArray<f32>;

fn cloud(device: &<B as burn::tensor::backend::Backend>::Device) -> Tensor<B, 3> {
    Tensor::from_data(
        TensorData::from([[
            [0.0, 0.0],
            [0.1, 0.05],
            [0.2, 0.0],
            [0.3, 0.1],
            [0.05, 0.3],
            [0.25, 0.25],
        ]]),
        device,
    )
}

#[test]
fn test_unnormalized_constant_field_is_scaled_by_kernel_mass() {
    let device = Default::default();
    let points = cloud(&device);
    let kernel = GaussianKernelConfig::new()
        .with_sigmas(vec![0.1, 0.3])
        .with_weights(Some(vec![0.4, 0.6]))
        .init()
        .unwrap();
    let interp: KernelInterpolator<B> = KernelInterpolatorConfig::new()
        .with_kernel(InterpolatorKernel::Gaussian(
            GaussianKernelConfig::new()
                .with_sigmas(vec![0.1, 0.3])
                .with_weights(Some(vec![0.4, 0.6])),
        ))
        .init()
        .unwrap();

    let value = 2.5;
    let values = Tensor::<B, 3>::ones([1, 6, 1], &device).mul_scalar(value);
    let out = interp.convolve(points.clone(), points.clone(), values).unwrap();

    let mass = Kernel::<B>::matrix(&kernel, points.clone(), points).sum_dim(2);
    let out = host_values(&out).unwrap();
    let mass = host_values(&mass).unwrap();
    for (o, m) in out.iter().zip(&mass) {
        assert!((o - value * m).abs() < 1e-5, "got {}, expected {}", o, value * m);
    }
}

#[test]
fn test_nadaraya_watson_reproduces_constant() {
    let device = Default::default();
    let points = cloud(&device);
    let values = Tensor::<B, 3>::from_data(TensorData::from([[[1.5, -0.5]; 6]]), &device);

    for sigma in [0.01, 0.1, 1.0, 10.0] {
        let interp = KernelInterpolator::<B>::gaussian(sigma).unwrap().with_normalized(true);
        let out = interp.convolve(points.clone(), points.clone(), values.clone()).unwrap();
        let out = host_values(&out).unwrap();
        for pair in out.chunks(2) {
            assert!((pair[0] - 1.5).abs() < 1e-4, "sigma {}: {:?}", sigma, pair);
            assert!((pair[1] + 0.5).abs() < 1e-4, "sigma {}: {:?}", sigma, pair);
        }
    }
}

#[test]
fn test_anisotropic_nadaraya_watson_reproduces_constant() {
    let device = Default::default();
    let points = cloud(&device);
    let interp: KernelInterpolator<B> = KernelInterpolatorConfig::new()
        .with_kernel(InterpolatorKernel::Anisotropic(
            AnisotropyConfig::new()
                .with_cov_sigma_scale(0.2)
                .with_aniso_kernel_scale(0.2),
        ))
        .with_normalized(true)
        .init()
        .unwrap();
    let values = Tensor::<B, 3>::ones([1, 6, 3], &device).mul_scalar(0.7);
    let out = interp.convolve(points.clone(), points, values).unwrap();
    let out = host_values(&out).unwrap();
    assert!(out.iter().all(|v| (v - 0.7).abs() < 1e-4));
}
