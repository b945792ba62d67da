//! Random tensor construction.
//!
//! Every sampler has a `*_with_rng` variant taking an explicit RNG, which is
//! what seeded code and tests use.

use rand::Rng;
use rand::distr::StandardUniform;
use rand_distr::StandardNormal;

use crate::dtype::DType;
use crate::tensor::Tensor;

impl Tensor {
    /// Create a tensor with uniform random values in [0, 1).
    ///
    /// # Example
    ///
    /// ```
    /// use gradtape::Tensor;
    ///
    /// let t = Tensor::random(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert!(t.data().iter().all(|&v| (0.0..1.0).contains(&v)));
    /// ```
    pub fn random(shape: &[usize]) -> Self {
        Self::random_with_rng(shape, &mut rand::rng())
    }

    /// Create a tensor with uniform random values using a specific RNG.
    ///
    /// # Example
    ///
    /// ```
    /// use gradtape::Tensor;
    /// use rand::SeedableRng;
    /// use rand::rngs::StdRng;
    ///
    /// let mut rng = StdRng::seed_from_u64(42);
    /// let t1 = Tensor::random_with_rng(&[2, 3], &mut rng);
    ///
    /// let mut rng = StdRng::seed_from_u64(42);
    /// let t2 = Tensor::random_with_rng(&[2, 3], &mut rng);
    ///
    /// assert_eq!(t1.data(), t2.data());
    /// ```
    pub fn random_with_rng<R: Rng>(shape: &[usize], rng: &mut R) -> Self {
        Self::uniform_with_rng(shape, 0.0, 1.0, rng)
    }

    /// Uniform values in `[low, high)`.
    pub fn uniform_with_rng<R: Rng>(shape: &[usize], low: f64, high: f64, rng: &mut R) -> Self {
        let len: usize = shape.iter().product();
        let data = (0..len)
            .map(|_| {
                let u: f64 = rng.sample(StandardUniform);
                low + (high - low) * u
            })
            .collect();
        Self::from_raw(data, shape, DType::Float64)
    }

    /// Create a tensor with standard normal random values.
    pub fn randn(shape: &[usize]) -> Self {
        Self::randn_with_rng(shape, &mut rand::rng())
    }

    /// Create a tensor with standard normal random values using a specific RNG.
    pub fn randn_with_rng<R: Rng>(shape: &[usize], rng: &mut R) -> Self {
        Self::normal_with_rng(shape, 0.0, 1.0, rng)
    }

    /// Normal values with the given mean and standard deviation.
    pub fn normal_with_rng<R: Rng>(shape: &[usize], mean: f64, stddev: f64, rng: &mut R) -> Self {
        let len: usize = shape.iter().product();
        let data = (0..len)
            .map(|_| mean + stddev * rng.sample::<f64, _>(StandardNormal))
            .collect();
        Self::from_raw(data, shape, DType::Float64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_uniform_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = Tensor::uniform_with_rng(&[100], -2.0, 3.0, &mut rng);
        assert!(t.data().iter().all(|&v| (-2.0..3.0).contains(&v)));
    }

    #[test]
    fn test_randn_reproducible() {
        let mut rng = StdRng::seed_from_u64(12345);
        let t1 = Tensor::randn_with_rng(&[3, 4], &mut rng);
        let mut rng = StdRng::seed_from_u64(12345);
        let t2 = Tensor::randn_with_rng(&[3, 4], &mut rng);
        assert_eq!(t1, t2);
    }

    #[test]
    fn test_normal_statistics() {
        let mut rng = StdRng::seed_from_u64(42);
        let t = Tensor::normal_with_rng(&[10000], 5.0, 2.0, &mut rng);
        let mean: f64 = t.data().iter().sum::<f64>() / t.len() as f64;
        let var: f64 = t.data().iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / t.len() as f64;
        assert!((mean - 5.0).abs() < 0.1, "mean should be close to 5, got {mean}");
        assert!((var - 4.0).abs() < 0.3, "variance should be close to 4, got {var}");
    }

    #[test]
    fn test_random_empty_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(Tensor::random_with_rng(&[0, 3], &mut rng).is_empty());
        assert_eq!(Tensor::random_with_rng(&[], &mut rng).len(), 1);
    }
}
