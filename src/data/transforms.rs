//! Augmentation and preprocessing applied to each decoded image.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use rand::Rng;

/// Geometric steps applied in order before tensor conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Crops a random region covering `scale` of the area with an aspect ratio
    /// in `ratio` (log-uniform), then resizes it to `size × size`.
    RandomResizedCrop { size: u32, scale: (f64, f64), ratio: (f64, f64) },
    /// Mirrors left-right with probability `p`.
    RandomHorizontalFlip { p: f64 },
    /// Resizes to exactly `width × height`, ignoring aspect ratio.
    Resize { width: u32, height: u32 },
}

impl Transform {
    pub fn random_resized_crop(size: u32) -> Transform {
        Transform::RandomResizedCrop { size, scale: (0.08, 1.0), ratio: (3.0 / 4.0, 4.0 / 3.0) }
    }

    fn apply<R: Rng>(&self, img: RgbImage, rng: &mut R) -> RgbImage {
        match *self {
            Transform::RandomResizedCrop { size, scale, ratio } => {
                let (x, y, w, h) = crop_window(img.width(), img.height(), scale, ratio, rng);
                let cropped = imageops::crop_imm(&img, x, y, w, h).to_image();
                imageops::resize(&cropped, size, size, FilterType::Triangle)
            }
            Transform::RandomHorizontalFlip { p } => {
                if rng.gen_bool(p.clamp(0.0, 1.0)) {
                    imageops::flip_horizontal(&img)
                } else {
                    img
                }
            }
            Transform::Resize { width, height } => {
                imageops::resize(&img, width, height, FilterType::Triangle)
            }
        }
    }
}

/// Picks the crop rectangle `(x, y, w, h)` for `RandomResizedCrop`.
///
/// Tries ten random windows; if none fits, falls back to the largest centred
/// crop whose aspect ratio lies within `ratio`.
fn crop_window<R: Rng>(
    width: u32,
    height: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
    rng: &mut R,
) -> (u32, u32, u32, u32) {
    let area = width as f64 * height as f64;
    let (log_lo, log_hi) = (ratio.0.ln(), ratio.1.ln());

    for _ in 0..10 {
        let target_area = area * rng.gen_range(scale.0..=scale.1);
        let aspect = rng.gen_range(log_lo..=log_hi).exp();
        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;
        if w > 0 && h > 0 && w <= width && h <= height {
            let x = rng.gen_range(0..=width - w);
            let y = rng.gen_range(0..=height - h);
            return (x, y, w, h);
        }
    }

    let in_ratio = width as f64 / height as f64;
    let (w, h) = if in_ratio < ratio.0 {
        (width, ((width as f64 / ratio.0).round() as u32).clamp(1, height))
    } else if in_ratio > ratio.1 {
        (((height as f64 * ratio.1).round() as u32).clamp(1, width), height)
    } else {
        (width, height)
    };
    ((width - w) / 2, (height - h) / 2, w, h)
}

/// Per-channel `(x - mean) / std` applied after scaling pixels to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub mean: [f64; 3],
    pub std: [f64; 3],
}

impl Default for Normalize {
    /// Maps [0, 1] onto [-1, 1].
    fn default() -> Self {
        Normalize { mean: [0.5; 3], std: [0.5; 3] }
    }
}

/// Full preprocessing chain: geometric transforms, then conversion to a
/// channel-major (C, H, W) vector, then normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub steps: Vec<Transform>,
    pub normalize: Normalize,
}

impl Pipeline {
    /// Training augmentation: random resized crop + horizontal flip.
    pub fn train(image_size: u32) -> Pipeline {
        Pipeline {
            steps: vec![
                Transform::random_resized_crop(image_size),
                Transform::RandomHorizontalFlip { p: 0.5 },
            ],
            normalize: Normalize::default(),
        }
    }

    /// Validation preprocessing: deterministic square resize.
    pub fn eval(image_size: u32) -> Pipeline {
        Pipeline {
            steps: vec![Transform::Resize { width: image_size, height: image_size }],
            normalize: Normalize::default(),
        }
    }

    pub fn apply<R: Rng>(&self, image: DynamicImage, rng: &mut R) -> Vec<f64> {
        let mut img = image.to_rgb8();
        for step in &self.steps {
            img = step.apply(img, rng);
        }
        to_tensor(&img, &self.normalize)
    }
}

fn to_tensor(img: &RgbImage, normalize: &Normalize) -> Vec<f64> {
    let plane = (img.width() * img.height()) as usize;
    let mut out = vec![0.0; plane * 3];
    for (i, pixel) in img.pixels().enumerate() {
        for c in 0..3 {
            let x = pixel.0[c] as f64 / 255.0;
            out[c * plane + i] = (x - normalize.mean[c]) / normalize.std[c];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::{rngs::StdRng, SeedableRng};

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| Rgb([(x * 10) as u8, 0, 255])))
    }

    #[test]
    fn eval_pipeline_normalizes_channel_major() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 6, Rgb([255, 0, 255])));
        let out = Pipeline::eval(4).apply(img, &mut StdRng::seed_from_u64(0));
        assert_eq!(out.len(), 3 * 4 * 4);
        assert!(out[..16].iter().all(|&x| (x - 1.0).abs() < 1e-9));
        assert!(out[16..32].iter().all(|&x| (x + 1.0).abs() < 1e-9));
        assert!(out[32..].iter().all(|&x| (x - 1.0).abs() < 1e-9));
    }

    #[test]
    fn train_pipeline_always_yields_square_output() {
        let pipeline = Pipeline::train(8);
        let mut rng = StdRng::seed_from_u64(42);
        for (w, h) in [(3, 50), (50, 3), (20, 20), (1, 1)] {
            let out = pipeline.apply(gradient_image(w, h), &mut rng);
            assert_eq!(out.len(), 3 * 8 * 8, "input {w}x{h}");
            assert!(out.iter().all(|x| (-1.0..=1.0).contains(x)));
        }
    }

    #[test]
    fn crop_window_stays_inside_image() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let (x, y, w, h) = crop_window(37, 11, (0.08, 1.0), (0.75, 4.0 / 3.0), &mut rng);
            assert!(w >= 1 && h >= 1);
            assert!(x + w <= 37 && y + h <= 11);
        }
    }

    #[test]
    fn certain_flip_mirrors_columns() {
        let img = RgbImage::from_fn(3, 1, |x, _| Rgb([x as u8, 0, 0]));
        let flipped = Transform::RandomHorizontalFlip { p: 1.0 }.apply(img, &mut StdRng::seed_from_u64(1));
        let reds: Vec<u8> = flipped.pixels().map(|p| p.0[0]).collect();
        assert_eq!(reds, vec![2, 1, 0]);
    }

    #[test]
    fn same_seed_same_augmentation() {
        let pipeline = Pipeline::train(6);
        let a = pipeline.apply(gradient_image(30, 20), &mut StdRng::seed_from_u64(5));
        let b = pipeline.apply(gradient_image(30, 20), &mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
    }
}
