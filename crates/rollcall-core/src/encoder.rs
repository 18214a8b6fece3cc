//! Face encoding: the detect-then-describe capability and the enrollment encoder.

use crate::detector::{DetectorError, FaceDetector};
use crate::enrollment::Enrollment;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding, FaceModel, KnownFaces};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("encoder returned {got} descriptors for {expected} faces")]
    CountMismatch { expected: usize, got: usize },
}

/// Given an RGB image, find face regions and describe each with a fixed-length vector.
pub trait FaceEncoder {
    /// Locate faces, most confident first.
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError>;

    /// Compute one descriptor per face in `faces`, in the same order.
    fn encode(
        &mut self,
        image: &RgbImage,
        faces: &[BoundingBox],
    ) -> Result<Vec<Embedding>, EncoderError>;
}

/// SCRFD detection + ArcFace description.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    pub fn load(scrfd_path: &Path, arcface_path: &Path) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(scrfd_path)?;
        tracing::info!(path = %scrfd_path.display(), "SCRFD detector loaded");

        let recognizer = FaceRecognizer::load(arcface_path)?;
        tracing::info!(path = %arcface_path.display(), "ArcFace recognizer loaded");

        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        Ok(self.detector.detect(image)?)
    }

    fn encode(
        &mut self,
        image: &RgbImage,
        faces: &[BoundingBox],
    ) -> Result<Vec<Embedding>, EncoderError> {
        faces
            .iter()
            .map(|face| self.recognizer.extract(image, face).map_err(EncoderError::from))
            .collect()
    }
}

/// Encode every enrollment image into the gallery of known faces.
///
/// Only the first (most confident) face of each image is described; images
/// without a detectable face are skipped.
pub fn encode_enrollment<E: FaceEncoder + ?Sized>(
    encoder: &mut E,
    enrollment: &Enrollment,
) -> Result<KnownFaces, EncoderError> {
    let mut known = KnownFaces::default();

    for (idx, item) in enrollment.images.iter().enumerate() {
        let faces = encoder.locate(&item.image)?;
        let Some(first) = faces.first() else {
            tracing::warn!(
                index = idx,
                path = %item.path.display(),
                "no face found in image; skipping"
            );
            continue;
        };
        if faces.len() > 1 {
            tracing::debug!(
                path = %item.path.display(),
                faces = faces.len(),
                "multiple faces in enrollment image; using the first"
            );
        }

        let mut embeddings = encoder.encode(&item.image, std::slice::from_ref(first))?;
        let embedding = match embeddings.len() {
            1 => embeddings.remove(0),
            got => return Err(EncoderError::CountMismatch { expected: 1, got }),
        };

        known.models.push(FaceModel {
            id: item.path.clone(),
            label: item.label.clone(),
            embedding,
        });
    }

    tracing::info!(
        encoded = known.len(),
        images = enrollment.len(),
        "encoding complete"
    );

    Ok(known)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use image::Rgb;

    /// Encoder double: a face is any pixel whose red channel is non-zero.
    ///
    /// Each face is a 1×1 box at that pixel; its descriptor is `[r, g, b] / 255`.
    /// Faces are reported in row-major scan order.
    pub struct PixelEncoder;

    impl FaceEncoder for PixelEncoder {
        fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
            Ok(image
                .enumerate_pixels()
                .filter(|(_, _, p)| p[0] > 0)
                .map(|(x, y, _)| BoundingBox {
                    x: x as f32,
                    y: y as f32,
                    width: 1.0,
                    height: 1.0,
                    confidence: 1.0,
                    landmarks: None,
                })
                .collect())
        }

        fn encode(
            &mut self,
            image: &RgbImage,
            faces: &[BoundingBox],
        ) -> Result<Vec<Embedding>, EncoderError> {
            Ok(faces
                .iter()
                .map(|f| {
                    let Rgb([r, g, b]) = *image.get_pixel(f.x as u32, f.y as u32);
                    Embedding::new(vec![r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0])
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::PixelEncoder;
    use super::*;
    use crate::enrollment::EnrollmentImage;
    use image::Rgb;
    use std::path::PathBuf;

    fn item(label: &str, image: RgbImage) -> EnrollmentImage {
        EnrollmentImage {
            label: label.into(),
            path: PathBuf::from(format!("{label}/photo.png")),
            image,
        }
    }

    fn face_image(px: [u8; 3]) -> RgbImage {
        let mut img = RgbImage::new(4, 4);
        img.put_pixel(1, 1, Rgb(px));
        img
    }

    #[test]
    fn test_encode_all_faces_found() {
        let enrollment = Enrollment {
            images: vec![
                item("alice", face_image([255, 0, 0])),
                item("bob", face_image([255, 255, 0])),
            ],
        };
        let known = encode_enrollment(&mut PixelEncoder, &enrollment).unwrap();
        assert_eq!(known.len(), enrollment.len());
        assert_eq!(known.labels().collect::<Vec<_>>(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_encode_skips_faceless_images() {
        let enrollment = Enrollment {
            images: vec![
                item("alice", face_image([255, 0, 0])),
                item("blank", RgbImage::new(4, 4)),
                item("bob", face_image([255, 255, 0])),
            ],
        };
        let known = encode_enrollment(&mut PixelEncoder, &enrollment).unwrap();
        assert!(known.len() < enrollment.len());
        assert_eq!(known.labels().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(known.models[1].id, PathBuf::from("bob/photo.png"));
    }

    #[test]
    fn test_encode_uses_first_face_only() {
        let mut img = RgbImage::new(4, 4);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(3, 3, Rgb([255, 255, 255]));
        let enrollment = Enrollment {
            images: vec![item("pair", img)],
        };

        let known = encode_enrollment(&mut PixelEncoder, &enrollment).unwrap();
        assert_eq!(known.len(), 1);
        assert_eq!(known.models[0].embedding.values, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_encode_empty_enrollment() {
        let known = encode_enrollment(&mut PixelEncoder, &Enrollment::default()).unwrap();
        assert!(known.is_empty());
    }

    #[test]
    fn test_onnx_encoder_missing_model() {
        let result = OnnxFaceEncoder::load(
            Path::new("/nonexistent/det_10g.onnx"),
            Path::new("/nonexistent/w600k_r50.onnx"),
        );
        assert!(matches!(
            result,
            Err(EncoderError::Detector(DetectorError::ModelNotFound(_)))
        ));
    }
}
