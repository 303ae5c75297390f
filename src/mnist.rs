use crate::error::{Error, Result};
use crate::sample::Sample;
use flate2::read::GzDecoder;
use itertools::Itertools;
use std::{fs::File, io::Read, path::Path};

pub const CLASSES: usize = 10;
const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;
const VALIDATION_SPLIT: usize = 50_000;

pub struct MnistData {
    pub training_data: Vec<Sample>,
    pub validation_data: Vec<Sample>,
    pub test_data: Vec<Sample>,
    pub rows: usize,
    pub columns: usize,
}

impl MnistData {
    /// Loads the four gzipped IDX files of the MNIST distribution from
    /// `data_dir`. The last 10000 training images become the validation set.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<MnistData> {
        let dir = data_dir.as_ref();

        let training_image_bytes = read_gz(dir.join("train-images-idx3-ubyte.gz"))?;
        let training_label_bytes = read_gz(dir.join("train-labels-idx1-ubyte.gz"))?;
        let (mut training_data, rows, columns) =
            images_and_labels_to_samples(&training_image_bytes, &training_label_bytes)?;

        // Create the validation data set by taking the final 10000 training samples, when there
        // are that many.
        let validation_data = if training_data.len() > VALIDATION_SPLIT {
            training_data.split_off(VALIDATION_SPLIT)
        } else {
            Vec::new()
        };

        let test_image_bytes = read_gz(dir.join("t10k-images-idx3-ubyte.gz"))?;
        let test_label_bytes = read_gz(dir.join("t10k-labels-idx1-ubyte.gz"))?;
        let (test_data, _, _) = images_and_labels_to_samples(&test_image_bytes, &test_label_bytes)?;

        Ok(MnistData {
            training_data,
            validation_data,
            test_data,
            rows,
            columns,
        })
    }

    pub fn features(&self) -> usize {
        self.rows * self.columns
    }
}

// Reads a whole gzip file into memory.
fn read_gz(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    decode_gz(file)
}

pub fn decode_gz<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    GzDecoder::new(reader).read_to_end(&mut bytes)?;
    Ok(bytes)
}

// Reads `count` big-endian u32 headers from the front of an IDX file.
fn read_headers(bytes: &[u8], count: usize, file: &str) -> Result<Vec<u32>> {
    if bytes.len() < count * 4 {
        return Err(Error::Truncated(format!("{file} header")));
    }
    Ok(bytes[..count * 4]
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Decodes raw (already decompressed) IDX image and label bytes into
/// samples, returning them together with the image height and width.
///
/// The image file starts with four u32 headers: the magic number 2051, the
/// number of images, rows and columns. The label file starts with two: the
/// magic number 2049 and the number of labels. Pixels are scaled from bytes
/// to `[0, 1]`.
pub fn images_and_labels_to_samples(
    image_bytes: &[u8],
    label_bytes: &[u8],
) -> Result<(Vec<Sample>, usize, usize)> {
    let image_headers = read_headers(image_bytes, 4, "image file")?;
    if image_headers[0] != IMAGE_MAGIC {
        return Err(Error::BadMagic {
            file: "image file".into(),
            expected: IMAGE_MAGIC,
            found: image_headers[0],
        });
    }
    let (images, rows, columns) = (image_headers[1], image_headers[2], image_headers[3]);

    let label_headers = read_headers(label_bytes, 2, "label file")?;
    if label_headers[0] != LABEL_MAGIC {
        return Err(Error::BadMagic {
            file: "label file".into(),
            expected: LABEL_MAGIC,
            found: label_headers[0],
        });
    }
    let labels = label_headers[1];

    // There should be an equal number of images and labels. If not, an incorrect pair of files has
    // been provided.
    if images != labels {
        return Err(Error::CountMismatch { images, labels });
    }

    let images = images as usize;
    let pixels = (rows as usize)
        .checked_mul(columns as usize)
        .ok_or_else(|| Error::Truncated(format!("{rows}x{columns} images are too large")))?;
    if pixels == 0 && images > 0 {
        return Err(Error::Truncated(format!("{images} images of {rows}x{columns} pixels")));
    }
    let image_len = images.checked_mul(pixels).ok_or_else(|| {
        Error::Truncated(format!("{images} images of {pixels} pixels overflow memory"))
    })?;
    let image_data = &image_bytes[16..];
    let label_data = &label_bytes[8..];
    if image_data.len() < image_len {
        return Err(Error::Truncated(format!(
            "expected {image_len} image bytes, found {}",
            image_data.len()
        )));
    }
    if label_data.len() < images {
        return Err(Error::Truncated(format!(
            "expected {images} labels, found {}",
            label_data.len()
        )));
    }

    // Walk the image bytes in rows*columns chunks (784 bytes for 28x28 images) alongside the label
    // bytes, so each chunk is paired with its label.
    let image_chunks = image_data.iter().take(image_len).chunks(pixels.max(1));
    image_chunks
        .into_iter()
        .zip(label_data.iter().take(images))
        .map(|(image_chunk, &label)| {
            let features = image_chunk.map(|&value| value as f64 / 255.0).collect();
            Sample::new(features, label as usize, CLASSES)
        })
        .collect::<Result<Vec<_>>>()
        .map(|samples| (samples, rows as usize, columns as usize))
}

/// Draws a sample as ASCII shading, followed by its label and, once the
/// sample has been evaluated, the network's prediction.
pub fn render_ascii(sample: &Sample, columns: usize) -> String {
    let mut out = String::new();

    for (index, intensity) in sample.input().iter().enumerate() {
        if columns > 0 && index % columns == 0 && index > 0 {
            out.push('\n');
        }
        out.push(match intensity {
            a if *a < 0.2 => ' ',
            a if *a < 0.4 => '░',
            a if *a < 0.6 => '▒',
            a if *a < 0.8 => '▓',
            _ => '█',
        });
    }

    out.push_str(&format!("\nAnswer: {}", sample.label()));
    if let Some(predicted) = sample.predicted_label() {
        out.push_str(&format!("\nPredicted: {predicted}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    fn idx_images(count: u32, rows: u32, columns: u32, pixels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for header in [IMAGE_MAGIC, count, rows, columns] {
            bytes.extend_from_slice(&header.to_be_bytes());
        }
        bytes.extend_from_slice(pixels);
        bytes
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    #[test]
    fn decodes_images_and_labels() {
        let images = idx_images(2, 2, 2, &[0, 255, 51, 102, 255, 255, 0, 0]);
        let labels = idx_labels(&[7, 3]);

        let (samples, rows, columns) = images_and_labels_to_samples(&images, &labels).unwrap();

        assert_eq!((rows, columns), (2, 2));
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label(), 7);
        assert_eq!(samples[0].input().column(0).to_vec(), vec![0.0, 1.0, 0.2, 0.4]);
        assert_eq!(samples[1].label(), 3);
        assert_eq!(samples[1].target()[[3, 0]], 1.0);
        assert_eq!(samples[1].classes(), CLASSES);
    }

    #[test]
    fn rejects_wrong_magic_numbers() {
        let mut images = idx_images(1, 1, 1, &[0]);
        images[3] = 0;
        let labels = idx_labels(&[1]);
        assert!(matches!(
            images_and_labels_to_samples(&images, &labels),
            Err(Error::BadMagic { expected: 2051, .. })
        ));
    }

    #[test]
    fn rejects_count_mismatch_and_truncation() {
        let images = idx_images(2, 1, 1, &[0, 0]);
        assert!(matches!(
            images_and_labels_to_samples(&images, &idx_labels(&[1])),
            Err(Error::CountMismatch { images: 2, labels: 1 })
        ));

        let short = idx_images(2, 2, 2, &[0, 0, 0]);
        assert!(matches!(
            images_and_labels_to_samples(&short, &idx_labels(&[1, 2])),
            Err(Error::Truncated(_))
        ));
        assert!(matches!(
            images_and_labels_to_samples(&[0, 0], &idx_labels(&[1])),
            Err(Error::Truncated(_))
        ));
    }

    #[test]
    fn oversized_headers_are_rejected_without_overflow() {
        let images = idx_images(u32::MAX, u32::MAX, u32::MAX, &[]);
        let labels = {
            let mut bytes = LABEL_MAGIC.to_be_bytes().to_vec();
            bytes.extend_from_slice(&u32::MAX.to_be_bytes());
            bytes
        };
        assert!(matches!(
            images_and_labels_to_samples(&images, &labels),
            Err(Error::Truncated(_))
        ));

        let huge_count = idx_images(u32::MAX, 1 << 20, 1 << 20, &[]);
        assert!(matches!(
            images_and_labels_to_samples(&huge_count, &labels),
            Err(Error::Truncated(_))
        ));
    }

    #[test]
    fn zero_sized_images_are_rejected() {
        let images = idx_images(2, 0, 28, &[]);
        assert!(matches!(
            images_and_labels_to_samples(&images, &idx_labels(&[1, 2])),
            Err(Error::Truncated(_))
        ));
    }

    #[test]
    fn label_beyond_ten_classes_is_a_data_error() {
        let images = idx_images(1, 1, 1, &[0]);
        assert!(matches!(
            images_and_labels_to_samples(&images, &idx_labels(&[12])),
            Err(Error::LabelOutOfRange { label: 12, .. })
        ));
    }

    #[test]
    fn gzip_round_trip() {
        let raw = idx_labels(&[1, 2, 3]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(decode_gz(compressed.as_slice()).unwrap(), raw);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        assert!(matches!(
            MnistData::load("/nonexistent/mnist"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn renders_digit_with_labels() {
        let images = idx_images(1, 2, 2, &[0, 255, 255, 0]);
        let (mut samples, _, columns) =
            images_and_labels_to_samples(&images, &idx_labels(&[4])).unwrap();

        assert_eq!(render_ascii(&samples[0], columns), " █\n█ \nAnswer: 4");

        let mut network = crate::network::Network::new(vec![
            crate::layer::Layer::with_parameters(
                ndarray::Array2::zeros((CLASSES, 4)),
                ndarray::Array2::from_shape_fn((CLASSES, 1), |(i, _)| {
                    if i == 2 { 1.0 } else { 0.0 }
                }),
                1.0,
                crate::activation::Activation::Softmax,
            )
            .unwrap(),
        ])
        .unwrap();
        network.evaluate(&mut samples).unwrap();
        assert!(render_ascii(&samples[0], columns).ends_with("Predicted: 2"));
    }
}
