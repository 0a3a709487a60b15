//! Learnable parameter set: lifecycle and persistence
//!
//! Parameters live in one named-field struct rather than positional
//! parallel lists, so the update and serialization paths cannot misalign
//! weights against gradients. The blob format is a fixed-order binary
//! layout: a 4-byte magic, a little-endian version word, the class count,
//! then every tensor with its dimension header and little-endian `f64`
//! payload. Loading validates structure (magic, version, shapes, exact
//! length) but not values.

use log::debug;

use crate::error::{ModelError, Result};
use crate::network::{EMBED_WIDTH, FC1_WIDTH, FLAT_WIDTH};
use crate::optimizers::Optimizer;
use crate::tensor::{DenseParams, FilterBank};
use crate::utils::SimpleRng;

const BLOB_MAGIC: [u8; 4] = *b"LCN9";
const BLOB_VERSION: u32 = 1;

/// Shapes of the nine convolution banks in serialization order:
/// `(name, rows, cols, in_channels, out_channels)`.
const BANK_SHAPES: [(&str, usize, usize, usize, usize); 9] = [
    ("conv1", 5, 5, 1, 96),
    ("conv2a", 1, 1, 48, 96),
    ("conv2", 3, 3, 48, 192),
    ("conv3a", 1, 1, 96, 192),
    ("conv3", 3, 3, 96, 384),
    ("conv4a", 1, 1, 192, 384),
    ("conv4", 3, 3, 192, 256),
    ("conv5a", 1, 1, 128, 256),
    ("conv5", 3, 3, 128, 256),
];

/// The full learnable state of the network: five main convolution banks,
/// four 1×1 reduction banks, and two fully-connected stages.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkParameters {
    pub conv1: FilterBank,
    pub conv2a: FilterBank,
    pub conv2: FilterBank,
    pub conv3a: FilterBank,
    pub conv3: FilterBank,
    pub conv4a: FilterBank,
    pub conv4: FilterBank,
    pub conv5a: FilterBank,
    pub conv5: FilterBank,
    pub fc1: DenseParams,
    pub fc2: DenseParams,
}

fn random_bank(rows: usize, cols: usize, in_ch: usize, out_ch: usize, rng: &mut SimpleRng) -> FilterBank {
    let mut bank = FilterBank::zeros(rows, cols, in_ch, out_ch);
    let fan_in = (rows * cols * in_ch) as f64;
    let scale = (1.0 / fan_in).sqrt();
    for w in bank.weights.iter_mut() {
        *w = rng.next_gaussian() * scale;
    }
    bank
}

fn random_dense(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> DenseParams {
    let mut params = DenseParams::zeros(input_size, output_size);
    let scale = (2.0 / (input_size + output_size) as f64).sqrt();
    for w in params.weights.iter_mut() {
        *w = rng.next_gaussian() * scale;
    }
    params
}

impl NetworkParameters {
    /// Fan-in-scaled Gaussian initialization: convolution weights drawn with
    /// scale `sqrt(1 / fan_in)`, dense weights with
    /// `sqrt(2 / (fan_in + fan_out))`, all biases zero.
    pub fn random(num_classes: usize, rng: &mut SimpleRng) -> Self {
        assert!(num_classes > 0, "class count must be positive");
        let mut bank = |i: usize| {
            let (_, r, c, ic, oc) = BANK_SHAPES[i];
            random_bank(r, c, ic, oc, rng)
        };
        let conv1 = bank(0);
        let conv2a = bank(1);
        let conv2 = bank(2);
        let conv3a = bank(3);
        let conv3 = bank(4);
        let conv4a = bank(5);
        let conv4 = bank(6);
        let conv5a = bank(7);
        let conv5 = bank(8);
        Self {
            conv1,
            conv2a,
            conv2,
            conv3a,
            conv3,
            conv4a,
            conv4,
            conv5a,
            conv5,
            fc1: random_dense(FLAT_WIDTH, FC1_WIDTH, rng),
            fc2: random_dense(EMBED_WIDTH, num_classes, rng),
        }
    }

    /// Width of the class-score vector.
    pub fn num_classes(&self) -> usize {
        self.fc2.output_size()
    }

    /// Total number of trainable parameters.
    pub fn parameter_count(&self) -> usize {
        self.banks().iter().map(|b| b.parameter_count()).sum::<usize>()
            + self.fc1.parameter_count()
            + self.fc2.parameter_count()
    }

    fn banks(&self) -> [&FilterBank; 9] {
        [
            &self.conv1,
            &self.conv2a,
            &self.conv2,
            &self.conv3a,
            &self.conv3,
            &self.conv4a,
            &self.conv4,
            &self.conv5a,
            &self.conv5,
        ]
    }

    /// Main and reduction bank for one stage, `stage` in `1..=5`. Stage 1
    /// has no reduction.
    pub(crate) fn stage_banks(&self, stage: usize) -> (&FilterBank, Option<&FilterBank>) {
        match stage {
            1 => (&self.conv1, None),
            2 => (&self.conv2, Some(&self.conv2a)),
            3 => (&self.conv3, Some(&self.conv3a)),
            4 => (&self.conv4, Some(&self.conv4a)),
            5 => (&self.conv5, Some(&self.conv5a)),
            _ => unreachable!("stage index {} out of range", stage),
        }
    }

    /// Serialize every tensor to the opaque parameter blob.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(&BLOB_MAGIC);
        blob.extend_from_slice(&BLOB_VERSION.to_le_bytes());
        blob.extend_from_slice(&(self.num_classes() as u32).to_le_bytes());

        for bank in self.banks() {
            for dim in [bank.rows(), bank.cols(), bank.in_channels(), bank.out_channels()] {
                blob.extend_from_slice(&(dim as u32).to_le_bytes());
            }
            for &w in &bank.weights {
                blob.extend_from_slice(&w.to_le_bytes());
            }
            for &b in &bank.biases {
                blob.extend_from_slice(&b.to_le_bytes());
            }
        }
        for dense in [&self.fc1, &self.fc2] {
            for dim in [dense.input_size(), dense.output_size()] {
                blob.extend_from_slice(&(dim as u32).to_le_bytes());
            }
            for &w in &dense.weights {
                blob.extend_from_slice(&w.to_le_bytes());
            }
            for &b in &dense.biases {
                blob.extend_from_slice(&b.to_le_bytes());
            }
        }
        blob
    }

    /// Reconstruct the parameter set from a blob produced by [`to_blob`].
    ///
    /// # Errors
    ///
    /// `Deserialization` on a wrong magic, an unsupported version, a
    /// dimension header that disagrees with the fixed architecture, or a
    /// truncated or oversized payload.
    pub fn from_blob(bytes: &[u8]) -> Result<Self> {
        let mut reader = BlobReader::new(bytes);

        let magic = reader.read_bytes(4, "magic")?;
        if magic != BLOB_MAGIC {
            return Err(ModelError::Deserialization("bad magic".to_string()));
        }
        let version = reader.read_u32("version")?;
        if version != BLOB_VERSION {
            return Err(ModelError::Deserialization(format!(
                "unsupported version {}, expected {}",
                version, BLOB_VERSION
            )));
        }
        let num_classes = reader.read_u32("class count")? as usize;
        if num_classes == 0 {
            return Err(ModelError::Deserialization("zero class count".to_string()));
        }

        let mut banks = Vec::with_capacity(9);
        for (name, rows, cols, in_ch, out_ch) in BANK_SHAPES {
            banks.push(reader.read_bank(name, rows, cols, in_ch, out_ch)?);
        }
        let fc1 = reader.read_dense("fc1", FLAT_WIDTH, FC1_WIDTH)?;
        let fc2 = reader.read_dense("fc2", EMBED_WIDTH, num_classes)?;
        reader.finish()?;

        let mut banks = banks.into_iter();
        let params = Self {
            conv1: banks.next().unwrap(),
            conv2a: banks.next().unwrap(),
            conv2: banks.next().unwrap(),
            conv3a: banks.next().unwrap(),
            conv3: banks.next().unwrap(),
            conv4a: banks.next().unwrap(),
            conv4: banks.next().unwrap(),
            conv5a: banks.next().unwrap(),
            conv5: banks.next().unwrap(),
            fc1,
            fc2,
        };
        debug!(
            "loaded {} parameters for {} classes",
            params.parameter_count(),
            num_classes
        );
        Ok(params)
    }

    /// Write the blob to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        std::fs::write(path, self.to_blob())?;
        debug!("saved {} parameters to {}", self.parameter_count(), path);
        Ok(())
    }

    /// Load the blob from a file.
    pub fn load(path: &str) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_blob(&bytes)
    }

    /// Apply one optimizer step to every named weight/bias pair.
    pub fn apply(&mut self, grads: &Gradients, optimizer: &mut dyn Optimizer) {
        optimizer.update(&mut self.conv1.weights, &grads.conv1.weights);
        optimizer.update(&mut self.conv1.biases, &grads.conv1.biases);
        optimizer.update(&mut self.conv2a.weights, &grads.conv2a.weights);
        optimizer.update(&mut self.conv2a.biases, &grads.conv2a.biases);
        optimizer.update(&mut self.conv2.weights, &grads.conv2.weights);
        optimizer.update(&mut self.conv2.biases, &grads.conv2.biases);
        optimizer.update(&mut self.conv3a.weights, &grads.conv3a.weights);
        optimizer.update(&mut self.conv3a.biases, &grads.conv3a.biases);
        optimizer.update(&mut self.conv3.weights, &grads.conv3.weights);
        optimizer.update(&mut self.conv3.biases, &grads.conv3.biases);
        optimizer.update(&mut self.conv4a.weights, &grads.conv4a.weights);
        optimizer.update(&mut self.conv4a.biases, &grads.conv4a.biases);
        optimizer.update(&mut self.conv4.weights, &grads.conv4.weights);
        optimizer.update(&mut self.conv4.biases, &grads.conv4.biases);
        optimizer.update(&mut self.conv5a.weights, &grads.conv5a.weights);
        optimizer.update(&mut self.conv5a.biases, &grads.conv5a.biases);
        optimizer.update(&mut self.conv5.weights, &grads.conv5.weights);
        optimizer.update(&mut self.conv5.biases, &grads.conv5.biases);
        optimizer.update(&mut self.fc1.weights, &grads.fc1.weights);
        optimizer.update(&mut self.fc1.biases, &grads.fc1.biases);
        optimizer.update(&mut self.fc2.weights, &grads.fc2.weights);
        optimizer.update(&mut self.fc2.biases, &grads.fc2.biases);
    }
}

/// Gradient of the loss with respect to every parameter tensor, mirroring
/// [`NetworkParameters`] field for field. The containers reuse the
/// parameter shapes; `weights` holds the weight gradient and `biases` the
/// bias gradient.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub conv1: FilterBank,
    pub conv2a: FilterBank,
    pub conv2: FilterBank,
    pub conv3a: FilterBank,
    pub conv3: FilterBank,
    pub conv4a: FilterBank,
    pub conv4: FilterBank,
    pub conv5a: FilterBank,
    pub conv5: FilterBank,
    pub fc1: DenseParams,
    pub fc2: DenseParams,
}

fn zero_bank_like(bank: &FilterBank) -> FilterBank {
    FilterBank::zeros(bank.rows(), bank.cols(), bank.in_channels(), bank.out_channels())
}

fn add_bank(dst: &mut FilterBank, src: &FilterBank) {
    for (d, s) in dst.weights.iter_mut().zip(src.weights.iter()) {
        *d += s;
    }
    for (d, s) in dst.biases.iter_mut().zip(src.biases.iter()) {
        *d += s;
    }
}

fn add_dense(dst: &mut DenseParams, src: &DenseParams) {
    for (d, s) in dst.weights.iter_mut().zip(src.weights.iter()) {
        *d += s;
    }
    for (d, s) in dst.biases.iter_mut().zip(src.biases.iter()) {
        *d += s;
    }
}

fn scale_bank(bank: &mut FilterBank, factor: f64) {
    for w in bank.weights.iter_mut() {
        *w *= factor;
    }
    for b in bank.biases.iter_mut() {
        *b *= factor;
    }
}

fn scale_dense(dense: &mut DenseParams, factor: f64) {
    for w in dense.weights.iter_mut() {
        *w *= factor;
    }
    for b in dense.biases.iter_mut() {
        *b *= factor;
    }
}

impl Gradients {
    /// Zero gradients shaped like the given parameter set.
    pub fn zeros_like(params: &NetworkParameters) -> Self {
        Self {
            conv1: zero_bank_like(&params.conv1),
            conv2a: zero_bank_like(&params.conv2a),
            conv2: zero_bank_like(&params.conv2),
            conv3a: zero_bank_like(&params.conv3a),
            conv3: zero_bank_like(&params.conv3),
            conv4a: zero_bank_like(&params.conv4a),
            conv4: zero_bank_like(&params.conv4),
            conv5a: zero_bank_like(&params.conv5a),
            conv5: zero_bank_like(&params.conv5),
            fc1: DenseParams::zeros(params.fc1.input_size(), params.fc1.output_size()),
            fc2: DenseParams::zeros(params.fc2.input_size(), params.fc2.output_size()),
        }
    }

    /// Element-wise accumulation, used by minibatch gradient averaging.
    pub fn accumulate(&mut self, other: &Gradients) {
        add_bank(&mut self.conv1, &other.conv1);
        add_bank(&mut self.conv2a, &other.conv2a);
        add_bank(&mut self.conv2, &other.conv2);
        add_bank(&mut self.conv3a, &other.conv3a);
        add_bank(&mut self.conv3, &other.conv3);
        add_bank(&mut self.conv4a, &other.conv4a);
        add_bank(&mut self.conv4, &other.conv4);
        add_bank(&mut self.conv5a, &other.conv5a);
        add_bank(&mut self.conv5, &other.conv5);
        add_dense(&mut self.fc1, &other.fc1);
        add_dense(&mut self.fc2, &other.fc2);
    }

    /// Scale every gradient, e.g. by `1 / batch_size`.
    pub fn scale(&mut self, factor: f64) {
        scale_bank(&mut self.conv1, factor);
        scale_bank(&mut self.conv2a, factor);
        scale_bank(&mut self.conv2, factor);
        scale_bank(&mut self.conv3a, factor);
        scale_bank(&mut self.conv3, factor);
        scale_bank(&mut self.conv4a, factor);
        scale_bank(&mut self.conv4, factor);
        scale_bank(&mut self.conv5a, factor);
        scale_bank(&mut self.conv5, factor);
        scale_dense(&mut self.fc1, factor);
        scale_dense(&mut self.fc2, factor);
    }

    /// Mutable main and reduction gradient slots for one stage,
    /// `stage` in `1..=5`.
    pub(crate) fn stage_banks_mut(
        &mut self,
        stage: usize,
    ) -> (&mut FilterBank, Option<&mut FilterBank>) {
        match stage {
            1 => (&mut self.conv1, None),
            2 => (&mut self.conv2, Some(&mut self.conv2a)),
            3 => (&mut self.conv3, Some(&mut self.conv3a)),
            4 => (&mut self.conv4, Some(&mut self.conv4a)),
            5 => (&mut self.conv5, Some(&mut self.conv5a)),
            _ => unreachable!("stage index {} out of range", stage),
        }
    }
}

// Little-endian cursor over a parameter blob.
struct BlobReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.pos + len > self.bytes.len() {
            return Err(ModelError::Deserialization(format!(
                "truncated while reading {}",
                what
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.read_bytes(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f64_vec(&mut self, len: usize, what: &str) -> Result<Vec<f64>> {
        let bytes = self.read_bytes(len * 8, what)?;
        let mut values = Vec::with_capacity(len);
        for chunk in bytes.chunks_exact(8) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            values.push(f64::from_le_bytes(buf));
        }
        Ok(values)
    }

    fn read_dims(&mut self, name: &str, expected: &[usize]) -> Result<()> {
        for &want in expected {
            let got = self.read_u32(name)? as usize;
            if got != want {
                return Err(ModelError::Deserialization(format!(
                    "{}: dimension {} does not match expected {}",
                    name, got, want
                )));
            }
        }
        Ok(())
    }

    fn read_bank(
        &mut self,
        name: &str,
        rows: usize,
        cols: usize,
        in_ch: usize,
        out_ch: usize,
    ) -> Result<FilterBank> {
        self.read_dims(name, &[rows, cols, in_ch, out_ch])?;
        let mut bank = FilterBank::zeros(rows, cols, in_ch, out_ch);
        bank.weights = self.read_f64_vec(rows * cols * in_ch * out_ch, name)?;
        bank.biases = self.read_f64_vec(out_ch, name)?;
        Ok(bank)
    }

    fn read_dense(&mut self, name: &str, input_size: usize, output_size: usize) -> Result<DenseParams> {
        self.read_dims(name, &[input_size, output_size])?;
        let mut dense = DenseParams::zeros(input_size, output_size);
        dense.weights = self.read_f64_vec(input_size * output_size, name)?;
        dense.biases = self.read_f64_vec(output_size, name)?;
        Ok(dense)
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(ModelError::Deserialization(format!(
                "{} trailing bytes after the last tensor",
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}
