//! Raw network outputs, validated against the prior grid.

use tract_onnx::prelude::{Tensor, tract_ndarray::Array2};

use crate::error::PipelineError;

/// Values per anchor in the location tensor (center/size deltas).
pub const LOC_COLS: usize = 4;
/// Values per anchor in the landmark tensor (five points).
pub const LANDM_COLS: usize = 10;
/// Number of outputs the network produces.
pub const OUTPUT_COUNT: usize = 3;

/// Per-anchor regression and classification outputs, all indexed by prior.
#[derive(Debug, Clone)]
pub struct RawPrediction {
    loc: Array2<f32>,
    conf: Array2<f32>,
    landm: Array2<f32>,
}

impl RawPrediction {
    /// Build from `[N, 4]`, `[N, C]`, and `[N, 10]` arrays.
    pub fn new(
        loc: Array2<f32>,
        conf: Array2<f32>,
        landm: Array2<f32>,
    ) -> Result<Self, PipelineError> {
        if loc.ncols() != LOC_COLS {
            return Err(PipelineError::TensorShape {
                tensor: "loc",
                shape: loc.shape().to_vec(),
            });
        }
        if landm.ncols() != LANDM_COLS {
            return Err(PipelineError::TensorShape {
                tensor: "landm",
                shape: landm.shape().to_vec(),
            });
        }
        if conf.ncols() == 0 {
            return Err(PipelineError::TensorShape {
                tensor: "conf",
                shape: conf.shape().to_vec(),
            });
        }

        let anchors = loc.nrows();
        for (tensor, rows) in [("conf", conf.nrows()), ("landm", landm.nrows())] {
            if rows != anchors {
                return Err(PipelineError::PriorCountMismatch {
                    tensor,
                    expected: anchors,
                    actual: rows,
                });
            }
        }

        Ok(Self { loc, conf, landm })
    }

    /// Build from flat row-major buffers holding `anchors` rows each.
    pub fn from_slices(
        anchors: usize,
        loc: &[f32],
        conf: &[f32],
        landm: &[f32],
    ) -> Result<Self, PipelineError> {
        let loc = rows_from_slice("loc", anchors, LOC_COLS, loc)?;
        let classes = if anchors == 0 { 2 } else { conf.len() / anchors };
        let conf = rows_from_slice("conf", anchors, classes, conf)?;
        let landm = rows_from_slice("landm", anchors, LANDM_COLS, landm)?;
        Self::new(loc, conf, landm)
    }

    /// Build from the network output tensors.
    ///
    /// Outputs are told apart by their trailing dimension: 4 is `loc`, 10 is `landm`, and
    /// the remaining tensor is `conf`. `[N, C]` and `[1, N, C]` shapes are accepted.
    pub fn from_tensors(outputs: &[Tensor]) -> Result<Self, PipelineError> {
        if outputs.len() != OUTPUT_COUNT {
            return Err(PipelineError::OutputArity {
                expected: OUTPUT_COUNT,
                actual: outputs.len(),
            });
        }

        let mut loc = None;
        let mut conf = None;
        let mut landm = None;
        for tensor in outputs {
            match tensor.shape().last() {
                Some(&LOC_COLS) if loc.is_none() => loc = Some(tensor_rows("loc", tensor)?),
                Some(&LANDM_COLS) if landm.is_none() => {
                    landm = Some(tensor_rows("landm", tensor)?)
                }
                _ if conf.is_none() => conf = Some(tensor_rows("conf", tensor)?),
                _ => {
                    return Err(PipelineError::TensorShape {
                        tensor: "output",
                        shape: tensor.shape().to_vec(),
                    });
                }
            }
        }

        match (loc, conf, landm) {
            (Some(loc), Some(conf), Some(landm)) => Self::new(loc, conf, landm),
            _ => Err(PipelineError::OutputArity {
                expected: OUTPUT_COUNT,
                actual: outputs.len(),
            }),
        }
    }

    /// Fail unless every tensor holds exactly `expected` anchors.
    pub fn ensure_prior_count(&self, expected: usize) -> Result<(), PipelineError> {
        for (tensor, rows) in [
            ("loc", self.loc.nrows()),
            ("conf", self.conf.nrows()),
            ("landm", self.landm.nrows()),
        ] {
            if rows != expected {
                return Err(PipelineError::PriorCountMismatch {
                    tensor,
                    expected,
                    actual: rows,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.loc.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.loc.nrows() == 0
    }

    /// Number of confidence columns.
    pub fn num_classes(&self) -> usize {
        self.conf.ncols()
    }

    /// Location deltas of anchor `index`.
    pub fn loc(&self, index: usize) -> [f32; LOC_COLS] {
        let row = self.loc.row(index);
        [row[0], row[1], row[2], row[3]]
    }

    /// Landmark deltas of anchor `index`.
    pub fn landm(&self, index: usize) -> [f32; LANDM_COLS] {
        let row = self.landm.row(index);
        std::array::from_fn(|i| row[i])
    }

    /// Column `class_index` of the confidence tensor for every anchor.
    pub fn class_scores(&self, class_index: usize) -> Result<Vec<f32>, PipelineError> {
        if class_index >= self.conf.ncols() {
            return Err(PipelineError::ClassIndexOutOfRange {
                index: class_index,
                classes: self.conf.ncols(),
            });
        }
        Ok(self.conf.column(class_index).to_vec())
    }
}

fn rows_from_slice(
    tensor: &'static str,
    anchors: usize,
    cols: usize,
    data: &[f32],
) -> Result<Array2<f32>, PipelineError> {
    if data.len() != anchors * cols {
        return Err(PipelineError::TensorShape {
            tensor,
            shape: vec![data.len()],
        });
    }
    Array2::from_shape_vec((anchors, cols), data.to_vec()).map_err(|_| {
        PipelineError::TensorShape {
            tensor,
            shape: vec![anchors, cols],
        }
    })
}

fn tensor_rows(tensor: &'static str, value: &Tensor) -> Result<Array2<f32>, PipelineError> {
    let shape = value.shape();
    let (rows, cols) = match shape {
        [rows, cols] => (*rows, *cols),
        [1, rows, cols] => (*rows, *cols),
        _ => {
            return Err(PipelineError::TensorShape {
                tensor,
                shape: shape.to_vec(),
            });
        }
    };
    let data = value
        .as_slice::<f32>()
        .map_err(|_| PipelineError::TensorShape {
            tensor,
            shape: shape.to_vec(),
        })?;
    rows_from_slice(tensor, rows, cols, data)
}
