use super::keypoints::Keypoints;
use crate::error::{HeadError, HeadResult};

/// Axis-aligned boxes of one image as `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Boxes(pub Vec<[f32; 4]>);

impl Boxes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[[f32; 4]] {
        &self.0
    }
}

/// Decoded keypoints of one image: `(N, K)` rows of `(x, y, score)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeypointPredictions {
    num_keypoints: usize,
    data: Vec<[f32; 3]>,
}

impl KeypointPredictions {
    pub fn new(num_keypoints: usize, data: Vec<[f32; 3]>) -> Self {
        debug_assert!(num_keypoints == 0 || data.len() % num_keypoints == 0);
        Self {
            num_keypoints,
            data,
        }
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        if self.num_keypoints == 0 {
            0
        } else {
            self.data.len() / self.num_keypoints
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn num_keypoints(&self) -> usize {
        self.num_keypoints
    }

    pub fn instance(&self, idx: usize) -> &[[f32; 3]] {
        let k = self.num_keypoints;
        &self.data[idx * k..(idx + 1) * k]
    }

    pub fn rows(&self) -> &[[f32; 3]] {
        &self.data
    }
}

/// Per-image instance collection flowing through the head.
///
/// Training collections carry `proposal_boxes` and `gt_keypoints`; inference
/// collections carry `pred_boxes` and receive `pred_keypoints`.
#[derive(Debug, Clone, Default)]
pub struct Instances {
    pub image_size: (usize, usize),
    pub proposal_boxes: Option<Boxes>,
    pub gt_keypoints: Option<Keypoints>,
    pub pred_boxes: Option<Boxes>,
    pub pred_keypoints: Option<KeypointPredictions>,
}

impl Instances {
    pub fn for_training(image_size: (usize, usize), proposal_boxes: Boxes, gt_keypoints: Keypoints) -> Self {
        debug_assert_eq!(proposal_boxes.len(), gt_keypoints.len());
        Self {
            image_size,
            proposal_boxes: Some(proposal_boxes),
            gt_keypoints: Some(gt_keypoints),
            ..Default::default()
        }
    }

    pub fn for_inference(image_size: (usize, usize), pred_boxes: Boxes) -> Self {
        Self {
            image_size,
            pred_boxes: Some(pred_boxes),
            ..Default::default()
        }
    }

    /// Instance count, taken from whichever of proposal boxes, predicted
    /// boxes or ground-truth keypoints is present.
    pub fn len(&self) -> usize {
        self.proposal_boxes
            .as_ref()
            .or(self.pred_boxes.as_ref())
            .map(Boxes::len)
            .or_else(|| self.gt_keypoints.as_ref().map(Keypoints::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn require_proposal_boxes(&self, image: usize) -> HeadResult<&Boxes> {
        self.proposal_boxes.as_ref().ok_or(HeadError::MissingField {
            image,
            field: "proposal_boxes",
        })
    }

    pub(crate) fn require_gt_keypoints(&self, image: usize) -> HeadResult<&Keypoints> {
        self.gt_keypoints.as_ref().ok_or(HeadError::MissingField {
            image,
            field: "gt_keypoints",
        })
    }

    pub(crate) fn require_pred_boxes(&self, image: usize) -> HeadResult<&Boxes> {
        self.pred_boxes.as_ref().ok_or(HeadError::MissingField {
            image,
            field: "pred_boxes",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_follows_boxes() {
        let train = Instances::for_training(
            (480, 640),
            Boxes(vec![[0.0, 0.0, 10.0, 10.0]; 3]),
            Keypoints::new(vec![vec![[1.0, 1.0, 2.0]]; 3]),
        );
        assert_eq!(train.len(), 3);

        let infer = Instances::for_inference((480, 640), Boxes::default());
        assert!(infer.is_empty());
        assert!(infer.require_gt_keypoints(0).is_err());
    }

    #[test]
    fn test_predictions_split_by_instance() {
        let preds = KeypointPredictions::new(2, vec![[1.0, 2.0, 0.5], [3.0, 4.0, 0.6], [5.0, 6.0, 0.7], [7.0, 8.0, 0.8]]);
        assert_eq!(preds.len(), 2);
        assert_eq!(preds.instance(1)[0], [5.0, 6.0, 0.7]);
    }
}
