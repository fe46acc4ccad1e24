use burn::prelude::*;

use crate::error::{HeadError, HeadResult};
use crate::structures::{heatmaps_to_keypoints, Instances, KeypointPredictions};

/// Decoded scores should be positive and finite; underflow in the softmax
/// denominator gives `inf`, underflow in the numerator gives 0.
fn is_usable_score(score: f32) -> bool {
    score.is_finite() && score > 0.0
}

/// Decode `(R, K, S, S)` heatmap logits into keypoints and attach them to
/// each image's instances as `pred_keypoints` rows of `(x, y, score)`.
///
/// R must equal the total number of predicted boxes, flattened in image
/// order.
pub fn keypoint_rcnn_inference<B: Backend>(
    logits: Tensor<B, 4>,
    instances: &mut [Instances],
) -> HeadResult<()> {
    let mut boxes_flat = Vec::new();
    let mut num_instances_per_image = Vec::with_capacity(instances.len());
    for (image, instances_per_image) in instances.iter().enumerate() {
        let boxes = instances_per_image.require_pred_boxes(image)?;
        boxes_flat.extend_from_slice(boxes.as_slice());
        num_instances_per_image.push(boxes.len());
    }

    let shape = logits.dims();
    if shape[0] != boxes_flat.len() {
        return Err(HeadError::Data(format!(
            "{} heatmap regions for {} predicted boxes",
            shape[0],
            boxes_flat.len()
        )));
    }
    let num_keypoints = shape[1];
    let maps: Vec<f32> = logits
        .detach()
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| HeadError::Data(format!("{e:?}")))?;

    let decoded = heatmaps_to_keypoints(&maps, shape, &boxes_flat);
    let mut rows = decoded.into_iter().map(|[x, y, _logit, score]| {
        if !is_usable_score(score) {
            log::warn!("decoded keypoint score {} is not a positive finite value", score);
        }
        [x, y, score]
    });

    for (instances_per_image, count) in instances.iter_mut().zip(num_instances_per_image) {
        let chunk: Vec<[f32; 3]> = rows.by_ref().take(count * num_keypoints).collect();
        instances_per_image.pred_keypoints = Some(KeypointPredictions::new(num_keypoints, chunk));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::Boxes;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_split_follows_instance_counts() {
        let device = Default::default();
        let counts = [3usize, 0, 5];
        let mut instances: Vec<Instances> = counts
            .iter()
            .map(|&n| {
                let boxes = (0..n)
                    .map(|i| [i as f32, i as f32, i as f32 + 20.0, i as f32 + 30.0])
                    .collect();
                Instances::for_inference((100, 100), Boxes(boxes))
            })
            .collect();

        let logits = Tensor::<TestBackend, 4>::random([8, 4, 12, 12], Distribution::Default, &device);
        keypoint_rcnn_inference(logits, &mut instances).unwrap();

        let mut total = 0;
        for (instances_per_image, &n) in instances.iter().zip(&counts) {
            let preds = instances_per_image.pred_keypoints.as_ref().unwrap();
            assert_eq!(preds.len(), n);
            assert_eq!(preds.rows().len(), n * 4);
            total += preds.len();
        }
        assert_eq!(total, 8);

        // Rows of the last image decode inside their own boxes.
        let last = instances[2].pred_keypoints.as_ref().unwrap();
        for i in 0..5 {
            for &[x, y, score] in last.instance(i) {
                assert!(x >= i as f32 && x <= i as f32 + 20.0);
                assert!(y >= i as f32 && y <= i as f32 + 30.0);
                assert!(score > 0.0);
            }
        }
    }

    #[test]
    fn test_requires_pred_boxes() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::zeros([0, 4, 12, 12], &device);
        let mut instances = vec![Instances::default()];
        let result = keypoint_rcnn_inference(logits, &mut instances);
        assert!(matches!(
            result,
            Err(HeadError::MissingField { image: 0, field: "pred_boxes" })
        ));
    }

    #[test]
    fn test_region_count_must_match_boxes() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::zeros([2, 4, 12, 12], &device);
        let mut instances = vec![Instances::for_inference((50, 50), Boxes(vec![[0.0, 0.0, 10.0, 10.0]]))];
        let result = keypoint_rcnn_inference(logits, &mut instances);
        assert!(matches!(result, Err(HeadError::Data(_))));
    }

    #[test]
    fn test_score_check_flags_underflow_and_overflow() {
        assert!(is_usable_score(0.3));
        assert!(!is_usable_score(0.0));
        assert!(!is_usable_score(f32::INFINITY));
        assert!(!is_usable_score(f32::NAN));
        assert!(!is_usable_score(-1.0));
    }
}
