pub trait Nms {
    fn iou(&self, other: &Self) -> f32;
    fn confidence(&self) -> f32;
}

/// Greedy non-maximum suppression. Keeps the highest-confidence item of every
/// group overlapping by more than `iou_threshold`; the survivors are left sorted
/// by descending confidence.
pub fn nms<T: Nms>(boxes: &mut Vec<T>, iou_threshold: f32) {
    boxes.sort_by(|b1, b2| {
        b2.confidence()
            .partial_cmp(&b1.confidence())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut current_index = 0;
    for index in 0..boxes.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = boxes[prev_index].iou(&boxes[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            boxes.swap(current_index, index);
            current_index += 1;
        }
    }
    boxes.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BBox, Detection};

    #[test]
    fn test_nms_keeps_best_of_overlapping_group() {
        let mut dets = vec![
            Detection::new(1, BBox::from_xyxy(0., 0., 10., 10.), 0.6),
            Detection::new(1, BBox::from_xyxy(1., 1., 11., 11.), 0.9),
            Detection::new(2, BBox::from_xyxy(50., 50., 60., 60.), 0.7),
        ];
        nms(&mut dets, 0.45);

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[1].class_id, 2);
    }

    #[test]
    fn test_nms_empty() {
        let mut dets: Vec<Detection> = vec![];
        nms(&mut dets, 0.5);
        assert!(dets.is_empty());
    }
}
